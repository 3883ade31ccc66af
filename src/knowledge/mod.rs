//! Knowledge Store
//!
//! Information Hiding:
//! - Fetching, TTL caching and stale fallback hidden behind `load`
//! - `snapshot` returns the raw payload so callers can skip re-parsing a
//!   payload they have already indexed
//! - Cache entry layout in the state store is private to this module
//! - Unparseable sources degrade to an empty rule set instead of failing

pub mod parser;

use crate::clock::Clock;
use crate::config::KnowledgeConfig;
use crate::error::{EngineError, Result};
use crate::storage::{load_json, save_json, StateStore};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeRecord {
    pub id: String,
    pub keywords: Vec<String>,
    pub answer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Greeting,
    Closing,
    Fallback,
}

/// Phrase lists keyed by personality category
#[derive(Debug, Clone, Default)]
pub struct PersonalityPool {
    greeting: Vec<String>,
    closing: Vec<String>,
    fallback: Vec<String>,
}

impl PersonalityPool {
    pub fn phrases(&self, category: Category) -> &[String] {
        match category {
            Category::Greeting => &self.greeting,
            Category::Closing => &self.closing,
            Category::Fallback => &self.fallback,
        }
    }

    pub fn push(&mut self, category: Category, phrase: impl Into<String>) {
        let pool = match category {
            Category::Greeting => &mut self.greeting,
            Category::Closing => &mut self.closing,
            Category::Fallback => &mut self.fallback,
        };
        pool.push(phrase.into());
    }
}

/// A data row dropped because its field count did not match the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSkipped {
    pub line: usize,
    pub expected: usize,
    pub found: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Knowledge {
    pub rules: Vec<KnowledgeRecord>,
    pub personality: PersonalityPool,
    pub skipped: Vec<RowSkipped>,
    /// Set when the source could not be parsed
    pub degraded: Option<String>,
}

impl Knowledge {
    /// No rules and a single fallback phrase
    pub fn degraded(reason: impl Into<String>, fallback_phrase: impl Into<String>) -> Self {
        let mut personality = PersonalityPool::default();
        personality.push(Category::Fallback, fallback_phrase);
        Self {
            rules: Vec::new(),
            personality,
            skipped: Vec::new(),
            degraded: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Served from a cache entry within its TTL
    Cached,
    /// Fetched from the source during this call
    Fetched,
    /// Refresh failed, served an expired cache entry
    Stale,
}

#[derive(Debug, Clone)]
pub struct LoadedKnowledge {
    pub knowledge: Knowledge,
    pub fetched_at: i64,
    pub freshness: Freshness,
}

/// Raw source text with its fetch time, not yet parsed
#[derive(Debug, Clone)]
pub struct KnowledgeSnapshot {
    pub payload: String,
    pub fetched_at: i64,
    pub freshness: Freshness,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    source: String,
    payload: String,
    fetched_at: i64,
}

pub struct KnowledgeStore {
    client: Client,
    config: KnowledgeConfig,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
}

impl KnowledgeStore {
    pub fn new(config: KnowledgeConfig, store: Arc<dyn StateStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            client: Client::new(),
            config,
            store,
            clock,
        }
    }

    /// Loads and parses the configured source with the configured TTL.
    pub async fn load(&self) -> Result<LoadedKnowledge> {
        Ok(self.parse(self.snapshot().await?))
    }

    /// Like `load`, without parsing.
    pub async fn snapshot(&self) -> Result<KnowledgeSnapshot> {
        let url = self
            .config
            .source_url
            .as_deref()
            .ok_or_else(|| EngineError::Config("knowledge.source_url is not set".to_string()))?;
        self.snapshot_from(url, self.config.ttl()).await
    }

    pub async fn load_from(&self, source_url: &str, ttl: Duration) -> Result<LoadedKnowledge> {
        Ok(self.parse(self.snapshot_from(source_url, ttl).await?))
    }

    pub async fn snapshot_from(&self, source_url: &str, ttl: Duration) -> Result<KnowledgeSnapshot> {
        let now = self.clock.now_ms();
        let cached = self.cached_entry(source_url).await;

        if let Some(entry) = &cached {
            let age = now - entry.fetched_at;
            if age >= 0 && (age as u128) < ttl.as_millis() {
                tracing::debug!("[KnowledgeStore] Cache hit for {} (age {}ms)", source_url, age);
                return Ok(KnowledgeSnapshot {
                    payload: entry.payload.clone(),
                    fetched_at: entry.fetched_at,
                    freshness: Freshness::Cached,
                });
            }
        }

        match self.fetch(source_url).await {
            Ok(payload) => {
                let entry = CacheEntry {
                    source: source_url.to_string(),
                    payload,
                    fetched_at: now,
                };
                if let Err(e) = save_json(self.store.as_ref(), &self.config.cache_key, &entry).await {
                    tracing::warn!("[KnowledgeStore] Could not persist cache entry: {}", e);
                }
                tracing::info!("[KnowledgeStore] Fetched {} bytes from {}", entry.payload.len(), source_url);
                Ok(KnowledgeSnapshot {
                    payload: entry.payload,
                    fetched_at: entry.fetched_at,
                    freshness: Freshness::Fetched,
                })
            }
            Err(e) => match cached {
                Some(entry) => {
                    tracing::warn!("[KnowledgeStore] Refresh failed ({}), serving stale copy from {}", e, entry.fetched_at);
                    Ok(KnowledgeSnapshot {
                        payload: entry.payload,
                        fetched_at: entry.fetched_at,
                        freshness: Freshness::Stale,
                    })
                }
                None => {
                    tracing::error!("[KnowledgeStore] Fetch failed with no cached copy: {}", e);
                    Err(e)
                }
            },
        }
    }

    async fn cached_entry(&self, source_url: &str) -> Option<CacheEntry> {
        match load_json::<CacheEntry>(self.store.as_ref(), &self.config.cache_key).await {
            Ok(Some(entry)) if entry.source == source_url => Some(entry),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("[KnowledgeStore] Ignoring unreadable cache entry: {}", e);
                None
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        fetch_text(&self.client, url, Duration::from_millis(self.config.timeout_ms)).await
    }

    pub fn parse(&self, snapshot: KnowledgeSnapshot) -> LoadedKnowledge {
        let knowledge = match parser::parse(&snapshot.payload, &self.config) {
            Ok(knowledge) => knowledge,
            Err(e) => {
                tracing::error!("[KnowledgeStore] {}; continuing without rules", e);
                Knowledge::degraded(e.to_string(), self.config.degraded_fallback.clone())
            }
        };
        LoadedKnowledge {
            knowledge,
            fetched_at: snapshot.fetched_at,
            freshness: snapshot.freshness,
        }
    }
}

/// GET `url` as text, bounded by `after`. Non-success statuses are fetch errors.
pub(crate) async fn fetch_text(client: &Client, url: &str, after: Duration) -> Result<String> {
    let request = async {
        let response = client.get(url).send().await.map_err(|e| EngineError::fetch(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::fetch(url, format!("HTTP {}", status)));
        }
        response.text().await.map_err(|e| EngineError::fetch(url, e))
    };

    match timeout(after, request).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout {
            url: url.to_string(),
            after,
        }),
    }
}
