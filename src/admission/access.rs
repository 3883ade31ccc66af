//! Access key gate
//!
//! The chat stays closed until the session presents the current key. Key and
//! expiry come either from configuration or from the first data row of a
//! published sheet (`key,expires_at`), re-read once the TTL lapses.

use super::DenyReason;
use crate::clock::Clock;
use crate::config::AccessConfig;
use crate::error::{EngineError, Result};
use crate::knowledge::fetch_text;
use crate::knowledge::parser::{detect_delimiter, split_records, split_row};
use chrono::{DateTime, NaiveDateTime};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const SHEET_EXPIRY_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessCredential {
    pub key: String,
    pub expires_at_ms: Option<i64>,
}

impl AccessCredential {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms.is_some_and(|expires| now_ms > expires)
    }
}

/// `DD-MM-YYYY HH:MM:SS` read as UTC, or RFC 3339. Unreadable values never expire.
pub fn parse_expiry(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, SHEET_EXPIRY_FORMAT) {
        return Some(naive.and_utc().timestamp_millis());
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Some(dt.timestamp_millis()),
        Err(_) => {
            tracing::warn!("[AccessGate] Unreadable expiry {:?}, key does not expire", raw);
            None
        }
    }
}

/// Key from the first column and expiry from the second, on the row after the header.
pub fn parse_credential(text: &str) -> Result<AccessCredential> {
    let mut rows = split_records(text)
        .into_iter()
        .map(|(_, row)| row)
        .filter(|row| !row.trim().is_empty());

    let header = rows
        .next()
        .ok_or_else(|| EngineError::Format("access source is empty".to_string()))?;
    let row = rows
        .next()
        .ok_or_else(|| EngineError::Format("access source has no key row".to_string()))?;

    let fields = split_row(&row, detect_delimiter(&header));
    let key = fields.first().cloned().unwrap_or_default();
    if key.is_empty() {
        return Err(EngineError::Format("access key cell is empty".to_string()));
    }

    Ok(AccessCredential {
        key,
        expires_at_ms: fields.get(1).and_then(|f| parse_expiry(f)),
    })
}

struct CachedCredential {
    fetched_at: i64,
    credential: AccessCredential,
}

pub struct AccessGate {
    client: Client,
    config: AccessConfig,
    clock: Arc<dyn Clock>,
    cached: Mutex<Option<CachedCredential>>,
}

impl AccessGate {
    pub fn new(config: AccessConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            client: Client::new(),
            config,
            clock,
            cached: Mutex::new(None),
        }
    }

    pub async fn credential(&self) -> Result<AccessCredential> {
        let Some(url) = self.config.source_url.as_deref() else {
            return Ok(AccessCredential {
                key: self.config.key.clone().unwrap_or_default(),
                expires_at_ms: self.config.expires_at.as_deref().and_then(parse_expiry),
            });
        };

        let now = self.clock.now_ms();
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            let age = now - entry.fetched_at;
            if age >= 0 && (age as u128) < self.config.ttl().as_millis() {
                return Ok(entry.credential.clone());
            }
        }

        let text = fetch_text(&self.client, url, Duration::from_millis(self.config.timeout_ms)).await?;
        let credential = parse_credential(&text)?;
        tracing::debug!("[AccessGate] Refreshed access key from {}", url);

        *cached = Some(CachedCredential {
            fetched_at: now,
            credential: credential.clone(),
        });
        Ok(credential)
    }

    /// `None` when `presented` is the current, unexpired key.
    pub async fn check(&self, presented: Option<&str>) -> Result<Option<DenyReason>> {
        let credential = self.credential().await?;

        if credential.is_expired(self.clock.now_ms()) {
            return Ok(Some(DenyReason::AccessExpired));
        }
        let matches = !credential.key.is_empty() && presented.map(str::trim) == Some(credential.key.as_str());
        Ok((!matches).then_some(DenyReason::AccessDenied))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn literal_gate(key: &str, expires_at: Option<&str>, now_ms: i64) -> AccessGate {
        let config = AccessConfig {
            key: Some(key.to_string()),
            expires_at: expires_at.map(str::to_string),
            ..AccessConfig::default()
        };
        AccessGate::new(config, Arc::new(ManualClock::new(now_ms)))
    }

    #[test]
    fn test_expiry_formats() {
        assert_eq!(parse_expiry("01-01-1970 00:10:00"), Some(600_000));
        assert_eq!(parse_expiry("1970-01-01T00:00:01Z"), Some(1_000));
        assert_eq!(parse_expiry("next tuesday"), None);
        assert_eq!(parse_expiry("  "), None);
    }

    #[test]
    fn test_credential_from_sheet_row() {
        let credential = parse_credential("clave,caduca\ndemo-42,31-12-2030 23:59:59\n").unwrap();
        assert_eq!(credential.key, "demo-42");
        assert!(credential.expires_at_ms.is_some());

        let without_expiry = parse_credential("key\n  abc  \n").unwrap();
        assert_eq!(without_expiry.key, "abc");
        assert_eq!(without_expiry.expires_at_ms, None);

        assert!(matches!(parse_credential("key,expires\n"), Err(EngineError::Format(_))));
        assert!(matches!(parse_credential("key,expires\n,01-01-2030 00:00:00\n"), Err(EngineError::Format(_))));
    }

    #[tokio::test]
    async fn test_valid_key_passes() {
        let gate = literal_gate("demo-42", Some("01-01-2030 00:00:00"), 1_000_000);
        assert_eq!(gate.check(Some("demo-42")).await.unwrap(), None);
        assert_eq!(gate.check(Some(" demo-42 ")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_wrong_or_missing_key_is_denied() {
        let gate = literal_gate("demo-42", None, 1_000_000);
        assert_eq!(gate.check(Some("demo-41")).await.unwrap(), Some(DenyReason::AccessDenied));
        assert_eq!(gate.check(None).await.unwrap(), Some(DenyReason::AccessDenied));
    }

    #[tokio::test]
    async fn test_expired_key_is_rejected_even_when_correct() {
        let gate = literal_gate("demo-42", Some("01-01-1970 00:10:00"), 1_000_000);
        assert_eq!(gate.check(Some("demo-42")).await.unwrap(), Some(DenyReason::AccessExpired));
    }

    #[tokio::test]
    async fn test_sheet_key_cached_for_ttl() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("key,expires\nsheet-key,\n"))
            .expect(1)
            .mount(&server)
            .await;

        let clock = Arc::new(ManualClock::new(0));
        let config = AccessConfig {
            source_url: Some(server.uri()),
            ttl_secs: 60,
            ..AccessConfig::default()
        };
        let gate = AccessGate::new(config, clock.clone());

        assert_eq!(gate.check(Some("sheet-key")).await.unwrap(), None);
        clock.advance_ms(30_000);
        assert_eq!(gate.check(Some("other")).await.unwrap(), Some(DenyReason::AccessDenied));
    }
}
