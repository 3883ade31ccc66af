//! Fallback State Store
//!
//! Wraps a persistent store and mirrors every successful write into memory.
//! The first time the primary errors (read-only disk, restricted sandbox) the
//! wrapper serves the mirror for the rest of the process, so callers never
//! see storage failures and keep what was written before the failure.

use super::{InMemoryStore, StateStore};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct FallbackStore {
    primary: Box<dyn StateStore>,
    memory: InMemoryStore,
    degraded: AtomicBool,
}

impl FallbackStore {
    pub fn new(primary: Box<dyn StateStore>) -> Self {
        Self {
            primary,
            memory: InMemoryStore::new(),
            degraded: AtomicBool::new(false),
        }
    }

    /// True once the primary store has failed and memory is serving
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    fn degrade(&self, op: &str, err: &dyn std::fmt::Display) {
        if !self.degraded.swap(true, Ordering::SeqCst) {
            tracing::warn!("[FallbackStore] Primary store failed on {}: {}. Using memory from now on", op, err);
        }
    }
}

#[async_trait]
impl StateStore for FallbackStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if !self.is_degraded() {
            match self.primary.get(key).await {
                Ok(value) => return Ok(value),
                Err(e) => self.degrade("get", &e),
            }
        }
        self.memory.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        if !self.is_degraded() {
            if let Err(e) = self.primary.set(key, value).await {
                self.degrade("set", &e);
            }
        }
        self.memory.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        if !self.is_degraded() {
            if let Err(e) = self.primary.remove(key).await {
                self.degrade("remove", &e);
            }
        }
        self.memory.remove(key).await
    }
}
