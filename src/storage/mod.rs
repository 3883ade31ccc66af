//! Persisted State Abstraction
//!
//! Information Hiding:
//! - Backend (memory, files) hidden behind a string-keyed trait
//! - Values are JSON documents; typed access goes through `load_json`/`save_json`
//! - Fallback to memory when the primary backend is unavailable lives in `fallback`

use crate::error::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub mod fallback;
pub mod filesystem;
pub mod memory;

pub use fallback::FallbackStore;
pub use filesystem::FileSystemStore;
pub use memory::InMemoryStore;

/// Key-value store holding rate logs and the knowledge cache
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Returns `None` if the key was never written
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}

pub async fn load_json<T: DeserializeOwned>(store: &dyn StateStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub async fn save_json<T: Serialize + ?Sized>(store: &dyn StateStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw).await
}
