//! Answerkit - chat answer resolution engine
//!
//! Answers end-user questions either by cascading across prioritized
//! language-model backends with proxy failover, or by fuzzy-matching the
//! question against a cached knowledge sheet and composing a templated reply.

pub mod admission;
pub mod clock;
pub mod composer;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod knowledge;
pub mod matcher;
pub mod storage;
pub mod utils;

pub mod cli;

pub use config::{Mode, Settings};
pub use engine::{Orchestrator, Reply, ReplyKind, ReplySink, Session};
pub use error::{EngineError, Result};

use clock::Clock;
use std::sync::Arc;
use storage::{FallbackStore, FileSystemStore, InMemoryStore, StateStore};

/// State store for the configured storage directory, memory-backed if none.
pub async fn open_state_store(settings: &Settings) -> Arc<dyn StateStore> {
    let Some(dir) = settings.storage.directory.as_ref() else {
        return Arc::new(InMemoryStore::new());
    };

    match FileSystemStore::new(dir.clone()).await {
        Ok(store) => Arc::new(FallbackStore::new(Box::new(store))),
        Err(e) => {
            tracing::warn!("State directory unavailable ({}), keeping state in memory", e);
            Arc::new(InMemoryStore::new())
        }
    }
}

/// Builds an orchestrator on the wall clock and the configured state store.
pub async fn init(settings: &Settings) -> Result<Orchestrator> {
    let store = open_state_store(settings).await;
    let clock: Arc<dyn Clock> = Arc::new(clock::SystemClock);
    let orchestrator = Orchestrator::from_settings(settings, store, clock).await?;

    tracing::info!("Answer engine initialized in {:?} mode", orchestrator.mode());
    Ok(orchestrator)
}
