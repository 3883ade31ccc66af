//! Engine error taxonomy
//!
//! Every failure inside the engine is one of these variants. Only the
//! orchestrator decides what (if anything) reaches the end user.

use crate::admission::Denial;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Network failure or non-success status talking to a URL
    #[error("fetch from {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    /// An attempt exceeded its deadline
    #[error("request to {url} timed out after {}ms", after.as_millis())]
    Timeout { url: String, after: Duration },

    /// Knowledge source header missing required columns or unreadable
    #[error("knowledge source format error: {0}")]
    Format(String),

    /// Every provider and proxy combination failed
    #[error("all backends exhausted, last cause: {last_cause}")]
    Exhausted { last_cause: Box<EngineError> },

    #[error("request denied: {0}")]
    Denied(Denial),

    #[error("state store error: {0}")]
    Storage(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Fetch and timeout failures are the ones the dispatch cascade recovers from.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::Timeout { .. })
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(format!("serialization: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_counts_as_transient() {
        let err = EngineError::Timeout {
            url: "http://proxy".into(),
            after: Duration::from_millis(12_000),
        };
        assert!(err.is_transient());
        assert!(err.to_string().contains("12000ms"));
        assert!(!EngineError::Format("no header".into()).is_transient());
    }

    #[test]
    fn test_exhausted_reports_last_cause() {
        let err = EngineError::Exhausted {
            last_cause: Box::new(EngineError::fetch("http://b", "HTTP 503")),
        };
        assert!(err.to_string().contains("HTTP 503"));
    }
}
