//! Per-session state threaded through every engine call

use crate::admission::{FlightGuard, SingleFlight};
use crate::dispatch::ConversationTurn;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

/// One chat session. Nothing here outlives the process.
#[derive(Debug)]
pub struct Session {
    id: String,
    started_at_ms: i64,
    flight: SingleFlight,
    history: Mutex<Vec<ConversationTurn>>,
    delivered: AtomicU32,
    access_key: Mutex<Option<String>>,
}

impl Session {
    pub fn new(id: impl Into<String>, started_at_ms: i64) -> Self {
        Self {
            id: id.into(),
            started_at_ms,
            flight: SingleFlight::new(),
            history: Mutex::new(Vec::new()),
            delivered: AtomicU32::new(0),
            access_key: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at_ms(&self) -> i64 {
        self.started_at_ms
    }

    pub(crate) fn begin(&self) -> Option<FlightGuard<'_>> {
        self.flight.try_acquire()
    }

    pub fn is_busy(&self) -> bool {
        self.flight.is_busy()
    }

    /// Replies delivered so far (denials and apologies excluded)
    pub fn delivered(&self) -> u32 {
        self.delivered.load(Ordering::SeqCst)
    }

    pub(crate) fn record_delivery(&self) -> u32 {
        self.delivered.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn history(&self) -> Vec<ConversationTurn> {
        self.lock_history().clone()
    }

    /// Last `n` turns, oldest first
    pub fn recent_history(&self, n: usize) -> Vec<ConversationTurn> {
        let history = self.lock_history();
        let start = history.len().saturating_sub(n);
        history[start..].to_vec()
    }

    pub(crate) fn push_exchange(&self, question: &str, answer: &str) {
        let mut history = self.lock_history();
        history.push(ConversationTurn::user(question));
        history.push(ConversationTurn::assistant(answer));
    }

    /// Key accepted by the access gate, if the session unlocked one
    pub fn access_key(&self) -> Option<String> {
        lock(&self.access_key).clone()
    }

    pub(crate) fn set_access_key(&self, key: &str) {
        *lock(&self.access_key) = Some(key.to_string());
    }

    /// Clears history and the delivered-message count; the access key stays
    pub fn reset(&self) {
        self.lock_history().clear();
        self.delivered.store(0, Ordering::SeqCst);
    }

    fn lock_history(&self) -> MutexGuard<'_, Vec<ConversationTurn>> {
        lock(&self.history)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_history_keeps_tail() {
        let session = Session::new("s1", 0);
        session.push_exchange("q1", "a1");
        session.push_exchange("q2", "a2");

        let recent = session.recent_history(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0], ConversationTurn::assistant("a1"));
        assert_eq!(session.recent_history(10).len(), 4);
        assert!(session.recent_history(0).is_empty());
    }

    #[test]
    fn test_reset_clears_state() {
        let session = Session::new("s1", 0);
        session.push_exchange("q", "a");
        assert_eq!(session.record_delivery(), 1);

        session.reset();
        assert!(session.history().is_empty());
        assert_eq!(session.delivered(), 0);
    }

    #[test]
    fn test_begin_is_exclusive() {
        let session = Session::new("s1", 0);
        let guard = session.begin();
        assert!(guard.is_some());
        assert!(session.begin().is_none());
        drop(guard);
        assert!(!session.is_busy());
    }
}
