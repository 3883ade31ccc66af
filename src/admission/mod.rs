//! Admission Control
//!
//! Information Hiding:
//! - Rate-log persistence format hidden behind `StateStore`
//! - Order of checks hidden: bot deterrence, access key, input gate, quota, spam guard, rate limit
//! - Denials carry a reason and optional wait time; nothing is recorded on denial

mod access;
mod flight;
mod window;

pub use access::{parse_credential, parse_expiry, AccessCredential, AccessGate};
pub use flight::{FlightGuard, SingleFlight};
pub use window::SlidingWindow;

use crate::clock::Clock;
use crate::config::AdmissionConfig;
use crate::error::Result;
use crate::storage::{load_json, save_json, StateStore};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// A previous request of this session is still unresolved
    Busy,
    /// Hidden form field was filled in
    Honeypot,
    /// Submitted sooner after session start than a person could type
    TooFast,
    /// Access key missing or wrong
    AccessDenied,
    /// Access key is past its expiry
    AccessExpired,
    /// Empty or shorter than the minimum length
    InputTooShort,
    QuotaExhausted,
    SpamGuard,
    RateLimited,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub reason: DenyReason,
    pub retry_after: Option<Duration>,
}

impl Denial {
    pub fn new(reason: DenyReason) -> Self {
        Self {
            reason,
            retry_after: None,
        }
    }

    /// Silent denials produce no reply at all.
    pub fn is_silent(&self) -> bool {
        matches!(
            self.reason,
            DenyReason::Busy | DenyReason::Honeypot | DenyReason::TooFast | DenyReason::InputTooShort
        )
    }

    /// Wait time rounded up to whole seconds
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after.map(|d| (d.as_millis() as u64).div_ceil(1000))
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.reason)?;
        if let Some(wait) = self.retry_after {
            write!(f, " (retry after {}ms)", wait.as_millis())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied(Denial),
}

/// What the controller needs to know about the session and the message
#[derive(Debug, Clone, Copy)]
pub struct AdmissionRequest<'a> {
    pub input: &'a str,
    pub honeypot: Option<&'a str>,
    /// Key the session unlocked with, if any
    pub access_key: Option<&'a str>,
    pub session_started_ms: i64,
    pub messages_delivered: u32,
}

pub struct AdmissionController {
    config: AdmissionConfig,
    rate_limit: SlidingWindow,
    spam_guard: SlidingWindow,
    access: Option<AccessGate>,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig, store: Arc<dyn StateStore>, clock: Arc<dyn Clock>) -> Self {
        let rate_limit = SlidingWindow::new(config.rate_limit.max_requests, config.rate_limit.window());
        let spam_guard = SlidingWindow::new(config.spam_guard.max_requests, config.spam_guard.window());
        Self {
            config,
            rate_limit,
            spam_guard,
            access: None,
            store,
            clock,
        }
    }

    pub fn with_access_gate(mut self, gate: AccessGate) -> Self {
        self.access = Some(gate);
        self
    }

    pub fn requires_access_key(&self) -> bool {
        self.access.is_some()
    }

    /// Denial reason for `key`, or `None` if it is accepted (or no gate is configured).
    pub async fn check_access(&self, key: Option<&str>) -> Result<Option<DenyReason>> {
        match &self.access {
            Some(gate) => gate.check(key).await,
            None => Ok(None),
        }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    fn rate_key(&self) -> String {
        format!("{}:rate_log", self.config.scope)
    }

    fn spam_key(&self) -> String {
        format!("{}:spam_log", self.config.scope)
    }

    pub async fn admit(&self, request: &AdmissionRequest<'_>) -> Result<Admission> {
        let now = self.clock.now_ms();

        if request.honeypot.is_some_and(|v| !v.is_empty()) {
            tracing::debug!("[Admission] Honeypot field filled, dropping request");
            return Ok(Admission::Denied(Denial::new(DenyReason::Honeypot)));
        }

        if now - request.session_started_ms < self.config.min_delay_ms as i64 {
            tracing::debug!("[Admission] Submitted {}ms after session start, dropping request", now - request.session_started_ms);
            return Ok(Admission::Denied(Denial::new(DenyReason::TooFast)));
        }

        if let Some(reason) = self.check_access(request.access_key).await? {
            tracing::info!("[Admission] Access gate closed: {:?}", reason);
            return Ok(Admission::Denied(Denial::new(reason)));
        }

        let input_len = request.input.trim().chars().count();
        if input_len == 0 || input_len < self.config.min_input_length {
            return Ok(Admission::Denied(Denial::new(DenyReason::InputTooShort)));
        }

        if let Some(max) = self.config.max_session_messages {
            if request.messages_delivered >= max {
                tracing::info!("[Admission] Session quota of {} messages exhausted", max);
                return Ok(Admission::Denied(Denial::new(DenyReason::QuotaExhausted)));
            }
        }

        let mut spam_log = self.load_log(&self.spam_key()).await;
        self.spam_guard.prune(&mut spam_log, now);
        if let Some(wait) = self.spam_guard.retry_after(&spam_log, now) {
            tracing::warn!("[Admission] Spam guard tripped ({} requests in window)", spam_log.len());
            return Ok(Admission::Denied(Denial {
                reason: DenyReason::SpamGuard,
                retry_after: Some(wait),
            }));
        }

        let mut rate_log = self.load_log(&self.rate_key()).await;
        self.rate_limit.prune(&mut rate_log, now);
        if let Some(wait) = self.rate_limit.retry_after(&rate_log, now) {
            tracing::info!("[Admission] Rate limited, retry in {}ms", wait.as_millis());
            return Ok(Admission::Denied(Denial {
                reason: DenyReason::RateLimited,
                retry_after: Some(wait),
            }));
        }

        spam_log.push(now);
        rate_log.push(now);
        save_json(self.store.as_ref(), &self.spam_key(), &spam_log).await?;
        save_json(self.store.as_ref(), &self.rate_key(), &rate_log).await?;

        Ok(Admission::Allowed)
    }

    async fn load_log(&self, key: &str) -> Vec<i64> {
        match load_json::<Vec<i64>>(self.store.as_ref(), key).await {
            Ok(log) => log.unwrap_or_default(),
            Err(e) => {
                tracing::warn!("[Admission] Discarding unreadable log '{}': {}", key, e);
                Vec::new()
            }
        }
    }
}
