//! Orchestrator
//!
//! Information Hiding:
//! - Admission, routing and composition order hidden behind `handle`
//! - The payload is parsed and indexed only when its fetch time changes
//! - Errors never reach the caller; they become an apology with a handoff link

mod reply;
mod session;

pub use reply::{Reply, ReplyKind, ReplySink};
pub use session::Session;

use crate::admission::{AccessGate, Admission, AdmissionController, AdmissionRequest, Denial, DenyReason};
use crate::clock::Clock;
use crate::composer::ResponseComposer;
use crate::config::{EngineConfig, Mode, Settings};
use crate::dispatch::{BackendDispatcher, PromptContext};
use crate::error::{EngineError, Result};
use crate::knowledge::{KnowledgeStore, PersonalityPool};
use crate::matcher::{FuzzyMatcher, MatchResult};
use crate::storage::StateStore;
use std::path::Path;
use std::sync::{Arc, RwLock};

struct CachedIndex {
    fetched_at: i64,
    matcher: Arc<FuzzyMatcher>,
    personality: Arc<PersonalityPool>,
}

pub struct Orchestrator {
    config: EngineConfig,
    settings: Settings,
    instructions: String,
    business_data: String,
    admission: AdmissionController,
    knowledge: KnowledgeStore,
    index: RwLock<Option<CachedIndex>>,
    dispatcher: Option<BackendDispatcher>,
    composer: ResponseComposer,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    /// Validates the settings for the configured mode and reads the AI context files.
    pub async fn from_settings(settings: &Settings, store: Arc<dyn StateStore>, clock: Arc<dyn Clock>) -> Result<Self> {
        let dispatcher = match settings.engine.mode {
            Mode::Ai => Some(BackendDispatcher::from_config(&settings.dispatch)?),
            Mode::Knowledge if settings.knowledge.source_url.is_none() => {
                return Err(EngineError::Config("knowledge mode needs knowledge.source_url".to_string()));
            }
            Mode::Knowledge => None,
        };

        let mut admission = AdmissionController::new(settings.admission.clone(), store.clone(), clock.clone());
        if settings.access.is_enabled() {
            admission = admission.with_access_gate(AccessGate::new(settings.access.clone(), clock.clone()));
        }

        let instructions = read_or(&settings.ai.instructions_file, &settings.ai.instructions).await?;
        let business_data = read_or(&settings.ai.business_data_file, &settings.ai.business_data).await?;

        Ok(Self {
            config: settings.engine.clone(),
            settings: settings.clone(),
            instructions,
            business_data,
            admission,
            knowledge: KnowledgeStore::new(settings.knowledge.clone(), store, clock.clone()),
            index: RwLock::new(None),
            dispatcher,
            composer: ResponseComposer::new(settings.composer.clone(), settings.handoff.clone()),
            clock,
        })
    }

    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    pub fn knowledge(&self) -> &KnowledgeStore {
        &self.knowledge
    }

    pub fn new_session(&self, id: impl Into<String>) -> Session {
        Session::new(id, self.clock.now_ms())
    }

    pub fn requires_access_key(&self) -> bool {
        self.admission.requires_access_key()
    }

    /// Checks `key` against the access gate and remembers it on the session.
    /// A rejected key is `EngineError::Denied`.
    pub async fn unlock(&self, session: &Session, key: &str) -> Result<()> {
        if let Some(reason) = self.admission.check_access(Some(key)).await? {
            tracing::info!("[Orchestrator] Session {} unlock refused: {:?}", session.id(), reason);
            return Err(EngineError::Denied(Denial::new(reason)));
        }
        session.set_access_key(key.trim());
        Ok(())
    }

    /// User-facing text for a visible denial; `None` for silent ones.
    pub fn denial_notice(&self, denial: &Denial) -> Option<String> {
        if denial.is_silent() {
            return None;
        }
        let text = match denial.reason {
            DenyReason::RateLimited => self
                .config
                .rate_limited_message
                .replace("{seconds}", &denial.retry_after_secs().unwrap_or(1).to_string()),
            DenyReason::SpamGuard => self.config.spam_message.clone(),
            DenyReason::QuotaExhausted => self.config.quota_message.clone(),
            DenyReason::AccessDenied => self.config.access_denied_message.clone(),
            DenyReason::AccessExpired => self.config.access_expired_message.clone(),
            DenyReason::Busy | DenyReason::Honeypot | DenyReason::TooFast | DenyReason::InputTooShort => {
                return None;
            }
        };
        Some(text)
    }

    /// Resolves one user message. `None` means the message was dropped silently.
    pub async fn handle(&self, session: &Session, input: &str, honeypot: Option<&str>) -> Option<Reply> {
        let Some(_flight) = session.begin() else {
            tracing::debug!("[Orchestrator] Session {} busy, rejecting input", session.id());
            return None;
        };

        let question = truncate_chars(input.trim(), self.settings.admission.max_input_length);
        let access_key = session.access_key();
        let request = AdmissionRequest {
            input: &question,
            honeypot,
            access_key: access_key.as_deref(),
            session_started_ms: session.started_at_ms(),
            messages_delivered: session.delivered(),
        };

        match self.admission.admit(&request).await {
            Ok(Admission::Allowed) => {}
            Ok(Admission::Denied(denial)) => return self.denial_reply(&denial),
            Err(e) => {
                tracing::error!("[Orchestrator] Admission failed: {}", e);
                return Some(self.apology(&question));
            }
        }

        let outcome = match self.config.mode {
            Mode::Ai => self.answer_with_backend(session, &question).await,
            Mode::Knowledge => self.answer_from_knowledge(&question).await,
        };

        let mut reply = match outcome {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("[Orchestrator] Session {}: {}", session.id(), e);
                return Some(self.apology(&question));
            }
        };

        if reply.is_delivery() {
            let delivered = session.record_delivery();
            if let Some(warning) = self.quota_warning(delivered) {
                reply.text.push_str("\n\n");
                reply.text.push_str(&warning);
            }
        }
        Some(reply)
    }

    /// Like `handle`, pushing the reply into `sink`. Returns whether anything was delivered.
    pub async fn handle_into(
        &self,
        session: &Session,
        input: &str,
        honeypot: Option<&str>,
        sink: &mut dyn ReplySink,
    ) -> bool {
        match self.handle(session, input, honeypot).await {
            Some(reply) => {
                sink.deliver(&reply);
                true
            }
            None => false,
        }
    }

    async fn answer_with_backend(&self, session: &Session, question: &str) -> Result<Reply> {
        let dispatcher = self
            .dispatcher
            .as_ref()
            .ok_or_else(|| EngineError::Config("no backend providers configured".to_string()))?;

        let prompt = PromptContext {
            instructions: self.instructions.clone(),
            business_data: self.business_data.clone(),
            history: session.recent_history(self.settings.ai.max_history_messages),
            question: question.to_string(),
        };

        let answer = dispatcher.dispatch(&prompt).await?;
        session.push_exchange(question, &answer);

        let text = self.composer.apply_handoff_marker(&answer, question);
        Ok(Reply::new(ReplyKind::Answer, text))
    }

    async fn answer_from_knowledge(&self, question: &str) -> Result<Reply> {
        let (matcher, personality) = self.current_index().await?;
        let result = matcher.query(question);
        let text = self.composer.compose(&result, &personality, question);

        let kind = match result {
            MatchResult::Direct { .. } => ReplyKind::Answer,
            MatchResult::Suggest(ref ids) if !ids.is_empty() => ReplyKind::Suggestion,
            _ => ReplyKind::Fallback,
        };
        Ok(Reply::new(kind, text))
    }

    async fn current_index(&self) -> Result<(Arc<FuzzyMatcher>, Arc<PersonalityPool>)> {
        let snapshot = self.knowledge.snapshot().await?;

        if let Ok(guard) = self.index.read() {
            if let Some(cached) = guard.as_ref().filter(|c| c.fetched_at == snapshot.fetched_at) {
                return Ok((cached.matcher.clone(), cached.personality.clone()));
            }
        }

        let loaded = self.knowledge.parse(snapshot);
        let mut matcher = FuzzyMatcher::new(self.settings.matcher.clone());
        matcher.build_index(&loaded.knowledge.rules);
        let matcher = Arc::new(matcher);
        let personality = Arc::new(loaded.knowledge.personality);

        tracing::info!(
            "[Orchestrator] Rebuilt index: {} rules ({:?})",
            matcher.len(),
            loaded.freshness
        );

        if let Ok(mut guard) = self.index.write() {
            *guard = Some(CachedIndex {
                fetched_at: loaded.fetched_at,
                matcher: matcher.clone(),
                personality: personality.clone(),
            });
        }
        Ok((matcher, personality))
    }

    fn denial_reply(&self, denial: &Denial) -> Option<Reply> {
        self.denial_notice(denial).map(|text| Reply::new(ReplyKind::Notice, text))
    }

    fn apology(&self, question: &str) -> Reply {
        Reply::new(ReplyKind::Apology, self.composer.with_handoff(&self.config.apology, question))
    }

    fn quota_warning(&self, delivered: u32) -> Option<String> {
        let max = self.settings.admission.max_session_messages?;
        let remaining = max.saturating_sub(delivered);
        if remaining == 0 {
            return Some(self.config.quota_message.clone());
        }
        (remaining <= self.settings.admission.quota_warning_threshold)
            .then(|| self.config.quota_warning.replace("{remaining}", &remaining.to_string()))
    }
}

async fn read_or(path: &Option<std::path::PathBuf>, inline: &str) -> Result<String> {
    match path.as_deref() {
        Some(path) => read_context_file(path).await,
        None => Ok(inline.to_string()),
    }
}

async fn read_context_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| EngineError::Config(format!("cannot read {:?}: {}", path, e)))
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{AdmissionConfig, WindowConfig};
    use crate::storage::InMemoryStore;

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate_chars("añoñoño", 3), "año");
        assert_eq!(truncate_chars("short", 150), "short");
    }

    async fn knowledge_orchestrator(settings: Settings) -> (Orchestrator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let orchestrator = Orchestrator::from_settings(&settings, Arc::new(InMemoryStore::new()), clock.clone())
            .await
            .unwrap();
        (orchestrator, clock)
    }

    fn knowledge_settings() -> Settings {
        let mut settings = Settings::default();
        settings.knowledge.source_url = Some("http://127.0.0.1:9/kb.csv".into());
        settings
    }

    #[tokio::test]
    async fn test_ai_mode_without_providers_is_rejected() {
        let mut settings = Settings::default();
        settings.engine.mode = Mode::Ai;
        let result = Orchestrator::from_settings(&settings, Arc::new(InMemoryStore::new()), Arc::new(ManualClock::new(0))).await;
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[tokio::test]
    async fn test_knowledge_mode_without_source_is_rejected() {
        let result =
            Orchestrator::from_settings(&Settings::default(), Arc::new(InMemoryStore::new()), Arc::new(ManualClock::new(0))).await;
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[tokio::test]
    async fn test_unreachable_source_becomes_apology() {
        let (orchestrator, clock) = knowledge_orchestrator(knowledge_settings()).await;
        let session = orchestrator.new_session("s1");
        clock.advance_ms(5_000);

        let reply = orchestrator.handle(&session, "what is the price", None).await.unwrap();
        assert_eq!(reply.kind, ReplyKind::Apology);
        assert!(reply.text.starts_with("Sorry, I'm having connection problems"));
        assert!(reply.text.contains("https://wa.me/"));
        assert_eq!(session.delivered(), 0);
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_silent_denials_return_nothing() {
        let (orchestrator, clock) = knowledge_orchestrator(knowledge_settings()).await;
        let session = orchestrator.new_session("s1");

        // too soon after session start
        assert!(orchestrator.handle(&session, "what is the price", None).await.is_none());

        clock.advance_ms(5_000);
        assert!(orchestrator.handle(&session, "what is the price", Some("bot")).await.is_none());
        assert!(orchestrator.handle(&session, "  ", None).await.is_none());
    }

    #[tokio::test]
    async fn test_rate_limit_notice_mentions_wait() {
        let mut settings = knowledge_settings();
        settings.admission = AdmissionConfig {
            rate_limit: WindowConfig {
                max_requests: 1,
                window_secs: 60,
            },
            ..AdmissionConfig::default()
        };
        let (orchestrator, clock) = knowledge_orchestrator(settings).await;
        let session = orchestrator.new_session("s1");
        clock.advance_ms(5_000);

        let first = orchestrator.handle(&session, "what is the price", None).await.unwrap();
        assert_eq!(first.kind, ReplyKind::Apology);

        clock.advance_ms(10_000);
        let second = orchestrator.handle(&session, "what is the price", None).await.unwrap();
        assert_eq!(second.kind, ReplyKind::Notice);
        assert_eq!(second.text, "Please wait 50s before sending another message.");
    }

    #[tokio::test]
    async fn test_index_reused_until_payload_refetched() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("id,keywords,answer\nr1,precio,Diez\n"))
            .expect(2)
            .mount(&server)
            .await;

        let mut settings = Settings::default();
        settings.knowledge.source_url = Some(server.uri());
        settings.knowledge.ttl_secs = 60;
        let (orchestrator, clock) = knowledge_orchestrator(settings).await;

        let (first, _) = orchestrator.current_index().await.unwrap();
        clock.advance_ms(30_000);
        let (second, _) = orchestrator.current_index().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        clock.advance_ms(31_000);
        let (third, _) = orchestrator.current_index().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.len(), 1);
    }

    #[tokio::test]
    async fn test_quota_warning_thresholds() {
        let mut settings = knowledge_settings();
        settings.admission.max_session_messages = Some(5);
        settings.admission.quota_warning_threshold = 2;

        let (orchestrator, _) = knowledge_orchestrator(settings).await;
        assert!(orchestrator.quota_warning(1).is_none());
        assert_eq!(orchestrator.quota_warning(3).as_deref(), Some("You have 2 message(s) left."));
        assert_eq!(
            orchestrator.quota_warning(5).as_deref(),
            Some("You have reached the message limit for this session.")
        );

        let (unlimited, _) = knowledge_orchestrator(knowledge_settings()).await;
        assert!(unlimited.quota_warning(100).is_none());
    }
}
