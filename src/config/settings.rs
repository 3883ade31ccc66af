use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub admission: AdmissionConfig,
    pub access: AccessConfig,
    pub knowledge: KnowledgeConfig,
    pub matcher: MatcherConfig,
    pub composer: ComposerConfig,
    pub handoff: HandoffConfig,
    pub dispatch: DispatchConfig,
    pub ai: AiConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Delegate to the configured language-model backends
    Ai,
    /// Answer from the fuzzy-matched knowledge base
    Knowledge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mode: Mode,
    pub apology: String,
    /// `{seconds}` is replaced with the wait time
    pub rate_limited_message: String,
    pub spam_message: String,
    pub quota_message: String,
    /// `{remaining}` is replaced with the messages left in the session
    pub quota_warning: String,
    pub access_denied_message: String,
    pub access_expired_message: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Knowledge,
            apology: "Sorry, I'm having connection problems right now.".to_string(),
            rate_limited_message: "Please wait {seconds}s before sending another message.".to_string(),
            spam_message: "You have sent too many messages. Please wait a while.".to_string(),
            quota_message: "You have reached the message limit for this session.".to_string(),
            quota_warning: "You have {remaining} message(s) left.".to_string(),
            access_denied_message: "A valid access key is required.".to_string(),
            access_expired_message: "This access key has expired.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowConfig {
    pub max_requests: usize,
    pub window_secs: u64,
}

impl WindowConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Storage scope prefix for the persisted rate logs
    pub scope: String,
    pub rate_limit: WindowConfig,
    pub spam_guard: WindowConfig,
    pub min_delay_ms: u64,
    pub min_input_length: usize,
    pub max_input_length: usize,
    pub max_session_messages: Option<u32>,
    pub quota_warning_threshold: u32,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            scope: "chat".to_string(),
            rate_limit: WindowConfig {
                max_requests: 5,
                window_secs: 60,
            },
            spam_guard: WindowConfig {
                max_requests: 30,
                window_secs: 3600,
            },
            min_delay_ms: 2000,
            min_input_length: 4,
            max_input_length: 150,
            max_session_messages: None,
            quota_warning_threshold: 2,
        }
    }
}

/// Access key gate; disabled unless `source_url` or `key` is set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Sheet export whose first data row holds the key and its expiry
    pub source_url: Option<String>,
    /// Literal key, used when `source_url` is unset
    pub key: Option<String>,
    /// `DD-MM-YYYY HH:MM:SS` (UTC) or RFC 3339
    pub expires_at: Option<String>,
    pub ttl_secs: u64,
    pub timeout_ms: u64,
}

impl AccessConfig {
    pub fn is_enabled(&self) -> bool {
        self.source_url.is_some() || self.key.is_some()
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            source_url: None,
            key: None,
            expires_at: None,
            ttl_secs: 300,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    pub source_url: Option<String>,
    pub ttl_secs: u64,
    pub timeout_ms: u64,
    pub cache_key: String,
    pub id_column: String,
    pub keywords_column: String,
    pub answer_column: String,
    pub greeting_id: String,
    pub closing_id: String,
    pub fallback_id: String,
    /// Sole fallback phrase when the source cannot be parsed
    pub degraded_fallback: String,
}

impl KnowledgeConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            source_url: None,
            ttl_secs: 300,
            timeout_ms: 10_000,
            cache_key: "knowledge_cache".to_string(),
            id_column: "id".to_string(),
            keywords_column: "keywords".to_string(),
            answer_column: "answer".to_string(),
            greeting_id: "greeting".to_string(),
            closing_id: "closing".to_string(),
            fallback_id: "fallback".to_string(),
            degraded_fallback: "Sorry, I can't look that up right now.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Best score below this is a direct answer
    pub direct_threshold: f64,
    /// Best score below this (and not direct) produces suggestions
    pub suggest_threshold: f64,
    /// Suggestions must individually score below this
    pub suggestion_cutoff: f64,
    pub max_candidates: usize,
    pub max_suggestions: usize,
    /// Tokens shorter than this are noise
    pub min_token_length: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            direct_threshold: 0.4,
            suggest_threshold: 0.6,
            suggestion_cutoff: 0.65,
            max_candidates: 5,
            max_suggestions: 3,
            min_token_length: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickReply {
    pub title: String,
    /// Rule id the button sends
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    pub closing_probability: f64,
    pub suggestion_header: String,
    pub quick_replies: Vec<QuickReply>,
    /// Fixed seed for phrase selection; random when absent
    pub seed: Option<u64>,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            closing_probability: 0.7,
            suggestion_header: "I'm not sure I understood. Did you mean:".to_string(),
            quick_replies: Vec::new(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffConfig {
    pub base_url: String,
    pub prefill_prefix: String,
    pub label: String,
    /// Backend answers containing this marker get the handoff link appended
    pub marker: String,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            base_url: "https://wa.me/15550000000".to_string(),
            prefill_prefix: "Help: ".to_string(),
            label: "Talk to a person".to_string(),
            marker: "[handoff]".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Native,
    OpenaiCompatible,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable holding the key, used when `api_key` is absent
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub frequency_penalty: Option<f32>,
    #[serde(default)]
    pub presence_penalty: Option<f32>,
}

impl ProviderConfig {
    pub fn credential(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| self.api_key_env.as_ref().and_then(|var| env::var(var).ok()))
            .filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per endpoint, including the first
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub providers: Vec<ProviderConfig>,
    pub retry: RetryConfig,
    pub native_timeout_ms: u64,
    pub proxy_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            retry: RetryConfig::default(),
            native_timeout_ms: 10_000,
            proxy_timeout_ms: 12_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub instructions: String,
    pub instructions_file: Option<PathBuf>,
    pub business_data: String,
    pub business_data_file: Option<PathBuf>,
    pub max_history_messages: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            instructions: "You are a helpful assistant.".to_string(),
            instructions_file: None,
            business_data: String::new(),
            business_data_file: None,
            max_history_messages: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for persisted state; memory only when unset
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_env = env::var("CONFIG_ENV").unwrap_or_else(|_| "default".to_string());

        let config = Config::builder()
            .add_source(File::with_name(&format!("config/{}", config_env)).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings.engine.mode, Mode::Knowledge);
        assert_eq!(settings.admission.rate_limit.max_requests, 5);
        assert_eq!(settings.matcher.direct_threshold, 0.4);
        assert_eq!(settings.dispatch.proxy_timeout_ms, 12_000);
        assert!(settings.dispatch.providers.is_empty());
        assert!(!settings.access.is_enabled());
    }

    #[test]
    fn test_providers_and_thresholds_from_toml() {
        let settings = Settings::from_toml_str(
            r#"
            [engine]
            mode = "ai"

            [matcher]
            direct_threshold = 0.3

            [access]
            key = "demo-2024"
            expires_at = "31-12-2030 23:59:59"

            [[dispatch.providers]]
            name = "gemini"
            kind = "native"
            model = "gemini-1.5-flash"
            api_key = "abc"

            [[dispatch.providers]]
            name = "deepseek"
            kind = "openai_compatible"
            model = "deepseek-chat"
            api_key = "def"
            endpoints = ["https://p1.example", "https://p2.example"]
            "#,
        )
        .unwrap();

        assert_eq!(settings.engine.mode, Mode::Ai);
        assert_eq!(settings.matcher.direct_threshold, 0.3);
        assert_eq!(settings.matcher.suggest_threshold, 0.6);
        assert!(settings.access.is_enabled());
        assert_eq!(settings.access.ttl_secs, 300);
        assert_eq!(settings.dispatch.providers.len(), 2);
        assert_eq!(settings.dispatch.providers[1].kind, ProviderKind::OpenaiCompatible);
        assert_eq!(settings.dispatch.providers[1].endpoints.len(), 2);
    }

    #[test]
    fn test_credential_prefers_literal_key() {
        let provider = ProviderConfig {
            name: "p".into(),
            kind: ProviderKind::Native,
            model: "m".into(),
            api_key: Some("literal".into()),
            api_key_env: Some("ANSWERKIT_TEST_UNSET_VARIABLE".into()),
            endpoints: vec![],
            timeout_ms: None,
            temperature: None,
            max_tokens: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
        };
        assert_eq!(provider.credential().as_deref(), Some("literal"));

        let from_env = ProviderConfig {
            api_key: None,
            ..provider
        };
        assert!(from_env.credential().is_none());
    }
}
