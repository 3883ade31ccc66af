//! Validated backend providers
//!
//! The configuration layer accepts loose records; a `Provider` only exists
//! once the fields its kind requires are present.

use crate::config::{DispatchConfig, ProviderConfig, ProviderKind};
use crate::error::{EngineError, Result};
use std::time::Duration;

const NATIVE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Clone)]
pub struct NativeProvider {
    pub name: String,
    pub model: String,
    pub api_key: String,
    pub endpoint: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    pub name: String,
    pub model: String,
    pub api_key: String,
    /// Proxy endpoints in trying order; never empty
    pub endpoints: Vec<String>,
    pub timeout: Duration,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
}

#[derive(Debug, Clone)]
pub enum Provider {
    Native(NativeProvider),
    OpenAiCompatible(OpenAiCompatibleProvider),
}

impl Provider {
    pub fn from_config(config: &ProviderConfig, defaults: &DispatchConfig) -> Result<Self> {
        let invalid = |msg: &str| EngineError::Config(format!("provider '{}': {}", config.name, msg));

        if config.name.trim().is_empty() {
            return Err(EngineError::Config("provider without a name".to_string()));
        }
        if config.model.trim().is_empty() {
            return Err(invalid("model is required"));
        }
        let api_key = config.credential().ok_or_else(|| invalid("no api_key and api_key_env is unset"))?;

        let endpoints: Vec<String> = config
            .endpoints
            .iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();

        match config.kind {
            ProviderKind::Native => {
                if endpoints.len() > 1 {
                    return Err(invalid("native providers take a single endpoint"));
                }
                let endpoint = endpoints
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| format!("{}/{}:generateContent", NATIVE_BASE_URL, config.model));
                Ok(Provider::Native(NativeProvider {
                    name: config.name.clone(),
                    model: config.model.clone(),
                    api_key,
                    endpoint,
                    timeout: Duration::from_millis(config.timeout_ms.unwrap_or(defaults.native_timeout_ms)),
                }))
            }
            ProviderKind::OpenaiCompatible => {
                if endpoints.is_empty() {
                    return Err(invalid("at least one endpoint is required"));
                }
                Ok(Provider::OpenAiCompatible(OpenAiCompatibleProvider {
                    name: config.name.clone(),
                    model: config.model.clone(),
                    api_key,
                    endpoints,
                    timeout: Duration::from_millis(config.timeout_ms.unwrap_or(defaults.proxy_timeout_ms)),
                    temperature: config.temperature,
                    max_tokens: config.max_tokens,
                    top_p: config.top_p,
                    frequency_penalty: config.frequency_penalty,
                    presence_penalty: config.presence_penalty,
                }))
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Provider::Native(p) => &p.name,
            Provider::OpenAiCompatible(p) => &p.name,
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Provider::Native(_) => ProviderKind::Native,
            Provider::OpenAiCompatible(_) => ProviderKind::OpenaiCompatible,
        }
    }

    pub fn endpoints(&self) -> Vec<&str> {
        match self {
            Provider::Native(p) => vec![p.endpoint.as_str()],
            Provider::OpenAiCompatible(p) => p.endpoints.iter().map(String::as_str).collect(),
        }
    }

    pub fn timeout(&self) -> Duration {
        match self {
            Provider::Native(p) => p.timeout,
            Provider::OpenAiCompatible(p) => p.timeout,
        }
    }
}
