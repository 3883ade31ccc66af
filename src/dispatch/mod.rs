//! Backend Dispatcher
//!
//! Information Hiding:
//! - Provider wire formats hidden in `wire`
//! - Cascade order: providers as configured, then endpoints as configured
//! - Each endpoint attempt is bounded by the provider timeout and retried
//!   with exponential backoff before the cascade moves on
//!
//! Strictly sequential: never two billable calls in flight at once.

mod prompt;
mod provider;
mod wire;

pub use prompt::{ConversationTurn, PromptContext, Role};
pub use provider::{NativeProvider, OpenAiCompatibleProvider, Provider};

use crate::config::{DispatchConfig, RetryConfig};
use crate::error::{EngineError, Result};
use reqwest::Client;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use wire::{ChatRequest, ChatResponse, NativeRequest, NativeResponse};

pub struct BackendDispatcher {
    client: Client,
    providers: Vec<Provider>,
    retry: RetryConfig,
}

impl BackendDispatcher {
    pub fn new(providers: Vec<Provider>, retry: RetryConfig) -> Result<Self> {
        if providers.is_empty() {
            return Err(EngineError::Config("no backend providers configured".to_string()));
        }
        Ok(Self {
            client: Client::new(),
            providers,
            retry,
        })
    }

    pub fn from_config(config: &DispatchConfig) -> Result<Self> {
        let providers = config
            .providers
            .iter()
            .map(|p| Provider::from_config(p, config))
            .collect::<Result<Vec<_>>>()?;
        Self::new(providers, config.retry)
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    /// First non-empty answer wins; otherwise `Exhausted` with the last failure.
    pub async fn dispatch(&self, prompt: &PromptContext) -> Result<String> {
        let mut last_error = None;

        for (i, provider) in self.providers.iter().enumerate() {
            tracing::info!(
                "[Dispatcher] Trying provider {} ({}/{})",
                provider.name(),
                i + 1,
                self.providers.len()
            );

            for (j, endpoint) in provider.endpoints().into_iter().enumerate() {
                match self.attempt_with_retry(provider, endpoint, prompt).await {
                    Ok(answer) => {
                        tracing::info!("[Dispatcher] {} answered via endpoint {}", provider.name(), j + 1);
                        return Ok(answer);
                    }
                    Err(e) => {
                        tracing::warn!("[Dispatcher] {} endpoint {} ({}) failed: {}", provider.name(), j + 1, endpoint, e);
                        last_error = Some(e);
                    }
                }
            }

            tracing::warn!("[Dispatcher] Provider {} exhausted, moving on", provider.name());
        }

        let last_cause = last_error.unwrap_or_else(|| EngineError::Config("no endpoints were tried".to_string()));
        tracing::error!("[Dispatcher] Every provider failed, last cause: {}", last_cause);
        Err(EngineError::Exhausted {
            last_cause: Box::new(last_cause),
        })
    }

    async fn attempt_with_retry(&self, provider: &Provider, endpoint: &str, prompt: &PromptContext) -> Result<String> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut delay = Duration::from_millis(self.retry.initial_delay_ms);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                tracing::warn!(
                    "[Dispatcher] Retrying {} (attempt {}/{}) after {}ms",
                    endpoint,
                    attempt + 1,
                    max_attempts,
                    delay.as_millis()
                );
                sleep(delay).await;
                delay *= 2;
            }

            match self.attempt(provider, endpoint, prompt).await {
                Ok(answer) => return Ok(answer),
                Err(e) if e.is_transient() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| EngineError::fetch(endpoint, "no attempt made")))
    }

    /// One request, bounded by the provider timeout. Dropping the future on
    /// expiry aborts the in-flight request.
    async fn attempt(&self, provider: &Provider, endpoint: &str, prompt: &PromptContext) -> Result<String> {
        let after = provider.timeout();
        let request = async {
            match provider {
                Provider::Native(p) => self.call_native(p, endpoint, prompt).await,
                Provider::OpenAiCompatible(p) => self.call_chat(p, endpoint, prompt).await,
            }
        };

        let answer = match timeout(after, request).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(EngineError::Timeout {
                    url: endpoint.to_string(),
                    after,
                })
            }
        };

        match answer {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(EngineError::fetch(endpoint, "empty answer")),
        }
    }

    async fn call_native(&self, provider: &NativeProvider, endpoint: &str, prompt: &PromptContext) -> Result<Option<String>> {
        let response = self
            .client
            .post(endpoint)
            .query(&[("key", provider.api_key.as_str())])
            .json(&NativeRequest::from_prompt(prompt.flattened()))
            .send()
            .await
            .map_err(|e| EngineError::fetch(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::fetch(endpoint, format!("HTTP {}", status)));
        }

        let body: NativeResponse = response
            .json()
            .await
            .map_err(|e| EngineError::fetch(endpoint, format!("response decode error: {}", e)))?;
        Ok(body.into_text())
    }

    async fn call_chat(
        &self,
        provider: &OpenAiCompatibleProvider,
        endpoint: &str,
        prompt: &PromptContext,
    ) -> Result<Option<String>> {
        let request = ChatRequest {
            model: &provider.model,
            messages: prompt.messages(),
            temperature: provider.temperature,
            max_tokens: provider.max_tokens,
            top_p: provider.top_p,
            frequency_penalty: provider.frequency_penalty,
            presence_penalty: provider.presence_penalty,
        };

        let response = self
            .client
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", provider.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::fetch(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EngineError::fetch(endpoint, format!("HTTP {} {}", status, detail.trim())));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| EngineError::fetch(endpoint, format!("response decode error: {}", e)))?;
        Ok(body.into_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_provider_list_is_rejected() {
        let result = BackendDispatcher::new(Vec::new(), RetryConfig::default());
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_exhausts() {
        let provider = Provider::OpenAiCompatible(OpenAiCompatibleProvider {
            name: "local".into(),
            model: "m".into(),
            api_key: "k".into(),
            // discard port, nothing listens
            endpoints: vec!["http://127.0.0.1:9/v1/chat/completions".into()],
            timeout: Duration::from_secs(2),
            temperature: None,
            max_tokens: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
        });
        let dispatcher = BackendDispatcher::new(vec![provider], RetryConfig::default()).unwrap();

        let err = dispatcher.dispatch(&PromptContext::new("hi")).await.unwrap_err();
        match err {
            EngineError::Exhausted { last_cause } => assert!(last_cause.is_transient()),
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }
}
