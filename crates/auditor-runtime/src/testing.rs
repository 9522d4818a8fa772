//! Scripted providers for pipeline tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
};
use crate::resilience::{CircuitBreaker, ProviderChain};

/// Answers each call with the next canned response, in order.
pub(crate) struct ScriptedProvider {
    name: &'static str,
    responses: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<(Vec<ChatMessage>, f32)>>,
}

impl ScriptedProvider {
    pub(crate) fn new(responses: Vec<&str>) -> Arc<Self> {
        Self::with_results(responses.into_iter().map(|r| Ok(r.to_string())).collect())
    }

    pub(crate) fn with_results(responses: Vec<Result<String, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            name: "scripted",
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn failing() -> Arc<Self> {
        Self::with_results(vec![Err(ProviderError::ApiError {
            status: 503,
            message: "overloaded".to_string(),
        })])
    }

    pub(crate) fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Messages and temperature of the `n`th call.
    pub(crate) fn request(&self, n: usize) -> (Vec<ChatMessage>, f32) {
        self.requests.lock()[n].clone()
    }

    /// A single-entry chain over this provider.
    pub(crate) fn chain(self: &Arc<Self>) -> Arc<ProviderChain> {
        Arc::new(
            ProviderChain::new(Arc::new(CircuitBreaker::default()))
                .with_retry_delay(Duration::from_millis(1))
                .with_entry(self.clone(), "scripted-model"),
        )
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        self.requests.lock().push((messages, config.temperature));
        let next = {
            let mut responses = self.responses.lock();
            if responses.len() > 1 {
                responses.pop_front()
            } else {
                responses.front().cloned()
            }
        };

        next.unwrap_or_else(|| Err(ProviderError::HttpError("script exhausted".to_string())))
            .map(|content| CompletionResponse {
                content,
                usage: TokenUsage {
                    prompt_tokens: 100,
                    completion_tokens: 20,
                    ..Default::default()
                },
                model: config.model.clone(),
                stop_reason: Some("stop".to_string()),
            })
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        self.name
    }
}
