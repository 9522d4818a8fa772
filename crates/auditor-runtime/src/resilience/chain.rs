//! Ordered provider fallback.
//!
//! A [`ProviderChain`] is the LLM gateway the pipeline talks to. It tries
//! each `(provider, model)` entry in order and returns the first success.
//! Every attempt is recorded as a [`ProviderAttempt`], so a total failure
//! says exactly what was tried and why each one failed.
//!
//! Per entry:
//! 1. skip it if its circuit is open (one circuit per `provider/model`)
//! 2. call it, retrying with exponential backoff while it is rate limited
//! 3. on any other failure, record it and fall through to the next entry

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use thiserror::Error;

use super::circuit_breaker::CircuitBreaker;
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderError, TokenUsage};

/// How one attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed(ProviderError),
    SkippedCircuitOpen,
}

/// One entry of the chain, as tried for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderAttempt {
    pub provider: String,
    pub model: String,

    /// Rate-limit retries made on this entry before the outcome
    pub retries: u32,

    pub outcome: AttemptOutcome,
}

impl fmt::Display for ProviderAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}: ", self.provider, self.model)?;
        match &self.outcome {
            AttemptOutcome::Succeeded => write!(f, "ok"),
            AttemptOutcome::Failed(e) => write!(f, "{}", e),
            AttemptOutcome::SkippedCircuitOpen => write!(f, "skipped (circuit open)"),
        }
    }
}

/// Errors from the gateway as a whole.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("No providers configured")]
    NoProviders,

    #[error("All providers failed: {}", summarize(.attempts))]
    AllProvidersFailed { attempts: Vec<ProviderAttempt> },
}

fn summarize(attempts: &[ProviderAttempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A successful gateway call.
#[derive(Debug, Clone)]
pub struct ChainResponse {
    pub content: String,
    pub usage: TokenUsage,

    /// Entry that produced the response
    pub provider: String,
    pub model: String,

    /// Every attempt made, the successful one last
    pub attempts: Vec<ProviderAttempt>,
}

impl ChainResponse {
    /// Whether an earlier entry failed before this one answered.
    pub fn fell_back(&self) -> bool {
        self.attempts.len() > 1
    }
}

/// A provider paired with the model to request from it.
#[derive(Clone)]
pub struct ChainEntry {
    pub provider: Arc<dyn LlmProvider>,
    pub model: String,
}

impl ChainEntry {
    /// Circuit breaker key. Models of one provider fail independently.
    pub fn circuit_key(&self) -> String {
        format!("{}/{}", self.provider.name(), self.model)
    }
}

impl fmt::Debug for ChainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainEntry")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish()
    }
}

/// Ordered fallback over LLM providers.
pub struct ProviderChain {
    entries: Vec<ChainEntry>,
    breaker: Arc<CircuitBreaker>,
    rate_limit_retries: usize,
    retry_min_delay: Duration,
    max_tokens: u32,
    timeout: Duration,
}

impl ProviderChain {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            entries: Vec::new(),
            breaker,
            rate_limit_retries: 1,
            retry_min_delay: Duration::from_secs(1),
            max_tokens: 4096,
            timeout: Duration::from_secs(60),
        }
    }

    /// Append an entry; entries are tried in insertion order.
    pub fn with_entry(mut self, provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        self.entries.push(ChainEntry {
            provider,
            model: model.into(),
        });
        self
    }

    pub fn with_rate_limit_retries(mut self, retries: u32) -> Self {
        self.rate_limit_retries = retries as usize;
        self
    }

    /// First backoff delay; later retries double it.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_min_delay = delay;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Network timeout passed to each provider call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Send `messages` at `temperature`, falling back through the chain.
    pub async fn invoke(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<ChainResponse, GatewayError> {
        if self.entries.is_empty() {
            return Err(GatewayError::NoProviders);
        }

        let mut attempts = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            let provider_name = entry.provider.name().to_string();
            let circuit = entry.circuit_key();

            if self.breaker.is_open(&circuit) {
                tracing::warn!(provider = %provider_name, "Circuit open, skipping provider");
                attempts.push(ProviderAttempt {
                    provider: provider_name,
                    model: entry.model.clone(),
                    retries: 0,
                    outcome: AttemptOutcome::SkippedCircuitOpen,
                });
                continue;
            }

            let config = CompletionConfig {
                model: entry.model.clone(),
                max_tokens: self.max_tokens,
                temperature,
                timeout: self.timeout,
            };

            let mut retries = 0u32;
            let backoff = ExponentialBuilder::default()
                .with_min_delay(self.retry_min_delay)
                .with_max_times(self.rate_limit_retries);

            let provider = &entry.provider;
            let config = &config;
            let result = (move || async move { provider.complete(messages.to_vec(), config).await })
                .retry(backoff)
                .when(|e: &ProviderError| e.is_rate_limited())
                .notify(|e: &ProviderError, delay: Duration| {
                    retries += 1;
                    tracing::warn!(
                        provider = %provider_name,
                        model = %entry.model,
                        error = %e,
                        delay = ?delay,
                        "Provider rate limited, retrying"
                    );
                })
                .await;

            match result {
                Ok(response) => {
                    self.breaker.record_success(&circuit);
                    tracing::debug!(
                        provider = %provider_name,
                        model = %entry.model,
                        tokens = response.usage.total(),
                        "Provider call succeeded"
                    );
                    attempts.push(ProviderAttempt {
                        provider: provider_name.clone(),
                        model: entry.model.clone(),
                        retries,
                        outcome: AttemptOutcome::Succeeded,
                    });
                    return Ok(ChainResponse {
                        content: response.content,
                        usage: response.usage,
                        provider: provider_name,
                        model: entry.model.clone(),
                        attempts,
                    });
                }
                Err(e) => {
                    self.breaker.record_failure(&circuit);
                    tracing::warn!(
                        provider = %provider_name,
                        model = %entry.model,
                        error = %e,
                        "Provider failed, falling back to next provider"
                    );
                    attempts.push(ProviderAttempt {
                        provider: provider_name,
                        model: entry.model.clone(),
                        retries,
                        outcome: AttemptOutcome::Failed(e),
                    });
                }
            }
        }

        Err(GatewayError::AllProvidersFailed { attempts })
    }
}

impl fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderChain")
            .field("entries", &self.entries)
            .field("rate_limit_retries", &self.rate_limit_retries)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}
