//! Resilience around LLM calls.
//!
//! - [`ProviderChain`]: ordered provider fallback with rate-limit retries
//! - [`CircuitBreaker`]: skips `provider/model` entries that keep failing
//! - [`UsageTracker`]: token and cost accounting per job and stage

mod chain;
mod circuit_breaker;
mod usage;

pub use chain::{AttemptOutcome, ChainEntry, ChainResponse, GatewayError, ProviderAttempt, ProviderChain};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use usage::{LlmUsage, UsageTracker};
