//! # auditor-runtime
//!
//! LLM-driven side of the contract audit pipeline.
//!
//! `auditor-core` decides *what* happens (state, stage transitions, parsing,
//! rendering). This crate makes the model calls:
//! - [`providers`]: LLM backends behind the [`LlmProvider`] trait
//! - [`resilience`]: ordered provider fallback, circuit breaking, usage
//! - [`agents`]: the clause extractor, risk auditor and audit critic
//! - [`orchestrator`]: the [`PipelineController`] that sequences them
//! - [`jobs`]: background execution with progress events
//!
//! ## Example
//!
//! ```rust,ignore
//! use auditor_runtime::{InMemoryJobStore, JobRunner, PipelineController, ProviderRegistry, RuntimeConfig};
//! use auditor_core::RiskPlaybook;
//! use std::sync::Arc;
//!
//! let config = RuntimeConfig::load(None)?;
//! let chain = Arc::new(config.build_chain(&ProviderRegistry::with_defaults())?);
//! let playbook = RiskPlaybook::load_or_empty(&config.playbook_path).playbook;
//! let controller = PipelineController::from_config(&config, chain, &playbook);
//!
//! let runner = JobRunner::new(Arc::new(controller), Arc::new(InMemoryJobStore::new()), 4);
//! let job = runner.submit(contract_text).await?;
//! let record = runner.wait(&job).await?;
//! ```

pub mod agents;
pub mod cache;
pub mod config;
pub mod jobs;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;

#[cfg(test)]
pub(crate) mod testing;

pub use agents::{AgentError, AuditCritic, ClauseExtractor, RiskAuditor, StageAgent};
pub use cache::{ExtractionCache, ExtractionKey};
pub use config::{CacheConfig, ConfigError, ProviderSpec, RuntimeConfig, StageTemperatures};
pub use jobs::{
    stage_message, InMemoryJobStore, JobError, JobEvent, JobId, JobRecord, JobRunner, JobStatus,
    JobStore, JobUpdate,
};
pub use orchestrator::{PipelineController, PipelineError, PipelineOutcome, StageObserver};
pub use providers::{
    ApiCredential, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    ProviderFactory, ProviderRegistry, TokenUsage,
};
pub use resilience::{
    AttemptOutcome, ChainResponse, CircuitBreaker, CircuitBreakerConfig, GatewayError, LlmUsage,
    ProviderAttempt, ProviderChain, UsageTracker,
};
