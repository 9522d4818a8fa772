//! Stage agent trait and common types.

use async_trait::async_trait;
use auditor_core::{PipelineState, Stage};
use thiserror::Error;

use crate::providers::ChatMessage;
use crate::resilience::{GatewayError, ProviderChain, UsageTracker};

/// Errors from stage agents.
///
/// Malformed model output is never an error here; agents fall back to
/// their safe defaults. Only the gateway can fail a stage.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("{stage} failed: {source}")]
    Gateway {
        stage: Stage,
        #[source]
        source: GatewayError,
    },
}

/// One LLM-backed stage of the audit pipeline.
///
/// # Contract
/// - reads only the fields of `state` its stage consumes
/// - writes only the fields its stage owns
/// - issues at most one gateway call per invocation
#[async_trait]
pub trait StageAgent: Send + Sync {
    /// The stage this agent implements.
    fn stage(&self) -> Stage;

    /// Sampling temperature for this agent's calls.
    fn temperature(&self) -> f32;

    /// Run the stage against `state`, recording spend in `usage`.
    async fn run(&self, state: &mut PipelineState, usage: &UsageTracker) -> Result<(), AgentError>;
}

/// Send `messages` through the chain on behalf of `stage` and return the text.
pub(crate) async fn invoke_stage(
    chain: &ProviderChain,
    stage: Stage,
    messages: &[ChatMessage],
    temperature: f32,
    usage: &UsageTracker,
) -> Result<(String, String), AgentError> {
    let response = chain
        .invoke(messages, temperature)
        .await
        .map_err(|source| AgentError::Gateway { stage, source })?;

    if response.fell_back() {
        tracing::info!(
            stage = %stage,
            provider = %response.provider,
            attempts = response.attempts.len(),
            "Stage served by fallback provider"
        );
    }

    usage.record(stage, &response.usage, &response.model);
    Ok((response.content, response.model))
}
