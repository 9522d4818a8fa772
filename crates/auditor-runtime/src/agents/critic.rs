//! Audit quality review agent.

use async_trait::async_trait;
use std::sync::Arc;

use auditor_core::{CritiquePayload, PipelineState, Stage};

use super::traits::{invoke_stage, AgentError, StageAgent};
use crate::prompts;
use crate::resilience::{ProviderChain, UsageTracker};

/// Reviews the auditor's findings and approves them or sends them back.
///
/// Fails open: a verdict that cannot be read counts as approval, so a
/// misbehaving critic can only end the loop early, never extend it.
pub struct AuditCritic {
    chain: Arc<ProviderChain>,
    temperature: f32,
}

impl AuditCritic {
    pub fn new(chain: Arc<ProviderChain>) -> Self {
        Self {
            chain,
            temperature: 0.7,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl StageAgent for AuditCritic {
    fn stage(&self) -> Stage {
        Stage::Critiquing
    }

    fn temperature(&self) -> f32 {
        self.temperature
    }

    async fn run(&self, state: &mut PipelineState, usage: &UsageTracker) -> Result<(), AgentError> {
        let messages = prompts::critique_messages(state.clauses(), state.risks());
        let (content, _) =
            invoke_stage(&self.chain, self.stage(), &messages, self.temperature, usage).await?;

        let (approved, feedback) = match CritiquePayload::from_response(&content) {
            Ok(verdict) => (verdict.approved, verdict.feedback),
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable critic response, approving audit");
                (true, None)
            }
        };

        state.record_critique(approved, feedback);
        tracing::info!(
            approved,
            loop_count = state.loop_count(),
            "Critique complete"
        );
        Ok(())
    }
}
