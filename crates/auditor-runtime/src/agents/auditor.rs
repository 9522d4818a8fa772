//! Risk audit agent.

use async_trait::async_trait;
use std::sync::Arc;

use auditor_core::{AuditPayload, PipelineState, RiskPlaybook, Stage, ToxicScreen};

use super::traits::{invoke_stage, AgentError, StageAgent};
use crate::prompts;
use crate::resilience::{ProviderChain, UsageTracker};

/// Evaluates extracted clauses against the risk playbook.
///
/// Every pass replaces the previous findings and score wholesale. When the
/// critic rejected the previous pass, its feedback is added to the prompt.
pub struct RiskAuditor {
    chain: Arc<ProviderChain>,
    temperature: f32,
    playbook_json: String,
    screen: ToxicScreen,
}

impl RiskAuditor {
    pub fn new(chain: Arc<ProviderChain>, playbook: &RiskPlaybook) -> Self {
        Self {
            chain,
            temperature: 0.1,
            playbook_json: playbook.to_prompt_json(),
            screen: ToxicScreen::from_playbook(playbook),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl StageAgent for RiskAuditor {
    fn stage(&self) -> Stage {
        Stage::Auditing
    }

    fn temperature(&self) -> f32 {
        self.temperature
    }

    async fn run(&self, state: &mut PipelineState, usage: &UsageTracker) -> Result<(), AgentError> {
        let pass = state.loop_count() + 1;
        let hits = self.screen.scan(state.clauses());
        if !hits.is_empty() {
            tracing::debug!(hits = hits.len(), "Toxic-language pre-screen hits");
        }

        let messages = prompts::audit_messages(
            state.clauses(),
            &self.playbook_json,
            &hits,
            state.critic_feedback(),
        );
        let (content, _) =
            invoke_stage(&self.chain, self.stage(), &messages, self.temperature, usage).await?;

        match AuditPayload::from_response(&content) {
            Ok(payload) => {
                if payload.dropped > 0 {
                    tracing::warn!(dropped = payload.dropped, "Auditor returned unreadable risks");
                }
                tracing::info!(
                    pass,
                    risks = payload.risks.len(),
                    risk_score = payload.risk_score,
                    "Audit pass complete"
                );
                state.replace_audit(payload.risks, payload.risk_score);
            }
            Err(e) => {
                tracing::warn!(pass, error = %e, "Unparseable auditor response, recording no risks");
                state.replace_audit(Vec::new(), 0);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;
    use auditor_core::{Clause, ClauseType, RiskLevel};

    const ONE_RISK: &str = r#"{"risks": [{"clause_type": "Indemnity", "risk_level": "High",
        "issue": "Uncapped", "toxic_language": "unlimited indemnity",
        "recommendation": "Cap it"}], "risk_score": 70}"#;

    fn playbook() -> RiskPlaybook {
        RiskPlaybook::from_json(
            r#"{"risk_categories": [{"name": "Indemnity", "description": "Indemnity exposure",
                "toxic_patterns": ["unlimited indemnity"]}]}"#,
        )
        .unwrap()
    }

    fn state_with_clause() -> PipelineState {
        let mut state = PipelineState::new("contract");
        state.set_clauses(vec![Clause::new(
            ClauseType::Indemnity,
            "Vendor grants Unlimited  Indemnity to Client.",
        )]);
        state
    }

    #[tokio::test]
    async fn test_audit_pass_records_findings() {
        let provider = ScriptedProvider::new(vec![ONE_RISK]);
        let auditor = RiskAuditor::new(provider.chain(), &playbook());
        let mut state = state_with_clause();

        auditor.run(&mut state, &UsageTracker::new()).await.unwrap();

        assert_eq!(state.risks().len(), 1);
        assert_eq!(state.risks()[0].risk_level, RiskLevel::High);
        assert_eq!(state.risk_score(), 70);

        let (messages, temperature) = provider.request(0);
        assert_eq!(temperature, 0.1);
        assert!(messages[0].content.contains("unlimited indemnity"));
        assert!(messages[1].content.contains("Pre-screen hits"));
        assert!(messages[1].content.contains("Unlimited  Indemnity"));
    }

    #[tokio::test]
    async fn test_feedback_is_sent_on_revision() {
        let provider = ScriptedProvider::new(vec![ONE_RISK]);
        let auditor = RiskAuditor::new(provider.chain(), &playbook());
        let mut state = state_with_clause();
        state.record_critique(false, Some("missed toxic indemnity clause".to_string()));

        auditor.run(&mut state, &UsageTracker::new()).await.unwrap();

        let (messages, _) = provider.request(0);
        assert!(messages[0]
            .content
            .contains("CRITIC FEEDBACK FROM PREVIOUS PASS:\nmissed toxic indemnity clause"));
    }

    #[tokio::test]
    async fn test_unparseable_response_clears_previous_pass() {
        let provider = ScriptedProvider::new(vec![ONE_RISK, "not json at all"]);
        let auditor = RiskAuditor::new(provider.chain(), &playbook());
        let mut state = state_with_clause();
        let usage = UsageTracker::new();

        auditor.run(&mut state, &usage).await.unwrap();
        assert_eq!(state.risk_score(), 70);

        auditor.run(&mut state, &usage).await.unwrap();
        assert!(state.risks().is_empty());
        assert_eq!(state.risk_score(), 0);
        assert_eq!(usage.for_stage(Stage::Auditing).llm_calls, 2);
    }

    #[tokio::test]
    async fn test_runs_without_clauses() {
        let provider = ScriptedProvider::new(vec![r#"{"risks": [], "risk_score": 0}"#]);
        let auditor = RiskAuditor::new(provider.chain(), &RiskPlaybook::empty());
        let mut state = PipelineState::new("");

        auditor.run(&mut state, &UsageTracker::new()).await.unwrap();
        assert_eq!(provider.call_count(), 1);
        assert!(state.risks().is_empty());
    }
}
