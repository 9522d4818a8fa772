//! Pipeline controller: drives one audit through the stage machine.
//!
//! ```text
//! Extracting -> Auditing -> Critiquing -+-> Reporting -> Done
//!                   ^                   |
//!                   +-------------------+
//! ```
//!
//! Stages run strictly in sequence. The loop-back decision is the pure
//! transition in [`auditor_core::Stage::after`], so termination never
//! depends on what the critic says. Cancellation is checked at every stage
//! boundary.

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

use auditor_core::{
    AuditResult, MarkdownReportRenderer, PipelineState, ReportRenderer, RiskPlaybook, Stage,
    StateError, DEFAULT_MAX_CRITIC_PASSES, MAX_AUDITOR_PASSES,
};

use crate::agents::{AgentError, AuditCritic, ClauseExtractor, RiskAuditor, StageAgent};
use crate::cache::ExtractionCache;
use crate::config::RuntimeConfig;
use crate::resilience::{GatewayError, LlmUsage, ProviderChain, UsageTracker};

/// Errors that end an audit without a report.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("{stage} failed: {source}")]
    Gateway {
        stage: Stage,
        #[source]
        source: GatewayError,
    },

    #[error("Internal error: {0}")]
    Internal(#[from] StateError),

    #[error("cancelled")]
    Cancelled,
}

impl From<AgentError> for PipelineError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Gateway { stage, source } => PipelineError::Gateway { stage, source },
        }
    }
}

/// Receives one callback per completed stage.
///
/// Called synchronously between stages; implementations should not block.
pub trait StageObserver: Send + Sync {
    fn stage_completed(&self, stage: Stage, state: &PipelineState);
}

impl<F> StageObserver for F
where
    F: Fn(Stage, &PipelineState) + Send + Sync,
{
    fn stage_completed(&self, stage: Stage, state: &PipelineState) {
        self(stage, state)
    }
}

struct NoopObserver;

impl StageObserver for NoopObserver {
    fn stage_completed(&self, _stage: Stage, _state: &PipelineState) {}
}

/// A finished audit.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub result: AuditResult,

    /// Final pipeline state, report included
    pub state: PipelineState,

    /// LLM usage across all stages
    pub usage: LlmUsage,

    pub usage_by_stage: BTreeMap<Stage, LlmUsage>,
}

/// Runs the extract, audit, critique and report stages for one document.
///
/// Shared across jobs: holds only read-only agents and the renderer. Each
/// run owns its own [`PipelineState`] and [`UsageTracker`].
pub struct PipelineController {
    extractor: Arc<dyn StageAgent>,
    auditor: Arc<dyn StageAgent>,
    critic: Arc<dyn StageAgent>,
    renderer: Arc<dyn ReportRenderer>,
    max_critic_passes: u32,
}

impl PipelineController {
    /// A controller with default temperatures and the markdown renderer.
    pub fn new(chain: Arc<ProviderChain>, playbook: &RiskPlaybook) -> Self {
        Self {
            extractor: Arc::new(ClauseExtractor::new(chain.clone())),
            auditor: Arc::new(RiskAuditor::new(chain.clone(), playbook)),
            critic: Arc::new(AuditCritic::new(chain)),
            renderer: Arc::new(MarkdownReportRenderer::new()),
            max_critic_passes: DEFAULT_MAX_CRITIC_PASSES,
        }
    }

    /// A controller with temperatures, loop cap and cache taken from `config`.
    pub fn from_config(
        config: &RuntimeConfig,
        chain: Arc<ProviderChain>,
        playbook: &RiskPlaybook,
    ) -> Self {
        let mut extractor =
            ClauseExtractor::new(chain.clone()).with_temperature(config.temperatures.extractor);
        if let Some(cache) = ExtractionCache::from_config(&config.cache) {
            extractor = extractor.with_cache(Arc::new(cache));
        }

        Self {
            extractor: Arc::new(extractor),
            auditor: Arc::new(
                RiskAuditor::new(chain.clone(), playbook)
                    .with_temperature(config.temperatures.auditor),
            ),
            critic: Arc::new(AuditCritic::new(chain).with_temperature(config.temperatures.critic)),
            renderer: Arc::new(MarkdownReportRenderer::new()),
            max_critic_passes: DEFAULT_MAX_CRITIC_PASSES,
        }
        .with_max_critic_passes(config.max_critic_passes)
    }

    pub fn with_extractor(mut self, agent: Arc<dyn StageAgent>) -> Self {
        self.extractor = agent;
        self
    }

    pub fn with_auditor(mut self, agent: Arc<dyn StageAgent>) -> Self {
        self.auditor = agent;
        self
    }

    pub fn with_critic(mut self, agent: Arc<dyn StageAgent>) -> Self {
        self.critic = agent;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ReportRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Critic passes before reporting without approval, clamped to `1..=3`.
    pub fn with_max_critic_passes(mut self, passes: u32) -> Self {
        self.max_critic_passes = passes.clamp(1, MAX_AUDITOR_PASSES);
        self
    }

    pub fn max_critic_passes(&self) -> u32 {
        self.max_critic_passes
    }

    /// Run an audit to completion.
    pub async fn run(&self, document_text: impl Into<String>) -> Result<PipelineOutcome, PipelineError> {
        self.run_with(document_text, &NoopObserver, None).await
    }

    /// Run an audit, reporting stage completions and honouring `cancel`.
    ///
    /// `cancel` is checked before each stage; once it reads `true` the run
    /// stops with [`PipelineError::Cancelled`].
    pub async fn run_with(
        &self,
        document_text: impl Into<String>,
        observer: &dyn StageObserver,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let mut state = PipelineState::new(document_text);
        let usage = UsageTracker::new();
        let mut stage = Stage::Extracting;

        while stage != Stage::Done {
            if cancel.map(|rx| *rx.borrow()).unwrap_or(false) {
                tracing::info!(stage = %stage, "Audit cancelled");
                return Err(PipelineError::Cancelled);
            }

            match stage {
                Stage::Extracting => self.extractor.run(&mut state, &usage).await?,
                Stage::Auditing => self.auditor.run(&mut state, &usage).await?,
                Stage::Critiquing => self.critic.run(&mut state, &usage).await?,
                Stage::Reporting => {
                    let report = self.renderer.render(&state);
                    state.set_report(report)?;
                }
                Stage::Done => break,
            }

            observer.stage_completed(stage, &state);

            let next = stage
                .after(&state, self.max_critic_passes)
                .unwrap_or(Stage::Done);
            tracing::debug!(from = %stage, to = %next, loop_count = state.loop_count(), "Stage transition");
            stage = next;
        }

        let result = state.to_result()?;
        tracing::info!(
            risk_score = result.risk_score,
            risks = result.risks.len(),
            critic_approved = result.critic_approved,
            loop_count = result.loop_count,
            "Audit complete"
        );

        Ok(PipelineOutcome {
            result,
            state,
            usage: usage.total(),
            usage_by_stage: usage.snapshot(),
        })
    }
}
