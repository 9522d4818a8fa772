//! The three LLM-backed pipeline agents.
//!
//! Each agent owns one stage, makes at most one gateway call per run and
//! degrades malformed model output to a safe default instead of failing.

mod auditor;
mod critic;
mod extractor;
mod traits;

pub use auditor::RiskAuditor;
pub use critic::AuditCritic;
pub use extractor::ClauseExtractor;
pub use traits::{AgentError, StageAgent};
