//! # auditor-core
//!
//! Deterministic building blocks of the contract risk audit pipeline.
//!
//! Nothing in this crate talks to a model. It owns:
//! - the [`PipelineState`] record and its invariants
//! - the [`Stage`] machine and the pure [`next_stage`] transition
//! - structured-output parsing of LLM responses ([`parser`], [`payload`])
//! - the risk [`playbook`] and its toxic-language [`screening`]
//! - [`report`] rendering
//!
//! ## Key Guarantees
//!
//! 1. **Bounded**: the stage machine reaches reporting within
//!    [`MAX_AUDITOR_PASSES`] auditor passes for any critic behaviour
//! 2. **Total**: malformed model output is a [`ParseError`], never a panic
//! 3. **Replace, not merge**: each audit pass overwrites the previous findings
//!
//! ## Example
//!
//! ```rust
//! use auditor_core::{next_stage, CritiquePayload, PipelineState, Stage};
//!
//! let mut state = PipelineState::new("This Agreement is governed by ...");
//! let critique = CritiquePayload::from_response(
//!     "```json\n{\"critic_approved\": false, \"feedback\": \"check indemnity\"}\n```",
//! ).unwrap();
//! state.record_critique(critique.approved, critique.feedback);
//!
//! assert_eq!(next_stage(state.critic_approved(), state.loop_count(), 2), Stage::Auditing);
//! ```

pub mod parser;
pub mod payload;
pub mod playbook;
pub mod report;
pub mod screening;
pub mod stage;
pub mod types;

// Re-export main types at crate root
pub use parser::{extract_payload, parse_as, parse_value, ParseError};
pub use payload::{AuditPayload, CritiquePayload, ExtractionPayload};
pub use playbook::{PlaybookError, PlaybookLoad, RiskCategory, RiskPlaybook};
pub use report::{score_band, MarkdownReportRenderer, ReportRenderer};
pub use screening::{ScreenHit, ToxicScreen};
pub use stage::{next_stage, Stage, DEFAULT_MAX_CRITIC_PASSES, MAX_AUDITOR_PASSES};
pub use types::{AuditResult, Clause, ClauseType, PipelineState, RiskFinding, RiskLevel, StateError};
