//! The audit pipeline as a finite state machine.
//!
//! ```text
//! Extracting -> Auditing -> Critiquing -+-> Reporting -> Done
//!                   ^                   |
//!                   +-------------------+   (rejected, under the cap)
//! ```
//!
//! The only decision point is after a critique. It depends on the critic's
//! verdict and the loop counter alone, so it is a pure function and can be
//! tested without any model in the loop.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::PipelineState;

/// Critic passes after which the pipeline reports even without approval.
pub const DEFAULT_MAX_CRITIC_PASSES: u32 = 2;

/// Upper bound on auditor passes for any critic behaviour.
pub const MAX_AUDITOR_PASSES: u32 = 3;

/// A pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Extracting,
    Auditing,
    Critiquing,
    Reporting,
    Done,
}

impl Stage {
    /// Stable name used in status events.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Extracting => "extract_clauses",
            Stage::Auditing => "audit_risks",
            Stage::Critiquing => "critique_audit",
            Stage::Reporting => "generate_report",
            Stage::Done => "done",
        }
    }

    /// Job progress once this stage has completed.
    pub fn progress_percent(&self) -> u8 {
        match self {
            Stage::Extracting => 25,
            Stage::Auditing => 50,
            Stage::Critiquing => 75,
            Stage::Reporting => 95,
            Stage::Done => 100,
        }
    }

    /// The stage that follows this one, given the state it left behind.
    ///
    /// Returns `None` after [`Stage::Done`].
    pub fn after(&self, state: &PipelineState, max_critic_passes: u32) -> Option<Stage> {
        match self {
            Stage::Extracting => Some(Stage::Auditing),
            Stage::Auditing => Some(Stage::Critiquing),
            Stage::Critiquing => Some(next_stage(
                state.critic_approved(),
                state.loop_count(),
                max_critic_passes,
            )),
            Stage::Reporting => Some(Stage::Done),
            Stage::Done => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decide where to go after a critique.
///
/// Reports when the critic approved or the loop cap is reached; otherwise
/// loops back to the auditor. The cap applies whatever the critic says.
pub fn next_stage(critic_approved: bool, loop_count: u32, max_critic_passes: u32) -> Stage {
    if critic_approved || loop_count >= max_critic_passes {
        Stage::Reporting
    } else {
        Stage::Auditing
    }
}
