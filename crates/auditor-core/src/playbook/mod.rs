//! Risk playbook loading and validation.
//!
//! A playbook is structured reference data (risk categories and toxic
//! phrases) validated against an embedded JSON Schema. Loading is lenient:
//! a missing or malformed playbook degrades to an empty one.

mod loader;
mod schema;

pub use loader::{PlaybookError, PlaybookLoad, RiskCategory, RiskPlaybook};
pub use schema::validate_playbook_schema;
