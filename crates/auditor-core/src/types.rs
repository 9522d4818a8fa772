//! Data model shared by every pipeline stage.
//!
//! [`PipelineState`] is the single record threaded through extraction,
//! auditing, critique and reporting. Its fields are private so that the
//! invariants hold by construction:
//! - `document_text` has no setter
//! - `risks` can only be replaced wholesale, never appended to
//! - `loop_count` can only move forward, one step per critique
//! - `report` is written at most once

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a stage violates a state invariant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Report has already been written for this audit")]
    ReportAlreadySet,

    #[error("Report has not been written yet")]
    ReportMissing,
}

/// The five clause categories the extractor recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ClauseType {
    Indemnity,
    Termination,
    GoverningLaw,
    LimitationOfLiability,
    IntellectualProperty,
}

impl ClauseType {
    /// All clause types, in prompt order.
    pub const ALL: [ClauseType; 5] = [
        ClauseType::Indemnity,
        ClauseType::Termination,
        ClauseType::GoverningLaw,
        ClauseType::LimitationOfLiability,
        ClauseType::IntellectualProperty,
    ];

    /// Human-readable label, as used in prompts and reports.
    pub fn label(&self) -> &'static str {
        match self {
            ClauseType::Indemnity => "Indemnity",
            ClauseType::Termination => "Termination",
            ClauseType::GoverningLaw => "Governing Law",
            ClauseType::LimitationOfLiability => "Limitation of Liability",
            ClauseType::IntellectualProperty => "Intellectual Property",
        }
    }
}

impl fmt::Display for ClauseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ClauseType {
    type Err = String;

    /// Accepts "Governing Law", "governing_law", "GoverningLaw", "governing-law".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match key.as_str() {
            "indemnity" | "indemnification" => Ok(ClauseType::Indemnity),
            "termination" => Ok(ClauseType::Termination),
            "governinglaw" => Ok(ClauseType::GoverningLaw),
            "limitationofliability" => Ok(ClauseType::LimitationOfLiability),
            "intellectualproperty" => Ok(ClauseType::IntellectualProperty),
            _ => Err(format!("Unknown clause type: '{}'", s)),
        }
    }
}

impl TryFrom<String> for ClauseType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClauseType> for String {
    fn from(value: ClauseType) -> Self {
        value.label().to_string()
    }
}

/// A structured excerpt of contract text tagged with a legal category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    /// Category of the clause
    #[serde(rename = "type")]
    pub clause_type: ClauseType,

    /// Verbatim clause text
    pub text: String,

    /// Section number or title, when the document has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

impl Clause {
    pub fn new(clause_type: ClauseType, text: impl Into<String>) -> Self {
        Self {
            clause_type,
            text: text.into(),
            section: None,
        }
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }
}

/// Severity of a risk finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::High => "High",
            RiskLevel::Medium => "Medium",
            RiskLevel::Low => "Low",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for RiskLevel {
    /// Unrecognised levels are read as `Medium`.
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" | "critical" => RiskLevel::High,
            "medium" | "moderate" => RiskLevel::Medium,
            "low" => RiskLevel::Low,
            other => {
                tracing::warn!(risk_level = %other, "Unrecognised risk level, defaulting to Medium");
                RiskLevel::Medium
            }
        }
    }
}

impl From<RiskLevel> for String {
    fn from(value: RiskLevel) -> Self {
        value.as_str().to_string()
    }
}

/// One identified issue tied to a clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFinding {
    /// Category of the clause the risk belongs to
    #[serde(default)]
    pub clause_type: String,

    pub risk_level: RiskLevel,

    #[serde(default)]
    pub issue: String,

    /// The problematic phrase, quoted from the clause
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toxic_language: Option<String>,

    /// A balanced replacement clause
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_alternative: Option<String>,

    #[serde(default)]
    pub recommendation: String,
}

/// The record threaded through every pipeline stage.
///
/// One instance per audit job. Created with empty collections and zeroed
/// counters, mutated in place by each stage, read-only once the report is
/// written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineState {
    document_text: String,
    clauses: Vec<Clause>,
    risks: Vec<RiskFinding>,
    risk_score: u8,
    critic_approved: bool,
    critic_feedback: Option<String>,
    loop_count: u32,
    report: Option<String>,
}

impl PipelineState {
    /// Start a new audit over `document_text`.
    pub fn new(document_text: impl Into<String>) -> Self {
        Self {
            document_text: document_text.into(),
            clauses: Vec::new(),
            risks: Vec::new(),
            risk_score: 0,
            critic_approved: false,
            critic_feedback: None,
            loop_count: 0,
            report: None,
        }
    }

    pub fn document_text(&self) -> &str {
        &self.document_text
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn risks(&self) -> &[RiskFinding] {
        &self.risks
    }

    pub fn risk_score(&self) -> u8 {
        self.risk_score
    }

    pub fn critic_approved(&self) -> bool {
        self.critic_approved
    }

    pub fn critic_feedback(&self) -> Option<&str> {
        self.critic_feedback.as_deref()
    }

    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    pub fn report(&self) -> Option<&str> {
        self.report.as_deref()
    }

    /// Store the extractor's clauses.
    pub fn set_clauses(&mut self, clauses: Vec<Clause>) {
        self.clauses = clauses;
    }

    /// Replace the previous audit pass with a fresh one.
    ///
    /// Findings are never merged across passes. Scores above 100 are clamped.
    pub fn replace_audit(&mut self, risks: Vec<RiskFinding>, risk_score: u8) {
        self.risks = risks;
        self.risk_score = risk_score.min(100);
    }

    /// Record one critic pass. Always advances `loop_count` by exactly one.
    ///
    /// Feedback is dropped when the audit is approved, and blank feedback is
    /// stored as `None`.
    pub fn record_critique(&mut self, approved: bool, feedback: Option<String>) {
        self.critic_approved = approved;
        self.critic_feedback = if approved {
            None
        } else {
            feedback.filter(|f| !f.trim().is_empty())
        };
        self.loop_count += 1;
    }

    /// Write the final report. A second write is an internal error.
    pub fn set_report(&mut self, report: String) -> Result<(), StateError> {
        if self.report.is_some() {
            return Err(StateError::ReportAlreadySet);
        }
        self.report = Some(report);
        Ok(())
    }

    /// Build the caller-facing result from a finished state.
    pub fn to_result(&self) -> Result<AuditResult, StateError> {
        let report = self.report.clone().ok_or(StateError::ReportMissing)?;
        Ok(AuditResult {
            risk_score: self.risk_score,
            report,
            risks: self.risks.clone(),
            clauses: self.clauses.clone(),
            critic_approved: self.critic_approved,
            loop_count: self.loop_count,
        })
    }
}

/// Result delivered to the caller of a completed audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    pub risk_score: u8,
    pub report: String,
    pub risks: Vec<RiskFinding>,
    pub clauses: Vec<Clause>,
    pub critic_approved: bool,
    pub loop_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clause_type_spellings() {
        assert_eq!("Governing Law".parse::<ClauseType>(), Ok(ClauseType::GoverningLaw));
        assert_eq!("governing_law".parse::<ClauseType>(), Ok(ClauseType::GoverningLaw));
        assert_eq!("GoverningLaw".parse::<ClauseType>(), Ok(ClauseType::GoverningLaw));
        assert_eq!(
            "LIMITATION-OF-LIABILITY".parse::<ClauseType>(),
            Ok(ClauseType::LimitationOfLiability)
        );
        assert!("Force Majeure".parse::<ClauseType>().is_err());
    }

    #[test]
    fn test_clause_serializes_with_label() {
        let clause = Clause::new(ClauseType::IntellectualProperty, "All IP vests in Client.")
            .with_section("7.1");
        let json = serde_json::to_value(&clause).unwrap();
        assert_eq!(json["type"], "Intellectual Property");
        assert_eq!(json["section"], "7.1");

        let back: Clause = serde_json::from_value(json).unwrap();
        assert_eq!(back, clause);
    }

    #[test]
    fn test_risk_level_lenient() {
        let finding: RiskFinding = serde_json::from_value(serde_json::json!({
            "clause_type": "Indemnity",
            "risk_level": "HIGH",
            "issue": "Uncapped",
            "recommendation": "Cap it"
        }))
        .unwrap();
        assert_eq!(finding.risk_level, RiskLevel::High);
        assert!(finding.toxic_language.is_none());

        assert_eq!(RiskLevel::from("severe".to_string()), RiskLevel::Medium);
    }

    #[test]
    fn test_new_state_is_empty() {
        let state = PipelineState::new("contract");
        assert_eq!(state.document_text(), "contract");
        assert!(state.clauses().is_empty());
        assert!(state.risks().is_empty());
        assert_eq!(state.risk_score(), 0);
        assert!(!state.critic_approved());
        assert!(state.critic_feedback().is_none());
        assert_eq!(state.loop_count(), 0);
        assert!(state.report().is_none());
    }

    #[test]
    fn test_replace_audit_does_not_merge() {
        let mut state = PipelineState::new("x");
        let finding = |issue: &str| RiskFinding {
            clause_type: "Indemnity".to_string(),
            risk_level: RiskLevel::High,
            issue: issue.to_string(),
            toxic_language: None,
            suggested_alternative: None,
            recommendation: String::new(),
        };

        state.replace_audit(vec![finding("a")], 70);
        state.replace_audit(vec![finding("b"), finding("c")], 250);

        assert_eq!(state.risks().len(), 2);
        assert_eq!(state.risks()[0].issue, "b");
        assert_eq!(state.risk_score(), 100);
    }

    #[test]
    fn test_record_critique_counts_and_clears_feedback() {
        let mut state = PipelineState::new("x");

        state.record_critique(false, Some("missed toxic indemnity clause".to_string()));
        assert_eq!(state.loop_count(), 1);
        assert_eq!(state.critic_feedback(), Some("missed toxic indemnity clause"));

        state.record_critique(true, Some("Looks good".to_string()));
        assert_eq!(state.loop_count(), 2);
        assert!(state.critic_approved());
        assert!(state.critic_feedback().is_none());

        state.record_critique(false, Some("   ".to_string()));
        assert!(state.critic_feedback().is_none());
    }

    #[test]
    fn test_report_written_once() {
        let mut state = PipelineState::new("x");
        assert_eq!(state.to_result(), Err(StateError::ReportMissing));

        state.set_report("# Report".to_string()).unwrap();
        assert_eq!(
            state.set_report("again".to_string()),
            Err(StateError::ReportAlreadySet)
        );
        assert_eq!(state.report(), Some("# Report"));
        assert_eq!(state.to_result().unwrap().report, "# Report");
    }
}
