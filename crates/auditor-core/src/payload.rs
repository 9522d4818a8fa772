//! Typed readings of each stage's LLM response.
//!
//! These sit on top of [`crate::parser`] and apply the per-stage leniency
//! rules: malformed items inside an otherwise valid list are dropped, scores
//! are clamped, and missing fields take their documented defaults. A
//! [`ParseError`] is returned only when the response as a whole cannot be
//! trusted; the calling agent then falls back to its safe default.

use serde_json::{Map, Value};

use crate::parser::{json_kind, parse_object, parse_value, ParseError};
use crate::types::{Clause, RiskFinding};

/// Clauses read from an extractor response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractionPayload {
    pub clauses: Vec<Clause>,

    /// Entries that were present but could not be read as clauses
    pub dropped: usize,
}

impl ExtractionPayload {
    /// Read a list of clauses. Also accepts `{"clauses": [...]}`.
    pub fn from_response(text: &str) -> Result<Self, ParseError> {
        let items = match parse_value(text)? {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("clauses") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(ParseError::UnexpectedShape {
                        expected: "list of clauses",
                        found: "object",
                    })
                }
            },
            other => {
                return Err(ParseError::UnexpectedShape {
                    expected: "list of clauses",
                    found: json_kind(&other),
                })
            }
        };

        let mut payload = Self::default();
        for item in items {
            match serde_json::from_value::<Clause>(item) {
                Ok(clause) => payload.clauses.push(clause),
                Err(e) => {
                    payload.dropped += 1;
                    tracing::warn!(error = %e, "Dropping malformed clause from extractor response");
                }
            }
        }
        Ok(payload)
    }
}

/// Findings and score read from an auditor response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuditPayload {
    pub risks: Vec<RiskFinding>,
    pub risk_score: u8,
    pub dropped: usize,
}

impl AuditPayload {
    /// Read `{"risks": [...], "risk_score": n}`.
    ///
    /// A missing `risks` key reads as no findings and a missing score as 0.
    pub fn from_response(text: &str) -> Result<Self, ParseError> {
        let map = parse_object(text)?;

        let items = match map.get("risks") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(other) => {
                return Err(ParseError::UnexpectedShape {
                    expected: "list of risks",
                    found: json_kind(other),
                })
            }
        };

        let mut payload = Self {
            risk_score: read_score(&map),
            ..Self::default()
        };

        for item in items {
            match serde_json::from_value::<RiskFinding>(item) {
                Ok(finding) => payload.risks.push(finding),
                Err(e) => {
                    payload.dropped += 1;
                    tracing::warn!(error = %e, "Dropping malformed risk from auditor response");
                }
            }
        }
        Ok(payload)
    }
}

fn read_score(map: &Map<String, Value>) -> u8 {
    let raw = match map.get("risk_score") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match raw {
        Some(score) if score.is_finite() => score.round().clamp(0.0, 100.0) as u8,
        Some(_) | None => {
            if map.contains_key("risk_score") {
                tracing::warn!("Unreadable risk_score in auditor response, using 0");
            }
            0
        }
    }
}

/// Verdict read from a critic response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CritiquePayload {
    pub approved: bool,
    pub feedback: Option<String>,
}

impl CritiquePayload {
    /// Read `{"critic_approved": bool, "feedback": "..."}`.
    ///
    /// A missing verdict reads as not approved. A verdict that is present but
    /// not a boolean makes the whole response unreadable.
    pub fn from_response(text: &str) -> Result<Self, ParseError> {
        let map = parse_object(text)?;

        let approved = match map.get("critic_approved") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Err(ParseError::UnexpectedShape {
                    expected: "boolean critic_approved",
                    found: json_kind(other),
                })
            }
        };

        let feedback = map
            .get("feedback")
            .or_else(|| map.get("critic_feedback"))
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self { approved, feedback })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClauseType, RiskLevel};

    #[test]
    fn test_extraction_list() {
        let text = r#"```json
[
  {"type": "Indemnity", "text": "Vendor shall indemnify Client for all losses.", "section": "9.1"},
  {"type": "Termination", "text": "Either party may terminate on 30 days notice."}
]
```"#;
        let payload = ExtractionPayload::from_response(text).unwrap();
        assert_eq!(payload.clauses.len(), 2);
        assert_eq!(payload.clauses[0].clause_type, ClauseType::Indemnity);
        assert_eq!(payload.clauses[0].section.as_deref(), Some("9.1"));
        assert_eq!(payload.clauses[1].section, None);
        assert_eq!(payload.dropped, 0);
    }

    #[test]
    fn test_extraction_wrapped_object() {
        let text = r#"{"clauses": [{"type": "Governing Law", "text": "Laws of Delaware."}]}"#;
        let payload = ExtractionPayload::from_response(text).unwrap();
        assert_eq!(payload.clauses[0].clause_type, ClauseType::GoverningLaw);
    }

    #[test]
    fn test_extraction_drops_unknown_types() {
        let text = r#"[
            {"type": "Force Majeure", "text": "Acts of God."},
            {"type": "Intellectual Property", "text": "IP vests in Client."},
            "not a clause"
        ]"#;
        let payload = ExtractionPayload::from_response(text).unwrap();
        assert_eq!(payload.clauses.len(), 1);
        assert_eq!(payload.dropped, 2);
    }

    #[test]
    fn test_extraction_rejects_scalar() {
        assert!(matches!(
            ExtractionPayload::from_response("42"),
            Err(ParseError::UnexpectedShape { found: "number", .. })
        ));
    }

    #[test]
    fn test_audit_payload() {
        let text = r#"{"risks": [{
            "clause_type": "Indemnity",
            "risk_level": "High",
            "issue": "Unlimited one-way indemnity",
            "toxic_language": "any and all losses",
            "suggested_alternative": "Mutual indemnity capped at fees paid",
            "recommendation": "Negotiate a cap"
        }], "risk_score": 70}"#;
        let payload = AuditPayload::from_response(text).unwrap();
        assert_eq!(payload.risks.len(), 1);
        assert_eq!(payload.risks[0].risk_level, RiskLevel::High);
        assert_eq!(payload.risk_score, 70);
    }

    #[test]
    fn test_audit_score_coercion() {
        let score = |text: &str| AuditPayload::from_response(text).unwrap().risk_score;
        assert_eq!(score(r#"{"risks": [], "risk_score": 150}"#), 100);
        assert_eq!(score(r#"{"risks": [], "risk_score": -5}"#), 0);
        assert_eq!(score(r#"{"risks": [], "risk_score": 64.6}"#), 65);
        assert_eq!(score(r#"{"risks": [], "risk_score": "85"}"#), 85);
        assert_eq!(score(r#"{"risks": [], "risk_score": "high"}"#), 0);
        assert_eq!(score(r#"{"risks": []}"#), 0);
    }

    #[test]
    fn test_audit_missing_risks_is_empty() {
        let payload = AuditPayload::from_response(r#"{"risk_score": 10}"#).unwrap();
        assert!(payload.risks.is_empty());
        assert_eq!(payload.risk_score, 10);
    }

    #[test]
    fn test_audit_rejects_non_list_risks() {
        assert!(AuditPayload::from_response(r#"{"risks": "none", "risk_score": 10}"#).is_err());
        assert!(AuditPayload::from_response("[]").is_err());
    }

    #[test]
    fn test_critique_payload() {
        let approved =
            CritiquePayload::from_response(r#"{"critic_approved": true, "feedback": "Looks good"}"#)
                .unwrap();
        assert!(approved.approved);
        assert_eq!(approved.feedback.as_deref(), Some("Looks good"));

        let rejected = CritiquePayload::from_response(
            "```json\n{\"critic_approved\": false, \"feedback\": \"missed toxic indemnity clause\"}\n```",
        )
        .unwrap();
        assert!(!rejected.approved);
        assert_eq!(rejected.feedback.as_deref(), Some("missed toxic indemnity clause"));
    }

    #[test]
    fn test_critique_missing_verdict_is_rejection() {
        let payload = CritiquePayload::from_response(r#"{"feedback": "Fix severity"}"#).unwrap();
        assert!(!payload.approved);
    }

    #[test]
    fn test_critique_non_boolean_verdict_is_unreadable() {
        assert!(CritiquePayload::from_response(r#"{"critic_approved": "yes"}"#).is_err());
    }
}
