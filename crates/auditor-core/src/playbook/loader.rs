//! Playbook parsing from YAML/JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::schema::validate_playbook_schema;
use crate::types::RiskLevel;

/// Errors that can occur when loading a playbook.
#[derive(Error, Debug)]
pub enum PlaybookError {
    #[error("Failed to read playbook file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Playbook failed schema validation: {}", .0.join("; "))]
    SchemaError(Vec<String>),
}

/// One risk category with its toxic-language patterns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskCategory {
    /// Category name, normally one of the clause types
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Default severity for risks in this category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<RiskLevel>,

    /// Phrases that mark a clause as toxic
    #[serde(default)]
    pub toxic_patterns: Vec<String>,

    /// Protections a balanced clause should contain
    #[serde(default)]
    pub required_protections: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_language: Option<String>,

    /// Fields this crate does not model, kept so prompts see the whole document
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

/// Reference data used to evaluate clauses.
///
/// Loaded once at startup and shared read-only across audits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RiskPlaybook {
    #[serde(default)]
    pub risk_categories: Vec<RiskCategory>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

/// Outcome of a lenient playbook load.
#[derive(Debug, Clone)]
pub struct PlaybookLoad {
    pub playbook: RiskPlaybook,

    /// Why the empty playbook was used instead, if it was
    pub degraded: Option<String>,
}

impl PlaybookLoad {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

impl RiskPlaybook {
    /// A playbook with no categories.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a playbook from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, PlaybookError> {
        let value: JsonValue = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a playbook from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, PlaybookError> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse a playbook file; `.yaml`/`.yml` are read as YAML, anything else as JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PlaybookError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);

        if is_yaml {
            Self::from_yaml(&contents)
        } else {
            Self::from_json(&contents)
        }
    }

    /// Load a playbook, degrading to [`RiskPlaybook::empty`] on any failure.
    ///
    /// A missing or malformed playbook never aborts an audit.
    pub fn load_or_empty(path: impl AsRef<Path>) -> PlaybookLoad {
        let path = path.as_ref();
        match Self::from_file(path) {
            Ok(playbook) => {
                tracing::info!(
                    path = %path.display(),
                    categories = playbook.risk_categories.len(),
                    "Loaded risk playbook"
                );
                PlaybookLoad {
                    playbook,
                    degraded: None,
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to load risk playbook, continuing with empty playbook"
                );
                PlaybookLoad {
                    playbook: Self::empty(),
                    degraded: Some(e.to_string()),
                }
            }
        }
    }

    fn from_value(value: JsonValue) -> Result<Self, PlaybookError> {
        validate_playbook_schema(&value).map_err(PlaybookError::SchemaError)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Look up a category by name, ignoring case.
    pub fn category(&self, name: &str) -> Option<&RiskCategory> {
        self.risk_categories
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Total number of toxic patterns across categories.
    pub fn pattern_count(&self) -> usize {
        self.risk_categories
            .iter()
            .map(|c| c.toxic_patterns.len())
            .sum()
    }

    /// Pretty JSON rendering embedded verbatim in auditor prompts.
    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string_pretty(self)
            .unwrap_or_else(|_| "{\n  \"risk_categories\": []\n}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID_PLAYBOOK: &str = r#"{
        "risk_categories": [
            {
                "name": "Indemnity",
                "severity": "High",
                "toxic_patterns": ["any and all losses", "regardless of fault"],
                "review_owner": "legal"
            },
            {
                "name": "Termination",
                "toxic_patterns": ["without notice"]
            }
        ]
    }"#;

    fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "auditor-core-playbook-{}-{}",
            std::process::id(),
            name
        ));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_parse_valid_playbook() {
        let playbook = RiskPlaybook::from_json(VALID_PLAYBOOK).unwrap();
        assert_eq!(playbook.risk_categories.len(), 2);
        assert_eq!(playbook.pattern_count(), 3);

        let indemnity = playbook.category("indemnity").unwrap();
        assert_eq!(indemnity.severity, Some(RiskLevel::High));
        assert_eq!(indemnity.extra["review_owner"], "legal");
    }

    #[test]
    fn test_parse_yaml_playbook() {
        let yaml = r#"
risk_categories:
  - name: Governing Law
    toxic_patterns:
      - exclusive jurisdiction of the courts of
"#;
        let playbook = RiskPlaybook::from_yaml(yaml).unwrap();
        assert_eq!(playbook.risk_categories[0].name, "Governing Law");
    }

    #[test]
    fn test_schema_violation_is_rejected() {
        let result = RiskPlaybook::from_json(r#"{"risk_categories": [{"severity": "High"}]}"#);
        assert!(matches!(result, Err(PlaybookError::SchemaError(_))));
    }

    #[test]
    fn test_prompt_json_keeps_extra_fields() {
        let playbook = RiskPlaybook::from_json(VALID_PLAYBOOK).unwrap();
        let rendered = playbook.to_prompt_json();
        assert!(rendered.contains("review_owner"));
        assert!(rendered.contains("any and all losses"));
    }

    #[test]
    fn test_load_from_file() {
        let path = temp_file("playbook.json", VALID_PLAYBOOK);
        let load = RiskPlaybook::load_or_empty(&path);
        assert!(!load.is_degraded());
        assert_eq!(load.playbook.risk_categories.len(), 2);
    }

    #[test]
    fn test_missing_file_degrades_to_empty() {
        let load = RiskPlaybook::load_or_empty("/nonexistent/risk_standards.json");
        assert!(load.is_degraded());
        assert!(load.playbook.risk_categories.is_empty());
    }

    #[test]
    fn test_malformed_file_degrades_to_empty() {
        let path = temp_file("broken.json", "{ risk_categories: [");
        let load = RiskPlaybook::load_or_empty(&path);
        assert!(load.is_degraded());
        assert_eq!(load.playbook, RiskPlaybook::empty());
    }

    #[test]
    fn test_empty_playbook_prompt_json() {
        let rendered = RiskPlaybook::empty().to_prompt_json();
        let value: JsonValue = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["risk_categories"], serde_json::json!([]));
    }
}
