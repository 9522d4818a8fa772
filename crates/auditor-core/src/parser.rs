//! Structured-output parsing for LLM responses.
//!
//! Models are asked to answer with a single JSON value but routinely wrap it
//! in markdown fences or surround it with prose. This module finds the
//! payload and decodes it, returning a [`ParseError`] instead of panicking
//! when the response cannot be read. Callers decide the safe default.
//!
//! Lookup order:
//! 1. a fence tagged `json` (any case)
//! 2. the first fence of any kind
//! 3. the raw response text

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Longest response excerpt carried in a [`ParseError`].
pub const EXCERPT_CHARS: usize = 200;

lazy_static! {
    /// A fenced block: opening marker, optional language tag, body, and a
    /// closing marker (or end of input for an unterminated fence).
    static ref FENCED_BLOCK: Regex = Regex::new(
        r"(?s)```[ \t]*(?P<lang>[A-Za-z0-9_+.-]*)[ \t]*\r?\n?(?P<body>.*?)(?:```|\z)"
    ).unwrap();
}

/// Errors from structured-output parsing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Response was empty")]
    Empty,

    #[error("Response is not valid JSON: {reason} (excerpt: {excerpt:?})")]
    Unparseable { reason: String, excerpt: String },

    #[error("Expected {expected}, found {found}")]
    UnexpectedShape {
        expected: &'static str,
        found: &'static str,
    },
}

/// Locate the JSON payload inside a response.
///
/// Returns the trimmed interior of the preferred fence, or the trimmed
/// response when it has no fence at all.
pub fn extract_payload(text: &str) -> &str {
    let mut first_fence: Option<&str> = None;

    for caps in FENCED_BLOCK.captures_iter(text) {
        let body = caps.name("body").map(|m| m.as_str()).unwrap_or_default();
        let lang = caps.name("lang").map(|m| m.as_str()).unwrap_or_default();

        if lang.eq_ignore_ascii_case("json") {
            return body.trim();
        }
        if first_fence.is_none() {
            first_fence = Some(body);
        }
    }

    first_fence.unwrap_or(text).trim()
}

/// Decode the JSON payload of a response.
pub fn parse_value(text: &str) -> Result<Value, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let payload = extract_payload(text);
    if payload.is_empty() {
        return Err(ParseError::Empty);
    }

    serde_json::from_str(payload).map_err(|e| ParseError::Unparseable {
        reason: e.to_string(),
        excerpt: excerpt(payload),
    })
}

/// Decode the payload of a response into a typed value.
pub fn parse_as<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    let value = parse_value(text)?;
    serde_json::from_value(value).map_err(|e| ParseError::Unparseable {
        reason: e.to_string(),
        excerpt: excerpt(extract_payload(text)),
    })
}

/// Decode a response that must be a JSON object.
pub fn parse_object(text: &str) -> Result<serde_json::Map<String, Value>, ParseError> {
    match parse_value(text)? {
        Value::Object(map) => Ok(map),
        other => Err(ParseError::UnexpectedShape {
            expected: "object",
            found: json_kind(&other),
        }),
    }
}

/// Decode a response that must be a JSON list.
pub fn parse_list(text: &str) -> Result<Vec<Value>, ParseError> {
    match parse_value(text)? {
        Value::Array(items) => Ok(items),
        other => Err(ParseError::UnexpectedShape {
            expected: "list",
            found: json_kind(&other),
        }),
    }
}

/// Name of a JSON value's kind, for error messages.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Truncate to [`EXCERPT_CHARS`] on a character boundary.
fn excerpt(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_plain_json() {
        let value = parse_value(r#"{"risk_score": 85}"#).unwrap();
        assert_eq!(value, json!({"risk_score": 85}));
    }

    #[test]
    fn test_json_tagged_fence() {
        let text = "Here is the audit:\n```json\n{\"risks\": [], \"risk_score\": 0}\n```\nDone.";
        assert_eq!(parse_value(text).unwrap(), json!({"risks": [], "risk_score": 0}));
    }

    #[test]
    fn test_untagged_fence() {
        let text = "```\n[{\"type\": \"Indemnity\"}]\n```";
        assert_eq!(parse_value(text).unwrap(), json!([{"type": "Indemnity"}]));
    }

    #[test]
    fn test_json_fence_preferred_over_earlier_fence() {
        let text = "```text\nnot json\n```\n\n```JSON\n{\"ok\": true}\n```";
        assert_eq!(extract_payload(text), "{\"ok\": true}");
    }

    #[test]
    fn test_other_language_fence_used_when_no_json_fence() {
        let text = "```javascript\n{\"ok\": true}\n```";
        assert_eq!(parse_value(text).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn test_inline_fence() {
        assert_eq!(extract_payload("```{\"a\": 1}```"), "{\"a\": 1}");
    }

    #[test]
    fn test_unterminated_fence() {
        let text = "```json\n{\"critic_approved\": true}";
        assert_eq!(parse_value(text).unwrap(), json!({"critic_approved": true}));
    }

    #[test]
    fn test_empty_response() {
        assert_eq!(parse_value(""), Err(ParseError::Empty));
        assert_eq!(parse_value("   \n"), Err(ParseError::Empty));
        assert_eq!(parse_value("```json\n```"), Err(ParseError::Empty));
    }

    #[test]
    fn test_truncated_json_is_unparseable() {
        let result = parse_value(r#"{"risks": [{"clause_type": "Indemnity""#);
        assert!(matches!(result, Err(ParseError::Unparseable { .. })));
    }

    #[test]
    fn test_prose_is_unparseable() {
        let result = parse_value("I could not find any clauses in this document.");
        assert!(matches!(result, Err(ParseError::Unparseable { .. })));
    }

    #[test]
    fn test_unfenced_json_inside_prose_is_not_scanned_for() {
        let result = parse_value(r#"Here you go: {"is_approved": true} Hope that helps."#);
        assert!(matches!(result, Err(ParseError::Unparseable { .. })));
    }

    #[test]
    fn test_excerpt_is_truncated() {
        let long = "x".repeat(1000);
        match parse_value(&long) {
            Err(ParseError::Unparseable { excerpt, .. }) => {
                assert_eq!(excerpt.chars().count(), EXCERPT_CHARS + 3);
            }
            other => panic!("Expected Unparseable, got {:?}", other),
        }
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let text = "é".repeat(300);
        assert!(matches!(parse_value(&text), Err(ParseError::Unparseable { .. })));
    }

    #[test]
    fn test_shape_helpers() {
        assert!(parse_object(r#"{"a": 1}"#).is_ok());
        assert_eq!(
            parse_object("[1, 2]"),
            Err(ParseError::UnexpectedShape {
                expected: "object",
                found: "list"
            })
        );
        assert_eq!(parse_list("[1, 2]").unwrap().len(), 2);
        assert!(matches!(
            parse_list("\"text\""),
            Err(ParseError::UnexpectedShape { found: "string", .. })
        ));
    }

    #[test]
    fn test_parse_as_typed() {
        #[derive(serde::Deserialize)]
        struct Verdict {
            critic_approved: bool,
        }

        let verdict: Verdict = parse_as("```json\n{\"critic_approved\": false}\n```").unwrap();
        assert!(!verdict.critic_approved);

        let wrong: Result<Verdict, _> = parse_as(r#"{"critic_approved": "maybe"}"#);
        assert!(matches!(wrong, Err(ParseError::Unparseable { .. })));
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-zA-Z0-9 ,.:]{0,16}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z_]{1,10}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    fn arb_object() -> impl Strategy<Value = Value> {
        prop::collection::btree_map("[a-z_]{1,10}", arb_json(), 0..6)
            .prop_map(|m| Value::Object(m.into_iter().collect()))
    }

    proptest! {
        #[test]
        fn prop_fenced_equals_unfenced(value in arb_object(), pretty in any::<bool>()) {
            let raw = if pretty {
                serde_json::to_string_pretty(&value).unwrap()
            } else {
                serde_json::to_string(&value).unwrap()
            };
            let direct: Value = serde_json::from_str(&raw).unwrap();

            let fenced = format!("Sure, here it is:\n```json\n{}\n```\n", raw);
            prop_assert_eq!(parse_value(&fenced).unwrap(), direct.clone());
            prop_assert_eq!(parse_value(&raw).unwrap(), direct);
        }

        #[test]
        fn prop_truncated_never_panics(value in arb_object(), cut in 0usize..64) {
            let raw = serde_json::to_string(&value).unwrap();
            let end = raw.len().saturating_sub(cut.max(1));
            let truncated = &raw[..end];
            // Any outcome is fine as long as it is a value or a typed error.
            match parse_value(truncated) {
                Ok(_) | Err(ParseError::Empty) | Err(ParseError::Unparseable { .. }) => {}
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }
        }
    }
}
