//! Deterministic toxic-language pre-screen.
//!
//! Runs the playbook's `toxic_patterns` over extracted clause text before the
//! auditor is called. Hits are handed to the auditor prompt as hints; the
//! screen never produces findings on its own.

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::playbook::RiskPlaybook;
use crate::types::Clause;

/// One playbook phrase found in one clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScreenHit {
    /// Index into the clause list that was scanned
    pub clause_index: usize,
    pub category: String,
    pub pattern: String,
    /// The text as it appears in the clause
    pub matched: String,
}

struct CompiledPattern {
    category: String,
    pattern: String,
    regex: Regex,
}

/// Compiled phrase matchers for one playbook.
pub struct ToxicScreen {
    patterns: Vec<CompiledPattern>,
}

impl ToxicScreen {
    /// Compile every toxic pattern in the playbook.
    ///
    /// Patterns are literal phrases: case-insensitive, with any run of
    /// whitespace between words. Blank patterns are skipped.
    pub fn from_playbook(playbook: &RiskPlaybook) -> Self {
        let mut patterns = Vec::new();

        for category in &playbook.risk_categories {
            for pattern in &category.toxic_patterns {
                let Some(regex) = compile_phrase(pattern) else {
                    continue;
                };
                patterns.push(CompiledPattern {
                    category: category.name.clone(),
                    pattern: pattern.clone(),
                    regex,
                });
            }
        }

        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Scan clauses, returning at most one hit per (clause, pattern) pair.
    pub fn scan(&self, clauses: &[Clause]) -> Vec<ScreenHit> {
        let mut hits = Vec::new();

        for (clause_index, clause) in clauses.iter().enumerate() {
            for compiled in &self.patterns {
                if let Some(m) = compiled.regex.find(&clause.text) {
                    hits.push(ScreenHit {
                        clause_index,
                        category: compiled.category.clone(),
                        pattern: compiled.pattern.clone(),
                        matched: m.as_str().to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            clauses = clauses.len(),
            patterns = self.patterns.len(),
            hits = hits.len(),
            "Toxic-language pre-screen complete"
        );
        hits
    }
}

fn compile_phrase(phrase: &str) -> Option<Regex> {
    let words: Vec<String> = phrase.split_whitespace().map(regex::escape).collect();
    if words.is_empty() {
        return None;
    }

    match RegexBuilder::new(&words.join(r"\s+"))
        .case_insensitive(true)
        .build()
    {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::warn!(pattern = %phrase, error = %e, "Skipping uncompilable toxic pattern");
            None
        }
    }
}
