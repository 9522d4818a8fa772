//! Report rendering.
//!
//! The controller invokes the renderer exactly once per audit, with the
//! final state. Rendering is pure: the same state (and timestamp) always
//! produces the same text.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::types::{PipelineState, RiskFinding, RiskLevel};

/// Turns a finished pipeline state into report text.
pub trait ReportRenderer: Send + Sync {
    fn render(&self, state: &PipelineState) -> String;
}

/// Markdown report with a score summary, clause table and findings by severity.
#[derive(Debug, Clone, Default)]
pub struct MarkdownReportRenderer {
    generated_at: Option<DateTime<Utc>>,
}

impl MarkdownReportRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the timestamp printed in the header.
    pub fn with_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = Some(at);
        self
    }
}

/// Overall label for a 0..=100 score.
pub fn score_band(score: u8) -> RiskLevel {
    match score {
        70..=u8::MAX => RiskLevel::High,
        40..=69 => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}

impl ReportRenderer for MarkdownReportRenderer {
    fn render(&self, state: &PipelineState) -> String {
        MarkdownReport {
            state,
            generated_at: self.generated_at.unwrap_or_else(Utc::now),
        }
        .to_string()
    }
}

/// One rendered report, borrowed from the final state.
struct MarkdownReport<'a> {
    state: &'a PipelineState,
    generated_at: DateTime<Utc>,
}

impl fmt::Display for MarkdownReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_report(f, self.state, self.generated_at)
    }
}

fn write_report<W: fmt::Write>(
    out: &mut W,
    state: &PipelineState,
    generated_at: DateTime<Utc>,
) -> fmt::Result {
    writeln!(out, "# Contract Risk Audit Report")?;
    writeln!(out)?;
    writeln!(out, "_Generated {}_", generated_at.format("%Y-%m-%d %H:%M UTC"))?;
    writeln!(out)?;

    writeln!(out, "## Summary")?;
    writeln!(out)?;
    writeln!(
        out,
        "- **Risk score:** {}/100 ({})",
        state.risk_score(),
        score_band(state.risk_score())
    )?;
    writeln!(out, "- **Clauses reviewed:** {}", state.clauses().len())?;
    writeln!(
        out,
        "- **Findings:** {} ({} high, {} medium, {} low)",
        state.risks().len(),
        count(state.risks(), RiskLevel::High),
        count(state.risks(), RiskLevel::Medium),
        count(state.risks(), RiskLevel::Low),
    )?;
    writeln!(out)?;

    if !state.clauses().is_empty() {
        writeln!(out, "## Clauses")?;
        writeln!(out)?;
        writeln!(out, "| # | Type | Section | Excerpt |")?;
        writeln!(out, "|---|------|---------|---------|")?;
        for (i, clause) in state.clauses().iter().enumerate() {
            writeln!(
                out,
                "| {} | {} | {} | {} |",
                i + 1,
                clause.clause_type,
                clause.section.as_deref().unwrap_or("-"),
                table_cell(&clause.text, 80),
            )?;
        }
        writeln!(out)?;
    }

    writeln!(out, "## Findings")?;
    writeln!(out)?;
    if state.risks().is_empty() {
        writeln!(out, "No risks identified.")?;
        writeln!(out)?;
    } else {
        for level in [RiskLevel::High, RiskLevel::Medium, RiskLevel::Low] {
            let group: Vec<&RiskFinding> =
                state.risks().iter().filter(|r| r.risk_level == level).collect();
            if group.is_empty() {
                continue;
            }
            writeln!(out, "### {} Risk", level)?;
            writeln!(out)?;
            for finding in group {
                write_finding(out, finding)?;
            }
        }
    }

    writeln!(out, "## Review Status")?;
    writeln!(out)?;
    let passes = state.loop_count();
    if state.critic_approved() {
        writeln!(out, "Approved by quality review after {} pass(es).", passes)?;
    } else {
        writeln!(
            out,
            "Not approved by quality review after {} pass(es); findings may be incomplete.",
            passes
        )?;
        if let Some(feedback) = state.critic_feedback() {
            writeln!(out)?;
            writeln!(out, "> {}", feedback.replace('\n', "\n> "))?;
        }
    }

    Ok(())
}

fn count(risks: &[RiskFinding], level: RiskLevel) -> usize {
    risks.iter().filter(|r| r.risk_level == level).count()
}

fn write_finding<W: fmt::Write>(out: &mut W, finding: &RiskFinding) -> fmt::Result {
    let title = if finding.clause_type.is_empty() {
        "Unclassified clause"
    } else {
        finding.clause_type.as_str()
    };
    writeln!(out, "#### {}", title)?;
    writeln!(out)?;
    if !finding.issue.is_empty() {
        writeln!(out, "**Issue:** {}", finding.issue)?;
        writeln!(out)?;
    }
    if let Some(toxic) = &finding.toxic_language {
        writeln!(out, "**Problematic language:** \"{}\"", toxic)?;
        writeln!(out)?;
    }
    if let Some(alternative) = &finding.suggested_alternative {
        writeln!(out, "**Suggested alternative:** {}", alternative)?;
        writeln!(out)?;
    }
    if !finding.recommendation.is_empty() {
        writeln!(out, "**Recommendation:** {}", finding.recommendation)?;
        writeln!(out)?;
    }
    Ok(())
}

fn table_cell(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ").replace('|', "\\|");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let truncated: String = flat.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}
