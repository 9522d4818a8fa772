//! System prompts and message builders for the three pipeline agents.
//!
//! Each agent sends one system message (static, provider-cacheable) and one
//! user message carrying the dynamic content: document text, clauses,
//! playbook, pre-screen hits and critic feedback.

use auditor_core::{Clause, ClauseType, RiskFinding, ScreenHit};

use crate::providers::ChatMessage;

/// Clause extractor system prompt.
pub const EXTRACTOR_SYSTEM_PROMPT: &str = r#"
You are a legal expert specialising in commercial contracts.

## Task
Read the contract text and extract every clause belonging to one of these types:
- Indemnity
- Termination
- Governing Law
- Limitation of Liability
- Intellectual Property

## Rules
1. Copy clause text verbatim from the contract. Do not summarise or paraphrase.
2. Include the section number or heading when the contract shows one.
3. Skip clauses of any other type.
4. If none of the types appear, return an empty list.

## Output Format
Respond ONLY with a JSON list, no commentary:
[
  {"type": "Indemnity", "text": "exact clause text", "section": "9.1"}
]
"#;

/// Risk auditor system prompt.
pub const AUDITOR_SYSTEM_PROMPT: &str = r#"
You are a Senior Contract Lawyer reviewing clauses for your client.

## Task
Evaluate each extracted clause against the RISK PLAYBOOK you are given.
For each clause identify:
- toxic language that shifts risk unfairly onto your client
- protections the playbook requires that are missing
- the risk level: High, Medium or Low

## Rules
1. Quote toxic language exactly as it appears in the clause.
2. Offer a balanced suggested alternative for every High or Medium risk.
3. Pre-screen hits are phrases already matched against the playbook. Confirm or
   dismiss each one; do not ignore them.
4. Give an overall risk_score from 0 (benign) to 100 (unsignable).

## Output Format
Respond ONLY with a JSON object, no commentary:
{
  "risks": [
    {
      "clause_type": "Indemnity",
      "risk_level": "High",
      "issue": "what is wrong",
      "toxic_language": "exact phrase",
      "suggested_alternative": "balanced replacement clause",
      "recommendation": "what the client should do"
    }
  ],
  "risk_score": 0
}
"#;

/// Audit critic system prompt.
pub const CRITIC_SYSTEM_PROMPT: &str = r#"
You are a Legal Critic reviewing another lawyer's risk audit.

## Check For
1. Hallucinations: findings that quote language not present in the clauses
2. Missed Risks: toxic language in the clauses the audit did not flag
3. Incorrect Severity: risk levels that are too high or too low
4. Poor Alternatives: suggested alternatives that do not fix the issue

## Rules
Approve the audit only when none of the four problems is present.
When rejecting, give specific feedback the auditor can act on.

## Output Format
Respond ONLY with a JSON object, no commentary:
{"critic_approved": true, "feedback": "specific corrections, or empty when approved"}
"#;

/// Messages asking the extractor for clauses in `document`.
pub fn extraction_messages(document: &str) -> Vec<ChatMessage> {
    let types = ClauseType::ALL
        .iter()
        .map(|t| t.label())
        .collect::<Vec<_>>()
        .join(", ");

    vec![
        ChatMessage::system(EXTRACTOR_SYSTEM_PROMPT.trim()),
        ChatMessage::user(format!(
            "Extract the {} clauses from this contract:\n\n{}",
            types, document
        )),
    ]
}

/// Messages for one auditor pass.
///
/// `feedback` is the critic's rejection from the previous pass, if any.
pub fn audit_messages(
    clauses: &[Clause],
    playbook_json: &str,
    hits: &[ScreenHit],
    feedback: Option<&str>,
) -> Vec<ChatMessage> {
    let mut system = format!(
        "{}\n\n## RISK PLAYBOOK\n{}",
        AUDITOR_SYSTEM_PROMPT.trim(),
        playbook_json
    );

    if let Some(feedback) = feedback {
        system.push_str(&format!("\n\n{}", feedback_block(feedback)));
    }

    let mut user = format!("Extracted Clauses:\n\n{}", clauses_json(clauses));
    if !hits.is_empty() {
        user.push_str("\n\nPre-screen hits:\n");
        for hit in hits {
            user.push_str(&format!(
                "- clause {} ({}): \"{}\" matches playbook pattern \"{}\"\n",
                hit.clause_index, hit.category, hit.matched, hit.pattern
            ));
        }
    }

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

/// Messages asking the critic to review `risks` against `clauses`.
pub fn critique_messages(clauses: &[Clause], risks: &[RiskFinding]) -> Vec<ChatMessage> {
    let risks_json = serde_json::to_string_pretty(risks).unwrap_or_else(|_| "[]".to_string());

    vec![
        ChatMessage::system(CRITIC_SYSTEM_PROMPT.trim()),
        ChatMessage::user(format!(
            "Original Clauses:\n\n{}\n\nAuditor Findings:\n\n{}",
            clauses_json(clauses),
            risks_json
        )),
    ]
}

/// Revision instruction appended to the auditor prompt after a rejection.
pub fn feedback_block(feedback: &str) -> String {
    format!(
        "CRITIC FEEDBACK FROM PREVIOUS PASS:\n{}\nPlease address this feedback in your updated audit.",
        feedback
    )
}

fn clauses_json(clauses: &[Clause]) -> String {
    serde_json::to_string_pretty(clauses).unwrap_or_else(|_| "[]".to_string())
}
