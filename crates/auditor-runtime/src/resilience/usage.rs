//! Token and cost accounting for LLM calls.
//!
//! One [`UsageTracker`] per audit job, broken down by pipeline stage.

use auditor_core::Stage;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::providers::TokenUsage;

/// Accumulated LLM usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub total_tokens: u32,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,

    /// Number of successful LLM calls
    pub llm_calls: u32,

    /// Estimated cost in USD
    pub estimated_cost: f64,

    /// Calls that read from the provider's prompt cache
    pub cache_hits: u32,
    pub cache_creation_tokens: u32,
    pub cache_read_tokens: u32,
}

impl LlmUsage {
    /// Add token usage from a provider response.
    pub fn add(&mut self, usage: &TokenUsage, model: &str) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total();
        self.llm_calls += 1;
        self.cache_creation_tokens += usage.cache_creation_tokens;
        self.cache_read_tokens += usage.cache_read_tokens;

        if usage.cache_read_tokens > 0 {
            self.cache_hits += 1;
        }

        self.estimated_cost += Self::estimate_cost(usage, model);
    }

    /// Fold another usage record into this one.
    pub fn merge(&mut self, other: &LlmUsage) {
        self.total_tokens += other.total_tokens;
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.llm_calls += other.llm_calls;
        self.estimated_cost += other.estimated_cost;
        self.cache_hits += other.cache_hits;
        self.cache_creation_tokens += other.cache_creation_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
    }

    fn estimate_cost(usage: &TokenUsage, model: &str) -> f64 {
        // USD per million tokens: input, output, cache write, cache read
        let (input_rate, output_rate, cache_write_rate, cache_read_rate) = match model {
            m if m.ends_with(":free") => (0.0, 0.0, 0.0, 0.0),
            m if m.contains("sonnet-4-5") => (3.0, 15.0, 3.75, 0.3),
            m if m.contains("haiku-4-5") => (1.0, 5.0, 1.25, 0.1),
            m if m.contains("gpt-4o-mini") => (0.15, 0.6, 0.0, 0.0),
            m if m.contains("gpt-4o") => (2.5, 10.0, 0.0, 0.0),
            m if m.contains("llama-3.3-70b") => (0.59, 0.79, 0.0, 0.0),
            _ => (3.0, 15.0, 3.75, 0.3),
        };

        let per_million = |tokens: u32, rate: f64| (tokens as f64 / 1_000_000.0) * rate;

        per_million(usage.prompt_tokens, input_rate)
            + per_million(usage.completion_tokens, output_rate)
            + per_million(usage.cache_creation_tokens, cache_write_rate)
            + per_million(usage.cache_read_tokens, cache_read_rate)
    }
}

/// Usage for one job, per stage.
#[derive(Default)]
pub struct UsageTracker {
    by_stage: RwLock<BTreeMap<Stage, LlmUsage>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successful call made on behalf of `stage`.
    pub fn record(&self, stage: Stage, usage: &TokenUsage, model: &str) {
        self.by_stage
            .write()
            .entry(stage)
            .or_default()
            .add(usage, model);
    }

    pub fn for_stage(&self, stage: Stage) -> LlmUsage {
        self.by_stage.read().get(&stage).cloned().unwrap_or_default()
    }

    /// Sum over all stages.
    pub fn total(&self) -> LlmUsage {
        let mut total = LlmUsage::default();
        for usage in self.by_stage.read().values() {
            total.merge(usage);
        }
        total
    }

    /// Per-stage breakdown, in pipeline order.
    pub fn snapshot(&self) -> BTreeMap<Stage, LlmUsage> {
        self.by_stage.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(prompt: u32, completion: u32) -> TokenUsage {
        TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            ..Default::default()
        }
    }

    #[test]
    fn test_cost_estimation() {
        let mut usage = LlmUsage::default();
        usage.add(&tokens(1000, 500), "claude-sonnet-4-5-20250514");

        // 1000 * $3/MTok + 500 * $15/MTok = $0.0105
        assert!(usage.estimated_cost > 0.01 && usage.estimated_cost < 0.02);
        assert_eq!(usage.total_tokens, 1500);
        assert_eq!(usage.llm_calls, 1);
    }

    #[test]
    fn test_free_models_cost_nothing() {
        let mut usage = LlmUsage::default();
        usage.add(&tokens(10_000, 10_000), "meta-llama/llama-3.3-70b-instruct:free");
        assert_eq!(usage.estimated_cost, 0.0);
    }

    #[test]
    fn test_cache_hits_counted() {
        let mut usage = LlmUsage::default();
        usage.add(
            &TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                cache_read_tokens: 2000,
                cache_creation_tokens: 0,
            },
            "claude-sonnet-4-5",
        );
        assert_eq!(usage.cache_hits, 1);
        assert_eq!(usage.cache_read_tokens, 2000);
    }

    #[test]
    fn test_tracker_breaks_down_by_stage() {
        let tracker = UsageTracker::new();
        tracker.record(Stage::Extracting, &tokens(100, 50), "llama-3.3-70b-versatile");
        tracker.record(Stage::Auditing, &tokens(200, 100), "llama-3.3-70b-versatile");
        tracker.record(Stage::Auditing, &tokens(200, 100), "llama-3.3-70b-versatile");

        assert_eq!(tracker.for_stage(Stage::Auditing).llm_calls, 2);
        assert_eq!(tracker.for_stage(Stage::Critiquing), LlmUsage::default());

        let total = tracker.total();
        assert_eq!(total.llm_calls, 3);
        assert_eq!(total.total_tokens, 750);

        let stages: Vec<Stage> = tracker.snapshot().keys().copied().collect();
        assert_eq!(stages, vec![Stage::Extracting, Stage::Auditing]);
    }
}
