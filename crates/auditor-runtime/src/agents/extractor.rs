//! Clause extraction agent.

use async_trait::async_trait;
use std::sync::Arc;

use auditor_core::{ExtractionPayload, PipelineState, Stage};

use super::traits::{invoke_stage, AgentError, StageAgent};
use crate::cache::{ExtractionCache, ExtractionKey};
use crate::prompts;
use crate::resilience::{ProviderChain, UsageTracker};

/// Pulls the five tracked clause types out of the document text.
pub struct ClauseExtractor {
    chain: Arc<ProviderChain>,
    temperature: f32,
    cache: Option<Arc<ExtractionCache>>,
}

impl ClauseExtractor {
    pub fn new(chain: Arc<ProviderChain>) -> Self {
        Self {
            chain,
            temperature: 0.0,
            cache: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_cache(mut self, cache: Arc<ExtractionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    fn primary_model(&self) -> &str {
        self.chain
            .entries()
            .first()
            .map(|e| e.model.as_str())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StageAgent for ClauseExtractor {
    fn stage(&self) -> Stage {
        Stage::Extracting
    }

    fn temperature(&self) -> f32 {
        self.temperature
    }

    async fn run(&self, state: &mut PipelineState, usage: &UsageTracker) -> Result<(), AgentError> {
        let document = state.document_text();

        if document.trim().is_empty() {
            tracing::info!("Empty document, skipping clause extraction");
            state.set_clauses(Vec::new());
            return Ok(());
        }

        if let Some(cache) = &self.cache {
            let key = ExtractionKey::new(document, self.primary_model());
            if let Some(clauses) = cache.get(&key).await {
                tracing::debug!(clauses = clauses.len(), "Extraction cache hit");
                state.set_clauses(clauses);
                return Ok(());
            }
        }

        let messages = prompts::extraction_messages(document);
        let (content, model) =
            invoke_stage(&self.chain, self.stage(), &messages, self.temperature, usage).await?;

        let clauses = match ExtractionPayload::from_response(&content) {
            Ok(payload) => {
                if payload.dropped > 0 {
                    tracing::warn!(dropped = payload.dropped, "Extractor returned unreadable clauses");
                }
                if let Some(cache) = &self.cache {
                    let key = ExtractionKey::new(state.document_text(), model);
                    cache.insert(key, payload.clauses.clone()).await;
                }
                payload.clauses
            }
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable extractor response, continuing with no clauses");
                Vec::new()
            }
        };

        tracing::info!(clauses = clauses.len(), "Clauses extracted");
        state.set_clauses(clauses);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;
    use auditor_core::ClauseType;

    const CLAUSES: &str = r#"```json
[
  {"type": "Indemnity", "text": "Vendor shall indemnify Client.", "section": "9"},
  {"type": "Governing Law", "text": "Laws of Delaware govern."}
]
```"#;

    #[tokio::test]
    async fn test_extracts_clauses_at_zero_temperature() {
        let provider = ScriptedProvider::new(vec![CLAUSES]);
        let extractor = ClauseExtractor::new(provider.chain());
        let usage = UsageTracker::new();
        let mut state = PipelineState::new("A contract.");

        extractor.run(&mut state, &usage).await.unwrap();

        assert_eq!(state.clauses().len(), 2);
        assert_eq!(state.clauses()[1].clause_type, ClauseType::GoverningLaw);
        assert_eq!(provider.request(0).1, 0.0);
        assert_eq!(usage.for_stage(Stage::Extracting).llm_calls, 1);
    }

    #[tokio::test]
    async fn test_empty_document_skips_call() {
        let provider = ScriptedProvider::new(vec![CLAUSES]);
        let extractor = ClauseExtractor::new(provider.chain());
        let mut state = PipelineState::new("  \n ");

        extractor.run(&mut state, &UsageTracker::new()).await.unwrap();

        assert!(state.clauses().is_empty());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unparseable_response_yields_no_clauses() {
        let provider = ScriptedProvider::new(vec!["I could not find any clauses, sorry."]);
        let extractor = ClauseExtractor::new(provider.chain());
        let mut state = PipelineState::new("A contract.");

        extractor.run(&mut state, &UsageTracker::new()).await.unwrap();
        assert!(state.clauses().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_failure_is_an_error() {
        let provider = ScriptedProvider::failing();
        let extractor = ClauseExtractor::new(provider.chain());
        let mut state = PipelineState::new("A contract.");

        let err = extractor.run(&mut state, &UsageTracker::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::Gateway { stage: Stage::Extracting, .. }));
    }

    #[tokio::test]
    async fn test_cache_serves_repeat_documents() {
        let provider = ScriptedProvider::new(vec![CLAUSES]);
        let extractor =
            ClauseExtractor::new(provider.chain()).with_cache(Arc::new(ExtractionCache::default()));

        let mut first = PipelineState::new("Same contract.");
        extractor.run(&mut first, &UsageTracker::new()).await.unwrap();
        let mut second = PipelineState::new("Same contract.");
        extractor.run(&mut second, &UsageTracker::new()).await.unwrap();

        assert_eq!(provider.call_count(), 1);
        assert_eq!(first.clauses(), second.clauses());
    }
}
