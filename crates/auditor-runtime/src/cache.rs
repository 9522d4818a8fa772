//! Caching of clause extraction results.
//!
//! Extraction runs at temperature 0.0, so the same document sent to the same
//! model yields the same clauses. Re-auditing a document skips the call.

use moka::future::Cache;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use auditor_core::Clause;

use crate::config::CacheConfig;

/// Cache key: document content and the model asked to extract it.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ExtractionKey {
    document_hash: u64,
    model: String,
}

impl ExtractionKey {
    pub fn new(document: &str, model: impl Into<String>) -> Self {
        Self {
            document_hash: hash_document(document),
            model: model.into(),
        }
    }
}

/// Extraction cache using moka.
pub struct ExtractionCache {
    cache: Cache<ExtractionKey, Vec<Clause>>,
}

impl ExtractionCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    /// A cache sized from config, or `None` when caching is disabled.
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.max_entries, config.ttl))
    }

    pub async fn get(&self, key: &ExtractionKey) -> Option<Vec<Clause>> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: ExtractionKey, clauses: Vec<Clause>) {
        self.cache.insert(key, clauses).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for ExtractionCache {
    fn default() -> Self {
        Self::new(1000, Duration::from_secs(3600))
    }
}

fn hash_document(document: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    let mut hasher = DefaultHasher::new();
    document.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use auditor_core::ClauseType;

    #[tokio::test]
    async fn test_cache_operations() {
        let cache = ExtractionCache::default();
        let key = ExtractionKey::new("This Agreement is governed by Delaware law.", "m1");

        assert!(cache.get(&key).await.is_none());

        let clauses = vec![Clause::new(
            ClauseType::GoverningLaw,
            "governed by Delaware law",
        )];
        cache.insert(key.clone(), clauses.clone()).await;

        assert_eq!(cache.get(&key).await, Some(clauses));
    }

    #[tokio::test]
    async fn test_key_includes_model() {
        let cache = ExtractionCache::default();
        let doc = "Either party may terminate on 30 days notice.";
        cache
            .insert(ExtractionKey::new(doc, "m1"), vec![Clause::new(ClauseType::Termination, doc)])
            .await;

        assert!(cache.get(&ExtractionKey::new(doc, "m2")).await.is_none());
        assert!(cache.get(&ExtractionKey::new("other text", "m1")).await.is_none());
    }

    #[test]
    fn test_disabled_config_builds_no_cache() {
        let config = CacheConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(ExtractionCache::from_config(&config).is_none());
        assert!(ExtractionCache::from_config(&CacheConfig::default()).is_some());
    }
}
