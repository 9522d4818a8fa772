//! Provider factories and the registry that builds providers from config.
//!
//! ```ignore
//! let registry = ProviderRegistry::with_defaults();
//! let groq = registry.create("openai", &json!({"name": "groq"}))?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{secrets::ApiCredential, LlmProvider, ProviderError};

/// Builds one kind of provider from JSON configuration.
pub trait ProviderFactory: Send + Sync {
    /// Identifier used as `type` in provider config, e.g. "anthropic".
    fn provider_type(&self) -> &'static str;

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError>;

    /// Validate configuration, including credential availability, without
    /// creating a provider.
    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError>;

    /// Environment variable the key is read from when config has none.
    fn default_env_var(&self, config: &JsonValue) -> &'static str;

    /// Model used when a chain entry names none.
    fn default_model(&self, _config: &JsonValue) -> Option<&'static str> {
        None
    }

    /// Whether a key could be loaded for this config.
    fn credential_available(&self, config: &JsonValue) -> bool {
        ApiCredential::is_available(config, self.default_env_var(config))
    }

    fn description(&self) -> &'static str {
        "LLM Provider"
    }
}

/// Registry of provider factories, keyed by provider type.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any with the same type.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories
            .insert(factory.provider_type().to_string(), factory);
    }

    /// Create a provider from type name and configuration.
    pub fn create(
        &self,
        provider_type: &str,
        config: &JsonValue,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        self.factory(provider_type)?.create(config)
    }

    pub fn validate(&self, provider_type: &str, config: &JsonValue) -> Result<(), ProviderError> {
        self.factory(provider_type)?.validate_config(config)
    }

    pub fn available_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    pub fn has_provider(&self, provider_type: &str) -> bool {
        self.factories.contains_key(provider_type)
    }

    /// Look up a factory, with an error listing the registered types.
    pub fn factory(&self, provider_type: &str) -> Result<&Arc<dyn ProviderFactory>, ProviderError> {
        self.factories.get(provider_type).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "Unknown provider type: '{}'. Available: {:?}",
                provider_type,
                self.available_types()
            ))
        })
    }

    /// A registry with every provider compiled into this build.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "anthropic")]
        registry.register(Arc::new(super::AnthropicProviderFactory));

        #[cfg(feature = "openai")]
        registry.register(Arc::new(super::OpenAiCompatibleProviderFactory));

        registry
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.available_types())
            .finish()
    }
}
