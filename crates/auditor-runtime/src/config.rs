//! Runtime configuration.
//!
//! Loaded from YAML or JSON (by file extension), then adjusted by
//! environment overrides and validated:
//!
//! ```yaml
//! providers:
//!   - type: openai
//!     name: groq
//!     model: llama-3.3-70b-versatile
//!   - type: openai
//!     name: openrouter
//! temperatures: { extractor: 0.0, auditor: 0.1, critic: 0.7 }
//! request_timeout: 60s
//! max_critic_passes: 2
//! cache: { enabled: true, max_entries: 1000, ttl: 1h }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use auditor_core::{Stage, DEFAULT_MAX_CRITIC_PASSES, MAX_AUDITOR_PASSES};

use crate::providers::ProviderRegistry;
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, ProviderChain};

/// Overrides the playbook path.
pub const PLAYBOOK_PATH_ENV: &str = "AUDITOR_PLAYBOOK_PATH";

/// Overrides the critic loop cap.
pub const MAX_CRITIC_PASSES_ENV: &str = "AUDITOR_MAX_CRITIC_PASSES";

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No usable providers: {}", .0.join("; "))]
    NoUsableProviders(Vec<String>),
}

/// One entry of the provider chain.
///
/// `type` selects the factory; everything except `model` is passed to it
/// as provider config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSpec {
    #[serde(rename = "type")]
    pub provider_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Model to request; the factory default when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(flatten)]
    pub options: BTreeMap<String, JsonValue>,
}

impl ProviderSpec {
    pub fn new(provider_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            provider_type: provider_type.into(),
            name: Some(name.into()),
            model: None,
            options: BTreeMap::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Display name: explicit `name`, else the provider type.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.provider_type)
    }

    /// JSON config handed to the provider factory.
    pub fn factory_config(&self) -> JsonValue {
        let mut map: serde_json::Map<String, JsonValue> = self
            .options
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(name) = &self.name {
            map.insert("name".to_string(), JsonValue::String(name.clone()));
        }
        JsonValue::Object(map)
    }
}

/// Sampling temperature per LLM stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTemperatures {
    pub extractor: f32,
    pub auditor: f32,
    pub critic: f32,
}

impl Default for StageTemperatures {
    fn default() -> Self {
        Self {
            extractor: 0.0,
            auditor: 0.1,
            critic: 0.7,
        }
    }
}

impl StageTemperatures {
    /// Temperature for a stage; non-LLM stages get 0.0.
    pub fn for_stage(&self, stage: Stage) -> f32 {
        match stage {
            Stage::Extracting => self.extractor,
            Stage::Auditing => self.auditor,
            Stage::Critiquing => self.critic,
            Stage::Reporting | Stage::Done => 0.0,
        }
    }
}

/// Extraction cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: u64,

    #[serde(with = "humantime_duration")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Configuration for the audit runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Provider chain, in fallback order
    pub providers: Vec<ProviderSpec>,

    pub temperatures: StageTemperatures,

    /// Maximum tokens per completion
    pub max_tokens: u32,

    /// Network timeout per provider call
    #[serde(with = "humantime_duration")]
    pub request_timeout: Duration,

    /// Critic passes before reporting without approval (1..=3)
    pub max_critic_passes: u32,

    /// Same-provider retries when rate limited
    pub rate_limit_retries: u32,

    pub circuit_breaker: CircuitBreakerConfig,
    pub cache: CacheConfig,
    pub playbook_path: PathBuf,

    /// Jobs allowed to run at once
    pub max_concurrent_jobs: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            providers: vec![
                ProviderSpec::new("openai", "groq").with_model("llama-3.3-70b-versatile"),
                ProviderSpec::new("openai", "openrouter")
                    .with_model("meta-llama/llama-3.3-70b-instruct:free"),
            ],
            temperatures: StageTemperatures::default(),
            max_tokens: 4096,
            request_timeout: Duration::from_secs(60),
            max_critic_passes: DEFAULT_MAX_CRITIC_PASSES,
            rate_limit_retries: 1,
            circuit_breaker: CircuitBreakerConfig::default(),
            cache: CacheConfig::default(),
            playbook_path: PathBuf::from("data/risk_standards.json"),
            max_concurrent_jobs: 4,
        }
    }
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a config file; `.json` is read as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            Self::from_json(&contents)
        } else {
            Self::from_yaml(&contents)
        }
    }

    /// Load from `path` (or defaults), apply environment overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `AUDITOR_PLAYBOOK_PATH` and `AUDITOR_MAX_CRITIC_PASSES`.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(
            std::env::var(PLAYBOOK_PATH_ENV).ok(),
            std::env::var(MAX_CRITIC_PASSES_ENV).ok(),
        )
    }

    fn apply_overrides(
        &mut self,
        playbook_path: Option<String>,
        max_critic_passes: Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(path) = playbook_path.filter(|p| !p.trim().is_empty()) {
            self.playbook_path = PathBuf::from(path);
        }

        if let Some(raw) = max_critic_passes {
            self.max_critic_passes = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!(
                    "{} must be a positive integer, got '{}'",
                    MAX_CRITIC_PASSES_ENV, raw
                ))
            })?;
        }

        Ok(())
    }

    /// Check invariants the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.providers.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one provider must be configured".to_string(),
            ));
        }

        if self.max_critic_passes == 0 || self.max_critic_passes > MAX_AUDITOR_PASSES {
            return Err(ConfigError::Invalid(format!(
                "max_critic_passes must be between 1 and {}, got {}",
                MAX_AUDITOR_PASSES, self.max_critic_passes
            )));
        }

        for (stage, temperature) in [
            ("extractor", self.temperatures.extractor),
            ("auditor", self.temperatures.auditor),
            ("critic", self.temperatures.critic),
        ] {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::Invalid(format!(
                    "{} temperature must be within [0.0, 2.0], got {}",
                    stage, temperature
                )));
            }
        }

        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_jobs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the provider chain from the configured specs.
    ///
    /// Entries whose provider cannot be created (unknown type, missing key)
    /// are skipped with a warning. Fails only when none remain.
    pub fn build_chain(&self, registry: &ProviderRegistry) -> Result<ProviderChain, ConfigError> {
        let breaker = Arc::new(CircuitBreaker::new(self.circuit_breaker.clone()));
        let mut chain = ProviderChain::new(breaker)
            .with_rate_limit_retries(self.rate_limit_retries)
            .with_max_tokens(self.max_tokens)
            .with_timeout(self.request_timeout);
        let mut skipped = Vec::new();

        for spec in &self.providers {
            let factory_config = spec.factory_config();
            let built = registry.factory(&spec.provider_type).and_then(|factory| {
                let model = spec
                    .model
                    .clone()
                    .or_else(|| factory.default_model(&factory_config).map(String::from))
                    .ok_or_else(|| {
                        crate::providers::ProviderError::NotConfigured(
                            "no model configured".to_string(),
                        )
                    })?;
                Ok((factory.create(&factory_config)?, model))
            });

            match built {
                Ok((provider, model)) => {
                    tracing::debug!(provider = %spec.display_name(), model = %model, "Added provider to chain");
                    chain = chain.with_entry(provider, model);
                }
                Err(e) => {
                    tracing::warn!(provider = %spec.display_name(), error = %e, "Skipping provider");
                    skipped.push(format!("{}: {}", spec.display_name(), e));
                }
            }
        }

        if chain.is_empty() {
            return Err(ConfigError::NoUsableProviders(skipped));
        }
        Ok(chain)
    }
}

/// Durations as humantime strings ("60s", "1h 30m").
mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
