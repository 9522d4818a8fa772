//! Credential handling for LLM providers.
//!
//! Keys are wrapped in [`ApiCredential`] as soon as they are read, from
//! config or environment, and only unwrapped at the HTTP header.
//!
//! Provider config may name the environment variable to read with
//! `api_key_env`; otherwise the provider's default variable is used:
//!
//! ```json
//! { "api_key_env": "GROQ_API_KEY" }
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::ProviderError;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Inline `api_key` in provider config
    Config,
    Environment,
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// An API key that prints as `[REDACTED]`.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Load from an environment variable. Empty values count as unset.
    pub fn from_env(env_var: &str, name: &'static str) -> Result<Self, ProviderError> {
        match std::env::var(env_var) {
            Ok(v) if !v.trim().is_empty() => Ok(Self::new(v, CredentialSource::Environment, name)),
            _ => Err(ProviderError::NotConfigured(format!(
                "{} not set: configure '{}' environment variable",
                name, env_var
            ))),
        }
    }

    /// Load from `api_key` in config, else from the configured or default
    /// environment variable.
    pub fn from_config_or_env(
        config: &JsonValue,
        default_env: &str,
        name: &'static str,
    ) -> Result<Self, ProviderError> {
        if let Some(value) = config["api_key"].as_str() {
            return Ok(Self::new(value, CredentialSource::Config, name));
        }

        let env_var = env_var_for(config, default_env);
        Self::from_env(env_var, name).map_err(|_| {
            ProviderError::NotConfigured(format!(
                "{} required: set 'api_key' in config or {} environment variable",
                name, env_var
            ))
        })
    }

    /// Whether a credential could be loaded, without loading it.
    pub fn is_available(config: &JsonValue, default_env: &str) -> bool {
        config["api_key"].as_str().is_some()
            || std::env::var(env_var_for(config, default_env))
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false)
    }

    /// Expose the key at the point of use. Never store the result.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Environment variable a provider config reads its key from.
pub fn env_var_for<'a>(config: &'a JsonValue, default_env: &'a str) -> &'a str {
    config["api_key_env"].as_str().unwrap_or(default_env)
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}
