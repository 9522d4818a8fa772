//! Anthropic Claude provider.
//!
//! Talks to the Messages API, with optional prompt caching on the system
//! prompt (the playbook makes auditor prompts large and repetitive).

use super::{
    factory::ProviderFactory,
    parse_retry_after,
    secrets::{ApiCredential, CredentialSource},
    split_system, truncate_body, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider,
    ProviderError, TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Environment variable name for the Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Claude provider.
pub struct AnthropicProvider {
    name: String,
    credential: ApiCredential,
    base_url: String,
    prompt_caching: bool,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("name", &self.name)
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("prompt_caching", &self.prompt_caching)
            .finish()
    }
}

impl AnthropicProvider {
    /// Create a provider with an explicit key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            name: "anthropic".to_string(),
            credential: ApiCredential::new(
                api_key,
                CredentialSource::Programmatic,
                "Anthropic API key",
            ),
            base_url: DEFAULT_BASE_URL.to_string(),
            prompt_caching: true,
            client: reqwest::Client::new(),
        }
    }

    /// Create from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_env(ANTHROPIC_API_KEY_ENV, "Anthropic API key")?;
        Ok(Self {
            credential,
            ..Self::new("")
        })
    }

    /// Create from JSON configuration with environment fallback.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let credential =
            ApiCredential::from_config_or_env(config, ANTHROPIC_API_KEY_ENV, "Anthropic API key")?;

        Ok(Self {
            name: config["name"].as_str().unwrap_or("anthropic").to_string(),
            credential,
            base_url: config["base_url"]
                .as_str()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            prompt_caching: config["prompt_caching"].as_bool().unwrap_or(true),
            client: reqwest::Client::new(),
        })
    }

    fn build_request(&self, messages: Vec<ChatMessage>, config: &CompletionConfig) -> AnthropicRequest {
        let (system, others) = split_system(messages);

        let system = system.map(|text| {
            vec![ContentBlock::Text {
                text,
                cache_control: self.prompt_caching.then(|| CacheControl {
                    type_: "ephemeral".to_string(),
                }),
            }]
        });

        let messages = others
            .into_iter()
            .map(|msg| AnthropicMessage {
                role: msg.role,
                content: vec![ContentBlock::Text {
                    text: msg.content,
                    cache_control: None,
                }],
            })
            .collect();

        AnthropicRequest {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            system,
            messages,
            temperature: config.temperature,
        }
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<Vec<ContentBlock>>,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
}

#[derive(Debug, Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    type_: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlockResponse>,
    model: String,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlockResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
    #[serde(default)]
    cache_creation_input_tokens: u32,
    #[serde(default)]
    cache_read_input_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = self.build_request(messages, config);

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.credential.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(config.timeout)
                } else {
                    ProviderError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = parse_retry_after(
                response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok()),
            );
            return Err(ProviderError::RateLimited { retry_after });
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ProviderError::AuthError);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<AnthropicError>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| truncate_body(&body, 320));

            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let content = body
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(CompletionResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: body.usage.input_tokens,
                completion_tokens: body.usage.output_tokens,
                cache_read_tokens: body.usage.cache_read_input_tokens,
                cache_creation_tokens: body.usage.cache_creation_input_tokens,
            },
            model: body.model,
            stop_reason: body.stop_reason,
        })
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Factory for Anthropic providers.
///
/// ```json
/// {
///   "name": "anthropic",
///   "api_key_env": "ANTHROPIC_API_KEY",
///   "base_url": "https://api.anthropic.com/v1",
///   "prompt_caching": true
/// }
/// ```
pub struct AnthropicProviderFactory;

impl ProviderFactory for AnthropicProviderFactory {
    fn provider_type(&self) -> &'static str {
        "anthropic"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(AnthropicProvider::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, ANTHROPIC_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "Anthropic API key required: set 'api_key' in config or {} env",
                super::secrets::env_var_for(config, ANTHROPIC_API_KEY_ENV)
            )));
        }

        if let Some(url) = config["base_url"].as_str() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ProviderError::NotConfigured(
                    "base_url must start with http:// or https://".to_string(),
                ));
            }
        }

        Ok(())
    }

    fn default_env_var(&self, _config: &JsonValue) -> &'static str {
        ANTHROPIC_API_KEY_ENV
    }

    fn default_model(&self, _config: &JsonValue) -> Option<&'static str> {
        Some("claude-sonnet-4-5-20250514")
    }

    fn description(&self) -> &'static str {
        "Anthropic Claude provider with prompt caching support"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_creation() {
        let provider = AnthropicProvider::new("test-key");
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_request_moves_system_prompt() {
        let provider = AnthropicProvider::new("test-key");
        let config = CompletionConfig {
            model: "claude-sonnet-4-5-20250514".to_string(),
            temperature: 0.1,
            ..Default::default()
        };
        let request = provider.build_request(
            vec![ChatMessage::system("playbook"), ChatMessage::user("clauses")],
            &config,
        );

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["system"][0]["text"], "playbook");
        assert_eq!(json["system"][0]["cache_control"]["type"], "ephemeral");
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(json["messages"][0]["role"], "user");
        assert!((json["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_request_without_caching() {
        let provider = AnthropicProvider::from_config(&serde_json::json!({
            "api_key": "k",
            "prompt_caching": false
        }))
        .unwrap();
        let request = provider.build_request(vec![ChatMessage::system("s")], &CompletionConfig::default());
        let json = serde_json::to_value(&request).unwrap();
        assert!(json["system"][0].get("cache_control").is_none());
    }

    #[test]
    fn test_from_config() {
        let config = serde_json::json!({
            "name": "claude-backup",
            "api_key": "config-api-key",
            "base_url": "https://custom.api.com/v1/"
        });

        let provider = AnthropicProvider::from_config(&config).unwrap();
        assert_eq!(provider.name(), "claude-backup");
        assert_eq!(provider.base_url, "https://custom.api.com/v1");
        assert_eq!(provider.credential.source(), CredentialSource::Config);
    }

    #[test]
    fn test_factory_validate_invalid_base_url() {
        let factory = AnthropicProviderFactory;
        let config = serde_json::json!({
            "api_key": "test-key",
            "base_url": "invalid-url"
        });
        assert!(factory.validate_config(&config).is_err());
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let secret_key = "sk-ant-REDACTED";
        let provider = AnthropicProvider::new(secret_key);

        let debug_output = format!("{:?}", provider);
        assert!(!debug_output.contains(secret_key), "API key was exposed in Debug output!");
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_health_check_requires_key() {
        assert!(AnthropicProvider::new("sk-ant-key").health_check().await);
        assert!(!AnthropicProvider::new("").health_check().await);
    }
}
