//! OpenAI-compatible chat completions provider.
//!
//! One implementation covers every backend that speaks
//! `POST {base_url}/chat/completions` with bearer auth: OpenAI itself, Groq,
//! OpenRouter and Google Gemini's OpenAI endpoint. Presets fill in the base URL, key variable, default model
//! and any extra headers; all of them can be overridden in config.

use super::{
    factory::ProviderFactory,
    parse_retry_after,
    secrets::{ApiCredential, CredentialSource},
    truncate_body, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Known OpenAI-compatible backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAiPreset {
    OpenAi,
    Groq,
    OpenRouter,
    Gemini,
}

impl OpenAiPreset {
    /// Look up a preset by provider name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "openai" => Some(OpenAiPreset::OpenAi),
            "groq" => Some(OpenAiPreset::Groq),
            "openrouter" => Some(OpenAiPreset::OpenRouter),
            "gemini" | "google" => Some(OpenAiPreset::Gemini),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OpenAiPreset::OpenAi => "openai",
            OpenAiPreset::Groq => "groq",
            OpenAiPreset::OpenRouter => "openrouter",
            OpenAiPreset::Gemini => "gemini",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            OpenAiPreset::OpenAi => "https://api.openai.com/v1",
            OpenAiPreset::Groq => "https://api.groq.com/openai/v1",
            OpenAiPreset::OpenRouter => "https://openrouter.ai/api/v1",
            OpenAiPreset::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
        }
    }

    pub fn api_key_env(&self) -> &'static str {
        match self {
            OpenAiPreset::OpenAi => "OPENAI_API_KEY",
            OpenAiPreset::Groq => "GROQ_API_KEY",
            OpenAiPreset::OpenRouter => "OPENROUTER_API_KEY",
            OpenAiPreset::Gemini => "GOOGLE_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            OpenAiPreset::OpenAi => "gpt-4o-mini",
            OpenAiPreset::Groq => "llama-3.3-70b-versatile",
            OpenAiPreset::OpenRouter => "meta-llama/llama-3.3-70b-instruct:free",
            OpenAiPreset::Gemini => "gemini-2.0-flash",
        }
    }

    fn credential_name(&self) -> &'static str {
        match self {
            OpenAiPreset::OpenAi => "OpenAI API key",
            OpenAiPreset::Groq => "Groq API key",
            OpenAiPreset::OpenRouter => "OpenRouter API key",
            OpenAiPreset::Gemini => "Google API key",
        }
    }

    fn default_headers(&self) -> Vec<(String, String)> {
        match self {
            OpenAiPreset::OpenRouter => vec![
                ("HTTP-Referer".to_string(), "https://github.com/contract-auditor".to_string()),
                ("X-Title".to_string(), "Contract Auditor".to_string()),
            ],
            _ => Vec::new(),
        }
    }
}

/// Provider for any OpenAI-compatible chat completions endpoint.
pub struct OpenAiCompatibleProvider {
    name: String,
    credential: ApiCredential,
    base_url: String,
    headers: Vec<(String, String)>,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatibleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleProvider")
            .field("name", &self.name)
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("headers", &self.headers)
            .finish()
    }
}

impl OpenAiCompatibleProvider {
    /// Create a provider for a preset with an explicit key.
    pub fn new(preset: OpenAiPreset, api_key: impl Into<String>) -> Self {
        Self {
            name: preset.name().to_string(),
            credential: ApiCredential::new(
                api_key,
                CredentialSource::Programmatic,
                preset.credential_name(),
            ),
            base_url: preset.base_url().to_string(),
            headers: preset.default_headers(),
            client: reqwest::Client::new(),
        }
    }

    /// Create from JSON configuration.
    ///
    /// `name` selects a preset when it is one of `openai`, `groq`,
    /// `openrouter` or `gemini` (alias `google`). Any other name needs an
    /// explicit `base_url`.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let name = config["name"].as_str().unwrap_or("openai");
        let preset = OpenAiPreset::from_name(name);

        let base_url = match (config["base_url"].as_str(), preset) {
            (Some(url), _) => url,
            (None, Some(p)) => p.base_url(),
            (None, None) => {
                return Err(ProviderError::NotConfigured(format!(
                    "Provider '{}' needs a base_url",
                    name
                )))
            }
        };

        let default_env = preset.map(|p| p.api_key_env()).unwrap_or("OPENAI_API_KEY");
        let credential_name = preset
            .map(|p| p.credential_name())
            .unwrap_or("OpenAI-compatible API key");
        let credential = ApiCredential::from_config_or_env(config, default_env, credential_name)?;

        let mut headers = preset.map(|p| p.default_headers()).unwrap_or_default();
        if let Some(extra) = config["headers"].as_object() {
            for (key, value) in extra {
                if let Some(value) = value.as_str() {
                    headers.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
                    headers.push((key.clone(), value.to_string()));
                }
            }
        }

        Ok(Self {
            name: name.to_string(),
            credential,
            base_url: base_url.trim_end_matches('/').to_string(),
            headers,
            client: reqwest::Client::new(),
        })
    }

    fn endpoint(&self) -> String {
        if self.base_url.ends_with("/chat/completions") {
            self.base_url.clone()
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    model: Option<String>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: JsonValue,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// Message content is either a string or a list of `{"text": ...}` parts.
fn content_text(content: &JsonValue) -> String {
    match content {
        JsonValue::String(text) => text.clone(),
        JsonValue::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(JsonValue::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = ChatRequest {
            model: &config.model,
            messages: &messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };

        let mut builder = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.credential.expose())
            .timeout(config.timeout)
            .json(&request);
        for (key, value) in &self.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
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
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: truncate_body(&body, 320),
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let choice = body.choices.into_iter().next().ok_or_else(|| {
            ProviderError::ParseError(format!("{} response did not include choices", self.name))
        })?;

        let usage = body
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                ..Default::default()
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            content: content_text(&choice.message.content),
            usage,
            model: body.model.unwrap_or_else(|| config.model.clone()),
            stop_reason: choice.finish_reason,
        })
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Factory for OpenAI-compatible providers.
///
/// ```json
/// {
///   "name": "openrouter",
///   "base_url": "https://openrouter.ai/api/v1",
///   "api_key_env": "OPENROUTER_API_KEY",
///   "headers": { "X-Title": "Contract Auditor" }
/// }
/// ```
pub struct OpenAiCompatibleProviderFactory;

impl ProviderFactory for OpenAiCompatibleProviderFactory {
    fn provider_type(&self) -> &'static str {
        "openai"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(OpenAiCompatibleProvider::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        let name = config["name"].as_str().unwrap_or("openai");

        match config["base_url"].as_str() {
            Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => {
                return Err(ProviderError::NotConfigured(
                    "base_url must start with http:// or https://".to_string(),
                ));
            }
            None if OpenAiPreset::from_name(name).is_none() => {
                return Err(ProviderError::NotConfigured(format!(
                    "Provider '{}' needs a base_url",
                    name
                )));
            }
            _ => {}
        }

        let env = self.default_env_var(config);
        if !ApiCredential::is_available(config, env) {
            return Err(ProviderError::NotConfigured(format!(
                "API key for '{}' required: set 'api_key' in config or {} env",
                name,
                super::secrets::env_var_for(config, env)
            )));
        }

        Ok(())
    }

    fn default_env_var(&self, config: &JsonValue) -> &'static str {
        config["name"]
            .as_str()
            .and_then(OpenAiPreset::from_name)
            .map(|p| p.api_key_env())
            .unwrap_or("OPENAI_API_KEY")
    }

    fn default_model(&self, config: &JsonValue) -> Option<&'static str> {
        config["name"]
            .as_str()
            .and_then(OpenAiPreset::from_name)
            .map(|p| p.default_model())
    }

    fn description(&self) -> &'static str {
        "OpenAI-compatible chat completions (OpenAI, Groq, OpenRouter, Gemini)"
    }
}
