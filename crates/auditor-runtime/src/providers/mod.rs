//! LLM provider abstractions.
//!
//! Every model call in the pipeline goes through [`LlmProvider`]. Concrete
//! providers are feature-gated:
//! - `anthropic`: [`AnthropicProvider`]
//! - `openai`: [`OpenAiCompatibleProvider`] (OpenAI, Groq, OpenRouter)
//!
//! ## Security
//!
//! All providers hold keys in an [`ApiCredential`], which never prints its
//! value through `Debug` or `Display`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

mod factory;
pub mod secrets;

#[cfg(feature = "anthropic")]
mod anthropic;

#[cfg(feature = "openai")]
mod openai;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicProvider, AnthropicProviderFactory};

#[cfg(feature = "openai")]
pub use openai::{OpenAiCompatibleProvider, OpenAiCompatibleProviderFactory, OpenAiPreset};

/// Errors from a single provider call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }
}

/// Configuration for a completion request.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Sampling temperature; 0.0 is deterministic
    pub temperature: f32,

    /// Network timeout for the request
    pub timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_tokens: 4096,
            temperature: 0.0,
            timeout: Duration::from_secs(60),
        }
    }
}

/// A chat message for LLM completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant"
    pub role: String,

    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Response from an LLM completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,

    /// Model that actually served the request
    pub model: String,

    pub stop_reason: Option<String>,
}

/// Token usage from a completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,

    /// Tokens read from cache (Anthropic)
    pub cache_read_tokens: u32,

    /// Tokens written to cache (Anthropic)
    pub cache_creation_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Provider abstraction allows swapping LLM backends.
///
/// Implementations map transport and API failures onto [`ProviderError`];
/// they never retry on their own. Retries and fallback belong to
/// [`ProviderChain`](crate::resilience::ProviderChain).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Execute a chat completion.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Check if provider is usable (credentials present).
    async fn health_check(&self) -> bool;

    /// Provider name used in logs and attempt records.
    fn name(&self) -> &str;

    /// Estimate tokens for a prompt.
    fn estimate_tokens(&self, text: &str) -> u32 {
        // ~4 chars per token
        (text.len() / 4) as u32
    }
}

/// Split out the system prompt, as APIs with a top-level `system` field want.
#[cfg_attr(not(feature = "anthropic"), allow(dead_code))]
pub(crate) fn split_system(messages: Vec<ChatMessage>) -> (Option<String>, Vec<ChatMessage>) {
    let mut system: Option<String> = None;
    let mut others = Vec::new();

    for msg in messages {
        if msg.role == "system" {
            system = Some(match system {
                Some(existing) => format!("{}\n\n{}", existing, msg.content),
                None => msg.content,
            });
        } else {
            others.push(msg);
        }
    }
    (system, others)
}

/// Parse a `retry-after` header value given in seconds.
#[cfg_attr(not(any(feature = "anthropic", feature = "openai")), allow(dead_code))]
pub(crate) fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Truncate an error body for inclusion in a [`ProviderError`].
#[cfg_attr(not(any(feature = "anthropic", feature = "openai")), allow(dead_code))]
pub(crate) fn truncate_body(body: &str, max_chars: usize) -> String {
    let mut chars = body.chars();
    let truncated: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_creation() {
        assert_eq!(ChatMessage::system("rules").role, "system");
        assert_eq!(ChatMessage::user("Hello!").role, "user");
        assert_eq!(ChatMessage::assistant("Hi there!").role, "assistant");
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage {
            prompt_tokens: 100,
            completion_tokens: 50,
            ..Default::default()
        };
        assert_eq!(usage.total(), 150);
    }

    #[test]
    fn test_default_token_estimate() {
        let provider = crate::testing::ScriptedProvider::new(vec!["{}"]);
        assert_eq!(provider.estimate_tokens("Indemnify and hold harmless"), 6);
        assert_eq!(provider.estimate_tokens(""), 0);
    }

    #[test]
    fn test_split_system_merges_system_messages() {
        let (system, rest) = split_system(vec![
            ChatMessage::system("first"),
            ChatMessage::user("question"),
            ChatMessage::system("second"),
        ]);
        assert_eq!(system.as_deref(), Some("first\n\nsecond"));
        assert_eq!(rest, vec![ChatMessage::user("question")]);
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(Some("2")), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after(Some("0.5")), Some(Duration::from_millis(500)));
        assert_eq!(parse_retry_after(Some("soon")), None);
        assert_eq!(parse_retry_after(None), None);
    }

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body("short", 10), "short");
        assert_eq!(truncate_body("abcdefghij", 4), "abcd...");
    }

    #[test]
    fn test_rate_limited_classification() {
        assert!(ProviderError::RateLimited { retry_after: None }.is_rate_limited());
        assert!(!ProviderError::AuthError.is_rate_limited());
    }
}
