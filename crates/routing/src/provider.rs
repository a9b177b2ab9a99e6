use std::collections::HashMap;

use {async_trait::async_trait, chatrelay_sessions::HistoryMessage, secrecy::Secret};

/// Everything a provider needs for one completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub conversation_id: String,
    /// Provider-side model identifier, e.g. `gpt-4o`.
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Prior messages, oldest first.
    pub history: Vec<HistoryMessage>,
    pub prompt: String,
    pub base_url: Option<String>,
    pub api_key: Option<Secret<String>>,
    pub extra_params: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    pub text: String,
    pub usage: Usage,
}

impl CompletionResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: Usage::default(),
        }
    }
}

/// Normalized provider failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// 429 or equivalent.
    #[error("rate limited: {0}")]
    RateLimit(String),
    /// 401/403: bad key or permissions.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// 5xx or overloaded.
    #[error("server error: {0}")]
    Server(String),
    /// The request itself is wrong and will fail everywhere.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Whether another attempt could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit(_) | Self::Server(_) | Self::Transport(_)
        )
    }

    /// Classify a free-form provider error message.
    #[must_use]
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let msg = message.to_lowercase();
        let has = |patterns: &[&str]| patterns.iter().any(|p| msg.contains(p));

        if has(&["429", "rate limit", "rate_limit", "too many requests"]) {
            Self::RateLimit(message)
        } else if has(&["401", "403", "unauthorized", "forbidden", "invalid api key"]) {
            Self::Auth(message)
        } else if has(&[
            "500",
            "502",
            "503",
            "504",
            "internal server error",
            "service unavailable",
            "overloaded",
        ]) {
            Self::Server(message)
        } else if has(&["400", "bad request", "invalid_request"]) {
            Self::InvalidRequest(message)
        } else if has(&["connection", "timed out", "dns", "reset by peer"]) {
            Self::Transport(message)
        } else {
            Self::Other(message)
        }
    }
}

/// A concrete AI backend.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Provider id matched against `ai_models.<name>.provider`.
    fn id(&self) -> &str;

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError>;
}
