use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    chatrelay_config::{AiModelConfig, BotConfig, ResolvedConversation},
    chatrelay_sessions::{HistoryMessage, Turn},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use {
    chatrelay_metrics::{counter, histogram, labels, routing as routing_metrics},
    std::time::Instant,
};

use crate::{
    CompletionRequest, ConfigReason, ProviderClient, RetryingProvider, RoutingError, Usage,
};

/// Normalized outcome of a provider invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiResult {
    Success {
        text: String,
        model: String,
        provider: String,
        usage: Usage,
    },
    Failure {
        detail: String,
        reason: FailureReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Provider,
    Timeout,
    Cancelled,
}

/// A model entry that passed resolution, bound to its client.
#[derive(Clone)]
pub struct ResolvedModel {
    /// Key in `ai_models`.
    pub name: String,
    pub provider: String,
    pub config: Arc<AiModelConfig>,
    client: Arc<dyn ProviderClient>,
}

impl std::fmt::Debug for ResolvedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedModel")
            .field("name", &self.name)
            .field("provider", &self.provider)
            .field("model", &self.config.model)
            .finish_non_exhaustive()
    }
}

/// Immutable model table plus the registered provider clients.
#[derive(Default)]
pub struct AiRouter {
    models: HashMap<String, Arc<AiModelConfig>>,
    clients: HashMap<String, Arc<dyn ProviderClient>>,
}

impl AiRouter {
    pub fn new(models: HashMap<String, AiModelConfig>) -> Self {
        Self {
            models: models
                .into_iter()
                .map(|(name, cfg)| (name, Arc::new(cfg)))
                .collect(),
            clients: HashMap::new(),
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(config.ai_models.clone())
    }

    /// Register a client under its [`ProviderClient::id`]. A later
    /// registration with the same id replaces the earlier one.
    #[must_use]
    pub fn with_client(mut self, client: Arc<dyn ProviderClient>) -> Self {
        let id = client.id().to_string();
        if self.clients.insert(id.clone(), client).is_some() {
            warn!(provider = %id, "provider client replaced");
        }
        self
    }

    pub fn model_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn has_client(&self, provider: &str) -> bool {
        self.clients.contains_key(provider)
    }

    /// Pick the model for a conversation. No provider is contacted.
    pub fn resolve(
        &self,
        conversation: &ResolvedConversation,
    ) -> Result<ResolvedModel, RoutingError> {
        let result = self.resolve_model(&conversation.ai_model);
        if let Err(e) = &result {
            warn!(conversation = %conversation.id, error = %e, "model resolution failed");
            #[cfg(feature = "metrics")]
            if e.is_config() {
                counter!(routing_metrics::CONFIG_REJECTIONS_TOTAL, labels::MODEL => conversation.ai_model.clone())
                    .increment(1);
            }
        }
        result
    }

    fn resolve_model(&self, name: &str) -> Result<ResolvedModel, RoutingError> {
        let Some(config) = self.models.get(name) else {
            return Err(RoutingError::config(name, ConfigReason::UnknownModel));
        };
        if !config.enabled {
            return Err(RoutingError::config(name, ConfigReason::Disabled));
        }
        if config.requires_credentials && !config.has_credentials() {
            return Err(RoutingError::config(name, ConfigReason::MissingCredentials));
        }
        let provider = config.provider.clone().unwrap_or_else(|| name.to_string());
        let Some(client) = self.clients.get(&provider) else {
            return Err(RoutingError::NotFound {
                model: name.to_string(),
                provider,
            });
        };
        Ok(ResolvedModel {
            name: name.to_string(),
            provider,
            config: Arc::clone(config),
            client: Arc::clone(client),
        })
    }

    /// Call the resolved model. Every provider outcome, including timeout
    /// and cancellation, comes back as an [`AiResult`].
    pub async fn invoke(
        &self,
        resolved: &ResolvedModel,
        conversation: &ResolvedConversation,
        history: &[Turn],
        prompt: &str,
        cancel: &CancellationToken,
    ) -> AiResult {
        let request = build_request(resolved, conversation, history, prompt);
        let client = RetryingProvider::new(Arc::clone(&resolved.client), resolved.config.max_retries);
        let timeout = Duration::from_secs(resolved.config.timeout_secs.max(1));

        debug!(
            conversation = %conversation.id,
            model = %resolved.name,
            provider = %resolved.provider,
            history = request.history.len(),
            "invoking provider"
        );
        #[cfg(feature = "metrics")]
        let started = Instant::now();

        let outcome = tokio::select! {
            _ = cancel.cancelled() => None,
            res = tokio::time::timeout(timeout, client.complete(&request)) => Some(res),
        };

        #[cfg(feature = "metrics")]
        histogram!(routing_metrics::COMPLETION_DURATION_SECONDS, labels::MODEL => resolved.name.clone())
            .record(started.elapsed().as_secs_f64());

        let result = match outcome {
            None => AiResult::Failure {
                detail: "request cancelled".into(),
                reason: FailureReason::Cancelled,
            },
            Some(Err(_)) => AiResult::Failure {
                detail: format!("provider timed out after {}s", timeout.as_secs()),
                reason: FailureReason::Timeout,
            },
            Some(Ok(Err(e))) => AiResult::Failure {
                detail: e.to_string(),
                reason: FailureReason::Provider,
            },
            Some(Ok(Ok(response))) => AiResult::Success {
                text: response.text,
                model: resolved.name.clone(),
                provider: resolved.provider.clone(),
                usage: response.usage,
            },
        };

        match &result {
            AiResult::Success { usage, .. } => {
                info!(
                    conversation = %conversation.id,
                    model = %resolved.name,
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "completion succeeded"
                );
                #[cfg(feature = "metrics")]
                counter!(routing_metrics::COMPLETIONS_TOTAL, labels::MODEL => resolved.name.clone())
                    .increment(1);
            },
            AiResult::Failure { detail, reason } => {
                warn!(
                    conversation = %conversation.id,
                    model = %resolved.name,
                    reason = ?reason,
                    detail = %detail,
                    "completion failed"
                );
                #[cfg(feature = "metrics")]
                counter!(routing_metrics::FAILURES_TOTAL, labels::MODEL => resolved.name.clone())
                    .increment(1);
            },
        }
        result
    }

    /// [`resolve`](Self::resolve) then [`invoke`](Self::invoke).
    pub async fn route(
        &self,
        conversation: &ResolvedConversation,
        history: &[Turn],
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<AiResult, RoutingError> {
        let resolved = self.resolve(conversation)?;
        Ok(self
            .invoke(&resolved, conversation, history, prompt, cancel)
            .await)
    }
}

fn build_request(
    resolved: &ResolvedModel,
    conversation: &ResolvedConversation,
    history: &[Turn],
    prompt: &str,
) -> CompletionRequest {
    let skip = history.len().saturating_sub(conversation.max_history);
    let history: Vec<HistoryMessage> = history[skip..].iter().flat_map(Turn::messages).collect();
    let config = &resolved.config;
    CompletionRequest {
        conversation_id: conversation.id.clone(),
        model: if config.model.is_empty() {
            resolved.name.clone()
        } else {
            config.model.clone()
        },
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        history,
        prompt: prompt.to_string(),
        base_url: config.base_url.clone(),
        api_key: config.api_key.clone(),
        extra_params: config.extra_params.clone(),
    }
}
