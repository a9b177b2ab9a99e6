//! Select and invoke the AI backend for a conversation.
//!
//! Resolution is a pure lookup against the model table built once from
//! configuration:
//! 1. The conversation's `ai_model` must name an entry in `ai_models`.
//! 2. The entry must be enabled.
//! 3. The entry must carry credentials unless `requires_credentials = false`.
//! 4. A client must be registered for the entry's provider.
//!
//! Invocation normalizes every provider outcome into [`AiResult`].

pub mod echo;
pub mod error;
pub mod provider;
pub mod retry;
pub mod router;

pub use {
    echo::EchoProvider,
    error::{ConfigReason, RoutingError},
    provider::{CompletionRequest, CompletionResponse, ProviderClient, ProviderError, Usage},
    retry::RetryingProvider,
    router::{AiResult, AiRouter, FailureReason, ResolvedModel},
};
