use std::fmt;

/// Why a model entry cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigReason {
    UnknownModel,
    Disabled,
    MissingCredentials,
}

impl fmt::Display for ConfigReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UnknownModel => "model is not defined in ai_models",
            Self::Disabled => "model is disabled",
            Self::MissingCredentials => "model has no api_key",
        })
    }
}

/// Routing failures decided before any provider is called.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    /// Configuration problem. Not retried.
    #[error("model {model}: {reason}")]
    Config { model: String, reason: ConfigReason },

    /// No client serves the model's provider.
    #[error("no provider client \"{provider}\" for model {model}")]
    NotFound { model: String, provider: String },
}

impl RoutingError {
    pub fn config(model: impl Into<String>, reason: ConfigReason) -> Self {
        Self::Config {
            model: model.into(),
            reason,
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}
