use {
    chatrelay_routing::RoutingError,
    uuid::Uuid,
};

use crate::{analyze::Malformed, stage::Stage};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transition out of a terminal stage, or along a missing edge.
    #[error("context {context_id}: illegal transition {from} -> {to}")]
    InvariantViolation {
        context_id: Uuid,
        from: Stage,
        to: Stage,
    },

    #[error("malformed input: {0}")]
    Malformed(Malformed),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("command \"{command}\" is not registered")]
    CommandNotFound { command: String },

    #[error(transparent)]
    Plugin(#[from] chatrelay_plugins::Error),

    #[error("provider failure: {detail}")]
    Provider { detail: String },

    #[error("processing cancelled")]
    Cancelled,

    #[error(transparent)]
    Channel(#[from] chatrelay_channels::Error),
}

impl Error {
    /// Error class reported in `ERROR_OCCURRED` payloads.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvariantViolation { .. } => "invariant",
            Self::Malformed(_) => "input",
            Self::Routing(RoutingError::Config { .. }) => "configuration",
            Self::Routing(RoutingError::NotFound { .. }) | Self::CommandNotFound { .. } => {
                "routing"
            },
            Self::Plugin(e) if e.is_invariant_violation() => "invariant",
            Self::Plugin(_) => "plugin",
            Self::Provider { .. } => "provider",
            Self::Cancelled => "cancelled",
            Self::Channel(_) => "delivery",
        }
    }

    /// Failures already published on the bus by the component that raised
    /// them.
    pub(crate) fn already_reported(&self) -> bool {
        matches!(
            self,
            Self::Plugin(chatrelay_plugins::Error::PluginFailure { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
