use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The plugin's capability declaration is unusable.
    #[error("invalid plugin {plugin}: {reason}")]
    InvalidPlugin { plugin: String, reason: String },

    #[error("plugin {plugin} is already registered")]
    DuplicatePlugin { plugin: String },

    /// A command name is already bound, possibly by the same plugin.
    #[error("plugin {plugin}: command \"{command}\" is already registered by {owner}")]
    DuplicateCommand {
        plugin: String,
        command: String,
        owner: String,
    },

    #[error("plugin {plugin} depends on {dependency}, which is not registered")]
    MissingDependency { plugin: String, dependency: String },

    #[error("plugin {plugin} is required by {dependent}")]
    DependencyInUse { plugin: String, dependent: String },

    #[error("plugin {plugin} is not registered")]
    NotRegistered { plugin: String },

    /// A plugin callback or command handler raised.
    #[error("plugin {plugin} failed{}: {message}", in_command(.command))]
    PluginFailure {
        plugin: String,
        command: Option<String>,
        message: String,
    },
}

impl Error {
    #[must_use]
    pub fn invalid_plugin(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPlugin {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn plugin_failure(
        plugin: impl Into<String>,
        command: Option<&str>,
        error: &anyhow::Error,
    ) -> Self {
        Self::PluginFailure {
            plugin: plugin.into(),
            command: command.map(str::to_string),
            message: format!("{error:#}"),
        }
    }

    /// Duplicate registrations break registry invariants rather than being
    /// plugin runtime failures.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::DuplicatePlugin { .. } | Self::DuplicateCommand { .. }
        )
    }
}

fn in_command(command: &Option<String>) -> String {
    command
        .as_ref()
        .map(|c| format!(" in command \"{c}\""))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;
