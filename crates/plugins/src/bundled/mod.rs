//! Plugins shipped with the binary.

pub mod command_logger;
pub mod help;
pub mod ping;
pub mod scheduled_push;

use std::sync::Arc;

use {chatrelay_config::BotConfig, tracing::debug};

use crate::{Plugin, PluginRegistry, Result};

pub use {
    command_logger::CommandLoggerPlugin, help::HelpPlugin, ping::PingPlugin,
    scheduled_push::ScheduledPushPlugin,
};

/// Bundled plugins that `plugins_enabled` selects, in registration order.
pub fn bundled_plugins(config: &BotConfig) -> Vec<Arc<dyn Plugin>> {
    let mut plugins: Vec<Arc<dyn Plugin>> = Vec::new();
    if config.plugin_enabled(help::NAME) {
        plugins.push(Arc::new(HelpPlugin));
    }
    if config.plugin_enabled(ping::NAME) {
        plugins.push(Arc::new(PingPlugin));
    }
    if config.plugin_enabled(command_logger::NAME) {
        match CommandLoggerPlugin::from_config(config.plugin_config(command_logger::NAME)) {
            Some(plugin) => plugins.push(Arc::new(plugin)),
            None => debug!("command-logger has no log path, skipping"),
        }
    }
    if config.plugin_enabled(scheduled_push::NAME) {
        let push = ScheduledPushPlugin::from_config(&config.scheduled_tasks);
        if push.is_empty() {
            debug!("no enabled scheduled tasks, skipping scheduled-push");
        } else {
            plugins.push(Arc::new(push));
        }
    }
    plugins
}

/// Register every selected bundled plugin. Returns the registered names.
pub async fn register_bundled(
    registry: &mut PluginRegistry,
    config: &BotConfig,
) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for plugin in bundled_plugins(config) {
        let name = plugin.info().name;
        registry.register(plugin).await?;
        names.push(name);
    }
    Ok(names)
}
