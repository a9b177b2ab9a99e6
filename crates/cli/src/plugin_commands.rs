use std::path::Path;

use {
    anyhow::Result,
    chatrelay_common::EventBus,
    chatrelay_plugins::{PluginRegistry, bundled::register_bundled},
};

use crate::runtime::load;

/// Print what `run` would load for the current config.
pub async fn list(path: Option<&Path>) -> Result<()> {
    let config = load(path)?;
    let mut registry =
        PluginRegistry::new(EventBus::new()).with_plugin_configs(config.plugin_configs.clone());
    register_bundled(&mut registry, &config).await?;

    if registry.is_empty() {
        println!("No plugins enabled.");
        return Ok(());
    }

    println!("Plugins:");
    for info in registry.plugins() {
        if info.description.is_empty() {
            println!("  {} {}", info.name, info.version);
        } else {
            println!("  {} {}: {}", info.name, info.version, info.description);
        }
    }

    let commands = registry.command_descriptions();
    if !commands.is_empty() {
        println!("\nCommands:");
        for cmd in &commands {
            let mention = if cmd.requires_mention {
                ", mention required in groups"
            } else {
                ""
            };
            println!(
                "  {}{} [{}{}] ({}): {}",
                config.command_prefix, cmd.name, cmd.scope, mention, cmd.plugin, cmd.description
            );
        }
    }

    let tasks = registry.scheduled_tasks();
    if !tasks.is_empty() {
        println!("\nScheduled tasks:");
        for task in &tasks {
            println!(
                "  {} {} -> {}",
                task.qualified_name(),
                task.task.schedule,
                task.task.conversations.join(", ")
            );
        }
    }

    registry.unload_all().await;
    Ok(())
}
