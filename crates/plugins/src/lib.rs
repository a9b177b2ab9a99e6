//! Plugin system: capability declarations, the registry, and bundled plugins.
//!
//! A plugin declares a fixed list of [`Capability`] values. The registry checks
//! them at registration, indexes commands by name, subscribes event handlers
//! on the bus, and exposes scheduled tasks to the scheduler.

pub mod bundled;
pub mod error;
pub mod plugin;
pub mod registry;

pub use {
    error::{Error, Result},
    plugin::{
        Capability, CommandContext, CommandHandler, CommandInvocation, CommandOutput, CommandScope,
        CommandSpec, EventSubscription, Plugin, PluginContext, PluginInfo, ScheduledTask,
        command_fn,
    },
    registry::{CommandDescription, CommandDispatch, PluginRegistry, RegisteredTask},
};
