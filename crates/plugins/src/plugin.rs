//! Plugin-facing types.

use std::{fmt, future::Future, pin::Pin, sync::Arc};

use {
    async_trait::async_trait,
    chatrelay_common::{EventBus, EventHandler, EventKind},
    chatrelay_config::ScheduleSpec,
    serde::{Deserialize, Serialize},
};

use crate::registry::PluginRegistry;

/// Static plugin metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    /// Plugins that must be registered first.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl PluginInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: String::new(),
            author: String::new(),
            dependencies: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    #[must_use]
    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }
}

/// What a plugin contributes. Checked once, at registration.
pub enum Capability {
    Command(Vec<CommandSpec>),
    Event(Vec<EventSubscription>),
    Scheduled(Vec<ScheduledTask>),
}

impl Capability {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Command(_) => "command",
            Self::Event(_) => "event",
            Self::Scheduled(_) => "scheduled",
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Command(c) => c.is_empty(),
            Self::Event(e) => e.is_empty(),
            Self::Scheduled(s) => s.is_empty(),
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(c) => f.debug_tuple("Command").field(c).finish(),
            Self::Event(e) => f.debug_tuple("Event").field(e).finish(),
            Self::Scheduled(s) => f.debug_tuple("Scheduled").field(s).finish(),
        }
    }
}

/// Which chats a command answers in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandScope {
    Group,
    Private,
    #[default]
    Both,
}

impl CommandScope {
    pub fn allows(self, is_group: bool) -> bool {
        match self {
            Self::Group => is_group,
            Self::Private => !is_group,
            Self::Both => true,
        }
    }
}

impl fmt::Display for CommandScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Group => "group",
            Self::Private => "private",
            Self::Both => "both",
        })
    }
}

/// A command binding: name, presentation, and handler.
#[derive(Clone)]
pub struct CommandSpec {
    pub name: String,
    pub description: String,
    pub scope: CommandScope,
    /// In group chats, only match when the bot is mentioned.
    pub requires_mention: bool,
    pub handler: Arc<dyn CommandHandler>,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>, handler: Arc<dyn CommandHandler>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            scope: CommandScope::Both,
            requires_mention: false,
            handler,
        }
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn scope(mut self, scope: CommandScope) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn requires_mention(mut self, requires_mention: bool) -> Self {
        self.requires_mention = requires_mention;
        self
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("requires_mention", &self.requires_mention)
            .finish_non_exhaustive()
    }
}

pub struct EventSubscription {
    pub kind: EventKind,
    pub handler: Arc<dyn EventHandler>,
}

impl EventSubscription {
    pub fn new(kind: EventKind, handler: Arc<dyn EventHandler>) -> Self {
        Self { kind, handler }
    }
}

impl fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubscription")
            .field("kind", &self.kind)
            .field("handler", &self.handler.name())
            .finish()
    }
}

/// A time-driven injection of `text` into each target conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub name: String,
    pub schedule: ScheduleSpec,
    pub conversations: Vec<String>,
    pub text: String,
}

/// A parsed command call.
#[derive(Debug, Clone)]
pub struct CommandInvocation {
    pub conversation_id: String,
    pub sender_id: String,
    pub command: String,
    /// Text after the command name, trimmed.
    pub args: String,
    pub is_group: bool,
    /// Prefix the command was written with.
    pub prefix: String,
}

/// What a command handler sees.
pub struct CommandContext<'a> {
    pub invocation: &'a CommandInvocation,
    pub registry: &'a PluginRegistry,
}

/// Reply produced by a command. `None` means nothing is sent back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub text: Option<String>,
}

impl CommandOutput {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }

    pub fn silent() -> Self {
        Self::default()
    }
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, ctx: CommandContext<'_>) -> anyhow::Result<CommandOutput>;
}

type BoxFuture = Pin<Box<dyn Future<Output = anyhow::Result<CommandOutput>> + Send>>;

struct FnCommand<F> {
    f: F,
}

#[async_trait]
impl<F> CommandHandler for FnCommand<F>
where
    F: Fn(CommandInvocation) -> BoxFuture + Send + Sync,
{
    async fn handle(&self, ctx: CommandContext<'_>) -> anyhow::Result<CommandOutput> {
        (self.f)(ctx.invocation.clone()).await
    }
}

/// Wrap an async closure over the invocation as a [`CommandHandler`].
pub fn command_fn<F, Fut>(f: F) -> Arc<dyn CommandHandler>
where
    F: Fn(CommandInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<CommandOutput>> + Send + 'static,
{
    Arc::new(FnCommand {
        f: move |inv| -> BoxFuture { Box::pin(f(inv)) },
    })
}

/// Handed to [`Plugin::on_load`].
pub struct PluginContext<'a> {
    pub bus: &'a EventBus,
    /// Entry from `plugin_configs`, or `Null`.
    pub config: &'a serde_json::Value,
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn info(&self) -> PluginInfo;

    fn capabilities(&self) -> Vec<Capability>;

    async fn on_load(&self, _ctx: PluginContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_unload(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
