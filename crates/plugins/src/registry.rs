//! Plugin registry: command index, bus subscriptions, and scheduled tasks.
//!
//! Built with `&mut self` at startup, then shared behind an `Arc`.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use {
    chatrelay_common::{Event, EventBus, EventKind, SubscriptionId, catch_panic},
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use chatrelay_metrics::{counter, gauge, labels, plugins as plugin_metrics};

use crate::{
    error::{Error, Result},
    plugin::{
        Capability, CommandContext, CommandInvocation, CommandOutput, CommandScope, CommandSpec,
        EventSubscription, Plugin, PluginContext, PluginInfo, ScheduledTask,
    },
};

/// Outcome of [`PluginRegistry::dispatch_command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandDispatch {
    Handled {
        plugin: String,
        output: CommandOutput,
    },
    NotFound,
}

/// Command metadata for help output and intent analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescription {
    pub name: String,
    pub description: String,
    pub plugin: String,
    pub scope: CommandScope,
    pub requires_mention: bool,
}

/// A scheduled task together with the plugin that declared it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredTask {
    pub plugin: String,
    pub task: ScheduledTask,
}

impl RegisteredTask {
    /// `<plugin>.<task>`, unique across the registry.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.plugin, self.task.name)
    }
}

struct BoundCommand {
    plugin: String,
    spec: CommandSpec,
}

struct LoadedPlugin {
    plugin: Arc<dyn Plugin>,
    info: PluginInfo,
    commands: Vec<String>,
    subscriptions: Vec<SubscriptionId>,
    tasks: Vec<ScheduledTask>,
}

/// Everything a plugin contributes, validated but not yet applied.
#[derive(Default)]
struct Staged {
    commands: Vec<CommandSpec>,
    events: Vec<EventSubscription>,
    tasks: Vec<ScheduledTask>,
}

pub struct PluginRegistry {
    bus: EventBus,
    plugin_configs: HashMap<String, serde_json::Value>,
    plugins: Vec<LoadedPlugin>,
    commands: HashMap<String, BoundCommand>,
}

impl PluginRegistry {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            plugin_configs: HashMap::new(),
            plugins: Vec::new(),
            commands: HashMap::new(),
        }
    }

    /// Per-plugin settings handed to `on_load`.
    #[must_use]
    pub fn with_plugin_configs(mut self, configs: HashMap<String, serde_json::Value>) -> Self {
        self.plugin_configs = configs;
        self
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Register a plugin. On any error the registry and the bus are left as
    /// they were.
    pub async fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let info = plugin.info();
        let result = self.try_register(plugin, info.clone()).await;
        match &result {
            Ok(()) => {
                #[cfg(feature = "metrics")]
                gauge!(plugin_metrics::LOADED).set(self.plugins.len() as f64);
            },
            Err(e) if e.is_invariant_violation() => {
                error!(plugin = %info.name, error = %e, "plugin registration rejected");
            },
            Err(e) => warn!(plugin = %info.name, error = %e, "plugin registration failed"),
        }
        result
    }

    async fn try_register(&mut self, plugin: Arc<dyn Plugin>, info: PluginInfo) -> Result<()> {
        let name = info.name.clone();
        if name.trim().is_empty() || name.contains(char::is_whitespace) {
            return Err(Error::invalid_plugin(&name, "plugin name must be a single word"));
        }
        if self.is_registered(&name) {
            return Err(Error::DuplicatePlugin { plugin: name });
        }
        if let Some(missing) = info
            .dependencies
            .iter()
            .find(|dep| !self.is_registered(dep))
        {
            return Err(Error::MissingDependency {
                plugin: name,
                dependency: missing.clone(),
            });
        }

        let staged = self.stage(&name, plugin.capabilities())?;

        let config = self
            .plugin_configs
            .get(&name)
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        catch_panic(plugin.on_load(PluginContext {
            bus: &self.bus,
            config: &config,
        }))
        .await
        .map_err(|e| Error::plugin_failure(&name, None, &e))?;

        // Nothing below can fail.
        let mut commands = Vec::with_capacity(staged.commands.len());
        for spec in staged.commands {
            commands.push(spec.name.clone());
            self.commands.insert(spec.name.clone(), BoundCommand {
                plugin: name.clone(),
                spec,
            });
        }
        let subscriptions: Vec<SubscriptionId> = staged
            .events
            .into_iter()
            .map(|sub| self.bus.subscribe(sub.kind, sub.handler))
            .collect();

        info!(
            plugin = %name,
            version = %info.version,
            commands = commands.len(),
            subscriptions = subscriptions.len(),
            tasks = staged.tasks.len(),
            "plugin registered"
        );
        self.plugins.push(LoadedPlugin {
            plugin,
            info,
            commands,
            subscriptions,
            tasks: staged.tasks,
        });
        Ok(())
    }

    fn stage(&self, plugin: &str, capabilities: Vec<Capability>) -> Result<Staged> {
        if capabilities.is_empty() {
            return Err(Error::invalid_plugin(plugin, "declares no capabilities"));
        }

        let mut staged = Staged::default();
        let mut own_commands = HashSet::new();
        let mut own_tasks = HashSet::new();

        for capability in capabilities {
            if capability.is_empty() {
                return Err(Error::invalid_plugin(
                    plugin,
                    format!("{} capability is empty", capability.kind()),
                ));
            }
            match capability {
                Capability::Command(specs) => {
                    for spec in specs {
                        if spec.name.is_empty() || spec.name.contains(char::is_whitespace) {
                            return Err(Error::invalid_plugin(
                                plugin,
                                format!("invalid command name \"{}\"", spec.name),
                            ));
                        }
                        if let Some(bound) = self.commands.get(&spec.name) {
                            return Err(Error::DuplicateCommand {
                                plugin: plugin.to_string(),
                                command: spec.name,
                                owner: bound.plugin.clone(),
                            });
                        }
                        if !own_commands.insert(spec.name.clone()) {
                            return Err(Error::DuplicateCommand {
                                plugin: plugin.to_string(),
                                command: spec.name,
                                owner: plugin.to_string(),
                            });
                        }
                        staged.commands.push(spec);
                    }
                },
                Capability::Event(subs) => staged.events.extend(subs),
                Capability::Scheduled(tasks) => {
                    for task in tasks {
                        if !own_tasks.insert(task.name.clone()) {
                            return Err(Error::invalid_plugin(
                                plugin,
                                format!("duplicate scheduled task \"{}\"", task.name),
                            ));
                        }
                        task.schedule.check().map_err(|e| {
                            Error::invalid_plugin(plugin, format!("task \"{}\": {e}", task.name))
                        })?;
                        staged.tasks.push(task);
                    }
                },
            }
        }
        Ok(staged)
    }

    /// Remove a plugin's commands, subscriptions, and tasks, then run its
    /// `on_unload`.
    pub async fn unregister(&mut self, name: &str) -> Result<PluginInfo> {
        let Some(index) = self.plugins.iter().position(|p| p.info.name == name) else {
            return Err(Error::NotRegistered {
                plugin: name.to_string(),
            });
        };
        if let Some(dependent) = self
            .plugins
            .iter()
            .find(|p| p.info.dependencies.iter().any(|d| d == name))
        {
            return Err(Error::DependencyInUse {
                plugin: name.to_string(),
                dependent: dependent.info.name.clone(),
            });
        }

        let loaded = self.plugins.remove(index);
        self.detach(&loaded).await;
        #[cfg(feature = "metrics")]
        gauge!(plugin_metrics::LOADED).set(self.plugins.len() as f64);
        Ok(loaded.info)
    }

    /// Replace a registered plugin with a new instance of the same name.
    ///
    /// The old instance is detached and unloaded first. If the new one fails
    /// to register, the old one is registered again and the error returned.
    /// Either way the plugin keeps its place in registration order.
    pub async fn reload(&mut self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let info = plugin.info();
        let name = info.name.clone();
        let Some(index) = self.plugins.iter().position(|p| p.info.name == name) else {
            return Err(Error::NotRegistered { plugin: name });
        };

        let old = self.plugins.remove(index);
        self.detach(&old).await;

        let result = self.try_register(plugin, info).await;
        if let Err(e) = &result {
            warn!(plugin = %name, error = %e, "plugin reload failed, restoring previous instance");
            if let Err(restore) = self
                .try_register(Arc::clone(&old.plugin), old.info.clone())
                .await
            {
                error!(plugin = %name, error = %restore, "previous instance could not be restored");
            }
        }

        if self.plugins.last().is_some_and(|p| p.info.name == name)
            && let Some(reloaded) = self.plugins.pop()
        {
            self.plugins.insert(index, reloaded);
        }
        #[cfg(feature = "metrics")]
        gauge!(plugin_metrics::LOADED).set(self.plugins.len() as f64);
        if result.is_ok() {
            info!(plugin = %name, "plugin reloaded");
        }
        result
    }

    /// Unregister everything, newest first, so dependents go before their
    /// dependencies.
    pub async fn unload_all(&mut self) {
        while let Some(loaded) = self.plugins.pop() {
            self.detach(&loaded).await;
        }
    }

    async fn detach(&mut self, loaded: &LoadedPlugin) {
        for command in &loaded.commands {
            self.commands.remove(command);
        }
        for id in &loaded.subscriptions {
            self.bus.unsubscribe(*id);
        }
        if let Err(e) = catch_panic(loaded.plugin.on_unload()).await {
            warn!(plugin = %loaded.info.name, error = %e, "plugin on_unload failed");
        }
        info!(plugin = %loaded.info.name, "plugin unregistered");
    }

    /// Run a command handler.
    ///
    /// A handler error or panic is published as `ERROR_OCCURRED` and
    /// returned as [`Error::PluginFailure`].
    pub async fn dispatch_command(
        &self,
        name: &str,
        invocation: &CommandInvocation,
    ) -> Result<CommandDispatch> {
        let Some(bound) = self.commands.get(name) else {
            debug!(command = %name, "no plugin bound to command");
            return Ok(CommandDispatch::NotFound);
        };

        #[cfg(feature = "metrics")]
        counter!(plugin_metrics::COMMANDS_TOTAL, labels::COMMAND => name.to_string()).increment(1);

        let ctx = CommandContext {
            invocation,
            registry: self,
        };
        match catch_panic(bound.spec.handler.handle(ctx)).await {
            Ok(output) => Ok(CommandDispatch::Handled {
                plugin: bound.plugin.clone(),
                output,
            }),
            Err(e) => {
                warn!(plugin = %bound.plugin, command = %name, error = %e, "command handler failed");
                #[cfg(feature = "metrics")]
                counter!(plugin_metrics::FAILURES_TOTAL, labels::PLUGIN => bound.plugin.clone())
                    .increment(1);
                self.bus
                    .publish(
                        Event::new(EventKind::ErrorOccurred)
                            .with_source("plugin_registry")
                            .with("context", "plugin")
                            .with("plugin", bound.plugin.as_str())
                            .with("command", name)
                            .with("conversation_id", invocation.conversation_id.as_str())
                            .with("error", format!("{e:#}")),
                    )
                    .await;
                Err(Error::plugin_failure(&bound.plugin, Some(name), &e))
            },
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.plugins.iter().any(|p| p.info.name == name)
    }

    pub fn has_command(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn command(&self, name: &str) -> Option<CommandDescription> {
        self.commands.get(name).map(describe)
    }

    /// Every bound command, sorted by name.
    pub fn command_descriptions(&self) -> Vec<CommandDescription> {
        let mut descriptions: Vec<CommandDescription> =
            self.commands.values().map(describe).collect();
        descriptions.sort_by(|a, b| a.name.cmp(&b.name));
        descriptions
    }

    /// Registered plugins in registration order.
    pub fn plugins(&self) -> impl Iterator<Item = &PluginInfo> {
        self.plugins.iter().map(|p| &p.info)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Plugins that declared a Scheduled capability.
    pub fn scheduled_plugins(&self) -> Vec<&PluginInfo> {
        self.plugins
            .iter()
            .filter(|p| !p.tasks.is_empty())
            .map(|p| &p.info)
            .collect()
    }

    pub fn scheduled_tasks(&self) -> Vec<RegisteredTask> {
        self.plugins
            .iter()
            .flat_map(|p| {
                p.tasks.iter().map(|task| RegisteredTask {
                    plugin: p.info.name.clone(),
                    task: task.clone(),
                })
            })
            .collect()
    }
}

fn describe(bound: &BoundCommand) -> CommandDescription {
    CommandDescription {
        name: bound.spec.name.clone(),
        description: bound.spec.description.clone(),
        plugin: bound.plugin.clone(),
        scope: bound.spec.scope,
        requires_mention: bound.spec.requires_mention,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::plugin::command_fn,
        async_trait::async_trait,
        chatrelay_common::handler_fn,
        chatrelay_config::ScheduleSpec,
        std::sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    /// Test plugin whose capabilities are produced by a closure.
    struct TestPlugin {
        info: PluginInfo,
        caps: Box<dyn Fn() -> Vec<Capability> + Send + Sync>,
        fail_load: bool,
        loads: AtomicUsize,
        unloads: AtomicUsize,
        seen_config: Mutex<Option<serde_json::Value>>,
    }

    impl TestPlugin {
        fn new(name: &str, caps: impl Fn() -> Vec<Capability> + Send + Sync + 'static) -> Self {
            Self {
                info: PluginInfo::new(name, "1.0.0"),
                caps: Box::new(caps),
                fail_load: false,
                loads: AtomicUsize::new(0),
                unloads: AtomicUsize::new(0),
                seen_config: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl Plugin for TestPlugin {
        fn info(&self) -> PluginInfo {
            self.info.clone()
        }

        fn capabilities(&self) -> Vec<Capability> {
            (self.caps)()
        }

        async fn on_load(&self, ctx: PluginContext<'_>) -> anyhow::Result<()> {
            *self.seen_config.lock().unwrap() = Some(ctx.config.clone());
            if self.fail_load {
                anyhow::bail!("refusing to load");
            }
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_unload(&self) -> anyhow::Result<()> {
            self.unloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn reply(text: &'static str) -> CommandSpec {
        CommandSpec::new(
            text,
            command_fn(move |_| async move { Ok(CommandOutput::reply(format!("{text} from handler"))) }),
        )
    }

    fn commands(names: &'static [&'static str]) -> impl Fn() -> Vec<Capability> + Send + Sync {
        move || vec![Capability::Command(names.iter().map(|n| reply(n)).collect())]
    }

    fn invocation(command: &str) -> CommandInvocation {
        CommandInvocation {
            conversation_id: "c1".into(),
            sender_id: "u1".into(),
            command: command.into(),
            args: String::new(),
            is_group: false,
            prefix: "/".into(),
        }
    }

    fn noop_event() -> Capability {
        Capability::Event(vec![EventSubscription::new(
            EventKind::MessageReceived,
            handler_fn("noop", |_| Ok(())),
        )])
    }

    #[tokio::test]
    async fn dispatch_reaches_owner_until_unregistered() {
        let mut registry = PluginRegistry::new(EventBus::new());
        let a = Arc::new(TestPlugin::new("a", commands(&["hello"])));
        registry.register(a.clone()).await.unwrap();
        assert_eq!(a.loads.load(Ordering::SeqCst), 1);

        let out = registry
            .dispatch_command("hello", &invocation("hello"))
            .await
            .unwrap();
        assert_eq!(out, CommandDispatch::Handled {
            plugin: "a".into(),
            output: CommandOutput::reply("hello from handler"),
        });

        registry.unregister("a").await.unwrap();
        assert_eq!(a.unloads.load(Ordering::SeqCst), 1);
        assert_eq!(
            registry
                .dispatch_command("hello", &invocation("hello"))
                .await
                .unwrap(),
            CommandDispatch::NotFound
        );
    }

    #[tokio::test]
    async fn colliding_command_leaves_registry_unchanged() {
        let bus = EventBus::new();
        let mut registry = PluginRegistry::new(bus.clone());
        registry
            .register(Arc::new(TestPlugin::new("a", commands(&["hello"]))))
            .await
            .unwrap();

        let b = Arc::new(TestPlugin::new("b", || {
            vec![noop_event(), Capability::Command(vec![reply("bye"), reply("hello")])]
        }));
        let err = registry.register(b.clone()).await.unwrap_err();
        assert!(matches!(
            &err,
            Error::DuplicateCommand { command, owner, .. } if command == "hello" && owner == "a"
        ));
        assert!(err.is_invariant_violation());

        assert_eq!(registry.len(), 1);
        assert!(!registry.has_command("bye"));
        assert_eq!(registry.command("hello").unwrap().plugin, "a");
        assert_eq!(bus.subscription_count(), 0);
        assert_eq!(b.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn duplicate_within_one_plugin_rejected() {
        let mut registry = PluginRegistry::new(EventBus::new());
        let err = registry
            .register(Arc::new(TestPlugin::new("a", commands(&["x", "x"]))))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateCommand { owner, .. } if owner == "a"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn duplicate_plugin_name_rejected() {
        let mut registry = PluginRegistry::new(EventBus::new());
        registry
            .register(Arc::new(TestPlugin::new("a", commands(&["x"]))))
            .await
            .unwrap();
        let err = registry
            .register(Arc::new(TestPlugin::new("a", commands(&["y"]))))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicatePlugin { .. }));
        assert!(!registry.has_command("y"));
    }

    #[tokio::test]
    async fn missing_or_empty_capabilities_are_invalid() {
        let mut registry = PluginRegistry::new(EventBus::new());
        let err = registry
            .register(Arc::new(TestPlugin::new("none", Vec::new)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPlugin { .. }));

        let err = registry
            .register(Arc::new(TestPlugin::new("empty", || {
                vec![Capability::Event(vec![])]
            })))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("event capability is empty"));
    }

    #[tokio::test]
    async fn dependencies_are_enforced() {
        let mut registry = PluginRegistry::new(EventBus::new());
        let mut child = TestPlugin::new("child", commands(&["c"]));
        child.info = child.info.clone().depends_on("base");
        let child = Arc::new(child);

        let err = registry.register(child.clone()).await.unwrap_err();
        assert!(matches!(err, Error::MissingDependency { dependency, .. } if dependency == "base"));

        registry
            .register(Arc::new(TestPlugin::new("base", commands(&["b"]))))
            .await
            .unwrap();
        registry.register(child).await.unwrap();

        let err = registry.unregister("base").await.unwrap_err();
        assert!(matches!(err, Error::DependencyInUse { dependent, .. } if dependent == "child"));
        registry.unregister("child").await.unwrap();
        registry.unregister("base").await.unwrap();
    }

    #[tokio::test]
    async fn failed_on_load_commits_nothing() {
        let bus = EventBus::new();
        let mut registry = PluginRegistry::new(bus.clone());
        let mut plugin = TestPlugin::new("flaky", || {
            vec![noop_event(), Capability::Command(vec![reply("x")])]
        });
        plugin.fail_load = true;

        let err = registry.register(Arc::new(plugin)).await.unwrap_err();
        assert!(matches!(err, Error::PluginFailure { command: None, .. }));
        assert!(registry.is_empty());
        assert!(!registry.has_command("x"));
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn event_subscriptions_follow_plugin_lifetime() {
        let bus = EventBus::new();
        let mut registry = PluginRegistry::new(bus.clone());
        registry
            .register(Arc::new(TestPlugin::new("listener", || vec![noop_event()])))
            .await
            .unwrap();
        assert_eq!(bus.subscriber_count(EventKind::MessageReceived), 1);

        registry.unregister("listener").await.unwrap();
        assert_eq!(bus.subscriber_count(EventKind::MessageReceived), 0);
    }

    #[tokio::test]
    async fn handler_failure_is_published_with_identity() {
        let bus = EventBus::new();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        bus.subscribe(
            EventKind::ErrorOccurred,
            handler_fn("sink", move |e| {
                sink.lock().unwrap().push(e.clone());
                Ok(())
            }),
        );

        let mut registry = PluginRegistry::new(bus);
        registry
            .register(Arc::new(TestPlugin::new("broken", || {
                vec![Capability::Command(vec![CommandSpec::new(
                    "explode",
                    command_fn(|_| async { anyhow::bail!("kaboom") }),
                )])]
            })))
            .await
            .unwrap();

        let err = registry
            .dispatch_command("explode", &invocation("explode"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PluginFailure { .. }));

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].get_str("plugin"), Some("broken"));
        assert_eq!(errors[0].get_str("command"), Some("explode"));
        assert_eq!(errors[0].get_str("error"), Some("kaboom"));
    }

    #[tokio::test]
    async fn panicking_handler_becomes_plugin_failure() {
        let bus = EventBus::new();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        bus.subscribe(
            EventKind::ErrorOccurred,
            handler_fn("sink", move |e| {
                sink.lock().unwrap().push(e.clone());
                Ok(())
            }),
        );

        let mut registry = PluginRegistry::new(bus);
        registry
            .register(Arc::new(TestPlugin::new("wild", || {
                vec![Capability::Command(vec![
                    CommandSpec::new(
                        "crash",
                        command_fn(|_| async { panic!("index out of range") }),
                    ),
                    reply("calm"),
                ])]
            })))
            .await
            .unwrap();

        let err = registry
            .dispatch_command("crash", &invocation("crash"))
            .await
            .unwrap_err();
        assert!(matches!(
            &err,
            Error::PluginFailure { plugin, command: Some(command), message }
                if plugin == "wild" && command == "crash" && message.contains("index out of range")
        ));
        assert_eq!(
            errors.lock().unwrap()[0].get_str("error"),
            Some("panicked: index out of range")
        );
        assert!(matches!(
            registry.dispatch_command("calm", &invocation("calm")).await,
            Ok(CommandDispatch::Handled { .. })
        ));
    }

    #[tokio::test]
    async fn scheduled_tasks_are_exposed_and_checked() {
        let mut registry = PluginRegistry::new(EventBus::new());
        let task = |name: &str, every: &str| ScheduledTask {
            name: name.into(),
            schedule: ScheduleSpec::Every {
                every: every.into(),
            },
            conversations: vec!["g1".into()],
            text: "/ping".into(),
        };

        let bad = task("t", "whenever");
        let err = registry
            .register(Arc::new(TestPlugin::new("bad", move || {
                vec![Capability::Scheduled(vec![bad.clone()])]
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPlugin { .. }));

        let good = task("news", "1h");
        registry
            .register(Arc::new(TestPlugin::new("push", move || {
                vec![Capability::Scheduled(vec![good.clone()])]
            })))
            .await
            .unwrap();
        registry
            .register(Arc::new(TestPlugin::new("plain", commands(&["p"]))))
            .await
            .unwrap();

        let tasks = registry.scheduled_tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].qualified_name(), "push.news");
        let scheduled: Vec<&str> = registry
            .scheduled_plugins()
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(scheduled, ["push"]);
    }

    #[tokio::test]
    async fn reload_swaps_commands_in_place() {
        let mut registry = PluginRegistry::new(EventBus::new());
        let old = Arc::new(TestPlugin::new("a", commands(&["hello"])));
        registry.register(old.clone()).await.unwrap();
        registry
            .register(Arc::new(TestPlugin::new("b", commands(&["other"]))))
            .await
            .unwrap();

        let new = Arc::new(TestPlugin::new("a", commands(&["bye"])));
        registry.reload(new.clone()).await.unwrap();

        assert_eq!(old.unloads.load(Ordering::SeqCst), 1);
        assert_eq!(new.loads.load(Ordering::SeqCst), 1);
        assert!(!registry.has_command("hello"));
        assert_eq!(registry.command("bye").unwrap().plugin, "a");
        let order: Vec<&str> = registry.plugins().map(|p| p.name.as_str()).collect();
        assert_eq!(order, ["a", "b"]);
    }

    #[tokio::test]
    async fn failed_reload_restores_previous_instance() {
        let bus = EventBus::new();
        let mut registry = PluginRegistry::new(bus.clone());
        let old = Arc::new(TestPlugin::new("a", || {
            vec![noop_event(), Capability::Command(vec![reply("hello")])]
        }));
        registry.register(old.clone()).await.unwrap();

        let mut broken = TestPlugin::new("a", commands(&["bye"]));
        broken.fail_load = true;
        let err = registry.reload(Arc::new(broken)).await.unwrap_err();
        assert!(matches!(err, Error::PluginFailure { .. }));

        assert_eq!(old.loads.load(Ordering::SeqCst), 2);
        assert!(registry.has_command("hello"));
        assert!(!registry.has_command("bye"));
        assert_eq!(bus.subscriber_count(EventKind::MessageReceived), 1);

        let err = registry
            .reload(Arc::new(TestPlugin::new("ghost", commands(&["g"]))))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotRegistered { .. }));
    }

    #[tokio::test]
    async fn on_load_receives_plugin_config() {
        let configs = HashMap::from([("cfg".to_string(), serde_json::json!({"path": "/tmp/x"}))]);
        let mut registry = PluginRegistry::new(EventBus::new()).with_plugin_configs(configs);
        let plugin = Arc::new(TestPlugin::new("cfg", commands(&["c"])));
        registry.register(plugin.clone()).await.unwrap();
        assert_eq!(
            plugin.seen_config.lock().unwrap().as_ref().unwrap()["path"],
            "/tmp/x"
        );
    }

    #[tokio::test]
    async fn descriptions_sorted_and_unload_all_clears() {
        let bus = EventBus::new();
        let mut registry = PluginRegistry::new(bus.clone());
        registry
            .register(Arc::new(TestPlugin::new("a", commands(&["zeta", "alpha"]))))
            .await
            .unwrap();
        registry
            .register(Arc::new(TestPlugin::new("b", || vec![noop_event()])))
            .await
            .unwrap();
        let names: Vec<String> = registry
            .command_descriptions()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, ["alpha", "zeta"]);

        registry.unload_all().await;
        assert!(registry.is_empty());
        assert!(registry.command_descriptions().is_empty());
        assert_eq!(bus.subscription_count(), 0);
    }
}
