//! `chatrelay run`: wires config, bus, plugins, router, pipeline, dispatcher
//! and scheduler around the console transport.

use std::{path::Path, sync::Arc};

use {
    anyhow::{Result, bail},
    chatrelay_auto_reply::{Dispatcher, DispatcherConfig, Pipeline},
    chatrelay_channels::{ChannelOutbound, ConsoleInbound, ConsoleOutbound, RateLimitedOutbound},
    chatrelay_common::{Event, EventBus, EventKind, MessageIntake},
    chatrelay_config::{AiModelConfig, BotConfig, Severity, discover_and_load, load_config, validate},
    chatrelay_cron::Scheduler,
    chatrelay_plugins::{PluginRegistry, bundled::register_bundled},
    chatrelay_routing::{AiRouter, EchoProvider, echo::ECHO_PROVIDER_ID},
    tokio::io::BufReader,
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

const SOURCE: &str = "runtime";

/// Load the config snapshot: the explicit path when given, else discovery.
pub fn load(path: Option<&Path>) -> Result<BotConfig> {
    Ok(match path {
        Some(path) => load_config(path)?,
        None => discover_and_load(),
    })
}

pub async fn run(path: Option<&Path>) -> Result<()> {
    let mut config = load(path)?;

    let report = validate(&config);
    for d in &report.diagnostics {
        match d.severity {
            Severity::Error => error!(path = %d.path, "{}", d.message),
            Severity::Warning => warn!(path = %d.path, "{}", d.message),
            Severity::Info => {},
        }
    }
    if report.has_errors() {
        bail!(
            "configuration has {} error(s); run `chatrelay check` for details",
            report.count(Severity::Error)
        );
    }

    if config.ai_models.is_empty() {
        info!(model = %config.default_ai_model, "no ai_models configured, answering free text with the echo provider");
        config.ai_models.insert(config.default_ai_model.clone(), AiModelConfig {
            enabled: true,
            provider: Some(ECHO_PROVIDER_ID.to_string()),
            requires_credentials: false,
            ..Default::default()
        });
    }
    let config = Arc::new(config);

    // ── Core services ────────────────────────────────────────────────────
    let bus = EventBus::new();
    let mut registry =
        PluginRegistry::new(bus.clone()).with_plugin_configs(config.plugin_configs.clone());
    let plugins = register_bundled(&mut registry, &config).await?;
    let tasks = registry.scheduled_tasks();
    let registry = Arc::new(registry);

    let router = Arc::new(AiRouter::from_config(&config).with_client(Arc::new(EchoProvider)));
    let outbound: Arc<dyn ChannelOutbound> = Arc::new(RateLimitedOutbound::new(
        ConsoleOutbound::stdout(),
        config.message_rate_limit,
    ));
    let pipeline = Arc::new(Pipeline::new(
        Arc::clone(&config),
        bus.clone(),
        Arc::clone(&registry),
        router,
        Arc::clone(&outbound),
    ));
    // Interrupt aborts in-flight provider calls. End of input only stops
    // intake and lets queued messages finish.
    let interrupted = CancellationToken::new();
    let shutdown = interrupted.child_token();
    let dispatcher = Dispatcher::with_config(pipeline, DispatcherConfig {
        cancel: interrupted.child_token(),
        ..Default::default()
    });
    let intake: Arc<dyn MessageIntake> = Arc::new(dispatcher.clone());

    // ── Scheduler ────────────────────────────────────────────────────────
    let scheduler = if config.scheduler.enabled && !tasks.is_empty() {
        let scheduler = Scheduler::new(tasks, bus.clone(), Arc::clone(&intake))
            .with_group_conversations(config.groups.keys().cloned());
        Some(Arc::new(scheduler).start(shutdown.child_token()))
    } else {
        None
    };

    bus.publish(
        Event::new(EventKind::BotStarted)
            .with_source(SOURCE)
            .with("bot_name", config.bot_name.as_str())
            .with("plugins", plugins.clone()),
    )
    .await;
    notify_admins(&config, outbound.as_ref(), &plugins).await;
    info!(bot = %config.bot_name, plugins = plugins.len(), "bot started, reading stdin");

    // ── Console transport ────────────────────────────────────────────────
    let interrupt = interrupted.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling in-flight requests");
            interrupt.cancel();
        }
    });
    let console = ConsoleInbound::new(BufReader::new(tokio::io::stdin()), config.bot_name.clone());
    let submitted = console.run(Arc::clone(&intake), shutdown.clone()).await;

    // ── Shutdown ─────────────────────────────────────────────────────────
    shutdown.cancel();
    if let Some(handle) = scheduler
        && let Err(e) = handle.await
    {
        warn!(error = %e, "scheduler task panicked");
    }
    drop(intake);
    dispatcher.shutdown().await;
    drop(dispatcher);

    bus.publish(
        Event::new(EventKind::BotStopped)
            .with_source(SOURCE)
            .with("bot_name", config.bot_name.as_str()),
    )
    .await;

    match Arc::try_unwrap(registry) {
        Ok(mut registry) => registry.unload_all().await,
        Err(_) => warn!("plugin registry still shared, skipping unload"),
    }
    bus.clear();

    let submitted = submitted?;
    info!(submitted, "bot stopped");
    Ok(())
}

async fn notify_admins(config: &BotConfig, outbound: &dyn ChannelOutbound, plugins: &[String]) {
    if config.admin_users.is_empty() {
        return;
    }
    let notice = format!(
        "{} started with {} plugin(s): {}",
        config.bot_name,
        plugins.len(),
        plugins.join(", ")
    );
    for admin in &config.admin_users {
        if let Err(e) = outbound.send_text(admin, &notice).await {
            warn!(admin = %admin, error = %e, "failed to send startup notice");
        }
    }
}
