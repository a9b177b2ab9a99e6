use std::sync::Arc;

use {
    chatrelay_channels::ChannelOutbound,
    chatrelay_common::{Event, EventBus, EventKind, InboundMessage, MessageOrigin},
    chatrelay_config::{BotConfig, ResolvedConversation},
    chatrelay_plugins::{CommandDispatch, CommandInvocation, PluginRegistry},
    chatrelay_routing::{AiResult, AiRouter, FailureReason, ResolvedModel},
    chatrelay_sessions::{HistoryStore, Turn},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use chatrelay_metrics::{counter, histogram, labels, pipeline as pipeline_metrics};

use crate::{
    analyze::{self, Analysis, MessageTraits},
    context::{ContextResult, Intent, ProcessingContext},
    error::Error,
    stage::Stage,
};

const SOURCE: &str = "pipeline";

/// What the Routed stage bound.
enum Route {
    Command { name: String, args: String },
    Model { prompt: String, model: ResolvedModel },
}

/// What the Processed stage produced.
enum Produced {
    Command {
        name: String,
        args: String,
        plugin: String,
        text: Option<String>,
    },
    Ai {
        prompt: String,
        text: String,
        model: String,
        provider: String,
    },
}

/// Runs one inbound message through every stage.
///
/// Shared by all conversations; holds no per-message state.
pub struct Pipeline {
    config: Arc<BotConfig>,
    bus: EventBus,
    registry: Arc<PluginRegistry>,
    router: Arc<AiRouter>,
    history: Arc<HistoryStore>,
    outbound: Arc<dyn ChannelOutbound>,
}

impl Pipeline {
    pub fn new(
        config: Arc<BotConfig>,
        bus: EventBus,
        registry: Arc<PluginRegistry>,
        router: Arc<AiRouter>,
        outbound: Arc<dyn ChannelOutbound>,
    ) -> Self {
        Self {
            config,
            bus,
            registry,
            router,
            history: Arc::new(HistoryStore::new()),
            outbound,
        }
    }

    #[must_use]
    pub fn with_history(mut self, history: Arc<HistoryStore>) -> Self {
        self.history = history;
        self
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// Process a message to a terminal stage and return the final context.
    pub async fn process(
        &self,
        message: InboundMessage,
        cancel: &CancellationToken,
    ) -> ProcessingContext {
        let mut ctx = ProcessingContext::new(&message);
        let conversation = self.config.conversation(&message.conversation_id);

        #[cfg(feature = "metrics")]
        counter!(pipeline_metrics::MESSAGES_RECEIVED_TOTAL).increment(1);

        info!(
            context = %ctx.id(),
            conversation = %ctx.conversation_id,
            sender = %ctx.sender_id,
            group = ctx.is_group,
            scheduled = message.is_scheduled(),
            "inbound message"
        );

        if let Err(e) = self.run(&mut ctx, &message, &conversation, cancel).await {
            self.fail(&mut ctx, &conversation, e).await;
        }

        #[cfg(feature = "metrics")]
        {
            counter!(pipeline_metrics::TERMINAL_TOTAL, labels::STAGE => ctx.stage().as_str())
                .increment(1);
            histogram!(pipeline_metrics::PROCESSING_DURATION_SECONDS)
                .record(ctx.elapsed().as_secs_f64());
        }

        info!(
            context = %ctx.id(),
            conversation = %ctx.conversation_id,
            stage = %ctx.stage(),
            elapsed_ms = ctx.elapsed().as_millis() as u64,
            "message finished"
        );
        ctx
    }

    async fn run(
        &self,
        ctx: &mut ProcessingContext,
        message: &InboundMessage,
        conversation: &ResolvedConversation,
        cancel: &CancellationToken,
    ) -> crate::Result<()> {
        // ── Received ───────────────────────────────────────────────────────
        if !conversation.enabled {
            ctx.result = Some(ContextResult::Dropped {
                reason: "conversation disabled".into(),
            });
            return ctx.advance(Stage::Dropped);
        }
        ctx.history_window = self
            .history
            .window(&conversation.id, conversation.max_history);

        // ── Analyzed ───────────────────────────────────────────────────────
        self.bus.publish(self.received_event(ctx, message)).await;

        let text = if ctx.is_group && ctx.mentions_bot {
            analyze::strip_mention(&ctx.raw_text, &self.config.bot_name)
        } else {
            ctx.raw_text.as_str()
        };
        analyze::check_input(text, self.config.max_message_chars).map_err(Error::Malformed)?;

        let traits = MessageTraits {
            is_group: ctx.is_group,
            mentions_bot: ctx.mentions_bot,
            scheduled: message.is_scheduled(),
        };
        let analysis = analyze::classify(
            text,
            &self.config.command_prefix,
            traits,
            conversation,
            &self.registry,
        );
        ctx.advance(Stage::Analyzed)?;

        let intent = match analysis {
            Analysis::Ignored { reason } => {
                debug!(context = %ctx.id(), reason, "message not answered");
                ctx.result = Some(ContextResult::Dropped {
                    reason: reason.to_string(),
                });
                return ctx.advance(Stage::Dropped);
            },
            Analysis::Command { name, args } => Intent::Command { name, args },
            Analysis::FreeText { prompt } => Intent::FreeText { prompt },
        };
        ctx.intent = Some(intent.clone());

        // ── Routed ─────────────────────────────────────────────────────────
        let route = match intent {
            Intent::Command { name, args } => {
                let Some(command) = self.registry.command(&name) else {
                    return Err(Error::CommandNotFound { command: name });
                };
                ctx.selected_plugin = Some(command.plugin);
                Route::Command { name, args }
            },
            Intent::FreeText { prompt } => {
                let model = self.router.resolve(conversation)?;
                ctx.selected_ai_model = Some(model.name.clone());
                Route::Model { prompt, model }
            },
        };
        ctx.advance(Stage::Routed)?;

        // ── Processed ──────────────────────────────────────────────────────
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let produced = match route {
            Route::Command { name, args } => {
                let invocation = CommandInvocation {
                    conversation_id: ctx.conversation_id.clone(),
                    sender_id: ctx.sender_id.clone(),
                    command: name.clone(),
                    args: args.clone(),
                    is_group: ctx.is_group,
                    prefix: self.config.command_prefix.clone(),
                };
                match self.registry.dispatch_command(&name, &invocation).await? {
                    CommandDispatch::Handled { plugin, output } => Produced::Command {
                        name,
                        args,
                        plugin,
                        text: output.text,
                    },
                    CommandDispatch::NotFound => return Err(Error::CommandNotFound { command: name }),
                }
            },
            Route::Model { prompt, model } => {
                self.bus
                    .publish(
                        self.event(EventKind::AiThinking, ctx)
                            .with("model", model.name.as_str()),
                    )
                    .await;
                if let Err(e) = self.outbound.send_typing(&ctx.conversation_id).await {
                    debug!(context = %ctx.id(), error = %e, "typing indicator failed");
                }
                match self
                    .router
                    .invoke(&model, conversation, &ctx.history_window, &prompt, cancel)
                    .await
                {
                    AiResult::Success {
                        text,
                        model,
                        provider,
                        ..
                    } => Produced::Ai {
                        prompt,
                        text,
                        model,
                        provider,
                    },
                    AiResult::Failure {
                        reason: FailureReason::Cancelled,
                        ..
                    } => return Err(Error::Cancelled),
                    AiResult::Failure { detail, .. } => return Err(Error::Provider { detail }),
                }
            },
        };
        ctx.advance(Stage::Processed)?;

        // ── Responded ──────────────────────────────────────────────────────
        ctx.advance(Stage::Responded)?;
        let reply = match produced {
            Produced::Command {
                name,
                args,
                plugin,
                text,
            } => {
                self.bus
                    .publish(
                        self.event(EventKind::CommandMatched, ctx)
                            .with("command", name)
                            .with("args", args)
                            .with("plugin", plugin),
                    )
                    .await;
                text
            },
            Produced::Ai {
                prompt,
                text,
                model,
                provider,
            } => {
                self.history.commit(
                    &conversation.id,
                    Turn::new(prompt, text.clone())
                        .with_sender(ctx.sender_id.clone())
                        .with_model(model.clone()),
                    conversation.max_history,
                );
                self.bus
                    .publish(
                        self.event(EventKind::AiResponse, ctx)
                            .with("text", text.as_str())
                            .with("model", model)
                            .with("provider", provider),
                    )
                    .await;
                Some(text)
            },
        };

        match reply {
            Some(text) => {
                self.deliver(ctx, &text, false).await;
                ctx.result = Some(ContextResult::Reply { text });
            },
            None => ctx.result = Some(ContextResult::Silent),
        }
        Ok(())
    }

    /// Move to `Failed`, report, and send the fallback message.
    async fn fail(
        &self,
        ctx: &mut ProcessingContext,
        conversation: &ResolvedConversation,
        error: Error,
    ) {
        let from = ctx.stage();
        if let Err(violation) = ctx.advance(Stage::Failed) {
            self.bus
                .publish(self.error_event(ctx, "pipeline", from, &violation))
                .await;
            return;
        }

        warn!(
            context = %ctx.id(),
            conversation = %conversation.id,
            stage = %from,
            category = error.category(),
            error = %error,
            "message processing failed"
        );
        ctx.result = Some(ContextResult::Failed {
            category: error.category(),
            detail: error.to_string(),
        });

        if !error.already_reported() {
            self.bus
                .publish(self.error_event(ctx, "pipeline", from, &error))
                .await;
        }

        let fallback = self.config.fallback_message.clone();
        if !fallback.trim().is_empty() {
            self.deliver(ctx, &fallback, true).await;
        }
    }

    /// Hand text to the transport; `MESSAGE_SENT` on success,
    /// `ERROR_OCCURRED` on failure.
    async fn deliver(&self, ctx: &ProcessingContext, text: &str, fallback: bool) {
        match self.outbound.send_text(&ctx.conversation_id, text).await {
            Ok(()) => {
                self.bus
                    .publish(
                        self.event(EventKind::MessageSent, ctx)
                            .with("text", text)
                            .with("fallback", fallback),
                    )
                    .await;
            },
            Err(e) => {
                #[cfg(feature = "metrics")]
                counter!(pipeline_metrics::DELIVERY_FAILURES_TOTAL).increment(1);
                warn!(context = %ctx.id(), conversation = %ctx.conversation_id, error = %e, "delivery failed");
                if !fallback {
                    let err = Error::Channel(e);
                    self.bus
                        .publish(self.error_event(ctx, "delivery", ctx.stage(), &err))
                        .await;
                }
            },
        }
    }

    fn event(&self, kind: EventKind, ctx: &ProcessingContext) -> Event {
        Event::new(kind)
            .with_source(SOURCE)
            .with("context_id", ctx.id().to_string())
            .with("conversation_id", ctx.conversation_id.as_str())
            .with("sender_id", ctx.sender_id.as_str())
    }

    fn received_event(&self, ctx: &ProcessingContext, message: &InboundMessage) -> Event {
        let event = self
            .event(EventKind::MessageReceived, ctx)
            .with("text", message.text.as_str())
            .with("is_group", message.is_group)
            .with("mentions_bot", message.mentions_bot);
        match &message.origin {
            MessageOrigin::Transport => event,
            MessageOrigin::Scheduler { task } => event.with("scheduled_task", task.as_str()),
        }
    }

    fn error_event(
        &self,
        ctx: &ProcessingContext,
        context: &str,
        stage: Stage,
        error: &Error,
    ) -> Event {
        self.event(EventKind::ErrorOccurred, ctx)
            .with("context", context)
            .with("stage", stage.as_str())
            .with("category", error.category())
            .with("error", error.to_string())
    }
}
