//! `ping`: liveness check.

use {async_trait::async_trait, chrono::Utc, std::sync::Arc};

use crate::{
    Capability, CommandContext, CommandHandler, CommandOutput, CommandSpec, Plugin, PluginInfo,
};

pub const NAME: &str = "ping";

pub struct PingPlugin;

struct Pong;

#[async_trait]
impl CommandHandler for Pong {
    async fn handle(&self, ctx: CommandContext<'_>) -> anyhow::Result<CommandOutput> {
        if ctx.invocation.args.is_empty() {
            return Ok(CommandOutput::reply("pong"));
        }
        Ok(CommandOutput::reply(format!(
            "pong {} ({})",
            ctx.invocation.args,
            Utc::now().format("%H:%M:%S")
        )))
    }
}

#[async_trait]
impl Plugin for PingPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo::new(NAME, env!("CARGO_PKG_VERSION"))
            .with_description("Replies with pong")
            .with_author("chatrelay")
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Command(vec![
            CommandSpec::new("ping", Arc::new(Pong)).describe("Check that the bot is alive"),
        ])]
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{CommandDispatch, CommandInvocation, PluginRegistry},
        chatrelay_common::EventBus,
    };

    #[tokio::test]
    async fn replies_pong() {
        let mut registry = PluginRegistry::new(EventBus::new());
        registry.register(Arc::new(PingPlugin)).await.unwrap();
        let inv = CommandInvocation {
            conversation_id: "c".into(),
            sender_id: "u".into(),
            command: "ping".into(),
            args: String::new(),
            is_group: false,
            prefix: "/".into(),
        };
        let CommandDispatch::Handled { output, .. } =
            registry.dispatch_command("ping", &inv).await.unwrap()
        else {
            panic!("ping not handled");
        };
        assert_eq!(output.text.as_deref(), Some("pong"));
    }
}
