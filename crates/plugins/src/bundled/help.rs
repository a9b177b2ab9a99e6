//! `help`: lists the commands usable in the current chat.

use {async_trait::async_trait, std::sync::Arc};

use crate::{
    Capability, CommandContext, CommandHandler, CommandOutput, CommandSpec, Plugin, PluginInfo,
};

pub const NAME: &str = "help";

pub struct HelpPlugin;

struct ListCommands;

#[async_trait]
impl CommandHandler for ListCommands {
    async fn handle(&self, ctx: CommandContext<'_>) -> anyhow::Result<CommandOutput> {
        let inv = ctx.invocation;
        let prefix = &inv.prefix;

        if !inv.args.is_empty() {
            let wanted = inv.args.trim_start_matches(prefix.as_str());
            let text = match ctx.registry.command(wanted) {
                Some(cmd) => {
                    let mut text = format!("{prefix}{} - {}", cmd.name, cmd.description);
                    text.push_str(&format!("\nscope: {}", cmd.scope));
                    if cmd.requires_mention {
                        text.push_str(", requires a mention in groups");
                    }
                    text.push_str(&format!("\nprovided by: {}", cmd.plugin));
                    text
                },
                None => format!("Unknown command: {prefix}{wanted}"),
            };
            return Ok(CommandOutput::reply(text));
        }

        let lines: Vec<String> = ctx
            .registry
            .command_descriptions()
            .into_iter()
            .filter(|cmd| cmd.scope.allows(inv.is_group))
            .map(|cmd| {
                if cmd.description.is_empty() {
                    format!("{prefix}{}", cmd.name)
                } else {
                    format!("{prefix}{} - {}", cmd.name, cmd.description)
                }
            })
            .collect();
        Ok(CommandOutput::reply(format!(
            "Available commands:\n{}",
            lines.join("\n")
        )))
    }
}

#[async_trait]
impl Plugin for HelpPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo::new(NAME, env!("CARGO_PKG_VERSION"))
            .with_description("Lists available commands")
            .with_author("chatrelay")
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Command(vec![
            CommandSpec::new("help", Arc::new(ListCommands)).describe("Show this list"),
        ])]
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            CommandDispatch, CommandInvocation, CommandScope, PluginRegistry,
            bundled::PingPlugin, command_fn,
        },
        chatrelay_common::EventBus,
    };

    struct GroupOnly;

    #[async_trait]
    impl Plugin for GroupOnly {
        fn info(&self) -> PluginInfo {
            PluginInfo::new("group-only", "0.1.0")
        }

        fn capabilities(&self) -> Vec<Capability> {
            vec![Capability::Command(vec![
                CommandSpec::new(
                    "roll",
                    command_fn(|_| async { Ok(CommandOutput::reply("4")) }),
                )
                .describe("Roll a die")
                .scope(CommandScope::Group)
                .requires_mention(true),
            ])]
        }
    }

    async fn registry() -> PluginRegistry {
        let mut registry = PluginRegistry::new(EventBus::new());
        registry.register(Arc::new(HelpPlugin)).await.unwrap();
        registry.register(Arc::new(PingPlugin)).await.unwrap();
        registry.register(Arc::new(GroupOnly)).await.unwrap();
        registry
    }

    async fn help(registry: &PluginRegistry, args: &str, is_group: bool) -> String {
        let inv = CommandInvocation {
            conversation_id: "c".into(),
            sender_id: "u".into(),
            command: "help".into(),
            args: args.into(),
            is_group,
            prefix: "/".into(),
        };
        match registry.dispatch_command("help", &inv).await.unwrap() {
            CommandDispatch::Handled { output, .. } => output.text.unwrap(),
            CommandDispatch::NotFound => panic!("help not bound"),
        }
    }

    #[tokio::test]
    async fn lists_commands_for_chat_kind() {
        let registry = registry().await;
        let private = help(&registry, "", false).await;
        assert!(private.contains("/help - Show this list"));
        assert!(private.contains("/ping"));
        assert!(!private.contains("/roll"));

        let group = help(&registry, "", true).await;
        assert!(group.contains("/roll - Roll a die"));
    }

    #[tokio::test]
    async fn describes_single_command() {
        let registry = registry().await;
        let detail = help(&registry, "/roll", false).await;
        assert!(detail.contains("scope: group, requires a mention in groups"));
        assert!(detail.contains("provided by: group-only"));
        assert_eq!(help(&registry, "nope", false).await, "Unknown command: /nope");
    }
}
