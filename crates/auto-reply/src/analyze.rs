//! Intent classification.

use std::fmt;

use {chatrelay_config::ResolvedConversation, chatrelay_plugins::PluginRegistry};

/// Why a message was rejected before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Malformed {
    Empty,
    ControlCharacters,
    TooLong { chars: usize, max: usize },
}

impl fmt::Display for Malformed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty message"),
            Self::ControlCharacters => f.write_str("message contains control characters"),
            Self::TooLong { chars, max } => {
                write!(f, "message is {chars} characters, limit is {max}")
            },
        }
    }
}

/// Classified message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Analysis {
    Command { name: String, args: String },
    FreeText { prompt: String },
    /// Valid input the bot does not answer.
    Ignored { reason: &'static str },
}

/// What the classifier needs to know about the message.
#[derive(Debug, Clone, Copy)]
pub struct MessageTraits {
    pub is_group: bool,
    pub mentions_bot: bool,
    /// Synthetic messages from the scheduler count as addressed to the bot.
    pub scheduled: bool,
}

impl MessageTraits {
    fn addressed(self) -> bool {
        !self.is_group || self.mentions_bot || self.scheduled
    }
}

pub fn check_input(text: &str, max_chars: usize) -> Result<(), Malformed> {
    if text.trim().is_empty() {
        return Err(Malformed::Empty);
    }
    if text
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
    {
        return Err(Malformed::ControlCharacters);
    }
    let chars = text.chars().count();
    if chars > max_chars {
        return Err(Malformed::TooLong {
            chars,
            max: max_chars,
        });
    }
    Ok(())
}

/// Remove a leading `@<bot_name>` and the whitespace after it.
pub fn strip_mention<'a>(text: &'a str, bot_name: &str) -> &'a str {
    let trimmed = text.trim_start();
    let mention = format!("@{bot_name}");
    match trimmed.strip_prefix(mention.as_str()) {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => {
            rest.trim_start()
        },
        _ => text,
    }
}

/// Classify already-validated text.
///
/// A command needs the prefix, a registered name, a scope that fits the
/// chat, a mention when the command requires one, and the conversation's
/// `allowed_commands`. Anything else is free text.
pub fn classify(
    text: &str,
    prefix: &str,
    traits: MessageTraits,
    conversation: &ResolvedConversation,
    registry: &PluginRegistry,
) -> Analysis {
    if let Some(body) = text.strip_prefix(prefix) {
        let (name, args) = match body.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (body, ""),
        };
        if let Some(cmd) = registry.command(name)
            && cmd.scope.allows(traits.is_group)
            && (!cmd.requires_mention || traits.addressed())
            && conversation.allows_command(name)
        {
            return Analysis::Command {
                name: name.to_string(),
                args: args.to_string(),
            };
        }
    }

    if !traits.addressed() && !conversation.reply_without_mention {
        return Analysis::Ignored {
            reason: "group message without mention",
        };
    }
    if !conversation.auto_reply {
        return Analysis::Ignored {
            reason: "auto_reply disabled",
        };
    }
    Analysis::FreeText {
        prompt: text.trim().to_string(),
    }
}
