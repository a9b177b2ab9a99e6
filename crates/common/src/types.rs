//! Message shapes exchanged between transports and the pipeline.

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

/// Where an inbound message came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageOrigin {
    /// Delivered by a chat transport.
    #[default]
    Transport,
    /// Synthesized by the scheduler for a scheduled task.
    Scheduler { task: String },
}

/// Raw message handed to the pipeline's intake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub conversation_id: String,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// True when the conversation is a group chat.
    #[serde(default)]
    pub is_group: bool,
    /// True when a group message explicitly mentions the bot.
    #[serde(default)]
    pub mentions_bot: bool,
    #[serde(default)]
    pub origin: MessageOrigin,
}

impl InboundMessage {
    /// A private (one-to-one) message.
    pub fn new(
        conversation_id: impl Into<String>,
        sender_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            sender_name: None,
            text: text.into(),
            timestamp: Utc::now(),
            is_group: false,
            mentions_bot: false,
            origin: MessageOrigin::Transport,
        }
    }

    /// Mark the message as coming from a group chat.
    #[must_use]
    pub fn in_group(mut self, mentions_bot: bool) -> Self {
        self.is_group = true;
        self.mentions_bot = mentions_bot;
        self
    }

    #[must_use]
    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }

    /// Mark the message as synthesized for a scheduled task.
    #[must_use]
    pub fn scheduled(mut self, task: impl Into<String>) -> Self {
        self.origin = MessageOrigin::Scheduler { task: task.into() };
        self
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(self.origin, MessageOrigin::Scheduler { .. })
    }
}

/// Text handed to the outbound transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub conversation_id: String,
    pub text: String,
}

impl OutboundMessage {
    pub fn new(conversation_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            text: text.into(),
        }
    }
}

/// Entry point into message processing.
///
/// Transports and the scheduler hand messages here; implementations decide
/// ordering and concurrency.
#[async_trait]
pub trait MessageIntake: Send + Sync {
    async fn submit(&self, message: InboundMessage) -> crate::Result<()>;
}
