//! History entries handed to model providers.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

/// One completed exchange: what the user said and what the bot answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub user: String,
    pub assistant: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
            sender_id: None,
            model: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_sender(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = Some(sender_id.into());
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Flatten into the role-tagged messages a provider consumes.
    pub fn messages(&self) -> [HistoryMessage; 2] {
        [
            HistoryMessage::User {
                content: self.user.clone(),
            },
            HistoryMessage::Assistant {
                content: self.assistant.clone(),
            },
        ]
    }
}

/// A single role-tagged history message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum HistoryMessage {
    User { content: String },
    Assistant { content: String },
}

impl HistoryMessage {
    pub fn content(&self) -> &str {
        match self {
            Self::User { content } | Self::Assistant { content } => content,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_flattens_user_first() {
        let [user, assistant] = Turn::new("hi", "hello").messages();
        assert_eq!(user, HistoryMessage::User {
            content: "hi".into()
        });
        assert_eq!(assistant.content(), "hello");
    }

    #[test]
    fn history_message_serializes_with_role_tag() {
        let json = serde_json::to_value(HistoryMessage::Assistant {
            content: "ok".into(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "ok"}));
    }
}
