//! Configuration schema.
//!
//! Every section carries `#[serde(default)]` so a partial file (or no file at
//! all) yields a usable snapshot.

use std::collections::{BTreeMap, HashMap};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

use crate::schedule::ScheduleSpec;

/// Root configuration snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub bot_name: String,
    /// Sender ids that receive the start-up notice.
    pub admin_users: Vec<String>,
    pub command_prefix: String,
    /// Sent when a context ends in `Failed`.
    pub fallback_message: String,
    pub max_message_chars: usize,
    /// Outbound messages per minute. `0` disables the limit.
    pub message_rate_limit: u32,
    pub default_ai_model: String,
    /// Applied to conversations that are not listed in `groups`.
    pub defaults: ConversationConfig,
    pub ai_models: HashMap<String, AiModelConfig>,
    pub groups: HashMap<String, ConversationConfig>,
    /// Bundled plugins to load. Empty means all of them.
    pub plugins_enabled: Vec<String>,
    pub plugin_configs: HashMap<String, serde_json::Value>,
    pub scheduled_tasks: BTreeMap<String, ScheduledTaskConfig>,
    pub scheduler: SchedulerConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_name: "chatrelay".into(),
            admin_users: Vec::new(),
            command_prefix: "/".into(),
            fallback_message: "Sorry, something went wrong. Please try again later.".into(),
            max_message_chars: 4096,
            message_rate_limit: 30,
            default_ai_model: "chatgpt".into(),
            defaults: ConversationConfig::default(),
            ai_models: HashMap::new(),
            groups: HashMap::new(),
            plugins_enabled: Vec::new(),
            plugin_configs: HashMap::new(),
            scheduled_tasks: BTreeMap::new(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl BotConfig {
    /// Effective settings for a conversation, falling back to `defaults`.
    pub fn conversation(&self, id: &str) -> ResolvedConversation {
        let (entry, listed) = match self.groups.get(id) {
            Some(entry) => (entry, true),
            None => (&self.defaults, false),
        };
        let ai_model = entry
            .ai_model
            .clone()
            .or_else(|| self.defaults.ai_model.clone())
            .unwrap_or_else(|| self.default_ai_model.clone());
        ResolvedConversation {
            id: id.to_string(),
            name: entry.name.clone().unwrap_or_else(|| id.to_string()),
            listed,
            enabled: entry.enabled,
            ai_model,
            max_history: entry.max_history,
            auto_reply: entry.auto_reply,
            reply_without_mention: entry.reply_without_mention,
            allowed_commands: entry.allowed_commands.clone(),
        }
    }

    /// Whether the named bundled plugin should be loaded.
    pub fn plugin_enabled(&self, name: &str) -> bool {
        self.plugins_enabled.is_empty() || self.plugins_enabled.iter().any(|p| p == name)
    }

    pub fn plugin_config(&self, name: &str) -> Option<&serde_json::Value> {
        self.plugin_configs.get(name)
    }
}

/// Per-conversation settings as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub enabled: bool,
    /// Falls back to `defaults.ai_model`, then `default_ai_model`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_model: Option<String>,
    pub max_history: usize,
    pub auto_reply: bool,
    pub reply_without_mention: bool,
    /// Empty means every registered command is allowed.
    pub allowed_commands: Vec<String>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            name: None,
            enabled: true,
            ai_model: None,
            max_history: 50,
            auto_reply: true,
            reply_without_mention: false,
            allowed_commands: Vec::new(),
        }
    }
}

/// Conversation settings with every fallback applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConversation {
    pub id: String,
    pub name: String,
    /// False when the settings came from `defaults`.
    pub listed: bool,
    pub enabled: bool,
    pub ai_model: String,
    pub max_history: usize,
    pub auto_reply: bool,
    pub reply_without_mention: bool,
    pub allowed_commands: Vec<String>,
}

impl ResolvedConversation {
    pub fn allows_command(&self, name: &str) -> bool {
        self.allowed_commands.is_empty() || self.allowed_commands.iter().any(|c| c == name)
    }
}

/// One entry in the `ai_models` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiModelConfig {
    pub enabled: bool,
    /// Provider client id. Defaults to the table key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<Secret<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Extra attempts after the first provider failure.
    pub max_retries: u32,
    /// When false the model is usable without an `api_key` (local backends).
    pub requires_credentials: bool,
    pub extra_params: HashMap<String, serde_json::Value>,
}

impl Default for AiModelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: None,
            api_key: None,
            base_url: None,
            model: String::new(),
            temperature: 0.7,
            max_tokens: 2000,
            timeout_secs: 30,
            max_retries: 0,
            requires_credentials: true,
            extra_params: HashMap::new(),
        }
    }
}

impl AiModelConfig {
    /// True when an api key is configured and non-blank.
    pub fn has_credentials(&self) -> bool {
        self.api_key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().trim().is_empty())
    }
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

/// A time-driven push into one or more conversations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTaskConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub schedule: ScheduleSpec,
    pub conversations: Vec<String>,
    /// Text injected as the synthetic inbound message, e.g. `/ping`.
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg: BotConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.command_prefix, "/");
        assert_eq!(cfg.max_message_chars, 4096);
        assert_eq!(cfg.default_ai_model, "chatgpt");
        assert!(cfg.scheduler.enabled);
        assert_eq!(cfg.defaults.max_history, 50);
    }

    #[test]
    fn listed_conversation_overrides_defaults() {
        let cfg: BotConfig = toml::from_str(
            r#"
            default_ai_model = "echo"

            [groups.g1]
            name = "Team"
            ai_model = "chatgpt"
            max_history = 2
            reply_without_mention = true
            "#,
        )
        .unwrap();

        let g1 = cfg.conversation("g1");
        assert!(g1.listed);
        assert_eq!(g1.name, "Team");
        assert_eq!(g1.ai_model, "chatgpt");
        assert_eq!(g1.max_history, 2);
        assert!(g1.reply_without_mention);

        let other = cfg.conversation("dm-42");
        assert!(!other.listed);
        assert_eq!(other.name, "dm-42");
        assert_eq!(other.ai_model, "echo");
        assert_eq!(other.max_history, 50);
    }

    #[test]
    fn disabled_defaults_apply_to_unlisted_conversations() {
        let cfg: BotConfig = toml::from_str("[defaults]\nenabled = false\n").unwrap();
        assert!(!cfg.conversation("anything").enabled);
    }

    #[test]
    fn allowed_commands_empty_allows_all() {
        let mut cfg = BotConfig::default();
        assert!(cfg.conversation("c").allows_command("ping"));
        cfg.defaults.allowed_commands = vec!["help".into()];
        let conv = cfg.conversation("c");
        assert!(conv.allows_command("help"));
        assert!(!conv.allows_command("ping"));
    }

    #[test]
    fn ai_model_credentials() {
        let cfg: AiModelConfig =
            toml::from_str("enabled = true\nmodel = \"gpt-4o\"\napi_key = \"  \"\n").unwrap();
        assert!(!cfg.has_credentials());
        assert_eq!(cfg.max_tokens, 2000);
        assert!((cfg.temperature - 0.7).abs() < f32::EPSILON);

        let cfg: AiModelConfig = toml::from_str("api_key = \"sk-1\"\n").unwrap();
        assert!(cfg.has_credentials());
    }

    #[test]
    fn api_key_round_trips_through_serialize() {
        let cfg: AiModelConfig = toml::from_str("api_key = \"sk-1\"\n").unwrap();
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["api_key"], "sk-1");
    }

    #[test]
    fn scheduled_task_parses() {
        let cfg: BotConfig = toml::from_str(
            r#"
            [scheduled_tasks.morning]
            schedule = { kind = "daily", at = "08:30", tz = "Asia/Shanghai" }
            conversations = ["g1", "g2"]
            text = "/ping"
            "#,
        )
        .unwrap();
        let task = &cfg.scheduled_tasks["morning"];
        assert!(task.enabled);
        assert_eq!(task.conversations.len(), 2);
        assert!(matches!(task.schedule, ScheduleSpec::Daily { .. }));
    }

    #[test]
    fn plugin_enabled_when_list_empty() {
        let mut cfg = BotConfig::default();
        assert!(cfg.plugin_enabled("ping"));
        cfg.plugins_enabled = vec!["help".into()];
        assert!(!cfg.plugin_enabled("ping"));
        assert!(cfg.plugin_enabled("help"));
    }
}
