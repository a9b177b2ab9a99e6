//! Configuration validation.
//!
//! Detects unknown or misspelled keys in the raw document and reports
//! semantic problems (dangling model references, bad schedules) on the parsed
//! snapshot.

use std::path::{Path, PathBuf};

use crate::{
    loader::{find_config_file, parse_config_value},
    schema::BotConfig,
};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "model", "schedule",
    /// "conversation"
    pub category: &'static str,
    /// Dotted path, e.g. "groups.g1.ai_model"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{} [{}]: {}", self.severity, self.category, self.message)
        } else {
            write!(
                f,
                "{} [{}] {}: {}",
                self.severity, self.category, self.path, self.message
            )
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

const TOP_LEVEL_KEYS: &[&str] = &[
    "bot_name",
    "admin_users",
    "command_prefix",
    "fallback_message",
    "max_message_chars",
    "message_rate_limit",
    "default_ai_model",
    "defaults",
    "ai_models",
    "groups",
    "plugins_enabled",
    "plugin_configs",
    "scheduled_tasks",
    "scheduler",
];

const CONVERSATION_KEYS: &[&str] = &[
    "name",
    "enabled",
    "ai_model",
    "max_history",
    "auto_reply",
    "reply_without_mention",
    "allowed_commands",
];

const AI_MODEL_KEYS: &[&str] = &[
    "enabled",
    "provider",
    "api_key",
    "base_url",
    "model",
    "temperature",
    "max_tokens",
    "timeout_secs",
    "max_retries",
    "requires_credentials",
    "extra_params",
];

const TASK_KEYS: &[&str] = &["enabled", "schedule", "conversations", "text"];

// ── Levenshtein distance ────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (*c, levenshtein(needle, c)))
        .filter(|(_, d)| *d > 0 && *d <= max_distance)
        .min_by_key(|(_, d)| *d)
        .map(|(c, _)| c)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or the discovered default file
/// if `path` is `None`.
#[must_use]
pub fn validate_file(path: Option<&Path>) -> ValidationResult {
    let config_path = path.map(Path::to_path_buf).or_else(find_config_file);

    let Some(actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Info,
                "syntax",
                "",
                "no config file found; using defaults",
            )],
            config_path: None,
        };
    };

    let mut result = match std::fs::read_to_string(&actual_path) {
        Ok(raw) => validate_str(&crate::env_subst::substitute_env(&raw), &actual_path),
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("failed to read config file: {e}"),
            )],
            config_path: None,
        },
    };
    result.config_path = Some(actual_path);
    result
}

/// Validate raw file contents. The extension of `path` selects the format.
#[must_use]
pub fn validate_str(raw: &str, path: &Path) -> ValidationResult {
    let mut result = ValidationResult::default();

    let value = match parse_config_value(raw, path) {
        Ok(v) => v,
        Err(e) => {
            result.diagnostics.push(Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                e.to_string(),
            ));
            return result;
        },
    };

    check_unknown_fields(&value, &mut result.diagnostics);

    match serde_json::from_value::<BotConfig>(value) {
        Ok(config) => result.diagnostics.extend(validate(&config).diagnostics),
        Err(e) => result.diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "",
            format!("type error: {e}"),
        )),
    }
    result
}

/// Semantic checks on a parsed snapshot.
#[must_use]
pub fn validate(config: &BotConfig) -> ValidationResult {
    let mut diagnostics = Vec::new();

    if config.command_prefix.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "conversation",
            "command_prefix",
            "command prefix must not be empty",
        ));
    }
    if config.max_message_chars == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "conversation",
            "max_message_chars",
            "must be greater than 0",
        ));
    }

    if !config.ai_models.contains_key(&config.default_ai_model) {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "model",
            "default_ai_model",
            format!(
                "model \"{}\" is not defined in ai_models",
                config.default_ai_model
            ),
        ));
    }

    for (name, model) in &config.ai_models {
        if model.enabled && model.requires_credentials && !model.has_credentials() {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "model",
                format!("ai_models.{name}.api_key"),
                "model is enabled but has no api_key",
            ));
        }
    }

    let mut conversations: Vec<(String, &crate::schema::ConversationConfig)> = config
        .groups
        .iter()
        .map(|(id, c)| (format!("groups.{id}"), c))
        .collect();
    conversations.push(("defaults".into(), &config.defaults));
    conversations.sort_by(|a, b| a.0.cmp(&b.0));

    for (path, conv) in conversations {
        if conv.max_history == 0 {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "conversation",
                format!("{path}.max_history"),
                "must be greater than 0",
            ));
        }
        if let Some(model) = &conv.ai_model
            && !config.ai_models.contains_key(model)
        {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "model",
                format!("{path}.ai_model"),
                format!("model \"{model}\" is not defined in ai_models"),
            ));
        }
    }

    for (name, task) in &config.scheduled_tasks {
        if let Err(e) = task.schedule.check() {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "schedule",
                format!("scheduled_tasks.{name}.schedule"),
                e.to_string(),
            ));
        }
        if task.conversations.is_empty() {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "schedule",
                format!("scheduled_tasks.{name}.conversations"),
                "task has no target conversations",
            ));
        }
        if task.text.trim().is_empty() {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "schedule",
                format!("scheduled_tasks.{name}.text"),
                "task text must not be empty",
            ));
        }
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_unknown_fields(value: &serde_json::Value, diagnostics: &mut Vec<Diagnostic>) {
    let Some(root) = value.as_object() else {
        return;
    };
    check_keys(root, "", TOP_LEVEL_KEYS, diagnostics);

    if let Some(defaults) = root.get("defaults").and_then(|v| v.as_object()) {
        check_keys(defaults, "defaults", CONVERSATION_KEYS, diagnostics);
    }
    let nested: [(&str, &[&str]); 3] = [
        ("groups", CONVERSATION_KEYS),
        ("ai_models", AI_MODEL_KEYS),
        ("scheduled_tasks", TASK_KEYS),
    ];
    for (section, known) in nested {
        let Some(entries) = root.get(section).and_then(|v| v.as_object()) else {
            continue;
        };
        for (key, entry) in entries {
            if let Some(entry) = entry.as_object() {
                check_keys(entry, &format!("{section}.{key}"), known, diagnostics);
            }
        }
    }
}

fn check_keys(
    table: &serde_json::Map<String, serde_json::Value>,
    prefix: &str,
    known: &[&str],
    diagnostics: &mut Vec<Diagnostic>,
) {
    for key in table.keys() {
        if known.contains(&key.as_str()) {
            continue;
        }
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        let message = match suggest(key, known, 3) {
            Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
            None => "unknown field".to_string(),
        };
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "unknown-field",
            path,
            message,
        ));
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn toml(raw: &str) -> ValidationResult {
        validate_str(raw, Path::new("chatrelay.toml"))
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("groups", "groups"), 0);
        assert_eq!(levenshtein("grups", "groups"), 1);
    }

    #[test]
    fn unknown_top_level_key_with_suggestion() {
        let result = toml("bot_nmae = \"x\"\n[ai_models.chatgpt]\n");
        let diag = result
            .diagnostics
            .iter()
            .find(|d| d.category == "unknown-field")
            .unwrap();
        assert_eq!(diag.path, "bot_nmae");
        assert!(diag.message.contains("bot_name"));
    }

    #[test]
    fn unknown_field_inside_group() {
        let result = toml(
            r#"
            [ai_models.chatgpt]
            [groups.g1]
            max_histroy = 3
            "#,
        );
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.path == "groups.g1.max_histroy" && d.message.contains("max_history"))
        );
    }

    #[test]
    fn syntax_error_detected() {
        let result = toml("[[[broken");
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].category, "syntax");
    }

    #[test]
    fn dangling_model_reference_is_error() {
        let result = toml(
            r#"
            [ai_models.chatgpt]
            [groups.g1]
            ai_model = "claude"
            "#,
        );
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.path == "groups.g1.ai_model" && d.severity == Severity::Error)
        );
    }

    #[test]
    fn zero_max_history_is_error() {
        let mut cfg = BotConfig::default();
        cfg.defaults.max_history = 0;
        let result = validate(&cfg);
        assert!(result.diagnostics.iter().any(|d| d.path == "defaults.max_history"));
    }

    #[test]
    fn bad_schedule_reported() {
        let result = toml(
            r#"
            [ai_models.chatgpt]
            [scheduled_tasks.t]
            schedule = { kind = "every", every = "soon" }
            conversations = ["g1"]
            text = "/ping"
            "#,
        );
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.category == "schedule" && d.severity == Severity::Error)
        );
    }

    #[test]
    fn enabled_model_without_key_warned() {
        let result = toml(
            r#"
            [ai_models.chatgpt]
            enabled = true
            model = "gpt-4o"
            "#,
        );
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 1);
    }

    #[test]
    fn clean_config_has_no_diagnostics() {
        let result = toml(
            r#"
            default_ai_model = "echo"

            [ai_models.echo]
            enabled = true
            requires_credentials = false
            "#,
        );
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn yaml_is_validated_too() {
        let result = validate_str(
            "ai_models:\n  chatgpt: {}\ngrups: {}\n",
            Path::new("chatrelay.yaml"),
        );
        assert!(result.diagnostics.iter().any(|d| d.path == "grups"));
    }
}
