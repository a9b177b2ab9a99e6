//! Configuration loading, validation, and env substitution.
//!
//! Config files: `chatrelay.toml`, `chatrelay.yaml`, or `chatrelay.json`
//! Searched in `./` then `~/.config/chatrelay/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values. The loaded
//! [`BotConfig`] is treated as an immutable snapshot: build it once and share
//! it behind an `Arc`.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schedule;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{config_dir, discover_and_load, find_config_file, load_config, parse_config},
    schedule::{ScheduleSpec, parse_daily_time, parse_duration_ms},
    schema::{
        AiModelConfig, BotConfig, ConversationConfig, ResolvedConversation, ScheduledTaskConfig,
        SchedulerConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate, validate_file, validate_str},
};
