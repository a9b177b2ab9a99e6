//! `command-logger`: appends every `COMMAND_MATCHED` event to a JSONL file.

use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use {
    anyhow::Context,
    async_trait::async_trait,
    chatrelay_common::{Event, EventHandler, EventKind},
};

use crate::{Capability, EventSubscription, Plugin, PluginInfo};

pub const NAME: &str = "command-logger";

pub struct CommandLoggerPlugin {
    writer: Arc<CommandLogWriter>,
}

impl CommandLoggerPlugin {
    pub fn new(log_path: PathBuf) -> Self {
        Self {
            writer: Arc::new(CommandLogWriter::new(log_path)),
        }
    }

    /// `{"path": "..."}` from `plugin_configs`, else the default path.
    pub fn from_config(config: Option<&serde_json::Value>) -> Option<Self> {
        config
            .and_then(|c| c.get("path"))
            .and_then(|p| p.as_str())
            .map(PathBuf::from)
            .or_else(Self::default_path)
            .map(Self::new)
    }

    /// Default log path: `<data dir>/logs/commands.jsonl`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "chatrelay")
            .map(|d| d.data_dir().join("logs/commands.jsonl"))
    }

    pub fn log_path(&self) -> &Path {
        &self.writer.log_path
    }
}

struct CommandLogWriter {
    log_path: PathBuf,
    /// Writes go through a mutex so concurrent events append whole lines.
    file: Mutex<Option<std::fs::File>>,
}

impl CommandLogWriter {
    fn new(log_path: PathBuf) -> Self {
        Self {
            log_path,
            file: Mutex::new(None),
        }
    }

    fn append(&self, entry: &serde_json::Value) -> std::io::Result<()> {
        let mut guard = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            if let Some(parent) = self.log_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.log_path)?;
            *guard = Some(file);
        }
        match guard.as_mut() {
            Some(file) => writeln!(file, "{entry}"),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl EventHandler for CommandLogWriter {
    fn name(&self) -> &str {
        NAME
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let entry = serde_json::json!({
            "ts": event.timestamp().to_rfc3339(),
            "conversation_id": event.get("conversation_id"),
            "sender_id": event.get("sender_id"),
            "command": event.get("command"),
            "plugin": event.get("plugin"),
        });
        self.append(&entry)
            .with_context(|| format!("failed to append to {}", self.log_path.display()))
    }
}

#[async_trait]
impl Plugin for CommandLoggerPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo::new(NAME, env!("CARGO_PKG_VERSION"))
            .with_description("Logs matched commands to a JSONL file")
            .with_author("chatrelay")
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Event(vec![EventSubscription::new(
            EventKind::CommandMatched,
            Arc::clone(&self.writer) as Arc<dyn EventHandler>,
        )])]
    }
}
