//! Line-oriented console transport.
//!
//! Each input line is one inbound message:
//!
//! - `hello` is a private message in the `console` conversation.
//! - `#team hello @bot` is a group message in conversation `team`; it
//!   mentions the bot when it contains `@<bot_name>`.
//!
//! Replies are written as `[<conversation>] <text>`.

use std::sync::Arc;

use {
    async_trait::async_trait,
    chatrelay_common::{InboundMessage, MessageIntake},
    tokio::{
        io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
        sync::Mutex,
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use chatrelay_metrics::{channels as ch_metrics, counter};

use crate::{ChannelOutbound, Error, Result};

pub const CONSOLE_CONVERSATION: &str = "console";
pub const CONSOLE_SENDER: &str = "local";

/// Parse one console line. Blank lines yield `None`.
pub fn parse_console_line(line: &str, bot_name: &str) -> Option<InboundMessage> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }
    if let Some(rest) = line.strip_prefix('#') {
        let (group, text) = rest.split_once(' ').unwrap_or((rest, ""));
        if group.is_empty() {
            return None;
        }
        let mentions_bot = text.contains(&format!("@{bot_name}"));
        return Some(
            InboundMessage::new(group, CONSOLE_SENDER, text).in_group(mentions_bot),
        );
    }
    Some(InboundMessage::new(CONSOLE_CONVERSATION, CONSOLE_SENDER, line))
}

/// Reads messages from a line source and submits them to an intake.
pub struct ConsoleInbound<R> {
    reader: R,
    bot_name: String,
}

impl<R: AsyncBufRead + Unpin + Send> ConsoleInbound<R> {
    pub fn new(reader: R, bot_name: impl Into<String>) -> Self {
        Self {
            reader,
            bot_name: bot_name.into(),
        }
    }

    /// Run until end of input or cancellation. Returns the number of messages
    /// submitted.
    pub async fn run(
        mut self,
        intake: Arc<dyn MessageIntake>,
        cancel: CancellationToken,
    ) -> Result<usize> {
        let mut submitted = 0;
        let mut line = String::new();
        loop {
            line.clear();
            let read = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("console input cancelled");
                    break;
                },
                read = self.reader.read_line(&mut line) => read?,
            };
            if read == 0 {
                info!(submitted, "console input closed");
                break;
            }
            let Some(message) = parse_console_line(&line, &self.bot_name) else {
                continue;
            };
            if let Err(e) = intake.submit(message).await {
                warn!(error = %e, "failed to submit console message");
                continue;
            }
            submitted += 1;
        }
        Ok(submitted)
    }
}

/// Writes replies to any async writer (stdout by default).
pub struct ConsoleOutbound<W> {
    writer: Mutex<W>,
}

impl ConsoleOutbound<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W: AsyncWrite + Unpin + Send> ConsoleOutbound<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ChannelOutbound for ConsoleOutbound<W> {
    async fn send_text(&self, conversation_id: &str, text: &str) -> Result<()> {
        if conversation_id.is_empty() {
            return Err(Error::invalid_input("empty conversation id"));
        }
        let mut writer = self.writer.lock().await;
        for line in text.lines() {
            writer
                .write_all(format!("[{conversation_id}] {line}\n").as_bytes())
                .await?;
        }
        writer.flush().await?;
        #[cfg(feature = "metrics")]
        counter!(ch_metrics::MESSAGES_SENT_TOTAL).increment(1);
        Ok(())
    }
}
