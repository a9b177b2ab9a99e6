use {
    chatrelay_common::{InboundMessage, MessageOrigin},
    chatrelay_sessions::Turn,
    tokio::time::Instant,
    tracing::{debug, error},
    uuid::Uuid,
};

use crate::{
    error::{Error, Result},
    stage::Stage,
};

/// What the message was classified as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Command { name: String, args: String },
    FreeText { prompt: String },
}

/// How the context ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextResult {
    /// Text handed to the transport.
    Reply { text: String },
    /// A command that chose not to answer.
    Silent,
    Dropped { reason: String },
    Failed { category: &'static str, detail: String },
}

/// Per-message state, owned by one pipeline run.
#[derive(Debug)]
pub struct ProcessingContext {
    id: Uuid,
    pub conversation_id: String,
    pub sender_id: String,
    pub raw_text: String,
    pub is_group: bool,
    pub mentions_bot: bool,
    pub origin: MessageOrigin,
    stage: Stage,
    trail: Vec<Stage>,
    pub history_window: Vec<Turn>,
    pub selected_ai_model: Option<String>,
    pub selected_plugin: Option<String>,
    pub intent: Option<Intent>,
    pub result: Option<ContextResult>,
    started: Instant,
}

impl ProcessingContext {
    pub fn new(message: &InboundMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id: message.conversation_id.clone(),
            sender_id: message.sender_id.clone(),
            raw_text: message.text.clone(),
            is_group: message.is_group,
            mentions_bot: message.mentions_bot,
            origin: message.origin.clone(),
            stage: Stage::Received,
            trail: vec![Stage::Received],
            history_window: Vec::new(),
            selected_ai_model: None,
            selected_plugin: None,
            intent: None,
            result: None,
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Every stage visited, starting with `Received`.
    pub fn trail(&self) -> &[Stage] {
        &self.trail
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }

    /// Move to `next`. Leaving a terminal stage, or skipping a stage, is an
    /// [`Error::InvariantViolation`]; the context is left unchanged.
    pub fn advance(&mut self, next: Stage) -> Result<()> {
        if !self.stage.can_advance_to(next) {
            let err = Error::InvariantViolation {
                context_id: self.id,
                from: self.stage,
                to: next,
            };
            error!(
                context = %self.id,
                conversation = %self.conversation_id,
                error = %err,
                "state machine invariant violated"
            );
            return Err(err);
        }
        debug!(
            context = %self.id,
            conversation = %self.conversation_id,
            from = %self.stage,
            to = %next,
            "stage transition"
        );
        self.stage = next;
        self.trail.push(next);
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ProcessingContext {
        ProcessingContext::new(&InboundMessage::new("c1", "u1", "hi"))
    }

    #[test]
    fn walks_the_happy_path() {
        let mut ctx = ctx();
        for stage in [
            Stage::Analyzed,
            Stage::Routed,
            Stage::Processed,
            Stage::Responded,
        ] {
            ctx.advance(stage).unwrap();
        }
        assert!(ctx.is_terminal());
        assert_eq!(ctx.trail().len(), 5);
    }

    #[test]
    fn terminal_stage_rejects_further_transitions() {
        let mut ctx = ctx();
        ctx.advance(Stage::Dropped).unwrap();
        let err = ctx.advance(Stage::Analyzed).unwrap_err();
        assert!(matches!(
            err,
            Error::InvariantViolation {
                from: Stage::Dropped,
                to: Stage::Analyzed,
                ..
            }
        ));
        assert!(ctx.advance(Stage::Failed).is_err());
        assert_eq!(ctx.stage(), Stage::Dropped);
        assert_eq!(ctx.trail(), [Stage::Received, Stage::Dropped]);
    }

    #[test]
    fn skipping_a_stage_is_rejected() {
        let mut ctx = ctx();
        assert!(ctx.advance(Stage::Processed).is_err());
        assert_eq!(ctx.stage(), Stage::Received);
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(ctx().id(), ctx().id());
    }
}
