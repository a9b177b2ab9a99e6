//! Inbound message processing pipeline: the glue between transports, plugins,
//! and AI providers.
//!
//! Flow: inbound message → context created, conversation config looked up →
//! `MESSAGE_RECEIVED` → classify command vs free text → bind plugin or resolve
//! model → run handler / call provider → publish `COMMAND_MATCHED` or
//! `AI_RESPONSE` → deliver via channel outbound → `MESSAGE_SENT`.
//!
//! Every context ends in exactly one terminal stage: `Responded`, `Dropped`,
//! or `Failed`. Failed contexts publish `ERROR_OCCURRED` and send the
//! configured fallback message.

pub mod analyze;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod pipeline;
pub mod stage;

pub use {
    analyze::{Analysis, Malformed, MessageTraits},
    context::{ContextResult, Intent, ProcessingContext},
    dispatcher::{Dispatcher, DispatcherConfig},
    error::{Error, Result},
    pipeline::Pipeline,
    stage::Stage,
};
