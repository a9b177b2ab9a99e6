//! Shared types, error definitions, and the event bus used across all chatrelay crates.

pub mod error;
pub mod events;
pub mod types;
pub mod unwind;

pub use {
    error::{Error, FromMessage, Result},
    events::{Event, EventBus, EventHandler, EventKind, Payload, SubscriptionId, handler_fn},
    types::{InboundMessage, MessageIntake, MessageOrigin, OutboundMessage},
    unwind::catch_panic,
};
