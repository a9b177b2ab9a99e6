//! In-memory conversation history.
//!
//! Each conversation keeps a bounded window of completed exchanges. The
//! window is read when a context starts and written once, when the context
//! finishes successfully.

pub mod message;
pub mod store;

pub use {
    message::{HistoryMessage, Turn},
    store::HistoryStore,
};
