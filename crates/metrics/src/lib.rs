//! Metric names for chatrelay.
//!
//! Crates record through the `metrics` facade behind their own `metrics`
//! feature. Nothing is exported until the embedding application installs a
//! recorder.
//!
//! ```rust,ignore
//! use chatrelay_metrics::{counter, pipeline, labels};
//!
//! counter!(pipeline::MESSAGES_RECEIVED_TOTAL, labels::CONVERSATION => "g1").increment(1);
//! ```

mod definitions;

pub use definitions::*;

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
