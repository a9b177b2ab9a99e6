//! Time-driven injection of synthetic messages.
//!
//! Tasks come from Scheduled plugins. On each tick the scheduler publishes
//! `SCHEDULE_TRIGGERED` and hands one message per target conversation to the
//! normal intake, so scheduled text runs through the full pipeline.

pub mod error;
pub mod schedule;
pub mod service;

pub use {
    error::{Error, Result},
    schedule::compute_next_run,
    service::{Scheduler, TaskStatus},
};
