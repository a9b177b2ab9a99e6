//! Chat transport seams.
//!
//! The pipeline only ever talks to a [`ChannelOutbound`]. Concrete transports
//! live here: a console transport for local runs and a rate-limiting wrapper
//! that any transport can sit behind.

pub mod console;
pub mod error;
pub mod outbound;
pub mod rate_limit;

pub use {
    console::{ConsoleInbound, ConsoleOutbound, parse_console_line},
    error::{Error, Result},
    outbound::ChannelOutbound,
    rate_limit::RateLimitedOutbound,
};
