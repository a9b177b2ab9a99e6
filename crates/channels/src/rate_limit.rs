use std::{collections::VecDeque, sync::Mutex, time::Duration};

use {async_trait::async_trait, tokio::time::Instant, tracing::warn};

#[cfg(feature = "metrics")]
use chatrelay_metrics::{channels as ch_metrics, counter};

use crate::{ChannelOutbound, Error, Result};

/// Sliding-window limit on outbound sends.
struct RateLimiter {
    sent: VecDeque<Instant>,
    max_per_window: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_per_window: usize, window: Duration) -> Self {
        Self {
            sent: VecDeque::new(),
            max_per_window,
            window,
        }
    }

    /// Record a send if the window has room.
    fn check(&mut self, now: Instant) -> Result<()> {
        if self.max_per_window == 0 {
            return Ok(());
        }
        while self
            .sent
            .front()
            .is_some_and(|&ts| now.duration_since(ts) >= self.window)
        {
            self.sent.pop_front();
        }
        if self.sent.len() >= self.max_per_window {
            return Err(Error::RateLimited {
                limit: self.max_per_window,
                window_secs: self.window.as_secs(),
            });
        }
        self.sent.push_back(now);
        Ok(())
    }
}

/// Wraps a transport and rejects sends over `max_per_minute`.
///
/// A limit of `0` disables the check. Typing indicators are not counted.
pub struct RateLimitedOutbound<T> {
    inner: T,
    limiter: Mutex<RateLimiter>,
}

impl<T: ChannelOutbound> RateLimitedOutbound<T> {
    pub fn new(inner: T, max_per_minute: u32) -> Self {
        Self::with_window(inner, max_per_minute as usize, Duration::from_secs(60))
    }

    pub fn with_window(inner: T, max_per_window: usize, window: Duration) -> Self {
        Self {
            inner,
            limiter: Mutex::new(RateLimiter::new(max_per_window, window)),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: ChannelOutbound> ChannelOutbound for RateLimitedOutbound<T> {
    async fn send_text(&self, conversation_id: &str, text: &str) -> Result<()> {
        let checked = self
            .limiter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .check(Instant::now());
        if let Err(e) = checked {
            warn!(conversation = %conversation_id, error = %e, "outbound message rejected");
            #[cfg(feature = "metrics")]
            counter!(ch_metrics::RATE_LIMITED_TOTAL).increment(1);
            return Err(e);
        }
        self.inner.send_text(conversation_id, text).await
    }

    async fn send_typing(&self, conversation_id: &str) -> Result<()> {
        self.inner.send_typing(conversation_id).await
    }
}
