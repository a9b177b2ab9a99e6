use std::{
    collections::{HashMap, VecDeque},
    sync::RwLock,
};

use tracing::debug;

use crate::Turn;

/// Per-conversation bounded history.
#[derive(Debug, Default)]
pub struct HistoryStore {
    windows: RwLock<HashMap<String, VecDeque<Turn>>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent `max` turns, oldest first.
    pub fn window(&self, conversation_id: &str, max: usize) -> Vec<Turn> {
        let windows = self.windows.read().unwrap_or_else(|e| e.into_inner());
        windows
            .get(conversation_id)
            .map(|w| {
                let skip = w.len().saturating_sub(max);
                w.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    /// Append one exchange and drop the oldest turns beyond `max`.
    ///
    /// The append and truncation happen under a single write lock, so readers
    /// never observe an over-long window.
    pub fn commit(&self, conversation_id: &str, turn: Turn, max: usize) {
        let mut windows = self.windows.write().unwrap_or_else(|e| e.into_inner());
        let window = windows.entry(conversation_id.to_string()).or_default();
        window.push_back(turn);
        let mut dropped = 0usize;
        while window.len() > max {
            window.pop_front();
            dropped += 1;
        }
        debug!(
            conversation = %conversation_id,
            len = window.len(),
            dropped,
            "history committed"
        );
    }

    /// Replace a conversation's history, keeping at most `max` newest turns.
    pub fn seed(&self, conversation_id: &str, turns: impl IntoIterator<Item = Turn>, max: usize) {
        let mut window: VecDeque<Turn> = turns.into_iter().collect();
        while window.len() > max {
            window.pop_front();
        }
        self.windows
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(conversation_id.to_string(), window);
    }

    pub fn len(&self, conversation_id: &str) -> usize {
        self.windows
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(conversation_id)
            .map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, conversation_id: &str) -> bool {
        self.len(conversation_id) == 0
    }

    /// Forget a conversation. Returns `true` if it had history.
    pub fn clear(&self, conversation_id: &str) -> bool {
        self.windows
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(conversation_id)
            .is_some()
    }
}
