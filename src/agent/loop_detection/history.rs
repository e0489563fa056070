//! Bounded window of recent tool calls.

use super::keys::{CallKey, OutcomeKey};
use std::collections::VecDeque;

/// One recorded tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    key: CallKey,
    tool_name: String,
    outcome: Option<OutcomeKey>,
}

impl HistoryEntry {
    /// Create an entry; `outcome` is `None` for pending calls.
    #[must_use]
    pub fn new(key: CallKey, tool_name: impl Into<String>, outcome: Option<OutcomeKey>) -> Self {
        Self {
            key,
            tool_name: tool_name.into(),
            outcome,
        }
    }

    /// Call identity.
    #[must_use]
    pub fn key(&self) -> &CallKey {
        &self.key
    }

    /// Tool name.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Outcome identity, if the call finished.
    #[must_use]
    pub fn outcome(&self) -> Option<&OutcomeKey> {
        self.outcome.as_ref()
    }
}

/// FIFO window that drops the oldest entry once full.
#[derive(Debug, Clone)]
pub struct CallHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl CallHistory {
    /// Create an empty window.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest when over capacity.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Entries from most recent to oldest.
    pub fn iter_recent(&self) -> impl Iterator<Item = &HistoryEntry> + '_ {
        self.entries.iter().rev()
    }

    /// Entries from oldest to most recent.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> + '_ {
        self.entries.iter()
    }

    /// Most recent entry.
    #[must_use]
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    /// Whether any entry has the given key.
    #[must_use]
    pub fn contains_key(&self, key: &CallKey) -> bool {
        self.entries.iter().any(|entry| entry.key() == key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the window is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
