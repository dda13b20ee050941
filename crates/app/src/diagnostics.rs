//! Diagnostics exposed to the host: recent traffic and failure counters.

use std::collections::VecDeque;

use serde::Serialize;

use rvc_domain::event::DeviceType;

/// Compact record of one classification attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSummary {
    pub topic: String,
    pub device_type: Option<DeviceType>,
    pub instance: Option<String>,
    pub field_names: Vec<String>,
}

/// Bounded ring buffer of [`MessageSummary`], newest first.
///
/// Never consulted for routing.
#[derive(Debug, Clone)]
pub struct RecentMessages {
    capacity: usize,
    entries: VecDeque<MessageSummary>,
}

impl RecentMessages {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, summary: MessageSummary) {
        if self.capacity == 0 {
            return;
        }
        self.entries.push_front(summary);
        self.entries.truncate(self.capacity);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<MessageSummary> {
        self.entries.iter().cloned().collect()
    }
}

/// Snapshot handed to the host on request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSnapshot {
    pub prefix: String,
    pub command_topic: String,
    pub gps_topic: String,
    pub discovery_enabled: bool,
    pub active_subscriptions: Vec<String>,
    pub recent_messages: Vec<MessageSummary>,
    pub decode_failures: u64,
    pub classification_misses: u64,
    pub coercion_failures: u64,
}
