//! Append-only session event log

use crate::types::{Event, EventKind, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Event counts per severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: u32,
    pub warning: u32,
    pub info: u32,
}

impl SeverityCounts {
    pub fn total(&self) -> u32 {
        self.critical + self.warning + self.info
    }

    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::Warning => self.warning += 1,
            Severity::Info => self.info += 1,
        }
    }
}

/// Ordered record of every event emitted during a session.
///
/// Events are stored in emission order and never mutated or removed.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
    counts: SeverityCounts,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, event: Event) {
        self.counts.record(event.severity);
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn severity_counts(&self) -> SeverityCounts {
        self.counts
    }

    pub fn count_severity(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Critical => self.counts.critical,
            Severity::Warning => self.counts.warning,
            Severity::Info => self.counts.info,
        }
    }

    pub fn count_kind(&self, kind: EventKind) -> u32 {
        self.events.iter().filter(|e| e.kind == kind).count() as u32
    }

    /// Per-type event counts
    pub fn kind_counts(&self) -> BTreeMap<EventKind, u32> {
        let mut counts = BTreeMap::new();
        for event in &self.events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// All events, oldest first
    pub fn chronological(&self) -> &[Event] {
        &self.events
    }

    /// All events, newest first
    pub fn newest_first(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().rev()
    }

    /// The `n` most recent events, newest first
    pub fn recent(&self, n: usize) -> Vec<&Event> {
        self.newest_first().take(n).collect()
    }
}
