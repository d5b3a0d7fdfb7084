//! Notification sinks
//!
//! The session pushes every emitted event to a sink after it has been applied
//! to the score accumulator and the event log. Presentation layers (alerts,
//! toasts, dashboards) implement [`NotificationSink`] instead of being called
//! from the engine directly.

use crate::types::{Event, Severity};
use tracing::{debug, info, warn};

/// Receiver for emitted events
pub trait NotificationSink {
    fn notify(&mut self, event: &Event);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&mut self, _event: &Event) {}
}

/// Forwards events to `tracing`, critical events at `warn` level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&mut self, event: &Event) {
        match event.severity {
            Severity::Critical => warn!(
                kind = event.kind.as_str(),
                offset_ms = event.offset_ms,
                "Critical alert: {}",
                event.message
            ),
            Severity::Warning => info!(
                kind = event.kind.as_str(),
                offset_ms = event.offset_ms,
                "{}",
                event.message
            ),
            Severity::Info => debug!(kind = event.kind.as_str(), "{}", event.message),
        }
    }
}

/// Adapts a closure into a sink
pub struct FnSink<F>(pub F);

impl<F> NotificationSink for FnSink<F>
where
    F: FnMut(&Event),
{
    fn notify(&mut self, event: &Event) {
        (self.0)(event)
    }
}

/// Keeps every notified event in memory
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    events: Vec<Event>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }
}

impl NotificationSink for CollectingSink {
    fn notify(&mut self, event: &Event) {
        self.events.push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventDraft, EventKind};
    use chrono::Utc;

    fn event(kind: EventKind) -> Event {
        Event::from_draft(EventDraft::new(kind, "test"), Utc::now(), 0)
    }

    #[test]
    fn test_fn_sink_receives_events() {
        let mut seen = Vec::new();
        {
            let mut sink = FnSink(|e: &Event| seen.push(e.kind));
            sink.notify(&event(EventKind::FaceAbsent));
            sink.notify(&event(EventKind::FocusRestored));
        }
        assert_eq!(seen, vec![EventKind::FaceAbsent, EventKind::FocusRestored]);
    }

    #[test]
    fn test_collecting_sink() {
        let mut sink = CollectingSink::new();
        sink.notify(&event(EventKind::NotesDetected));
        assert_eq!(sink.events().len(), 1);
        assert_eq!(sink.events()[0].kind, EventKind::NotesDetected);
    }

    #[test]
    fn test_tracing_sink_does_not_panic_without_subscriber() {
        let mut sink = TracingSink;
        sink.notify(&event(EventKind::MultipleFaces));
        sink.notify(&event(EventKind::FocusLost));
        sink.notify(&event(EventKind::FocusRestored));
    }
}
