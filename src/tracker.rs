//! Debounced signal tracking
//!
//! Converts the noisy per-frame detector output into discrete events with
//! hysteresis. Four signals are tracked:
//!
//! - presence: `face-absent` once per continuous absence episode
//! - multiplicity: `multiple-faces` once per episode of more than one face
//! - focus: `focus-lost` after sustained distraction, `focus-restored` when it ends
//! - prohibited objects: one event per qualifying detection, no debounce
//!
//! All state lives in [`SignalState`] and changes only through [`transition`],
//! which takes explicit millisecond timestamps so the logic is deterministic
//! and testable without a clock or a detector.

use crate::config::TrackerConfig;
use crate::types::{DetectionFrame, EventDraft, EventKind, Keypoints};
use serde::{Deserialize, Serialize};

/// What the tracker last concluded about the candidate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttentionState {
    /// Nothing observed since the session started
    #[default]
    Idle,
    /// A face is present but no keypoints were available to judge focus
    Present,
    Focused,
    Distracted,
    Absent,
}

/// Timers and debounce flags for every tracked signal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalState {
    pub attention: AttentionState,
    /// First tick of the current absence episode
    pub absent_since_ms: Option<i64>,
    pub face_absent_alerted: bool,
    pub multiple_faces_alerted: bool,
    /// Last tick the candidate was judged focused. May be seeded before the
    /// session origin, hence signed.
    pub last_focused_ms: Option<i64>,
    pub focus_lost_alerted: bool,
}

/// Apply one detection frame to the tracker state.
///
/// Returns the new state and the events (zero or more) this frame produced, in
/// emission order: presence, multiplicity, focus, then objects.
pub fn transition(
    mut state: SignalState,
    frame: &DetectionFrame,
    now_ms: u64,
    config: &TrackerConfig,
) -> (SignalState, Vec<EventDraft>) {
    let now = signed(now_ms);
    let mut events = Vec::new();

    if frame.face_count == 0 {
        observe_absence(&mut state, now, config, &mut events);
    } else {
        // Face present: the absence episode is over
        state.absent_since_ms = None;
        state.face_absent_alerted = false;

        observe_multiplicity(&mut state, frame.face_count, &mut events);

        match &frame.keypoints {
            Some(keypoints) => observe_focus(&mut state, keypoints, now, config, &mut events),
            None => state.attention = AttentionState::Present,
        }
    }

    observe_objects(frame, config, &mut events);

    (state, events)
}

fn observe_absence(
    state: &mut SignalState,
    now: i64,
    config: &TrackerConfig,
    events: &mut Vec<EventDraft>,
) {
    state.attention = AttentionState::Absent;

    let since = *state.absent_since_ms.get_or_insert(now);
    if !state.face_absent_alerted
        && now.saturating_sub(since) >= signed(config.face_absent_threshold_ms)
    {
        state.face_absent_alerted = true;
        events.push(EventDraft::new(
            EventKind::FaceAbsent,
            format!(
                "No face detected for over {} seconds",
                seconds(config.face_absent_threshold_ms)
            ),
        ));
    }

    // Absence supersedes focus and multiplicity judgments. The focus-lost flag
    // is kept so a later return to focus still reports the restoration.
    state.last_focused_ms = None;
    state.multiple_faces_alerted = false;
}

fn observe_multiplicity(state: &mut SignalState, face_count: u32, events: &mut Vec<EventDraft>) {
    if face_count > 1 {
        if !state.multiple_faces_alerted {
            state.multiple_faces_alerted = true;
            events.push(EventDraft::new(
                EventKind::MultipleFaces,
                format!("Multiple faces detected ({})", face_count),
            ));
        }
    } else {
        state.multiple_faces_alerted = false;
    }
}

fn observe_focus(
    state: &mut SignalState,
    keypoints: &Keypoints,
    now: i64,
    config: &TrackerConfig,
    events: &mut Vec<EventDraft>,
) {
    let offset = keypoints.nose_offset();

    if offset < config.focus_offset_threshold {
        state.attention = AttentionState::Focused;
        state.last_focused_ms = Some(now);

        if state.focus_lost_alerted {
            state.focus_lost_alerted = false;
            events.push(EventDraft::new(EventKind::FocusRestored, "Focus restored"));
        }
    } else {
        state.attention = AttentionState::Distracted;

        let last_focused = *state
            .last_focused_ms
            .get_or_insert(now.saturating_sub(signed(config.focus_seed_lookback_ms)));

        if !state.focus_lost_alerted
            && now.saturating_sub(last_focused) >= signed(config.focus_lost_threshold_ms)
        {
            state.focus_lost_alerted = true;
            events.push(EventDraft::new(
                EventKind::FocusLost,
                format!(
                    "User not looking at screen for over {} seconds",
                    seconds(config.focus_lost_threshold_ms)
                ),
            ));
        }
    }
}

fn observe_objects(frame: &DetectionFrame, config: &TrackerConfig, events: &mut Vec<EventDraft>) {
    for object in frame.objects() {
        if object.confidence <= config.object_confidence_threshold {
            continue;
        }
        if let Some(kind) = classify_object(&object.label, config) {
            let label = normalize_label(&object.label);
            events.push(
                EventDraft::new(kind, format!("Prohibited object detected: {}", label))
                    .with_confidence(object.confidence)
                    .with_label(label),
            );
        }
    }
}

/// Map a detector label to its prohibited-object event kind
pub fn classify_object(label: &str, config: &TrackerConfig) -> Option<EventKind> {
    let label = normalize_label(label);
    let matches = |labels: &[String]| labels.iter().any(|l| normalize_label(l) == label);

    if matches(&config.phone_labels) {
        Some(EventKind::PhoneDetected)
    } else if matches(&config.notes_labels) {
        Some(EventKind::NotesDetected)
    } else {
        None
    }
}

/// Lowercased, trimmed form of a detector label
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Millisecond count as a signed value, saturating at `i64::MAX`
fn signed(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

fn seconds(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

/// Owns the signal state for one session and feeds frames through [`transition`]
#[derive(Debug, Clone)]
pub struct SignalTracker {
    config: TrackerConfig,
    state: SignalState,
}

impl Default for SignalTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl SignalTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            state: SignalState::default(),
        }
    }

    /// Process one frame observed at `now_ms` and return the events it produced
    pub fn observe(&mut self, frame: &DetectionFrame, now_ms: u64) -> Vec<EventDraft> {
        let (state, events) = transition(std::mem::take(&mut self.state), frame, now_ms, &self.config);
        self.state = state;
        events
    }

    pub fn state(&self) -> &SignalState {
        &self.state
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Return every timer and flag to its initial value
    pub fn reset(&mut self) {
        self.state = SignalState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DetectedObject, Point};

    fn focused() -> Keypoints {
        Keypoints::new(
            Point::new(0.4, 0.4),
            Point::new(0.6, 0.4),
            Point::new(0.5, 0.42),
        )
    }

    fn distracted() -> Keypoints {
        Keypoints::new(
            Point::new(0.4, 0.4),
            Point::new(0.6, 0.4),
            Point::new(0.58, 0.42),
        )
    }

    fn focused_frame() -> DetectionFrame {
        DetectionFrame::faces(1).with_keypoints(focused())
    }

    fn distracted_frame() -> DetectionFrame {
        DetectionFrame::faces(1).with_keypoints(distracted())
    }

    /// Feed `frame` every 100ms over [from, to] and collect (time, kind) pairs
    fn run(
        tracker: &mut SignalTracker,
        frame: &DetectionFrame,
        from: u64,
        to: u64,
    ) -> Vec<(u64, EventKind)> {
        let mut out = Vec::new();
        let mut t = from;
        while t <= to {
            for event in tracker.observe(frame, t) {
                out.push((t, event.kind));
            }
            t += 100;
        }
        out
    }

    fn count(events: &[(u64, EventKind)], kind: EventKind) -> usize {
        events.iter().filter(|(_, k)| *k == kind).count()
    }

    #[test]
    fn test_sustained_absence_fires_once() {
        let mut tracker = SignalTracker::default();
        let events = run(&mut tracker, &DetectionFrame::faces(0), 0, 30_000);

        assert_eq!(events, vec![(10_000, EventKind::FaceAbsent)]);
        assert!(tracker.state().face_absent_alerted);
        assert_eq!(tracker.state().attention, AttentionState::Absent);
    }

    #[test]
    fn test_short_absence_is_forgiven() {
        let mut tracker = SignalTracker::default();
        let mut events = run(&mut tracker, &DetectionFrame::faces(0), 0, 9_900);
        events.extend(run(&mut tracker, &DetectionFrame::faces(1), 10_000, 10_000));
        events.extend(run(&mut tracker, &DetectionFrame::faces(0), 10_100, 20_000));

        assert!(events.is_empty());

        // Absence restarted at 10_100, so the threshold is crossed at 20_100
        let events = run(&mut tracker, &DetectionFrame::faces(0), 20_100, 20_100);
        assert_eq!(events, vec![(20_100, EventKind::FaceAbsent)]);
    }

    #[test]
    fn test_absence_realerts_after_face_returns() {
        let mut tracker = SignalTracker::default();
        let mut events = run(&mut tracker, &DetectionFrame::faces(0), 0, 12_000);
        events.extend(run(&mut tracker, &DetectionFrame::faces(1), 12_100, 12_100));
        events.extend(run(&mut tracker, &DetectionFrame::faces(0), 12_200, 25_000));

        assert_eq!(count(&events, EventKind::FaceAbsent), 2);
        assert_eq!(events[1], (22_200, EventKind::FaceAbsent));
    }

    #[test]
    fn test_multiple_faces_debounced_per_episode() {
        let mut tracker = SignalTracker::default();
        let mut events = run(&mut tracker, &DetectionFrame::faces(2), 0, 2_000);
        events.extend(run(&mut tracker, &DetectionFrame::faces(3), 2_100, 3_000));
        assert_eq!(events, vec![(0, EventKind::MultipleFaces)]);

        events.extend(run(&mut tracker, &DetectionFrame::faces(1), 3_100, 3_100));
        events.extend(run(&mut tracker, &DetectionFrame::faces(2), 3_200, 4_000));
        assert_eq!(count(&events, EventKind::MultipleFaces), 2);
    }

    #[test]
    fn test_multiple_faces_message_includes_count() {
        let mut tracker = SignalTracker::default();
        let events = tracker.observe(&DetectionFrame::faces(3), 0);
        assert_eq!(events[0].message, "Multiple faces detected (3)");
    }

    #[test]
    fn test_absence_clears_multiplicity_flag() {
        let mut tracker = SignalTracker::default();
        let mut events = run(&mut tracker, &DetectionFrame::faces(2), 0, 500);
        events.extend(run(&mut tracker, &DetectionFrame::faces(0), 600, 700));
        events.extend(run(&mut tracker, &DetectionFrame::faces(2), 800, 900));

        assert_eq!(count(&events, EventKind::MultipleFaces), 2);
    }

    #[test]
    fn test_sustained_distraction_fires_once() {
        let mut tracker = SignalTracker::default();
        let mut events = run(&mut tracker, &focused_frame(), 0, 0);
        events.extend(run(&mut tracker, &distracted_frame(), 100, 20_000));

        assert_eq!(events, vec![(5_000, EventKind::FocusLost)]);
    }

    #[test]
    fn test_offset_at_threshold_counts_as_distracted() {
        let keypoints = Keypoints::new(
            Point::new(0.4, 0.4),
            Point::new(0.6, 0.4),
            Point::new(0.5, 0.44),
        );
        assert!((keypoints.nose_offset() - 0.04).abs() < 1e-12);

        // Threshold set to the exact offset so the comparison sits on the boundary
        let config = TrackerConfig {
            focus_offset_threshold: keypoints.nose_offset(),
            ..TrackerConfig::default()
        };
        let mut tracker = SignalTracker::new(config);
        let frame = DetectionFrame::faces(1).with_keypoints(keypoints);

        let events = run(&mut tracker, &frame, 0, 0);
        assert_eq!(events, vec![(0, EventKind::FocusLost)]);
        assert_eq!(tracker.state().attention, AttentionState::Distracted);
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let mut tracker = SignalTracker::default();
        assert!(tracker.observe(&distracted_frame(), u64::MAX).len() == 1);
        assert!(tracker.observe(&DetectionFrame::faces(0), u64::MAX).is_empty());
        assert!(tracker.observe(&DetectionFrame::faces(0), 0).is_empty());
    }

    #[test]
    fn test_first_observation_distracted_fires_immediately() {
        let mut tracker = SignalTracker::default();
        let events = run(&mut tracker, &distracted_frame(), 0, 0);
        assert_eq!(events, vec![(0, EventKind::FocusLost)]);
    }

    #[test]
    fn test_focus_restored_once_after_alert() {
        let mut tracker = SignalTracker::default();
        let mut events = run(&mut tracker, &focused_frame(), 0, 0);
        events.extend(run(&mut tracker, &distracted_frame(), 100, 6_000));
        events.extend(run(&mut tracker, &focused_frame(), 6_100, 8_000));

        assert_eq!(
            events,
            vec![(5_000, EventKind::FocusLost), (6_100, EventKind::FocusRestored)]
        );
    }

    #[test]
    fn test_brief_glance_does_not_restore() {
        let mut tracker = SignalTracker::default();
        let mut events = run(&mut tracker, &focused_frame(), 0, 0);
        events.extend(run(&mut tracker, &distracted_frame(), 100, 3_000));
        events.extend(run(&mut tracker, &focused_frame(), 3_100, 4_000));

        assert!(events.is_empty());
    }

    #[test]
    fn test_focus_lost_requires_restoration_in_between() {
        let mut tracker = SignalTracker::default();
        let mut events = run(&mut tracker, &focused_frame(), 0, 0);
        events.extend(run(&mut tracker, &distracted_frame(), 100, 6_000));
        // Absence does not count as a restoration
        events.extend(run(&mut tracker, &DetectionFrame::faces(0), 6_100, 7_000));
        events.extend(run(&mut tracker, &distracted_frame(), 7_100, 15_000));
        assert_eq!(count(&events, EventKind::FocusLost), 1);

        events.extend(run(&mut tracker, &focused_frame(), 15_100, 15_100));
        events.extend(run(&mut tracker, &distracted_frame(), 15_200, 20_200));

        let kinds: Vec<EventKind> = events.iter().map(|(_, k)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::FocusLost,
                EventKind::FocusRestored,
                EventKind::FocusLost
            ]
        );
    }

    #[test]
    fn test_absence_resets_focus_timer() {
        let mut tracker = SignalTracker::default();
        run(&mut tracker, &focused_frame(), 0, 0);
        run(&mut tracker, &distracted_frame(), 100, 2_000);
        run(&mut tracker, &DetectionFrame::faces(0), 2_100, 2_500);
        assert_eq!(tracker.state().last_focused_ms, None);

        // Timer is re-seeded in the past, so the first distracted frame alerts
        let events = run(&mut tracker, &distracted_frame(), 2_600, 2_600);
        assert_eq!(events, vec![(2_600, EventKind::FocusLost)]);
    }

    #[test]
    fn test_missing_keypoints_skip_focus() {
        let mut tracker = SignalTracker::default();
        run(&mut tracker, &focused_frame(), 0, 0);
        let events = run(&mut tracker, &DetectionFrame::faces(1), 100, 10_000);

        assert!(events.is_empty());
        assert_eq!(tracker.state().attention, AttentionState::Present);
        assert_eq!(tracker.state().last_focused_ms, Some(0));
    }

    #[test]
    fn test_objects_emit_per_frame() {
        let mut tracker = SignalTracker::default();
        let frame = DetectionFrame::faces(1)
            .with_object(DetectedObject::new("Cell Phone", 0.9))
            .with_object(DetectedObject::new("book", 0.6))
            .with_object(DetectedObject::new("laptop", 0.9))
            .with_object(DetectedObject::new("phone", 0.1));

        let events = run(&mut tracker, &frame, 0, 200);

        assert_eq!(count(&events, EventKind::PhoneDetected), 3);
        assert_eq!(count(&events, EventKind::NotesDetected), 3);
        assert_eq!(events.len(), 6);
    }

    #[test]
    fn test_object_event_carries_confidence() {
        let mut tracker = SignalTracker::default();
        let frame = DetectionFrame::faces(0).with_object(DetectedObject::new(" Notebook ", 0.75));
        let events = tracker.observe(&frame, 0);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::NotesDetected);
        assert_eq!(events[0].confidence, Some(0.75));
        assert_eq!(events[0].message, "Prohibited object detected: notebook");
        assert_eq!(events[0].label.as_deref(), Some("notebook"));
    }

    #[test]
    fn test_custom_labels() {
        let config = TrackerConfig {
            phone_labels: vec!["smartphone".to_string()],
            ..TrackerConfig::default()
        };
        assert_eq!(
            classify_object("SmartPhone", &config),
            Some(EventKind::PhoneDetected)
        );
        assert_eq!(classify_object("cell phone", &config), None);
    }

    #[test]
    fn test_transition_is_pure() {
        let config = TrackerConfig::default();
        let state = SignalState {
            attention: AttentionState::Focused,
            last_focused_ms: Some(0),
            ..SignalState::default()
        };

        let first = transition(state.clone(), &distracted_frame(), 5_000, &config);
        let second = transition(state, &distracted_frame(), 5_000, &config);

        assert_eq!(first.0, second.0);
        assert_eq!(first.1, second.1);
        assert_eq!(first.1[0].kind, EventKind::FocusLost);
    }

    #[test]
    fn test_reset_returns_to_initial_state() {
        let mut tracker = SignalTracker::default();
        run(&mut tracker, &DetectionFrame::faces(2), 0, 100);
        tracker.reset();
        assert_eq!(tracker.state(), &SignalState::default());
    }
}
