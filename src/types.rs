//! Core data types for Proctor Flux
//!
//! Detection frames flow in from the external face/object detector, one per
//! sampling tick. Events flow out to the score accumulator, the event log and
//! any presentation or export collaborator.

use crate::error::ProctorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Detection input
// ============================================================================

/// A point in normalized image coordinates, both axes expected in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Midpoint between this point and another
    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    fn is_normalized(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

/// Facial keypoints of the primary detected face
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoints {
    #[serde(alias = "leftEye")]
    pub left_eye: Point,
    #[serde(alias = "rightEye")]
    pub right_eye: Point,
    #[serde(alias = "noseTip")]
    pub nose_tip: Point,
}

impl Keypoints {
    pub fn new(left_eye: Point, right_eye: Point, nose_tip: Point) -> Self {
        Self {
            left_eye,
            right_eye,
            nose_tip,
        }
    }

    /// Distance between the nose tip and the midpoint of the eyes.
    ///
    /// A head turned away from the screen pushes the nose off the eye axis, so
    /// larger offsets mean the candidate is looking elsewhere.
    pub fn nose_offset(&self) -> f64 {
        self.nose_tip
            .distance(&self.left_eye.midpoint(&self.right_eye))
    }
}

/// An object reported by the detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    /// Class label as reported by the detector (e.g. "cell phone")
    pub label: String,
    /// Detection confidence (0-1)
    pub confidence: f64,
}

impl DetectedObject {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Detection result for a single sampling tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionFrame {
    /// Number of faces found in the frame
    #[serde(alias = "faceCount")]
    pub face_count: u32,
    /// Keypoints of the primary face, when the detector provides them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypoints: Option<Keypoints>,
    /// Classified objects in the frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects: Option<Vec<DetectedObject>>,
}

impl DetectionFrame {
    /// A frame with the given face count and nothing else
    pub fn faces(face_count: u32) -> Self {
        Self {
            face_count,
            keypoints: None,
            objects: None,
        }
    }

    pub fn with_keypoints(mut self, keypoints: Keypoints) -> Self {
        self.keypoints = Some(keypoints);
        self
    }

    pub fn with_object(mut self, object: DetectedObject) -> Self {
        self.objects.get_or_insert_with(Vec::new).push(object);
        self
    }

    /// Objects in the frame (empty when the detector reported none)
    pub fn objects(&self) -> &[DetectedObject] {
        self.objects.as_deref().unwrap_or(&[])
    }

    /// Check that coordinates and confidences are within their normalized ranges
    pub fn validate(&self) -> Result<(), ProctorError> {
        if let Some(kp) = &self.keypoints {
            for (name, point) in [
                ("left_eye", kp.left_eye),
                ("right_eye", kp.right_eye),
                ("nose_tip", kp.nose_tip),
            ] {
                if !point.is_normalized() {
                    return Err(ProctorError::InvalidFrame(format!(
                        "keypoint {name} ({}, {}) is outside [0, 1]",
                        point.x, point.y
                    )));
                }
            }
        }

        for object in self.objects() {
            if !(0.0..=1.0).contains(&object.confidence) {
                return Err(ProctorError::InvalidFrame(format!(
                    "object '{}' has confidence {} outside [0, 1]",
                    object.label, object.confidence
                )));
            }
        }

        Ok(())
    }
}

/// A detection frame stamped with the monotonic sampling time (milliseconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedFrame {
    #[serde(alias = "timestamp_ms", alias = "tMs")]
    pub t_ms: u64,
    #[serde(flatten)]
    pub frame: DetectionFrame,
}

// ============================================================================
// Events
// ============================================================================

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// Behavioral event types emitted by the signal tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    FocusLost,
    FocusRestored,
    FaceAbsent,
    MultipleFaces,
    PhoneDetected,
    NotesDetected,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::FocusLost => "focus-lost",
            EventKind::FocusRestored => "focus-restored",
            EventKind::FaceAbsent => "face-absent",
            EventKind::MultipleFaces => "multiple-faces",
            EventKind::PhoneDetected => "phone-detected",
            EventKind::NotesDetected => "notes-detected",
        }
    }

    /// Severity attached to every event of this kind
    pub fn severity(&self) -> Severity {
        match self {
            EventKind::FocusRestored => Severity::Info,
            EventKind::FocusLost => Severity::Warning,
            EventKind::FaceAbsent
            | EventKind::MultipleFaces
            | EventKind::PhoneDetected
            | EventKind::NotesDetected => Severity::Critical,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event produced by the tracker before it is stamped with id and time
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub kind: EventKind,
    pub message: String,
    pub confidence: Option<f64>,
    pub label: Option<String>,
}

impl EventDraft {
    pub fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            confidence: None,
            label: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// An immutable session event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier within the session
    pub id: String,
    /// Event type
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Wall-clock instant of emission
    pub timestamp: DateTime<Utc>,
    /// Milliseconds since the session started monitoring
    pub offset_ms: u64,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Normalized detector label for prohibited-object events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Event {
    /// Stamp a draft with a fresh id and its emission time
    pub fn from_draft(draft: EventDraft, timestamp: DateTime<Utc>, offset_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: draft.kind,
            timestamp,
            offset_ms,
            severity: draft.kind.severity(),
            message: draft.message,
            confidence: draft.confidence,
            label: draft.label,
        }
    }
}

// ============================================================================
// Session status
// ============================================================================

/// Session integrity status. Ordered so that escalation is a `max`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Good,
    Warning,
    Critical,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Good => "good",
            SessionStatus::Warning => "warning",
            SessionStatus::Critical => "critical",
        }
    }

    /// Escalate to `other` if it is more severe; never de-escalates
    pub fn escalate(self, other: SessionStatus) -> SessionStatus {
        self.max(other)
    }
}
