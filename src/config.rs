//! Tracker and session configuration
//!
//! Every field has a default, so a partial JSON document only overrides the
//! values it names.

use crate::error::ProctorError;
use serde::{Deserialize, Serialize};

/// Continuous absence required before `face-absent` fires (10 seconds)
pub const DEFAULT_FACE_ABSENT_THRESHOLD_MS: u64 = 10_000;

/// Continuous distraction required before `focus-lost` fires (5 seconds)
pub const DEFAULT_FOCUS_LOST_THRESHOLD_MS: u64 = 5_000;

/// Nose-to-eye-midpoint offset below which the candidate counts as focused
pub const DEFAULT_FOCUS_OFFSET_THRESHOLD: f64 = 0.04;

/// How far in the past the focus timer is seeded when the first observation is
/// already distracted. Larger than the focus threshold so detection is immediate.
pub const DEFAULT_FOCUS_SEED_LOOKBACK_MS: u64 = 6_000;

/// Minimum object confidence for a prohibited-object event
pub const DEFAULT_OBJECT_CONFIDENCE_THRESHOLD: f64 = 0.2;

/// Minimum spacing between processed frames (~10 Hz)
pub const DEFAULT_MIN_FRAME_INTERVAL_MS: u64 = 100;

pub const DEFAULT_CRITICAL_PENALTY: u8 = 10;
pub const DEFAULT_WARNING_PENALTY: u8 = 5;

/// Thresholds used by the debounced signal tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub face_absent_threshold_ms: u64,
    pub focus_lost_threshold_ms: u64,
    pub focus_offset_threshold: f64,
    pub focus_seed_lookback_ms: u64,
    pub object_confidence_threshold: f64,
    /// Detector labels that map to `phone-detected`
    pub phone_labels: Vec<String>,
    /// Detector labels that map to `notes-detected`
    pub notes_labels: Vec<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            face_absent_threshold_ms: DEFAULT_FACE_ABSENT_THRESHOLD_MS,
            focus_lost_threshold_ms: DEFAULT_FOCUS_LOST_THRESHOLD_MS,
            focus_offset_threshold: DEFAULT_FOCUS_OFFSET_THRESHOLD,
            focus_seed_lookback_ms: DEFAULT_FOCUS_SEED_LOOKBACK_MS,
            object_confidence_threshold: DEFAULT_OBJECT_CONFIDENCE_THRESHOLD,
            phone_labels: ["cell phone", "phone", "mobile phone"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            notes_labels: ["book", "paper", "notes", "notebook"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ProctorError> {
        if self.face_absent_threshold_ms == 0 {
            return Err(ProctorError::InvalidConfig(
                "face_absent_threshold_ms must be positive".to_string(),
            ));
        }
        if self.focus_lost_threshold_ms == 0 {
            return Err(ProctorError::InvalidConfig(
                "focus_lost_threshold_ms must be positive".to_string(),
            ));
        }
        if !self.focus_offset_threshold.is_finite() || self.focus_offset_threshold <= 0.0 {
            return Err(ProctorError::InvalidConfig(format!(
                "focus_offset_threshold must be a positive number, got {}",
                self.focus_offset_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.object_confidence_threshold) {
            return Err(ProctorError::InvalidConfig(format!(
                "object_confidence_threshold must be within [0, 1], got {}",
                self.object_confidence_threshold
            )));
        }
        Ok(())
    }
}

/// Per-session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub tracker: TrackerConfig,
    /// Frames arriving sooner than this after the last processed one are dropped
    pub min_frame_interval_ms: u64,
    pub critical_penalty: u8,
    pub warning_penalty: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            min_frame_interval_ms: DEFAULT_MIN_FRAME_INTERVAL_MS,
            critical_penalty: DEFAULT_CRITICAL_PENALTY,
            warning_penalty: DEFAULT_WARNING_PENALTY,
        }
    }
}

impl SessionConfig {
    pub fn with_tracker(mut self, tracker: TrackerConfig) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_min_frame_interval(mut self, interval_ms: u64) -> Self {
        self.min_frame_interval_ms = interval_ms;
        self
    }

    pub fn with_penalties(mut self, critical: u8, warning: u8) -> Self {
        self.critical_penalty = critical;
        self.warning_penalty = warning;
        self
    }

    /// Load configuration from JSON, filling unspecified fields with defaults
    pub fn from_json(json: &str) -> Result<Self, ProctorError> {
        let config: SessionConfig = serde_json::from_str(json)
            .map_err(|e| ProctorError::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ProctorError> {
        serde_json::to_string_pretty(self).map_err(ProctorError::JsonError)
    }

    pub fn validate(&self) -> Result<(), ProctorError> {
        self.tracker.validate()?;
        if self.critical_penalty > 100 || self.warning_penalty > 100 {
            return Err(ProctorError::InvalidConfig(
                "penalties must not exceed 100".to_string(),
            ));
        }
        Ok(())
    }
}
