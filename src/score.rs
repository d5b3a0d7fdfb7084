//! Integrity score accumulation
//!
//! The score starts at 100 and is reduced by a fixed penalty per critical or
//! warning event. It is clamped to [0, 100] at every mutation. Status only
//! escalates within a session.

use crate::config::{DEFAULT_CRITICAL_PENALTY, DEFAULT_WARNING_PENALTY};
use crate::types::{Event, EventKind, SessionStatus, Severity};
use serde::{Deserialize, Serialize};

/// Starting integrity score for every session
pub const INITIAL_SCORE: u8 = 100;

/// A single scoring deduction, kept in the order events were applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deduction {
    pub event_id: String,
    pub kind: EventKind,
    pub severity: Severity,
    /// Points actually subtracted (smaller than the penalty once the score hits 0)
    pub amount: u8,
    pub score_after: u8,
}

impl Deduction {
    /// Human-readable line for the deduction trail
    pub fn describe(&self) -> String {
        format!(
            "{} ({}): -{} points, score {}",
            self.kind, self.severity.as_str(), self.amount, self.score_after
        )
    }
}

/// Running integrity score and status for one session
#[derive(Debug, Clone)]
pub struct ScoreAccumulator {
    score: u8,
    status: SessionStatus,
    critical_penalty: u8,
    warning_penalty: u8,
    deductions: Vec<Deduction>,
}

impl Default for ScoreAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreAccumulator {
    /// Create an accumulator with the standard penalties (critical 10, warning 5)
    pub fn new() -> Self {
        Self::with_penalties(DEFAULT_CRITICAL_PENALTY, DEFAULT_WARNING_PENALTY)
    }

    pub fn with_penalties(critical_penalty: u8, warning_penalty: u8) -> Self {
        Self {
            score: INITIAL_SCORE,
            status: SessionStatus::Good,
            critical_penalty,
            warning_penalty,
            deductions: Vec::new(),
        }
    }

    /// Apply an event. Info events leave score and status unchanged.
    pub fn apply(&mut self, event: &Event) {
        let (penalty, status) = match event.severity {
            Severity::Critical => (self.critical_penalty, SessionStatus::Critical),
            Severity::Warning => (self.warning_penalty, SessionStatus::Warning),
            Severity::Info => return,
        };

        let before = self.score;
        self.score = before.saturating_sub(penalty).min(INITIAL_SCORE);
        self.status = self.status.escalate(status);

        self.deductions.push(Deduction {
            event_id: event.id.clone(),
            kind: event.kind,
            severity: event.severity,
            amount: before - self.score,
            score_after: self.score,
        });
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Deductions in the order they were applied
    pub fn deductions(&self) -> &[Deduction] {
        &self.deductions
    }

    /// Total points subtracted so far
    pub fn total_deducted(&self) -> u32 {
        self.deductions.iter().map(|d| d.amount as u32).sum()
    }
}

/// Qualitative band for a final score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assessment {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Assessment {
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => Assessment::Excellent,
            60..=79 => Assessment::Good,
            40..=59 => Assessment::Fair,
            _ => Assessment::Poor,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Assessment::Excellent => "High integrity, minimal violations",
            Assessment::Good => "Acceptable with minor concerns",
            Assessment::Fair => "Moderate violations detected",
            Assessment::Poor => "Significant integrity concerns",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventDraft;
    use chrono::Utc;
    use proptest::prelude::*;

    fn event(kind: EventKind) -> Event {
        Event::from_draft(EventDraft::new(kind, kind.as_str()), Utc::now(), 0)
    }

    fn kind_for(severity: Severity) -> EventKind {
        match severity {
            Severity::Critical => EventKind::FaceAbsent,
            Severity::Warning => EventKind::FocusLost,
            Severity::Info => EventKind::FocusRestored,
        }
    }

    #[test]
    fn test_initial_state() {
        let acc = ScoreAccumulator::new();
        assert_eq!(acc.score(), 100);
        assert_eq!(acc.status(), SessionStatus::Good);
        assert!(acc.deductions().is_empty());
    }

    #[test]
    fn test_critical_warning_critical() {
        let mut acc = ScoreAccumulator::new();
        acc.apply(&event(EventKind::MultipleFaces));
        acc.apply(&event(EventKind::FocusLost));
        acc.apply(&event(EventKind::FaceAbsent));

        assert_eq!(acc.score(), 75);
        assert_eq!(acc.status(), SessionStatus::Critical);
        assert_eq!(acc.total_deducted(), 25);
    }

    #[test]
    fn test_warning_then_info_stays_warning() {
        let mut acc = ScoreAccumulator::new();
        acc.apply(&event(EventKind::FocusLost));
        acc.apply(&event(EventKind::FocusRestored));

        assert_eq!(acc.score(), 95);
        assert_eq!(acc.status(), SessionStatus::Warning);
        assert_eq!(acc.deductions().len(), 1);
    }

    #[test]
    fn test_score_floors_at_zero() {
        let mut acc = ScoreAccumulator::new();
        for _ in 0..12 {
            acc.apply(&event(EventKind::PhoneDetected));
        }

        assert_eq!(acc.score(), 0);
        let last = acc.deductions().last().unwrap();
        assert_eq!(last.amount, 0);
        assert_eq!(last.score_after, 0);
        assert_eq!(acc.total_deducted(), 100);
    }

    #[test]
    fn test_deduction_description() {
        let mut acc = ScoreAccumulator::new();
        acc.apply(&event(EventKind::FocusLost));
        assert_eq!(
            acc.deductions()[0].describe(),
            "focus-lost (warning): -5 points, score 95"
        );
    }

    #[test]
    fn test_assessment_bands() {
        assert_eq!(Assessment::from_score(100), Assessment::Excellent);
        assert_eq!(Assessment::from_score(80), Assessment::Excellent);
        assert_eq!(Assessment::from_score(79), Assessment::Good);
        assert_eq!(Assessment::from_score(40), Assessment::Fair);
        assert_eq!(Assessment::from_score(39), Assessment::Poor);
        assert_eq!(Assessment::from_score(0), Assessment::Poor);
    }

    fn arb_severity() -> impl Strategy<Value = Severity> {
        prop_oneof![
            Just(Severity::Info),
            Just(Severity::Warning),
            Just(Severity::Critical)
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Property: the score stays within [0, 100] for any event sequence.
        #[test]
        fn prop_score_bounded(severities in prop::collection::vec(arb_severity(), 0..60)) {
            let mut acc = ScoreAccumulator::new();
            for severity in severities {
                acc.apply(&event(kind_for(severity)));
                prop_assert!(acc.score() <= 100);
            }
        }

        /// Property: status never de-escalates.
        #[test]
        fn prop_status_monotone(severities in prop::collection::vec(arb_severity(), 0..60)) {
            let mut acc = ScoreAccumulator::new();
            let mut previous = acc.status();
            for severity in severities {
                acc.apply(&event(kind_for(severity)));
                prop_assert!(acc.status() >= previous);
                previous = acc.status();
            }
        }

        /// Property: order within a severity class does not change the result.
        #[test]
        fn prop_final_score_matches_counts(severities in prop::collection::vec(arb_severity(), 0..30)) {
            let mut acc = ScoreAccumulator::new();
            for severity in &severities {
                acc.apply(&event(kind_for(*severity)));
            }
            let critical = severities.iter().filter(|s| **s == Severity::Critical).count() as i64;
            let warning = severities.iter().filter(|s| **s == Severity::Warning).count() as i64;
            let expected = (100 - critical * 10 - warning * 5).max(0);
            prop_assert_eq!(acc.score() as i64, expected);
        }
    }
}
