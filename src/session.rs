//! Proctoring session
//!
//! A session owns exactly one tracker, score accumulator, event log and
//! notification sink. Frames enter through a throttled gate: a frame arriving
//! sooner than the minimum interval after the last processed one is dropped,
//! and a new tick is skipped entirely while a detection is still in flight.
//!
//! Detection may run asynchronously relative to the sampling loop. The loop
//! calls [`ProctorSession::begin_tick`] to obtain a [`TickPermit`], hands the
//! frame to the detector, and later calls [`ProctorSession::complete_tick`]
//! with the result. Stopping the session invalidates every outstanding permit,
//! so a detector callback that lands after `stop` cannot mutate state.

use crate::config::SessionConfig;
use crate::error::ProctorError;
use crate::event_log::EventLog;
use crate::score::ScoreAccumulator;
use crate::sink::{NotificationSink, NullSink};
use crate::tracker::{AttentionState, SignalTracker};
use crate::types::{DetectionFrame, Event, SessionStatus};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// Furthest a sampling time may lie from the session origin (366 days)
pub const MAX_SESSION_SPAN_MS: u64 = 366 * 24 * 60 * 60 * 1000;

/// Lifecycle phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Monitoring,
    Stopped,
}

/// Permission to run one detection. At most one is outstanding per session.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a permit must be completed or the session stays busy"]
pub struct TickPermit {
    session_nonce: u64,
    generation: u64,
    issued_at_ms: u64,
}

impl TickPermit {
    /// Sampling time the permit was issued for
    pub fn issued_at_ms(&self) -> u64 {
        self.issued_at_ms
    }
}

/// Counters for the sampling gate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingStats {
    /// Frames handed to the tracker
    pub processed: u64,
    /// Ticks dropped for arriving before the minimum interval
    pub throttled: u64,
    /// Ticks skipped because a detection was still in flight
    pub skipped_in_flight: u64,
    /// Completions rejected because the session stopped in between
    pub stale: u64,
}

/// Serializable snapshot of session metadata and standing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub candidate_name: String,
    pub phase: SessionPhase,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Elapsed monitoring time as HH:MM:SS
    pub duration: String,
    pub duration_ms: u64,
    pub score: u8,
    pub status: SessionStatus,
    pub total_events: usize,
}

/// A single proctoring session
pub struct ProctorSession<S: NotificationSink = NullSink> {
    candidate_name: String,
    config: SessionConfig,
    phase: SessionPhase,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    origin_ms: u64,
    last_tick_ms: Option<u64>,
    in_flight: bool,
    nonce: u64,
    generation: u64,
    tracker: SignalTracker,
    score: ScoreAccumulator,
    log: EventLog,
    sink: S,
    stats: SamplingStats,
}

impl ProctorSession<NullSink> {
    /// Create a session with no notification sink
    pub fn new(candidate_name: impl Into<String>, config: SessionConfig) -> Self {
        Self::with_sink(candidate_name, config, NullSink)
    }
}

impl<S: NotificationSink> ProctorSession<S> {
    pub fn with_sink(candidate_name: impl Into<String>, config: SessionConfig, sink: S) -> Self {
        let tracker = SignalTracker::new(config.tracker.clone());
        let score = ScoreAccumulator::with_penalties(config.critical_penalty, config.warning_penalty);
        Self {
            candidate_name: candidate_name.into(),
            config,
            phase: SessionPhase::Idle,
            started_at: None,
            ended_at: None,
            origin_ms: 0,
            last_tick_ms: None,
            in_flight: false,
            nonce: Uuid::new_v4().as_u64_pair().0,
            generation: 0,
            tracker,
            score,
            log: EventLog::new(),
            sink,
            stats: SamplingStats::default(),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start monitoring at monotonic time `now_ms`, stamping events from the
    /// current wall clock
    pub fn start(&mut self, now_ms: u64) -> Result<(), ProctorError> {
        self.start_at(now_ms, Utc::now())
    }

    /// Start monitoring with an explicit wall-clock start time
    pub fn start_at(&mut self, now_ms: u64, started_at: DateTime<Utc>) -> Result<(), ProctorError> {
        match self.phase {
            SessionPhase::Monitoring => return Err(ProctorError::SessionAlreadyStarted),
            SessionPhase::Stopped => return Err(ProctorError::SessionClosed),
            SessionPhase::Idle => {}
        }
        self.check_timestamp(now_ms)?;

        self.tracker.reset();
        self.phase = SessionPhase::Monitoring;
        self.started_at = Some(started_at);
        self.origin_ms = now_ms;
        self.last_tick_ms = None;
        self.in_flight = false;
        self.generation += 1;

        info!(candidate = %self.candidate_name, "Proctoring session started");
        Ok(())
    }

    /// Stop monitoring. Outstanding permits become stale and timers are cancelled.
    /// Stopping an already stopped session is a no-op.
    pub fn stop(&mut self, now_ms: u64) -> Result<(), ProctorError> {
        match self.phase {
            SessionPhase::Idle => return Err(ProctorError::SessionNotStarted),
            SessionPhase::Stopped => return Ok(()),
            SessionPhase::Monitoring => {}
        }

        // Cancel the loop before anything else is torn down
        self.generation += 1;
        self.in_flight = false;
        self.phase = SessionPhase::Stopped;
        self.tracker.reset();

        let elapsed = now_ms
            .saturating_sub(self.origin_ms)
            .min(MAX_SESSION_SPAN_MS);
        self.ended_at = self.started_at.map(|t| offset_instant(t, elapsed));

        info!(
            candidate = %self.candidate_name,
            score = self.score.score(),
            status = self.score.status().as_str(),
            events = self.log.len(),
            "Proctoring session ended"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sampling
    // ------------------------------------------------------------------

    /// Ask to sample a frame at `now_ms`.
    ///
    /// Returns `None` when the session is not monitoring, when the previous
    /// detection has not completed, or when the minimum frame interval has not
    /// elapsed since the last sampled tick.
    pub fn begin_tick(&mut self, now_ms: u64) -> Option<TickPermit> {
        if self.phase != SessionPhase::Monitoring {
            return None;
        }

        if let Err(e) = self.check_timestamp(now_ms) {
            debug!(error = %e, "Tick rejected");
            return None;
        }

        if self.in_flight {
            self.stats.skipped_in_flight += 1;
            debug!(now_ms, "Tick skipped, detection still in flight");
            return None;
        }

        if let Some(last) = self.last_tick_ms {
            if now_ms < last.saturating_add(self.config.min_frame_interval_ms) {
                self.stats.throttled += 1;
                return None;
            }
        }

        self.last_tick_ms = Some(now_ms);
        self.in_flight = true;
        Some(TickPermit {
            session_nonce: self.nonce,
            generation: self.generation,
            issued_at_ms: now_ms,
        })
    }

    /// Deliver the detection result for a permit.
    ///
    /// `None` means the detector produced nothing for this tick; the permit is
    /// released without touching the tracker. Results for permits issued
    /// before the session stopped are discarded.
    pub fn complete_tick(&mut self, permit: TickPermit, frame: Option<&DetectionFrame>) -> Vec<Event> {
        if permit.session_nonce != self.nonce {
            debug!(
                issued_at_ms = permit.issued_at_ms,
                "Ignoring a permit issued by another session"
            );
            return Vec::new();
        }

        if permit.generation != self.generation || self.phase != SessionPhase::Monitoring {
            self.stats.stale += 1;
            debug!(
                issued_at_ms = permit.issued_at_ms,
                "Discarding detection result from a cancelled tick"
            );
            return Vec::new();
        }

        self.in_flight = false;

        match frame {
            Some(frame) => self.process(frame, permit.issued_at_ms),
            None => Vec::new(),
        }
    }

    /// Sample and process a frame synchronously
    pub fn ingest(&mut self, now_ms: u64, frame: &DetectionFrame) -> Vec<Event> {
        match self.begin_tick(now_ms) {
            Some(permit) => self.complete_tick(permit, Some(frame)),
            None => Vec::new(),
        }
    }

    fn process(&mut self, frame: &DetectionFrame, at_ms: u64) -> Vec<Event> {
        self.stats.processed += 1;

        let drafts = self.tracker.observe(frame, at_ms);
        if drafts.is_empty() {
            return Vec::new();
        }

        let offset_ms = at_ms.saturating_sub(self.origin_ms);
        let timestamp = offset_instant(self.started_at.unwrap_or_else(Utc::now), offset_ms);

        let mut emitted = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let event = Event::from_draft(draft, timestamp, offset_ms);

            // Accumulator, log, then sink: one total order for all consumers
            self.score.apply(&event);
            self.log.append(event.clone());
            self.sink.notify(&event);

            debug!(
                kind = event.kind.as_str(),
                offset_ms,
                score = self.score.score(),
                "Event emitted"
            );
            emitted.push(event);
        }
        emitted
    }

    /// Check that a sampling time can be tracked and stamped.
    ///
    /// Times must fit in a signed 64-bit millisecond clock and, once the
    /// session is monitoring, lie within [`MAX_SESSION_SPAN_MS`] of its origin.
    pub fn check_timestamp(&self, now_ms: u64) -> Result<(), ProctorError> {
        if i64::try_from(now_ms).is_err() {
            return Err(ProctorError::InvalidFrame(format!(
                "timestamp {} ms is out of range",
                now_ms
            )));
        }
        if self.phase == SessionPhase::Monitoring {
            let span = now_ms.abs_diff(self.origin_ms);
            if span > MAX_SESSION_SPAN_MS {
                return Err(ProctorError::InvalidFrame(format!(
                    "timestamp {} ms is {} ms from the session origin (limit {} ms)",
                    now_ms, span, MAX_SESSION_SPAN_MS
                )));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn current_score(&self) -> u8 {
        self.score.score()
    }

    pub fn current_status(&self) -> SessionStatus {
        self.score.status()
    }

    /// All events, oldest first
    pub fn all_events(&self) -> &[Event] {
        self.log.chronological()
    }

    /// Most recent events, newest first, for live display
    pub fn recent_events(&self, n: usize) -> Vec<&Event> {
        self.log.recent(n)
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    pub fn score_accumulator(&self) -> &ScoreAccumulator {
        &self.score
    }

    pub fn attention(&self) -> AttentionState {
        self.tracker.state().attention
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_monitoring(&self) -> bool {
        self.phase == SessionPhase::Monitoring
    }

    pub fn candidate_name(&self) -> &str {
        &self.candidate_name
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn stats(&self) -> SamplingStats {
        self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Monitoring time so far: up to `ended_at` once stopped, otherwise up to
    /// the last sampled tick
    pub fn duration_ms(&self) -> u64 {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds().max(0) as u64,
            (Some(_), None) => self
                .last_tick_ms
                .map(|t| t.saturating_sub(self.origin_ms))
                .unwrap_or(0),
            _ => 0,
        }
    }

    pub fn summary(&self) -> SessionSummary {
        let duration_ms = self.duration_ms();
        SessionSummary {
            candidate_name: self.candidate_name.clone(),
            phase: self.phase,
            started_at: self.started_at,
            ended_at: self.ended_at,
            duration: format_duration(duration_ms),
            duration_ms,
            score: self.current_score(),
            status: self.current_status(),
            total_events: self.log.len(),
        }
    }
}

/// `base` shifted by `offset_ms`, saturating at `base` if it cannot be represented
fn offset_instant(base: DateTime<Utc>, offset_ms: u64) -> DateTime<Utc> {
    i64::try_from(offset_ms)
        .ok()
        .and_then(Duration::try_milliseconds)
        .and_then(|delta| base.checked_add_signed(delta))
        .unwrap_or(base)
}

/// Format milliseconds as HH:MM:SS
pub fn format_duration(ms: u64) -> String {
    let total_secs = ms / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}
