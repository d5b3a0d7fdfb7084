//! Integrity report compilation
//!
//! A report is compiled either from a live session (event log plus score
//! accumulator) or from an analysis payload produced out of process. External
//! payloads are parsed leniently: a missing or mistyped nested field becomes
//! zero or empty, and a payload without `integrity_analysis` compiles to an
//! explicit "no analysis available" result instead of an error.

use crate::error::ProctorError;
use crate::event_log::{EventLog, SeverityCounts};
use crate::score::{Assessment, ScoreAccumulator, INITIAL_SCORE};
use crate::session::{ProctorSession, SessionSummary};
use crate::sink::NotificationSink;
use crate::types::{EventKind, Severity};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Message carried by a report compiled without analysis data
pub const NO_ANALYSIS_MESSAGE: &str = "No analysis available";

// ============================================================================
// Lenient field parsing
// ============================================================================

/// Deserialize a field, falling back to its default on any type mismatch
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Deserialize a list, dropping elements that do not parse
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    };
    Ok(items)
}

// ============================================================================
// Report shape
// ============================================================================

/// Per-type episode counts with a fixed set of keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryDetails {
    #[serde(default, deserialize_with = "lenient")]
    pub focus_lost_events: u32,
    #[serde(default, deserialize_with = "lenient")]
    pub face_absent_events: u32,
    #[serde(default, deserialize_with = "lenient")]
    pub multiple_faces_events: u32,
    /// Normalized object label to occurrence count
    #[serde(default, deserialize_with = "lenient")]
    pub prohibited_objects: BTreeMap<String, u32>,
}

/// Recording metadata passed through from an out-of-process analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<String>,
    /// Any other fields, kept verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Event totals computed by an out-of-process analysis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    #[serde(default, deserialize_with = "lenient")]
    pub total_events: u32,
    #[serde(default, deserialize_with = "lenient")]
    pub critical_events: u32,
    #[serde(default, deserialize_with = "lenient")]
    pub warning_events: u32,
    #[serde(default, deserialize_with = "lenient")]
    pub object_detections: u32,
    #[serde(default, deserialize_with = "lenient")]
    pub face_events: u32,
    #[serde(default, deserialize_with = "lenient")]
    pub focus_events: u32,
}

impl AnalysisSummary {
    /// Severity counts implied by the totals. Events that are neither critical
    /// nor warning count as info.
    pub fn severity_counts(&self) -> SeverityCounts {
        SeverityCounts {
            critical: self.critical_events,
            warning: self.warning_events,
            info: self
                .total_events
                .saturating_sub(self.critical_events)
                .saturating_sub(self.warning_events),
        }
    }
}

/// Where a report's numbers came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSource {
    Session,
    External,
}

/// One line of the event timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Seconds since the start of monitoring, when known
    pub at_seconds: Option<f64>,
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub message: String,
}

/// A compiled integrity report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub source: ReportSource,
    pub final_integrity_score: u8,
    pub assessment: Assessment,
    pub summary_details: SummaryDetails,
    /// One line per deduction, in the order they were applied
    pub deductions_breakdown: Vec<String>,
    pub event_counts: SeverityCounts,
    pub timeline: Vec<TimelineEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_info: Option<VideoInfo>,
    /// Totals block from an external analysis, passed through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_summary: Option<AnalysisSummary>,
    /// Why a supplied payload was not used, when the report fell back to the session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_error: Option<String>,
    pub generated_at: DateTime<Utc>,
}

/// Result of compiling without any analysis data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoAnalysis {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_info: Option<VideoInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_summary: Option<AnalysisSummary>,
    pub generated_at: DateTime<Utc>,
}

/// Report outcome, tagged by `analysis` in JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "analysis", rename_all = "snake_case")]
pub enum CompiledReport {
    Available(IntegrityReport),
    Unavailable(NoAnalysis),
}

impl CompiledReport {
    pub fn is_available(&self) -> bool {
        matches!(self, CompiledReport::Available(_))
    }

    pub fn report(&self) -> Option<&IntegrityReport> {
        match self {
            CompiledReport::Available(report) => Some(report),
            CompiledReport::Unavailable(_) => None,
        }
    }

    pub fn final_score(&self) -> Option<u8> {
        self.report().map(|r| r.final_integrity_score)
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, ProctorError> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }
}

// ============================================================================
// External payload
// ============================================================================

/// The `integrity_analysis` block of an external payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrityAnalysis {
    #[serde(default, deserialize_with = "lenient")]
    pub final_integrity_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub summary_details: SummaryDetails,
    #[serde(default, deserialize_with = "lenient")]
    pub deductions_breakdown: Vec<String>,
}

/// An event as reported by an external analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalEvent {
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub kind: String,
    /// Seconds into the recording
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub severity: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl ExternalEvent {
    /// Severity by name, case-insensitive. Anything unrecognized counts as info.
    pub fn severity(&self) -> Severity {
        match self.severity.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("critical") => Severity::Critical,
            Some("warning") => Severity::Warning,
            _ => Severity::Info,
        }
    }

    fn timeline_entry(&self) -> TimelineEntry {
        TimelineEntry {
            at_seconds: self.timestamp,
            kind: self.kind.replace('_', "-"),
            severity: self.severity(),
            message: self
                .message
                .clone()
                .unwrap_or_else(|| "No message".to_string()),
        }
    }
}

/// Output of an out-of-process analysis run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPayload {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub integrity_analysis: Option<IntegrityAnalysis>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub events: Vec<ExternalEvent>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub video_info: Option<VideoInfo>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub summary: Option<AnalysisSummary>,
}

impl AnalysisPayload {
    /// Parse a payload document.
    ///
    /// Blank input and the literal `null` mean no payload. Anything that is not
    /// valid JSON, or not a JSON object, is a parse error.
    pub fn from_json(json: &str) -> Result<Option<Self>, ProctorError> {
        if json.trim().is_empty() {
            return Ok(None);
        }

        let value: Value =
            serde_json::from_str(json).map_err(|e| ProctorError::ParseError(e.to_string()))?;

        match value {
            Value::Null => Ok(None),
            Value::Object(_) => Ok(Some(serde_json::from_value(value)?)),
            other => Err(ProctorError::ParseError(format!(
                "analysis payload must be an object, found {}",
                json_type(&other)
            ))),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn clamp_score(score: Option<f64>) -> u8 {
    match score {
        Some(s) if s.is_finite() => s.round().clamp(0.0, INITIAL_SCORE as f64) as u8,
        _ => 0,
    }
}

// ============================================================================
// Compiler
// ============================================================================

/// Builds [`CompiledReport`]s from sessions and external payloads
pub struct ReportCompiler;

impl ReportCompiler {
    /// Compile from an event log and score accumulator
    pub fn from_parts(log: &EventLog, score: &ScoreAccumulator) -> IntegrityReport {
        let mut summary = SummaryDetails::default();
        for event in log.chronological() {
            match event.kind {
                EventKind::FocusLost => summary.focus_lost_events += 1,
                EventKind::FaceAbsent => summary.face_absent_events += 1,
                EventKind::MultipleFaces => summary.multiple_faces_events += 1,
                EventKind::PhoneDetected | EventKind::NotesDetected => {
                    let label = event
                        .label
                        .clone()
                        .unwrap_or_else(|| event.kind.as_str().to_string());
                    *summary.prohibited_objects.entry(label).or_insert(0) += 1;
                }
                EventKind::FocusRestored => {}
            }
        }

        let timeline = log
            .chronological()
            .iter()
            .map(|e| TimelineEntry {
                at_seconds: Some(e.offset_ms as f64 / 1000.0),
                kind: e.kind.as_str().to_string(),
                severity: e.severity,
                message: e.message.clone(),
            })
            .collect();

        IntegrityReport {
            source: ReportSource::Session,
            final_integrity_score: score.score(),
            assessment: Assessment::from_score(score.score()),
            summary_details: summary,
            deductions_breakdown: score.deductions().iter().map(|d| d.describe()).collect(),
            event_counts: log.severity_counts(),
            timeline,
            session: None,
            video_info: None,
            analysis_summary: None,
            payload_error: None,
            generated_at: Utc::now(),
        }
    }

    /// Compile from a live or stopped session, including its metadata
    pub fn from_session<S: NotificationSink>(session: &ProctorSession<S>) -> CompiledReport {
        let mut report = Self::from_parts(session.event_log(), session.score_accumulator());
        report.session = Some(session.summary());
        CompiledReport::Available(report)
    }

    /// Compile from an external payload. `None`, or a payload without an
    /// `integrity_analysis` block, yields the no-analysis result.
    pub fn from_payload(payload: Option<&AnalysisPayload>) -> CompiledReport {
        let Some(payload) = payload else {
            return Self::no_analysis(None);
        };
        let Some(analysis) = &payload.integrity_analysis else {
            let mut compiled = Self::no_analysis(payload.video_info.clone());
            if let CompiledReport::Unavailable(na) = &mut compiled {
                na.analysis_summary = payload.summary;
            }
            return compiled;
        };

        // Totals computed by the analysis win over a recount of its event list
        let event_counts = match &payload.summary {
            Some(summary) => summary.severity_counts(),
            None => {
                let mut counts = SeverityCounts::default();
                for event in &payload.events {
                    counts.record(event.severity());
                }
                counts
            }
        };

        let score = clamp_score(analysis.final_integrity_score);

        CompiledReport::Available(IntegrityReport {
            source: ReportSource::External,
            final_integrity_score: score,
            assessment: Assessment::from_score(score),
            summary_details: analysis.summary_details.clone(),
            deductions_breakdown: analysis.deductions_breakdown.clone(),
            event_counts,
            timeline: payload.events.iter().map(ExternalEvent::timeline_entry).collect(),
            session: None,
            video_info: payload.video_info.clone(),
            analysis_summary: payload.summary,
            payload_error: None,
            generated_at: Utc::now(),
        })
    }

    /// Parse and compile an external payload document
    pub fn from_payload_json(json: &str) -> Result<CompiledReport, ProctorError> {
        let payload = AnalysisPayload::from_json(json)?;
        Ok(Self::from_payload(payload.as_ref()))
    }

    /// Prefer the external analysis; fall back to the session's own log and
    /// score when the payload is missing or carries no analysis.
    pub fn compile_with_fallback<S: NotificationSink>(
        payload: Option<&AnalysisPayload>,
        session: &ProctorSession<S>,
    ) -> CompiledReport {
        match payload {
            Some(p) if p.integrity_analysis.is_some() => {
                let mut compiled = Self::from_payload(Some(p));
                if let CompiledReport::Available(report) = &mut compiled {
                    report.session = Some(session.summary());
                }
                compiled
            }
            _ => {
                debug!("No external analysis, compiling from session log");
                let mut compiled = Self::from_session(session);
                if let CompiledReport::Available(report) = &mut compiled {
                    report.video_info = payload.and_then(|p| p.video_info.clone());
                    report.analysis_summary = payload.and_then(|p| p.summary);
                }
                compiled
            }
        }
    }

    /// Like [`compile_with_fallback`](Self::compile_with_fallback), for a payload
    /// document that may be damaged.
    ///
    /// A document that fails to parse is treated as absent: the report is
    /// compiled from the session and carries the parse failure in
    /// `payload_error`.
    pub fn compile_with_fallback_json<S: NotificationSink>(
        payload_json: Option<&str>,
        session: &ProctorSession<S>,
    ) -> CompiledReport {
        let parsed = payload_json.map(AnalysisPayload::from_json).transpose();
        match parsed {
            Ok(payload) => Self::compile_with_fallback(payload.flatten().as_ref(), session),
            Err(e) => Self::fallback_after_payload_error(&e.to_string(), session),
        }
    }

    /// Compile from the session after a payload could not be read or parsed
    pub fn fallback_after_payload_error<S: NotificationSink>(
        error: &str,
        session: &ProctorSession<S>,
    ) -> CompiledReport {
        warn!(error, "Analysis payload unusable, compiling from session log");
        let mut compiled = Self::from_session(session);
        if let CompiledReport::Available(report) = &mut compiled {
            report.payload_error = Some(error.to_string());
        }
        compiled
    }

    fn no_analysis(video_info: Option<VideoInfo>) -> CompiledReport {
        CompiledReport::Unavailable(NoAnalysis {
            message: NO_ANALYSIS_MESSAGE.to_string(),
            video_info,
            analysis_summary: None,
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::types::{DetectedObject, DetectionFrame};
    use pretty_assertions::assert_eq;

    fn monitored_session() -> ProctorSession {
        let mut session = ProctorSession::new("Ada", SessionConfig::default());
        session.start(0).unwrap();
        session.ingest(
            100,
            &DetectionFrame::faces(2).with_object(DetectedObject::new("Cell Phone", 0.8)),
        );
        session.ingest(200, &DetectionFrame::faces(1));
        session.ingest(300, &DetectionFrame::faces(1).with_object(DetectedObject::new("book", 0.5)));
        session.ingest(400, &DetectionFrame::faces(1).with_object(DetectedObject::new("phone", 0.1)));
        session.stop(1000).unwrap();
        session
    }

    #[test]
    fn test_empty_session_report() {
        let mut session = ProctorSession::new("Ada", SessionConfig::default());
        session.start(0).unwrap();

        let compiled = ReportCompiler::from_session(&session);
        let report = compiled.report().unwrap();

        assert_eq!(report.source, ReportSource::Session);
        assert_eq!(report.final_integrity_score, 100);
        assert_eq!(report.assessment, Assessment::Excellent);
        assert_eq!(report.summary_details, SummaryDetails::default());
        assert!(report.deductions_breakdown.is_empty());
        assert_eq!(report.event_counts.total(), 0);
        assert_eq!(report.session.as_ref().unwrap().candidate_name, "Ada");
    }

    #[test]
    fn test_session_report_counts() {
        let session = monitored_session();
        let report = ReportCompiler::from_session(&session).report().cloned().unwrap();

        let mut objects = BTreeMap::new();
        objects.insert("book".to_string(), 1);
        objects.insert("cell phone".to_string(), 1);

        assert_eq!(
            report.summary_details,
            SummaryDetails {
                focus_lost_events: 0,
                face_absent_events: 0,
                multiple_faces_events: 1,
                prohibited_objects: objects,
            }
        );
        assert_eq!(report.final_integrity_score, 70);
        assert_eq!(
            report.deductions_breakdown,
            vec![
                "multiple-faces (critical): -10 points, score 90".to_string(),
                "phone-detected (critical): -10 points, score 80".to_string(),
                "notes-detected (critical): -10 points, score 70".to_string(),
            ]
        );
        assert_eq!(report.event_counts.critical, 3);
        assert_eq!(report.timeline[0].at_seconds, Some(0.1));
        assert_eq!(report.timeline[2].kind, "notes-detected");
    }

    #[test]
    fn test_absent_payload_is_no_analysis() {
        let compiled = ReportCompiler::from_payload(None);
        match compiled {
            CompiledReport::Unavailable(na) => assert_eq!(na.message, NO_ANALYSIS_MESSAGE),
            other => panic!("expected no analysis, got {other:?}"),
        }

        assert!(!ReportCompiler::from_payload_json("null").unwrap().is_available());
        assert!(!ReportCompiler::from_payload_json("  ").unwrap().is_available());
    }

    #[test]
    fn test_null_integrity_analysis_keeps_video_info() {
        let json = r#"{
            "integrity_analysis": null,
            "events": [],
            "video_info": {"path": "rec.webm", "duration_seconds": 61.5, "codec": "vp9"}
        }"#;

        let compiled = ReportCompiler::from_payload_json(json).unwrap();
        let CompiledReport::Unavailable(na) = compiled else {
            panic!("expected no analysis");
        };
        let info = na.video_info.unwrap();
        assert_eq!(info.path.as_deref(), Some("rec.webm"));
        assert_eq!(info.duration_seconds, Some(61.5));
        assert_eq!(info.extra.get("codec"), Some(&Value::from("vp9")));
    }

    #[test]
    fn test_partial_payload_defaults() {
        let json = r#"{"integrity_analysis": {"final_integrity_score": 72.6,
                       "summary_details": {"focus_lost_events": 2}}}"#;

        let report = ReportCompiler::from_payload_json(json)
            .unwrap()
            .report()
            .cloned()
            .unwrap();

        assert_eq!(report.source, ReportSource::External);
        assert_eq!(report.final_integrity_score, 73);
        assert_eq!(report.assessment, Assessment::Good);
        assert_eq!(
            report.summary_details,
            SummaryDetails {
                focus_lost_events: 2,
                ..SummaryDetails::default()
            }
        );
        assert!(report.deductions_breakdown.is_empty());
        assert!(report.timeline.is_empty());
        assert!(report.video_info.is_none());
    }

    #[test]
    fn test_mistyped_fields_default() {
        let json = r#"{
            "integrity_analysis": {
                "final_integrity_score": "high",
                "summary_details": {"focus_lost_events": "x", "prohibited_objects": {"cell phone": 3}},
                "deductions_breakdown": "none"
            },
            "events": [1, {"type": "phone_detected", "severity": "CRITICAL", "timestamp": 12.5},
                       {"type": "focus_lost", "severity": "warning"}, {}]
        }"#;

        let report = ReportCompiler::from_payload_json(json)
            .unwrap()
            .report()
            .cloned()
            .unwrap();

        assert_eq!(report.final_integrity_score, 0);
        assert_eq!(report.summary_details.focus_lost_events, 0);
        assert_eq!(report.summary_details.prohibited_objects.get("cell phone"), Some(&3));
        assert!(report.deductions_breakdown.is_empty());
        assert_eq!(
            report.event_counts,
            SeverityCounts {
                critical: 1,
                warning: 1,
                info: 1,
            }
        );
        assert_eq!(report.timeline[0].kind, "phone-detected");
        assert_eq!(report.timeline[0].at_seconds, Some(12.5));
        assert_eq!(report.timeline[2].message, "No message");
    }

    #[test]
    fn test_external_score_is_clamped() {
        let high = ReportCompiler::from_payload_json(
            r#"{"integrity_analysis": {"final_integrity_score": 150}}"#,
        )
        .unwrap();
        let low = ReportCompiler::from_payload_json(
            r#"{"integrity_analysis": {"final_integrity_score": -20}}"#,
        )
        .unwrap();

        assert_eq!(high.final_score(), Some(100));
        assert_eq!(low.final_score(), Some(0));
    }

    #[test]
    fn test_invalid_payload_is_parse_error() {
        assert!(matches!(
            ReportCompiler::from_payload_json("{not json"),
            Err(ProctorError::ParseError(_))
        ));
        assert!(matches!(
            ReportCompiler::from_payload_json("[1, 2]"),
            Err(ProctorError::ParseError(_))
        ));
    }

    #[test]
    fn test_fallback_uses_session_without_analysis() {
        let session = monitored_session();
        let payload = AnalysisPayload::from_json(r#"{"video_info": {"fps": 5.0}}"#)
            .unwrap()
            .unwrap();

        let report = ReportCompiler::compile_with_fallback(Some(&payload), &session)
            .report()
            .cloned()
            .unwrap();

        assert_eq!(report.source, ReportSource::Session);
        assert_eq!(report.final_integrity_score, 70);
        assert_eq!(report.video_info.unwrap().fps, Some(5.0));
    }

    #[test]
    fn test_fallback_prefers_external_analysis() {
        let session = monitored_session();
        let payload = AnalysisPayload::from_json(
            r#"{"integrity_analysis": {"final_integrity_score": 88}}"#,
        )
        .unwrap()
        .unwrap();

        let report = ReportCompiler::compile_with_fallback(Some(&payload), &session)
            .report()
            .cloned()
            .unwrap();

        assert_eq!(report.source, ReportSource::External);
        assert_eq!(report.final_integrity_score, 88);
        assert_eq!(report.session.unwrap().candidate_name, "Ada");
    }

    #[test]
    fn test_backend_summary_block_is_carried() {
        let json = r#"{
            "integrity_analysis": {"final_integrity_score": 65},
            "video_info": {
                "path": "uploads/session.webm",
                "duration_seconds": 42.0,
                "total_frames": 210,
                "fps": 5.0,
                "processed_at": "2024-01-15T14:05:00"
            },
            "events": [
                {"type": "face_absent", "timestamp": 3.2, "severity": "critical",
                 "message": "No face detected for over 10.0 seconds"}
            ],
            "summary": {
                "total_events": 7,
                "critical_events": 3,
                "warning_events": 2,
                "object_detections": 2,
                "face_events": 3,
                "focus_events": 2
            }
        }"#;

        let report = ReportCompiler::from_payload_json(json)
            .unwrap()
            .report()
            .cloned()
            .unwrap();

        assert_eq!(
            report.analysis_summary,
            Some(AnalysisSummary {
                total_events: 7,
                critical_events: 3,
                warning_events: 2,
                object_detections: 2,
                face_events: 3,
                focus_events: 2,
            })
        );
        // Counts come from the summary, not from the single listed event
        assert_eq!(
            report.event_counts,
            SeverityCounts {
                critical: 3,
                warning: 2,
                info: 2,
            }
        );
        assert_eq!(report.timeline.len(), 1);
        assert_eq!(report.video_info.unwrap().total_frames, Some(210));
    }

    #[test]
    fn test_summary_without_analysis_is_kept() {
        let json = r#"{"summary": {"total_events": 4, "critical_events": "many"}}"#;

        let CompiledReport::Unavailable(na) = ReportCompiler::from_payload_json(json).unwrap()
        else {
            panic!("expected no analysis");
        };
        let summary = na.analysis_summary.unwrap();
        assert_eq!(summary.total_events, 4);
        assert_eq!(summary.critical_events, 0);
    }

    #[test]
    fn test_damaged_payload_falls_back_to_session() {
        let session = monitored_session();

        let compiled = ReportCompiler::compile_with_fallback_json(
            Some(r#"{"integrity_analysis": {"final_"#),
            &session,
        );
        let report = compiled.report().cloned().unwrap();

        assert_eq!(report.source, ReportSource::Session);
        assert_eq!(report.final_integrity_score, 70);
        assert!(report.payload_error.unwrap().contains("EOF"));

        let clean = ReportCompiler::compile_with_fallback_json(None, &session);
        assert!(clean.report().unwrap().payload_error.is_none());
    }

    #[test]
    fn test_report_json_contract() {
        let session = monitored_session();
        let json = ReportCompiler::from_session(&session).to_json(false).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["analysis"], "available");
        assert_eq!(value["final_integrity_score"], 70);
        assert_eq!(value["summary_details"]["multiple_faces_events"], 1);
        assert_eq!(value["summary_details"]["prohibited_objects"]["book"], 1);
        assert_eq!(value["assessment"], "good");

        let none = ReportCompiler::from_payload(None).to_json(false).unwrap();
        let value: Value = serde_json::from_str(&none).unwrap();
        assert_eq!(value["analysis"], "unavailable");
        assert_eq!(value["message"], NO_ANALYSIS_MESSAGE);
    }
}
