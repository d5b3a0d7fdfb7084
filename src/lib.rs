//! Proctor Flux - Integrity engine for remote proctoring sessions
//!
//! Proctor Flux turns per-frame face and object detections into a debounced
//! stream of integrity events, a running integrity score and an exportable
//! report: detection frame → signal tracker → score accumulator + event log →
//! report compiler.
//!
//! ## Modules
//!
//! - **Session**: Lifecycle, throttled sampling gate and event fan-out
//! - **Tracker**: Hysteresis over presence, multiplicity, focus and objects
//! - **Report**: Summaries from a session or an out-of-process analysis payload

pub mod config;
pub mod error;
pub mod event_log;
pub mod report;
pub mod sampler;
pub mod score;
pub mod session;
pub mod sink;
pub mod tracker;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::{SessionConfig, TrackerConfig};
pub use error::ProctorError;
pub use event_log::{EventLog, SeverityCounts};
pub use report::{AnalysisPayload, CompiledReport, IntegrityReport, ReportCompiler};
pub use sampler::{FrameSource, NdjsonSource, ReplaySource, Sampler};
pub use score::{Assessment, ScoreAccumulator};
pub use session::{ProctorSession, SessionPhase, SessionSummary, TickPermit};
pub use sink::{FnSink, NotificationSink, NullSink, TracingSink};
pub use tracker::{transition, SignalState, SignalTracker};
pub use types::{DetectionFrame, Event, EventKind, SessionStatus, Severity, TimedFrame};

/// Library version, reported by the CLI and FFI
pub const PROCTOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name stamped on exported reports
pub const PRODUCER_NAME: &str = "proctor-flux";
