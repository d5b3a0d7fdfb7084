//! Synchronous sampling loop
//!
//! Drives a [`FrameSource`] through a [`ProctorSession`]. Each source frame is
//! one sampling tick; the session's gate decides whether it is processed.
//! Frames carry detector output that is already complete, so every permit is
//! completed immediately and the in-flight guard never trips here.

use crate::error::ProctorError;
use crate::session::ProctorSession;
use crate::sink::{NotificationSink, NullSink};
use crate::types::{Event, TimedFrame};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use tracing::{debug, info};

/// A stream of timestamped detection frames
pub trait FrameSource {
    /// Acquire the underlying input. A failure here means no session starts.
    fn open(&mut self) -> Result<(), ProctorError> {
        Ok(())
    }

    /// Next frame, `None` at end of stream
    fn next_frame(&mut self) -> Option<Result<TimedFrame, ProctorError>>;
}

/// In-memory frames, replayed in order
#[derive(Debug, Clone)]
pub struct ReplaySource {
    frames: std::vec::IntoIter<TimedFrame>,
}

impl ReplaySource {
    pub fn new(frames: Vec<TimedFrame>) -> Self {
        Self {
            frames: frames.into_iter(),
        }
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Option<Result<TimedFrame, ProctorError>> {
        self.frames.next().map(Ok)
    }
}

enum NdjsonInput {
    Path(PathBuf),
    Stdin,
    Reader(Option<Box<dyn BufRead>>),
}

/// Newline-delimited JSON frames from a file, stdin or any reader.
///
/// Blank lines are skipped. Each other line must be a [`TimedFrame`].
pub struct NdjsonSource {
    input: NdjsonInput,
    reader: Option<Box<dyn BufRead>>,
    line_no: usize,
}

impl NdjsonSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::with_input(NdjsonInput::Path(path.into()))
    }

    pub fn stdin() -> Self {
        Self::with_input(NdjsonInput::Stdin)
    }

    pub fn from_reader(reader: impl BufRead + 'static) -> Self {
        Self::with_input(NdjsonInput::Reader(Some(Box::new(reader))))
    }

    fn with_input(input: NdjsonInput) -> Self {
        Self {
            input,
            reader: None,
            line_no: 0,
        }
    }
}

impl FrameSource for NdjsonSource {
    fn open(&mut self) -> Result<(), ProctorError> {
        if self.reader.is_some() {
            return Ok(());
        }

        let reader: Box<dyn BufRead> = match &mut self.input {
            NdjsonInput::Path(path) => {
                let file = File::open(&*path).map_err(|e| {
                    ProctorError::InputUnavailable(format!("{}: {}", path.display(), e))
                })?;
                Box::new(BufReader::new(file))
            }
            NdjsonInput::Stdin => Box::new(BufReader::new(io::stdin())),
            NdjsonInput::Reader(reader) => reader.take().ok_or_else(|| {
                ProctorError::InputUnavailable("reader already consumed".to_string())
            })?,
        };

        self.reader = Some(reader);
        Ok(())
    }

    fn next_frame(&mut self) -> Option<Result<TimedFrame, ProctorError>> {
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => {
                return Some(Err(ProctorError::InputUnavailable(
                    "frame source was not opened".to_string(),
                )))
            }
        };

        let mut line = String::new();
        loop {
            line.clear();
            self.line_no += 1;
            match reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) if line.trim().is_empty() => continue,
                Ok(_) => break,
                Err(e) => {
                    return Some(Err(ProctorError::InputUnavailable(format!(
                        "read failed at line {}: {}",
                        self.line_no, e
                    ))))
                }
            }
        }

        let parsed = serde_json::from_str::<TimedFrame>(line.trim())
            .map_err(|e| ProctorError::ParseError(format!("line {}: {}", self.line_no, e)))
            .and_then(|timed| {
                timed.frame.validate().map_err(|e| match e {
                    ProctorError::InvalidFrame(msg) => {
                        ProctorError::InvalidFrame(format!("line {}: {}", self.line_no, msg))
                    }
                    other => other,
                })?;
                Ok(timed)
            });

        Some(parsed)
    }
}

/// Counters for one sampling run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub frames_read: u64,
    pub frames_processed: u64,
    pub frames_throttled: u64,
    pub events_emitted: u64,
    pub first_ms: Option<u64>,
    pub last_ms: Option<u64>,
}

/// Feeds frames into a session, starting it on the first frame
pub struct Sampler<S: NotificationSink = NullSink> {
    session: ProctorSession<S>,
    summary: RunSummary,
}

impl<S: NotificationSink> Sampler<S> {
    pub fn new(session: ProctorSession<S>) -> Self {
        Self {
            session,
            summary: RunSummary::default(),
        }
    }

    /// Offer one frame to the session.
    ///
    /// The session is started at the first frame's timestamp. Timestamps must
    /// not go backwards or stray outside the session's representable span.
    pub fn tick(&mut self, timed: TimedFrame) -> Result<Vec<Event>, ProctorError> {
        if let Some(last) = self.summary.last_ms {
            if timed.t_ms < last {
                return Err(ProctorError::InvalidFrame(format!(
                    "timestamp {} precedes previous frame at {}",
                    timed.t_ms, last
                )));
            }
        }

        self.session.check_timestamp(timed.t_ms)?;

        if self.summary.first_ms.is_none() {
            self.session.start(timed.t_ms)?;
            self.summary.first_ms = Some(timed.t_ms);
        }
        self.summary.last_ms = Some(timed.t_ms);
        self.summary.frames_read += 1;

        let Some(permit) = self.session.begin_tick(timed.t_ms) else {
            self.summary.frames_throttled += 1;
            return Ok(Vec::new());
        };

        let events = self.session.complete_tick(permit, Some(&timed.frame));
        self.summary.frames_processed += 1;
        self.summary.events_emitted += events.len() as u64;
        Ok(events)
    }

    /// Drain `source` into the session and stop it at the last frame's time.
    ///
    /// `on_event` sees every emitted event in order; an error from it aborts the
    /// run. The session is stopped whether or not the run succeeds.
    pub fn run<F, E>(&mut self, source: &mut F, mut on_event: E) -> Result<RunSummary, ProctorError>
    where
        F: FrameSource + ?Sized,
        E: FnMut(&Event) -> Result<(), ProctorError>,
    {
        source.open()?;

        let result = self.drain(source, &mut on_event);

        if self.session.is_monitoring() {
            self.session.stop(self.summary.last_ms.unwrap_or(0))?;
        }

        match &result {
            Ok(()) => info!(
                frames = self.summary.frames_read,
                processed = self.summary.frames_processed,
                events = self.summary.events_emitted,
                "Sampling run complete"
            ),
            Err(e) => debug!(error = %e, "Sampling run aborted"),
        }

        result.map(|_| self.summary)
    }

    fn drain<F, E>(&mut self, source: &mut F, on_event: &mut E) -> Result<(), ProctorError>
    where
        F: FrameSource + ?Sized,
        E: FnMut(&Event) -> Result<(), ProctorError>,
    {
        while let Some(frame) = source.next_frame() {
            for event in self.tick(frame?)? {
                on_event(&event)?;
            }
        }
        Ok(())
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    pub fn session(&self) -> &ProctorSession<S> {
        &self.session
    }

    pub fn into_session(self) -> ProctorSession<S> {
        self.session
    }
}
