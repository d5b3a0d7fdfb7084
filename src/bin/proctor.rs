//! Proctor CLI - Command-line interface for Proctor Flux
//!
//! Commands:
//! - monitor: Replay detection frames through a session, emitting events and a report
//! - report: Compile a report from an external analysis payload
//! - validate: Validate a detection frame stream
//! - doctor: Diagnose configuration and environment

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use proctor_flux::report::{AnalysisPayload, CompiledReport, ReportCompiler};
use proctor_flux::sampler::{FrameSource, NdjsonSource, RunSummary, Sampler};
use proctor_flux::session::ProctorSession;
use proctor_flux::sink::{NotificationSink, NullSink, TracingSink};
use proctor_flux::types::Event;
use proctor_flux::{ProctorError, SessionConfig, PROCTOR_VERSION, PRODUCER_NAME};

/// Proctor - Integrity monitoring for remote proctoring sessions
#[derive(Parser)]
#[command(name = "proctor")]
#[command(author = "Synheart AI Inc")]
#[command(version = PROCTOR_VERSION)]
#[command(about = "Turn face and object detections into integrity events and reports", long_about = None)]
struct Cli {
    /// Enable debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay NDJSON detection frames through a proctoring session
    Monitor {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Candidate name recorded in the session metadata
        #[arg(long, default_value = "Candidate")]
        candidate: String,

        /// Session configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the minimum interval between processed frames
        #[arg(long)]
        min_frame_interval_ms: Option<u64>,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Also write the final report to this file
        #[arg(long)]
        report: Option<PathBuf>,

        /// Flush output after each event (--flush false to buffer)
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        flush: bool,
    },

    /// Compile an integrity report from an external analysis payload
    Report {
        /// Analysis payload file (use - for stdin); omit for no payload
        #[arg(short, long)]
        payload: Option<PathBuf>,

        /// Detection frames to compile a local report from when the payload
        /// carries no analysis
        #[arg(long)]
        frames: Option<PathBuf>,

        /// Candidate name for the local fallback session
        #[arg(long, default_value = "Candidate")]
        candidate: String,

        /// Session configuration file (JSON) for the local fallback
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a detection frame stream
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Check a session configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one event per line, then the report)
    Ndjson,
    /// Single JSON document with events, run counters and report
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn run(cli: Cli) -> Result<(), ProctorCliError> {
    match cli.command {
        Commands::Monitor {
            input,
            candidate,
            config,
            min_frame_interval_ms,
            output_format,
            report,
            flush,
        } => {
            let config = load_config(config.as_deref(), min_frame_interval_ms)?;
            cmd_monitor(&input, candidate, config, output_format, report.as_deref(), flush)
        }

        Commands::Report {
            payload,
            frames,
            candidate,
            config,
            output,
            pretty,
        } => {
            let config = load_config(config.as_deref(), None)?;
            cmd_report(payload.as_deref(), frames.as_deref(), candidate, config, &output, pretty)
        }

        Commands::Validate { input, json } => cmd_validate(&input, json),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

fn cmd_monitor(
    input: &Path,
    candidate: String,
    config: SessionConfig,
    output_format: OutputFormat,
    report_path: Option<&Path>,
    flush: bool,
) -> Result<(), ProctorCliError> {
    let mut sampler = Sampler::new(ProctorSession::with_sink(candidate, config, TracingSink));
    let mut source = frame_source(input);

    let streaming = matches!(output_format, OutputFormat::Ndjson);
    let mut stdout = io::stdout();
    let mut events: Vec<Event> = Vec::new();

    let summary = sampler.run(&mut source, |event| {
        if streaming {
            let line = serde_json::to_string(event)?;
            writeln!(stdout, "{}", line).map_err(export_error)?;
            if flush {
                stdout.flush().map_err(export_error)?;
            }
        } else {
            events.push(event.clone());
        }
        Ok(())
    })?;

    let report = ReportCompiler::from_session(sampler.session());

    match output_format {
        OutputFormat::Ndjson => {
            writeln!(stdout, "{}", report.to_json(false)?)?;
        }
        OutputFormat::Json | OutputFormat::JsonPretty => {
            let document = MonitorOutput {
                run: summary,
                events,
                report: &report,
            };
            let json = if matches!(output_format, OutputFormat::JsonPretty) {
                serde_json::to_string_pretty(&document)?
            } else {
                serde_json::to_string(&document)?
            };
            writeln!(stdout, "{}", json)?;
        }
    }
    stdout.flush()?;

    if let Some(path) = report_path {
        fs::write(path, report.to_json(true)?)?;
        info!(path = %path.display(), "Report written");
    }

    Ok(())
}

fn cmd_report(
    payload_path: Option<&Path>,
    frames: Option<&Path>,
    candidate: String,
    config: SessionConfig,
    output: &Path,
    pretty: bool,
) -> Result<(), ProctorCliError> {
    let session = match frames {
        Some(frames) => Some(replay(frames, candidate, config)?),
        None => None,
    };
    let payload = payload_path.map(load_payload).transpose().map(Option::flatten);
    let compiled = compile_report(payload, session.as_ref())?;

    if let CompiledReport::Unavailable(na) = &compiled {
        warn!("{}", na.message);
    }

    write_output(output, &compiled.to_json(pretty)?)
}

fn load_payload(path: &Path) -> Result<Option<AnalysisPayload>, ProctorCliError> {
    Ok(AnalysisPayload::from_json(&read_input(path)?)?)
}

/// With a local session, an unreadable payload falls back to the session.
/// Without one, the payload error is the command's error.
fn compile_report(
    payload: Result<Option<AnalysisPayload>, ProctorCliError>,
    session: Option<&ProctorSession<NullSink>>,
) -> Result<CompiledReport, ProctorCliError> {
    match (payload, session) {
        (Ok(payload), Some(session)) => {
            Ok(ReportCompiler::compile_with_fallback(payload.as_ref(), session))
        }
        (Ok(payload), None) => Ok(ReportCompiler::from_payload(payload.as_ref())),
        (Err(e), Some(session)) => Ok(ReportCompiler::fallback_after_payload_error(
            &CliError::from(e).message,
            session,
        )),
        (Err(e), None) => Err(e),
    }
}

fn cmd_validate(input: &Path, json: bool) -> Result<(), ProctorCliError> {
    let mut source = frame_source(input);
    source.open()?;

    let mut total_frames = 0usize;
    let mut errors: Vec<ValidationErrorDetail> = Vec::new();
    let mut last_ms: Option<u64> = None;

    while let Some(item) = source.next_frame() {
        let index = total_frames;
        total_frames += 1;

        match item {
            Ok(timed) => {
                if let Some(last) = last_ms {
                    if timed.t_ms < last {
                        errors.push(ValidationErrorDetail {
                            index,
                            t_ms: Some(timed.t_ms),
                            error: format!(
                                "timestamp {} precedes previous frame at {}",
                                timed.t_ms, last
                            ),
                        });
                        continue;
                    }
                }
                last_ms = Some(timed.t_ms);
            }
            Err(e @ ProctorError::InputUnavailable(_)) => return Err(e.into()),
            Err(e) => errors.push(ValidationErrorDetail {
                index,
                t_ms: None,
                error: e.to_string(),
            }),
        }
    }

    let report = ValidationReport {
        total_frames,
        valid_frames: total_frames - errors.len(),
        invalid_frames: errors.len(),
        errors,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total frames:   {}", report.total_frames);
        println!("Valid frames:   {}", report.valid_frames);
        println!("Invalid frames: {}", report.invalid_frames);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Frame {}: {}", err.index, err.error);
            }
        }
    }

    if report.invalid_frames > 0 {
        Err(ProctorCliError::ValidationFailed(report.invalid_frames))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config_path: Option<&Path>, json: bool) -> Result<(), ProctorCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "proctor_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Proctor Flux version {}", PROCTOR_VERSION),
    });

    let config = match config_path {
        None => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: "Using built-in defaults".to_string(),
            });
            Some(SessionConfig::default())
        }
        Some(path) if !path.exists() => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Config file does not exist".to_string(),
            });
            None
        }
        Some(path) => match fs::read_to_string(path)
            .map_err(|e| format!("Cannot read config file: {}", e))
            .and_then(|content| SessionConfig::from_json(&content).map_err(|e| e.to_string()))
        {
            Ok(config) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("Config file valid ({})", path.display()),
                });
                Some(config)
            }
            Err(message) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message,
                });
                None
            }
        },
    };

    if let Some(config) = &config {
        let tracker = &config.tracker;
        checks.push(DoctorCheck {
            name: "thresholds".to_string(),
            status: CheckStatus::Ok,
            message: format!(
                "absence {} ms, focus lost {} ms, nose offset {}, object confidence > {}",
                tracker.face_absent_threshold_ms,
                tracker.focus_lost_threshold_ms,
                tracker.focus_offset_threshold,
                tracker.object_confidence_threshold
            ),
        });
        checks.push(DoctorCheck {
            name: "sampling".to_string(),
            status: if config.min_frame_interval_ms == 0 {
                CheckStatus::Warning
            } else {
                CheckStatus::Ok
            },
            message: format!(
                "minimum frame interval {} ms, penalties critical {} / warning {}",
                config.min_frame_interval_ms, config.critical_penalty, config.warning_penalty
            ),
        });
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (frame streaming ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: PROCTOR_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Proctor Doctor Report");
        println!("=====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(ProctorCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn load_config(
    path: Option<&Path>,
    min_frame_interval_ms: Option<u64>,
) -> Result<SessionConfig, ProctorCliError> {
    let mut config = match path {
        Some(path) => SessionConfig::from_json(&fs::read_to_string(path)?)?,
        None => SessionConfig::default(),
    };

    if let Some(interval) = min_frame_interval_ms {
        config = config.with_min_frame_interval(interval);
    }
    config.validate()?;
    Ok(config)
}

fn frame_source(input: &Path) -> NdjsonSource {
    if input.to_string_lossy() == "-" {
        NdjsonSource::stdin()
    } else {
        NdjsonSource::from_path(input)
    }
}

/// Replay a frame file through a silent session and return it stopped
fn replay(
    frames: &Path,
    candidate: String,
    config: SessionConfig,
) -> Result<ProctorSession<NullSink>, ProctorCliError> {
    let mut sampler = Sampler::new(ProctorSession::new(candidate, config));
    let summary = sampler.run(&mut frame_source(frames), |_| Ok(()))?;
    log_run(&summary, sampler.session());
    Ok(sampler.into_session())
}

fn log_run<S: NotificationSink>(summary: &RunSummary, session: &ProctorSession<S>) {
    info!(
        frames = summary.frames_read,
        processed = summary.frames_processed,
        score = session.current_score(),
        "Local session replayed"
    );
}

fn read_input(path: &Path) -> Result<String, ProctorCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn write_output(path: &Path, data: &str) -> Result<(), ProctorCliError> {
    if path.to_string_lossy() == "-" {
        println!("{}", data);
    } else {
        fs::write(path, data)?;
    }
    Ok(())
}

fn export_error(e: io::Error) -> ProctorError {
    ProctorError::ExportError(e.to_string())
}

// Error types

#[derive(Debug)]
enum ProctorCliError {
    Io(io::Error),
    Proctor(ProctorError),
    Json(serde_json::Error),
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for ProctorCliError {
    fn from(e: io::Error) -> Self {
        ProctorCliError::Io(e)
    }
}

impl From<ProctorError> for ProctorCliError {
    fn from(e: ProctorError) -> Self {
        ProctorCliError::Proctor(e)
    }
}

impl From<serde_json::Error> for ProctorCliError {
    fn from(e: serde_json::Error) -> Self {
        ProctorCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(code: &str, message: String, hint: &str) -> Self {
        CliError {
            code: code.to_string(),
            message,
            hint: Some(hint.to_string()),
        }
    }
}

impl From<ProctorCliError> for CliError {
    fn from(e: ProctorCliError) -> Self {
        match e {
            ProctorCliError::Io(e) => {
                CliError::new("IO_ERROR", e.to_string(), "Check file paths and permissions")
            }
            ProctorCliError::Json(e) => CliError::new("JSON_ERROR", e.to_string(), "Check JSON syntax"),
            ProctorCliError::ValidationFailed(count) => CliError::new(
                "VALIDATION_FAILED",
                format!("{} frames failed validation", count),
                "Fix validation errors and retry",
            ),
            ProctorCliError::DoctorFailed => CliError::new(
                "DOCTOR_FAILED",
                "One or more health checks failed".to_string(),
                "Review the doctor report for details",
            ),
            ProctorCliError::Proctor(e) => {
                let message = e.to_string();
                match e {
                    ProctorError::InputUnavailable(_) => CliError::new(
                        "INPUT_UNAVAILABLE",
                        message,
                        "Check that the frame source exists and is readable",
                    ),
                    ProctorError::ParseError(_) | ProctorError::JsonError(_) => CliError::new(
                        "PARSE_ERROR",
                        message,
                        "Ensure each line is a JSON detection frame with t_ms and face_count",
                    ),
                    ProctorError::InvalidFrame(_) => CliError::new(
                        "INVALID_FRAME",
                        message,
                        "Run 'proctor validate' for details",
                    ),
                    ProctorError::InvalidConfig(_) => CliError::new(
                        "INVALID_CONFIG",
                        message,
                        "Run 'proctor doctor --config <file>' to check the configuration",
                    ),
                    ProctorError::ExportError(_) => {
                        CliError::new("EXPORT_ERROR", message, "Check the output destination")
                    }
                    ProctorError::SessionNotStarted
                    | ProctorError::SessionAlreadyStarted
                    | ProctorError::SessionClosed => {
                        CliError::new("SESSION_ERROR", message, "Start a fresh session")
                    }
                }
            }
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct MonitorOutput<'a> {
    run: RunSummary,
    events: Vec<Event>,
    report: &'a CompiledReport,
}

#[derive(serde::Serialize)]
struct ValidationReport {
    total_frames: usize,
    valid_frames: usize,
    invalid_frames: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    t_ms: Option<u64>,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
