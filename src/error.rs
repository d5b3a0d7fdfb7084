//! Error types for Proctor Flux
//!
//! Only the acquisition and export boundaries are fallible. Signal tracking, score
//! accumulation and the event log never return errors for a well-formed frame.

use thiserror::Error;

/// Errors that can occur at the session, parsing and export boundaries
#[derive(Debug, Error)]
pub enum ProctorError {
    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Detection input unavailable: {0}")]
    InputUnavailable(String),

    #[error("Export failed: {0}")]
    ExportError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid detection frame: {0}")]
    InvalidFrame(String),

    #[error("Session has not been started")]
    SessionNotStarted,

    #[error("Session is already monitoring")]
    SessionAlreadyStarted,

    #[error("Session has been stopped and cannot be reused")]
    SessionClosed,
}
