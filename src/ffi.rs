//! FFI bindings for Proctor Flux
//!
//! This module provides C-compatible functions for driving a proctoring session
//! from other languages. All functions use C strings (null-terminated) and return
//! allocated memory that must be freed by the caller using `proctor_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::SessionConfig;
use crate::error::ProctorError;
use crate::report::ReportCompiler;
use crate::session::{ProctorSession, SessionPhase};
use crate::types::{DetectionFrame, SessionStatus};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Return the JSON on success, or record the error and return NULL
fn json_result(result: Result<String, ProctorError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Return 0 on success, or record the error and return -1
fn status_result(result: Result<(), ProctorError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

fn parse_frame(json: &str) -> Result<DetectionFrame, ProctorError> {
    let frame: DetectionFrame =
        serde_json::from_str(json).map_err(|e| ProctorError::ParseError(e.to_string()))?;
    frame.validate()?;
    Ok(frame)
}

// ============================================================================
// Session API
// ============================================================================

/// Opaque handle to a ProctorSession
pub struct ProctorSessionHandle {
    session: ProctorSession,
}

/// Create a new session for a candidate.
///
/// # Safety
/// - `candidate_name` must be a valid null-terminated C string.
/// - `config_json` may be NULL for the default configuration, otherwise a valid
///   null-terminated C string holding a SessionConfig JSON document.
/// - Must be freed with `proctor_session_free`.
/// - Returns NULL on error; call `proctor_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_new(
    candidate_name: *const c_char,
    config_json: *const c_char,
) -> *mut ProctorSessionHandle {
    clear_last_error();

    let name = match cstr_to_string(candidate_name) {
        Some(s) => s,
        None => {
            set_last_error("Invalid candidate name string pointer");
            return ptr::null_mut();
        }
    };

    let config = if config_json.is_null() {
        SessionConfig::default()
    } else {
        let parsed = match cstr_to_string(config_json) {
            Some(json) => SessionConfig::from_json(&json),
            None => Err(ProctorError::InvalidConfig("config is not valid UTF-8".to_string())),
        };
        match parsed {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    let handle = Box::new(ProctorSessionHandle {
        session: ProctorSession::new(name, config),
    });
    Box::into_raw(handle)
}

/// Free a session.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_free(session: *mut ProctorSessionHandle) {
    if !session.is_null() {
        drop(Box::from_raw(session));
    }
}

/// Start monitoring at monotonic time `now_ms`.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_start(
    session: *mut ProctorSessionHandle,
    now_ms: u64,
) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }

    let handle = &mut *session;
    status_result(handle.session.start(now_ms))
}

/// Stop monitoring at monotonic time `now_ms`.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_stop(
    session: *mut ProctorSessionHandle,
    now_ms: u64,
) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }

    let handle = &mut *session;
    status_result(handle.session.stop(now_ms))
}

/// Offer a detection frame sampled at `now_ms`.
///
/// Returns a JSON array of the events the frame produced. The array is empty
/// when the frame was throttled or produced nothing.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
/// - `frame_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `proctor_free_string`.
/// - Returns NULL on error; call `proctor_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_ingest(
    session: *mut ProctorSessionHandle,
    now_ms: u64,
    frame_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let handle = &mut *session;

    let json_str = match cstr_to_string(frame_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid frame JSON string pointer");
            return ptr::null_mut();
        }
    };

    let result = match handle.session.phase() {
        SessionPhase::Idle => Err(ProctorError::SessionNotStarted),
        SessionPhase::Stopped => Err(ProctorError::SessionClosed),
        SessionPhase::Monitoring => handle
            .session
            .check_timestamp(now_ms)
            .and_then(|()| parse_frame(&json_str))
            .and_then(|frame| {
                let events = handle.session.ingest(now_ms, &frame);
                Ok(serde_json::to_string(&events)?)
            }),
    };

    json_result(result)
}

/// Current integrity score (0-100), or -1 for a NULL session.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`, or NULL.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_score(session: *const ProctorSessionHandle) -> i32 {
    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }
    (*session).session.current_score() as i32
}

/// Current status: "good", "warning" or "critical".
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
/// - Returns a pointer to a static string. Do NOT free.
/// - Returns NULL for a NULL session.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_status(
    session: *const ProctorSessionHandle,
) -> *const c_char {
    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null();
    }

    let status: &'static [u8] = match (*session).session.current_status() {
        SessionStatus::Good => b"good\0",
        SessionStatus::Warning => b"warning\0",
        SessionStatus::Critical => b"critical\0",
    };
    status.as_ptr() as *const c_char
}

/// All events so far as a JSON array, oldest first.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
/// - Returns a newly allocated string that must be freed with `proctor_free_string`.
/// - Returns NULL on error; call `proctor_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_events(
    session: *const ProctorSessionHandle,
) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let handle = &*session;
    json_result(serde_json::to_string(handle.session.all_events()).map_err(ProctorError::from))
}

/// Compile the session report.
///
/// When `payload_json` holds an external analysis, it is preferred; otherwise
/// the report is compiled from the session itself. A payload that cannot be
/// read or parsed is ignored and named in the report's `payload_error`.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
/// - `payload_json` may be NULL, otherwise a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `proctor_free_string`.
/// - Returns NULL on error; call `proctor_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_report(
    session: *const ProctorSessionHandle,
    payload_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let handle = &*session;

    let compiled = if payload_json.is_null() {
        ReportCompiler::compile_with_fallback_json(None, &handle.session)
    } else {
        match cstr_to_string(payload_json) {
            Some(json) => ReportCompiler::compile_with_fallback_json(Some(&json), &handle.session),
            None => ReportCompiler::fallback_after_payload_error(
                "payload is not valid UTF-8",
                &handle.session,
            ),
        }
    };

    json_result(compiled.to_json(false))
}

// ============================================================================
// Stateless API
// ============================================================================

/// Compile a report from an external analysis payload.
///
/// A NULL pointer or a `null` document yields the "no analysis available" report.
///
/// # Safety
/// - `payload_json` may be NULL, otherwise a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `proctor_free_string`.
/// - Returns NULL on error; call `proctor_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn proctor_compile_report(payload_json: *const c_char) -> *mut c_char {
    clear_last_error();

    if payload_json.is_null() {
        return json_result(ReportCompiler::from_payload(None).to_json(false));
    }

    let json_str = match cstr_to_string(payload_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid payload JSON string pointer");
            return ptr::null_mut();
        }
    };

    json_result(ReportCompiler::from_payload_json(&json_str).and_then(|r| r.to_json(false)))
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Proctor Flux functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Proctor Flux function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn proctor_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Proctor Flux call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn proctor_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn proctor_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
