//! FFI bindings for calmtrace
//!
//! C-compatible entry points for the host platform. Strings cross the
//! boundary as null-terminated UTF-8; every string returned by this module is
//! heap-allocated and must be released with `calm_free_string`.
//!
//! Sessions are opaque handles. Recording calls on a stopped session are
//! accepted and ignored.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::Path;
use std::ptr;

use chrono::{Local, TimeZone};

use crate::config::StressConfig;
use crate::history::HistoryRing;
use crate::scorer::{StressScorer, NEUTRAL_PROBABILITY};
use crate::session::MonitoringSession;
use crate::types::{Point, TouchPhase};

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

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn to_json_cstr<T: serde::Serialize>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Borrow the session behind a handle, recording an error for NULL
unsafe fn session_ref<'a>(handle: *const CalmSession) -> Option<&'a MonitoringSession> {
    if handle.is_null() {
        set_last_error("Null session pointer");
        return None;
    }
    Some(&(*handle).session)
}

/// Parse an optional config; NULL selects the defaults
unsafe fn config_from_ptr(config_json: *const c_char) -> Option<StressConfig> {
    if config_json.is_null() {
        return Some(StressConfig::default());
    }
    let Some(json) = cstr_to_string(config_json) else {
        set_last_error("Invalid config string pointer");
        return None;
    };
    match StressConfig::from_json(&json) {
        Ok(config) => Some(config),
        Err(e) => {
            set_last_error(&e.to_string());
            None
        }
    }
}

// ============================================================================
// Session lifecycle
// ============================================================================

/// Opaque handle to a monitoring session
pub struct CalmSession {
    session: MonitoringSession,
}

/// Create an active session scored by the heuristic.
///
/// # Safety
/// - `config_json` must be NULL (defaults) or a valid null-terminated C string.
/// - Returns a pointer that must be freed with `calm_session_free`.
/// - Returns NULL on an invalid config; call `calm_last_error` for details.
#[no_mangle]
pub unsafe extern "C" fn calm_session_new(config_json: *const c_char, now_ms: i64) -> *mut CalmSession {
    clear_last_error();

    let Some(config) = config_from_ptr(config_json) else {
        return ptr::null_mut();
    };
    let scorer = StressScorer::heuristic_only(&config);
    Box::into_raw(Box::new(CalmSession {
        session: MonitoringSession::new(config, scorer, now_ms),
    }))
}

/// Create a session backed by a model artifact.
///
/// A missing or unreadable model is not an error: the session falls back to
/// the heuristic.
///
/// # Safety
/// - `config_json` must be NULL or a valid null-terminated C string.
/// - `model_path` must be a valid null-terminated C string.
/// - Returns a pointer that must be freed with `calm_session_free`.
#[no_mangle]
pub unsafe extern "C" fn calm_session_new_with_model(
    config_json: *const c_char,
    model_path: *const c_char,
    now_ms: i64,
) -> *mut CalmSession {
    clear_last_error();

    let Some(config) = config_from_ptr(config_json) else {
        return ptr::null_mut();
    };
    let Some(path) = cstr_to_string(model_path) else {
        set_last_error("Invalid model path pointer");
        return ptr::null_mut();
    };
    let scorer = StressScorer::with_model_file(&config, Path::new(&path));
    Box::into_raw(Box::new(CalmSession {
        session: MonitoringSession::new(config, scorer, now_ms),
    }))
}

/// Free a session.
///
/// # Safety
/// - `session` must be a pointer returned by `calm_session_new*`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn calm_session_free(session: *mut CalmSession) {
    if !session.is_null() {
        drop(Box::from_raw(session));
    }
}

/// Resume recording.
///
/// # Safety
/// - `session` must be a valid session pointer.
#[no_mangle]
pub unsafe extern "C" fn calm_session_start(session: *const CalmSession) {
    clear_last_error();
    if let Some(session) = session_ref(session) {
        session.start();
    }
}

/// Stop recording; later analyses return NULL until restarted.
///
/// # Safety
/// - `session` must be a valid session pointer.
#[no_mangle]
pub unsafe extern "C" fn calm_session_stop(session: *const CalmSession) {
    clear_last_error();
    if let Some(session) = session_ref(session) {
        session.stop();
    }
}

/// Returns 1 if the session is recording, 0 if stopped, -1 on NULL.
///
/// # Safety
/// - `session` must be a valid session pointer.
#[no_mangle]
pub unsafe extern "C" fn calm_session_is_active(session: *const CalmSession) -> i32 {
    clear_last_error();
    match session_ref(session) {
        Some(session) => i32::from(session.is_active()),
        None => -1,
    }
}

/// Drop all aggregated samples and restart the session clock.
///
/// # Safety
/// - `session` must be a valid session pointer.
#[no_mangle]
pub unsafe extern "C" fn calm_session_clear(session: *const CalmSession, now_ms: i64) {
    clear_last_error();
    if let Some(session) = session_ref(session) {
        session.clear(now_ms);
    }
}

// ============================================================================
// Recording
// ============================================================================

/// # Safety
/// - `session` must be a valid session pointer.
#[no_mangle]
pub unsafe extern "C" fn calm_session_key_down(session: *const CalmSession, key_code: u32, now_ms: i64) {
    clear_last_error();
    if let Some(session) = session_ref(session) {
        session.record_key_down(key_code, now_ms);
    }
}

/// # Safety
/// - `session` must be a valid session pointer.
#[no_mangle]
pub unsafe extern "C" fn calm_session_key_up(session: *const CalmSession, now_ms: i64) {
    clear_last_error();
    if let Some(session) = session_ref(session) {
        session.record_key_up(now_ms);
    }
}

/// Record a touch sample. `phase` is 0 = down, 1 = move, 2 = up.
///
/// # Safety
/// - `session` must be a valid session pointer.
/// - Returns 0 on success, -1 on NULL session or unknown phase.
#[no_mangle]
pub unsafe extern "C" fn calm_session_touch(
    session: *const CalmSession,
    phase: i32,
    x: f64,
    y: f64,
    pressure: f64,
    now_ms: i64,
) -> i32 {
    clear_last_error();
    let Some(session) = session_ref(session) else {
        return -1;
    };
    let Some(phase) = TouchPhase::from_code(phase) else {
        set_last_error(&format!("Unknown touch phase {phase}"));
        return -1;
    };
    session.record_touch(phase, Point::new(x, y), pressure, now_ms);
    0
}

/// # Safety
/// - `session` must be a valid session pointer.
#[no_mangle]
pub unsafe extern "C" fn calm_session_accelerometer(
    session: *const CalmSession,
    x: f64,
    y: f64,
    z: f64,
    now_ms: i64,
) {
    clear_last_error();
    if let Some(session) = session_ref(session) {
        session.record_accelerometer(x, y, z, now_ms);
    }
}

/// # Safety
/// - `session` must be a valid session pointer.
#[no_mangle]
pub unsafe extern "C" fn calm_session_app_switch(session: *const CalmSession, now_ms: i64) {
    clear_last_error();
    if let Some(session) = session_ref(session) {
        session.record_app_switch(now_ms);
    }
}

/// Publish global typing metrics.
///
/// # Safety
/// - `session` must be a valid session pointer.
/// - Returns 1 if accepted, 0 if ignored (malformed or session stopped),
///   -1 on NULL session.
#[no_mangle]
pub unsafe extern "C" fn calm_session_set_global_metrics(
    session: *const CalmSession,
    typing_speed: f64,
    error_rate: f64,
    scroll_rate: f64,
    now_ms: i64,
) -> i32 {
    clear_last_error();
    match session_ref(session) {
        Some(session) => i32::from(session.set_global_metrics(typing_speed, error_rate, scroll_rate, now_ms)),
        None => -1,
    }
}

// ============================================================================
// Scoring and history
// ============================================================================

/// Score the current state without touching history.
///
/// # Safety
/// - `session` must be a valid session pointer.
/// - Returns analysis JSON that must be freed with `calm_free_string`.
/// - Returns NULL if the session is stopped or on error.
#[no_mangle]
pub unsafe extern "C" fn calm_session_analyze(session: *const CalmSession, now_ms: i64) -> *mut c_char {
    clear_last_error();
    let Some(session) = session_ref(session) else {
        return ptr::null_mut();
    };
    match session.analyze(now_ms) {
        Some(analysis) => to_json_cstr(&analysis),
        None => {
            set_last_error("Session is stopped");
            ptr::null_mut()
        }
    }
}

/// Score the current state and append the reading to history.
///
/// # Safety
/// - `session` must be a valid session pointer.
/// - Returns reading JSON that must be freed with `calm_free_string`.
/// - Returns NULL if the session is stopped or on error.
#[no_mangle]
pub unsafe extern "C" fn calm_session_record_reading(session: *const CalmSession, now_ms: i64) -> *mut c_char {
    clear_last_error();
    let Some(session) = session_ref(session) else {
        return ptr::null_mut();
    };
    match session.record_reading(now_ms) {
        Some(reading) => to_json_cstr(&reading),
        None => {
            set_last_error("Session is stopped");
            ptr::null_mut()
        }
    }
}

/// Append a self-reported mood score (clamped to 0-100).
///
/// # Safety
/// - `session` must be a valid session pointer.
/// - Returns reading JSON that must be freed with `calm_free_string`.
#[no_mangle]
pub unsafe extern "C" fn calm_session_log_mood(session: *const CalmSession, score: i32, now_ms: i64) -> *mut c_char {
    clear_last_error();
    let Some(session) = session_ref(session) else {
        return ptr::null_mut();
    };
    let score = score.clamp(0, 100) as u8;
    to_json_cstr(&session.log_mood(score, now_ms))
}

/// Serialize the history ring for persistence.
///
/// # Safety
/// - `session` must be a valid session pointer.
/// - Returns a JSON array that must be freed with `calm_free_string`.
#[no_mangle]
pub unsafe extern "C" fn calm_session_history_json(session: *const CalmSession) -> *mut c_char {
    clear_last_error();
    let Some(session) = session_ref(session) else {
        return ptr::null_mut();
    };
    match session.history().to_json() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Replace the history ring with persisted JSON.
///
/// # Safety
/// - `session` must be a valid session pointer.
/// - `json` must be a valid null-terminated C string.
/// - Returns 0 on success, 1 if the data was unreadable and the history was
///   reset to empty, -1 on invalid pointers.
#[no_mangle]
pub unsafe extern "C" fn calm_session_load_history(session: *const CalmSession, json: *const c_char) -> i32 {
    clear_last_error();
    let Some(session) = session_ref(session) else {
        return -1;
    };
    let Some(json_str) = cstr_to_string(json) else {
        set_last_error("Invalid JSON string pointer");
        return -1;
    };

    let config = session.config().history.clone();
    match HistoryRing::try_from_json(&json_str, config.clone()) {
        Ok(ring) => {
            session.history().replace(ring);
            0
        }
        Err(e) => {
            set_last_error(&e.to_string());
            session.history().replace(HistoryRing::new(config));
            1
        }
    }
}

/// Today's average, hourly buckets and trend, in the device's local time.
///
/// # Safety
/// - `session` must be a valid session pointer.
/// - Returns summary JSON that must be freed with `calm_free_string`.
#[no_mangle]
pub unsafe extern "C" fn calm_session_history_summary(session: *const CalmSession, now_ms: i64) -> *mut c_char {
    clear_last_error();
    let Some(session) = session_ref(session) else {
        return ptr::null_mut();
    };
    let Some(now) = Local.timestamp_millis_opt(now_ms).single() else {
        set_last_error(&format!("Timestamp {now_ms} is out of range"));
        return ptr::null_mut();
    };
    to_json_cstr(&session.history_summary_at(&now))
}

// ============================================================================
// Stateless API
// ============================================================================

/// Heuristic stress probability for a normalized vector.
///
/// # Safety
/// - `values` must point to `len` readable doubles, or be NULL.
/// - Returns 0.5 when `values` is NULL or `len` is not 4.
#[no_mangle]
pub unsafe extern "C" fn calm_score_vector(values: *const f64, len: usize) -> f64 {
    clear_last_error();
    if values.is_null() {
        set_last_error("Null vector pointer");
        return NEUTRAL_PROBABILITY;
    }
    let slice = std::slice::from_raw_parts(values, len);
    StressScorer::default().predict_slice(slice)
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by calmtrace functions.
///
/// # Safety
/// - `ptr` must be a pointer returned by a calmtrace function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn calm_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next calmtrace call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn calm_last_error() -> *const c_char {
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
pub unsafe extern "C" fn calm_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
