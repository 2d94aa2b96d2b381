//! FFI bindings for DriveSense
//!
//! This module provides C-compatible functions for driving a [`DriveSession`]
//! from other languages. Structured values cross the boundary as JSON C strings;
//! every returned string is allocated here and must be freed by the caller with
//! `ds_free_string`.
//!
//! Audio side effects are queued inside the handle and collected with
//! `ds_session_drain_effects`, so the host decides how to play them.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::effects::RecordingSink;
use crate::road::RoadInfo;
use crate::session::DriveSession;
use crate::types::{PositionSample, SourceAvailability};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
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

/// Serialize a value into a newly allocated C string, or NULL with the error recorded
fn json_to_cstr<T: Serialize>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

fn availability_from_code(code: i32) -> Option<SourceAvailability> {
    match code {
        0 => Some(SourceAvailability::Available),
        1 => Some(SourceAvailability::Unsupported),
        2 => Some(SourceAvailability::PermissionDenied),
        3 => Some(SourceAvailability::Unavailable),
        _ => None,
    }
}

// ============================================================================
// Session API
// ============================================================================

/// Opaque handle to a DriveSession and its queued side effects
pub struct DriveSessionHandle {
    session: DriveSession,
    effects: RecordingSink,
}

/// Create a new session.
///
/// # Safety
/// - `config_json` must be NULL (use defaults) or a valid null-terminated C string.
/// - Returns a pointer that must be freed with `ds_session_free`.
/// - Returns NULL on error; call `ds_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn ds_session_new(config_json: *const c_char) -> *mut DriveSessionHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        EngineConfig::default()
    } else {
        let json = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match EngineConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    let handle = Box::new(DriveSessionHandle {
        session: DriveSession::new(config),
        effects: RecordingSink::new(),
    });
    Box::into_raw(handle)
}

/// Free a session.
///
/// # Safety
/// - `session` must be a valid pointer returned by `ds_session_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn ds_session_free(session: *mut DriveSessionHandle) {
    if !session.is_null() {
        drop(Box::from_raw(session));
    }
}

/// Start tracking.
///
/// `availability`: 0 available, 1 unsupported, 2 permission denied, 3 unavailable.
///
/// # Safety
/// - `session` must be a valid pointer returned by `ds_session_new`.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn ds_session_start(
    session: *mut DriveSessionHandle,
    availability: i32,
    now_ms: i64,
) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }
    let handle = &mut *session;

    let Some(availability) = availability_from_code(availability) else {
        set_last_error("Unknown availability code");
        return -1;
    };

    match handle.session.start(availability, now_ms) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Push a position sample and return the live snapshot JSON.
///
/// # Safety
/// - `session` must be a valid pointer returned by `ds_session_new`.
/// - `sample_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `ds_free_string`.
/// - Returns NULL on error; call `ds_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn ds_session_push_sample(
    session: *mut DriveSessionHandle,
    sample_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }
    let handle = &mut *session;

    let json = match cstr_to_string(sample_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid sample string pointer");
            return ptr::null_mut();
        }
    };
    let sample: PositionSample = match serde_json::from_str(&json) {
        Ok(sample) => sample,
        Err(e) => {
            set_last_error(&format!("Invalid position sample: {}", e));
            return ptr::null_mut();
        }
    };

    match handle.session.push_sample(&sample, &mut handle.effects) {
        Ok(snapshot) => json_to_cstr(&snapshot),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Apply road metadata (`{"speedLimit": .., "roadName": .., "isSchoolZone": ..}`).
///
/// # Safety
/// - `session` must be a valid pointer returned by `ds_session_new`.
/// - `road_json` must be a valid null-terminated C string.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn ds_session_apply_road(
    session: *mut DriveSessionHandle,
    road_json: *const c_char,
    now_ms: i64,
) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }
    let handle = &mut *session;

    let json = match cstr_to_string(road_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid road string pointer");
            return -1;
        }
    };

    match RoadInfo::from_json(&json) {
        Ok(info) => {
            handle
                .session
                .apply_road_info(info, now_ms, &mut handle.effects);
            0
        }
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Advance every timer to `now_ms`.
///
/// # Safety
/// - `session` must be a valid pointer returned by `ds_session_new`.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn ds_session_advance(session: *mut DriveSessionHandle, now_ms: i64) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }
    let handle = &mut *session;
    handle.session.advance(now_ms, &mut handle.effects);
    0
}

/// Stop tracking and return the trip record JSON (`null` if nothing was recorded).
///
/// # Safety
/// - `session` must be a valid pointer returned by `ds_session_new`.
/// - Returns a newly allocated string that must be freed with `ds_free_string`.
/// - Returns NULL on error; call `ds_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn ds_session_stop(
    session: *mut DriveSessionHandle,
    now_ms: i64,
) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }
    let handle = &mut *session;
    json_to_cstr(&handle.session.stop(now_ms))
}

/// Take the queued audio effects as a JSON array.
///
/// # Safety
/// - `session` must be a valid pointer returned by `ds_session_new`.
/// - Returns a newly allocated string that must be freed with `ds_free_string`.
#[no_mangle]
pub unsafe extern "C" fn ds_session_drain_effects(session: *mut DriveSessionHandle) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }
    let handle = &mut *session;
    json_to_cstr(&handle.effects.drain())
}

/// Current live snapshot JSON.
///
/// # Safety
/// - `session` must be a valid pointer returned by `ds_session_new`.
/// - Returns a newly allocated string that must be freed with `ds_free_string`.
#[no_mangle]
pub unsafe extern "C" fn ds_session_snapshot(session: *const DriveSessionHandle) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }
    let handle = &*session;
    json_to_cstr(&handle.session.snapshot())
}

/// Eco report JSON, evaluated in the local time zone.
///
/// # Safety
/// - `session` must be a valid pointer returned by `ds_session_new`.
/// - Returns a newly allocated string that must be freed with `ds_free_string`.
#[no_mangle]
pub unsafe extern "C" fn ds_session_eco_report(
    session: *const DriveSessionHandle,
    now_ms: i64,
) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }
    let handle = &*session;
    json_to_cstr(&handle.session.eco_report(now_ms))
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by DriveSense functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a DriveSense function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn ds_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next DriveSense call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn ds_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the DriveSense library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn ds_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
