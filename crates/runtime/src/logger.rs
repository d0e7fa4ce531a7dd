//! Forwarding of native log messages to `tracing`.
//!
//! Models that export `set_logger` receive [`forward_native_log`] and call it
//! with BMI level codes:
//!
//! | Code | Level   | tracing |
//! |------|---------|---------|
//! | 0    | all     | TRACE   |
//! | 1    | debug   | DEBUG   |
//! | 2    | info    | INFO    |
//! | 3    | warning | WARN    |
//! | 4    | error   | ERROR   |
//! | 5    | fatal   | ERROR   |
//! | 6    | none    | dropped |
//!
//! Events are emitted under the target [`NATIVE_TARGET`].

use std::ffi::CStr;
use std::os::raw::{c_char, c_int};

use tracing::{debug, error, info, trace, warn};

/// tracing target for messages originating in the model.
pub const NATIVE_TARGET: &str = "bmi::native";

/// BMI log level codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeLevel {
    /// Everything
    All,
    /// Debug output
    Debug,
    /// Informational
    Info,
    /// Warning
    Warning,
    /// Error
    Error,
    /// Fatal error
    Fatal,
    /// Logging disabled
    None,
}

impl NativeLevel {
    /// Map a level code; codes outside 0..=6 are treated as errors.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => NativeLevel::All,
            1 => NativeLevel::Debug,
            2 => NativeLevel::Info,
            3 => NativeLevel::Warning,
            4 => NativeLevel::Error,
            5 => NativeLevel::Fatal,
            6 => NativeLevel::None,
            _ => NativeLevel::Error,
        }
    }
}

/// Emit one native message at the matching tracing level.
pub fn log_native(level: NativeLevel, message: &str) {
    match level {
        NativeLevel::All => trace!(target: NATIVE_TARGET, "{}", message),
        NativeLevel::Debug => debug!(target: NATIVE_TARGET, "{}", message),
        NativeLevel::Info => info!(target: NATIVE_TARGET, "{}", message),
        NativeLevel::Warning => warn!(target: NATIVE_TARGET, "{}", message),
        NativeLevel::Error => error!(target: NATIVE_TARGET, "{}", message),
        NativeLevel::Fatal => error!(target: NATIVE_TARGET, fatal = true, "{}", message),
        NativeLevel::None => {}
    }
}

/// Callback handed to the model's `set_logger`.
///
/// # Safety
///
/// `msg` must be null or point to a NUL-terminated string valid for the
/// duration of the call.
pub unsafe extern "C" fn forward_native_log(level: c_int, msg: *const c_char) {
    if msg.is_null() {
        return;
    }
    let message = CStr::from_ptr(msg).to_string_lossy();
    log_native(NativeLevel::from_code(level), message.trim_end());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_codes() {
        assert_eq!(NativeLevel::from_code(0), NativeLevel::All);
        assert_eq!(NativeLevel::from_code(3), NativeLevel::Warning);
        assert_eq!(NativeLevel::from_code(5), NativeLevel::Fatal);
        assert_eq!(NativeLevel::from_code(6), NativeLevel::None);
        assert_eq!(NativeLevel::from_code(42), NativeLevel::Error);
        assert_eq!(NativeLevel::from_code(-1), NativeLevel::Error);
    }

    #[test]
    fn test_forward_tolerates_null_and_invalid_utf8() {
        unsafe {
            forward_native_log(2, std::ptr::null());
            forward_native_log(3, b"bad \xff byte\0".as_ptr().cast());
            forward_native_log(6, b"silenced\0".as_ptr().cast());
        }
    }
}
