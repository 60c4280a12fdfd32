// Session error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Session error code constants
///
/// Error code range: 2001-2006
pub struct SessionErrorCodes {}

impl SessionErrorCodes {
    /// Microphone permission denied by the host
    pub const PERMISSION_DENIED: i32 = 2001;

    /// Filter cutoff/center/Q is not a positive finite value (or exceeds Nyquist)
    pub const INVALID_FILTER_PARAMETER: i32 = 2002;

    /// Detector, analyzer or ducking tuning is out of range
    pub const INVALID_TUNING: i32 = 2003;

    /// Sampling attempted after teardown or after detection
    pub const STALE_SAMPLE_ACCESS: i32 = 2004;

    /// Capture device could not be opened
    pub const STREAM_OPEN_FAILED: i32 = 2005;

    /// Another session is still live for this manager
    pub const ALREADY_ACTIVE: i32 = 2006;
}

/// Log a session error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_session_error(err: &SessionError, context: &str) {
    error!(
        "Session error in {}: code={}, component=AudioSession, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Detection session errors
///
/// `PermissionDenied` and `StreamOpenFailed` are recoverable: the session is
/// disabled and the host proceeds without blow detection. Parameter errors
/// are raised before any capture stream is requested.
///
/// Error code range: 2001-2006
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Microphone permission denied
    PermissionDenied,

    /// Filter parameter non-positive, non-finite or at/above Nyquist
    InvalidFilterParameter { parameter: String, value: f32 },

    /// Tuning value outside its accepted range
    InvalidTuning { field: String, reason: String },

    /// `sample()`/`tick()` called after teardown or after detection
    StaleSampleAccess { operation: String },

    /// Failed to open the capture stream
    StreamOpenFailed { reason: String },

    /// A session is already live
    AlreadyActive,
}

impl SessionError {
    /// Whether the session can continue in a disabled (fail-open) state.
    pub fn is_fail_open(&self) -> bool {
        matches!(
            self,
            SessionError::PermissionDenied | SessionError::StreamOpenFailed { .. }
        )
    }
}

impl ErrorCode for SessionError {
    fn code(&self) -> i32 {
        match self {
            SessionError::PermissionDenied => SessionErrorCodes::PERMISSION_DENIED,
            SessionError::InvalidFilterParameter { .. } => {
                SessionErrorCodes::INVALID_FILTER_PARAMETER
            }
            SessionError::InvalidTuning { .. } => SessionErrorCodes::INVALID_TUNING,
            SessionError::StaleSampleAccess { .. } => SessionErrorCodes::STALE_SAMPLE_ACCESS,
            SessionError::StreamOpenFailed { .. } => SessionErrorCodes::STREAM_OPEN_FAILED,
            SessionError::AlreadyActive => SessionErrorCodes::ALREADY_ACTIVE,
        }
    }

    fn message(&self) -> String {
        match self {
            SessionError::PermissionDenied => {
                "Microphone permission denied. Blow detection disabled for this session."
                    .to_string()
            }
            SessionError::InvalidFilterParameter { parameter, value } => {
                format!(
                    "Filter parameter {} must be positive, finite and below Nyquist (got {})",
                    parameter, value
                )
            }
            SessionError::InvalidTuning { field, reason } => {
                format!("Invalid tuning for {}: {}", field, reason)
            }
            SessionError::StaleSampleAccess { operation } => {
                format!(
                    "{} called after the session stopped or detection completed",
                    operation
                )
            }
            SessionError::StreamOpenFailed { reason } => {
                format!("Failed to open capture stream: {}", reason)
            }
            SessionError::AlreadyActive => {
                "A detection session is already live. Call stop() first.".to_string()
            }
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SessionError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for SessionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_codes() {
        assert_eq!(
            SessionError::PermissionDenied.code(),
            SessionErrorCodes::PERMISSION_DENIED
        );
        assert_eq!(
            SessionError::InvalidFilterParameter {
                parameter: "q".to_string(),
                value: 0.0
            }
            .code(),
            SessionErrorCodes::INVALID_FILTER_PARAMETER
        );
        assert_eq!(
            SessionError::StaleSampleAccess {
                operation: "tick".to_string()
            }
            .code(),
            SessionErrorCodes::STALE_SAMPLE_ACCESS
        );
        assert_eq!(SessionError::AlreadyActive.code(), 2006);
    }

    #[test]
    fn test_session_error_messages() {
        let err = SessionError::InvalidFilterParameter {
            parameter: "cutoff_hz".to_string(),
            value: -3.0,
        };
        assert_eq!(
            err.message(),
            "Filter parameter cutoff_hz must be positive, finite and below Nyquist (got -3)"
        );

        assert!(SessionError::PermissionDenied
            .message()
            .contains("permission denied"));
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::PermissionDenied;
        let display = format!("{}", err);
        assert!(display.contains("SessionError"));
        assert!(display.contains("2001"));
    }

    #[test]
    fn test_fail_open_classification() {
        assert!(SessionError::PermissionDenied.is_fail_open());
        assert!(SessionError::StreamOpenFailed {
            reason: "busy".to_string()
        }
        .is_fail_open());
        assert!(!SessionError::AlreadyActive.is_fail_open());
    }
}
