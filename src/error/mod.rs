// Error types for the blow detector
//
// This module defines custom error types for detection sessions and background
// track playback, providing structured error handling with numeric codes that
// hosts can surface as diagnostics.

mod session;
mod track;

pub use session::{log_session_error, SessionError, SessionErrorCodes};
pub use track::{log_track_error, TrackError, TrackErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the host boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
