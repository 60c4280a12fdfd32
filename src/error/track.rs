// Background track error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Track error code constants
///
/// Error code range: 3001-3003
pub struct TrackErrorCodes {}

impl TrackErrorCodes {
    /// Track file could not be read or decoded
    pub const DECODE_FAILED: i32 = 3001;

    /// No output device available for playback
    pub const NO_OUTPUT_DEVICE: i32 = 3002;

    /// Output stream failed to build or start
    pub const PLAYBACK_FAILED: i32 = 3003;
}

/// Log a track error with structured context
pub fn log_track_error(err: &TrackError, context: &str) {
    error!(
        "Track error in {}: code={}, component=BackgroundTrack, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Background track playback errors
#[derive(Debug, Clone, PartialEq)]
pub enum TrackError {
    DecodeFailed { path: String, reason: String },
    NoOutputDevice,
    PlaybackFailed { reason: String },
}

impl ErrorCode for TrackError {
    fn code(&self) -> i32 {
        match self {
            TrackError::DecodeFailed { .. } => TrackErrorCodes::DECODE_FAILED,
            TrackError::NoOutputDevice => TrackErrorCodes::NO_OUTPUT_DEVICE,
            TrackError::PlaybackFailed { .. } => TrackErrorCodes::PLAYBACK_FAILED,
        }
    }

    fn message(&self) -> String {
        match self {
            TrackError::DecodeFailed { path, reason } => {
                format!("Failed to decode track {}: {}", path, reason)
            }
            TrackError::NoOutputDevice => "No default output device found".to_string(),
            TrackError::PlaybackFailed { reason } => format!("Playback failed: {}", reason),
        }
    }
}

impl fmt::Display for TrackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TrackError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for TrackError {}

impl From<hound::Error> for TrackError {
    fn from(err: hound::Error) -> Self {
        TrackError::DecodeFailed {
            path: "<stream>".to_string(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_error_codes() {
        assert_eq!(TrackError::NoOutputDevice.code(), 3002);
        assert_eq!(
            TrackError::PlaybackFailed {
                reason: "x".to_string()
            }
            .code(),
            TrackErrorCodes::PLAYBACK_FAILED
        );
    }

    #[test]
    fn test_from_hound_error() {
        let err: TrackError = hound::Error::FormatError("bad header").into();
        match err {
            TrackError::DecodeFailed { reason, .. } => assert!(reason.contains("bad header")),
            other => panic!("Expected DecodeFailed, got {:?}", other),
        }
    }
}
