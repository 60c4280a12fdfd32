//! Session lifecycle events exposed to the CLI report and stream subscribers.

use serde::{Deserialize, Serialize};

/// What happened during a detection session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    /// Session mounted and waiting for its activation condition
    ActivationArmed,
    PermissionGranted,
    PermissionDenied,
    /// Capture graph built, sampling may begin
    AnalysisStarted,
    SustainStarted,
    SustainReset,
    Detected,
    /// Background track lowered for analysis
    Ducked,
    /// Background track back at full volume
    Restored,
    Stopped,
}

/// One timestamped session event.
///
/// `timestamp_ms` is measured from the moment the session was mounted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionEvent {
    pub timestamp_ms: u64,
    pub kind: SessionEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SessionEvent {
    pub fn new(timestamp_ms: u64, kind: SessionEventKind) -> Self {
        Self {
            timestamp_ms,
            kind,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event = SessionEvent::new(1016, SessionEventKind::Detected).with_detail("rms=70.0");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "detected");
        assert_eq!(json["timestamp_ms"], 1016);
        assert_eq!(json["detail"], "rms=70.0");

        let bare = serde_json::to_value(SessionEvent::new(0, SessionEventKind::Stopped)).unwrap();
        assert!(bare.get("detail").is_none());
    }
}
