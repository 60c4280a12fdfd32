// Classifier - debounced sub-band energy detector for a sustained blow
//
// Each tick reduces the configured sub-band of a spectral frame to one RMS
// value and compares it to the threshold. A single loud transient is not
// enough: the RMS must stay above threshold continuously for the required
// duration before the classifier latches DETECTED.
//
// State machine:
//   WAITING --rms > T--> SUSTAINING --held >= D--> DETECTED (terminal)
//      ^                     |
//      +-----rms <= T--------+

use std::time::{Duration, Instant};

use crate::analysis::frame::{SpectralFrame, SubBandWindow};
use crate::config::DetectorConfig;

/// Classifier status
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DetectionStatus {
    /// Sub-band energy at or below threshold
    Waiting,
    /// Above threshold, debounce interval running
    Sustaining,
    /// Blow confirmed; never reverts
    Detected,
}

/// Snapshot of the classifier state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionState {
    pub status: DetectionStatus,
    /// Start of the current above-threshold run
    pub sustain_since: Option<Instant>,
}

impl DetectionState {
    pub fn waiting() -> Self {
        Self {
            status: DetectionStatus::Waiting,
            sustain_since: None,
        }
    }

    pub fn is_detected(&self) -> bool {
        self.status == DetectionStatus::Detected
    }
}

/// Single-shot blow classifier
pub struct BlowClassifier {
    window: SubBandWindow,
    threshold: f32,
    required_duration: Duration,
    state: DetectionState,
    last_rms: f32,
    detected_at: Option<Instant>,
}

impl BlowClassifier {
    pub fn new(window: SubBandWindow, threshold: f32, required_duration: Duration) -> Self {
        Self {
            window,
            threshold,
            required_duration,
            state: DetectionState::waiting(),
            last_rms: 0.0,
            detected_at: None,
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(
            config.sub_band,
            config.threshold,
            Duration::from_millis(config.required_duration_ms),
        )
    }

    /// Advance the state machine with the frame captured at `now`.
    ///
    /// Once DETECTED the state is frozen and further calls return it
    /// unchanged; the scheduler is expected to stop calling before then.
    pub fn tick(&mut self, frame: &SpectralFrame, now: Instant) -> DetectionState {
        if self.state.is_detected() {
            log::warn!("[Classifier] tick after detection ignored");
            return self.state;
        }

        let rms = self.window.rms(frame);
        self.last_rms = rms;

        if rms > self.threshold {
            match self.state.sustain_since {
                None => {
                    self.state = DetectionState {
                        status: DetectionStatus::Sustaining,
                        sustain_since: Some(now),
                    };
                    log::debug!(
                        "[Classifier] sustain started: rms={:.1} threshold={:.1}",
                        rms,
                        self.threshold
                    );
                }
                Some(since) => {
                    let held = now.saturating_duration_since(since);
                    if held >= self.required_duration {
                        self.state.status = DetectionStatus::Detected;
                        self.detected_at = Some(now);
                        tracing::info!(
                            "[Classifier] blow detected after {} ms above threshold",
                            held.as_millis()
                        );
                    }
                }
            }
        } else {
            if self.state.status == DetectionStatus::Sustaining {
                log::debug!(
                    "[Classifier] sustain reset: rms={:.1} threshold={:.1}",
                    rms,
                    self.threshold
                );
            }
            self.state = DetectionState::waiting();
        }

        self.state
    }

    pub fn state(&self) -> DetectionState {
        self.state
    }

    /// RMS of the sub-band on the most recent tick
    pub fn last_rms(&self) -> f32 {
        self.last_rms
    }

    pub fn detected_at(&self) -> Option<Instant> {
        self.detected_at
    }

    pub fn window(&self) -> SubBandWindow {
        self.window
    }
}

#[cfg(test)]
#[path = "classifier_tests.rs"]
mod tests;
