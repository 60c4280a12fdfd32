// DuckingCoordinator - lowers the background track while the microphone is
// analyzed and restores it exactly once when a blow is detected.
//
// Volume changes are idempotent: a second analysis start or a second detection
// notification never re-applies the change.

use std::rc::Rc;

use crate::playback::BackgroundTrack;

/// Full-scale track volume
pub const FULL_VOLUME: f32 = 1.0;

/// Ducking progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuckState {
    /// Track at its original volume, analysis not started
    Idle,
    /// Track lowered to the ducked volume
    Ducked,
    /// Track restored after detection or teardown; terminal
    Restored,
}

pub struct DuckingCoordinator {
    track: Rc<dyn BackgroundTrack>,
    ducked_volume: f32,
    state: DuckState,
}

impl DuckingCoordinator {
    pub fn new(track: Rc<dyn BackgroundTrack>, ducked_volume: f32) -> Self {
        Self {
            track,
            ducked_volume: ducked_volume.clamp(0.0, 1.0),
            state: DuckState::Idle,
        }
    }

    /// Lower the track as analysis begins. Returns true if the volume changed.
    pub fn on_analysis_start(&mut self) -> bool {
        if self.state != DuckState::Idle {
            return false;
        }
        self.track.set_volume(self.ducked_volume);
        self.state = DuckState::Ducked;
        log::debug!("[Ducking] Track ducked to {:.2}", self.ducked_volume);
        true
    }

    /// Restore full volume on detection. Returns true only the first time.
    pub fn on_detected(&mut self) -> bool {
        self.restore("detection")
    }

    /// Restore full volume on teardown if the track is still ducked
    pub fn release(&mut self) -> bool {
        self.restore("teardown")
    }

    pub fn state(&self) -> DuckState {
        self.state
    }

    pub fn ducked_volume(&self) -> f32 {
        self.ducked_volume
    }

    fn restore(&mut self, reason: &str) -> bool {
        if self.state != DuckState::Ducked {
            return false;
        }
        self.track.set_volume(FULL_VOLUME);
        self.state = DuckState::Restored;
        log::debug!("[Ducking] Track restored to full volume on {}", reason);
        true
    }
}
