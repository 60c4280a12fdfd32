//! Background track collaborator.
//!
//! The session plays a looping track while it waits and ducks its volume
//! while the microphone is analyzed. Volume is a linear gain in [0, 1].

use std::cell::Cell;

use crate::error::TrackError;

#[cfg(not(target_os = "android"))]
mod cpal_player;
mod stub;

#[cfg(not(target_os = "android"))]
pub use cpal_player::CpalTrackPlayer;
pub use stub::StubTrack;

/// Looping background track as seen by the session
pub trait BackgroundTrack {
    /// Start looped playback. Calling it on a playing track is a no-op.
    fn play(&self) -> Result<(), TrackError>;

    /// Current gain
    fn volume(&self) -> f32;

    /// Set the gain; values are clamped to [0, 1]
    fn set_volume(&self, volume: f32);

    /// Number of times playback wrapped back to the start
    fn loops_completed(&self) -> u64;
}

/// Track that never plays. Used when no music is configured.
#[derive(Debug)]
pub struct SilentTrack {
    volume: Cell<f32>,
}

impl SilentTrack {
    pub fn new() -> Self {
        Self {
            volume: Cell::new(1.0),
        }
    }
}

impl Default for SilentTrack {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundTrack for SilentTrack {
    fn play(&self) -> Result<(), TrackError> {
        Ok(())
    }

    fn volume(&self) -> f32 {
        self.volume.get()
    }

    fn set_volume(&self, volume: f32) {
        self.volume.set(volume.clamp(0.0, 1.0));
    }

    fn loops_completed(&self) -> u64 {
        0
    }
}
