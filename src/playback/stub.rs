use std::cell::{Cell, RefCell};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::engine::backend::TimeSource;
use crate::error::TrackError;

use super::BackgroundTrack;

/// In-memory track that records every volume write.
///
/// Loop completions are driven either manually with [`StubTrack::finish_loop`]
/// or, when built with [`StubTrack::with_loop_length`], by elapsed time on an
/// injected clock measured from the first `play()`.
pub struct StubTrack {
    volume: Cell<f32>,
    history: RefCell<Vec<f32>>,
    play_calls: Cell<u32>,
    playing_since: Cell<Option<Instant>>,
    manual_loops: Cell<u64>,
    timed: Option<(Duration, Arc<dyn TimeSource>)>,
    fail_play: bool,
}

impl StubTrack {
    pub fn new() -> Self {
        Self {
            volume: Cell::new(1.0),
            history: RefCell::new(Vec::new()),
            play_calls: Cell::new(0),
            playing_since: Cell::new(None),
            manual_loops: Cell::new(0),
            timed: None,
            fail_play: false,
        }
    }

    /// Track whose loop wraps every `loop_length` on `clock`
    pub fn with_loop_length(loop_length: Duration, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            timed: Some((loop_length, clock)),
            ..Self::new()
        }
    }

    /// Track whose `play()` always fails
    pub fn failing() -> Self {
        Self {
            fail_play: true,
            ..Self::new()
        }
    }

    /// Simulate the end of one loop cycle
    pub fn finish_loop(&self) {
        self.manual_loops.set(self.manual_loops.get() + 1);
    }

    /// Every value passed to `set_volume`, in order
    pub fn volume_history(&self) -> Vec<f32> {
        self.history.borrow().clone()
    }

    pub fn play_calls(&self) -> u32 {
        self.play_calls.get()
    }

    pub fn is_playing(&self) -> bool {
        self.playing_since.get().is_some()
    }
}

impl Default for StubTrack {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundTrack for StubTrack {
    fn play(&self) -> Result<(), TrackError> {
        self.play_calls.set(self.play_calls.get() + 1);
        if self.fail_play {
            return Err(TrackError::PlaybackFailed {
                reason: "stub configured to fail".to_string(),
            });
        }
        if self.playing_since.get().is_none() {
            let started = match &self.timed {
                Some((_, clock)) => clock.now(),
                None => Instant::now(),
            };
            self.playing_since.set(Some(started));
        }
        Ok(())
    }

    fn volume(&self) -> f32 {
        self.volume.get()
    }

    fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.volume.set(volume);
        self.history.borrow_mut().push(volume);
    }

    fn loops_completed(&self) -> u64 {
        let timed = match (&self.timed, self.playing_since.get()) {
            (Some((length, clock)), Some(since)) if !length.is_zero() => {
                let played = clock.now().saturating_duration_since(since);
                (played.as_nanos() / length.as_nanos()) as u64
            }
            _ => 0,
        };
        self.manual_loops.get() + timed
    }
}
