//! Fixture playback: replays PCM into a fixture capture backend in lockstep
//! with synthetic frames, so a whole session runs deterministically and
//! faster than real time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::engine::backend::{FixtureCaptureBackend, ManualClock, TimeSource};
use crate::engine::scheduler::TickSource;

/// Tick source that feeds the PCM recorded "during" each frame before
/// returning the frame's timestamp.
///
/// The PCM timeline starts at the clock's current time when the playback is
/// created. Samples due before the backend grants a stream are discarded by
/// the backend, as sound made before the microphone opens would be.
pub struct FixturePlayback {
    backend: FixtureCaptureBackend,
    clock: Arc<ManualClock>,
    period: Duration,
    pcm: Vec<f32>,
    origin: Duration,
    fed: usize,
    tail: Duration,
    cancelled: bool,
    frames: u64,
}

impl FixturePlayback {
    pub fn new(
        backend: FixtureCaptureBackend,
        clock: Arc<ManualClock>,
        period: Duration,
        pcm: Vec<f32>,
    ) -> Self {
        let origin = clock.elapsed();
        Self {
            backend,
            clock,
            period,
            pcm,
            origin,
            fed: 0,
            tail: Duration::ZERO,
            cancelled: false,
            frames: 0,
        }
    }

    /// Keep ticking for `tail` after the PCM runs out (silence)
    pub fn with_tail(mut self, tail: Duration) -> Self {
        self.tail = tail;
        self
    }

    /// Samples handed to the backend so far, including discarded ones
    pub fn samples_fed(&self) -> usize {
        self.fed
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Length of the PCM at the backend's sample rate
    pub fn pcm_duration(&self) -> Duration {
        let nanos = self.pcm.len() as u128 * 1_000_000_000 / self.backend.sample_rate().max(1) as u128;
        Duration::from_nanos(nanos as u64)
    }

    fn played(&self) -> Duration {
        self.clock.elapsed().saturating_sub(self.origin)
    }
}

impl TickSource for FixturePlayback {
    fn next_frame(&mut self) -> Option<Instant> {
        if self.cancelled || self.played() >= self.pcm_duration() + self.tail {
            return None;
        }

        self.clock.advance(self.period);
        self.frames += 1;

        let due = self.played().as_nanos() * self.backend.sample_rate() as u128 / 1_000_000_000;
        let due = (due as usize).min(self.pcm.len());
        if due > self.fed {
            self.backend.feed(&self.pcm[self.fed..due]);
            self.fed = due;
        }

        Some(self.clock.now())
    }

    fn cancel(&mut self) {
        self.cancelled = true;
    }
}
