//! Capture backends and time sources for the detection session.
//!
//! A capture backend stands in for the host's microphone permission prompt
//! plus device: it either grants a stream that feeds the capture half of the
//! buffer pool, or refuses with `PermissionDenied`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::audio::CaptureChannels;
use crate::error::SessionError;

/// Releases the underlying device when closed or dropped.
pub trait CaptureHandle {
    /// Stop delivering samples. Must be safe to call repeatedly.
    fn close(&mut self);
}

/// A granted microphone stream
pub struct CaptureStream {
    /// Rate of the mono samples pushed into the capture channels
    pub sample_rate: u32,
    pub handle: Box<dyn CaptureHandle>,
}

/// Trait implemented by microphone capture collaborators.
///
/// `request_stream` is the only operation that may wait on the user (the
/// permission prompt). The session calls it at most once.
pub trait CaptureBackend {
    fn request_stream(&self, channels: CaptureChannels) -> Result<CaptureStream, SessionError>;
}

/// Trait representing a monotonic time source used for session timestamps.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Default time source backed by `Instant::now`.
#[derive(Default)]
pub struct SystemTimeSource {
    _unit: (),
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Deterministic clock that only moves when advanced.
///
/// Shared between a session manager and a synthetic tick source so mount
/// time and frame timestamps come from the same timeline.
pub struct ManualClock {
    start: Instant,
    offset_ns: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset_ns: AtomicU64::new(0),
        }
    }

    /// Move the clock forward and return the new time
    pub fn advance(&self, by: Duration) -> Instant {
        let by_ns = by.as_nanos().min(u64::MAX as u128) as u64;
        let offset = self.offset_ns.fetch_add(by_ns, Ordering::SeqCst) + by_ns;
        self.start + Duration::from_nanos(offset)
    }

    /// Time elapsed since the clock was created
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.offset_ns.load(Ordering::SeqCst))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }
}

#[cfg(not(target_os = "android"))]
mod cpal;
#[cfg(not(target_os = "android"))]
pub use self::cpal::CpalCaptureBackend;

mod fixture;
pub use fixture::FixtureCaptureBackend;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_only_moves_when_advanced() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        assert_eq!(clock.now(), t0);

        let t1 = clock.advance(Duration::from_millis(16));
        assert_eq!(t1 - t0, Duration::from_millis(16));
        assert_eq!(clock.now(), t1);
        assert_eq!(clock.elapsed(), Duration::from_millis(16));
    }
}
