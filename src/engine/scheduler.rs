//! Sampling scheduler.
//!
//! Drives a session at display-frame cadence: one analysis step per frame,
//! stopping as soon as the session detects a blow, is disabled, or is torn
//! down. Frame timing comes from a [`TickSource`] so the same loop runs
//! against a real interval timer, a synthetic clock, or fixture playback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::engine::backend::{ManualClock, TimeSource};
use crate::engine::session::{AudioSession, SessionPhase};
use crate::error::SessionError;

/// Source of frame timestamps
pub trait TickSource {
    /// Block until the next frame and return its timestamp.
    /// `None` means no further frames will arrive.
    fn next_frame(&mut self) -> Option<Instant>;

    /// Stop issuing frames. Later `next_frame` calls return `None`.
    fn cancel(&mut self);
}

/// Cross-thread teardown request for a running session
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Real-time frames paced by sleeping until each deadline.
///
/// Late frames are not replayed; after an overrun the next deadline is one
/// period from now.
pub struct IntervalTickSource {
    period: Duration,
    next_deadline: Option<Instant>,
    cancelled: bool,
}

impl IntervalTickSource {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_deadline: None,
            cancelled: false,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl TickSource for IntervalTickSource {
    fn next_frame(&mut self) -> Option<Instant> {
        if self.cancelled {
            return None;
        }

        let now = Instant::now();
        let deadline = self.next_deadline.unwrap_or(now + self.period);
        if deadline > now {
            std::thread::sleep(deadline - now);
        }

        let fired = Instant::now();
        let mut next = deadline + self.period;
        if next <= fired {
            next = fired + self.period;
        }
        self.next_deadline = Some(next);
        Some(fired)
    }

    fn cancel(&mut self) {
        self.cancelled = true;
    }
}

/// Synthetic frames that advance a shared [`ManualClock`] by one period each.
pub struct ManualTickSource {
    clock: Arc<ManualClock>,
    period: Duration,
    limit: Option<u64>,
    issued: u64,
    cancelled: bool,
}

impl ManualTickSource {
    pub fn new(clock: Arc<ManualClock>, period: Duration) -> Self {
        Self {
            clock,
            period,
            limit: None,
            issued: 0,
            cancelled: false,
        }
    }

    /// Stop after `frames` frames
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    pub fn issued(&self) -> u64 {
        self.issued
    }

    pub fn clock(&self) -> &Arc<ManualClock> {
        &self.clock
    }
}

impl TickSource for ManualTickSource {
    fn next_frame(&mut self) -> Option<Instant> {
        if self.cancelled || self.limit.is_some_and(|limit| self.issued >= limit) {
            return None;
        }
        self.issued += 1;
        self.clock.advance(self.period);
        Some(self.clock.now())
    }

    fn cancel(&mut self) {
        self.cancelled = true;
    }
}

/// Why the scheduler returned
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleOutcome {
    /// Blow confirmed at the given frame time
    Detected { at: Instant },
    /// Session could not analyze (permission denied, stream failure)
    Disabled(SessionError),
    /// Teardown was requested
    Stopped,
    /// The tick source ran dry first
    TicksExhausted,
}

/// Runs one session step per frame until the session reaches a final phase
#[derive(Debug, Default)]
pub struct SamplingScheduler {
    frames: u64,
}

impl SamplingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames handed to the session so far
    pub fn frames_run(&self) -> u64 {
        self.frames
    }

    pub fn run(
        &mut self,
        session: &mut AudioSession,
        ticks: &mut dyn TickSource,
    ) -> Result<ScheduleOutcome, SessionError> {
        let stop = session.stop_handle();

        loop {
            if stop.is_stop_requested() {
                return Ok(self.finish_stopped(session, ticks));
            }

            match session.phase() {
                SessionPhase::Detected => {
                    ticks.cancel();
                    let at = session.detected_at().ok_or(SessionError::StaleSampleAccess {
                        operation: "detected_at".to_string(),
                    })?;
                    log::info!("[Scheduler] Stopped after {} frames: detected", self.frames);
                    return Ok(ScheduleOutcome::Detected { at });
                }
                SessionPhase::Disabled => {
                    ticks.cancel();
                    let failure = session.failure().cloned().unwrap_or_else(|| {
                        SessionError::StreamOpenFailed {
                            reason: "session disabled".to_string(),
                        }
                    });
                    return Ok(ScheduleOutcome::Disabled(failure));
                }
                SessionPhase::Stopped => {
                    ticks.cancel();
                    return Ok(ScheduleOutcome::Stopped);
                }
                SessionPhase::Armed | SessionPhase::Active => {}
            }

            let Some(now) = ticks.next_frame() else {
                log::debug!("[Scheduler] Tick source exhausted after {} frames", self.frames);
                return Ok(ScheduleOutcome::TicksExhausted);
            };

            // Teardown may have been requested while waiting for the frame
            if stop.is_stop_requested() {
                return Ok(self.finish_stopped(session, ticks));
            }

            self.frames += 1;
            session.step(now)?;
        }
    }

    fn finish_stopped(
        &mut self,
        session: &mut AudioSession,
        ticks: &mut dyn TickSource,
    ) -> ScheduleOutcome {
        ticks.cancel();
        session.stop();
        log::info!("[Scheduler] Stopped after {} frames: teardown", self.frames);
        ScheduleOutcome::Stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_ticks_advance_shared_clock() {
        let clock = Arc::new(ManualClock::new());
        let start = clock.now();
        let mut ticks =
            ManualTickSource::new(clock.clone(), Duration::from_millis(16)).with_limit(3);

        let frames: Vec<Instant> = std::iter::from_fn(|| ticks.next_frame()).collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2] - start, Duration::from_millis(48));
        assert_eq!(clock.now(), frames[2]);
        assert_eq!(ticks.issued(), 3);
    }

    #[test]
    fn test_cancel_ends_ticks() {
        let clock = Arc::new(ManualClock::new());
        let mut ticks = ManualTickSource::new(clock, Duration::from_millis(16));
        assert!(ticks.next_frame().is_some());
        ticks.cancel();
        assert!(ticks.next_frame().is_none());
    }

    #[test]
    fn test_interval_ticks_are_paced() {
        let mut ticks = IntervalTickSource::new(Duration::from_millis(5));
        let first = ticks.next_frame().unwrap();
        let second = ticks.next_frame().unwrap();
        assert!(second - first >= Duration::from_millis(4));

        ticks.cancel();
        assert!(ticks.next_frame().is_none());
    }

    #[test]
    fn test_stop_handle_is_shared() {
        let handle = StopHandle::new();
        let remote = handle.clone();
        assert!(!handle.is_stop_requested());

        std::thread::spawn(move || remote.request_stop())
            .join()
            .unwrap();
        assert!(handle.is_stop_requested());
    }
}
