use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::audio::CaptureChannels;
use crate::error::SessionError;

use super::{CaptureBackend, CaptureHandle, CaptureStream};

/// Scripted microphone backend used for deterministic testing and CLI tooling.
///
/// Either grants every request (samples are then delivered explicitly with
/// [`FixtureCaptureBackend::feed`]) or refuses with `PermissionDenied`.
/// Clones share the same underlying state.
#[derive(Clone)]
pub struct FixtureCaptureBackend {
    inner: Rc<FixtureInner>,
}

struct FixtureInner {
    grant: bool,
    sample_rate: u32,
    requests: Cell<u32>,
    channels: RefCell<Option<CaptureChannels>>,
    dropped: Cell<usize>,
}

impl FixtureCaptureBackend {
    /// Backend whose permission prompt is accepted
    pub fn granted(sample_rate: u32) -> Self {
        Self::build(true, sample_rate)
    }

    /// Backend whose permission prompt is refused
    pub fn denied() -> Self {
        Self::build(false, 48_000)
    }

    fn build(grant: bool, sample_rate: u32) -> Self {
        Self {
            inner: Rc::new(FixtureInner {
                grant,
                sample_rate,
                requests: Cell::new(0),
                channels: RefCell::new(None),
                dropped: Cell::new(0),
            }),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    /// Number of times a stream was requested
    pub fn requests(&self) -> u32 {
        self.inner.requests.get()
    }

    /// Whether a granted stream is currently open
    pub fn is_streaming(&self) -> bool {
        self.inner.channels.borrow().is_some()
    }

    /// Deliver microphone samples.
    ///
    /// Samples fed while no stream is open are discarded, like sound that
    /// happens before the microphone is opened. Returns how many samples were
    /// accepted.
    pub fn feed(&self, samples: &[f32]) -> usize {
        let mut slot = self.inner.channels.borrow_mut();
        match slot.as_mut() {
            Some(channels) => {
                let dropped = channels.push_samples(samples);
                self.inner.dropped.set(self.inner.dropped.get() + dropped);
                samples.len() - dropped
            }
            None => 0,
        }
    }

    /// Samples lost because the pool was exhausted
    pub fn dropped_samples(&self) -> usize {
        self.inner.dropped.get()
    }
}

impl CaptureBackend for FixtureCaptureBackend {
    fn request_stream(&self, channels: CaptureChannels) -> Result<CaptureStream, SessionError> {
        self.inner.requests.set(self.inner.requests.get() + 1);

        if !self.inner.grant {
            return Err(SessionError::PermissionDenied);
        }

        *self.inner.channels.borrow_mut() = Some(channels);
        Ok(CaptureStream {
            sample_rate: self.inner.sample_rate,
            handle: Box::new(FixtureCaptureHandle {
                inner: Rc::clone(&self.inner),
            }),
        })
    }
}

struct FixtureCaptureHandle {
    inner: Rc<FixtureInner>,
}

impl CaptureHandle for FixtureCaptureHandle {
    fn close(&mut self) {
        self.inner.channels.borrow_mut().take();
    }
}

impl Drop for FixtureCaptureHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::BufferPool;

    #[test]
    fn test_denied_backend_counts_request() {
        let backend = FixtureCaptureBackend::denied();
        let (capture, _analysis) = BufferPool::new(2, 64).split_for_threads();

        let result = backend.request_stream(capture);
        assert!(matches!(result, Err(SessionError::PermissionDenied)));
        assert_eq!(backend.requests(), 1);
        assert!(!backend.is_streaming());
    }

    #[test]
    fn test_feed_reaches_analysis_until_closed() {
        let backend = FixtureCaptureBackend::granted(48_000);
        let (capture, mut analysis) = BufferPool::new(4, 64).split_for_threads();

        assert_eq!(backend.feed(&[0.1; 10]), 0, "nothing accepted before grant");

        let mut stream = backend.request_stream(capture).unwrap();
        assert_eq!(stream.sample_rate, 48_000);
        assert_eq!(backend.feed(&[0.1; 10]), 10);
        assert_eq!(analysis.drain(|_| {}), 10);

        stream.handle.close();
        stream.handle.close();
        assert!(!backend.is_streaming());
        assert_eq!(backend.feed(&[0.1; 10]), 0);
    }
}
