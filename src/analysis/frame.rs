//! Spectral frame and sub-band window types shared by the analyzer and
//! the blow classifier.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// One transform window's byte magnitude spectrum (0-255 per bin).
///
/// The analyzer overwrites the same frame on every call; callers must not
/// hold on to it across ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpectralFrame {
    bins: Vec<u8>,
}

impl SpectralFrame {
    /// All-zero frame with `bin_count` bins
    pub fn silent(bin_count: usize) -> Self {
        Self {
            bins: vec![0; bin_count],
        }
    }

    /// Frame with every bin set to `value`
    pub fn filled(bin_count: usize, value: u8) -> Self {
        Self {
            bins: vec![value; bin_count],
        }
    }

    pub fn from_bins(bins: Vec<u8>) -> Self {
        Self { bins }
    }

    pub fn bins(&self) -> &[u8] {
        &self.bins
    }

    pub(crate) fn bins_mut(&mut self) -> &mut [u8] {
        &mut self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

/// Half-open bin range `[lo, hi)` considered blow-relevant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubBandWindow {
    pub lo: usize,
    pub hi: usize,
}

impl Default for SubBandWindow {
    /// Lowest 50 bins, the widest window observed in practice
    fn default() -> Self {
        Self { lo: 0, hi: 50 }
    }
}

impl SubBandWindow {
    pub fn new(lo: usize, hi: usize) -> Self {
        Self { lo, hi }
    }

    pub fn width(&self) -> usize {
        self.hi.saturating_sub(self.lo)
    }

    /// Check the window is non-empty and fits inside `bin_count` bins
    pub fn validate(&self, bin_count: usize) -> Result<(), SessionError> {
        if self.lo >= self.hi {
            return Err(SessionError::InvalidTuning {
                field: "detector.sub_band".to_string(),
                reason: format!("empty window [{}, {})", self.lo, self.hi),
            });
        }
        if self.hi > bin_count {
            return Err(SessionError::InvalidTuning {
                field: "detector.sub_band".to_string(),
                reason: format!(
                    "window end {} exceeds spectrum of {} bins",
                    self.hi, bin_count
                ),
            });
        }
        Ok(())
    }

    /// Root-mean-square magnitude over the window.
    ///
    /// Bins beyond the end of `frame` are ignored; an empty selection yields 0.
    pub fn rms(&self, frame: &SpectralFrame) -> f32 {
        let end = self.hi.min(frame.len());
        if self.lo >= end {
            return 0.0;
        }

        let slice = &frame.bins()[self.lo..end];
        let sum_squares: f32 = slice.iter().map(|&v| (v as f32) * (v as f32)).sum();
        (sum_squares / slice.len() as f32).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_of_constant_window() {
        let frame = SpectralFrame::filled(512, 70);
        let window = SubBandWindow::new(0, 50);
        assert!((window.rms(&frame) - 70.0).abs() < 1e-4);
    }

    #[test]
    fn test_rms_only_reads_selected_bins() {
        let mut bins = vec![0u8; 512];
        for bin in bins.iter_mut().take(20) {
            *bin = 3;
        }
        for bin in bins.iter_mut().skip(20).take(20) {
            *bin = 4;
        }
        let frame = SpectralFrame::from_bins(bins);

        // sqrt((20*9 + 20*16) / 40) = sqrt(12.5)
        let rms = SubBandWindow::new(0, 40).rms(&frame);
        assert!((rms - 12.5_f32.sqrt()).abs() < 1e-4);

        assert_eq!(SubBandWindow::new(100, 200).rms(&frame), 0.0);
    }

    #[test]
    fn test_rms_clamps_to_frame_length() {
        let frame = SpectralFrame::filled(16, 10);
        assert!((SubBandWindow::new(8, 64).rms(&frame) - 10.0).abs() < 1e-4);
        assert_eq!(SubBandWindow::new(32, 64).rms(&frame), 0.0);
    }

    #[test]
    fn test_validate_window_bounds() {
        assert!(SubBandWindow::new(0, 50).validate(512).is_ok());
        assert!(SubBandWindow::new(20, 20).validate(512).is_err());
        assert!(SubBandWindow::new(30, 10).validate(512).is_err());
        assert!(SubBandWindow::new(0, 513).validate(512).is_err());
    }
}
