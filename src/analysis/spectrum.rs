// Spectrum module - byte magnitude spectra from a live sample stream
//
// The analyzer keeps the most recent `fft_size` samples of the (possibly
// filtered) capture stream. Each `sample()` call windows that history,
// runs a forward FFT and maps the smoothed magnitudes onto a 0-255 decibel
// scale. The classifier threshold is expressed on that scale.
//
// Per-bin pipeline:
//   |X[k]| / N  ->  tau * prev + (1 - tau) * mag  ->  20*log10  ->  0..=255

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

use crate::analysis::frame::SpectralFrame;
use crate::config::AnalyzerConfig;
use crate::error::SessionError;

/// Smallest transform window accepted
pub const MIN_FFT_SIZE: usize = 32;
/// Largest transform window accepted
pub const MAX_FFT_SIZE: usize = 32_768;

/// Produces one [`SpectralFrame`] per display tick.
pub struct SpectralAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    /// Blackman window (pre-computed)
    window: Vec<f32>,
    /// Circular history of the most recent `fft_size` samples
    history: Vec<f32>,
    write_pos: usize,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
    frame: SpectralFrame,
}

impl SpectralAnalyzer {
    /// Create an analyzer for the given tuning.
    ///
    /// # Errors
    /// `InvalidTuning` if the window size is not a power of two in
    /// `MIN_FFT_SIZE..=MAX_FFT_SIZE`, smoothing is outside `[0, 1)`, or the
    /// decibel range is empty.
    pub fn new(config: &AnalyzerConfig) -> Result<Self, SessionError> {
        config.validate()?;

        let fft_size = config.fft_size;
        let fft = FftPlanner::new().plan_fft_forward(fft_size);
        let scratch_len = fft.get_inplace_scratch_len();

        Ok(Self {
            fft,
            fft_size,
            window: blackman_window(fft_size),
            history: vec![0.0; fft_size],
            write_pos: 0,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            smoothed: vec![0.0; fft_size / 2],
            smoothing: config.smoothing_time_constant,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
            frame: SpectralFrame::silent(fft_size / 2),
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of bins in every produced frame (`fft_size / 2`)
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Append mono samples to the analysis history
    pub fn push_samples(&mut self, samples: &[f32]) {
        // Only the newest fft_size samples can influence the next frame
        let start = samples.len().saturating_sub(self.fft_size);
        for &sample in &samples[start..] {
            self.history[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % self.fft_size;
        }
    }

    /// Overwrite and return the current magnitude spectrum
    pub fn sample(&mut self) -> &SpectralFrame {
        // Oldest sample first so the window lines up with time order
        for i in 0..self.fft_size {
            let idx = (self.write_pos + i) % self.fft_size;
            self.buffer[i] = Complex::new(self.history[idx] * self.window[i], 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let norm = 1.0 / self.fft_size as f32;
        let range = self.max_decibels - self.min_decibels;
        let tau = self.smoothing;

        for (k, bin) in self.frame.bins_mut().iter_mut().enumerate() {
            let magnitude = self.buffer[k].norm() * norm;
            let mut smoothed = tau * self.smoothed[k] + (1.0 - tau) * magnitude;
            if !smoothed.is_finite() {
                smoothed = 0.0;
            }
            self.smoothed[k] = smoothed;

            *bin = if smoothed > 0.0 {
                let db = 20.0 * smoothed.log10();
                let scaled = 255.0 / range * (db - self.min_decibels);
                scaled.clamp(0.0, 255.0) as u8
            } else {
                0
            };
        }

        &self.frame
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * ALPHA;

    (0..size)
        .map(|i| {
            let x = i as f32 / size as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 48_000.0;

    fn analyzer_with(fft_size: usize, smoothing: f32) -> SpectralAnalyzer {
        SpectralAnalyzer::new(&AnalyzerConfig {
            fft_size,
            smoothing_time_constant: smoothing,
            ..AnalyzerConfig::default()
        })
        .unwrap()
    }

    fn bin_tone(bin: usize, fft_size: usize, amplitude: f32) -> Vec<f32> {
        let freq = bin as f32 * SAMPLE_RATE / fft_size as f32;
        (0..fft_size)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / SAMPLE_RATE).sin())
            .collect()
    }

    #[test]
    fn test_frame_has_half_window_bins() {
        let mut analyzer = analyzer_with(1024, 0.8);
        assert_eq!(analyzer.bin_count(), 512);
        assert_eq!(analyzer.sample().len(), 512);
    }

    #[test]
    fn test_silence_maps_to_zero() {
        let mut analyzer = analyzer_with(1024, 0.8);
        analyzer.push_samples(&vec![0.0; 2048]);
        assert!(analyzer.sample().bins().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_tone_peaks_at_its_bin() {
        let mut analyzer = analyzer_with(1024, 0.0);
        analyzer.push_samples(&bin_tone(40, 1024, 0.5));
        let frame = analyzer.sample();

        let (peak_bin, &peak) = frame
            .bins()
            .iter()
            .enumerate()
            .max_by_key(|(_, &v)| v)
            .unwrap();
        assert!((39..=41).contains(&peak_bin), "peak at bin {}", peak_bin);
        assert!(peak > 200, "peak byte {}", peak);
        assert!(frame.bins()[300] < 50, "far bin {}", frame.bins()[300]);
    }

    #[test]
    fn test_smoothing_decays_gradually() {
        // Quiet enough to sit inside the decibel range instead of clipping at 255
        let mut analyzer = analyzer_with(1024, 0.8);
        analyzer.push_samples(&bin_tone(40, 1024, 0.015));
        for _ in 0..30 {
            analyzer.sample();
        }
        let loud = analyzer.sample().bins()[40];

        analyzer.push_samples(&vec![0.0; 1024]);
        let first_quiet = analyzer.sample().bins()[40];
        assert!(first_quiet > 0 && first_quiet < loud);

        for _ in 0..200 {
            analyzer.sample();
        }
        assert_eq!(analyzer.sample().bins()[40], 0);
    }

    #[test]
    fn test_push_keeps_only_newest_window() {
        let mut analyzer = analyzer_with(64, 0.0);
        let mut samples = bin_tone(8, 64, 0.5);
        samples.extend(std::iter::repeat(0.0).take(64));
        analyzer.push_samples(&samples);
        assert!(analyzer.sample().bins().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_rejects_invalid_fft_size() {
        for size in [0, 16, 1000, 65_536] {
            let result = SpectralAnalyzer::new(&AnalyzerConfig {
                fft_size: size,
                ..AnalyzerConfig::default()
            });
            assert!(
                matches!(result, Err(SessionError::InvalidTuning { .. })),
                "size {} should be rejected",
                size
            );
        }
    }
}
