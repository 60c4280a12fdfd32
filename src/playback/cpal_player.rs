//! Looping WAV player on the default CPAL output device

use std::cell::RefCell;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::audio::{read_wav_mono, WavClip};
use crate::error::TrackError;

use super::BackgroundTrack;

/// Background track decoded up front and looped forever.
///
/// Volume and loop count are shared with the output callback through atomics,
/// so `set_volume` never blocks the audio thread.
pub struct CpalTrackPlayer {
    clip: Arc<WavClip>,
    /// f32 gain stored as raw bits
    volume_bits: Arc<AtomicU32>,
    loops: Arc<AtomicU64>,
    stream: RefCell<Option<cpal::Stream>>,
}

impl CpalTrackPlayer {
    pub fn from_wav(path: &Path) -> Result<Self, TrackError> {
        let clip = read_wav_mono(path)?;
        if clip.samples.is_empty() {
            return Err(TrackError::DecodeFailed {
                path: path.display().to_string(),
                reason: "no samples".to_string(),
            });
        }
        log::info!(
            "[TrackPlayer] Loaded {} ({:.2}s @ {} Hz)",
            path.display(),
            clip.duration_secs(),
            clip.sample_rate
        );
        Ok(Self::from_clip(clip))
    }

    pub fn from_clip(clip: WavClip) -> Self {
        Self {
            clip: Arc::new(clip),
            volume_bits: Arc::new(AtomicU32::new(1.0f32.to_bits())),
            loops: Arc::new(AtomicU64::new(0)),
            stream: RefCell::new(None),
        }
    }

    fn build_stream(&self) -> Result<cpal::Stream, TrackError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(TrackError::NoOutputDevice)?;

        let config = device
            .default_output_config()
            .map_err(|e| TrackError::PlaybackFailed {
                reason: format!("Failed to get default output config: {:?}", e),
            })?;

        if config.sample_format() != cpal::SampleFormat::F32 {
            return Err(TrackError::PlaybackFailed {
                reason: format!(
                    "Only F32 output is supported (device offers {:?})",
                    config.sample_format()
                ),
            });
        }

        let stream_config: cpal::StreamConfig = config.into();
        let channels_count = stream_config.channels.max(1) as usize;
        let mut cursor = LoopCursor::new(self.clip.sample_rate, stream_config.sample_rate.0);

        let clip = Arc::clone(&self.clip);
        let volume_bits = Arc::clone(&self.volume_bits);
        let loops = Arc::clone(&self.loops);
        let err_fn = |err| log::error!("[TrackPlayer] Output stream error: {}", err);

        device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let gain = f32::from_bits(volume_bits.load(Ordering::Relaxed));
                    for frame in data.chunks_mut(channels_count) {
                        let (sample, wrapped) = cursor.advance(&clip.samples);
                        if wrapped {
                            loops.fetch_add(1, Ordering::Relaxed);
                        }
                        frame.fill(sample * gain);
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| TrackError::PlaybackFailed {
                reason: format!("{:?}", e),
            })
    }
}

impl BackgroundTrack for CpalTrackPlayer {
    fn play(&self) -> Result<(), TrackError> {
        let mut slot = self.stream.borrow_mut();
        if slot.is_some() {
            return Ok(());
        }

        let stream = self.build_stream()?;
        stream.play().map_err(|e| TrackError::PlaybackFailed {
            reason: format!("Output start failed: {}", e),
        })?;
        *slot = Some(stream);
        log::info!("[TrackPlayer] Playback started");
        Ok(())
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.volume_bits.store(volume.to_bits(), Ordering::Relaxed);
    }

    fn loops_completed(&self) -> u64 {
        self.loops.load(Ordering::Relaxed)
    }
}

/// Fractional read position with linear interpolation and wrap-around
struct LoopCursor {
    position: f64,
    step: f64,
}

impl LoopCursor {
    fn new(source_rate: u32, output_rate: u32) -> Self {
        Self {
            position: 0.0,
            step: source_rate as f64 / output_rate.max(1) as f64,
        }
    }

    /// Next interpolated sample and whether the loop wrapped to produce it
    fn advance(&mut self, samples: &[f32]) -> (f32, bool) {
        if samples.is_empty() {
            return (0.0, false);
        }

        let len = samples.len() as f64;
        let mut wrapped = false;
        if self.position >= len {
            self.position -= len;
            wrapped = true;
        }

        let idx = self.position as usize;
        let frac = (self.position - idx as f64) as f32;
        let next_idx = (idx + 1) % samples.len();
        let sample = (1.0 - frac) * samples[idx] + frac * samples[next_idx];

        self.position += self.step;
        (sample, wrapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_cursor_wraps_and_counts() {
        let samples = [0.0, 1.0, 0.0, -1.0];
        let mut cursor = LoopCursor::new(4, 4);

        let mut wraps = 0;
        let mut out = Vec::new();
        for _ in 0..9 {
            let (sample, wrapped) = cursor.advance(&samples);
            out.push(sample);
            wraps += wrapped as u32;
        }
        assert_eq!(&out[..5], &[0.0, 1.0, 0.0, -1.0, 0.0]);
        assert_eq!(wraps, 2);
    }

    #[test]
    fn test_loop_cursor_interpolates_when_upsampling() {
        let samples = [0.0, 1.0];
        let mut cursor = LoopCursor::new(1, 2);
        assert_eq!(cursor.advance(&samples).0, 0.0);
        assert!((cursor.advance(&samples).0 - 0.5).abs() < 1e-6);
        assert_eq!(cursor.advance(&samples).0, 1.0);
    }

    #[test]
    fn test_volume_is_clamped_without_a_device() {
        let player = CpalTrackPlayer::from_clip(WavClip {
            samples: vec![0.0; 16],
            sample_rate: 48_000,
        });
        assert_eq!(player.volume(), 1.0);
        player.set_volume(0.2);
        assert!((player.volume() - 0.2).abs() < 1e-6);
        player.set_volume(-3.0);
        assert_eq!(player.volume(), 0.0);
        assert_eq!(player.loops_completed(), 0);
    }
}
