//! CPAL-based microphone backend for desktop platforms (Linux, macOS, Windows)
//!
//! Opens the default input device, downmixes each callback block to mono and
//! pushes it into the capture half of the buffer pool.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::audio::{append_downmixed, CaptureChannels};
use crate::error::SessionError;

use super::{CaptureBackend, CaptureHandle, CaptureStream};

/// Pre-allocated mono scratch per callback (covers typical device periods)
const SCRATCH_CAPACITY: usize = 8192;

/// Microphone capture via the default CPAL host
#[derive(Default)]
pub struct CpalCaptureBackend {
    _unit: (),
}

impl CpalCaptureBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

struct CpalCaptureHandle {
    stream: Option<cpal::Stream>,
}

impl CaptureHandle for CpalCaptureHandle {
    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                log::warn!("[CpalCapture] Failed to pause input stream: {}", err);
            }
            drop(stream);
            log::info!("[CpalCapture] Input stream released");
        }
    }
}

impl Drop for CpalCaptureHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl CaptureBackend for CpalCaptureBackend {
    fn request_stream(&self, channels: CaptureChannels) -> Result<CaptureStream, SessionError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| SessionError::StreamOpenFailed {
                reason: "No default input device found".to_string(),
            })?;

        let config = device
            .default_input_config()
            .map_err(|e| SessionError::StreamOpenFailed {
                reason: format!("Failed to get default input config: {:?}", e),
            })?;

        let sample_rate = config.sample_rate().0;
        let stream_config: cpal::StreamConfig = config.clone().into();

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                build_input::<f32, _>(&device, &stream_config, channels, |s| s)
            }
            cpal::SampleFormat::I16 => {
                build_input::<i16, _>(&device, &stream_config, channels, |s| {
                    s as f32 / i16::MAX as f32
                })
            }
            cpal::SampleFormat::U16 => {
                build_input::<u16, _>(&device, &stream_config, channels, |s| {
                    (s as f32 - 32_768.0) / 32_768.0
                })
            }
            other => {
                return Err(SessionError::StreamOpenFailed {
                    reason: format!("Unsupported input sample format {:?}", other),
                })
            }
        }?;

        stream.play().map_err(|e| SessionError::StreamOpenFailed {
            reason: format!("Input start failed: {}", e),
        })?;

        log::info!(
            "[CpalCapture] Input stream opened: {} Hz, {} channel(s)",
            sample_rate,
            stream_config.channels
        );

        Ok(CaptureStream {
            sample_rate,
            handle: Box::new(CpalCaptureHandle {
                stream: Some(stream),
            }),
        })
    }
}

fn build_input<T, F>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut channels: CaptureChannels,
    convert: F,
) -> Result<cpal::Stream, SessionError>
where
    T: cpal::SizedSample + Send + 'static,
    F: Fn(T) -> f32 + Send + 'static,
{
    let channel_count = config.channels as usize;
    let mut scratch: Vec<f32> = Vec::with_capacity(SCRATCH_CAPACITY);
    let err_fn = |err| log::error!("[CpalCapture] Input stream error: {}", err);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                scratch.clear();
                append_downmixed(&mut scratch, data, channel_count, &convert);
                // Dropped samples mean analysis fell behind; the next frame
                // simply sees a slightly older window.
                let _ = channels.push_samples(&scratch);
            },
            err_fn,
            None,
        )
        .map_err(build_stream_error)
}

/// A vanished device is a hardware failure, not a refused consent
fn build_stream_error(err: cpal::BuildStreamError) -> SessionError {
    SessionError::StreamOpenFailed {
        reason: format!("{:?}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_device_is_not_permission_denied() {
        let err = build_stream_error(cpal::BuildStreamError::DeviceNotAvailable);
        assert!(matches!(err, SessionError::StreamOpenFailed { .. }));
        assert!(err.to_string().contains("DeviceNotAvailable"));
    }

    #[test]
    fn test_unsupported_config_is_stream_failure() {
        let err = build_stream_error(cpal::BuildStreamError::StreamConfigNotSupported);
        assert!(matches!(err, SessionError::StreamOpenFailed { .. }));
    }
}
