//! WAV decoding for background tracks and offline fixtures

use std::path::Path;

use crate::error::TrackError;

use super::append_downmixed;

/// Decoded mono PCM
#[derive(Debug, Clone, PartialEq)]
pub struct WavClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl WavClip {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Read a WAV file and downmix it to mono f32 in [-1, 1]
pub fn read_wav_mono(path: &Path) -> Result<WavClip, TrackError> {
    let decode_err = |reason: String| TrackError::DecodeFailed {
        path: path.display().to_string(),
        reason,
    };

    let mut reader = hound::WavReader::open(path)
        .map_err(|err| decode_err(format!("failed to open: {err}")))?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(decode_err("zero channels".to_string()));
    }

    let interleaved = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<f32>, _>>()
            .map_err(|err| decode_err(err.to_string()))?,
        hound::SampleFormat::Int => match spec.bits_per_sample {
            16 => reader
                .samples::<i16>()
                .map(|sample| sample.map(|v| v as f32 / i16::MAX as f32))
                .collect::<Result<Vec<f32>, _>>()
                .map_err(|err| decode_err(err.to_string()))?,
            bits @ (24 | 32) => {
                let scale = (1i64 << (bits - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<f32>, _>>()
                    .map_err(|err| decode_err(err.to_string()))?
            }
            bits => {
                return Err(decode_err(format!("unsupported bits_per_sample={bits}")));
            }
        },
    };

    let channels = spec.channels as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        let mut mono = Vec::with_capacity(interleaved.len() / channels);
        append_downmixed(&mut mono, &interleaved, channels, |s: f32| s);
        mono
    };

    log::debug!(
        "[Wav] Decoded {}: {} samples @ {} Hz",
        path.display(),
        samples.len(),
        spec.sample_rate
    );

    Ok(WavClip {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Write mono f32 PCM as 16-bit WAV
pub fn write_wav_mono(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), TrackError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value)?;
    }
    writer.finalize()?;
    Ok(())
}
