// Audio module - lock-free capture transport and sample conversion

pub mod buffer_pool;
pub mod downmix;
pub mod wav;

// Re-export commonly used types for convenience
pub use buffer_pool::{
    AnalysisChannels, AudioBuffer, BufferPool, BufferPoolChannels, CaptureChannels,
};
pub use downmix::append_downmixed;
pub use wav::{read_wav_mono, write_wav_mono, WavClip};
