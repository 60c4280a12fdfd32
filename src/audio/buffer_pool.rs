// BufferPool - lock-free buffer pool with dual SPSC queues
//
// Carries captured microphone PCM from the capture callback to the session's
// analysis step without allocating on the capture thread. Two lock-free SPSC
// ring buffers circulate a fixed set of pre-allocated buffers.
//
// Buffer flow:
// 1. Capture side pops an empty buffer from POOL_QUEUE
// 2. Capture side fills it with mono samples
// 3. Capture side pushes it to DATA_QUEUE
// 4. Analysis side pops filled buffers from DATA_QUEUE, filters and analyzes them
// 5. Analysis side pushes the emptied buffer back to POOL_QUEUE

use rtrb::{Consumer, Producer};

/// Audio buffer type - pre-allocated vector of f32 samples
pub type AudioBuffer = Vec<f32>;

/// All four queue endpoints, before they are split between the two sides
pub struct BufferPoolChannels {
    /// Producer for sending filled audio buffers to analysis
    pub data_producer: Producer<AudioBuffer>,
    /// Consumer for receiving filled audio buffers in analysis
    pub data_consumer: Consumer<AudioBuffer>,
    /// Producer for returning empty buffers from analysis
    pub pool_producer: Producer<AudioBuffer>,
    /// Consumer for retrieving empty buffers on the capture side
    pub pool_consumer: Consumer<AudioBuffer>,
}

/// Endpoints owned by the capture callback
pub struct CaptureChannels {
    pub data_producer: Producer<AudioBuffer>,
    pub pool_consumer: Consumer<AudioBuffer>,
}

/// Endpoints owned by the analysis step
pub struct AnalysisChannels {
    pub data_consumer: Consumer<AudioBuffer>,
    pub pool_producer: Producer<AudioBuffer>,
}

impl BufferPoolChannels {
    /// Split into the capture-side and analysis-side halves
    pub fn split_for_threads(self) -> (CaptureChannels, AnalysisChannels) {
        (
            CaptureChannels {
                data_producer: self.data_producer,
                pool_consumer: self.pool_consumer,
            },
            AnalysisChannels {
                data_consumer: self.data_consumer,
                pool_producer: self.pool_producer,
            },
        )
    }
}

impl CaptureChannels {
    /// Copy `samples` into pooled buffers and hand them to analysis.
    ///
    /// Returns the number of samples that could not be delivered because the
    /// pool ran dry (analysis fell behind). Never allocates.
    pub fn push_samples(&mut self, samples: &[f32]) -> usize {
        let mut remaining = samples;
        while !remaining.is_empty() {
            let Ok(mut buffer) = self.pool_consumer.pop() else {
                return remaining.len();
            };
            let take = remaining.len().min(buffer.capacity());
            buffer.clear();
            buffer.extend_from_slice(&remaining[..take]);
            remaining = &remaining[take..];

            if self.data_producer.push(buffer).is_err() {
                return remaining.len() + take;
            }
        }
        0
    }
}

impl AnalysisChannels {
    /// Visit every filled buffer in arrival order, then recycle it
    pub fn drain<F>(&mut self, mut visit: F) -> usize
    where
        F: FnMut(&mut AudioBuffer),
    {
        let mut drained = 0;
        while let Ok(mut buffer) = self.data_consumer.pop() {
            drained += buffer.len();
            visit(&mut buffer);
            buffer.clear();
            let _ = self.pool_producer.push(buffer);
        }
        drained
    }
}

/// Lock-free buffer pool using dual SPSC ring buffers
///
/// Pre-allocates a fixed number of audio buffers and manages them through
/// two lock-free queues. All heap allocation happens here, so the capture
/// callback stays allocation-free.
///
/// # Example
/// ```ignore
/// let (mut capture, mut analysis) = BufferPool::new(16, 2048).split_for_threads();
/// capture.push_samples(&mic_block);
/// analysis.drain(|buffer| analyzer.push_samples(buffer));
/// ```
pub struct BufferPool;

impl BufferPool {
    /// Create a new BufferPool with specified buffer count and size
    ///
    /// # Panics
    /// Panics if buffer_count is 0 or buffer_size is 0
    #[allow(clippy::new_ret_no_self)]
    pub fn new(buffer_count: usize, buffer_size: usize) -> BufferPoolChannels {
        assert!(buffer_count > 0, "buffer_count must be greater than 0");
        assert!(buffer_size > 0, "buffer_size must be greater than 0");

        let (mut pool_producer, pool_consumer) = rtrb::RingBuffer::new(buffer_count);
        let (data_producer, data_consumer) = rtrb::RingBuffer::new(buffer_count);

        // This is the only place where heap allocation occurs
        for _ in 0..buffer_count {
            let buffer: AudioBuffer = Vec::with_capacity(buffer_size);
            if pool_producer.push(buffer).is_err() {
                break;
            }
        }

        BufferPoolChannels {
            data_producer,
            data_consumer,
            pool_producer,
            pool_consumer,
        }
    }
}
