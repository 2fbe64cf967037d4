//! Engine tunables.

/// Configuration for a [`Refrain`](crate::Refrain) engine.
///
/// The defaults match the reference behavior of the system this engine was
/// built for and are sensible for 44.1/48 kHz stereo program material.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Gain applied to the microphone before it enters the capture mix.
    ///
    /// Defaults to 1.5: a voice close to the mic still tends to sit under
    /// mastered program audio, so the mic path gets a small boost.
    pub mic_boost: f32,

    /// FFT size of the analysis tap. Must be a power of two.
    ///
    /// Defaults to 256, giving 129 spectrum bins - coarse, but cheap enough
    /// to poll every visual frame.
    pub fft_size: usize,

    /// Frames per recording chunk. The recorder worker cuts a chunk whenever
    /// this many frames have accumulated. Defaults to 4096 (~85 ms at 48 kHz).
    pub chunk_frames: usize,

    /// Capacity (in stereo frames) of the ring buffer between the capture
    /// sink and the recorder worker. Defaults to 262144 frames (~5.5 s at
    /// 48 kHz), enough that a briefly stalled worker never drops audio.
    pub capture_ring_frames: usize,

    /// Capacity (in mono frames) of the microphone ring buffer.
    /// Defaults to 48000 (1 s at 48 kHz).
    pub mic_ring_frames: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mic_boost: 1.5,
            fft_size: 256,
            chunk_frames: 4096,
            capture_ring_frames: 1 << 18,
            mic_ring_frames: 48_000,
        }
    }
}

impl EngineConfig {
    /// Set the microphone boost factor.
    pub fn with_mic_boost(mut self, boost: f32) -> Self {
        self.mic_boost = boost;
        self
    }

    /// Set the analysis FFT size (power of two).
    pub fn with_fft_size(mut self, fft_size: usize) -> Self {
        debug_assert!(fft_size.is_power_of_two());
        self.fft_size = fft_size;
        self
    }

    /// Set the recording chunk size in frames.
    pub fn with_chunk_frames(mut self, frames: usize) -> Self {
        self.chunk_frames = frames.max(1);
        self
    }
}
