//! Ring-buffer output sink.

use dasp_graph::Buffer;
use rtrb::Producer;

use crate::node::{AudioNode, ProcessContext};

/// A sink that writes interleaved samples into an [`rtrb`] ring buffer.
///
/// Useful for bridging graph output to another thread, or as a deterministic
/// stand-in for a device sink in tests. If the ring buffer is full the block
/// is dropped rather than partially written.
pub struct RtrbSink {
    buffer: Producer<f32>,
    channels: usize,
}

impl RtrbSink {
    pub fn new(buffer: Producer<f32>, channels: usize) -> Self {
        assert!(channels > 0, "RtrbSink requires at least one channel");
        Self { buffer, channels }
    }

    /// Single-channel sink.
    pub fn mono(buffer: Producer<f32>) -> Self {
        Self::new(buffer, 1)
    }

    /// Two-channel sink, interleaving L/R frames.
    pub fn stereo(buffer: Producer<f32>) -> Self {
        Self::new(buffer, 2)
    }
}

impl AudioNode for RtrbSink {
    type Message = ();

    fn process(
        &mut self,
        ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        inputs: &[Buffer],
        _outputs: &mut [Buffer],
    ) {
        if inputs.is_empty() {
            return;
        }

        let samples_needed = ctx.buffer_size * self.channels;
        if self.buffer.slots() < samples_needed {
            return;
        }

        for i in 0..ctx.buffer_size {
            for ch in 0..self.channels {
                let src = ch.min(inputs.len() - 1);
                let _ = self.buffer.push(inputs[src][i]);
            }
        }
    }

    #[inline]
    fn num_inputs(&self) -> usize {
        self.channels
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        0
    }
}
