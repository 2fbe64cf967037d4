//! Recording capture sink.

use dasp_graph::Buffer;
use rtrb::Producer;

use crate::node::{AudioNode, ProcessContext};

/// Control messages for [`CaptureSink`].
pub enum CaptureMessage {
    /// Arm the sink, routing interleaved samples into the given ring buffer.
    Start(Producer<f32>),
    /// Disarm the sink and drop the ring buffer handle.
    Stop,
}

/// A sink that captures the mix for recording.
///
/// Stays in the graph permanently so the recorded blend always matches what
/// the listener hears, but only writes samples while armed. Arming hands the
/// sink a fresh ring buffer producer; the encoder thread owns the consumer.
pub struct CaptureSink {
    channels: usize,
    buffer: Option<Producer<f32>>,
}

impl CaptureSink {
    pub fn new(channels: usize) -> Self {
        assert!(channels > 0, "CaptureSink requires at least one channel");
        Self {
            channels,
            buffer: None,
        }
    }

    /// Two-channel capture point.
    pub fn stereo() -> Self {
        Self::new(2)
    }
}

impl AudioNode for CaptureSink {
    type Message = CaptureMessage;

    fn process(
        &mut self,
        ctx: &ProcessContext,
        messages: impl Iterator<Item = CaptureMessage>,
        inputs: &[Buffer],
        _outputs: &mut [Buffer],
    ) {
        for msg in messages {
            match msg {
                CaptureMessage::Start(producer) => self.buffer = Some(producer),
                CaptureMessage::Stop => self.buffer = None,
            }
        }

        let Some(buffer) = self.buffer.as_mut() else {
            return;
        };
        if inputs.is_empty() {
            return;
        }

        // A stalled drain worker means a full ring; drop the whole block so
        // the interleaved stream never loses half a frame and shifts every
        // later sample into the wrong channel
        if buffer.slots() < ctx.buffer_size * self.channels {
            tracing::warn!("capture ring full, dropping block");
            return;
        }

        for i in 0..ctx.buffer_size {
            for ch in 0..self.channels {
                let src = ch.min(inputs.len() - 1);
                let _ = buffer.push(inputs[src][i]);
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
