//! Live microphone source.

use dasp_graph::Buffer;
use rtrb::Consumer;

use crate::node::{AudioNode, ProcessContext};

/// A mono source fed by a live capture device.
///
/// The device callback (running on its own thread) pushes mono samples at the
/// graph rate into a ring buffer; this node pops one block per process call.
/// On underrun the remainder of the block is silence - a late capture thread
/// must never stall the graph.
pub struct MicSource {
    consumer: Consumer<f32>,
}

impl MicSource {
    pub fn new(consumer: Consumer<f32>) -> Self {
        Self { consumer }
    }
}

impl AudioNode for MicSource {
    type Message = ();

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        _inputs: &[Buffer],
        outputs: &mut [Buffer],
    ) {
        for sample in outputs[0].iter_mut() {
            *sample = self.consumer.pop().unwrap_or(0.0);
        }
    }

    #[inline]
    fn num_inputs(&self) -> usize {
        0
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtrb::RingBuffer;

    #[test]
    fn pops_available_samples_then_silence() {
        let (mut producer, consumer) = RingBuffer::new(16);
        for _ in 0..16 {
            producer.push(0.5).unwrap();
        }
        let mut mic = MicSource::new(consumer);
        let mut out = [Buffer::SILENT];
        let ctx = ProcessContext {
            sample_rate: 48_000,
            buffer_size: Buffer::LEN,
        };
        mic.process(&ctx, std::iter::empty(), &[], &mut out);

        assert!((out[0][15] - 0.5).abs() < 1e-6);
        assert_eq!(out[0][16], 0.0); // underrun tail
    }
}
