//! Channel splitter routing junction.

use dasp_graph::Buffer;

use crate::node::{AudioNode, ProcessContext};

/// Splits a stereo signal into individually addressable channel ports.
///
/// Output port 0 is the left channel, port 1 the right. The node itself is a
/// pass-through; its purpose is giving downstream wiring a per-channel tap,
/// e.g. routing only the right channel through an inverter.
pub struct ChannelSplitter;

impl ChannelSplitter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ChannelSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioNode for ChannelSplitter {
    type Message = ();

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        inputs: &[Buffer],
        outputs: &mut [Buffer],
    ) {
        for (out, input) in outputs.iter_mut().zip(inputs.iter()) {
            out.copy_from_slice(input);
        }
    }

    #[inline]
    fn num_inputs(&self) -> usize {
        2
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        2
    }
}
