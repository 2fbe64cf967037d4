//! Channel merger routing junction.

use dasp_graph::Buffer;

use crate::node::{AudioNode, ProcessContext};

/// Merges individually wired channel ports back into a stereo signal.
///
/// Input port 0 becomes the left channel, port 1 the right. Fan-in summing
/// happens in the graph, so wiring two producers into the same merger port
/// mixes them - the vocal-cancellation topology relies on this to form
/// `left + (-right)` on both output channels.
pub struct ChannelMerger;

impl ChannelMerger {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ChannelMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioNode for ChannelMerger {
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
