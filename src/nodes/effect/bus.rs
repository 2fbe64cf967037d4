//! Program bus - the convergence point of all program audio.

use dasp_graph::Buffer;

use crate::node::{AudioNode, ProcessContext};

/// Messages to control the bus
#[derive(Clone, Copy, Debug)]
pub enum BusMessage {
    /// Set the master gain applied to everything passing through the bus
    SetGain(f32),
}

/// The program bus: a stereo summing pass with a master gain.
///
/// Whichever topology is active upstream, all program audio converges here
/// before fanning out to the device output, the analysis tap, and the capture
/// mix. The bus node's identity never changes across topology switches - only
/// its upstream wiring does.
pub struct Bus {
    gain: f32,
}

impl Bus {
    /// Create a stereo bus at unity gain.
    pub fn stereo() -> Self {
        Self { gain: 1.0 }
    }
}

impl AudioNode for Bus {
    type Message = BusMessage;

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        messages: impl Iterator<Item = BusMessage>,
        inputs: &[Buffer],
        outputs: &mut [Buffer],
    ) {
        for msg in messages {
            match msg {
                BusMessage::SetGain(g) => self.gain = g.clamp(0.0, 2.0),
            }
        }

        let gain = self.gain;
        for (out, input) in outputs.iter_mut().zip(inputs.iter()) {
            for (out_sample, &in_sample) in out.iter_mut().zip(input.iter()) {
                *out_sample = in_sample * gain;
            }
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
