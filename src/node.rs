//! Core node trait and context types.

use dasp_graph::Buffer;

/// Information available during audio processing.
///
/// Passed to every [`AudioNode::process`] call. Contains the graph's sample rate
/// and the buffer size (always 64 samples in the current implementation).
#[derive(Clone, Copy, Debug)]
pub struct ProcessContext {
    /// Sample rate of the graph in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,
    /// Number of samples per buffer (currently always 64)
    pub buffer_size: usize,
}

/// Unique identifier for a node within a graph.
///
/// Stable for the life of the node - unaffected by other nodes being
/// added or removed.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeId(pub(crate) u32);

/// The core trait for audio processing nodes.
///
/// Nodes can be:
/// - **Sources**: Generate audio (0 inputs, 1+ outputs) - sample players, live inputs
/// - **Effects**: Process audio (1+ inputs, 1+ outputs) - gain, channel routing
/// - **Sinks**: Consume audio (1+ inputs, 0 outputs) - device outputs, recorders, taps
///
/// # Ports
///
/// Each input and output port carries one mono [`Buffer`] per block. A stereo
/// link between two nodes is two port-indexed connections. When several
/// connections fan in to the same input port, the graph sums them before the
/// node runs, so `inputs[p]` is always the complete signal arriving at port `p`.
///
/// # Message-Based Parameters
///
/// Instead of shared mutable state, nodes receive parameter updates via messages.
/// Define your message type and handle it at the start of `process()`:
///
/// ```
/// use refrain::{AudioNode, ProcessContext};
/// use dasp_graph::Buffer;
///
/// enum MyMessage {
///     SetFrequency(f32),
///     SetVolume(f32),
/// }
///
/// struct MyOscillator {
///     frequency: f32,
///     volume: f32,
///     phase: f32,
/// }
///
/// impl AudioNode for MyOscillator {
///     type Message = MyMessage;
///
///     fn process(
///         &mut self,
///         ctx: &ProcessContext,
///         messages: impl Iterator<Item = MyMessage>,
///         _inputs: &[Buffer],
///         outputs: &mut [Buffer],
///     ) {
///         // Handle parameter updates first
///         for msg in messages {
///             match msg {
///                 MyMessage::SetFrequency(f) => self.frequency = f,
///                 MyMessage::SetVolume(v) => self.volume = v,
///             }
///         }
///
///         // Generate audio
///         for sample in outputs[0].iter_mut() {
///             *sample = (self.phase * std::f32::consts::TAU).sin() * self.volume;
///             self.phase = (self.phase + self.frequency / ctx.sample_rate as f32) % 1.0;
///         }
///     }
///
///     fn num_outputs(&self) -> usize { 1 }
/// }
/// ```
///
/// Nodes without runtime parameters use `()` as the message type.
pub trait AudioNode: Send + 'static {
    /// Message type for parameter updates.
    ///
    /// Use a custom enum for nodes with parameters, or `()` for nodes without.
    type Message: Send + 'static;

    /// Process one block of audio.
    ///
    /// Called once per audio block (64 samples). Your implementation should:
    /// 1. Drain and handle all pending messages
    /// 2. Read from `inputs` (one pre-summed buffer per input port)
    /// 3. Write to `outputs` (one buffer per output port)
    fn process(
        &mut self,
        ctx: &ProcessContext,
        messages: impl Iterator<Item = Self::Message>,
        inputs: &[Buffer],
        outputs: &mut [Buffer],
    );

    /// Number of input ports (0 for sources).
    fn num_inputs(&self) -> usize {
        0
    }

    /// Number of output ports.
    fn num_outputs(&self) -> usize {
        1
    }
}
