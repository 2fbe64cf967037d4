//! Built-in audio nodes.
//!
//! Nodes are organized into three categories:
//!
//! ## Sources ([`source`])
//!
//! Generate audio with no audio inputs:
//! - [`SamplePlayer`] - Play pre-decoded program audio with a published playhead
//! - [`MicSource`] - Read live microphone samples from a ring buffer
//!
//! ## Effects ([`effect`])
//!
//! Process audio (inputs → outputs):
//! - [`Gain`] - Volume control with smoothing (an inverting gain drives vocal cancellation)
//! - [`ChannelSplitter`] - Break a stereo link into per-channel connections
//! - [`ChannelMerger`] - Reassemble per-channel connections into a stereo link
//! - [`Bus`] - Summing junction ahead of the outputs
//!
//! ## Sinks ([`sink`])
//!
//! Consume audio with no audio outputs:
//! - [`CpalSink`] - Output to system audio device
//! - [`RtrbSink`] - Write interleaved frames to a ring buffer
//! - [`CaptureSink`] - Armable recording capture point
//! - [`AnalyserNode`] - Feed an [`AnalysisTap`] for visualization
//!
//! # Message Types
//!
//! Most nodes have associated message types for runtime parameter control:
//! - [`PlayerMessage`] - Control [`SamplePlayer`] playback (play/pause/seek)
//! - [`GainMessage`] - Control [`Gain`] level
//! - [`BusMessage`] - Control [`Bus`] gain
//! - [`CaptureMessage`] - Arm and disarm [`CaptureSink`]
//!
//! Nodes without parameters (like [`ChannelSplitter`]) use `()` as their message type.

pub mod source;
pub mod effect;
pub mod sink;

// Re-export common types at the top level for convenience
pub use source::{SamplePlayer, PlayerMessage, ProgramAudio, MicSource};
pub use effect::{Gain, GainMessage, ChannelSplitter, ChannelMerger, Bus, BusMessage};
pub use sink::{CpalSink, RtrbSink, CaptureSink, CaptureMessage, AnalyserNode, AnalysisTap};
