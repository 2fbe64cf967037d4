//! Refrain - the audio routing and mixing core of a karaoke session.
//!
//! One program source, a switchable routing topology, an optional live
//! microphone, and a recordable capture mix, evaluated as a port-indexed
//! signal graph one 64-sample block at a time.
//!
//! Design principles:
//! - Each engine has a fixed sample rate (from device or explicit)
//! - Nodes receive parameters via message ring buffers, not shared state
//! - No locks on the audio thread; cross-thread state is atomics and rings
//! - Topology switches are synchronous and complete: tear down, rewire, done
//! - The microphone feeds the recorded blend only, never the device output
//!
//! # Quick start
//!
//! ```no_run
//! use refrain::{Refrain, ProgramAudio};
//!
//! let mut engine = Refrain::default_output().expect("no audio device");
//!
//! // Decoded interleaved stereo PCM from whatever container you use
//! let program = ProgramAudio::new(vec![0.0; 96_000], 2, 48_000);
//! engine.initialize(program).unwrap();
//!
//! engine.set_vocal_cancellation(true).unwrap();
//! engine.start_recording().unwrap();
//!
//! // Pump the graph (pace against the sink in a real host)
//! for _ in 0..1000 {
//!     engine.process();
//! }
//!
//! let recording = engine.stop_recording().unwrap().wait().unwrap();
//! recording.save("take.wav").unwrap();
//! ```

mod config;
mod device;
mod engine;
mod error;
mod graph;
mod node;
pub mod nodes;
mod recorder;

pub use config::EngineConfig;
pub use device::{open_microphone, CpalDevice, InputTrack, MicInput};
pub use engine::{GraphNodes, Refrain, Topology};
pub use error::EngineError;
pub use graph::Connection;
pub use node::{AudioNode, NodeId, ProcessContext};
pub use nodes::ProgramAudio;
pub use recorder::{FinalizeHandle, Recording, RecordingState};
