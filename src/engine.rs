//! The engine: session state, topology switching, and the control surface.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::device::{open_microphone, InputTrack, MicInput};
use crate::error::EngineError;
use crate::graph::{AudioGraph, Connection, Handle};
use crate::node::{AudioNode, NodeId};
use crate::nodes::source::PlayerShared;
use crate::nodes::{
    AnalyserNode, AnalysisTap, Bus, CaptureMessage, CaptureSink, ChannelMerger, ChannelSplitter,
    Gain, MicSource, PlayerMessage, ProgramAudio, SamplePlayer,
};
use crate::recorder::{spawn_drain_worker, ActiveRecording, FinalizeHandle, RecordingState};

/// The two routing modes for program audio.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Topology {
    /// Source feeds the program bus directly.
    Direct,
    /// Source runs through the split/invert/merge network, suppressing
    /// content mixed identically into both channels.
    VocalCancelled,
}

/// Node ids of the fixed program graph, for wiring introspection.
#[derive(Clone, Copy, Debug)]
pub struct GraphNodes {
    pub source: NodeId,
    pub splitter: NodeId,
    pub inverter: NodeId,
    pub merger: NodeId,
    pub bus: NodeId,
    pub analyser: NodeId,
    pub capture: NodeId,
}

/// Everything created by [`Refrain::initialize`]: the fixed node set, the
/// control handles into the audio thread, and the shared playhead.
struct Program {
    nodes: GraphNodes,
    player: Handle<PlayerMessage>,
    capture_ctl: Handle<CaptureMessage>,
    state: Arc<PlayerShared>,
    tap: AnalysisTap,
}

struct MicSession {
    source: NodeId,
    gain: NodeId,
    track: Box<dyn InputTrack>,
}

/// A karaoke audio session: one program source, a switchable routing
/// topology, an optional live microphone, and a recordable capture mix.
///
/// All methods run on the control thread; the audio graph itself is advanced
/// by calling [`process`](Self::process) (typically from a loop paced by the
/// output sink's consumption).
///
/// ```no_run
/// use refrain::{Refrain, ProgramAudio};
///
/// let mut engine = Refrain::default_output().expect("no audio device");
/// let program = ProgramAudio::new(vec![0.0; 96_000], 2, 48_000);
/// engine.initialize(program).unwrap();
///
/// engine.set_vocal_cancellation(true).unwrap();
/// engine.play();
/// loop {
///     engine.process();
/// }
/// ```
pub struct Refrain {
    graph: AudioGraph,
    config: EngineConfig,
    output: Option<NodeId>,
    program: Option<Program>,
    mic: Option<MicSession>,
    recording: Option<ActiveRecording>,
    topology: Topology,
}

impl Refrain {
    /// Create an engine at the given sample rate with no output sink yet.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            graph: AudioGraph::new(sample_rate),
            config: EngineConfig::default(),
            output: None,
            program: None,
            mic: None,
            recording: None,
            topology: Topology::Direct,
        }
    }

    /// Create an engine wired to the system's default output device, at that
    /// device's native sample rate.
    pub fn default_output() -> Result<Self, EngineError> {
        let device = crate::CpalDevice::default_output().ok_or(EngineError::NoOutputDevice)?;
        tracing::info!(
            device = device.name(),
            rate = device.sample_rate(),
            "using default output device"
        );
        Ok(Self::new(device.sample_rate()).with_output(device.create_sink()))
    }

    /// Attach an output sink node. The sink receives the program bus's
    /// stereo output once [`initialize`](Self::initialize) has run.
    pub fn with_output<N: AudioNode>(mut self, sink: N) -> Self {
        let handle = self.graph.add(sink);
        self.output = Some(handle.id());
        self
    }

    /// Replace the default configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.graph.sample_rate()
    }

    /// Build the fixed program graph for the given media.
    ///
    /// Creates every node of the session exactly once (source, splitter,
    /// inverter, merger, program bus, analyser, capture sink) and wires the
    /// initial [`Topology::Direct`] routing:
    /// source → bus → {output, analyser, capture}.
    ///
    /// Idempotent: calling again on an initialized engine is a no-op, so
    /// lazy-initializing callers cannot double-create the source node.
    pub fn initialize(&mut self, program: ProgramAudio) -> Result<(), EngineError> {
        if self.program.is_some() {
            tracing::debug!("initialize: already initialized, ignoring");
            return Ok(());
        }
        let output = self
            .output
            .ok_or(EngineError::InvalidState("engine has no output sink"))?;

        let player = SamplePlayer::new(program);
        let state = player.shared();

        let source = self.graph.add(player);
        let splitter = self.graph.add(ChannelSplitter::new());
        let inverter = self.graph.add(Gain::mono(-1.0));
        let merger = self.graph.add(ChannelMerger::new());
        let bus = self.graph.add(Bus::stereo());
        let (analyser_node, tap) = AnalyserNode::new(self.config.fft_size);
        let analyser = self.graph.add(analyser_node);
        let capture_ctl = self.graph.add(CaptureSink::stereo());

        let nodes = GraphNodes {
            source: source.id(),
            splitter: splitter.id(),
            inverter: inverter.id(),
            merger: merger.id(),
            bus: bus.id(),
            analyser: analyser.id(),
            capture: capture_ctl.id(),
        };

        self.program = Some(Program {
            nodes,
            player: source,
            capture_ctl,
            state,
            tap,
        });
        self.topology = Topology::Direct;
        self.wire_topology(nodes, Topology::Direct, output);
        tracing::info!("program graph initialized");
        Ok(())
    }

    /// Switch between direct playback and phase-cancellation routing.
    ///
    /// Tears down every edge touching the source, splitter, inverter,
    /// merger, and bus, then rebuilds the requested topology in full,
    /// including the bus's three permanent downstream edges. Synchronous:
    /// when this returns, exactly one topology's edges exist.
    pub fn set_vocal_cancellation(&mut self, enabled: bool) -> Result<(), EngineError> {
        let Some(program) = self.program.as_ref() else {
            return Err(EngineError::InvalidState(
                "topology switch before initialization",
            ));
        };
        let nodes = program.nodes;
        let output = self
            .output
            .ok_or(EngineError::InvalidState("engine has no output sink"))?;

        let topology = if enabled {
            Topology::VocalCancelled
        } else {
            Topology::Direct
        };
        self.wire_topology(nodes, topology, output);
        self.topology = topology;
        tracing::info!(?topology, "topology switched");
        Ok(())
    }

    fn wire_topology(&mut self, nodes: GraphNodes, topology: Topology, output: NodeId) {
        let g = &mut self.graph;

        g.disconnect_all(nodes.source);
        g.disconnect_all(nodes.splitter);
        g.disconnect_all(nodes.inverter);
        g.disconnect_all(nodes.merger);
        g.disconnect_all(nodes.bus);

        match topology {
            Topology::Direct => {
                g.connect(nodes.source, nodes.bus);
            }
            Topology::VocalCancelled => {
                g.connect(nodes.source, nodes.splitter);
                // Left channel duplicated into both merger inputs
                g.connect_port(nodes.splitter, 0, nodes.merger, 0);
                g.connect_port(nodes.splitter, 0, nodes.merger, 1);
                // Right channel inverted, then summed into both merger
                // inputs by graph fan-in: each channel becomes left - right
                g.connect_port(nodes.splitter, 1, nodes.inverter, 0);
                g.connect_port(nodes.inverter, 0, nodes.merger, 0);
                g.connect_port(nodes.inverter, 0, nodes.merger, 1);
                g.connect(nodes.merger, nodes.bus);
            }
        }

        // The bus fan-out is permanent across topology switches
        g.connect(nodes.bus, output);
        g.connect(nodes.bus, nodes.analyser);
        g.connect(nodes.bus, nodes.capture);
    }

    pub fn is_vocal_cancelled(&self) -> bool {
        self.topology == Topology::VocalCancelled
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    /// Open the default microphone and wire it into the capture mix.
    ///
    /// The microphone reaches only the recorded blend, never the device
    /// output, so the singer hears the room rather than a delayed echo.
    ///
    /// # Errors
    ///
    /// Fails with [`EngineError::InvalidState`] if the engine is not
    /// initialized or a microphone is already attached, and passes through
    /// device errors from [`open_microphone`].
    pub fn attach_microphone(&mut self) -> Result<(), EngineError> {
        if self.program.is_none() {
            return Err(EngineError::InvalidState(
                "microphone attach before initialization",
            ));
        }
        if self.mic.is_some() {
            return Err(EngineError::InvalidState("microphone already attached"));
        }
        let rate = self.sample_rate();
        let ring = self.config.mic_ring_frames;
        let input = open_microphone(rate, ring)?;
        self.attach_microphone_input(input)
    }

    /// Wire an already-open microphone feed into the capture mix.
    ///
    /// This is the hardware-free half of [`attach_microphone`]; tests drive
    /// it with a [`MicInput::from_parts`] feed.
    pub fn attach_microphone_input(&mut self, input: MicInput) -> Result<(), EngineError> {
        let Some(program) = self.program.as_ref() else {
            return Err(EngineError::InvalidState(
                "microphone attach before initialization",
            ));
        };
        if self.mic.is_some() {
            return Err(EngineError::InvalidState("microphone already attached"));
        }
        let capture = program.nodes.capture;

        let source = self.graph.add(MicSource::new(input.consumer));
        let gain = self.graph.add(Gain::mono(self.config.mic_boost));

        self.graph.connect(source.id(), gain.id());
        // Mono mic lands on both channels of the capture mix
        self.graph.connect_port(gain.id(), 0, capture, 0);
        self.graph.connect_port(gain.id(), 0, capture, 1);

        self.mic = Some(MicSession {
            source: source.id(),
            gain: gain.id(),
            track: input.track,
        });
        tracing::info!(boost = self.config.mic_boost, "microphone attached");
        Ok(())
    }

    /// Remove the microphone from the capture mix and release the device.
    ///
    /// Safe to call at any time; a no-op when no microphone is attached.
    pub fn detach_microphone(&mut self) {
        let Some(mut session) = self.mic.take() else {
            return;
        };
        self.graph.remove(session.gain);
        self.graph.remove(session.source);
        session.track.stop();
        tracing::info!("microphone detached");
    }

    pub fn is_microphone_attached(&self) -> bool {
        self.mic.is_some()
    }

    /// Begin recording the capture mix.
    ///
    /// Arms the capture sink with a fresh ring buffer and spawns the drain
    /// worker. If playback is paused, starts it so the recorded program
    /// audio is non-silent, and remembers that it did.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidState`] if uninitialized or already recording.
    pub fn start_recording(&mut self) -> Result<(), EngineError> {
        if self.recording.is_some() {
            return Err(EngineError::InvalidState("recording already in progress"));
        }
        let Some(program) = self.program.as_mut() else {
            return Err(EngineError::InvalidState(
                "recording start before initialization",
            ));
        };

        let (producer, consumer) = rtrb::RingBuffer::<f32>::new(self.config.capture_ring_frames * 2);

        let auto_started = !program.state.is_playing();
        if auto_started {
            program
                .player
                .send(PlayerMessage::Play)
                .map_err(|_| EngineError::Backend("player control queue full".into()))?;
            program.state.set_playing(true);
        }

        program
            .capture_ctl
            .send(CaptureMessage::Start(producer))
            .map_err(|_| EngineError::Backend("capture control queue full".into()))?;

        let stop = Arc::new(AtomicBool::new(false));
        let chunk_bytes = self.config.chunk_frames * 2 * 2; // stereo, 16-bit
        let worker = spawn_drain_worker(consumer, stop.clone(), chunk_bytes);

        self.recording = Some(ActiveRecording {
            worker,
            stop,
            auto_started,
        });
        tracing::info!(auto_started, "recording started");
        Ok(())
    }

    /// Stop the active recording.
    ///
    /// Disarms the capture sink, detaches the microphone, and pauses
    /// playback if [`start_recording`](Self::start_recording) auto-started
    /// it and it is still running. Returns a [`FinalizeHandle`]; call
    /// [`wait`](FinalizeHandle::wait) on it (off the control thread if
    /// latency matters) to obtain the finished [`Recording`].
    ///
    /// [`Recording`]: crate::Recording
    pub fn stop_recording(&mut self) -> Result<FinalizeHandle, EngineError> {
        let Some(active) = self.recording.take() else {
            return Err(EngineError::InvalidState("no recording in progress"));
        };
        let program = self
            .program
            .as_mut()
            .ok_or(EngineError::InvalidState("recording without a program"))?;

        program
            .capture_ctl
            .send(CaptureMessage::Stop)
            .map_err(|_| EngineError::Backend("capture control queue full".into()))?;
        active
            .stop
            .store(true, std::sync::atomic::Ordering::Release);
        active.worker.thread().unpark();

        // An explicit pause during the recording wins over the auto-start
        if active.auto_started && program.state.is_playing() {
            let _ = program.player.send(PlayerMessage::Pause);
            program.state.set_playing(false);
        }

        self.detach_microphone();
        tracing::info!("recording stopped, finalizing");

        Ok(FinalizeHandle {
            worker: active.worker,
            sample_rate: self.sample_rate(),
            channels: 2,
        })
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Current recorder lifecycle state as seen from the engine.
    ///
    /// `Finalizing` and `Complete` are reported by
    /// [`FinalizeHandle::state`] once
    /// [`stop_recording`](Self::stop_recording) has returned the handle.
    pub fn recording_state(&self) -> RecordingState {
        if self.recording.is_some() {
            RecordingState::Recording
        } else {
            RecordingState::Idle
        }
    }

    // -- playback surface --------------------------------------------------

    pub fn play(&mut self) {
        if let Some(program) = self.program.as_mut() {
            let _ = program.player.send(PlayerMessage::Play);
            // Optimistic: readers on this thread see the change immediately,
            // the audio thread confirms it next block
            program.state.set_playing(true);
        }
    }

    pub fn pause(&mut self) {
        if let Some(program) = self.program.as_mut() {
            let _ = program.player.send(PlayerMessage::Pause);
            program.state.set_playing(false);
        }
    }

    pub fn seek(&mut self, secs: f64) {
        if let Some(program) = self.program.as_mut() {
            let _ = program.player.send(PlayerMessage::Seek(secs));
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        if let Some(program) = self.program.as_mut() {
            let _ = program.player.send(PlayerMessage::SetVolume(volume));
        }
    }

    /// Playhead position in seconds, as last published by the audio thread.
    pub fn position(&self) -> f64 {
        self.program
            .as_ref()
            .map(|p| p.state.position_secs())
            .unwrap_or(0.0)
    }

    /// Program duration in seconds.
    pub fn duration(&self) -> f64 {
        self.program
            .as_ref()
            .map(|p| p.state.duration_secs())
            .unwrap_or(0.0)
    }

    pub fn is_playing(&self) -> bool {
        self.program
            .as_ref()
            .map(|p| p.state.is_playing())
            .unwrap_or(false)
    }

    // -- analysis and introspection ----------------------------------------

    /// The analysis tap, once initialized.
    pub fn analysis(&mut self) -> Option<&mut AnalysisTap> {
        self.program.as_mut().map(|p| &mut p.tap)
    }

    /// Node ids of the fixed program graph, once initialized.
    pub fn nodes(&self) -> Option<GraphNodes> {
        self.program.as_ref().map(|p| p.nodes)
    }

    /// The output sink's node id, if one is attached.
    pub fn output(&self) -> Option<NodeId> {
        self.output
    }

    /// Snapshot of every edge currently in the graph.
    pub fn connections(&self) -> Vec<Connection> {
        self.graph.connections()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Advance the graph by one 64-sample block.
    ///
    /// The caller owns pacing: against a [`CpalSink`](crate::nodes::CpalSink)
    /// this is called in a loop gated on the sink's buffer headroom, in tests
    /// it is called a fixed number of times for a deterministic sample count.
    pub fn process(&mut self) {
        self.graph.process();
    }
}

impl Drop for Refrain {
    fn drop(&mut self) {
        // Release the capture device and stop the drain worker; a leaked
        // track leaves the OS capture indicator lit
        self.detach_microphone();
        if let Some(active) = self.recording.take() {
            active
                .stop
                .store(true, std::sync::atomic::Ordering::Release);
            active.worker.thread().unpark();
            let _ = active.worker.join();
        }
    }
}
