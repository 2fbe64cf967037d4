//! Integration tests for the full engine: topology switching, recording,
//! microphone mixing, and the analysis tap. Everything runs against an
//! in-memory ring-buffer sink, so no audio hardware is needed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use refrain::nodes::RtrbSink;
use refrain::{
    Connection, EngineConfig, EngineError, InputTrack, MicInput, ProgramAudio, RecordingState,
    Refrain, Topology,
};
use rtrb::{Consumer, RingBuffer};

const BLOCK: usize = 64;
const RATE: u32 = 48_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Engine with a deterministic ring-buffer output instead of a device.
fn test_engine(config: EngineConfig) -> (Refrain, Consumer<f32>) {
    init_tracing();
    let (producer, consumer) = RingBuffer::<f32>::new(1 << 22);
    let engine = Refrain::new(RATE)
        .with_output(RtrbSink::stereo(producer))
        .with_config(config);
    (engine, consumer)
}

fn silence(frames: usize) -> ProgramAudio {
    ProgramAudio::new(vec![0.0; frames * 2], 2, RATE)
}

/// Stereo program: `vocal_hz` mixed identically into both channels,
/// `instrument_hz` in the left channel only.
fn karaoke_program(frames: usize, vocal_hz: f32, instrument_hz: f32) -> ProgramAudio {
    let mut samples = Vec::with_capacity(frames * 2);
    for i in 0..frames {
        let t = i as f32 / RATE as f32;
        let vocal = (t * vocal_hz * std::f32::consts::TAU).sin() * 0.5;
        let instrument = (t * instrument_hz * std::f32::consts::TAU).sin() * 0.5;
        samples.push(vocal + instrument); // left
        samples.push(vocal); // right
    }
    ProgramAudio::new(samples, 2, RATE)
}

fn sorted(mut connections: Vec<Connection>) -> Vec<Connection> {
    connections.sort();
    connections
}

struct FakeTrack {
    stopped: Arc<AtomicBool>,
}

impl InputTrack for FakeTrack {
    fn stop(&mut self) {
        self.stopped.store(true, Ordering::Release);
    }
    fn is_active(&self) -> bool {
        !self.stopped.load(Ordering::Acquire)
    }
}

fn fake_mic(ring: usize) -> (rtrb::Producer<f32>, MicInput, Arc<AtomicBool>) {
    let (producer, consumer) = RingBuffer::<f32>::new(ring);
    let stopped = Arc::new(AtomicBool::new(false));
    let track = FakeTrack {
        stopped: stopped.clone(),
    };
    (
        producer,
        MicInput::from_parts(consumer, Box::new(track)),
        stopped,
    )
}

#[test]
fn initialize_is_idempotent() {
    let (mut engine, _out) = test_engine(EngineConfig::default());
    engine.initialize(silence(RATE as usize)).unwrap();
    let nodes_before = engine.node_count();
    let edges_before = engine.connections().len();

    engine.initialize(silence(RATE as usize)).unwrap();
    assert_eq!(engine.node_count(), nodes_before);
    assert_eq!(engine.connections().len(), edges_before);
}

#[test]
fn direct_topology_has_the_documented_wiring() {
    let (mut engine, _out) = test_engine(EngineConfig::default());
    engine.initialize(silence(RATE as usize)).unwrap();
    assert_eq!(engine.topology(), Topology::Direct);

    let nodes = engine.nodes().unwrap();
    let output = engine.output().unwrap();
    let edges = sorted(engine.connections());

    let mut expected = Vec::new();
    for port in 0..2 {
        expected.push(Connection {
            from: nodes.source,
            from_port: port,
            to: nodes.bus,
            to_port: port,
        });
        for &to in &[output, nodes.analyser, nodes.capture] {
            expected.push(Connection {
                from: nodes.bus,
                from_port: port,
                to,
                to_port: port,
            });
        }
    }
    assert_eq!(edges, sorted(expected));
}

#[test]
fn cancelled_topology_routes_through_the_difference_network() {
    let (mut engine, _out) = test_engine(EngineConfig::default());
    engine.initialize(silence(RATE as usize)).unwrap();

    engine.set_vocal_cancellation(true).unwrap();
    assert!(engine.is_vocal_cancelled());

    let nodes = engine.nodes().unwrap();
    let edges = engine.connections();
    // source→splitter (2), splitter/inverter/merger network (5),
    // merger→bus (2), bus fan-out to output/analyser/capture (6)
    assert_eq!(edges.len(), 15);

    // The inverter feeds both merger inputs, summing -right into each channel
    for port in 0..2 {
        assert!(edges.contains(&Connection {
            from: nodes.inverter,
            from_port: 0,
            to: nodes.merger,
            to_port: port,
        }));
        assert!(edges.contains(&Connection {
            from: nodes.splitter,
            from_port: 0,
            to: nodes.merger,
            to_port: port,
        }));
    }
    // Nothing connects the source straight to the bus anymore
    assert!(!edges
        .iter()
        .any(|c| c.from == nodes.source && c.to == nodes.bus));
}

#[test]
fn toggling_cancellation_restores_the_exact_direct_wiring() {
    let (mut engine, _out) = test_engine(EngineConfig::default());
    engine.initialize(silence(RATE as usize)).unwrap();
    let direct = sorted(engine.connections());

    engine.set_vocal_cancellation(true).unwrap();
    engine.set_vocal_cancellation(false).unwrap();
    assert_eq!(sorted(engine.connections()), direct);

    // Toggling to the same state is also stable
    engine.set_vocal_cancellation(false).unwrap();
    assert_eq!(sorted(engine.connections()), direct);
}

#[test]
fn cancellation_suppresses_center_panned_content() {
    let (mut engine, _out) = test_engine(EngineConfig::default());
    // 750 Hz center-panned "vocal", 4500 Hz left-only "instrument":
    // bins 4 and 24 of a 256-point FFT at 48 kHz
    engine
        .initialize(karaoke_program(RATE as usize * 2, 750.0, 4500.0))
        .unwrap();
    engine.play();

    for _ in 0..8 {
        engine.process();
    }
    let direct: Vec<f32> = engine.analysis().unwrap().spectrum().to_vec();
    assert!(direct[4] > 0.01, "vocal bin should be hot in direct mode");

    engine.set_vocal_cancellation(true).unwrap();
    for _ in 0..8 {
        engine.process();
    }
    let cancelled: Vec<f32> = engine.analysis().unwrap().spectrum().to_vec();

    assert!(
        cancelled[4] < direct[4] * 0.05,
        "center-panned content must collapse: direct {} vs cancelled {}",
        direct[4],
        cancelled[4]
    );
    assert!(
        cancelled[24] > 0.01,
        "channel-differing content must survive cancellation"
    );
}

#[test]
fn output_sink_receives_interleaved_frames() {
    let (mut engine, mut out) = test_engine(EngineConfig::default());
    engine.initialize(silence(RATE as usize)).unwrap();
    engine.play();

    for _ in 0..4 {
        engine.process();
    }
    assert_eq!(out.slots(), 4 * BLOCK * 2);
}

#[test]
fn recording_without_microphone_yields_a_wav_artifact() {
    let (mut engine, _out) = test_engine(EngineConfig::default());
    engine.initialize(silence(RATE as usize)).unwrap();

    engine.start_recording().unwrap();
    assert!(engine.is_recording());
    assert!(engine.is_playing(), "recording auto-starts playback");

    let blocks = 32;
    for _ in 0..blocks {
        engine.process();
    }
    let recording = engine.stop_recording().unwrap().wait().unwrap();

    assert_eq!(&recording.data()[0..4], b"RIFF");
    assert_eq!(recording.frames(), blocks * BLOCK);
    assert_eq!(recording.channels(), 2);
    assert!((recording.duration() - (blocks * BLOCK) as f64 / RATE as f64).abs() < 1e-9);
}

#[test]
fn recorded_chunks_preserve_capture_order() {
    // Tiny chunks force many chunk boundaries
    let (mut engine, _out) = test_engine(EngineConfig::default().with_chunk_frames(BLOCK));
    // Slow upward ramp on both channels
    let frames = RATE as usize;
    let samples: Vec<f32> = (0..frames)
        .flat_map(|i| {
            let v = i as f32 / frames as f32;
            [v, v]
        })
        .collect();
    engine
        .initialize(ProgramAudio::new(samples, 2, RATE))
        .unwrap();

    engine.start_recording().unwrap();
    for _ in 0..64 {
        engine.process();
    }
    let recording = engine.stop_recording().unwrap().wait().unwrap();

    let mut reader = hound::WavReader::new(std::io::Cursor::new(recording.data())).unwrap();
    let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(decoded.len(), 64 * BLOCK * 2);
    // Out-of-order chunk concatenation would break monotonicity
    assert!(decoded.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn recorder_walks_the_full_lifecycle() {
    let (mut engine, _out) = test_engine(EngineConfig::default());
    engine.initialize(silence(RATE as usize)).unwrap();
    assert_eq!(engine.recording_state(), RecordingState::Idle);

    engine.start_recording().unwrap();
    assert_eq!(engine.recording_state(), RecordingState::Recording);
    for _ in 0..4 {
        engine.process();
    }

    let handle = engine.stop_recording().unwrap();
    assert_eq!(engine.recording_state(), RecordingState::Idle);
    assert!(matches!(
        handle.state(),
        RecordingState::Finalizing | RecordingState::Complete
    ));

    // The worker exits once it has drained the stopped ring
    while handle.state() != RecordingState::Complete {
        std::thread::yield_now();
    }
    let recording = handle.wait().unwrap();
    assert_eq!(recording.frames(), 4 * BLOCK);
}

#[test]
fn immediate_stop_finalizes_an_empty_artifact() {
    let (mut engine, _out) = test_engine(EngineConfig::default());
    engine.initialize(silence(RATE as usize)).unwrap();

    engine.start_recording().unwrap();
    let recording = engine.stop_recording().unwrap().wait().unwrap();

    assert_eq!(&recording.data()[0..4], b"RIFF");
    assert_eq!(recording.frames(), 0);
    assert!(!engine.is_playing(), "auto-started playback pauses on stop");
}

#[test]
fn microphone_mixes_into_the_recording_and_releases_on_stop() {
    let (mut engine, _out) = test_engine(EngineConfig::default());
    engine.initialize(silence(RATE as usize)).unwrap();

    let (mut mic_feed, input, stopped) = fake_mic(RATE as usize);
    engine.attach_microphone_input(input).unwrap();
    assert!(engine.is_microphone_attached());

    let blocks = 8;
    for _ in 0..blocks * BLOCK {
        mic_feed.push(0.25).unwrap();
    }

    engine.start_recording().unwrap();
    for _ in 0..blocks {
        engine.process();
    }
    let recording = engine.stop_recording().unwrap().wait().unwrap();

    // Mic is released by stop, not left holding the device
    assert!(stopped.load(Ordering::Acquire));
    assert!(!engine.is_microphone_attached());

    // Program is silent, so every frame is the boosted mic on both channels
    let mut reader = hound::WavReader::new(std::io::Cursor::new(recording.data())).unwrap();
    let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(decoded.len(), blocks * BLOCK * 2);
    let expected = (0.25 * 1.5 * i16::MAX as f32) as i16;
    for &sample in &decoded {
        assert!((sample - expected).abs() <= 1, "got {sample}, want {expected}");
    }

    // A fresh microphone can be attached for the next take
    let (_feed, input, _stopped) = fake_mic(RATE as usize);
    engine.attach_microphone_input(input).unwrap();
}

#[test]
fn microphone_never_reaches_the_device_output() {
    let (mut engine, mut out) = test_engine(EngineConfig::default());
    engine.initialize(silence(RATE as usize)).unwrap();

    let (mut mic_feed, input, _stopped) = fake_mic(RATE as usize);
    engine.attach_microphone_input(input).unwrap();
    for _ in 0..4 * BLOCK {
        mic_feed.push(0.9).unwrap();
    }

    engine.play();
    for _ in 0..4 {
        engine.process();
    }
    // Silent program + hot mic: the device output stays silent
    while let Ok(sample) = out.pop() {
        assert_eq!(sample, 0.0);
    }
}

#[test]
fn attaching_a_microphone_leaves_program_wiring_untouched() {
    let (mut engine, _out) = test_engine(EngineConfig::default());
    engine.initialize(silence(RATE as usize)).unwrap();
    let before = sorted(engine.connections());
    let edge_count = before.len();

    let (_feed, input, _stopped) = fake_mic(RATE as usize);
    engine.attach_microphone_input(input).unwrap();

    let after = engine.connections();
    // Mic adds mic→gain plus gain→capture on both channels
    assert_eq!(after.len(), edge_count + 3);
    for edge in &before {
        assert!(after.contains(edge), "program edge lost: {edge:?}");
    }

    engine.detach_microphone();
    assert_eq!(sorted(engine.connections()), before);
}

#[test]
fn state_machine_violations_fail_loudly() {
    let (mut engine, _out) = test_engine(EngineConfig::default());

    assert!(matches!(
        engine.set_vocal_cancellation(true),
        Err(EngineError::InvalidState(_))
    ));
    assert!(matches!(
        engine.start_recording(),
        Err(EngineError::InvalidState(_))
    ));

    engine.initialize(silence(RATE as usize)).unwrap();

    assert!(matches!(
        engine.stop_recording(),
        Err(EngineError::InvalidState(_))
    ));

    engine.start_recording().unwrap();
    assert!(matches!(
        engine.start_recording(),
        Err(EngineError::InvalidState(_))
    ));
    let _ = engine.stop_recording().unwrap().wait().unwrap();

    let (_feed, input, _stopped) = fake_mic(RATE as usize);
    engine.attach_microphone_input(input).unwrap();
    let (_feed2, input2, _stopped2) = fake_mic(RATE as usize);
    assert!(matches!(
        engine.attach_microphone_input(input2),
        Err(EngineError::InvalidState(_))
    ));

    // Detaching with nothing attached is a no-op, not an error
    engine.detach_microphone();
    engine.detach_microphone();
}

#[test]
fn playhead_tracks_processing_and_seeking() {
    let (mut engine, _out) = test_engine(EngineConfig::default());
    engine.initialize(silence(RATE as usize * 2)).unwrap();
    assert_eq!(engine.duration(), 2.0);
    assert_eq!(engine.position(), 0.0);

    engine.play();
    let blocks = (RATE as usize / BLOCK) / 2; // half a second
    for _ in 0..blocks {
        engine.process();
    }
    assert!((engine.position() - 0.5).abs() < 0.01);

    engine.seek(1.5);
    engine.process();
    assert!((engine.position() - 1.5).abs() < 0.01);

    engine.pause();
    engine.process();
    assert!(!engine.is_playing());
}
