//! CPAL device discovery, sink creation, and microphone capture.
//!
//! This module provides [`CpalDevice`] for discovering and selecting audio
//! output devices, and [`open_microphone`] for opening the default input
//! device as a [`MicInput`].
//!
//! # Example: List and Select a Device
//!
//! ```no_run
//! use refrain::{Refrain, CpalDevice};
//!
//! // List all available output devices
//! let devices = CpalDevice::list_outputs();
//! for (i, device) in devices.iter().enumerate() {
//!     println!("[{}] {} ({} Hz, {} ch)",
//!         i, device.name(), device.sample_rate(), device.channels());
//! }
//!
//! // Use a specific device
//! let device = &devices[0];
//! let mut engine = Refrain::new(device.sample_rate())
//!     .with_output(device.create_sink());
//! ```

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use rtrb::{Consumer, RingBuffer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::EngineError;

/// A discovered audio output device.
///
/// Use [`CpalDevice::default_output`] to get the system default, or
/// [`CpalDevice::list_outputs`] to enumerate all available devices.
///
/// Once you have a device, use [`create_sink`](Self::create_sink) to create
/// a [`CpalSink`](crate::nodes::CpalSink) node for audio output.
pub struct CpalDevice {
    device: cpal::Device,
    config: cpal::SupportedStreamConfig,

    name: String,
    sample_rate: u32,
    channels: u16,
}

impl CpalDevice {
    /// Get the system's default output device.
    ///
    /// Returns `None` if no audio device is available.
    pub fn default_output() -> Option<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device()?;
        let config = device.default_output_config().ok()?;
        let name = device.name().unwrap_or_else(|_| "Unknown".into());

        Some(Self {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
            name,
            device,
            config,
        })
    }

    /// List all available audio output devices.
    ///
    /// Returns an empty list if no devices are found or if enumeration fails.
    pub fn list_outputs() -> Vec<Self> {
        let host = cpal::default_host();
        host.output_devices()
            .map(|devices| {
                devices
                    .filter_map(|device| {
                        let config = device.default_output_config().ok()?;
                        let name = device.name().unwrap_or_else(|_| "Unknown".into());
                        Some(Self {
                            sample_rate: config.sample_rate().0,
                            channels: config.channels(),
                            name,
                            device,
                            config,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the device's sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the number of output channels.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Create a sink node that outputs audio to this device.
    ///
    /// The returned [`CpalSink`](crate::nodes::CpalSink) should be added to
    /// your graph via [`Refrain::with_output`](crate::Refrain::with_output).
    pub fn create_sink(&self) -> crate::nodes::CpalSink {
        crate::nodes::CpalSink::new(&self.device, &self.config)
    }
}

/// Handle to the thread that owns a live input stream.
///
/// Implemented by the CPAL-backed capture thread, and by test doubles that
/// stand in for hardware.
pub trait InputTrack: Send {
    /// Stop capturing and release the device.
    fn stop(&mut self);
    /// Whether the capture thread is still running.
    fn is_active(&self) -> bool;
}

/// A live microphone feed: mono samples at the engine sample rate, plus the
/// [`InputTrack`] that keeps the device open.
///
/// Produced by [`open_microphone`], or assembled from parts in tests via
/// [`MicInput::from_parts`].
pub struct MicInput {
    pub(crate) consumer: Consumer<f32>,
    pub(crate) track: Box<dyn InputTrack>,
}

impl MicInput {
    /// Assemble a microphone feed from a ring buffer consumer and a track
    /// handle. Lets tests drive the capture path without hardware.
    pub fn from_parts(consumer: Consumer<f32>, track: Box<dyn InputTrack>) -> Self {
        Self { consumer, track }
    }
}

struct CpalInputTrack {
    shutdown: Arc<AtomicBool>,
    thread: Option<std::thread::Thread>,
}

impl InputTrack for CpalInputTrack {
    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            thread.unpark();
        }
    }

    fn is_active(&self) -> bool {
        !self.shutdown.load(Ordering::Acquire)
    }
}

impl Drop for CpalInputTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Open the system's default input device.
///
/// The capture callback downmixes the device's channels to mono and resamples
/// to `target_rate`, writing into a ring buffer of `ring_frames` samples. The
/// stream lives on a dedicated thread until the returned track is stopped.
///
/// # Errors
///
/// - [`EngineError::NoInputDevice`] if the host reports no default input
/// - [`EngineError::PermissionDenied`] if the OS refuses access
/// - [`EngineError::Backend`] for any other stream failure
pub fn open_microphone(target_rate: u32, ring_frames: usize) -> Result<MicInput, EngineError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(EngineError::NoInputDevice)?;
    let name = device.name().unwrap_or_else(|_| "Unknown".into());
    let config = device
        .default_input_config()
        .map_err(|e| EngineError::Backend(e.to_string()))?;

    tracing::info!(
        device = %name,
        rate = config.sample_rate().0,
        channels = config.channels(),
        "opening microphone"
    );

    let (producer, consumer) = RingBuffer::<f32>::new(ring_frames);

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_thread = shutdown.clone();

    // cpal::Stream is !Send, so build and hold it on its own thread. The
    // one-shot channel reports whether the build succeeded.
    let (result_tx, result_rx) = std::sync::mpsc::channel::<Result<(), EngineError>>();
    let handle = std::thread::spawn(move || {
        let stream = match build_input_stream(&device, &config, target_rate, producer) {
            Ok(stream) => stream,
            Err(e) => {
                let _ = result_tx.send(Err(e));
                return;
            }
        };
        if let Err(e) = stream.play() {
            let _ = result_tx.send(Err(EngineError::Backend(e.to_string())));
            return;
        }
        let _ = result_tx.send(Ok(()));

        while !shutdown_thread.load(Ordering::Acquire) {
            std::thread::park_timeout(Duration::from_millis(100));
        }
        drop(stream);
        tracing::debug!("microphone capture thread exiting");
    });

    match result_rx.recv() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            let _ = handle.join();
            return Err(e);
        }
        Err(_) => return Err(EngineError::Backend("capture thread died".into())),
    }

    let track = CpalInputTrack {
        shutdown,
        thread: Some(handle.thread().clone()),
    };

    Ok(MicInput {
        consumer,
        track: Box::new(track),
    })
}

/// Downmixes incoming frames to mono and linearly resamples them to the
/// engine rate, pushing into the microphone ring. Runs inside the capture
/// callback, so it allocates nothing.
struct CaptureWriter {
    producer: rtrb::Producer<f32>,
    channels: usize,
    /// Input samples advanced per output sample
    step: f64,
    pos: f64,
    prev: f32,
}

impl CaptureWriter {
    fn new(producer: rtrb::Producer<f32>, channels: usize, device_rate: u32, target_rate: u32) -> Self {
        Self {
            producer,
            channels,
            step: device_rate as f64 / target_rate as f64,
            pos: 0.0,
            prev: 0.0,
        }
    }

    fn write<T>(&mut self, data: &[T])
    where
        T: Sample,
        f32: FromSample<T>,
    {
        for frame in data.chunks_exact(self.channels) {
            let sum: f32 = frame.iter().map(|&s| f32::from_sample(s)).sum();
            let s = sum / self.channels as f32;
            // Emit every output sample that falls between prev and s
            while self.pos < 1.0 {
                let out = self.prev + (s - self.prev) * self.pos as f32;
                // Full ring: overwrite nothing, the graph side catches up
                let _ = self.producer.push(out);
                self.pos += self.step;
            }
            self.pos -= 1.0;
            self.prev = s;
        }
    }
}

fn input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut writer: CaptureWriter,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| writer.write(data),
        |err| tracing::error!("input stream error: {err}"),
        None,
    )
}

fn build_input_stream(
    device: &cpal::Device,
    config: &cpal::SupportedStreamConfig,
    target_rate: u32,
    producer: rtrb::Producer<f32>,
) -> Result<cpal::Stream, EngineError> {
    let stream_config = config.config();
    let writer = CaptureWriter::new(
        producer,
        config.channels() as usize,
        config.sample_rate().0,
        target_rate,
    );

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => input_stream::<f32>(device, &stream_config, writer),
        cpal::SampleFormat::I16 => input_stream::<i16>(device, &stream_config, writer),
        cpal::SampleFormat::U16 => input_stream::<u16>(device, &stream_config, writer),
        other => {
            return Err(EngineError::Backend(format!(
                "unsupported input sample format: {other:?}"
            )))
        }
    };

    stream.map_err(|e| match e {
        cpal::BuildStreamError::DeviceNotAvailable => EngineError::PermissionDenied,
        other => EngineError::Backend(other.to_string()),
    })
}
