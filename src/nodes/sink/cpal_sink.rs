//! CPAL audio output sink.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, SupportedStreamConfig};
use dasp_graph::Buffer;
use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::node::{AudioNode, ProcessContext};

/// A sink that outputs audio to a CPAL device.
///
/// The CPAL stream lives on its own thread and drains a lock-free ring
/// buffer; this node interleaves its input ports into that ring one block at
/// a time. If the ring lacks room for a whole block, the block is dropped
/// rather than partially written.
pub struct CpalSink {
    buffer: Producer<f32>,
    channels: usize,
    /// Samples played so far, for caller-side pacing
    samples_consumed: Arc<AtomicUsize>,
    had_underrun: Arc<AtomicBool>,
}

impl CpalSink {
    /// Create a sink for the given device and stream config.
    pub fn new(device: &cpal::Device, config: &SupportedStreamConfig) -> Self {
        let channels = config.channels() as usize;
        let sample_format = config.sample_format();
        let stream_config = config.config();
        let sample_rate = stream_config.sample_rate.0;

        // ~100ms of audio to absorb scheduling jitter
        let buffer_samples = ((sample_rate as f32 * 0.1) as usize) * channels;
        let buffer_size = buffer_samples.next_power_of_two().max(8192);
        let (producer, consumer) = RingBuffer::<f32>::new(buffer_size);

        let samples_consumed = Arc::new(AtomicUsize::new(0));
        let had_underrun = Arc::new(AtomicBool::new(false));

        let state = StreamState {
            consumer,
            samples_consumed: samples_consumed.clone(),
            had_underrun: had_underrun.clone(),
        };

        // cpal::Stream is !Send, so it is built and parked on its own thread
        let device = device.clone();
        std::thread::spawn(move || {
            let stream = match sample_format {
                SampleFormat::F32 => open_stream::<f32>(&device, &stream_config, state),
                SampleFormat::I16 => open_stream::<i16>(&device, &stream_config, state),
                SampleFormat::U16 => open_stream::<u16>(&device, &stream_config, state),
                other => {
                    tracing::error!(?other, "unsupported output sample format");
                    return;
                }
            };
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::error!("failed to open output stream: {e}");
                    return;
                }
            };
            if let Err(e) = stream.play() {
                tracing::error!("failed to start output stream: {e}");
                return;
            }
            // The stream lives as long as this thread
            loop {
                std::thread::park();
            }
        });

        Self {
            buffer: producer,
            channels,
            samples_consumed,
            had_underrun,
        }
    }

    /// How many samples the device has played.
    #[inline]
    pub fn samples_consumed(&self) -> usize {
        self.samples_consumed.load(Ordering::Relaxed)
    }

    /// Free space in the ring buffer, in samples.
    #[inline]
    pub fn buffer_available(&self) -> usize {
        self.buffer.slots()
    }

    /// Check and clear the underrun flag.
    pub fn check_underrun(&self) -> bool {
        self.had_underrun.swap(false, Ordering::Relaxed)
    }
}

struct StreamState {
    consumer: Consumer<f32>,
    samples_consumed: Arc<AtomicUsize>,
    had_underrun: Arc<AtomicBool>,
}

fn open_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut state: StreamState,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let mut underrun = false;
            for sample in data.iter_mut() {
                let s = state.consumer.pop().unwrap_or_else(|_| {
                    underrun = true;
                    0.0
                });
                *sample = T::from_sample(s);
            }
            if underrun {
                state.had_underrun.store(true, Ordering::Relaxed);
            }
            state
                .samples_consumed
                .fetch_add(data.len(), Ordering::Relaxed);
        },
        |err| tracing::error!("output stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

impl AudioNode for CpalSink {
    type Message = ();

    fn process(
        &mut self,
        ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        inputs: &[Buffer],
        _outputs: &mut [Buffer],
    ) {
        if inputs.is_empty() {
            return;
        }
        if self.buffer.slots() < ctx.buffer_size * self.channels {
            return;
        }

        // Interleave input ports into device frames, duplicating the last
        // port if the device has more channels than the graph feeds
        for i in 0..ctx.buffer_size {
            for ch in 0..self.channels {
                let src = ch.min(inputs.len() - 1);
                let _ = self.buffer.push(inputs[src][i]);
            }
        }
    }

    #[inline]
    fn num_inputs(&self) -> usize {
        2
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        0
    }
}
