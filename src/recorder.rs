//! Recording capture worker and WAV encoding.
//!
//! While a recording is active, a [`CaptureSink`](crate::nodes::CaptureSink)
//! in the graph pushes interleaved samples into a ring buffer. A worker
//! thread drains that ring into ordered PCM chunks so the audio thread never
//! touches an encoder or a file. Stopping returns a [`FinalizeHandle`]; its
//! [`wait`](FinalizeHandle::wait) joins the worker and assembles the chunks
//! into a finished [`Recording`].

use rtrb::Consumer;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::EngineError;

/// Lifecycle of the recording pipeline.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RecordingState {
    /// No recording in progress.
    Idle,
    /// Capture sink armed, worker draining samples.
    Recording,
    /// Stop requested; worker finishing its drain.
    Finalizing,
    /// Artifact assembled and available.
    Complete,
}

pub(crate) struct ActiveRecording {
    pub(crate) worker: std::thread::JoinHandle<Vec<Vec<u8>>>,
    pub(crate) stop: Arc<AtomicBool>,
    /// Whether playback was started by the recorder rather than the user.
    pub(crate) auto_started: bool,
}

/// Spawn the drain worker for a recording session.
///
/// The worker pops samples from `consumer`, converting each to little-endian
/// PCM16 and cutting a new chunk every `chunk_bytes`. It exits once `stop` is
/// set **and** the ring is empty, so samples the audio thread pushed before
/// the stop are never lost.
pub(crate) fn spawn_drain_worker(
    mut consumer: Consumer<f32>,
    stop: Arc<AtomicBool>,
    chunk_bytes: usize,
) -> std::thread::JoinHandle<Vec<Vec<u8>>> {
    std::thread::spawn(move || {
        let mut chunks: Vec<Vec<u8>> = Vec::new();
        let mut current: Vec<u8> = Vec::with_capacity(chunk_bytes);

        loop {
            let mut drained = false;
            while let Ok(sample) = consumer.pop() {
                drained = true;
                let pcm = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                current.extend_from_slice(&pcm.to_le_bytes());
                if current.len() >= chunk_bytes {
                    chunks.push(std::mem::replace(
                        &mut current,
                        Vec::with_capacity(chunk_bytes),
                    ));
                }
            }

            if stop.load(Ordering::Acquire) && !drained && consumer.is_empty() {
                break;
            }
            if !drained {
                std::thread::park_timeout(Duration::from_millis(1));
            }
        }

        if !current.is_empty() {
            chunks.push(current);
        }
        tracing::debug!(chunks = chunks.len(), "recording drain worker finished");
        chunks
    })
}

/// Handle to a recording that is being finalized.
///
/// Returned by [`Refrain::stop_recording`](crate::Refrain::stop_recording).
pub struct FinalizeHandle {
    pub(crate) worker: std::thread::JoinHandle<Vec<Vec<u8>>>,
    pub(crate) sample_rate: u32,
    pub(crate) channels: u16,
}

impl FinalizeHandle {
    /// Where the finalization stands: [`RecordingState::Finalizing`] while
    /// the drain worker is still flushing, [`RecordingState::Complete`] once
    /// [`wait`](Self::wait) would return without blocking.
    pub fn state(&self) -> RecordingState {
        if self.worker.is_finished() {
            RecordingState::Complete
        } else {
            RecordingState::Finalizing
        }
    }

    /// Wait for the drain worker and encode the captured audio.
    ///
    /// Blocks until every sample pushed before the stop has been drained,
    /// then assembles the chunks in capture order into a WAV artifact.
    pub fn wait(self) -> Result<Recording, EngineError> {
        let chunks = self
            .worker
            .join()
            .map_err(|_| EngineError::Encoder("recording worker panicked".into()))?;
        Recording::from_chunks(&chunks, self.sample_rate, self.channels)
    }
}

/// A finished recording: a complete WAV artifact plus its parameters.
pub struct Recording {
    data: Vec<u8>,
    sample_rate: u32,
    channels: u16,
    frames: usize,
}

impl Recording {
    /// Assemble ordered PCM16LE chunks into a WAV artifact.
    pub(crate) fn from_chunks(
        chunks: &[Vec<u8>],
        sample_rate: u32,
        channels: u16,
    ) -> Result<Self, EngineError> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut data = Vec::new();
        {
            let mut writer = hound::WavWriter::new(Cursor::new(&mut data), spec)?;
            for chunk in chunks {
                for bytes in chunk.chunks_exact(2) {
                    writer.write_sample(i16::from_le_bytes([bytes[0], bytes[1]]))?;
                }
            }
            writer.finalize()?;
        }

        let total_samples: usize = chunks.iter().map(|c| c.len() / 2).sum();
        let frames = total_samples / channels as usize;
        tracing::info!(
            frames,
            sample_rate,
            channels,
            bytes = data.len(),
            "recording finalized"
        );

        Ok(Self {
            data,
            sample_rate,
            channels,
            frames,
        })
    }

    /// The complete WAV file contents.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the recording, returning the WAV bytes.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of audio frames captured.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Recorded duration in seconds.
    pub fn duration(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }

    /// Write the artifact to disk.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<(), EngineError> {
        std::fs::write(path, &self.data).map_err(|e| EngineError::Encoder(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtrb::RingBuffer;

    #[test]
    fn empty_recording_is_a_valid_artifact() {
        let rec = Recording::from_chunks(&[], 48_000, 2).unwrap();
        assert_eq!(&rec.data()[0..4], b"RIFF");
        assert_eq!(rec.frames(), 0);
        assert_eq!(rec.duration(), 0.0);
    }

    #[test]
    fn chunks_are_encoded_in_capture_order() {
        // Two chunks holding a ramp of PCM16 values
        let mut a = Vec::new();
        let mut b = Vec::new();
        for i in 0..10i16 {
            a.extend_from_slice(&i.to_le_bytes());
        }
        for i in 10..20i16 {
            b.extend_from_slice(&i.to_le_bytes());
        }

        let rec = Recording::from_chunks(&[a, b], 48_000, 2).unwrap();
        assert_eq!(rec.frames(), 10);

        let mut reader = hound::WavReader::new(Cursor::new(rec.data())).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        let expected: Vec<i16> = (0..20).collect();
        assert_eq!(samples, expected);
    }

    #[test]
    fn drain_worker_keeps_samples_pushed_before_stop() {
        let (mut producer, consumer) = RingBuffer::<f32>::new(1024);
        let stop = Arc::new(AtomicBool::new(false));
        let worker = spawn_drain_worker(consumer, stop.clone(), 64);

        for i in 0..500 {
            producer.push(i as f32 / 1000.0).unwrap();
        }
        stop.store(true, Ordering::Release);
        worker.thread().unpark();

        let chunks = worker.join().unwrap();
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert_eq!(total, 500 * 2);
        // Every full chunk respects the cut size
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.len() >= 64);
        }
    }
}
