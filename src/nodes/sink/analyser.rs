//! Analysis tap for visualization.

use dasp_graph::Buffer;
use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::Arc;

use crate::node::{AudioNode, ProcessContext};

/// A sink that mixes its inputs down to mono and streams them to an
/// [`AnalysisTap`] on the control thread.
///
/// Read-only with respect to the signal: adding or removing the tap never
/// changes what reaches the output device.
pub struct AnalyserNode {
    buffer: Producer<f32>,
    channels: usize,
}

impl AnalyserNode {
    /// Create an analyser and its control-side tap.
    ///
    /// `fft_size` must be a power of two; it sets the rolling window length
    /// used for both waveform and spectrum reads.
    pub fn new(fft_size: usize) -> (Self, AnalysisTap) {
        assert!(
            fft_size.is_power_of_two() && fft_size >= 2,
            "fft_size must be a power of two"
        );

        // Room for several windows so a slow UI thread doesn't stall reads
        let (producer, consumer) = RingBuffer::<f32>::new(fft_size * 8);

        let node = Self {
            buffer: producer,
            channels: 2,
        };
        let tap = AnalysisTap::new(consumer, fft_size);
        (node, tap)
    }
}

impl AudioNode for AnalyserNode {
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

        for i in 0..ctx.buffer_size {
            let mut sum = 0.0;
            for ch in 0..self.channels {
                let src = ch.min(inputs.len() - 1);
                sum += inputs[src][i];
            }
            // Best effort: if the tap has fallen behind, stale samples are
            // simply not replaced this block
            let _ = self.buffer.push(sum / self.channels as f32);
        }
    }

    #[inline]
    fn num_inputs(&self) -> usize {
        self.channels
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        0
    }
}

/// Control-thread reader for an [`AnalyserNode`].
///
/// Maintains a rolling window of the most recent `fft_size` mono samples.
/// [`waveform`](Self::waveform) returns the raw window;
/// [`spectrum`](Self::spectrum) returns `fft_size / 2 + 1` magnitude bins of
/// its Hann-windowed FFT.
pub struct AnalysisTap {
    consumer: Consumer<f32>,
    window: Vec<f32>,
    hann: Vec<f32>,
    fft: Arc<dyn RealToComplex<f32>>,
    fft_input: Vec<f32>,
    fft_output: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
}

impl AnalysisTap {
    fn new(consumer: Consumer<f32>, fft_size: usize) -> Self {
        let fft = RealFftPlanner::<f32>::new().plan_fft_forward(fft_size);
        let fft_input = fft.make_input_vec();
        let fft_output = fft.make_output_vec();

        let denom = (fft_size - 1) as f32;
        let hann = (0..fft_size)
            .map(|i| {
                let phase = std::f32::consts::TAU * i as f32 / denom;
                0.5 * (1.0 - phase.cos())
            })
            .collect();

        Self {
            consumer,
            window: vec![0.0; fft_size],
            hann,
            fft,
            fft_input,
            fft_output,
            magnitudes: vec![0.0; fft_size / 2 + 1],
        }
    }

    /// The rolling window length in samples.
    pub fn fft_size(&self) -> usize {
        self.window.len()
    }

    fn refill(&mut self) {
        while let Ok(sample) = self.consumer.pop() {
            self.window.rotate_left(1);
            let last = self.window.len() - 1;
            self.window[last] = sample;
        }
    }

    /// The most recent `fft_size` mono samples, oldest first.
    pub fn waveform(&mut self) -> &[f32] {
        self.refill();
        &self.window
    }

    /// Magnitude spectrum of the current window.
    ///
    /// Returns `fft_size / 2 + 1` bins; bin `k` is centered on
    /// `k * sample_rate / fft_size` Hz.
    pub fn spectrum(&mut self) -> &[f32] {
        self.refill();

        for (dst, (sample, w)) in self
            .fft_input
            .iter_mut()
            .zip(self.window.iter().zip(self.hann.iter()))
        {
            *dst = sample * w;
        }

        // Only fails on length mismatch, which the planner guarantees against
        if self
            .fft
            .process(&mut self.fft_input, &mut self.fft_output)
            .is_ok()
        {
            let scale = 1.0 / self.window.len() as f32;
            for (mag, bin) in self.magnitudes.iter_mut().zip(self.fft_output.iter()) {
                *mag = bin.norm() * scale;
            }
        }
        &self.magnitudes
    }
}
