//! Gain/volume control effect.

use dasp_graph::Buffer;

use crate::node::{AudioNode, ProcessContext};

/// Messages to control gain
#[derive(Clone, Copy, Debug)]
pub enum GainMessage {
    /// Set the gain multiplier (1.0 = unity, 0.0 = silence, -1.0 = polarity flip)
    SetGain(f32),
}

/// A gain control that passes audio through with amplitude scaling.
///
/// Negative gain inverts polarity - `Gain::mono(-1.0)` is the inverter the
/// vocal-cancellation topology hangs on the right channel. Gain changes are
/// smoothed to prevent clicks; the initial value applies instantly.
pub struct Gain {
    gain: f32,
    /// Smoothing toward the target gain to prevent clicks on rapid changes
    smoothed_gain: f32,
    /// Smoothing coefficient (0.0 = instant, 1.0 = no change)
    smooth_coeff: f32,
    channels: usize,
}

impl Gain {
    /// Create a stereo gain node (two ports in, two ports out).
    pub fn new(gain: f32) -> Self {
        Self::with_channels(gain, 2)
    }

    /// Create a mono gain node (one port in, one port out).
    pub fn mono(gain: f32) -> Self {
        Self::with_channels(gain, 1)
    }

    fn with_channels(gain: f32, channels: usize) -> Self {
        Self {
            gain,
            smoothed_gain: gain,
            smooth_coeff: 0.995, // ~7ms at 48kHz
            channels: channels.max(1),
        }
    }

    /// Set the smoothing time in milliseconds
    pub fn with_smoothing_ms(mut self, ms: f32, sample_rate: u32) -> Self {
        // Time constant: after `ms` milliseconds, we've reached ~63% of target
        let samples = (ms / 1000.0) * sample_rate as f32;
        self.smooth_coeff = (-1.0 / samples).exp();
        self
    }

    /// Disable smoothing for instant gain changes
    pub fn without_smoothing(mut self) -> Self {
        self.smooth_coeff = 0.0;
        self
    }

    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain
    }
}

impl AudioNode for Gain {
    type Message = GainMessage;

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        messages: impl Iterator<Item = GainMessage>,
        inputs: &[Buffer],
        outputs: &mut [Buffer],
    ) {
        for msg in messages {
            match msg {
                GainMessage::SetGain(g) => self.gain = g,
            }
        }

        let smooth_coeff = self.smooth_coeff;
        let target_gain = self.gain;
        let mut current_gain = self.smoothed_gain;

        for (ch, (out_buffer, in_buffer)) in outputs.iter_mut().zip(inputs.iter()).enumerate() {
            // Channels track the same gain trajectory; only channel 0 advances it
            let mut gain = current_gain;

            for (out_sample, &in_sample) in out_buffer.iter_mut().zip(in_buffer.iter()) {
                gain = target_gain + smooth_coeff * (gain - target_gain);
                *out_sample = in_sample * gain;
            }

            if ch == 0 {
                current_gain = gain;
            }
        }

        self.smoothed_gain = current_gain;
    }

    #[inline]
    fn num_inputs(&self) -> usize {
        self.channels
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverter_flips_polarity_exactly() {
        let mut gain = Gain::mono(-1.0);
        let mut input = Buffer::SILENT;
        input.iter_mut().for_each(|s| *s = 0.25);
        let mut out = [Buffer::SILENT];
        let ctx = ProcessContext {
            sample_rate: 48_000,
            buffer_size: Buffer::LEN,
        };
        gain.process(&ctx, std::iter::empty(), &[input], &mut out);

        // Initial gain applies without a smoothing ramp
        assert!(out[0].iter().all(|&s| (s + 0.25).abs() < 1e-6));
    }

    #[test]
    fn gain_change_smooths_toward_target() {
        let mut gain = Gain::mono(1.0);
        let mut input = Buffer::SILENT;
        input.iter_mut().for_each(|s| *s = 1.0);
        let mut out = [Buffer::SILENT];
        let ctx = ProcessContext {
            sample_rate: 48_000,
            buffer_size: Buffer::LEN,
        };
        gain.process(
            &ctx,
            std::iter::once(GainMessage::SetGain(0.0)),
            &[input],
            &mut out,
        );

        // Heading to zero but not there within one block
        assert!(out[0][0] > out[0][63]);
        assert!(out[0][63] > 0.0);
    }
}
