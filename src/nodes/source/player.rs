//! Program audio source.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dasp_graph::Buffer;

use crate::node::{AudioNode, ProcessContext};

/// Decoded program audio - the "media handle" the engine plays.
///
/// Decoding (from a video container, a network stream, whatever) happens
/// outside this crate; the engine only ever sees interleaved f32 PCM.
#[derive(Clone)]
pub struct ProgramAudio {
    pub(crate) samples: Vec<f32>,
    pub(crate) channels: usize,
    pub(crate) sample_rate: u32,
}

impl ProgramAudio {
    /// Wrap interleaved audio data (L, R, L, R, ... for stereo).
    pub fn new(samples: Vec<f32>, channels: usize, sample_rate: u32) -> Self {
        Self {
            samples,
            channels: channels.max(1),
            sample_rate,
        }
    }

    /// Total duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        (self.samples.len() / self.channels) as f64 / self.sample_rate as f64
    }
}

/// Messages to control a [`SamplePlayer`].
#[derive(Clone, Copy, Debug)]
pub enum PlayerMessage {
    /// Start or resume playback.
    Play,
    /// Pause playback (keeps position).
    Pause,
    /// Pause and reset to the beginning.
    Stop,
    /// Set playback volume (0.0 to 2.0, where 1.0 is unity gain).
    SetVolume(f32),
    /// Seek to position in seconds.
    Seek(f64),
    /// Enable or disable looping.
    SetLooping(bool),
}

/// Playhead state shared between the audio thread and the control thread.
///
/// The player publishes here once per block; the engine's `position()` /
/// `is_playing()` getters read it without touching the audio thread.
pub(crate) struct PlayerShared {
    /// f64 seconds, stored as raw bits
    position_bits: AtomicU64,
    playing: AtomicBool,
    duration: f64,
}

impl PlayerShared {
    fn new(duration: f64) -> Self {
        Self {
            position_bits: AtomicU64::new(0),
            playing: AtomicBool::new(false),
            duration,
        }
    }

    pub fn position_secs(&self) -> f64 {
        f64::from_bits(self.position_bits.load(Ordering::Relaxed))
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    pub(crate) fn set_position(&self, secs: f64) {
        self.position_bits.store(secs.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Relaxed);
    }
}

/// Plays decoded program audio as a stereo source.
///
/// The player owns the decoded samples and resamples them to the graph rate
/// on the fly with linear interpolation, so program material at any sample
/// rate can feed a graph running at the device rate. Playback starts paused;
/// send [`PlayerMessage::Play`] to begin.
///
/// Output is always two ports (left, right); mono program audio is duplicated
/// into both.
pub struct SamplePlayer {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
    /// Fractional position in source frames
    position: f64,
    playing: bool,
    volume: f32,
    looping: bool,
    shared: Arc<PlayerShared>,
}

impl SamplePlayer {
    pub fn new(program: ProgramAudio) -> Self {
        let shared = Arc::new(PlayerShared::new(program.duration_secs()));
        Self {
            samples: program.samples,
            channels: program.channels,
            sample_rate: program.sample_rate,
            position: 0.0,
            playing: false,
            volume: 1.0,
            looping: false,
            shared,
        }
    }

    /// Shared playhead state. Grab this before adding the player to a graph.
    pub(crate) fn shared(&self) -> Arc<PlayerShared> {
        self.shared.clone()
    }

    fn total_frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    #[inline]
    fn sample_at(&self, frame: usize, ch: usize) -> f32 {
        let ch = ch.min(self.channels - 1);
        self.samples[frame * self.channels + ch]
    }

    fn publish(&self) {
        self.shared
            .set_position(self.position / self.sample_rate as f64);
        self.shared.set_playing(self.playing);
    }
}

impl AudioNode for SamplePlayer {
    type Message = PlayerMessage;

    fn process(
        &mut self,
        ctx: &ProcessContext,
        messages: impl Iterator<Item = PlayerMessage>,
        _inputs: &[Buffer],
        outputs: &mut [Buffer],
    ) {
        let total = self.total_frames();

        for msg in messages {
            match msg {
                PlayerMessage::Play => self.playing = true,
                PlayerMessage::Pause => self.playing = false,
                PlayerMessage::Stop => {
                    self.playing = false;
                    self.position = 0.0;
                }
                PlayerMessage::SetVolume(v) => self.volume = v.clamp(0.0, 2.0),
                PlayerMessage::Seek(secs) => {
                    let frame = secs.max(0.0) * self.sample_rate as f64;
                    self.position = frame.min(total as f64);
                }
                PlayerMessage::SetLooping(l) => self.looping = l,
            }
        }

        let buffer_len = ctx.buffer_size;

        if !self.playing || total == 0 {
            for buffer in outputs.iter_mut() {
                buffer.silence();
            }
            self.publish();
            return;
        }

        // Advance through the source at its own rate; linear interpolation
        // bridges a source rate different from the graph rate
        let step = self.sample_rate as f64 / ctx.sample_rate as f64;
        let volume = self.volume;

        for i in 0..buffer_len {
            if self.position >= total as f64 {
                if self.looping {
                    self.position -= total as f64;
                } else {
                    for buffer in outputs.iter_mut() {
                        for j in i..buffer_len {
                            buffer[j] = 0.0;
                        }
                    }
                    self.playing = false;
                    self.position = total as f64;
                    self.publish();
                    return;
                }
            }

            let frame = self.position as usize;
            let t = (self.position - frame as f64) as f32;
            let next = if frame + 1 < total {
                frame + 1
            } else if self.looping {
                0
            } else {
                frame
            };

            for (ch, buffer) in outputs.iter_mut().enumerate() {
                let a = self.sample_at(frame, ch);
                let b = self.sample_at(next, ch);
                buffer[i] = (a + t * (b - a)) * volume;
            }

            self.position += step;
        }

        self.publish();
    }

    #[inline]
    fn num_inputs(&self) -> usize {
        0
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ProcessContext {
        ProcessContext {
            sample_rate: 48_000,
            buffer_size: Buffer::LEN,
        }
    }

    fn run(player: &mut SamplePlayer, msgs: Vec<PlayerMessage>) -> [Buffer; 2] {
        let mut out = [Buffer::SILENT, Buffer::SILENT];
        player.process(&ctx(), msgs.into_iter(), &[], &mut out);
        out
    }

    #[test]
    fn starts_paused_and_silent() {
        let mut player = SamplePlayer::new(ProgramAudio::new(vec![1.0; 4800], 2, 48_000));
        let out = run(&mut player, vec![]);
        assert!(out[0].iter().all(|&s| s == 0.0));
        assert!(!player.shared().is_playing());
    }

    #[test]
    fn play_emits_and_advances_position() {
        let mut player = SamplePlayer::new(ProgramAudio::new(vec![0.5; 9600], 2, 48_000));
        let shared = player.shared();
        let out = run(&mut player, vec![PlayerMessage::Play]);
        assert!(out[0].iter().all(|&s| (s - 0.5).abs() < 1e-6));
        assert!(shared.is_playing());
        assert!(shared.position_secs() > 0.0);
    }

    #[test]
    fn mono_program_duplicates_into_both_channels() {
        let mut player = SamplePlayer::new(ProgramAudio::new(vec![0.25; 4800], 1, 48_000));
        let out = run(&mut player, vec![PlayerMessage::Play]);
        assert_eq!(out[0][10], out[1][10]);
        assert!((out[0][10] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn stops_at_end_without_looping() {
        // 32 frames of audio, one 64-sample block consumes it all
        let mut player = SamplePlayer::new(ProgramAudio::new(vec![0.5; 64], 2, 48_000));
        let shared = player.shared();
        let out = run(&mut player, vec![PlayerMessage::Play]);
        assert!(!shared.is_playing());
        assert_eq!(out[0][40], 0.0); // tail is silence
        assert!((shared.position_secs() - shared.duration_secs()).abs() < 1e-9);
    }

    #[test]
    fn seek_moves_the_playhead() {
        let samples: Vec<f32> = (0..96_000).map(|i| (i / 2) as f32 / 48_000.0).collect();
        let mut player = SamplePlayer::new(ProgramAudio::new(samples, 2, 48_000));
        let out = run(
            &mut player,
            vec![PlayerMessage::Play, PlayerMessage::Seek(0.5)],
        );
        // First output sample comes from 0.5s into the source
        assert!((out[0][0] - 0.5).abs() < 1e-3);
    }
}
