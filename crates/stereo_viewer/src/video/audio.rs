//! Audio format conversion and the playback sink abstraction.

use super::AudioChunk;
use crate::error::AudioError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

/// Converts `chunk` to `target`: channel remix first, then linear resampling.
pub fn convert(chunk: &AudioChunk, target: AudioFormat) -> AudioChunk {
    let src_channels = usize::from(chunk.channels.max(1));
    let dst_channels = usize::from(target.channels.max(1));
    let remixed = remix(&chunk.samples, src_channels, dst_channels);
    let samples = if chunk.sample_rate == target.sample_rate || chunk.sample_rate == 0 {
        remixed
    } else {
        resample_linear(&remixed, dst_channels, chunk.sample_rate, target.sample_rate)
    };
    AudioChunk {
        pts: chunk.pts,
        sample_rate: target.sample_rate,
        channels: dst_channels as u16,
        samples,
    }
}

fn remix(src: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to {
        return src.to_vec();
    }
    let frames = src.len() / from;
    let mut out = Vec::with_capacity(frames * to);
    for frame in src.chunks_exact(from) {
        if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            // Extra output channels repeat the source layout.
            out.extend((0..to).map(|c| frame[c % from]));
        }
    }
    out
}

fn resample_linear(src: &[f32], channels: usize, from_rate: u32, to_rate: u32) -> Vec<f32> {
    let src_frames = src.len() / channels;
    if src_frames == 0 {
        return Vec::new();
    }
    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let dst_frames = ((src_frames as f64) / ratio).round() as usize;
    let mut out = Vec::with_capacity(dst_frames * channels);
    for i in 0..dst_frames {
        let pos = i as f64 * ratio;
        let f0 = (pos.floor() as usize).min(src_frames - 1);
        let f1 = (f0 + 1).min(src_frames - 1);
        let frac = (pos - f0 as f64) as f32;
        for c in 0..channels {
            let v0 = src[f0 * channels + c];
            let v1 = src[f1 * channels + c];
            out.push(v0 + (v1 - v0) * frac);
        }
    }
    out
}

/// Playback device the decoded audio is scheduled on.
pub trait AudioOutput: Send {
    /// Native format samples must be converted to before scheduling.
    fn format(&self) -> AudioFormat;

    fn start(&mut self) -> Result<(), AudioError>;

    fn schedule(&mut self, chunk: AudioChunk);

    /// Seconds of audio scheduled so far.
    fn scheduled_secs(&self) -> f64;
}

/// Accepts and discards audio, keeping count of what was scheduled.
#[derive(Debug, Default)]
pub struct NullAudioOutput {
    format: AudioFormat,
    started: bool,
    scheduled_frames: u64,
}

impl NullAudioOutput {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}

impl AudioOutput for NullAudioOutput {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn start(&mut self) -> Result<(), AudioError> {
        if self.format.channels == 0 || self.format.sample_rate == 0 {
            return Err(AudioError::UnsupportedFormat {
                channels: self.format.channels,
                sample_rate: self.format.sample_rate,
            });
        }
        self.started = true;
        log::info!(
            "Audio output started ({} Hz, {} ch, discarding)",
            self.format.sample_rate,
            self.format.channels
        );
        Ok(())
    }

    fn schedule(&mut self, chunk: AudioChunk) {
        if self.started {
            self.scheduled_frames += chunk.frames() as u64;
        }
    }

    fn scheduled_secs(&self) -> f64 {
        self.scheduled_frames as f64 / f64::from(self.format.sample_rate.max(1))
    }
}
