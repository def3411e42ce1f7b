//! Video container access and the hand-off between decode and render.
//!
//! Decoding runs on its own threads. The render thread pulls decoded samples
//! without blocking and keeps at most one pending frame, so stale frames are
//! dropped instead of queued.

pub mod audio;
pub mod device;
pub mod ffmpeg;
pub mod source;

use crate::error::MediaError;
use parking_lot::Mutex;

/// One decoded RGBA8 frame as produced by the container reader.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSample {
    /// Presentation timestamp in seconds from the start of the stream.
    pub pts: f64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// A frame ready to be uploaded to the video texture.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoImage {
    pub pts: f64,
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 rows, top row first.
    pub rgba: Vec<u8>,
}

impl VideoImage {
    pub fn from_sample(sample: VideoSample) -> Result<Self, MediaError> {
        let expected = sample.width as usize * sample.height as usize * 4;
        if expected == 0 || sample.data.len() != expected {
            return Err(MediaError::invalid(format!(
                "frame at {:.3}s has {} bytes, expected {expected} for {}x{} RGBA",
                sample.pts,
                sample.data.len(),
                sample.width,
                sample.height
            )));
        }
        Ok(Self {
            pts: sample.pts,
            width: sample.width,
            height: sample.height,
            rgba: sample.data,
        })
    }

    #[inline]
    pub fn bytes_per_row(&self) -> u32 {
        self.width * 4
    }
}

/// Interleaved f32 PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub pts: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioChunk {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames() as f64 / f64::from(self.sample_rate)
        }
    }
}

/// Pull-based access to one track of a container.
pub trait SampleReader: Send {
    type Sample: Send;

    /// Next decoded sample, or `None` at end of stream.
    fn copy_next_sample(&mut self) -> Result<Option<Self::Sample>, MediaError>;
}

/// Single-slot cell where a new value replaces any unconsumed one.
#[derive(Debug)]
pub struct LatestFrame<T> {
    slot: Mutex<Option<T>>,
}

impl<T> Default for LatestFrame<T> {
    fn default() -> Self {
        Self { slot: Mutex::new(None) }
    }
}

impl<T> LatestFrame<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`. Returns `true` if an unconsumed value was dropped.
    pub fn publish(&self, value: T) -> bool {
        self.slot.lock().replace(value).is_some()
    }

    pub fn take(&self) -> Option<T> {
        self.slot.lock().take()
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().is_some()
    }
}
