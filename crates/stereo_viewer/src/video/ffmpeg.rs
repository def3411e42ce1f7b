//! Container probing and decoding through the `ffprobe`/`ffmpeg` binaries.
//!
//! Both tools have to be on `PATH`. Decoders stream raw frames over a pipe
//! from a long-running child process; the child is killed when the reader is
//! dropped.

use super::{AudioChunk, SampleReader, VideoSample};
use crate::error::MediaError;
use std::{
    io::Read,
    path::{Path, PathBuf},
    process::{Child, ChildStdout, Command, Stdio},
};

/// Audio frames per decoded chunk.
pub const AUDIO_CHUNK_FRAMES: usize = 1024;

#[derive(Clone, Debug, PartialEq)]
pub struct VideoInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub duration_sec: f64,
    pub audio: Option<AudioTrackInfo>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioTrackInfo {
    pub sample_rate: u32,
    pub channels: u16,
}

impl VideoInfo {
    pub fn fps(&self) -> f64 {
        if self.fps_den == 0 {
            0.0
        } else {
            f64::from(self.fps_num) / f64::from(self.fps_den)
        }
    }

    /// Nominal seconds between frames, zero for an unknown rate.
    pub fn frame_interval(&self) -> f64 {
        if self.fps_num == 0 {
            0.0
        } else {
            f64::from(self.fps_den) / f64::from(self.fps_num)
        }
    }
}

pub fn probe(path: &Path) -> Result<VideoInfo, MediaError> {
    let out = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_streams", "-show_format"])
        .arg(path)
        .output()
        .map_err(|source| MediaError::Spawn {
            tool: "ffprobe",
            source,
        })?;
    if !out.status.success() {
        return Err(MediaError::Tool {
            tool: "ffprobe",
            path: path.to_path_buf(),
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        });
    }
    parse_probe(&out.stdout, path)
}

pub fn parse_probe(json: &[u8], path: &Path) -> Result<VideoInfo, MediaError> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
        sample_rate: Option<String>,
        channels: Option<u16>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let parsed: ProbeOut = serde_json::from_slice(json)?;
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| MediaError::invalid("no video stream found"))?;
    let (width, height) = video
        .width
        .zip(video.height)
        .filter(|(w, h)| *w > 0 && *h > 0)
        .ok_or_else(|| MediaError::invalid("missing video size from ffprobe"))?;
    let (fps_num, fps_den) = parse_ff_ratio(video.r_frame_rate.as_deref().unwrap_or("0/1"))
        .filter(|(num, _)| *num > 0)
        .ok_or_else(|| MediaError::invalid("invalid video r_frame_rate"))?;
    let duration_sec = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);
    let audio = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .and_then(|s| {
            let sample_rate = s.sample_rate.as_deref()?.parse::<u32>().ok()?;
            Some(AudioTrackInfo {
                sample_rate,
                channels: s.channels.unwrap_or(2).max(1),
            })
        });

    Ok(VideoInfo {
        path: path.to_path_buf(),
        width,
        height,
        fps_num,
        fps_den,
        duration_sec,
        audio,
    })
}

fn parse_ff_ratio(s: &str) -> Option<(u32, u32)> {
    let (num, den) = s.split_once('/')?;
    let den = den.parse::<u32>().ok().filter(|d| *d > 0)?;
    Some((num.parse().ok()?, den))
}

/// Kills the decoder when the reader goes away.
struct ChildGuard(Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn spawn_decoder(path: &Path, output_args: &[String]) -> Result<(ChildGuard, ChildStdout), MediaError> {
    let mut child = Command::new("ffmpeg")
        .args(["-v", "error", "-nostdin", "-i"])
        .arg(path)
        .args(output_args)
        .arg("pipe:1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| MediaError::Spawn { tool: "ffmpeg", source })?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| MediaError::invalid("ffmpeg stdout was not captured"))?;
    Ok((ChildGuard(child), stdout))
}

/// Reads up to `len` bytes, fewer only at the end of the stream.
fn read_up_to(reader: &mut impl Read, len: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(len);
    reader.take(len as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Fixed-size RGBA frames from a byte stream.
pub struct RawVideoReader<R> {
    inner: R,
    width: u32,
    height: u32,
    interval: f64,
    index: u64,
    _child: Option<ChildGuard>,
}

pub type FfmpegVideoReader = RawVideoReader<ChildStdout>;

impl<R: Read + Send> RawVideoReader<R> {
    pub fn from_reader(inner: R, width: u32, height: u32, interval: f64) -> Self {
        Self {
            inner,
            width,
            height,
            interval,
            index: 0,
            _child: None,
        }
    }
}

impl FfmpegVideoReader {
    pub fn open(info: &VideoInfo) -> Result<Self, MediaError> {
        let args = ["-an", "-f", "rawvideo", "-pix_fmt", "rgba"].map(String::from);
        let (child, stdout) = spawn_decoder(&info.path, &args)?;
        Ok(Self {
            _child: Some(child),
            ..Self::from_reader(stdout, info.width, info.height, info.frame_interval())
        })
    }
}

impl<R: Read + Send> SampleReader for RawVideoReader<R> {
    type Sample = VideoSample;

    fn copy_next_sample(&mut self) -> Result<Option<VideoSample>, MediaError> {
        let len = self.width as usize * self.height as usize * 4;
        if len == 0 {
            return Err(MediaError::invalid("video frame size is zero"));
        }
        let data = read_up_to(&mut self.inner, len)?;
        if data.is_empty() {
            return Ok(None);
        }
        if data.len() < len {
            log::warn!(
                "Truncated video frame {} ({} of {len} bytes), ending stream",
                self.index,
                data.len()
            );
            return Ok(None);
        }
        let pts = self.index as f64 * self.interval;
        self.index += 1;
        Ok(Some(VideoSample {
            pts,
            width: self.width,
            height: self.height,
            data,
        }))
    }
}

/// Interleaved little-endian f32 PCM from a byte stream.
pub struct PcmReader<R> {
    inner: R,
    sample_rate: u32,
    channels: u16,
    frames_read: u64,
    _child: Option<ChildGuard>,
}

pub type FfmpegAudioReader = PcmReader<ChildStdout>;

impl<R: Read + Send> PcmReader<R> {
    pub fn from_reader(inner: R, sample_rate: u32, channels: u16) -> Self {
        Self {
            inner,
            sample_rate,
            channels: channels.max(1),
            frames_read: 0,
            _child: None,
        }
    }
}

impl FfmpegAudioReader {
    /// Opens the audio track decoded at its own rate and channel count.
    pub fn open(info: &VideoInfo) -> Result<Option<Self>, MediaError> {
        let Some(track) = info.audio else {
            return Ok(None);
        };
        let args = [
            "-vn".to_string(),
            "-f".into(),
            "f32le".into(),
            "-acodec".into(),
            "pcm_f32le".into(),
            "-ac".into(),
            track.channels.to_string(),
            "-ar".into(),
            track.sample_rate.to_string(),
        ];
        let (child, stdout) = spawn_decoder(&info.path, &args)?;
        Ok(Some(Self {
            _child: Some(child),
            ..Self::from_reader(stdout, track.sample_rate, track.channels)
        }))
    }
}

impl<R: Read + Send> SampleReader for PcmReader<R> {
    type Sample = AudioChunk;

    fn copy_next_sample(&mut self) -> Result<Option<AudioChunk>, MediaError> {
        let frame_bytes = self.channels as usize * 4;
        let bytes = read_up_to(&mut self.inner, AUDIO_CHUNK_FRAMES * frame_bytes)?;
        let whole = bytes.len() - bytes.len() % frame_bytes;
        if whole == 0 {
            return Ok(None);
        }
        let samples: Vec<f32> = bytes[..whole]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let pts = self.frames_read as f64 / f64::from(self.sample_rate.max(1));
        self.frames_read += (whole / frame_bytes) as u64;
        Ok(Some(AudioChunk {
            pts,
            sample_rate: self.sample_rate,
            channels: self.channels,
            samples,
        }))
    }
}
