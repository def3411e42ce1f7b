//! Error types for the compositor library.
//!
//! Everything here is fatal for the session when it reaches `main`. Soft
//! conditions (no pose this frame, no pending video sample, end of stream)
//! are not errors and are only logged where they occur.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum CompositorError {
    #[error("no suitable GPU adapter found")]
    NoAdapter,

    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("surface reports no supported formats")]
    UnsupportedSurface,

    #[error("failed to request device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("pipeline '{label}' failed to compile: {message}")]
    PipelineCompilation { label: &'static str, message: String },

    #[error("GPU device error: {0}")]
    DeviceLost(String),

    #[error("surface ran out of memory")]
    SurfaceOutOfMemory,
}

#[derive(thiserror::Error, Debug)]
pub enum MediaError {
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed for '{}': {stderr}", path.display())]
    Tool {
        tool: &'static str,
        path: PathBuf,
        stderr: String,
    },

    #[error("probe output could not be parsed: {0}")]
    Probe(#[from] serde_json::Error),

    #[error("invalid media: {0}")]
    Invalid(String),

    #[error("decoder pipe error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TrackingError {
    #[error("world tracking is required but {0}")]
    WorldTrackingUnavailable(&'static str),

    #[error("failed to start tracking provider: {0}")]
    ProviderStart(String),

    #[error("failed to spawn anchor update thread: {0}")]
    Thread(#[source] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum AudioError {
    #[error("audio output failed to start: {0}")]
    Start(String),

    #[error("unsupported audio format: {channels} channel(s) at {sample_rate} Hz")]
    UnsupportedFormat { channels: u16, sample_rate: u32 },
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read tuning file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse tuning file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_stable() {
        let err = CompositorError::PipelineCompilation {
            label: "Video Quad",
            message: "bad entry point".into(),
        };
        assert!(err.to_string().contains("Video Quad"));
        assert_eq!(
            CompositorError::UnsupportedSurface.to_string(),
            "surface reports no supported formats"
        );
        assert!(TrackingError::WorldTrackingUnavailable("not supported")
            .to_string()
            .starts_with("world tracking is required"));
        assert!(MediaError::invalid("zero size").to_string().contains("zero size"));
    }

    #[test]
    fn tool_error_names_the_file() {
        let err = MediaError::Tool {
            tool: "ffprobe",
            path: PathBuf::from("clip.mp4"),
            stderr: "no such file".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ffprobe") && msg.contains("clip.mp4"));
    }
}
