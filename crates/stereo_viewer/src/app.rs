use crate::{
    config::{Config, Tuning},
    error::CompositorError,
    frame_loop::{CycleReport, FrameLoop, LoopSettings},
    renderer::{context::GfxContext, CompositorSettings, StereoCompositor},
    tracking::{simulated::SimulatedPlatform, AuthorizationStatus, TrackingContext},
    video::{
        audio::{AudioFormat, AudioOutput, NullAudioOutput},
        device::CpalAudioOutput,
        ffmpeg::{self, FfmpegAudioReader, FfmpegVideoReader},
        source::VideoFrameSource,
    },
};
use anyhow::{Context, Result};
use pacing::VsyncClock;
use std::{sync::Arc, time::Instant};
use winit::{event::WindowEvent, window::Window};

/// Used when the monitor does not report its refresh rate.
const DEFAULT_REFRESH_HZ: f64 = 90.0;

pub struct App {
    pub compositor: StereoCompositor,
    pub frame_loop: FrameLoop,
    clock: Instant,
    vsync: VsyncClock,
}

impl App {
    pub async fn new(window: Arc<Window>, config: &Config, tuning: &Tuning) -> Result<Self> {
        let platform = simulated_platform(config);
        let tracking = Arc::new(TrackingContext::start(&platform).context("failed to start tracking")?);

        let gfx = GfxContext::new(window.clone()).await?;
        let max_texture = gfx.device.limits().max_texture_dimension_2d;

        let video = open_video(config, tuning)?;
        let frame_loop = FrameLoop::new(tracking, video, LoopSettings::new(config, tuning, max_texture));
        let compositor = StereoCompositor::new(
            gfx,
            frame_loop.initial_extent(),
            CompositorSettings::new(config, tuning),
        )?;

        let refresh_hz = window
            .current_monitor()
            .and_then(|m| m.refresh_rate_millihertz())
            .map(|mhz| f64::from(mhz) / 1000.0)
            .filter(|hz| *hz > 0.0)
            .unwrap_or(DEFAULT_REFRESH_HZ);
        log::info!("Display refresh {refresh_hz:.1} Hz");

        Ok(Self {
            compositor,
            frame_loop,
            clock: Instant::now(),
            vsync: VsyncClock::new(1.0 / refresh_hz),
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.compositor.resize_surface(new_size);
        }
    }

    /// Returns `true` when the event was consumed.
    pub fn handle_event(&mut self, event: &WindowEvent) -> bool {
        if let WindowEvent::Resized(physical_size) = event {
            self.resize(*physical_size);
        }
        false
    }

    /// Runs one display cycle timed by the redraw that triggered it.
    pub fn render(&mut self) -> Result<CycleReport, CompositorError> {
        let vsync = self.vsync.tick(self.clock.elapsed().as_secs_f64());
        self.frame_loop.run_cycle(&mut self.compositor, vsync)
    }
}

/// Desktop tracking session honoring the simulated permission denials.
pub fn simulated_platform(config: &Config) -> SimulatedPlatform {
    let status = |denied: bool| {
        if denied {
            AuthorizationStatus::Denied
        } else {
            AuthorizationStatus::Allowed
        }
    };
    SimulatedPlatform {
        hand_tracking: status(config.deny_hand_tracking),
        world_sensing: status(config.deny_world_sensing),
        ..SimulatedPlatform::default()
    }
}

pub fn open_video(config: &Config, tuning: &Tuning) -> Result<VideoFrameSource> {
    let info = ffmpeg::probe(&config.video).with_context(|| format!("failed to probe {}", config.video.display()))?;
    log::info!(
        "Video {}: {}x{} at {:.3} fps",
        info.path.display(),
        info.width,
        info.height,
        info.fps()
    );

    let reader = FfmpegVideoReader::open(&info)?;
    let source = VideoFrameSource::new(reader, info.frame_interval())?;
    if config.mute {
        return Ok(source);
    }

    match FfmpegAudioReader::open(&info)? {
        Some(audio) => {
            let output = default_audio_output();
            Ok(source
                .with_audio(audio, output, tuning.audio_lead)
                .context("failed to start audio output")?)
        }
        None => {
            log::info!("No audio track, playing video only");
            Ok(source)
        }
    }
}

/// The default device, or a discarding sink when the host has none.
fn default_audio_output() -> Box<dyn AudioOutput> {
    match CpalAudioOutput::open() {
        Ok(output) => Box::new(output),
        Err(e) => {
            log::warn!("{e}; audio will be discarded");
            Box::new(NullAudioOutput::new(AudioFormat::default()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn deny_flags_map_to_authorization() {
        let config = Config::parse_from(["stereo_viewer", "--video", "clip.mp4", "--deny-world-sensing"]);
        let platform = simulated_platform(&config);
        assert_eq!(platform.world_sensing, AuthorizationStatus::Denied);
        assert_eq!(platform.hand_tracking, AuthorizationStatus::Allowed);
        assert_eq!(platform.world_tracking, AuthorizationStatus::Allowed);
    }
}
