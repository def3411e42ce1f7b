//! The per-display-cycle driver.
//!
//! One call to [`FrameLoop::run_cycle`] per vsync: predict and query the pose,
//! pace the video, encode both eyes into one submission, wait per the sync
//! mode, then apply any resolution change at the cycle boundary.

use crate::{
    config::{Config, Packing, Tuning},
    error::CompositorError,
    overlay::VideoPlaneEntity,
    pose::Pose,
    renderer::targets::{StereoExtent, TargetPlan},
    tracking::{anchors::PlaneAnchor, TrackingContext},
    video::{
        source::{AdvanceOutcome, VideoFrameSource},
        LatestFrame, VideoImage,
    },
};
use pacing::{
    DisplayLink, DynamicResolutionController, FramePacer, FrameTiming, ResolutionTuning, ScaleChange, VsyncTiming,
};
use std::{sync::Arc, time::Instant};

pub const EYE_COUNT: usize = 2;

/// Cycles between timing summaries in the log.
const STATS_EVERY: u64 = 900;

/// Everything a renderer needs to encode one eye.
pub struct FrameInputs<'a> {
    pub cycle: u64,
    /// Pose predicted for this cycle's display time.
    pub pose: Pose,
    /// Pose of the cycle that delivered the visible video frame.
    pub frame_pose: Pose,
    pub anchors: &'a [PlaneAnchor],
    pub extent: StereoExtent,
}

/// The GPU side of a cycle. Calls arrive in a fixed order:
/// `write_uniforms(0)`, `draw_eye(0)`, `write_uniforms(1)`, `draw_eye(1)`,
/// `submit`, `wait`.
pub trait FrameRenderer {
    fn upload_video(&mut self, image: &VideoImage);

    fn write_uniforms(&mut self, eye: usize, inputs: &FrameInputs<'_>);

    fn draw_eye(&mut self, eye: usize, inputs: &FrameInputs<'_>) -> Result<(), CompositorError>;

    fn submit(&mut self) -> Result<(), CompositorError>;

    /// Waits as the sync mode requires. Returns the submit-to-completion
    /// latency of the newest finished submission, if one finished.
    fn wait(&mut self) -> Result<Option<f64>, CompositorError>;

    /// Recreates color, depth and viewports. Only called between cycles.
    fn resize_target(&mut self, extent: StereoExtent) -> Result<(), CompositorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    PoseQueried,
    FramesAdvanced(u32),
    UniformsWritten(usize),
    Drawn(usize),
    Submitted,
    Completed,
}

impl CycleState {
    pub fn can_follow(self, prev: CycleState) -> bool {
        use CycleState::*;
        matches!(
            (prev, self),
            (Idle, PoseQueried)
                | (PoseQueried, FramesAdvanced(_))
                | (FramesAdvanced(_), UniformsWritten(0))
                | (UniformsWritten(0), Drawn(0))
                | (Drawn(0), UniformsWritten(1))
                | (UniformsWritten(1), Drawn(1))
                | (Drawn(1), Submitted)
                | (Submitted, Completed)
                | (Completed, Idle)
        )
    }
}

/// States visited by the current (or last) cycle.
#[derive(Debug, Clone)]
pub struct CycleTrace {
    state: CycleState,
    history: Vec<CycleState>,
}

impl Default for CycleTrace {
    fn default() -> Self {
        Self {
            state: CycleState::Idle,
            history: vec![CycleState::Idle],
        }
    }
}

impl CycleTrace {
    /// Starts a new cycle from idle, whatever state a failed cycle left.
    fn begin(&mut self) {
        self.state = CycleState::Idle;
        self.history.clear();
        self.history.push(CycleState::Idle);
        self.enter(CycleState::PoseQueried);
    }

    fn enter(&mut self, next: CycleState) {
        debug_assert!(next.can_follow(self.state), "{:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    pub fn history(&self) -> &[CycleState] {
        &self.history
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    /// Times `advance_frame` was invoked this cycle.
    pub advance_calls: u32,
    pub delivered: bool,
    pub gpu_latency: Option<f64>,
    /// Extent this cycle was rendered at.
    pub extent: StereoExtent,
    pub scale: f32,
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub eye_width: u32,
    pub eye_height: u32,
    pub packing: Packing,
    pub prediction_frames: f64,
    pub resolution: ResolutionTuning,
    pub focal_distance: f32,
    pub overlay_scale: f32,
    pub max_planes: usize,
    /// Device limit for either side of the stereo texture.
    pub max_texture_dimension: u32,
}

impl LoopSettings {
    pub fn new(config: &Config, tuning: &Tuning, max_texture_dimension: u32) -> Self {
        Self {
            eye_width: config.eye_width,
            eye_height: config.eye_height,
            packing: config.packing,
            prediction_frames: config.prediction_frames,
            resolution: tuning.resolution.clone(),
            focal_distance: tuning.focal_distance,
            overlay_scale: tuning.overlay_scale,
            max_planes: tuning.max_planes,
            max_texture_dimension,
        }
    }

    /// Anchors drawn per cycle; each is drawn once per eye with its own slot.
    pub fn anchors_per_cycle(&self) -> usize {
        (self.max_planes / EYE_COUNT).max(1)
    }
}

pub struct FrameLoop {
    tracking: Arc<TrackingContext>,
    video: VideoFrameSource,
    delivered: Arc<LatestFrame<VideoImage>>,
    display_link: DisplayLink,
    pacer: FramePacer,
    resolution: DynamicResolutionController,
    plan: TargetPlan,
    overlay: VideoPlaneEntity,
    frame_pose: Pose,
    timing: FrameTiming,
    trace: CycleTrace,
    settings: LoopSettings,
    cycle: u64,
    warned_plane_cap: bool,
}

impl FrameLoop {
    pub fn new(tracking: Arc<TrackingContext>, mut video: VideoFrameSource, settings: LoopSettings) -> Self {
        let delivered = Arc::new(LatestFrame::new());
        let sink = delivered.clone();
        video.set_frame_callback(move |image| {
            sink.publish(image);
        });

        let resolution = DynamicResolutionController::new(settings.resolution.clone());
        let plan = TargetPlan::new(
            settings.eye_width,
            settings.eye_height,
            settings.packing,
            resolution.scale(),
            settings.max_texture_dimension,
        );
        Self {
            tracking,
            video,
            delivered,
            display_link: DisplayLink::new(settings.prediction_frames),
            pacer: FramePacer::new(),
            resolution,
            plan,
            overlay: VideoPlaneEntity::default(),
            frame_pose: Pose::identity(0.0),
            timing: FrameTiming::default(),
            trace: CycleTrace::default(),
            settings,
            cycle: 0,
            warned_plane_cap: false,
        }
    }

    /// Extent the renderer's target has to be created with.
    pub fn initial_extent(&self) -> StereoExtent {
        self.plan.current()
    }

    pub fn run_cycle<R: FrameRenderer>(
        &mut self,
        renderer: &mut R,
        vsync: VsyncTiming,
    ) -> Result<CycleReport, CompositorError> {
        let started = Instant::now();

        let frame_duration = self.display_link.on_vsync(vsync);
        let pose = self
            .tracking
            .pose_source()
            .query_pose(self.display_link.predicted_timestamp());
        self.trace.begin();

        let advance_calls = self.pacer.tick(vsync.timestamp, self.video.frame_interval());
        for _ in 0..advance_calls {
            if self.video.advance_frame() == AdvanceOutcome::Ended {
                break;
            }
        }
        self.video.deliver_pending_frame();
        let delivered = match self.delivered.take() {
            Some(image) => {
                renderer.upload_video(&image);
                self.frame_pose = pose;
                true
            }
            None => false,
        };
        self.video.pump_audio();
        self.trace.enter(CycleState::FramesAdvanced(advance_calls));

        let mut anchors = self.tracking.meshes().snapshot();
        // Stable order so the capped subset does not change between cycles.
        anchors.sort_unstable_by_key(|a| a.id);
        let cap = self.settings.anchors_per_cycle();
        if anchors.len() > cap {
            if !self.warned_plane_cap {
                log::warn!("{} anchors tracked, drawing only {cap} per cycle", anchors.len());
                self.warned_plane_cap = true;
            }
            anchors.truncate(cap);
        }

        let extent = self.plan.current();
        let inputs = FrameInputs {
            cycle: self.cycle,
            pose,
            frame_pose: self.frame_pose,
            anchors: &anchors,
            extent,
        };
        for eye in 0..EYE_COUNT {
            renderer.write_uniforms(eye, &inputs);
            self.trace.enter(CycleState::UniformsWritten(eye));
            renderer.draw_eye(eye, &inputs)?;
            self.trace.enter(CycleState::Drawn(eye));
        }

        self.overlay
            .follow(&pose, self.settings.focal_distance, self.settings.overlay_scale);
        renderer.submit()?;
        self.trace.enter(CycleState::Submitted);
        let gpu_latency = renderer.wait()?;
        self.trace.enter(CycleState::Completed);

        // Cycle boundary: apply what the previous cycle asked for, then
        // record what this one measured.
        if let Some(next) = self.plan.reconcile() {
            log::info!(
                "Render target now {}x{} per eye (scale {:.2})",
                next.eye_width,
                next.eye_height,
                self.resolution.scale()
            );
            renderer.resize_target(next)?;
        }
        if let Some(latency) = gpu_latency {
            match self.resolution.observe(latency, vsync.timestamp) {
                ScaleChange::Unchanged => {}
                ScaleChange::Raised(scale) | ScaleChange::Lowered(scale) => {
                    log::debug!("GPU latency {:.2} ms, scale -> {scale:.2}", latency * 1000.0);
                    self.plan.request_scale(scale);
                }
            }
        }

        self.timing.set_budget_ms(frame_duration * 1000.0);
        let cycle_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.timing.record(cycle_ms, gpu_latency.map(|l| l * 1000.0));
        if self.timing.total_frames() % STATS_EVERY == 0 {
            let stats = self.timing.stats();
            log::info!(
                "cycle p50 {:.2} ms p99 {:.2} ms, gpu p50 {:.2} ms p99 {:.2} ms, missed {:.1}%",
                stats.cycle_p50,
                stats.cycle_p99,
                stats.gpu_p50,
                stats.gpu_p99,
                stats.missed_pct
            );
        }

        self.trace.enter(CycleState::Idle);
        let report = CycleReport {
            cycle: self.cycle,
            advance_calls,
            delivered,
            gpu_latency,
            extent,
            scale: self.resolution.scale(),
        };
        self.cycle += 1;
        Ok(report)
    }

    pub fn trace(&self) -> &CycleTrace {
        &self.trace
    }

    pub fn overlay(&self) -> &VideoPlaneEntity {
        &self.overlay
    }

    pub fn stats(&self) -> pacing::FrameTimingStats {
        self.timing.stats()
    }
}
