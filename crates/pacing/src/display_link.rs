//! Display-link timing and pose-timestamp prediction.

/// One vsync callback: when the current frame started and when the next one
/// is due on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VsyncTiming {
    /// Timestamp the upcoming frame is expected to be displayed at.
    pub target_timestamp: f64,
    /// Timestamp of the vsync that fired this callback.
    pub timestamp: f64,
}

impl VsyncTiming {
    /// Timing for a display refreshing every `interval` seconds, fired at `now`.
    pub fn at(now: f64, interval: f64) -> Self {
        Self {
            target_timestamp: now + interval,
            timestamp: now,
        }
    }

    #[inline]
    pub fn frame_duration(&self) -> f64 {
        self.target_timestamp - self.timestamp
    }
}

/// Weight of the newest measured interval in the running average.
const INTERVAL_SMOOTHING: f64 = 0.2;

/// Derives [`VsyncTiming`] from the instants redraws actually arrive at.
///
/// The refresh interval starts at the nominal monitor rate and follows the
/// measured spacing between ticks. Single samples are clamped to half and
/// twice the nominal interval so a stall does not throw the average off.
#[derive(Debug, Clone)]
pub struct VsyncClock {
    nominal: f64,
    interval: f64,
    last: Option<f64>,
}

impl VsyncClock {
    pub fn new(nominal_interval: f64) -> Self {
        Self {
            nominal: nominal_interval,
            interval: nominal_interval,
            last: None,
        }
    }

    /// Records a redraw at `now` and returns its timing.
    pub fn tick(&mut self, now: f64) -> VsyncTiming {
        if let Some(last) = self.last {
            let measured = (now - last).clamp(0.5 * self.nominal, 2.0 * self.nominal);
            self.interval += INTERVAL_SMOOTHING * (measured - self.interval);
        }
        self.last = Some(now);
        VsyncTiming::at(now, self.interval)
    }

    /// Current smoothed refresh interval.
    #[inline]
    pub fn interval(&self) -> f64 {
        self.interval
    }
}

/// Tracks the display cadence and extrapolates the timestamp poses should be
/// predicted for.
///
/// The prediction horizon is `prediction_frames` frame durations past the
/// target timestamp. Larger multipliers hide more pipeline latency at the cost
/// of more visible prediction error; 2 to 4 frames is the useful range.
#[derive(Debug, Clone)]
pub struct DisplayLink {
    prediction_frames: f64,
    frame_duration: f64,
    next_frame_time: f64,
    vsync_count: u64,
}

impl DisplayLink {
    pub fn new(prediction_frames: f64) -> Self {
        Self {
            prediction_frames: prediction_frames.max(0.0),
            frame_duration: 0.0,
            next_frame_time: 0.0,
            vsync_count: 0,
        }
    }

    /// Records a vsync and returns the measured frame duration.
    pub fn on_vsync(&mut self, timing: VsyncTiming) -> f64 {
        let duration = timing.frame_duration();
        if duration > 0.0 && duration.is_finite() {
            self.frame_duration = duration;
        }
        self.next_frame_time = timing.target_timestamp + self.frame_duration * self.prediction_frames;
        self.vsync_count += 1;
        self.frame_duration
    }

    /// Last positive frame duration seen, or zero before the first vsync.
    #[inline]
    pub fn frame_duration(&self) -> f64 {
        self.frame_duration
    }

    /// Timestamp poses should be queried for this cycle.
    #[inline]
    pub fn predicted_timestamp(&self) -> f64 {
        self.next_frame_time
    }

    #[inline]
    pub fn vsync_count(&self) -> u64 {
        self.vsync_count
    }

    #[inline]
    pub fn prediction_frames(&self) -> f64 {
        self.prediction_frames
    }
}
