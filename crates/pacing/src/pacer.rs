/// Decides how many video frames to advance per rendered frame.
///
/// Elapsed wall-clock time is accumulated against a frame interval. Each
/// whole interval in the accumulator is one advance; the remainder carries
/// over to the next call. A stalled renderer therefore catches up with several
/// advances at once, and a renderer faster than the video advances zero times
/// on some cycles.
#[derive(Debug, Clone, Default)]
pub struct FramePacer {
    leftover: f64,
    last_timestamp: Option<f64>,
}

impl FramePacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `wall_clock_delta` to the carried remainder and drains it in
    /// `interval` steps. Returns the advance count and the new remainder.
    pub fn frames_to_advance(&mut self, wall_clock_delta: f64, interval: f64) -> (u32, f64) {
        if interval <= 0.0 || !interval.is_finite() {
            return (0, self.leftover);
        }

        let mut acc = self.leftover + wall_clock_delta.max(0.0);
        let mut count = 0u32;
        while acc >= interval {
            acc -= interval;
            count += 1;
        }

        self.leftover = acc;
        (count, acc)
    }

    /// Measures the delta since the previous call and paces it.
    ///
    /// The very first call has no previous timestamp; it is seeded with exactly
    /// one interval so playback starts with a single advance instead of a burst.
    pub fn tick(&mut self, now: f64, interval: f64) -> u32 {
        let delta = match self.last_timestamp {
            Some(last) => now - last,
            None => interval,
        };
        self.last_timestamp = Some(now);
        self.frames_to_advance(delta, interval).0
    }

    #[inline]
    pub fn leftover(&self) -> f64 {
        self.leftover
    }

    /// Forgets timing history, e.g. after a pause.
    pub fn reset(&mut self) {
        self.leftover = 0.0;
        self.last_timestamp = None;
    }
}
