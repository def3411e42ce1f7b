//! Stepwise render-scale control driven by GPU completion latency.
//!
//! The controller only ever moves the scale by one `step` per observation and
//! keeps it inside `[min_scale, max_scale]`. Decreases react to a single slow
//! frame; increases need a sustained run of fast frames and are suppressed for
//! a lockout window after any decrease. The thresholds are tuning values, not
//! contracts, and the whole loop can be switched off to pin the scale.

/// Tuning parameters for [`DynamicResolutionController`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ResolutionTuning {
    pub enabled: bool,
    pub initial_scale: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    pub step: f32,
    /// Latency (seconds) below which a frame counts as "fast".
    pub raise_below: f64,
    /// Latency (seconds) above which the scale is lowered immediately.
    pub lower_above: f64,
    /// How long frames must stay fast before the scale is raised.
    pub stable_secs: f64,
    /// How long increases stay locked out after a decrease.
    pub lockout_secs: f64,
}

impl Default for ResolutionTuning {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_scale: 1.0,
            min_scale: 0.5,
            max_scale: 1.25,
            step: 0.05,
            raise_below: 0.0075,
            lower_above: 0.0105,
            stable_secs: 2.0,
            lockout_secs: 5.0,
        }
    }
}

/// Outcome of one latency observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleChange {
    Unchanged,
    Raised(f32),
    Lowered(f32),
}

#[derive(Debug, Clone)]
pub struct DynamicResolutionController {
    tuning: ResolutionTuning,
    scale: f32,
    fast_since: Option<f64>,
    locked_until: Option<f64>,
}

impl DynamicResolutionController {
    pub fn new(tuning: ResolutionTuning) -> Self {
        let (lo, hi) = if tuning.min_scale <= tuning.max_scale {
            (tuning.min_scale, tuning.max_scale)
        } else {
            (tuning.max_scale, tuning.min_scale)
        };
        let tuning = ResolutionTuning {
            min_scale: lo,
            max_scale: hi,
            step: tuning.step.abs(),
            ..tuning
        };
        let scale = tuning.initial_scale.clamp(lo, hi);
        Self {
            tuning,
            scale,
            fast_since: None,
            locked_until: None,
        }
    }

    /// A controller that never changes `scale`.
    pub fn fixed(scale: f32) -> Self {
        Self::new(ResolutionTuning {
            enabled: false,
            initial_scale: scale,
            min_scale: scale,
            max_scale: scale,
            ..ResolutionTuning::default()
        })
    }

    #[inline]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    #[inline]
    pub fn tuning(&self) -> &ResolutionTuning {
        &self.tuning
    }

    #[inline]
    pub fn is_locked(&self, now: f64) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    /// Feeds the completion latency of the most recent submission.
    pub fn observe(&mut self, latency_secs: f64, now: f64) -> ScaleChange {
        if !self.tuning.enabled || !latency_secs.is_finite() {
            return ScaleChange::Unchanged;
        }

        if latency_secs > self.tuning.lower_above {
            self.fast_since = None;
            self.locked_until = Some(now + self.tuning.lockout_secs);
            let next = (self.scale - self.tuning.step).max(self.tuning.min_scale);
            if next < self.scale {
                self.scale = next;
                return ScaleChange::Lowered(next);
            }
            return ScaleChange::Unchanged;
        }

        if latency_secs >= self.tuning.raise_below {
            self.fast_since = None;
            return ScaleChange::Unchanged;
        }

        if self.is_locked(now) {
            // Stability is only measured once the lockout has expired.
            self.fast_since = None;
            return ScaleChange::Unchanged;
        }

        let since = *self.fast_since.get_or_insert(now);
        if now - since < self.tuning.stable_secs {
            return ScaleChange::Unchanged;
        }

        let next = (self.scale + self.tuning.step).min(self.tuning.max_scale);
        self.fast_since = Some(now);
        if next > self.scale {
            self.scale = next;
            ScaleChange::Raised(next)
        } else {
            ScaleChange::Unchanged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning() -> ResolutionTuning {
        ResolutionTuning {
            enabled: true,
            initial_scale: 1.0,
            min_scale: 0.5,
            max_scale: 1.2,
            step: 0.1,
            raise_below: 0.008,
            lower_above: 0.012,
            stable_secs: 1.0,
            lockout_secs: 3.0,
        }
    }

    #[test]
    fn slow_frame_lowers_by_one_step() {
        let mut ctl = DynamicResolutionController::new(tuning());
        assert!(matches!(ctl.observe(0.02, 0.0), ScaleChange::Lowered(s) if (s - 0.9).abs() < 1e-6));
        assert!((ctl.scale() - 0.9).abs() < 1e-6);
        assert!(ctl.is_locked(1.0));
    }

    #[test]
    fn sustained_fast_frames_raise_after_stable_window() {
        let mut ctl = DynamicResolutionController::new(tuning());
        assert_eq!(ctl.observe(0.004, 0.0), ScaleChange::Unchanged);
        assert_eq!(ctl.observe(0.004, 0.5), ScaleChange::Unchanged);
        assert!(matches!(ctl.observe(0.004, 1.0), ScaleChange::Raised(s) if (s - 1.1).abs() < 1e-6));
        // A new stable window is required for the next step.
        assert_eq!(ctl.observe(0.004, 1.5), ScaleChange::Unchanged);
    }

    #[test]
    fn middle_band_resets_stability() {
        let mut ctl = DynamicResolutionController::new(tuning());
        ctl.observe(0.004, 0.0);
        ctl.observe(0.010, 0.9);
        assert_eq!(ctl.observe(0.004, 1.0), ScaleChange::Unchanged);
        assert_eq!(ctl.observe(0.004, 1.5), ScaleChange::Unchanged);
        assert!(matches!(ctl.observe(0.004, 2.0), ScaleChange::Raised(_)));
    }

    #[test]
    fn lockout_blocks_increase() {
        let mut ctl = DynamicResolutionController::new(tuning());
        ctl.observe(0.02, 0.0);
        for i in 1..=5 {
            assert_eq!(ctl.observe(0.001, i as f64 * 0.5), ScaleChange::Unchanged);
        }
        // Lockout ends at 3.0, stability starts counting then.
        assert_eq!(ctl.observe(0.001, 3.0), ScaleChange::Unchanged);
        assert!(matches!(ctl.observe(0.001, 4.0), ScaleChange::Raised(_)));
    }

    #[test]
    fn scale_stays_within_bounds() {
        let mut ctl = DynamicResolutionController::new(tuning());
        for i in 0..20 {
            ctl.observe(1.0, i as f64);
        }
        assert!((ctl.scale() - 0.5).abs() < 1e-6);
        assert_eq!(ctl.observe(1.0, 100.0), ScaleChange::Unchanged);

        let mut ctl = DynamicResolutionController::new(tuning());
        for i in 0..100 {
            ctl.observe(0.0, i as f64 * 2.0);
        }
        assert!((ctl.scale() - 1.2).abs() < 1e-6);
    }

    #[test]
    fn disabled_controller_is_fixed() {
        let mut ctl = DynamicResolutionController::fixed(0.75);
        assert_eq!(ctl.observe(1.0, 0.0), ScaleChange::Unchanged);
        assert_eq!(ctl.observe(0.0, 10.0), ScaleChange::Unchanged);
        assert!((ctl.scale() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn inverted_bounds_are_normalised() {
        let ctl = DynamicResolutionController::new(ResolutionTuning {
            min_scale: 1.5,
            max_scale: 0.5,
            initial_scale: 2.0,
            ..tuning()
        });
        assert!((ctl.scale() - 1.5).abs() < 1e-6);
    }
}
