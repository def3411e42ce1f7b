//! Rolling per-cycle timing statistics.

use std::collections::VecDeque;

/// Rolling window of CPU cycle and GPU completion times, in milliseconds.
#[derive(Debug)]
pub struct FrameTiming {
    cycle_ms: VecDeque<f64>,
    gpu_ms: VecDeque<f64>,
    window_size: usize,
    /// Frame budget in milliseconds (11.1 for 90 Hz).
    budget_ms: f64,
    total_frames: u64,
    missed_frames: u64,
}

impl Default for FrameTiming {
    fn default() -> Self {
        Self::new(900, 1000.0 / 90.0)
    }
}

impl FrameTiming {
    pub fn new(window_size: usize, budget_ms: f64) -> Self {
        let window_size = window_size.max(1);
        Self {
            cycle_ms: VecDeque::with_capacity(window_size),
            gpu_ms: VecDeque::with_capacity(window_size),
            window_size,
            budget_ms,
            total_frames: 0,
            missed_frames: 0,
        }
    }

    pub fn set_budget_ms(&mut self, budget_ms: f64) {
        if budget_ms > 0.0 {
            self.budget_ms = budget_ms;
        }
    }

    /// Records one cycle. A cycle longer than the budget counts as missed.
    pub fn record(&mut self, cycle_ms: f64, gpu_ms: Option<f64>) {
        Self::push_sample(&mut self.cycle_ms, cycle_ms, self.window_size);
        if let Some(gpu) = gpu_ms {
            Self::push_sample(&mut self.gpu_ms, gpu, self.window_size);
        }
        self.total_frames += 1;
        if cycle_ms > self.budget_ms {
            self.missed_frames += 1;
        }
    }

    fn push_sample(samples: &mut VecDeque<f64>, value: f64, window_size: usize) {
        if samples.len() == window_size {
            samples.pop_front();
        }
        samples.push_back(value);
    }

    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }
        let idx = ((sorted.len() as f64 - 1.0) * p / 100.0).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    fn sorted(samples: &VecDeque<f64>) -> Vec<f64> {
        let mut v: Vec<f64> = samples.iter().copied().collect();
        v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        v
    }

    pub fn stats(&self) -> FrameTimingStats {
        let cycle = Self::sorted(&self.cycle_ms);
        let gpu = Self::sorted(&self.gpu_ms);
        FrameTimingStats {
            cycle_p50: Self::percentile(&cycle, 50.0),
            cycle_p99: Self::percentile(&cycle, 99.0),
            gpu_p50: Self::percentile(&gpu, 50.0),
            gpu_p99: Self::percentile(&gpu, 99.0),
            missed_pct: if self.total_frames > 0 {
                (self.missed_frames as f64 / self.total_frames as f64) * 100.0
            } else {
                0.0
            },
            total_frames: self.total_frames,
            missed_frames: self.missed_frames,
        }
    }

    #[inline]
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameTimingStats {
    pub cycle_p50: f64,
    pub cycle_p99: f64,
    pub gpu_p50: f64,
    pub gpu_p99: f64,
    pub missed_pct: f64,
    pub total_frames: u64,
    pub missed_frames: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stats_are_zero() {
        let stats = FrameTiming::new(10, 11.1).stats();
        assert_eq!(stats.total_frames, 0);
        assert_eq!(stats.cycle_p50, 0.0);
        assert_eq!(stats.missed_pct, 0.0);
    }

    #[test]
    fn missed_frames_follow_budget() {
        let mut ft = FrameTiming::new(10, 11.1);
        ft.record(12.0, Some(4.0));
        ft.record(7.0, None);
        let stats = ft.stats();
        assert_eq!(stats.total_frames, 2);
        assert_eq!(stats.missed_frames, 1);
        assert!((stats.missed_pct - 50.0).abs() < 1e-9);
        assert!((stats.gpu_p50 - 4.0).abs() < 1e-9);
    }

    #[test]
    fn window_is_bounded() {
        let mut ft = FrameTiming::new(3, 100.0);
        for v in [1.0, 2.0, 3.0, 40.0, 50.0] {
            ft.record(v, None);
        }
        let stats = ft.stats();
        assert_eq!(stats.total_frames, 5);
        assert!((stats.cycle_p50 - 40.0).abs() < 1e-9);
    }
}
