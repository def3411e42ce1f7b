//! Device pose queries at a predicted display timestamp.

use glam::{Mat4, Quat, Vec3};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Device-to-world rigid transform for one predicted timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub transform: Mat4,
    /// Media-clock seconds the pose was predicted for.
    pub timestamp: f64,
}

impl Pose {
    pub fn identity(timestamp: f64) -> Self {
        Self {
            transform: Mat4::IDENTITY,
            timestamp,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.transform.w_axis.truncate()
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_mat4(&self.transform)
    }

    /// Direction the device is looking, -Z of the device frame.
    pub fn forward(&self) -> Vec3 {
        -self.transform.z_axis.truncate()
    }
}

/// World tracking provider of the platform.
pub trait WorldTrackingProvider: Send + Sync {
    /// Device anchor predicted for `timestamp`, or `None` when tracking has no
    /// estimate yet. Must not block.
    fn query_device_anchor(&self, timestamp: f64) -> Option<Mat4>;
}

/// Wraps a provider and turns missing anchors into an identity pose.
pub struct PoseSource {
    provider: Arc<dyn WorldTrackingProvider>,
    misses: AtomicU64,
}

impl PoseSource {
    pub fn new(provider: Arc<dyn WorldTrackingProvider>) -> Self {
        Self {
            provider,
            misses: AtomicU64::new(0),
        }
    }

    pub fn query_pose(&self, predicted_timestamp: f64) -> Pose {
        match self.provider.query_device_anchor(predicted_timestamp) {
            Some(transform) => {
                let missed = self.misses.swap(0, Ordering::Relaxed);
                if missed > 0 {
                    log::info!("Device pose recovered after {missed} missed queries");
                }
                Pose {
                    transform,
                    timestamp: predicted_timestamp,
                }
            }
            None => {
                let missed = self.misses.fetch_add(1, Ordering::Relaxed) + 1;
                if missed == 1 {
                    log::warn!("No device anchor at t={predicted_timestamp:.4}, using identity pose");
                } else {
                    log::debug!("No device anchor ({missed} consecutive misses)");
                }
                Pose::identity(predicted_timestamp)
            }
        }
    }

    /// Consecutive queries that returned no anchor.
    pub fn consecutive_misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
