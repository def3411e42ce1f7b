//! The scene entity that shows the composited stereo texture to the platform
//! compositor: a plane kept in front of the viewer.

use crate::pose::Pose;
use glam::{Mat4, Quat, Vec3};
use std::f32::consts::FRAC_PI_2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoPlaneEntity {
    pub position: Vec3,
    pub orientation: Quat,
    pub scale: Vec3,
}

impl Default for VideoPlaneEntity {
    fn default() -> Self {
        Self {
            position: Vec3::NEG_Z,
            orientation: Quat::from_rotation_x(FRAC_PI_2),
            scale: Vec3::ONE,
        }
    }
}

impl VideoPlaneEntity {
    /// Places the plane `focal_distance` meters along the viewing direction.
    ///
    /// The plane mesh lies in its local XZ plane, so it is tilted up by a
    /// quarter turn to face the viewer.
    pub fn follow(&mut self, pose: &Pose, focal_distance: f32, scale: f32) {
        let back = pose.transform.z_axis.truncate();
        self.position = pose.position() - back * focal_distance;
        self.orientation = (pose.rotation() * Quat::from_rotation_x(FRAC_PI_2)).normalize();
        self.scale = Vec3::splat(scale);
    }

    pub fn transform(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.orientation, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_sits_in_front_of_viewer() {
        let mut plane = VideoPlaneEntity::default();
        let pose = Pose {
            transform: Mat4::from_translation(Vec3::new(0.0, 1.6, 0.0)),
            timestamp: 0.0,
        };
        plane.follow(&pose, 2.0, 1.5);
        assert!(plane.position.abs_diff_eq(Vec3::new(0.0, 1.6, -2.0), 1e-6));
        assert_eq!(plane.scale, Vec3::splat(1.5));
        // Local +Y (plane normal) points back at the viewer.
        let normal = plane.orientation * Vec3::Y;
        assert!(normal.abs_diff_eq(Vec3::Z, 1e-6));
    }

    #[test]
    fn plane_turns_with_the_head() {
        let mut plane = VideoPlaneEntity::default();
        let pose = Pose {
            transform: Mat4::from_quat(Quat::from_rotation_y(FRAC_PI_2)),
            timestamp: 0.0,
        };
        plane.follow(&pose, 1.0, 1.0);
        // Turning left puts the plane on -X.
        assert!(plane.position.abs_diff_eq(Vec3::NEG_X, 1e-6));
    }
}
