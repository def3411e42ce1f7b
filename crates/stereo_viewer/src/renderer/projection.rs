//! Per-eye view and projection math.
//!
//! All matrices are right handed with the camera looking down -Z. Depth is
//! reversed: the near plane maps to 1.0 and the far plane to 0.0, so the depth
//! buffer is cleared to 0.0 and compared with `Greater`.

use glam::{Mat4, Vec4};
use serde::{Deserialize, Serialize};

/// Field of view as the tangents of the four half angles, all positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FovTangents {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl Default for FovTangents {
    fn default() -> Self {
        Self {
            left: 60f32.to_radians().tan(),
            right: 45f32.to_radians().tan(),
            top: 45f32.to_radians().tan(),
            bottom: 50f32.to_radians().tan(),
        }
    }
}

impl FovTangents {
    /// Replaces left and right with their average so both eyes share one
    /// frustum. Vertical tangents are kept as they are.
    pub fn symmetrize(self) -> Self {
        let avg = 0.5 * (self.left + self.right);
        Self {
            left: avg,
            right: avg,
            ..self
        }
    }

    pub fn as_vec4(&self) -> [f32; 4] {
        [self.left, self.right, self.top, self.bottom]
    }
}

/// Off-center reversed-Z projection.
pub fn reversed_z(t: FovTangents, near: f32, far: f32) -> Mat4 {
    let w = t.left + t.right;
    let h = t.top + t.bottom;
    let depth = far - near;
    Mat4::from_cols(
        Vec4::new(2.0 / w, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 2.0 / h, 0.0, 0.0),
        Vec4::new((t.right - t.left) / w, (t.top - t.bottom) / h, near / depth, -1.0),
        Vec4::new(0.0, 0.0, near * far / depth, 0.0),
    )
}

/// Projection used for both eyes: symmetrized tangents, reversed Z.
pub fn eye_projection(t: FovTangents, near: f32, far: f32) -> Mat4 {
    reversed_z(t.symmetrize(), near, far)
}

/// Head-to-eye transform. Eye 0 is the left eye.
pub fn eye_offset(eye: usize, ipd: f32) -> Mat4 {
    let half = 0.5 * ipd;
    let x = if eye == 0 { -half } else { half };
    Mat4::from_translation(glam::Vec3::new(x, 0.0, 0.0))
}

/// World-to-eye view matrix for this cycle's pose.
pub fn view_matrix(pose: Mat4, eye: usize, ipd: f32) -> Mat4 {
    (pose * eye_offset(eye, ipd)).inverse()
}

pub fn strip_translation(m: Mat4) -> Mat4 {
    let mut out = m;
    out.w_axis = Vec4::W;
    out
}

/// Rotation-only correction for a video frame rendered from `frame_pose`
/// while the head is now at `current_pose`.
pub fn frame_model_view(frame_pose: Mat4, current_pose: Mat4) -> Mat4 {
    let frame = strip_translation(frame_pose);
    let current = strip_translation(current_pose);
    (frame.inverse() * current).inverse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    const EPS: f32 = 1e-5;

    fn ndc(proj: Mat4, p: Vec3) -> Vec3 {
        let clip = proj * p.extend(1.0);
        clip.truncate() / clip.w
    }

    #[test]
    fn symmetrized_projection_ignores_left_right_swap() {
        let t = FovTangents::default();
        let swapped = FovTangents {
            left: t.right,
            right: t.left,
            ..t
        };
        let a = eye_projection(t, 0.1, 10.0);
        let b = eye_projection(swapped, 0.1, 10.0);
        assert!(a.abs_diff_eq(b, EPS));
    }

    #[test]
    fn depth_is_reversed() {
        let proj = reversed_z(FovTangents::default(), 0.1, 10.0);
        assert!((ndc(proj, Vec3::new(0.0, 0.0, -0.1)).z - 1.0).abs() < EPS);
        assert!(ndc(proj, Vec3::new(0.0, 0.0, -10.0)).z.abs() < EPS);
        let mid = ndc(proj, Vec3::new(0.0, 0.0, -1.0)).z;
        assert!(mid > 0.0 && mid < 1.0);
    }

    #[test]
    fn frustum_edges_map_to_ndc_edges() {
        let t = FovTangents {
            left: 1.5,
            right: 0.5,
            top: 1.0,
            bottom: 0.25,
        };
        let proj = reversed_z(t, 0.1, 10.0);
        let z = -2.0;
        assert!((ndc(proj, Vec3::new(-t.left * 2.0, 0.0, z)).x + 1.0).abs() < EPS);
        assert!((ndc(proj, Vec3::new(t.right * 2.0, 0.0, z)).x - 1.0).abs() < EPS);
        assert!((ndc(proj, Vec3::new(0.0, t.top * 2.0, z)).y - 1.0).abs() < EPS);
        assert!((ndc(proj, Vec3::new(0.0, -t.bottom * 2.0, z)).y + 1.0).abs() < EPS);
    }

    #[test]
    fn eyes_are_ipd_apart() {
        let pose = Mat4::from_translation(Vec3::new(0.0, 1.6, 0.0));
        let left = view_matrix(pose, 0, 0.064).inverse().w_axis;
        let right = view_matrix(pose, 1, 0.064).inverse().w_axis;
        assert!(((right - left).x - 0.064).abs() < EPS);
        assert!((left.y - 1.6).abs() < EPS);
    }

    #[test]
    fn frame_correction_is_identity_for_same_rotation() {
        let rot = Mat4::from_quat(Quat::from_rotation_y(0.4));
        let frame = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)) * rot;
        let now = Mat4::from_translation(Vec3::new(-4.0, 0.0, 0.5)) * rot;
        assert!(frame_model_view(frame, now).abs_diff_eq(Mat4::IDENTITY, EPS));
    }

    #[test]
    fn frame_correction_drops_translation() {
        let frame = Mat4::from_quat(Quat::from_rotation_y(0.1));
        let now = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)) * Mat4::from_quat(Quat::from_rotation_y(0.3));
        let m = frame_model_view(frame, now);
        assert!(m.w_axis.abs_diff_eq(Vec4::W, EPS));
    }
}
