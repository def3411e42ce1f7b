//! Desktop stand-in for the headset's tracking session.

use super::{
    anchors::{
        AnchorEvent, AnchorUpdate, AnchorUpdateStream, Classification, MeshIndices, MeshPrimitive, PlaneAnchor,
        PlaneMesh,
    },
    AuthorizationStatus, Capability, ProviderKind, TrackingPlatform,
};
use crate::{error::TrackingError, pose::WorldTrackingProvider};
use glam::{EulerRot, Mat4, Quat, Vec3};
use std::{f32::consts::FRAC_PI_2, sync::Arc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

/// Standing viewer slowly looking around.
#[derive(Debug, Clone)]
pub struct SimulatedHeadTracking {
    pub height: f32,
    pub yaw_amplitude: f32,
    pub yaw_period: f32,
    pub pitch_amplitude: f32,
    pub pitch_period: f32,
}

impl Default for SimulatedHeadTracking {
    fn default() -> Self {
        Self {
            height: 1.6,
            yaw_amplitude: 0.35,
            yaw_period: 9.0,
            pitch_amplitude: 0.08,
            pitch_period: 5.0,
        }
    }
}

impl WorldTrackingProvider for SimulatedHeadTracking {
    fn query_device_anchor(&self, timestamp: f64) -> Option<Mat4> {
        // Tracking has no estimate before the session starts.
        if timestamp < 0.0 || !timestamp.is_finite() {
            return None;
        }
        let t = timestamp as f32;
        let tau = std::f32::consts::TAU;
        let yaw = self.yaw_amplitude * (tau * t / self.yaw_period).sin();
        let pitch = self.pitch_amplitude * (tau * t / self.pitch_period).sin();
        let rotation = Quat::from_euler(EulerRot::YXZ, yaw, pitch, 0.0);
        Some(Mat4::from_rotation_translation(rotation, Vec3::new(0.0, self.height, 0.0)))
    }
}

/// Capabilities and permission outcomes of a simulated session.
#[derive(Debug, Clone)]
pub struct SimulatedPlatform {
    pub world_tracking_supported: bool,
    pub world_tracking: AuthorizationStatus,
    pub hand_tracking: AuthorizationStatus,
    pub world_sensing: AuthorizationStatus,
    pub head: SimulatedHeadTracking,
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self {
            world_tracking_supported: true,
            world_tracking: AuthorizationStatus::Allowed,
            hand_tracking: AuthorizationStatus::Allowed,
            world_sensing: AuthorizationStatus::Allowed,
            head: SimulatedHeadTracking::default(),
        }
    }
}

impl TrackingPlatform for SimulatedPlatform {
    fn capabilities(&self) -> Vec<Capability> {
        vec![
            Capability {
                kind: ProviderKind::WorldTracking,
                supported: self.world_tracking_supported,
                authorization: self.world_tracking,
            },
            Capability {
                kind: ProviderKind::HandTracking,
                supported: true,
                authorization: self.hand_tracking,
            },
            Capability {
                kind: ProviderKind::SceneReconstruction,
                supported: true,
                authorization: self.world_sensing,
            },
        ]
    }

    fn world_tracking(&self) -> Result<Arc<dyn WorldTrackingProvider>, TrackingError> {
        Ok(Arc::new(self.head.clone()))
    }

    fn start_hand_tracking(&self) -> Result<(), TrackingError> {
        log::debug!("Simulated hand tracking started");
        Ok(())
    }

    /// Emits a small furnished room, then one refinement of the floor.
    fn anchor_updates(&self) -> Result<AnchorUpdateStream, TrackingError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let planes = room_planes();
        let floor = planes[0].clone();
        for anchor in planes {
            tx.send(AnchorUpdate {
                event: AnchorEvent::Added,
                anchor,
            })
            .map_err(|e| TrackingError::ProviderStart(e.to_string()))?;
        }
        let refined = PlaneAnchor {
            mesh: Arc::new(rect_mesh(4.5, 4.5)),
            ..floor
        };
        tx.send(AnchorUpdate {
            event: AnchorEvent::Updated,
            anchor: refined,
        })
        .map_err(|e| TrackingError::ProviderStart(e.to_string()))?;
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}

/// Rectangle in the anchor's XZ plane, normal +Y.
fn rect_mesh(width: f32, depth: f32) -> PlaneMesh {
    let (hw, hd) = (0.5 * width, 0.5 * depth);
    PlaneMesh {
        vertices: vec![[-hw, 0.0, -hd], [-hw, 0.0, hd], [hw, 0.0, hd], [hw, 0.0, -hd]],
        indices: MeshIndices::U16(vec![0, 1, 2, 0, 2, 3]),
        primitive: MeshPrimitive::Triangle,
    }
}

fn outline_mesh(width: f32, depth: f32) -> PlaneMesh {
    let rect = rect_mesh(width, depth);
    PlaneMesh {
        vertices: rect.vertices,
        indices: MeshIndices::U32(vec![0, 1, 1, 2, 2, 3, 3, 0]),
        primitive: MeshPrimitive::Line,
    }
}

fn plane(classification: Classification, transform: Mat4, mesh: PlaneMesh) -> PlaneAnchor {
    PlaneAnchor {
        id: Uuid::new_v4(),
        classification,
        origin_from_anchor: transform,
        mesh: Arc::new(mesh),
    }
}

/// A 4 m square room around the origin. The floor comes first.
pub fn room_planes() -> Vec<PlaneAnchor> {
    let wall = |yaw: f32, offset: Vec3| {
        Mat4::from_rotation_translation(
            Quat::from_rotation_y(yaw) * Quat::from_rotation_x(FRAC_PI_2),
            offset,
        )
    };
    vec![
        plane(Classification::Floor, Mat4::IDENTITY, rect_mesh(4.0, 4.0)),
        plane(
            Classification::Ceiling,
            Mat4::from_rotation_translation(Quat::from_rotation_x(std::f32::consts::PI), Vec3::new(0.0, 2.6, 0.0)),
            rect_mesh(4.0, 4.0),
        ),
        plane(Classification::Wall, wall(0.0, Vec3::new(0.0, 1.3, -2.0)), rect_mesh(4.0, 2.6)),
        plane(Classification::Wall, wall(FRAC_PI_2, Vec3::new(-2.0, 1.3, 0.0)), rect_mesh(4.0, 2.6)),
        plane(Classification::Wall, wall(-FRAC_PI_2, Vec3::new(2.0, 1.3, 0.0)), rect_mesh(4.0, 2.6)),
        plane(Classification::Door, wall(-FRAC_PI_2, Vec3::new(1.99, 1.0, 1.0)), outline_mesh(0.9, 2.0)),
        plane(Classification::Window, wall(0.0, Vec3::new(0.8, 1.5, -1.99)), rect_mesh(1.2, 1.0)),
        plane(
            Classification::Table,
            Mat4::from_translation(Vec3::new(0.0, 0.75, -1.0)),
            rect_mesh(1.2, 0.7),
        ),
        plane(
            Classification::Seat,
            Mat4::from_translation(Vec3::new(0.8, 0.45, -0.6)),
            rect_mesh(0.45, 0.45),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::anchors::SpatialMeshTracker;
    use futures::StreamExt;

    #[test]
    fn no_anchor_before_session_start() {
        let head = SimulatedHeadTracking::default();
        assert!(head.query_device_anchor(-0.5).is_none());
        let pose = head.query_device_anchor(0.0).unwrap();
        assert!((pose.w_axis.y - 1.6).abs() < 1e-6);
    }

    #[test]
    fn head_sways_over_time() {
        let head = SimulatedHeadTracking::default();
        let a = head.query_device_anchor(0.0).unwrap();
        let b = head.query_device_anchor(2.0).unwrap();
        assert!(!a.abs_diff_eq(b, 1e-4));
    }

    #[tokio::test]
    async fn room_stream_ends_and_skips_windows() {
        let platform = SimulatedPlatform::default();
        let updates: Vec<_> = platform.anchor_updates().unwrap().collect().await;
        assert_eq!(updates.len(), room_planes().len() + 1);

        let tracker = SpatialMeshTracker::new();
        for update in updates {
            tracker.apply(update);
        }
        assert_eq!(tracker.len(), room_planes().len() - 1);
        let floor = tracker
            .snapshot()
            .into_iter()
            .find(|a| a.classification == Classification::Floor)
            .unwrap();
        assert_eq!(floor.mesh.vertices[0], [-2.25, 0.0, -2.25]);
    }
}
