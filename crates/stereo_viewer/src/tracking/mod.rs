//! Tracking session: which providers run, and the state they feed.
//!
//! A [`TrackingContext`] is built once by the application and handed to the
//! frame loop by reference. World tracking is mandatory; hand tracking and
//! scene reconstruction are optional and simply left out of the active set
//! when unsupported or denied.

pub mod anchors;
pub mod simulated;

use self::anchors::{spawn_anchor_updates, AnchorUpdateStream, SpatialMeshTracker};
use crate::{
    error::TrackingError,
    pose::{PoseSource, WorldTrackingProvider},
};
use std::{sync::Arc, thread::JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    WorldTracking,
    HandTracking,
    SceneReconstruction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Allowed,
    Denied,
    /// Not asked yet; the session prompts when the provider starts.
    NotDetermined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    pub kind: ProviderKind,
    pub supported: bool,
    pub authorization: AuthorizationStatus,
}

impl Capability {
    pub fn usable(&self) -> bool {
        self.supported && self.authorization != AuthorizationStatus::Denied
    }
}

/// The platform side of a tracking session.
pub trait TrackingPlatform {
    fn capabilities(&self) -> Vec<Capability>;

    fn world_tracking(&self) -> Result<Arc<dyn WorldTrackingProvider>, TrackingError>;

    fn start_hand_tracking(&self) -> Result<(), TrackingError>;

    fn anchor_updates(&self) -> Result<AnchorUpdateStream, TrackingError>;
}

pub struct TrackingContext {
    pose_source: PoseSource,
    meshes: Arc<SpatialMeshTracker>,
    active: Vec<ProviderKind>,
    _anchor_thread: Option<JoinHandle<()>>,
}

impl TrackingContext {
    pub fn start(platform: &dyn TrackingPlatform) -> Result<Self, TrackingError> {
        let caps = platform.capabilities();
        let find = |kind| caps.iter().copied().find(|c| c.kind == kind);

        match find(ProviderKind::WorldTracking) {
            Some(cap) if cap.usable() => {}
            Some(cap) if cap.supported => return Err(TrackingError::WorldTrackingUnavailable("was denied")),
            _ => return Err(TrackingError::WorldTrackingUnavailable("is not supported")),
        }
        let pose_source = PoseSource::new(platform.world_tracking()?);
        let mut active = vec![ProviderKind::WorldTracking];

        if find(ProviderKind::HandTracking).is_some_and(|c| c.usable()) {
            platform.start_hand_tracking()?;
            active.push(ProviderKind::HandTracking);
        } else {
            log::info!("Hand tracking unavailable, continuing without it");
        }

        let meshes = Arc::new(SpatialMeshTracker::new());
        let anchor_thread = if find(ProviderKind::SceneReconstruction).is_some_and(|c| c.usable()) {
            let stream = platform.anchor_updates()?;
            active.push(ProviderKind::SceneReconstruction);
            Some(spawn_anchor_updates(meshes.clone(), stream)?)
        } else {
            log::info!("World sensing unavailable, no plane overlays will be drawn");
            None
        };

        log::info!("Tracking started with providers {:?}", active);
        Ok(Self {
            pose_source,
            meshes,
            active,
            _anchor_thread: anchor_thread,
        })
    }

    #[inline]
    pub fn pose_source(&self) -> &PoseSource {
        &self.pose_source
    }

    #[inline]
    pub fn meshes(&self) -> &Arc<SpatialMeshTracker> {
        &self.meshes
    }

    pub fn active_providers(&self) -> &[ProviderKind] {
        &self.active
    }

    pub fn is_active(&self, kind: ProviderKind) -> bool {
        self.active.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::{simulated::SimulatedPlatform, *};

    #[test]
    fn all_providers_start_when_allowed() {
        let ctx = TrackingContext::start(&SimulatedPlatform::default()).unwrap();
        assert!(ctx.is_active(ProviderKind::WorldTracking));
        assert!(ctx.is_active(ProviderKind::HandTracking));
        assert!(ctx.is_active(ProviderKind::SceneReconstruction));
    }

    #[test]
    fn denied_optional_providers_are_omitted() {
        let platform = SimulatedPlatform {
            hand_tracking: AuthorizationStatus::Denied,
            world_sensing: AuthorizationStatus::Denied,
            ..SimulatedPlatform::default()
        };
        let ctx = TrackingContext::start(&platform).unwrap();
        assert_eq!(ctx.active_providers(), &[ProviderKind::WorldTracking]);
        assert!(ctx.meshes().is_empty());
    }

    #[test]
    fn world_tracking_is_mandatory() {
        let platform = SimulatedPlatform {
            world_tracking_supported: false,
            ..SimulatedPlatform::default()
        };
        assert!(matches!(
            TrackingContext::start(&platform),
            Err(TrackingError::WorldTrackingUnavailable(_))
        ));
    }
}
