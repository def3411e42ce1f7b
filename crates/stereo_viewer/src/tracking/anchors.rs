//! Plane anchors reconstructed from the room and the map that holds them.
//!
//! Updates arrive asynchronously from the platform's scene-reconstruction
//! stream; the renderer reads a snapshot once per cycle. Reads and writes of
//! the map only happen under its lock, and the lock is never held across a
//! draw.

use crate::error::TrackingError;
use futures::{Stream, StreamExt};
use glam::Mat4;
use parking_lot::Mutex;
use std::{collections::HashMap, pin::Pin, sync::Arc, thread};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    Wall,
    Floor,
    Ceiling,
    Door,
    Table,
    Seat,
    Window,
    Unknown,
    Undetermined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshPrimitive {
    Triangle,
    Line,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MeshIndices {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl MeshIndices {
    pub fn len(&self) -> usize {
        match self {
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::U16(v) => bytemuck::cast_slice(v),
            Self::U32(v) => bytemuck::cast_slice(v),
        }
    }

    pub fn bytes_per_index(&self) -> usize {
        match self {
            Self::U16(_) => 2,
            Self::U32(_) => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaneMesh {
    /// Anchor-space positions.
    pub vertices: Vec<[f32; 3]>,
    pub indices: MeshIndices,
    pub primitive: MeshPrimitive,
}

#[derive(Debug, Clone)]
pub struct PlaneAnchor {
    pub id: Uuid,
    pub classification: Classification,
    pub origin_from_anchor: Mat4,
    pub mesh: Arc<PlaneMesh>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorEvent {
    Added,
    Updated,
    Removed,
}

#[derive(Debug, Clone)]
pub struct AnchorUpdate {
    pub event: AnchorEvent,
    pub anchor: PlaneAnchor,
}

/// Anchors copied out of the map for one render cycle. Meshes are shared.
pub type AnchorSnapshot = Vec<PlaneAnchor>;

pub type AnchorUpdateStream = Pin<Box<dyn Stream<Item = AnchorUpdate> + Send>>;

#[derive(Debug, Default)]
pub struct SpatialMeshTracker {
    anchors: Mutex<HashMap<Uuid, PlaneAnchor>>,
}

impl SpatialMeshTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one update. Window anchors are never stored.
    pub fn apply(&self, update: AnchorUpdate) {
        if update.anchor.classification == Classification::Window {
            log::trace!("Ignoring window anchor {}", update.anchor.id);
            return;
        }
        let mut anchors = self.anchors.lock();
        match update.event {
            AnchorEvent::Added | AnchorEvent::Updated => {
                anchors.insert(update.anchor.id, update.anchor);
            }
            AnchorEvent::Removed => {
                anchors.remove(&update.anchor.id);
            }
        }
    }

    /// Runs `f` with the map locked. The lock is released when `f` returns
    /// or unwinds.
    pub fn with_locked_anchors<R>(&self, f: impl FnOnce(&HashMap<Uuid, PlaneAnchor>) -> R) -> R {
        let anchors = self.anchors.lock();
        f(&anchors)
    }

    pub fn snapshot(&self) -> AnchorSnapshot {
        self.with_locked_anchors(|anchors| anchors.values().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.anchors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Applies every update from `stream` until it ends. Returns the number of
/// updates consumed.
pub async fn drain_anchor_updates(tracker: &SpatialMeshTracker, mut stream: AnchorUpdateStream) -> usize {
    let mut consumed = 0usize;
    while let Some(update) = stream.next().await {
        tracker.apply(update);
        consumed += 1;
    }
    consumed
}

/// Drains `stream` into `tracker` on a dedicated thread.
pub fn spawn_anchor_updates(
    tracker: Arc<SpatialMeshTracker>,
    stream: AnchorUpdateStream,
) -> Result<thread::JoinHandle<()>, TrackingError> {
    thread::Builder::new()
        .name("anchor-updates".into())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("Failed to start anchor update runtime: {e}");
                    return;
                }
            };
            let consumed = rt.block_on(drain_anchor_updates(&tracker, stream));
            log::info!("Anchor update stream ended after {consumed} updates");
        })
        .map_err(TrackingError::Thread)
}
