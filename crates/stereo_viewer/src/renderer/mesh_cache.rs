//! GPU buffers for anchor meshes, keyed by anchor id.
//!
//! Buffers are uploaded when an anchor first shows up and again only when its
//! mesh is replaced (a new `Arc`). Anchors missing from the snapshot are
//! evicted.

use crate::tracking::anchors::{MeshIndices, MeshPrimitive, PlaneAnchor, PlaneMesh};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use uuid::Uuid;
use wgpu::util::DeviceExt;

pub struct CachedMesh {
    source: Arc<PlaneMesh>,
    pub vertices: wgpu::Buffer,
    pub indices: wgpu::Buffer,
    pub index_format: wgpu::IndexFormat,
    pub index_count: u32,
    pub primitive: MeshPrimitive,
}

pub fn index_format(indices: &MeshIndices) -> wgpu::IndexFormat {
    match indices {
        MeshIndices::U16(_) => wgpu::IndexFormat::Uint16,
        MeshIndices::U32(_) => wgpu::IndexFormat::Uint32,
    }
}

/// Meshes with nothing to draw are never uploaded.
pub fn is_drawable(mesh: &PlaneMesh) -> bool {
    !mesh.vertices.is_empty() && !mesh.indices.is_empty()
}

#[derive(Default)]
pub struct MeshCache {
    entries: HashMap<Uuid, CachedMesh>,
}

impl MeshCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Brings the cache in line with `anchors`.
    pub fn sync(&mut self, device: &wgpu::Device, anchors: &[PlaneAnchor]) {
        let live: HashSet<Uuid> = anchors
            .iter()
            .filter(|a| is_drawable(&a.mesh))
            .map(|a| a.id)
            .collect();
        self.entries.retain(|id, _| live.contains(id));

        for anchor in anchors {
            if !is_drawable(&anchor.mesh) {
                continue;
            }
            let fresh = self
                .entries
                .get(&anchor.id)
                .is_some_and(|cached| Arc::ptr_eq(&cached.source, &anchor.mesh));
            if !fresh {
                self.entries.insert(anchor.id, upload(device, &anchor.mesh));
            }
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<&CachedMesh> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn upload(device: &wgpu::Device, mesh: &Arc<PlaneMesh>) -> CachedMesh {
    let vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Plane Mesh VB"),
        contents: bytemuck::cast_slice(&mesh.vertices),
        usage: wgpu::BufferUsages::VERTEX,
    });
    let indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Plane Mesh IB"),
        contents: mesh.indices.as_bytes(),
        usage: wgpu::BufferUsages::INDEX,
    });
    CachedMesh {
        source: mesh.clone(),
        vertices,
        indices,
        index_format: index_format(&mesh.indices),
        index_count: mesh.indices.len() as u32,
        primitive: mesh.primitive,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_width_follows_mesh() {
        assert_eq!(index_format(&MeshIndices::U16(vec![0, 1, 2])), wgpu::IndexFormat::Uint16);
        assert_eq!(index_format(&MeshIndices::U32(vec![0, 1])), wgpu::IndexFormat::Uint32);
    }

    #[test]
    fn empty_meshes_are_skipped() {
        let empty = PlaneMesh {
            vertices: vec![[0.0; 3]; 3],
            indices: MeshIndices::U16(Vec::new()),
            primitive: MeshPrimitive::Triangle,
        };
        assert!(!is_drawable(&empty));
        let tri = PlaneMesh {
            indices: MeshIndices::U16(vec![0, 1, 2]),
            ..empty
        };
        assert!(is_drawable(&tri));
    }
}
