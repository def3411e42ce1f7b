//! GPU uniform layouts and the ring-buffered uniform storage they live in.

use pacing::RingIndex;

/// Minimum dynamic-offset alignment guaranteed by every wgpu backend.
pub const UNIFORM_ALIGN: u64 = 256;

/// Per-eye frame uniforms. Must match `Uniforms` in the WGSL sources.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable, Debug)]
pub struct Uniforms {
    pub projection: [[f32; 4]; 4],
    /// Rotation-only correction from the pose the video frame was produced
    /// for to the current pose.
    pub model_view_frame: [[f32; 4]; 4],
    /// World-to-eye view matrix.
    pub model_view: [[f32; 4]; 4],
    /// Left, right, top, bottom tangents.
    pub tangents: [f32; 4],
    /// Eye index, 0 = left.
    pub which: u32,
    pub render_width: f32,
    pub render_height: f32,
    /// Non-zero when the video packs both eyes side by side.
    pub side_by_side: u32,
}

/// Per-anchor uniforms. Must match `PlaneUniform` in `plane_mesh.rs`.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable, Debug)]
pub struct PlaneUniform {
    pub transform: [[f32; 4]; 4],
    pub color: [f32; 4],
    pub proximity: f32,
    pub _pad: [f32; 3],
}

#[inline]
pub const fn align_to(size: u64, align: u64) -> u64 {
    size.div_ceil(align) * align
}

/// Byte offset of `slot` in ring position `index`, with `group` slots per
/// position.
#[inline]
pub fn slot_offset(index: usize, group: usize, slot: usize, stride: u64) -> u64 {
    (index * group + slot) as u64 * stride
}

/// One uniform buffer split into `capacity × group` aligned slots and bound
/// with a dynamic offset.
///
/// Every write advances the ring first, so consecutive writes never land in
/// the same position until the ring wraps.
pub struct UniformRing {
    pub buffer: wgpu::Buffer,
    ring: RingIndex,
    group: usize,
    stride: u64,
    element_size: u64,
}

impl UniformRing {
    pub fn new<T: bytemuck::Pod>(device: &wgpu::Device, label: &str, capacity: usize, group: usize) -> Self {
        let element_size = std::mem::size_of::<T>() as u64;
        let stride = align_to(element_size, UNIFORM_ALIGN);
        let ring = RingIndex::new(capacity);
        let group = group.max(1);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: stride * (ring.capacity() * group) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            ring,
            group,
            stride,
            element_size,
        }
    }

    /// Advances the ring, writes `value` into `slot` of the new position and
    /// returns the dynamic offset to bind.
    pub fn write<T: bytemuck::Pod>(&mut self, queue: &wgpu::Queue, slot: usize, value: &T) -> u32 {
        let index = self.ring.advance();
        let offset = slot_offset(index, self.group, slot.min(self.group - 1), self.stride);
        queue.write_buffer(&self.buffer, offset, bytemuck::bytes_of(value));
        offset as u32
    }

    /// Size bound in the bind group; one element, not one stride.
    pub fn binding_size(&self) -> Option<wgpu::BufferSize> {
        wgpu::BufferSize::new(self.element_size)
    }

    pub fn binding(&self) -> wgpu::BindingResource<'_> {
        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: &self.buffer,
            offset: 0,
            size: self.binding_size(),
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    #[inline]
    pub fn current(&self) -> usize {
        self.ring.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_match_shader_sizes() {
        assert_eq!(std::mem::size_of::<Uniforms>(), 224);
        assert_eq!(std::mem::size_of::<PlaneUniform>(), 96);
        assert_eq!(std::mem::size_of::<Uniforms>() % 16, 0);
    }

    #[test]
    fn alignment_rounds_up() {
        assert_eq!(align_to(224, UNIFORM_ALIGN), 256);
        assert_eq!(align_to(256, UNIFORM_ALIGN), 256);
        assert_eq!(align_to(257, UNIFORM_ALIGN), 512);
        assert_eq!(align_to(0, UNIFORM_ALIGN), 0);
    }

    #[test]
    fn eye_slots_interleave_per_ring_position() {
        let stride = 256;
        assert_eq!(slot_offset(0, 2, 0, stride), 0);
        assert_eq!(slot_offset(0, 2, 1, stride), 256);
        assert_eq!(slot_offset(2, 2, 1, stride), 5 * 256);
        // Offsets stay inside a ring of three positions.
        let max = slot_offset(2, 2, 1, stride) + stride;
        assert_eq!(max, 3 * 2 * stride);
    }
}
