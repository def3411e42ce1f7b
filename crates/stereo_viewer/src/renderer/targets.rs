//! Stereo render target: one color texture holding both eyes plus a depth
//! texture of the same extent.

use crate::config::Packing;

pub const COLOR_FMT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const DEPTH_FMT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Per-eye size and packing of the stereo texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StereoExtent {
    pub eye_width: u32,
    pub eye_height: u32,
    pub packing: Packing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl StereoExtent {
    /// Per-eye extent at `scale`, rounded and never smaller than one pixel.
    pub fn scaled(eye_width: u32, eye_height: u32, scale: f32, packing: Packing) -> Self {
        let apply = |v: u32| ((v as f32 * scale).round() as u32).max(1);
        Self {
            eye_width: apply(eye_width),
            eye_height: apply(eye_height),
            packing,
        }
    }

    /// Full texture size holding both eyes.
    pub fn texture_size(&self) -> (u32, u32) {
        match self.packing {
            Packing::SideBySide => (self.eye_width * 2, self.eye_height),
            Packing::OverUnder => (self.eye_width, self.eye_height * 2),
        }
    }

    pub fn viewport(&self, eye: usize) -> Viewport {
        let (w, h) = (self.eye_width as f32, self.eye_height as f32);
        let i = eye.min(1) as f32;
        let (x, y) = match self.packing {
            Packing::SideBySide => (w * i, 0.0),
            Packing::OverUnder => (0.0, h * i),
        };
        Viewport {
            x,
            y,
            width: w,
            height: h,
        }
    }
}

/// Decides the target extent and defers changes to the next cycle boundary.
///
/// Extents are kept within `max_dimension`, the device's 2D texture limit,
/// by lowering the scale for both axes together.
#[derive(Debug, Clone)]
pub struct TargetPlan {
    base_width: u32,
    base_height: u32,
    packing: Packing,
    max_dimension: u32,
    current: StereoExtent,
    pending: Option<StereoExtent>,
}

impl TargetPlan {
    pub fn new(base_width: u32, base_height: u32, packing: Packing, scale: f32, max_dimension: u32) -> Self {
        let mut plan = Self {
            base_width,
            base_height,
            packing,
            max_dimension: max_dimension.max(2),
            current: StereoExtent::scaled(base_width, base_height, 1.0, packing),
            pending: None,
        };
        plan.current = plan.extent_at(scale);
        plan
    }

    /// Largest per-eye size that still fits the texture limit.
    fn eye_limit(&self) -> (u32, u32) {
        let max = self.max_dimension;
        match self.packing {
            Packing::SideBySide => (max / 2, max),
            Packing::OverUnder => (max, max / 2),
        }
    }

    fn extent_at(&self, scale: f32) -> StereoExtent {
        let (max_w, max_h) = self.eye_limit();
        let fit = (max_w as f32 / self.base_width.max(1) as f32).min(max_h as f32 / self.base_height.max(1) as f32);
        let mut extent = StereoExtent::scaled(self.base_width, self.base_height, scale.min(fit), self.packing);
        extent.eye_width = extent.eye_width.min(max_w);
        extent.eye_height = extent.eye_height.min(max_h);
        extent
    }

    #[inline]
    pub fn current(&self) -> StereoExtent {
        self.current
    }

    #[inline]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Records a new scale. The extent in use does not change until
    /// [`TargetPlan::reconcile`].
    pub fn request_scale(&mut self, scale: f32) {
        let next = self.extent_at(scale);
        self.pending = (next != self.current).then_some(next);
    }

    /// Applies a pending extent. Returns it when the target has to be
    /// recreated.
    pub fn reconcile(&mut self) -> Option<StereoExtent> {
        let next = self.pending.take()?;
        self.current = next;
        Some(next)
    }
}

pub struct RenderTarget {
    // Keep the textures alive for the lifetime of the views.
    _color_tex: wgpu::Texture,
    _depth_tex: wgpu::Texture,

    pub color: wgpu::TextureView,
    pub depth: wgpu::TextureView,
    pub extent: StereoExtent,
}

/// Color and depth descriptors for `extent`, built from one size so the two
/// can never disagree.
pub fn target_descriptors(extent: StereoExtent) -> [wgpu::TextureDescriptor<'static>; 2] {
    let (width, height) = extent.texture_size();
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let describe = |label, format, usage| wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    };
    [
        describe(
            "Stereo Color Target",
            COLOR_FMT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        ),
        describe("Stereo Depth Target", DEPTH_FMT, wgpu::TextureUsages::RENDER_ATTACHMENT),
    ]
}

impl RenderTarget {
    pub fn new(device: &wgpu::Device, extent: StereoExtent) -> Self {
        let [color_desc, depth_desc] = target_descriptors(extent);
        let color_tex = device.create_texture(&color_desc);
        let depth_tex = device.create_texture(&depth_desc);

        log::debug!(
            "Created stereo target {}x{} ({:?})",
            color_desc.size.width,
            color_desc.size.height,
            extent.packing
        );

        Self {
            color: color_tex.create_view(&wgpu::TextureViewDescriptor::default()),
            depth: depth_tex.create_view(&wgpu::TextureViewDescriptor::default()),
            _color_tex: color_tex,
            _depth_tex: depth_tex,
            extent,
        }
    }

    /// Recreates color and depth together.
    pub fn recreate(&mut self, device: &wgpu::Device, extent: StereoExtent) {
        *self = Self::new(device, extent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_by_side_is_double_width() {
        let e = StereoExtent::scaled(1024, 1024, 1.0, Packing::SideBySide);
        assert_eq!(e.texture_size(), (2048, 1024));
        assert_eq!(e.viewport(1).x, 1024.0);
        assert_eq!(e.viewport(0).x, 0.0);
    }

    #[test]
    fn over_under_is_double_height() {
        let e = StereoExtent::scaled(800, 600, 1.0, Packing::OverUnder);
        assert_eq!(e.texture_size(), (800, 1200));
        assert_eq!(e.viewport(1).y, 600.0);
    }

    #[test]
    fn scale_change_waits_for_reconcile() {
        let mut plan = TargetPlan::new(1000, 1000, Packing::SideBySide, 1.0, 8192);
        plan.request_scale(0.9);
        assert_eq!(plan.current().eye_width, 1000);
        assert!(plan.has_pending());

        let next = plan.reconcile().unwrap();
        assert_eq!(next.eye_width, 900);
        assert_eq!(plan.current(), next);
        assert!(plan.reconcile().is_none());
    }

    #[test]
    fn requesting_same_scale_is_not_pending() {
        let mut plan = TargetPlan::new(1000, 1000, Packing::SideBySide, 0.5, 8192);
        plan.request_scale(0.5);
        assert!(!plan.has_pending());
    }

    #[test]
    fn viewports_tile_the_texture() {
        let e = StereoExtent::scaled(1024, 1024, 0.85, Packing::SideBySide);
        let (w, h) = e.texture_size();
        let right = e.viewport(1);
        assert_eq!(right.x + right.width, w as f32);
        assert_eq!(right.height, h as f32);
    }

    #[test]
    fn tiny_scale_keeps_one_pixel() {
        let e = StereoExtent::scaled(10, 10, 0.0, Packing::OverUnder);
        assert_eq!((e.eye_width, e.eye_height), (1, 1));
    }

    #[test]
    fn raised_scale_is_clamped_to_texture_limit() {
        let mut plan = TargetPlan::new(4096, 2048, Packing::SideBySide, 1.0, 8192);
        assert_eq!(plan.current().texture_size(), (8192, 2048));

        plan.request_scale(1.25);
        // Already at the limit, so nothing changes.
        assert!(!plan.has_pending());

        let mut plan = TargetPlan::new(4096, 4096, Packing::OverUnder, 1.25, 8192);
        let (w, h) = plan.current().texture_size();
        assert!(w <= 8192 && h <= 8192);
        assert_eq!(plan.current().eye_width, plan.current().eye_height);

        plan.request_scale(0.5);
        assert_eq!(plan.reconcile().map(|e| e.texture_size()), Some((2048, 4096)));
    }

    #[test]
    fn depth_follows_color_across_resizes() {
        for packing in [Packing::SideBySide, Packing::OverUnder] {
            let mut plan = TargetPlan::new(1000, 800, packing, 1.0, 8192);
            for scale in [0.95, 0.5, 1.25] {
                plan.request_scale(scale);
                let extent = plan.reconcile().unwrap();
                let [color, depth] = target_descriptors(extent);
                assert_eq!(color.size, depth.size);
                assert_eq!((color.size.width, color.size.height), extent.texture_size());
                assert_eq!(color.format, COLOR_FMT);
                assert_eq!(depth.format, DEPTH_FMT);
            }
        }
    }
}
