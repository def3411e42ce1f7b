//! The wgpu implementation of [`FrameRenderer`].

use super::{
    context::GfxContext,
    mesh_cache::MeshCache,
    pipelines::{blit::BlitPass, frame_uniform_layout, plane_mesh::PlaneMeshPipeline, video_quad::VideoQuadPipeline},
    projection::{eye_projection, frame_model_view, view_matrix, FovTangents},
    targets::{RenderTarget, StereoExtent, COLOR_FMT, DEPTH_FMT},
    uniforms::{PlaneUniform, UniformRing, Uniforms},
    video_texture::VideoTexture,
};
use crate::{
    colors::classification_to_color,
    config::{Config, SyncMode, Tuning},
    error::CompositorError,
    frame_loop::{FrameInputs, FrameRenderer, EYE_COUNT},
    tracking::anchors::{MeshPrimitive, PlaneAnchor},
    video::VideoImage,
};
use parking_lot::Mutex;
use std::{collections::VecDeque, sync::Arc, time::Instant};
use uuid::Uuid;

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 1.0,
    g: 0.0,
    b: 0.0,
    a: 0.0,
};

#[derive(Debug, Clone)]
pub struct CompositorSettings {
    pub tangents: FovTangents,
    pub ipd: f32,
    pub near: f32,
    pub far: f32,
    pub panel_depth: f32,
    pub frames_in_flight: usize,
    pub max_planes: usize,
    pub side_by_side_video: bool,
    pub sync: SyncMode,
}

impl CompositorSettings {
    pub fn new(config: &Config, tuning: &Tuning) -> Self {
        Self {
            tangents: tuning.tangents,
            ipd: tuning.ipd,
            near: tuning.near,
            far: tuning.far,
            panel_depth: tuning.panel_depth,
            frames_in_flight: tuning.frames_in_flight,
            max_planes: tuning.max_planes,
            side_by_side_video: config.side_by_side_video,
            sync: config.sync_mode(),
        }
    }
}

/// Frame uniforms for one eye of this cycle.
pub fn eye_uniforms(settings: &CompositorSettings, eye: usize, inputs: &FrameInputs<'_>) -> Uniforms {
    Uniforms {
        projection: eye_projection(settings.tangents, settings.near, settings.far).to_cols_array_2d(),
        model_view_frame: frame_model_view(inputs.frame_pose.transform, inputs.pose.transform).to_cols_array_2d(),
        model_view: view_matrix(inputs.pose.transform, eye, settings.ipd).to_cols_array_2d(),
        tangents: settings.tangents.symmetrize().as_vec4(),
        which: eye as u32,
        render_width: inputs.extent.eye_width as f32,
        render_height: inputs.extent.eye_height as f32,
        side_by_side: u32::from(settings.side_by_side_video),
    }
}

pub fn plane_uniform(anchor: &PlaneAnchor) -> PlaneUniform {
    PlaneUniform {
        transform: anchor.origin_from_anchor.to_cols_array_2d(),
        color: classification_to_color(anchor.classification, &anchor.id),
        proximity: match anchor.mesh.primitive {
            MeshPrimitive::Triangle => 1.0,
            MeshPrimitive::Line => 0.0,
        },
        _pad: [0.0; 3],
    }
}

pub struct StereoCompositor {
    pub gfx: GfxContext,
    target: RenderTarget,
    frame_ring: UniformRing,
    frame_bind: wgpu::BindGroup,
    plane_ring: UniformRing,
    plane_bind: wgpu::BindGroup,
    video_quad: VideoQuadPipeline,
    planes: PlaneMeshPipeline,
    blit: BlitPass,
    meshes: MeshCache,
    video: VideoTexture,
    settings: CompositorSettings,
    eye_offsets: [u32; EYE_COUNT],
    encoder: Option<wgpu::CommandEncoder>,
    frame: Option<wgpu::SurfaceTexture>,
    in_flight: InFlight<wgpu::SubmissionIndex>,
    completed: Arc<Mutex<Option<f64>>>,
}

impl StereoCompositor {
    pub fn new(gfx: GfxContext, extent: StereoExtent, settings: CompositorSettings) -> Result<Self, CompositorError> {
        let device = &gfx.device;

        let frame_layout = frame_uniform_layout(device);
        let video_quad = VideoQuadPipeline::new(
            device,
            &frame_layout,
            COLOR_FMT,
            DEPTH_FMT,
            settings.tangents,
            settings.panel_depth,
        )?;
        let planes = PlaneMeshPipeline::new(device, &frame_layout, COLOR_FMT, DEPTH_FMT)?;
        let mut blit = BlitPass::new(device, gfx.config.format)?;

        let frame_ring = UniformRing::new::<Uniforms>(device, "Frame Uniforms", settings.frames_in_flight, EYE_COUNT);
        let frame_bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame Uniforms Bind"),
            layout: &frame_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_ring.binding(),
            }],
        });
        let plane_ring = UniformRing::new::<PlaneUniform>(device, "Plane Uniforms", settings.max_planes, 1);
        let plane_bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Plane Uniforms Bind"),
            layout: &planes.plane_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: plane_ring.binding(),
            }],
        });

        let target = RenderTarget::new(device, extent);
        blit.set_source(device, &target.color);
        let video = VideoTexture::new(device, &gfx.queue, &video_quad.texture_layout);
        gfx.check_device()?;

        Ok(Self {
            target,
            frame_ring,
            frame_bind,
            plane_ring,
            plane_bind,
            video_quad,
            planes,
            blit,
            meshes: MeshCache::new(),
            video,
            settings,
            eye_offsets: [0; EYE_COUNT],
            encoder: None,
            frame: None,
            in_flight: InFlight::default(),
            completed: Arc::new(Mutex::new(None)),
            gfx,
        })
    }

    pub fn resize_surface(&mut self, size: winit::dpi::PhysicalSize<u32>) {
        self.gfx.resize(size);
    }

    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    fn take_encoder(&mut self) -> wgpu::CommandEncoder {
        self.encoder.take().unwrap_or_else(|| {
            self.gfx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Stereo Frame Encoder"),
                })
        })
    }

    /// Swapchain image for the mirror blit. `None` skips the blit this cycle.
    fn acquire_frame(&mut self) -> Result<Option<wgpu::SurfaceTexture>, CompositorError> {
        match self.gfx.surface.get_current_texture() {
            Ok(frame) => Ok(Some(frame)),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.gfx.resize(self.gfx.size);
                Ok(None)
            }
            Err(wgpu::SurfaceError::OutOfMemory) => Err(CompositorError::SurfaceOutOfMemory),
            Err(e) => {
                log::warn!("Surface unavailable ({e:?}), skipping mirror");
                Ok(None)
            }
        }
    }
}

impl FrameRenderer for StereoCompositor {
    fn upload_video(&mut self, image: &VideoImage) {
        self.video.upload(
            &self.gfx.device,
            &self.gfx.queue,
            &self.video_quad.texture_layout,
            image,
        );
    }

    fn write_uniforms(&mut self, eye: usize, inputs: &FrameInputs<'_>) {
        let uniforms = eye_uniforms(&self.settings, eye, inputs);
        self.eye_offsets[eye] = self.frame_ring.write(&self.gfx.queue, eye, &uniforms);
    }

    fn draw_eye(&mut self, eye: usize, inputs: &FrameInputs<'_>) -> Result<(), CompositorError> {
        if eye == 0 {
            self.meshes.sync(&self.gfx.device, inputs.anchors);
        }
        debug_assert_eq!(inputs.extent, self.target.extent);

        // Each draw gets its own slot, written before the pass records it
        let mut draws: Vec<(Uuid, u32)> = Vec::with_capacity(inputs.anchors.len());
        for anchor in inputs.anchors {
            if self.meshes.get(&anchor.id).is_some() {
                let offset = self.plane_ring.write(&self.gfx.queue, 0, &plane_uniform(anchor));
                draws.push((anchor.id, offset));
            }
        }

        let mut encoder = self.take_encoder();
        {
            let first = eye == 0;
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(if first { "Eye 0 Pass" } else { "Eye 1 Pass" }),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.color,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: if first {
                            wgpu::LoadOp::Clear(CLEAR_COLOR)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.target.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: if first {
                            wgpu::LoadOp::Clear(0.0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let vp = self.target.extent.viewport(eye);
            rpass.set_viewport(vp.x, vp.y, vp.width, vp.height, 0.0, 1.0);

            self.video_quad
                .draw(&mut rpass, &self.frame_bind, self.eye_offsets[eye], &self.video.bind);
            for (id, offset) in &draws {
                if let Some(mesh) = self.meshes.get(id) {
                    self.planes.draw_mesh(&mut rpass, &self.plane_bind, *offset, mesh);
                }
            }
        }
        self.encoder = Some(encoder);
        Ok(())
    }

    fn submit(&mut self) -> Result<(), CompositorError> {
        let mut encoder = self.take_encoder();
        let frame = self.acquire_frame()?;
        if let Some(frame) = &frame {
            let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
            self.blit.draw(&mut encoder, &view);
        }

        let index = self.gfx.queue.submit(Some(encoder.finish()));
        let submitted = Instant::now();
        let sink = self.completed.clone();
        self.gfx.queue.on_submitted_work_done(move || {
            *sink.lock() = Some(submitted.elapsed().as_secs_f64());
        });
        self.in_flight.push(index);
        self.frame = frame;
        self.gfx.check_device()
    }

    fn wait(&mut self) -> Result<Option<f64>, CompositorError> {
        for index in self.in_flight.make_room(self.settings.sync.max_in_flight()) {
            self.gfx.device.poll(wgpu::Maintain::WaitForSubmissionIndex(index));
        }
        if !self.in_flight.is_empty() {
            // Runs completion callbacks of work that already finished.
            self.gfx.device.poll(wgpu::Maintain::Poll);
        }

        if let Some(frame) = self.frame.take() {
            frame.present();
        }
        self.gfx.check_device()?;
        Ok(self.completed.lock().take())
    }

    fn resize_target(&mut self, extent: StereoExtent) -> Result<(), CompositorError> {
        self.target.recreate(&self.gfx.device, extent);
        self.blit.set_source(&self.gfx.device, &self.target.color);
        self.gfx.check_device()
    }
}

/// Submissions the GPU may still be working on, oldest first.
#[derive(Debug)]
struct InFlight<T> {
    queue: VecDeque<T>,
}

impl<T> Default for InFlight<T> {
    fn default() -> Self {
        Self { queue: VecDeque::new() }
    }
}

impl<T> InFlight<T> {
    fn push(&mut self, submission: T) {
        self.queue.push_back(submission);
    }

    /// Removes the oldest submissions until fewer than `max` remain, so the
    /// next submit keeps at most `max` outstanding. Callers block on each.
    fn make_room(&mut self, max: usize) -> Vec<T> {
        let excess = (self.queue.len() + 1).saturating_sub(max.max(1));
        self.queue.drain(..excess.min(self.queue.len())).collect()
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Packing,
        pose::Pose,
        tracking::anchors::{Classification, MeshIndices, PlaneMesh},
    };
    use glam::{Mat4, Quat, Vec3, Vec4};

    fn settings() -> CompositorSettings {
        CompositorSettings {
            tangents: FovTangents::default(),
            ipd: 0.064,
            near: 0.1,
            far: 10.0,
            panel_depth: 1.0,
            frames_in_flight: 3,
            max_planes: 512,
            side_by_side_video: true,
            sync: SyncMode::HardWait,
        }
    }

    fn inputs<'a>(pose: Pose, frame_pose: Pose, anchors: &'a [PlaneAnchor]) -> FrameInputs<'a> {
        FrameInputs {
            cycle: 0,
            pose,
            frame_pose,
            anchors,
            extent: StereoExtent::scaled(1024, 1024, 1.0, Packing::SideBySide),
        }
    }

    #[test]
    fn eyes_differ_only_by_ipd() {
        let pose = Pose::identity(0.0);
        let i = inputs(pose, pose, &[]);
        let left = eye_uniforms(&settings(), 0, &i);
        let right = eye_uniforms(&settings(), 1, &i);
        assert_eq!(left.projection, right.projection);
        assert_eq!((left.which, right.which), (0, 1));
        let origin = |u: &Uniforms| Mat4::from_cols_array_2d(&u.model_view) * Vec4::W;
        // The left eye sits at -x, so the world origin is on its right.
        assert!((origin(&left).x - 0.032).abs() < 1e-6);
        assert!((origin(&right).x + 0.032).abs() < 1e-6);
        assert_eq!(left.render_width, 1024.0);
        assert_eq!(left.side_by_side, 1);
    }

    #[test]
    fn frame_correction_is_identity_when_pose_is_unchanged() {
        let pose = Pose {
            transform: Mat4::from_rotation_translation(Quat::from_rotation_y(0.4), Vec3::new(0.0, 1.6, 0.0)),
            timestamp: 1.0,
        };
        let u = eye_uniforms(&settings(), 0, &inputs(pose, pose, &[]));
        let m = Mat4::from_cols_array_2d(&u.model_view_frame);
        assert!(m.abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn plane_proximity_follows_primitive() {
        let mesh = |primitive| {
            Arc::new(PlaneMesh {
                vertices: vec![[0.0; 3]; 3],
                indices: MeshIndices::U16(vec![0, 1, 2]),
                primitive,
            })
        };
        let anchor = |primitive| PlaneAnchor {
            id: Uuid::new_v4(),
            classification: Classification::Table,
            origin_from_anchor: Mat4::from_translation(Vec3::Y),
            mesh: mesh(primitive),
        };
        let tri = anchor(MeshPrimitive::Triangle);
        let line = anchor(MeshPrimitive::Line);
        assert_eq!(plane_uniform(&tri).proximity, 1.0);
        assert_eq!(plane_uniform(&line).proximity, 0.0);
        assert_eq!(
            plane_uniform(&tri).color,
            classification_to_color(Classification::Table, &tri.id)
        );
        assert_eq!(plane_uniform(&tri).transform[3][1], 1.0);
    }

    #[test]
    fn hard_wait_blocks_on_every_submission() {
        let mut in_flight = InFlight::default();
        let max = SyncMode::HardWait.max_in_flight();
        for cycle in 0..5u32 {
            in_flight.push(cycle);
            assert_eq!(in_flight.make_room(max), vec![cycle]);
            assert!(in_flight.is_empty());
        }
    }

    #[test]
    fn bounded_queue_keeps_at_most_depth_in_flight() {
        let mut in_flight = InFlight::default();
        let max = SyncMode::BoundedQueue { depth: 3 }.max_in_flight();
        let mut waited = Vec::new();
        for cycle in 0..10u32 {
            in_flight.push(cycle);
            assert!(in_flight.len() <= 3);
            waited.extend(in_flight.make_room(max));
            assert!(in_flight.len() < 3);
        }
        // Oldest first, and the newest two are still outstanding.
        assert_eq!(waited, (0..8).collect::<Vec<_>>());
        assert_eq!(in_flight.len(), 2);
    }
}
