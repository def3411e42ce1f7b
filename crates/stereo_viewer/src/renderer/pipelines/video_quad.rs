use super::{checked, eye_shader, reversed_depth};
use crate::{error::CompositorError, renderer::projection::FovTangents};
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable, Debug, PartialEq)]
pub struct QuadVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

/// Triangle-strip quad at `depth` meters in front of the eye that exactly
/// covers the frustum described by symmetric `tangents`.
pub fn quad_vertices(tangents: FovTangents, depth: f32) -> [QuadVertex; 4] {
    let t = tangents.symmetrize();
    let (l, r) = (-t.left * depth, t.right * depth);
    let (b, top) = (-t.bottom * depth, t.top * depth);
    let z = -depth;
    [
        QuadVertex { position: [l, b, z], uv: [0.0, 1.0] },
        QuadVertex { position: [r, b, z], uv: [1.0, 1.0] },
        QuadVertex { position: [l, top, z], uv: [0.0, 0.0] },
        QuadVertex { position: [r, top, z], uv: [1.0, 0.0] },
    ]
}

/// The backdrop leaves the depth buffer at its clear value so anchors at any
/// distance still pass against it.
pub fn quad_depth(format: wgpu::TextureFormat) -> wgpu::DepthStencilState {
    reversed_depth(format, false)
}

pub struct VideoQuadPipeline {
    pub pipeline: wgpu::RenderPipeline,
    pub texture_layout: wgpu::BindGroupLayout,
    quad_vb: wgpu::Buffer,
}

impl VideoQuadPipeline {
    pub fn new(
        device: &wgpu::Device,
        frame_layout: &wgpu::BindGroupLayout,
        color_fmt: wgpu::TextureFormat,
        depth_fmt: wgpu::TextureFormat,
        tangents: FovTangents,
        panel_depth: f32,
    ) -> Result<Self, CompositorError> {
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Video Texture Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline = checked(device, "video quad", || {
            let shader = eye_shader(device, "shaders/video_quad.wgsl", include_str!("../../../shaders/video_quad.wgsl"));

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Video Quad PipelineLayout"),
                bind_group_layouts: &[frame_layout, &texture_layout],
                push_constant_ranges: &[],
            });

            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Video Quad Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: "vs_main",
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<QuadVertex>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &[
                            // Position (vec3)
                            wgpu::VertexAttribute {
                                shader_location: 0,
                                offset: 0,
                                format: wgpu::VertexFormat::Float32x3,
                            },
                            // Texture coordinate (vec2)
                            wgpu::VertexAttribute {
                                shader_location: 1,
                                offset: 12,
                                format: wgpu::VertexFormat::Float32x2,
                            },
                        ],
                    }],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    ..Default::default()
                },
                depth_stencil: Some(quad_depth(depth_fmt)),
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: "fs_main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format: color_fmt,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            })
        })?;

        let quad_vb = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Video Quad VB"),
            contents: bytemuck::cast_slice(&quad_vertices(tangents, panel_depth)),
            usage: wgpu::BufferUsages::VERTEX,
        });

        Ok(Self {
            pipeline,
            texture_layout,
            quad_vb,
        })
    }

    pub fn draw<'a>(
        &'a self,
        rpass: &mut wgpu::RenderPass<'a>,
        frame: &'a wgpu::BindGroup,
        frame_offset: u32,
        video: &'a wgpu::BindGroup,
    ) {
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, frame, &[frame_offset]);
        rpass.set_bind_group(1, video, &[]);
        rpass.set_vertex_buffer(0, self.quad_vb.slice(..));
        rpass.draw(0..4, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::projection::eye_projection;
    use glam::Vec4;

    fn ndc_depth(distance: f32) -> f32 {
        let clip = eye_projection(FovTangents::default(), 0.1, 10.0) * Vec4::new(0.0, 0.0, -distance, 1.0);
        clip.z / clip.w
    }

    #[test]
    fn quad_covers_symmetric_frustum() {
        let t = FovTangents {
            left: 1.0,
            right: 0.6,
            top: 0.5,
            bottom: 0.7,
        };
        let v = quad_vertices(t, 2.0);
        // Symmetrized horizontally: (1.0 + 0.6) / 2 = 0.8.
        assert!((v[0].position[0] + 1.6).abs() < 1e-6);
        assert!((v[1].position[0] - 1.6).abs() < 1e-6);
        assert!((v[0].position[1] + 1.4).abs() < 1e-6);
        assert!((v[2].position[1] - 1.0).abs() < 1e-6);
        assert!(v.iter().all(|q| q.position[2] == -2.0));
    }

    #[test]
    fn strip_maps_top_left_to_uv_origin() {
        let v = quad_vertices(FovTangents::default(), 1.0);
        assert_eq!(v[2].uv, [0.0, 0.0]);
        assert_eq!(v[1].uv, [1.0, 1.0]);
        assert_eq!(std::mem::size_of::<QuadVertex>(), 20);
    }

    #[test]
    fn anchors_behind_the_panel_pass_depth() {
        let state = quad_depth(wgpu::TextureFormat::Depth32Float);
        assert_eq!(state.depth_compare, wgpu::CompareFunction::Greater);

        let cleared = 0.0;
        let after_quad = if state.depth_write_enabled { ndc_depth(1.0) } else { cleared };
        for wall in [1.5, 2.0, 5.0, 9.5] {
            assert!(ndc_depth(wall) > after_quad, "anchor at {wall} m is hidden");
        }
    }
}
