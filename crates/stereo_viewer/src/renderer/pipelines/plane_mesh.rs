use super::{checked, eye_shader, reversed_depth};
use crate::{
    error::CompositorError,
    renderer::{mesh_cache::CachedMesh, uniforms::PlaneUniform},
    tracking::anchors::MeshPrimitive,
};

/// Triangle and line variants of the anchor overlay pipeline. Both share one
/// shader and one layout.
pub struct PlaneMeshPipeline {
    pub triangles: wgpu::RenderPipeline,
    pub lines: wgpu::RenderPipeline,
    pub plane_layout: wgpu::BindGroupLayout,
}

impl PlaneMeshPipeline {
    pub fn new(
        device: &wgpu::Device,
        frame_layout: &wgpu::BindGroupLayout,
        color_fmt: wgpu::TextureFormat,
        depth_fmt: wgpu::TextureFormat,
    ) -> Result<Self, CompositorError> {
        // Per-anchor uniforms, one ring slot per draw
        let plane_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Plane UBO Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<PlaneUniform>() as u64),
                },
                count: None,
            }],
        });

        let (triangles, lines) = checked(device, "plane mesh", || {
            let shader = eye_shader(device, "shaders/plane_mesh.wgsl", include_str!("../../../shaders/plane_mesh.wgsl"));

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Plane Mesh PipelineLayout"),
                bind_group_layouts: &[frame_layout, &plane_layout],
                push_constant_ranges: &[],
            });

            let build = |label: &'static str, primitive: wgpu::PrimitiveState| {
                device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(label),
                    layout: Some(&pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &shader,
                        entry_point: "vs_main",
                        buffers: &[wgpu::VertexBufferLayout {
                            array_stride: std::mem::size_of::<[f32; 3]>() as u64,
                            step_mode: wgpu::VertexStepMode::Vertex,
                            attributes: &[wgpu::VertexAttribute {
                                shader_location: 0,
                                offset: 0,
                                format: wgpu::VertexFormat::Float32x3,
                            }],
                        }],
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    },
                    primitive,
                    depth_stencil: Some(reversed_depth(depth_fmt, true)),
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
            };

            let triangles = build(
                "Plane Mesh Triangle Pipeline",
                wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: Some(wgpu::Face::Back),
                    ..Default::default()
                },
            );
            let lines = build(
                "Plane Mesh Line Pipeline",
                wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::LineList,
                    ..Default::default()
                },
            );
            (triangles, lines)
        })?;

        Ok(Self {
            triangles,
            lines,
            plane_layout,
        })
    }

    pub fn pipeline_for(&self, primitive: MeshPrimitive) -> &wgpu::RenderPipeline {
        match primitive {
            MeshPrimitive::Triangle => &self.triangles,
            MeshPrimitive::Line => &self.lines,
        }
    }

    /// Draws one cached anchor mesh. The frame uniforms must already be bound
    /// at group 0.
    pub fn draw_mesh<'a>(
        &'a self,
        rpass: &mut wgpu::RenderPass<'a>,
        plane: &'a wgpu::BindGroup,
        plane_offset: u32,
        mesh: &'a CachedMesh,
    ) {
        rpass.set_pipeline(self.pipeline_for(mesh.primitive));
        rpass.set_bind_group(1, plane, &[plane_offset]);
        rpass.set_vertex_buffer(0, mesh.vertices.slice(..));
        rpass.set_index_buffer(mesh.indices.slice(..), mesh.index_format);
        rpass.draw_indexed(0..mesh.index_count, 0, 0..1);
    }
}
