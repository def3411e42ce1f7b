pub mod blit;
pub mod plane_mesh;
pub mod video_quad;

use super::uniforms::Uniforms;
use crate::error::CompositorError;

/// Declarations shared by every eye pass shader. Prepended to their sources.
pub const UNIFORMS_WGSL: &str = include_str!("../../../shaders/uniforms.wgsl");

/// Group 0 of every eye pass: the frame uniforms at a dynamic offset.
pub fn frame_uniform_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Frame Uniforms Layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<Uniforms>() as u64),
            },
            count: None,
        }],
    })
}

/// Runs `create` inside a validation error scope. Shader or pipeline errors
/// come back as [`CompositorError::PipelineCompilation`].
pub fn checked<T>(
    device: &wgpu::Device,
    label: &'static str,
    create: impl FnOnce() -> T,
) -> Result<T, CompositorError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(CompositorError::PipelineCompilation {
            label,
            message: err.to_string(),
        }),
        None => Ok(value),
    }
}

/// WGSL module for an eye pass shader body.
pub fn eye_shader(device: &wgpu::Device, label: &'static str, body: &str) -> wgpu::ShaderModule {
    let source = format!("{UNIFORMS_WGSL}\n{body}");
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

/// Depth state shared by the eye passes: reversed Z, nearer wins.
pub fn reversed_depth(format: wgpu::TextureFormat, write: bool) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format,
        depth_write_enabled: write,
        depth_compare: wgpu::CompareFunction::Greater,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}
