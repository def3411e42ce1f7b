use crate::video::VideoImage;

pub const VIDEO_FMT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// The texture the video quad samples. Starts as one black pixel and is
/// recreated whenever a frame of a different size arrives.
pub struct VideoTexture {
    texture: wgpu::Texture,
    sampler: wgpu::Sampler,
    pub bind: wgpu::BindGroup,
    size: (u32, u32),
    uploaded: u64,
}

impl VideoTexture {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, layout: &wgpu::BindGroupLayout) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Video Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let texture = create_texture(device, 1, 1);
        write(queue, &texture, 1, 1, 4, &[0, 0, 0, 255]);
        let bind = bind_group(device, layout, &texture, &sampler);
        Self {
            texture,
            sampler,
            bind,
            size: (1, 1),
            uploaded: 0,
        }
    }

    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        image: &VideoImage,
    ) {
        if (image.width, image.height) != self.size {
            log::info!("Video texture {}x{}", image.width, image.height);
            self.texture = create_texture(device, image.width, image.height);
            self.bind = bind_group(device, layout, &self.texture, &self.sampler);
            self.size = (image.width, image.height);
        }
        write(
            queue,
            &self.texture,
            image.width,
            image.height,
            image.bytes_per_row(),
            &image.rgba,
        );
        self.uploaded += 1;
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Frames uploaded so far.
    pub fn uploaded(&self) -> u64 {
        self.uploaded
    }
}

fn create_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Video Texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: VIDEO_FMT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

fn write(queue: &wgpu::Queue, texture: &wgpu::Texture, width: u32, height: u32, bytes_per_row: u32, data: &[u8]) {
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(bytes_per_row),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

fn bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    texture: &wgpu::Texture,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Video Bind"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}
