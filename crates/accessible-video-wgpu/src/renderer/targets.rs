use super::allocate;
use crate::{error::RendererError, geometry::SourceTexture, wgsl_resolver::BindingLayouts};

/// A texture the passes render into and sample from
#[derive(Debug)]
pub(crate) struct RenderTexture {
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
}

impl RenderTexture {
    fn new(device: &wgpu::Device, label: &str, (width, height): (u32, u32), format: wgpu::TextureFormat) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

/// Builds a group 0 bind group from three source views
pub(crate) fn source_bind_group(device: &wgpu::Device, layouts: &BindingLayouts, label: &str, views: [&wgpu::TextureView; 3]) -> wgpu::BindGroup {
    let entries = views
        .iter()
        .enumerate()
        .map(|(binding, view)| wgpu::BindGroupEntry {
            binding: binding as u32,
            resource: wgpu::BindingResource::TextureView(view),
        })
        .collect::<Vec<_>>();

    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout: &layouts.textures,
        entries: &entries,
    })
}

/// Textures sized for the current resolution, with every source bind group a frame can use
#[derive(Debug)]
pub(crate) struct Targets {
    pub(crate) size: (u32, u32),
    /// Output of the color pass, read by every later pass as the original image
    pub(crate) converted: RenderTexture,
    pub(crate) blurred: RenderTexture,
    pub(crate) intermediates: [RenderTexture; 2],
    /// Sources of the horizontal blur: the converted image in every slot
    pub(crate) blur_x_sources: wgpu::BindGroup,
    /// Sources of the vertical blur: the horizontal result, then the converted image
    pub(crate) blur_y_sources: wgpu::BindGroup,
    /// Indexed by [`SourceTexture::index`], then by whether blur is active
    filter_sources: [[wgpu::BindGroup; 2]; SourceTexture::COUNT],
}

/// Rejects sizes the device cannot allocate a 2D texture for
pub(crate) fn check_size((width, height): (u32, u32), max_dimension: u32) -> Result<(), RendererError> {
    if width > max_dimension || height > max_dimension {
        return Err(RendererError::Allocation {
            what: "render targets",
            message: format!("{width}x{height} exceeds the device limit of {max_dimension}"),
        });
    }
    Ok(())
}

impl Targets {
    pub(crate) fn new(device: &wgpu::Device, layouts: &BindingLayouts, format: wgpu::TextureFormat, size: (u32, u32)) -> Result<Self, RendererError> {
        check_size(size, device.limits().max_texture_dimension_2d)?;

        let (converted, blurred, intermediates) = allocate(device, "render targets", || {
            (
                RenderTexture::new(device, "Converted", size, format),
                RenderTexture::new(device, "Blurred", size, format),
                [
                    RenderTexture::new(device, "Intermediate 0", size, format),
                    RenderTexture::new(device, "Intermediate 1", size, format),
                ],
            )
        })?;

        let blur_x_sources = source_bind_group(device, layouts, "Blur X Sources", [&converted.view; 3]);
        let blur_y_sources = source_bind_group(device, layouts, "Blur Y Sources", [&intermediates[0].view, &converted.view, &converted.view]);

        let sources = [&converted.view, &intermediates[0].view, &intermediates[1].view];
        let filter_sources = sources.map(|source| {
            [
                source_bind_group(device, layouts, "Filter Sources", [source, &converted.view, &converted.view]),
                source_bind_group(device, layouts, "Filter Sources (Blurred)", [source, &blurred.view, &converted.view]),
            ]
        });

        Ok(Self {
            size,
            converted,
            blurred,
            intermediates,
            blur_x_sources,
            blur_y_sources,
            filter_sources,
        })
    }

    /// Sources of a filter or present pass: `(source, blur or converted, converted)`
    pub(crate) fn filter_sources(&self, source: SourceTexture, blur_active: bool) -> &wgpu::BindGroup {
        &self.filter_sources[source.index()][blur_active as usize]
    }

    /// Content height over width
    pub(crate) fn aspect(&self) -> f32 {
        self.size.1 as f32 / self.size.0 as f32
    }
}

/// Render targets exist only once a resolution has been set
#[derive(Debug, Default)]
pub(crate) enum FrameTargets {
    #[default]
    NotConfigured,
    Ready(Targets),
}

impl FrameTargets {
    /// The targets, once a resolution has been set
    pub(crate) fn ready(&self) -> Option<&Targets> {
        match self {
            Self::Ready(targets) => Some(targets),
            Self::NotConfigured => None,
        }
    }
}
