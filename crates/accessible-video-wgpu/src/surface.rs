//! Collaborators at the edges of the renderer: camera frames and display surfaces

use crate::geometry::Orientation;

/// One camera frame as two planes of an NV12 image
#[derive(Debug, Clone, Copy)]
pub struct CameraFrame<'a> {
    /// Full resolution luma, sampled from `.r`
    pub luma: &'a wgpu::TextureView,
    /// Half resolution interleaved chroma, sampled from `.rg`
    pub chroma: &'a wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

/// Plane views of a multi-planar NV12 texture
///
/// Requires [`wgpu::Features::TEXTURE_FORMAT_NV12`].
#[derive(Debug)]
pub struct Nv12Planes {
    luma: wgpu::TextureView,
    chroma: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl Nv12Planes {
    pub fn new(texture: &wgpu::Texture) -> Self {
        let plane = |label: &str, format: wgpu::TextureFormat, aspect: wgpu::TextureAspect| {
            texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some(label),
                format: Some(format),
                aspect,
                ..Default::default()
            })
        };

        Self {
            luma: plane("Luma Plane", wgpu::TextureFormat::R8Unorm, wgpu::TextureAspect::Plane0),
            chroma: plane("Chroma Plane", wgpu::TextureFormat::Rg8Unorm, wgpu::TextureAspect::Plane1),
            width: texture.width(),
            height: texture.height(),
        }
    }

    pub fn frame(&self) -> CameraFrame<'_> {
        CameraFrame {
            luma: &self.luma,
            chroma: &self.chroma,
            width: self.width,
            height: self.height,
        }
    }
}

/// NV12 planes held in two ordinary textures and filled from CPU memory
///
/// For devices without multi-planar texture support and for decoders that
/// hand out raw plane bytes.
#[derive(Debug)]
pub struct Nv12Textures {
    luma_texture: wgpu::Texture,
    chroma_texture: wgpu::Texture,
    luma: wgpu::TextureView,
    chroma: wgpu::TextureView,
}

impl Nv12Textures {
    /// Allocates planes for a `width` by `height` image; odd sizes round the chroma plane up
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let create = |label: &str, width: u32, height: u32, format: wgpu::TextureFormat| {
            device.create_texture(&wgpu::TextureDescriptor {
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
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        };

        let luma_texture = create("Luma Plane", width.max(1), height.max(1), wgpu::TextureFormat::R8Unorm);
        let chroma_texture = create("Chroma Plane", width.div_ceil(2).max(1), height.div_ceil(2).max(1), wgpu::TextureFormat::Rg8Unorm);

        Self {
            luma: luma_texture.create_view(&wgpu::TextureViewDescriptor::default()),
            chroma: chroma_texture.create_view(&wgpu::TextureViewDescriptor::default()),
            luma_texture,
            chroma_texture,
        }
    }

    /// Uploads tightly packed plane bytes
    ///
    /// # Arguments
    /// * `luma` - One byte per pixel, row-major
    /// * `chroma` - Interleaved `u, v` byte pairs at half resolution, row-major
    pub fn write(&self, queue: &wgpu::Queue, luma: &[u8], chroma: &[u8]) {
        for (texture, bytes, bytes_per_texel) in [(&self.luma_texture, luma, 1), (&self.chroma_texture, chroma, 2)] {
            queue.write_texture(
                texture.as_image_copy(),
                bytes,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(texture.width() * bytes_per_texel),
                    rows_per_image: Some(texture.height()),
                },
                texture.size(),
            );
        }
    }

    pub fn frame(&self) -> CameraFrame<'_> {
        CameraFrame {
            luma: &self.luma,
            chroma: &self.chroma,
            width: self.luma_texture.width(),
            height: self.luma_texture.height(),
        }
    }
}

/// A frame acquired from a display surface
pub trait SurfaceFrame {
    /// View the present pass renders into
    fn view(&self) -> &wgpu::TextureView;

    /// Hands the rendered frame to the display
    fn present(self);
}

/// The display the renderer presents to
pub trait DisplaySurface {
    type Frame: SurfaceFrame;

    /// Returns the next frame to render into, or `None` if the surface is not ready
    fn acquire(&mut self) -> Option<Self::Frame>;

    /// Surface bounds in logical points
    fn logical_size(&self) -> (f64, f64);

    /// Physical pixels per logical point
    fn scale_factor(&self) -> f64;

    fn orientation(&self) -> Orientation;
}

/// A frame of a [`WindowSurface`]
#[derive(Debug)]
pub struct WindowFrame {
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

impl SurfaceFrame for WindowFrame {
    fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    fn present(self) {
        self.texture.present();
    }
}

/// A [`DisplaySurface`] over a configured `wgpu::Surface`
#[derive(Debug)]
pub struct WindowSurface {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    config: wgpu::SurfaceConfiguration,
    scale_factor: f64,
    orientation: Orientation,
}

impl WindowSurface {
    /// Configures `surface` for presenting frames of `format`
    ///
    /// # Arguments
    /// * `width`, `height` - Physical size of the window
    /// * `scale_factor` - Physical pixels per logical point
    pub fn new(surface: wgpu::Surface<'static>, device: &wgpu::Device, format: wgpu::TextureFormat, width: u32, height: u32, scale_factor: f64) -> Self {
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            desired_maximum_frame_latency: 2,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
        };
        surface.configure(device, &config);

        Self {
            surface,
            device: device.clone(),
            config,
            scale_factor,
            orientation: Orientation::default(),
        }
    }

    /// Reconfigures the surface after the window changed size
    pub fn resize(&mut self, width: u32, height: u32, scale_factor: f64) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.scale_factor = scale_factor;
        self.surface.configure(&self.device, &self.config);
    }

    pub fn set_orientation(&mut self, orientation: Orientation) {
        self.orientation = orientation;
    }
}

impl DisplaySurface for WindowSurface {
    type Frame = WindowFrame;

    fn acquire(&mut self) -> Option<WindowFrame> {
        let texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Timeout) => return None,
            Err(error @ (wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost)) => {
                tracing::debug!(%error, "reconfiguring surface");
                self.surface.configure(&self.device, &self.config);
                return None;
            }
            Err(error) => {
                tracing::warn!(%error, "failed to acquire surface texture");
                return None;
            }
        };

        let view = texture.texture.create_view(&wgpu::TextureViewDescriptor::default());
        Some(WindowFrame { texture, view })
    }

    fn logical_size(&self) -> (f64, f64) {
        (self.config.width as f64 / self.scale_factor, self.config.height as f64 / self.scale_factor)
    }

    fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    fn orientation(&self) -> Orientation {
        self.orientation
    }
}
