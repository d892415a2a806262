//! Screen-space geometry: quads, orientations, viewports and texture sizing

/// A vertex of the full-screen quad
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Zeroable, bytemuck::Pod)]
#[repr(C)]
pub struct QuadVertex {
    /// Clip-space position
    pub position: [f32; 2],
    /// Texture coordinates, origin at the top-left
    pub tex_coords: [f32; 2],
}

impl QuadVertex {
    const ATTRIBUTES: &[wgpu::VertexAttribute] = &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: Self::ATTRIBUTES,
        array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
    };

    const fn new(x: f32, y: f32, u: f32, v: f32) -> Self {
        Self {
            position: [x, y],
            tex_coords: [u, v],
        }
    }
}

/// Vertices drawn by every pass
pub const QUAD_VERTEX_COUNT: u32 = 6;

/// How the display is rotated relative to the camera sensor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Orientation {
    /// Sensor orientation; the image is drawn unrotated
    #[default]
    LandscapeRight,
    LandscapeLeft,
    Portrait,
    PortraitUpsideDown,
}

impl Orientation {
    pub const ALL: [Self; 4] = [Self::LandscapeRight, Self::LandscapeLeft, Self::Portrait, Self::PortraitUpsideDown];

    /// Position of this orientation in [`Self::ALL`]
    pub fn index(self) -> usize {
        match self {
            Self::LandscapeRight => 0,
            Self::LandscapeLeft => 1,
            Self::Portrait => 2,
            Self::PortraitUpsideDown => 3,
        }
    }

    /// Two triangles covering clip space, sampling the texture rotated to match this orientation
    pub const fn quad(self) -> [QuadVertex; QUAD_VERTEX_COUNT as usize] {
        // Texture coordinates at the corners (-1,-1), (1,-1), (-1,1) and (1,1)
        let [bl, br, tl, tr] = match self {
            Self::LandscapeRight => [[0.0, 1.0], [1.0, 1.0], [0.0, 0.0], [1.0, 0.0]],
            Self::LandscapeLeft => [[1.0, 0.0], [0.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            Self::Portrait => [[1.0, 1.0], [1.0, 0.0], [0.0, 1.0], [0.0, 0.0]],
            Self::PortraitUpsideDown => [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]],
        };

        [
            QuadVertex::new(-1.0, -1.0, bl[0], bl[1]),
            QuadVertex::new(1.0, -1.0, br[0], br[1]),
            QuadVertex::new(-1.0, 1.0, tl[0], tl[1]),
            QuadVertex::new(1.0, -1.0, br[0], br[1]),
            QuadVertex::new(-1.0, 1.0, tl[0], tl[1]),
            QuadVertex::new(1.0, 1.0, tr[0], tr[1]),
        ]
    }
}

/// The form factor of the device, deciding how the present pass is oriented
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceClass {
    /// The interface is locked to portrait
    #[default]
    Phone,
    /// The interface follows the device orientation
    Tablet,
}

impl DeviceClass {
    /// Orientation of the present quad given what the surface reports
    pub fn present_orientation(self, surface: Orientation) -> Orientation {
        match self {
            Self::Phone => Orientation::Portrait,
            Self::Tablet => surface,
        }
    }
}

/// Region of the surface the present pass draws into, in physical pixels
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    /// Fits content of the given aspect ratio into the surface, centered
    ///
    /// # Arguments
    /// * `surface_width`, `surface_height` - Surface size in physical pixels
    /// * `aspect` - Content height over width, measured in landscape
    ///
    /// # Returns
    /// The letterboxed viewport, never extending past the surface
    pub fn letterbox(surface_width: f32, surface_height: f32, aspect: f32) -> Self {
        let (mut x, mut y, mut width, mut height) = if surface_width > surface_height {
            let height = surface_width * aspect;
            (0.0, (surface_height - height) / 2.0, surface_width, height)
        } else {
            // Content is rotated on a portrait surface
            let width = surface_height * aspect;
            ((surface_width - width) / 2.0, 0.0, width, surface_height)
        };

        x = x.max(0.0);
        y = y.max(0.0);
        width = width.min(surface_width - x).max(0.0);
        height = height.min(surface_height - y).max(0.0);

        Self { x, y, width, height }
    }
}

/// Size of the processing textures for a surface
///
/// # Arguments
/// * `logical_size` - Surface bounds in logical points
/// * `scale_factor` - Physical pixels per logical point
/// * `max_size` - Upper bound as `(max_width, max_height)`
///
/// # Returns
/// The physical surface size turned landscape, or `max_size` if either axis
/// exceeds its bound
pub fn texture_size(logical_size: (f64, f64), scale_factor: f64, max_size: (u32, u32)) -> (u32, u32) {
    let mut width = (logical_size.0 * scale_factor).round().max(1.0) as u32;
    let mut height = (logical_size.1 * scale_factor).round().max(1.0) as u32;

    if height > width {
        std::mem::swap(&mut width, &mut height);
    }

    let (max_width, max_height) = max_size;
    if height > max_height || width > max_width {
        return (max_width.max(1), max_height.max(1));
    }

    (width, height)
}

/// A texture a pass can read as its primary source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTexture {
    /// Output of the color conversion pass
    Converted,
    /// One of the two ping-pong intermediates
    Intermediate(usize),
}

impl SourceTexture {
    pub const COUNT: usize = 3;

    /// Dense index over the three source textures
    pub fn index(self) -> usize {
        match self {
            Self::Converted => 0,
            Self::Intermediate(i) => 1 + i % 2,
        }
    }
}

/// Alternates filter passes between the two intermediate textures
///
/// Pass `i` writes intermediate `(i + 1) % 2` and the pass after it reads
/// that texture back as intermediate `i % 2` of the next step. The first pass
/// of a frame reads the converted texture instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PingPong {
    passes: usize,
}

impl PingPong {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(&self) -> SourceTexture {
        if self.passes == 0 {
            SourceTexture::Converted
        } else {
            SourceTexture::Intermediate(self.passes % 2)
        }
    }

    /// Index of the intermediate the current pass writes
    pub fn destination(&self) -> usize {
        (self.passes + 1) % 2
    }

    pub fn advance(&mut self) {
        self.passes += 1;
    }
}
