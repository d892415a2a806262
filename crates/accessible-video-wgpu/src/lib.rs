//! Accessibility filters for live camera video on wgpu
//!
//! This crate renders a camera feed through a chain of full-screen GPU passes:
//! YUV to RGB conversion, an optional separable blur, any number of
//! accessibility filters, and a final present pass that orients and
//! letterboxes the image on the display. Passes are WGSL entry points looked
//! up by name in a [`ShaderLibrary`]. Their parameter blocks are reflected
//! with naga and fed from rings of uniform slots, so the CPU never rewrites
//! memory a frame in flight may still be reading.

pub mod error;
pub mod frame_pacer;
pub mod geometry;
pub mod parameters;
pub mod pass_executor;
pub mod pipeline_cache;
pub mod reflection;
mod renderer;
pub mod settings;
pub mod surface;
pub mod wgsl_resolver;

pub use error::{LayoutError, OverridesError, PassError, RendererError};
pub use frame_pacer::{FrameCompletion, FramePacer};
pub use geometry::{DeviceClass, Orientation, PingPong, QuadVertex, Viewport};
pub use parameters::Rgba;
pub use pipeline_cache::{CompiledPass, EntryPoints, PassOverrides, PassResolver, PipelineCache};
pub use reflection::ShaderLibrary;
pub use renderer::FilterRenderer;
pub use settings::{BlurQuality, RendererConfig};
pub use surface::{CameraFrame, DisplaySurface, Nv12Planes, Nv12Textures, SurfaceFrame, WindowSurface};
pub use wgsl_resolver::WgslPassResolver;
