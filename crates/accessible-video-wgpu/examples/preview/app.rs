//! Window event handling for the preview

use super::{
    Args,
    camera::{CAMERA_HEIGHT, CAMERA_WIDTH, SyntheticCamera},
};
use accessible_video_wgpu::{DeviceClass, FilterRenderer, Orientation, PassOverrides, RendererConfig, Rgba, ShaderLibrary, WindowSurface};
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::ActiveEventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes, WindowId},
};

/// Primary colors cycled with the C key
const PRIMARY_COLORS: [Rgba; 3] = [Rgba::new(0.0, 1.0, 1.0, 0.75), Rgba::new(1.0, 1.0, 0.0, 0.75), Rgba::new(1.0, 0.5, 0.0, 0.9)];

struct PreviewContext {
    window: Arc<Window>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: WindowSurface,
    renderer: FilterRenderer,
    camera: SyntheticCamera,
    color_index: usize,
}

impl PreviewContext {
    fn new(event_loop: &ActiveEventLoop, args: &Args) -> Result<Self, Box<dyn std::error::Error>> {
        let window = Arc::new(event_loop.create_window(WindowAttributes::default().with_title("Accessible Video Preview"))?);
        let size = window.inner_size();

        let instance = wgpu::Instance::default();
        let wgpu_surface = instance.create_surface(window.clone())?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&wgpu_surface),
            force_fallback_adapter: false,
        }))?;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default()))?;

        let format = wgpu_surface.get_capabilities(&adapter).formats[0];
        let surface = WindowSurface::new(wgpu_surface, &device, format, size.width, size.height, window.scale_factor());

        let mut library = ShaderLibrary::bundled()?;
        if let Some(path) = &args.filters {
            library.add_module("filters", &std::fs::read_to_string(path)?)?;
        }
        let overrides = match &args.overrides {
            Some(path) => PassOverrides::from_yaml(&std::fs::read_to_string(path)?)?,
            None => PassOverrides::default(),
        };

        let config = RendererConfig {
            buffered_frames: args.buffered_frames,
            output_format: format,
            device_class: if args.tablet { DeviceClass::Tablet } else { DeviceClass::Phone },
            overrides,
        };
        let mut renderer = FilterRenderer::new(&device, &queue, &adapter, library, config)?;
        renderer.set_resolution(&surface, CAMERA_WIDTH, CAMERA_HEIGHT)?;
        renderer.resize(size.width, size.height);
        renderer.set_video_filter(&args.chain, args.uses_blur);

        Ok(Self {
            camera: SyntheticCamera::new(&device),
            window,
            device,
            queue,
            surface,
            renderer,
            color_index: 0,
        })
    }

    fn redraw(&mut self) {
        let frame = self.camera.next_frame(&self.queue);
        self.renderer.capture_frame(&frame);
        self.renderer.render(&mut self.surface);
        self.window.request_redraw();
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.surface.resize(width, height, self.window.scale_factor());
        // Landscape windows stand in for a rotated device
        self.surface.set_orientation(if width >= height { Orientation::LandscapeRight } else { Orientation::Portrait });
        self.renderer.resize(width, height);
    }

    fn handle_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::KeyI => self.renderer.set_invert_screen(!self.renderer.invert_screen()),
            KeyCode::KeyB => self.renderer.set_apply_blur(!self.renderer.apply_blur()),
            KeyCode::KeyC => {
                self.color_index = (self.color_index + 1) % PRIMARY_COLORS.len();
                self.renderer.set_primary_color(PRIMARY_COLORS[self.color_index]);
            }
            KeyCode::KeyG => self.renderer.set_color_filter("yuv_rgb", &[0.299, 0.587, 0.114, 0.299, 0.587, 0.114, 0.299, 0.587, 0.114]),
            KeyCode::KeyN => self.renderer.set_color_filter("yuv_rgb", &[]),
            _ => return,
        }
        tracing::info!(
            invert = self.renderer.invert_screen(),
            blur = self.renderer.apply_blur(),
            filters = ?self.renderer.video_filter_names(),
            "settings changed"
        );
    }
}

/// Preview application state
pub struct PreviewApp {
    args: Args,
    context: Option<PreviewContext>,
}

impl PreviewApp {
    pub fn new(args: Args) -> Self {
        Self { args, context: None }
    }
}

impl ApplicationHandler for PreviewApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        match PreviewContext::new(event_loop, &self.args) {
            Ok(context) => {
                tracing::info!(device = ?context.device.features(), "preview ready");
                context.window.request_redraw();
                self.context = Some(context);
            }
            Err(error) => {
                tracing::error!(%error, "failed to start preview");
                event_loop.exit();
                return;
            }
        }

        println!();
        println!("Keyboard shortcuts:");
        println!("  - Esc: Quit");
        println!("  - I: Invert screen");
        println!("  - B: Toggle blur");
        println!("  - C: Cycle primary color");
        println!("  - G: Grayscale color filter");
        println!("  - N: Identity color filter");
        println!();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(context) = self.context.as_mut() else {
            return;
        };

        match event {
            WindowEvent::KeyboardInput {
                event: KeyEvent {
                    state: ElementState::Pressed,
                    physical_key: PhysicalKey::Code(KeyCode::Escape),
                    ..
                },
                ..
            }
            | WindowEvent::CloseRequested => {
                event_loop.exit();
            }

            WindowEvent::KeyboardInput {
                event: KeyEvent {
                    state: ElementState::Pressed,
                    physical_key: PhysicalKey::Code(keycode),
                    ..
                },
                ..
            } => context.handle_key(keycode),

            WindowEvent::RedrawRequested => context.redraw(),

            WindowEvent::Resized(size) => context.resize(size.width, size.height),

            _ => {}
        }
    }
}
