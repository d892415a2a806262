//! The filter renderer: owns every GPU resource and records each frame

mod gpu_parameters;
mod targets;

use crate::{
    error::{PassError, RendererError},
    frame_pacer::{FramePacer, Submissions},
    geometry::{Orientation, PingPong, Viewport, texture_size},
    parameters::{BlurParameters, ColorParameters, FilterParameters, ParameterKind, Rgba, SlotRef},
    pass_executor::{ParameterBinding, PassInvocation, RenderPassExecutor},
    pipeline_cache::{CompiledPass, PipelineCache},
    reflection::{PassLayout, ShaderLibrary},
    settings::{
        BLIT_PASS, BlurQuality, BlurStage, COLOR_PASS, FilterChain, FilterSettings, INVERT_PASS, RendererConfig, reads_blur_parameters, write_blur_offsets,
        write_convolution,
    },
    surface::{CameraFrame, DisplaySurface, SurfaceFrame},
    wgsl_resolver::WgslPassResolver,
};
use gpu_parameters::GpuParameters;
use smallvec::SmallVec;
use std::sync::Arc;
use targets::{FrameTargets, Targets, source_bind_group};
use wgpu::util::DeviceExt;

type Pass = Arc<CompiledPass<wgpu::RenderPipeline>>;

/// Parameter bindings of one pass, at most one per block kind
type ParameterBindings<'a> = SmallVec<[ParameterBinding<'a>; 3]>;

/// Runs `create` inside out-of-memory and validation error scopes
fn allocate<T>(device: &wgpu::Device, what: &'static str, create: impl FnOnce() -> T) -> Result<T, RendererError> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    match validation.or(out_of_memory) {
        Some(error) => Err(RendererError::Allocation {
            what,
            message: error.to_string(),
        }),
        None => Ok(value),
    }
}

fn mandatory(cache: &mut PipelineCache<WgslPassResolver>, name: &str) -> Result<Pass, RendererError> {
    cache.get(name).map_err(|source: PassError| RendererError::MandatoryPass {
        name: name.to_string(),
        source,
    })
}

/// Renders camera frames through a configurable chain of filter passes
///
/// A frame goes through two calls. [`Self::capture_frame`] converts the
/// camera planes to RGB into a persistent texture. [`Self::render`] then runs
/// the optional blur, every filter pass and the present pass into the display
/// surface.
///
/// Parameter blocks live in rings of `buffered_frames + 1` slots. Setters
/// write the slot after the one most recently bound, and [`FramePacer`] keeps
/// at most `buffered_frames` frames in flight, so a slot the GPU may still
/// read is never rewritten. Configuration and rendering both take
/// `&mut self`, which keeps them from interleaving.
#[derive(Debug)]
pub struct FilterRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: RendererConfig,
    cache: PipelineCache<WgslPassResolver>,
    executor: RenderPassExecutor,
    pacer: FramePacer,
    submissions: Submissions<wgpu::SubmissionIndex>,
    /// Indexed by [`Orientation::index`]
    quads: [wgpu::Buffer; 4],

    color_pass: Pass,
    blit_pass: Pass,
    invert_pass: Pass,
    blur: Option<BlurStage<wgpu::RenderPipeline>>,
    chain: FilterChain<wgpu::RenderPipeline>,

    settings: FilterSettings,
    filter_parameters: GpuParameters<FilterParameters>,
    color_parameters: GpuParameters<ColorParameters>,
    blur_parameters: Option<GpuParameters<BlurParameters>>,

    targets: FrameTargets,
    surface_size: (u32, u32),
    viewport: Viewport,
}

impl FilterRenderer {
    /// Sets up the renderer
    ///
    /// # Arguments
    /// * `device`, `queue` - Device the renderer draws with
    /// * `adapter` - Queried once to choose the blur quality
    /// * `library` - Shader library providing the mandatory passes and the filters
    /// * `config` - Setup options
    ///
    /// # Returns
    /// The renderer, or an error if a mandatory pass is missing, a parameter
    /// block does not match, or an allocation fails
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, adapter: &wgpu::Adapter, library: ShaderLibrary, config: RendererConfig) -> Result<Self, RendererError> {
        let resolver = WgslPassResolver::new(device, library, config.output_format);
        let mut cache = PipelineCache::new(resolver, config.overrides.clone());

        let quads = allocate(device, "orientation quads", || {
            Orientation::ALL.map(|orientation| {
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("Quad {orientation:?}")),
                    contents: bytemuck::cast_slice(&orientation.quad()),
                    usage: wgpu::BufferUsages::VERTEX,
                })
            })
        })?;

        let color_pass = mandatory(&mut cache, COLOR_PASS)?;
        let blit_pass = mandatory(&mut cache, BLIT_PASS)?;
        let invert_pass = mandatory(&mut cache, INVERT_PASS)?;

        let quality = BlurQuality::detect(adapter);
        let blur = BlurStage::resolve(&mut cache, quality);

        let slots = config.ring_slots();
        let layouts = cache.resolver().layouts();
        let mut filter_parameters = GpuParameters::<FilterParameters>::new(device, queue, layouts, &cache, slots)?;
        let color_parameters = GpuParameters::<ColorParameters>::new(device, queue, layouts, &cache, slots)?;
        let blur_parameters = match &blur {
            Some(_) => Some(GpuParameters::<BlurParameters>::new(device, queue, layouts, &cache, slots)?),
            None => None,
        };
        let executor = RenderPassExecutor::new(device, layouts);

        let settings = FilterSettings::new(quality == BlurQuality::High);
        filter_parameters.write_next(queue, |slot| settings.write(slot));

        tracing::info!(
            buffered_frames = config.buffered_frames,
            format = ?config.output_format,
            device_class = ?config.device_class,
            blur = ?blur.as_ref().map(|stage| stage.quality),
            "filter renderer ready"
        );

        Ok(Self {
            device: device.clone(),
            queue: queue.clone(),
            pacer: FramePacer::new(config.buffered_frames.max(1)),
            submissions: Submissions::new(config.buffered_frames),
            config,
            cache,
            executor,
            quads,
            color_pass,
            blit_pass,
            invert_pass,
            blur,
            chain: FilterChain::default(),
            settings,
            filter_parameters,
            color_parameters,
            blur_parameters,
            targets: FrameTargets::NotConfigured,
            surface_size: (0, 0),
            viewport: Viewport::default(),
        })
    }

    /// Converts a camera frame into the persistent RGB texture
    ///
    /// Submitted right away without waiting on the frame pacer. Does nothing
    /// until [`Self::set_resolution`] has allocated the render targets.
    pub fn capture_frame(&mut self, frame: &CameraFrame<'_>) {
        let Some(targets) = self.targets.ready() else {
            return;
        };
        if frame.width == 0 || frame.height == 0 {
            return;
        }

        let layouts = self.cache.resolver().layouts();
        let sources = source_bind_group(&self.device, layouts, "Camera Planes", [frame.luma, frame.chroma, frame.luma]);

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Capture") });
        self.execute(&mut encoder, &self.color_pass, Orientation::default(), &sources, &targets.converted.view, None);
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Runs the filter chain and presents the result
    ///
    /// Does nothing until render targets are allocated or while the surface
    /// has no frame to give. Otherwise blocks until fewer than
    /// `buffered_frames` frames are in flight.
    pub fn render<S: DisplaySurface>(&mut self, surface: &mut S) {
        let Some(targets) = self.targets.ready() else {
            return;
        };
        let Some(frame) = surface.acquire() else {
            return;
        };

        let oldest = self.submissions.oldest().cloned();
        let completion = self.pacer.acquire(|| {
            let poll = match oldest {
                Some(index) => wgpu::PollType::WaitForSubmissionIndex(index),
                None => wgpu::PollType::Wait,
            };
            if let Err(error) = self.device.poll(poll) {
                tracing::warn!(%error, "failed to wait for the oldest frame in flight");
            }
        });

        let orientation = self.config.device_class.present_orientation(surface.orientation());
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Frame") });

        let blur = self.blur.as_ref().filter(|_| self.chain.blur_active(self.settings.apply_blur));
        if let Some(blur) = blur {
            self.execute(&mut encoder, &blur.x, Orientation::default(), &targets.blur_x_sources, &targets.intermediates[0].view, None);
            self.execute(&mut encoder, &blur.y, Orientation::default(), &targets.blur_y_sources, &targets.blurred.view, None);
        }
        let blur_active = blur.is_some();

        let mut ping_pong = PingPong::new();
        for pass in self.chain.passes() {
            let sources = targets.filter_sources(ping_pong.source(), blur_active);
            let target = &targets.intermediates[ping_pong.destination()].view;
            self.execute(&mut encoder, pass, Orientation::default(), sources, target, None);
            ping_pong.advance();
        }

        let present = if self.settings.invert_screen { &self.invert_pass } else { &self.blit_pass };
        let sources = targets.filter_sources(ping_pong.source(), blur_active);
        self.execute(&mut encoder, present, orientation, sources, frame.view(), Some(self.viewport));

        let submission = self.queue.submit(std::iter::once(encoder.finish()));
        self.queue.on_submitted_work_done(move || completion.signal());
        frame.present();
        self.submissions.record(submission);
    }

    fn execute(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pass: &CompiledPass<wgpu::RenderPipeline>,
        orientation: Orientation,
        sources: &wgpu::BindGroup,
        target: &wgpu::TextureView,
        viewport: Option<Viewport>,
    ) {
        let parameters = self.parameter_bindings(&pass.layout);
        self.executor.execute(
            encoder,
            &PassInvocation {
                pass,
                vertex_buffers: &[&self.quads[orientation.index()]],
                parameters: &parameters,
                sources,
                target,
                viewport,
            },
        );
    }

    /// Current slot of each parameter block a pass declares, in group order
    fn parameter_bindings(&self, layout: &PassLayout) -> ParameterBindings<'_> {
        layout
            .parameter_blocks
            .iter()
            .filter_map(|block| match ParameterKind::of(block).ok()? {
                ParameterKind::Filter => Some(self.filter_parameters.binding()),
                ParameterKind::Color => Some(self.color_parameters.binding()),
                ParameterKind::Blur => self.blur_parameters.as_ref().map(GpuParameters::binding),
            })
            .collect()
    }

    /// Sizes the processing textures for a surface
    ///
    /// The size is the surface's physical size turned landscape, or
    /// `(max_width, max_height)` if that exceeds either bound. Render targets,
    /// their bind groups, the blur offsets and the viewport are all rebuilt.
    pub fn set_resolution<S: DisplaySurface>(&mut self, surface: &S, max_width: u32, max_height: u32) -> Result<(), RendererError> {
        let (logical_width, logical_height) = surface.logical_size();
        let scale_factor = surface.scale_factor();
        let size = texture_size((logical_width, logical_height), scale_factor, (max_width, max_height));

        let targets = Targets::new(&self.device, self.cache.resolver().layouts(), self.config.output_format, size)?;
        self.targets = FrameTargets::Ready(targets);

        if let Some(blur_parameters) = &mut self.blur_parameters {
            blur_parameters.write_next(&self.queue, |slot| write_blur_offsets(slot, size.0, size.1));
        }

        if self.surface_size == (0, 0) {
            self.surface_size = ((logical_width * scale_factor).round() as u32, (logical_height * scale_factor).round() as u32);
        }
        self.update_viewport();

        tracing::debug!(width = size.0, height = size.1, "allocated render targets");
        Ok(())
    }

    /// Records a new physical surface size and recomputes the viewport
    pub fn resize(&mut self, width: u32, height: u32) {
        self.surface_size = (width, height);
        self.update_viewport();
    }

    fn update_viewport(&mut self) {
        let (width, height) = (self.surface_size.0 as f32, self.surface_size.1 as f32);
        self.viewport = match self.targets.ready() {
            Some(targets) => Viewport::letterbox(width, height, targets.aspect()),
            None => Viewport { x: 0.0, y: 0.0, width, height },
        };
    }

    /// Replaces the filter chain
    ///
    /// Passes that fail to resolve are logged and left out.
    ///
    /// # Arguments
    /// * `names` - Pass names in the order they run
    /// * `uses_blur` - Whether the passes read the blurred image
    pub fn set_video_filter<N: AsRef<str>>(&mut self, names: &[N], uses_blur: bool) {
        self.chain = FilterChain::resolve(&mut self.cache, names, uses_blur, self.blur_parameters.is_some());
        tracing::info!(passes = ?self.chain.names(), uses_blur, "video filter changed");
    }

    /// Switches the color pass and its convolution
    ///
    /// # Arguments
    /// * `name` - Color pass to use; the current one stays if it fails to resolve
    /// * `convolution` - Row-major 3x3 matrix; anything but nine values means identity
    pub fn set_color_filter(&mut self, name: &str, convolution: &[f32]) {
        match self.cache.get(name) {
            Ok(pass) if self.blur_parameters.is_none() && reads_blur_parameters(&pass.layout) => {
                tracing::warn!(pass = name, "keeping previous color pass, blur parameters are unavailable");
            }
            Ok(pass) => self.color_pass = pass,
            Err(error) => tracing::warn!(pass = name, %error, "keeping previous color pass"),
        }

        let mut identity = true;
        self.color_parameters.write_next(&self.queue, |slot| identity = write_convolution(slot, convolution));
        tracing::info!(pass = %self.color_pass.name, identity, "color filter changed");
    }

    fn write_filter_parameters(&mut self) {
        let settings = &self.settings;
        self.filter_parameters.write_next(&self.queue, |slot| settings.write(slot));
    }

    /// Sets the first filter color; filters see its complement while the screen is inverted
    pub fn set_primary_color(&mut self, color: Rgba) {
        self.settings.primary_color = color;
        self.write_filter_parameters();
    }

    /// Sets the second filter color, inverted like the primary one
    pub fn set_secondary_color(&mut self, color: Rgba) {
        self.settings.secondary_color = color;
        self.write_filter_parameters();
    }

    /// Inverts the presented image, writing complementary filter colors so they still come out as chosen
    pub fn set_invert_screen(&mut self, invert: bool) {
        self.settings.invert_screen = invert;
        self.write_filter_parameters();
    }

    /// Enables the blur stage for chains that read the blurred image
    ///
    /// Takes effect on the next rendered frame without touching any slot.
    pub fn set_apply_blur(&mut self, apply: bool) {
        self.settings.apply_blur = apply;
    }

    /// The primary color as set, never inverted
    pub fn primary_color(&self) -> Rgba {
        self.settings.primary_color
    }

    /// The secondary color as set, never inverted
    pub fn secondary_color(&self) -> Rgba {
        self.settings.secondary_color
    }

    /// Whether the present pass inverts the image
    pub fn invert_screen(&self) -> bool {
        self.settings.invert_screen
    }

    /// Whether blur is enabled, off by default
    pub fn apply_blur(&self) -> bool {
        self.settings.apply_blur
    }

    /// Whether the device qualified for high quality blur and thresholds
    pub fn high_quality(&self) -> bool {
        self.settings.high_quality
    }

    /// Region of the surface the present pass draws into
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Size of the processing textures, once a resolution is set
    pub fn texture_size(&self) -> Option<(u32, u32)> {
        self.targets.ready().map(|targets| targets.size)
    }

    /// Names of the filter passes that resolved, in the order they run
    pub fn video_filter_names(&self) -> Vec<String> {
        self.chain.names()
    }

    /// Blur pair in use, if any compiled
    pub fn blur_quality(&self) -> Option<BlurQuality> {
        self.blur.as_ref().map(|stage| stage.quality)
    }

    /// Output of the color pass, for inspection
    pub fn converted_texture(&self) -> Option<&wgpu::Texture> {
        self.targets.ready().map(|targets| &targets.converted.texture)
    }

    /// The filter parameter slot passes currently bind
    pub fn filter_parameters(&self) -> SlotRef<'_, FilterParameters> {
        self.filter_parameters.parameters().current()
    }

    /// The color parameter slot the color pass currently binds
    pub fn color_parameters(&self) -> SlotRef<'_, ColorParameters> {
        self.color_parameters.parameters().current()
    }
}
