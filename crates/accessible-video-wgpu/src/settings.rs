//! Renderer configuration and the user-facing filter settings

use crate::{
    geometry::DeviceClass,
    parameters::{BlurParameters, ColorParameters, FilterParameters, ParameterBlock, Rgba, SlotMut},
    pipeline_cache::{CompiledPass, PassOverrides, PassResolver, PipelineCache},
    reflection::PassLayout,
};
use std::sync::Arc;

/// Passes the renderer cannot run without
pub const COLOR_PASS: &str = "yuv_rgb";
pub const BLIT_PASS: &str = "blit";
pub const INVERT_PASS: &str = "invert";

/// Separable blur passes, horizontal then vertical
pub const STANDARD_BLUR: (&str, &str) = ("blur_x", "blur_y");
pub const HIGH_QUALITY_BLUR: (&str, &str) = ("blur_x_hq", "blur_y_hq");

/// Tap distances of the linear-sampled gaussian, in texels
pub const BLUR_TAP_OFFSETS: [f32; BlurParameters::TAPS] = [0.0, 1.3846153846, 3.2307692308];

pub const DEFAULT_PRIMARY_COLOR: Rgba = Rgba::new(0.0, 1.0, 1.0, 0.75);
pub const DEFAULT_SECONDARY_COLOR: Rgba = Rgba::new(1.0, 0.0, 1.0, 0.75);

/// Edge thresholds as `(low, high)`
const HIGH_QUALITY_THRESHOLDS: (f32, f32) = (0.05, 0.10);
const STANDARD_THRESHOLDS: (f32, f32) = (0.15, 0.25);

/// Setup options of a [`crate::FilterRenderer`]
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Frames the GPU may have in flight; parameter rings get one more slot
    pub buffered_frames: usize,
    /// Format of every render target, the display surface included
    pub output_format: wgpu::TextureFormat,
    pub device_class: DeviceClass,
    /// Entry points of passes whose names differ from their entry points
    pub overrides: PassOverrides,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            buffered_frames: 2,
            output_format: wgpu::TextureFormat::Bgra8Unorm,
            device_class: DeviceClass::default(),
            overrides: PassOverrides::default(),
        }
    }
}

impl RendererConfig {
    /// Slots per parameter ring
    pub fn ring_slots(&self) -> usize {
        self.buffered_frames.max(1) + 1
    }
}

/// Which blur pair the device runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurQuality {
    Standard,
    /// Averages in linear light, for fully capable GPUs
    High,
}

impl BlurQuality {
    /// Queries the adapter once for high quality support
    pub fn detect(adapter: &wgpu::Adapter) -> Self {
        let compliant = adapter.get_downlevel_capabilities().is_webgpu_compliant();
        Self::from_capabilities(compliant, adapter.get_info().device_type)
    }

    pub fn from_capabilities(webgpu_compliant: bool, device_type: wgpu::DeviceType) -> Self {
        if webgpu_compliant && device_type != wgpu::DeviceType::Cpu {
            Self::High
        } else {
            Self::Standard
        }
    }

    pub fn passes(self) -> (&'static str, &'static str) {
        match self {
            Self::Standard => STANDARD_BLUR,
            Self::High => HIGH_QUALITY_BLUR,
        }
    }
}

/// Texel offsets of the horizontal and vertical blur for a texture size
///
/// # Returns
/// `(x_offsets, y_offsets)`, each scaling [`BLUR_TAP_OFFSETS`] along one axis
pub fn blur_offsets(width: u32, height: u32) -> ([[f32; 2]; BlurParameters::TAPS], [[f32; 2]; BlurParameters::TAPS]) {
    let texel_width = 1.0 / width.max(1) as f32;
    let texel_height = 1.0 / height.max(1) as f32;
    (
        BLUR_TAP_OFFSETS.map(|offset| [offset * texel_width, 0.0]),
        BLUR_TAP_OFFSETS.map(|offset| [0.0, offset * texel_height]),
    )
}

/// Writes the blur texel offsets for a texture size
pub fn write_blur_offsets(mut slot: SlotMut<'_, BlurParameters>, width: u32, height: u32) {
    let (x_offsets, y_offsets) = blur_offsets(width, height);
    slot.set_x_offsets(x_offsets);
    slot.set_y_offsets(y_offsets);
}

/// Writes a color convolution given as a row-major 3x3 matrix
///
/// Anything but exactly nine values writes the identity.
///
/// # Returns
/// Whether the identity was written
pub fn write_convolution(mut slot: SlotMut<'_, ColorParameters>, convolution: &[f32]) -> bool {
    match convolution {
        &[a, b, c, d, e, f, g, h, i] => {
            slot.convolution().set_matrix([[a, b, c], [d, e, f], [g, h, i]]);
            false
        }
        _ => {
            slot.convolution().clear_identity();
            true
        }
    }
}

/// Whether a pass binds the blur parameter block
pub fn reads_blur_parameters(layout: &PassLayout) -> bool {
    layout.parameter_blocks.iter().any(|block| block.name == BlurParameters::VARIABLE)
}

/// The blur pair resolved at setup
#[derive(Debug)]
pub struct BlurStage<P> {
    pub quality: BlurQuality,
    pub x: Arc<CompiledPass<P>>,
    pub y: Arc<CompiledPass<P>>,
}

impl<P> BlurStage<P> {
    /// Resolves the blur pair for `quality`, falling back to the standard pair
    ///
    /// # Returns
    /// `None` if no blur pair compiles; filters then read the unblurred image
    pub fn resolve<R: PassResolver<Pipeline = P>>(cache: &mut PipelineCache<R>, quality: BlurQuality) -> Option<Self> {
        let (x, y) = quality.passes();
        let resolved = match quality {
            BlurQuality::High => cache.get_with_fallback((x, y), BlurQuality::Standard.passes()),
            BlurQuality::Standard => cache.get_pair((x, y)),
        };

        match resolved {
            Ok((x, y)) => {
                let quality = if x.name == HIGH_QUALITY_BLUR.0 { BlurQuality::High } else { BlurQuality::Standard };
                tracing::info!(?quality, "blur ready");
                Some(Self { quality, x, y })
            }
            Err(error) => {
                tracing::error!(%error, "blur unavailable");
                None
            }
        }
    }
}

/// Colors and switches the filter parameter block is written from
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSettings {
    pub primary_color: Rgba,
    pub secondary_color: Rgba,
    pub invert_screen: bool,
    pub apply_blur: bool,
    pub high_quality: bool,
}

impl FilterSettings {
    pub fn new(high_quality: bool) -> Self {
        Self {
            primary_color: DEFAULT_PRIMARY_COLOR,
            secondary_color: DEFAULT_SECONDARY_COLOR,
            invert_screen: false,
            apply_blur: false,
            high_quality,
        }
    }

    /// Edge thresholds as `(low, high)`
    pub fn thresholds(&self) -> (f32, f32) {
        if self.high_quality { HIGH_QUALITY_THRESHOLDS } else { STANDARD_THRESHOLDS }
    }

    /// Writes the block the filter passes read
    ///
    /// With the screen inverted, colors are written as their complements so
    /// they come out as chosen after the present pass inverts them again.
    pub fn write(&self, mut slot: SlotMut<'_, FilterParameters>) {
        let (primary, secondary) = if self.invert_screen {
            (self.primary_color.inverted(), self.secondary_color.inverted())
        } else {
            (self.primary_color, self.secondary_color)
        };

        slot.primary_color().set(primary);
        slot.secondary_color().set(secondary);
        let (low, high) = self.thresholds();
        slot.set_thresholds(low, high);
    }
}

/// The configured sequence of filter passes
#[derive(Debug)]
pub struct FilterChain<P> {
    passes: Vec<Arc<CompiledPass<P>>>,
    uses_blur: bool,
}

impl<P> Default for FilterChain<P> {
    fn default() -> Self {
        Self {
            passes: Vec::new(),
            uses_blur: false,
        }
    }
}

impl<P> FilterChain<P> {
    /// Resolves each named pass, dropping the ones that fail
    ///
    /// # Arguments
    /// * `names` - Pass names in the order they run
    /// * `uses_blur` - Whether the passes read the blurred image
    /// * `blur_available` - Whether a blur parameter ring exists; passes that
    ///   bind blur parameters are dropped without one
    pub fn resolve<R: PassResolver<Pipeline = P>, S: AsRef<str>>(cache: &mut PipelineCache<R>, names: &[S], uses_blur: bool, blur_available: bool) -> Self {
        let passes = names
            .iter()
            .filter_map(|name| {
                let name = name.as_ref();
                let pass = cache
                    .get(name)
                    .inspect_err(|error| tracing::warn!(pass = name, %error, "dropping filter pass"))
                    .ok()?;
                if !blur_available && reads_blur_parameters(&pass.layout) {
                    tracing::warn!(pass = name, "dropping filter pass that binds blur parameters without a blur stage");
                    return None;
                }
                Some(pass)
            })
            .collect();

        Self { passes, uses_blur }
    }

    pub fn passes(&self) -> &[Arc<CompiledPass<P>>] {
        &self.passes
    }

    pub fn names(&self) -> Vec<String> {
        self.passes.iter().map(|pass| pass.name.clone()).collect()
    }

    /// Whether a frame runs the blur stage
    pub fn blur_active(&self, apply_blur: bool) -> bool {
        apply_blur && self.uses_blur
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        parameters::{
            ParameterRing, RotatingParameters,
            test_support::{blur_block, color_block, filter_block},
        },
        pipeline_cache::test_support::MockResolver,
    };

    const IDENTITY: [[f32; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    // Writes truncate, so a read may sit up to one step below the written value
    fn assert_close(actual: Rgba, expected: Rgba) {
        for (a, e) in [(actual.r, expected.r), (actual.g, expected.g), (actual.b, expected.b), (actual.a, expected.a)] {
            assert!((a - e).abs() <= 1.5 / 255.0, "{actual:?} != {expected:?}");
        }
    }

    fn filter_parameters() -> RotatingParameters<FilterParameters> {
        RotatingParameters::new(ParameterRing::new(&filter_block(), 256, 3).unwrap())
    }

    #[test]
    fn test_inverted_screen_writes_complementary_colors() {
        let mut parameters = filter_parameters();
        let mut settings = FilterSettings::new(false);
        settings.primary_color = Rgba::new(0.2, 0.4, 0.6, 0.75);
        settings.invert_screen = true;

        parameters.write_next(|slot| settings.write(slot));

        assert_close(parameters.current().primary_color().get(), Rgba::new(0.8, 0.6, 0.4, 0.75));
        assert_close(parameters.current().secondary_color().get(), Rgba::new(0.0, 1.0, 0.0, 0.75));
    }

    #[test]
    fn test_thresholds_follow_quality() {
        let mut parameters = filter_parameters();

        parameters.write_next(|slot| FilterSettings::new(true).write(slot));
        assert_eq!(parameters.current().low_threshold(), 0.05);
        assert_eq!(parameters.current().high_threshold(), 0.10);

        parameters.write_next(|slot| FilterSettings::new(false).write(slot));
        assert_eq!(parameters.current().low_threshold(), 0.15);
        assert_eq!(parameters.current().high_threshold(), 0.25);
    }

    #[test]
    fn test_default_colors() {
        let mut parameters = filter_parameters();
        parameters.write_next(|slot| FilterSettings::new(false).write(slot));

        assert_close(parameters.current().primary_color().get(), DEFAULT_PRIMARY_COLOR);
        assert_close(parameters.current().secondary_color().get(), DEFAULT_SECONDARY_COLOR);
    }

    #[test]
    fn test_chain_drops_unresolved_passes() {
        let mut cache = PipelineCache::new(MockResolver::failing(&["bar"]), PassOverrides::default());

        let chain = FilterChain::resolve(&mut cache, &["foo", "bar"], false, true);

        assert_eq!(chain.names(), vec!["foo".to_string()]);
        assert!(!chain.blur_active(true));
    }

    #[test]
    fn test_blur_needs_both_switches() {
        let mut cache = PipelineCache::new(MockResolver::default(), PassOverrides::default());
        let chain = FilterChain::resolve(&mut cache, &["edges"], true, true);

        assert!(chain.blur_active(true));
        assert!(!chain.blur_active(false));
        assert!(!FilterChain::<String>::default().blur_active(true));
    }

    #[test]
    fn test_chain_drops_blur_readers_without_blur_stage() {
        let blur_reader = PassLayout {
            parameter_blocks: vec![blur_block()],
        };
        let resolver = MockResolver::default().with_layout("soften", blur_reader);
        let mut cache = PipelineCache::new(resolver, PassOverrides::default());

        let chain = FilterChain::resolve(&mut cache, &["edges", "soften"], true, false);
        assert_eq!(chain.names(), vec!["edges".to_string()]);

        let chain = FilterChain::resolve(&mut cache, &["edges", "soften"], true, true);
        assert_eq!(chain.names(), vec!["edges".to_string(), "soften".to_string()]);
    }

    #[test]
    fn test_blur_is_off_by_default() {
        let settings = FilterSettings::new(true);
        assert!(!settings.apply_blur);
        assert!(!settings.invert_screen);
    }

    #[test]
    fn test_convolution_writes_next_color_slot() {
        let mut parameters = RotatingParameters::<ColorParameters>::new(ParameterRing::new(&color_block(), 256, 3).unwrap());
        let before = parameters.current_slot();

        let grayscale = [0.299, 0.587, 0.114, 0.299, 0.587, 0.114, 0.299, 0.587, 0.114];
        let mut identity = true;
        let written = parameters.write_next(|slot| identity = write_convolution(slot, &grayscale));

        assert!(!identity);
        assert_eq!(written, (before + 1) % 3);
        assert_eq!(parameters.current_slot(), written);
        assert_eq!(parameters.current().convolution().row(0), [0.299, 0.587, 0.114]);
        assert_eq!(parameters.current().convolution().row(2), [0.299, 0.587, 0.114]);
        // The slot that may still be bound keeps its contents
        assert_eq!(parameters.ring().element(before).convolution().to_rows(), IDENTITY);
    }

    #[test]
    fn test_convolution_needs_exactly_nine_values() {
        let mut parameters = RotatingParameters::<ColorParameters>::new(ParameterRing::new(&color_block(), 256, 3).unwrap());
        parameters.write_next(|slot| {
            write_convolution(slot, &[2.0; 9]);
        });

        for values in [&[][..], &[0.5; 8][..], &[0.5; 10][..]] {
            let mut identity = false;
            parameters.write_next(|slot| identity = write_convolution(slot, values));
            assert!(identity, "{} values", values.len());
            assert_eq!(parameters.current().convolution().to_rows(), IDENTITY);
        }
    }

    #[test]
    fn test_blur_offsets_write_next_blur_slot() {
        let mut parameters = RotatingParameters::<BlurParameters>::new(ParameterRing::new(&blur_block(), 256, 3).unwrap());
        let before = parameters.current_slot();

        let written = parameters.write_next(|slot| write_blur_offsets(slot, 640, 480));

        assert_ne!(written, before);
        let (x, y) = blur_offsets(640, 480);
        assert_eq!(parameters.current().x_offsets(), x);
        assert_eq!(parameters.current().y_offsets(), y);
        assert_eq!(parameters.ring().element(before).x_offsets(), [[0.0; 2]; BlurParameters::TAPS]);
    }

    #[test]
    fn test_blur_stage_falls_back_to_standard() {
        let mut cache = PipelineCache::new(MockResolver::failing(&["blur_x_hq"]), PassOverrides::default());

        let stage = BlurStage::resolve(&mut cache, BlurQuality::High).unwrap();
        assert_eq!(stage.quality, BlurQuality::Standard);
        assert_eq!((stage.x.name.as_str(), stage.y.name.as_str()), STANDARD_BLUR);
    }

    #[test]
    fn test_blur_stage_unavailable() {
        let mut cache = PipelineCache::new(MockResolver::failing(&["blur_y"]), PassOverrides::default());
        assert!(BlurStage::resolve(&mut cache, BlurQuality::Standard).is_none());
    }

    #[test]
    fn test_blur_quality_detection() {
        assert_eq!(BlurQuality::from_capabilities(true, wgpu::DeviceType::DiscreteGpu), BlurQuality::High);
        assert_eq!(BlurQuality::from_capabilities(true, wgpu::DeviceType::Cpu), BlurQuality::Standard);
        assert_eq!(BlurQuality::from_capabilities(false, wgpu::DeviceType::IntegratedGpu), BlurQuality::Standard);
    }

    #[test]
    fn test_blur_offsets_scale_by_texel_size() {
        let (x, y) = blur_offsets(1000, 500);
        assert_eq!(x[0], [0.0, 0.0]);
        assert!((x[1][0] - 1.3846153846 / 1000.0).abs() < 1e-7);
        assert_eq!(x[2][1], 0.0);
        assert!((y[2][1] - 3.2307692308 / 500.0).abs() < 1e-7);
        assert_eq!(y[1][0], 0.0);
    }

    #[test]
    fn test_ring_slots_exceed_frames_in_flight() {
        let config = RendererConfig::default();
        assert_eq!(config.buffered_frames, 2);
        assert_eq!(config.ring_slots(), 3);
    }
}
