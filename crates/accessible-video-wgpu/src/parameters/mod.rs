//! Parameter blocks written by the CPU and read by the passes
//!
//! Each block kind names the uniform variable that carries it and the byte
//! offsets of the fields the renderer writes. Those offsets are checked
//! against the reflected shader layout when a ring is created, so a shader
//! whose struct drifts from the Rust side fails at setup instead of silently
//! reading the wrong bytes.

mod ring;
mod view;

pub use ring::{ParameterRing, RingCursor, RotatingParameters, SlotMut, SlotRef};
pub use view::{COLOR_FIELD_SIZE, ColorMut, ColorRef, MATRIX3X3_FIELD_SIZE, Matrix3x3Mut, Matrix3x3Ref, Rgba};

use crate::{error::LayoutError, reflection::BlockLayout};
use view::{read_f32, write_f32};

/// A uniform parameter block with a fixed byte layout
pub trait ParameterBlock: Sized {
    /// Name of the uniform variable that carries the block
    const VARIABLE: &'static str;
    /// Bytes the views touch
    const SIZE: u32;
    /// Fields the views touch, with their byte offsets
    const FIELDS: &'static [(&'static str, u32)];

    /// Fills a freshly allocated slot
    fn initialize(_slot: SlotMut<'_, Self>) {}

    /// Verifies a reflected block matches the offsets the views use
    fn check_layout(block: &BlockLayout) -> Result<(), LayoutError> {
        if block.size < Self::SIZE {
            return Err(LayoutError::TooSmall {
                block: Self::VARIABLE,
                expected: Self::SIZE,
                actual: block.size,
            });
        }

        for &(field, expected) in Self::FIELDS {
            let actual = block.member_offset(field);
            if actual != Some(expected) {
                return Err(LayoutError::FieldOffset {
                    block: Self::VARIABLE,
                    field,
                    expected,
                    actual,
                });
            }
        }

        Ok(())
    }
}

/// The parameter block kinds the renderer keeps a ring for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    Filter,
    Color,
    Blur,
}

impl ParameterKind {
    /// Identifies a reflected block by its variable name and checks its layout
    pub fn of(block: &BlockLayout) -> Result<Self, LayoutError> {
        let kind = if block.name == FilterParameters::VARIABLE {
            Self::Filter
        } else if block.name == ColorParameters::VARIABLE {
            Self::Color
        } else if block.name == BlurParameters::VARIABLE {
            Self::Blur
        } else {
            return Err(LayoutError::UnknownBlock(block.name.clone()));
        };

        match kind {
            Self::Filter => FilterParameters::check_layout(block)?,
            Self::Color => ColorParameters::check_layout(block)?,
            Self::Blur => BlurParameters::check_layout(block)?,
        }
        Ok(kind)
    }
}

/// Colors and edge thresholds shared by the filter passes and the present pass
///
/// ```wgsl
/// struct FilterParameters {
///     primary_color: u32,
///     secondary_color: u32,
///     low_threshold: f32,
///     high_threshold: f32,
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub enum FilterParameters {}

impl FilterParameters {
    const PRIMARY_COLOR: usize = 0;
    const SECONDARY_COLOR: usize = 4;
    const LOW_THRESHOLD: usize = 8;
    const HIGH_THRESHOLD: usize = 12;
}

impl ParameterBlock for FilterParameters {
    const VARIABLE: &'static str = "filter_parameters";
    const SIZE: u32 = 16;
    const FIELDS: &'static [(&'static str, u32)] = &[
        ("primary_color", Self::PRIMARY_COLOR as u32),
        ("secondary_color", Self::SECONDARY_COLOR as u32),
        ("low_threshold", Self::LOW_THRESHOLD as u32),
        ("high_threshold", Self::HIGH_THRESHOLD as u32),
    ];
}

impl SlotRef<'_, FilterParameters> {
    pub fn primary_color(&self) -> ColorRef<'_> {
        ColorRef::new(&self.bytes[FilterParameters::PRIMARY_COLOR..])
    }

    pub fn secondary_color(&self) -> ColorRef<'_> {
        ColorRef::new(&self.bytes[FilterParameters::SECONDARY_COLOR..])
    }

    pub fn low_threshold(&self) -> f32 {
        read_f32(self.bytes, FilterParameters::LOW_THRESHOLD / 4)
    }

    pub fn high_threshold(&self) -> f32 {
        read_f32(self.bytes, FilterParameters::HIGH_THRESHOLD / 4)
    }
}

impl SlotMut<'_, FilterParameters> {
    pub fn primary_color(&mut self) -> ColorMut<'_> {
        ColorMut::new(&mut self.bytes[FilterParameters::PRIMARY_COLOR..])
    }

    pub fn secondary_color(&mut self) -> ColorMut<'_> {
        ColorMut::new(&mut self.bytes[FilterParameters::SECONDARY_COLOR..])
    }

    pub fn set_thresholds(&mut self, low: f32, high: f32) {
        write_f32(self.bytes, FilterParameters::LOW_THRESHOLD / 4, low);
        write_f32(self.bytes, FilterParameters::HIGH_THRESHOLD / 4, high);
    }
}

/// The color convolution the color pass applies after YUV to RGB conversion
///
/// ```wgsl
/// struct ColorParameters {
///     convolution: mat3x3<f32>,
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub enum ColorParameters {}

impl ParameterBlock for ColorParameters {
    const VARIABLE: &'static str = "color_parameters";
    const SIZE: u32 = MATRIX3X3_FIELD_SIZE as u32;
    const FIELDS: &'static [(&'static str, u32)] = &[("convolution", 0)];

    fn initialize(mut slot: SlotMut<'_, Self>) {
        slot.convolution().clear_identity();
    }
}

impl SlotRef<'_, ColorParameters> {
    pub fn convolution(&self) -> Matrix3x3Ref<'_> {
        Matrix3x3Ref::new(self.bytes)
    }
}

impl SlotMut<'_, ColorParameters> {
    pub fn convolution(&mut self) -> Matrix3x3Mut<'_> {
        Matrix3x3Mut::new(self.bytes)
    }
}

/// Texel offsets for the two separable blur passes
///
/// Uniform arrays have a 16 byte element stride, so each offset occupies a
/// `vec4<f32>` of which only `xy` is read.
///
/// ```wgsl
/// struct BlurParameters {
///     x_offsets: array<vec4<f32>, 3>,
///     y_offsets: array<vec4<f32>, 3>,
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub enum BlurParameters {}

impl BlurParameters {
    /// Number of taps on each side of the center
    pub const TAPS: usize = 3;
    const X_OFFSETS: usize = 0;
    const Y_OFFSETS: usize = 48;
    const ELEMENT_STRIDE: usize = 16;

    fn float_index(base: usize, tap: usize, component: usize) -> usize {
        (base + tap * Self::ELEMENT_STRIDE) / 4 + component
    }
}

impl ParameterBlock for BlurParameters {
    const VARIABLE: &'static str = "blur_parameters";
    const SIZE: u32 = 96;
    const FIELDS: &'static [(&'static str, u32)] = &[("x_offsets", Self::X_OFFSETS as u32), ("y_offsets", Self::Y_OFFSETS as u32)];
}

impl SlotRef<'_, BlurParameters> {
    fn offsets(&self, base: usize) -> [[f32; 2]; BlurParameters::TAPS] {
        std::array::from_fn(|tap| {
            [
                read_f32(self.bytes, BlurParameters::float_index(base, tap, 0)),
                read_f32(self.bytes, BlurParameters::float_index(base, tap, 1)),
            ]
        })
    }

    pub fn x_offsets(&self) -> [[f32; 2]; BlurParameters::TAPS] {
        self.offsets(BlurParameters::X_OFFSETS)
    }

    pub fn y_offsets(&self) -> [[f32; 2]; BlurParameters::TAPS] {
        self.offsets(BlurParameters::Y_OFFSETS)
    }
}

impl SlotMut<'_, BlurParameters> {
    fn set_offsets(&mut self, base: usize, offsets: [[f32; 2]; BlurParameters::TAPS]) {
        for (tap, [x, y]) in offsets.into_iter().enumerate() {
            write_f32(self.bytes, BlurParameters::float_index(base, tap, 0), x);
            write_f32(self.bytes, BlurParameters::float_index(base, tap, 1), y);
        }
    }

    pub fn set_x_offsets(&mut self, offsets: [[f32; 2]; BlurParameters::TAPS]) {
        self.set_offsets(BlurParameters::X_OFFSETS, offsets);
    }

    pub fn set_y_offsets(&mut self, offsets: [[f32; 2]; BlurParameters::TAPS]) {
        self.set_offsets(BlurParameters::Y_OFFSETS, offsets);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::reflection::{BlockLayout, MemberLayout};

    pub(crate) fn block(name: &str, size: u32, members: &[(&str, u32)]) -> BlockLayout {
        BlockLayout {
            name: name.to_string(),
            group: 2,
            binding: 0,
            size,
            members: members
                .iter()
                .map(|(name, offset)| MemberLayout {
                    name: name.to_string(),
                    offset: *offset,
                })
                .collect(),
        }
    }

    pub(crate) fn filter_block() -> BlockLayout {
        block(
            "filter_parameters",
            16,
            &[("primary_color", 0), ("secondary_color", 4), ("low_threshold", 8), ("high_threshold", 12)],
        )
    }

    pub(crate) fn color_block() -> BlockLayout {
        block("color_parameters", 48, &[("convolution", 0)])
    }

    pub(crate) fn blur_block() -> BlockLayout {
        block("blur_parameters", 96, &[("x_offsets", 0), ("y_offsets", 48)])
    }
}
