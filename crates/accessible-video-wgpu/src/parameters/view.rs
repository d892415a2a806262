//! Typed windows over raw parameter bytes
//!
//! Every view borrows a byte range of a parameter ring slot and converts
//! between logical values and the exact layout the WGSL passes read.

/// Size in bytes of a packed RGBA8 color field
pub const COLOR_FIELD_SIZE: usize = 4;

/// Size in bytes of a `mat3x3<f32>` field in uniform memory
///
/// Three columns, each padded to four floats.
pub const MATRIX3X3_FIELD_SIZE: usize = 12 * 4;

/// Floats per padded matrix column
const MATRIX_COLUMN_STRIDE: usize = 4;

/// A color with normalized channels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Returns the complementary color, keeping alpha
    pub fn inverted(self) -> Self {
        Self::new(1.0 - self.r, 1.0 - self.g, 1.0 - self.b, self.a)
    }
}

/// Scales to `[0, 255]` and truncates; NaN becomes 0
fn to_unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0) as u8
}

fn from_unorm8(value: u8) -> f32 {
    value as f32 / 255.0
}

/// Read-only view of a packed RGBA8 color
#[derive(Debug, Clone, Copy)]
pub struct ColorRef<'a> {
    bytes: &'a [u8],
}

impl<'a> ColorRef<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes: &bytes[..COLOR_FIELD_SIZE] }
    }

    pub fn r(&self) -> f32 {
        from_unorm8(self.bytes[0])
    }

    pub fn g(&self) -> f32 {
        from_unorm8(self.bytes[1])
    }

    pub fn b(&self) -> f32 {
        from_unorm8(self.bytes[2])
    }

    pub fn a(&self) -> f32 {
        from_unorm8(self.bytes[3])
    }

    pub fn get(&self) -> Rgba {
        Rgba::new(self.r(), self.g(), self.b(), self.a())
    }
}

/// Mutable view of a packed RGBA8 color
///
/// Channels are stored as `r, g, b, a` bytes, matching `unpack4x8unorm`.
#[derive(Debug)]
pub struct ColorMut<'a> {
    bytes: &'a mut [u8],
}

impl<'a> ColorMut<'a> {
    pub(crate) fn new(bytes: &'a mut [u8]) -> Self {
        Self {
            bytes: &mut bytes[..COLOR_FIELD_SIZE],
        }
    }

    pub fn view(&self) -> ColorRef<'_> {
        ColorRef::new(self.bytes)
    }

    pub fn set_r(&mut self, value: f32) {
        self.bytes[0] = to_unorm8(value);
    }

    pub fn set_g(&mut self, value: f32) {
        self.bytes[1] = to_unorm8(value);
    }

    pub fn set_b(&mut self, value: f32) {
        self.bytes[2] = to_unorm8(value);
    }

    pub fn set_a(&mut self, value: f32) {
        self.bytes[3] = to_unorm8(value);
    }

    pub fn set(&mut self, color: Rgba) {
        self.set_r(color.r);
        self.set_g(color.g);
        self.set_b(color.b);
        self.set_a(color.a);
    }
}

pub(crate) fn read_f32(bytes: &[u8], index: usize) -> f32 {
    let mut raw = [0; 4];
    raw.copy_from_slice(&bytes[index * 4..index * 4 + 4]);
    f32::from_le_bytes(raw)
}

pub(crate) fn write_f32(bytes: &mut [u8], index: usize, value: f32) {
    bytes[index * 4..index * 4 + 4].copy_from_slice(&value.to_le_bytes());
}

/// Maps a logical row-major coordinate to its float index in the padded column-major layout
fn matrix_index(row: usize, column: usize) -> usize {
    assert!(row < 3 && column < 3, "matrix coordinate ({row}, {column}) out of range");
    column * MATRIX_COLUMN_STRIDE + row
}

/// Read-only view of a 3x3 matrix in `mat3x3<f32>` uniform layout
#[derive(Debug, Clone, Copy)]
pub struct Matrix3x3Ref<'a> {
    bytes: &'a [u8],
}

impl<'a> Matrix3x3Ref<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes: &bytes[..MATRIX3X3_FIELD_SIZE],
        }
    }

    /// Returns the element at the logical `row` and `column`
    ///
    /// # Panics
    /// If either coordinate is not in `0..3`.
    pub fn get(&self, row: usize, column: usize) -> f32 {
        read_f32(self.bytes, matrix_index(row, column))
    }

    pub fn row(&self, row: usize) -> [f32; 3] {
        [self.get(row, 0), self.get(row, 1), self.get(row, 2)]
    }

    /// Returns the whole matrix in row-major order
    pub fn to_rows(&self) -> [[f32; 3]; 3] {
        [self.row(0), self.row(1), self.row(2)]
    }
}

/// Mutable view of a 3x3 matrix in `mat3x3<f32>` uniform layout
///
/// Callers address the matrix in row-major logical coordinates. Storage is
/// column-major with each column padded to four floats, so logical `(row, column)`
/// lives at float `column * 4 + row` and floats `3`, `7` and `11` are never written.
#[derive(Debug)]
pub struct Matrix3x3Mut<'a> {
    bytes: &'a mut [u8],
}

impl<'a> Matrix3x3Mut<'a> {
    pub(crate) fn new(bytes: &'a mut [u8]) -> Self {
        Self {
            bytes: &mut bytes[..MATRIX3X3_FIELD_SIZE],
        }
    }

    pub fn view(&self) -> Matrix3x3Ref<'_> {
        Matrix3x3Ref::new(self.bytes)
    }

    pub fn get(&self, row: usize, column: usize) -> f32 {
        self.view().get(row, column)
    }

    /// Writes the element at the logical `row` and `column`
    ///
    /// # Panics
    /// If either coordinate is not in `0..3`.
    pub fn set(&mut self, row: usize, column: usize, value: f32) {
        write_f32(self.bytes, matrix_index(row, column), value);
    }

    pub fn set_row(&mut self, row: usize, values: [f32; 3]) {
        for (column, value) in values.into_iter().enumerate() {
            self.set(row, column, value);
        }
    }

    /// Writes a full row-major matrix
    pub fn set_matrix(&mut self, rows: [[f32; 3]; 3]) {
        for (row, values) in rows.into_iter().enumerate() {
            self.set_row(row, values);
        }
    }

    /// Zeroes the nine logical elements
    pub fn clear(&mut self) {
        self.set_matrix([[0.0; 3]; 3]);
    }

    pub fn clear_identity(&mut self) {
        self.set_matrix([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PADDING_SENTINEL: f32 = -7.5;

    fn padded_matrix_bytes() -> Vec<u8> {
        let mut bytes = vec![0; MATRIX3X3_FIELD_SIZE];
        for column in 0..3 {
            write_f32(&mut bytes, column * 4 + 3, PADDING_SENTINEL);
        }
        bytes
    }

    #[test]
    fn test_matrix_element_lands_at_column_major_offset() {
        for row in 0..3 {
            for column in 0..3 {
                let mut bytes = padded_matrix_bytes();
                let value = (row * 3 + column) as f32 + 0.25;
                Matrix3x3Mut::new(&mut bytes).set(row, column, value);

                let offset = (column * 4 + row) * 4;
                assert_eq!(bytes[offset..offset + 4], value.to_le_bytes(), "({row}, {column})");
                assert_eq!(Matrix3x3Ref::new(&bytes).get(row, column), value);
            }
        }
    }

    #[test]
    fn test_matrix_writes_never_touch_padding() {
        let mut bytes = padded_matrix_bytes();
        let mut matrix = Matrix3x3Mut::new(&mut bytes);
        matrix.set_matrix([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
        matrix.clear();
        matrix.clear_identity();
        matrix.set_row(1, [0.5, 0.5, 0.5]);

        for column in 0..3 {
            assert_eq!(read_f32(&bytes, column * 4 + 3), PADDING_SENTINEL);
        }
    }

    #[test]
    fn test_set_matrix_converts_rows_to_columns() {
        let mut bytes = padded_matrix_bytes();
        Matrix3x3Mut::new(&mut bytes).set_matrix([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);

        // Physical order is column-major: first column holds 1, 4, 7
        assert_eq!(read_f32(&bytes, 0), 1.0);
        assert_eq!(read_f32(&bytes, 1), 4.0);
        assert_eq!(read_f32(&bytes, 2), 7.0);
        assert_eq!(read_f32(&bytes, 4), 2.0);
        assert_eq!(read_f32(&bytes, 8), 3.0);
        assert_eq!(read_f32(&bytes, 10), 9.0);
        assert_eq!(Matrix3x3Ref::new(&bytes).row(1), [4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_clear_identity() {
        let mut bytes = padded_matrix_bytes();
        let mut matrix = Matrix3x3Mut::new(&mut bytes);
        matrix.set_matrix([[9.0; 3]; 3]);
        matrix.clear_identity();

        for row in 0..3 {
            for column in 0..3 {
                let expected = if row == column { 1.0 } else { 0.0 };
                assert_eq!(matrix.get(row, column), expected);
            }
        }
    }

    #[test]
    fn test_clear_zeroes_logical_elements() {
        let mut bytes = padded_matrix_bytes();
        let mut matrix = Matrix3x3Mut::new(&mut bytes);
        matrix.clear_identity();
        matrix.clear();
        assert_eq!(matrix.view().to_rows(), [[0.0; 3]; 3]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_matrix_rejects_invalid_row() {
        let mut bytes = padded_matrix_bytes();
        Matrix3x3Mut::new(&mut bytes).set(3, 0, 1.0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_matrix_rejects_invalid_column() {
        let bytes = padded_matrix_bytes();
        Matrix3x3Ref::new(&bytes).get(0, 3);
    }

    #[test]
    fn test_color_channels_round_trip_through_unorm8() {
        let mut bytes = [0; 8];
        let mut color = ColorMut::new(&mut bytes[2..]);
        color.set(Rgba::new(1.0, 0.0, 0.5, 0.75));

        assert_eq!(bytes[..2], [0, 0]);
        assert_eq!(bytes[2..6], [255, 0, 127, 191]);
        assert_eq!(bytes[6..], [0, 0]);

        let read = ColorRef::new(&bytes[2..]).get();
        assert_eq!(read.r, 1.0);
        assert_eq!(read.g, 0.0);
        assert_eq!(read.b, 127.0 / 255.0);
        assert_eq!(read.a, 191.0 / 255.0);
    }

    #[test]
    fn test_color_write_truncates() {
        let mut bytes = [0; 4];
        ColorMut::new(&mut bytes).set(Rgba::new(0.5, 0.999, 0.2, 0.75));
        assert_eq!(bytes, [127, 254, 51, 191]);

        let mut color = ColorMut::new(&mut bytes);
        color.set_r(0.9999);
        color.set_a(1.0);
        assert_eq!(bytes, [254, 254, 51, 255]);
    }

    #[test]
    fn test_color_clamps_out_of_range_channels() {
        let mut bytes = [0; 4];
        let mut color = ColorMut::new(&mut bytes);
        color.set(Rgba::new(-0.5, 1.5, f32::NAN, 1.0));
        assert_eq!(bytes, [0, 255, 0, 255]);
    }

    #[test]
    fn test_inverted_keeps_alpha() {
        let inverted = Rgba::new(0.25, 0.5, 1.0, 0.3).inverted();
        assert_eq!(inverted, Rgba::new(0.75, 0.5, 0.0, 0.3));
    }
}
