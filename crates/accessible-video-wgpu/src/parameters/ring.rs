//! Fixed-size rings of parameter slots
//!
//! A ring carves `count` equally-strided slots out of one contiguous allocation.
//! The renderer writes the slot after the one most recently bound and binds
//! slots by byte offset, so the CPU never rewrites memory an in-flight frame
//! may still be reading.

use super::ParameterBlock;
use crate::{error::LayoutError, reflection::BlockLayout};
use std::{marker::PhantomData, num::NonZeroUsize};

/// A rotating index over the slots of a ring
///
/// The value is always in `0..count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingCursor {
    value: usize,
    count: NonZeroUsize,
}

impl RingCursor {
    pub fn new(count: NonZeroUsize) -> Self {
        Self { value: 0, count }
    }

    /// The slot most recently written
    pub fn current(&self) -> usize {
        self.value
    }

    /// The slot the next write goes to
    pub fn next(&self) -> usize {
        (self.value + 1) % self.count.get()
    }

    pub fn advance(&mut self) {
        self.value = self.next();
    }

    pub fn count(&self) -> usize {
        self.count.get()
    }
}

/// Read-only view of one slot of a ring
#[derive(Debug)]
pub struct SlotRef<'a, T> {
    pub(crate) bytes: &'a [u8],
    _block: PhantomData<fn() -> T>,
}

/// Mutable view of one slot of a ring
#[derive(Debug)]
pub struct SlotMut<'a, T> {
    pub(crate) bytes: &'a mut [u8],
    _block: PhantomData<fn() -> T>,
}

impl<'a, T> SlotRef<'a, T> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, _block: PhantomData }
    }
}

impl<'a, T> SlotMut<'a, T> {
    pub(crate) fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes, _block: PhantomData }
    }

    pub fn view(&self) -> SlotRef<'_, T> {
        SlotRef::new(self.bytes)
    }
}

/// `count` slots of parameter block `T` in one contiguous allocation
///
/// Slot `i` starts at byte `i * stride`. The stride is the reflected block size
/// rounded up to the binding offset alignment, so every slot can be bound
/// directly with a dynamic offset.
#[derive(Debug, Clone)]
pub struct ParameterRing<T> {
    bytes: Vec<u8>,
    block_size: usize,
    stride: usize,
    count: usize,
    _block: PhantomData<fn() -> T>,
}

impl<T: ParameterBlock> ParameterRing<T> {
    /// Allocates a ring for a reflected parameter block
    ///
    /// # Arguments
    /// * `block` - Reflected layout of the block as the pass declares it
    /// * `offset_alignment` - Required alignment of bound offsets, in bytes
    /// * `count` - Number of slots
    ///
    /// # Returns
    /// The ring with every slot initialized, or an error if the block does not
    /// match the fields `T` writes
    pub fn new(block: &BlockLayout, offset_alignment: u32, count: usize) -> Result<Self, LayoutError> {
        if count == 0 {
            return Err(LayoutError::EmptyRing);
        }
        T::check_layout(block)?;

        let block_size = block.size as usize;
        let stride = block_size.next_multiple_of(offset_alignment.max(1) as usize);
        let mut ring = Self {
            bytes: vec![0; stride * count],
            block_size,
            stride,
            count,
            _block: PhantomData,
        };
        for index in 0..count {
            T::initialize(ring.element_mut(index));
        }

        Ok(ring)
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Distance in bytes between consecutive slots
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Size in bytes of one block, the span bound for a slot
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns the slot at `index % count`
    pub fn element(&self, index: usize) -> SlotRef<'_, T> {
        let offset = (index % self.count) * self.stride;
        SlotRef::new(&self.bytes[offset..offset + self.block_size])
    }

    /// Returns the slot at `index % count` for writing
    pub fn element_mut(&mut self, index: usize) -> SlotMut<'_, T> {
        let offset = (index % self.count) * self.stride;
        SlotMut::new(&mut self.bytes[offset..offset + self.block_size])
    }

    /// Byte offset of slot `index` within the allocation
    ///
    /// # Panics
    /// If `index` is not a valid slot.
    pub fn offset_for_element(&self, index: usize) -> usize {
        assert!(index < self.count, "slot {index} out of range for a ring of {}", self.count);
        index * self.stride
    }

    /// The bytes of slot `index`, ready for upload at [`Self::offset_for_element`]
    ///
    /// # Panics
    /// If `index` is not a valid slot.
    pub fn bytes_for_element(&self, index: usize) -> &[u8] {
        let offset = self.offset_for_element(index);
        &self.bytes[offset..offset + self.block_size]
    }

    /// The whole allocation
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// A ring paired with the cursor that rotates through it
#[derive(Debug, Clone)]
pub struct RotatingParameters<T> {
    ring: ParameterRing<T>,
    cursor: RingCursor,
}

impl<T: ParameterBlock> RotatingParameters<T> {
    pub fn new(ring: ParameterRing<T>) -> Self {
        // `ParameterRing::new` rejects empty rings
        let count = NonZeroUsize::new(ring.count()).unwrap_or(NonZeroUsize::MIN);
        Self {
            ring,
            cursor: RingCursor::new(count),
        }
    }

    /// Writes the slot after the current one and makes it current
    ///
    /// # Returns
    /// The index of the slot that was written
    pub fn write_next(&mut self, write: impl FnOnce(SlotMut<'_, T>)) -> usize {
        let slot = self.cursor.next();
        write(self.ring.element_mut(slot));
        self.cursor.advance();
        slot
    }

    /// Index of the slot most recently written
    pub fn current_slot(&self) -> usize {
        self.cursor.current()
    }

    pub fn current(&self) -> SlotRef<'_, T> {
        self.ring.element(self.cursor.current())
    }

    /// Byte offset of the slot most recently written
    pub fn current_offset(&self) -> usize {
        self.ring.offset_for_element(self.cursor.current())
    }

    pub fn ring(&self) -> &ParameterRing<T> {
        &self.ring
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{ColorParameters, FilterParameters, test_support::block};

    fn filter_ring(count: usize) -> ParameterRing<FilterParameters> {
        let layout = block(
            "filter_parameters",
            16,
            &[("primary_color", 0), ("secondary_color", 4), ("low_threshold", 8), ("high_threshold", 12)],
        );
        ParameterRing::new(&layout, 256, count).unwrap()
    }

    #[test]
    fn test_stride_is_aligned_block_size() {
        let ring = filter_ring(3);
        assert_eq!(ring.block_size(), 16);
        assert_eq!(ring.stride(), 256);
        assert_eq!(ring.as_bytes().len(), 256 * 3);
        assert_eq!(ring.offset_for_element(0), 0);
        assert_eq!(ring.offset_for_element(2), 512);
    }

    #[test]
    fn test_element_wraps_modulo_count() {
        let mut ring = filter_ring(3);
        for index in 0..3 {
            ring.element_mut(index).set_thresholds(index as f32, 0.0);
        }

        for index in 0..6 {
            assert_eq!(ring.element(index).low_threshold(), ring.element(index + 3).low_threshold());
            assert_eq!(ring.element(index).bytes.as_ptr(), ring.element(index + 3).bytes.as_ptr());
        }
        assert_eq!(ring.element(4).low_threshold(), 1.0);
    }

    #[test]
    fn test_slots_do_not_overlap() {
        let mut ring = filter_ring(3);
        ring.element_mut(1).set_thresholds(0.5, 0.75);

        assert_eq!(ring.element(0).low_threshold(), 0.0);
        assert_eq!(ring.element(2).high_threshold(), 0.0);
        assert_eq!(ring.bytes_for_element(1)[8..12], 0.5f32.to_le_bytes());
        assert!(ring.as_bytes()[256 + 16..512].iter().all(|&b| b == 0));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_offset_for_invalid_slot_panics() {
        filter_ring(3).offset_for_element(3);
    }

    #[test]
    fn test_empty_ring_is_rejected() {
        let layout = block("color_parameters", 48, &[("convolution", 0)]);
        assert_eq!(ParameterRing::<ColorParameters>::new(&layout, 256, 0).unwrap_err(), LayoutError::EmptyRing);
    }

    #[test]
    fn test_cursor_wraps_after_count_advances() {
        let count = 3;
        let mut cursor = RingCursor::new(NonZeroUsize::new(count).unwrap());
        cursor.advance();
        let after_first = cursor.current();

        for _ in 0..count {
            cursor.advance();
        }
        assert_eq!(cursor.current(), after_first);
    }

    #[test]
    fn test_cursor_stays_in_range() {
        let mut cursor = RingCursor::new(NonZeroUsize::new(3).unwrap());
        let visited: Vec<_> = (0..7)
            .map(|_| {
                cursor.advance();
                cursor.current()
            })
            .collect();
        assert_eq!(visited, vec![1, 2, 0, 1, 2, 0, 1]);
    }

    #[test]
    fn test_write_next_targets_the_slot_after_current() {
        let mut parameters = RotatingParameters::new(filter_ring(3));
        let bound = parameters.current_slot();

        let written = parameters.write_next(|mut slot| slot.set_thresholds(0.25, 0.5));

        assert_ne!(written, bound);
        assert_eq!(parameters.current_slot(), written);
        assert_eq!(parameters.current().low_threshold(), 0.25);
        assert_eq!(parameters.ring().element(bound).low_threshold(), 0.0);
        assert_eq!(parameters.current_offset(), written * 256);
    }
}
