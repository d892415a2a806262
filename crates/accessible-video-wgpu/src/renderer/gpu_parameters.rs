use super::allocate;
use crate::{
    error::{LayoutError, RendererError},
    parameters::{ParameterBlock, ParameterRing, RotatingParameters, SlotMut},
    pass_executor::ParameterBinding,
    pipeline_cache::{PassResolver, PipelineCache},
    wgsl_resolver::BindingLayouts,
};
use std::num::NonZeroU64;

/// A parameter ring mirrored into a uniform buffer
///
/// Writes land in the CPU mirror first and only the written slot is
/// uploaded, at the slot's own offset.
#[derive(Debug)]
pub(crate) struct GpuParameters<T> {
    parameters: RotatingParameters<T>,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl<T: ParameterBlock> GpuParameters<T> {
    /// Sizes a ring from the block the shader library declares and uploads its initial contents
    pub(crate) fn new<R: PassResolver>(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layouts: &BindingLayouts,
        cache: &PipelineCache<R>,
        slots: usize,
    ) -> Result<Self, RendererError> {
        let block = cache.parameter_block(T::VARIABLE).ok_or(LayoutError::MissingBlock(T::VARIABLE))?;
        let ring = ParameterRing::<T>::new(&block, device.limits().min_uniform_buffer_offset_alignment, slots)?;

        let buffer = allocate(device, T::VARIABLE, || {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(T::VARIABLE),
                size: ring.as_bytes().len() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        })?;
        queue.write_buffer(&buffer, 0, ring.as_bytes());

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(T::VARIABLE),
            layout: &layouts.parameters,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(ring.block_size() as u64),
                }),
            }],
        });

        tracing::debug!(block = T::VARIABLE, slots, stride = ring.stride(), "allocated parameter ring");
        Ok(Self {
            parameters: RotatingParameters::new(ring),
            buffer,
            bind_group,
        })
    }

    /// Writes the next slot, uploads it and makes it the bound slot
    pub(crate) fn write_next(&mut self, queue: &wgpu::Queue, write: impl FnOnce(SlotMut<'_, T>)) {
        let slot = self.parameters.write_next(write);
        let ring = self.parameters.ring();
        queue.write_buffer(&self.buffer, ring.offset_for_element(slot) as u64, ring.bytes_for_element(slot));
    }

    /// Binding of the slot most recently written
    pub(crate) fn binding(&self) -> ParameterBinding<'_> {
        ParameterBinding {
            bind_group: &self.bind_group,
            offset: self.parameters.current_offset() as u32,
        }
    }

    pub(crate) fn parameters(&self) -> &RotatingParameters<T> {
        &self.parameters
    }
}
