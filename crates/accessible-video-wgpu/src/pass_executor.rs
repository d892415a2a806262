//! Records single full-screen passes into a command encoder

use crate::{
    geometry::{QUAD_VERTEX_COUNT, Viewport},
    pipeline_cache::CompiledPass,
    reflection::{FIRST_PARAMETER_GROUP, SAMPLER_GROUP, TEXTURE_GROUP},
    wgsl_resolver::BindingLayouts,
};

/// One slot of a parameter ring, bound with a dynamic offset
#[derive(Debug, Clone, Copy)]
pub struct ParameterBinding<'a> {
    pub bind_group: &'a wgpu::BindGroup,
    /// Byte offset of the slot within the ring buffer
    pub offset: u32,
}

/// Everything one draw needs
#[derive(Debug)]
pub struct PassInvocation<'a> {
    pub pass: &'a CompiledPass<wgpu::RenderPipeline>,
    /// Bound at consecutive slots starting at 0
    pub vertex_buffers: &'a [&'a wgpu::Buffer],
    /// Bound at consecutive groups starting at 2
    pub parameters: &'a [ParameterBinding<'a>],
    /// Source texture bind group for group 0
    pub sources: &'a wgpu::BindGroup,
    pub target: &'a wgpu::TextureView,
    /// Restricts drawing to part of the target; the whole target when `None`
    pub viewport: Option<Viewport>,
}

/// Records passes that share one static sampler bind group
#[derive(Debug)]
pub struct RenderPassExecutor {
    samplers: wgpu::BindGroup,
}

impl RenderPassExecutor {
    /// Creates the nearest and bilinear samplers every pass binds at group 1
    pub fn new(device: &wgpu::Device, layouts: &BindingLayouts) -> Self {
        let create_sampler = |label: &str, filter: wgpu::FilterMode| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter: wgpu::FilterMode::Nearest,
                ..Default::default()
            })
        };
        let nearest = create_sampler("Nearest Sampler", wgpu::FilterMode::Nearest);
        let bilinear = create_sampler("Bilinear Sampler", wgpu::FilterMode::Linear);

        let samplers = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Samplers"),
            layout: &layouts.samplers,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Sampler(&nearest),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&bilinear),
                },
            ],
        });

        Self { samplers }
    }

    /// Records one draw of the full-screen quad
    ///
    /// The target is cleared to black first, so regions outside the viewport
    /// come out as letterbox bars.
    pub fn execute(&self, encoder: &mut wgpu::CommandEncoder, invocation: &PassInvocation<'_>) {
        let name = invocation.pass.name.as_str();
        encoder.push_debug_group(name);
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(name),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: invocation.target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&invocation.pass.pipeline);
            for (slot, buffer) in invocation.vertex_buffers.iter().enumerate() {
                render_pass.set_vertex_buffer(slot as u32, buffer.slice(..));
            }
            render_pass.set_bind_group(TEXTURE_GROUP, invocation.sources, &[]);
            render_pass.set_bind_group(SAMPLER_GROUP, &self.samplers, &[]);
            for (index, parameter) in invocation.parameters.iter().enumerate() {
                render_pass.set_bind_group(FIRST_PARAMETER_GROUP + index as u32, parameter.bind_group, &[parameter.offset]);
            }

            if let Some(viewport) = invocation.viewport {
                render_pass.set_viewport(viewport.x, viewport.y, viewport.width, viewport.height, 0.0, 1.0);
            }
            render_pass.draw(0..QUAD_VERTEX_COUNT, 0..1);
        }
        encoder.pop_debug_group();
    }
}
