//! Compiles WGSL library entry points into render pipelines

use crate::{
    error::PassError,
    geometry::QuadVertex,
    parameters::ParameterKind,
    pipeline_cache::{EntryPoints, PassResolver},
    reflection::{BlockLayout, PassLayout, SAMPLER_SLOTS, ShaderLibrary, TEXTURE_SLOTS},
};
use naga::ShaderStage;
use std::collections::HashMap;

/// Bind group layouts shared by every pass
///
/// All passes bind the same three layouts, so source texture and parameter
/// bind groups are built once and reused by whichever pass needs them.
#[derive(Debug)]
pub struct BindingLayouts {
    /// Group 0: source textures
    pub textures: wgpu::BindGroupLayout,
    /// Group 1: nearest and bilinear samplers
    pub samplers: wgpu::BindGroupLayout,
    /// Groups 2 and up: one uniform parameter block with a dynamic offset
    pub parameters: wgpu::BindGroupLayout,
}

impl BindingLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let textures = (0..TEXTURE_SLOTS)
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            })
            .collect::<Vec<_>>();

        let samplers = (0..SAMPLER_SLOTS)
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            })
            .collect::<Vec<_>>();

        Self {
            textures: device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Source Textures"),
                entries: &textures,
            }),
            samplers: device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Samplers"),
                entries: &samplers,
            }),
            parameters: device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Parameter Block"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            }),
        }
    }
}

/// A [`PassResolver`] that compiles entry points of a [`ShaderLibrary`]
///
/// Every pipeline draws the full-screen quad into a single color target of
/// the configured output format.
#[derive(Debug)]
pub struct WgslPassResolver {
    device: wgpu::Device,
    library: ShaderLibrary,
    layouts: BindingLayouts,
    output_format: wgpu::TextureFormat,
    shader_modules: HashMap<usize, wgpu::ShaderModule>,
}

impl WgslPassResolver {
    pub fn new(device: &wgpu::Device, library: ShaderLibrary, output_format: wgpu::TextureFormat) -> Self {
        Self {
            device: device.clone(),
            layouts: BindingLayouts::new(device),
            library,
            output_format,
            shader_modules: HashMap::new(),
        }
    }

    pub fn layouts(&self) -> &BindingLayouts {
        &self.layouts
    }

    fn shader_module(&mut self, index: usize) -> wgpu::ShaderModule {
        let module = self.library.module(index);
        self.shader_modules
            .entry(index)
            .or_insert_with(|| {
                self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(module.label()),
                    source: wgpu::ShaderSource::Wgsl(module.source().into()),
                })
            })
            .clone()
    }
}

impl PassResolver for WgslPassResolver {
    type Pipeline = wgpu::RenderPipeline;

    fn resolve(&mut self, pass: &str, entry_points: &EntryPoints) -> Result<(wgpu::RenderPipeline, PassLayout), PassError> {
        let fragment = self.library.find_entry_point(&entry_points.fragment, ShaderStage::Fragment, None)?;
        let vertex = self.library.find_entry_point(&entry_points.vertex, ShaderStage::Vertex, Some(fragment.module))?;
        let layout = self.library.reflect(pass, vertex, fragment)?;

        for block in &layout.parameter_blocks {
            ParameterKind::of(block).map_err(|e| PassError::Layout {
                pass: pass.to_string(),
                message: e.to_string(),
            })?;
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex_module = self.shader_module(vertex.module);
        let fragment_module = self.shader_module(fragment.module);

        let mut bind_group_layouts = vec![&self.layouts.textures, &self.layouts.samplers];
        bind_group_layouts.extend(layout.parameter_blocks.iter().map(|_| &self.layouts.parameters));

        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(pass),
            bind_group_layouts: &bind_group_layouts,
            push_constant_ranges: &[],
        });

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(pass),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some(&entry_points.vertex),
                compilation_options: Default::default(),
                buffers: &[QuadVertex::LAYOUT],
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some(&entry_points.fragment),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.output_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(PassError::Compile {
                pass: pass.to_string(),
                message: error.to_string(),
            });
        }

        Ok((pipeline, layout))
    }

    fn parameter_block(&self, variable: &str) -> Option<BlockLayout> {
        self.library.parameter_block(variable)
    }
}
