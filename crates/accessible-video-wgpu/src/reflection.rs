//! WGSL shader library and naga-based reflection
//!
//! The library is a set of WGSL modules, each prefixed with a shared prelude
//! that declares the vertex shader, the parameter structs and the samplers.
//! Modules are parsed and validated once when added. Pass layouts are
//! reflected from the globals an entry point actually uses, and parameter
//! blocks are reflected from the global declarations so rings can be sized
//! before any pass is compiled.

use crate::error::PassError;
use naga::{
    AddressSpace, Handle, Module, ShaderStage, TypeInner,
    proc::Layouter,
    valid::{Capabilities, ModuleInfo, ValidationFlags, Validator},
};

/// Declarations shared by every module of the library
pub const PRELUDE: &str = include_str!("shaders/prelude.wgsl");

/// Modules shipped with the crate, holding the mandatory and blur passes
const BUNDLED_MODULES: &[(&str, &str)] = &[
    ("color", include_str!("shaders/color.wgsl")),
    ("present", include_str!("shaders/present.wgsl")),
    ("blur", include_str!("shaders/blur.wgsl")),
];

/// Bind group holding a pass's source textures
pub const TEXTURE_GROUP: u32 = 0;
/// Bind group holding the static samplers
pub const SAMPLER_GROUP: u32 = 1;
/// First bind group holding a parameter block
pub const FIRST_PARAMETER_GROUP: u32 = 2;
/// Number of source texture slots in the texture group
pub const TEXTURE_SLOTS: u32 = 3;
/// Number of samplers in the sampler group
pub const SAMPLER_SLOTS: u32 = 2;

/// Byte offset of one member of a reflected struct
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberLayout {
    pub name: String,
    pub offset: u32,
}

/// A uniform parameter block as the shader declares it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLayout {
    /// Name of the uniform variable
    pub name: String,
    pub group: u32,
    pub binding: u32,
    /// Size of the block type in bytes
    pub size: u32,
    pub members: Vec<MemberLayout>,
}

impl BlockLayout {
    /// Returns the offset of a struct member, if the block has it
    pub fn member_offset(&self, member: &str) -> Option<u32> {
        self.members.iter().find(|m| m.name == member).map(|m| m.offset)
    }
}

/// Bindings one pass uses, reflected from its vertex and fragment entry points
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassLayout {
    /// Parameter blocks in bind group order, starting at [`FIRST_PARAMETER_GROUP`]
    pub parameter_blocks: Vec<BlockLayout>,
}

/// Location of an entry point inside a [`ShaderLibrary`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPointRef {
    pub module: usize,
    pub index: usize,
}

/// One parsed and validated module of the library
#[derive(Debug)]
pub struct LibraryModule {
    label: String,
    source: String,
    module: Module,
    info: ModuleInfo,
    layouter: Layouter,
}

impl LibraryModule {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Full WGSL source, prelude included
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Reflects a global uniform variable into a block layout
    fn block(&self, handle: Handle<naga::GlobalVariable>) -> Option<BlockLayout> {
        let global = &self.module.global_variables[handle];
        if global.space != AddressSpace::Uniform {
            return None;
        }
        let binding = global.binding.as_ref()?;

        let members = match &self.module.types[global.ty].inner {
            TypeInner::Struct { members, .. } => members
                .iter()
                .filter_map(|member| {
                    Some(MemberLayout {
                        name: member.name.clone()?,
                        offset: member.offset,
                    })
                })
                .collect(),
            _ => Vec::new(),
        };

        Some(BlockLayout {
            name: global.name.clone().unwrap_or_default(),
            group: binding.group,
            binding: binding.binding,
            size: self.layouter[global.ty].size,
            members,
        })
    }
}

/// A collection of WGSL modules that provides named entry points
#[derive(Debug, Default)]
pub struct ShaderLibrary {
    modules: Vec<LibraryModule>,
}

impl ShaderLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a library holding the modules shipped with the crate
    pub fn bundled() -> Result<Self, PassError> {
        let mut library = Self::new();
        for (label, source) in BUNDLED_MODULES {
            library.add_module(label, source)?;
        }
        Ok(library)
    }

    /// Parses and validates a module, prefixing it with [`PRELUDE`]
    ///
    /// # Arguments
    /// * `label` - Name used in diagnostics and GPU object labels
    /// * `body` - WGSL source of the module, without the prelude
    ///
    /// # Returns
    /// An error if the module fails to parse, validate or lay out
    pub fn add_module(&mut self, label: &str, body: &str) -> Result<(), PassError> {
        let source = format!("{PRELUDE}\n{body}");

        let module = naga::front::wgsl::parse_str(&source).map_err(|e| PassError::Parse(format!("{label}: {e}")))?;
        let info = Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .map_err(|e| PassError::Validation(format!("{label}: {e}")))?;

        let mut layouter = Layouter::default();
        layouter.update(module.to_ctx()).map_err(|e| PassError::Reflection {
            module: label.to_string(),
            message: e.to_string(),
        })?;

        tracing::debug!(module = label, entry_points = module.entry_points.len(), "added shader module");
        self.modules.push(LibraryModule {
            label: label.to_string(),
            source,
            module,
            info,
            layouter,
        });
        Ok(())
    }

    pub fn module(&self, index: usize) -> &LibraryModule {
        &self.modules[index]
    }

    /// Finds an entry point by name and stage
    ///
    /// `preferred_module` is searched first, so a fragment entry point pairs
    /// with the vertex shader of its own module when several declare one.
    pub fn find_entry_point(&self, name: &str, stage: ShaderStage, preferred_module: Option<usize>) -> Result<EntryPointRef, PassError> {
        let search_order = preferred_module.into_iter().chain((0..self.modules.len()).filter(|&m| Some(m) != preferred_module));

        for module in search_order {
            let Some(library_module) = self.modules.get(module) else {
                continue;
            };
            if let Some(index) = library_module.module.entry_points.iter().position(|ep| ep.name == name && ep.stage == stage) {
                return Ok(EntryPointRef { module, index });
            }
        }

        Err(PassError::NotFound {
            entry_point: name.to_string(),
            stage: stage_name(stage),
        })
    }

    /// Reflects the bindings used by a vertex and fragment entry point pair
    ///
    /// Every used global must follow the binding convention: textures in
    /// group 0 slots `0..3`, samplers in group 1 slots `0..2`, and uniform
    /// parameter blocks at binding 0 of consecutive groups from 2.
    pub fn reflect(&self, pass: &str, vertex: EntryPointRef, fragment: EntryPointRef) -> Result<PassLayout, PassError> {
        let layout_error = |message: String| PassError::Layout {
            pass: pass.to_string(),
            message,
        };

        let mut blocks = Vec::new();

        for entry in [vertex, fragment] {
            let library_module = self.module(entry.module);
            let function_info = library_module.info.get_entry_point(entry.index);

            for (handle, global) in library_module.module.global_variables.iter() {
                if function_info[handle].is_empty() {
                    continue;
                }
                let name = global.name.as_deref().unwrap_or("<unnamed>");
                let Some(binding) = &global.binding else {
                    continue;
                };

                match (binding.group, &library_module.module.types[global.ty].inner) {
                    (TEXTURE_GROUP, TypeInner::Image { .. }) if binding.binding < TEXTURE_SLOTS => {}
                    (SAMPLER_GROUP, TypeInner::Sampler { comparison: false }) if binding.binding < SAMPLER_SLOTS => {}
                    (group, _) if group >= FIRST_PARAMETER_GROUP && binding.binding == 0 => {
                        let block = library_module
                            .block(handle)
                            .ok_or_else(|| layout_error(format!("`{name}` in group {group} is not a uniform block")))?;
                        if !blocks.iter().any(|b: &BlockLayout| b.group == block.group) {
                            blocks.push(block);
                        }
                    }
                    (group, _) => {
                        return Err(layout_error(format!("`{name}` at group {group} binding {} is outside the binding convention", binding.binding)));
                    }
                }
            }
        }

        blocks.sort_by_key(|b| b.group);
        for (index, block) in blocks.iter().enumerate() {
            let expected = FIRST_PARAMETER_GROUP + index as u32;
            if block.group != expected {
                return Err(layout_error(format!("parameter block `{}` is in group {}, expected group {expected}", block.name, block.group)));
            }
        }

        Ok(PassLayout { parameter_blocks: blocks })
    }

    /// Reflects a parameter block by the name of its uniform variable
    ///
    /// Looks at declarations rather than uses, so a block can be sized from a
    /// module even when none of its entry points read it.
    pub fn parameter_block(&self, variable: &str) -> Option<BlockLayout> {
        self.modules.iter().find_map(|library_module| {
            library_module
                .module
                .global_variables
                .iter()
                .find(|(_, global)| global.name.as_deref() == Some(variable))
                .and_then(|(handle, _)| library_module.block(handle))
        })
    }
}

fn stage_name(stage: ShaderStage) -> &'static str {
    match stage {
        ShaderStage::Vertex => "vertex",
        ShaderStage::Fragment => "fragment",
        _ => "compute",
    }
}
