//! Error types for renderer setup and pass resolution
//!
//! Setup failures are fatal and surface through [`RendererError`]. Failures to
//! resolve an individual pass are reported as [`PassError`] and are only fatal
//! for the passes the renderer cannot run without.

/// Errors raised while resolving a named shader pass into a pipeline
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PassError {
    /// The shader library has no entry point with this name and stage
    #[error("entry point `{entry_point}` not found for {stage} stage")]
    NotFound { entry_point: String, stage: &'static str },
    /// The shader library failed to parse
    #[error("failed to parse shader library: {0}")]
    Parse(String),
    /// The shader library failed naga validation
    #[error("failed to validate shader library: {0}")]
    Validation(String),
    /// The types of a shader module could not be laid out
    #[error("failed to reflect shader module `{module}`: {message}")]
    Reflection { module: String, message: String },
    /// The pass declares bindings outside the renderer's binding convention
    #[error("pass `{pass}` has an unsupported binding layout: {message}")]
    Layout { pass: String, message: String },
    /// The device rejected the pipeline
    #[error("failed to compile pipeline `{pass}`: {message}")]
    Compile { pass: String, message: String },
}

/// Mismatch between a reflected parameter block and its Rust-side view
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayoutError {
    /// No pass declares the parameter block
    #[error("parameter block `{0}` is not declared by the pass")]
    MissingBlock(&'static str),
    /// The renderer keeps no ring for a block of this name
    #[error("unknown parameter block `{0}`")]
    UnknownBlock(String),
    /// The reflected block is smaller than the view requires
    #[error("parameter block `{block}` is {actual} bytes, expected at least {expected}")]
    TooSmall { block: &'static str, expected: u32, actual: u32 },
    /// A field is missing or lives at a different offset
    #[error("field `{block}.{field}` expected at offset {expected}, found {actual:?}")]
    FieldOffset { block: &'static str, field: &'static str, expected: u32, actual: Option<u32> },
    /// A ring needs at least one slot
    #[error("a parameter ring needs at least one slot")]
    EmptyRing,
}

/// Errors that abort renderer setup or resource reallocation
#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    /// A pass the renderer cannot run without failed to resolve
    #[error("mandatory pass `{name}` is unavailable")]
    MandatoryPass {
        name: String,
        #[source]
        source: PassError,
    },
    /// A parameter block does not match the layout the renderer writes
    #[error(transparent)]
    Layout(#[from] LayoutError),
    /// The device failed to allocate a buffer or texture
    #[error("failed to allocate {what}: {message}")]
    Allocation { what: &'static str, message: String },
}

/// Errors reading a pass override manifest
#[derive(Debug, thiserror::Error)]
pub enum OverridesError {
    /// The manifest is not valid YAML or has the wrong shape
    #[error("failed to parse pass overrides: {0}")]
    Parse(#[from] serde_norway::Error),
}
