//! Name-keyed cache of compiled passes
//!
//! A pass is compiled the first time its name is requested and shared from
//! then on. Failures are returned to the caller and never cached, so a pass
//! that failed once is retried on the next request.

use crate::{
    error::{OverridesError, PassError},
    reflection::{BlockLayout, PassLayout},
};
use std::{collections::HashMap, sync::Arc};

/// Vertex entry point used when a pass does not name one
pub const DEFAULT_VERTEX: &str = "default_vertex";

fn default_vertex() -> String {
    DEFAULT_VERTEX.to_string()
}

/// The entry points a named pass compiles from
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EntryPoints {
    /// Fragment entry point, the pass's own name unless overridden
    pub fragment: String,
    /// Vertex entry point, [`DEFAULT_VERTEX`] when the manifest leaves it out
    #[serde(default = "default_vertex")]
    pub vertex: String,
}

impl EntryPoints {
    /// A pass whose fragment entry point has the pass's own name
    pub fn named(fragment: &str) -> Self {
        Self {
            fragment: fragment.to_string(),
            vertex: default_vertex(),
        }
    }
}

/// Maps pass names to entry points that differ from the name
///
/// Read from a YAML manifest:
///
/// ```yaml
/// high_contrast:
///   fragment: contrast_boost
/// sobel:
///   fragment: sobel_edges
///   vertex: sobel_vertex
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct PassOverrides {
    passes: HashMap<String, EntryPoints>,
}

impl PassOverrides {
    pub fn from_yaml(yaml: &str) -> Result<Self, OverridesError> {
        Ok(serde_norway::from_str(yaml)?)
    }

    pub fn insert(&mut self, pass: &str, entry_points: EntryPoints) {
        self.passes.insert(pass.to_string(), entry_points);
    }

    /// Returns the entry points of a pass, defaulting to the pass name and [`DEFAULT_VERTEX`]
    pub fn entry_points(&self, pass: &str) -> EntryPoints {
        self.passes.get(pass).cloned().unwrap_or_else(|| EntryPoints::named(pass))
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

/// A compiled pipeline with the layout reflected from its shaders
#[derive(Debug)]
pub struct CompiledPass<P> {
    /// Name the pass was requested by, also its GPU label
    pub name: String,
    pub pipeline: P,
    /// Parameter blocks the pass binds, in group order
    pub layout: PassLayout,
}

/// Two passes that run back to back, such as the halves of a separable blur
pub type PassPair<P> = (Arc<CompiledPass<P>>, Arc<CompiledPass<P>>);

/// Turns entry points into compiled pipelines
pub trait PassResolver {
    type Pipeline;

    /// Compiles the pipeline of one pass
    ///
    /// # Arguments
    /// * `pass` - Name of the pass, used for labels and diagnostics
    /// * `entry_points` - Vertex and fragment entry points to compile
    fn resolve(&mut self, pass: &str, entry_points: &EntryPoints) -> Result<(Self::Pipeline, PassLayout), PassError>;

    /// Reflects a parameter block declared by the shader source
    fn parameter_block(&self, variable: &str) -> Option<BlockLayout>;
}

/// Lazily compiled passes keyed by name
pub struct PipelineCache<R: PassResolver> {
    resolver: R,
    overrides: PassOverrides,
    passes: HashMap<String, Arc<CompiledPass<R::Pipeline>>>,
}

impl<R: PassResolver> std::fmt::Debug for PipelineCache<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineCache")
            .field("overrides", &self.overrides)
            .field("passes", &self.passes.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<R: PassResolver> PipelineCache<R> {
    pub fn new(resolver: R, overrides: PassOverrides) -> Self {
        Self {
            resolver,
            overrides,
            passes: HashMap::new(),
        }
    }

    /// Returns the compiled pass for `name`, compiling it on first use
    pub fn get(&mut self, name: &str) -> Result<Arc<CompiledPass<R::Pipeline>>, PassError> {
        if let Some(pass) = self.passes.get(name) {
            return Ok(pass.clone());
        }

        let entry_points = self.overrides.entry_points(name);
        let (pipeline, layout) = self.resolver.resolve(name, &entry_points)?;
        tracing::debug!(pass = name, fragment = %entry_points.fragment, vertex = %entry_points.vertex, "compiled pass");

        let pass = Arc::new(CompiledPass {
            name: name.to_string(),
            pipeline,
            layout,
        });
        self.passes.insert(name.to_string(), pass.clone());
        Ok(pass)
    }

    /// Returns a pair of passes, or the fallback pair if either preferred pass fails
    ///
    /// # Returns
    /// The resolved pair, or the error of the fallback pair if both fail
    pub fn get_with_fallback(&mut self, preferred: (&str, &str), fallback: (&str, &str)) -> Result<PassPair<R::Pipeline>, PassError> {
        match self.get_pair(preferred) {
            Ok(pair) => Ok(pair),
            Err(error) => {
                tracing::warn!(preferred = ?preferred, fallback = ?fallback, %error, "falling back");
                self.get_pair(fallback)
            }
        }
    }

    /// Returns both passes of a pair, or the first error
    pub fn get_pair(&mut self, (first, second): (&str, &str)) -> Result<PassPair<R::Pipeline>, PassError> {
        Ok((self.get(first)?, self.get(second)?))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.passes.contains_key(name)
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Reflects a parameter block through the resolver
    pub fn parameter_block(&self, variable: &str) -> Option<BlockLayout> {
        self.resolver.parameter_block(variable)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::HashSet;

    /// Resolves every pass except the ones marked as failing
    #[derive(Debug, Default)]
    pub(crate) struct MockResolver {
        pub failing: HashSet<String>,
        pub resolved: Vec<EntryPoints>,
        /// Layouts returned for specific passes; others get an empty layout
        pub layouts: HashMap<String, PassLayout>,
    }

    impl MockResolver {
        pub(crate) fn failing(names: &[&str]) -> Self {
            Self {
                failing: names.iter().map(|name| name.to_string()).collect(),
                ..Self::default()
            }
        }

        pub(crate) fn with_layout(mut self, pass: &str, layout: PassLayout) -> Self {
            self.layouts.insert(pass.to_string(), layout);
            self
        }
    }

    impl PassResolver for MockResolver {
        type Pipeline = String;

        fn resolve(&mut self, pass: &str, entry_points: &EntryPoints) -> Result<(String, PassLayout), PassError> {
            if self.failing.contains(pass) {
                return Err(PassError::NotFound {
                    entry_point: entry_points.fragment.clone(),
                    stage: "fragment",
                });
            }
            self.resolved.push(entry_points.clone());
            let layout = self.layouts.get(pass).cloned().unwrap_or_default();
            Ok((format!("{}+{}", entry_points.vertex, entry_points.fragment), layout))
        }

        fn parameter_block(&self, _variable: &str) -> Option<BlockLayout> {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{test_support::MockResolver, *};

    #[test]
    fn test_get_compiles_once() {
        let mut cache = PipelineCache::new(MockResolver::default(), PassOverrides::default());

        let first = cache.get("invert").unwrap();
        let second = cache.get("invert").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.resolver().resolved.len(), 1);
        assert_eq!(first.pipeline, "default_vertex+invert");
    }

    #[test]
    fn test_failures_are_not_cached() {
        let mut cache = PipelineCache::new(MockResolver::failing(&["sobel"]), PassOverrides::default());

        assert!(cache.get("sobel").is_err());
        assert!(!cache.contains("sobel"));

        cache.resolver.failing.clear();
        assert!(cache.get("sobel").is_ok());
        assert!(cache.contains("sobel"));
    }

    #[test]
    fn test_overrides_rename_entry_points() {
        let overrides = PassOverrides::from_yaml(
            "high_contrast:\n  fragment: contrast_boost\nsobel:\n  fragment: sobel_edges\n  vertex: sobel_vertex\n",
        )
        .unwrap();
        assert_eq!(overrides.len(), 2);

        let mut cache = PipelineCache::new(MockResolver::default(), overrides);
        assert_eq!(cache.get("high_contrast").unwrap().pipeline, "default_vertex+contrast_boost");
        assert_eq!(cache.get("sobel").unwrap().pipeline, "sobel_vertex+sobel_edges");
        assert_eq!(cache.get("blit").unwrap().pipeline, "default_vertex+blit");
    }

    #[test]
    fn test_malformed_overrides_are_rejected() {
        assert!(PassOverrides::from_yaml("sobel: [1, 2]").is_err());
        assert!(PassOverrides::from_yaml("sobel:\n  vertex: only_vertex\n").is_err());
    }

    #[test]
    fn test_get_with_fallback_uses_fallback_pair() {
        let mut cache = PipelineCache::new(MockResolver::failing(&["blur_y_hq"]), PassOverrides::default());

        let (x, y) = cache.get_with_fallback(("blur_x_hq", "blur_y_hq"), ("blur_x", "blur_y")).unwrap();
        assert_eq!(x.name, "blur_x");
        assert_eq!(y.name, "blur_y");
    }

    #[test]
    fn test_get_with_fallback_prefers_first_pair() {
        let mut cache = PipelineCache::new(MockResolver::default(), PassOverrides::default());

        let (x, y) = cache.get_with_fallback(("blur_x_hq", "blur_y_hq"), ("blur_x", "blur_y")).unwrap();
        assert_eq!((x.name.as_str(), y.name.as_str()), ("blur_x_hq", "blur_y_hq"));
        assert!(!cache.contains("blur_x"));
    }

    #[test]
    fn test_get_with_fallback_reports_fallback_error() {
        let mut cache = PipelineCache::new(MockResolver::failing(&["blur_x_hq", "blur_x"]), PassOverrides::default());

        let error = cache.get_with_fallback(("blur_x_hq", "blur_y_hq"), ("blur_x", "blur_y")).unwrap_err();
        assert_eq!(
            error,
            PassError::NotFound {
                entry_point: "blur_x".to_string(),
                stage: "fragment",
            }
        );
    }
}
