//! Template preprocessors as seen by the build pipeline.

pub mod pooled;
pub mod set;

use std::sync::Arc;

use serde_json::Value;

use crate::resource::{ResourceCollection, ScriptResource};
use crate::script::{ModuleEnvironment, ScriptHost, TemplateContext};
use crate::Result;

pub use pooled::PooledPreprocessor;
pub use set::TemplatePreprocessorSet;

/// A per-document customization step.
pub trait Preprocessor {
    /// Whether the script exports `getOptions`.
    fn has_options(&self) -> bool;

    /// Whether the script exports `transform`.
    fn has_transform(&self) -> bool;

    /// Logical path of the script.
    fn path(&self) -> &str;

    /// Display name.
    fn name(&self) -> &str;

    /// Compute render options for `model`; `None` when the script has none.
    fn get_options(&self, model: &Value) -> Result<Option<Value>>;

    /// Transform `model`; returns it untouched when the script has no
    /// transform.
    fn transform_model(&self, model: Value) -> Result<Value>;
}

/// Build a pooled preprocessor for `script_resource`, logging to `tracing`.
///
/// Never fails: an invalid script yields an inert preprocessor and a
/// warning.
pub fn create_preprocessor(
    resources: Arc<dyn ResourceCollection>,
    script_resource: ScriptResource,
    context: Arc<dyn TemplateContext>,
    max_parallelism: usize,
    name: Option<&str>,
) -> PooledPreprocessor {
    create_preprocessor_with_host(
        ScriptHost::new(resources, context),
        script_resource,
        max_parallelism,
        name,
    )
}

/// Same as [`create_preprocessor`] with explicit host services.
pub fn create_preprocessor_with_host(
    host: ScriptHost,
    script_resource: ScriptResource,
    max_parallelism: usize,
    name: Option<&str>,
) -> PooledPreprocessor {
    let sink = Arc::clone(&host.sink);
    let name = name.map(str::to_string);
    PooledPreprocessor::new(
        move || ModuleEnvironment::new(&host, &script_resource, name.as_deref()),
        max_parallelism,
        sink,
    )
}
