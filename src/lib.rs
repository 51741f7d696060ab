//! docweave - template preprocessor engine for documentation builds.
//!
//! Runs per-document Lua customizations (`getOptions` / `transform`)
//! concurrently through pools of sandboxed interpreters.

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;
pub mod pipeline;
pub mod pool;
pub mod preprocessor;
pub mod resource;
pub mod script;

pub use config::Config;
pub use error::{DocweaveError, Result};
pub use pool::{Lease, ResourcePool};
pub use preprocessor::{
    create_preprocessor, create_preprocessor_with_host, PooledPreprocessor, Preprocessor,
    TemplatePreprocessorSet,
};
pub use resource::{DirectoryResources, InMemoryResources, ResourceCollection, ScriptResource};
pub use script::{
    BuildContext, LogLevel, LogSink, ModuleEnvironment, ResourceLimits, ScriptHost,
    TemplateContext, TracingSink,
};
