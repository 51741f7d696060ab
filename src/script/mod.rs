//! Script module for running template preprocessors written in Lua.
//!
//! Scripts run inside a sandboxed interpreter and publish `getOptions` and
//! `transform` functions through their `exports` table. They can log through
//! `console`, use host helpers from `templateUtility`, and load sibling
//! modules with `require("./...")`.

pub mod console;
pub mod engine;
pub mod environment;
pub mod module;
pub mod utility;

pub use console::{ConsoleApi, LogLevel, LogSink, TracingSink};
pub use engine::{ResourceLimits, ScriptEngine};
pub use environment::{ModuleEnvironment, ScriptHost};
pub use module::ModuleLoader;
pub use utility::{BuildContext, TemplateContext, UtilityApi};
