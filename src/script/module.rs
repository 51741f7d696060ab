//! `require` support for preprocessor scripts.
//!
//! A minimal CommonJS-style module system:
//!
//! - a module publishes values through its `exports` table;
//! - `require("./path")` returns another module's `exports`;
//! - only paths starting with `./` are accepted, and they are resolved
//!   against the directory of the root script (one flat namespace per
//!   root script);
//! - each module runs once per interpreter and is cached by resolved path;
//! - circular requires get the unfinished `exports` of the module that is
//!   still running, as in Node.js.
//!
//! ```lua
//! -- partials/common.lua
//! exports.slug = function(title) return string.lower(title) end
//!
//! -- conceptual.tmpl.lua
//! local common = require("./partials/common.lua")
//! exports.transform = function(model)
//!   model.slug = common.slug(model.title)
//!   return model
//! end
//! ```

use std::sync::Arc;

use mlua::{Function, Lua, Table, Value};
use tracing::debug;

use super::engine::ScriptEngine;
use crate::resource::ResourceCollection;
use crate::{paths, DocweaveError, Result};

/// Name of the table a module publishes through.
pub const EXPORTS: &str = "exports";

/// Name of the import function.
pub const REQUIRE: &str = "require";

/// Only prefix accepted by `require`.
pub const REQUIRE_RELATIVE_PREFIX: &str = "./";

/// Registry key of the per-interpreter module cache (resolved path -> scope).
const MODULE_CACHE_KEY: &str = "docweave.modules";

/// Module loader bound to one root script.
#[derive(Clone)]
pub struct ModuleLoader {
    resources: Arc<dyn ResourceCollection>,
    root_path: String,
}

impl ModuleLoader {
    /// Create a loader for the root script at `root_path`.
    pub fn new(resources: Arc<dyn ResourceCollection>, root_path: impl Into<String>) -> Self {
        Self {
            resources,
            root_path: root_path.into(),
        }
    }

    /// Logical path of the root script.
    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    /// Resolve a `require` argument to a logical path.
    pub fn resolve(&self, request: &str) -> Result<String> {
        let relative = request.strip_prefix(REQUIRE_RELATIVE_PREFIX).ok_or_else(|| {
            DocweaveError::Resolution(format!(
                "Only relative path starting with `{}` is supported in require, got \"{}\"",
                REQUIRE_RELATIVE_PREFIX, request
            ))
        })?;

        paths::join(paths::directory_of(&self.root_path), relative).ok_or_else(|| {
            DocweaveError::Resolution(format!(
                "\"{}\" resolves outside of the template root",
                request
            ))
        })
    }

    /// Create the module cache and the `require` function for `lua`.
    pub fn install(&self, lua: &Lua) -> mlua::Result<Function> {
        lua.set_named_registry_value(MODULE_CACHE_KEY, lua.create_table()?)?;

        let loader = self.clone();
        lua.create_function(move |lua, request: String| loader.require(lua, &request))
    }

    /// Create a module scope with an empty `exports` table and cache it
    /// under `path`.
    ///
    /// The scope is cached before the module runs so circular requires can
    /// reach its exports.
    pub fn register_scope(lua: &Lua, path: &str) -> mlua::Result<Table> {
        let scope = ScriptEngine::new_scope(lua)?;
        scope.raw_set(EXPORTS, lua.create_table()?)?;
        let cache: Table = lua.named_registry_value(MODULE_CACHE_KEY)?;
        cache.raw_set(path, &scope)?;
        Ok(scope)
    }

    fn require(&self, lua: &Lua, request: &str) -> mlua::Result<Value> {
        let path = self
            .resolve(request)
            .map_err(|e| mlua::Error::RuntimeError(e.to_string()))?;

        let cache: Table = lua.named_registry_value(MODULE_CACHE_KEY)?;
        if let Some(scope) = cache.raw_get::<Option<Table>>(path.as_str())? {
            // May still be running: the caller sees whatever is exported so far.
            return scope.raw_get(EXPORTS);
        }

        let source = match self.resources.get_text(&path) {
            Some(source) if !source.trim().is_empty() => source,
            _ => {
                debug!(module = %path, root = %self.root_path, "required module not found");
                return Ok(Value::Nil);
            }
        };

        debug!(module = %path, root = %self.root_path, "loading module");
        let scope = Self::register_scope(lua, &path)?;
        lua.load(source.as_str())
            .set_name(format!("@{}", path))
            .set_environment(scope.clone())
            .exec()?;

        scope.raw_get(EXPORTS)
    }
}
