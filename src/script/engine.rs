//! Lua script engine with sandboxing.
//!
//! Every script (the root preprocessor and each required module) runs in
//! its own scope: a fresh global table whose lookups fall back to a shared
//! base library. The base library is a snapshot of the sandboxed standard
//! library plus the host bindings.
//!
//! Models cross the boundary as JSON. Lua has a single table type, so a table
//! built empty by a script comes back as a JSON object. Scripts that need an
//! empty (or explicitly sequential) JSON array build it with `array()`:
//!
//! ```lua
//! model.items = array()          -- []
//! model.tags = array({ "a" })    -- ["a"]
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mlua::{Function, HookTriggers, Lua, LuaSerdeExt, Table, Value, VmState};

use crate::{DocweaveError, Result};

/// Registry key of the base library table.
const BASE_LIBRARY_KEY: &str = "docweave.base";

/// Base-library function marking a table as a JSON array.
pub const ARRAY: &str = "array";

/// Globals removed from the interpreter before any script runs.
const SANDBOXED_GLOBALS: &[&str] = &[
    "os",
    "io",
    "loadfile",
    "dofile",
    "load",
    "require",
    "package",
    "debug",
    "collectgarbage",
];

/// Resource limits for script execution.
#[derive(Debug, Clone, Default)]
pub struct ResourceLimits {
    /// Maximum number of instructions per top-level run or call (0 = unlimited).
    pub max_instructions: u64,
    /// Maximum memory in bytes (0 = unlimited).
    pub max_memory: usize,
}

/// Lua script execution engine with sandboxing.
pub struct ScriptEngine {
    lua: Lua,
    instruction_count: Arc<AtomicU64>,
    limits: ResourceLimits,
}

impl ScriptEngine {
    /// Create a new ScriptEngine without resource limits.
    pub fn new() -> Result<Self> {
        Self::with_limits(ResourceLimits::default())
    }

    /// Create a new ScriptEngine with custom resource limits.
    pub fn with_limits(limits: ResourceLimits) -> Result<Self> {
        let lua = Lua::new();

        Self::apply_sandbox(&lua)?;
        Self::snapshot_base_library(&lua)
            .map_err(|e| DocweaveError::Script(format!("Failed to build base library: {}", e)))?;

        if limits.max_memory > 0 {
            lua.set_memory_limit(limits.max_memory)
                .map_err(|e| DocweaveError::Script(format!("Failed to set memory limit: {}", e)))?;
        }

        Ok(Self {
            lua,
            instruction_count: Arc::new(AtomicU64::new(0)),
            limits,
        })
    }

    /// Apply sandbox restrictions to the Lua environment.
    fn apply_sandbox(lua: &Lua) -> Result<()> {
        let globals = lua.globals();
        for name in SANDBOXED_GLOBALS {
            globals.set(*name, Value::Nil).map_err(|e| {
                DocweaveError::Script(format!("Failed to disable {}: {}", name, e))
            })?;
        }
        Ok(())
    }

    /// Copy the (sandboxed) globals into the base library table.
    fn snapshot_base_library(lua: &Lua) -> mlua::Result<()> {
        let base = lua.create_table()?;
        for pair in lua.globals().pairs::<Value, Value>() {
            let (key, value) = pair?;
            if matches!(&key, Value::String(s) if *s == "_G") {
                continue;
            }
            base.raw_set(key, value)?;
        }
        base.raw_set(
            ARRAY,
            lua.create_function(|lua, table: Option<Table>| {
                let table = match table {
                    Some(table) => table,
                    None => lua.create_table()?,
                };
                table.set_metatable(Some(lua.array_metatable()));
                Ok(table)
            })?,
        )?;
        lua.set_named_registry_value(BASE_LIBRARY_KEY, base)
    }

    /// Make `value` visible as `name` in every scope.
    pub fn share<V: mlua::IntoLua>(&self, name: &str, value: V) -> Result<()> {
        let base: Table = self.lua.named_registry_value(BASE_LIBRARY_KEY)?;
        base.raw_set(name, value)
            .map_err(|e| DocweaveError::Script(format!("Failed to share '{}': {}", name, e)))
    }

    /// Create a fresh, empty scope inheriting the base library.
    ///
    /// Takes the raw `Lua` handle so host callbacks can create scopes too.
    pub fn new_scope(lua: &Lua) -> mlua::Result<Table> {
        let base: Table = lua.named_registry_value(BASE_LIBRARY_KEY)?;
        let meta = lua.create_table()?;
        meta.raw_set("__index", base)?;
        let scope = lua.create_table()?;
        scope.set_metatable(Some(meta));
        Ok(scope)
    }

    /// Execute Lua source code in the global environment.
    pub fn execute(&self, source: &str) -> Result<()> {
        self.with_budget(|| self.lua.load(source).exec())
            .map_err(|e| DocweaveError::Script(format!("Script error: {}", e)))
    }

    /// Execute Lua source code inside `scope`, naming the chunk `chunk_name`.
    pub fn execute_in(&self, scope: &Table, source: &str, chunk_name: &str) -> mlua::Result<()> {
        self.with_budget(|| {
            self.lua
                .load(source)
                .set_name(format!("@{}", chunk_name))
                .set_environment(scope.clone())
                .exec()
        })
    }

    /// Call `func` with a JSON model and convert its result back to JSON.
    ///
    /// A `nil` result comes back as `serde_json::Value::Null`.
    pub fn call_json(
        &self,
        func: &Function,
        model: &serde_json::Value,
    ) -> mlua::Result<serde_json::Value> {
        self.with_budget(|| {
            let arg = self.lua.to_value(model)?;
            let result: Value = func.call(arg)?;
            self.lua.from_value(result)
        })
    }

    /// Run `f` under the instruction budget, if one is configured.
    fn with_budget<R>(&self, f: impl FnOnce() -> mlua::Result<R>) -> mlua::Result<R> {
        self.instruction_count.store(0, Ordering::SeqCst);

        if self.limits.max_instructions == 0 {
            return f();
        }

        let count = Arc::clone(&self.instruction_count);
        let limit = self.limits.max_instructions;
        self.lua.set_hook(
            HookTriggers::new().every_nth_instruction(10000),
            move |_lua, _debug| {
                let current = count.fetch_add(10000, Ordering::SeqCst) + 10000;
                if current > limit {
                    Err(mlua::Error::RuntimeError(
                        "Script exceeded instruction limit".to_string(),
                    ))
                } else {
                    Ok(VmState::Continue)
                }
            },
        );

        let result = f();
        let _ = self.lua.remove_hook();
        result
    }

    /// Get the instruction count of the last run.
    pub fn instruction_count(&self) -> u64 {
        self.instruction_count.load(Ordering::SeqCst)
    }

    /// Get the resource limits.
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Get a reference to the underlying Lua instance.
    pub fn lua(&self) -> &Lua {
        &self.lua
    }
}
