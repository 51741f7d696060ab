//! `console` binding for scripts.
//!
//! Provides `console.log`, `console.info`, `console.warn`, `console.err` and
//! `console.error`, forwarding to a [`LogSink`].

use std::sync::Arc;

use mlua::{Lua, LuaSerdeExt, Result as LuaResult, Table, Value};
use tracing::{error, info, warn};

/// `tracing` target of script output.
pub const SCRIPT_TARGET: &str = "docweave::script";

/// Text written for `nil` and null values.
pub const NULL_STRING: &str = "null";

/// Severity of a message written by a script or by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Generic `console.log` output.
    Log,
    Info,
    Warning,
    Error,
}

/// Destination for messages from scripts and preprocessor diagnostics.
///
/// Implementations must accept concurrent writers.
pub trait LogSink: Send + Sync {
    fn write(&self, level: LogLevel, message: &str);
}

/// Sink forwarding to `tracing` under the `docweave::script` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Log | LogLevel::Info => info!(target: SCRIPT_TARGET, "{}", message),
            LogLevel::Warning => warn!(target: SCRIPT_TARGET, "{}", message),
            LogLevel::Error => error!(target: SCRIPT_TARGET, "{}", message),
        }
    }
}

/// Console API builder for registering the logging bridge with Lua.
pub struct ConsoleApi {
    sink: Arc<dyn LogSink>,
}

impl ConsoleApi {
    /// Create a new ConsoleApi writing to `sink`.
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Build the `console` table.
    pub fn create_table(&self, lua: &Lua) -> LuaResult<Table> {
        let console = lua.create_table()?;

        for (name, level) in [
            ("log", LogLevel::Log),
            ("info", LogLevel::Info),
            ("warn", LogLevel::Warning),
            ("err", LogLevel::Error),
            ("error", LogLevel::Error),
        ] {
            let sink = Arc::clone(&self.sink);
            let func = lua.create_function(move |lua, value: Value| {
                sink.write(level, &value_to_string(lua, &value));
                Ok(())
            })?;
            console.set(name, func)?;
        }

        Ok(console)
    }
}

/// Convert a Lua value to log text.
///
/// Tables are rendered as JSON when they convert cleanly.
pub fn value_to_string(lua: &Lua, value: &Value) -> String {
    match value {
        Value::Nil => NULL_STRING.to_string(),
        Value::LightUserData(ud) if ud.0.is_null() => NULL_STRING.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.to_string_lossy().to_string(),
        Value::Table(_) => lua
            .from_value::<serde_json::Value>(value.clone())
            .map(|json| json.to_string())
            .unwrap_or_else(|_| "[table]".to_string()),
        Value::Function(_) => "[function]".to_string(),
        Value::Thread(_) => "[thread]".to_string(),
        Value::UserData(_) => "[userdata]".to_string(),
        Value::Error(e) => format!("[error: {}]", e),
        _ => "[unknown]".to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;
    use crate::script::ScriptEngine;

    fn create_test_engine_with_console() -> (ScriptEngine, Arc<RecordingSink>) {
        let engine = ScriptEngine::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let console = ConsoleApi::new(sink.clone())
            .create_table(engine.lua())
            .unwrap();
        engine.share("console", console).unwrap();
        (engine, sink)
    }

    fn run(engine: &ScriptEngine, source: &str) {
        let scope = ScriptEngine::new_scope(engine.lua()).unwrap();
        engine.execute_in(&scope, source, "test.lua").unwrap();
    }

    #[test]
    fn test_console_levels() {
        let (engine, sink) = create_test_engine_with_console();

        run(
            &engine,
            r#"
            console.log("a")
            console.info("b")
            console.warn("c")
            console.err("d")
            console.error("e")
        "#,
        );

        assert_eq!(sink.at(LogLevel::Log), vec!["a"]);
        assert_eq!(sink.at(LogLevel::Info), vec!["b"]);
        assert_eq!(sink.at(LogLevel::Warning), vec!["c"]);
        assert_eq!(sink.at(LogLevel::Error), vec!["d", "e"]);
    }

    #[test]
    fn test_console_nil_is_null() {
        let (engine, sink) = create_test_engine_with_console();

        run(&engine, "console.info(nil); console.warn()");

        assert_eq!(sink.at(LogLevel::Info), vec!["null"]);
        assert_eq!(sink.at(LogLevel::Warning), vec!["null"]);
    }

    #[test]
    fn test_console_numbers_and_booleans() {
        let (engine, sink) = create_test_engine_with_console();

        run(&engine, "console.log(42); console.log(true)");

        assert_eq!(sink.at(LogLevel::Log), vec!["42", "true"]);
    }

    #[test]
    fn test_console_table_as_json() {
        let (engine, sink) = create_test_engine_with_console();

        run(&engine, r#"console.log({ title = "Intro" })"#);

        assert_eq!(sink.at(LogLevel::Log), vec![r#"{"title":"Intro"}"#]);
    }

    #[test]
    fn test_console_function_placeholder() {
        let (engine, sink) = create_test_engine_with_console();

        run(&engine, "console.log(print)");

        assert_eq!(sink.at(LogLevel::Log), vec!["[function]"]);
    }
}
