//! A preprocessor script loaded into its own interpreter.

use std::sync::Arc;

use mlua::{Function, Table, Value};
use serde_json::Value as JsonValue;
use tracing::debug;

use super::console::{ConsoleApi, LogSink, TracingSink};
use super::engine::{ResourceLimits, ScriptEngine};
use super::module::{ModuleLoader, EXPORTS, REQUIRE};
use super::utility::{BuildContext, TemplateContext, UtilityApi};
use crate::preprocessor::Preprocessor;
use crate::resource::{ResourceCollection, ScriptResource};
use crate::{paths, DocweaveError, Result};

/// Export holding the options function.
pub const GET_OPTIONS: &str = "getOptions";

/// Export holding the model transform function.
pub const TRANSFORM: &str = "transform";

/// Global name of the logging bridge.
pub const CONSOLE: &str = "console";

/// Global name of the host utilities.
pub const TEMPLATE_UTILITY: &str = "templateUtility";

/// Host services shared by every environment built for a template set.
#[derive(Clone)]
pub struct ScriptHost {
    /// Scripts and the modules they require.
    pub resources: Arc<dyn ResourceCollection>,
    /// Backing for `templateUtility`.
    pub context: Arc<dyn TemplateContext>,
    /// Destination of `console` output and preprocessor warnings.
    pub sink: Arc<dyn LogSink>,
    /// Limits applied to each interpreter.
    pub limits: ResourceLimits,
}

impl ScriptHost {
    /// Create a host logging to `tracing`, without resource limits.
    pub fn new(
        resources: Arc<dyn ResourceCollection>,
        context: Arc<dyn TemplateContext>,
    ) -> Self {
        Self {
            resources,
            context,
            sink: Arc::new(TracingSink),
            limits: ResourceLimits::default(),
        }
    }

    /// Host with the default [`BuildContext`].
    pub fn with_resources(resources: Arc<dyn ResourceCollection>) -> Self {
        Self::new(resources, Arc::new(BuildContext::default()))
    }

    /// Replace the log sink.
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the resource limits.
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// One interpreter running one preprocessor script.
///
/// Not meant for concurrent use: pool several of them instead.
pub struct ModuleEnvironment {
    // Functions are declared first so they drop before their interpreter.
    get_options: Option<Function>,
    transform: Option<Function>,
    /// `None` for an empty script.
    engine: Option<ScriptEngine>,
    path: String,
    name: String,
}

impl ModuleEnvironment {
    /// Load `script` and run its top-level code once.
    ///
    /// `name` defaults to the script's file name without its last extension.
    pub fn new(host: &ScriptHost, script: &ScriptResource, name: Option<&str>) -> Result<Self> {
        let path = script.path.clone();
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| paths::file_stem(&path).to_string());

        let mut env = Self {
            engine: None,
            path,
            name,
            get_options: None,
            transform: None,
        };

        if script.content.trim().is_empty() {
            return Ok(env);
        }

        let invalid = |message: String| DocweaveError::InvalidPreprocessor {
            path: script.path.clone(),
            message,
        };

        // The root is cached under the same key `require` resolves to.
        let root_path = paths::normalize(&script.path).unwrap_or_else(|| script.path.clone());

        let engine = ScriptEngine::with_limits(host.limits.clone())
            .map_err(|e| invalid(e.to_string()))?;
        let scope = Self::setup(&engine, host, &root_path).map_err(|e| invalid(e.to_string()))?;
        engine
            .execute_in(&scope, &script.content, &root_path)
            .map_err(|e| invalid(e.to_string()))?;

        let exports = match scope.raw_get::<Value>(EXPORTS).map_err(|e| invalid(e.to_string()))? {
            Value::Table(exports) => exports,
            _ => {
                return Err(invalid(format!(
                    "Invalid '{}' variable definition. '{}' MUST be a table.",
                    EXPORTS, EXPORTS
                )))
            }
        };

        env.get_options = Self::exported_function(&exports, GET_OPTIONS).map_err(invalid)?;
        env.transform = Self::exported_function(&exports, TRANSFORM).map_err(invalid)?;
        env.engine = Some(engine);

        debug!(
            path = %env.path,
            has_options = env.get_options.is_some(),
            has_transform = env.transform.is_some(),
            "loaded template preprocessor"
        );

        Ok(env)
    }

    /// Inject the shared bindings and create the root scope.
    fn setup(engine: &ScriptEngine, host: &ScriptHost, root_path: &str) -> Result<Table> {
        let lua = engine.lua();

        engine.share(CONSOLE, ConsoleApi::new(Arc::clone(&host.sink)).create_table(lua)?)?;
        engine.share(
            TEMPLATE_UTILITY,
            UtilityApi::new(Arc::clone(&host.context)).create_table(lua)?,
        )?;

        let loader = ModuleLoader::new(Arc::clone(&host.resources), root_path);
        engine.share(REQUIRE, loader.install(lua)?)?;

        Ok(ModuleLoader::register_scope(lua, root_path)?)
    }

    fn exported_function(
        exports: &Table,
        name: &str,
    ) -> std::result::Result<Option<Function>, String> {
        // Honours `__index`, so exports may inherit from a prototype table.
        match exports.get::<Value>(name) {
            Ok(Value::Nil) => Ok(None),
            Ok(Value::LightUserData(ud)) if ud.0.is_null() => Ok(None),
            Ok(Value::Function(func)) => Ok(Some(func)),
            Ok(_) => Err(format!(
                "Invalid '{}' variable definition. '{}' MUST be a function",
                name, name
            )),
            Err(e) => Err(e.to_string()),
        }
    }

    fn invoke(&self, func: &Function, model: &JsonValue, function: &str) -> Result<JsonValue> {
        let engine = self.engine.as_ref().ok_or_else(|| DocweaveError::PreprocessorExecution {
            name: self.name.clone(),
            message: format!("{} called on an empty preprocessor", function),
        })?;

        engine
            .call_json(func, model)
            .map_err(|e| DocweaveError::Script(e.to_string()).into_execution(&self.name, function))
    }
}

impl Preprocessor for ModuleEnvironment {
    fn has_options(&self) -> bool {
        self.get_options.is_some()
    }

    fn has_transform(&self) -> bool {
        self.transform.is_some()
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn get_options(&self, model: &JsonValue) -> Result<Option<JsonValue>> {
        match &self.get_options {
            Some(func) => {
                let options = self.invoke(func, model, "GetOptions")?;
                Ok((!options.is_null()).then_some(options))
            }
            None => Ok(None),
        }
    }

    fn transform_model(&self, model: JsonValue) -> Result<JsonValue> {
        match &self.transform {
            Some(func) => self.invoke(func, &model, "Transform"),
            None => Ok(model),
        }
    }
}
