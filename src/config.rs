//! Configuration module for docweave.

use serde::Deserialize;
use std::path::Path;

use crate::script::ResourceLimits;
use crate::{DocweaveError, Result};

/// Templates configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplatesConfig {
    /// Path to the template directory.
    #[serde(default = "default_templates_path")]
    pub path: String,
    /// Maximum number of interpreters per preprocessor.
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,
}

fn default_templates_path() -> String {
    "templates".to_string()
}

fn default_max_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            path: default_templates_path(),
            max_parallelism: default_max_parallelism(),
        }
    }
}

/// Script resource limits.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptConfig {
    /// Memory limit per interpreter in megabytes (0 = unlimited).
    #[serde(default)]
    pub max_memory_mb: usize,
    /// Instruction budget per call (0 = unlimited).
    #[serde(default)]
    pub max_instructions: u64,
}

impl ScriptConfig {
    /// Convert to engine resource limits.
    pub fn limits(&self) -> ResourceLimits {
        ResourceLimits {
            max_instructions: self.max_instructions,
            max_memory: self.max_memory_mb * 1024 * 1024,
        }
    }
}

/// Build configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    /// Directory of input JSON models.
    #[serde(default = "default_input")]
    pub input: String,
    /// Output directory.
    #[serde(default = "default_output")]
    pub output: String,
    /// Name of the preprocessor applied to every model.
    #[serde(default = "default_template")]
    pub template: String,
    /// Site root used by `templateUtility.getHrefFromRoot`.
    #[serde(default)]
    pub site_root: String,
}

fn default_input() -> String {
    "obj/models".to_string()
}

fn default_output() -> String {
    "_site".to_string()
}

fn default_template() -> String {
    "conceptual".to_string()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            input: default_input(),
            output: default_output(),
            template: default_template(),
            site_root: String::new(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file. Empty to log to stdout only.
    #[serde(default = "default_log_file")]
    pub file: String,
    /// Level for `console` output of scripts. Defaults to `level`.
    #[serde(default)]
    pub script_level: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/docweave.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
            script_level: None,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Templates configuration.
    #[serde(default)]
    pub templates: TemplatesConfig,
    /// Script limits.
    #[serde(default)]
    pub script: ScriptConfig,
    /// Build configuration.
    #[serde(default)]
    pub build: BuildConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(DocweaveError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| DocweaveError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `DOCWEAVE_LOG_LEVEL`: Override the log level
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("DOCWEAVE_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.templates.max_parallelism == 0 {
            return Err(DocweaveError::Config(
                "templates.max_parallelism must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.templates.path, "templates");
        assert!(config.templates.max_parallelism >= 1);
        assert_eq!(config.script.max_memory_mb, 0);
        assert_eq!(config.script.max_instructions, 0);
        assert_eq!(config.build.input, "obj/models");
        assert_eq!(config.build.output, "_site");
        assert_eq!(config.build.template, "conceptual");
        assert_eq!(config.build.site_root, "");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, "logs/docweave.log");
        assert!(config.logging.script_level.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[templates]
path = "my-templates"
max_parallelism = 3

[script]
max_memory_mb = 16
max_instructions = 5000000

[build]
input = "models"
output = "out"
template = "toc"
site_root = "docs"

[logging]
level = "debug"
file = "build.log"
script_level = "warn"
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.templates.path, "my-templates");
        assert_eq!(config.templates.max_parallelism, 3);
        assert_eq!(config.script.limits().max_memory, 16 * 1024 * 1024);
        assert_eq!(config.script.limits().max_instructions, 5_000_000);
        assert_eq!(config.build.input, "models");
        assert_eq!(config.build.output, "out");
        assert_eq!(config.build.template, "toc");
        assert_eq!(config.build.site_root, "docs");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, "build.log");
        assert_eq!(config.logging.script_level.as_deref(), Some("warn"));
    }

    #[test]
    fn test_parse_partial_config() {
        let config = Config::parse("[build]\ntemplate = \"toc\"\n").unwrap();

        assert_eq!(config.build.template, "toc");
        assert_eq!(config.build.input, "obj/models");
        assert_eq!(config.templates.path, "templates");
    }

    #[test]
    fn test_parse_empty_config() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.templates.path, "templates");
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = Config::parse("[templates\npath = ");
        assert!(matches!(result, Err(DocweaveError::Config(_))));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load("/nonexistent/docweave.toml");
        assert!(matches!(result, Err(DocweaveError::Io(_))));
    }

    #[test]
    fn test_validate_zero_parallelism() {
        let mut config = Config::default();
        config.templates.max_parallelism = 0;
        assert!(config.validate().is_err());

        config.templates.max_parallelism = 2;
        assert!(config.validate().is_ok());
    }
}
