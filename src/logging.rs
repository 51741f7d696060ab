//! Logging setup for the docweave binary.
//!
//! Engine diagnostics and script `console` output both go through
//! `tracing`. Script output uses its own target so it can be filtered
//! separately from the engine.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::script::console::SCRIPT_TARGET;
use crate::Result;

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Filter for `config`: the global level, `RUST_LOG` directives, and the
/// optional level for script output.
fn build_filter(config: &LoggingConfig) -> EnvFilter {
    let mut filter =
        EnvFilter::from_default_env().add_directive(parse_level(&config.level).into());

    if let Some(script_level) = &config.script_level {
        let level = parse_level(script_level).to_string().to_lowercase();
        if let Ok(directive) = format!("{}={}", SCRIPT_TARGET, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    filter
}

/// Initialize logging to stdout and, unless `config.file` is empty, to the
/// log file.
pub fn init(config: &LoggingConfig) -> Result<()> {
    if config.file.is_empty() {
        init_console_only(config);
        return Ok(());
    }

    if let Some(parent) = Path::new(&config.file).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let log_file = Arc::new(File::create(&config.file)?);
    let writer = std::io::stdout.and(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(false)
                .with_line_number(false),
        )
        .with(build_filter(config))
        .init();

    Ok(())
}

/// Initialize stdout-only logging.
pub fn init_console_only(config: &LoggingConfig) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_ansi(true)
                .with_target(true)
                .with_thread_ids(true),
        )
        .with(build_filter(config))
        .init();
}
