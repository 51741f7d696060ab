use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use docweave::{
    pipeline, BuildContext, Config, DirectoryResources, DocweaveError, Preprocessor, Result,
    ScriptHost, TemplatePreprocessorSet,
};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = docweave::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        docweave::logging::init_console_only(&config.logging);
    }

    if let Err(e) = config.validate() {
        error!("{e}");
        std::process::exit(2);
    }

    if let Err(e) = run(config).await {
        error!("Build failed: {e}");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    info!(templates = %config.templates.path, "docweave - template preprocessing");

    let resources = Arc::new(DirectoryResources::open(&config.templates.path)?);
    let host = ScriptHost::new(
        resources,
        Arc::new(BuildContext::new(config.build.site_root.clone())),
    )
    .with_limits(config.script.limits());

    let max_parallelism = config.templates.max_parallelism;
    let preprocessors = tokio::task::spawn_blocking(move || {
        TemplatePreprocessorSet::load(&host, max_parallelism)
    })
    .await
    .map_err(|e| DocweaveError::Task(e.to_string()))?;

    let preprocessor = preprocessors.get(&config.build.template).ok_or_else(|| {
        DocweaveError::Config(format!(
            "no preprocessor for template '{}' (available: {})",
            config.build.template,
            preprocessors.names().join(", ")
        ))
    })?;

    if !preprocessor.has_options() && !preprocessor.has_transform() {
        warn!(
            template = %config.build.template,
            "preprocessor has neither getOptions nor transform; models are copied unchanged"
        );
    }

    let summary = pipeline::run(
        preprocessor,
        Path::new(&config.build.input),
        Path::new(&config.build.output),
        max_parallelism,
    )
    .await?;

    info!(
        processed = summary.processed,
        output = %config.build.output,
        "done"
    );
    Ok(())
}
