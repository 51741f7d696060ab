//! Parallel application of a preprocessor to a directory of JSON models.
//!
//! Each document is processed on a blocking task; at most
//! `max_parallelism` documents are in flight. The first failure aborts the
//! build.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::preprocessor::Preprocessor;
use crate::{DocweaveError, Result};

/// Result of preprocessing one model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedModel {
    /// Render options, if the preprocessor computes any.
    pub options: Option<Value>,
    /// Transformed model.
    pub model: Value,
}

/// Summary of a build run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Number of models written.
    pub processed: usize,
}

/// Apply `preprocessor` to one model.
///
/// Options are computed from the model before it is transformed.
pub fn process_model<P: Preprocessor + ?Sized>(
    preprocessor: &P,
    model: Value,
) -> Result<ProcessedModel> {
    let options = preprocessor.get_options(&model)?;
    let model = preprocessor.transform_model(model)?;
    Ok(ProcessedModel { options, model })
}

/// Every `*.json` file below `input`, sorted.
pub fn collect_models(input: &Path) -> Result<Vec<PathBuf>> {
    let mut models = Vec::new();
    scan_directory(input, &mut models)?;
    models.sort();
    Ok(models)
}

fn scan_directory(dir: &Path, models: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            scan_directory(&path, models)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            models.push(path);
        }
    }
    Ok(())
}

fn process_file<P: Preprocessor + ?Sized>(
    preprocessor: &P,
    input_root: &Path,
    output_root: &Path,
    path: &Path,
) -> Result<()> {
    let model: Value = serde_json::from_str(&fs::read_to_string(path)?)?;
    let processed = process_model(preprocessor, model)?;

    let relative = path.strip_prefix(input_root).unwrap_or(path);
    let target = output_root.join(relative);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&target, serde_json::to_string_pretty(&processed)?)?;

    debug!(input = %path.display(), output = %target.display(), "processed model");
    Ok(())
}

/// Preprocess every model under `input` into `output`.
pub async fn run<P>(
    preprocessor: Arc<P>,
    input: &Path,
    output: &Path,
    max_parallelism: usize,
) -> Result<BuildSummary>
where
    P: Preprocessor + Send + Sync + 'static,
{
    let models = collect_models(input)?;
    info!(
        count = models.len(),
        preprocessor = preprocessor.name(),
        "preprocessing models"
    );

    let permits = Arc::new(Semaphore::new(max_parallelism.max(1)));
    let mut tasks = JoinSet::new();

    for path in models {
        let permit = Arc::clone(&permits)
            .acquire_owned()
            .await
            .map_err(|e| DocweaveError::Task(e.to_string()))?;
        let preprocessor = Arc::clone(&preprocessor);
        let input_root = input.to_path_buf();
        let output_root = output.to_path_buf();

        tasks.spawn_blocking(move || {
            let _permit = permit;
            process_file(preprocessor.as_ref(), &input_root, &output_root, &path)
        });
    }

    let mut summary = BuildSummary::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => summary.processed += 1,
            Ok(Err(e)) => {
                tasks.abort_all();
                return Err(e);
            }
            Err(e) => {
                tasks.abort_all();
                return Err(DocweaveError::Task(e.to_string()));
            }
        }
    }

    info!(processed = summary.processed, "build finished");
    Ok(summary)
}
