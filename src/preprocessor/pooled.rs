//! Preprocessor backed by a pool of interpreters.
//!
//! One interpreter is not safe for concurrent use, so the façade keeps up to
//! `max_parallelism` copies of the same script and leases one per call.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::Preprocessor;
use crate::pool::ResourcePool;
use crate::script::{LogLevel, LogSink, ModuleEnvironment};
use crate::{paths, DocweaveError, Result};

/// Pool-backed preprocessor. Shareable across threads.
pub struct PooledPreprocessor<P: Preprocessor + Send = ModuleEnvironment> {
    /// `None` once the script turned out to be invalid.
    pool: Option<ResourcePool<P>>,
    has_options: bool,
    has_transform: bool,
    path: String,
    name: String,
}

impl<P: Preprocessor + Send> PooledPreprocessor<P> {
    /// Create the pool and probe one instance for its capabilities.
    ///
    /// The probed instance goes back to the pool. If it cannot be built, a
    /// warning is written to `sink` and the preprocessor stays inert.
    pub fn new<F>(factory: F, max_parallelism: usize, sink: Arc<dyn LogSink>) -> Self
    where
        F: Fn() -> Result<P> + Send + Sync + 'static,
    {
        let pool = ResourcePool::new(factory, max_parallelism);

        let probe = panic::catch_unwind(AssertUnwindSafe(|| {
            pool.rent().map(|lease| {
                (
                    lease.has_options(),
                    lease.has_transform(),
                    lease.path().to_string(),
                    lease.name().to_string(),
                )
            })
        }))
        .unwrap_or_else(|payload| {
            Err(DocweaveError::Script(format!(
                "panicked while loading: {}",
                panic_message(payload.as_ref())
            )))
        });

        match probe {
            Ok((has_options, has_transform, path, name)) => {
                debug!(%path, %name, has_options, has_transform, "template preprocessor ready");
                Self {
                    pool: Some(pool),
                    has_options,
                    has_transform,
                    path,
                    name,
                }
            }
            Err(e) => {
                let (path, message) = match e {
                    DocweaveError::InvalidPreprocessor { path, message } => {
                        let warning = format!(
                            "\"{}\" not a valid template preprocessor, ignored: {}",
                            path, message
                        );
                        (path, warning)
                    }
                    other => (
                        String::new(),
                        format!("Not a valid template preprocessor, ignored: {}", other),
                    ),
                };
                sink.write(LogLevel::Warning, &message);

                let name = paths::file_stem(&path).to_string();
                Self {
                    pool: None,
                    has_options: false,
                    has_transform: false,
                    path,
                    name,
                }
            }
        }
    }

    /// Whether the script failed to load and every call is a no-op.
    pub fn is_inert(&self) -> bool {
        self.pool.is_none()
    }

    /// The underlying pool, unless inert.
    pub fn pool(&self) -> Option<&ResourcePool<P>> {
        self.pool.as_ref()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl<P: Preprocessor + Send> Preprocessor for PooledPreprocessor<P> {
    fn has_options(&self) -> bool {
        self.has_options
    }

    fn has_transform(&self) -> bool {
        self.has_transform
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn get_options(&self, model: &Value) -> Result<Option<Value>> {
        let pool = match &self.pool {
            Some(pool) if self.has_options => pool,
            _ => return Ok(None),
        };

        let lease = pool
            .rent()
            .map_err(|e| e.into_execution(&self.name, "GetOptions"))?;
        lease
            .get_options(model)
            .map_err(|e| e.into_execution(&self.name, "GetOptions"))
    }

    fn transform_model(&self, model: Value) -> Result<Value> {
        let pool = match &self.pool {
            Some(pool) if self.has_transform => pool,
            _ => return Ok(model),
        };

        let lease = pool
            .rent()
            .map_err(|e| e.into_execution(&self.name, "Transform"))?;
        lease
            .transform_model(model)
            .map_err(|e| e.into_execution(&self.name, "Transform"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{InMemoryResources, ScriptResource};
    use crate::script::console::testing::RecordingSink;
    use crate::script::{ScriptHost, TemplateContext};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pooled(source: &str, max: usize) -> (PooledPreprocessor, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let host = ScriptHost::with_resources(Arc::new(InMemoryResources::new()))
            .with_sink(sink.clone());
        let script = ScriptResource::new("toc.tmpl.lua", source);
        let preprocessor = PooledPreprocessor::new(
            move || ModuleEnvironment::new(&host, &script, None),
            max,
            sink.clone(),
        );
        (preprocessor, sink)
    }

    #[test]
    fn test_probe_reads_capabilities() {
        let (preprocessor, sink) = pooled("exports.transform = function(m) return m end", 2);

        assert!(!preprocessor.is_inert());
        assert!(!preprocessor.has_options());
        assert!(preprocessor.has_transform());
        assert_eq!(preprocessor.path(), "toc.tmpl.lua");
        assert_eq!(preprocessor.name(), "toc.tmpl");
        assert!(sink.at(LogLevel::Warning).is_empty());

        let pool = preprocessor.pool().unwrap();
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.outstanding_count(), 0);
    }

    #[test]
    fn test_probe_instance_is_reused() {
        let (preprocessor, _) = pooled("exports.transform = function(m) return m end", 4);

        for _ in 0..3 {
            preprocessor.transform_model(json!({})).unwrap();
        }
        assert_eq!(preprocessor.pool().unwrap().idle_count(), 1);
    }

    #[test]
    fn test_invalid_script_is_inert() {
        let (preprocessor, sink) = pooled("exports.transform = function(", 2);

        assert!(preprocessor.is_inert());
        assert!(!preprocessor.has_options());
        assert!(!preprocessor.has_transform());
        assert_eq!(preprocessor.path(), "toc.tmpl.lua");

        let warnings = sink.at(LogLevel::Warning);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("\"toc.tmpl.lua\" not a valid template preprocessor"));

        let model = json!({"a": [1, 2]});
        assert_eq!(preprocessor.transform_model(model.clone()).unwrap(), model);
        assert_eq!(preprocessor.get_options(&model).unwrap(), None);
    }

    #[test]
    fn test_execution_error_names_script() {
        let (preprocessor, _) = pooled(
            "exports.getOptions = function(m) error('no options today') end",
            1,
        );

        let err = preprocessor.get_options(&json!({})).unwrap_err();
        match err {
            DocweaveError::PreprocessorExecution { name, message } => {
                assert_eq!(name, "toc.tmpl");
                assert!(message.contains("no options today"));
                assert!(message.contains("GetOptions"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_failing_calls_release_lease() {
        let (preprocessor, _) = pooled("exports.transform = function(m) error('always') end", 2);

        for _ in 0..3 {
            assert!(preprocessor.transform_model(json!({})).is_err());
        }
        let pool = preprocessor.pool().unwrap();
        assert_eq!(pool.outstanding_count(), 0);
    }

    struct FakeEnvironment;

    impl Preprocessor for FakeEnvironment {
        fn has_options(&self) -> bool {
            true
        }

        fn has_transform(&self) -> bool {
            false
        }

        fn path(&self) -> &str {
            "fake.lua"
        }

        fn name(&self) -> &str {
            "fake"
        }

        fn get_options(&self, _model: &Value) -> Result<Option<Value>> {
            Ok(Some(json!({"fake": true})))
        }

        fn transform_model(&self, _model: Value) -> Result<Value> {
            Err(DocweaveError::Script("should not be called".to_string()))
        }
    }

    #[test]
    fn test_generic_over_environment() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let preprocessor = PooledPreprocessor::new(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(FakeEnvironment)
            },
            3,
            Arc::new(RecordingSink::default()),
        );

        assert_eq!(
            preprocessor.get_options(&json!({})).unwrap(),
            Some(json!({"fake": true}))
        );
        // has_transform is false: the fake's failing transform is never reached.
        assert_eq!(preprocessor.transform_model(json!(1)).unwrap(), json!(1));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    struct PanickingContext;

    impl TemplateContext for PanickingContext {
        fn resolve_source_relative_path(&self, _base: &str, path: &str) -> String {
            path.to_string()
        }

        fn get_href_from_root(&self, _base: &str, path: &str) -> String {
            path.to_string()
        }

        fn markup(&self, _path: &str, _text: &str) -> String {
            panic!("markup exploded");
        }
    }

    #[test]
    fn test_panic_while_loading_is_inert() {
        let sink = Arc::new(RecordingSink::default());
        let host = ScriptHost::new(Arc::new(InMemoryResources::new()), Arc::new(PanickingContext))
            .with_sink(sink.clone());
        let script = ScriptResource::new(
            "toc.tmpl.lua",
            r##"
            templateUtility.markup("toc.md", "# Contents")
            exports.transform = function(m) return m end
            "##,
        );
        let preprocessor = PooledPreprocessor::new(
            move || ModuleEnvironment::new(&host, &script, None),
            1,
            sink.clone(),
        );

        assert!(preprocessor.is_inert());
        assert!(!preprocessor.has_transform());

        let warnings = sink.at(LogLevel::Warning);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Not a valid template preprocessor, ignored"));
        assert!(warnings[0].contains("markup exploded"));
        assert_eq!(preprocessor.transform_model(json!({"a": 1})).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_panicking_factory_is_inert() {
        let preprocessor: PooledPreprocessor<FakeEnvironment> = PooledPreprocessor::new(
            || -> Result<FakeEnvironment> { panic!("no environment for you") },
            1,
            Arc::new(RecordingSink::default()),
        );

        assert!(preprocessor.is_inert());
        assert_eq!(preprocessor.get_options(&json!({})).unwrap(), None);
    }

    #[test]
    fn test_non_preprocessor_error_still_inert() {
        let preprocessor: PooledPreprocessor<FakeEnvironment> = PooledPreprocessor::new(
            || Err(DocweaveError::Script("factory down".to_string())),
            1,
            Arc::new(RecordingSink::default()),
        );

        assert!(preprocessor.is_inert());
        assert_eq!(preprocessor.path(), "");
    }
}
