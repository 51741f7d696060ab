//! Test helpers for integration tests.
//!
//! Provides a recording log sink, a template context that measures how many
//! scripts run at once, and shortcuts for building preprocessors.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use docweave::{
    create_preprocessor_with_host, BuildContext, InMemoryResources, LogLevel, LogSink,
    PooledPreprocessor, ScriptHost, ScriptResource, TemplateContext,
};

/// Default bound used by the tests.
pub const MAX_PARALLELISM: usize = 2;

/// Sink keeping every message it receives.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Messages written at `level`, in order.
    pub fn at(&self, level: LogLevel) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.at(LogLevel::Warning)
    }
}

impl LogSink for RecordingSink {
    fn write(&self, level: LogLevel, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((level, message.to_string()));
    }
}

/// Context whose `markup` holds the calling script for a while and records
/// the highest number of callers seen at the same time.
#[derive(Default)]
pub struct GaugeContext {
    inner: BuildContext,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl GaugeContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl TemplateContext for GaugeContext {
    fn resolve_source_relative_path(&self, base: &str, path: &str) -> String {
        self.inner.resolve_source_relative_path(base, path)
    }

    fn get_href_from_root(&self, base: &str, path: &str) -> String {
        self.inner.get_href_from_root(base, path)
    }

    fn markup(&self, path: &str, text: &str) -> String {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.inner.markup(path, text)
    }
}

/// Host over in-memory `resources`, recording messages into `sink`.
pub fn host(resources: InMemoryResources, sink: Arc<RecordingSink>) -> ScriptHost {
    ScriptHost::with_resources(Arc::new(resources)).with_sink(sink)
}

/// Pooled preprocessor for the resource `path` of `resources`.
pub fn preprocessor(
    resources: InMemoryResources,
    path: &str,
    sink: Arc<RecordingSink>,
) -> PooledPreprocessor {
    let script = ScriptResource::from_collection(&resources, path)
        .unwrap_or_else(|| ScriptResource::new(path, ""));
    create_preprocessor_with_host(host(resources, sink), script, MAX_PARALLELISM, None)
}
