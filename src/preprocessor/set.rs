//! Discovery and ownership of the preprocessors of a template set.
//!
//! In a template collection:
//!
//! - `<name>.tmpl.lua` is a standalone preprocessor for `<name>`;
//! - `<name>.lua` is the preprocessor of the template `<name>.tmpl`, and
//!   only counts when that template exists (otherwise it is just a module
//!   that other scripts may `require`).
//!
//! When both exist, the one paired with the template wins.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info};

use super::{create_preprocessor_with_host, PooledPreprocessor, Preprocessor};
use crate::resource::ScriptResource;
use crate::script::ScriptHost;

/// Extension of preprocessor scripts.
pub const SCRIPT_EXTENSION: &str = ".lua";

/// Extension of standalone preprocessor scripts.
pub const STANDALONE_EXTENSION: &str = ".tmpl.lua";

/// Extension of templates.
pub const TEMPLATE_EXTENSION: &str = ".tmpl";

/// The preprocessors of one template set, keyed by template name.
///
/// Owns every pool; dropping the set tears them all down.
#[derive(Default)]
pub struct TemplatePreprocessorSet {
    preprocessors: BTreeMap<String, Arc<PooledPreprocessor>>,
}

impl TemplatePreprocessorSet {
    /// Discover and load every preprocessor in `host.resources`.
    ///
    /// Invalid scripts are kept as inert preprocessors (a warning is logged).
    pub fn load(host: &ScriptHost, max_parallelism: usize) -> Self {
        let names: BTreeSet<String> = host.resources.names().into_iter().collect();
        let mut preprocessors = BTreeMap::new();

        for (template, script_path) in Self::discover(&names) {
            let Some(script) = ScriptResource::from_collection(host.resources.as_ref(), &script_path)
            else {
                continue;
            };
            debug!(%template, path = %script_path, "loading template preprocessor");
            let preprocessor = create_preprocessor_with_host(
                host.clone(),
                script,
                max_parallelism,
                Some(&template),
            );
            preprocessors.insert(template, Arc::new(preprocessor));
        }

        let set = Self { preprocessors };
        info!(
            count = set.len(),
            inert = set.preprocessors.values().filter(|p| p.is_inert()).count(),
            "loaded template preprocessors"
        );
        set
    }

    /// Map template name -> script path according to the naming rules.
    fn discover(names: &BTreeSet<String>) -> BTreeMap<String, String> {
        let mut found = BTreeMap::new();

        for name in names {
            if let Some(template) = name.strip_suffix(STANDALONE_EXTENSION) {
                let paired = format!("{}{}", template, SCRIPT_EXTENSION);
                let has_template = names.contains(&format!("{}{}", template, TEMPLATE_EXTENSION));
                if !(has_template && names.contains(&paired)) {
                    found.insert(template.to_string(), name.clone());
                }
            } else if let Some(template) = name.strip_suffix(SCRIPT_EXTENSION) {
                if names.contains(&format!("{}{}", template, TEMPLATE_EXTENSION)) {
                    found.insert(template.to_string(), name.clone());
                }
            }
        }

        found
    }

    /// Preprocessor of the template `name`.
    pub fn get(&self, name: &str) -> Option<Arc<PooledPreprocessor>> {
        self.preprocessors.get(name).cloned()
    }

    /// Names of the templates that have a preprocessor.
    pub fn names(&self) -> Vec<&str> {
        self.preprocessors.keys().map(String::as_str).collect()
    }

    /// Iterate over (template name, preprocessor).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<PooledPreprocessor>)> {
        self.preprocessors.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of preprocessors, inert ones included.
    pub fn len(&self) -> usize {
        self.preprocessors.len()
    }

    /// Whether the set has no preprocessors.
    pub fn is_empty(&self) -> bool {
        self.preprocessors.is_empty()
    }

    /// Number of preprocessors that can do something.
    pub fn active_count(&self) -> usize {
        self.preprocessors
            .values()
            .filter(|p| p.has_options() || p.has_transform())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::InMemoryResources;
    use crate::script::console::testing::RecordingSink;
    use crate::script::LogLevel;
    use serde_json::json;

    fn load(resources: InMemoryResources) -> (TemplatePreprocessorSet, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let host = ScriptHost::with_resources(Arc::new(resources)).with_sink(sink.clone());
        (TemplatePreprocessorSet::load(&host, 2), sink)
    }

    #[test]
    fn test_discovery_rules() {
        let (set, _) = load(
            InMemoryResources::new()
                .with("conceptual.tmpl.lua", "exports.transform = function(m) return m end")
                .with("toc.tmpl", "<ul></ul>")
                .with("toc.lua", "exports.getOptions = function(m) return {} end")
                .with("common.lua", "exports.x = 1")
                .with("partials/nav.tmpl.lua", "exports.x = 1"),
        );

        assert_eq!(set.names(), vec!["conceptual", "partials/nav", "toc"]);
        assert!(set.get("common").is_none());
        assert_eq!(set.get("toc").unwrap().path(), "toc.lua");
        assert_eq!(set.get("toc").unwrap().name(), "toc");
        assert_eq!(set.active_count(), 2);
    }

    #[test]
    fn test_paired_script_wins_over_standalone() {
        let (set, _) = load(
            InMemoryResources::new()
                .with("page.tmpl", "")
                .with("page.lua", "exports.transform = function(m) m.from = 'paired' return m end")
                .with("page.tmpl.lua", "exports.transform = function(m) m.from = 'standalone' return m end"),
        );

        assert_eq!(set.len(), 1);
        let result = set.get("page").unwrap().transform_model(json!({})).unwrap();
        assert_eq!(result["from"], "paired");
    }

    #[test]
    fn test_invalid_script_kept_inert() {
        let (set, sink) = load(
            InMemoryResources::new()
                .with("broken.tmpl.lua", "exports = ")
                .with("good.tmpl.lua", "exports.transform = function(m) return m end"),
        );

        assert_eq!(set.len(), 2);
        assert!(set.get("broken").unwrap().is_inert());
        assert!(!set.get("good").unwrap().is_inert());
        assert_eq!(sink.at(LogLevel::Warning).len(), 1);
    }

    #[test]
    fn test_empty_collection() {
        let (set, _) = load(InMemoryResources::new());
        assert!(set.is_empty());
        assert_eq!(set.iter().count(), 0);
    }
}
