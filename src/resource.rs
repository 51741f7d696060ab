//! Read-only resource collections.
//!
//! A resource collection maps logical paths (see [`crate::paths`]) to text.
//! Template directories and their scripts are read through this trait, both
//! for the preprocessor scripts themselves and for `require`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::paths;
use crate::Result;

/// Read-only collection of text resources addressed by logical path.
pub trait ResourceCollection: Send + Sync {
    /// Logical paths of every resource in the collection.
    fn names(&self) -> Vec<String>;

    /// Text of the resource at `name`, if present.
    fn get_text(&self, name: &str) -> Option<String>;
}

/// A script to turn into a preprocessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptResource {
    /// Logical path of the script.
    pub path: String,
    /// Script source text.
    pub content: String,
}

impl ScriptResource {
    /// Create a new script resource.
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Read the script at `name` from a collection.
    pub fn from_collection(resources: &dyn ResourceCollection, name: &str) -> Option<Self> {
        resources
            .get_text(name)
            .map(|content| Self::new(name, content))
    }
}

/// In-memory resource collection.
#[derive(Debug, Clone, Default)]
pub struct InMemoryResources {
    entries: BTreeMap<String, String>,
}

impl InMemoryResources {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource, builder style.
    pub fn with(mut self, name: &str, text: &str) -> Self {
        self.insert(name, text);
        self
    }

    /// Add or replace a resource. The name is normalized.
    pub fn insert(&mut self, name: &str, text: &str) {
        let key = paths::normalize(name).unwrap_or_else(|| name.to_string());
        self.entries.insert(key, text.to_string());
    }
}

impl ResourceCollection for InMemoryResources {
    fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn get_text(&self, name: &str) -> Option<String> {
        self.entries.get(name).cloned()
    }
}

/// Resource collection backed by a directory on disk.
///
/// The file list is captured when the collection is opened; file contents
/// are read on demand.
#[derive(Debug, Clone)]
pub struct DirectoryResources {
    root: PathBuf,
    names: Vec<String>,
}

impl DirectoryResources {
    /// Open the directory at `root` and index every file below it.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut names = Vec::new();
        Self::scan_directory(&root, &root, &mut names)?;
        names.sort();
        debug!(root = %root.display(), count = names.len(), "indexed template resources");
        Ok(Self { root, names })
    }

    /// Scan a directory recursively for files.
    ///
    /// Symlinked directories are not followed; symlinked files are indexed.
    fn scan_directory(root: &Path, dir: &Path, names: &mut Vec<String>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();
            if file_type.is_dir() {
                Self::scan_directory(root, &path, names)?;
                continue;
            }
            if file_type.is_symlink() && path.is_dir() {
                debug!(path = %path.display(), "skipping symlinked directory");
                continue;
            }
            if let Ok(relative) = path.strip_prefix(root) {
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                names.push(name);
            }
        }
        Ok(())
    }

    /// Get the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceCollection for DirectoryResources {
    fn names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn get_text(&self, name: &str) -> Option<String> {
        let normalized = paths::normalize(name)?;
        if self.names.binary_search(&normalized).is_err() {
            return None;
        }
        fs::read_to_string(self.root.join(&normalized)).ok()
    }
}
