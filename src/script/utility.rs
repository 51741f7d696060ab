//! `templateUtility` binding for scripts.
//!
//! Exposes host path helpers and markup rendering to preprocessors.

use std::sync::Arc;

use mlua::{Lua, Result as LuaResult, Table};

use crate::paths;

/// Host services available to scripts through `templateUtility`.
pub trait TemplateContext: Send + Sync {
    /// Resolve `path`, relative to the source file `base`, to a logical path.
    fn resolve_source_relative_path(&self, base: &str, path: &str) -> String;

    /// Href to `path` (relative to the site root) as seen from the file `base`.
    fn get_href_from_root(&self, base: &str, path: &str) -> String;

    /// Render markup `text` belonging to the file `path`.
    fn markup(&self, path: &str, text: &str) -> String;
}

/// Default [`TemplateContext`] for a documentation build.
///
/// Markup is rendered as HTML-escaped paragraphs; plug in a markdown engine
/// by implementing [`TemplateContext`].
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    /// Prefix stripped from root-relative paths before relativizing.
    site_root: String,
}

impl BuildContext {
    /// Create a context for a site whose hrefs are rooted at `site_root`.
    pub fn new(site_root: impl Into<String>) -> Self {
        let site_root = site_root.into();
        Self {
            site_root: site_root.trim_matches('/').to_string(),
        }
    }

    fn strip_root<'a>(&self, path: &'a str) -> &'a str {
        let path = path.strip_prefix("~/").unwrap_or(path);
        if self.site_root.is_empty() {
            return path;
        }
        let trimmed = path.trim_start_matches('/');
        match trimmed.strip_prefix(self.site_root.as_str()) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
            _ => path,
        }
    }
}

impl TemplateContext for BuildContext {
    fn resolve_source_relative_path(&self, base: &str, path: &str) -> String {
        if path.is_empty() || paths::is_external_href(path) {
            return path.to_string();
        }
        if let Some(rooted) = path.strip_prefix("~/") {
            return paths::normalize(rooted).unwrap_or_else(|| path.to_string());
        }
        paths::join(paths::directory_of(base), path).unwrap_or_else(|| path.to_string())
    }

    fn get_href_from_root(&self, base: &str, path: &str) -> String {
        let target = self.strip_root(path);
        if target.is_empty() || paths::is_external_href(target) {
            return path.to_string();
        }
        match (paths::normalize(base), paths::normalize(target)) {
            (Some(base), Some(target)) => paths::relative_to(paths::directory_of(&base), &target),
            _ => path.to_string(),
        }
    }

    fn markup(&self, _path: &str, text: &str) -> String {
        let paragraphs: Vec<String> = text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| escape_html(p).replace('\n', "<br>\n"))
            .collect();

        match paragraphs.len() {
            0 => String::new(),
            // Inline text stays inline.
            1 => paragraphs.into_iter().next().unwrap_or_default(),
            _ => paragraphs
                .iter()
                .map(|p| format!("<p>{}</p>", p))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Escape the HTML special characters of `text`.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Utility API builder for registering `templateUtility` with Lua.
pub struct UtilityApi {
    context: Arc<dyn TemplateContext>,
}

impl UtilityApi {
    /// Create a new UtilityApi backed by `context`.
    pub fn new(context: Arc<dyn TemplateContext>) -> Self {
        Self { context }
    }

    /// Build the `templateUtility` table.
    pub fn create_table(&self, lua: &Lua) -> LuaResult<Table> {
        let utility = lua.create_table()?;

        let context = Arc::clone(&self.context);
        utility.set(
            "resolveSourceRelativePath",
            lua.create_function(move |_, (base, path): (String, String)| {
                Ok(context.resolve_source_relative_path(&base, &path))
            })?,
        )?;

        let context = Arc::clone(&self.context);
        utility.set(
            "getHrefFromRoot",
            lua.create_function(move |_, (base, path): (String, String)| {
                Ok(context.get_href_from_root(&base, &path))
            })?,
        )?;

        let context = Arc::clone(&self.context);
        utility.set(
            "markup",
            lua.create_function(move |_, (path, text): (String, String)| {
                Ok(context.markup(&path, &text))
            })?,
        )?;

        Ok(utility)
    }
}
