//! Logical path helpers.
//!
//! Resource names are `/`-separated paths relative to a collection root.
//! They never start with `/` and never contain `.` or `..` segments once
//! normalized.

/// Directory part of a logical path (`""` for a top-level file).
pub fn directory_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[..index],
        None => "",
    }
}

/// Normalize `.`/`..`/empty segments and backslashes.
///
/// Returns `None` when the path climbs above the root.
pub fn normalize(path: &str) -> Option<String> {
    let path = path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    Some(segments.join("/"))
}

/// Resolve `relative` against the directory `base_dir`.
pub fn join(base_dir: &str, relative: &str) -> Option<String> {
    if base_dir.is_empty() {
        normalize(relative)
    } else {
        normalize(&format!("{}/{}", base_dir, relative))
    }
}

/// Relative href leading from the directory `from_dir` to `target`.
///
/// Both arguments must be normalized logical paths.
pub fn relative_to(from_dir: &str, target: &str) -> String {
    let from: Vec<&str> = from_dir.split('/').filter(|s| !s.is_empty()).collect();
    let to: Vec<&str> = target.split('/').filter(|s| !s.is_empty()).collect();

    // The last target segment is the file itself and never shared.
    let shared = from
        .iter()
        .zip(to.iter().take(to.len().saturating_sub(1)))
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = vec![".."; from.len() - shared];
    parts.extend_from_slice(&to[shared..]);
    parts.join("/")
}

/// File name of a path with its last extension removed.
///
/// `templates/conceptual.tmpl.lua` becomes `conceptual.tmpl`.
pub fn file_stem(path: &str) -> &str {
    let file = match path.rfind('/') {
        Some(index) => &path[index + 1..],
        None => path,
    };
    match file.rfind('.') {
        Some(0) | None => file,
        Some(index) => &file[..index],
    }
}

/// Whether `href` points outside the logical tree (URL, absolute path,
/// fragment, or query).
pub fn is_external_href(href: &str) -> bool {
    href.starts_with('/')
        || href.starts_with('#')
        || href.starts_with('?')
        || href.contains("://")
        || href.starts_with("mailto:")
}
