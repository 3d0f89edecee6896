//! Static front-end files
//!
//! Pure pass-through of a prebuilt front end: the entry page and anything
//! under the static directory. Paths are resolved strictly inside the
//! root; any traversal component rejects the request.

use std::path::{Component, Path, PathBuf};

/// Load a file under `root`, returning its bytes and content type.
/// None means "not found" (missing file or rejected path).
pub fn load(root: &Path, rel: &str) -> Option<(Vec<u8>, &'static str)> {
    let path = resolve(root, rel)?;
    let data = std::fs::read(&path).ok()?;
    Some((data, content_type(&path)))
}

/// Join `rel` onto `root`, rejecting anything but plain path components
pub(crate) fn resolve(root: &Path, rel: &str) -> Option<PathBuf> {
    let rel = Path::new(rel);
    let mut path = root.to_path_buf();

    for component in rel.components() {
        match component {
            Component::Normal(part) => path.push(part),
            _ => return None,
        }
    }
    Some(path)
}

/// Content type by file extension
pub(crate) fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain; charset=utf-8",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}
