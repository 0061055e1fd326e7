use std::path::PathBuf;

use dirs_next::home_dir;

pub fn expand_tilde(path: &str) -> PathBuf {
    let p = path.trim();
    if p == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = p.strip_prefix("~/") {
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    if let Some(rest) = p.strip_prefix("~\\") {
        // Windows-style
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    PathBuf::from(p)
}

/// Joins object-store key parts with exactly one `/` between non-empty segments.
///
/// Leading, trailing, and repeated separators in either part are collapsed, so
/// `join_object_key("configs/", "/requirements.txt")` is `configs/requirements.txt`.
pub fn join_object_key(prefix: &str, name: &str) -> String {
    prefix
        .split('/')
        .chain(name.split('/'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Normalises a key prefix to `segment/segment/` form (trailing slash, no leading or repeated ones).
///
/// An empty prefix stays empty.
pub fn normalize_prefix(prefix: &str) -> String {
    let joined = join_object_key(prefix, "");
    if joined.is_empty() { joined } else { format!("{joined}/") }
}
