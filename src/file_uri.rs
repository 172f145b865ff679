//! Rendering filesystem paths as `file:` URIs.
//!
//! URI-valued flags and wire-protocol lines always use forward slashes, even
//! on Windows, while any actual filesystem call must keep using native
//! separators. Keeping the two conversions in separate helpers avoids the
//! common mistake of leaking a native path into a URI string.

/// Render an absolute filesystem path as a `file://` URI using forward
/// slashes regardless of host platform.
///
/// This does not touch the filesystem and does not require the path to
/// exist; it is a pure string transform.
#[must_use]
pub fn path_to_file_uri(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    if normalized.starts_with('/') {
        format!("file://{normalized}")
    } else {
        // Windows drive-letter paths (`C:/...`) need a third slash before the drive.
        format!("file:///{normalized}")
    }
}

/// Decode a `file:` URI back into a plain filesystem path.
///
/// Returns `None` if `uri` does not use the `file:` scheme. This is a best
/// effort, string-level decoder: it does not perform percent-decoding beyond
/// what a frontend server is known to emit (plain paths).
#[must_use]
pub fn file_uri_to_path(uri: &str) -> Option<String> {
    let rest = uri.strip_prefix("file://")?;
    // `file:///C:/foo` -> strip the extra leading slash in front of a drive letter.
    if let Some(stripped) = rest.strip_prefix('/') {
        if stripped.len() > 1 && stripped.as_bytes()[1] == b':' {
            return Some(stripped.to_owned());
        }
    }
    if rest.starts_with('/') {
        Some(rest.to_owned())
    } else {
        Some(format!("/{rest}"))
    }
}

/// Ensure an SDK root string ends with `/`, as the wire protocol expects.
#[must_use]
pub fn ensure_trailing_slash(root: &str) -> String {
    let normalized = root.replace('\\', "/");
    if normalized.ends_with('/') {
        normalized
    } else {
        format!("{normalized}/")
    }
}
