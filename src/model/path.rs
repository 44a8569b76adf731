// ABOUTME: Canonical form for resource paths shared by locks, the change log,
// ABOUTME: and file stores, so one file never goes by two names.

use crate::error::CoordError;

/// Canonical, root-relative form of a resource path.
///
/// Segments are joined with `/`; leading, trailing, and repeated separators
/// and `.` segments are dropped. `..` segments and paths with no segments are
/// rejected with `InvalidPath`.
///
/// `/a.ts`, `a.ts`, and `./a.ts` all normalize to `a.ts`.
pub fn normalize_path(path: &str) -> Result<String, CoordError> {
    let mut segments = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => return Err(CoordError::InvalidPath(path.to_string())),
            part => segments.push(part),
        }
    }

    if segments.is_empty() {
        return Err(CoordError::InvalidPath(path.to_string()));
    }
    Ok(segments.join("/"))
}
