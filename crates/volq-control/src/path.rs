//! Lexical path normalisation for the containment check.
//!
//! `set_quota` must decide whether a caller-supplied path lies under the
//! controlled root before touching the filesystem, so the check works on
//! a lexically normalised path: `.` components dropped, `..` clamped at
//! the filesystem root, relative paths rejected outright.

use std::path::{Component, Path, PathBuf};

/// Normalise an absolute path without consulting the filesystem.
///
/// Returns `None` for relative paths. `..` never climbs above `/`.
pub(crate) fn normalize_absolute(path: &Path) -> Option<PathBuf> {
    if !path.is_absolute() {
        return None;
    }
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::RootDir => result.push(Component::RootDir),
            Component::Normal(c) => result.push(c),
            Component::CurDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                if result.as_os_str().len() > 1 {
                    result.pop();
                }
            }
        }
    }
    Some(result)
}

/// Whether `path` is a proper descendant of `base` (component-wise
/// prefix, and not `base` itself). Both sides must already be normalised.
pub(crate) fn is_strictly_under(base: &Path, path: &Path) -> bool {
    path.starts_with(base) && path != base
}
