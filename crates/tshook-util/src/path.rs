//! Lexical path helpers.
//!
//! None of these touch the filesystem.

use std::path::{Component, Path, PathBuf};

/// Name of the dependency-install directory.
pub const DEPENDENCY_DIR: &str = "node_modules";

/// Normalize a path by removing `.` and resolving `..` components.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                result.pop();
            }
            other => result.push(other),
        }
    }
    result
}

/// Whether any component of `path` is the dependency-install directory.
#[must_use]
pub fn is_inside_dependency_dir(path: &Path) -> bool {
    path.components()
        .any(|c| matches!(c, Component::Normal(name) if name == DEPENDENCY_DIR))
}

/// Whether a specifier string contains a `/node_modules/` segment.
#[must_use]
pub fn specifier_crosses_dependency_dir(specifier: &str) -> bool {
    let needle = format!("/{DEPENDENCY_DIR}/");
    specifier.contains(&needle) || specifier.replace('\\', "/").contains(&needle)
}

/// The extension of a path-like string including the leading dot (`".ts"`),
/// or `""` when there is none.
///
/// Only the final path segment is inspected, and leading dots (`.env`) do not
/// count as an extension.
#[must_use]
pub fn extname(path: &str) -> &str {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match name.rfind('.') {
        Some(0) | None => "",
        Some(idx) => &name[idx..],
    }
}

/// Render a path with forward slashes.
#[must_use]
pub fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
