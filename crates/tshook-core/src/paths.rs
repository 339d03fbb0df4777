use std::path::{Path, PathBuf};

/// Markers that identify a repository root, checked in order at each level.
const ROOT_MARKERS: &[&str] = &[".git", "pnpm-workspace.yaml"];

/// Find the repository root by walking up from `cwd`.
///
/// A directory qualifies when it contains `.git` or `pnpm-workspace.yaml`.
/// Returns `None` if neither marker is found before the filesystem root.
#[must_use]
pub fn repository_root(cwd: &Path) -> Option<PathBuf> {
    cwd.ancestors()
        .find(|dir| ROOT_MARKERS.iter().any(|m| dir.join(m).exists()))
        .map(Path::to_path_buf)
}

/// Find the project root by walking up from `cwd` looking for `package.json`.
#[must_use]
pub fn project_root(cwd: &Path) -> Option<PathBuf> {
    find_up(cwd, "package.json").and_then(|p| p.parent().map(Path::to_path_buf))
}

/// Walk up from `start` and return the first `<dir>/<name>` that is a file.
#[must_use]
pub fn find_up(start: &Path, name: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
