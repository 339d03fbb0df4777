//! Workspace alias table for monorepos.
//!
//! Reads package patterns from `pnpm-workspace.yaml` (or the `workspaces`
//! field of the root package.json) and maps every package slug to the
//! category directory that holds it, so `@t/<slug>` can be located at
//! `<root>/<category>/<slug>`.

use crate::error::Error;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use tshook_util::fs::FileSystem;

/// Maps package slugs to their category directory, relative to the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceAliasTable {
    root: PathBuf,
    slugs: BTreeMap<String, String>,
}

impl WorkspaceAliasTable {
    /// Build a table from explicit `(slug, category)` pairs.
    pub fn from_entries<I, S, C>(root: impl Into<PathBuf>, entries: I) -> Self
    where
        I: IntoIterator<Item = (S, C)>,
        S: Into<String>,
        C: Into<String>,
    {
        Self {
            root: root.into(),
            slugs: entries
                .into_iter()
                .map(|(s, c)| (s.into(), c.into()))
                .collect(),
        }
    }

    /// Discover the table for a repository root.
    ///
    /// Returns `Ok(None)` when the root declares no workspace patterns.
    /// Directories matched by a pattern but lacking a package.json are
    /// reported and skipped.
    pub fn discover(root: &Path, fs: &dyn FileSystem) -> Result<Option<Self>, Error> {
        let Some(patterns) = workspace_patterns(root, fs)? else {
            return Ok(None);
        };

        let mut slugs = BTreeMap::new();
        for pattern in &patterns {
            if pattern.starts_with('!') {
                continue;
            }
            for (slug, category) in expand_pattern(root, pattern, fs) {
                if let Some(existing) = slugs.get(&slug) {
                    warn!(
                        slug = %slug,
                        kept = %existing,
                        ignored = %category,
                        "duplicate workspace package slug"
                    );
                    continue;
                }
                slugs.insert(slug, category);
            }
        }

        debug!(root = %root.display(), packages = slugs.len(), "workspace aliases discovered");
        Ok(Some(Self {
            root: root.to_path_buf(),
            slugs,
        }))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The category directory holding `slug`.
    #[must_use]
    pub fn category(&self, slug: &str) -> Option<&str> {
        self.slugs.get(slug).map(String::as_str)
    }

    /// Absolute directory of the package named by `slug`.
    #[must_use]
    pub fn package_dir(&self, slug: &str) -> Option<PathBuf> {
        self.category(slug)
            .map(|category| self.root.join(category).join(slug))
    }

    /// Iterate `(slug, category)` pairs in slug order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.slugs.iter().map(|(s, c)| (s.as_str(), c.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slugs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slugs.is_empty()
    }
}

/// Read workspace patterns, preferring `pnpm-workspace.yaml`.
fn workspace_patterns(root: &Path, fs: &dyn FileSystem) -> Result<Option<Vec<String>>, Error> {
    let pnpm = root.join("pnpm-workspace.yaml");
    if let Some(source) = read_optional(&pnpm, fs)? {
        return Ok(Some(parse_pnpm_packages(&source)));
    }

    let manifest_path = root.join("package.json");
    let Some(source) = read_optional(&manifest_path, fs)? else {
        return Ok(None);
    };
    let manifest: Value = serde_json::from_str(&source).map_err(|source| Error::ManifestParse {
        path: manifest_path,
        source,
    })?;

    // Workspaces can be an array or an object with a "packages" field
    let patterns = match manifest.get("workspaces") {
        Some(Value::Array(arr)) => string_array(arr),
        Some(Value::Object(obj)) => obj
            .get("packages")
            .and_then(Value::as_array)
            .map(|arr| string_array(arr))
            .unwrap_or_default(),
        _ => return Ok(None),
    };
    Ok(Some(patterns))
}

fn read_optional(path: &Path, fs: &dyn FileSystem) -> Result<Option<String>, Error> {
    match fs.read_to_string(path) {
        Ok(source) => Ok(Some(source)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(Error::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn string_array(arr: &[Value]) -> Vec<String> {
    arr.iter()
        .filter_map(|v| v.as_str().map(String::from))
        .collect()
}

/// Extract the `packages:` list from a pnpm workspace descriptor.
///
/// Handles block sequences (`- 'apps/*'`) and flow sequences
/// (`packages: [apps/*, libs/*]`). Other keys are ignored.
fn parse_pnpm_packages(source: &str) -> Vec<String> {
    let mut patterns = Vec::new();
    let mut in_packages = false;

    for raw in source.lines() {
        let line = strip_yaml_comment(raw);
        if line.trim().is_empty() {
            continue;
        }

        let indented = line.starts_with(' ') || line.starts_with('\t');
        if !indented {
            in_packages = false;
            if let Some(rest) = line.strip_prefix("packages:") {
                let rest = rest.trim();
                if let Some(flow) = rest.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
                    patterns.extend(flow.split(',').map(unquote).filter(|p| !p.is_empty()));
                } else {
                    in_packages = rest.is_empty();
                }
            }
            continue;
        }

        if in_packages {
            if let Some(item) = line.trim().strip_prefix('-') {
                let item = unquote(item);
                if !item.is_empty() {
                    patterns.push(item);
                }
            }
        }
    }

    patterns
}

fn strip_yaml_comment(line: &str) -> &str {
    // A '#' starts a comment only at line start or after whitespace
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'#' && (i == 0 || bytes[i - 1].is_ascii_whitespace()) {
            return &line[..i];
        }
    }
    line
}

fn unquote(s: &str) -> String {
    s.trim()
        .trim_matches(|c| c == '\'' || c == '"')
        .to_string()
}

/// Expand one pattern into `(slug, category)` pairs.
fn expand_pattern(root: &Path, pattern: &str, fs: &dyn FileSystem) -> Vec<(String, String)> {
    let pattern = pattern.trim_start_matches("./").trim_end_matches('/');

    let category = pattern
        .strip_suffix("/**")
        .or_else(|| pattern.strip_suffix("/*"));

    let Some(category) = category else {
        if pattern.contains('*') {
            warn!(pattern, "unsupported workspace pattern, skipping");
            return Vec::new();
        }
        // A literal package directory: its parent is the category
        let path = Path::new(pattern);
        let (Some(slug), Some(parent)) = (path.file_name(), path.parent()) else {
            return Vec::new();
        };
        if !fs.is_file(&root.join(pattern).join("package.json")) {
            warn!(dir = %root.join(pattern).display(), "workspace entry has no package.json");
            return Vec::new();
        }
        return vec![(
            slug.to_string_lossy().into_owned(),
            parent.to_string_lossy().into_owned(),
        )];
    };

    let category_dir = root.join(category);
    if !fs.is_dir(&category_dir) {
        debug!(dir = %category_dir.display(), "workspace category missing");
        return Vec::new();
    }

    let entries = match fs.read_dir(&category_dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %category_dir.display(), error = %err, "cannot list workspace category");
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter(|entry| fs.is_dir(entry))
        .filter_map(|entry| {
            if !fs.is_file(&entry.join("package.json")) {
                warn!(dir = %entry.display(), "workspace package has no package.json");
                return None;
            }
            let slug = entry.file_name()?.to_string_lossy().into_owned();
            Some((slug, category.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use tshook_util::fs::RealFs;

    fn package(root: &Path, rel: &str) {
        let dir = root.join(rel);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("package.json"), "{}").unwrap();
    }

    #[test]
    fn test_parse_pnpm_block_sequence() {
        let yaml = "packages:\n  - 'apps/*'\n  - \"libs/*\" # shared\n  - tools/cli\n\ncatalog:\n  - nope\n";
        assert_eq!(
            parse_pnpm_packages(yaml),
            vec!["apps/*", "libs/*", "tools/cli"]
        );
    }

    #[test]
    fn test_parse_pnpm_flow_sequence() {
        assert_eq!(
            parse_pnpm_packages("packages: ['apps/*', libs/*]\n"),
            vec!["apps/*", "libs/*"]
        );
    }

    #[test]
    fn test_discover_pnpm() {
        let root = tempdir().unwrap();
        fs::write(
            root.path().join("pnpm-workspace.yaml"),
            "packages:\n  - 'apps/*'\n  - 'libs/*'\n",
        )
        .unwrap();
        package(root.path(), "apps/web");
        package(root.path(), "libs/utils");
        // Ghost directory: no manifest
        fs::create_dir_all(root.path().join("libs/ghost")).unwrap();

        let table = WorkspaceAliasTable::discover(root.path(), &RealFs)
            .unwrap()
            .unwrap();
        assert_eq!(table.category("web"), Some("apps"));
        assert_eq!(table.category("utils"), Some("libs"));
        assert_eq!(table.category("ghost"), None);
        assert_eq!(table.package_dir("utils").unwrap(), root.path().join("libs/utils"));
        // Ghosts are reported, never removed
        assert!(root.path().join("libs/ghost").is_dir());
    }

    #[test]
    fn test_discover_package_json_workspaces() {
        let root = tempdir().unwrap();
        fs::write(
            root.path().join("package.json"),
            r#"{"name":"mono","workspaces":{"packages":["packages/*"]}}"#,
        )
        .unwrap();
        package(root.path(), "packages/core");

        let table = WorkspaceAliasTable::discover(root.path(), &RealFs)
            .unwrap()
            .unwrap();
        assert_eq!(table.iter().collect::<Vec<_>>(), vec![("core", "packages")]);
    }

    #[test]
    fn test_discover_without_workspaces() {
        let root = tempdir().unwrap();
        fs::write(root.path().join("package.json"), r#"{"name":"solo"}"#).unwrap();
        assert!(WorkspaceAliasTable::discover(root.path(), &RealFs)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_discover_malformed_manifest() {
        let root = tempdir().unwrap();
        fs::write(root.path().join("package.json"), "{ nope").unwrap();
        let err = WorkspaceAliasTable::discover(root.path(), &RealFs).unwrap_err();
        assert!(matches!(err, Error::ManifestParse { .. }));
    }
}
