//! Module format detection.
//!
//! Explicit extensions decide directly. Ambiguous script extensions walk up
//! the directory tree for the nearest manifest declaring a `type`, stopping
//! at a dependency-install directory. Every directory visited is remembered
//! with the answer.

use super::manifest::ManifestCache;
use crate::driver::Io;
use crate::error::Error;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::trace;
use tshook_util::path::{extname, DEPENDENCY_DIR};

/// How the host should evaluate a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    CommonJs,
    Module,
    Json,
    Builtin,
}

impl ModuleFormat {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CommonJs => "commonjs",
            Self::Module => "module",
            Self::Json => "json",
            Self::Builtin => "builtin",
        }
    }
}

impl fmt::Display for ModuleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A package's declared module type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleType {
    CommonJs,
    Module,
}

impl From<ModuleType> for ModuleFormat {
    fn from(ty: ModuleType) -> Self {
        match ty {
            ModuleType::CommonJs => Self::CommonJs,
            ModuleType::Module => Self::Module,
        }
    }
}

/// Extensions whose format depends on the enclosing package.
const PACKAGE_SCOPED_EXTENSIONS: &[&str] = &[".js", ".jsx", ".ts", ".tsx"];

/// The format implied by an extension alone.
#[must_use]
pub fn format_from_extension(path: &Path) -> Option<ModuleFormat> {
    match extname(&path.to_string_lossy()) {
        ".json" => Some(ModuleFormat::Json),
        ".mjs" | ".mts" => Some(ModuleFormat::Module),
        ".cjs" | ".cts" => Some(ModuleFormat::CommonJs),
        _ => None,
    }
}

/// Populate-once cache of module type per directory.
#[derive(Debug, Default)]
pub struct ModuleTypeCache {
    by_dir: Mutex<HashMap<PathBuf, ModuleType>>,
}

impl ModuleTypeCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, dir: &Path) -> Option<ModuleType> {
        self.by_dir
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(dir)
            .copied()
    }

    fn record(&self, dirs: Vec<PathBuf>, ty: ModuleType) {
        let mut by_dir = self.by_dir.lock().unwrap_or_else(PoisonError::into_inner);
        for dir in dirs {
            by_dir.entry(dir).or_insert(ty);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_dir.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Determine the format of the file at `path`.
///
/// Returns `None` for extensions with no implied format (`.css`, `.node`, ...).
pub(crate) async fn detect_format<I: Io + ?Sized>(
    path: &Path,
    manifests: &ManifestCache,
    module_types: &ModuleTypeCache,
    io: &I,
) -> Result<Option<ModuleFormat>, Error> {
    if let Some(format) = format_from_extension(path) {
        return Ok(Some(format));
    }
    if !PACKAGE_SCOPED_EXTENSIONS.contains(&extname(&path.to_string_lossy())) {
        return Ok(None);
    }
    let Some(dir) = path.parent() else {
        return Ok(Some(ModuleFormat::CommonJs));
    };
    let ty = module_type_of_dir(dir, manifests, module_types, io).await?;
    Ok(Some(ty.into()))
}

/// The module type governing files directly inside `dir`.
pub(crate) async fn module_type_of_dir<I: Io + ?Sized>(
    dir: &Path,
    manifests: &ManifestCache,
    module_types: &ModuleTypeCache,
    io: &I,
) -> Result<ModuleType, Error> {
    let mut visited = Vec::new();
    let mut resolved = ModuleType::CommonJs;

    for current in dir.ancestors() {
        if current.file_name().is_some_and(|name| name == DEPENDENCY_DIR) {
            break;
        }
        if let Some(ty) = module_types.get(current) {
            resolved = ty;
            break;
        }
        visited.push(current.to_path_buf());

        let manifest = manifests.get(&current.join("package.json"), io).await?;
        if let Some(ty) = manifest.and_then(|m| m.declared_type()) {
            resolved = ty;
            break;
        }
    }

    trace!(dir = %dir.display(), ?resolved, visited = visited.len(), "module type");
    module_types.record(visited, resolved);
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Blocking;
    use crate::testing::CountingFs;
    use futures::executor::block_on;
    use std::fs;
    use tempfile::tempdir;

    fn detect(path: &Path, manifests: &ManifestCache, types: &ModuleTypeCache, fs: &CountingFs) -> Option<ModuleFormat> {
        block_on(detect_format(path, manifests, types, &Blocking::reads_only(fs))).unwrap()
    }

    #[test]
    fn test_explicit_extensions() {
        let fs = CountingFs::new();
        let (m, t) = (ManifestCache::new(), ModuleTypeCache::new());
        assert_eq!(detect(Path::new("/x/a.json"), &m, &t, &fs), Some(ModuleFormat::Json));
        assert_eq!(detect(Path::new("/x/a.mts"), &m, &t, &fs), Some(ModuleFormat::Module));
        assert_eq!(detect(Path::new("/x/a.cjs"), &m, &t, &fs), Some(ModuleFormat::CommonJs));
        assert_eq!(detect(Path::new("/x/a.css"), &m, &t, &fs), None);
        assert_eq!(fs.total_reads(), 0);
    }

    #[test]
    fn test_walk_skips_manifest_without_type() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("package.json"), r#"{"type":"module"}"#).unwrap();
        fs::create_dir_all(root.join("pkg/src")).unwrap();
        fs::write(root.join("pkg/package.json"), r#"{"name":"pkg"}"#).unwrap();

        let counting = CountingFs::new();
        let (m, t) = (ManifestCache::new(), ModuleTypeCache::new());
        assert_eq!(
            detect(&root.join("pkg/src/a.ts"), &m, &t, &counting),
            Some(ModuleFormat::Module)
        );
        // Every visited directory remembers the answer
        assert_eq!(t.get(&root.join("pkg/src")), Some(ModuleType::Module));
        assert_eq!(t.get(&root.join("pkg")), Some(ModuleType::Module));
        assert_eq!(t.get(root), Some(ModuleType::Module));

        let reads = counting.total_reads();
        assert_eq!(
            detect(&root.join("pkg/src/b.tsx"), &m, &t, &counting),
            Some(ModuleFormat::Module)
        );
        assert_eq!(counting.total_reads(), reads);
    }

    #[test]
    fn test_walk_stops_at_dependency_dir() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("package.json"), r#"{"type":"module"}"#).unwrap();
        fs::create_dir_all(root.join("node_modules/dep/lib")).unwrap();
        fs::write(root.join("node_modules/dep/package.json"), r#"{"name":"dep"}"#).unwrap();

        let counting = CountingFs::new();
        let (m, t) = (ManifestCache::new(), ModuleTypeCache::new());
        assert_eq!(
            detect(&root.join("node_modules/dep/lib/index.js"), &m, &t, &counting),
            Some(ModuleFormat::CommonJs)
        );
        assert_eq!(counting.reads_of(&root.join("package.json")), 0);
    }

    #[test]
    fn test_walk_default_commonjs() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("package.json"), r#"{"name":"app","version":"1.0.0"}"#).unwrap();
        fs::create_dir_all(root.join("src")).unwrap();

        let counting = CountingFs::new();
        let (m, t) = (ManifestCache::new(), ModuleTypeCache::new());
        assert_eq!(
            detect(&root.join("src/a.ts"), &m, &t, &counting),
            Some(ModuleFormat::CommonJs)
        );
        assert_eq!(counting.reads_of(&root.join("package.json")), 1);
        assert_eq!(t.get(&root.join("src")), Some(ModuleType::CommonJs));
        assert_eq!(t.get(root), Some(ModuleType::CommonJs));

        // A sibling is answered from the cache
        let reads = counting.total_reads();
        assert_eq!(
            detect(&root.join("src/b.ts"), &m, &t, &counting),
            Some(ModuleFormat::CommonJs)
        );
        assert_eq!(counting.total_reads(), reads);
    }

    #[test]
    fn test_walk_malformed_manifest_errors() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("package.json"), "{ nope").unwrap();

        let counting = CountingFs::new();
        let (m, t) = (ManifestCache::new(), ModuleTypeCache::new());
        let err = block_on(detect_format(
            &dir.path().join("a.ts"),
            &m,
            &t,
            &Blocking::reads_only(&counting),
        ))
        .unwrap_err();
        assert!(matches!(err, Error::ManifestParse { .. }));
        assert!(t.is_empty());
    }
}
