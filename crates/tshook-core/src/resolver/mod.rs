//! Module resolution.
//!
//! Classification, alias expansion (tilde, glob, workspace, paths mapping),
//! type-priority promotion, extension and directory fallbacks, and format
//! detection. The algorithm itself lives in `resolve.rs`; it is driven by
//! [`crate::Engine`].

mod exports;
mod format;
mod glob;
mod manifest;
mod paths_mapping;
mod resolve;
mod specifier;

pub use exports::{resolve_exports, resolve_imports_map};
pub use format::{format_from_extension, ModuleFormat, ModuleType, ModuleTypeCache};
pub use glob::{VirtualGlobModule, VIRTUAL_PREFIX};
pub use manifest::{ManifestCache, PackageManifest};
pub use paths_mapping::PathsMappingIndex;
pub use specifier::{classify, is_absolute_path, SpecifierKind};

pub(crate) use format::detect_format;

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tshook_util::path::is_inside_dependency_dir;

/// Which loader a module is evaluated by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderKind {
    /// Script-style: `require`.
    CommonJs,
    /// Module-style: `import`.
    Module,
}

impl LoaderKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CommonJs => "cjs",
            Self::Module => "esm",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cjs" => Some(Self::CommonJs),
            "esm" => Some(Self::Module),
            _ => None,
        }
    }

    /// Export conditions active for this loader, before any extras.
    #[must_use]
    pub fn default_conditions(&self) -> Vec<String> {
        let kind = match self {
            Self::CommonJs => "require",
            Self::Module => "import",
        };
        vec!["node".to_string(), kind.to_string()]
    }
}

/// Per-call resolution context.
#[derive(Debug, Clone)]
pub struct ResolveContext {
    importer: Option<PathBuf>,
    kind: LoaderKind,
    conditions: Vec<String>,
    importer_in_dependency: bool,
    /// Set while a fallback probes candidates; disables further fallbacks.
    pub(crate) recursive: bool,
    /// Number of alias expansions already applied on this path.
    pub(crate) alias_hops: u8,
}

impl ResolveContext {
    #[must_use]
    pub fn new(importer: Option<PathBuf>, kind: LoaderKind) -> Self {
        let importer_in_dependency = importer.as_deref().is_some_and(is_inside_dependency_dir);
        Self {
            importer,
            kind,
            conditions: kind.default_conditions(),
            importer_in_dependency,
            recursive: false,
            alias_hops: 0,
        }
    }

    /// Context for a `require` call from `importer`.
    #[must_use]
    pub fn require(importer: Option<PathBuf>) -> Self {
        Self::new(importer, LoaderKind::CommonJs)
    }

    /// Context for an `import` from `importer`.
    #[must_use]
    pub fn import(importer: Option<PathBuf>) -> Self {
        Self::new(importer, LoaderKind::Module)
    }

    /// Replace the active export conditions.
    #[must_use]
    pub fn with_conditions<I, S>(mut self, conditions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conditions = conditions.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn importer(&self) -> Option<&Path> {
        self.importer.as_deref()
    }

    #[must_use]
    pub fn importer_dir(&self) -> Option<&Path> {
        self.importer.as_deref().and_then(Path::parent)
    }

    #[must_use]
    pub fn kind(&self) -> LoaderKind {
        self.kind
    }

    #[must_use]
    pub fn conditions(&self) -> &[String] {
        &self.conditions
    }

    /// Whether the importer lies inside a dependency-install directory.
    #[must_use]
    pub fn importer_in_dependency(&self) -> bool {
        self.importer_in_dependency
    }

    /// Whether fallbacks are disabled for this call.
    #[must_use]
    pub fn is_probe(&self) -> bool {
        self.recursive
    }

    pub(crate) fn probe(&self) -> Self {
        Self {
            recursive: true,
            ..self.clone()
        }
    }

    pub(crate) fn aliased(&self) -> Self {
        Self {
            alias_hops: self.alias_hops.saturating_add(1),
            ..self.clone()
        }
    }
}

/// Identity of a resolved module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModuleId {
    /// A real file.
    File(PathBuf),
    /// A glob aggregate, materialized at load time.
    Virtual(VirtualGlobModule),
    /// Anything addressed by URL rather than path (`node:fs`, `data:`).
    Url(String),
}

impl ModuleId {
    /// Interpret a path handed back by the host, recognizing virtual identities.
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match VirtualGlobModule::from_path(&path) {
            Some(virtual_module) => Self::Virtual(virtual_module),
            None => Self::File(path),
        }
    }

    /// The filesystem path, for real files only.
    #[must_use]
    pub fn as_file(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            _ => None,
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Virtual(module) => write!(f, "{}", module.to_path().display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub id: ModuleId,
    pub format: Option<ModuleFormat>,
    /// The host must not run further resolve hooks for this result.
    pub short_circuit: bool,
}

impl ResolvedModule {
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            id: ModuleId::File(path.into()),
            format: None,
            short_circuit: false,
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: ModuleFormat) -> Self {
        self.format = Some(format);
        self
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.id.as_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_defaults() {
        let ctx = ResolveContext::import(Some(PathBuf::from("/repo/src/a.ts")));
        assert_eq!(ctx.conditions(), ["node", "import"]);
        assert_eq!(ctx.importer_dir(), Some(Path::new("/repo/src")));
        assert!(!ctx.importer_in_dependency());
        assert!(!ctx.is_probe());

        let ctx = ResolveContext::require(Some(PathBuf::from("/repo/node_modules/x/i.js")));
        assert_eq!(ctx.conditions(), ["node", "require"]);
        assert!(ctx.importer_in_dependency());
    }

    #[test]
    fn test_context_derivations() {
        let ctx = ResolveContext::import(None);
        assert!(ctx.probe().is_probe());
        assert_eq!(ctx.aliased().aliased().alias_hops, 2);
        assert!(!ctx.aliased().recursive);
    }

    #[test]
    fn test_module_id_from_path() {
        let virtual_module = VirtualGlobModule::new("./*.ts", "/repo", LoaderKind::CommonJs);
        assert_eq!(
            ModuleId::from_path(virtual_module.to_path()),
            ModuleId::Virtual(virtual_module)
        );
        assert_eq!(
            ModuleId::from_path("/repo/a.ts"),
            ModuleId::File(PathBuf::from("/repo/a.ts"))
        );
    }
}
