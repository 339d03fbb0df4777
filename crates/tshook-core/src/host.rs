//! Host capabilities.
//!
//! The engine never resolves or loads a plain module by itself: it layers
//! its strategies over a host resolver and loader passed into each call.
//! [`FsHost`] and [`FsLoader`] are filesystem-backed hosts with the
//! runtime's strict semantics (exact paths only, `exports` enforced).

use crate::error::Error;
use crate::resolver::{
    format_from_extension, is_absolute_path, resolve_exports, resolve_imports_map, ModuleFormat,
    ModuleId, PackageManifest, ResolveContext, ResolvedModule,
};
use crate::transform::LoadContext;
use futures::future::{self, BoxFuture, FutureExt};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tshook_util::fs::{FileSystem, RealFs};
use tshook_util::path::{normalize, DEPENDENCY_DIR};

/// Source produced by a host loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSource {
    pub format: Option<ModuleFormat>,
    /// `None` for modules without source text (builtins).
    pub source: Option<String>,
}

/// Synchronous host resolver.
pub trait HostResolver: Send + Sync {
    fn resolve(&self, specifier: &str, ctx: &ResolveContext) -> Result<ResolvedModule, Error>;
}

/// Asynchronous host resolver.
pub trait AsyncHostResolver: Send + Sync {
    fn resolve<'a>(
        &'a self,
        specifier: &'a str,
        ctx: &'a ResolveContext,
    ) -> BoxFuture<'a, Result<ResolvedModule, Error>>;
}

/// Synchronous host loader.
pub trait HostLoader: Send + Sync {
    fn load(&self, id: &ModuleId, ctx: &LoadContext) -> Result<LoadedSource, Error>;
}

/// Asynchronous host loader.
pub trait AsyncHostLoader: Send + Sync {
    fn load<'a>(
        &'a self,
        id: &'a ModuleId,
        ctx: &'a LoadContext,
    ) -> BoxFuture<'a, Result<LoadedSource, Error>>;
}

/// Modules provided by the runtime itself.
const BUILTINS: &[&str] = &[
    "assert",
    "buffer",
    "child_process",
    "crypto",
    "events",
    "fs",
    "http",
    "https",
    "module",
    "net",
    "os",
    "path",
    "process",
    "stream",
    "url",
    "util",
    "worker_threads",
    "zlib",
];

/// Strict filesystem resolver.
///
/// Relative and absolute specifiers must name an existing file exactly; a
/// directory is an `UnsupportedDirectoryImport`. Bare specifiers are looked
/// up in `node_modules` directories walking up from the importer, honoring
/// `exports` when present and `main` otherwise.
#[derive(Debug, Clone)]
pub struct FsHost {
    fs: Arc<dyn FileSystem>,
}

impl Default for FsHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FsHost {
    #[must_use]
    pub fn new() -> Self {
        Self::with_fs(Arc::new(RealFs))
    }

    #[must_use]
    pub fn with_fs(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    fn resolve_specifier(&self, spec: &str, ctx: &ResolveContext) -> Result<ResolvedModule, Error> {
        if spec.is_empty() {
            return Err(Error::not_found(spec, ctx.importer()));
        }

        if let Some(name) = builtin_name(spec) {
            return Ok(ResolvedModule {
                id: ModuleId::Url(format!("node:{name}")),
                format: Some(ModuleFormat::Builtin),
                short_circuit: false,
            });
        }

        if spec.starts_with("file:") {
            let path = url::Url::parse(spec)
                .ok()
                .and_then(|u| u.to_file_path().ok())
                .ok_or_else(|| Error::host(format!("Invalid file URL '{spec}'")))?;
            return self.resolve_file(spec, &path, ctx);
        }
        if spec.starts_with('#') {
            return self.resolve_hash_import(spec, ctx);
        }

        let base = self.base_dir(ctx);
        if spec == "." || spec == ".." || spec.starts_with("./") || spec.starts_with("../") {
            return self.resolve_file(spec, &base.join(spec), ctx);
        }
        if is_absolute_path(spec) {
            return self.resolve_file(spec, Path::new(spec), ctx);
        }
        if spec.contains(':') {
            return Err(Error::host(format!("Unsupported URL scheme in '{spec}'")));
        }

        self.resolve_bare(spec, &base, ctx)
    }

    fn base_dir(&self, ctx: &ResolveContext) -> PathBuf {
        ctx.importer_dir().map_or_else(
            || std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            Path::to_path_buf,
        )
    }

    fn resolve_file(&self, spec: &str, path: &Path, ctx: &ResolveContext) -> Result<ResolvedModule, Error> {
        let path = normalize(path);
        if self.fs.is_file(&path) {
            return Ok(ResolvedModule::file(path));
        }
        if self.fs.is_dir(&path) {
            return Err(Error::directory_import(spec, ctx.importer()));
        }
        Err(Error::not_found(spec, ctx.importer()))
    }

    fn read_manifest(&self, path: &Path) -> Result<Option<PackageManifest>, Error> {
        match self.fs.read_to_string(path) {
            Ok(source) => PackageManifest::parse(path, &source).map(Some),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(Error::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// `#name` through the nearest package's `imports` field.
    fn resolve_hash_import(&self, spec: &str, ctx: &ResolveContext) -> Result<ResolvedModule, Error> {
        let base = self.base_dir(ctx);
        for dir in base.ancestors() {
            let manifest_path = dir.join("package.json");
            let Some(manifest) = self.read_manifest(&manifest_path)? else {
                continue;
            };
            let target = manifest
                .imports
                .as_ref()
                .and_then(|imports| resolve_imports_map(imports, spec, ctx.conditions()))
                .ok_or_else(|| Error::not_found(spec, ctx.importer()))?;
            return self.resolve_file(spec, &dir.join(target), ctx);
        }
        Err(Error::not_found(spec, ctx.importer()))
    }

    fn resolve_bare(&self, spec: &str, base: &Path, ctx: &ResolveContext) -> Result<ResolvedModule, Error> {
        let (pkg_name, subpath) = parse_bare_specifier(spec);

        for dir in base.ancestors() {
            if dir.file_name().is_some_and(|n| n == DEPENDENCY_DIR) {
                continue;
            }
            let pkg_dir = dir.join(DEPENDENCY_DIR).join(pkg_name);
            if !self.fs.is_dir(&pkg_dir) {
                continue;
            }

            let manifest_path = pkg_dir.join("package.json");
            let manifest = self.read_manifest(&manifest_path)?.unwrap_or_default();

            if let Some(exports) = &manifest.exports {
                let exports_subpath = subpath.map_or_else(|| ".".to_string(), |s| format!("./{s}"));
                let target = resolve_exports(exports, &exports_subpath, ctx.conditions()).ok_or_else(|| {
                    Error::ExportNotDefined {
                        subpath: exports_subpath.clone(),
                        manifest: manifest_path.clone(),
                    }
                })?;
                let target_path = normalize(&pkg_dir.join(target));
                if self.fs.is_file(&target_path) {
                    return Ok(ResolvedModule::file(target_path));
                }
                return Err(Error::not_found(spec, ctx.importer()));
            }

            return match subpath {
                Some(sub) => self.resolve_file(spec, &pkg_dir.join(sub), ctx),
                None => self.resolve_package_main(spec, &pkg_dir, &manifest, ctx),
            };
        }

        Err(Error::not_found(spec, ctx.importer()))
    }

    /// Legacy `main` resolution.
    fn resolve_package_main(
        &self,
        spec: &str,
        pkg_dir: &Path,
        manifest: &PackageManifest,
        ctx: &ResolveContext,
    ) -> Result<ResolvedModule, Error> {
        let mut candidates = Vec::new();
        if let Some(main) = &manifest.main {
            let main = pkg_dir.join(main);
            candidates.push(main.clone());
            candidates.push(PathBuf::from(format!("{}.js", main.display())));
            candidates.push(PathBuf::from(format!("{}.json", main.display())));
            candidates.push(main.join("index.js"));
        }
        candidates.push(pkg_dir.join("index.js"));
        candidates.push(pkg_dir.join("index.json"));

        candidates
            .into_iter()
            .map(|c| normalize(&c))
            .find(|c| self.fs.is_file(c))
            .map(ResolvedModule::file)
            .ok_or_else(|| Error::not_found(spec, ctx.importer()))
    }
}

impl HostResolver for FsHost {
    fn resolve(&self, specifier: &str, ctx: &ResolveContext) -> Result<ResolvedModule, Error> {
        self.resolve_specifier(specifier, ctx)
    }
}

impl AsyncHostResolver for FsHost {
    fn resolve<'a>(
        &'a self,
        specifier: &'a str,
        ctx: &'a ResolveContext,
    ) -> BoxFuture<'a, Result<ResolvedModule, Error>> {
        future::ready(self.resolve_specifier(specifier, ctx)).boxed()
    }
}

fn builtin_name(spec: &str) -> Option<&str> {
    if let Some(name) = spec.strip_prefix("node:") {
        return Some(name);
    }
    let head = spec.split('/').next().unwrap_or(spec);
    BUILTINS.contains(&head).then_some(spec)
}

/// Parse a bare specifier into package name and optional subpath.
///
/// `"lodash/fp"` -> `("lodash", Some("fp"))`,
/// `"@scope/pkg/sub"` -> `("@scope/pkg", Some("sub"))`.
fn parse_bare_specifier(spec: &str) -> (&str, Option<&str>) {
    let name_end = if spec.starts_with('@') {
        spec.match_indices('/').nth(1).map(|(i, _)| i)
    } else {
        spec.find('/')
    };
    match name_end {
        Some(i) => (&spec[..i], Some(&spec[i + 1..])),
        None => (spec, None),
    }
}

/// Filesystem loader: reads source text, nothing more.
#[derive(Debug, Clone)]
pub struct FsLoader {
    fs: Arc<dyn FileSystem>,
}

impl Default for FsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl FsLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::with_fs(Arc::new(RealFs))
    }

    #[must_use]
    pub fn with_fs(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    fn load_module(&self, id: &ModuleId, ctx: &LoadContext) -> Result<LoadedSource, Error> {
        match id {
            ModuleId::File(path) => {
                let source = self.fs.read_to_string(path).map_err(|source| {
                    if source.kind() == io::ErrorKind::NotFound {
                        Error::not_found(path.to_string_lossy(), None)
                    } else {
                        Error::Read {
                            path: path.clone(),
                            source,
                        }
                    }
                })?;
                let format = ctx
                    .format
                    .or_else(|| ctx.json_attribute().then_some(ModuleFormat::Json))
                    .or_else(|| format_from_extension(path));
                Ok(LoadedSource {
                    format,
                    source: Some(source),
                })
            }
            ModuleId::Url(url) if url.starts_with("node:") => Ok(LoadedSource {
                format: Some(ModuleFormat::Builtin),
                source: None,
            }),
            ModuleId::Url(url) => Err(Error::host(format!("Cannot load '{url}'"))),
            ModuleId::Virtual(module) => Err(Error::host(format!(
                "Virtual module '{}' must be loaded through the engine",
                module.pattern
            ))),
        }
    }
}

impl HostLoader for FsLoader {
    fn load(&self, id: &ModuleId, ctx: &LoadContext) -> Result<LoadedSource, Error> {
        self.load_module(id, ctx)
    }
}

impl AsyncHostLoader for FsLoader {
    fn load<'a>(
        &'a self,
        id: &'a ModuleId,
        ctx: &'a LoadContext,
    ) -> BoxFuture<'a, Result<LoadedSource, Error>> {
        future::ready(self.load_module(id, ctx)).boxed()
    }
}
