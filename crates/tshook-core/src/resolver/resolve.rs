//! The resolution algorithm.
//!
//! Order of strategies for one specifier:
//!
//! 1. Specifiers reaching into a dependency directory go straight to the host.
//! 2. `file:` URLs become paths; other URLs go to the host.
//! 3. Tilde aliases expand against the repository root and resolve again.
//! 4. Globs become a virtual identity.
//! 5. Workspace aliases resolve through the package's `exports`.
//! 6. A trailing `/` asks for the directory's index.
//! 7. Bare specifiers try each paths-mapping candidate.
//! 8. Typed importers try the typed counterpart of a script extension.
//! 9. The host resolves; on failure, directory and extension fallbacks run.
//!
//! Every step is written as a future over a driver so the synchronous and
//! asynchronous entry points share it.

use super::exports::resolve_exports;
use super::glob::VirtualGlobModule;
use super::specifier::{classify, SpecifierKind};
use super::{detect_format, ModuleFormat, ModuleId, ResolveContext, ResolvedModule};
use crate::driver::ResolveIo;
use crate::engine::Engine;
use crate::error::Error;
use futures::future::{BoxFuture, FutureExt};
use std::path::PathBuf;
use tracing::{debug, trace};
use tshook_util::path::{extname, normalize, specifier_crosses_dependency_dir, to_slash};

/// Extensions probed, in order, when a specifier names no existing file.
pub const FALLBACK_EXTENSIONS: &[&str] = &[".js", ".json", ".ts", ".tsx", ".jsx"];

/// Importer extensions that enable typed-counterpart promotion.
const TYPED_IMPORTER_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".mts", ".cts"];

/// Typed counterparts of script extensions, in preference order.
fn typed_counterparts(ext: &str) -> &'static [&'static str] {
    match ext {
        ".js" => &[".ts", ".tsx"],
        ".jsx" => &[".tsx"],
        ".mjs" => &[".mts"],
        ".cjs" => &[".cts"],
        _ => &[],
    }
}

/// Result of one resolution attempt.
///
/// `Missing` carries a not-found-class error that the caller may recover
/// from by trying something else. Hard failures travel as `Err`.
#[derive(Debug)]
pub(crate) enum Outcome {
    Found(ResolvedModule),
    Missing(Error),
}

impl Outcome {
    fn from_host(result: Result<ResolvedModule, Error>) -> Result<Self, Error> {
        match result {
            Ok(resolved) => Ok(Self::Found(resolved)),
            Err(err) if err.is_not_found() => Ok(Self::Missing(err)),
            Err(err) => Err(err),
        }
    }

    pub(crate) fn into_result(self) -> Result<ResolvedModule, Error> {
        match self {
            Self::Found(resolved) => Ok(resolved),
            Self::Missing(err) => Err(err),
        }
    }
}

impl Engine {
    pub(crate) fn resolve_step<'a, I: ResolveIo + ?Sized>(
        &'a self,
        specifier: &'a str,
        ctx: &'a ResolveContext,
        io: &'a I,
    ) -> BoxFuture<'a, Result<Outcome, Error>> {
        async move {
            if specifier_crosses_dependency_dir(specifier) {
                trace!(specifier, "dependency path, delegating");
                return Outcome::from_host(io.host_resolve(specifier, ctx).await);
            }

            let kind = classify(specifier, &self.config.workspace_namespace);
            trace!(specifier, %kind, probe = ctx.recursive, hops = ctx.alias_hops, "resolve");

            match kind {
                SpecifierKind::Url => match file_url_to_path(specifier) {
                    Some(path) => self.resolve_step(&path, ctx, io).await,
                    None => Outcome::from_host(io.host_resolve(specifier, ctx).await),
                },
                SpecifierKind::TildeAlias => {
                    let expanded = self.expand_tilde(specifier)?;
                    debug!(specifier, %expanded, "tilde alias");
                    self.resolve_step(&expanded, &ctx.aliased(), io).await
                }
                SpecifierKind::Glob => {
                    let importer_dir = ctx
                        .importer_dir()
                        .ok_or_else(|| Error::alias(specifier, "glob imports need an importing module"))?;
                    let module = VirtualGlobModule::new(specifier, importer_dir, ctx.kind());
                    Ok(Outcome::Found(ResolvedModule {
                        id: ModuleId::Virtual(module),
                        format: Some(ModuleFormat::Module),
                        short_circuit: true,
                    }))
                }
                SpecifierKind::WorkspaceAlias => {
                    self.resolve_workspace(specifier, ctx, io).await.map(Outcome::Found)
                }
                SpecifierKind::Relative | SpecifierKind::Absolute | SpecifierKind::Bare => {
                    self.resolve_standard(specifier, kind, ctx, io).await
                }
            }
        }
        .boxed()
    }

    async fn resolve_standard<I: ResolveIo + ?Sized>(
        &self,
        specifier: &str,
        kind: SpecifierKind,
        ctx: &ResolveContext,
        io: &I,
    ) -> Result<Outcome, Error> {
        if specifier.ends_with('/') {
            return self.try_directory(specifier, ctx, io).await;
        }

        if kind == SpecifierKind::Bare && ctx.alias_hops == 0 && !ctx.importer_in_dependency() {
            if let Some(paths) = &self.paths {
                let aliased = ctx.aliased();
                for candidate in paths.candidates(specifier) {
                    let candidate = to_slash(&candidate);
                    match self.resolve_step(&candidate, &aliased, io).await? {
                        Outcome::Found(resolved) => {
                            debug!(specifier, %candidate, "paths mapping");
                            return Ok(Outcome::Found(resolved));
                        }
                        Outcome::Missing(err) => trace!(%candidate, error = %err, "paths candidate missing"),
                    }
                }
            }
        }

        if let Some(resolved) = self.resolve_typed_counterpart(specifier, ctx, io).await? {
            return Ok(Outcome::Found(resolved));
        }

        self.resolve_with_host(specifier, ctx, io).await
    }

    /// From a typed importer, prefer `./x.ts` over `./x.js` and so on.
    async fn resolve_typed_counterpart<I: ResolveIo + ?Sized>(
        &self,
        specifier: &str,
        ctx: &ResolveContext,
        io: &I,
    ) -> Result<Option<ResolvedModule>, Error> {
        let typed_importer = ctx
            .importer()
            .is_some_and(|p| TYPED_IMPORTER_EXTENSIONS.contains(&extname(&p.to_string_lossy())));
        if !typed_importer {
            return Ok(None);
        }

        let ext = extname(specifier);
        let stem = &specifier[..specifier.len() - ext.len()];
        let probe = ctx.probe();
        for typed in typed_counterparts(ext) {
            let candidate = format!("{stem}{typed}");
            match self.resolve_step(&candidate, &probe, io).await? {
                Outcome::Found(resolved) => {
                    debug!(specifier, %candidate, "typed counterpart");
                    return Ok(Some(resolved));
                }
                Outcome::Missing(_) => {}
            }
        }
        Ok(None)
    }

    async fn resolve_with_host<I: ResolveIo + ?Sized>(
        &self,
        specifier: &str,
        ctx: &ResolveContext,
        io: &I,
    ) -> Result<Outcome, Error> {
        let err = match io.host_resolve(specifier, ctx).await {
            Ok(resolved) => return self.finish(resolved, io).await.map(Outcome::Found),
            Err(err) if !err.is_not_found() => return Err(err),
            Err(err) => err,
        };

        if ctx.recursive {
            return Ok(Outcome::Missing(err));
        }

        match err {
            Error::UnsupportedDirectoryImport { .. } => self.try_directory(specifier, ctx, io).await,
            Error::ModuleNotFound { .. } => match self.try_extensions(specifier, ctx, io).await? {
                Outcome::Found(resolved) => Ok(Outcome::Found(resolved)),
                // The caller sees the original failure, not the last probe's
                Outcome::Missing(_) => Ok(Outcome::Missing(err)),
            },
            other => Ok(Outcome::Missing(other)),
        }
    }

    /// Append each fallback extension in turn.
    ///
    /// When every probe misses, the first probe's error is reported with the
    /// appended extension removed from its specifier.
    pub(crate) async fn try_extensions<I: ResolveIo + ?Sized>(
        &self,
        specifier: &str,
        ctx: &ResolveContext,
        io: &I,
    ) -> Result<Outcome, Error> {
        let probe = ctx.probe();
        let mut first_error = None;

        for ext in FALLBACK_EXTENSIONS {
            let candidate = format!("{specifier}{ext}");
            match self.resolve_step(&candidate, &probe, io).await? {
                Outcome::Found(resolved) => return Ok(Outcome::Found(resolved)),
                Outcome::Missing(mut err) => {
                    if first_error.is_none() {
                        err.strip_specifier_suffix(ext);
                        first_error = Some(err);
                    }
                }
            }
        }

        Ok(Outcome::Missing(
            first_error.unwrap_or_else(|| Error::not_found(specifier, ctx.importer())),
        ))
    }

    /// Resolve `<dir>/index` with extension fallback.
    ///
    /// Without an explicit trailing slash, `<dir>.<ext>` is tried afterwards.
    pub(crate) async fn try_directory<I: ResolveIo + ?Sized>(
        &self,
        specifier: &str,
        ctx: &ResolveContext,
        io: &I,
    ) -> Result<Outcome, Error> {
        let explicit = specifier.ends_with('/');
        let appended = if explicit { "index" } else { "/index" };

        match self.try_extensions(&format!("{specifier}{appended}"), ctx, io).await? {
            Outcome::Found(resolved) => Ok(Outcome::Found(resolved)),
            Outcome::Missing(mut err) => {
                if !explicit {
                    if let Outcome::Found(resolved) = self.try_extensions(specifier, ctx, io).await? {
                        return Ok(Outcome::Found(resolved));
                    }
                }
                err.strip_specifier_suffix(appended);
                Ok(Outcome::Missing(err))
            }
        }
    }

    /// `~` is the repository root and `~/x` a path below it.
    fn expand_tilde(&self, specifier: &str) -> Result<String, Error> {
        let root = to_slash(&self.config.root);
        let root = root.trim_end_matches('/');
        match &specifier[1..] {
            "" => Ok(root.to_string()),
            rest => match rest.strip_prefix('/') {
                Some(path) => Ok(format!("{root}/{path}")),
                None => Err(Error::alias(specifier, "expected '~' or '~/<path>'")),
            },
        }
    }

    /// `<namespace>/<slug>[/subpath]` through the workspace package's `exports`.
    async fn resolve_workspace<I: ResolveIo + ?Sized>(
        &self,
        specifier: &str,
        ctx: &ResolveContext,
        io: &I,
    ) -> Result<ResolvedModule, Error> {
        let namespace = &self.config.workspace_namespace;
        let rest = &specifier[namespace.len() + 1..];
        let (slug, subpath) = match rest.split_once('/') {
            Some((slug, sub)) => (slug, format!("./{sub}")),
            None => (rest, ".".to_string()),
        };
        if slug.is_empty() {
            return Err(Error::alias(specifier, "missing package slug"));
        }

        let table = self
            .workspace
            .as_ref()
            .ok_or_else(|| Error::alias(specifier, "no workspace packages are declared"))?;
        let package_dir = table.package_dir(slug).ok_or_else(|| {
            Error::alias(specifier, format!("no workspace package named '{namespace}/{slug}'"))
        })?;

        let manifest_path = package_dir.join("package.json");
        let manifest = self
            .manifests
            .get(&manifest_path, io)
            .await?
            .ok_or_else(|| Error::Read {
                path: manifest_path.clone(),
                source: std::io::ErrorKind::NotFound.into(),
            })?;

        let target = manifest
            .exports
            .as_ref()
            .and_then(|exports| resolve_exports(exports, &subpath, ctx.conditions()))
            .ok_or_else(|| Error::ExportNotDefined {
                subpath: subpath.clone(),
                manifest: manifest_path.clone(),
            })?;

        let path = normalize(&package_dir.join(&target));
        debug!(specifier, path = %path.display(), "workspace alias");
        let format = detect_format(&path, &self.manifests, &self.module_types, io).await?;
        Ok(ResolvedModule {
            id: ModuleId::File(path),
            format,
            short_circuit: true,
        })
    }

    /// Fill in the format of a host result that left it open.
    async fn finish<I: ResolveIo + ?Sized>(
        &self,
        mut resolved: ResolvedModule,
        io: &I,
    ) -> Result<ResolvedModule, Error> {
        if resolved.format.is_none() {
            if let ModuleId::File(path) = &resolved.id {
                resolved.format = detect_format(path, &self.manifests, &self.module_types, io).await?;
            }
        }
        Ok(resolved)
    }
}

fn file_url_to_path(specifier: &str) -> Option<String> {
    let url = url::Url::parse(specifier).ok()?;
    if url.scheme() != "file" {
        return None;
    }
    let path: PathBuf = url.to_file_path().ok()?;
    Some(path.to_string_lossy().into_owned())
}
