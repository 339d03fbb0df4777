//! The resolution engine.
//!
//! An [`Engine`] owns the configuration-derived indexes (paths mapping,
//! workspace aliases, root tsconfig) and every cache. It is `Send + Sync`;
//! one instance serves the synchronous and asynchronous contracts at once,
//! and both share its caches.

use crate::config::EngineConfig;
use crate::driver::{Blocking, Cooperative};
use crate::error::Error;
use crate::host::{AsyncHostLoader, AsyncHostResolver, HostLoader, HostResolver};
use crate::resolver::{
    ManifestCache, ModuleId, ModuleTypeCache, PathsMappingIndex, ResolveContext, ResolvedModule,
};
use crate::transform::{LoadContext, LoadResult, SourceMapRegistry, SourceTransformer};
use crate::tsconfig::{LoadedTsconfig, TsconfigCache};
use crate::workspace::WorkspaceAliasTable;
use futures::executor::block_on;
use std::sync::Arc;
use tracing::debug;
use tshook_util::fs::{FileSystem, RealFs};

/// Module resolution and transform engine.
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) fs: Arc<dyn FileSystem>,
    pub(crate) transformer: Arc<dyn SourceTransformer>,
    pub(crate) tsconfig: Option<Arc<LoadedTsconfig>>,
    pub(crate) paths: Option<PathsMappingIndex>,
    pub(crate) workspace: Option<WorkspaceAliasTable>,
    pub(crate) manifests: ManifestCache,
    pub(crate) module_types: ModuleTypeCache,
    pub(crate) tsconfigs: TsconfigCache,
    pub(crate) source_maps: SourceMapRegistry,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("transformer", &self.transformer.name())
            .field("tsconfig", &self.tsconfig.as_ref().map(|t| &t.path))
            .field("paths", &self.paths.as_ref().map(PathsMappingIndex::len))
            .field("workspace", &self.workspace.as_ref().map(WorkspaceAliasTable::len))
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine over the real filesystem.
    ///
    /// Loads the root tsconfig (if configured) and discovers workspace
    /// packages under the configured root.
    pub fn new(config: EngineConfig, transformer: Arc<dyn SourceTransformer>) -> Result<Self, Error> {
        Self::with_fs(config, transformer, Arc::new(RealFs))
    }

    /// Create an engine over a custom filesystem.
    pub fn with_fs(
        config: EngineConfig,
        transformer: Arc<dyn SourceTransformer>,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self, Error> {
        let tsconfigs = TsconfigCache::new();
        let tsconfig = config
            .tsconfig
            .as_deref()
            .map(|path| tsconfigs.load(path, fs.as_ref()))
            .transpose()?;
        let paths = tsconfig.as_deref().and_then(PathsMappingIndex::from_tsconfig);
        let workspace = WorkspaceAliasTable::discover(&config.root, fs.as_ref())?;

        debug!(
            root = %config.root.display(),
            tsconfig = ?config.tsconfig,
            paths = paths.as_ref().map_or(0, PathsMappingIndex::len),
            workspace_packages = workspace.as_ref().map_or(0, WorkspaceAliasTable::len),
            transformer = transformer.name(),
            "engine created"
        );

        Ok(Self {
            config,
            fs,
            transformer,
            tsconfig,
            paths,
            workspace,
            manifests: ManifestCache::new(),
            module_types: ModuleTypeCache::new(),
            tsconfigs,
            source_maps: SourceMapRegistry::new(),
        })
    }

    /// Replace the discovered workspace alias table.
    #[must_use]
    pub fn with_workspace(mut self, workspace: Option<WorkspaceAliasTable>) -> Self {
        self.workspace = workspace;
        self
    }

    /// Replace the paths mapping derived from the root tsconfig.
    #[must_use]
    pub fn with_paths(mut self, paths: Option<PathsMappingIndex>) -> Self {
        self.paths = paths;
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn tsconfig(&self) -> Option<&LoadedTsconfig> {
        self.tsconfig.as_deref()
    }

    #[must_use]
    pub fn paths(&self) -> Option<&PathsMappingIndex> {
        self.paths.as_ref()
    }

    #[must_use]
    pub fn workspace(&self) -> Option<&WorkspaceAliasTable> {
        self.workspace.as_ref()
    }

    #[must_use]
    pub fn manifests(&self) -> &ManifestCache {
        &self.manifests
    }

    #[must_use]
    pub fn module_types(&self) -> &ModuleTypeCache {
        &self.module_types
    }

    #[must_use]
    pub fn source_maps(&self) -> &SourceMapRegistry {
        &self.source_maps
    }

    /// Resolve `specifier` on the calling thread.
    pub fn resolve_sync(
        &self,
        specifier: &str,
        ctx: &ResolveContext,
        host: &dyn HostResolver,
    ) -> Result<ResolvedModule, Error> {
        let io = Blocking::new(self.fs.as_ref(), host);
        let result = block_on(self.resolve_step(specifier, ctx, &io)).and_then(|o| o.into_result());
        log_resolution(specifier, ctx, &result);
        result
    }

    /// Resolve `specifier`, reading the filesystem off the async runtime.
    ///
    /// Must be awaited inside a tokio runtime.
    pub async fn resolve(
        &self,
        specifier: &str,
        ctx: &ResolveContext,
        host: &dyn AsyncHostResolver,
    ) -> Result<ResolvedModule, Error> {
        let io = Cooperative::new(Arc::clone(&self.fs), host);
        let result = self
            .resolve_step(specifier, ctx, &io)
            .await
            .and_then(|o| o.into_result());
        log_resolution(specifier, ctx, &result);
        result
    }

    /// Load and transform a resolved module on the calling thread.
    pub fn load_sync(&self, id: &ModuleId, ctx: &LoadContext, host: &dyn HostLoader) -> Result<LoadResult, Error> {
        let io = Blocking::new(self.fs.as_ref(), host);
        block_on(self.load_step(id, ctx, &io))
    }

    /// Load and transform a resolved module.
    ///
    /// Must be awaited inside a tokio runtime.
    pub async fn load(
        &self,
        id: &ModuleId,
        ctx: &LoadContext,
        host: &dyn AsyncHostLoader,
    ) -> Result<LoadResult, Error> {
        let io = Cooperative::new(Arc::clone(&self.fs), host);
        self.load_step(id, ctx, &io).await
    }
}

fn log_resolution(specifier: &str, ctx: &ResolveContext, result: &Result<ResolvedModule, Error>) {
    let importer = ctx.importer().map(|p| p.display().to_string());
    match result {
        Ok(resolved) => debug!(
            specifier,
            importer,
            id = %resolved.id,
            format = resolved.format.map(|f| f.as_str()),
            "resolved"
        ),
        Err(err) => debug!(specifier, importer, code = err.code(), error = %err, "resolution failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{FsHost, FsLoader};
    use crate::resolver::ModuleFormat;
    use crate::testing::CountingFs;
    use crate::transform::{PassthroughTransformer, TransformError, TransformOptions, TransformOutput};
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::{tempdir, TempDir};

    fn write(root: &Path, rel: &str, contents: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    fn engine(root: &Path) -> Engine {
        Engine::new(EngineConfig::new(root.to_path_buf()), Arc::new(PassthroughTransformer)).unwrap()
    }

    fn resolve(engine: &Engine, spec: &str, importer: &Path) -> Result<ResolvedModule, Error> {
        engine.resolve_sync(spec, &ResolveContext::import(Some(importer.to_path_buf())), &FsHost::new())
    }

    fn resolved_path(engine: &Engine, spec: &str, importer: &Path) -> PathBuf {
        resolve(engine, spec, importer).unwrap().path().unwrap().to_path_buf()
    }

    /// A monorepo with one workspace package and a tsconfig paths mapping.
    fn monorepo() -> TempDir {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "pnpm-workspace.yaml", "packages:\n  - 'packages/*'\n");
        write(
            root,
            "packages/utils/package.json",
            r#"{"name":"utils","type":"module","exports":{".":"./src/index.ts","./fmt":"./src/fmt.ts"}}"#,
        );
        write(root, "packages/utils/src/index.ts", "export const a = 1;");
        write(root, "packages/utils/src/fmt.ts", "export const f = 1;");
        write(root, "packages/broken/package.json", "{ not json");
        write(
            root,
            "tsconfig.json",
            r#"{ "compilerOptions": { "baseUrl": ".", "paths": { "@app/*": ["app/*"] } } }"#,
        );
        write(root, "app/util.ts", "export {};");
        write(root, "app/main.ts", "import './util.js';");
        write(root, "node_modules/lodash/package.json", r#"{"main":"lodash.js"}"#);
        write(root, "node_modules/lodash/lodash.js", "module.exports = {};");
        dir
    }

    fn monorepo_engine(root: &Path) -> Engine {
        let config = EngineConfig::new(root.to_path_buf()).with_tsconfig(root.join("tsconfig.json"));
        Engine::new(config, Arc::new(PassthroughTransformer)).unwrap()
    }

    #[test]
    fn test_typed_counterpart_preferred() {
        let dir = tempdir().unwrap();
        let js = write(dir.path(), "src/a.js", "");
        let ts = write(dir.path(), "src/a.ts", "");
        let importer = dir.path().join("src/index.ts");
        let engine = engine(dir.path());

        assert_eq!(resolved_path(&engine, "./a", &importer), ts);
        assert_eq!(resolved_path(&engine, "./a.js", &importer), ts);
        // Plain-script importers keep the script
        assert_eq!(resolved_path(&engine, "./a.js", &dir.path().join("src/index.js")), js);
    }

    #[test]
    fn test_extension_fallback_order() {
        let dir = tempdir().unwrap();
        let jsx = write(dir.path(), "foo.jsx", "");
        let importer = dir.path().join("index.js");
        let engine = engine(dir.path());
        assert_eq!(resolved_path(&engine, "./foo", &importer), jsx);

        let json = write(dir.path(), "bar.json", "{}");
        write(dir.path(), "bar.ts", "");
        assert_eq!(resolved_path(&engine, "./bar", &importer), json);
    }

    #[test]
    fn test_directory_index() {
        let dir = tempdir().unwrap();
        let index = write(dir.path(), "dir/index.ts", "");
        let importer = dir.path().join("index.ts");
        let engine = engine(dir.path());

        assert_eq!(resolved_path(&engine, "./dir", &importer), index);
        assert_eq!(resolved_path(&engine, "./dir/", &importer), index);
    }

    #[test]
    fn test_not_found_reports_original_specifier() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        let err = resolve(&engine, "./missing", &dir.path().join("index.ts")).unwrap_err();
        match err {
            Error::ModuleNotFound { specifier, .. } => assert_eq!(specifier, "./missing"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_module_type_detection_is_cached() {
        let dir = tempdir().unwrap();
        let fs = Arc::new(CountingFs::new());
        let cjs = write(dir.path(), "plain/a.js", "");
        let manifest = write(dir.path(), "esm/package.json", r#"{"type":"module"}"#);
        write(dir.path(), "esm/a.js", "");
        write(dir.path(), "esm/b.js", "");

        let engine = Engine::with_fs(
            EngineConfig::new(dir.path().to_path_buf()),
            Arc::new(PassthroughTransformer),
            fs.clone(),
        )
        .unwrap();

        let resolved = resolve(&engine, "./a.js", &cjs).unwrap();
        assert_eq!(resolved.format, Some(ModuleFormat::CommonJs));

        let importer = dir.path().join("esm/index.js");
        assert_eq!(resolve(&engine, "./a.js", &importer).unwrap().format, Some(ModuleFormat::Module));
        assert_eq!(resolve(&engine, "./b.js", &importer).unwrap().format, Some(ModuleFormat::Module));
        assert_eq!(fs.reads_of(&manifest), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_resolutions_read_manifest_once() {
        let dir = tempdir().unwrap();
        let fs = Arc::new(CountingFs::new());
        let manifest = write(dir.path(), "pkg/package.json", r#"{"type":"module"}"#);
        write(dir.path(), "pkg/src/a.js", "");
        write(dir.path(), "pkg/src/b.js", "");

        let engine = Engine::with_fs(
            EngineConfig::new(dir.path().to_path_buf()),
            Arc::new(PassthroughTransformer),
            fs.clone(),
        )
        .unwrap();
        let host = FsHost::new();
        let ctx = ResolveContext::import(Some(dir.path().join("pkg/src/index.js")));

        let (a, b) = tokio::join!(
            engine.resolve("./a.js", &ctx, &host),
            engine.resolve("./b.js", &ctx, &host)
        );
        assert_eq!(a.unwrap().format, Some(ModuleFormat::Module));
        assert_eq!(b.unwrap().format, Some(ModuleFormat::Module));
        assert_eq!(fs.reads_of(&manifest), 1);
    }

    #[test]
    fn test_workspace_alias() {
        let dir = monorepo();
        let engine = monorepo_engine(dir.path());
        let importer = dir.path().join("app/main.ts");

        let first = resolve(&engine, "@t/utils", &importer).unwrap();
        assert_eq!(first.path(), Some(dir.path().join("packages/utils/src/index.ts").as_path()));
        assert!(first.short_circuit);
        assert_eq!(first.format, Some(ModuleFormat::Module));
        assert_eq!(resolve(&engine, "@t/utils", &importer).unwrap(), first);

        assert_eq!(
            resolved_path(&engine, "@t/utils/fmt", &importer),
            dir.path().join("packages/utils/src/fmt.ts")
        );
        assert!(matches!(
            resolve(&engine, "@t/utils/internal", &importer),
            Err(Error::ExportNotDefined { .. })
        ));
        assert!(matches!(
            resolve(&engine, "@t/nope", &importer),
            Err(Error::AliasResolution { .. })
        ));
        assert!(matches!(
            resolve(&engine, "@t/broken", &importer),
            Err(Error::ManifestParse { .. })
        ));
    }

    #[test]
    fn test_paths_mapping() {
        let dir = monorepo();
        let engine = monorepo_engine(dir.path());
        let importer = dir.path().join("app/main.ts");

        assert_eq!(resolved_path(&engine, "@app/util", &importer), dir.path().join("app/util.ts"));
        // baseUrl candidate misses, the host finds the dependency
        assert_eq!(
            resolved_path(&engine, "lodash", &importer),
            dir.path().join("node_modules/lodash/lodash.js")
        );
        assert_eq!(
            resolve(&engine, "node:fs", &importer).unwrap().id,
            ModuleId::Url("node:fs".to_string())
        );
    }

    #[test]
    fn test_tilde_alias() {
        let dir = monorepo();
        let engine = monorepo_engine(dir.path());
        let importer = dir.path().join("packages/utils/src/index.ts");

        assert_eq!(resolved_path(&engine, "~/app/util", &importer), dir.path().join("app/util.ts"));
        assert!(matches!(
            resolve(&engine, "~app", &importer),
            Err(Error::AliasResolution { .. })
        ));
    }

    #[test]
    fn test_glob_resolves_and_loads() {
        let dir = tempdir().unwrap();
        write(dir.path(), "routes/a.ts", "");
        write(dir.path(), "routes/b.ts", "");
        write(dir.path(), "routes/c.css", "");
        let importer = dir.path().join("index.ts");
        let engine = engine(dir.path());

        let resolved = resolve(&engine, "./routes/*.ts", &importer).unwrap();
        assert!(matches!(resolved.id, ModuleId::Virtual(_)));
        assert!(resolved.short_circuit);

        let loaded = engine
            .load_sync(&resolved.id, &LoadContext::import(), &FsLoader::new())
            .unwrap();
        let source = loaded.source.unwrap();
        assert_eq!(loaded.format, Some(ModuleFormat::Module));
        assert!(source.contains("\"./routes/a.ts\""));
        assert!(source.contains("\"./routes/b.ts\""));
        assert!(!source.contains("c.css"));
    }

    #[tokio::test]
    async fn test_sync_and_async_agree() {
        let dir = monorepo();
        write(dir.path(), "app/lib/index.ts", "");
        let engine = monorepo_engine(dir.path());
        let host = FsHost::new();
        let ctx = ResolveContext::import(Some(dir.path().join("app/main.ts")));

        for spec in [
            "./util",
            "./util.js",
            "./lib",
            "./missing",
            "@app/util",
            "@t/utils",
            "@t/utils/internal",
            "@t/nope",
            "@t/broken",
            "~/app/util.ts",
            "lodash",
            "node:fs",
        ] {
            let sync = engine.resolve_sync(spec, &ctx, &host).map_err(|e| e.code());
            let asynchronous = engine.resolve(spec, &ctx, &host).await.map_err(|e| e.code());
            assert_eq!(sync, asynchronous, "{spec}");
        }
    }

    #[test]
    fn test_load_pipeline() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        let loader = FsLoader::new();
        let load = |rel: &str, ctx: LoadContext| {
            engine
                .load_sync(&ModuleId::File(dir.path().join(rel)), &ctx, &loader)
                .unwrap()
        };

        write(dir.path(), "a.ts", "export const a = 1;");
        let loaded = load("a.ts", LoadContext::import());
        assert_eq!(loaded.format, Some(ModuleFormat::Module));
        assert_eq!(loaded.source.as_deref(), Some("export const a = 1;"));

        write(dir.path(), "data.json", r#"{"k": true}"#);
        let loaded = load("data.json", LoadContext::import());
        assert_eq!(loaded.format, Some(ModuleFormat::Module));
        assert_eq!(loaded.source.as_deref(), Some("export default {\"k\":true};\n"));
        let loaded = load("data.json", LoadContext::require());
        assert_eq!(loaded.format, Some(ModuleFormat::Json));

        write(dir.path(), "bin/tool", "#!/usr/bin/env node\n");
        let loaded = load("bin/tool", LoadContext::import());
        assert_eq!(loaded.format, Some(ModuleFormat::CommonJs));
        assert!(loaded.short_circuit);

        write(dir.path(), "lazy.cjs", "const m = import('./m.mjs');\n");
        let loaded = load("lazy.cjs", LoadContext::require());
        let source = loaded.source.unwrap();
        assert!(source.starts_with("const m = import('./m.mjs').then("));
        assert!(source.contains("//# sourceMappingURL=data:application/json;base64,"));
        assert!(engine.source_maps().get(&dir.path().join("lazy.cjs")).is_some());

        write(dir.path(), "plain.cjs", "module.exports = 1;\n");
        let loaded = load("plain.cjs", LoadContext::require());
        assert_eq!(loaded.source.as_deref(), Some("module.exports = 1;\n"));
    }

    #[test]
    fn test_module_scoped_js_gets_dynamic_rewrite() {
        let dir = tempdir().unwrap();
        write(dir.path(), "package.json", r#"{"type":"module"}"#);
        let lazy = write(dir.path(), "src/lazy.js", "const m = import('./m.js');\n");
        write(dir.path(), "legacy/package.json", r#"{"type":"commonjs"}"#);
        let old = write(dir.path(), "legacy/old.js", "const m = import('./m.js');\n");
        let engine = engine(dir.path());
        let loader = FsLoader::new();

        let loaded = engine
            .load_sync(&ModuleId::File(lazy.clone()), &LoadContext::import(), &loader)
            .unwrap();
        assert_eq!(loaded.format, Some(ModuleFormat::Module));
        assert!(loaded.source.unwrap().starts_with("const m = import('./m.js').then("));
        assert!(engine.source_maps().get(&lazy).is_some());

        let loaded = engine
            .load_sync(&ModuleId::File(old), &LoadContext::import(), &loader)
            .unwrap();
        assert_eq!(loaded.format, Some(ModuleFormat::CommonJs));
        assert_eq!(loaded.source.as_deref(), Some("const m = import('./m.js');\n"));
    }

    #[derive(Debug)]
    struct FailingTransformer;

    impl SourceTransformer for FailingTransformer {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn transform(&self, _: &str, _: &Path, _: &TransformOptions) -> Result<TransformOutput, TransformError> {
            Err(TransformError::parse_error("unsupported syntax"))
        }
    }

    #[test]
    fn test_dependency_conversion_is_best_effort() {
        let dir = tempdir().unwrap();
        write(dir.path(), "node_modules/esm-only/package.json", r#"{"type":"module"}"#);
        let file = write(dir.path(), "node_modules/esm-only/index.js", "export default 1;");
        let first_party = write(dir.path(), "src/a.ts", "export {};");

        let engine = Engine::new(EngineConfig::new(dir.path().to_path_buf()), Arc::new(FailingTransformer)).unwrap();
        let loader = FsLoader::new();

        let loaded = engine
            .load_sync(&ModuleId::File(file), &LoadContext::require(), &loader)
            .unwrap();
        assert_eq!(loaded.source.as_deref(), Some("export default 1;"));

        let err = engine
            .load_sync(&ModuleId::File(first_party), &LoadContext::import(), &loader)
            .unwrap_err();
        assert_eq!(err.code(), "ERR_TRANSFORM");
    }
}
