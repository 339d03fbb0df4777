//! Integration tests: the engine layered over an embedder-supplied host.

use futures::future::{self, BoxFuture, FutureExt};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;
use tshook_core::{
    AsyncHostResolver, Engine, EngineConfig, Error, FsHost, HostResolver, ModuleFormat, ModuleId,
    PassthroughTransformer, ResolveContext, ResolvedModule,
};

/// Wraps `FsHost` and records every specifier it is asked about.
#[derive(Default)]
struct RecordingHost {
    inner: FsHost,
    calls: Mutex<Vec<String>>,
}

impl RecordingHost {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl HostResolver for RecordingHost {
    fn resolve(&self, specifier: &str, ctx: &ResolveContext) -> Result<ResolvedModule, Error> {
        self.calls.lock().unwrap().push(specifier.to_string());
        HostResolver::resolve(&self.inner, specifier, ctx)
    }
}

impl AsyncHostResolver for RecordingHost {
    fn resolve<'a>(
        &'a self,
        specifier: &'a str,
        ctx: &'a ResolveContext,
    ) -> BoxFuture<'a, Result<ResolvedModule, Error>> {
        future::ready(HostResolver::resolve(self, specifier, ctx)).boxed()
    }
}

fn write(root: &Path, rel: &str, contents: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
    path
}

fn engine(root: &Path) -> Engine {
    Engine::new(EngineConfig::new(root.to_path_buf()), Arc::new(PassthroughTransformer)).unwrap()
}

#[test]
fn test_bare_specifier_matches_host() {
    let dir = tempdir().unwrap();
    write(dir.path(), "node_modules/dep/package.json", r#"{"main":"main.js"}"#);
    let main = write(dir.path(), "node_modules/dep/main.js", "");
    let importer = dir.path().join("src/index.ts");
    let ctx = ResolveContext::require(Some(importer));

    let engine = engine(dir.path());
    let host = RecordingHost::default();
    let via_engine = engine.resolve_sync("dep", &ctx, &host).unwrap();
    let via_host = HostResolver::resolve(&FsHost::new(), "dep", &ctx).unwrap();

    assert_eq!(via_engine.id, via_host.id);
    assert_eq!(via_engine.path(), Some(main.as_path()));
    assert_eq!(via_engine.format, Some(ModuleFormat::CommonJs));
    assert_eq!(host.calls(), vec!["dep".to_string()]);
}

#[test]
fn test_dependency_paths_bypass_fallbacks() {
    let dir = tempdir().unwrap();
    write(dir.path(), "node_modules/dep/lib/a.js", "");
    let importer = dir.path().join("src/index.ts");
    let ctx = ResolveContext::import(Some(importer));

    let engine = engine(dir.path());
    let host = RecordingHost::default();
    let spec = format!("{}/node_modules/dep/lib/a", dir.path().display());
    let err = engine.resolve_sync(&spec, &ctx, &host).unwrap_err();

    assert!(matches!(err, Error::ModuleNotFound { .. }));
    // One host call: no extension probing inside dependencies
    assert_eq!(host.calls(), vec![spec]);
}

#[test]
fn test_extension_probes_go_through_host() {
    let dir = tempdir().unwrap();
    let target = write(dir.path(), "src/util.jsx", "");
    let ctx = ResolveContext::require(Some(dir.path().join("src/index.js")));

    let engine = engine(dir.path());
    let host = RecordingHost::default();
    let resolved = engine.resolve_sync("./util", &ctx, &host).unwrap();

    assert_eq!(resolved.id, ModuleId::File(target));
    assert_eq!(
        host.calls(),
        ["./util", "./util.js", "./util.json", "./util.ts", "./util.tsx", "./util.jsx"]
    );
}

#[tokio::test]
async fn test_async_host_sees_same_requests() {
    let dir = tempdir().unwrap();
    write(dir.path(), "src/a.ts", "");
    write(dir.path(), "src/dir/index.tsx", "");
    let ctx = ResolveContext::import(Some(dir.path().join("src/index.ts")));
    let engine = engine(dir.path());

    for spec in ["./a.js", "./dir", "./missing"] {
        let sync_host = RecordingHost::default();
        let async_host = RecordingHost::default();
        let sync = engine.resolve_sync(spec, &ctx, &sync_host).map_err(|e| e.code());
        let asynchronous = engine.resolve(spec, &ctx, &async_host).await.map_err(|e| e.code());

        assert_eq!(sync, asynchronous, "{spec}");
        assert_eq!(sync_host.calls(), async_host.calls(), "{spec}");
    }
}

#[test]
fn test_paths_targets_tried_in_order() {
    let dir = tempdir().unwrap();
    let tsconfig = write(
        dir.path(),
        "tsconfig.json",
        r#"{ "compilerOptions": { "paths": { "@lib/*": ["a/*", "b/*"] } } }"#,
    );
    let second = write(dir.path(), "b/x.ts", "");
    let ctx = ResolveContext::import(Some(dir.path().join("src/index.ts")));
    let config = EngineConfig::new(dir.path().to_path_buf()).with_tsconfig(tsconfig);
    let engine = Engine::new(config, Arc::new(PassthroughTransformer)).unwrap();

    let resolved = engine.resolve_sync("@lib/x", &ctx, &RecordingHost::default()).unwrap();
    assert_eq!(resolved.id, ModuleId::File(second));

    let first = write(dir.path(), "a/x.ts", "");
    let host = RecordingHost::default();
    let resolved = engine.resolve_sync("@lib/x", &ctx, &host).unwrap();
    assert_eq!(resolved.id, ModuleId::File(first));

    let b_prefix = format!("{}/b/", dir.path().display());
    let calls = host.calls();
    assert!(!calls.is_empty());
    assert!(calls.iter().all(|call| !call.starts_with(&b_prefix)), "{calls:?}");
}
