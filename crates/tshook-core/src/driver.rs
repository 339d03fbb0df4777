//! Suspension points for the resolution and load algorithms.
//!
//! The algorithms are written once, as boxed futures over a driver. The
//! blocking driver answers every request immediately, so polling its futures
//! with `block_on` never parks; the cooperative driver moves filesystem reads
//! onto tokio's blocking pool and awaits the asynchronous host. Both see the
//! same sequence of requests, which is what keeps the two contracts in
//! agreement.

use crate::host::{AsyncHostLoader, AsyncHostResolver, HostLoader, HostResolver, LoadedSource};
use crate::resolver::{ModuleId, ResolveContext, ResolvedModule};
use crate::transform::LoadContext;
use crate::Error;
use futures::future::{self, BoxFuture, FutureExt};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tshook_util::fs::FileSystem;

/// Filesystem reads that may suspend.
pub(crate) trait Io: Send + Sync {
    fn read_to_string<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<String>>;
}

/// Delegation to the host's resolver.
pub(crate) trait ResolveIo: Io {
    fn host_resolve<'a>(
        &'a self,
        specifier: &'a str,
        ctx: &'a ResolveContext,
    ) -> BoxFuture<'a, Result<ResolvedModule, Error>>;
}

/// Delegation to the host's loader.
pub(crate) trait LoadIo: Io {
    fn host_load<'a>(
        &'a self,
        id: &'a ModuleId,
        ctx: &'a LoadContext,
    ) -> BoxFuture<'a, Result<LoadedSource, Error>>;
}

/// Placeholder host for drivers that only read.
#[derive(Debug)]
pub(crate) struct NoHost;

/// Answers every request synchronously.
pub(crate) struct Blocking<'a, H: ?Sized = NoHost> {
    fs: &'a dyn FileSystem,
    host: &'a H,
}

impl<'a, H: ?Sized> Blocking<'a, H> {
    pub(crate) fn new(fs: &'a dyn FileSystem, host: &'a H) -> Self {
        Self { fs, host }
    }
}

#[cfg(test)]
impl<'a> Blocking<'a, NoHost> {
    pub(crate) fn reads_only(fs: &'a dyn FileSystem) -> Self {
        Self { fs, host: &NoHost }
    }
}

impl<H: ?Sized + Sync> Io for Blocking<'_, H> {
    fn read_to_string<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<String>> {
        future::ready(self.fs.read_to_string(path)).boxed()
    }
}

impl<H: HostResolver + ?Sized> ResolveIo for Blocking<'_, H> {
    fn host_resolve<'a>(
        &'a self,
        specifier: &'a str,
        ctx: &'a ResolveContext,
    ) -> BoxFuture<'a, Result<ResolvedModule, Error>> {
        future::ready(self.host.resolve(specifier, ctx)).boxed()
    }
}

impl<H: HostLoader + ?Sized> LoadIo for Blocking<'_, H> {
    fn host_load<'a>(
        &'a self,
        id: &'a ModuleId,
        ctx: &'a LoadContext,
    ) -> BoxFuture<'a, Result<LoadedSource, Error>> {
        future::ready(self.host.load(id, ctx)).boxed()
    }
}

/// Reads on tokio's blocking pool; awaits the asynchronous host.
///
/// Must be polled inside a tokio runtime.
pub(crate) struct Cooperative<'a, H: ?Sized> {
    fs: Arc<dyn FileSystem>,
    host: &'a H,
}

impl<'a, H: ?Sized> Cooperative<'a, H> {
    pub(crate) fn new(fs: Arc<dyn FileSystem>, host: &'a H) -> Self {
        Self { fs, host }
    }
}

impl<H: ?Sized + Sync> Io for Cooperative<'_, H> {
    fn read_to_string<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<String>> {
        let fs = Arc::clone(&self.fs);
        let path = path.to_path_buf();
        async move {
            tokio::task::spawn_blocking(move || fs.read_to_string(&path))
                .await
                .map_err(io::Error::other)?
        }
        .boxed()
    }
}

impl<H: AsyncHostResolver + ?Sized> ResolveIo for Cooperative<'_, H> {
    fn host_resolve<'a>(
        &'a self,
        specifier: &'a str,
        ctx: &'a ResolveContext,
    ) -> BoxFuture<'a, Result<ResolvedModule, Error>> {
        self.host.resolve(specifier, ctx)
    }
}

impl<H: AsyncHostLoader + ?Sized> LoadIo for Cooperative<'_, H> {
    fn host_load<'a>(
        &'a self,
        id: &'a ModuleId,
        ctx: &'a LoadContext,
    ) -> BoxFuture<'a, Result<LoadedSource, Error>> {
        self.host.load(id, ctx)
    }
}
