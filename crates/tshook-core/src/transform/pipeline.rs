//! The load pipeline: which transform a module gets.

use super::{rewrite_dynamic_imports, TransformOptions};
use crate::driver::LoadIo;
use crate::engine::Engine;
use crate::error::Error;
use crate::host::LoadedSource;
use crate::resolver::{detect_format, LoaderKind, ModuleFormat, ModuleId, VirtualGlobModule};
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use tracing::{debug, trace};
use tshook_util::path::{extname, is_inside_dependency_dir};

/// Typed or JSX sources, always compiled on the module loader path.
const TYPED_SOURCE_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".mts", ".cts", ".jsx"];

/// Per-call load context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadContext {
    pub kind: LoaderKind,
    /// Format reported by resolution, if any.
    pub format: Option<ModuleFormat>,
    pub import_attributes: BTreeMap<String, String>,
}

impl LoadContext {
    #[must_use]
    pub fn new(kind: LoaderKind) -> Self {
        Self {
            kind,
            format: None,
            import_attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn require() -> Self {
        Self::new(LoaderKind::CommonJs)
    }

    #[must_use]
    pub fn import() -> Self {
        Self::new(LoaderKind::Module)
    }

    #[must_use]
    pub fn with_format(mut self, format: Option<ModuleFormat>) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.import_attributes.insert(key.into(), value.into());
        self
    }

    /// Whether the import carries `with { type: "json" }`.
    #[must_use]
    pub fn json_attribute(&self) -> bool {
        self.import_attributes.get("type").is_some_and(|t| t == "json")
    }
}

/// Outcome of a load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadResult {
    pub format: Option<ModuleFormat>,
    /// `None` for modules without source text (builtins).
    pub source: Option<String>,
    /// The host must not run further load hooks for this result.
    pub short_circuit: bool,
}

impl LoadResult {
    fn new(format: ModuleFormat, source: String) -> Self {
        Self {
            format: Some(format),
            source: Some(source),
            short_circuit: false,
        }
    }

    fn short_circuit(mut self) -> Self {
        self.short_circuit = true;
        self
    }
}

impl From<LoadedSource> for LoadResult {
    fn from(loaded: LoadedSource) -> Self {
        Self {
            format: loaded.format,
            source: loaded.source,
            short_circuit: false,
        }
    }
}

impl Engine {
    pub(crate) async fn load_step<I: LoadIo + ?Sized>(
        &self,
        id: &ModuleId,
        ctx: &LoadContext,
        io: &I,
    ) -> Result<LoadResult, Error> {
        let path = match id {
            ModuleId::Virtual(module) => return self.load_virtual(module, ctx),
            ModuleId::Url(_) => return io.host_load(id, ctx).await.map(LoadResult::from),
            ModuleId::File(path) => path,
        };

        let path_str = path.to_string_lossy();
        let ext = extname(&path_str);
        trace!(path = %path.display(), kind = ctx.kind.as_str(), "load");

        if ext == ".css" {
            return io.host_load(id, ctx).await.map(LoadResult::from);
        }

        if ext.is_empty() && ctx.kind == LoaderKind::Module {
            let source = io.read_to_string(path).await.map_err(|e| read_error(path, e))?;
            return Ok(LoadResult::new(ModuleFormat::CommonJs, source).short_circuit());
        }

        if is_inside_dependency_dir(path) {
            return self.load_dependency(id, path, ctx, io).await;
        }

        match ctx.kind {
            LoaderKind::CommonJs => self.load_commonjs(id, path, ext, ctx, io).await,
            LoaderKind::Module => self.load_module(id, path, ext, ctx, io).await,
        }
    }

    fn load_virtual(&self, module: &VirtualGlobModule, ctx: &LoadContext) -> Result<LoadResult, Error> {
        let module = VirtualGlobModule {
            kind: ctx.kind,
            ..module.clone()
        };
        let format = match ctx.kind {
            LoaderKind::CommonJs => ModuleFormat::CommonJs,
            LoaderKind::Module => ModuleFormat::Module,
        };
        Ok(LoadResult::new(format, module.render()?).short_circuit())
    }

    /// Dependencies load as-is, except module-format files required from
    /// commonjs, which get a best-effort conversion.
    async fn load_dependency<I: LoadIo + ?Sized>(
        &self,
        id: &ModuleId,
        path: &Path,
        ctx: &LoadContext,
        io: &I,
    ) -> Result<LoadResult, Error> {
        let mut loaded = LoadResult::from(io.host_load(id, ctx).await?);
        if ctx.kind != LoaderKind::CommonJs {
            return Ok(loaded);
        }
        let Some(source) = loaded.source.as_deref() else {
            return Ok(loaded);
        };

        match detect_format(path, &self.manifests, &self.module_types, io).await {
            Ok(Some(ModuleFormat::Module)) => {}
            Ok(_) => return Ok(loaded),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "format detection failed, loading as-is");
                return Ok(loaded);
            }
        }

        let options = TransformOptions::new(LoaderKind::CommonJs);
        match self
            .transformer
            .transform(source, path, &options)
            .map_err(Error::from)
            .and_then(|output| self.source_maps.attach(path, output).map_err(Error::from))
        {
            Ok(code) => {
                debug!(path = %path.display(), "dependency converted to commonjs");
                loaded.source = Some(code);
                loaded.format = Some(ModuleFormat::CommonJs);
            }
            Err(err) => debug!(path = %path.display(), error = %err, "dependency conversion failed, loading as-is"),
        }
        Ok(loaded)
    }

    async fn load_commonjs<I: LoadIo + ?Sized>(
        &self,
        id: &ModuleId,
        path: &Path,
        ext: &str,
        ctx: &LoadContext,
        io: &I,
    ) -> Result<LoadResult, Error> {
        let loaded = io.host_load(id, ctx).await?;
        let Some(source) = loaded.source.as_deref() else {
            return Ok(loaded.into());
        };

        match ext {
            ".json" => Ok(loaded.into()),
            ".cjs" => match rewrite_dynamic_imports(source) {
                Some(output) => {
                    let code = self.source_maps.attach(path, output)?;
                    Ok(LoadResult::new(ModuleFormat::CommonJs, code))
                }
                None => Ok(loaded.into()),
            },
            _ => {
                let code = self.compile(source, path, LoaderKind::CommonJs)?;
                Ok(LoadResult::new(ModuleFormat::CommonJs, code))
            }
        }
    }

    async fn load_module<I: LoadIo + ?Sized>(
        &self,
        id: &ModuleId,
        path: &Path,
        ext: &str,
        ctx: &LoadContext,
        io: &I,
    ) -> Result<LoadResult, Error> {
        let forced;
        let ctx = if ext == ".json" && !ctx.json_attribute() {
            forced = ctx.clone().with_attribute("type", "json");
            &forced
        } else {
            ctx
        };

        let loaded = io.host_load(id, ctx).await?;
        let Some(source) = loaded.source.as_deref() else {
            return Ok(loaded.into());
        };

        if loaded.format == Some(ModuleFormat::Json) || TYPED_SOURCE_EXTENSIONS.contains(&ext) {
            let code = self.compile(source, path, LoaderKind::Module)?;
            return Ok(LoadResult::new(ModuleFormat::Module, code));
        }

        // Hosts may leave `.js` unclassified; the package scope decides.
        let format = match loaded.format.or(ctx.format) {
            Some(format) => Some(format),
            None => detect_format(path, &self.manifests, &self.module_types, io).await?,
        };
        if format == Some(ModuleFormat::Module) {
            if let Some(output) = rewrite_dynamic_imports(source) {
                let code = self.source_maps.attach(path, output)?;
                return Ok(LoadResult::new(ModuleFormat::Module, code));
            }
        }
        Ok(LoadResult {
            format,
            source: loaded.source,
            short_circuit: false,
        })
    }

    /// Run the transformer with the compiler options governing `path`.
    fn compile(&self, source: &str, path: &Path, target: LoaderKind) -> Result<String, Error> {
        let compiler_options =
            self.tsconfigs
                .compiler_options_for(path, self.tsconfig.as_deref(), self.fs.as_ref())?;
        let options = TransformOptions::new(target).with_compiler_options(compiler_options);
        let output = self.transformer.transform(source, path, &options)?;
        debug!(
            path = %path.display(),
            transformer = self.transformer.name(),
            target = target.as_str(),
            "transformed"
        );
        Ok(self.source_maps.attach(path, output)?)
    }
}

fn read_error(path: &Path, source: io::Error) -> Error {
    if source.kind() == io::ErrorKind::NotFound {
        Error::not_found(path.to_string_lossy(), None)
    } else {
        Error::Read {
            path: path.to_path_buf(),
            source,
        }
    }
}
