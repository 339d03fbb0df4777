#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod config;
mod driver;
pub mod engine;
pub mod error;
pub mod host;
pub mod paths;
pub mod resolver;
pub mod transform;
pub mod tsconfig;
pub mod version;
pub mod workspace;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::Error;
pub use host::{
    AsyncHostLoader, AsyncHostResolver, FsHost, FsLoader, HostLoader, HostResolver, LoadedSource,
};
pub use resolver::{
    classify, LoaderKind, ModuleFormat, ModuleId, ResolveContext, ResolvedModule, SpecifierKind,
    VirtualGlobModule,
};
pub use transform::{
    LoadContext, LoadResult, PassthroughTransformer, SourceTransformer, TransformError,
    TransformOptions, TransformOutput,
};
pub use tsconfig::{CompilerOptions, LoadedTsconfig};
pub use version::VERSION;
pub use workspace::WorkspaceAliasTable;
