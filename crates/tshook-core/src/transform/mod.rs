//! Source transformation.
//!
//! The engine decides *which* transform a loaded module needs; the actual
//! compilation is delegated to a [`SourceTransformer`] supplied by the
//! embedder. [`PassthroughTransformer`] is the built-in transformer: it wraps
//! JSON as a module and otherwise returns source unchanged.

mod dynamic_import;
mod pipeline;
mod sourcemap;

pub use dynamic_import::{rewrite_dynamic_imports, ESM_INTEROP_SUFFIX};
pub use pipeline::{LoadContext, LoadResult};
pub use sourcemap::{inline_source_map_comment, relocate_source_map, SourceMapRegistry};

use crate::resolver::LoaderKind;
use crate::tsconfig::CompilerOptions;
use std::fmt;
use std::path::Path;
use tshook_util::path::extname;

/// Error during transformation.
#[derive(Debug)]
pub struct TransformError {
    /// Error code.
    pub code: &'static str,
    /// Human-readable error message.
    pub message: String,
}

impl TransformError {
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create a parse error.
    #[must_use]
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new("TRANSFORM_PARSE_ERROR", message)
    }

    /// Create an unsupported file type error.
    #[must_use]
    pub fn unsupported_file(message: impl Into<String>) -> Self {
        Self::new("TRANSFORM_UNSUPPORTED_FILE", message)
    }
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for TransformError {}

/// Options for one transformation.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOptions {
    /// Module system the output must use.
    pub target: LoaderKind,
    /// Options from the tsconfig governing the file.
    pub compiler_options: Option<CompilerOptions>,
    /// Whether to produce a source map.
    pub source_map: bool,
}

impl TransformOptions {
    #[must_use]
    pub fn new(target: LoaderKind) -> Self {
        Self {
            target,
            compiler_options: None,
            source_map: true,
        }
    }

    #[must_use]
    pub fn with_compiler_options(mut self, options: Option<CompilerOptions>) -> Self {
        self.compiler_options = options;
        self
    }
}

/// Output of a transformation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOutput {
    pub code: String,
    /// Source map JSON, if one was produced.
    pub map: Option<String>,
}

impl TransformOutput {
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            map: None,
        }
    }

    #[must_use]
    pub fn with_map(mut self, map: impl Into<String>) -> Self {
        self.map = Some(map.into());
        self
    }
}

/// Compiles typed, JSX, or foreign-module-system source into something the
/// host can evaluate.
///
/// The trait is `Send + Sync` so one transformer serves concurrent loads.
pub trait SourceTransformer: Send + Sync {
    /// Transformer name, for logs.
    fn name(&self) -> &'static str;

    /// Transform `source` read from `path`.
    ///
    /// # Errors
    ///
    /// Returns a `TransformError` if the source has syntax errors or the
    /// file type is unsupported.
    fn transform(
        &self,
        source: &str,
        path: &Path,
        options: &TransformOptions,
    ) -> Result<TransformOutput, TransformError>;
}

/// Wraps JSON documents as modules; returns everything else unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughTransformer;

impl SourceTransformer for PassthroughTransformer {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn transform(
        &self,
        source: &str,
        path: &Path,
        options: &TransformOptions,
    ) -> Result<TransformOutput, TransformError> {
        if extname(&path.to_string_lossy()) != ".json" {
            return Ok(TransformOutput::new(source));
        }

        let value: serde_json::Value = serde_json::from_str(source)
            .map_err(|e| TransformError::parse_error(format!("{}: {e}", path.display())))?;
        let code = match options.target {
            LoaderKind::Module => format!("export default {value};\n"),
            LoaderKind::CommonJs => format!("module.exports = {value};\n"),
        };
        Ok(TransformOutput::new(code))
    }
}
