use crate::transform::TransformError;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Stable error codes, mirroring the host runtime's error codes where one exists.
pub mod codes {
    pub const ALIAS_RESOLUTION: &str = "ERR_ALIAS_RESOLUTION";
    pub const EXPORT_NOT_DEFINED: &str = "ERR_PACKAGE_PATH_NOT_EXPORTED";
    pub const MODULE_NOT_FOUND: &str = "ERR_MODULE_NOT_FOUND";
    pub const UNSUPPORTED_DIR_IMPORT: &str = "ERR_UNSUPPORTED_DIR_IMPORT";
    pub const MANIFEST_PARSE: &str = "ERR_MANIFEST_PARSE";
    pub const CONFIG_PARSE: &str = "ERR_CONFIG_PARSE";
    pub const READ: &str = "ERR_READ";
    pub const TRANSFORM: &str = "ERR_TRANSFORM";
    pub const HOST: &str = "ERR_HOST";
}

/// Core error type for tshook operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown alias slug or unparseable alias grammar.
    #[error("Cannot resolve alias '{specifier}': {reason}")]
    AliasResolution { specifier: String, reason: String },

    /// A manifest exists but no `exports` entry matches the subpath.
    #[error("Package subpath '{subpath}' is not defined by \"exports\" in {}", .manifest.display())]
    ExportNotDefined { subpath: String, manifest: PathBuf },

    /// No strategy produced an existing file.
    #[error("Cannot find module '{specifier}'{}", imported_from(.importer.as_deref()))]
    ModuleNotFound {
        specifier: String,
        importer: Option<PathBuf>,
    },

    /// The specifier names a directory. Triggers the directory fallback.
    #[error("Directory import '{specifier}' is not supported{}", imported_from(.importer.as_deref()))]
    UnsupportedDirectoryImport {
        specifier: String,
        importer: Option<PathBuf>,
    },

    /// Malformed manifest JSON.
    #[error("Error parsing {}: {source}", .path.display())]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Malformed tsconfig or workspace descriptor.
    #[error("Failed to parse config at {}: {message}", .path.display())]
    ConfigParse { path: PathBuf, message: String },

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Transform(#[from] TransformError),

    /// Any other failure reported by the host resolver or loader.
    #[error("{0}")]
    Host(String),
}

fn imported_from(importer: Option<&Path>) -> String {
    importer
        .map(|p| format!(" imported from {}", p.display()))
        .unwrap_or_default()
}

impl Error {
    #[must_use]
    pub fn alias(specifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AliasResolution {
            specifier: specifier.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn not_found(specifier: impl Into<String>, importer: Option<&Path>) -> Self {
        Self::ModuleNotFound {
            specifier: specifier.into(),
            importer: importer.map(Path::to_path_buf),
        }
    }

    #[must_use]
    pub fn directory_import(specifier: impl Into<String>, importer: Option<&Path>) -> Self {
        Self::UnsupportedDirectoryImport {
            specifier: specifier.into(),
            importer: importer.map(Path::to_path_buf),
        }
    }

    #[must_use]
    pub fn host(msg: impl Into<String>) -> Self {
        Self::Host(msg.into())
    }

    /// Whether this error belongs to the "not found" class.
    ///
    /// Only these errors advance a fallback chain; everything else propagates.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ModuleNotFound { .. }
                | Self::UnsupportedDirectoryImport { .. }
                | Self::ExportNotDefined { .. }
        )
    }

    /// Get the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AliasResolution { .. } => codes::ALIAS_RESOLUTION,
            Self::ExportNotDefined { .. } => codes::EXPORT_NOT_DEFINED,
            Self::ModuleNotFound { .. } => codes::MODULE_NOT_FOUND,
            Self::UnsupportedDirectoryImport { .. } => codes::UNSUPPORTED_DIR_IMPORT,
            Self::ManifestParse { .. } => codes::MANIFEST_PARSE,
            Self::ConfigParse { .. } => codes::CONFIG_PARSE,
            Self::Read { .. } => codes::READ,
            Self::Transform(_) => codes::TRANSFORM,
            Self::Host(_) => codes::HOST,
        }
    }

    /// Remove text a fallback appended to the reported specifier, so the
    /// message names what the caller actually wrote.
    pub(crate) fn strip_specifier_suffix(&mut self, suffix: &str) {
        if let Self::ModuleNotFound { specifier, .. }
        | Self::UnsupportedDirectoryImport { specifier, .. } = self
        {
            if let Some(stripped) = specifier.strip_suffix(suffix) {
                *specifier = stripped.to_string();
            }
        }
    }
}
