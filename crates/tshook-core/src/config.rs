use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the root tsconfig file.
pub const TSCONFIG_PATH_ENV: &str = "TSHOOK_TSCONFIG_PATH";

/// Environment variable overriding repository root discovery.
pub const ROOT_ENV: &str = "TSHOOK_ROOT";

/// Namespace prefix for workspace aliases (`@t/<slug>`).
pub const DEFAULT_WORKSPACE_NAMESPACE: &str = "@t";

/// Configuration for a resolution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Repository root. Tilde aliases and workspace packages are anchored here.
    pub root: PathBuf,

    /// Root tsconfig file, the source of the paths mapping.
    pub tsconfig: Option<PathBuf>,

    /// Namespace prefix recognized as a workspace alias.
    pub workspace_namespace: String,
}

impl EngineConfig {
    /// Create a config anchored at `root` with no tsconfig.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            tsconfig: None,
            workspace_namespace: DEFAULT_WORKSPACE_NAMESPACE.to_string(),
        }
    }

    /// Discover configuration for a process started in `cwd`.
    ///
    /// The root comes from `TSHOOK_ROOT`, else the nearest directory holding
    /// `.git` or `pnpm-workspace.yaml`, else the nearest `package.json`
    /// directory, else `cwd`. The tsconfig comes from `TSHOOK_TSCONFIG_PATH`
    /// (relative to `cwd`), else the nearest `tsconfig.json` above `cwd`.
    #[must_use]
    pub fn discover(cwd: &Path) -> Self {
        let root = std::env::var_os(ROOT_ENV)
            .map(|root| cwd.join(root))
            .or_else(|| paths::repository_root(cwd))
            .or_else(|| paths::project_root(cwd))
            .unwrap_or_else(|| cwd.to_path_buf());

        let tsconfig = std::env::var_os(TSCONFIG_PATH_ENV)
            .map(|p| cwd.join(p))
            .or_else(|| paths::find_up(cwd, "tsconfig.json"));

        Self {
            root: dunce::canonicalize(&root).unwrap_or(root),
            tsconfig,
            workspace_namespace: DEFAULT_WORKSPACE_NAMESPACE.to_string(),
        }
    }

    /// Set the root tsconfig.
    #[must_use]
    pub fn with_tsconfig(mut self, tsconfig: impl Into<PathBuf>) -> Self {
        self.tsconfig = Some(tsconfig.into());
        self
    }

    /// Set the workspace alias namespace.
    #[must_use]
    pub fn with_workspace_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.workspace_namespace = namespace.into();
        self
    }
}
