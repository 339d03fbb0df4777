//! Specifier classification.

use serde::Serialize;
use std::fmt;
use std::path::Path;

/// What a specifier string denotes. Decided once, before any resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecifierKind {
    /// `./x`, `../x`
    Relative,
    /// `/x` (or a drive-letter path on Windows)
    Absolute,
    /// A package name, optionally with a subpath
    Bare,
    /// `scheme:...`
    Url,
    /// `~` or `~/x`, anchored at the repository root
    TildeAlias,
    /// A relative or absolute specifier containing `*`
    Glob,
    /// `<namespace>/<slug>[/subpath]`
    WorkspaceAlias,
}

impl SpecifierKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relative => "relative",
            Self::Absolute => "absolute",
            Self::Bare => "bare",
            Self::Url => "url",
            Self::TildeAlias => "tilde_alias",
            Self::Glob => "glob",
            Self::WorkspaceAlias => "workspace_alias",
        }
    }

    /// Whether the specifier names a filesystem location directly.
    #[must_use]
    pub fn is_path(&self) -> bool {
        matches!(self, Self::Relative | Self::Absolute)
    }
}

impl fmt::Display for SpecifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify `specifier`.
///
/// Rules apply in order and the first match wins: URL, tilde alias, glob,
/// workspace alias (`<namespace>/...`), relative or absolute path, bare.
#[must_use]
pub fn classify(specifier: &str, workspace_namespace: &str) -> SpecifierKind {
    if has_url_scheme(specifier) {
        return SpecifierKind::Url;
    }
    if specifier.starts_with('~') {
        return SpecifierKind::TildeAlias;
    }

    let path_kind = path_kind(specifier);
    if path_kind.is_some() && specifier.contains('*') {
        return SpecifierKind::Glob;
    }
    if !workspace_namespace.is_empty()
        && specifier
            .strip_prefix(workspace_namespace)
            .is_some_and(|rest| rest.starts_with('/'))
    {
        return SpecifierKind::WorkspaceAlias;
    }

    path_kind.unwrap_or(SpecifierKind::Bare)
}

fn path_kind(specifier: &str) -> Option<SpecifierKind> {
    if specifier == "." || specifier == ".." || specifier.starts_with("./") || specifier.starts_with("../") {
        Some(SpecifierKind::Relative)
    } else if is_absolute_path(specifier) {
        Some(SpecifierKind::Absolute)
    } else {
        None
    }
}

/// Check if a specifier is an absolute path.
///
/// On Unix: starts with `/`.
/// On Windows: starts with a drive letter (e.g., `C:\`) or UNC path (`\\`).
#[must_use]
pub fn is_absolute_path(spec: &str) -> bool {
    if spec.starts_with('/') {
        return true;
    }

    #[cfg(windows)]
    {
        let bytes = spec.as_bytes();
        if bytes.len() >= 3
            && bytes[0].is_ascii_alphabetic()
            && bytes[1] == b':'
            && (bytes[2] == b'\\' || bytes[2] == b'/')
        {
            return true;
        }
        if spec.starts_with("\\\\") {
            return true;
        }
    }

    Path::new(spec).is_absolute()
}

/// `scheme:` with a scheme of at least two characters, so Windows drive
/// letters are not mistaken for URLs.
fn has_url_scheme(specifier: &str) -> bool {
    let Some(colon) = specifier.find(':') else {
        return false;
    };
    let scheme = &specifier[..colon];
    scheme.len() >= 2
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
