//! Glob imports.
//!
//! Resolving `./routes/*.ts` yields a virtual identity naming the pattern and
//! the importing directory. The directory scan happens when that identity is
//! loaded, never during resolution.

use super::LoaderKind;
use crate::error::Error;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use tshook_util::path::{normalize, to_slash};

/// File-name prefix marking a virtual glob identity.
pub const VIRTUAL_PREFIX: &str = "__virtual__:";

/// A synthetic module that re-exports every file matching a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualGlobModule {
    pub pattern: String,
    pub importer_dir: PathBuf,
    pub kind: LoaderKind,
}

impl VirtualGlobModule {
    #[must_use]
    pub fn new(pattern: impl Into<String>, importer_dir: impl Into<PathBuf>, kind: LoaderKind) -> Self {
        Self {
            pattern: pattern.into(),
            importer_dir: importer_dir.into(),
            kind,
        }
    }

    /// The identity as an absolute path that cannot exist on disk:
    /// `<importer_dir>/__virtual__:<kind>:<base64url pattern>`.
    #[must_use]
    pub fn to_path(&self) -> PathBuf {
        let encoded = URL_SAFE_NO_PAD.encode(&self.pattern);
        self.importer_dir
            .join(format!("{VIRTUAL_PREFIX}{}:{encoded}", self.kind.as_str()))
    }

    /// Recover a virtual identity from its path form.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let rest = name.strip_prefix(VIRTUAL_PREFIX)?;
        let (kind, encoded) = rest.split_once(':')?;
        let kind = LoaderKind::parse(kind)?;
        let pattern = String::from_utf8(URL_SAFE_NO_PAD.decode(encoded).ok()?).ok()?;
        Some(Self {
            pattern,
            importer_dir: path.parent()?.to_path_buf(),
            kind,
        })
    }

    /// Files matching the pattern, sorted.
    pub fn matches(&self) -> Result<Vec<PathBuf>, Error> {
        let absolute = normalize(&self.importer_dir.join(&self.pattern));
        let entries = glob::glob(&to_slash(&absolute))
            .map_err(|e| Error::alias(&self.pattern, format!("invalid glob pattern: {e}")))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        debug!(pattern = %self.pattern, matched = files.len(), "glob expanded");
        Ok(files)
    }

    /// Generate the aggregate module source.
    ///
    /// The default export maps each file's path relative to the importing
    /// directory (`./routes/a.ts`) to that file's exports.
    pub fn render(&self) -> Result<String, Error> {
        let files = self.matches()?;
        let entries: Vec<(String, String)> = files
            .iter()
            .map(|file| (self.relative_key(file), quote(&to_slash(file))))
            .collect();

        let mut out = String::new();
        match self.kind {
            LoaderKind::Module => {
                for (i, (_, target)) in entries.iter().enumerate() {
                    let _ = writeln!(out, "import * as __glob_{i} from {target};");
                }
                out.push_str("export default {\n");
                for (i, (key, _)) in entries.iter().enumerate() {
                    let _ = writeln!(out, "\t{}: __glob_{i},", quote(key));
                }
                out.push_str("};\n");
            }
            LoaderKind::CommonJs => {
                out.push_str("module.exports = {\n");
                for (key, target) in &entries {
                    let _ = writeln!(out, "\t{}: require({target}),", quote(key));
                }
                out.push_str("};\n");
            }
        }
        Ok(out)
    }

    fn relative_key(&self, file: &Path) -> String {
        file.strip_prefix(&self.importer_dir).map_or_else(
            |_| to_slash(file),
            |rel| format!("./{}", to_slash(rel)),
        )
    }
}

/// JSON string literal, which is also a valid JS string literal.
fn quote(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}
