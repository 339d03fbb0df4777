//! Package manifest (package.json) parsing and caching.
//!
//! The cache holds one slot per manifest path. A slot is filled at most
//! once, so concurrent lookups of the same uncached path share a single
//! read. Absence is cached too; parse failures are not.

use super::format::ModuleType;
use crate::driver::Io;
use crate::error::Error;
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tracing::trace;

/// The fields of a package.json the engine reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageManifest {
    pub name: Option<String>,
    /// Declared `type` field, verbatim.
    pub module_type: Option<String>,
    pub main: Option<String>,
    pub exports: Option<Value>,
    pub imports: Option<Value>,
}

impl PackageManifest {
    /// Parse manifest source.
    ///
    /// Only malformed JSON is an error. Fields of unexpected shape are ignored.
    pub fn parse(path: &Path, source: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(source).map_err(|source| Error::ManifestParse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_value(value))
    }

    #[must_use]
    pub fn from_value(mut value: Value) -> Self {
        let string = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(String::from);
        Self {
            name: string(&value, "name"),
            module_type: string(&value, "type"),
            main: string(&value, "main"),
            exports: value.get_mut("exports").map(Value::take),
            imports: value.get_mut("imports").map(Value::take),
        }
    }

    /// The declared module type, if the manifest declares one.
    #[must_use]
    pub fn declared_type(&self) -> Option<ModuleType> {
        match self.module_type.as_deref() {
            Some("module") => Some(ModuleType::Module),
            Some("commonjs") => Some(ModuleType::CommonJs),
            _ => None,
        }
    }
}

type Slot = Arc<OnceCell<Option<Arc<PackageManifest>>>>;

/// Populate-once cache of parsed manifests keyed by manifest path.
#[derive(Debug, Default)]
pub struct ManifestCache {
    slots: Mutex<HashMap<PathBuf, Slot>>,
}

impl ManifestCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, path: &Path) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(path.to_path_buf()).or_default())
    }

    /// Get the manifest at `path`, reading it on first use.
    ///
    /// `Ok(None)` means no manifest exists there.
    pub(crate) async fn get<I: Io + ?Sized>(
        &self,
        path: &Path,
        io: &I,
    ) -> Result<Option<Arc<PackageManifest>>, Error> {
        let slot = self.slot(path);
        let manifest = slot
            .get_or_try_init(|| async {
                trace!(path = %path.display(), "reading manifest");
                match io.read_to_string(path).await {
                    Ok(source) => PackageManifest::parse(path, &source).map(|m| Some(Arc::new(m))),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
                    Err(source) => Err(Error::Read {
                        path: path.to_path_buf(),
                        source,
                    }),
                }
            })
            .await?;
        Ok(manifest.clone())
    }

    /// Peek at a settled entry without reading.
    ///
    /// `None` when the path was never read (or its read failed);
    /// `Some(None)` when it was read and found absent.
    #[must_use]
    pub fn cached(&self, path: &Path) -> Option<Option<Arc<PackageManifest>>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(path).and_then(|slot| slot.get().cloned())
    }

    /// Number of settled entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|slot| slot.initialized()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
