//! Source maps for transformed modules.

use super::{TransformError, TransformOutput};
use base64::Engine as _;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Point a source map at `path`: `sources` becomes the absolute original
/// file and `sourceRoot` is dropped.
pub fn relocate_source_map(map: &str, path: &Path) -> Result<String, TransformError> {
    let mut value: Value = serde_json::from_str(map)
        .map_err(|e| TransformError::new("TRANSFORM_SOURCE_MAP", format!("invalid source map: {e}")))?;
    let Some(object) = value.as_object_mut() else {
        return Err(TransformError::new(
            "TRANSFORM_SOURCE_MAP",
            "source map is not a JSON object",
        ));
    };
    object.remove("sourceRoot");
    object.insert(
        "sources".to_string(),
        Value::Array(vec![Value::String(path.to_string_lossy().into_owned())]),
    );
    Ok(value.to_string())
}

/// `//# sourceMappingURL=` comment carrying `map` inline.
#[must_use]
pub fn inline_source_map_comment(map: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(map);
    format!("\n//# sourceMappingURL=data:application/json;base64,{encoded}")
}

/// Source maps of every module the engine transformed, by original path.
///
/// A module transformed again (after an edit, say) replaces its entry.
#[derive(Debug, Default)]
pub struct SourceMapRegistry {
    maps: Mutex<HashMap<PathBuf, Arc<str>>>,
}

impl SourceMapRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The relocated map recorded for `path`.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<Arc<str>> {
        self.maps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.maps.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Final source text for a transform output produced from `path`.
    ///
    /// With a map, it is relocated, recorded, and inlined after the code.
    pub(crate) fn attach(&self, path: &Path, output: TransformOutput) -> Result<String, TransformError> {
        let TransformOutput { mut code, map } = output;
        let Some(map) = map else {
            return Ok(code);
        };

        let relocated = relocate_source_map(&map, path)?;
        code.push_str(&inline_source_map_comment(&relocated));
        self.maps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf(), Arc::from(relocated));
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAP: &str = r#"{"version":3,"sourceRoot":"/tmp","sources":["a.ts"],"names":[],"mappings":"AAAA"}"#;

    #[test]
    fn test_relocate() {
        let relocated = relocate_source_map(MAP, Path::new("/repo/src/a.ts")).unwrap();
        let value: Value = serde_json::from_str(&relocated).unwrap();
        assert_eq!(value["sources"], serde_json::json!(["/repo/src/a.ts"]));
        assert!(value.get("sourceRoot").is_none());
        assert_eq!(value["mappings"], "AAAA");

        assert!(relocate_source_map("[]", Path::new("/a.ts")).is_err());
        assert!(relocate_source_map("{", Path::new("/a.ts")).is_err());
    }

    #[test]
    fn test_inline_comment() {
        let comment = inline_source_map_comment("{}");
        assert_eq!(comment, "\n//# sourceMappingURL=data:application/json;base64,e30=");
    }

    #[test]
    fn test_attach_records_map() {
        let registry = SourceMapRegistry::new();
        let path = Path::new("/repo/src/a.ts");

        let code = registry
            .attach(path, TransformOutput::new("let a = 1;"))
            .unwrap();
        assert_eq!(code, "let a = 1;");
        assert!(registry.is_empty());

        let code = registry
            .attach(path, TransformOutput::new("let a = 1;").with_map(MAP))
            .unwrap();
        assert!(code.starts_with("let a = 1;\n//# sourceMappingURL=data:application/json;base64,"));
        let recorded = registry.get(path).unwrap();
        assert!(recorded.contains("/repo/src/a.ts"));
        assert_eq!(registry.len(), 1);
    }
}
