//! tsconfig `paths` / `baseUrl` mapping for bare specifiers.

use crate::tsconfig::LoadedTsconfig;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tshook_util::path::normalize;

#[derive(Debug, Clone, PartialEq, Eq)]
struct PathMapping {
    pattern: String,
    prefix: String,
    suffix: String,
    targets: Vec<String>,
}

impl PathMapping {
    fn new(pattern: &str, targets: Vec<String>) -> Self {
        let (prefix, suffix) = match pattern.find('*') {
            Some(star) => (pattern[..star].to_string(), pattern[star + 1..].to_string()),
            None => (pattern.to_string(), String::new()),
        };
        Self {
            pattern: pattern.to_string(),
            prefix,
            suffix,
            targets,
        }
    }

    fn is_wildcard(&self) -> bool {
        self.pattern.contains('*')
    }

    /// The text captured by `*`, if `specifier` matches this wildcard.
    fn capture<'s>(&self, specifier: &'s str) -> Option<&'s str> {
        let rest = specifier.strip_prefix(self.prefix.as_str())?;
        let captured = rest.strip_suffix(self.suffix.as_str())?;
        Some(captured)
    }
}

/// Compiled paths mapping.
///
/// An exact key wins outright; otherwise the wildcard key with the longest
/// prefix is used. When nothing matches and `baseUrl` is set, the specifier
/// itself is tried under `baseUrl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathsMappingIndex {
    base: PathBuf,
    has_base_url: bool,
    mappings: Vec<PathMapping>,
}

impl PathsMappingIndex {
    /// Build from ordered `(pattern, substitutions)` pairs resolved against `base`.
    pub fn new<I>(base: impl Into<PathBuf>, has_base_url: bool, entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        Self {
            base: base.into(),
            has_base_url,
            mappings: entries
                .into_iter()
                .filter(|(_, targets)| !targets.is_empty())
                .map(|(pattern, targets)| PathMapping::new(&pattern, targets))
                .collect(),
        }
    }

    /// Build from a loaded tsconfig. `None` when it declares neither
    /// `paths` nor `baseUrl`.
    #[must_use]
    pub fn from_tsconfig(config: &LoadedTsconfig) -> Option<Self> {
        let options = config.config.compiler_options.as_ref()?;
        if options.paths.is_none() && options.base_url.is_none() {
            return None;
        }

        let base = options
            .base_url
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| options.paths_base.clone())
            .unwrap_or_else(|| config.dir().to_path_buf());

        let entries = options.paths.iter().flatten().map(|(pattern, targets)| {
            let targets = match targets {
                Value::Array(items) => items
                    .iter()
                    .filter_map(|t| t.as_str().map(String::from))
                    .collect(),
                Value::String(s) => vec![s.clone()],
                _ => Vec::new(),
            };
            (pattern.clone(), targets)
        });

        Some(Self::new(base, options.base_url.is_some(), entries))
    }

    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Ordered candidate paths for a bare `specifier`.
    #[must_use]
    pub fn candidates(&self, specifier: &str) -> Vec<PathBuf> {
        if specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/') {
            return Vec::new();
        }

        if let Some(exact) = self
            .mappings
            .iter()
            .find(|m| !m.is_wildcard() && m.pattern == specifier)
        {
            return self.substitute(exact, "");
        }

        let best = self
            .mappings
            .iter()
            .filter(|m| m.is_wildcard())
            .filter_map(|m| m.capture(specifier).map(|captured| (m, captured)))
            .max_by_key(|(m, _)| m.prefix.len());
        if let Some((mapping, captured)) = best {
            return self.substitute(mapping, captured);
        }

        if self.has_base_url {
            return vec![normalize(&self.base.join(specifier))];
        }
        Vec::new()
    }

    fn substitute(&self, mapping: &PathMapping, captured: &str) -> Vec<PathBuf> {
        mapping
            .targets
            .iter()
            .map(|target| normalize(&self.base.join(target.replacen('*', captured, 1))))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
