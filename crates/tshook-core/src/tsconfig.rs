//! tsconfig loading.
//!
//! Parses JSONC, follows `extends` chains, and answers two questions for the
//! engine: which paths mapping applies to bare specifiers, and which compiler
//! options apply to a given source file.

use crate::error::Error;
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace};
use tshook_util::fs::FileSystem;
use tshook_util::path::{is_inside_dependency_dir, normalize, to_slash, DEPENDENCY_DIR};

/// Compiler options the engine reads or forwards to the transformer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerOptions {
    /// Absolute after loading.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Ordered pattern -> substitutions mapping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsx: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsx_factory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsx_fragment_factory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsx_import_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental_decorators: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_define_for_class_fields: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbatim_module_syntax: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preserve_value_imports: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub es_module_interop: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_map: Option<bool>,

    /// Directory of the config that declared `paths`.
    /// Substitutions resolve against it when `baseUrl` is unset.
    #[serde(skip)]
    pub paths_base: Option<PathBuf>,
}

/// `extends` may name one config or (TS 5+) several.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Extends {
    One(String),
    Many(Vec<String>),
}

/// A parsed tsconfig file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TsConfig {
    pub extends: Option<Extends>,
    pub compiler_options: Option<CompilerOptions>,
    pub files: Option<Vec<String>>,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
}

/// A tsconfig with its `extends` chain merged and every path made absolute.
#[derive(Debug, Clone)]
pub struct LoadedTsconfig {
    pub path: PathBuf,
    pub config: TsConfig,
}

impl LoadedTsconfig {
    /// Directory containing the config file.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("/"))
    }

    #[must_use]
    pub fn compiler_options(&self) -> CompilerOptions {
        self.config.compiler_options.clone().unwrap_or_default()
    }

    /// Whether `file` is part of this config's program (`files`, `include`,
    /// `exclude`).
    #[must_use]
    pub fn admits(&self, file: &Path) -> bool {
        let file = to_slash(&normalize(file));
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };

        if let Some(files) = &self.config.files {
            if files.iter().any(|f| *f == file) {
                return true;
            }
        }

        let include = match (&self.config.files, &self.config.include) {
            (_, Some(include)) => include.clone(),
            (Some(_), None) => return false,
            (None, None) => vec![format!("{}/**/*", to_slash(self.dir()))],
        };

        let excluded = match &self.config.exclude {
            Some(exclude) => exclude
                .iter()
                .any(|p| glob_matches(&directory_pattern(p), &file, options)),
            None => is_inside_dependency_dir(Path::new(&file)),
        };
        if excluded {
            return false;
        }

        include
            .iter()
            .any(|p| glob_matches(&directory_pattern(p), &file, options))
    }
}

fn glob_matches(pattern: &str, file: &str, options: MatchOptions) -> bool {
    Pattern::new(pattern).is_ok_and(|p| p.matches_with(file, options))
}

/// `src` means everything below `src`.
fn directory_pattern(pattern: &str) -> String {
    let last = pattern.rsplit('/').next().unwrap_or(pattern);
    if last.contains('*') || last.contains('.') {
        pattern.to_string()
    } else {
        format!("{}/**/*", pattern.trim_end_matches('/'))
    }
}

/// Parse tsconfig source (JSON with comments and trailing commas).
pub fn parse_tsconfig(path: &Path, source: &str) -> Result<TsConfig, Error> {
    let stripped = strip_jsonc(source);
    let normalized = remove_trailing_commas(&stripped);
    serde_json::from_str(&normalized).map_err(|e| Error::ConfigParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load a tsconfig and everything it extends.
pub fn load_tsconfig(path: &Path, fs: &dyn FileSystem) -> Result<LoadedTsconfig, Error> {
    let mut visited = HashSet::new();
    let config = load_tsconfig_inner(path, fs, &mut visited)?;
    Ok(LoadedTsconfig {
        path: path.to_path_buf(),
        config,
    })
}

fn load_tsconfig_inner(
    path: &Path,
    fs: &dyn FileSystem,
    visited: &mut HashSet<PathBuf>,
) -> Result<TsConfig, Error> {
    let canonical = normalize(path);
    if !visited.insert(canonical.clone()) {
        return Err(Error::ConfigParse {
            path: path.to_path_buf(),
            message: "tsconfig extends cycle detected".to_string(),
        });
    }

    let source = fs.read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = parse_tsconfig(path, &source)?;
    absolutize(&mut config, path.parent().unwrap_or_else(|| Path::new("/")));

    let bases = match config.extends.take() {
        None => Vec::new(),
        Some(Extends::One(base)) => vec![base],
        Some(Extends::Many(bases)) => bases,
    };

    // Later entries override earlier ones; the child overrides them all
    let mut merged: Option<TsConfig> = None;
    for base in &bases {
        let base_path = resolve_extends_path(path, base, fs)?;
        trace!(from = %path.display(), to = %base_path.display(), "tsconfig extends");
        let base_config = load_tsconfig_inner(&base_path, fs, visited)?;
        merged = Some(match merged {
            Some(acc) => merge_configs(acc, base_config),
            None => base_config,
        });
    }
    if let Some(base) = merged {
        config = merge_configs(base, config);
    }

    visited.remove(&canonical);
    Ok(config)
}

/// Rewrite the paths a config declares relative to its own directory.
fn absolutize(config: &mut TsConfig, dir: &Path) {
    let resolve = |p: &String| to_slash(&normalize(&dir.join(p)));

    if let Some(options) = config.compiler_options.as_mut() {
        if let Some(base_url) = options.base_url.as_mut() {
            *base_url = resolve(base_url);
        }
        if options.paths.is_some() {
            options.paths_base = Some(dir.to_path_buf());
        }
    }
    for list in [&mut config.files, &mut config.include, &mut config.exclude]
        .into_iter()
        .flatten()
    {
        *list = list.iter().map(resolve).collect();
    }
}

fn resolve_extends_path(current: &Path, extends: &str, fs: &dyn FileSystem) -> Result<PathBuf, Error> {
    let dir = current.parent().unwrap_or_else(|| Path::new("/"));
    let with_json = |p: PathBuf| -> Vec<PathBuf> {
        let json = PathBuf::from(format!("{}.json", p.display()));
        vec![p.clone(), json, p.join("tsconfig.json")]
    };

    let candidates: Vec<PathBuf> =
        if extends.starts_with("./") || extends.starts_with("../") || Path::new(extends).is_absolute() {
            with_json(normalize(&dir.join(extends)))
        } else {
            // Package-provided base config
            dir.ancestors()
                .flat_map(|d| with_json(d.join(DEPENDENCY_DIR).join(extends)))
                .collect()
        };

    candidates
        .into_iter()
        .find(|c| fs.is_file(c))
        .ok_or_else(|| Error::ConfigParse {
            path: current.to_path_buf(),
            message: format!("cannot find extended config '{extends}'"),
        })
}

fn merge_configs(base: TsConfig, mut child: TsConfig) -> TsConfig {
    let compiler_options = match (base.compiler_options, child.compiler_options.take()) {
        (Some(base_opts), Some(child_opts)) => Some(merge_compiler_options(base_opts, child_opts)),
        (Some(base_opts), None) => Some(base_opts),
        (None, Some(child_opts)) => Some(child_opts),
        (None, None) => None,
    };

    TsConfig {
        extends: None,
        compiler_options,
        include: child.include.or(base.include),
        exclude: child.exclude.or(base.exclude),
        files: child.files.or(base.files),
    }
}

fn merge_compiler_options(base: CompilerOptions, child: CompilerOptions) -> CompilerOptions {
    // `paths` and the directory it resolves against travel together
    let (paths, paths_base) = if child.paths.is_some() {
        (child.paths, child.paths_base)
    } else {
        (base.paths, base.paths_base)
    };

    CompilerOptions {
        base_url: child.base_url.or(base.base_url),
        paths,
        paths_base,
        target: child.target.or(base.target),
        jsx: child.jsx.or(base.jsx),
        jsx_factory: child.jsx_factory.or(base.jsx_factory),
        jsx_fragment_factory: child.jsx_fragment_factory.or(base.jsx_fragment_factory),
        jsx_import_source: child.jsx_import_source.or(base.jsx_import_source),
        experimental_decorators: child.experimental_decorators.or(base.experimental_decorators),
        use_define_for_class_fields: child
            .use_define_for_class_fields
            .or(base.use_define_for_class_fields),
        verbatim_module_syntax: child.verbatim_module_syntax.or(base.verbatim_module_syntax),
        preserve_value_imports: child.preserve_value_imports.or(base.preserve_value_imports),
        es_module_interop: child.es_module_interop.or(base.es_module_interop),
        source_map: child.source_map.or(base.source_map),
    }
}

fn strip_jsonc(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escape = false;
    let mut in_line_comment = false;
    let mut in_block_comment = false;

    while let Some(ch) = chars.next() {
        if in_line_comment {
            if ch == '\n' {
                in_line_comment = false;
                out.push(ch);
            }
            continue;
        }

        if in_block_comment {
            if ch == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block_comment = false;
            } else if ch == '\n' {
                out.push(ch);
            }
            continue;
        }

        if in_string {
            out.push(ch);
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match (ch, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(ch);
            }
            ('/', Some('/')) => {
                chars.next();
                in_line_comment = true;
            }
            ('/', Some('*')) => {
                chars.next();
                in_block_comment = true;
            }
            _ => out.push(ch),
        }
    }

    out
}

fn remove_trailing_commas(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escape = false;

    while let Some(ch) = chars.next() {
        if in_string {
            out.push(ch);
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        if ch == '"' {
            in_string = true;
        } else if ch == ',' {
            let next = chars.clone().find(|c| !c.is_whitespace());
            if matches!(next, Some('}' | ']')) {
                continue;
            }
        }

        out.push(ch);
    }

    out
}

/// Memoized tsconfig lookups for per-file compiler options.
#[derive(Debug, Default)]
pub struct TsconfigCache {
    by_path: Mutex<HashMap<PathBuf, Arc<LoadedTsconfig>>>,
    nearest_by_dir: Mutex<HashMap<PathBuf, Option<PathBuf>>>,
}

impl TsconfigCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load (once) the tsconfig at `path`.
    pub fn load(&self, path: &Path, fs: &dyn FileSystem) -> Result<Arc<LoadedTsconfig>, Error> {
        if let Some(hit) = self.by_path.lock().unwrap_or_else(PoisonError::into_inner).get(path) {
            return Ok(Arc::clone(hit));
        }
        let loaded = Arc::new(load_tsconfig(path, fs)?);
        Ok(Arc::clone(
            self.by_path
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(path.to_path_buf())
                .or_insert(loaded),
        ))
    }

    /// The nearest `tsconfig.json` at or above `dir`.
    ///
    /// Every directory visited on the way up is memoized with the answer.
    pub fn nearest(&self, dir: &Path, fs: &dyn FileSystem) -> Result<Option<Arc<LoadedTsconfig>>, Error> {
        let mut visited = Vec::new();
        let mut found = None;
        for ancestor in dir.ancestors() {
            let cached = self
                .nearest_by_dir
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(ancestor)
                .cloned();
            if let Some(hit) = cached {
                found = hit;
                break;
            }
            visited.push(ancestor.to_path_buf());
            let candidate = ancestor.join("tsconfig.json");
            if fs.is_file(&candidate) {
                found = Some(candidate);
                break;
            }
        }

        {
            let mut memo = self.nearest_by_dir.lock().unwrap_or_else(PoisonError::into_inner);
            for dir in visited {
                memo.entry(dir).or_insert_with(|| found.clone());
            }
        }

        found.map(|path| self.load(&path, fs)).transpose()
    }

    /// Compiler options for `file`: the nearest tsconfig that admits it,
    /// else `fallback` if it admits it.
    pub fn compiler_options_for(
        &self,
        file: &Path,
        fallback: Option<&LoadedTsconfig>,
        fs: &dyn FileSystem,
    ) -> Result<Option<CompilerOptions>, Error> {
        let dir = file.parent().unwrap_or_else(|| Path::new("/"));
        if let Some(nearest) = self.nearest(dir, fs)? {
            if nearest.admits(file) {
                debug!(file = %file.display(), tsconfig = %nearest.path.display(), "compiler options");
                return Ok(Some(nearest.compiler_options()));
            }
        }
        Ok(fallback
            .filter(|config| config.admits(file))
            .map(LoadedTsconfig::compiler_options))
    }
}
