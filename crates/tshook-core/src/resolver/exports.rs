//! Package.json `exports` evaluation.
//!
//! Node.js-compatible:
//! - Root exports (string, array, or conditions sugar)
//! - Exact subpath exports
//! - Pattern exports with `*` wildcards, most specific key first
//! - Conditional exports evaluated in the manifest's key order, nested to any depth
//! - Fallback arrays, first valid entry wins

use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Resolve `subpath` (`"."` or `"./feature"`) against an `exports` value.
///
/// `conditions` are the active condition names; `"default"` always matches.
/// Returns the target (starting with `"./"`) or `None` when nothing is exported.
#[must_use]
pub fn resolve_exports(exports: &Value, subpath: &str, conditions: &[String]) -> Option<String> {
    let map = match exports {
        Value::Object(obj) if has_subpath_keys(obj) => obj,
        // String, array, or a conditions object: sugar for { ".": exports }
        _ => {
            return if subpath == "." {
                resolve_export_target(exports, conditions)
            } else {
                None
            };
        }
    };

    // Exact keys win over patterns
    if let Some(target) = map.get(subpath) {
        if !subpath.contains('*') {
            return resolve_export_target(target, conditions);
        }
    }

    resolve_exports_pattern(map, subpath, conditions)
}

/// Resolve a `#`-prefixed specifier against a package's `imports` field.
#[must_use]
pub fn resolve_imports_map(imports: &Value, spec: &str, conditions: &[String]) -> Option<String> {
    if !spec.starts_with('#') {
        return None;
    }
    let map = imports.as_object()?;
    if let Some(target) = map.get(spec) {
        return resolve_target_value(target, conditions);
    }
    best_pattern_match(map, spec)
        .and_then(|(target, star)| Some(resolve_target_value(target, conditions)?.replace('*', star)))
}

fn resolve_exports_pattern(
    map: &Map<String, Value>,
    subpath: &str,
    conditions: &[String],
) -> Option<String> {
    let (target_value, star_value) = best_pattern_match(map, subpath)?;
    let target = resolve_export_target(target_value, conditions)?;
    substitute_star(&target, star_value)
}

/// Find the most specific pattern key matching `subpath`.
///
/// Keys with a longer prefix before `*` win; ties go to the longer key.
fn best_pattern_match<'a, 's>(
    map: &'a Map<String, Value>,
    subpath: &'s str,
) -> Option<(&'a Value, &'s str)> {
    let mut best: Option<(&str, &Value, &str)> = None;

    for (key, value) in map {
        if key.matches('*').count() != 1 {
            continue;
        }
        let Some(star_value) = match_pattern(key, subpath) else {
            continue;
        };
        let better = best.map_or(true, |(best_key, _, _)| {
            pattern_key_compare(key, best_key) == Ordering::Less
        });
        if better {
            best = Some((key.as_str(), value, star_value));
        }
    }

    best.map(|(_, value, star)| (value, star))
}

fn pattern_key_compare(a: &str, b: &str) -> Ordering {
    let base_a = a.find('*').unwrap_or(a.len());
    let base_b = b.find('*').unwrap_or(b.len());
    base_b
        .cmp(&base_a)
        .then_with(|| b.len().cmp(&a.len()))
        .then_with(|| a.cmp(b))
}

/// Check if exports object has subpath keys (keys starting with ".").
fn has_subpath_keys(obj: &Map<String, Value>) -> bool {
    obj.keys().any(|k| k.starts_with('.'))
}

/// Match a pattern key against a subpath.
///
/// Returns the `*` substitution value if matched.
/// E.g., pattern `"./features/*"` with subpath `"./features/foo"` returns `Some("foo")`.
fn match_pattern<'s>(pattern: &str, subpath: &'s str) -> Option<&'s str> {
    let star_pos = pattern.find('*')?;
    let prefix = &pattern[..star_pos];
    let suffix = &pattern[star_pos + 1..];

    if !subpath.starts_with(prefix) || !subpath.ends_with(suffix) {
        return None;
    }

    let start = prefix.len();
    let end = subpath.len().checked_sub(suffix.len())?;
    if start >= end {
        return None;
    }

    Some(&subpath[start..end])
}

/// Substitute every `*` in target with the star value.
///
/// Returns None if the result escapes the package (`..` segments).
fn substitute_star(target: &str, star_value: &str) -> Option<String> {
    let result = target.replace('*', star_value);

    if result.split('/').any(|segment| segment == "..") {
        return None;
    }

    Some(result)
}

/// Resolve an export target: string, fallback array, conditions object, or null.
fn resolve_export_target(target: &Value, conditions: &[String]) -> Option<String> {
    resolve_target_value(target, conditions).and_then(|s| validate_export_path(&s))
}

fn resolve_target_value(target: &Value, conditions: &[String]) -> Option<String> {
    match target {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items
            .iter()
            .find_map(|item| resolve_target_value(item, conditions)),
        Value::Object(obj) => obj.iter().find_map(|(key, value)| {
            let active = key == "default" || conditions.iter().any(|c| c == key);
            if active {
                resolve_target_value(value, conditions)
            } else {
                None
            }
        }),
        _ => None,
    }
}

/// Validate that an export path starts with "./" as required by Node.
fn validate_export_path(path: &str) -> Option<String> {
    if path.starts_with("./") {
        Some(path.to_string())
    } else {
        None
    }
}
