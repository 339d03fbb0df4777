//! `tshook aliases` command implementation.
//!
//! Lists the workspace packages reachable through the alias namespace and
//! the root tsconfig's paths mapping.

use miette::Result;
use std::path::Path;
use tshook_core::version::OUTPUT_SCHEMA_VERSION;

/// Run the aliases command.
pub fn run(cwd: &Path, json: bool) -> Result<()> {
    let engine = match super::engine(cwd) {
        Ok(engine) => engine,
        Err(err) => return super::fail(&err, json),
    };
    let namespace = &engine.config().workspace_namespace;

    let packages: Vec<(String, String)> = engine
        .workspace()
        .map(|table| {
            table
                .iter()
                .map(|(slug, category)| (format!("{namespace}/{slug}"), format!("{category}/{slug}")))
                .collect()
        })
        .unwrap_or_default();
    let paths = engine
        .tsconfig()
        .and_then(|t| t.config.compiler_options.as_ref())
        .and_then(|o| o.paths.clone())
        .unwrap_or_default();

    if json {
        let package_list: Vec<_> = packages
            .iter()
            .map(|(alias, dir)| serde_json::json!({ "alias": alias, "dir": dir }))
            .collect();
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "schema_version": OUTPUT_SCHEMA_VERSION,
                "root": engine.config().root.to_string_lossy(),
                "workspace": engine.workspace().is_some(),
                "packages": package_list,
                "paths": paths,
            })
        );
        return Ok(());
    }

    match engine.workspace() {
        Some(_) if packages.is_empty() => println!("Workspace declared, but no packages found."),
        Some(_) => {
            println!("Workspace packages ({}):", packages.len());
            for (alias, dir) in &packages {
                println!("  {alias} -> {dir}");
            }
        }
        None => println!("No workspaces configured."),
    }

    if !paths.is_empty() {
        println!();
        println!("Paths mapping ({}):", paths.len());
        for (pattern, targets) in &paths {
            println!("  {pattern} -> {targets}");
        }
    }

    Ok(())
}
