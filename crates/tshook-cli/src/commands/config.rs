//! `tshook config` command implementation.

use miette::Result;
use std::path::Path;
use tshook_core::config::{ROOT_ENV, TSCONFIG_PATH_ENV};
use tshook_core::version::OUTPUT_SCHEMA_VERSION;

/// Run the config command.
pub fn run(cwd: &Path, json: bool) -> Result<()> {
    let engine = match super::engine(cwd) {
        Ok(engine) => engine,
        Err(err) => return super::fail(&err, json),
    };
    let config = engine.config();
    let base_url = engine
        .tsconfig()
        .and_then(|t| t.config.compiler_options.as_ref())
        .and_then(|o| o.base_url.clone());

    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "schema_version": OUTPUT_SCHEMA_VERSION,
                "config": config,
                "base_url": base_url,
                "workspace_packages": engine.workspace().map_or(0, |w| w.len()),
            })
        );
        return Ok(());
    }

    println!("Root:      {}", config.root.display());
    match &config.tsconfig {
        Some(path) => println!("tsconfig:  {}", path.display()),
        None => println!("tsconfig:  (none; set {TSCONFIG_PATH_ENV})"),
    }
    if let Some(base_url) = base_url {
        println!("baseUrl:   {base_url}");
    }
    println!("Namespace: {}", config.workspace_namespace);
    println!(
        "Packages:  {}",
        engine.workspace().map_or(0, tshook_core::WorkspaceAliasTable::len)
    );
    println!();
    println!("hint: {ROOT_ENV} overrides the repository root");

    Ok(())
}
