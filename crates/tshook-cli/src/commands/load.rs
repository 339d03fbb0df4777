//! `tshook load` command implementation.

use miette::Result;
use std::path::Path;
use tshook_core::version::OUTPUT_SCHEMA_VERSION;
use tshook_core::{FsLoader, LoadContext, ModuleId};

/// Run the load command.
pub fn run(cwd: &Path, path: &Path, import: bool, json: bool) -> Result<()> {
    let engine = match super::engine(cwd) {
        Ok(engine) => engine,
        Err(err) => return super::fail(&err, json),
    };

    let path = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let id = ModuleId::from_path(path);
    let ctx = if import {
        LoadContext::import()
    } else {
        LoadContext::require()
    };

    let loaded = match engine.load_sync(&id, &ctx, &FsLoader::new()) {
        Ok(loaded) => loaded,
        Err(err) => return super::fail(&err, json),
    };

    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "schema_version": OUTPUT_SCHEMA_VERSION,
                "id": id.to_string(),
                "kind": ctx.kind.as_str(),
                "format": loaded.format.map(|f| f.as_str()),
                "short_circuit": loaded.short_circuit,
                "source": loaded.source,
            })
        );
    } else if let Some(source) = &loaded.source {
        print!("{source}");
        if !source.ends_with('\n') {
            println!();
        }
    }

    Ok(())
}
