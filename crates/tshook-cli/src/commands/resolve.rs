//! `tshook resolve` command implementation.

use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use tshook_core::version::OUTPUT_SCHEMA_VERSION;
use tshook_core::{FsHost, ResolveContext, ResolvedModule};

/// Resolve command action.
#[derive(Debug, Clone)]
pub struct ResolveAction {
    pub specifier: String,
    pub importer: PathBuf,
    pub cwd: PathBuf,
    pub import: bool,
    pub asynchronous: bool,
    pub conditions: Vec<String>,
}

/// Run the resolve command.
pub fn run(action: ResolveAction, json: bool) -> Result<()> {
    let engine = match super::engine(&action.cwd) {
        Ok(engine) => engine,
        Err(err) => return super::fail(&err, json),
    };

    let mut ctx = if action.import {
        ResolveContext::import(Some(action.importer.clone()))
    } else {
        ResolveContext::require(Some(action.importer.clone()))
    };
    if !action.conditions.is_empty() {
        ctx = ctx.with_conditions(action.conditions.iter().cloned());
    }

    let host = FsHost::new();
    let result = if action.asynchronous {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .into_diagnostic()?;
        runtime.block_on(engine.resolve(&action.specifier, &ctx, &host))
    } else {
        engine.resolve_sync(&action.specifier, &ctx, &host)
    };

    match result {
        Ok(resolved) => {
            print_resolved(&action, &ctx, &resolved, json);
            Ok(())
        }
        Err(err) => super::fail(&err, json),
    }
}

fn print_resolved(action: &ResolveAction, ctx: &ResolveContext, resolved: &ResolvedModule, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "schema_version": OUTPUT_SCHEMA_VERSION,
                "specifier": action.specifier,
                "importer": action.importer.to_string_lossy(),
                "kind": ctx.kind().as_str(),
                "id": resolved.id.to_string(),
                "format": resolved.format.map(|f| f.as_str()),
                "short_circuit": resolved.short_circuit,
            })
        );
    } else {
        println!("{}", resolved.id);
        if let Some(format) = resolved.format {
            println!("  format: {format}");
        }
        if resolved.short_circuit {
            println!("  short-circuit");
        }
    }
}
