pub mod aliases;
pub mod config;
pub mod load;
pub mod resolve;
pub mod version;

use miette::Result;
use std::path::Path;
use std::sync::Arc;
use tshook_core::{Engine, EngineConfig, PassthroughTransformer};

/// Build an engine from the configuration discovered at `cwd`.
pub fn engine(cwd: &Path) -> Result<Engine, tshook_core::Error> {
    Engine::new(EngineConfig::discover(cwd), Arc::new(PassthroughTransformer))
}

/// Report a core error.
///
/// With `json`, prints `{"ok":false,"error":{...}}` on stdout and exits 1.
pub fn fail(err: &tshook_core::Error, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": false,
                "error": {
                    "code": err.code(),
                    "message": err.to_string(),
                }
            })
        );
        std::process::exit(1);
    }
    Err(miette::miette!(code = err.code(), "{err}"))
}
