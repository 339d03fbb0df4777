use miette::Result;
use tshook_core::version::{version_string, OUTPUT_SCHEMA_VERSION};
use tshook_core::VERSION;

pub fn run(json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "version": VERSION,
                "schema_version": OUTPUT_SCHEMA_VERSION,
            })
        );
    } else {
        println!("{}", version_string());
    }
    Ok(())
}
