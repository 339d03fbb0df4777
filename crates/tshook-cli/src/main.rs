#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use clap::Parser;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tshook")]
#[command(author, version, about = "Inspect how TypeScript-aware module hooks resolve and load", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Resolve a specifier the way the loader hooks would
    Resolve {
        /// The specifier (e.g., "./utils", "~/src/app", "@t/ui", "./routes/*.ts")
        specifier: String,

        /// Importing file (defaults to <cwd>/index.ts)
        #[arg(long, value_name = "FILE")]
        from: Option<PathBuf>,

        /// Resolve as an `import` instead of a `require`
        #[arg(long)]
        import: bool,

        /// Use the asynchronous contract
        #[arg(long = "async")]
        asynchronous: bool,

        /// Replace the default export conditions
        #[arg(long = "condition", value_name = "NAME")]
        conditions: Vec<String>,
    },

    /// Load a file through the transform pipeline and print the result
    Load {
        /// File to load
        path: PathBuf,

        /// Load as a module instead of a commonjs script
        #[arg(long)]
        import: bool,
    },

    /// List workspace aliases and tsconfig paths mappings
    Aliases,

    /// Print the discovered configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    let cwd = dunce::canonicalize(&cwd).unwrap_or(cwd);

    logging::init(cli.verbose, cli.json);

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(cli.json),
        Some(Commands::Resolve {
            specifier,
            from,
            import,
            asynchronous,
            conditions,
        }) => {
            let span = tracing::info_span!("resolve", cmd = "resolve", cwd = %cwd.display());
            let _guard = span.enter();
            let action = commands::resolve::ResolveAction {
                importer: from.map_or_else(|| cwd.join("index.ts"), |p| cwd.join(p)),
                specifier,
                cwd,
                import,
                asynchronous,
                conditions,
            };
            commands::resolve::run(action, cli.json)
        }
        Some(Commands::Load { path, import }) => {
            let span = tracing::info_span!("load", cmd = "load", cwd = %cwd.display());
            let _guard = span.enter();
            commands::load::run(&cwd, &cwd.join(path), import, cli.json)
        }
        Some(Commands::Aliases) => commands::aliases::run(&cwd, cli.json),
        Some(Commands::Config) => commands::config::run(&cwd, cli.json),
    }
}
