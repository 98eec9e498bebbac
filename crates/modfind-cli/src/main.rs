#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use clap::Parser;
use miette::Result;
use modfind_core::Config;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "modfind")]
#[command(author, version, about = "Resolve bundler import specifiers", long_about = None)]
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

    /// Resolve import specifiers the way the bundler would
    Resolve {
        /// Specifiers to resolve (e.g. "react", "lodash/debounce", "./util")
        #[arg(required = true)]
        specifiers: Vec<String>,

        /// File doing the import (defaults to the project root)
        #[arg(long, value_name = "FILE")]
        importer: Option<PathBuf>,

        /// Settings file (defaults to modfind.json in the working directory)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Resolve for server-side rendering
        #[arg(long)]
        ssr: bool,

        /// Production build instead of a dev session
        #[arg(long)]
        build: bool,

        /// Target node instead of the browser
        #[arg(long)]
        node: bool,

        /// Resolve as `require()` instead of `import`
        #[arg(long)]
        require: bool,

        /// Externalize eligible dependencies
        #[arg(long)]
        externalize: bool,

        /// Register dependencies for pre-bundling and write their metadata
        #[arg(long)]
        optimize: bool,

        /// Extra export condition (repeatable)
        #[arg(long = "condition", value_name = "NAME")]
        conditions: Vec<String>,
    },

    /// Show the manifest a package name resolves to
    Pkg {
        /// Package name (e.g. "react", "@scope/pkg")
        name: String,

        /// Directory to resolve from (defaults to the working directory)
        #[arg(long, value_name = "DIR")]
        from: Option<PathBuf>,

        /// Target node instead of the browser
        #[arg(long)]
        node: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::new(cwd.clone())
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    logging::init(config.verbosity, config.json_logs);

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(),
        Some(Commands::Resolve {
            specifiers,
            importer,
            config: config_path,
            ssr,
            build,
            node,
            require,
            externalize,
            optimize,
            conditions,
        }) => {
            let span = tracing::info_span!("resolve", cmd = "resolve", cwd = %cwd.display());
            let _guard = span.enter();
            let args = commands::resolve::ResolveArgs {
                specifiers,
                importer,
                config: config_path,
                ssr,
                build,
                node,
                require,
                externalize,
                optimize,
                conditions,
            };
            commands::resolve::run(&config, &args)
        }
        Some(Commands::Pkg { name, from, node }) => {
            let span = tracing::info_span!("pkg", cmd = "pkg", cwd = %cwd.display());
            let _guard = span.enter();
            commands::pkg::run(&config, &name, from.as_deref(), node)
        }
    }
}
