mod changes;
mod commands;
mod config;
mod deps;
mod descriptor;
mod diagnostics;
mod error;
mod markers;
mod merge;
mod metadata;
mod resolver;
mod skills;
mod store;
mod sync;
mod types;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Top-level CLI.
#[derive(Parser)]
#[command(name = "usage-rules", version, about = "Aggregate dependency usage rules into AGENTS.md and skill bundles")]
struct Cli {
    /// Which command to run.
    #[command(subcommand)]
    command: Commands,
    /// Path to the config file; its directory is the project root.
    #[arg(long, global = true, default_value = config::CONFIG_FILE)]
    config: PathBuf,
    /// Silence all logging.
    #[arg(long, short, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// More logging (-v debug, -vv trace).
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Create or update .usage-rules.toml
    Init {
        /// Target aggregate file to record, e.g. AGENTS.md.
        #[arg(long)]
        file: Option<String>,
    },
    /// List dependencies and the usage rules and skills they ship
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Regenerate the aggregate file and skill bundles
    Sync {
        /// Write nothing; exit 1 if anything would change.
        #[arg(long)]
        check: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    let result = match &cli.command {
        Commands::Init { file } => commands::init(&cli.config, file.as_deref()).map(|()| return ExitCode::SUCCESS),
        Commands::List { json } => commands::list(&cli.config, *json).map(|()| return ExitCode::SUCCESS),
        Commands::Sync { check } => commands::sync(&cli.config, *check),
    };

    return match result {
        Ok(code) => code,
        Err(e) => {
            diagnostics::print_error(&e);
            ExitCode::FAILURE
        },
    };
}

/// Install the stderr subscriber. `RUST_LOG` overrides the verbosity flags.
fn init_tracing(cli: &Cli) {
    if cli.quiet {
        return;
    }

    let filter = match cli.verbose {
        0 => "warn,usage_rules=info",
        1 => "info,usage_rules=debug",
        _ => "debug,usage_rules=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| return EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
