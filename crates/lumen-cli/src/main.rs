//! Lumen CLI - Command-line interface for the lumen visual synthesis engine.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lumen")]
#[command(author, version, about = "Lumen visual synthesis engine CLI", long_about = None)]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available node types and their parameters
    Nodes(commands::nodes::NodesArgs),

    /// Write a starter project
    New(commands::new::NewArgs),

    /// Load a project and report problems
    Check(commands::check::CheckArgs),

    /// Render a project offscreen and save the last frame as PNG
    Render(commands::render::RenderArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = commands::common::load_settings(cli.settings.as_deref())?;

    // RUST_LOG wins over the settings file; logs go to stderr so listings stay pipeable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Nodes(args) => commands::nodes::run(args),
        Commands::New(args) => commands::new::run(args, &settings),
        Commands::Check(args) => commands::check::run(args, &settings),
        Commands::Render(args) => commands::render::run(args, settings),
    }
}
