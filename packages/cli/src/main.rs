mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{inspect, merge, render, InspectArgs, MergeArgs, RenderArgs};
use tracing_subscriber::EnvFilter;

/// Pagetree CLI - render, merge and inspect page trees
#[derive(Parser, Debug)]
#[command(name = "pagetree")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log at debug level (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a page snapshot to HTML
    Render(RenderArgs),

    /// Merge a target page snapshot into an existing one
    Merge(MergeArgs),

    /// Print the structure of a page snapshot
    Inspect(InspectArgs),
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = std::env::current_dir()
        .map_err(anyhow::Error::from)
        .and_then(|cwd| {
            let cwd = cwd.display().to_string();
            match cli.command {
                Command::Render(args) => render(args, &cwd),
                Command::Merge(args) => merge(args, &cwd),
                Command::Inspect(args) => inspect(args, &cwd),
            }
        });

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
