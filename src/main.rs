//! Mapmerge - map upload, merge and render service
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use mapmerge::cli::{Cli, Commands};
use mapmerge::config::{Config, ConfigManager};
use mapmerge::error::MapmergeResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> MapmergeResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(&cli, &config);

    match cli.command {
        Commands::Serve(args) => mapmerge::cli::commands::serve(args, &config).await,
        Commands::Merge(args) => mapmerge::cli::commands::merge(args, &config).await,
        Commands::Render(args) => mapmerge::cli::commands::render(args, &config).await,
        Commands::Config(args) => {
            mapmerge::cli::commands::config(args, &config_manager, &config).await
        }
    }
}

/// 0 = warn (info for `serve`), 1 = info, 2+ = debug
fn init_logging(cli: &Cli, config: &Config) {
    let quiet = if matches!(cli.command, Commands::Serve(_)) {
        "info"
    } else {
        "warn"
    };
    let level = match cli.verbose {
        0 => quiet,
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mapmerge={level},tower_http={level}")));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
