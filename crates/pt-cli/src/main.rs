use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pt_cli::commands::{migrate, playtime, replay, status, sync};
use pt_cli::{AppContext, Cli, Commands, Config};

fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

/// Load config and build the application context.
fn open_app(config_path: Option<&Path>) -> Result<AppContext> {
    let config = load_config(config_path)?;
    AppContext::start(config).context("failed to start tracker")
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let mut stdout = io::stdout().lock();
    match &cli.command {
        Some(Commands::Status) => {
            let app = open_app(cli.config.as_deref())?;
            status::run(&mut stdout, &app)?;
        }
        Some(Commands::Playtime { id, json }) => {
            let app = open_app(cli.config.as_deref())?;
            playtime::run(&mut stdout, &app, *id, *json)?;
        }
        Some(Commands::Sync) => {
            let app = open_app(cli.config.as_deref())?;
            sync::run(&mut stdout, &app)?;
        }
        Some(Commands::Migrate) => {
            let app = open_app(cli.config.as_deref())?;
            migrate::run(&mut stdout, &app)?;
        }
        Some(Commands::Replay) => {
            let config = load_config(cli.config.as_deref())?;
            replay::run(io::stdin().lock(), &mut stdout, config)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
