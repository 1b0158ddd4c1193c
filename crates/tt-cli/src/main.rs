use std::io::{self, IsTerminal};

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tt_cli::commands::{afk, alerts, edit, list, remove, resolve, serve, start, status, stop, watch};
use tt_cli::{Backend, Cli, Commands, Config, Console};
use tt_core::{AfkResolver, CancelToken};

/// Returns a token cancelled on the first Ctrl-C.
fn shutdown_on_ctrl_c() -> CancelToken {
    let shutdown = CancelToken::new();
    let cancel = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for Ctrl-C");
            return;
        }
        tracing::info!("received Ctrl-C, shutting down");
        cancel.cancel();
    });
    shutdown
}

#[tokio::main]
async fn main() -> Result<()> {
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

    let mut config =
        Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    config.remote |= cli.remote;
    tracing::debug!(?config, "loaded configuration");

    let Some(command) = &cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let mut stdout = io::stdout().lock();
    match command {
        Commands::Serve => {
            if config.remote {
                anyhow::bail!("`tt serve` runs the daemon and cannot be used with --remote");
            }
            serve::run(&config, shutdown_on_ctrl_c()).await?;
        }
        Commands::Watch => {
            let watcher = watch::Watch::connect(&config).await?;
            let shutdown = shutdown_on_ctrl_c();
            let resolver = AfkResolver::new(Console::stdio()).with_cancel(shutdown.child());
            watcher.run(&mut stdout, resolver, &shutdown, &Local).await?;
        }
        Commands::Status => {
            let mut backend = Backend::open(&config).await?;
            status::run(&mut stdout, &mut backend, &Local).await?;
        }
        Commands::In(args) => {
            let mut backend = Backend::open(&config).await?;
            start::run(&mut stdout, &mut backend, args, &Local).await?;
        }
        Commands::Out { at } => {
            let mut backend = Backend::open(&config).await?;
            stop::run(&mut stdout, &mut backend, at.as_deref(), &Local).await?;
        }
        Commands::Edit(args) => {
            let mut backend = Backend::open(&config).await?;
            edit::run(&mut stdout, &mut backend, args, &Local).await?;
        }
        Commands::Rm { id } => {
            let mut backend = Backend::open(&config).await?;
            remove::run(&mut stdout, &mut backend, *id, &Local).await?;
        }
        Commands::Ls(args) => {
            let mut backend = Backend::open(&config).await?;
            let highlight = io::stdout().is_terminal();
            list::run(&mut stdout, &mut backend, args, highlight, &Local).await?;
        }
        Commands::Alerts { action, json } => {
            let mut backend = Backend::open(&config).await?;
            alerts::run(&mut stdout, &mut backend, action.as_ref(), *json, &Local).await?;
        }
        Commands::Afk { action } => {
            let mut backend = Backend::open(&config).await?;
            afk::run(&mut stdout, &mut backend, *action, &Local).await?;
        }
        Commands::Resolve => {
            let mut backend = Backend::open(&config).await?;
            let mut resolver = AfkResolver::new(Console::stdio());
            resolve::run(&mut stdout, &mut backend, &mut resolver, &Local).await?;
        }
    }

    Ok(())
}
