// smscost: SMS segment and cost accounting
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use smscost::cli::{Cli, Commands};
use smscost::commands::{
    AppContext, handle_cache_action, handle_config_action, handle_invalidate_command,
    handle_reconcile_command, handle_snapshot_command,
};
use smscost::config::Config;

fn init_logging(verbose: bool) {
    let default_level = if verbose { "smscost=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Commands::Config { action } = &cli.command {
        let config_path = match &cli.config {
            Some(path) => PathBuf::from(path),
            None => Config::default_path()?,
        };
        return handle_config_action(action.clone(), &config_path, cli.json);
    }

    let ctx = match AppContext::from_cli(&cli) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: Failed to load configuration: {e:#}");
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Snapshot {
            file,
            window,
            no_reconcile,
            watch,
        } => handle_snapshot_command(&ctx, &file, &window.spec(), no_reconcile, watch).await,
        Commands::Reconcile { file, window } => {
            handle_reconcile_command(&ctx, &file, &window.spec()).await
        }
        Commands::Invalidate { file, window } => {
            handle_invalidate_command(&ctx, &file, &window.spec()).await
        }
        Commands::Cache { action } => handle_cache_action(&ctx, action),
        Commands::Config { .. } => Ok(()),
    }
}
