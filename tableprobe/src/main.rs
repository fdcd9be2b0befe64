// tableprobe/src/main.rs

mod cli;
mod logic;

use clap::Parser;
use cli::{Cli, Commands, ConfigAction};
use logic::client::config;
use logic::config::{resolve_config_path, ProbeConfig};
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Parse command‐line arguments
    let args = Cli::parse();

    // Diagnostics go to stderr so stdout stays clean for `--format json`
    let default_filter = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .init();

    let config_path = resolve_config_path(args.config.as_deref());

    // The probe runs without a config file when no default location exists
    let probe_config_path = match &config_path {
        Ok(path) => Some(path.as_path()),
        Err(e) => {
            warn!(error = %e, "skipping config file");
            None
        }
    };

    // Dispatch on subcommand; no subcommand means probe
    let code = match args.command {
        None => logic::probe::run(probe_config_path, &args.probe).await?,
        Some(Commands::Check { probe }) => {
            // Flags written before `check` still count; check's own win
            let probe = probe.under(args.probe);
            logic::probe::run(probe_config_path, &probe).await?
        }
        Some(Commands::Config { action }) => {
            let config_path = config_path?;
            match action {
                ConfigAction::Show => config::show(&config_path).await?,
                ConfigAction::Set {
                    url,
                    key,
                    table,
                    columns,
                    limit,
                } => {
                    let update = ProbeConfig {
                        url,
                        service_key: key,
                        table,
                        columns,
                        limit,
                    };
                    config::set(&config_path, update).await?
                }
                ConfigAction::Path => config::path(&config_path),
            }
            ExitCode::SUCCESS
        }
    };

    Ok(code)
}
