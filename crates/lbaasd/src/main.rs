//! lbaasd — the LBaaS controller daemon.
//!
//! Single binary that assembles the controller subsystems:
//! - State store (redb)
//! - Agent directory + scheduler
//! - Lifecycle driver and the controller-topic endpoint (completions,
//!   agent state reports, agent callbacks)
//! - Dead-agent scrub loop
//!
//! # Usage
//!
//! ```text
//! lbaasd serve --config /etc/lbaas/lbaas.toml --environment prod
//! lbaasd agents --config /etc/lbaas/lbaas.toml
//! lbaasd scrub --config /etc/lbaas/lbaas.toml
//! ```

mod controller;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use lbaas_core::LbaasConfig;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::controller::Controller;

const DEFAULT_LOG_FILTER: &str = "info,lbaasd=debug,lbaas=debug";

#[derive(Parser)]
#[command(name = "lbaasd", about = "LBaaS controller daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Args)]
struct ConfigArgs {
    /// Path to lbaas.toml. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory for persistent state (overrides [state] data_dir).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Agent environment to schedule into (overrides [driver] environment).
    #[arg(long)]
    environment: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controller until Ctrl-C.
    Serve(ConfigArgs),
    /// Print the agent directory as JSON.
    Agents(ConfigArgs),
    /// Run one dead-agent scrub and print the report.
    Scrub(ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Serve(args) => serve(load_config(args)?).await,
        Command::Agents(args) => {
            let controller = Controller::open(load_config(args)?)?;
            let agents = controller.scheduler.directory().list_agents(None)?;
            println!("{}", serde_json::to_string_pretty(&agents)?);
            Ok(())
        }
        Command::Scrub(args) => {
            let controller = Controller::open(load_config(args)?)?;
            let report = controller
                .scheduler
                .scrub_dead_agents(controller.config.environment())?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Read the config file if given, then apply command-line overrides.
fn load_config(args: ConfigArgs) -> anyhow::Result<LbaasConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!(path = ?path, "loading configuration");
            LbaasConfig::from_file(path)?
        }
        None => LbaasConfig::default(),
    };
    if let Some(data_dir) = args.data_dir {
        config.state.data_dir = data_dir;
    }
    if let Some(environment) = args.environment {
        config.driver.environment = Some(environment);
    }
    config.validate()?;
    Ok(config)
}

async fn serve(config: LbaasConfig) -> anyhow::Result<()> {
    info!("LBaaS controller starting");
    let controller = Controller::open(config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => warn!(error = %e, "failed to listen for Ctrl-C, shutting down"),
        }
        let _ = shutdown_tx.send(true);
    });

    controller.serve(shutdown_rx).await?;
    info!("LBaaS controller stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lbaas.toml");
        std::fs::write(
            &path,
            "[driver]\nenvironment = \"staging\"\nagent_down_time = 30\n",
        )
        .unwrap();

        let config = load_config(ConfigArgs {
            config: Some(path.clone()),
            data_dir: Some(dir.path().to_path_buf()),
            environment: None,
        })
        .unwrap();
        assert_eq!(config.environment(), Some("staging"));
        assert_eq!(config.driver.agent_down_time, 30);
        assert_eq!(config.state.data_dir, dir.path());

        let config = load_config(ConfigArgs {
            config: Some(path),
            data_dir: None,
            environment: Some("prod".into()),
        })
        .unwrap();
        assert_eq!(config.environment(), Some("prod"));
    }

    #[test]
    fn zero_scrub_interval_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lbaas.toml");
        std::fs::write(&path, "[driver]\nscrub_interval = 0\n").unwrap();

        let result = load_config(ConfigArgs {
            config: Some(path),
            data_dir: None,
            environment: None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "lbaasd",
            "--log-format",
            "json",
            "serve",
            "--environment",
            "prod",
        ])
        .unwrap();
        assert!(matches!(cli.log_format, LogFormat::Json));
        assert!(matches!(
            cli.command,
            Command::Serve(ConfigArgs { environment: Some(ref e), .. }) if e == "prod"
        ));

        assert!(Cli::try_parse_from(["lbaasd", "agents"]).is_ok());
    }
}
