//! CrowWatch CLI: stream ERC20 Transfer events and flag mints and burns.
//!
//! # Commands
//! ```text
//! crowwatch [watch]                                   run until SIGINT / SIGTERM
//! crowwatch decode --topics <T0> <T1> <T2> --data <hex>
//! crowwatch config                                    print the effective config
//! ```

use std::path::PathBuf;
use std::process;

use alloy_primitives::Address;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crowwatch_core::{Monitor, MonitorConfig};
use crowwatch_ws::WsChainClient;

mod cmd_decode;
mod logging;

#[derive(Parser)]
#[command(
    name = "crowwatch",
    about = "Watch an ERC20 token's Transfer events over a WebSocket node",
    long_about = "
CrowWatch subscribes to a token contract's logs and prints one line per
Transfer, flagging mints and burns. It reconnects on its own when the
subscription drops and exits cleanly on SIGINT or SIGTERM.

ENVIRONMENT VARIABLES:
  CROWWATCH_WS_URL     WebSocket endpoint (ws:// or wss://)
  CROWWATCH_CONTRACT   Token contract address
  CROWWATCH_LOG        Log level (trace, debug, info, warn, error)
",
    version
)]
struct Cli {
    /// JSON config file; flags and environment override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// WebSocket endpoint
    #[arg(long, env = "CROWWATCH_WS_URL", global = true)]
    ws_url: Option<String>,

    /// Token contract address
    #[arg(long, env = "CROWWATCH_CONTRACT", global = true)]
    contract: Option<Address>,

    /// Global log level
    #[arg(long, env = "CROWWATCH_LOG", global = true)]
    log_level: Option<String>,

    /// Emit JSON structured logs
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe and print Transfer events until interrupted (default)
    Watch,

    /// Classify one log from raw topics + data without connecting
    Decode {
        /// topics[0] = event signature hash, topics[1..] = indexed params
        #[arg(long, num_args = 1..)]
        topics: Vec<String>,
        /// Non-indexed params (hex, 0x-prefixed)
        #[arg(long, default_value = "0x")]
        data: String,
    },

    /// Print the effective configuration as JSON
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    process::exit(exit_code(run(cli).await));
}

/// 0 on success; otherwise report the error on stderr and return 1.
fn exit_code(result: Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {e:#}");
            1
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = effective_config(&cli)?;

    match cli.command.unwrap_or(Commands::Watch) {
        Commands::Watch => cmd_watch(config).await,
        Commands::Decode { topics, data } => cmd_decode::run(&config, &topics, &data),
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Defaults, then the config file, then flags / environment.
fn effective_config(cli: &Cli) -> Result<MonitorConfig> {
    let mut config = match &cli.config {
        Some(path) => MonitorConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => MonitorConfig::default(),
    };
    if let Some(url) = &cli.ws_url {
        config.ws_url = url.clone();
    }
    if let Some(contract) = cli.contract {
        config.contract = contract;
    }
    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }
    if cli.log_json {
        config.log.json = true;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn cmd_watch(config: MonitorConfig) -> Result<()> {
    logging::init_tracing(&config.log);

    let monitor = Monitor::new(&config, WsChainClient::new());
    let stats = monitor.run(shutdown_signal(), std::io::stdout()).await?;
    tracing::debug!(?stats, "monitor finished");
    Ok(())
}

/// Resolves on the first SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_watch() {
        let cli = Cli::try_parse_from(["crowwatch"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(effective_config(&cli).unwrap(), MonitorConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "crowwatch",
            "--ws-url",
            "ws://127.0.0.1:8546",
            "--contract",
            "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
            "--log-level",
            "debug",
            "--log-json",
            "watch",
        ])
        .unwrap();
        let config = effective_config(&cli).unwrap();
        assert_eq!(config.ws_url, "ws://127.0.0.1:8546");
        assert_eq!(config.contract, address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"));
        assert_eq!(config.log.level, "debug");
        assert!(config.log.json);
    }

    #[test]
    fn invalid_url_flag_is_rejected() {
        let cli = Cli::try_parse_from(["crowwatch", "--ws-url", "http://node", "config"]).unwrap();
        assert!(effective_config(&cli).is_err());
    }

    #[test]
    fn clean_shutdown_exits_zero() {
        assert_eq!(exit_code(Ok(())), 0);
    }

    #[test]
    fn monitor_failure_exits_one() {
        use crowwatch_core::{MonitorError, TransportError};

        let startup = MonitorError::Startup(TransportError::ConnectionFailed {
            url: "wss://ws.wemix.com".into(),
            reason: "connection refused".into(),
        });
        assert_eq!(exit_code(Err(startup.into())), 1);

        let exhausted = MonitorError::ReconnectExhausted {
            attempts: 3,
            last: TransportError::Closed("gone".into()),
        };
        assert_eq!(exit_code(Err(exhausted.into())), 1);
    }

    #[test]
    fn decode_takes_multiple_topics() {
        let cli = Cli::try_parse_from([
            "crowwatch", "decode", "--topics", "0x01", "0x02", "0x03", "--data", "0x",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Decode { topics, data }) => {
                assert_eq!(topics.len(), 3);
                assert_eq!(data, "0x");
            }
            _ => panic!("expected decode"),
        }
    }
}
