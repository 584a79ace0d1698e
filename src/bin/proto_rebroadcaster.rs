//! Relay broadcast traffic between participants listed in a TOML config.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use refbox_comm::config::NetworkConfig;
use refbox_comm::transport::relay::Relay;
use refbox_comm::utils::logging::init_logging;

#[derive(Parser, Debug)]
#[command(author, version, about = "Rebroadcast referee box datagrams between peers")]
struct Cli {
    /// Path to a TOML configuration file with a [relay] section.
    #[arg(long, short, required_unless_present = "print_example")]
    config: Option<PathBuf>,

    /// Override the configured packet loss probability.
    #[arg(long)]
    packet_loss: Option<f64>,

    /// Print an example configuration and exit.
    #[arg(long)]
    print_example: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.print_example {
        println!("{}", NetworkConfig::example_config());
        return ExitCode::SUCCESS;
    }

    let Some(path) = cli.config else {
        eprintln!("No configuration file given");
        return ExitCode::FAILURE;
    };
    let mut config = match NetworkConfig::from_file(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    };
    if let Some(loss) = cli.packet_loss {
        config.relay.packet_loss = loss;
    }

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let relay = match Relay::start(config.relay).await {
        Ok(relay) => relay,
        Err(e) => {
            error!(error = %e, "Failed to start relay");
            return ExitCode::FAILURE;
        }
    };
    info!("Relay running, press Ctrl-C to stop");

    shutdown_signal().await;
    info!("Received shutdown signal");
    relay.shutdown();
    ExitCode::SUCCESS
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            error!(error = %e, "Cannot listen for SIGTERM");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
