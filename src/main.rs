use assetreaper::cli::{Cli, Command};
use assetreaper::config::{self, DaemonConfig};
use assetreaper::{client, daemon, worker};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Daemon {
            store,
            exec,
            command,
            workers,
        } => {
            let config = daemon_config(store, exec, command, workers).unwrap_or_else(|e| {
                eprintln!("assetreaper daemon: {e}");
                std::process::exit(1);
            });
            if let Err(e) = daemon::run(config).await {
                tracing::error!(error = %e, "daemon failed");
                eprintln!("assetreaper daemon: {e}");
                std::process::exit(1);
            }
        }
        Command::Worker { exec, command } => {
            let config = command.into_exec(exec, 1).unwrap_or_else(|e| {
                eprintln!("assetreaper worker: {e}");
                std::process::exit(1);
            });
            if let Err(e) = worker::run(config).await {
                tracing::error!(error = %e, "worker failed");
                eprintln!("assetreaper worker: {e}");
                std::process::exit(1);
            }
        }
        Command::Client { action } => {
            if let Err(e) = client::run(action).await {
                tracing::error!(error = %e, "client failed");
                eprintln!("assetreaper client: {e}");
                std::process::exit(1);
            }
        }
    }
}

fn daemon_config(
    store: Option<std::path::PathBuf>,
    exec: Option<String>,
    command: assetreaper::cli::CommandArgs,
    workers: usize,
) -> Result<DaemonConfig, config::ConfigError> {
    let store_path = match store {
        Some(path) => path,
        None => config::default_store_path()?,
    };
    let exec = exec
        .map(|program| command.into_exec(program, workers))
        .transpose()?;
    Ok(DaemonConfig {
        socket_path: config::socket_path()?,
        store_path,
        exec,
    })
}
