use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use sockwrite::client::{self, ClientArgs};
use sockwrite::config::{
    DEFAULT_DRAIN_TIMEOUT, DEFAULT_MAX_CONNECTIONS, DEFAULT_METRICS_INTERVAL, ServerConfig,
};
use sockwrite::server::metrics;
use sockwrite::transport::framing::DEFAULT_MAX_CONTENT_LENGTH;
use sockwrite::{Server, ServerState};
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "sockwrite")]
#[command(about = "Unix socket server that appends to or clears a single file")]
struct Opts {
    #[command(subcommand)]
    cmd: Mode,
}

/// CLI modes
#[derive(Subcommand, Debug)]
enum Mode {
    /// Run the server
    Server {
        /// Path of the Unix socket to listen on
        socket: PathBuf,

        /// Path of the file to write to
        file: PathBuf,

        /// Maximum number of connections served at once
        #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS)]
        max_connections: usize,

        /// Seconds in-flight connections get to finish on shutdown
        #[arg(long, default_value_t = DEFAULT_DRAIN_TIMEOUT.as_secs())]
        drain_timeout_secs: u64,

        /// Largest request content accepted, in bytes
        #[arg(long, default_value_t = DEFAULT_MAX_CONTENT_LENGTH)]
        max_content_length: usize,

        /// Seconds between metrics reports (0 disables them)
        #[arg(long, default_value_t = DEFAULT_METRICS_INTERVAL.as_secs())]
        metrics_interval_secs: u64,
    },

    /// Send a single request
    Client {
        #[command(flatten)]
        client: ClientArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    metrics::init_logging();

    let opts = Opts::parse();
    match opts.cmd {
        Mode::Server {
            socket,
            file,
            max_connections,
            drain_timeout_secs,
            max_content_length,
            metrics_interval_secs,
        } => {
            let config = ServerConfig::new(socket, file)
                .with_max_connections(max_connections)
                .with_drain_timeout(Duration::from_secs(drain_timeout_secs))
                .with_max_content_length(max_content_length)
                .with_metrics_interval(Duration::from_secs(metrics_interval_secs));
            run_server(config).await?;
        }

        Mode::Client { client } => {
            client::run_client(client).await?;
        }
    }
    Ok(())
}

async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let interval = config.metrics_interval;
    let server = Server::new(config)?;
    let handle = server.handle();

    // Stop on SIGINT / SIGTERM
    let coordinator = handle.shutdown_coordinator();
    tokio::spawn(async move {
        if let Err(e) = coordinator.wait_for_signal().await {
            error!("Failed to install signal handlers: {}", e);
        }
    });

    // Spawn metrics reporter
    if !interval.is_zero() {
        let reporter = handle.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if reporter.state() >= ServerState::Stopping {
                    break;
                }
                reporter.metrics().snapshot().report();
            }
        });
    }

    server.start().await
}
