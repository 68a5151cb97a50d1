//! live-metrics
//!
//! Streams live dashboard counters from a metrics push endpoint and prints
//! every merged snapshot.
//!
//! # Architecture Overview
//!
//! ```text
//!   metrics server ──ws──▶ transport ──events──▶ client driver ──▶ dispatcher ──▶ stdout
//!                                                   │  ▲
//!                                      breaker ◀────┘  └──── backoff timer
//! ```

use clap::Parser;
use std::path::PathBuf;

use live_metrics::client::ClientStatus;
use live_metrics::config::{load_config, ClientConfig};
use live_metrics::lifecycle::signals;
use live_metrics::observability::{logging, metrics};
use live_metrics::LiveMetricsClient;

#[derive(Parser)]
#[command(name = "live-metrics")]
#[command(about = "Follow a live metrics push stream", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Push endpoint, overrides the configured one
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Access token, overrides the configured credential
    #[arg(short, long, env = "LIVE_METRICS_TOKEN")]
    token: Option<String>,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = Some(endpoint);
    }
    if let Some(token) = cli.token {
        config.credential = Some(token);
    }
    if let Some(addr) = cli.metrics_address {
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = addr;
    }

    logging::init_logging(&config.observability);
    tracing::info!("live-metrics v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let Some(endpoint) = config.endpoint.clone() else {
        return Err("no endpoint configured; pass --endpoint or set `endpoint` in the config file".into());
    };
    let credential = config.credential.clone();

    tracing::info!(
        base_delay_ms = config.reconnect.base_delay_ms,
        max_delay_ms = config.reconnect.max_delay_ms,
        max_retries = config.reconnect.max_retries,
        failure_threshold = config.breaker.failure_threshold,
        "Configuration loaded"
    );

    let client = LiveMetricsClient::new(config);
    let _subscription = client.subscribe(|snapshot| match serde_json::to_string_pretty(snapshot) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::warn!(error = %e, "Failed to render snapshot"),
    });

    let mut status = client.watch_status();
    let watcher = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current: ClientStatus = status.borrow_and_update().clone();
            match &current.last_error {
                Some(err) => eprintln!("[{}] {}", current.connection, err),
                None => eprintln!("[{}]", current.connection),
            }
        }
    });

    client.connect(&endpoint, credential.as_deref());

    signals::ctrl_c().await;

    client.shutdown();
    client.closed().await;
    drop(client);
    let _ = watcher.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
