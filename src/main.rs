//! Edge request gatekeeper.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                 GATEKEEPER                    │
//!   Client Request       │  ┌────────┐   ┌──────────┐   ┌────────────┐  │
//!   ─────────────────────┼─▶│ router │──▶│ classify │──▶│  session   │  │
//!                        │  │ + ids  │   │  route   │   │  resolve   │  │
//!                        │  └────────┘   └──────────┘   └─────┬──────┘  │
//!                        │                                    ▼         │
//!                        │  ┌──────────┐   ┌──────────────────────────┐ │
//!   Redirect / Reject    │  │ response │◀──│ composite rate limiter   │ │
//!   ◀────────────────────┼──│ composer │   │ (Redis or in-process)    │ │
//!                        │  └──────────┘   └────────────┬─────────────┘ │
//!                        │                              ▼ pass          │
//!   Client Response      │  ┌──────────────────────────────────────┐   │
//!   ◀────────────────────┼──│ forward to upstream + gate headers   │◀──┼── Upstream
//!                        │  └──────────────────────────────────────┘   │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use edge_gatekeeper::config::loader;
use edge_gatekeeper::lifecycle::{signals, startup, Shutdown};
use edge_gatekeeper::observability;

#[derive(Parser)]
#[command(name = "edge-gatekeeper")]
#[command(about = "Session gate and rate limiter in front of a web application", long_about = None)]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "GATEKEEPER_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration, print it and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = loader::load(args.config.as_deref())?;

    if args.check {
        let mut printable = config.clone();
        if printable.auth.secret.is_some() {
            printable.auth.secret = Some("<redacted>".to_string());
        }
        println!("{}", toml::to_string_pretty(&printable)?);
        return Ok(());
    }

    observability::init_logging(&config.observability.log_level, config.environment)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.environment,
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        "edge-gatekeeper starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => observability::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = startup::build_server(config).await;

    let shutdown = Arc::new(Shutdown::new());
    let receiver = shutdown.subscribe();
    signals::spawn_signal_handler(shutdown.clone());

    server.run(listener, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
