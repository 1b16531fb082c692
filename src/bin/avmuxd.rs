//! Engine host speaking the control protocol on stdin/stdout
//!
//! Logs go to stderr; set `RUST_LOG` to change the level (default `info`).

use std::sync::Arc;

use avmux::{ControlPump, Engine, EngineConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let (engine, events) = Engine::new(EngineConfig::default());
    let engine = Arc::new(engine);
    let pump = ControlPump::new(engine.clone());
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "avmuxd started");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    let result = pump
        .run_until(tokio::io::stdin(), tokio::io::stdout(), events, shutdown)
        .await;

    engine.shutdown().await;
    tracing::info!("avmuxd stopped");
    result.map_err(Into::into)
}
