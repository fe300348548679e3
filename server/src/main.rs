use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use server::{AppState, serve};
use shared::config::load_server_config;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Development notification server (SSE push + REST)")]
struct Args {
    /// Path to the server TOML config
    #[arg(short, long, default_value = "server.toml")]
    config: String,

    /// Seconds between sweeps of SSE channels with no open streams
    #[arg(long, default_value_t = 60)]
    cleanup_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = load_server_config(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;

    let addr = config.server.addr();
    info!("{} token grants loaded", config.tokens.len());
    let state = AppState::new(config);

    let sse = state.sse.clone();
    let period = Duration::from_secs(args.cleanup_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            sse.cleanup().await;
        }
    });

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tokio::select! {
        result = serve(listener, state) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}
