use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use client::{
    ConnectionManager, HttpNotificationsApi, ReconnectPolicy, SseTransport, StaticCredentials,
    StoreSync,
};
use shared::config::load_client_config;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Follow live notifications for one user")]
struct Args {
    /// Path to the client TOML config
    #[arg(short, long, default_value = "client.toml")]
    config: String,

    /// Bearer token; overrides the config file and NOTIFY_TOKEN
    #[arg(long)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = load_client_config(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;

    let credentials = Arc::new(StaticCredentials::from_option(
        args.token.or_else(|| config.auth.token.clone()),
    ));

    let manager = ConnectionManager::builder(
        Arc::new(SseTransport::from_config(&config.push)),
        credentials.clone(),
    )
    .policy(ReconnectPolicy::from_config(&config.reconnect))
    .health_check_interval(config.reconnect.health_check_interval())
    .connect_timeout(config.push.connect_timeout())
    .build()
    .install_global()?;

    let api = Arc::new(HttpNotificationsApi::new(config.api.clone(), credentials));
    let sync = StoreSync::spawn(api);
    sync.attach(manager);
    manager.start().await;

    let mut toasts = sync.toasts();
    let mut store = sync.watch();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            toast = toasts.recv() => match toast {
                Ok(toast) => info!("[{}] {}: {}", toast.kind, toast.title, toast.message),
                Err(RecvError::Lagged(n)) => warn!("Skipped {} toasts", n),
                Err(RecvError::Closed) => break,
            },
            changed = store.changed() => {
                if changed.is_err() {
                    break;
                }
                let (total, unread) = {
                    let current = store.borrow_and_update();
                    (current.len(), current.unread_count())
                };
                info!(
                    "{} notifications, {} unread (push link {})",
                    total,
                    unread,
                    if manager.is_connected() { "up" } else { "down" }
                );
            }
        }
    }

    info!("Shutting down");
    sync.detach(manager);
    manager.stop();
    Ok(())
}
