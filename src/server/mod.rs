// src/server/mod.rs

//! Top-level orchestration: starts the metrics server (if enabled) and
//! the role's main loop side by side, and tears both down on the first
//! shutdown signal or the first of either to fail.

mod metrics_server;

use crate::config::{Config, NodeRole};
use crate::core::{ar, rc};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

#[cfg(windows)]
use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Waits for SIGINT/SIGTERM (Unix) or Ctrl-C (Windows).
async fn await_shutdown_signal() {
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    #[cfg(windows)]
    let mut ctrl_c = signal::ctrl_c().expect("failed to install Ctrl-C handler");

    tokio::select! {
        _ = async { #[cfg(unix)] { sigint.recv().await; info!("SIGINT received, shutting down."); } } => {},
        _ = async { #[cfg(unix)] { sigterm.recv().await; info!("SIGTERM received, shutting down."); } } => {},
        _ = async { #[cfg(windows)] { ctrl_c.await; info!("Ctrl-C received, shutting down."); } } => {},
    }
}

/// Runs this node to completion: the role's main loop (RC or AR) plus,
/// if enabled, the Prometheus exporter. Returns once a shutdown signal
/// arrives or the role's loop exits on its own (an error, since it
/// otherwise runs forever).
pub async fn run(config: Config) -> Result<()> {
    let config = Arc::new(config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let metrics_handle = if config.metrics.enabled {
        let port = config.metrics.port;
        let shutdown_rx = shutdown_tx.subscribe();
        Some(tokio::spawn(async move {
            metrics_server::run_metrics_server(port, shutdown_rx).await;
        }))
    } else {
        None
    };

    let role_config = config.clone();
    let role_handle = tokio::spawn(async move {
        match role_config.role {
            NodeRole::Reconfigurator => rc::run(role_config).await,
            NodeRole::Active => ar::run(role_config).await,
        }
    });

    tokio::select! {
        _ = await_shutdown_signal() => {
            info!("shutting down");
        }
        res = role_handle => {
            match res {
                Ok(Ok(())) => info!("role loop exited"),
                Ok(Err(e)) => error!("role loop failed: {e}"),
                Err(e) => error!("role loop panicked: {e:?}"),
            }
        }
    }

    let _ = shutdown_tx.send(());
    if let Some(handle) = metrics_handle {
        let _ = handle.await;
    }

    Ok(())
}
