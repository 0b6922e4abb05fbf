// src/core/ar/mod.rs

//! The Active Replica role (§2, §4.2): hosts epochs of names, participates
//! in the reconfiguration protocol, and forwards application requests to
//! its intra-group coordinator.

pub mod coordinator;
pub mod demand;
pub mod handlers;
pub mod instance;
pub mod listener;
pub mod transfer;

pub use coordinator::{GroupRequest, IntraGroupCoordinator, LocalCoordinator};
pub use handlers::ActiveReplica;
pub use instance::{EpochInstance, EpochStatus};

use crate::config::Config;
use crate::core::net::{TcpMessenger, run_listener};
use crate::core::protocol::NodeId;
use anyhow::Result;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Runs this node as an Active Replica until the process is asked to
/// stop. Hosts whatever epoch instances the RC assigns it and serves
/// the protocol listener; the within-group consensus engine is a
/// `LocalCoordinator` standing in for the real one (§1 non-goal).
pub async fn run(config: Arc<Config>) -> Result<()> {
    let socket_addresses: HashMap<NodeId, SocketAddr> = config
        .nodes
        .iter()
        .filter_map(|(id, entry)| {
            let addr: SocketAddr = format!("{}:{}", entry.address, entry.starting_port)
                .parse()
                .ok()?;
            Some((id.clone(), addr))
        })
        .collect();

    let messenger = Arc::new(TcpMessenger::new(socket_addresses));
    let coordinator = Arc::new(LocalCoordinator::new());
    let ar = Arc::new(ActiveReplica::new(
        config.self_id.clone(),
        coordinator,
        messenger,
    ));
    info!(self_id = %config.self_id, "Active Replica started");

    let bind_addr: SocketAddr = format!("0.0.0.0:{}", config.self_entry().starting_port).parse()?;

    run_listener(bind_addr, move |envelope| {
        let ar = ar.clone();
        async move {
            listener::dispatch(ar, envelope).await;
        }
    })
    .await?;

    Ok(())
}
