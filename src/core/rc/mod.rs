// src/core/rc/mod.rs

//! The Reconfigurator role (§2, §4.1): owns the control log and record
//! store, drives every name's reconfiguration record through its state
//! machine, and answers client/operator control requests.

pub mod demand;
pub mod listener;
pub mod log;
pub mod node_config;
pub mod record;
pub mod statemachine;
pub mod store;

pub use record::{ReconfigurationRecord, RecordState};
pub use statemachine::Reconfigurator;

use crate::config::Config;
use crate::core::demand::NullDemandProfile;
use crate::core::net::{TcpMessenger, run_listener};
use crate::core::protocol::{NodeId, ReplicaAddr};
use crate::core::rc::demand::DemandAggregator;
use crate::core::rc::log::InMemoryControlLog;
use crate::core::rc::store::JsonFileRecordStore;
use anyhow::Result;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Runs this node as a Reconfigurator until the process is asked to
/// stop. Builds the durable log and record store, replays any prior
/// state, resumes in-flight transitions, and serves the protocol
/// listener.
pub async fn run(config: Arc<Config>) -> Result<()> {
    let address_book = build_address_book(&config);
    let socket_addresses: HashMap<NodeId, SocketAddr> = address_book
        .iter()
        .map(|(id, addr)| (id.clone(), SocketAddr::new(addr.host.parse().unwrap_or_else(|_| [0, 0, 0, 0].into()), addr.port)))
        .collect();

    let log = Arc::new(InMemoryControlLog::new());
    let store = Arc::new(JsonFileRecordStore::open(&config.record_store_path).await?);
    let messenger = Arc::new(TcpMessenger::new(socket_addresses));

    let rc = Arc::new(Reconfigurator::new(
        config.self_id.clone(),
        log,
        store,
        messenger.clone(),
    ));
    rc.resume_in_flight().await?;
    info!("Reconfigurator started, in-flight transitions resumed");

    let aggregator = Arc::new(DemandAggregator::new(NullDemandProfile));
    let decode_profile: Arc<dyn Fn(&[u8]) -> () + Send + Sync> = Arc::new(|_: &[u8]| ());
    let address_book = Arc::new(address_book);

    let bind_addr: SocketAddr = format!("0.0.0.0:{}", config.self_entry().starting_port).parse()?;

    run_listener(bind_addr, move |envelope| {
        let rc = rc.clone();
        let messenger = messenger.clone();
        let address_book = address_book.clone();
        let aggregator = aggregator.clone();
        let decode_profile = decode_profile.clone();
        async move {
            listener::dispatch(rc, messenger, address_book, aggregator, decode_profile, envelope).await;
        }
    })
    .await?;

    Ok(())
}

fn build_address_book(config: &Config) -> HashMap<NodeId, ReplicaAddr> {
    config
        .nodes
        .iter()
        .map(|(id, entry)| {
            (
                id.clone(),
                ReplicaAddr {
                    node: id.clone(),
                    host: entry.address.clone(),
                    port: entry.starting_port,
                },
            )
        })
        .collect()
}
