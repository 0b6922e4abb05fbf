// src/core/rc/listener.rs

//! Dispatches inbound envelopes to the Reconfigurator: client/operator
//! control requests, AR acknowledgements, and `DemandReport`s.

use crate::core::demand::DemandProfile;
use crate::core::messenger::PeerMessenger;
use crate::core::protocol::{Envelope, NodeId, ReplicaAddr};
use crate::core::rc::demand::DemandAggregator;
use crate::core::rc::log::ControlLog;
use crate::core::rc::statemachine::Reconfigurator;
use crate::core::rc::store::RecordStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, warn};

/// Handles one inbound envelope. Control-request errors are logged
/// rather than surfaced anywhere, matching the listener's fire-and-forget
/// transport (§1: client SDKs, and therefore synchronous replies to
/// clients, are a non-goal).
pub async fn dispatch<L, S, M, P>(
    rc: Arc<Reconfigurator<L, S, M>>,
    messenger: Arc<M>,
    address_book: Arc<HashMap<NodeId, ReplicaAddr>>,
    aggregator: Arc<DemandAggregator<P>>,
    decode_profile: Arc<dyn Fn(&[u8]) -> P::Profile + Send + Sync>,
    envelope: Envelope,
) where
    L: ControlLog + 'static,
    S: RecordStore + 'static,
    M: PeerMessenger + 'static,
    P: DemandProfile + 'static,
{
    match envelope {
        Envelope::CreateServiceName {
            name,
            initial_state,
            initial_group,
            ..
        } => {
            if let Err(e) = rc.create(name.clone(), initial_state, initial_group).await {
                warn!(%name, error = %e, "CreateServiceName failed");
            }
        }
        Envelope::DeleteServiceName { name, .. } => {
            if let Err(e) = rc.change_replicas(&name, None).await {
                warn!(%name, error = %e, "DeleteServiceName failed");
            }
        }
        Envelope::ReconfigureRcNodeConfig { added, removed, .. } => {
            if let Err(e) = crate::core::rc::node_config::reconfigure(&rc, added, removed).await {
                error!(error = %e, "ReconfigureRcNodeConfig failed");
            }
        }
        Envelope::AckStopEpoch {
            service_name,
            epoch_number,
            responder,
            final_checkpoint,
        } => {
            if let Err(e) = rc
                .on_ack_stop_epoch(&service_name, epoch_number, responder, final_checkpoint)
                .await
            {
                warn!(name = %service_name, error = %e, "AckStopEpoch handling failed");
            }
        }
        Envelope::AckStartEpoch {
            service_name,
            epoch_number,
            responder,
        } => {
            if let Err(e) = rc.on_ack_start_epoch(&service_name, epoch_number, responder).await {
                warn!(name = %service_name, error = %e, "AckStartEpoch handling failed");
            }
        }
        Envelope::AckDropEpochFinalState {
            service_name,
            responder,
            ..
        } => {
            if let Err(e) = rc.on_ack_drop(&service_name, responder).await {
                warn!(name = %service_name, error = %e, "AckDropEpochFinalState handling failed");
            }
        }
        Envelope::DemandReport {
            service_name,
            profile_blob,
            ..
        } => {
            let profile = decode_profile(&profile_blob);
            match rc.active_replicas(&service_name).await {
                Ok(actives) => {
                    if let Some(new_group) = aggregator.observe(&service_name, profile, &actives)
                        && let Err(e) = rc.change_replicas(&service_name, Some(new_group)).await
                    {
                        warn!(name = %service_name, error = %e, "demand-triggered reconfiguration failed");
                    }
                }
                Err(e) => warn!(name = %service_name, error = %e, "DemandReport for unknown name"),
            }
        }
        Envelope::RequestActiveReplicas { sender, name } => match rc.record(&name).await {
            Ok(record) => {
                let resolved = record
                    .actives
                    .iter()
                    .filter_map(|id| address_book.get(id).cloned())
                    .collect();
                messenger
                    .send_to(
                        &sender,
                        Envelope::ActiveReplicas {
                            name,
                            epoch: record.epoch,
                            actives: resolved,
                        },
                    )
                    .await;
            }
            Err(e) => warn!(%name, error = %e, "RequestActiveReplicas for unknown name"),
        },
        Envelope::ActiveReplicas { .. }
        | Envelope::StopEpoch { .. }
        | Envelope::StartEpoch { .. }
        | Envelope::DropEpochFinalState { .. }
        | Envelope::RequestEpochFinalState { .. }
        | Envelope::EpochFinalState { .. }
        | Envelope::Error { .. }
        | Envelope::Ok => {
            // Not addressed to the RC role.
        }
    }
}
