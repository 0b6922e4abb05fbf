// src/core/ar/listener.rs

//! Dispatches inbound envelopes to an `ActiveReplica`: the RC-facing
//! epoch transitions and the AR-to-AR state-transfer exchange.

use crate::core::ar::coordinator::IntraGroupCoordinator;
use crate::core::ar::handlers::ActiveReplica;
use crate::core::messenger::PeerMessenger;
use crate::core::protocol::Envelope;
use std::sync::Arc;

pub async fn dispatch<C, M>(ar: Arc<ActiveReplica<C, M>>, envelope: Envelope)
where
    C: IntraGroupCoordinator + 'static,
    M: PeerMessenger + 'static,
{
    match envelope {
        Envelope::StopEpoch {
            service_name,
            epoch_number,
            requester,
        } => {
            ar.handle_stop_epoch(service_name, epoch_number, requester).await;
        }
        Envelope::StartEpoch {
            service_name,
            epoch_number,
            members,
            prev_epoch_group,
            prev_epoch,
            initial_state,
            requester,
        } => {
            ar.handle_start_epoch(
                service_name,
                epoch_number,
                members,
                prev_epoch_group,
                prev_epoch,
                initial_state,
                requester,
            )
            .await;
        }
        Envelope::DropEpochFinalState {
            service_name,
            epoch_number,
            initiator,
        } => {
            ar.handle_drop_epoch(service_name, epoch_number, initiator).await;
        }
        Envelope::RequestEpochFinalState {
            service_name,
            epoch_number,
            initiator,
        } => {
            ar.handle_request_final_state(service_name, epoch_number, initiator).await;
        }
        Envelope::EpochFinalState {
            service_name,
            epoch_number,
            checkpoint_bytes,
        } => {
            ar.deliver_final_state(&service_name, epoch_number, checkpoint_bytes);
        }
        Envelope::CreateServiceName { .. }
        | Envelope::DeleteServiceName { .. }
        | Envelope::ReconfigureRcNodeConfig { .. }
        | Envelope::RequestActiveReplicas { .. }
        | Envelope::ActiveReplicas { .. }
        | Envelope::AckStopEpoch { .. }
        | Envelope::AckStartEpoch { .. }
        | Envelope::AckDropEpochFinalState { .. }
        | Envelope::DemandReport { .. }
        | Envelope::Error { .. }
        | Envelope::Ok => {
            // Not addressed to the AR role.
        }
    }
}
