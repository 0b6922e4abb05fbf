// src/core/protocol/messages.rs

//! The wire message envelope (spec §6). One tagged enum replaces the
//! source's per-message-type class hierarchy (design notes (b)): every
//! variant carries `service_name`, `epoch_number` (where applicable), and
//! `sender` directly as fields rather than through a shared base class.

use crate::core::protocol::node_id::NodeId;
use serde::{Deserialize, Serialize};

/// A node's reachable client-facing address, returned by `RequestActiveReplicas`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReplicaAddr {
    pub node: NodeId,
    pub host: String,
    pub port: u16,
}

/// The single envelope carried over the wire. Every request/reply pair in
/// §6's table is one variant here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Envelope {
    // --- client/operator -> RC ---
    CreateServiceName {
        sender: NodeId,
        name: String,
        initial_state: Vec<u8>,
        initial_group: Vec<NodeId>,
    },
    DeleteServiceName {
        sender: NodeId,
        name: String,
    },
    ReconfigureRcNodeConfig {
        sender: NodeId,
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
    },
    RequestActiveReplicas {
        sender: NodeId,
        name: String,
    },
    /// Reply to `RequestActiveReplicas`. Not named in §6's table as a
    /// distinct type there (it says "reply carries..."), but it needs a
    /// wire representation, so it gets one variant.
    ActiveReplicas {
        name: String,
        epoch: u32,
        actives: Vec<ReplicaAddr>,
    },

    // --- RC -> AR ---
    StopEpoch {
        service_name: String,
        epoch_number: u32,
        requester: NodeId,
    },
    AckStopEpoch {
        service_name: String,
        epoch_number: u32,
        responder: NodeId,
        final_checkpoint: Option<Vec<u8>>,
    },
    StartEpoch {
        service_name: String,
        epoch_number: u32,
        members: Vec<NodeId>,
        prev_epoch_group: Vec<NodeId>,
        prev_epoch: u32,
        initial_state: Option<Vec<u8>>,
        /// The RC driving this transition, so `AckStartEpoch` has
        /// somewhere to go; not broken out in §6's payload column since
        /// it's carried by every message's sender ID, but the envelope
        /// here is per-variant rather than wrapped in a shared header.
        requester: NodeId,
    },
    AckStartEpoch {
        service_name: String,
        epoch_number: u32,
        responder: NodeId,
    },
    DropEpochFinalState {
        service_name: String,
        epoch_number: u32,
        initiator: NodeId,
    },
    AckDropEpochFinalState {
        service_name: String,
        epoch_number: u32,
        responder: NodeId,
    },

    // --- AR <-> AR ---
    RequestEpochFinalState {
        service_name: String,
        epoch_number: u32,
        initiator: NodeId,
    },
    EpochFinalState {
        service_name: String,
        epoch_number: u32,
        checkpoint_bytes: Vec<u8>,
    },

    // --- AR -> RC ---
    DemandReport {
        service_name: String,
        epoch_number: u32,
        sender: NodeId,
        profile_blob: Vec<u8>,
    },

    /// A uniform acknowledgement for control requests answered immediately
    /// (e.g. a rejected `Busy`), distinct from the protocol Acks above which
    /// always name (service_name, epoch_number).
    Error {
        code: String,
        detail: String,
    },
    Ok,
}

impl Envelope {
    pub fn service_name(&self) -> Option<&str> {
        match self {
            Envelope::CreateServiceName { name, .. } => Some(name),
            Envelope::DeleteServiceName { name, .. } => Some(name),
            Envelope::RequestActiveReplicas { name, .. } => Some(name),
            Envelope::ActiveReplicas { name, .. } => Some(name),
            Envelope::StopEpoch { service_name, .. }
            | Envelope::AckStopEpoch { service_name, .. }
            | Envelope::StartEpoch { service_name, .. }
            | Envelope::AckStartEpoch { service_name, .. }
            | Envelope::DropEpochFinalState { service_name, .. }
            | Envelope::AckDropEpochFinalState { service_name, .. }
            | Envelope::RequestEpochFinalState { service_name, .. }
            | Envelope::EpochFinalState { service_name, .. }
            | Envelope::DemandReport { service_name, .. } => Some(service_name),
            Envelope::ReconfigureRcNodeConfig { .. } | Envelope::Error { .. } | Envelope::Ok => {
                None
            }
        }
    }
}
