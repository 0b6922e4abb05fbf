// src/core/messenger.rs

//! `PeerMessenger`: the narrow "deliver bytes between nodes" collaborator
//! (§1) shared by both the RC's outbound drivers and the AR's
//! peer-to-peer state transfer. Transport security is a non-goal (§1),
//! so this is a plain, unauthenticated request/response send.

use crate::core::protocol::{Envelope, NodeId};

#[async_trait::async_trait]
pub trait PeerMessenger: Send + Sync {
    async fn send_to(&self, peer: &NodeId, message: Envelope);
}
