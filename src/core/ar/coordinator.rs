// src/core/ar/coordinator.rs

//! `IntraGroupCoordinator`: the within-group consensus engine, an
//! external collaborator per §1/§9 design note (b). Narrow interface:
//! submit a request and get an `executed` callback; create/delete a
//! local group; read back its final state; obtain the opaque "stop"
//! request to submit for a given epoch.

use crate::core::errors::GnsError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

/// An opaque request the coordinator knows how to execute. The only
/// request kind the reconfiguration core itself submits is the
/// distinguished "stop" request (§4.2); application write/read requests
/// pass through the same `submit` path but are opaque bytes to this
/// trait.
#[derive(Clone, Debug)]
pub enum GroupRequest {
    Stop { name: String, epoch: u32 },
    Application { name: String, payload: Vec<u8> },
}

#[derive(Clone, Debug)]
pub struct ExecutedResult {
    pub handled_locally: bool,
    /// Present only for `Stop` requests: the final-state checkpoint
    /// produced atomically with the stop.
    pub checkpoint: Option<Vec<u8>>,
}

#[async_trait]
pub trait IntraGroupCoordinator: Send + Sync {
    async fn submit(&self, request: GroupRequest) -> Result<ExecutedResult, GnsError>;
    async fn create_group(
        &self,
        name: &str,
        epoch: u32,
        initial_state: Vec<u8>,
        members: Vec<crate::core::protocol::NodeId>,
    ) -> Result<(), GnsError>;
    async fn delete_group(&self, name: &str, epoch: u32) -> Result<(), GnsError>;
    async fn final_state(&self, name: &str, epoch: u32) -> Result<Option<Vec<u8>>, GnsError>;
}

/// A single-node linearizer standing in for the real within-group
/// consensus engine: every request simply runs against an in-memory
/// byte blob per (name, epoch), serialized by the group's shard lock.
/// Sufficient to drive and test the reconfiguration protocol above it,
/// which treats the coordinator as an opaque linearizable executor.
#[derive(Default)]
pub struct LocalCoordinator {
    groups: DashMap<(String, u32), Vec<u8>>,
}

impl LocalCoordinator {
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
        }
    }
}

#[async_trait]
impl IntraGroupCoordinator for LocalCoordinator {
    async fn submit(&self, request: GroupRequest) -> Result<ExecutedResult, GnsError> {
        match request {
            GroupRequest::Stop { name, epoch } => {
                let checkpoint = self
                    .groups
                    .get(&(name.clone(), epoch))
                    .map(|v| v.clone())
                    .unwrap_or_default();
                Ok(ExecutedResult {
                    handled_locally: true,
                    checkpoint: Some(checkpoint),
                })
            }
            GroupRequest::Application { name, payload } => {
                // Only the most recent epoch for `name` is ever RUNNING
                // locally, so the caller resolves the epoch before
                // submitting; here we just need *a* key to apply to.
                let key = self
                    .groups
                    .iter()
                    .find(|e| e.key().0 == name)
                    .map(|e| e.key().clone());
                if let Some(key) = key {
                    if let Some(mut entry) = self.groups.get_mut(&key) {
                        *entry = payload;
                    }
                }
                Ok(ExecutedResult {
                    handled_locally: true,
                    checkpoint: None,
                })
            }
        }
    }

    async fn create_group(
        &self,
        name: &str,
        epoch: u32,
        initial_state: Vec<u8>,
        _members: Vec<crate::core::protocol::NodeId>,
    ) -> Result<(), GnsError> {
        self.groups
            .insert((name.to_string(), epoch), initial_state);
        Ok(())
    }

    async fn delete_group(&self, name: &str, epoch: u32) -> Result<(), GnsError> {
        self.groups.remove(&(name.to_string(), epoch));
        Ok(())
    }

    async fn final_state(&self, name: &str, epoch: u32) -> Result<Option<Vec<u8>>, GnsError> {
        Ok(self.groups.get(&(name.to_string(), epoch)).map(|v| v.clone()))
    }
}

/// Unused by `LocalCoordinator` but kept for coordinators that answer
/// `submit` asynchronously off an internal worker, matching §5's
/// "receives an executed(request, handledLocally) callback on an
/// internal worker" scheduling model.
pub type ExecutedSender = oneshot::Sender<Result<ExecutedResult, GnsError>>;
pub type SharedCoordinator = Arc<dyn IntraGroupCoordinator>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stop_returns_whatever_was_created() {
        let coord = LocalCoordinator::new();
        coord
            .create_group("n0", 0, b"v0".to_vec(), vec![])
            .await
            .unwrap();
        let result = coord
            .submit(GroupRequest::Stop {
                name: "n0".into(),
                epoch: 0,
            })
            .await
            .unwrap();
        assert_eq!(result.checkpoint, Some(b"v0".to_vec()));
    }
}
