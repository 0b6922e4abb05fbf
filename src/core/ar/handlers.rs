// src/core/ar/handlers.rs

//! The four RC-facing request handlers plus the one peer-to-peer handler
//! an Active Replica implements (§4.2). All are idempotent with respect
//! to (name, epoch).

use crate::core::ar::coordinator::{GroupRequest, IntraGroupCoordinator};
use crate::core::ar::instance::{EpochInstance, EpochStatus};
use crate::core::ar::transfer::{self, FetchResults};
use crate::core::messenger::PeerMessenger;
use crate::core::protocol::{Envelope, NodeId};
use crate::core::tasks::scheduler::TaskScheduler;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

fn stop_submit_key(name: &str, epoch: u32) -> String {
    format!("stopsubmit:{name}:{epoch}")
}

/// Per-node state for the Active Replica role: the local epoch-instance
/// table plus the collaborators the handlers drive.
pub struct ActiveReplica<C, M> {
    pub self_id: NodeId,
    instances: Arc<DashMap<(String, u32), EpochInstance>>,
    coordinator: Arc<C>,
    messenger: Arc<M>,
    scheduler: Arc<TaskScheduler>,
    fetch_replies: DashMap<(String, u32), mpsc::Sender<Vec<u8>>>,
    fetch_results: FetchResults,
}

impl<C, M> ActiveReplica<C, M>
where
    C: IntraGroupCoordinator + 'static,
    M: PeerMessenger + 'static,
{
    pub fn new(self_id: NodeId, coordinator: Arc<C>, messenger: Arc<M>) -> Self {
        Self {
            self_id,
            instances: Arc::new(DashMap::new()),
            coordinator,
            messenger,
            scheduler: Arc::new(TaskScheduler::new()),
            fetch_replies: DashMap::new(),
            fetch_results: Arc::new(DashMap::new()),
        }
    }

    pub fn instance(&self, name: &str, epoch: u32) -> Option<EpochInstance> {
        self.instances
            .get(&(name.to_string(), epoch))
            .map(|r| r.clone())
    }

    /// `StopEpoch(name, epoch, requester)`.
    pub async fn handle_stop_epoch(&self, name: String, epoch: u32, requester: NodeId) {
        let key = (name.clone(), epoch);
        let status = self.instances.get(&key).map(|i| i.status);

        match status {
            None => {
                // Never existed locally, or epoch already superseded and
                // since dropped: ack with an empty checkpoint.
                self.send_ack_stop(&name, epoch, &requester, None).await;
            }
            Some(EpochStatus::Stopped) | Some(EpochStatus::FinalKept) | Some(EpochStatus::Dropped) => {
                let checkpoint = self.instances.get(&key).and_then(|i| i.final_checkpoint.clone());
                self.send_ack_stop(&name, epoch, &requester, checkpoint).await;
            }
            Some(EpochStatus::Starting) | Some(EpochStatus::Running) => {
                // Dedup concurrent/retransmitted StopEpochs: only one
                // coordinator submission per (name, epoch) is ever in
                // flight (§4.2 "Retransmitted StopEpochs ... are dropped").
                let submit_key = stop_submit_key(&name, epoch);
                if self.scheduler.is_running(&submit_key) {
                    return;
                }
                let coordinator = self.coordinator.clone();
                let messenger = self.messenger.clone();
                let instances_name = name.clone();
                let requester = requester.clone();
                let self_id = self.self_id.clone();
                let scheduler_for_retire = self.scheduler.clone();
                let submit_key_for_retire = submit_key.clone();
                let instances = self.instances.clone();

                self.scheduler.spawn_or_attach(submit_key, move |notify| async move {
                    let result = coordinator
                        .submit(GroupRequest::Stop {
                            name: instances_name.clone(),
                            epoch,
                        })
                        .await;
                    if let Ok(executed) = result {
                        let checkpoint = executed.checkpoint.unwrap_or_default();
                        if let Some(mut instance) = instances.get_mut(&(instances_name.clone(), epoch)) {
                            instance.mark_stopped(checkpoint.clone());
                        }
                        messenger
                            .send_to(
                                &requester,
                                Envelope::AckStopEpoch {
                                    service_name: instances_name,
                                    epoch_number: epoch,
                                    responder: self_id,
                                    final_checkpoint: Some(checkpoint),
                                },
                            )
                            .await;
                    }
                    notify.notify_waiters();
                    scheduler_for_retire.retire(&submit_key_for_retire);
                });
            }
        }
    }

    async fn send_ack_stop(&self, name: &str, epoch: u32, requester: &NodeId, checkpoint: Option<Vec<u8>>) {
        self.messenger
            .send_to(
                requester,
                Envelope::AckStopEpoch {
                    service_name: name.to_string(),
                    epoch_number: epoch,
                    responder: self.self_id.clone(),
                    final_checkpoint: checkpoint,
                },
            )
            .await;
    }

    /// `StartEpoch(name, epoch, members, prevEpochGroup, prevEpoch, initialState?)`.
    pub async fn handle_start_epoch(
        &self,
        name: String,
        epoch: u32,
        members: Vec<NodeId>,
        prev_epoch_group: Vec<NodeId>,
        prev_epoch: u32,
        initial_state: Option<Vec<u8>>,
        requester: NodeId,
    ) {
        let key = (name.clone(), epoch);
        if self.instances.contains_key(&key) {
            self.send_ack_start(&name, epoch, &requester).await;
            return;
        }

        if prev_epoch_group.is_empty() {
            let state = initial_state.unwrap_or_default();
            let _ = self
                .coordinator
                .create_group(&name, epoch, state, members.clone())
                .await;
            let mut instance = EpochInstance::starting(name.clone(), epoch, members);
            instance.mark_running();
            self.instances.insert(key, instance);
            self.send_ack_start(&name, epoch, &requester).await;
            return;
        }

        // Fetch the previous epoch's final state before creating the
        // new instance; concurrent StartEpochs for the same (name,
        // epoch) attach as notifiees of the one fetch task (§4.2).
        let (tx, rx) = mpsc::channel(1);
        self.fetch_replies.insert((name.clone(), prev_epoch), tx);

        let handle = transfer::start_or_attach_fetch(
            self.scheduler.clone(),
            self.fetch_results.clone(),
            self.messenger.clone(),
            name.clone(),
            prev_epoch,
            prev_epoch_group,
            self.self_id.clone(),
            rx,
        );
        handle.wait().await;
        self.fetch_replies.remove(&(name.clone(), prev_epoch));

        // Read rather than remove: other StartEpochs attached to the
        // same fetch may not have observed it yet.
        let checkpoint = self
            .fetch_results
            .get(&transfer::fetch_task_key(&name, prev_epoch))
            .map(|r| r.clone())
            .unwrap_or_default();

        let _ = self
            .coordinator
            .create_group(&name, epoch, checkpoint, members.clone())
            .await;
        let mut instance = EpochInstance::starting(name.clone(), epoch, members);
        instance.mark_running();
        self.instances.insert((name.clone(), epoch), instance);
        self.send_ack_start(&name, epoch, &requester).await;

        // This node has everything it needs from the prior epoch now;
        // its local copy is only advisory from here on (§3 FINAL_KEPT).
        self.mark_prior_epoch_final_kept(&name, prev_epoch);
    }

    async fn send_ack_start(&self, name: &str, epoch: u32, requester: &NodeId) {
        self.messenger
            .send_to(
                requester,
                Envelope::AckStartEpoch {
                    service_name: name.to_string(),
                    epoch_number: epoch,
                    responder: self.self_id.clone(),
                },
            )
            .await;
    }

    /// `RequestEpochFinalState(name, epoch, requester)`, AR-to-AR.
    pub async fn handle_request_final_state(&self, name: String, epoch: u32, requester: NodeId) {
        let checkpoint = self
            .instances
            .get(&(name.clone(), epoch))
            .filter(|i| i.is_retrievable())
            .and_then(|i| i.final_checkpoint.clone());

        match checkpoint {
            Some(bytes) => {
                self.messenger
                    .send_to(
                        &requester,
                        Envelope::EpochFinalState {
                            service_name: name,
                            epoch_number: epoch,
                            checkpoint_bytes: bytes,
                        },
                    )
                    .await;
            }
            None => {
                // Silently drop (§4.2).
            }
        }
    }

    /// An `EpochFinalState` reply arriving from a peer: routes the bytes
    /// to whatever fetch task is waiting on them.
    pub fn deliver_final_state(&self, name: &str, epoch: u32, bytes: Vec<u8>) {
        if let Some(tx) = self.fetch_replies.get(&(name.to_string(), epoch)) {
            let _ = tx.try_send(bytes);
        }
    }

    /// `DropEpochFinalState(name, epoch)`.
    pub async fn handle_drop_epoch(&self, name: String, epoch: u32, initiator: NodeId) {
        if let Some(mut instance) = self.instances.get_mut(&(name.clone(), epoch)) {
            instance.mark_dropped();
        } else {
            warn!(%name, epoch, "DropEpochFinalState for unknown instance, acking anyway");
        }
        if let Err(err) = self.coordinator.delete_group(&name, epoch).await {
            warn!(%name, epoch, %err, "failed to release coordinator group on drop");
        }
        // Cancel any pending fetch that would otherwise answer a
        // RequestEpochFinalState for the now-dropped epoch.
        self.scheduler.cancel(&transfer::fetch_task_key(&name, epoch));
        self.fetch_replies.remove(&(name.clone(), epoch));
        self.fetch_results.remove(&transfer::fetch_task_key(&name, epoch));

        self.messenger
            .send_to(
                &initiator,
                Envelope::AckDropEpochFinalState {
                    service_name: name,
                    epoch_number: epoch,
                    responder: self.self_id.clone(),
                },
            )
            .await;
    }

    /// Once a new epoch's group has fully acknowledged start, the prior
    /// epoch's retained checkpoint becomes advisory-only.
    pub fn mark_prior_epoch_final_kept(&self, name: &str, prev_epoch: u32) {
        if let Some(mut instance) = self.instances.get_mut(&(name.to_string(), prev_epoch)) {
            instance.mark_final_kept();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ar::coordinator::LocalCoordinator;
    use std::sync::Mutex as StdMutex;

    struct RecordingMessenger {
        sent: StdMutex<Vec<Envelope>>,
    }

    impl RecordingMessenger {
        fn new() -> Self {
            Self {
                sent: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl PeerMessenger for RecordingMessenger {
        async fn send_to(&self, _peer: &NodeId, message: Envelope) {
            self.sent.lock().unwrap().push(message);
        }
    }

    #[tokio::test]
    async fn start_epoch_with_empty_prev_group_creates_running_instance() {
        let ar = ActiveReplica::new(
            NodeId::new("a"),
            Arc::new(LocalCoordinator::new()),
            Arc::new(RecordingMessenger::new()),
        );
        ar.handle_start_epoch(
            "n0".into(),
            0,
            vec![NodeId::new("a")],
            vec![],
            0,
            Some(b"v0".to_vec()),
            NodeId::new("rc-1"),
        )
        .await;
        let instance = ar.instance("n0", 0).unwrap();
        assert_eq!(instance.status, EpochStatus::Running);
    }

    #[tokio::test]
    async fn stop_unknown_instance_acks_with_no_checkpoint() {
        let ar = ActiveReplica::new(
            NodeId::new("a"),
            Arc::new(LocalCoordinator::new()),
            Arc::new(RecordingMessenger::new()),
        );
        ar.handle_stop_epoch("n0".into(), 5, NodeId::new("rc-1")).await;
        assert!(ar.instance("n0", 5).is_none());
    }
}
