// src/core/ar/transfer.rs

//! Peer-to-peer state transfer (§4.2 "State Transfer"): fetching the
//! previous epoch's final checkpoint from a member of the old group.
//!
//! A push-side snapshot transfer inverted into a pull (the new group
//! fetches rather than the old group pushing), with a reconnect-with-
//! backoff loop for the retry behavior.

use crate::core::messenger::PeerMessenger;
use crate::core::metrics::PENDING_FETCH_TASKS;
use crate::core::protocol::{Envelope, NodeId};
use crate::core::tasks::scheduler::{Backoff, TaskScheduler};
use dashmap::DashMap;
use rand::seq::SliceRandom;
use rand::thread_rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub fn fetch_task_key(name: &str, prev_epoch: u32) -> String {
    format!("fetch:{name}:{prev_epoch}")
}

/// Shared outcome table for in-flight and recently-finished fetches,
/// keyed the same way as the task itself. A caller that attaches to an
/// already-running fetch has no callback of its own to receive the
/// checkpoint through, so every caller reads the result from here once
/// its `TaskHandle::wait()` resolves.
pub type FetchResults = Arc<DashMap<String, Vec<u8>>>;

/// Starts (or attaches to an already-running) fetch of `name`'s final
/// state as of `prev_epoch` from a member of `prev_epoch_group`. On
/// success the checkpoint is written into `results` under the task's key
/// and all notifiees (including this call's own waiter) are woken.
///
/// A single fetch task per (name, prevEpoch) runs at a time; concurrent
/// `StartEpoch`s for the same (name, epoch) calling this attach as
/// additional notifiees instead of starting a second fetch (§4.2, §4.3).
pub fn start_or_attach_fetch<M>(
    scheduler: Arc<TaskScheduler>,
    results: FetchResults,
    messenger: Arc<M>,
    name: String,
    prev_epoch: u32,
    prev_epoch_group: Vec<NodeId>,
    self_id: NodeId,
    mut reply_rx: mpsc::Receiver<Vec<u8>>,
) -> crate::core::tasks::scheduler::TaskHandle
where
    M: PeerMessenger + 'static,
{
    let key = fetch_task_key(&name, prev_epoch);
    let scheduler_for_retire = scheduler.clone();
    let key_for_retire = key.clone();

    scheduler.spawn_or_attach(key.clone(), move |notify| {
        let messenger = messenger.clone();
        let results = results.clone();
        let key_for_result = key_for_retire.clone();
        async move {
            PENDING_FETCH_TASKS.inc();
            let mut members = prev_epoch_group;
            members.shuffle(&mut thread_rng());
            if members.is_empty() {
                results.insert(key_for_result, Vec::new());
                notify.notify_waiters();
                scheduler_for_retire.retire(&key_for_retire);
                PENDING_FETCH_TASKS.dec();
                return;
            }

            let backoff = Backoff::new(Duration::from_millis(200), Duration::from_secs(10));
            let mut intervals = backoff.iter();
            let mut idx = 0usize;

            let checkpoint = loop {
                let target = &members[idx % members.len()];
                debug!(%name, prev_epoch, %target, "requesting epoch final state");
                messenger
                    .send_to(
                        target,
                        Envelope::RequestEpochFinalState {
                            service_name: name.clone(),
                            epoch_number: prev_epoch,
                            initiator: self_id.clone(),
                        },
                    )
                    .await;

                let wait = intervals.next().unwrap_or(Duration::from_secs(10));
                tokio::select! {
                    received = reply_rx.recv() => {
                        if let Some(bytes) = received {
                            break bytes;
                        }
                        // Channel closed: cancelled out from under us.
                        PENDING_FETCH_TASKS.dec();
                        return;
                    }
                    _ = tokio::time::sleep(wait) => {
                        idx += 1;
                        warn!(%name, prev_epoch, "fetch timed out, trying next member");
                        continue;
                    }
                }
            };

            results.insert(key_for_result, checkpoint);
            notify.notify_waiters();
            scheduler_for_retire.retire(&key_for_retire);
            PENDING_FETCH_TASKS.dec();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullMessenger;

    #[async_trait::async_trait]
    impl PeerMessenger for NullMessenger {
        async fn send_to(&self, _peer: &NodeId, _message: Envelope) {}
    }

    #[tokio::test]
    async fn empty_prev_group_resolves_with_empty_checkpoint() {
        let scheduler = Arc::new(TaskScheduler::new());
        let results: FetchResults = Arc::new(DashMap::new());
        let messenger = Arc::new(NullMessenger);
        let (_tx, rx) = mpsc::channel(1);

        let handle = start_or_attach_fetch(
            scheduler,
            results.clone(),
            messenger,
            "n0".to_string(),
            0,
            vec![],
            NodeId::new("b"),
            rx,
        );
        handle.wait().await;
        assert_eq!(results.get(&fetch_task_key("n0", 0)).unwrap().clone(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn delivers_checkpoint_on_reply() {
        let scheduler = Arc::new(TaskScheduler::new());
        let results: FetchResults = Arc::new(DashMap::new());
        let messenger = Arc::new(NullMessenger);
        let (tx, rx) = mpsc::channel(1);

        let handle = start_or_attach_fetch(
            scheduler,
            results.clone(),
            messenger,
            "n0".to_string(),
            0,
            vec![NodeId::new("a")],
            NodeId::new("b"),
            rx,
        );
        tx.send(b"chk".to_vec()).await.unwrap();
        handle.wait().await;
        assert_eq!(results.get(&fetch_task_key("n0", 0)).unwrap().clone(), b"chk".to_vec());
    }
}
