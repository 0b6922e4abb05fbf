// src/core/rc/statemachine.rs

//! Drives the reconfiguration record through the seven numbered
//! transitions of §4.1, using `ControlLog` for durability, `RecordStore`
//! for the queryable current view, and `PeerMessenger` plus the
//! per-record protocol-task scheduler to drive the AR side of the
//! protocol.
//!
//! Shaped like a per-name monitor loop whose branching follows a
//! durably-recorded phase enum: each phase is written down before the
//! side effect that phase describes is attempted, so a restart resumes
//! from exactly where the last committed phase left off.

use crate::core::errors::GnsError;
use crate::core::messenger::PeerMessenger;
use crate::core::metrics::{RECORDS_BY_STATE, TRANSITIONS_TOTAL, TRANSITION_LATENCY_SECONDS};
use crate::core::protocol::{Envelope, NodeId};
use crate::core::rc::log::ControlLog;
use crate::core::rc::record::{ReconfigurationRecord, RecordState};
use crate::core::rc::store::RecordStore;
use crate::core::tasks::scheduler::{Backoff, TaskScheduler};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Moves `gns_records_by_state`'s gauge from `old` (if this record
/// previously counted towards one) to `new`.
fn note_record_state(old: Option<RecordState>, new: RecordState) {
    if let Some(old) = old {
        RECORDS_BY_STATE.with_label_values(&[old.label()]).dec();
    }
    RECORDS_BY_STATE.with_label_values(&[new.label()]).inc();
}

fn stop_key(name: &str, epoch: u32) -> String {
    format!("stop:{name}:{epoch}")
}

fn start_key(name: &str, epoch: u32) -> String {
    format!("start:{name}:{epoch}")
}

fn drop_key(name: &str, epoch: u32) -> String {
    format!("drop:{name}:{epoch}")
}

pub struct Reconfigurator<L, S, M> {
    pub self_id: NodeId,
    log: Arc<L>,
    store: Arc<S>,
    messenger: Arc<M>,
    scheduler: Arc<TaskScheduler>,
    /// When a `ClientChangeReplicas` transition began, keyed by name, so
    /// `gns_transition_latency_seconds` can be observed once the record
    /// returns to READY.
    transition_started: DashMap<String, Instant>,
}

impl<L, S, M> Reconfigurator<L, S, M>
where
    L: ControlLog + 'static,
    S: RecordStore + 'static,
    M: PeerMessenger + 'static,
{
    pub fn new(self_id: NodeId, log: Arc<L>, store: Arc<S>, messenger: Arc<M>) -> Self {
        Self {
            self_id,
            log,
            store,
            messenger,
            scheduler: Arc::new(TaskScheduler::new()),
            transition_started: DashMap::new(),
        }
    }

    /// Step 1: `ClientCreate`. `initialGroup = ∅` is rejected with
    /// `InvalidConfig` (§8 boundary case).
    pub async fn create(
        &self,
        name: String,
        initial_state: Vec<u8>,
        initial_group: Vec<NodeId>,
    ) -> Result<(), GnsError> {
        if initial_group.is_empty() {
            return Err(GnsError::InvalidConfig(format!(
                "create '{name}' with an empty initial group"
            )));
        }
        if self.store.get(&name).await?.is_some() {
            return Err(GnsError::AlreadyExists(name));
        }

        let record = ReconfigurationRecord::new_creating(name.clone(), initial_group);
        self.log.append(&name, record.clone()).await?;
        self.store.put(record.clone()).await?;
        note_record_state(None, record.state);

        self.drive_start(&record, None, Some(initial_state));
        Ok(())
    }

    /// Steps 3/4: `ClientChangeReplicas` / `ClientDelete`. Rejected with
    /// `Busy` unless the record is currently `Ready`.
    pub async fn change_replicas(
        &self,
        name: &str,
        new_group: Option<Vec<NodeId>>,
    ) -> Result<(), GnsError> {
        let mut record = self
            .store
            .get(name)
            .await?
            .ok_or_else(|| GnsError::NotFound(name.to_string()))?;

        if !record.is_ready() {
            return Err(GnsError::Busy(name.to_string()));
        }

        let is_change = new_group.is_some();
        match new_group {
            Some(group) => record.begin_change(group),
            None => record.begin_delete(),
        }

        self.log.append(name, record.clone()).await?;
        self.store.put(record.clone()).await?;
        note_record_state(Some(RecordState::Ready), record.state);
        TRANSITIONS_TOTAL
            .with_label_values(&[if is_change { "3" } else { "4" }])
            .inc();
        if is_change {
            self.transition_started.insert(name.to_string(), Instant::now());
        }
        self.drive_stop(&record);
        Ok(())
    }

    /// `RequestActiveReplicas`: a consistent snapshot read, may legitimately
    /// race with an in-flight change (§7).
    pub async fn active_replicas(&self, name: &str) -> Result<Vec<NodeId>, GnsError> {
        Ok(self.record(name).await?.actives)
    }

    /// The full current record for `name`, used where both the epoch and
    /// the active set are needed from one consistent snapshot.
    pub async fn record(&self, name: &str) -> Result<ReconfigurationRecord, GnsError> {
        self.store
            .get(name)
            .await?
            .ok_or_else(|| GnsError::NotFound(name.to_string()))
    }

    /// `AckStartEpoch(name, epoch)` from `member`. Steps 2 and 6 share
    /// this entry point: whichever the record is currently awaiting.
    pub async fn on_ack_start_epoch(&self, name: &str, epoch: u32, member: NodeId) -> Result<(), GnsError> {
        let mut record = self
            .store
            .get(name)
            .await?
            .ok_or_else(|| GnsError::NotFound(name.to_string()))?;

        if record.state != RecordState::WaitAckStart {
            return Ok(()); // stale/duplicate ack, no-op
        }

        let reached_majority = record.record_start_ack(epoch, member);
        if !reached_majority {
            self.store.put(record).await?;
            return Ok(());
        }

        self.scheduler.cancel(&start_key(name, epoch));

        if record.prior_actives.is_some() {
            // Step 6: WAIT_ACK_START -> WAIT_ACK_DROP.
            record.advance_past_start();
            self.log.append(name, record.clone()).await?;
            self.store.put(record.clone()).await?;
            note_record_state(Some(RecordState::WaitAckStart), record.state);
            TRANSITIONS_TOTAL.with_label_values(&["6"]).inc();
            self.drive_drop(&record);
        } else {
            // Step 2: first-ever creation reaching READY.
            record.state = RecordState::Ready;
            self.log.append(name, record.clone()).await?;
            self.store.put(record.clone()).await?;
            note_record_state(Some(RecordState::WaitAckStart), record.state);
            TRANSITIONS_TOTAL.with_label_values(&["2"]).inc();
            info!(name, epoch, "reconfiguration reached READY");
        }
        Ok(())
    }

    /// `AckStopEpoch(name, epoch, checkpoint)` from `member` (step 5).
    /// Only the first ack drives the transition.
    pub async fn on_ack_stop_epoch(
        &self,
        name: &str,
        epoch: u32,
        member: NodeId,
        checkpoint: Option<Vec<u8>>,
    ) -> Result<(), GnsError> {
        let mut record = self
            .store
            .get(name)
            .await?
            .ok_or_else(|| GnsError::NotFound(name.to_string()))?;

        let is_first = record.record_stop_ack(epoch, member, checkpoint.clone());
        if !is_first {
            self.store.put(record).await?;
            return Ok(());
        }

        self.scheduler.cancel(&stop_key(name, epoch));

        let was_delete = record.pending_delete;
        let prior_actives = record.actives.clone();
        record.advance_past_stop(checkpoint.unwrap_or_default());

        if was_delete {
            record.state = RecordState::WaitAckDrop;
            self.log.append(name, record.clone()).await?;
            self.store.put(record.clone()).await?;
            note_record_state(Some(RecordState::WaitAckStop), record.state);
            TRANSITIONS_TOTAL.with_label_values(&["5"]).inc();
            self.drive_drop_with(&record, prior_actives);
        } else {
            self.log.append(name, record.clone()).await?;
            self.store.put(record.clone()).await?;
            note_record_state(Some(RecordState::WaitAckStop), record.state);
            TRANSITIONS_TOTAL.with_label_values(&["5"]).inc();
            self.drive_start(&record, Some((prior_actives, record.epoch - 1)), None);
        }
        Ok(())
    }

    /// `AckDropEpochFinalState` from `member` (step 7). Completes when
    /// every prior-group member has acked.
    pub async fn on_ack_drop(&self, name: &str, member: NodeId) -> Result<(), GnsError> {
        let mut record = self
            .store
            .get(name)
            .await?
            .ok_or_else(|| GnsError::NotFound(name.to_string()))?;

        if record.state != RecordState::WaitAckDrop {
            return Ok(());
        }

        let all_acked = record.record_drop_ack(member);
        if !all_acked {
            self.store.put(record).await?;
            return Ok(());
        }

        let is_delete = record.pending_delete;
        self.scheduler.cancel(&drop_key(name, record.epoch - 1));

        if is_delete {
            self.log
                .append(name, ReconfigurationRecord { state: RecordState::Ready, ..record.clone() })
                .await?;
            self.store.delete(name).await?;
            RECORDS_BY_STATE
                .with_label_values(&[RecordState::WaitAckDrop.label()])
                .dec();
            TRANSITIONS_TOTAL.with_label_values(&["7"]).inc();
            self.transition_started.remove(name);
        } else {
            record.complete_transition();
            self.log.append(name, record.clone()).await?;
            self.store.put(record).await?;
            note_record_state(Some(RecordState::WaitAckDrop), RecordState::Ready);
            TRANSITIONS_TOTAL.with_label_values(&["7"]).inc();
            if let Some((_, started)) = self.transition_started.remove(name) {
                TRANSITION_LATENCY_SECONDS.observe(started.elapsed().as_secs_f64());
            }
        }
        Ok(())
    }

    /// Begins/retransmits `StopEpoch` to every member of `actives`.
    fn drive_stop(&self, record: &ReconfigurationRecord) {
        let key = stop_key(&record.name, record.epoch);
        let members = record.actives.clone();
        let name = record.name.clone();
        let epoch = record.epoch;
        let self_id = self.self_id.clone();
        let messenger = self.messenger.clone();

        self.scheduler.spawn_or_attach(key, move |notify| async move {
            retransmit(&messenger, &members, &notify, || Envelope::StopEpoch {
                service_name: name.clone(),
                epoch_number: epoch,
                requester: self_id.clone(),
            })
            .await;
        });
    }

    /// Begins/retransmits `StartEpoch` to every member of the new
    /// `actives`, carrying the stop checkpoint and previous-group info
    /// when this follows a stop (step 5), or with no previous group for
    /// a fresh creation (step 1).
    fn drive_start(
        &self,
        record: &ReconfigurationRecord,
        prev: Option<(Vec<NodeId>, u32)>,
        initial_state: Option<Vec<u8>>,
    ) {
        let key = start_key(&record.name, record.epoch);
        let members = record.actives.clone();
        let name = record.name.clone();
        let epoch = record.epoch;
        let self_id = self.self_id.clone();
        let messenger = self.messenger.clone();
        let checkpoint = record.stop_checkpoint.clone().or(initial_state);
        let (prev_group, prev_epoch) = prev.unwrap_or((Vec::new(), 0));

        self.scheduler.spawn_or_attach(key, move |notify| async move {
            retransmit(&messenger, &members, &notify, || Envelope::StartEpoch {
                service_name: name.clone(),
                epoch_number: epoch,
                members: members.clone(),
                prev_epoch_group: prev_group.clone(),
                prev_epoch,
                initial_state: checkpoint.clone(),
                requester: self_id.clone(),
            })
            .await;
        });
    }

    /// Begins/retransmits `DropEpochFinalState` for the prior epoch to
    /// every prior-group member.
    fn drive_drop(&self, record: &ReconfigurationRecord) {
        let prior = record.prior_actives.clone().unwrap_or_default();
        self.drive_drop_with(record, prior);
    }

    fn drive_drop_with(&self, record: &ReconfigurationRecord, prior_actives: Vec<NodeId>) {
        let prior_epoch = record.epoch - 1;
        let key = drop_key(&record.name, prior_epoch);
        let name = record.name.clone();
        let self_id = self.self_id.clone();
        let messenger = self.messenger.clone();

        self.scheduler.spawn_or_attach(key, move |notify| async move {
            retransmit(&messenger, &prior_actives, &notify, || Envelope::DropEpochFinalState {
                service_name: name.clone(),
                epoch_number: prior_epoch,
                initiator: self_id.clone(),
            })
            .await;
        });
    }

    /// Restores in-flight outbound messages for every non-READY record
    /// on startup, per §4.1's crash-recovery resumability requirement.
    pub async fn resume_in_flight(&self) -> Result<(), GnsError> {
        for record in self.store.list().await? {
            RECORDS_BY_STATE.with_label_values(&[record.state.label()]).inc();
            match record.state {
                RecordState::Ready => {}
                RecordState::WaitAckStop => self.drive_stop(&record),
                RecordState::WaitAckStart => {
                    let prev = record
                        .prior_actives
                        .clone()
                        .map(|group| (group, record.epoch.saturating_sub(1)));
                    self.drive_start(&record, prev, None);
                }
                RecordState::WaitAckDrop => self.drive_drop(&record),
            }
        }
        Ok(())
    }
}

/// Sends `build()` to every member, once per member, then waits on a
/// bounded-exponential-backoff timer before resending to whoever hasn't
/// acked yet. Cancelled externally by the scheduler when the matching
/// ack (or acks) arrive; never gives up on its own (§4.1 "no
/// timeout-to-abort").
async fn retransmit<M, F>(messenger: &Arc<M>, members: &[NodeId], notify: &tokio::sync::Notify, build: F)
where
    M: PeerMessenger,
    F: Fn() -> Envelope,
{
    let backoff = Backoff::new(Duration::from_millis(250), Duration::from_secs(30));
    let mut intervals = backoff.iter();

    loop {
        for member in members {
            messenger.send_to(member, build()).await;
        }
        let wait = intervals.next().unwrap_or(Duration::from_secs(30));
        tokio::select! {
            _ = notify.notified() => return,
            _ = tokio::time::sleep(wait) => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rc::log::InMemoryControlLog;
    use crate::core::rc::store::InMemoryRecordStore;
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

    fn rc() -> Reconfigurator<InMemoryControlLog, InMemoryRecordStore, RecordingMessenger> {
        Reconfigurator::new(
            NodeId::new("rc-1"),
            Arc::new(InMemoryControlLog::new()),
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(RecordingMessenger::new()),
        )
    }

    #[tokio::test]
    async fn create_with_empty_group_is_invalid_config() {
        let rc = rc();
        let err = rc.create("n0".into(), vec![], vec![]).await.unwrap_err();
        assert!(matches!(err, GnsError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn create_then_majority_ack_reaches_ready() {
        let rc = rc();
        rc.create("n0".into(), b"v0".to_vec(), vec![NodeId::new("a"), NodeId::new("b"), NodeId::new("c")])
            .await
            .unwrap();

        rc.on_ack_start_epoch("n0", 0, NodeId::new("a")).await.unwrap();
        let record = rc.store.get("n0").await.unwrap().unwrap();
        assert_eq!(record.state, RecordState::WaitAckStart);

        rc.on_ack_start_epoch("n0", 0, NodeId::new("b")).await.unwrap();
        let record = rc.store.get("n0").await.unwrap().unwrap();
        assert!(record.is_ready());
    }

    #[tokio::test]
    async fn change_replicas_while_busy_is_rejected() {
        let rc = rc();
        rc.create("n0".into(), b"v0".to_vec(), vec![NodeId::new("a"), NodeId::new("b")])
            .await
            .unwrap();
        let err = rc
            .change_replicas("n0", Some(vec![NodeId::new("c")]))
            .await
            .unwrap_err();
        assert!(matches!(err, GnsError::Busy(_)));
    }

    #[tokio::test]
    async fn delete_of_nonexistent_name_is_not_found() {
        let rc = rc();
        let err = rc.change_replicas("missing", None).await.unwrap_err();
        assert!(matches!(err, GnsError::NotFound(_)));
    }
}
