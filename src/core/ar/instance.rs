// src/core/ar/instance.rs

//! The epoch instance (§3), AR-side: the local lifecycle of one (name,
//! epoch) pair. Generalizes a small monitored-instance lifecycle enum
//! into "a locally hosted replica-group epoch".

use crate::core::metrics::EPOCH_INSTANCES_BY_STATUS;
use crate::core::protocol::NodeId;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum EpochStatus {
    Starting,
    Running,
    Stopped,
    FinalKept,
    Dropped,
}

impl EpochStatus {
    /// Metric label for this status (`gns_epoch_instances_by_status`).
    pub fn label(&self) -> &'static str {
        match self {
            EpochStatus::Starting => "starting",
            EpochStatus::Running => "running",
            EpochStatus::Stopped => "stopped",
            EpochStatus::FinalKept => "final_kept",
            EpochStatus::Dropped => "dropped",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EpochInstance {
    pub name: String,
    pub epoch: u32,
    pub members: Vec<NodeId>,
    pub status: EpochStatus,
    pub final_checkpoint: Option<Vec<u8>>,
}

impl EpochInstance {
    pub fn starting(name: impl Into<String>, epoch: u32, members: Vec<NodeId>) -> Self {
        EPOCH_INSTANCES_BY_STATUS
            .with_label_values(&[EpochStatus::Starting.label()])
            .inc();
        Self {
            name: name.into(),
            epoch,
            members,
            status: EpochStatus::Starting,
            final_checkpoint: None,
        }
    }

    /// Moves to `new`, keeping `gns_epoch_instances_by_status` in sync.
    fn transition(&mut self, new: EpochStatus) {
        EPOCH_INSTANCES_BY_STATUS
            .with_label_values(&[self.status.label()])
            .dec();
        self.status = new;
        EPOCH_INSTANCES_BY_STATUS.with_label_values(&[new.label()]).inc();
    }

    pub fn mark_running(&mut self) {
        self.transition(EpochStatus::Running);
    }

    /// Atomic with the coordinator's stop-request completion: durably
    /// records the final checkpoint and flips to `Stopped` (§3's
    /// invariant that `finalCheckpoint` is created atomically with
    /// RUNNING→STOPPED).
    pub fn mark_stopped(&mut self, checkpoint: Vec<u8>) {
        self.final_checkpoint = Some(checkpoint);
        self.transition(EpochStatus::Stopped);
    }

    /// Once every AR in the new group has acknowledged start, the old
    /// group's copy becomes only advisory (`FinalKept`): still retrievable
    /// by a late `RequestEpochFinalState`, but no longer required by
    /// anyone. `DropEpochFinalState` moves it on to `Dropped`.
    pub fn mark_final_kept(&mut self) {
        if self.status == EpochStatus::Stopped {
            self.transition(EpochStatus::FinalKept);
        }
    }

    /// Terminal: clears the checkpoint, making the state unretrievable
    /// (§3's "DROPPED is terminal").
    pub fn mark_dropped(&mut self) {
        self.final_checkpoint = None;
        self.transition(EpochStatus::Dropped);
    }

    pub fn is_retrievable(&self) -> bool {
        matches!(self.status, EpochStatus::Stopped | EpochStatus::FinalKept) && self.final_checkpoint.is_some()
    }
}
