// src/core/rc/record.rs

//! The reconfiguration record (§3) and its state machine (§4.1), RC-side.
//!
//! `ReconfigurationRecord` pairs a monotonically increasing epoch with a
//! small transition-state enum, the same "bump on every committed
//! transition" shape used elsewhere for master/failover bookkeeping.

use crate::core::protocol::NodeId;
use serde::{Deserialize, Serialize};

/// Position in the §4.1 state machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RecordState {
    Ready,
    WaitAckStop,
    WaitAckStart,
    WaitAckDrop,
}

impl RecordState {
    /// Metric label for this state (`gns_records_by_state`).
    pub fn label(&self) -> &'static str {
        match self {
            RecordState::Ready => "ready",
            RecordState::WaitAckStop => "wait_ack_stop",
            RecordState::WaitAckStart => "wait_ack_start",
            RecordState::WaitAckDrop => "wait_ack_drop",
        }
    }
}

/// One name's reconfiguration record, owned exclusively by the RC quorum.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconfigurationRecord {
    pub name: String,
    pub epoch: u32,
    pub actives: Vec<NodeId>,
    pub new_actives: Option<Vec<NodeId>>,
    pub state: RecordState,
    pub stop_checkpoint: Option<Vec<u8>>,

    /// The group being torn down by the in-flight transition, kept so
    /// `DropEpochFinalState` (step 6) can be addressed without needing to
    /// recompute "the previous `actives`" from history.
    pub prior_actives: Option<Vec<NodeId>>,

    /// Whether the transition that produced `WaitAckStop` is a delete:
    /// reaching `WaitAckDrop` with this set deletes the record at step 7
    /// rather than returning it to `Ready`.
    pub pending_delete: bool,

    /// First ack of each type received for the in-flight transition,
    /// deduped by (name, epoch, member) per §5's ordering guarantee.
    #[serde(default)]
    pub stop_acks: Vec<NodeId>,
    #[serde(default)]
    pub start_acks: Vec<NodeId>,
    #[serde(default)]
    pub drop_acks: Vec<NodeId>,

    /// Whether a stop ack carrying a real checkpoint has driven step 5
    /// yet. Tracked separately from `stop_acks` dedup: a member with
    /// nothing to hand back (§4.2's "never existed / already superseded"
    /// case) legitimately acks with no checkpoint, and that ack must not
    /// block a later member's real one from driving the transition.
    #[serde(default)]
    pub stop_checkpoint_seen: bool,
}

impl ReconfigurationRecord {
    /// Step 1: treat creation as epoch 0 starting from an empty previous
    /// group, so `StartEpoch` for `initialGroup` is driven uniformly by
    /// the same `WaitAckStart` state as every later transition.
    pub fn new_creating(name: impl Into<String>, initial_group: Vec<NodeId>) -> Self {
        Self {
            name: name.into(),
            epoch: 0,
            actives: initial_group,
            new_actives: None,
            state: RecordState::WaitAckStart,
            stop_checkpoint: None,
            prior_actives: None,
            pending_delete: false,
            stop_acks: Vec::new(),
            start_acks: Vec::new(),
            drop_acks: Vec::new(),
            stop_checkpoint_seen: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == RecordState::Ready && self.new_actives.is_none()
    }

    fn majority(group: &[NodeId]) -> usize {
        group.len() / 2 + 1
    }

    /// Step 2/6: records one `AckStartEpoch(name, epoch)` from `member`,
    /// returns whether a majority of the awaited group has now acked.
    /// Idempotent: a duplicate ack from the same member does not count
    /// twice.
    pub fn record_start_ack(&mut self, epoch: u32, member: NodeId) -> bool {
        if epoch != self.epoch {
            return false;
        }
        if !self.start_acks.contains(&member) {
            self.start_acks.push(member);
        }
        self.start_acks.len() >= Self::majority(&self.actives)
    }

    /// Step 5: records the first `AckStopEpoch(name, epoch, checkpoint)`
    /// for the in-flight stop. Only the first ack drives the transition;
    /// later ones are no-ops (§5, §8 idempotence law).
    pub fn record_stop_ack(&mut self, epoch: u32, member: NodeId, checkpoint: Option<Vec<u8>>) -> bool {
        if epoch != self.epoch || self.state != RecordState::WaitAckStop {
            return false;
        }
        if !self.stop_acks.contains(&member) {
            self.stop_acks.push(member);
        }
        if self.stop_checkpoint_seen || checkpoint.is_none() {
            return false;
        }
        self.stop_checkpoint_seen = true;
        true
    }

    /// Step 3: begin a `ChangeReplicas` transition. Caller must have
    /// already checked `is_ready()`; returns `Busy` otherwise via the
    /// caller's own guard, matching the statemachine module's usage.
    pub fn begin_change(&mut self, new_group: Vec<NodeId>) {
        self.new_actives = Some(new_group);
        self.prior_actives = Some(self.actives.clone());
        self.state = RecordState::WaitAckStop;
        self.pending_delete = false;
        self.stop_acks.clear();
        self.stop_checkpoint_seen = false;
    }

    /// Step 4: begin a delete transition (empty `newActives`).
    pub fn begin_delete(&mut self) {
        self.new_actives = Some(Vec::new());
        self.prior_actives = Some(self.actives.clone());
        self.state = RecordState::WaitAckStop;
        self.pending_delete = true;
        self.stop_acks.clear();
        self.stop_checkpoint_seen = false;
    }

    /// Step 5: advance `WaitAckStop` -> `WaitAckStart` (or straight to
    /// `WaitAckDrop` if the change is a delete with an empty new group).
    pub fn advance_past_stop(&mut self, checkpoint: Vec<u8>) {
        let new_actives = self.new_actives.take().unwrap_or_default();
        self.stop_checkpoint = Some(checkpoint);
        self.epoch += 1;
        self.actives = new_actives;
        self.start_acks.clear();
        self.state = RecordState::WaitAckStart;
    }

    /// Step 6: advance `WaitAckStart` -> `WaitAckDrop`.
    pub fn advance_past_start(&mut self) {
        self.drop_acks.clear();
        self.state = RecordState::WaitAckDrop;
    }

    /// Step 7: records one `AckDropEpochFinalState` and reports whether
    /// every prior-group member has now acked.
    pub fn record_drop_ack(&mut self, member: NodeId) -> bool {
        let prior = self.prior_actives.clone().unwrap_or_default();
        if !self.drop_acks.contains(&member) {
            self.drop_acks.push(member);
        }
        prior.iter().all(|m| self.drop_acks.contains(m))
    }

    /// Step 7: clears the finished transition and returns to `Ready`.
    pub fn complete_transition(&mut self) {
        self.prior_actives = None;
        self.stop_checkpoint = None;
        self.pending_delete = false;
        self.state = RecordState::Ready;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|n| NodeId::new(*n)).collect()
    }

    #[test]
    fn creation_starts_in_wait_ack_start() {
        let rec = ReconfigurationRecord::new_creating("n0", ids(&["a", "b", "c"]));
        assert_eq!(rec.epoch, 0);
        assert_eq!(rec.state, RecordState::WaitAckStart);
        assert!(!rec.is_ready());
    }

    #[test]
    fn majority_start_acks_flip_to_ready() {
        let mut rec = ReconfigurationRecord::new_creating("n0", ids(&["a", "b", "c"]));
        assert!(!rec.record_start_ack(0, NodeId::new("a")));
        assert!(rec.record_start_ack(0, NodeId::new("b")));
        // duplicate ack does not re-trigger past the threshold incorrectly
        assert!(rec.record_start_ack(0, NodeId::new("b")));
    }

    #[test]
    fn duplicate_stop_ack_is_not_first() {
        let mut rec = ReconfigurationRecord::new_creating("n0", ids(&["a", "b", "c"]));
        rec.state = RecordState::WaitAckStop;
        assert!(rec.record_stop_ack(0, NodeId::new("a"), Some(vec![1])));
        assert!(!rec.record_stop_ack(0, NodeId::new("a"), Some(vec![1])));
    }

    #[test]
    fn empty_checkpoint_ack_does_not_block_a_later_real_one() {
        let mut rec = ReconfigurationRecord::new_creating("n0", ids(&["a", "b", "c"]));
        rec.state = RecordState::WaitAckStop;
        // "a" never hosted the name, or its epoch was already superseded:
        // a legal ack with no checkpoint (§4.2).
        assert!(!rec.record_stop_ack(0, NodeId::new("a"), None));
        // "b" has the real checkpoint; must still drive the transition.
        assert!(rec.record_stop_ack(0, NodeId::new("b"), Some(vec![7])));
        assert!(!rec.record_stop_ack(0, NodeId::new("c"), Some(vec![7])));
    }

    #[test]
    fn full_transition_cycle() {
        let mut rec = ReconfigurationRecord::new_creating("n0", ids(&["a", "b", "c"]));
        rec.record_start_ack(0, NodeId::new("a"));
        rec.record_start_ack(0, NodeId::new("b"));
        rec.state = RecordState::Ready;

        rec.begin_change(ids(&["b", "c", "d"]));
        assert_eq!(rec.state, RecordState::WaitAckStop);

        rec.advance_past_stop(vec![9, 9]);
        assert_eq!(rec.epoch, 1);
        assert_eq!(rec.actives, ids(&["b", "c", "d"]));
        assert_eq!(rec.state, RecordState::WaitAckStart);

        rec.advance_past_start();
        assert_eq!(rec.state, RecordState::WaitAckDrop);

        assert!(!rec.record_drop_ack(NodeId::new("a")));
        // prior group for this transition is {a,b,c}: only 'a' was
        // dropped, 'b' and 'c' are also in the new group but still owed
        // an explicit drop ack for the old epoch.
        rec.record_drop_ack(NodeId::new("b"));
        assert!(rec.record_drop_ack(NodeId::new("c")));

        rec.complete_transition();
        assert!(rec.is_ready());
    }
}
