// src/core/rc/log.rs

//! `ControlLog`: the external, linearizable replicated log the RC quorum
//! uses to serialize control-record state transitions (§2, §4.1's
//! "durably appended to the control log"). A narrow collaborator
//! interface, per design note (b) — the consensus protocol backing it is
//! out of scope here.

use crate::core::errors::GnsError;
use crate::core::rc::record::ReconfigurationRecord;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// One durable log entry: the record state as of a single committed
/// transition, addressable by name.
#[derive(Clone, Debug)]
pub struct LogEntry {
    pub seq: u64,
    pub name: String,
    pub record: ReconfigurationRecord,
}

#[async_trait]
pub trait ControlLog: Send + Sync {
    /// Durably appends the record's new state. Must not return `Ok`
    /// until the append is committed; the RC only emits outbound
    /// messages after this returns.
    async fn append(&self, name: &str, record: ReconfigurationRecord) -> Result<u64, GnsError>;

    /// Replays the log from the beginning, yielding the *latest* record
    /// per name in append order — used for crash recovery (§4.1) and for
    /// the "replay yields the same final state" property (§8).
    async fn replay(&self) -> Result<Vec<LogEntry>, GnsError>;
}

/// A single-process, in-memory stand-in for the replicated log. Good
/// enough to drive the state machine and its tests; a real deployment
/// swaps this for a Raft- or Paxos-backed implementation.
#[derive(Default)]
pub struct InMemoryControlLog {
    entries: Mutex<Vec<LogEntry>>,
    next_seq: Mutex<u64>,
}

impl InMemoryControlLog {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_seq: Mutex::new(0),
        }
    }
}

#[async_trait]
impl ControlLog for InMemoryControlLog {
    async fn append(&self, name: &str, record: ReconfigurationRecord) -> Result<u64, GnsError> {
        let seq = {
            let mut next = self.next_seq.lock();
            let seq = *next;
            *next += 1;
            seq
        };
        self.entries.lock().push(LogEntry {
            seq,
            name: name.to_string(),
            record,
        });
        Ok(seq)
    }

    async fn replay(&self) -> Result<Vec<LogEntry>, GnsError> {
        let entries = self.entries.lock();
        let mut latest: HashMap<String, LogEntry> = HashMap::new();
        for entry in entries.iter() {
            latest.insert(entry.name.clone(), entry.clone());
        }
        let mut out: Vec<LogEntry> = latest.into_values().collect();
        out.sort_by_key(|e| e.seq);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::NodeId;

    #[tokio::test]
    async fn replay_returns_latest_record_per_name() {
        let log = InMemoryControlLog::new();
        let rec0 = ReconfigurationRecord::new_creating("n0", vec![NodeId::new("a")]);
        let mut rec1 = rec0.clone();
        rec1.epoch = 1;

        log.append("n0", rec0).await.unwrap();
        log.append("n0", rec1.clone()).await.unwrap();

        let replayed = log.replay().await.unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].record.epoch, 1);
    }
}
