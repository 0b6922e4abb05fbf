// src/core/tasks/scheduler.rs

//! The protocol-task scheduler (§4.3, §5): one retransmitting task per
//! outstanding acknowledgement, keyed by a string, idempotent on spawn,
//! and explicitly cancelled by the event that satisfies it.
//!
//! Generalizes a dedup-by-lock idiom for avoiding duplicate concurrent
//! retries from a single fixed task kind into a keyed table, with
//! bounded exponential backoff between attempts.

use crate::core::metrics::PROTOCOL_TASKS_IN_FLIGHT;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Bounded exponential backoff used for task restart intervals.
#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    initial: Duration,
    cap: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, cap: Duration) -> Self {
        Self { initial, cap }
    }

    pub fn iter(&self) -> BackoffIter {
        BackoffIter {
            next: self.initial,
            cap: self.cap,
        }
    }
}

pub struct BackoffIter {
    next: Duration,
    cap: Duration,
}

impl Iterator for BackoffIter {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        self.next = (self.next * 2).min(self.cap);
        Some(current)
    }
}

struct RunningTask {
    handle: JoinHandle<()>,
    notifiees: Arc<Notify>,
}

/// Table of live retransmission/fetch tasks keyed as in §4.3. Task
/// creation, lookup, and cancellation are atomic with respect to each
/// other via the underlying `DashMap`'s per-shard locking.
#[derive(Default)]
pub struct TaskScheduler {
    tasks: DashMap<String, RunningTask>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
        }
    }

    /// Spawns `fut` under `key` unless a task with that key is already
    /// running, in which case this attaches as a notifiee and returns
    /// `false`. The spawned future receives a `Notify` handle it must
    /// call `notify_waiters()` on before it naturally completes, so
    /// attached notifiees wake even if they joined after the work that
    /// satisfies them already started.
    pub fn spawn_or_attach<F, Fut>(&self, key: impl Into<String>, make_task: F) -> TaskHandle
    where
        F: FnOnce(Arc<Notify>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        match self.tasks.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                let notify = entry.get().notifiees.clone();
                TaskHandle { notify }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let notify = Arc::new(Notify::new());
                let fut = make_task(notify.clone());
                let handle = tokio::spawn(fut);
                entry.insert(RunningTask {
                    handle,
                    notifiees: notify.clone(),
                });
                PROTOCOL_TASKS_IN_FLIGHT.inc();
                TaskHandle { notify }
            }
        }
    }

    /// Explicitly cancels the task under `key`, e.g. because the event
    /// that satisfies it arrived (a matching Ack) or because it was
    /// superseded (a DropEpoch for a pending fetch).
    pub fn cancel(&self, key: &str) {
        if let Some((_, task)) = self.tasks.remove(key) {
            task.handle.abort();
            PROTOCOL_TASKS_IN_FLIGHT.dec();
        }
    }

    /// Removes the task's bookkeeping once it has finished on its own
    /// (terminated by success, not by external cancellation).
    pub fn retire(&self, key: &str) {
        if self.tasks.remove(key).is_some() {
            PROTOCOL_TASKS_IN_FLIGHT.dec();
        }
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.tasks.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Returned to every caller of `spawn_or_attach`, first spawner or later
/// attachee alike, so all of them can wait on the same completion signal.
pub struct TaskHandle {
    notify: Arc<Notify>,
}

impl TaskHandle {
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn second_spawn_attaches_instead_of_duplicating() {
        let scheduler = Arc::new(TaskScheduler::new());
        let spawn_count = Arc::new(AtomicUsize::new(0));

        let make = {
            let spawn_count = spawn_count.clone();
            move |notify: Arc<Notify>| {
                let spawn_count = spawn_count.clone();
                async move {
                    spawn_count.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    notify.notify_waiters();
                }
            }
        };

        let h1 = scheduler.spawn_or_attach("stop:n0:0", make.clone());
        let h2 = scheduler.spawn_or_attach("stop:n0:0", make);

        h1.wait().await;
        h2.wait().await;

        assert_eq!(spawn_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancel_removes_task_entry() {
        let scheduler = TaskScheduler::new();
        scheduler.spawn_or_attach("fetch:n0:0", |_notify| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        assert!(scheduler.is_running("fetch:n0:0"));
        scheduler.cancel("fetch:n0:0");
        assert!(!scheduler.is_running("fetch:n0:0"));
    }

    #[test]
    fn backoff_caps_growth() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(500));
        let values: Vec<_> = backoff.iter().take(5).collect();
        assert_eq!(
            values,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(500),
                Duration::from_millis(500),
            ]
        );
    }
}
