//! Per-run submission context

use chrono::{DateTime, SubsecRound, Utc};
use dps_common::types::Task;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

const UNKNOWN_SIZE: i64 = -1;

/// Sub-second digits kept on run timestamps. Ledger columns hold
/// microseconds, so finer run starts would compare newer than their own
/// ledger entries.
pub(crate) const TIMESTAMP_PRECISION: u16 = 6;

/// A task plus everything known about the current submission run.
///
/// Shared between resolution workers behind an `Arc`; the counters are
/// atomics so concurrent submissions never need a lock.
#[derive(Debug)]
pub struct SubmitContext {
    task: Task,
    topology_name: String,
    topic: String,
    run_start: DateTime<Utc>,
    restart: bool,
    expected_size: AtomicI64,
    performed: AtomicU64,
    counted: AtomicU64,
}

impl SubmitContext {
    pub fn new(task: Task, topology_name: impl Into<String>) -> Self {
        Self {
            task,
            topology_name: topology_name.into(),
            topic: String::new(),
            run_start: Utc::now().trunc_subsecs(TIMESTAMP_PRECISION),
            restart: false,
            expected_size: AtomicI64::new(UNKNOWN_SIZE),
            performed: AtomicU64::new(0),
            counted: AtomicU64::new(0),
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_restart(mut self, restart: bool) -> Self {
        self.restart = restart;
        self
    }

    pub fn with_run_start(mut self, run_start: DateTime<Utc>) -> Self {
        self.run_start = run_start.trunc_subsecs(TIMESTAMP_PRECISION);
        self
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn task_id(&self) -> i64 {
        self.task.task_id
    }

    pub fn topology_name(&self) -> &str {
        &self.topology_name
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn run_start(&self) -> DateTime<Utc> {
        self.run_start
    }

    pub fn is_restart(&self) -> bool {
        self.restart
    }

    pub fn expected_size(&self) -> Option<u64> {
        u64::try_from(self.expected_size.load(Ordering::Acquire)).ok()
    }

    pub fn set_expected_size(&self, size: u64) {
        let size = i64::try_from(size).unwrap_or(i64::MAX);
        self.expected_size.store(size, Ordering::Release);
    }

    /// Records handed to the ledger service so far, duplicates included
    pub fn performed(&self) -> u64 {
        self.performed.load(Ordering::Relaxed)
    }

    /// Records actually dispatched during this run
    pub fn counted(&self) -> u64 {
        self.counted.load(Ordering::Acquire)
    }

    /// Returns the new performed total
    pub(crate) fn record_performed(&self) -> u64 {
        self.performed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_counted(&self) {
        self.counted.fetch_add(1, Ordering::AcqRel);
    }
}
