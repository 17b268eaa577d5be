// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! Shared scenario-test harness: a real [`Store`] on a temp WAL, a real
//! [`Bus`], and a [`JobRunner`] driven by a scripted [`FakeAgent`] and a
//! [`FakeClock`] so event timestamps are deterministic.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use numerus_agent::test_support::FakeAgent;
use numerus_arbiter::Arbiter;
use numerus_bus::Bus;
use numerus_core::{Event, FakeClock};
use numerus_plan::wire::{ExecutionDoc, ResourcesDoc};
use numerus_plan::ClaimDoc;
use numerus_runner::JobRunner;
use numerus_store::{Store, StoreHandle};
use tokio::sync::mpsc;

pub struct Harness {
    pub store: StoreHandle,
    pub bus: Arc<Bus>,
    pub runner: JobRunner<FakeAgent, FakeClock>,
    pub clock: FakeClock,
    _dir: tempfile::TempDir,
}

impl Harness {
    /// Build a harness with an unbounded `MAX_PARALLEL_TASKS` and a 5s
    /// cancellation grace period.
    pub fn new(agent: FakeAgent) -> Self {
        Self::with_parallelism(agent, None)
    }

    pub fn with_parallelism(agent: FakeAgent, max_parallel_tasks: Option<usize>) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store: StoreHandle = Arc::new(Store::open(&dir.path().join("tasks.db"), dir.path().join("runs")).expect("open store"));
        let bus = Arc::new(Bus::new());
        let arbiter = Arc::new(Arbiter::new());
        let clock = FakeClock::new();
        let runner = JobRunner::new(store.clone(), bus.clone(), arbiter, Arc::new(agent), clock.clone(), Duration::from_secs(5), max_parallel_tasks);
        Self { store, bus, runner, clock, _dir: dir }
    }

    /// Subscribe to every job/task event published for the duration of the
    /// test; the returned receiver buffers events so they can be drained
    /// and asserted on after the job finishes.
    pub fn subscribe_jobs(&self) -> mpsc::Receiver<Event> {
        let (_handle, rx) = self.bus.subscribe("job.*");
        // Leak the subscription handle for the harness's lifetime — these
        // are short-lived scenario tests, not long-running subscribers.
        std::mem::forget(_handle);
        rx
    }

    pub fn working_dir(&self) -> PathBuf {
        self._dir.path().to_path_buf()
    }
}

/// Drain every event currently buffered in `rx` without blocking.
pub fn drain(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn claim_doc(task_id: &str, writes: Vec<&str>) -> ClaimDoc {
    ClaimDoc {
        task_id: task_id.to_string(),
        resources: ResourcesDoc { reads: vec![], writes: writes.into_iter().map(String::from).collect() },
        execution: ExecutionDoc::default(),
    }
}
