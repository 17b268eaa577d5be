// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! The Event Journal (C3, `spec.md` §4.6, §6): a best-effort NDJSON mirror
//! of the orchestration (`job.*`) and terminal (`terminal.*`) topics to
//! `runs/<job_id>/events.ndjson` and `runs/<job_id>/<task_id>/events.ndjson`.
//!
//! Unlike the [`crate::store::Store`] WAL, the Journal is not authoritative:
//! it exists for operators tailing a job's files on disk (`spec.md` §6), not
//! for crash recovery. A write failure here is logged and dropped rather
//! than propagated — losing a journal line must never fail the task whose
//! event it was mirroring.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use numerus_bus::Bus;
use numerus_core::Event;

use crate::error::StoreError;

/// Mirrors bus events to the per-job/per-task NDJSON files `spec.md` §6 names.
pub struct Journal {
    runs_dir: PathBuf,
}

impl Journal {
    pub fn new(runs_dir: PathBuf) -> Self {
        Self { runs_dir }
    }

    /// Append one event to the job-level journal
    /// (`runs/<job_id>/events.ndjson`).
    pub fn append_job_event(&self, event: &Event) -> Result<(), StoreError> {
        let dir = self.runs_dir.join(event.job_id.as_str());
        fs::create_dir_all(&dir)?;
        append_ndjson(&dir.join("events.ndjson"), event)
    }

    /// Append one event to a task's own journal
    /// (`runs/<job_id>/<task_id>/events.ndjson`).
    pub fn append_terminal_event(&self, event: &Event) -> Result<(), StoreError> {
        let Some(task_id) = &event.task_id else {
            return self.append_job_event(event);
        };
        let dir = self.runs_dir.join(event.job_id.as_str()).join(task_id.as_str());
        fs::create_dir_all(&dir)?;
        append_ndjson(&dir.join("events.ndjson"), event)
    }

    /// Dispatch `event` to the job-level or task-level file depending on
    /// its topic (`spec.md` §4.6).
    pub fn mirror(&self, event: &Event) -> Result<(), StoreError> {
        if event.topic().starts_with("terminal.") {
            self.append_terminal_event(event)
        } else {
            self.append_job_event(event)
        }
    }

    /// Subscribe to `job.*` and `terminal.*` and mirror every event to disk
    /// for as long as the returned handle is not aborted. Write failures
    /// are logged and do not stop the mirror loop.
    pub fn spawn_mirror(self: Arc<Self>, bus: &Bus) -> tokio::task::JoinHandle<()> {
        let (_job_handle, mut job_rx) = bus.subscribe("job.*");
        let (_terminal_handle, mut terminal_rx) = bus.subscribe("terminal.*");
        tokio::spawn(async move {
            // Subscription handles must outlive the loop or the bus treats
            // the subscribers as abandoned on the next publish.
            let _job_handle = _job_handle;
            let _terminal_handle = _terminal_handle;
            loop {
                let event = tokio::select! {
                    event = job_rx.recv() => event,
                    event = terminal_rx.recv() => event,
                };
                let Some(event) = event else {
                    break;
                };
                if let Err(err) = self.mirror(&event) {
                    tracing::warn!(error = %err, event = %event.event, "journal mirror write failed");
                }
            }
        })
    }
}

fn append_ndjson(path: &std::path::Path, event: &Event) -> Result<(), StoreError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    file.write_all(&line)?;
    file.sync_data()?;
    Ok(())
}
