// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! [`Store`]: the transactional facade over [`crate::wal::Wal`] and
//! [`crate::state::MaterializedState`] (`spec.md` §4.5 Store).
//!
//! Every mutating method appends exactly one [`crate::state::StoreOp`] to
//! the WAL and fsyncs before returning, satisfying "a single transaction
//! boundary covers every state transition that touches more than one
//! table" — the WAL append *is* the transaction boundary. Reads go
//! straight to the in-memory [`MaterializedState`], which is always at
//! least as current as the last fsynced op.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use numerus_core::{Claim, ClaimKey, Job, JobId, JobStatus, Lock, LockMode, NormalizedPath, Role, SystemClock, Task, TaskId, TaskState};
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::state::{MaterializedState, StoreOp};
use crate::wal::Wal;

/// Shared handle type the Job Runner and daemon pass around.
pub type StoreHandle = Arc<Store>;

/// The durable Store (`spec.md` §4.5): a WAL-backed table of jobs, tasks,
/// claims, and locks, plus the on-disk `plan.json`/`<task_id>_claim.json`
/// artifacts `spec.md` §6 names.
pub struct Store {
    state: Mutex<MaterializedState>,
    wal: Mutex<Wal<StoreOp, SystemClock>>,
    runs_dir: PathBuf,
}

impl Store {
    /// Open (or create) the WAL at `wal_path`, replay it into a fresh
    /// [`MaterializedState`], and garbage-collect locks whose holder task
    /// is not `executing` after replay (`spec.md` §4.5 crash recovery).
    pub fn open(wal_path: &Path, runs_dir: PathBuf) -> Result<Self, StoreError> {
        let wal: Wal<StoreOp, SystemClock> = Wal::open(wal_path, 0)?;
        let mut state = MaterializedState::new();
        for entry in wal.entries_after(0)? {
            state.apply(&entry.event);
        }
        let stale = state.stale_locks();
        if !stale.is_empty() {
            tracing::warn!(count = stale.len(), "clearing stale locks found at startup");
        }
        state.gc_stale_locks();
        fs::create_dir_all(&runs_dir)?;
        Ok(Self { state: Mutex::new(state), wal: Mutex::new(wal), runs_dir })
    }

    fn record(&self, op: StoreOp) -> Result<(), StoreError> {
        self.state.lock().apply(&op);
        let mut wal = self.wal.lock();
        wal.append(&op)?;
        wal.flush()?;
        Ok(())
    }

    pub fn create_job(&self, job_id: JobId, objective: String, working_dir: PathBuf, created_at_epoch_ms: u64, retry_limit: u32) -> Result<(), StoreError> {
        self.record(StoreOp::JobCreated { job_id, objective, working_dir, created_at_epoch_ms, retry_limit })
    }

    pub fn add_tasks(&self, job_id: JobId, tasks: Vec<Task>) -> Result<(), StoreError> {
        self.record(StoreOp::TasksAdded { job_id, tasks })
    }

    pub fn set_job_status(&self, job_id: JobId, status: JobStatus) -> Result<(), StoreError> {
        self.record(StoreOp::JobStatusChanged { job_id, status })
    }

    pub fn assign_role(&self, job_id: JobId, task_id: TaskId, role: Role) -> Result<(), StoreError> {
        self.record(StoreOp::RoleAssigned { job_id, task_id, role })
    }

    /// Persist a task state transition, optionally together with its exit
    /// status / diff summary / blocking reason. Lock mutations are
    /// recorded separately via [`Self::acquire_lock`]/[`Self::release_lock`]
    /// but always precede or follow this call within the same Job Runner
    /// step, matching `spec.md` §3's executing ⇔ locks-held invariant.
    #[allow(clippy::too_many_arguments)]
    pub fn transition_task(
        &self,
        job_id: JobId,
        task_id: TaskId,
        state: TaskState,
        attempt: u32,
        exit_status: Option<i32>,
        diff_summary: Option<String>,
        blocking_reason: Option<String>,
    ) -> Result<(), StoreError> {
        self.record(StoreOp::TaskTransitioned { job_id, task_id, state, attempt, exit_status, diff_summary, blocking_reason })
    }

    pub fn acquire_lock(&self, job_id: JobId, task_id: TaskId, path: NormalizedPath, mode: LockMode, acquired_at_epoch_ms: u64) -> Result<(), StoreError> {
        self.record(StoreOp::LockAcquired { job_id, task_id, path, mode, acquired_at_epoch_ms })
    }

    pub fn release_lock(&self, job_id: JobId, path: NormalizedPath, holder_task_id: TaskId) -> Result<(), StoreError> {
        self.record(StoreOp::LockReleased { job_id, path, holder_task_id })
    }

    /// Record a claim and mirror it to `runs/<job_id>/<task_id>_claim.json`
    /// once approved (`spec.md` §3 "Claim"). Called regardless of decision
    /// so the full claim history — including blocked attempts — is in the
    /// WAL; the on-disk file is only ever written for approved claims.
    pub fn record_claim(&self, claim: Claim) -> Result<(), StoreError> {
        let approved = matches!(claim.decision, numerus_core::ClaimDecision::Approved);
        self.record(StoreOp::ClaimRecorded { claim: claim.clone() })?;
        if approved {
            self.persist_claim_file(&claim)?;
        }
        Ok(())
    }

    fn persist_claim_file(&self, claim: &Claim) -> Result<(), StoreError> {
        let dir = self.runs_dir.join(claim.key.job_id.as_str());
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}_claim.json", claim.key.task_id.as_str()));
        fs::write(path, serde_json::to_vec_pretty(claim)?)?;
        Ok(())
    }

    /// Persist the raw plan JSON to `runs/<job_id>/plan.json` (`spec.md` §6
    /// on-disk layout). Called once, right after plan parse succeeds.
    pub fn persist_plan_file(&self, job_id: &JobId, plan_json: &str) -> Result<(), StoreError> {
        let dir = self.runs_dir.join(job_id.as_str());
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("plan.json"), plan_json)?;
        Ok(())
    }

    pub fn job(&self, job_id: &JobId) -> Option<Job> {
        self.state.lock().job(job_id).cloned()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.state.lock().jobs().cloned().collect()
    }

    pub fn claim(&self, key: &ClaimKey) -> Option<Claim> {
        self.state.lock().claim(key).cloned()
    }

    pub fn locks_on(&self, path: &NormalizedPath) -> Vec<Lock> {
        self.state.lock().locks_on(path).to_vec()
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    /// Current snapshot of every job, for reconciliation on daemon startup
    /// (`spec.md` §4.5 "on restart, jobs in non-terminal states are
    /// re-hydrated").
    pub fn non_terminal_jobs(&self) -> Vec<Job> {
        self.state.lock().jobs().filter(|j| !j.status.is_terminal()).cloned().collect()
    }
}
