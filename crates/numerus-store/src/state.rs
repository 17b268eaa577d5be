// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! The WAL entry shape and the in-memory table it materializes
//! (`spec.md` §4.5 "relational store", implemented as an event-sourced
//! WAL replayed into a table rather than an embedded SQL engine).

use std::collections::HashMap;
use std::path::PathBuf;

use numerus_core::{Claim, ClaimKey, Job, JobId, JobStatus, Lock, LockMode, NormalizedPath, Role, Task, TaskId, TaskState};
use serde::{Deserialize, Serialize};

/// One WAL-persisted mutation to the job/task/lock/claim tables.
///
/// Each variant is one atomic write (`spec.md` §4.5 "a single WAL entry
/// can carry a task transition plus its lock deltas atomically" is
/// realized by `TaskTransitioned` carrying its `locks_released` list
/// rather than needing a separate `LockReleased` entry per path).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StoreOp {
    JobCreated {
        job_id: JobId,
        objective: String,
        working_dir: PathBuf,
        created_at_epoch_ms: u64,
        retry_limit: u32,
    },
    TasksAdded {
        job_id: JobId,
        tasks: Vec<Task>,
    },
    JobStatusChanged {
        job_id: JobId,
        status: JobStatus,
    },
    RoleAssigned {
        job_id: JobId,
        task_id: TaskId,
        role: Role,
    },
    TaskTransitioned {
        job_id: JobId,
        task_id: TaskId,
        state: TaskState,
        attempt: u32,
        exit_status: Option<i32>,
        diff_summary: Option<String>,
        blocking_reason: Option<String>,
    },
    LockAcquired {
        job_id: JobId,
        task_id: TaskId,
        path: NormalizedPath,
        mode: LockMode,
        acquired_at_epoch_ms: u64,
    },
    LockReleased {
        job_id: JobId,
        path: NormalizedPath,
        holder_task_id: TaskId,
    },
    ClaimRecorded {
        claim: Claim,
    },
}

/// Replayed in-memory view of every job the Store has ever seen.
///
/// Rebuilt from scratch by folding the WAL on startup (`spec.md` §4.5
/// crash recovery); kept up to date thereafter by `Store::record`.
#[derive(Debug, Default)]
pub struct MaterializedState {
    jobs: HashMap<JobId, Job>,
    locks: HashMap<NormalizedPath, Vec<Lock>>,
    claims: HashMap<ClaimKey, Claim>,
}

impl MaterializedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job(&self, job_id: &JobId) -> Option<&Job> {
        self.jobs.get(job_id)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn claim(&self, key: &ClaimKey) -> Option<&Claim> {
        self.claims.get(key)
    }

    pub fn locks_on(&self, path: &NormalizedPath) -> &[Lock] {
        self.locks.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Fold one `StoreOp` into the table. Infallible: an op referencing a
    /// job/task the table doesn't know about is dropped with a warning
    /// rather than treated as corruption — the WAL is trusted to have been
    /// validated at append time.
    pub fn apply(&mut self, op: &StoreOp) {
        match op {
            StoreOp::JobCreated { job_id, objective, working_dir, created_at_epoch_ms, retry_limit } => {
                self.jobs.insert(*job_id, Job::new(*job_id, objective.clone(), working_dir.clone(), *created_at_epoch_ms, *retry_limit));
            }
            StoreOp::TasksAdded { job_id, tasks } => {
                if let Some(job) = self.jobs.get_mut(job_id) {
                    for task in tasks {
                        job.tasks.insert(task.id.clone(), task.clone());
                    }
                } else {
                    tracing::warn!(%job_id, "TasksAdded for unknown job, dropping");
                }
            }
            StoreOp::JobStatusChanged { job_id, status } => {
                if let Some(job) = self.jobs.get_mut(job_id) {
                    job.status = *status;
                } else {
                    tracing::warn!(%job_id, "JobStatusChanged for unknown job, dropping");
                }
            }
            StoreOp::RoleAssigned { job_id, task_id, role } => {
                if let Some(task) = self.jobs.get_mut(job_id).and_then(|j| j.tasks.get_mut(task_id)) {
                    task.role = Some(*role);
                }
            }
            StoreOp::TaskTransitioned { job_id, task_id, state, attempt, exit_status, diff_summary, blocking_reason } => {
                if let Some(task) = self.jobs.get_mut(job_id).and_then(|j| j.tasks.get_mut(task_id)) {
                    task.state = *state;
                    task.attempt = *attempt;
                    task.last_exit_status = *exit_status;
                    if diff_summary.is_some() {
                        task.last_diff_summary = diff_summary.clone();
                    }
                    task.blocking_reason = blocking_reason.clone();
                } else {
                    tracing::warn!(%job_id, %task_id, "TaskTransitioned for unknown task, dropping");
                }
            }
            StoreOp::LockAcquired { job_id, task_id, path, mode, acquired_at_epoch_ms } => {
                let lock = Lock { path: path.clone(), mode: *mode, holder_job_id: *job_id, holder_task_id: task_id.clone(), acquired_at_epoch_ms: *acquired_at_epoch_ms };
                self.locks.entry(path.clone()).or_default().push(lock);
            }
            StoreOp::LockReleased { path, holder_task_id, .. } => {
                if let Some(held) = self.locks.get_mut(path) {
                    held.retain(|l| &l.holder_task_id != holder_task_id);
                    if held.is_empty() {
                        self.locks.remove(path);
                    }
                }
            }
            StoreOp::ClaimRecorded { claim } => {
                self.claims.insert(claim.key.clone(), claim.clone());
            }
        }
    }

    /// Locks held by a task that never released them, found at startup
    /// (`spec.md` §4.5 "stale-lock crash-recovery GC"): any lock whose
    /// holder task is no longer `executing` after full replay is stale and
    /// must be dropped before the Arbiter starts granting new claims.
    pub fn stale_locks(&self) -> Vec<(NormalizedPath, Lock)> {
        let mut stale = Vec::new();
        for (path, held) in &self.locks {
            for lock in held {
                let still_executing = self
                    .jobs
                    .get(&lock.holder_job_id)
                    .and_then(|j| j.tasks.get(&lock.holder_task_id))
                    .map(|t| t.state == TaskState::Executing)
                    .unwrap_or(false);
                if !still_executing {
                    stale.push((path.clone(), lock.clone()));
                }
            }
        }
        stale
    }

    /// Drop every lock found stale by [`Self::stale_locks`]. Called once at
    /// startup after replay, before the Arbiter is handed its initial
    /// lock table.
    pub fn gc_stale_locks(&mut self) {
        for (path, lock) in self.stale_locks() {
            if let Some(held) = self.locks.get_mut(&path) {
                held.retain(|l| l.holder_task_id != lock.holder_task_id || l.acquired_at_epoch_ms != lock.acquired_at_epoch_ms);
                if held.is_empty() {
                    self.locks.remove(&path);
                }
            }
        }
    }
}
