// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! The Resource Arbiter (C5, `spec.md` §4.2).
//!
//! `evaluate`, `acquire`, and `release` all run inside one
//! `parking_lot::Mutex`-guarded critical section with no `.await` points,
//! so hold-and-wait is structurally impossible: a task never holds part of
//! its claim while evaluation of the rest is still pending
//! (`spec.md` §4.2 "Deadlock avoidance").

use std::collections::HashMap;

use numerus_core::{ClaimKey, JobId, Lock, LockMode, NormalizedPath, TaskId};
use parking_lot::Mutex;

use crate::decision::Decision;
use crate::request::PendingClaim;

#[derive(Debug, Clone)]
struct LockEntry {
    mode: LockMode,
    holder_job_id: JobId,
    holder_task_id: TaskId,
    acquired_at_epoch_ms: u64,
}

#[derive(Debug)]
struct Parked {
    park_seq: u64,
    claim: PendingClaim,
}

#[derive(Default)]
struct State {
    locks: HashMap<NormalizedPath, Vec<LockEntry>>,
    parked: Vec<Parked>,
    next_park_seq: u64,
}

/// A claim granted GO, with the lock records that must be persisted
/// (`spec.md` §4.1 "On GO, it persists the acquired locks").
pub struct Grant {
    pub key: ClaimKey,
    pub locks: Vec<Lock>,
}

/// The Resource Arbiter.
pub struct Arbiter {
    state: Mutex<State>,
}

impl Default for Arbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Arbiter {
    pub fn new() -> Self {
        Self { state: Mutex::new(State::default()) }
    }

    /// Pure compatibility check against currently held locks, per the
    /// matrix in `spec.md` §4.2. Does not consult the park queue.
    fn check(locks: &HashMap<NormalizedPath, Vec<LockEntry>>, claim: &PendingClaim) -> Decision {
        let mut conflicts = Vec::new();
        for request in &claim.requests {
            let Some(held) = locks.get(&request.path) else { continue };
            for entry in held {
                if entry.holder_task_id == claim.key.task_id {
                    continue;
                }
                let conflicting = match (request.mode, entry.mode) {
                    (LockMode::Read, LockMode::Read) => false,
                    (LockMode::Read, LockMode::Write) => true,
                    (LockMode::Write, LockMode::Read) => true,
                    (LockMode::Write, LockMode::Write) => true,
                };
                if conflicting {
                    conflicts.push(entry.holder_task_id.clone());
                }
            }
        }
        if conflicts.is_empty() {
            Decision::Go
        } else {
            conflicts.sort();
            conflicts.dedup();
            let reason = format!("conflicts with in-flight holder(s): {conflicts:?}");
            Decision::Blocked { reason, conflicting_holders: conflicts }
        }
    }

    /// Evaluate a claim without mutating state (read-only preview).
    pub fn evaluate(&self, claim: &PendingClaim) -> Decision {
        let state = self.state.lock();
        Self::check(&state.locks, claim)
    }

    /// Evaluate and, on GO, atomically install the locks — the two-phase
    /// critical section `spec.md` §4.2 requires. On BLOCKED, the claim is
    /// parked with a monotonic sequence number for starvation-free wakeup.
    pub fn evaluate_and_acquire(&self, claim: PendingClaim, now_epoch_ms: u64) -> (Decision, Option<Grant>) {
        let mut state = self.state.lock();
        let decision = Self::check(&state.locks, &claim);
        match decision {
            Decision::Go => {
                let grant = Self::install(&mut state, &claim, now_epoch_ms);
                (Decision::Go, Some(grant))
            }
            Decision::Blocked { reason, conflicting_holders } => {
                let park_seq = state.next_park_seq;
                state.next_park_seq += 1;
                state.parked.push(Parked { park_seq, claim });
                (Decision::Blocked { reason, conflicting_holders }, None)
            }
        }
    }

    fn install(state: &mut State, claim: &PendingClaim, now_epoch_ms: u64) -> Grant {
        let mut locks = Vec::with_capacity(claim.requests.len());
        for request in &claim.requests {
            let entry = LockEntry {
                mode: request.mode,
                holder_job_id: claim.key.job_id.clone(),
                holder_task_id: claim.key.task_id.clone(),
                acquired_at_epoch_ms: now_epoch_ms,
            };
            state.locks.entry(request.path.clone()).or_default().push(entry);
            locks.push(Lock {
                path: request.path.clone(),
                mode: request.mode,
                holder_job_id: claim.key.job_id.clone(),
                holder_task_id: claim.key.task_id.clone(),
                acquired_at_epoch_ms: now_epoch_ms,
            });
        }
        Grant { key: claim.key.clone(), locks }
    }

    /// Release every lock held by `task_id`, then re-evaluate parked claims
    /// in park-sequence (FIFO) order, granting any that now succeed
    /// (`spec.md` §4.2 "Starvation mitigation"). Returns the grants made as
    /// a side effect of this release, in the order they were granted.
    pub fn release(&self, job_id: &JobId, task_id: &TaskId, now_epoch_ms: u64) -> Vec<Grant> {
        let mut state = self.state.lock();
        for held in state.locks.values_mut() {
            held.retain(|entry| !(entry.holder_job_id == *job_id && entry.holder_task_id == *task_id));
        }
        state.locks.retain(|_, held| !held.is_empty());

        let mut granted = Vec::new();
        let mut still_parked = Vec::new();
        let mut parked = std::mem::take(&mut state.parked);
        parked.sort_by_key(|p| p.park_seq);
        for parked_claim in parked {
            let decision = Self::check(&state.locks, &parked_claim.claim);
            if decision.is_go() {
                let grant = Self::install(&mut state, &parked_claim.claim, now_epoch_ms);
                granted.push(grant);
            } else {
                still_parked.push(parked_claim);
            }
        }
        state.parked = still_parked;
        granted
    }

    /// Current number of parked claims (for tests / observability).
    pub fn parked_count(&self) -> usize {
        self.state.lock().parked.len()
    }
}

#[cfg(test)]
#[path = "arbiter_tests.rs"]
mod tests;
