// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! Cross-cutting error taxonomy. Per `spec.md` §7, each kind has a fixed
//! disposition that the Job Runner applies uniformly; this enum is the
//! single type the runner matches on to decide it.

use crate::task::TaskId;
use thiserror::Error;

/// Top-level error taxonomy shared by the runner and the daemon.
///
/// Leaf crates define their own narrower error enums (e.g.
/// `numerus_terminal::TerminalError`) and convert into this one via `From`
/// at the boundary where a single error type is needed.
#[derive(Debug, Error, Clone)]
pub enum NumerusError {
    #[error("plan parse error: {0}")]
    PlanParse(String),

    #[error("dependency cycle detected among tasks: {0:?}")]
    CycleDetected(Vec<TaskId>),

    #[error("claim parse error for task {task_id}: {message}")]
    ClaimParse { task_id: TaskId, message: String },

    #[error("spawn error: {0}")]
    Spawn(String),

    #[error("spawn circuit breaker open, retry after cooldown")]
    SpawnCircuitOpen,

    #[error("agent timed out after {phase} phase")]
    AgentTimeout { phase: &'static str },

    #[error("agent exited non-zero: {code}")]
    AgentNonZeroExit { code: i32 },

    #[error("store error: {0}")]
    Store(String),

    #[error("journal write error: {0}")]
    JournalWrite(String),
}

impl NumerusError {
    /// Whether the Job Runner should treat this as a retryable attempt
    /// failure (the task may be retried, §4.1) or as fatal to the job.
    pub fn is_retryable_attempt_failure(&self) -> bool {
        matches!(
            self,
            NumerusError::ClaimParse { .. }
                | NumerusError::Spawn(_)
                | NumerusError::SpawnCircuitOpen
                | NumerusError::AgentTimeout { .. }
                | NumerusError::AgentNonZeroExit { .. }
        )
    }

    /// Whether this error aborts the whole job before any task runs.
    pub fn is_job_fatal(&self) -> bool {
        matches!(self, NumerusError::PlanParse(_) | NumerusError::CycleDetected(_) | NumerusError::Store(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_conflict_is_not_represented_as_an_error() {
        // spec.md §7: LockConflict is "Not an error: task parked". There is
        // deliberately no NumerusError::LockConflict variant; blocked
        // claims are represented by arbiter::Decision::Blocked instead.
        let e = NumerusError::AgentNonZeroExit { code: 1 };
        assert!(e.is_retryable_attempt_failure());
    }

    #[test]
    fn store_error_is_job_fatal_not_retryable() {
        let e = NumerusError::Store("disk full".into());
        assert!(e.is_job_fatal());
        assert!(!e.is_retryable_attempt_failure());
    }
}
