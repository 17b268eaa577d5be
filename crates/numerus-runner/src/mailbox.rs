// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! The bounded mailbox a job's driver loop selects over (`spec.md` §9
//! "Concurrency reshape"). Store, Arbiter, and Bus calls are all
//! synchronous (in-memory under a mutex, or an fsynced append) so the only
//! things worth suspending on are the two agent-driven phases — claim and
//! execute — each running in its own `tokio::task` and reporting back here
//! when it finishes. Cancellation arrives out-of-band via a
//! `tokio::sync::Notify`, not through this channel.

use numerus_agent::{AgentError, ExecuteOutcome};
use numerus_core::{Lock, TaskId};
use numerus_plan::ClaimDoc;

/// Outcome of one claim-mode invocation plus arbiter evaluation.
#[derive(Debug)]
pub enum ClaimAttemptOutcome {
    /// The arbiter granted the claim immediately; locks are already
    /// installed in the arbiter and must now be persisted.
    Go { claim_doc: ClaimDoc, locks: Vec<Lock> },
    /// The arbiter parked the claim; it is retained in the arbiter's own
    /// park queue and will be granted as a side effect of some other
    /// task's `release` (`spec.md` §4.2 "Starvation mitigation").
    Blocked { claim_doc: ClaimDoc, reason: String },
    /// The claim invocation itself failed (agent error) before arbiter
    /// evaluation was reached.
    Err(AgentError),
}

/// One message a job's driver loop reacts to.
pub enum RunnerEvent {
    ClaimFinished { task_id: TaskId, attempt: u32, outcome: ClaimAttemptOutcome },
    ExecuteFinished { task_id: TaskId, attempt: u32, result: Result<ExecuteOutcome, AgentError> },
}
