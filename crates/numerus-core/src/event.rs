// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! Orchestration event types (`spec.md` §3, §4.6).
//!
//! Events are append-only and ordered monotonically within a job
//! (`spec.md` §3, §5). Serializes as `{"event": "plan_created", ...}` so
//! the NDJSON journal (`spec.md` §4.6, §6) is directly greppable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::job::JobId;
use crate::task::TaskId;

/// The dotted bus topic this event publishes under (`spec.md` §4.6).
///
/// Orchestration events publish under `job.<event>`; terminal events
/// publish under `terminal.<kind>`.
pub fn topic_for(event: &str) -> String {
    if event.starts_with("terminal.") {
        event.to_string()
    } else {
        format!("job.{event}")
    }
}

/// One entry in a job's event timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub ts_epoch_ms: u64,
    pub event: String,
    pub job_id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub payload: Value,
}

impl Event {
    pub fn new(ts_epoch_ms: u64, event: impl Into<String>, job_id: JobId, task_id: Option<TaskId>, payload: Value) -> Self {
        Self { ts_epoch_ms, event: event.into(), job_id, task_id, payload }
    }

    pub fn topic(&self) -> String {
        topic_for(&self.event)
    }
}

/// Orchestration event-name constants (`spec.md` §3).
pub mod kind {
    pub const PLAN_CREATED: &str = "plan_created";
    pub const PLAN_INVALID: &str = "plan_invalid";
    pub const ROLES_ASSIGNED: &str = "roles_assigned";
    pub const CLAIM_RECORDED: &str = "claim_recorded";
    pub const CLAIM_BLOCKED: &str = "claim_blocked";
    pub const CLAIM_UNBLOCKED: &str = "claim_unblocked";
    pub const CLAIM_APPROVED: &str = "claim_approved";
    pub const LOCKS_RELEASED: &str = "locks_released";
    pub const TASK_COMPLETED: &str = "task_completed";
    pub const TASK_FAILED: &str = "task_failed";
    pub const TASK_CANCELLED: &str = "task_cancelled";
    pub const STORE_ERROR: &str = "store_error";
    pub const JOB_DONE: &str = "job_done";
    pub const JOB_FAILED: &str = "job_failed";
    pub const JOB_CANCELLED: &str = "job_cancelled";

    pub const TERMINAL_STARTED: &str = "terminal.started";
    pub const TERMINAL_STDOUT: &str = "terminal.stdout";
    pub const TERMINAL_STDERR: &str = "terminal.stderr";
    pub const TERMINAL_EXIT: &str = "terminal.exit";
    pub const TERMINAL_ERROR: &str = "terminal.error";
}
