// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! Task identity and state machine (`spec.md` §3, §4.1).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Identifier for a task, unique within its owning job.
///
/// Unlike [`crate::job::JobId`] this is not randomly generated: the plan
/// JSON names its own tasks (`spec.md` §6), so `TaskId` is a validated
/// newtype around the agent-supplied string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl std::borrow::Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Task state machine states (`spec.md` §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    AnalysisPending,
    AwaitingGo,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
    }
}

crate::simple_display! {
    TaskState {
        Pending => "pending",
        AnalysisPending => "analysis_pending",
        AwaitingGo => "awaiting_go",
        Executing => "executing",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

/// Role taxonomy threaded through from the role-assignment pass into the
/// execute-mode prompt (`spec.md` §4.1). Metadata only; no differential
/// scheduling behavior (`spec.md` §9 Open Question, resolved in `DESIGN.md`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Planner,
    Executor,
    Reviewer,
    Queen,
}

crate::simple_display! {
    Role {
        Planner => "planner",
        Executor => "executor",
        Reviewer => "reviewer",
        Queen => "queen",
    }
}

/// Declared filesystem intents of a task, prior to path normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIntents {
    pub reads: Vec<String>,
    pub writes: Vec<String>,
}

impl ResourceIntents {
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty()
    }

    /// Declared write-count used by the ready-task tie-break ordering
    /// (`spec.md` §4.1): `(declared_write_count asc, task_id asc)`.
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }
}

/// A task as tracked by the Job Runner.
///
/// Created once at plan parse and mutated only by the Job Runner
/// (`spec.md` §3 invariants).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub summary: String,
    pub description: String,
    pub dependencies: Vec<TaskId>,
    pub resources: ResourceIntents,
    pub state: TaskState,
    pub role: Option<Role>,
    pub attempt: u32,
    pub last_claim_attempt: Option<u32>,
    pub last_exit_status: Option<i32>,
    pub last_diff_summary: Option<String>,
    pub blocking_reason: Option<String>,
}

impl Task {
    pub fn new(id: TaskId, summary: String, description: String, dependencies: Vec<TaskId>, resources: ResourceIntents) -> Self {
        Self {
            id,
            summary,
            description,
            dependencies,
            resources,
            state: TaskState::Pending,
            role: None,
            attempt: 1,
            last_claim_attempt: None,
            last_exit_status: None,
            last_diff_summary: None,
            blocking_reason: None,
        }
    }

    /// Dependencies are all satisfied once every one of them is in `completed_ids`.
    pub fn dependencies_satisfied(&self, completed_ids: &HashSet<TaskId>) -> bool {
        self.dependencies.iter().all(|d| completed_ids.contains(d))
    }
}
