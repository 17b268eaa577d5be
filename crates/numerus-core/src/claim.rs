// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! Claims declared by a task attempt (`spec.md` §3).

use serde::{Deserialize, Serialize};

use crate::job::JobId;
use crate::task::{ResourceIntents, TaskId};

/// A `(job_id, task_id, attempt)` identifies a claim uniquely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimKey {
    pub job_id: JobId,
    pub task_id: TaskId,
    pub attempt: u32,
}

/// Decision state of a claim as recorded in the Store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ClaimDecision {
    Pending,
    Approved,
    Blocked { reason: String },
}

/// A per-task, per-attempt declaration of files to read/write and commands
/// to run (`spec.md` §3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub key: ClaimKey,
    pub resources: ResourceIntents,
    pub commands: Vec<String>,
    pub declared_at_epoch_ms: u64,
    pub decision: ClaimDecision,
}

impl Claim {
    pub fn new(key: ClaimKey, resources: ResourceIntents, commands: Vec<String>, declared_at_epoch_ms: u64) -> Self {
        Self { key, resources, commands, declared_at_epoch_ms, decision: ClaimDecision::Pending }
    }
}
