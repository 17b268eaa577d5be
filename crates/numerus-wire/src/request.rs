// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! Requests the CLI sends to the daemon (`spec.md` §6 CLI surface:
//! `start`/`run`/`status`/`logs`/`kill`).

use numerus_core::{JobId, TaskId};
use serde::{Deserialize, Serialize};

/// One request over the daemon socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check.
    Ping,

    /// `numerus start`/`numerus run "<objective>"`: decompose `objective`
    /// into a plan and start executing it.
    Submit { objective: String },

    /// `numerus status`: `job_id = None` lists every known job.
    Status { job_id: Option<JobId> },

    /// `numerus logs <task_id> [--follow]`. `offset` resumes a poll from
    /// the byte position a prior `Response::LogChunk` returned, so
    /// `--follow` can be implemented by the caller re-issuing this request
    /// in a loop rather than the daemon holding a streaming connection open.
    Logs {
        job_id: JobId,
        task_id: TaskId,
        follow: bool,
        #[serde(default)]
        offset: u64,
    },

    /// `numerus kill <task_id>`: cancel the owning job's in-flight task.
    Kill { job_id: JobId, task_id: TaskId },
}
