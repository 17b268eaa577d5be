// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! Responses the daemon sends back to the CLI (`spec.md` §6).

use numerus_core::{Job, JobId};
use serde::{Deserialize, Serialize};

/// One response over the daemon socket.
///
/// Job snapshots embed `numerus_core::Job` directly rather than a parallel
/// summary/detail DTO pair: `Job`/`Task` are already the system's own
/// serializable record of truth, and the CLI surface is wire-level only
/// (no colorized/interactive rendering, per the stated Non-goal), so there
/// is nothing left for a bespoke view type to add.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Pong,
    Ok,
    Error { message: String },

    /// Reply to `Request::Submit`.
    JobStarted { job_id: JobId },

    /// Reply to `Request::Status { job_id: Some(_) }`.
    Job { job: Option<Box<Job>> },

    /// Reply to `Request::Status { job_id: None }`.
    Jobs { jobs: Vec<Job> },

    /// Reply to `Request::Logs`: one chunk of the task's captured output,
    /// plus the byte offset to resume from for the next poll (`--follow`).
    LogChunk { content: String, offset: u64 },

    /// Reply to `Request::Kill`.
    Cancelling { job_id: JobId },
}
