// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

use numerus_core::TaskId;
use thiserror::Error;

/// `PlanParseError` (`spec.md` §7): raised on invalid planner JSON,
/// identifying the first offending field where possible.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanParseError {
    #[error("no JSON object found in planner output")]
    NoJsonObject,

    #[error("malformed planner JSON: {0}")]
    Malformed(String),

    #[error("duplicate task id: {0}")]
    DuplicateTaskId(String),

    #[error("task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: String, dependency: String },

    #[error("dependency cycle detected among tasks: {0:?}")]
    CycleDetected(Vec<TaskId>),

    #[error("task {0} has an empty id")]
    EmptyTaskId(String),
}

/// `ClaimParseError` (`spec.md` §7): raised on invalid per-task claim JSON.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimParseError {
    #[error("no JSON object found in claim output")]
    NoJsonObject,

    #[error("malformed claim JSON: {0}")]
    Malformed(String),

    #[error("claim task_id {claimed} does not match expected task {expected}")]
    TaskIdMismatch { expected: String, claimed: String },

    #[error("claim declares an empty path")]
    EmptyPath,
}
