// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! Untyped-on-the-wire, fully-constrained-by-spec JSON shapes (`spec.md` §6).
//!
//! Per `spec.md` §9 "Dynamic JSON shapes": reject unknown fields only at
//! the top level; nested `resources`/`execution` blocks stay
//! forward-compatible.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ResourcesDoc {
    #[serde(default)]
    pub reads: Vec<String>,
    #[serde(default)]
    pub writes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskDoc {
    pub id: String,
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub resources: ResourcesDoc,
}

/// `{objective, tasks: [...]}` — the `NUMERUS_PLAN V1` response (`spec.md` §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PlanDoc {
    pub objective: String,
    pub tasks: Vec<TaskDoc>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExecutionDoc {
    #[serde(default)]
    pub commands: Vec<String>,
}

/// `{task_id, resources:{...}, execution:{commands:[...]}}` — the
/// `NUMERUS_CLAIM V1` response (`spec.md` §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClaimDoc {
    pub task_id: String,
    #[serde(default)]
    pub resources: ResourcesDoc,
    #[serde(default)]
    pub execution: ExecutionDoc,
}

/// Role annotation pass output (`spec.md` §4.1: "a role annotation").
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoleAssignmentDoc {
    pub roles: HashMap<String, String>,
}
