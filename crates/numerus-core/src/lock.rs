// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! Lock records held by the Resource Arbiter (`spec.md` §3, §4.2).

use serde::{Deserialize, Serialize};

use crate::job::JobId;
use crate::path::NormalizedPath;
use crate::task::TaskId;

/// Requested or held access mode for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    Read,
    Write,
}

crate::simple_display! {
    LockMode {
        Read => "read",
        Write => "write",
    }
}

impl LockMode {
    /// `spec.md` §4.2: a task declaring both read and write on the same
    /// path is treated as write-only.
    pub fn dominant(reads: bool, writes: bool) -> Option<LockMode> {
        if writes {
            Some(LockMode::Write)
        } else if reads {
            Some(LockMode::Read)
        } else {
            None
        }
    }
}

/// A single granted lock record (`spec.md` §3 Lock).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lock {
    pub path: NormalizedPath,
    pub mode: LockMode,
    pub holder_job_id: JobId,
    pub holder_task_id: TaskId,
    pub acquired_at_epoch_ms: u64,
}
