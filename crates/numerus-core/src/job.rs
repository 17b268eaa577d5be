// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! Job identity and status (`spec.md` §3).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::task::{Task, TaskId};

crate::define_id! {
    /// Unique identifier for a job instance.
    pub struct JobId("job-");
}

/// Job lifecycle status (`spec.md` §3, §4.1, §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Planning,
    Running,
    Cancelling,
    Done,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Cancelled)
    }
}

crate::simple_display! {
    JobStatus {
        Planning => "planning",
        Running => "running",
        Cancelling => "cancelling",
        Done => "done",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

/// A job and the task table it exclusively owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub objective: String,
    pub created_at_epoch_ms: u64,
    pub status: JobStatus,
    pub working_dir: PathBuf,
    pub plan_ref: Option<String>,
    pub tasks: HashMap<TaskId, Task>,
    /// Retry limit for any single task (`spec.md` §4.1, default 2).
    pub retry_limit: u32,
}

impl Job {
    pub fn new(id: JobId, objective: String, working_dir: PathBuf, created_at_epoch_ms: u64, retry_limit: u32) -> Self {
        Self {
            id,
            objective,
            created_at_epoch_ms,
            status: JobStatus::Planning,
            working_dir,
            plan_ref: None,
            tasks: HashMap::new(),
            retry_limit,
        }
    }

    pub fn all_tasks_terminal(&self) -> bool {
        self.tasks.values().all(|t| t.state.is_terminal())
    }

    pub fn any_task_executing(&self) -> bool {
        self.tasks.values().any(|t| t.state == crate::task::TaskState::Executing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_has_job_prefix() {
        let id = JobId::new();
        assert!(id.as_str().starts_with("job-"));
    }

    #[test]
    fn new_job_starts_in_planning_with_no_tasks() {
        let job = Job::new(JobId::new(), "do the thing".into(), PathBuf::from("/tmp"), 0, 2);
        assert_eq!(job.status, JobStatus::Planning);
        assert!(job.tasks.is_empty());
        assert!(job.all_tasks_terminal());
    }
}
