// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! Test builders shared across crates (gated behind `test-support`).

use std::path::PathBuf;

use crate::job::{Job, JobId};
use crate::task::{ResourceIntents, Task, TaskId, TaskState};

/// Build a [`Task`] with sensible test defaults.
pub struct TaskBuilder {
    id: TaskId,
    dependencies: Vec<TaskId>,
    resources: ResourceIntents,
    state: TaskState,
}

impl TaskBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: TaskId::new(id.into()), dependencies: Vec::new(), resources: ResourceIntents::default(), state: TaskState::Pending }
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(TaskId::new(id.into()));
        self
    }

    pub fn writes(mut self, path: impl Into<String>) -> Self {
        self.resources.writes.push(path.into());
        self
    }

    pub fn reads(mut self, path: impl Into<String>) -> Self {
        self.resources.reads.push(path.into());
        self
    }

    pub fn state(mut self, state: TaskState) -> Self {
        self.state = state;
        self
    }

    pub fn build(self) -> Task {
        let mut task = Task::new(self.id, "test task".into(), "a task built for tests".into(), self.dependencies, self.resources);
        task.state = self.state;
        task
    }
}

/// Build a [`Job`] with sensible test defaults.
pub fn test_job(objective: &str) -> Job {
    Job::new(JobId::new(), objective.into(), PathBuf::from("/tmp/numerus-test"), 0, 2)
}
