// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! A scripted [`AgentAdapter`] for scenario tests that never want to spawn
//! a real agent binary.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use numerus_core::{JobId, Role, Task, TaskId};
use numerus_plan::{ClaimDoc, Plan};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::adapter::{AgentAdapter, ExecuteOutcome};
use crate::error::AgentError;

/// Scripted responses for one task's claim/execute phases. `execute` is a
/// queue rather than a single value so retry scenarios can script a failing
/// first attempt followed by a succeeding one; once the queue drains to its
/// last entry, that entry keeps being returned for any further attempt.
#[derive(Clone, Default)]
pub struct TaskScript {
    pub claim: Option<Result<ClaimDoc, AgentError>>,
    pub execute: VecDeque<Result<ExecuteOutcome, AgentError>>,
}

/// An [`AgentAdapter`] driven entirely by pre-scripted responses, keyed by
/// task id. Every invocation is also recorded so tests can assert on call
/// order and count.
pub struct FakeAgent {
    plan: Mutex<Option<Result<Plan, AgentError>>>,
    roles: Mutex<Option<Result<HashMap<TaskId, Role>, AgentError>>>,
    tasks: Mutex<HashMap<TaskId, TaskScript>>,
    calls: Mutex<Vec<String>>,
    /// Tasks whose `execute` call parks on a `Notify` until `cancel` wakes
    /// it, rather than returning immediately — lets a scenario test drive a
    /// task into `Executing` and hold it there for a cancellation to land on.
    hold_until_cancel: Mutex<HashMap<TaskId, Arc<Notify>>>,
}

impl Default for FakeAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeAgent {
    pub fn new() -> Self {
        Self {
            plan: Mutex::new(None),
            roles: Mutex::new(None),
            tasks: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            hold_until_cancel: Mutex::new(HashMap::new()),
        }
    }

    /// Make `task_id`'s `execute` call block until `cancel` is invoked for
    /// it, then return the given outcome. Used to simulate a task that is
    /// genuinely in flight when a job-level cancellation arrives (S5).
    pub fn with_execute_held_until_cancel(self, task_id: TaskId) -> Self {
        self.hold_until_cancel.lock().entry(task_id).or_insert_with(|| Arc::new(Notify::new()));
        self
    }

    pub fn with_plan(self, plan: Result<Plan, AgentError>) -> Self {
        *self.plan.lock() = Some(plan);
        self
    }

    /// Script the role-assignment response. Unscripted, every task defaults
    /// to `Role::Executor` (the common case: most real plans name no
    /// planner/reviewer/queen task at all).
    pub fn with_roles(self, roles: Result<HashMap<TaskId, Role>, AgentError>) -> Self {
        *self.roles.lock() = Some(roles);
        self
    }

    pub fn with_claim(self, task_id: TaskId, claim: Result<ClaimDoc, AgentError>) -> Self {
        self.tasks.lock().entry(task_id).or_default().claim = Some(claim);
        self
    }

    /// Script the next execute-phase outcome for `task_id`. Call more than
    /// once to queue a sequence across attempts (e.g. a failure then a
    /// success for a retry test).
    pub fn with_execute(self, task_id: TaskId, outcome: Result<ExecuteOutcome, AgentError>) -> Self {
        self.tasks.lock().entry(task_id).or_default().execute.push_back(outcome);
        self
    }

    /// Invocations recorded so far, in order, as `"<mode> <task_id?>"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl AgentAdapter for FakeAgent {
    async fn plan(&self, _job_id: &JobId, _objective: &str, _cwd: &Path) -> Result<Plan, AgentError> {
        self.calls.lock().push("plan".into());
        self.plan.lock().clone().unwrap_or_else(|| Err(AgentError::NoJsonObject))
    }

    async fn assign_roles(&self, _job_id: &JobId, tasks: &[Task], _cwd: &Path) -> Result<HashMap<TaskId, Role>, AgentError> {
        self.calls.lock().push("assign_roles".into());
        match self.roles.lock().clone() {
            Some(result) => result,
            None => Ok(tasks.iter().map(|t| (t.id.clone(), Role::Executor)).collect()),
        }
    }

    async fn claim(&self, _job_id: &JobId, task: &Task, _cwd: &Path) -> Result<ClaimDoc, AgentError> {
        self.calls.lock().push(format!("claim {}", task.id));
        let tasks = self.tasks.lock();
        match tasks.get(&task.id).and_then(|s| s.claim.clone()) {
            Some(result) => result,
            None => Err(AgentError::NoJsonObject),
        }
    }

    async fn execute(&self, _job_id: &JobId, task: &Task, _claim: &ClaimDoc, _cwd: &Path) -> Result<ExecuteOutcome, AgentError> {
        self.calls.lock().push(format!("execute {}", task.id));
        let hold = self.hold_until_cancel.lock().get(&task.id).cloned();
        if let Some(notify) = hold {
            notify.notified().await;
            return Ok(ExecuteOutcome { exit_code: 143, stdout_tail: "terminated".into() });
        }
        let mut tasks = self.tasks.lock();
        let script = tasks.entry(task.id.clone()).or_default();
        match script.execute.len() {
            0 => Ok(ExecuteOutcome { exit_code: 0, stdout_tail: String::new() }),
            1 => script.execute.front().cloned().unwrap_or(Ok(ExecuteOutcome { exit_code: 0, stdout_tail: String::new() })),
            _ => script.execute.pop_front().unwrap_or(Ok(ExecuteOutcome { exit_code: 0, stdout_tail: String::new() })),
        }
    }

    async fn cancel(&self, task_id: &TaskId, force: bool) -> Result<(), AgentError> {
        self.calls.lock().push(format!("cancel {task_id} force={force}"));
        if let Some(notify) = self.hold_until_cancel.lock().get(task_id).cloned() {
            // `notify_one`, not `notify_waiters`: it stores a permit when no
            // task is parked on `notified()` yet, so a `cancel` that wins the
            // race against `execute` reaching its await point still wakes it
            // rather than the wakeup being silently dropped.
            notify.notify_one();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use numerus_core::ResourceIntents;

    fn task(id: &str) -> Task {
        Task::new(TaskId::new(id), "s".into(), "d".into(), vec![], ResourceIntents::default())
    }

    #[tokio::test]
    async fn records_calls_in_order() {
        let agent = FakeAgent::new();
        let job_id = JobId::new();
        let _ = agent.plan(&job_id, "obj", Path::new("/tmp")).await;
        let _ = agent.claim(&job_id, &task("t1"), Path::new("/tmp")).await;
        assert_eq!(agent.calls(), vec!["plan".to_string(), "claim t1".to_string()]);
    }

    #[tokio::test]
    async fn unscripted_execute_defaults_to_success() {
        let agent = FakeAgent::new();
        let job_id = JobId::new();
        let claim = ClaimDoc { task_id: "t1".into(), resources: Default::default(), execution: Default::default() };
        let outcome = agent.execute(&job_id, &task("t1"), &claim, Path::new("/tmp")).await.expect("default ok");
        assert_eq!(outcome.exit_code, 0);
    }
}
