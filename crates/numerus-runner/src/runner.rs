// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! The Job Runner's per-job driving loop (`spec.md` §4.1, §9 "Concurrency
//! reshape"). Store, Bus, and Arbiter calls here are all synchronous — the
//! only suspension points are the agent-driven claim and execute phases,
//! each spawned as its own task and reporting back through the mailbox.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use numerus_agent::{AgentAdapter, AgentError, ExecuteOutcome};
use numerus_arbiter::{Arbiter, Decision, Grant, PendingClaim};
use numerus_bus::Bus;
use numerus_core::event::kind;
use numerus_core::{
    Claim, ClaimDecision, ClaimKey, Clock, Event, JobId, JobStatus, Lock, NumerusError, ResourceIntents, SystemClock, Task, TaskId,
    TaskState,
};
use numerus_plan::ClaimDoc;
use numerus_store::{StoreError, StoreHandle};
use serde_json::json;
use tokio::sync::{mpsc, Notify, OwnedSemaphorePermit, Semaphore};

use crate::dependents::transitive_dependents;
use crate::mailbox::{ClaimAttemptOutcome, RunnerEvent};

const MAILBOX_CAPACITY: usize = 256;

fn store_err(e: StoreError) -> NumerusError {
    NumerusError::Store(e.to_string())
}

/// Shared, process-lifetime state a [`JobRunner`] hands to every job it drives.
struct RunnerContext<A: AgentAdapter + 'static, C: Clock> {
    store: StoreHandle,
    bus: Arc<Bus>,
    arbiter: Arc<Arbiter>,
    agent: Arc<A>,
    clock: C,
    cancel_grace: Duration,
    /// Caps the number of concurrent agent invocations (claim or execute,
    /// each one terminal session) across every job this runner drives
    /// (`spec.md` §6 `MAX_PARALLEL_TASKS`). `None` is unbounded.
    max_parallel: Option<Arc<Semaphore>>,
}

/// Acquire a permit against the global `MAX_PARALLEL_TASKS` gate, if one is
/// configured. Held for the duration of one agent invocation; dropping it
/// frees the slot for the next ready claim or execute attempt.
async fn acquire_permit<A: AgentAdapter + 'static, C: Clock>(ctx: &RunnerContext<A, C>) -> Option<OwnedSemaphorePermit> {
    match &ctx.max_parallel {
        // `JobRunner` never calls `Semaphore::close`, so `acquire_owned`
        // cannot observe a closed semaphore here.
        Some(sem) => match sem.clone().acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(_) => unreachable!("runner semaphore is never closed"),
        },
        None => None,
    }
}

/// A submitted job's handle: its id, and the background task driving it to
/// completion. `spec.md` §4.1: "kicks off planning asynchronously and
/// returns immediately" — callers that want the final status `.await` the
/// join handle; the daemon instead detaches it and drives the job purely
/// off Store/Bus observation.
pub struct RunnerHandle {
    pub job_id: JobId,
    pub join: tokio::task::JoinHandle<Result<JobStatus, NumerusError>>,
}

/// The Job Runner (C7): owns no state of its own beyond the shared
/// component handles and the cancellation registry; everything about an
/// individual job's progress lives in the Store and in the local variables
/// of that job's `drive_job` task.
pub struct JobRunner<A: AgentAdapter + 'static, C: Clock = SystemClock> {
    ctx: Arc<RunnerContext<A, C>>,
    cancels: Arc<parking_lot::Mutex<HashMap<JobId, Arc<Notify>>>>,
}

impl<A: AgentAdapter + 'static, C: Clock> Clone for JobRunner<A, C> {
    fn clone(&self) -> Self {
        Self { ctx: self.ctx.clone(), cancels: self.cancels.clone() }
    }
}

impl<A: AgentAdapter + 'static, C: Clock> JobRunner<A, C> {
    /// `max_parallel_tasks`: `None` for unbounded concurrent agent
    /// invocations, `Some(n)` to cap claim/execute invocations across every
    /// job this runner drives at `n` concurrent terminal sessions
    /// (`spec.md` §6 `MAX_PARALLEL_TASKS`).
    pub fn new(
        store: StoreHandle,
        bus: Arc<Bus>,
        arbiter: Arc<Arbiter>,
        agent: Arc<A>,
        clock: C,
        cancel_grace: Duration,
        max_parallel_tasks: Option<usize>,
    ) -> Self {
        let max_parallel = max_parallel_tasks.map(|n| Arc::new(Semaphore::new(n.max(1))));
        let ctx = Arc::new(RunnerContext { store, bus, arbiter, agent, clock, cancel_grace, max_parallel });
        Self { ctx, cancels: Arc::new(parking_lot::Mutex::new(HashMap::new())) }
    }

    pub fn store(&self) -> &StoreHandle {
        &self.ctx.store
    }

    /// Create the job record and spawn its driver. Per `spec.md` §4.1 the
    /// planning phase itself runs inside that driver, not here — this
    /// method never blocks on the agent.
    pub fn submit(&self, objective: String, working_dir: PathBuf, retry_limit: u32) -> RunnerHandle {
        let job_id = JobId::new();
        let now = self.ctx.clock.epoch_ms();

        if let Err(e) = self.ctx.store.create_job(job_id, objective.clone(), working_dir.clone(), now, retry_limit) {
            let err = store_err(e);
            let join = tokio::spawn(async move { Err(err) });
            return RunnerHandle { job_id, join };
        }

        let notify = Arc::new(Notify::new());
        self.cancels.lock().insert(job_id, notify.clone());
        let ctx = self.ctx.clone();
        let cancels = self.cancels.clone();
        let join = tokio::spawn(async move {
            let result = drive_job(ctx, job_id, objective, working_dir, retry_limit, notify).await;
            cancels.lock().remove(&job_id);
            result
        });
        RunnerHandle { job_id, join }
    }

    /// Request cancellation of a running job (`spec.md` §5). A no-op if the
    /// job is unknown or already terminal — there is nothing left to wake.
    pub fn cancel(&self, job_id: &JobId) {
        if let Some(notify) = self.cancels.lock().get(job_id) {
            notify.notify_one();
        }
    }
}

fn completed_ids(states: &HashMap<TaskId, TaskState>) -> HashSet<TaskId> {
    states.iter().filter(|(_, s)| **s == TaskState::Completed).map(|(id, _)| id.clone()).collect()
}

/// Every `Pending` task whose dependencies are satisfied, in ready-task
/// tie-break order: `(declared_write_count asc, task_id asc)` (`spec.md` §4.1).
fn ready_task_ids(tasks: &HashMap<TaskId, Task>, states: &HashMap<TaskId, TaskState>, completed: &HashSet<TaskId>) -> Vec<TaskId> {
    let mut ready: Vec<&TaskId> = tasks
        .keys()
        .filter(|id| matches!(states.get(*id), Some(TaskState::Pending)) && tasks[*id].dependencies_satisfied(completed))
        .collect();
    ready.sort_by_key(|id| (tasks[*id].resources.write_count(), (*id).clone()));
    ready.into_iter().cloned().collect()
}

#[allow(clippy::too_many_arguments)]
fn schedule_ready<A: AgentAdapter + 'static, C: Clock>(
    ctx: &Arc<RunnerContext<A, C>>,
    tx: &mpsc::Sender<RunnerEvent>,
    job_id: JobId,
    working_dir: &Path,
    tasks: &HashMap<TaskId, Task>,
    states: &mut HashMap<TaskId, TaskState>,
    attempts: &HashMap<TaskId, u32>,
) -> Result<(), NumerusError> {
    let completed = completed_ids(states);
    for task_id in ready_task_ids(tasks, states, &completed) {
        states.insert(task_id.clone(), TaskState::AnalysisPending);
        let attempt = attempts.get(&task_id).copied().unwrap_or(1);
        ctx.store.transition_task(job_id, task_id.clone(), TaskState::AnalysisPending, attempt, None, None, None).map_err(store_err)?;
        let task = tasks[&task_id].clone();
        tokio::spawn(run_claim_attempt(ctx.clone(), tx.clone(), job_id, working_dir.to_path_buf(), task, attempt));
    }
    Ok(())
}

async fn run_claim_attempt<A: AgentAdapter + 'static, C: Clock>(
    ctx: Arc<RunnerContext<A, C>>,
    tx: mpsc::Sender<RunnerEvent>,
    job_id: JobId,
    working_dir: PathBuf,
    task: Task,
    attempt: u32,
) {
    let _permit = acquire_permit(&ctx).await;
    let task_id = task.id.clone();
    match ctx.agent.claim(&job_id, &task, &working_dir).await {
        Err(e) => {
            let _ = tx.send(RunnerEvent::ClaimFinished { task_id, attempt, outcome: ClaimAttemptOutcome::Err(e) }).await;
        }
        Ok(claim_doc) => {
            let reads = claim_doc.resources.reads.iter().map(|p| numerus_core::normalize(&working_dir, p)).collect();
            let writes = claim_doc.resources.writes.iter().map(|p| numerus_core::normalize(&working_dir, p)).collect();
            let key = ClaimKey { job_id, task_id: task_id.clone(), attempt };
            let pending = PendingClaim::from_paths(key, reads, writes);
            let now = ctx.clock.epoch_ms();
            let (decision, grant) = ctx.arbiter.evaluate_and_acquire(pending, now);
            let outcome = match decision {
                Decision::Go => ClaimAttemptOutcome::Go { claim_doc, locks: grant.map(|g| g.locks).unwrap_or_default() },
                Decision::Blocked { reason, .. } => ClaimAttemptOutcome::Blocked { claim_doc, reason },
            };
            let _ = tx.send(RunnerEvent::ClaimFinished { task_id, attempt, outcome }).await;
        }
    }
}

async fn run_execute_attempt<A: AgentAdapter + 'static, C: Clock>(
    ctx: Arc<RunnerContext<A, C>>,
    tx: mpsc::Sender<RunnerEvent>,
    job_id: JobId,
    working_dir: PathBuf,
    task: Task,
    attempt: u32,
    claim_doc: ClaimDoc,
) {
    let _permit = acquire_permit(&ctx).await;
    let task_id = task.id.clone();
    let result = ctx.agent.execute(&job_id, &task, &claim_doc, &working_dir).await;
    let _ = tx.send(RunnerEvent::ExecuteFinished { task_id, attempt, result }).await;
}

fn claim_to_resources(doc: &ClaimDoc) -> ResourceIntents {
    ResourceIntents { reads: doc.resources.reads.clone(), writes: doc.resources.writes.clone() }
}

/// Retry a failed attempt if its error kind is retryable and the job's
/// retry budget isn't exhausted; otherwise fail the task permanently and
/// cancel every transitive dependent (`spec.md` §4.1, §7). Returns whether
/// the task failed permanently (vs. was rescheduled).
#[allow(clippy::too_many_arguments)]
fn apply_attempt_failure<A: AgentAdapter + 'static, C: Clock>(
    ctx: &Arc<RunnerContext<A, C>>,
    tx: &mpsc::Sender<RunnerEvent>,
    job_id: JobId,
    working_dir: &Path,
    tasks: &HashMap<TaskId, Task>,
    states: &mut HashMap<TaskId, TaskState>,
    attempts: &mut HashMap<TaskId, u32>,
    retry_limit: u32,
    task_id: TaskId,
    attempt: u32,
    error: NumerusError,
    exit_status: Option<i32>,
) -> Result<bool, NumerusError> {
    if error.is_retryable_attempt_failure() && attempt <= retry_limit {
        let next_attempt = attempt + 1;
        attempts.insert(task_id.clone(), next_attempt);
        states.insert(task_id.clone(), TaskState::AnalysisPending);
        ctx.store
            .transition_task(job_id, task_id.clone(), TaskState::AnalysisPending, next_attempt, exit_status, None, Some(error.to_string()))
            .map_err(store_err)?;
        let task = tasks[&task_id].clone();
        tokio::spawn(run_claim_attempt(ctx.clone(), tx.clone(), job_id, working_dir.to_path_buf(), task, next_attempt));
        return Ok(false);
    }

    states.insert(task_id.clone(), TaskState::Failed);
    ctx.store
        .transition_task(job_id, task_id.clone(), TaskState::Failed, attempt, exit_status, None, Some(error.to_string()))
        .map_err(store_err)?;
    ctx.bus.publish(Event::new(ctx.clock.epoch_ms(), kind::TASK_FAILED, job_id, Some(task_id.clone()), json!({"error": error.to_string()})));

    for dep_id in transitive_dependents(tasks, &task_id) {
        let still_open = states.get(&dep_id).map(|s| !s.is_terminal()).unwrap_or(false);
        if !still_open {
            continue;
        }
        states.insert(dep_id.clone(), TaskState::Cancelled);
        let dep_attempt = attempts.get(&dep_id).copied().unwrap_or(1);
        ctx.store
            .transition_task(
                job_id,
                dep_id.clone(),
                TaskState::Cancelled,
                dep_attempt,
                None,
                None,
                Some(format!("dependency {task_id} failed")),
            )
            .map_err(store_err)?;
        ctx.bus.publish(Event::new(ctx.clock.epoch_ms(), kind::TASK_CANCELLED, job_id, Some(dep_id), json!({})));
    }
    Ok(true)
}

#[allow(clippy::too_many_arguments)]
fn handle_claim_finished<A: AgentAdapter + 'static, C: Clock>(
    ctx: &Arc<RunnerContext<A, C>>,
    tx: &mpsc::Sender<RunnerEvent>,
    job_id: JobId,
    working_dir: &Path,
    tasks: &HashMap<TaskId, Task>,
    states: &mut HashMap<TaskId, TaskState>,
    attempts: &mut HashMap<TaskId, u32>,
    in_flight_claims: &mut HashMap<TaskId, ClaimDoc>,
    executing_locks: &mut HashMap<TaskId, Vec<Lock>>,
    retry_limit: u32,
    task_id: TaskId,
    attempt: u32,
    outcome: ClaimAttemptOutcome,
) -> Result<bool, NumerusError> {
    let now = ctx.clock.epoch_ms();
    match outcome {
        ClaimAttemptOutcome::Go { claim_doc, locks } => {
            for lock in &locks {
                ctx.store.acquire_lock(job_id, task_id.clone(), lock.path.clone(), lock.mode, now).map_err(store_err)?;
            }
            let key = ClaimKey { job_id, task_id: task_id.clone(), attempt };
            let mut claim = Claim::new(key, claim_to_resources(&claim_doc), claim_doc.execution.commands.clone(), now);
            ctx.bus.publish(Event::new(now, kind::CLAIM_RECORDED, job_id, Some(task_id.clone()), json!({"attempt": attempt})));
            claim.decision = ClaimDecision::Approved;
            ctx.store.record_claim(claim).map_err(store_err)?;
            ctx.bus.publish(Event::new(now, kind::CLAIM_APPROVED, job_id, Some(task_id.clone()), json!({"attempt": attempt})));

            states.insert(task_id.clone(), TaskState::Executing);
            ctx.store.transition_task(job_id, task_id.clone(), TaskState::Executing, attempt, None, None, None).map_err(store_err)?;
            executing_locks.insert(task_id.clone(), locks);
            let task = tasks[&task_id].clone();
            tokio::spawn(run_execute_attempt(ctx.clone(), tx.clone(), job_id, working_dir.to_path_buf(), task, attempt, claim_doc));
            Ok(false)
        }
        ClaimAttemptOutcome::Blocked { claim_doc, reason } => {
            let key = ClaimKey { job_id, task_id: task_id.clone(), attempt };
            let mut claim = Claim::new(key, claim_to_resources(&claim_doc), claim_doc.execution.commands.clone(), now);
            ctx.bus.publish(Event::new(now, kind::CLAIM_RECORDED, job_id, Some(task_id.clone()), json!({"attempt": attempt})));
            claim.decision = ClaimDecision::Blocked { reason: reason.clone() };
            ctx.store.record_claim(claim).map_err(store_err)?;
            ctx.bus.publish(Event::new(now, kind::CLAIM_BLOCKED, job_id, Some(task_id.clone()), json!({"reason": reason})));

            states.insert(task_id.clone(), TaskState::AnalysisPending);
            ctx.store
                .transition_task(job_id, task_id.clone(), TaskState::AnalysisPending, attempt, None, None, Some(reason))
                .map_err(store_err)?;
            in_flight_claims.insert(task_id, claim_doc);
            Ok(false)
        }
        ClaimAttemptOutcome::Err(e) => {
            let error = e.into_numerus_error(&task_id);
            apply_attempt_failure(ctx, tx, job_id, working_dir, tasks, states, attempts, retry_limit, task_id, attempt, error, None)
        }
    }
}

/// Install a claim the arbiter granted as a side effect of some other
/// task's `release` — mirrors the `Go` arm of [`handle_claim_finished`], but
/// the claim doc comes from `in_flight_claims` rather than a fresh
/// invocation (`spec.md` §4.2 "Starvation mitigation").
#[allow(clippy::too_many_arguments)]
fn install_grant<A: AgentAdapter + 'static, C: Clock>(
    ctx: &Arc<RunnerContext<A, C>>,
    tx: &mpsc::Sender<RunnerEvent>,
    job_id: JobId,
    working_dir: &Path,
    tasks: &HashMap<TaskId, Task>,
    states: &mut HashMap<TaskId, TaskState>,
    attempts: &HashMap<TaskId, u32>,
    in_flight_claims: &mut HashMap<TaskId, ClaimDoc>,
    executing_locks: &mut HashMap<TaskId, Vec<Lock>>,
    grant: Grant,
) -> Result<(), NumerusError> {
    let task_id = grant.key.task_id.clone();
    let Some(claim_doc) = in_flight_claims.remove(&task_id) else {
        // The arbiter's park queue and this job's view of in-flight claims
        // are expected to stay in lockstep; a mismatch here is a runner
        // bug, not a condition a caller can act on. Drop the grant rather
        // than fail the whole job over it.
        tracing::error!(task = %task_id, "arbiter granted a claim with no matching in-flight record");
        return Ok(());
    };
    let now = ctx.clock.epoch_ms();
    for lock in &grant.locks {
        ctx.store.acquire_lock(job_id, task_id.clone(), lock.path.clone(), lock.mode, now).map_err(store_err)?;
    }
    let mut claim = Claim::new(grant.key.clone(), claim_to_resources(&claim_doc), claim_doc.execution.commands.clone(), now);
    claim.decision = ClaimDecision::Approved;
    ctx.store.record_claim(claim).map_err(store_err)?;
    ctx.bus.publish(Event::new(now, kind::CLAIM_UNBLOCKED, job_id, Some(task_id.clone()), json!({})));
    ctx.bus.publish(Event::new(now, kind::CLAIM_APPROVED, job_id, Some(task_id.clone()), json!({"attempt": grant.key.attempt})));

    states.insert(task_id.clone(), TaskState::Executing);
    let attempt = attempts.get(&task_id).copied().unwrap_or(grant.key.attempt);
    ctx.store.transition_task(job_id, task_id.clone(), TaskState::Executing, attempt, None, None, None).map_err(store_err)?;
    executing_locks.insert(task_id.clone(), grant.locks);
    let task = tasks[&task_id].clone();
    tokio::spawn(run_execute_attempt(ctx.clone(), tx.clone(), job_id, working_dir.to_path_buf(), task, attempt, claim_doc));
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_execute_finished<A: AgentAdapter + 'static, C: Clock>(
    ctx: &Arc<RunnerContext<A, C>>,
    tx: &mpsc::Sender<RunnerEvent>,
    job_id: JobId,
    working_dir: &Path,
    tasks: &HashMap<TaskId, Task>,
    states: &mut HashMap<TaskId, TaskState>,
    attempts: &mut HashMap<TaskId, u32>,
    in_flight_claims: &mut HashMap<TaskId, ClaimDoc>,
    executing_locks: &mut HashMap<TaskId, Vec<Lock>>,
    retry_limit: u32,
    cancelling: bool,
    task_id: TaskId,
    attempt: u32,
    result: Result<ExecuteOutcome, AgentError>,
) -> Result<bool, NumerusError> {
    let now = ctx.clock.epoch_ms();
    if let Some(locks) = executing_locks.remove(&task_id) {
        for lock in &locks {
            ctx.store.release_lock(job_id, lock.path.clone(), task_id.clone()).map_err(store_err)?;
        }
    }
    in_flight_claims.remove(&task_id);
    let grants = ctx.arbiter.release(&job_id, &task_id, now);
    ctx.bus.publish(Event::new(now, kind::LOCKS_RELEASED, job_id, Some(task_id.clone()), json!({"unblocked": grants.len()})));
    for grant in grants {
        install_grant(ctx, tx, job_id, working_dir, tasks, states, attempts, in_flight_claims, executing_locks, grant)?;
    }

    if cancelling {
        let exit_status = result.as_ref().ok().map(|o| o.exit_code);
        states.insert(task_id.clone(), TaskState::Cancelled);
        ctx.store
            .transition_task(job_id, task_id.clone(), TaskState::Cancelled, attempt, exit_status, None, Some("job cancelled".into()))
            .map_err(store_err)?;
        ctx.bus.publish(Event::new(ctx.clock.epoch_ms(), kind::TASK_CANCELLED, job_id, Some(task_id), json!({})));
        return Ok(false);
    }

    match result {
        Ok(outcome) if outcome.exit_code == 0 => {
            states.insert(task_id.clone(), TaskState::Completed);
            ctx.store
                .transition_task(job_id, task_id.clone(), TaskState::Completed, attempt, Some(0), Some(outcome.stdout_tail), None)
                .map_err(store_err)?;
            ctx.bus.publish(Event::new(ctx.clock.epoch_ms(), kind::TASK_COMPLETED, job_id, Some(task_id), json!({"attempt": attempt})));
            Ok(false)
        }
        Ok(outcome) => {
            let error = NumerusError::AgentNonZeroExit { code: outcome.exit_code };
            let exit = Some(outcome.exit_code);
            apply_attempt_failure(ctx, tx, job_id, working_dir, tasks, states, attempts, retry_limit, task_id, attempt, error, exit)
        }
        Err(e) => {
            let error = e.into_numerus_error(&task_id);
            apply_attempt_failure(ctx, tx, job_id, working_dir, tasks, states, attempts, retry_limit, task_id, attempt, error, None)
        }
    }
}

async fn drive_job<A: AgentAdapter + 'static, C: Clock>(
    ctx: Arc<RunnerContext<A, C>>,
    job_id: JobId,
    objective: String,
    working_dir: PathBuf,
    retry_limit: u32,
    cancel_notify: Arc<Notify>,
) -> Result<JobStatus, NumerusError> {
    let plan = match ctx.agent.plan(&job_id, &objective, &working_dir).await {
        Ok(plan) => plan,
        Err(e) => {
            ctx.store.set_job_status(job_id, JobStatus::Failed).map_err(store_err)?;
            ctx.bus.publish(Event::new(ctx.clock.epoch_ms(), kind::PLAN_INVALID, job_id, None, json!({"error": e.to_string()})));
            return Ok(JobStatus::Failed);
        }
    };

    let plan_json = serde_json::to_string(&json!({
        "objective": plan.objective,
        "tasks": plan.tasks.values().collect::<Vec<_>>(),
    }))
    .unwrap_or_default();
    ctx.store.persist_plan_file(&job_id, &plan_json).map_err(store_err)?;
    ctx.store.add_tasks(job_id, plan.tasks.values().cloned().collect()).map_err(store_err)?;
    ctx.bus.publish(Event::new(ctx.clock.epoch_ms(), kind::PLAN_CREATED, job_id, None, json!({"task_count": plan.tasks.len()})));

    let task_list: Vec<Task> = plan.tasks.values().cloned().collect();
    match ctx.agent.assign_roles(&job_id, &task_list, &working_dir).await {
        Ok(roles) => {
            for (task_id, role) in &roles {
                ctx.store.assign_role(job_id, task_id.clone(), *role).map_err(store_err)?;
            }
            ctx.bus.publish(Event::new(ctx.clock.epoch_ms(), kind::ROLES_ASSIGNED, job_id, None, json!({"count": roles.len()})));
        }
        Err(e) => {
            // Role metadata has no scheduling effect (spec.md §9 Open
            // Question); a failed pass just leaves every task with no role.
            tracing::warn!(job = %job_id, error = %e, "role assignment failed, tasks keep no role");
        }
    }
    ctx.store.set_job_status(job_id, JobStatus::Running).map_err(store_err)?;

    let tasks = plan.tasks;
    let mut states: HashMap<TaskId, TaskState> = tasks.keys().map(|id| (id.clone(), TaskState::Pending)).collect();
    let mut attempts: HashMap<TaskId, u32> = tasks.keys().map(|id| (id.clone(), 1u32)).collect();
    let mut executing_locks: HashMap<TaskId, Vec<Lock>> = HashMap::new();
    let mut in_flight_claims: HashMap<TaskId, ClaimDoc> = HashMap::new();
    let mut job_failed = false;
    let mut cancelling = false;

    let (tx, mut rx) = mpsc::channel::<RunnerEvent>(MAILBOX_CAPACITY);
    schedule_ready(&ctx, &tx, job_id, &working_dir, &tasks, &mut states, &attempts)?;

    loop {
        if states.values().all(|s| s.is_terminal()) {
            break;
        }

        tokio::select! {
            _ = cancel_notify.notified(), if !cancelling => {
                cancelling = true;
                ctx.store.set_job_status(job_id, JobStatus::Cancelling).map_err(store_err)?;
                ctx.bus.publish(Event::new(ctx.clock.epoch_ms(), kind::JOB_CANCELLED, job_id, None, json!({"phase": "requested"})));

                for task_id in executing_locks.keys() {
                    let _ = ctx.agent.cancel(task_id, false).await;
                }
                if !executing_locks.is_empty() {
                    let grace = ctx.cancel_grace;
                    let agent = ctx.agent.clone();
                    let executing_ids: Vec<TaskId> = executing_locks.keys().cloned().collect();
                    tokio::spawn(async move {
                        tokio::time::sleep(grace).await;
                        for id in executing_ids {
                            let _ = agent.cancel(&id, true).await;
                        }
                    });
                }

                let non_executing: Vec<TaskId> = states
                    .iter()
                    .filter(|(_, s)| !s.is_terminal() && **s != TaskState::Executing)
                    .map(|(id, _)| id.clone())
                    .collect();
                for task_id in non_executing {
                    states.insert(task_id.clone(), TaskState::Cancelled);
                    let attempt = attempts.get(&task_id).copied().unwrap_or(1);
                    ctx.store
                        .transition_task(job_id, task_id.clone(), TaskState::Cancelled, attempt, None, None, Some("job cancelled".into()))
                        .map_err(store_err)?;
                    ctx.bus.publish(Event::new(ctx.clock.epoch_ms(), kind::TASK_CANCELLED, job_id, Some(task_id), json!({})));
                }
            }
            event = rx.recv() => {
                let Some(event) = event else { break; };
                match event {
                    RunnerEvent::ClaimFinished { task_id, attempt, outcome } => {
                        let failed = handle_claim_finished(
                            &ctx, &tx, job_id, &working_dir, &tasks, &mut states, &mut attempts,
                            &mut in_flight_claims, &mut executing_locks, retry_limit, task_id, attempt, outcome,
                        )?;
                        job_failed |= failed;
                    }
                    RunnerEvent::ExecuteFinished { task_id, attempt, result } => {
                        let failed = handle_execute_finished(
                            &ctx, &tx, job_id, &working_dir, &tasks, &mut states, &mut attempts,
                            &mut in_flight_claims, &mut executing_locks, retry_limit, cancelling, task_id, attempt, result,
                        )?;
                        job_failed |= failed;
                        if !cancelling {
                            schedule_ready(&ctx, &tx, job_id, &working_dir, &tasks, &mut states, &attempts)?;
                        }
                    }
                }
            }
        }
    }

    let final_status = if cancelling {
        JobStatus::Cancelled
    } else if job_failed {
        JobStatus::Failed
    } else {
        JobStatus::Done
    };
    ctx.store.set_job_status(job_id, final_status).map_err(store_err)?;
    let event_kind = match final_status {
        JobStatus::Done => kind::JOB_DONE,
        JobStatus::Failed => kind::JOB_FAILED,
        _ => kind::JOB_CANCELLED,
    };
    ctx.bus.publish(Event::new(ctx.clock.epoch_ms(), event_kind, job_id, None, json!({})));
    Ok(final_status)
}
