// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! S2: two independent tasks write the same path. One is granted the lock
//! and executes immediately; the other is blocked until the first releases,
//! then is unblocked and approved in turn. Both end up completed.

use std::collections::HashMap as StdHashMap;

use numerus_agent::test_support::FakeAgent;
use numerus_core::event::kind;
use numerus_core::{JobStatus, Role, TaskId, TaskState};
use numerus_plan::parse_plan;

use crate::support::{claim_doc, drain, Harness};

#[tokio::test]
async fn conflicting_writers_serialize_through_blocked_then_unblocked() {
    let plan = parse_plan(
        r#"{"objective":"o","tasks":[
            {"id":"t1","summary":"s","dependencies":[],"resources":{"reads":[],"writes":["shared.txt"]}},
            {"id":"t2","summary":"s","dependencies":[],"resources":{"reads":[],"writes":["shared.txt"]}}
        ]}"#,
    )
    .expect("valid plan");
    let roles: StdHashMap<TaskId, Role> = [(TaskId::new("t1"), Role::Executor), (TaskId::new("t2"), Role::Executor)].into_iter().collect();

    let agent = FakeAgent::new()
        .with_plan(Ok(plan))
        .with_roles(Ok(roles))
        .with_claim(TaskId::new("t1"), Ok(claim_doc("t1", vec!["shared.txt"])))
        .with_claim(TaskId::new("t2"), Ok(claim_doc("t2", vec!["shared.txt"])));
    let harness = Harness::new(agent);
    let mut events = harness.subscribe_jobs();

    let handle = harness.runner.submit("o".into(), harness.working_dir(), 2);
    let job_id = handle.job_id;
    let status = handle.join.await.expect("join").expect("drive_job ok");

    assert_eq!(status, JobStatus::Done);
    let job = harness.store.job(&job_id).expect("job recorded");
    assert_eq!(job.tasks[&TaskId::new("t1")].state, TaskState::Completed);
    assert_eq!(job.tasks[&TaskId::new("t2")].state, TaskState::Completed);
    assert!(harness.store.locks_on(&numerus_core::normalize(&harness.working_dir(), "shared.txt")).is_empty());

    // `spec.md` §8 S2: the blocked writer emits `claim_blocked`, then
    // `claim_unblocked` once the first writer releases, then `claim_approved`
    // in turn. Two `claim_recorded`/`claim_approved` total, one per task.
    let kinds: Vec<String> = drain(&mut events).into_iter().map(|e| e.event).collect();
    assert_eq!(kinds.iter().filter(|k| k.as_str() == kind::CLAIM_RECORDED).count(), 2, "every claim is recorded once: {kinds:?}");
    assert_eq!(kinds.iter().filter(|k| k.as_str() == kind::CLAIM_BLOCKED).count(), 1, "exactly one writer should have been blocked: {kinds:?}");
    assert_eq!(kinds.iter().filter(|k| k.as_str() == kind::CLAIM_UNBLOCKED).count(), 1, "the blocked writer should unblock once: {kinds:?}");
    assert_eq!(kinds.iter().filter(|k| k.as_str() == kind::CLAIM_APPROVED).count(), 2, "both tasks end up approved: {kinds:?}");
    assert_eq!(kinds.iter().filter(|k| k.as_str() == kind::LOCKS_RELEASED).count(), 2, "both tasks release their locks: {kinds:?}");
    assert_eq!(kinds.iter().filter(|k| k.as_str() == kind::TASK_COMPLETED).count(), 2);

    let blocked_pos = kinds.iter().position(|k| k.as_str() == kind::CLAIM_BLOCKED).expect("claim_blocked present");
    let unblocked_pos = kinds.iter().position(|k| k.as_str() == kind::CLAIM_UNBLOCKED).expect("claim_unblocked present");
    assert!(blocked_pos < unblocked_pos, "blocked must precede unblocked: {kinds:?}");

    let last_approved_pos = kinds.iter().rposition(|k| k.as_str() == kind::CLAIM_APPROVED).expect("claim_approved present");
    assert!(unblocked_pos < last_approved_pos, "the unblocked writer's own approval must follow its unblock: {kinds:?}");
}
