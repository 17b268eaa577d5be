// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! S1: a single-task job with no conflicts runs straight through to done.

use std::collections::HashMap as StdHashMap;

use numerus_agent::test_support::FakeAgent;
use numerus_core::event::kind;
use numerus_core::{JobStatus, Role, TaskId, TaskState};
use numerus_plan::parse_plan;

use crate::support::{claim_doc, drain, Harness};

#[tokio::test]
async fn single_task_job_runs_plan_claim_execute_release_to_done() {
    let plan = parse_plan(
        r#"{"objective":"write a file","tasks":[
            {"id":"t1","summary":"write a.txt","dependencies":[],"resources":{"reads":[],"writes":["a.txt"]}}
        ]}"#,
    )
    .expect("valid plan");
    let roles: StdHashMap<TaskId, Role> = [(TaskId::new("t1"), Role::Executor)].into_iter().collect();

    let agent = FakeAgent::new().with_plan(Ok(plan)).with_roles(Ok(roles)).with_claim(TaskId::new("t1"), Ok(claim_doc("t1", vec!["a.txt"])));
    let harness = Harness::new(agent);
    let mut events = harness.subscribe_jobs();

    let handle = harness.runner.submit("write a file".into(), harness.working_dir(), 2);
    let job_id = handle.job_id;
    let status = handle.join.await.expect("join").expect("drive_job ok");

    assert_eq!(status, JobStatus::Done);
    let job = harness.store.job(&job_id).expect("job recorded");
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.tasks[&TaskId::new("t1")].state, TaskState::Completed);
    assert!(harness.store.locks_on(&numerus_core::normalize(&harness.working_dir(), "a.txt")).is_empty());

    // `spec.md` §8 S1 names the exact journal:
    // `plan_created, claim_recorded(t1), claim_approved(t1), task_completed(t1), locks_released(t1)`.
    // Extra events this runner also emits (`roles_assigned`, `job_done`) are
    // permitted around that sequence; the named events must appear in order.
    let kinds: Vec<String> = drain(&mut events).into_iter().map(|e| e.event).collect();
    let expected =
        [kind::PLAN_CREATED, kind::CLAIM_RECORDED, kind::CLAIM_APPROVED, kind::TASK_COMPLETED, kind::LOCKS_RELEASED, kind::JOB_DONE];
    let mut positions = Vec::with_capacity(expected.len());
    for name in expected {
        let pos = kinds.iter().position(|k| k.as_str() == name).unwrap_or_else(|| panic!("{name} missing from journal: {kinds:?}"));
        positions.push(pos);
    }
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "journal out of order: {kinds:?}");
}
