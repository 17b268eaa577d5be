// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! S5: two independent tasks are both executing when the job is cancelled.
//! Within the grace period both receive a signal, both exit, the job ends
//! `cancelled`, and every lock is released.

use std::collections::HashMap as StdHashMap;
use std::time::Duration;

use numerus_agent::test_support::FakeAgent;
use numerus_core::{JobStatus, Role, TaskId, TaskState};
use numerus_plan::parse_plan;

use crate::support::{claim_doc, Harness};

#[tokio::test]
async fn cancelling_while_two_tasks_execute_ends_the_job_cancelled() {
    let plan = parse_plan(
        r#"{"objective":"o","tasks":[
            {"id":"t1","summary":"s","dependencies":[],"resources":{"reads":[],"writes":["a.txt"]}},
            {"id":"t2","summary":"s","dependencies":[],"resources":{"reads":[],"writes":["b.txt"]}}
        ]}"#,
    )
    .expect("valid plan");
    let roles: StdHashMap<TaskId, Role> = [(TaskId::new("t1"), Role::Executor), (TaskId::new("t2"), Role::Executor)].into_iter().collect();

    let agent = FakeAgent::new()
        .with_plan(Ok(plan))
        .with_roles(Ok(roles))
        .with_claim(TaskId::new("t1"), Ok(claim_doc("t1", vec!["a.txt"])))
        .with_claim(TaskId::new("t2"), Ok(claim_doc("t2", vec!["b.txt"])))
        .with_execute_held_until_cancel(TaskId::new("t1"))
        .with_execute_held_until_cancel(TaskId::new("t2"));
    let harness = Harness::new(agent);

    let handle = harness.runner.submit("o".into(), harness.working_dir(), 2);
    let job_id = handle.job_id;

    // Wait for both tasks to actually reach `Executing` (and therefore be
    // parked inside the scripted agent's `execute`) before cancelling —
    // cancelling any earlier would just short-circuit them from
    // `analysis_pending`, which isn't the mid-execute scenario this test
    // targets.
    for _ in 0..200 {
        let job = harness.store.job(&job_id).expect("job recorded");
        let all_executing = job.tasks.values().all(|t| t.state == TaskState::Executing);
        if all_executing {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let job = harness.store.job(&job_id).expect("job recorded");
    assert!(job.tasks.values().all(|t| t.state == TaskState::Executing), "both tasks should be executing before cancel: {job:?}");

    harness.runner.cancel(&job_id);
    let status = handle.join.await.expect("join").expect("drive_job ok");

    assert_eq!(status, JobStatus::Cancelled);
    let job = harness.store.job(&job_id).expect("job recorded");
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.tasks[&TaskId::new("t1")].state, TaskState::Cancelled);
    assert_eq!(job.tasks[&TaskId::new("t2")].state, TaskState::Cancelled);
    assert!(harness.store.locks_on(&numerus_core::normalize(&harness.working_dir(), "a.txt")).is_empty());
    assert!(harness.store.locks_on(&numerus_core::normalize(&harness.working_dir(), "b.txt")).is_empty());
}
