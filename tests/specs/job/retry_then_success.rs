// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! S4: the first execute attempt exits non-zero; the retry budget allows a
//! second attempt, which succeeds. The task ends completed on attempt 2,
//! having gone through `analysis_pending` twice.

use std::collections::HashMap as StdHashMap;

use numerus_agent::test_support::FakeAgent;
use numerus_agent::ExecuteOutcome;
use numerus_core::{JobStatus, Role, TaskId, TaskState};
use numerus_plan::parse_plan;

use crate::support::{claim_doc, Harness};

#[tokio::test]
async fn a_failed_attempt_is_retried_and_then_succeeds() {
    let plan = parse_plan(r#"{"objective":"o","tasks":[{"id":"t1","summary":"s","dependencies":[],"resources":{"reads":[],"writes":[]}}]}"#)
        .expect("valid plan");
    let roles: StdHashMap<TaskId, Role> = [(TaskId::new("t1"), Role::Executor)].into_iter().collect();

    let agent = FakeAgent::new()
        .with_plan(Ok(plan))
        .with_roles(Ok(roles))
        .with_claim(TaskId::new("t1"), Ok(claim_doc("t1", vec![])))
        .with_execute(TaskId::new("t1"), Ok(ExecuteOutcome { exit_code: 1, stdout_tail: "first attempt failed".into() }))
        .with_execute(TaskId::new("t1"), Ok(ExecuteOutcome { exit_code: 0, stdout_tail: "second attempt ok".into() }));
    let harness = Harness::new(agent);

    // retry_limit of 1 permits exactly the one extra attempt this scenario needs.
    let handle = harness.runner.submit("o".into(), harness.working_dir(), 1);
    let job_id = handle.job_id;
    let status = handle.join.await.expect("join").expect("drive_job ok");

    assert_eq!(status, JobStatus::Done);
    let job = harness.store.job(&job_id).expect("job recorded");
    let task = &job.tasks[&TaskId::new("t1")];
    assert_eq!(task.state, TaskState::Completed);
    assert_eq!(task.attempt, 2);
}
