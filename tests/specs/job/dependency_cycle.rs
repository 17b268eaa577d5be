// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! S3: the agent's plan response names a dependency cycle. The job fails
//! immediately during planning; no task is ever created, let alone reaches
//! `analysis_pending`.

use numerus_agent::test_support::FakeAgent;
use numerus_agent::AgentError;
use numerus_core::event::kind;
use numerus_core::{JobStatus, TaskId};
use numerus_plan::PlanParseError;

use crate::support::{drain, Harness};

#[tokio::test]
async fn a_cyclic_plan_fails_the_job_before_any_task_starts() {
    let cycle_error = AgentError::PlanParse(PlanParseError::CycleDetected(vec![TaskId::new("t1"), TaskId::new("t2")]));
    let agent = FakeAgent::new().with_plan(Err(cycle_error));
    let harness = Harness::new(agent);
    let mut events = harness.subscribe_jobs();

    let handle = harness.runner.submit("o".into(), harness.working_dir(), 2);
    let job_id = handle.job_id;
    let status = handle.join.await.expect("join").expect("drive_job ok");

    assert_eq!(status, JobStatus::Failed);
    let job = harness.store.job(&job_id).expect("job recorded");
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.tasks.is_empty(), "a rejected plan must never reach add_tasks");

    let kinds: Vec<String> = drain(&mut events).into_iter().map(|e| e.event).collect();
    assert_eq!(kinds, vec![kind::PLAN_INVALID.to_string()]);
}
