// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! S6: a simulated process kill leaves a job's WAL showing `t1` still
//! `executing` and its write lock held. On restart, the Store's own replay
//! clears the stale lock (`spec.md` §4.5), and the daemon's startup
//! reconciliation (exercised here directly, without spinning up a full
//! `numerusd` process) fails the orphaned job and every non-terminal task
//! in it.

use std::path::PathBuf;

use numerus_core::{JobStatus, LockMode, ResourceIntents, Task, TaskId, TaskState};
use numerus_daemon::lifecycle::reconcile_non_terminal_jobs;
use numerus_store::Store;

#[test]
fn a_crashed_executing_task_is_cleared_and_failed_on_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let wal_path = dir.path().join("tasks.db");
    let runs_dir = dir.path().join("runs");
    let working_dir = PathBuf::from("/tmp");
    let job_id;

    {
        // First "process": plan a job, start t1 executing, acquire its
        // write lock, then vanish without ever releasing it or marking the
        // task terminal — exactly what an unclean kill leaves behind.
        let store = Store::open(&wal_path, runs_dir.clone()).expect("open store");
        job_id = numerus_core::JobId::new();
        store.create_job(job_id, "do it".into(), working_dir.clone(), 0, 2).expect("create job");
        let task = Task::new(TaskId::new("t1"), "write a.txt".into(), "d".into(), vec![], ResourceIntents { reads: vec![], writes: vec!["a.txt".into()] });
        store.add_tasks(job_id, vec![task]).expect("add tasks");
        store.set_job_status(job_id, numerus_core::JobStatus::Running).expect("set running");
        store.transition_task(job_id, TaskId::new("t1"), TaskState::Executing, 1, None, None, None).expect("transition to executing");
        let path = numerus_core::normalize(&working_dir, "a.txt");
        store.acquire_lock(job_id, TaskId::new("t1"), path, LockMode::Write, 0).expect("acquire lock");
        // store dropped here: no graceful shutdown, no release.
    }

    // "Restart": reopen the store (replays the WAL, GCs the stale lock),
    // then run the same non-terminal-job reconciliation `numerusd` runs at
    // startup.
    let store = Store::open(&wal_path, runs_dir).expect("reopen store");
    assert!(
        store.locks_on(&numerus_core::normalize(&working_dir, "a.txt")).is_empty(),
        "replay must clear the stale write lock left by the crashed task"
    );
    assert_eq!(store.job(&job_id).expect("job survives replay").tasks[&TaskId::new("t1")].state, TaskState::Executing, "replay alone does not touch task state");

    reconcile_non_terminal_jobs(&std::sync::Arc::new(store)).expect("reconcile");
    // Re-open once more to read back through a fresh handle, matching how
    // a real restart would hand the reconciled store to the Job Runner.
    let store = Store::open(&wal_path, dir.path().join("runs")).expect("reopen again");
    let job = store.job(&job_id).expect("job still present");
    assert_eq!(job.status, JobStatus::Failed, "orphaned job must be failed on restart");
    assert_eq!(job.tasks[&TaskId::new("t1")].state, TaskState::Failed, "orphaned executing task must be failed, not left dangling");
}
