// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! Validated internal plan/claim records (`spec.md` §4.4, §9 "Dynamic JSON
//! shapes": parse into tagged internal records, not free-form maps).

use std::collections::HashMap;

use numerus_core::{ResourceIntents, Role, Task, TaskId};

use crate::error::PlanParseError;
use crate::wire::{ClaimDoc, PlanDoc, RoleAssignmentDoc};

/// A validated plan: an acyclic task DAG ready to be persisted and driven
/// by the Job Runner.
#[derive(Debug, Clone)]
pub struct Plan {
    pub objective: String,
    /// Topological order of task ids, computed at validation time.
    pub order: Vec<TaskId>,
    pub tasks: HashMap<TaskId, Task>,
}

/// Parse and validate a `NUMERUS_PLAN V1` response body into a [`Plan`].
///
/// Enforces `spec.md` §4.4: unique task ids, dependencies reference
/// existing ids, no dependency cycles, non-empty path strings (empty
/// `reads`/`writes` arrays are fine).
pub fn parse_plan(json: &str) -> Result<Plan, PlanParseError> {
    let doc: PlanDoc = serde_json::from_str(json).map_err(|e| PlanParseError::Malformed(e.to_string()))?;

    let mut tasks: HashMap<TaskId, Task> = HashMap::new();
    for task_doc in &doc.tasks {
        if task_doc.id.trim().is_empty() {
            return Err(PlanParseError::EmptyTaskId(task_doc.summary.clone()));
        }
        let id = TaskId::new(task_doc.id.clone());
        if tasks.contains_key(&id) {
            return Err(PlanParseError::DuplicateTaskId(task_doc.id.clone()));
        }

        for path in task_doc.resources.reads.iter().chain(task_doc.resources.writes.iter()) {
            if path.trim().is_empty() {
                return Err(PlanParseError::Malformed(format!("task {} declares an empty resource path", task_doc.id)));
            }
        }

        let dependencies: Vec<TaskId> = task_doc.dependencies.iter().map(|d| TaskId::new(d.clone())).collect();
        let resources = ResourceIntents { reads: task_doc.resources.reads.clone(), writes: task_doc.resources.writes.clone() };
        tasks.insert(id.clone(), Task::new(id, task_doc.summary.clone(), task_doc.description.clone(), dependencies, resources));
    }

    let ids: Vec<TaskId> = tasks.keys().cloned().collect();
    for task in tasks.values() {
        for dep in &task.dependencies {
            if !tasks.contains_key(dep) {
                return Err(PlanParseError::UnknownDependency { task: task.id.to_string(), dependency: dep.to_string() });
            }
        }
    }

    let dependencies: HashMap<TaskId, Vec<TaskId>> = tasks.iter().map(|(id, t)| (id.clone(), t.dependencies.clone())).collect();
    let order = crate::dag::topological_order(&ids, &dependencies).map_err(PlanParseError::CycleDetected)?;

    Ok(Plan { objective: doc.objective, order, tasks })
}

/// Parse a `NUMERUS_CLAIM V1` response body for the given expected task.
pub fn parse_claim_doc(json: &str, expected_task_id: &TaskId) -> Result<ClaimDoc, crate::error::ClaimParseError> {
    let doc: ClaimDoc = serde_json::from_str(json).map_err(|e| crate::error::ClaimParseError::Malformed(e.to_string()))?;
    if doc.task_id != expected_task_id.as_str() {
        return Err(crate::error::ClaimParseError::TaskIdMismatch { expected: expected_task_id.to_string(), claimed: doc.task_id });
    }
    for path in doc.resources.reads.iter().chain(doc.resources.writes.iter()) {
        if path.trim().is_empty() {
            return Err(crate::error::ClaimParseError::EmptyPath);
        }
    }
    Ok(doc)
}

/// Parse the role-assignment pass output into `task_id -> Role`.
pub fn parse_roles(json: &str) -> Result<HashMap<TaskId, Role>, PlanParseError> {
    let doc: RoleAssignmentDoc = serde_json::from_str(json).map_err(|e| PlanParseError::Malformed(e.to_string()))?;
    let mut out = HashMap::new();
    for (task_id, role_str) in doc.roles {
        let role = match role_str.as_str() {
            "planner" => Role::Planner,
            "executor" => Role::Executor,
            "reviewer" => Role::Reviewer,
            "queen" => Role::Queen,
            other => return Err(PlanParseError::Malformed(format!("unknown role {other:?} for task {task_id}"))),
        };
        out.insert(TaskId::new(task_id), role);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_plan() {
        let json = r#"{
            "objective": "ship the feature",
            "tasks": [
                {"id": "t1", "summary": "write code", "dependencies": [], "resources": {"reads": [], "writes": ["a.txt"]}},
                {"id": "t2", "summary": "review", "dependencies": ["t1"], "resources": {"reads": ["a.txt"], "writes": []}}
            ]
        }"#;
        let plan = parse_plan(json).expect("valid plan");
        assert_eq!(plan.order, vec![TaskId::new("t1"), TaskId::new("t2")]);
        assert_eq!(plan.tasks.len(), 2);
    }

    #[test]
    fn rejects_duplicate_task_ids() {
        let json = r#"{"objective":"x","tasks":[
            {"id":"t1","summary":"a","dependencies":[],"resources":{"reads":[],"writes":[]}},
            {"id":"t1","summary":"b","dependencies":[],"resources":{"reads":[],"writes":[]}}
        ]}"#;
        assert_eq!(parse_plan(json), Err(PlanParseError::DuplicateTaskId("t1".into())));
    }

    #[test]
    fn rejects_unknown_dependency() {
        let json = r#"{"objective":"x","tasks":[
            {"id":"t1","summary":"a","dependencies":["ghost"],"resources":{"reads":[],"writes":[]}}
        ]}"#;
        assert_eq!(parse_plan(json), Err(PlanParseError::UnknownDependency { task: "t1".into(), dependency: "ghost".into() }));
    }

    #[test]
    fn rejects_dependency_cycles() {
        let json = r#"{"objective":"x","tasks":[
            {"id":"t1","summary":"a","dependencies":["t2"],"resources":{"reads":[],"writes":[]}},
            {"id":"t2","summary":"b","dependencies":["t1"],"resources":{"reads":[],"writes":[]}}
        ]}"#;
        match parse_plan(json) {
            Err(PlanParseError::CycleDetected(mut ids)) => {
                ids.sort();
                assert_eq!(ids, vec![TaskId::new("t1"), TaskId::new("t2")]);
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_top_level_fields() {
        let json = r#"{"objective":"x","tasks":[],"bogus":true}"#;
        assert!(matches!(parse_plan(json), Err(PlanParseError::Malformed(_))));
    }

    #[test]
    fn claim_task_id_mismatch_is_rejected() {
        let json = r#"{"task_id":"t2","resources":{"reads":[],"writes":[]},"execution":{"commands":[]}}"#;
        let err = parse_claim_doc(json, &TaskId::new("t1")).expect_err("mismatch");
        assert_eq!(err, crate::error::ClaimParseError::TaskIdMismatch { expected: "t1".into(), claimed: "t2".into() });
    }

    #[test]
    fn plan_json_to_dag_to_snapshot_to_rehydrated_dag_is_identity() {
        // spec.md §8 round-trip law: "Plan JSON → internal DAG → serialized
        // snapshot → rehydrated DAG is identity." The snapshot here is the
        // same `{objective, tasks}` document `numerus-runner` persists to
        // `runs/<job_id>/plan.json`.
        let json = r#"{
            "objective": "ship the feature",
            "tasks": [
                {"id": "t1", "summary": "write code", "dependencies": [], "resources": {"reads": [], "writes": ["a.txt"]}},
                {"id": "t2", "summary": "review", "dependencies": ["t1"], "resources": {"reads": ["a.txt"], "writes": []}}
            ]
        }"#;
        let plan = parse_plan(json).expect("valid plan");

        let snapshot = serde_json::json!({
            "objective": plan.objective,
            "tasks": plan.tasks.values().collect::<Vec<_>>(),
        });
        let rehydrated = parse_plan(&serde_json::to_string(&snapshot).expect("encode")).expect("valid snapshot");

        assert_eq!(rehydrated.objective, plan.objective);
        assert_eq!(rehydrated.order, plan.order);
        for id in &plan.order {
            assert_eq!(rehydrated.tasks[id].dependencies, plan.tasks[id].dependencies);
            assert_eq!(rehydrated.tasks[id].resources.reads, plan.tasks[id].resources.reads);
            assert_eq!(rehydrated.tasks[id].resources.writes, plan.tasks[id].resources.writes);
        }
    }

    #[test]
    fn parses_role_assignment() {
        let json = r#"{"roles":{"t1":"planner","t2":"executor"}}"#;
        let roles = parse_roles(json).expect("valid roles");
        assert_eq!(roles.get(&TaskId::new("t1")), Some(&Role::Planner));
    }
}
