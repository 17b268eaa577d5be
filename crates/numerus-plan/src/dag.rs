// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! DAG validation (`spec.md` §4.4, §9 "Cyclic relations").
//!
//! Tasks are not linked by owning references — dependencies are stored as
//! [`TaskId`] values and resolved through the job's task index (arena + id
//! lookup), so there is no cycle in the Rust ownership graph even when the
//! logical dependency graph does.

use std::collections::{HashMap, HashSet, VecDeque};

use numerus_core::TaskId;

/// Kahn's algorithm: returns a topological order, or the set of task ids
/// still unresolved when no more zero-in-degree nodes remain (the cycle).
pub fn topological_order(ids: &[TaskId], dependencies: &HashMap<TaskId, Vec<TaskId>>) -> Result<Vec<TaskId>, Vec<TaskId>> {
    let mut in_degree: HashMap<&TaskId, usize> = ids.iter().map(|id| (id, 0)).collect();
    let mut dependents: HashMap<&TaskId, Vec<&TaskId>> = ids.iter().map(|id| (id, Vec::new())).collect();

    for id in ids {
        if let Some(deps) = dependencies.get(id) {
            for dep in deps {
                *in_degree.get_mut(id).expect("id present in in_degree map") += 1;
                dependents.entry(dep).or_default().push(id);
            }
        }
    }

    let mut ready: VecDeque<&TaskId> = in_degree.iter().filter(|(_, &deg)| deg == 0).map(|(id, _)| *id).collect();
    // Deterministic order for ties, mirroring the runner's own tie-break.
    let mut ready_vec: Vec<&TaskId> = ready.drain(..).collect();
    ready_vec.sort();
    let mut ready: VecDeque<&TaskId> = ready_vec.into();

    let mut order = Vec::with_capacity(ids.len());
    let mut visited: HashSet<&TaskId> = HashSet::new();

    while let Some(id) = ready.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        order.push(id.clone());

        let mut newly_ready = Vec::new();
        if let Some(deps) = dependents.get(id) {
            for &dependent in deps {
                let degree = in_degree.get_mut(dependent).expect("dependent present in in_degree map");
                *degree -= 1;
                if *degree == 0 {
                    newly_ready.push(dependent);
                }
            }
        }
        newly_ready.sort();
        for n in newly_ready {
            ready.push_back(n);
        }
    }

    if order.len() == ids.len() {
        Ok(order)
    } else {
        let remaining: Vec<TaskId> = ids.iter().filter(|id| !visited.contains(id)).cloned().collect();
        Err(remaining)
    }
}
