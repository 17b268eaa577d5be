// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! Transitive-dependent lookup used when a task permanently fails
//! (`spec.md` §4.1 "dependent tasks transition to cancelled").

use std::collections::{HashMap, HashSet, VecDeque};

use numerus_core::{Task, TaskId};

/// Every task, direct or indirect, that declares `root` as a dependency —
/// i.e. every task that can never become ready now that `root` will not
/// complete.
pub fn transitive_dependents(tasks: &HashMap<TaskId, Task>, root: &TaskId) -> HashSet<TaskId> {
    let mut dependents: HashMap<&TaskId, Vec<&TaskId>> = HashMap::new();
    for task in tasks.values() {
        for dep in &task.dependencies {
            dependents.entry(dep).or_default().push(&task.id);
        }
    }

    let mut out = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(root);
    while let Some(id) = queue.pop_front() {
        let Some(children) = dependents.get(id) else { continue };
        for child in children {
            if out.insert((*child).clone()) {
                queue.push_back(child);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use numerus_core::test_support::TaskBuilder;

    fn table(tasks: Vec<Task>) -> HashMap<TaskId, Task> {
        tasks.into_iter().map(|t| (t.id.clone(), t)).collect()
    }

    #[test]
    fn direct_and_indirect_dependents_are_collected() {
        let tasks = table(vec![
            TaskBuilder::new("t1").build(),
            TaskBuilder::new("t2").depends_on("t1").build(),
            TaskBuilder::new("t3").depends_on("t2").build(),
            TaskBuilder::new("t4").build(),
        ]);
        let deps = transitive_dependents(&tasks, &TaskId::new("t1"));
        assert_eq!(deps, [TaskId::new("t2"), TaskId::new("t3")].into_iter().collect());
    }

    #[test]
    fn a_task_with_no_dependents_has_an_empty_set() {
        let tasks = table(vec![TaskBuilder::new("t1").build()]);
        assert!(transitive_dependents(&tasks, &TaskId::new("t1")).is_empty());
    }
}
