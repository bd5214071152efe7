//! Dependency graph checks over a [`TaskDocument`].
//!
//! Top-level tasks form one graph; the subtasks of each task form a separate
//! graph keyed by sibling id. Both are checked the same way: self references,
//! edges to unknown ids, and back edges found by a depth-first walk. Dropping
//! every reported back edge leaves the graph acyclic.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::repository::{DependencyIssue, IssueKind, ValidationReport};
use crate::types::{TaskDocument, TaskRef};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// An edge `(from, to)` with the reason it is invalid.
type EdgeIssue = (u32, u32, IssueKind);

/// Validates every dependency edge in the document.
#[must_use]
pub fn validate(doc: &TaskDocument) -> ValidationReport {
    let mut issues = Vec::new();

    let top: Vec<(u32, &[u32])> = doc
        .tasks
        .iter()
        .map(|t| (t.id, t.dependencies.as_slice()))
        .collect();
    for (from, to, kind) in check_graph(&top) {
        issues.push(DependencyIssue {
            task: TaskRef::Task(from).to_string(),
            dependency: TaskRef::Task(to).to_string(),
            kind,
        });
    }

    for task in &doc.tasks {
        let subs: Vec<(u32, &[u32])> = task
            .subtasks
            .iter()
            .map(|s| (s.id, s.dependencies.as_slice()))
            .collect();
        for (from, to, kind) in check_graph(&subs) {
            issues.push(DependencyIssue {
                task: TaskRef::Subtask {
                    parent: task.id,
                    id: from,
                }
                .to_string(),
                dependency: TaskRef::Subtask {
                    parent: task.id,
                    id: to,
                }
                .to_string(),
                kind,
            });
        }
    }

    ValidationReport::from_issues(issues)
}

/// Drops invalid and duplicate edges in place. Returns how many were removed.
pub fn fix(doc: &mut TaskDocument) -> usize {
    let top: Vec<(u32, &[u32])> = doc
        .tasks
        .iter()
        .map(|t| (t.id, t.dependencies.as_slice()))
        .collect();
    let bad = bad_edges(&top);

    let mut removed = 0;
    for task in &mut doc.tasks {
        removed += prune(task.id, &mut task.dependencies, &bad);

        let subs: Vec<(u32, &[u32])> = task
            .subtasks
            .iter()
            .map(|s| (s.id, s.dependencies.as_slice()))
            .collect();
        let bad_subs = bad_edges(&subs);
        for sub in &mut task.subtasks {
            removed += prune(sub.id, &mut sub.dependencies, &bad_subs);
        }
    }

    removed
}

/// Returns true if adding `from -> to` would close a cycle, i.e. `to`
/// already reaches `from`. Both ids must live in the same graph.
#[must_use]
pub fn creates_cycle(edges: &[(u32, &[u32])], from: u32, to: u32) -> bool {
    if from == to {
        return true;
    }

    let graph: HashMap<u32, &[u32]> = edges.iter().copied().collect();
    let mut stack = vec![to];
    let mut seen = HashSet::new();

    while let Some(node) = stack.pop() {
        if node == from {
            return true;
        }
        if !seen.insert(node) {
            continue;
        }
        if let Some(deps) = graph.get(&node) {
            stack.extend(deps.iter().copied());
        }
    }

    false
}

fn bad_edges(edges: &[(u32, &[u32])]) -> HashSet<(u32, u32)> {
    check_graph(edges)
        .into_iter()
        .map(|(from, to, _)| (from, to))
        .collect()
}

fn prune(id: u32, deps: &mut Vec<u32>, bad: &HashSet<(u32, u32)>) -> usize {
    let before = deps.len();
    let mut seen = HashSet::new();
    deps.retain(|dep| !bad.contains(&(id, *dep)) && seen.insert(*dep));
    before - deps.len()
}

fn check_graph(edges: &[(u32, &[u32])]) -> Vec<EdgeIssue> {
    let ids: HashSet<u32> = edges.iter().map(|(id, _)| *id).collect();
    let mut issues = Vec::new();
    let mut graph: BTreeMap<u32, Vec<u32>> = BTreeMap::new();

    for (id, deps) in edges {
        let entry = graph.entry(*id).or_default();
        for &dep in *deps {
            if dep == *id {
                issues.push((*id, dep, IssueKind::SelfReference));
            } else if !ids.contains(&dep) {
                issues.push((*id, dep, IssueKind::Missing));
            } else if !entry.contains(&dep) {
                entry.push(dep);
            }
        }
    }

    let mut state = HashMap::new();
    let mut back = Vec::new();
    for &start in graph.keys() {
        if !state.contains_key(&start) {
            visit(start, &graph, &mut state, &mut back);
        }
    }
    issues.extend(back.into_iter().map(|(from, to)| (from, to, IssueKind::Circular)));

    issues
}

fn visit(
    node: u32,
    graph: &BTreeMap<u32, Vec<u32>>,
    state: &mut HashMap<u32, Visit>,
    back: &mut Vec<(u32, u32)>,
) {
    state.insert(node, Visit::InProgress);

    if let Some(deps) = graph.get(&node) {
        for &dep in deps {
            match state.get(&dep) {
                Some(Visit::InProgress) => back.push((node, dep)),
                Some(Visit::Done) => {}
                None => visit(dep, graph, state, back),
            }
        }
    }

    state.insert(node, Visit::Done);
}
