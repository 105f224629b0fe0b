// SPDX-License-Identifier: MIT

//! Level scheduler
//!
//! Full runs group nodes into levels with a breadth-first Kahn pass: every node
//! in a level has all of its dependencies in earlier levels, so a level can be
//! launched concurrently. Resumed runs walk the downstream-reachable set of one
//! node and execute it one node per step.

use std::collections::{HashMap, HashSet, VecDeque};

use super::builder::DependencyGraph;
use crate::adk::error::{EngineError, Result};

/// Which part of the graph a plan covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartSet {
    /// Every node, starting from the zero in-degree nodes
    Roots,
    /// One node plus everything reachable downstream of it
    From(String),
}

/// Produce the ordered execution steps for `start`.
///
/// Each inner list is a group of nodes that may run concurrently.
pub fn plan(graph: &DependencyGraph, start: &StartSet) -> Result<Vec<Vec<String>>> {
    match start {
        StartSet::Roots => schedule(graph),
        StartSet::From(id) => Ok(reachable_order(graph, id)?
            .into_iter()
            .map(|id| vec![id])
            .collect()),
    }
}

/// Topologically sort the whole graph into levels.
///
/// Within a level, nodes appear in the order their in-degree reached zero.
pub fn schedule(graph: &DependencyGraph) -> Result<Vec<Vec<String>>> {
    let mut in_degree: HashMap<&str, usize> = graph
        .dependencies
        .iter()
        .map(|(id, deps)| (id.as_str(), deps.len()))
        .collect();

    let mut levels: Vec<Vec<String>> = Vec::new();
    let mut ready: Vec<String> = graph.start_nodes.clone();
    let mut placed = 0;

    while !ready.is_empty() {
        let mut next = Vec::new();
        for id in &ready {
            for dependent in graph.dependents_of(id) {
                if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(dependent.clone());
                    }
                }
            }
        }
        placed += ready.len();
        levels.push(ready);
        ready = next;
    }

    if placed < graph.len() {
        let mut nodes: Vec<String> = in_degree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(id, _)| id.to_string())
            .collect();
        nodes.sort();
        return Err(EngineError::Cycle { nodes });
    }

    Ok(levels)
}

/// Nodes reachable from `start` over dependents, in BFS discovery order.
pub fn reachable(graph: &DependencyGraph, start: &str) -> Result<Vec<String>> {
    if !graph.contains(start) {
        return Err(EngineError::UnknownNode(start.to_string()));
    }

    let mut visited: HashSet<&str> = HashSet::from([start]);
    let mut queue: VecDeque<&str> = VecDeque::from([start]);
    let mut order = Vec::new();

    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());
        for dependent in graph.dependents_of(id) {
            if visited.insert(dependent.as_str()) {
                queue.push_back(dependent.as_str());
            }
        }
    }

    Ok(order)
}

/// BFS discovery order, corrected so that no node precedes a reachable
/// dependency. Dependencies outside the reachable set are treated as done.
fn reachable_order(graph: &DependencyGraph, start: &str) -> Result<Vec<String>> {
    let discovered = reachable(graph, start)?;
    let members: HashSet<&str> = discovered.iter().map(String::as_str).collect();

    let mut done: HashSet<&str> = HashSet::new();
    let mut order = Vec::with_capacity(discovered.len());

    while order.len() < discovered.len() {
        let next = discovered.iter().find(|id| {
            !done.contains(id.as_str())
                && graph
                    .dependencies_of(id)
                    .filter(|dep| members.contains(dep.as_str()))
                    .all(|dep| done.contains(dep.as_str()))
        });

        match next {
            Some(id) => {
                done.insert(id.as_str());
                order.push(id.clone());
            }
            None => {
                let mut nodes: Vec<String> = discovered
                    .iter()
                    .filter(|id| !done.contains(id.as_str()))
                    .cloned()
                    .collect();
                nodes.sort();
                return Err(EngineError::Cycle { nodes });
            }
        }
    }

    Ok(order)
}
