//! Execution ordering by backward traversal from the graph's sinks.

use std::collections::HashSet;

use larissa_types::NodeId;

use crate::graph::{DiGraph, Vertex};

/// Order the node vertices of `graph` so every producer precedes its
/// consumers.
///
/// Walks backward from each sink along incoming edges and emits a node once
/// all of its predecessors have been emitted. Each vertex is visited once.
pub fn execution_order(graph: &DiGraph) -> Vec<NodeId> {
    let mut visited: HashSet<Vertex> = HashSet::new();
    let mut order = Vec::new();
    for sink in graph.sinks() {
        walk_back(graph, sink, &mut visited, &mut order);
    }
    order
}

/// Iterative postorder over predecessors starting at `root`.
fn walk_back(graph: &DiGraph, root: Vertex, visited: &mut HashSet<Vertex>, order: &mut Vec<NodeId>) {
    if !visited.insert(root) {
        return;
    }
    let mut stack: Vec<(Vertex, Vec<Vertex>)> = vec![(root, graph.predecessors(root))];
    while let Some(frame) = stack.last_mut() {
        if let Some(parent) = frame.1.pop() {
            if visited.insert(parent) {
                let parents = graph.predecessors(parent);
                stack.push((parent, parents));
            }
        } else {
            if let Vertex::Node(id) = frame.0 {
                order.push(id);
            }
            stack.pop();
        }
    }
}
