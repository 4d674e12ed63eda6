//! Directed graph over node and port vertices.
//!
//! Vertices live in index-keyed slots that are recycled after removal;
//! adjacency is kept in both directions so predecessor and sink queries do
//! not scan the edge set.

use std::collections::HashMap;
use std::fmt;

use larissa_types::{LarissaError, NodeId, PortId, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vertex {
    Node(NodeId),
    Port(PortId),
}

impl Vertex {
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Vertex::Node(id) => Some(*id),
            Vertex::Port(_) => None,
        }
    }

    pub fn as_port(&self) -> Option<PortId> {
        match self {
            Vertex::Port(id) => Some(*id),
            Vertex::Node(_) => None,
        }
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vertex::Node(id) => write!(f, "node:{id}"),
            Vertex::Port(id) => write!(f, "port:{id}"),
        }
    }
}

impl From<NodeId> for Vertex {
    fn from(id: NodeId) -> Self {
        Vertex::Node(id)
    }
}

impl From<PortId> for Vertex {
    fn from(id: PortId) -> Self {
        Vertex::Port(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

#[derive(Debug, Clone, Default)]
pub struct DiGraph {
    /// Removed vertices leave a `None` slot whose index goes on `free`.
    slots: Vec<Option<Vertex>>,
    free: Vec<usize>,
    index: HashMap<Vertex, usize>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
    edge_count: usize,
}

impl DiGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.index.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn contains(&self, v: Vertex) -> bool {
        self.index.contains_key(&v)
    }

    /// Live vertices in slot order.
    pub fn vertices(&self) -> impl Iterator<Item = Vertex> + '_ {
        self.slots.iter().filter_map(|s| *s)
    }

    /// All edges as `(from, to)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (Vertex, Vertex)> + '_ {
        self.slots.iter().enumerate().flat_map(move |(i, slot)| {
            slot.iter().flat_map(move |from| {
                self.outgoing[i]
                    .iter()
                    .filter_map(move |&j| self.slots[j].map(|to| (*from, to)))
            })
        })
    }

    pub fn add_vertex(&mut self, v: Vertex) -> Result<()> {
        if self.index.contains_key(&v) {
            return Err(LarissaError::DuplicateId { id: v.to_string() });
        }
        let ix = match self.free.pop() {
            Some(ix) => {
                self.slots[ix] = Some(v);
                ix
            }
            None => {
                self.slots.push(Some(v));
                self.outgoing.push(Vec::new());
                self.incoming.push(Vec::new());
                self.slots.len() - 1
            }
        };
        self.index.insert(v, ix);
        Ok(())
    }

    /// Remove `v` and every edge touching it. Returns `false` if absent.
    pub fn remove_vertex(&mut self, v: Vertex) -> bool {
        let Some(ix) = self.index.remove(&v) else {
            return false;
        };
        let outgoing = std::mem::take(&mut self.outgoing[ix]);
        for &to in &outgoing {
            self.incoming[to].retain(|&f| f != ix);
        }
        let incoming = std::mem::take(&mut self.incoming[ix]);
        for &from in &incoming {
            self.outgoing[from].retain(|&t| t != ix);
        }
        self.edge_count -= outgoing.len() + incoming.len();
        self.slots[ix] = None;
        self.free.push(ix);
        true
    }

    pub fn add_edge(&mut self, from: Vertex, to: Vertex) -> Result<()> {
        let f = self.ix(from)?;
        let t = self.ix(to)?;
        if self.outgoing[f].contains(&t) {
            return Err(LarissaError::EdgeExists {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        self.outgoing[f].push(t);
        self.incoming[t].push(f);
        self.edge_count += 1;
        Ok(())
    }

    /// Returns `false` if the edge was not present.
    pub fn remove_edge(&mut self, from: Vertex, to: Vertex) -> bool {
        let (Some(&f), Some(&t)) = (self.index.get(&from), self.index.get(&to)) else {
            return false;
        };
        let before = self.outgoing[f].len();
        self.outgoing[f].retain(|&x| x != t);
        if self.outgoing[f].len() == before {
            return false;
        }
        self.incoming[t].retain(|&x| x != f);
        self.edge_count -= 1;
        true
    }

    pub fn has_edge(&self, from: Vertex, to: Vertex) -> bool {
        match (self.index.get(&from), self.index.get(&to)) {
            (Some(&f), Some(&t)) => self.outgoing[f].contains(&t),
            _ => false,
        }
    }

    pub fn predecessors(&self, v: Vertex) -> Vec<Vertex> {
        self.neighbours(v, &self.incoming)
    }

    pub fn successors(&self, v: Vertex) -> Vec<Vertex> {
        self.neighbours(v, &self.outgoing)
    }

    /// Vertices with no outgoing edge, in slot order.
    pub fn sinks(&self) -> Vec<Vertex> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(i, _)| self.outgoing[*i].is_empty())
            .filter_map(|(_, s)| *s)
            .collect()
    }

    /// Whether any cycle exists anywhere in the graph.
    pub fn has_cycle(&self) -> bool {
        let mut colors = vec![Color::White; self.slots.len()];
        (0..self.slots.len())
            .filter(|&i| self.slots[i].is_some())
            .any(|i| colors[i] == Color::White && self.dfs_finds_back_edge(i, &mut colors))
    }

    /// Whether a cycle is reachable from `start`.
    ///
    /// After inserting `a -> b` into an acyclic graph, any new cycle passes
    /// through that edge and is therefore reachable from `b`.
    pub fn reaches_cycle_from(&self, start: Vertex) -> bool {
        match self.index.get(&start) {
            Some(&ix) => {
                let mut colors = vec![Color::White; self.slots.len()];
                self.dfs_finds_back_edge(ix, &mut colors)
            }
            None => false,
        }
    }

    /// Iterative three-color DFS from `root`.
    fn dfs_finds_back_edge(&self, root: usize, colors: &mut [Color]) -> bool {
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        colors[root] = Color::Gray;
        while let Some(frame) = stack.last_mut() {
            let v = frame.0;
            if let Some(&w) = self.outgoing[v].get(frame.1) {
                frame.1 += 1;
                match colors[w] {
                    Color::Gray => return true,
                    Color::White => {
                        colors[w] = Color::Gray;
                        stack.push((w, 0));
                    }
                    Color::Black => {}
                }
            } else {
                colors[v] = Color::Black;
                stack.pop();
            }
        }
        false
    }

    fn ix(&self, v: Vertex) -> Result<usize> {
        self.index
            .get(&v)
            .copied()
            .ok_or_else(|| LarissaError::not_found("vertex", v.to_string()))
    }

    fn neighbours(&self, v: Vertex, adjacency: &[Vec<usize>]) -> Vec<Vertex> {
        match self.index.get(&v) {
            Some(&ix) => adjacency[ix].iter().filter_map(|&j| self.slots[j]).collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(n: usize) -> Vec<Vertex> {
        (0..n).map(|_| Vertex::Node(NodeId::new())).collect()
    }

    fn graph_with(vs: &[Vertex]) -> DiGraph {
        let mut g = DiGraph::new();
        for v in vs {
            g.add_vertex(*v).unwrap();
        }
        g
    }

    #[test]
    fn add_vertex_rejects_duplicates() {
        let v = nodes(1);
        let mut g = graph_with(&v);
        assert!(g.add_vertex(v[0]).unwrap_err().is_state());
        assert_eq!(g.vertex_count(), 1);
    }

    #[test]
    fn add_edge_requires_both_vertices() {
        let v = nodes(2);
        let mut g = graph_with(&v[..1]);
        assert!(g.add_edge(v[0], v[1]).unwrap_err().is_not_found());
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn duplicate_edge_is_rejected() {
        let v = nodes(2);
        let mut g = graph_with(&v);
        g.add_edge(v[0], v[1]).unwrap();
        assert!(matches!(
            g.add_edge(v[0], v[1]).unwrap_err(),
            LarissaError::EdgeExists { .. }
        ));
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn predecessors_and_successors() {
        let v = nodes(3);
        let mut g = graph_with(&v);
        g.add_edge(v[0], v[2]).unwrap();
        g.add_edge(v[1], v[2]).unwrap();

        assert_eq!(g.predecessors(v[2]), vec![v[0], v[1]]);
        assert_eq!(g.successors(v[0]), vec![v[2]]);
        assert!(g.predecessors(v[0]).is_empty());
    }

    #[test]
    fn sinks_are_vertices_without_outgoing_edges() {
        let v = nodes(4);
        let mut g = graph_with(&v);
        g.add_edge(v[0], v[1]).unwrap();
        g.add_edge(v[2], v[1]).unwrap();
        assert_eq!(g.sinks(), vec![v[1], v[3]]);
    }

    #[test]
    fn remove_vertex_drops_incident_edges() {
        let v = nodes(3);
        let mut g = graph_with(&v);
        g.add_edge(v[0], v[1]).unwrap();
        g.add_edge(v[1], v[2]).unwrap();

        assert!(g.remove_vertex(v[1]));

        assert_eq!(g.vertex_count(), 2);
        assert_eq!(g.edge_count(), 0);
        assert!(g.successors(v[0]).is_empty());
        assert!(g.predecessors(v[2]).is_empty());
        assert!(!g.remove_vertex(v[1]));
        assert_eq!(g.sinks(), vec![v[0], v[2]]);
    }

    #[test]
    fn removed_vertex_slot_is_reused() {
        let v = nodes(4);
        let mut g = graph_with(&v[..3]);
        g.add_edge(v[0], v[1]).unwrap();
        g.add_edge(v[1], v[2]).unwrap();

        g.remove_vertex(v[1]);
        g.add_vertex(v[3]).unwrap();

        assert_eq!(g.slots.len(), 3);
        assert!(g.free.is_empty());
        assert!(g.predecessors(v[3]).is_empty());
        assert!(g.successors(v[3]).is_empty());

        g.add_edge(v[0], v[3]).unwrap();
        g.add_edge(v[3], v[2]).unwrap();
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.predecessors(v[2]), vec![v[3]]);
        assert_eq!(g.sinks(), vec![v[2]]);
        assert!(!g.has_cycle());
    }

    #[test]
    fn churn_does_not_grow_slots() {
        let v = nodes(2);
        let mut g = graph_with(&v);
        for _ in 0..100 {
            let tmp = Vertex::Node(NodeId::new());
            g.add_vertex(tmp).unwrap();
            g.add_edge(v[0], tmp).unwrap();
            g.add_edge(tmp, v[1]).unwrap();
            g.remove_vertex(tmp);
        }
        assert_eq!(g.slots.len(), 3);
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn remove_edge() {
        let v = nodes(2);
        let mut g = graph_with(&v);
        g.add_edge(v[0], v[1]).unwrap();
        assert!(g.remove_edge(v[0], v[1]));
        assert!(!g.has_edge(v[0], v[1]));
        assert!(!g.remove_edge(v[0], v[1]));
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn detects_cycles() {
        let v = nodes(3);
        let mut g = graph_with(&v);
        g.add_edge(v[0], v[1]).unwrap();
        g.add_edge(v[1], v[2]).unwrap();
        assert!(!g.has_cycle());
        assert!(!g.reaches_cycle_from(v[1]));

        g.add_edge(v[2], v[0]).unwrap();
        assert!(g.has_cycle());
        assert!(g.reaches_cycle_from(v[0]));
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let v = nodes(4);
        let mut g = graph_with(&v);
        g.add_edge(v[0], v[1]).unwrap();
        g.add_edge(v[0], v[2]).unwrap();
        g.add_edge(v[1], v[3]).unwrap();
        g.add_edge(v[2], v[3]).unwrap();
        assert!(!g.has_cycle());
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let v = nodes(1);
        let mut g = graph_with(&v);
        g.add_edge(v[0], v[0]).unwrap();
        assert!(g.has_cycle());
    }

    #[test]
    fn edges_lists_every_edge() {
        let v = nodes(3);
        let mut g = graph_with(&v);
        g.add_edge(v[0], v[1]).unwrap();
        g.add_edge(v[0], v[2]).unwrap();
        let edges: Vec<_> = g.edges().collect();
        assert_eq!(edges, vec![(v[0], v[1]), (v[0], v[2])]);
    }
}
