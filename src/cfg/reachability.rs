//! Reachability and back-edge classification.
//!
//! A single depth-first search from the entry decides which nodes are reachable and
//! which edges close a cycle. An edge whose target is still on the DFS stack when the
//! edge is explored is a *back edge*; every other edge is a normal edge. Removing all
//! back edges leaves an acyclic graph, which is what the SSA builder walks when it
//! orders the nodes of a method.
//!
//! The search is iterative and keeps its own stack, so the nesting depth of the input
//! is not limited by the thread's call stack.

use rustc_hash::FxHashSet;
use strum::{Display, EnumIter, IntoStaticStr};

use crate::utils::graph::{NodeId, Successors};

/// Classification of a control flow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum EdgeKind {
    /// Forward or cross edge
    Normal,
    /// Edge to a node on the current DFS path; closes a loop
    Back,
}

/// Result of [`ReachabilityAnalyzer::analyze`].
#[derive(Debug, Clone, Default)]
pub struct Reachability {
    reachable: Vec<bool>,
    visit_order: Vec<NodeId>,
    back_edges: Vec<(NodeId, NodeId)>,
    back_edge_set: FxHashSet<(NodeId, NodeId)>,
}

impl Reachability {
    /// True if `node` can be reached from the entry.
    #[must_use]
    pub fn is_reachable(&self, node: NodeId) -> bool {
        self.reachable.get(node.index()).copied().unwrap_or(false)
    }

    /// Kind of the edge `from -> to`.
    #[must_use]
    pub fn edge_kind(&self, from: NodeId, to: NodeId) -> EdgeKind {
        if self.back_edge_set.contains(&(from, to)) {
            EdgeKind::Back
        } else {
            EdgeKind::Normal
        }
    }

    /// True if `from -> to` is a back edge.
    #[must_use]
    pub fn is_back_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.edge_kind(from, to) == EdgeKind::Back
    }

    /// All back edges as `(source, header)` pairs, in discovery order.
    #[must_use]
    pub fn back_edges(&self) -> &[(NodeId, NodeId)] {
        &self.back_edges
    }

    /// Nodes not reachable from the entry, ascending.
    #[must_use]
    pub fn unreachable(&self) -> Vec<NodeId> {
        self.reachable
            .iter()
            .enumerate()
            .filter(|(_, reached)| !**reached)
            .map(|(index, _)| NodeId::new(index))
            .collect()
    }

    /// Reachable nodes in DFS pre-order.
    #[must_use]
    pub fn visit_order(&self) -> &[NodeId] {
        &self.visit_order
    }
}

/// Runs the reachability DFS over any [`Successors`] graph.
pub struct ReachabilityAnalyzer;

impl ReachabilityAnalyzer {
    /// Explores `graph` from `entry`.
    ///
    /// Successors are explored in the order the graph reports them, which makes the
    /// classification deterministic. An out-of-range `entry` yields a result where
    /// every node is unreachable.
    #[must_use]
    pub fn analyze<G: Successors>(graph: &G, entry: NodeId) -> Reachability {
        let node_count = graph.node_count();
        let mut result = Reachability {
            reachable: vec![false; node_count],
            ..Reachability::default()
        };
        if entry.index() >= node_count {
            return result;
        }

        let mut on_stack = vec![false; node_count];
        // (node, successors, next successor index)
        let mut stack: Vec<(NodeId, Vec<NodeId>, usize)> = Vec::new();

        result.reachable[entry.index()] = true;
        on_stack[entry.index()] = true;
        result.visit_order.push(entry);
        stack.push((entry, graph.successors(entry).collect(), 0));

        while let Some((node, successors, cursor)) = stack.last_mut() {
            let node = *node;
            let Some(&next) = successors.get(*cursor) else {
                on_stack[node.index()] = false;
                stack.pop();
                continue;
            };
            *cursor += 1;

            if on_stack[next.index()] {
                if result.back_edge_set.insert((node, next)) {
                    result.back_edges.push((node, next));
                }
            } else if !result.reachable[next.index()] {
                result.reachable[next.index()] = true;
                on_stack[next.index()] = true;
                result.visit_order.push(next);
                stack.push((next, graph.successors(next).collect(), 0));
            }
        }

        log::trace!(
            "reachability: {} of {} nodes reachable, {} back edges",
            result.visit_order.len(),
            node_count,
            result.back_edges.len()
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::graph::DirectedGraph;

    fn graph(nodes: usize, edges: &[(usize, usize)]) -> DirectedGraph<(), ()> {
        let mut graph = DirectedGraph::new();
        for _ in 0..nodes {
            graph.add_node(());
        }
        for &(from, to) in edges {
            graph
                .add_edge(NodeId::new(from), NodeId::new(to), ())
                .unwrap();
        }
        graph
    }

    #[test]
    fn test_loop_has_one_back_edge() {
        // 0 -> 1 -> 2 -> 1, 1 -> 3
        let g = graph(4, &[(0, 1), (1, 2), (2, 1), (1, 3)]);
        let result = ReachabilityAnalyzer::analyze(&g, NodeId::new(0));

        assert_eq!(result.back_edges(), &[(NodeId::new(2), NodeId::new(1))]);
        assert_eq!(result.edge_kind(NodeId::new(2), NodeId::new(1)), EdgeKind::Back);
        assert_eq!(result.edge_kind(NodeId::new(1), NodeId::new(3)), EdgeKind::Normal);
        assert!(result.unreachable().is_empty());
    }

    #[test]
    fn test_diamond_has_no_back_edges() {
        let g = graph(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let result = ReachabilityAnalyzer::analyze(&g, NodeId::new(0));
        assert!(result.back_edges().is_empty());
        assert_eq!(
            result.visit_order(),
            &[NodeId::new(0), NodeId::new(1), NodeId::new(3), NodeId::new(2)]
        );
    }

    #[test]
    fn test_self_loop_and_unreachable() {
        let g = graph(3, &[(0, 0), (2, 0)]);
        let result = ReachabilityAnalyzer::analyze(&g, NodeId::new(0));
        assert!(result.is_back_edge(NodeId::new(0), NodeId::new(0)));
        assert!(!result.is_reachable(NodeId::new(1)));
        assert_eq!(result.unreachable(), vec![NodeId::new(1), NodeId::new(2)]);
        assert_eq!(
            result.edge_kind(NodeId::new(2), NodeId::new(0)),
            EdgeKind::Normal
        );
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let edges: Vec<(usize, usize)> = (0..100_000).map(|i| (i, i + 1)).collect();
        let g = graph(100_001, &edges);
        let result = ReachabilityAnalyzer::analyze(&g, NodeId::new(0));
        assert_eq!(result.visit_order().len(), 100_001);
    }
}
