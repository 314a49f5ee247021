//! The SSA control flow graph.

use rustc_hash::FxHashMap;

use crate::{
    bytecode::Address,
    cfg::{BlockGraph, BlockKind, EdgeKind, Reachability, ReachabilityAnalyzer},
    ssa::RegionNode,
    utils::graph::{DirectedGraph, GraphBase, NodeId, Predecessors, Successors},
    MethodContext, Result,
};

/// [`RegionNode`]s connected by edges classified as normal or back edges.
///
/// Node ids are the ids of the [`BlockGraph`] the graph was created from. The method
/// entry is node 0 unless a pre-header was added in front of it.
#[derive(Debug, Clone, Default)]
pub struct ControlFlowGraph {
    graph: DirectedGraph<RegionNode, EdgeKind>,
    by_address: FxHashMap<Address, NodeId>,
    reachability: Reachability,
    /// Node entered before the first block when that block is a loop header
    preheader: Option<NodeId>,
}

impl ControlFlowGraph {
    /// A graph without nodes, used for methods without code.
    #[must_use]
    pub fn empty() -> Self {
        ControlFlowGraph::default()
    }

    /// Creates one empty region per block and classifies every edge.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphError`] if the block graph references missing nodes.
    pub fn from_blocks(blocks: &BlockGraph) -> Result<ControlFlowGraph> {
        let reachability = ReachabilityAnalyzer::analyze(blocks, blocks.entry());
        let mut graph = DirectedGraph::with_capacity(blocks.len(), blocks.len() * 2);
        let mut by_address = FxHashMap::default();
        for (_, block) in blocks.blocks() {
            let node = graph.add_node(RegionNode::new(block.kind, block.start));
            by_address.insert(block.start, node);
        }

        for (node, _) in blocks.blocks() {
            let mut seen = Vec::new();
            for (target, _) in blocks.edges_from(node) {
                if seen.contains(&target) {
                    continue;
                }
                seen.push(target);
                graph.add_edge(node, target, reachability.edge_kind(node, target))?;
            }
        }

        Ok(ControlFlowGraph {
            graph,
            by_address,
            reachability,
            preheader: None,
        })
    }

    /// Adds a node in front of block 0, starting at `start`, and makes it the entry.
    ///
    /// Loop-header PHIs of block 0 need a predecessor outside the loop that assigns
    /// their initial values. `start` must not be the start of any block.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InternalConsistency`] for an empty graph, a second
    /// pre-header or a `start` that is already taken.
    pub fn add_preheader(&mut self, start: Address, context: &MethodContext) -> Result<NodeId> {
        let first = NodeId::new(0);
        if self.graph.is_empty() || self.preheader.is_some() || self.by_address.contains_key(&start)
        {
            return Err(consistency_error!(
                context.at(start),
                "Cannot add a pre-header at {}",
                start
            ));
        }
        let node = self.graph.add_node(RegionNode::new(BlockKind::Normal, start));
        self.graph.add_edge(node, first, EdgeKind::Normal)?;
        self.by_address.insert(start, node);
        self.preheader = Some(node);
        Ok(node)
    }

    /// The method entry, or `None` for an empty graph.
    #[must_use]
    pub fn entry(&self) -> Option<NodeId> {
        self.preheader
            .or_else(|| (!self.graph.is_empty()).then(|| NodeId::new(0)))
    }

    /// The synthetic node in front of block 0, if one was added.
    #[must_use]
    pub fn preheader(&self) -> Option<NodeId> {
        self.preheader
    }

    /// The node stored at `node`.
    #[must_use]
    pub fn node(&self, node: NodeId) -> Option<&RegionNode> {
        self.graph.node(node)
    }

    /// Mutable access to a node.
    pub fn node_mut(&mut self, node: NodeId) -> Option<&mut RegionNode> {
        self.graph.node_mut(node)
    }

    /// The node whose block starts at `address`.
    #[must_use]
    pub fn node_at(&self, address: Address) -> Option<NodeId> {
        self.by_address.get(&address).copied()
    }

    /// All nodes in code order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &RegionNode)> + '_ {
        self.graph.nodes()
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// True for methods without code.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Successors of `node` with the kind of the connecting edge.
    pub fn successors_with_kind(
        &self,
        node: NodeId,
    ) -> impl Iterator<Item = (NodeId, EdgeKind)> + '_ {
        self.graph
            .outgoing_edges(node)
            .map(|(_, target, kind)| (target, *kind))
    }

    /// Predecessors of `node` reached over normal edges only.
    #[must_use]
    pub fn forward_predecessors(&self, node: NodeId) -> Vec<NodeId> {
        let mut predecessors = Vec::new();
        for (_, source, kind) in self.graph.incoming_edges(node) {
            if *kind == EdgeKind::Normal && !predecessors.contains(&source) {
                predecessors.push(source);
            }
        }
        predecessors
    }

    /// True if some back edge ends at `node`.
    #[must_use]
    pub fn is_loop_header(&self, node: NodeId) -> bool {
        self.graph
            .incoming_edges(node)
            .any(|(_, _, kind)| *kind == EdgeKind::Back)
    }

    /// Back edges as `(source, header)` pairs.
    #[must_use]
    pub fn back_edges(&self) -> &[(NodeId, NodeId)] {
        self.reachability.back_edges()
    }

    /// True if `node` can be reached from the entry.
    #[must_use]
    pub fn is_reachable(&self, node: NodeId) -> bool {
        self.preheader == Some(node) || self.reachability.is_reachable(node)
    }

    /// Reachable nodes without successors, in code order.
    #[must_use]
    pub fn final_nodes(&self) -> Vec<NodeId> {
        self.graph
            .node_ids()
            .filter(|&node| self.is_reachable(node) && self.graph.out_degree(node) == 0)
            .collect()
    }

    /// The classification the edges were built from.
    #[must_use]
    pub fn reachability(&self) -> &Reachability {
        &self.reachability
    }
}

impl GraphBase for ControlFlowGraph {
    fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        self.graph.node_ids()
    }
}

impl Successors for ControlFlowGraph {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.graph.successors(node)
    }
}

impl Predecessors for ControlFlowGraph {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.graph.predecessors(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{decode, opcodes::*, CodeAssembler};

    #[test]
    fn test_loop_header_and_forward_predecessors() {
        // i = 0; while (i < 10) i++; return
        let mut asm = CodeAssembler::new();
        asm.op(ICONST_0).local(ISTORE, 0);
        asm.label("head")
            .unwrap()
            .local(ILOAD, 0)
            .push_int(10)
            .branch(IF_ICMPGE, "done")
            .iinc(0, 1)
            .branch(GOTO, "head");
        asm.label("done").unwrap().op(RETURN);
        let code = asm.finish().unwrap();

        let blocks = BlockGraph::build(
            &decode(&code).unwrap(),
            &[],
            &MethodContext::new("demo/A", "m()V"),
        )
        .unwrap();
        let cfg = ControlFlowGraph::from_blocks(&blocks).unwrap();

        assert_eq!(cfg.len(), 4);
        let head = cfg.node_at(Address::new(3)).unwrap();
        let body = NodeId::new(2);
        assert!(cfg.is_loop_header(head));
        assert_eq!(cfg.back_edges(), &[(body, head)]);
        assert_eq!(cfg.forward_predecessors(head), vec![NodeId::new(0)]);
        assert_eq!(cfg.final_nodes(), vec![NodeId::new(3)]);
        let kinds: Vec<EdgeKind> = cfg.successors_with_kind(body).map(|(_, k)| k).collect();
        assert_eq!(kinds, vec![EdgeKind::Back]);
    }

    #[test]
    fn test_preheader_becomes_entry() {
        // do { n--; } while (n > 0); return
        let mut asm = CodeAssembler::new();
        asm.label("body")
            .unwrap()
            .iinc(0, -1)
            .local(ILOAD, 0)
            .branch(IFGT, "body")
            .op(RETURN);
        let code = asm.finish().unwrap();
        let context = MethodContext::new("demo/A", "m(I)V");
        let blocks = BlockGraph::build(&decode(&code).unwrap(), &[], &context).unwrap();
        let mut cfg = ControlFlowGraph::from_blocks(&blocks).unwrap();
        let first = NodeId::new(0);
        assert!(cfg.is_loop_header(first));

        let end = Address::new(u32::try_from(code.len()).unwrap());
        let preheader = cfg.add_preheader(end, &context).unwrap();
        assert_eq!(cfg.entry(), Some(preheader));
        assert_eq!(cfg.preheader(), Some(preheader));
        assert!(cfg.is_reachable(preheader));
        assert_eq!(cfg.forward_predecessors(first), vec![preheader]);
        assert!(cfg.is_loop_header(first));
        assert_eq!(cfg.node_at(end), Some(preheader));

        let error = cfg.add_preheader(end, &context).unwrap_err();
        assert!(error.is_internal(), "{error}");
    }
}
