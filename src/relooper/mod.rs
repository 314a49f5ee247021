//! Structured control flow reconstruction.
//!
//! The relooper turns the jump graph of a [`Program`] into nested [`Block`]s that a
//! structured language can express without `goto`:
//!
//! - **Simple**: a single node that cannot reach itself
//! - **Loop**: `for (;;) { inner }`, restarted by `Continue`
//! - **Multiple**: a dispatch on the label variable over independent handlers
//!
//! Structuring works on the `Goto` targets found in each node's statements. A second
//! pass clones every node's statements into its Simple block and rewrites each `Goto`
//! into a `Break` or `Continue` naming the enclosing block it leaves or restarts.
//!
//! [`Relooper::reloop_method`] also structures exception handler regions. Nodes the
//! body shares with a handler are placed once in the body; a handler reaching one
//! restarts the body's dispatch loop with the label set to that node.
//!
//! # Example
//!
//! ```rust,ignore
//! use classscope::relooper::Relooper;
//!
//! let body = Relooper::new().reloop(&program)?;
//! for block in body.descendants() {
//!     println!("{} {}", block.kind(), block.label());
//! }
//! ```

mod block;
mod rewrite;

pub use block::{Block, Label};

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::{bytecode::Address, ssa::Program, utils::graph::NodeId, Result};

/// Jump edges between the nodes reachable from one entry.
struct JumpGraph {
    successors: FxHashMap<NodeId, Vec<NodeId>>,
    predecessors: FxHashMap<NodeId, Vec<NodeId>>,
    nodes: BTreeSet<NodeId>,
}

impl JumpGraph {
    fn build(program: &Program, roots: &[NodeId]) -> Result<JumpGraph> {
        let cfg = program.cfg();
        let mut graph = JumpGraph {
            successors: FxHashMap::default(),
            predecessors: FxHashMap::default(),
            nodes: BTreeSet::new(),
        };
        let mut pending = Vec::with_capacity(roots.len());
        for &root in roots {
            if graph.nodes.insert(root) {
                pending.push(root);
            }
        }
        while let Some(node) = pending.pop() {
            let region = cfg.node(node).ok_or_else(|| {
                consistency_error!(program.context().clone(), "Node {} does not exist", node)
            })?;
            let mut targets = Vec::new();
            for address in region.expressions.jump_targets() {
                let target = cfg.node_at(address).ok_or_else(|| {
                    consistency_error!(
                        program.context().at(region.start),
                        "Jump target {} is not a block start",
                        address
                    )
                })?;
                targets.push(target);
                graph.predecessors.entry(target).or_default().push(node);
                if graph.nodes.insert(target) {
                    pending.push(target);
                }
            }
            graph.successors.insert(node, targets);
        }
        Ok(graph)
    }

    fn successors(&self, node: NodeId) -> &[NodeId] {
        self.successors.get(&node).map_or(&[], Vec::as_slice)
    }

    fn predecessors(&self, node: NodeId) -> &[NodeId] {
        self.predecessors.get(&node).map_or(&[], Vec::as_slice)
    }
}

/// A shape whose `next` is not known yet.
enum Pending {
    Simple {
        label: Label,
        node: NodeId,
    },
    Loop {
        label: Label,
        entries: BTreeSet<NodeId>,
        inner: Block,
    },
    Multiple {
        label: Label,
        entries: BTreeSet<NodeId>,
        handlers: Vec<(Address, Block)>,
    },
}

/// Reconstructs structured control flow.
#[derive(Debug, Default)]
pub struct Relooper {
    next_label: usize,
    /// Entries of enclosing loops; jumps to them are continues, not structure
    cut: BTreeSet<NodeId>,
}

impl Relooper {
    /// Creates a relooper whose labels start at `L0`.
    #[must_use]
    pub fn new() -> Self {
        Relooper::default()
    }

    /// Structures the method body starting at the entry node.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InternalConsistency`] if the program has no code, a jump
    /// targets an address that starts no node, or a jump cannot be expressed by the
    /// enclosing blocks.
    pub fn reloop(&mut self, program: &Program) -> Result<Block> {
        let entry = program.cfg().entry().ok_or_else(|| {
            consistency_error!(program.context().clone(), "Method has no code to reloop")
        })?;
        self.reloop_from(program, entry)
    }

    /// Structures the nodes reachable through jumps from `entry`.
    ///
    /// Every node reachable from `entry` is placed in the result, including nodes
    /// that other entries reach as well.
    ///
    /// # Errors
    ///
    /// See [`Relooper::reloop`].
    pub fn reloop_from(&mut self, program: &Program, entry: NodeId) -> Result<Block> {
        let graph = JumpGraph::build(program, &[entry])?;
        let nodes = graph.nodes.clone();
        let (block, _) = self.structure(program, &graph, BTreeSet::from([entry]), nodes, None)?;
        Ok(block)
    }

    /// Structures the method body together with its exception `handlers`.
    ///
    /// Nodes that the body reaches, or that more than one handler reaches, are placed
    /// in the body only. If a handler jumps into such a node, the body is wrapped in a
    /// [`Block::Loop`] whose entries are the method entry and every such node. It is
    /// entered with the label variable holding the entry's start address, and the
    /// handler resumes it with a `Continue` that sets the label to the node it jumps to.
    ///
    /// Returns the body and one block per handler, in the order of `handlers`.
    ///
    /// # Errors
    ///
    /// See [`Relooper::reloop`].
    pub fn reloop_method(
        &mut self,
        program: &Program,
        handlers: &[NodeId],
    ) -> Result<(Block, Vec<(Address, Block)>)> {
        let cfg = program.cfg();
        let entry = cfg.entry().ok_or_else(|| {
            consistency_error!(program.context().clone(), "Method has no code to reloop")
        })?;
        let body_graph = JumpGraph::build(program, &[entry])?;

        let mut handler_graphs = Vec::with_capacity(handlers.len());
        let mut owners: FxHashMap<NodeId, usize> = FxHashMap::default();
        for &handler in handlers {
            let graph = JumpGraph::build(program, &[handler])?;
            for &node in &graph.nodes {
                *owners.entry(node).or_default() += 1;
            }
            handler_graphs.push((handler, graph));
        }
        let mut shared = body_graph.nodes.clone();
        shared.extend(
            owners
                .iter()
                .filter(|&(_, &count)| count > 1)
                .map(|(&node, _)| node),
        );

        let mut resumes = BTreeSet::new();
        for (handler, graph) in &handler_graphs {
            if shared.contains(handler) {
                continue;
            }
            for node in graph.nodes.iter().filter(|node| !shared.contains(node)) {
                resumes.extend(
                    graph
                        .successors(*node)
                        .iter()
                        .copied()
                        .filter(|target| shared.contains(target)),
                );
            }
        }

        let (mut body, dispatch) = if resumes.is_empty() {
            let nodes = body_graph.nodes.clone();
            let (body, _) =
                self.structure(program, &body_graph, BTreeSet::from([entry]), nodes, None)?;
            (body, None)
        } else {
            let mut entries = resumes;
            entries.insert(entry);
            let roots: Vec<NodeId> = entries.iter().copied().collect();
            let graph = JumpGraph::build(program, &roots)?;
            let nodes = graph.nodes.clone();
            let (inner, _) = self.structure(program, &graph, entries.clone(), nodes, None)?;
            let label = self.label();
            let addresses: BTreeSet<Address> = entries
                .iter()
                .filter_map(|&node| cfg.node(node).map(|region| region.start))
                .collect();
            let body = Block::Loop {
                label,
                label_required: false,
                entries,
                inner: Box::new(inner),
                next: None,
            };
            (body, Some((label, addresses)))
        };

        let mut structured = Vec::with_capacity(handler_graphs.len());
        for (handler, graph) in handler_graphs {
            let start = cfg.node(handler).map(|region| region.start).ok_or_else(|| {
                consistency_error!(program.context().clone(), "Node {} does not exist", handler)
            })?;
            let (block, resumed) = if shared.contains(&handler) {
                let nodes = graph.nodes.clone();
                self.structure(program, &graph, BTreeSet::from([handler]), nodes, None)?
            } else {
                let nodes: BTreeSet<NodeId> = graph
                    .nodes
                    .iter()
                    .copied()
                    .filter(|node| !shared.contains(node))
                    .collect();
                self.structure(
                    program,
                    &graph,
                    BTreeSet::from([handler]),
                    nodes,
                    dispatch.as_ref(),
                )?
            };
            if resumed {
                body.set_label_required(true);
            }
            structured.push((start, block));
        }
        Ok((body, structured))
    }

    /// Structures `blocks` from `entries` and rewrites their jumps.
    ///
    /// `outer` names a loop outside the result that jumps may continue. Returns
    /// whether some jump did.
    fn structure(
        &mut self,
        program: &Program,
        graph: &JumpGraph,
        entries: BTreeSet<NodeId>,
        blocks: BTreeSet<NodeId>,
        outer: Option<&(Label, BTreeSet<Address>)>,
    ) -> Result<(Block, bool)> {
        self.cut.clear();
        let count = blocks.len();
        let first = entries.first().copied();
        let mut block = self.calculate(program, graph, entries, blocks).ok_or_else(|| {
            consistency_error!(
                program.context().clone(),
                "Nothing to structure at {:?}",
                first
            )
        })?;
        let resumed = rewrite::rewrite_jumps(&mut block, program, outer)?;

        if log::log_enabled!(log::Level::Debug) {
            let blocks = block.descendants();
            let loops = blocks.iter().filter(|b| matches!(b, Block::Loop { .. })).count();
            let multiples = blocks
                .iter()
                .filter(|b| matches!(b, Block::Multiple { .. }))
                .count();
            log::debug!(
                "{}: relooped {} nodes into {} blocks ({} loops, {} multiples)",
                program.context(),
                count,
                blocks.len(),
                loops,
                multiples
            );
        }
        Ok((block, resumed))
    }

    fn label(&mut self) -> Label {
        let label = Label::new(self.next_label);
        self.next_label += 1;
        label
    }

    /// Builds the chain for `entries` over `blocks`.
    fn calculate(
        &mut self,
        program: &Program,
        graph: &JumpGraph,
        mut entries: BTreeSet<NodeId>,
        mut blocks: BTreeSet<NodeId>,
    ) -> Option<Block> {
        let mut chain = Vec::new();
        while !entries.is_empty() {
            if entries.len() == 1 {
                let entry = *entries.first()?;
                let successors = self.successors_within(graph, entry, &blocks);
                if !self.reach(graph, successors.iter().copied(), &blocks).contains(&entry) {
                    blocks.remove(&entry);
                    entries = self.successors_within(graph, entry, &blocks);
                    chain.push(Pending::Simple {
                        label: self.label(),
                        node: entry,
                    });
                    continue;
                }
            }

            if entries.len() > 1 {
                let groups = self.independent_groups(graph, &entries, &blocks);
                if !groups.is_empty() {
                    let mut handlers = Vec::with_capacity(groups.len());
                    let mut handled = BTreeSet::new();
                    for (entry, group) in &groups {
                        for node in group {
                            blocks.remove(node);
                        }
                        handled.insert(*entry);
                    }
                    let mut next_entries: BTreeSet<NodeId> =
                        entries.difference(&handled).copied().collect();
                    for (entry, group) in groups {
                        for &node in &group {
                            next_entries.extend(self.successors_within(graph, node, &blocks));
                        }
                        let start = program.cfg().node(entry).map(|region| region.start)?;
                        let handler =
                            self.calculate(program, graph, BTreeSet::from([entry]), group)?;
                        handlers.push((start, handler));
                    }
                    chain.push(Pending::Multiple {
                        label: self.label(),
                        entries: std::mem::replace(&mut entries, next_entries),
                        handlers,
                    });
                    continue;
                }
            }

            let inner = self.loop_body(graph, &entries, &blocks);
            for node in &inner {
                blocks.remove(node);
            }
            let mut next_entries = BTreeSet::new();
            for &node in &inner {
                next_entries.extend(self.successors_within(graph, node, &blocks));
            }
            let label = self.label();
            let added: Vec<NodeId> = entries
                .iter()
                .copied()
                .filter(|entry| self.cut.insert(*entry))
                .collect();
            let body = self.calculate(program, graph, entries.clone(), inner);
            for entry in added {
                self.cut.remove(&entry);
            }
            chain.push(Pending::Loop {
                label,
                entries: std::mem::replace(&mut entries, next_entries),
                inner: body?,
            });
        }

        let mut next: Option<Box<Block>> = None;
        for pending in chain.into_iter().rev() {
            let block = match pending {
                Pending::Simple { label, node } => Block::Simple {
                    label,
                    label_required: false,
                    entries: BTreeSet::from([node]),
                    node,
                    body: program.expressions(node).cloned().unwrap_or_default(),
                    next,
                },
                Pending::Loop {
                    label,
                    entries,
                    inner,
                } => Block::Loop {
                    label,
                    label_required: false,
                    entries,
                    inner: Box::new(inner),
                    next,
                },
                Pending::Multiple {
                    label,
                    entries,
                    handlers,
                } => Block::Multiple {
                    label,
                    label_required: false,
                    entries,
                    handlers,
                    next,
                },
            };
            next = Some(Box::new(block));
        }
        next.map(|block| *block)
    }

    /// Jump successors of `node` that are still to be placed.
    fn successors_within(
        &self,
        graph: &JumpGraph,
        node: NodeId,
        blocks: &BTreeSet<NodeId>,
    ) -> BTreeSet<NodeId> {
        graph
            .successors(node)
            .iter()
            .copied()
            .filter(|target| blocks.contains(target) && !self.cut.contains(target))
            .collect()
    }

    /// Nodes of `blocks` reachable from `start` in zero or more steps.
    fn reach(
        &self,
        graph: &JumpGraph,
        start: impl IntoIterator<Item = NodeId>,
        blocks: &BTreeSet<NodeId>,
    ) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        let mut pending: Vec<NodeId> = start
            .into_iter()
            .filter(|node| blocks.contains(node))
            .collect();
        while let Some(node) = pending.pop() {
            if !seen.insert(node) {
                continue;
            }
            pending.extend(self.successors_within(graph, node, blocks));
        }
        seen
    }

    /// Nodes reachable from the entries that can also reach one of them.
    fn loop_body(
        &self,
        graph: &JumpGraph,
        entries: &BTreeSet<NodeId>,
        blocks: &BTreeSet<NodeId>,
    ) -> BTreeSet<NodeId> {
        let forward = self.reach(graph, entries.iter().copied(), blocks);
        let mut backward = BTreeSet::new();
        let mut pending: Vec<NodeId> = entries.iter().copied().collect();
        while let Some(node) = pending.pop() {
            if !backward.insert(node) || self.cut.contains(&node) {
                continue;
            }
            pending.extend(
                graph
                    .predecessors(node)
                    .iter()
                    .copied()
                    .filter(|source| blocks.contains(source)),
            );
        }
        forward.intersection(&backward).copied().collect()
    }

    /// For each entry, the nodes only it reaches and that nothing outside enters.
    fn independent_groups(
        &self,
        graph: &JumpGraph,
        entries: &BTreeSet<NodeId>,
        blocks: &BTreeSet<NodeId>,
    ) -> Vec<(NodeId, BTreeSet<NodeId>)> {
        let reached: Vec<(NodeId, BTreeSet<NodeId>)> = entries
            .iter()
            .map(|&entry| (entry, self.reach(graph, [entry], blocks)))
            .collect();
        let mut owners: FxHashMap<NodeId, usize> = FxHashMap::default();
        for (_, nodes) in &reached {
            for &node in nodes {
                *owners.entry(node).or_default() += 1;
            }
        }

        let mut groups = Vec::new();
        for (entry, nodes) in reached {
            let mut group: BTreeSet<NodeId> = nodes
                .into_iter()
                .filter(|node| owners.get(node) == Some(&1))
                .collect();
            if !group.contains(&entry) {
                continue;
            }
            loop {
                let outside: Vec<NodeId> = group
                    .iter()
                    .copied()
                    .filter(|&node| {
                        node != entry && self.entered_from_outside(graph, node, &group, blocks)
                    })
                    .collect();
                if outside.is_empty() {
                    break;
                }
                for node in outside {
                    group.remove(&node);
                }
            }
            if !self.entered_from_outside(graph, entry, &group, blocks) {
                groups.push((entry, group));
            }
        }
        groups
    }

    fn entered_from_outside(
        &self,
        graph: &JumpGraph,
        node: NodeId,
        group: &BTreeSet<NodeId>,
        blocks: &BTreeSet<NodeId>,
    ) -> bool {
        !self.cut.contains(&node)
            && graph
                .predecessors(node)
                .iter()
                .any(|source| blocks.contains(source) && !group.contains(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::{opcodes::*, CodeAssembler},
        classfile::{ClassWriter, CodeAttribute, MethodAccessFlags},
        compiler::CompilerOptions,
        linker::PermissiveLinker,
        ssa::{Expression, SsaBuilder},
    };

    fn program(descriptor: &str, asm: CodeAssembler) -> Program {
        let mut writer = ClassWriter::new("demo/Flow");
        writer.add_method(
            MethodAccessFlags::STATIC,
            "run",
            descriptor,
            Some(CodeAttribute::new(4, 4, asm.finish().unwrap())),
        );
        let class = writer.build().unwrap();
        let options = CompilerOptions::default();
        SsaBuilder::new(&class, &class.methods[0], &PermissiveLinker, &options)
            .build()
            .unwrap()
    }

    fn kinds(block: &Block) -> Vec<&'static str> {
        block.descendants().iter().map(|b| b.kind()).collect()
    }

    fn statements(block: &Block) -> Vec<Expression> {
        block
            .descendants()
            .into_iter()
            .filter_map(|b| match b {
                Block::Simple { body, .. } => Some(body.iter().cloned().collect::<Vec<_>>()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    #[test]
    fn test_straight_line_is_simple_chain() {
        let mut asm = CodeAssembler::new();
        asm.op(ICONST_0).local(ISTORE, 0).branch(GOTO, "next");
        asm.label("next").unwrap().local(ILOAD, 0).op(IRETURN);
        let program = program("()I", asm);

        let block = Relooper::new().reloop(&program).unwrap();
        assert_eq!(kinds(&block), vec!["Simple", "Simple"]);
        assert!(block.descendants().iter().all(|b| !b.label_required()));
        assert!(statements(&block)
            .iter()
            .any(|s| matches!(s, Expression::Break { silent: true, .. })));
        assert!(!statements(&block)
            .iter()
            .any(|s| matches!(s, Expression::Goto(_))));
    }

    #[test]
    fn test_single_back_edge_gives_one_loop() {
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
        let program = program("()V", asm);

        let block = Relooper::new().reloop(&program).unwrap();
        let blocks = block.descendants();
        let loops: Vec<&&Block> = blocks.iter().filter(|b| b.kind() == "Loop").collect();
        assert_eq!(loops.len(), 1);
        assert!(loops[0].label_required());
        let loop_label = loops[0].label();

        let body = statements(&block);
        assert!(body.iter().any(
            |s| matches!(s, Expression::Continue { label, set_label: false, .. } if *label == loop_label)
        ));
        assert!(body.iter().any(
            |s| matches!(s, Expression::Break { label, silent: false, .. } if *label == loop_label)
        ));
    }

    #[test]
    fn test_diamond_dispatches_through_multiple() {
        // if (c) x = 1; else x = 2; return x;
        let mut asm = CodeAssembler::new();
        asm.local(ILOAD, 0)
            .branch(IFEQ, "else")
            .op(ICONST_1)
            .local(ISTORE, 1)
            .branch(GOTO, "join");
        asm.label("else").unwrap().op(ICONST_2).local(ISTORE, 1);
        asm.label("join").unwrap().local(ILOAD, 1).op(IRETURN);
        let program = program("(Z)I", asm);

        let block = Relooper::new().reloop(&program).unwrap();
        assert_eq!(
            block.chain().map(Block::kind).collect::<Vec<_>>(),
            vec!["Simple", "Multiple", "Simple"]
        );
        let Some(Block::Multiple { handlers, .. }) = block.next() else {
            panic!("expected a multiple block");
        };
        assert_eq!(handlers.len(), 2);

        // the conditional jump leaves the entry block by name, so only it needs a label
        assert!(block.label_required());
        assert!(block.next().is_some_and(Block::label_required));
        assert!(!block.chain().last().is_some_and(Block::label_required));
    }

    #[test]
    fn test_irreducible_flow_uses_multiple_inside_loop() {
        // two loop entries jumping into each other
        let mut asm = CodeAssembler::new();
        asm.local(ILOAD, 0).branch(IFNE, "b").branch(GOTO, "c");
        asm.label("b").unwrap().iinc(0, 1).branch(GOTO, "c");
        asm.label("c").unwrap().iinc(0, -1).branch(GOTO, "b");
        let program = program("(I)V", asm);

        let block = Relooper::new().reloop(&program).unwrap();
        let blocks = block.descendants();
        assert!(blocks.iter().any(|b| b.kind() == "Loop"));
        assert!(blocks.iter().any(|b| b.kind() == "Multiple"));
        assert!(statements(&block)
            .iter()
            .any(|s| matches!(s, Expression::Continue { set_label: true, .. })));
    }

    #[test]
    fn test_acyclic_graph_has_no_loop() {
        // x = c ? 1 : 2; if (x != 0) x++; else x--; return x;
        let mut asm = CodeAssembler::new();
        asm.local(ILOAD, 0)
            .branch(IFEQ, "else1")
            .op(ICONST_1)
            .local(ISTORE, 1)
            .branch(GOTO, "join1");
        asm.label("else1").unwrap().op(ICONST_2).local(ISTORE, 1);
        asm.label("join1")
            .unwrap()
            .local(ILOAD, 1)
            .branch(IFEQ, "else2")
            .iinc(1, 1)
            .branch(GOTO, "join2");
        asm.label("else2").unwrap().iinc(1, -1);
        asm.label("join2").unwrap().local(ILOAD, 1).op(IRETURN);
        let program = program("(Z)I", asm);

        let block = Relooper::new().reloop(&program).unwrap();
        assert_eq!(
            block.chain().map(Block::kind).collect::<Vec<_>>(),
            vec!["Simple", "Multiple", "Simple", "Multiple", "Simple"]
        );
        // every arm of a dispatch is a single node
        for arm in block.chain().filter(|b| b.kind() == "Multiple") {
            let Block::Multiple { handlers, .. } = arm else {
                unreachable!();
            };
            assert_eq!(handlers.len(), 2);
            assert!(handlers.iter().all(|(_, h)| kinds(h) == vec!["Simple"]));
        }
        assert!(!kinds(&block).contains(&"Loop"));
    }

    #[test]
    fn test_handler_resumes_shared_loop() {
        // try { work(); } catch (e) {}  do { n--; } while (n > 0);
        let mut writer = ClassWriter::new("demo/Flow");
        let work = writer.method_ref("demo/Flow", "work", "()V").unwrap();
        let mut asm = CodeAssembler::new();
        asm.op_u16(INVOKESTATIC, work);
        asm.label("loop")
            .unwrap()
            .iinc(0, -1)
            .local(ILOAD, 0)
            .branch(IFGT, "loop")
            .op(RETURN);
        asm.label("handler")
            .unwrap()
            .local(ASTORE, 1)
            .branch(GOTO, "loop");
        let code = CodeAttribute::new(2, 2, asm.finish().unwrap()).with_handler(0, 3, 12, None);
        writer.add_method(MethodAccessFlags::STATIC, "run", "(I)V", Some(code));
        let class = writer.build().unwrap();
        let options = CompilerOptions::default();
        let program = SsaBuilder::new(&class, &class.methods[0], &PermissiveLinker, &options)
            .build()
            .unwrap();

        let handler = program.cfg().node_at(Address::new(12)).unwrap();
        let looping = program.cfg().node_at(Address::new(3)).unwrap();
        let (body, handlers) = Relooper::new().reloop_method(&program, &[handler]).unwrap();

        assert_eq!(body.kind(), "Loop");
        assert!(body.label_required());
        assert_eq!(body.entries().len(), 2);
        assert_eq!(handlers.len(), 1);
        let (start, catch) = &handlers[0];
        assert_eq!(*start, Address::new(12));
        assert_eq!(kinds(catch), vec!["Simple"]);

        // the loop is placed once, in the body
        let placed = body
            .descendants()
            .into_iter()
            .chain(catch.descendants())
            .filter(|b| matches!(b, Block::Simple { node, .. } if *node == looping))
            .count();
        assert_eq!(placed, 1);

        assert!(statements(catch).iter().any(|s| matches!(
            s,
            Expression::Continue { label, target, set_label: true }
                if *label == body.label() && *target == Address::new(3)
        )));
    }

    #[test]
    fn test_handler_without_shared_nodes_keeps_plain_body() {
        let mut writer = ClassWriter::new("demo/Flow");
        let work = writer.method_ref("demo/Flow", "work", "()V").unwrap();
        let mut asm = CodeAssembler::new();
        asm.op_u16(INVOKESTATIC, work).op(RETURN);
        asm.label("handler").unwrap().local(ASTORE, 0).op(RETURN);
        let code = CodeAttribute::new(1, 1, asm.finish().unwrap()).with_handler(0, 3, 4, None);
        writer.add_method(MethodAccessFlags::STATIC, "run", "()V", Some(code));
        let class = writer.build().unwrap();
        let options = CompilerOptions::default();
        let program = SsaBuilder::new(&class, &class.methods[0], &PermissiveLinker, &options)
            .build()
            .unwrap();

        let handler = program.cfg().node_at(Address::new(4)).unwrap();
        let (body, handlers) = Relooper::new().reloop_method(&program, &[handler]).unwrap();
        assert_eq!(kinds(&body), vec!["Simple"]);
        assert_eq!(body.entries().len(), 1);
        assert_eq!(handlers.len(), 1);
        assert_eq!(kinds(&handlers[0].1), vec!["Simple"]);
    }
}
