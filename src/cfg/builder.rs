//! Splitting decoded instructions into basic blocks.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashMap;
use strum::{Display, IntoStaticStr};

use crate::{
    bytecode::{Address, Instruction},
    cfg::block::{BasicBlock, BlockKind},
    classfile::ExceptionTableEntry,
    utils::graph::{DirectedGraph, GraphBase, NodeId, Predecessors, Successors},
    MethodContext, Result,
};

/// Splits a method's instruction stream into [`BasicBlock`]s.
///
/// A new block starts at
/// - the first instruction,
/// - every jump and switch target,
/// - the start of every try range and every handler,
/// - the instruction following a jump, switch, return, `athrow` or `ret`.
pub struct BasicBlockBuilder;

impl BasicBlockBuilder {
    /// Splits `instructions` into blocks in code order.
    ///
    /// # Arguments
    ///
    /// * `instructions` - The decoded method body, in code order
    /// * `exception_table` - The method's exception handlers
    /// * `context` - Attached to consistency errors
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Malformed`] if the method is empty or a jump target, try start
    ///   or handler does not name an instruction
    /// - [`crate::Error::InternalConsistency`] if the last block falls off the end of
    ///   the code array
    pub fn split(
        instructions: &[Instruction],
        exception_table: &[ExceptionTableEntry],
        context: &MethodContext,
    ) -> Result<Vec<BasicBlock>> {
        let Some(first) = instructions.first() else {
            return Err(malformed_error!("Method {} has no instructions", context));
        };

        let positions: FxHashMap<Address, usize> = instructions
            .iter()
            .enumerate()
            .map(|(position, instruction)| (instruction.address, position))
            .collect();
        let check = |address: Address, what: &str| -> Result<Address> {
            if positions.contains_key(&address) {
                Ok(address)
            } else {
                Err(malformed_error!(
                    "{} {} in {} is not an instruction boundary",
                    what,
                    address,
                    context
                ))
            }
        };

        let mut leaders = BTreeSet::new();
        leaders.insert(first.address);
        for instruction in instructions {
            for target in instruction.jump_targets() {
                leaders.insert(check(target, "Jump target")?);
            }
            if instruction.is_terminator() && positions.contains_key(&instruction.next_address()) {
                leaders.insert(instruction.next_address());
            }
        }

        let mut handler_kinds: BTreeMap<Address, BlockKind> = BTreeMap::new();
        for entry in exception_table {
            leaders.insert(check(entry.start_pc, "Try start")?);
            let handler = check(entry.handler_pc, "Handler")?;
            leaders.insert(handler);

            let kind = if entry.is_finally() {
                BlockKind::Finally
            } else {
                BlockKind::ExceptionHandler
            };
            handler_kinds
                .entry(handler)
                .and_modify(|existing| {
                    if kind == BlockKind::Finally {
                        *existing = BlockKind::Finally;
                    }
                })
                .or_insert(kind);
        }

        let starts: Vec<Address> = leaders.into_iter().collect();
        let mut blocks = Vec::with_capacity(starts.len());
        for (index, &start) in starts.iter().enumerate() {
            let from = positions[&start];
            let to = starts
                .get(index + 1)
                .map_or(instructions.len(), |next| positions[next]);
            let body = instructions[from..to].to_vec();
            let next_block = starts.get(index + 1).copied();

            let mut successors = Vec::new();
            if let Some(last) = body.last() {
                successors = last.jump_targets();
                if last.falls_through() {
                    let Some(next) = next_block else {
                        return Err(consistency_error!(
                            context.at(last.address),
                            "Control falls off the end of the code array"
                        ));
                    };
                    if !successors.contains(&next) {
                        successors.push(next);
                    }
                }
            }

            blocks.push(BasicBlock {
                kind: handler_kinds
                    .get(&start)
                    .copied()
                    .unwrap_or(BlockKind::Normal),
                start,
                instructions: body,
                successors,
            });
        }

        Ok(blocks)
    }
}

/// Why an edge of the [`BlockGraph`] exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum BlockEdge {
    /// Jump, switch or fall-through
    Flow,
    /// From the first block of a try range to its handler
    Handler,
}

/// Basic blocks of a method connected by flow and handler edges.
///
/// Node ids follow code order, so the method entry is always node 0.
#[derive(Debug, Clone)]
pub struct BlockGraph {
    graph: DirectedGraph<BasicBlock, BlockEdge>,
    by_address: FxHashMap<Address, NodeId>,
}

impl BlockGraph {
    /// Splits the instructions and links the resulting blocks.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`BasicBlockBuilder::split`].
    pub fn build(
        instructions: &[Instruction],
        exception_table: &[ExceptionTableEntry],
        context: &MethodContext,
    ) -> Result<BlockGraph> {
        let blocks = BasicBlockBuilder::split(instructions, exception_table, context)?;
        Self::from_blocks(blocks, exception_table)
    }

    /// Links already split blocks.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if a successor or handler address is not the
    /// start of a block.
    pub fn from_blocks(
        blocks: Vec<BasicBlock>,
        exception_table: &[ExceptionTableEntry],
    ) -> Result<BlockGraph> {
        let mut graph = DirectedGraph::with_capacity(blocks.len(), blocks.len() * 2);
        let mut by_address = FxHashMap::default();
        for block in blocks {
            let start = block.start;
            let node = graph.add_node(block);
            by_address.insert(start, node);
        }

        let lookup = |address: Address| -> Result<NodeId> {
            by_address
                .get(&address)
                .copied()
                .ok_or_else(|| malformed_error!("No basic block starts at {}", address))
        };

        let mut edges = Vec::new();
        for (node, block) in graph.nodes() {
            for &successor in &block.successors {
                edges.push((node, lookup(successor)?, BlockEdge::Flow));
            }
        }
        for entry in exception_table {
            let source = lookup(entry.start_pc)?;
            let handler = lookup(entry.handler_pc)?;
            if !edges.contains(&(source, handler, BlockEdge::Handler)) {
                edges.push((source, handler, BlockEdge::Handler));
            }
        }
        for (source, target, kind) in edges {
            graph.add_edge(source, target, kind)?;
        }

        Ok(BlockGraph { graph, by_address })
    }

    /// The method entry block.
    #[must_use]
    pub fn entry(&self) -> NodeId {
        NodeId::new(0)
    }

    /// The block stored at `node`.
    #[must_use]
    pub fn block(&self, node: NodeId) -> Option<&BasicBlock> {
        self.graph.node(node)
    }

    /// The block that starts at `address`.
    #[must_use]
    pub fn node_at(&self, address: Address) -> Option<NodeId> {
        self.by_address.get(&address).copied()
    }

    /// All blocks in code order.
    pub fn blocks(&self) -> impl Iterator<Item = (NodeId, &BasicBlock)> + '_ {
        self.graph.nodes()
    }

    /// Number of blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Always false; a method has at least one block.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Outgoing edges of `node` with their kind.
    pub fn edges_from(&self, node: NodeId) -> impl Iterator<Item = (NodeId, BlockEdge)> + '_ {
        self.graph
            .outgoing_edges(node)
            .map(|(_, target, kind)| (target, *kind))
    }
}

impl GraphBase for BlockGraph {
    fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        self.graph.node_ids()
    }
}

impl Successors for BlockGraph {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.graph.successors(node)
    }
}

impl Predecessors for BlockGraph {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.graph.predecessors(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{decode, opcodes::*, CodeAssembler};

    fn context() -> MethodContext {
        MethodContext::new("demo/Test", "m()V")
    }

    fn split(code: &[u8], table: &[ExceptionTableEntry]) -> Result<Vec<BasicBlock>> {
        BasicBlockBuilder::split(&decode(code)?, table, &context())
    }

    #[test]
    fn test_straight_line_is_one_block() {
        let blocks = split(&[ICONST_1, ISTORE_0, RETURN], &[]).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Normal);
        assert!(blocks[0].successors.is_empty());
        assert_eq!(blocks[0].end(), Address::new(3));
    }

    #[test]
    fn test_if_else_diamond() {
        let mut asm = CodeAssembler::new();
        asm.op(ILOAD_0)
            .branch(IFEQ, "else")
            .op(ICONST_1)
            .branch(GOTO, "join");
        asm.label("else").unwrap().op(ICONST_2);
        asm.label("join").unwrap().op(IRETURN);
        let code = asm.finish().unwrap();

        let blocks = split(&code, &[]).unwrap();
        let starts: Vec<u32> = blocks.iter().map(|b| b.start.value()).collect();
        assert_eq!(starts, vec![0, 4, 8, 9]);
        assert_eq!(blocks[0].successors, vec![Address::new(8), Address::new(4)]);
        assert_eq!(blocks[1].successors, vec![Address::new(9)]);
        assert_eq!(blocks[2].successors, vec![Address::new(9)]);
        assert!(blocks[3].successors.is_empty());
    }

    #[test]
    fn test_handlers_start_typed_blocks() {
        // try { a(); } catch (E) { } finally { }
        let code = [NOP, NOP, RETURN, POP, RETURN, POP, RETURN];
        let table = [
            ExceptionTableEntry {
                start_pc: Address::new(0),
                end_pc: Address::new(2),
                handler_pc: Address::new(3),
                catch_type: Some("java/lang/Exception".into()),
            },
            ExceptionTableEntry {
                start_pc: Address::new(0),
                end_pc: Address::new(2),
                handler_pc: Address::new(5),
                catch_type: None,
            },
        ];
        let blocks = split(&code, &table).unwrap();
        let kinds: Vec<BlockKind> = blocks.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![BlockKind::Normal, BlockKind::ExceptionHandler, BlockKind::Finally]
        );

        let graph = BlockGraph::from_blocks(blocks, &table).unwrap();
        let edges: Vec<(NodeId, BlockEdge)> = graph.edges_from(graph.entry()).collect();
        assert_eq!(
            edges,
            vec![
                (NodeId::new(1), BlockEdge::Handler),
                (NodeId::new(2), BlockEdge::Handler)
            ]
        );
    }

    #[test]
    fn test_fall_off_end_is_inconsistent() {
        let err = split(&[ICONST_0, POP], &[]).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_target_inside_instruction_is_malformed() {
        // goto +1 lands inside the goto's own operand
        let err = split(&[GOTO, 0x00, 0x01, RETURN], &[]).unwrap_err();
        assert!(err.is_parse_error());
    }
}
