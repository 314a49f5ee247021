//! Nodes of the SSA control flow graph.

use std::{collections::BTreeMap, fmt};

use crate::{
    bytecode::Address,
    cfg::BlockKind,
    ssa::{ExpressionList, ValueId},
};

/// A storage location of the JVM frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VariableDescription {
    /// Local variable slot
    LocalSlot(u16),
    /// Operand stack entry, counted from the top (0 = top of stack)
    StackSlot(u16),
}

impl fmt::Display for VariableDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableDescription::LocalSlot(slot) => write!(f, "local{slot}"),
            VariableDescription::StackSlot(depth) => write!(f, "stack{depth}"),
        }
    }
}

/// One node of the SSA graph, created from one basic block.
///
/// `imports` maps each frame location the node reads before writing it to the value
/// it expects from its predecessors. `exports` maps frame locations to the values
/// available to successors when the node is left.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionNode {
    /// How control enters the node
    pub kind: BlockKind,
    /// Start address of the underlying block
    pub start: Address,
    /// Statements of the node
    pub expressions: ExpressionList,
    /// Values expected from predecessors
    pub imports: BTreeMap<VariableDescription, ValueId>,
    /// Values handed to successors
    pub exports: BTreeMap<VariableDescription, ValueId>,
}

impl RegionNode {
    /// Creates an empty node.
    #[must_use]
    pub fn new(kind: BlockKind, start: Address) -> Self {
        RegionNode {
            kind,
            start,
            expressions: ExpressionList::new(),
            imports: BTreeMap::new(),
            exports: BTreeMap::new(),
        }
    }

    /// Replaces every import and export of `from` by `to`.
    pub fn redirect(&mut self, from: ValueId, to: ValueId) {
        for value in self.imports.values_mut().chain(self.exports.values_mut()) {
            if *value == from {
                *value = to;
            }
        }
    }
}
