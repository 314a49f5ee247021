//! Basic blocks.

use strum::{Display, EnumIter, IntoStaticStr};

use crate::bytecode::{Address, Instruction};

/// How control enters a basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum BlockKind {
    /// Entered by normal control flow
    Normal,
    /// Entry of a typed `catch` handler
    ExceptionHandler,
    /// Entry of a catch-all handler, as emitted for `finally`
    Finally,
}

impl BlockKind {
    /// True for both handler kinds.
    #[must_use]
    pub const fn is_handler(self) -> bool {
        matches!(self, BlockKind::ExceptionHandler | BlockKind::Finally)
    }
}

/// A maximal run of instructions with a single entry at the top.
///
/// Successors are identified by the start address of the target block, which is
/// unique per block.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    /// How control enters the block
    pub kind: BlockKind,
    /// Address of the first instruction
    pub start: Address,
    /// Instructions in code order; never empty
    pub instructions: Vec<Instruction>,
    /// Start addresses of successor blocks, without handler edges
    pub successors: Vec<Address>,
}

impl BasicBlock {
    /// The last instruction of the block.
    #[must_use]
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    /// The address just past the block's last instruction.
    #[must_use]
    pub fn end(&self) -> Address {
        self.terminator()
            .map_or(self.start, Instruction::next_address)
    }

    /// True if `address` is the address of one of the block's instructions.
    #[must_use]
    pub fn contains(&self, address: Address) -> bool {
        self.instructions
            .iter()
            .any(|instruction| instruction.address == address)
    }
}
