//! Method bytecode: addresses, opcodes, decoded instructions and an assembler.
//!
//! # Key Components
//!
//! - [`Address`] - byte offset inside a code array, with checked relative arithmetic
//! - [`opcodes`] - raw opcode constants and mnemonics
//! - [`Instruction`] / [`InstructionKind`] - one decoded instruction with normalized
//!   operands (`iload_2` and `wide iload 2` decode to the same kind)
//! - [`decode`] - turns a `Code` attribute's bytes into an instruction sequence
//! - [`CodeAssembler`] - emits bytecode with symbolic labels
//!
//! The decoder performs no verification beyond what is needed to find instruction
//! boundaries and operands. Jump targets that fall outside the method or between
//! instructions are rejected later by [`crate::cfg::BasicBlockBuilder`].

mod address;
mod assembler;
mod decoder;
mod instruction;
pub mod opcodes;

pub use address::Address;
pub use assembler::CodeAssembler;
pub use decoder::{decode, decode_instruction};
pub use instruction::{
    ArithmeticOp, ArrayKind, CompareOp, Condition, ConvertTarget, Instruction, InstructionKind,
    InvokeKind, NumericKind, ValueKind,
};
