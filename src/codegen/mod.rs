//! Code generation contract.
//!
//! A back end walks a [`crate::compiler::CompiledMethod`] through the [`Visitor`] trait:
//! blocks along their `next` chains, statements in order and values in evaluation
//! order. [`PseudoCodeWriter`] is a complete visitor producing readable C-like text.

mod visitor;
mod writer;

pub use visitor::{
    walk_all, walk_block, walk_blocks, walk_expression, walk_invoke, walk_method, walk_pair,
    walk_value, Visitor,
};
pub use writer::PseudoCodeWriter;
