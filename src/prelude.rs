//! # classscope Prelude
//!
//! This module re-exports the types needed to load a class file, compile its methods and
//! walk the result. Import it to get quick access to the whole pipeline.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all classscope operations
pub use crate::Error;

/// The result type used throughout classscope
pub use crate::Result;

/// Class, method and address attached to method-level errors
pub use crate::MethodContext;

// ================================================================================================
// Class Files
// ================================================================================================

/// Parsed class file and its parser
pub use crate::classfile::{ClassFileParser, ClassModel, FieldModel, MethodModel};

/// Constant pool and its entries
pub use crate::classfile::{ConstantPool, ConstantPoolEntry};

/// Descriptors
pub use crate::classfile::{FieldType, MethodSignature};

/// Access flags
pub use crate::classfile::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};

/// Building class files in memory
pub use crate::classfile::{ClassWriter, CodeAttribute};

/// Low-level file access
pub use crate::{File, Parser};

// ================================================================================================
// Bytecode
// ================================================================================================

/// Addressed instructions and the decoder
pub use crate::bytecode::{decode, Address, Instruction, InstructionKind};

/// Assembling method bodies
pub use crate::bytecode::CodeAssembler;

// ================================================================================================
// Linking
// ================================================================================================

/// Class hierarchy queries
pub use crate::linker::{ClassHierarchy, LinkerContext, PermissiveLinker};

// ================================================================================================
// Compilation Pipeline
// ================================================================================================

/// Driver, options and results
pub use crate::compiler::{
    ClassCompilation, CompiledMethod, Compiler, CompilerOptions, MethodCompilation,
};

/// SSA construction and its program model
pub use crate::ssa::{Expression, ExpressionList, Program, SsaBuilder, TypeRef, Value, ValueId};

/// Optimizer passes
pub use crate::optimizer::{Optimizer, OptimizerPipeline};

/// Structured blocks
pub use crate::relooper::{Block, Label, Relooper};

/// Code generation
pub use crate::codegen::{PseudoCodeWriter, Visitor};
