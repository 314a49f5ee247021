//! Class-file parsing and encoding.
//!
//! This module turns the bytes of a `.class` file into a [`ClassModel`]: the constant
//! pool, class header, fields, methods and their attributes. Method bodies stay raw
//! bytecode here; [`crate::bytecode`] decodes them into instructions.
//!
//! # Key Components
//!
//! - [`ClassFileParser`] - reads a complete class file
//! - [`ConstantPool`] / [`ConstantPoolEntry`] - the constant pool with typed accessors
//! - [`ClassModel`], [`MethodModel`], [`FieldModel`] - the parsed structure
//! - [`FieldType`], [`MethodSignature`] - parsed descriptors
//! - [`Attribute`] - typed and opaque attributes
//! - [`ClassWriter`] - encoder producing class files from builder calls
//!
//! # Example
//!
//! ```rust,ignore
//! use classscope::classfile::ClassModel;
//!
//! let class = ClassModel::from_file("Main.class".as_ref())?;
//! for method in &class.methods {
//!     println!("{}", method.qualified_name());
//! }
//! ```

mod attributes;
mod constant;
mod flags;
mod model;
pub mod mutf8;
mod parser;
mod pool;
mod signature;
mod writer;

pub use attributes::{
    encode_all, names, Annotation, Attribute, BootstrapMethod, CodeAttribute, ElementValue,
    ExceptionTableEntry, LocalVariable,
};
pub use constant::{tags, ConstantPoolEntry, ReferenceKind};
pub use flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
pub use model::{ClassModel, FieldModel, MethodModel};
pub use parser::ClassFileParser;
pub use pool::{ConstantPool, DynamicRef, MemberKind, MemberRef};
pub use signature::{FieldType, MethodSignature};
pub use writer::ClassWriter;
