// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # classscope
//!
//! An ahead-of-time compiler core for JVM class files. `classscope` parses the class-file
//! container, decodes method bytecode, lifts the stack machine into SSA form and finally
//! restructures the control flow graph into nested, goto-free blocks that any structured
//! target language can express.
//!
//! ## Pipeline
//!
//! ```text
//! ┌────────────┐   ┌──────────┐   ┌──────────────┐   ┌─────────────┐
//! │ class file │──►│ decoder  │──►│ basic blocks │──►│ reachability│
//! └────────────┘   └──────────┘   └──────────────┘   └─────────────┘
//!                                                           │
//!       ┌───────────────────────────────────────────────────┘
//!       ▼
//! ┌─────────────┐   ┌───────────┐   ┌──────────┐   ┌──────────────┐
//! │ SSA builder │──►│ optimizer │──►│ relooper │──►│ visitor/write│
//! └─────────────┘   └───────────┘   └──────────┘   └──────────────┘
//! ```
//!
//! - [`classfile`] - constant pool, descriptors, attributes and the [`ClassModel`]
//! - [`bytecode`] - addressed JVM instructions, the decoder and a small assembler
//! - [`cfg`] - basic block splitting and back edge classification
//! - [`ssa`] - the abstract interpreter producing a [`ssa::Program`]
//! - [`optimizer`] - local rewrites over a finished program
//! - [`relooper`] - Simple / Loop / Multiple block reconstruction
//! - [`codegen`] - the double dispatch visitor contract and a pseudo-code writer
//! - [`linker`] - read-only class hierarchy queries used while lifting
//! - [`compiler`] - per-method and per-class driver with [`CompilerOptions`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use classscope::prelude::*;
//!
//! let class = ClassModel::from_file("Example.class".as_ref())?;
//! let linker = ClassHierarchy::builder().add_class(&class).build();
//! let compiler = Compiler::new(&linker, CompilerOptions::default());
//!
//! for method in compiler.compile_class(&class)?.methods {
//!     match method.result {
//!         Ok(compiled) => println!("{}", PseudoCodeWriter::render(&compiled)),
//!         Err(error) => eprintln!("{}: {}", method.name, error),
//!     }
//! }
//! # Ok::<(), classscope::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result`]. Errors fall into three families:
//! malformed input ([`Error::Malformed`], [`Error::OutOfBounds`], constant pool errors),
//! recognised but unhandled constructs ([`Error::Unsupported`]) and broken internal
//! invariants ([`Error::InternalConsistency`]). The latter two always carry a
//! [`MethodContext`] naming the class, method and bytecode address.

#[macro_use]
pub(crate) mod error;

/// Raw byte access: memory mapped or owned buffers and a big-endian cursor.
pub mod file;

/// Generic infrastructure shared by the analysis passes.
#[macro_use]
pub mod utils;

/// Class-file container parsing.
///
/// Everything needed to turn the bytes of a `.class` file into a [`ClassModel`]: the
/// constant pool, field and method descriptors, access flags and attributes. A minimal
/// [`classfile::ClassWriter`] is provided for producing test inputs.
pub mod classfile;

/// JVM instruction model, decoder and assembler.
pub mod bytecode;

/// Basic block construction and reachability.
pub mod cfg;

/// Read-only linking queries.
pub mod linker;

/// Static single assignment form.
///
/// The [`ssa::SsaBuilder`] abstract-interprets every basic block, binding operand stack
/// and local variable slots to SSA values and inserting PHI variables where control flow
/// merges.
pub mod ssa;

/// Optimizer passes working on a finished [`ssa::Program`].
pub mod optimizer;

/// Structured control flow reconstruction.
pub mod relooper;

/// Visitor contract for code generators.
pub mod codegen;

/// The compilation driver.
pub mod compiler;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,ignore
/// use classscope::prelude::*;
///
/// let class = ClassModel::from_file("Example.class".as_ref())?;
/// println!("{} methods", class.methods.len());
/// # Ok::<(), classscope::Error>(())
/// ```
pub mod prelude;

pub use error::{Error, MethodContext};

/// `classscope` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

pub use classfile::{ClassFileParser, ClassModel};
pub use compiler::{
    ClassCompilation, CompiledMethod, Compiler, CompilerOptions, MethodCompilation,
};
pub use file::{parser::Parser, File};
