//! Basic blocks and control flow classification.
//!
//! The first stage of method compilation splits the decoded instruction stream into
//! [`BasicBlock`]s and connects them into a [`BlockGraph`]. The
//! [`ReachabilityAnalyzer`] then classifies edges into normal and back edges, which the
//! SSA builder uses to order its work and to recognize loop headers.
//!
//! # Key Components
//!
//! - [`BasicBlockBuilder`] - leader detection and block splitting
//! - [`BlockGraph`] - blocks plus flow and handler edges
//! - [`ReachabilityAnalyzer`] / [`Reachability`] - DFS edge classification
//!
//! # Example
//!
//! ```rust,ignore
//! use classscope::cfg::{BlockGraph, ReachabilityAnalyzer};
//!
//! let graph = BlockGraph::build(&instructions, &code.exception_table, &context)?;
//! let reachability = ReachabilityAnalyzer::analyze(&graph, graph.entry());
//! for (source, header) in reachability.back_edges() {
//!     println!("loop {source} -> {header}");
//! }
//! ```

mod block;
mod builder;
mod reachability;

pub use block::{BasicBlock, BlockKind};
pub use builder::{BasicBlockBuilder, BlockEdge, BlockGraph};
pub use reachability::{EdgeKind, Reachability, ReachabilityAnalyzer};
