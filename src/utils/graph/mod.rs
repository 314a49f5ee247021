//! Directed graph infrastructure for control flow analysis.
//!
//! Both the basic block graph and the SSA region graph are stored in a
//! [`DirectedGraph`], an adjacency list graph with arena indices for nodes and edges.
//! Algorithms are written against the small traits in [`traits`] so they can run on
//! either graph.
//!
//! # Key Components
//!
//! - [`NodeId`] / [`EdgeId`] - strongly typed arena indices
//! - [`DirectedGraph`] - node and edge storage with successor and predecessor lists
//! - [`GraphBase`], [`Successors`], [`Predecessors`] - traversal abstractions
//!
//! # Example
//!
//! ```rust,ignore
//! use classscope::utils::graph::{DirectedGraph, Successors};
//!
//! let mut graph: DirectedGraph<&str, ()> = DirectedGraph::new();
//! let a = graph.add_node("entry");
//! let b = graph.add_node("exit");
//! graph.add_edge(a, b, ())?;
//!
//! assert_eq!(graph.successors(a).collect::<Vec<_>>(), vec![b]);
//! # Ok::<(), classscope::Error>(())
//! ```

mod directed;
mod edge;
mod node;
mod traits;

pub use directed::DirectedGraph;
pub use edge::EdgeId;
pub use node::NodeId;
pub use traits::{GraphBase, Predecessors, Successors};
