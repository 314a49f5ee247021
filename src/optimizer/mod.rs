//! Optimizer passes over finished SSA programs.
//!
//! Passes run after the [`crate::ssa::SsaBuilder`] has completed PHI insertion and
//! before the relooper. They may rewrite statements and tombstone variables, but they
//! never change the control flow graph.
//!
//! # Architecture
//!
//! ```text
//! OptimizerPipeline           fixpoint over all passes
//!   └─ Optimizer trait        one rewrite strategy
//!        └─ DeadCopyElimination
//! ```

mod deadcopy;
mod pipeline;

pub use deadcopy::DeadCopyElimination;
pub use pipeline::OptimizerPipeline;

use crate::{ssa::Program, Result};

/// A rewrite over one [`Program`].
///
/// Implementations must be deterministic and must leave the program in a valid state
/// when they return `Ok`. A pass that finds nothing to do returns `Ok(false)`.
pub trait Optimizer: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// One-line human readable summary.
    fn description(&self) -> &'static str {
        ""
    }

    /// Applies the pass to `program`.
    ///
    /// # Returns
    ///
    /// `true` if the program changed.
    ///
    /// # Errors
    ///
    /// Passes only fail when the program itself is inconsistent; rewrites that do not
    /// apply are skipped silently.
    fn optimize(&self, program: &mut Program) -> Result<bool>;
}
