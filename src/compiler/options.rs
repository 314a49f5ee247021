//! Compilation settings.

/// Configuration for [`crate::compiler::Compiler`].
///
/// The default runs the optimizer and compiles the methods of a class in parallel,
/// reporting failures per method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct CompilerOptions {
    /// Run the optimizer pipeline between SSA construction and relooping
    pub optimize: bool,

    /// Compile the methods of a class on the rayon thread pool
    pub parallel: bool,

    /// Abort class compilation at the first failing method instead of recording the
    /// error and continuing
    pub fail_fast: bool,

    /// Emit a comment statement naming every interpreted instruction
    pub emit_comments: bool,

    /// Upper bound on optimizer rounds per method (default: 16)
    pub max_optimizer_iterations: usize,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            optimize: true,
            parallel: true,
            fail_fast: false,
            emit_comments: false,
            max_optimizer_iterations: 16,
        }
    }
}

impl CompilerOptions {
    /// Settings for inspecting a single failure.
    ///
    /// Methods compile sequentially in declaration order, the first error aborts, and the
    /// SSA keeps one comment per instruction with the optimizer disabled so the output
    /// maps back to the bytecode.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            optimize: false,
            parallel: false,
            fail_fast: true,
            emit_comments: true,
            max_optimizer_iterations: 0,
        }
    }

    /// Settings for maximum throughput: parallel, without the optimizer.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            optimize: false,
            parallel: true,
            fail_fast: false,
            emit_comments: false,
            max_optimizer_iterations: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let default = CompilerOptions::default();
        assert!(default.optimize && default.parallel && !default.fail_fast);
        assert_eq!(default.max_optimizer_iterations, 16);

        let debug = CompilerOptions::debug();
        assert!(!debug.parallel && debug.fail_fast && debug.emit_comments);

        assert!(!CompilerOptions::fast().optimize);
    }
}
