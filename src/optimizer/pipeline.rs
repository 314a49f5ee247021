//! Ordered pass execution to a fixpoint.

use crate::{
    optimizer::{DeadCopyElimination, Optimizer},
    ssa::Program,
    Result,
};

/// Runs a list of [`Optimizer`]s repeatedly until none of them changes the program.
pub struct OptimizerPipeline {
    passes: Vec<Box<dyn Optimizer>>,
    /// Upper bound on full rounds over all passes
    max_iterations: usize,
}

impl Default for OptimizerPipeline {
    fn default() -> Self {
        Self::standard(16)
    }
}

impl OptimizerPipeline {
    /// Creates a pipeline without passes.
    #[must_use]
    pub fn new(max_iterations: usize) -> Self {
        OptimizerPipeline {
            passes: Vec::new(),
            max_iterations,
        }
    }

    /// Creates the default pass list.
    #[must_use]
    pub fn standard(max_iterations: usize) -> Self {
        let mut pipeline = Self::new(max_iterations);
        pipeline.add(DeadCopyElimination::new(max_iterations));
        pipeline
    }

    /// Appends a pass; passes run in insertion order.
    pub fn add(&mut self, pass: impl Optimizer + 'static) -> &mut Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// Names of the registered passes.
    pub fn pass_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.passes.iter().map(|pass| pass.name())
    }

    /// Runs all passes until a full round makes no change.
    ///
    /// # Returns
    ///
    /// The number of rounds that changed the program.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by a pass.
    pub fn run(&self, program: &mut Program) -> Result<usize> {
        let mut changed_rounds = 0;
        for round in 0..self.max_iterations {
            let mut changed = false;
            for pass in &self.passes {
                let before = program.statement_count();
                if pass.optimize(program)? {
                    log::debug!(
                        "{}: {} changed the program in round {} ({} -> {} statements)",
                        program.context(),
                        pass.name(),
                        round,
                        before,
                        program.statement_count()
                    );
                    changed = true;
                }
            }
            if !changed {
                break;
            }
            changed_rounds += 1;
        }
        Ok(changed_rounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MethodContext;

    struct CountingPass {
        remaining: std::sync::atomic::AtomicUsize,
    }

    impl Optimizer for CountingPass {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn optimize(&self, _program: &mut Program) -> Result<bool> {
            use std::sync::atomic::Ordering;
            let remaining = self.remaining.load(Ordering::SeqCst);
            if remaining == 0 {
                return Ok(false);
            }
            self.remaining.store(remaining - 1, Ordering::SeqCst);
            Ok(true)
        }
    }

    #[test]
    fn test_runs_until_stable() {
        let mut pipeline = OptimizerPipeline::new(10);
        pipeline.add(CountingPass {
            remaining: 3.into(),
        });
        let mut program = Program::new(MethodContext::new("demo/A", "m()V"));
        assert_eq!(pipeline.run(&mut program).unwrap(), 3);
        assert_eq!(pipeline.run(&mut program).unwrap(), 0);
    }

    #[test]
    fn test_iteration_limit() {
        let mut pipeline = OptimizerPipeline::new(2);
        pipeline.add(CountingPass {
            remaining: 5.into(),
        });
        let mut program = Program::new(MethodContext::new("demo/A", "m()V"));
        assert_eq!(pipeline.run(&mut program).unwrap(), 2);
    }

    #[test]
    fn test_default_passes() {
        let names: Vec<&str> = OptimizerPipeline::default().pass_names().collect();
        assert_eq!(names, vec!["dead-copy-elimination"]);
    }
}
