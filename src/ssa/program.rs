//! A method in SSA form.

use crate::{
    ssa::{ControlFlowGraph, Expression, ExpressionList, ValueArena, ValueId, Variable},
    utils::graph::NodeId,
    MethodContext,
};

/// The SSA form of one method: its values, its argument variables and the control
/// flow graph of statement lists.
#[derive(Debug, Clone)]
pub struct Program {
    context: MethodContext,
    pub(crate) values: ValueArena,
    pub(crate) cfg: ControlFlowGraph,
    /// `(local slot, variable)` for `this` and every parameter
    pub(crate) arguments: Vec<(u16, ValueId)>,
}

impl Program {
    /// Creates a program without code.
    #[must_use]
    pub fn new(context: MethodContext) -> Self {
        Program {
            context,
            values: ValueArena::new(),
            cfg: ControlFlowGraph::empty(),
            arguments: Vec::new(),
        }
    }

    /// Class and method this program was built from.
    #[must_use]
    pub fn context(&self) -> &MethodContext {
        &self.context
    }

    /// All values of the method.
    #[must_use]
    pub fn values(&self) -> &ValueArena {
        &self.values
    }

    /// Mutable access to the values.
    pub fn values_mut(&mut self) -> &mut ValueArena {
        &mut self.values
    }

    /// The control flow graph.
    #[must_use]
    pub fn cfg(&self) -> &ControlFlowGraph {
        &self.cfg
    }

    /// Mutable access to the control flow graph.
    pub fn cfg_mut(&mut self) -> &mut ControlFlowGraph {
        &mut self.cfg
    }

    /// Graph and values borrowed mutably at the same time.
    pub fn parts_mut(&mut self) -> (&mut ControlFlowGraph, &mut ValueArena) {
        (&mut self.cfg, &mut self.values)
    }

    /// Argument variables as `(local slot, variable)`, `this` first.
    #[must_use]
    pub fn arguments(&self) -> &[(u16, ValueId)] {
        &self.arguments
    }

    /// The variable behind `id`.
    #[must_use]
    pub fn variable(&self, id: ValueId) -> Option<&Variable> {
        self.values.variable(id)
    }

    /// Statements of `node`.
    #[must_use]
    pub fn expressions(&self, node: NodeId) -> Option<&ExpressionList> {
        self.cfg.node(node).map(|region| &region.expressions)
    }

    /// PHI variables that have not been deleted.
    pub fn phi_variables(&self) -> impl Iterator<Item = (ValueId, &Variable)> + '_ {
        self.values
            .live_variables()
            .filter(|(_, variable)| variable.is_phi())
    }

    /// Tombstones `variable` and points every import and export naming it at
    /// `replacement`.
    ///
    /// Statements are not touched; the caller removes or rewrites them.
    pub fn delete_variable(&mut self, variable: ValueId, replacement: ValueId) {
        if let Some(entry) = self.values.variable_mut(variable) {
            entry.deleted = true;
        }
        let ids: Vec<NodeId> = self.cfg.nodes().map(|(id, _)| id).collect();
        for id in ids {
            if let Some(node) = self.cfg.node_mut(id) {
                node.redirect(variable, replacement);
            }
        }
    }

    /// Replaces every read of `variable` by `replacement`, then deletes `variable`.
    ///
    /// Reads are statement operands, value operands, variable flows, imports and
    /// exports. Assignments to `variable` are left for the caller.
    pub fn replace_variable(&mut self, variable: ValueId, replacement: ValueId) {
        fn substitute_in(list: &mut ExpressionList, from: ValueId, to: ValueId) {
            for expression in list.iter_mut() {
                for operand in expression.operands_mut() {
                    if *operand == from {
                        *operand = to;
                    }
                }
                for nested in expression.nested_lists_mut() {
                    substitute_in(nested, from, to);
                }
            }
        }

        self.values.substitute(variable, replacement);
        let ids: Vec<NodeId> = self.cfg.nodes().map(|(id, _)| id).collect();
        for id in ids {
            if let Some(node) = self.cfg.node_mut(id) {
                substitute_in(&mut node.expressions, variable, replacement);
            }
        }
        self.delete_variable(variable, replacement);
    }

    /// Number of statements over all nodes, nested lists included.
    #[must_use]
    pub fn statement_count(&self) -> usize {
        fn count(list: &ExpressionList) -> usize {
            list.iter()
                .map(|expression| {
                    1 + expression
                        .nested_lists()
                        .into_iter()
                        .map(count)
                        .sum::<usize>()
                })
                .sum()
        }
        self.cfg
            .nodes()
            .map(|(_, node)| count(&node.expressions))
            .sum()
    }

    /// True if some statement anywhere assigns `variable`.
    #[must_use]
    pub fn is_assigned(&self, variable: ValueId) -> bool {
        fn assigns(list: &ExpressionList, variable: ValueId) -> bool {
            list.iter().any(|expression| {
                matches!(expression, Expression::VariableAssignment { variable: v, .. } if *v == variable)
                    || expression
                        .nested_lists()
                        .into_iter()
                        .any(|nested| assigns(nested, variable))
            })
        }
        self.cfg
            .nodes()
            .any(|(_, node)| assigns(&node.expressions, variable))
    }
}
