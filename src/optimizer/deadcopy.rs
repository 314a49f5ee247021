//! Dead copy elimination.
//!
//! The SSA builder binds every computed value to a variable. Most of those variables
//! are read exactly once, by the very next statement. This pass folds such a variable
//! into its only reader:
//!
//! Before:
//! ```text
//! var4 = arg0 + 1
//! return var4
//! ```
//!
//! After:
//! ```text
//! return arg0 + 1
//! ```
//!
//! A rewrite is skipped when the reader evaluates an impure operand before the folded
//! variable, since moving the computation past it would reorder side effects.

use crate::{
    ssa::{
        ControlFlowGraph, Expression, ExpressionList, Program, ValueArena, ValueId,
        VariableKind,
    },
    utils::graph::NodeId,
    Result,
};

/// Folds single-use variables into the statement that directly follows their
/// assignment.
pub struct DeadCopyElimination {
    max_iterations: usize,
}

impl Default for DeadCopyElimination {
    fn default() -> Self {
        Self::new(16)
    }
}

/// A statement inside a possibly nested list.
///
/// `path` descends through `(statement index, nested list index)` pairs.
#[derive(Debug, Clone)]
struct Location {
    node: NodeId,
    path: Vec<(usize, usize)>,
    index: usize,
}

/// Outcome of searching an operand tree for a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Found,
    Clean,
    Impure,
}

impl DeadCopyElimination {
    /// Creates the pass with a bound on its internal rounds.
    #[must_use]
    pub fn new(max_iterations: usize) -> Self {
        DeadCopyElimination { max_iterations }
    }

    fn run_round(program: &mut Program) -> usize {
        let mut candidates = Vec::new();
        for (node, region) in program.cfg().nodes() {
            collect_candidates(node, &region.expressions, &mut Vec::new(), &mut candidates);
        }

        let mut rewrites = 0;
        // reverse pre-order: a rewrite only shifts statements that were already handled
        for location in candidates.into_iter().rev() {
            if Self::try_rewrite(program, &location) {
                rewrites += 1;
            }
        }
        rewrites
    }

    fn try_rewrite(program: &mut Program, location: &Location) -> bool {
        let Some((variable, value)) = Self::check(program, location) else {
            return false;
        };

        let (cfg, values) = program.parts_mut();
        let Some(list) = list_at_mut(cfg, location) else {
            return false;
        };
        let Some(consumer) = list.get_mut(location.index + 1) else {
            return false;
        };
        for operand in consumer.operands_mut() {
            if *operand == variable {
                *operand = value;
            } else {
                replace_nested(values, *operand, variable, value);
            }
        }
        if let Expression::VariableAssignment {
            variable: assigned,
            value: assigned_value,
        } = consumer
        {
            if let Some(entry) = values.variable_mut(*assigned) {
                match entry.kind {
                    VariableKind::Assigned => entry.incoming = vec![*assigned_value],
                    // a PHI keeps one flow per predecessor
                    VariableKind::Phi => {
                        for flow in &mut entry.incoming {
                            if *flow == variable {
                                *flow = *assigned_value;
                            }
                        }
                    }
                    VariableKind::Argument => {}
                }
            }
        }
        list.remove(location.index);
        program.delete_variable(variable, value);

        log::trace!(
            "{}: folded {} into its reader",
            program.context(),
            variable
        );
        true
    }

    /// Returns `(variable, value)` if the copy at `location` can be folded.
    fn check(program: &Program, location: &Location) -> Option<(ValueId, ValueId)> {
        let list = list_at(program.cfg(), location)?;
        let Some(Expression::VariableAssignment { variable, value }) = list.get(location.index)
        else {
            return None;
        };
        let consumer = list.get(location.index + 1)?;

        let values = program.values();
        let entry = values.variable(*variable)?;
        if entry.kind != VariableKind::Assigned || entry.deleted || value == variable {
            return None;
        }
        if scan_statement(values, consumer, *variable) != Scan::Found {
            return None;
        }
        (count_consumers(program, *variable) == 1).then_some((*variable, *value))
    }
}

impl super::Optimizer for DeadCopyElimination {
    fn name(&self) -> &'static str {
        "dead-copy-elimination"
    }

    fn description(&self) -> &'static str {
        "Folds single-use variables into the statement that reads them"
    }

    fn optimize(&self, program: &mut Program) -> Result<bool> {
        let mut changed = false;
        for _ in 0..self.max_iterations {
            let rewrites = Self::run_round(program);
            if rewrites == 0 {
                break;
            }
            log::debug!(
                "{}: folded {} variables",
                program.context(),
                rewrites
            );
            changed = true;
        }
        Ok(changed)
    }
}

fn collect_candidates(
    node: NodeId,
    list: &ExpressionList,
    path: &mut Vec<(usize, usize)>,
    out: &mut Vec<Location>,
) {
    for (index, expression) in list.iter().enumerate() {
        if matches!(expression, Expression::VariableAssignment { .. }) && index + 1 < list.len()
        {
            out.push(Location {
                node,
                path: path.clone(),
                index,
            });
        }
        for (nested_index, nested) in expression.nested_lists().into_iter().enumerate() {
            path.push((index, nested_index));
            collect_candidates(node, nested, path, out);
            path.pop();
        }
    }
}

fn list_at<'p>(cfg: &'p ControlFlowGraph, location: &Location) -> Option<&'p ExpressionList> {
    let mut list = &cfg.node(location.node)?.expressions;
    for &(statement, nested) in &location.path {
        list = list.get(statement)?.nested_lists().into_iter().nth(nested)?;
    }
    Some(list)
}

fn list_at_mut<'p>(
    cfg: &'p mut ControlFlowGraph,
    location: &Location,
) -> Option<&'p mut ExpressionList> {
    let mut list = &mut cfg.node_mut(location.node)?.expressions;
    for &(statement, nested) in &location.path {
        list = list
            .get_mut(statement)?
            .nested_lists_mut()
            .into_iter()
            .nth(nested)?;
    }
    Some(list)
}

/// Searches the operands of `statement` for `variable` in evaluation order.
fn scan_statement(values: &ValueArena, statement: &Expression, variable: ValueId) -> Scan {
    for operand in statement.operands() {
        match scan_value(values, operand, variable) {
            Scan::Clean => {}
            other => return other,
        }
    }
    Scan::Clean
}

/// Operands are evaluated before the value that consumes them. Variables are leaves.
fn scan_value(values: &ValueArena, id: ValueId, variable: ValueId) -> Scan {
    if id == variable {
        return Scan::Found;
    }
    let Some(value) = values.get(id) else {
        return Scan::Clean;
    };
    if value.as_variable().is_some() {
        return Scan::Clean;
    }
    for operand in value.operands() {
        match scan_value(values, operand, variable) {
            Scan::Clean => {}
            other => return other,
        }
    }
    if value.is_pure() {
        Scan::Clean
    } else {
        Scan::Impure
    }
}

/// Reads of `variable` by statements, by non-variable values below them and by PHI
/// flows. Import and export maps are not reads.
fn count_consumers(program: &Program, variable: ValueId) -> usize {
    fn in_value(values: &ValueArena, id: ValueId, variable: ValueId) -> usize {
        if id == variable {
            return 1;
        }
        match values.get(id) {
            Some(value) if value.as_variable().is_none() => value
                .operands()
                .into_iter()
                .map(|operand| in_value(values, operand, variable))
                .sum(),
            _ => 0,
        }
    }

    fn in_list(values: &ValueArena, list: &ExpressionList, variable: ValueId) -> usize {
        list.iter()
            .map(|expression| {
                let own: usize = expression
                    .operands()
                    .into_iter()
                    .map(|operand| in_value(values, operand, variable))
                    .sum();
                let nested: usize = expression
                    .nested_lists()
                    .into_iter()
                    .map(|nested| in_list(values, nested, variable))
                    .sum();
                own + nested
            })
            .sum()
    }

    let values = program.values();
    let statements: usize = program
        .cfg()
        .nodes()
        .map(|(_, node)| in_list(values, &node.expressions, variable))
        .sum();
    let flows: usize = program
        .phi_variables()
        .map(|(_, phi)| phi.incoming.iter().filter(|&&id| id == variable).count())
        .sum();
    statements + flows
}

/// Replaces `variable` by `replacement` inside the non-variable values below `root`.
fn replace_nested(values: &mut ValueArena, root: ValueId, variable: ValueId, replacement: ValueId) {
    let mut owners = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let Some(value) = values.get(id) else {
            continue;
        };
        if value.as_variable().is_some() {
            continue;
        }
        for operand in value.operands() {
            if operand == variable {
                owners.push(id);
            } else {
                stack.push(operand);
            }
        }
    }
    for owner in owners {
        if let Some(value) = values.get_mut(owner) {
            for operand in value.operands_mut() {
                if *operand == variable {
                    *operand = replacement;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::{opcodes::*, ArithmeticOp, CodeAssembler, NumericKind},
        classfile::{ClassModel, ClassWriter, CodeAttribute, MethodAccessFlags, MethodSignature},
        compiler::CompilerOptions,
        linker::PermissiveLinker,
        optimizer::Optimizer,
        ssa::{Constant, InvocationKind, MethodReference, SsaBuilder, TypeRef, Value, Variable},
    };

    fn lift(class: &ClassModel) -> Program {
        let options = CompilerOptions::default();
        SsaBuilder::new(class, &class.methods[0], &PermissiveLinker, &options)
            .build()
            .unwrap()
    }

    fn class_with(descriptor: &str, asm: CodeAssembler, writer: ClassWriter) -> ClassModel {
        let mut writer = writer;
        writer.add_method(
            MethodAccessFlags::STATIC,
            "run",
            descriptor,
            Some(CodeAttribute::new(4, 2, asm.finish().unwrap())),
        );
        writer.build().unwrap()
    }

    #[test]
    fn test_folds_single_use_into_return() {
        let mut asm = CodeAssembler::new();
        asm.local(ILOAD, 0).op(ICONST_1).op(IADD).op(IRETURN);
        let class = class_with("(I)I", asm, ClassWriter::new("demo/Sample"));
        let mut program = lift(&class);
        assert_eq!(program.statement_count(), 2);

        let pass = DeadCopyElimination::default();
        assert!(pass.optimize(&mut program).unwrap());
        assert_eq!(program.statement_count(), 1);

        let entry = program.cfg().entry().unwrap();
        let statements = program.expressions(entry).unwrap();
        let Some(Expression::ReturnValue(returned)) = statements.get(0) else {
            panic!("expected a return, got {statements:?}");
        };
        assert!(matches!(
            program.values().get(*returned),
            Some(Value::Binary { .. })
        ));
        assert_eq!(
            program
                .values()
                .live_variables()
                .filter(|(_, v)| v.kind == VariableKind::Assigned)
                .count(),
            0
        );
    }

    #[test]
    fn test_keeps_variables_read_twice() {
        // (a + 1) * (a + 1)
        let mut asm = CodeAssembler::new();
        asm.local(ILOAD, 0)
            .op(ICONST_1)
            .op(IADD)
            .op(DUP)
            .op(IMUL)
            .op(IRETURN);
        let class = class_with("(I)I", asm, ClassWriter::new("demo/Sample"));
        let mut program = lift(&class);

        DeadCopyElimination::default().optimize(&mut program).unwrap();

        let entry = program.cfg().entry().unwrap();
        let statements = program.expressions(entry).unwrap();
        assert!(matches!(
            statements.get(0),
            Some(Expression::VariableAssignment { .. })
        ));
        assert!(matches!(statements.get(1), Some(Expression::ReturnValue(_))));
    }

    #[test]
    fn test_second_run_changes_nothing() {
        let mut writer = ClassWriter::new("demo/Sample");
        let field = writer.field_ref("demo/Sample", "count", "I").unwrap();
        let callee = writer.method_ref("demo/Sample", "next", "()I").unwrap();
        let mut asm = CodeAssembler::new();
        asm.op_u16(INVOKESTATIC, callee)
            .op_u16(GETSTATIC, field)
            .op(IADD)
            .local(ISTORE, 0)
            .local(ILOAD, 0)
            .local(ILOAD, 0)
            .op(IMUL)
            .op(IRETURN);
        let class = class_with("()I", asm, writer);
        let mut program = lift(&class);

        let pass = DeadCopyElimination::default();
        pass.optimize(&mut program).unwrap();
        let once = program.statement_count();
        let snapshot = format!("{:?}", program.cfg());
        assert!(!pass.optimize(&mut program).unwrap());
        assert_eq!(program.statement_count(), once);
        assert_eq!(format!("{:?}", program.cfg()), snapshot);
    }

    #[test]
    fn test_swap_temporary_keeps_phi_flows() {
        // a = 0; b = 1; for (i = 0; i < n; i++) { t = a + b; a = b; b = t; } return a;
        let mut asm = CodeAssembler::new();
        asm.op(ICONST_0)
            .local(ISTORE, 1)
            .op(ICONST_1)
            .local(ISTORE, 2)
            .op(ICONST_0)
            .local(ISTORE, 3);
        asm.label("head")
            .unwrap()
            .local(ILOAD, 3)
            .local(ILOAD, 0)
            .branch(IF_ICMPGE, "done")
            .local(ILOAD, 1)
            .local(ILOAD, 2)
            .op(IADD)
            .local(ISTORE, 4)
            .local(ILOAD, 2)
            .local(ISTORE, 1)
            .local(ILOAD, 4)
            .local(ISTORE, 2)
            .iinc(3, 1)
            .branch(GOTO, "head");
        asm.label("done").unwrap().local(ILOAD, 1).op(IRETURN);
        let mut writer = ClassWriter::new("demo/Sample");
        writer.add_method(
            MethodAccessFlags::STATIC,
            "fib",
            "(I)I",
            Some(CodeAttribute::new(2, 5, asm.finish().unwrap())),
        );
        let class = writer.build().unwrap();
        let mut program = lift(&class);

        let before: Vec<(ValueId, Vec<ValueId>)> = program
            .phi_variables()
            .map(|(id, phi)| (id, phi.incoming.clone()))
            .collect();
        assert!(!before.is_empty());

        assert!(DeadCopyElimination::default().optimize(&mut program).unwrap());

        // the swap temporary is gone: one PHI copy now reads another PHI directly
        let copies_phi_into_phi = program.cfg().nodes().any(|(_, node)| {
            node.expressions.iter().any(|expression| {
                matches!(
                    expression,
                    Expression::VariableAssignment { variable, value }
                        if program.values().is_phi(*variable) && program.values().is_phi(*value)
                )
            })
        });
        assert!(copies_phi_into_phi);

        let after: Vec<(ValueId, Vec<ValueId>)> = program
            .phi_variables()
            .map(|(id, phi)| (id, phi.incoming.clone()))
            .collect();
        assert_eq!(after, before);
        for (_, incoming) in &after {
            assert_eq!(incoming.len(), 2);
        }
    }

    #[test]
    fn test_impure_operand_blocks_reordering() {
        let mut values = ValueArena::new();
        let call = values.push(Value::Invoke {
            kind: InvocationKind::Static,
            method: MethodReference {
                class: "demo/A".into(),
                name: "f".into(),
                signature: MethodSignature::parse("()I").unwrap(),
            },
            target: None,
            arguments: Vec::new(),
        });
        let one = values.constant(Constant::Int(1));
        let variable = values.push(Value::Variable(Variable {
            name: "var2".into(),
            ty: TypeRef::Int,
            kind: VariableKind::Assigned,
            incoming: vec![one],
            deleted: false,
        }));
        let call_first = values.push(Value::Binary {
            op: ArithmeticOp::Add,
            kind: NumericKind::Int,
            left: call,
            right: variable,
        });
        let variable_first = values.push(Value::Binary {
            op: ArithmeticOp::Add,
            kind: NumericKind::Int,
            left: variable,
            right: call,
        });

        assert_eq!(
            scan_statement(&values, &Expression::ReturnValue(call_first), variable),
            Scan::Impure
        );
        assert_eq!(
            scan_statement(&values, &Expression::ReturnValue(variable_first), variable),
            Scan::Found
        );
        assert_eq!(
            scan_statement(&values, &Expression::ReturnValue(one), variable),
            Scan::Clean
        );
    }
}
