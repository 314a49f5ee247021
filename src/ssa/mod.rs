//! Static single assignment form of JVM methods.
//!
//! A [`Program`] owns a [`ValueArena`] and a [`ControlFlowGraph`] of [`RegionNode`]s.
//! Every node holds an [`ExpressionList`] of statements plus the maps describing which
//! [`Variable`] each local or stack slot holds when the node is entered (imports) and
//! left (exports).
//!
//! # Key Components
//!
//! - [`SsaBuilder`] - lifts one method into a [`Program`]
//! - [`Value`] / [`ValueArena`] - the value graph addressed by [`ValueId`]
//! - [`Expression`] / [`ExpressionList`] - statements with nested branch bodies
//! - [`TypeRef`] - static types of values and variables
//!
//! # Invariants
//!
//! - Every non-PHI variable is assigned exactly once.
//! - Every reachable node ends with a statement that does not complete normally.
//! - Before every `Goto`, the PHIs imported by the jump target receive the values the
//!   jump source exports, as one parallel assignment.

mod builder;
mod expression;
mod graph;
mod interpret;
mod program;
mod region;
pub(crate) mod state;
mod types;
mod value;

pub use builder::SsaBuilder;
pub use expression::{Expression, ExpressionList};
pub use graph::ControlFlowGraph;
pub use program::Program;
pub use region::{RegionNode, VariableDescription};
pub use types::TypeRef;
pub use value::{
    Constant, FieldReference, InvocationKind, MethodReference, Value, ValueArena, ValueId,
    Variable, VariableKind,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::{opcodes::*, Address, CodeAssembler},
        classfile::{ClassModel, ClassWriter, CodeAttribute, MethodAccessFlags},
        compiler::CompilerOptions,
        linker::{ClassHierarchy, LinkerContext, PermissiveLinker},
        Error,
    };

    fn static_method(descriptor: &str, code: CodeAttribute) -> ClassModel {
        let mut writer = ClassWriter::new("demo/Sample");
        writer.add_method(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            "run",
            descriptor,
            Some(code),
        );
        writer.build().unwrap()
    }

    fn lift(class: &ClassModel, linker: &dyn LinkerContext) -> crate::Result<Program> {
        let method = &class.methods[0];
        let options = CompilerOptions::default();
        SsaBuilder::new(class, method, linker, &options).build()
    }

    fn assignments_to(program: &Program, variable: ValueId) -> usize {
        fn count(list: &ExpressionList, variable: ValueId) -> usize {
            list.iter()
                .map(|expression| {
                    let own = usize::from(matches!(
                        expression,
                        Expression::VariableAssignment { variable: v, .. } if *v == variable
                    ));
                    own + expression
                        .nested_lists()
                        .into_iter()
                        .map(|nested| count(nested, variable))
                        .sum::<usize>()
                })
                .sum()
        }
        program
            .cfg()
            .nodes()
            .map(|(_, node)| count(&node.expressions, variable))
            .sum()
    }

    fn assert_terminated(program: &Program) {
        for (id, node) in program.cfg().nodes() {
            if program.cfg().is_reachable(id) {
                assert!(
                    node.expressions.ends_with_never_returning(),
                    "block {} falls off its end",
                    node.start
                );
            }
        }
    }

    #[test]
    fn test_diverging_stores_merge_in_phi() {
        // int x; if (c) x = 1; else x = 2; return x;
        let mut asm = CodeAssembler::new();
        asm.local(ILOAD, 0)
            .branch(IFEQ, "else")
            .op(ICONST_1)
            .local(ISTORE, 1)
            .branch(GOTO, "join");
        asm.label("else").unwrap().op(ICONST_2).local(ISTORE, 1);
        asm.label("join").unwrap().local(ILOAD, 1).op(IRETURN);
        let class = static_method("(Z)I", CodeAttribute::new(2, 2, asm.finish().unwrap()));

        let program = lift(&class, &PermissiveLinker).unwrap();
        assert_terminated(&program);

        let phis: Vec<(ValueId, &Variable)> = program.phi_variables().collect();
        assert_eq!(phis.len(), 1);
        let (phi, variable) = phis[0];
        assert_eq!(variable.incoming.len(), 2);
        assert_eq!(variable.ty, TypeRef::Int);
        assert_eq!(assignments_to(&program, phi), 2);

        let returned = program
            .cfg()
            .nodes()
            .flat_map(|(_, node)| node.expressions.iter())
            .find_map(|expression| match expression {
                Expression::ReturnValue(value) => Some(*value),
                _ => None,
            });
        assert_eq!(returned, Some(phi));
    }

    #[test]
    fn test_agreeing_paths_create_no_phi() {
        // if (c) { 0; } return a;
        let mut asm = CodeAssembler::new();
        asm.local(ILOAD, 1)
            .branch(IFEQ, "join")
            .op(ICONST_0)
            .op(POP);
        asm.label("join").unwrap().local(ILOAD, 0).op(IRETURN);
        let class = static_method("(IZ)I", CodeAttribute::new(2, 2, asm.finish().unwrap()));

        let program = lift(&class, &PermissiveLinker).unwrap();
        assert_terminated(&program);
        assert_eq!(program.phi_variables().count(), 0);

        let (_, argument) = program.arguments()[0];
        assert_eq!(program.variable(argument).unwrap().name, "arg0");
        let join = program.cfg().node_at(Address::new(7)).unwrap();
        assert_eq!(
            program.cfg().node(join).unwrap().imports[&VariableDescription::LocalSlot(0)],
            argument
        );
    }

    #[test]
    fn test_loop_header_phi_receives_back_edge() {
        // i = 0; while (i < 10) i++; return
        let mut asm = CodeAssembler::new();
        asm.op(ICONST_0).local(ISTORE, 0);
        asm.label("head")
            .unwrap()
            .local(ILOAD, 0)
            .push_int(10)
            .branch(IF_ICMPGE, "done")
            .iinc(0, 1)
            .branch(GOTO, "head");
        asm.label("done").unwrap().op(RETURN);
        let class = static_method("()V", CodeAttribute::new(2, 1, asm.finish().unwrap()));

        let program = lift(&class, &PermissiveLinker).unwrap();
        assert_terminated(&program);

        let phis: Vec<(ValueId, &Variable)> = program.phi_variables().collect();
        assert_eq!(phis.len(), 1);
        let (phi, variable) = phis[0];
        assert_eq!(variable.incoming.len(), 2);

        let head = program.cfg().node_at(Address::new(3)).unwrap();
        let header = program.cfg().node(head).unwrap();
        assert_eq!(header.imports[&VariableDescription::LocalSlot(0)], phi);

        // entry and loop body both copy into the PHI right before jumping
        assert_eq!(assignments_to(&program, phi), 2);
        let body = program.cfg().node_at(Address::new(10)).unwrap();
        let statements = &program.cfg().node(body).unwrap().expressions;
        let last = statements.len() - 1;
        assert!(matches!(statements.get(last), Some(Expression::Goto(a)) if *a == Address::new(3)));
        assert!(matches!(
            statements.get(last - 1),
            Some(Expression::VariableAssignment { variable, .. }) if *variable == phi
        ));
    }

    #[test]
    fn test_loop_at_method_start_gets_preheader() {
        // do { n--; } while (n > 0); return n;
        let mut asm = CodeAssembler::new();
        asm.label("body")
            .unwrap()
            .iinc(0, -1)
            .local(ILOAD, 0)
            .branch(IFGT, "body")
            .local(ILOAD, 0)
            .op(IRETURN);
        let class = static_method("(I)I", CodeAttribute::new(1, 1, asm.finish().unwrap()));

        let program = lift(&class, &PermissiveLinker).unwrap();
        assert_terminated(&program);

        let cfg = program.cfg();
        let first = cfg.node_at(Address::new(0)).unwrap();
        let entry = cfg.entry().unwrap();
        assert_ne!(entry, first);
        assert_eq!(cfg.preheader(), Some(entry));

        let phi = cfg.node(first).unwrap().imports[&VariableDescription::LocalSlot(0)];
        let (_, argument) = program.arguments()[0];
        let variable = program.variable(phi).unwrap();
        assert!(variable.is_phi());
        assert_eq!(variable.incoming.len(), 2);
        assert!(variable.incoming.contains(&argument));

        // the pre-header seeds the PHI before entering the loop
        let statements = &cfg.node(entry).unwrap().expressions;
        assert_eq!(statements.len(), 2);
        assert!(matches!(
            statements.get(0),
            Some(Expression::VariableAssignment { variable, value })
                if *variable == phi && *value == argument
        ));
        assert!(matches!(statements.get(1), Some(Expression::Goto(a)) if *a == Address::new(0)));
    }

    #[test]
    fn test_loop_invariant_local_keeps_no_phi() {
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
        let class = static_method("(I)I", CodeAttribute::new(2, 5, asm.finish().unwrap()));

        let program = lift(&class, &PermissiveLinker).unwrap();
        assert_terminated(&program);

        let phis: Vec<(ValueId, &Variable)> = program.phi_variables().collect();
        assert_eq!(phis.len(), 3, "{phis:?}");
        for (phi, variable) in &phis {
            assert!(variable.incoming.len() >= 2, "{phi}: {:?}", variable.incoming);
            assert!(!variable.incoming.contains(phi));
        }

        // `n` is read inside the loop but never written there
        let (_, argument) = program.arguments()[0];
        let head = program.cfg().node_at(Address::new(9)).unwrap();
        assert_eq!(
            program.cfg().node(head).unwrap().imports[&VariableDescription::LocalSlot(0)],
            argument
        );
    }

    #[test]
    fn test_stack_values_merge_at_join() {
        // return c ? 1 : 2;
        let mut asm = CodeAssembler::new();
        asm.local(ILOAD, 0)
            .branch(IFEQ, "else")
            .op(ICONST_1)
            .branch(GOTO, "join");
        asm.label("else").unwrap().op(ICONST_2);
        asm.label("join").unwrap().op(IRETURN);
        let code = asm.finish().unwrap();
        let join_address = Address::new(u32::try_from(code.len() - 1).unwrap());
        let class = static_method("(Z)I", CodeAttribute::new(2, 1, code));

        let program = lift(&class, &PermissiveLinker).unwrap();
        assert_terminated(&program);

        let join = program.cfg().node_at(join_address).unwrap();
        let imported = program.cfg().node(join).unwrap().imports[&VariableDescription::StackSlot(0)];
        assert!(program.values().is_phi(imported));
    }

    #[test]
    fn test_handler_starts_with_caught_exception() {
        let mut writer = ClassWriter::new("demo/Sample");
        let callee = writer.method_ref("demo/Sample", "work", "()V").unwrap();
        let mut asm = CodeAssembler::new();
        asm.op_u16(INVOKESTATIC, callee).op(RETURN);
        asm.label("handler").unwrap().local(ASTORE, 0).op(RETURN);
        let code = CodeAttribute::new(1, 1, asm.finish().unwrap()).with_handler(
            0,
            3,
            4,
            Some("java/lang/IllegalStateException"),
        );
        writer.add_method(
            MethodAccessFlags::STATIC,
            "run",
            "()V",
            Some(code),
        );
        let class = writer.build().unwrap();

        let program = lift(&class, &PermissiveLinker).unwrap();
        assert_terminated(&program);

        let handler = program.cfg().node_at(Address::new(4)).unwrap();
        let first = program.cfg().node(handler).unwrap().expressions.get(0);
        let Some(Expression::VariableAssignment { variable, value }) = first else {
            panic!("handler does not bind the exception: {first:?}");
        };
        assert!(matches!(
            program.values().get(*value),
            Some(Value::CurrentException)
        ));
        assert_eq!(
            program.variable(*variable).unwrap().ty,
            TypeRef::object("java/lang/IllegalStateException")
        );
    }

    #[test]
    fn test_unresolvable_call_is_unsupported() {
        let mut writer = ClassWriter::new("demo/Sample");
        let callee = writer.method_ref("demo/Missing", "work", "()V").unwrap();
        let mut asm = CodeAssembler::new();
        asm.op_u16(INVOKESTATIC, callee).op(RETURN);
        writer.add_method(
            MethodAccessFlags::STATIC,
            "run",
            "()V",
            Some(CodeAttribute::new(0, 0, asm.finish().unwrap())),
        );
        let class = writer.build().unwrap();
        let linker = ClassHierarchy::builder().add_class(&class).build();

        let error = lift(&class, &linker).unwrap_err();
        assert!(matches!(error, Error::Unsupported { .. }), "{error}");
    }

    #[test]
    fn test_method_without_code_has_empty_graph() {
        let mut writer = ClassWriter::new("demo/Sample");
        writer.add_method(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
            "run",
            "()V",
            None,
        );
        let class = writer.build().unwrap();

        let program = lift(&class, &PermissiveLinker).unwrap();
        assert!(program.cfg().is_empty());
        assert_eq!(program.statement_count(), 0);
    }
}
