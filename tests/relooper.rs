//! Relooper integration tests.
//!
//! Methods are lifted with `SsaBuilder` and structured with `Relooper`; the tests check
//! the block shapes and that every jump names an enclosing block that carries a label.

use std::collections::BTreeSet;

use classscope::{
    bytecode::{opcodes::*, CodeAssembler},
    classfile::{ClassWriter, CodeAttribute, MethodAccessFlags},
    compiler::CompilerOptions,
    linker::PermissiveLinker,
    relooper::{Block, Label, Relooper},
    ssa::{Expression, ExpressionList, Program, SsaBuilder},
    Result,
};

fn lift(descriptor: &str, asm: CodeAssembler) -> Result<Program> {
    let mut writer = ClassWriter::new("demo/Shapes");
    writer.add_method(
        MethodAccessFlags::STATIC,
        "run",
        descriptor,
        Some(CodeAttribute::new(4, 4, asm.finish()?)),
    );
    let class = writer.build()?;
    let options = CompilerOptions::default();
    SsaBuilder::new(&class, &class.methods[0], &PermissiveLinker, &options).build()
}

fn count(block: &Block, kind: &str) -> usize {
    block
        .descendants()
        .iter()
        .filter(|b| b.kind() == kind)
        .count()
}

/// Labels named by jumps that actually emit a `break` or `continue`.
fn named_labels(block: &Block) -> BTreeSet<Label> {
    fn walk(list: &ExpressionList, labels: &mut BTreeSet<Label>) {
        for expression in list {
            match expression {
                Expression::Break {
                    label,
                    silent: false,
                    ..
                }
                | Expression::Continue { label, .. } => {
                    labels.insert(*label);
                }
                Expression::Goto(target) => panic!("goto {target} survived relooping"),
                _ => {}
            }
            for nested in expression.nested_lists() {
                walk(nested, labels);
            }
        }
    }

    let mut labels = BTreeSet::new();
    for block in block.descendants() {
        if let Block::Simple { body, .. } = block {
            walk(body, &mut labels);
        }
    }
    labels
}

fn assert_labels_match(block: &Block) {
    let named = named_labels(block);
    let required: BTreeSet<Label> = block
        .descendants()
        .iter()
        .filter(|b| b.label_required())
        .map(|b| b.label())
        .collect();
    assert_eq!(named, required);
}

#[test]
fn test_straight_line_has_only_simple_blocks() -> Result<()> {
    let mut asm = CodeAssembler::new();
    asm.local(ILOAD, 0).local(ISTORE, 1).branch(GOTO, "second");
    asm.label("second")?.iinc(1, 2).branch(GOTO, "third");
    asm.label("third")?.local(ILOAD, 1).op(IRETURN);
    let program = lift("(I)I", asm)?;

    let block = Relooper::new().reloop(&program)?;
    assert_eq!(count(&block, "Simple"), 3);
    assert_eq!(count(&block, "Loop") + count(&block, "Multiple"), 0);
    assert!(named_labels(&block).is_empty());
    assert_labels_match(&block);
    Ok(())
}

#[test]
fn test_one_back_edge_gives_one_loop() -> Result<()> {
    // x = n; do { x -= 1 } while (x > 0); return x
    let mut asm = CodeAssembler::new();
    asm.local(ILOAD, 0).local(ISTORE, 1);
    asm.label("body")?.iinc(1, -1).local(ILOAD, 1).branch(IFGT, "body");
    asm.local(ILOAD, 1).op(IRETURN);
    let program = lift("(I)I", asm)?;

    let block = Relooper::new().reloop(&program)?;
    assert_eq!(count(&block, "Loop"), 1);
    assert_labels_match(&block);
    Ok(())
}

#[test]
fn test_nested_loops() -> Result<()> {
    // for (i = 0; i < n; i++) for (j = 0; j < i; j++) acc++;
    let mut asm = CodeAssembler::new();
    asm.op(ICONST_0).local(ISTORE, 1).op(ICONST_0).local(ISTORE, 3);
    asm.label("outer")?
        .local(ILOAD, 1)
        .local(ILOAD, 0)
        .branch(IF_ICMPGE, "done");
    asm.op(ICONST_0).local(ISTORE, 2);
    asm.label("inner")?
        .local(ILOAD, 2)
        .local(ILOAD, 1)
        .branch(IF_ICMPGE, "next");
    asm.iinc(3, 1).iinc(2, 1).branch(GOTO, "inner");
    asm.label("next")?.iinc(1, 1).branch(GOTO, "outer");
    asm.label("done")?.local(ILOAD, 3).op(IRETURN);
    let program = lift("(I)I", asm)?;

    let block = Relooper::new().reloop(&program)?;
    assert_eq!(count(&block, "Loop"), 2);
    let outer = block
        .descendants()
        .into_iter()
        .find(|b| b.kind() == "Loop")
        .expect("outer loop");
    assert_eq!(count(outer, "Loop"), 2, "inner loop is nested in the outer one");
    assert_labels_match(&block);
    Ok(())
}

#[test]
fn test_irreducible_flow_needs_multiple() -> Result<()> {
    // Two entries into the same cycle.
    let mut asm = CodeAssembler::new();
    asm.local(ILOAD, 0).branch(IFNE, "b").branch(GOTO, "c");
    asm.label("b")?.iinc(0, 1).local(ILOAD, 0).branch(IFLT, "out").branch(GOTO, "c");
    asm.label("c")?.iinc(0, -1).branch(GOTO, "b");
    asm.label("out")?.local(ILOAD, 0).op(IRETURN);
    let program = lift("(I)I", asm)?;

    let block = Relooper::new().reloop(&program)?;
    assert!(count(&block, "Multiple") >= 1);
    assert!(count(&block, "Loop") >= 1);
    assert_labels_match(&block);
    Ok(())
}

#[test]
fn test_switch_targets_share_one_join() -> Result<()> {
    let mut asm = CodeAssembler::new();
    asm.local(ILOAD, 0).tableswitch(0, &["zero", "one"], "other");
    asm.label("zero")?.push_int(10).local(ISTORE, 1).branch(GOTO, "join");
    asm.label("one")?.push_int(20).local(ISTORE, 1).branch(GOTO, "join");
    asm.label("other")?.push_int(30).local(ISTORE, 1);
    asm.label("join")?.local(ILOAD, 1).op(IRETURN);
    let program = lift("(I)I", asm)?;

    let block = Relooper::new().reloop(&program)?;
    let multiple = block
        .descendants()
        .into_iter()
        .find(|b| b.kind() == "Multiple")
        .expect("dispatch over the cases");
    let Block::Multiple { handlers, .. } = multiple else {
        unreachable!();
    };
    assert_eq!(handlers.len(), 3);
    assert_eq!(count(&block, "Loop"), 0);
    assert_labels_match(&block);
    Ok(())
}
