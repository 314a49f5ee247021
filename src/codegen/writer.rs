//! C-like rendering of compiled methods.

use std::fmt::Write as _;

use crate::{
    bytecode::{Address, ArithmeticOp, ArrayKind, CompareOp, Condition, ConvertTarget, NumericKind},
    classfile::{FieldType, MethodSignature},
    codegen::visitor::{walk_all, walk_invoke, walk_pair, Visitor},
    compiler::CompiledMethod,
    relooper::{Block, Label},
    ssa::{
        Constant, ExpressionList, FieldReference, InvocationKind, MethodReference, Program,
        ValueId, Variable,
    },
};

const INDENT: &str = "    ";

/// Renders a [`CompiledMethod`] as indented pseudo code.
///
/// Values are rendered bottom-up: every value visit pushes its text onto an operand
/// stack and composite values pop the text of their operands. Statements write whole
/// lines. Blocks that a jump names get a label; a `Multiple` dispatches on the implicit
/// `label` variable.
///
/// # Example
///
/// ```rust,ignore
/// use classscope::codegen::PseudoCodeWriter;
///
/// let compiled = compiler.compile_method(&class, method)?;
/// println!("{}", PseudoCodeWriter::render(&compiled));
/// ```
#[derive(Debug, Default)]
pub struct PseudoCodeWriter {
    out: String,
    depth: usize,
    operands: Vec<String>,
}

impl PseudoCodeWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        PseudoCodeWriter::default()
    }

    /// Renders one method.
    #[must_use]
    pub fn render(method: &CompiledMethod) -> String {
        let mut writer = PseudoCodeWriter::new();
        writer.visit_method(method);
        writer.finish()
    }

    /// Returns the text written so far.
    #[must_use]
    pub fn finish(self) -> String {
        self.out
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn open(&mut self, text: &str) {
        self.line(text);
        self.depth += 1;
    }

    fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }

    fn operand(&mut self) -> String {
        self.operands.pop().unwrap_or_else(|| "?".to_string())
    }

    /// Renders a value to text without emitting anything.
    fn text(&mut self, program: &Program, value: ValueId) -> String {
        self.visit_value(program, value);
        self.operand()
    }

    /// Pops `count` operands, restoring their evaluation order.
    fn operand_list(&mut self, count: usize) -> Vec<String> {
        let mut list: Vec<String> = (0..count).map(|_| self.operand()).collect();
        list.reverse();
        list
    }

    fn block_header(block: &Block, text: &str) -> String {
        if block.label_required() {
            format!("{}: {}", block.label(), text)
        } else {
            text.to_string()
        }
    }
}

impl Visitor for PseudoCodeWriter {
    fn visit_method(&mut self, method: &CompiledMethod) {
        self.open(&format!("{} {{", method.name));
        if let Some(entry) = method.entry_label() {
            self.line(&format!("label = {entry};"));
        }
        if let Some(body) = &method.body {
            self.visit_blocks(&method.program, body);
        }
        for (address, handler) in &method.handlers {
            self.visit_exception_handler(&method.program, *address, handler);
        }
        self.close();
    }

    fn visit_exception_handler(&mut self, program: &Program, address: Address, handler: &Block) {
        self.open(&format!("catch @{address} {{"));
        self.visit_blocks(program, handler);
        self.close();
    }

    fn visit_simple(&mut self, program: &Program, block: &Block, body: &ExpressionList) {
        if block.label_required() {
            self.open(&Self::block_header(block, "{"));
            self.visit_expression_list(program, body);
            self.close();
        } else {
            self.visit_expression_list(program, body);
        }
    }

    fn visit_loop(&mut self, program: &Program, block: &Block, inner: &Block) {
        self.open(&Self::block_header(block, "for (;;) {"));
        self.visit_blocks(program, inner);
        self.close();
    }

    fn visit_multiple(&mut self, program: &Program, block: &Block, handlers: &[(Address, Block)]) {
        self.open(&Self::block_header(block, "switch (label) {"));
        for (key, handler) in handlers {
            self.visit_handler(program, *key, handler);
        }
        self.close();
    }

    fn visit_handler(&mut self, program: &Program, key: Address, handler: &Block) {
        self.open(&format!("case {key}: {{"));
        self.visit_blocks(program, handler);
        self.close();
    }

    fn visit_variable_assignment(&mut self, program: &Program, variable: ValueId, value: ValueId) {
        let name = self.text(program, variable);
        let value = self.text(program, value);
        self.line(&format!("{name} = {value};"));
    }

    fn visit_return(&mut self, _program: &Program) {
        self.line("return;");
    }

    fn visit_return_value(&mut self, program: &Program, value: ValueId) {
        let value = self.text(program, value);
        self.line(&format!("return {value};"));
    }

    fn visit_throw(&mut self, program: &Program, value: ValueId) {
        let value = self.text(program, value);
        self.line(&format!("throw {value};"));
    }

    fn visit_goto(&mut self, _program: &Program, target: Address) {
        self.line(&format!("goto @{target};"));
    }

    fn visit_if(&mut self, program: &Program, condition: ValueId, then: &ExpressionList) {
        let condition = self.text(program, condition);
        self.open(&format!("if {condition} {{"));
        self.visit_expression_list(program, then);
        self.close();
    }

    fn visit_table_switch(
        &mut self,
        program: &Program,
        value: ValueId,
        low: i32,
        _high: i32,
        default: &ExpressionList,
        cases: &[ExpressionList],
    ) {
        let value = self.text(program, value);
        self.open(&format!("switch ({value}) {{"));
        for (key, case) in (low..).zip(cases) {
            self.open(&format!("case {key}: {{"));
            self.visit_expression_list(program, case);
            self.close();
        }
        self.open("default: {");
        self.visit_expression_list(program, default);
        self.close();
        self.close();
    }

    fn visit_lookup_switch(
        &mut self,
        program: &Program,
        value: ValueId,
        default: &ExpressionList,
        cases: &[(i32, ExpressionList)],
    ) {
        let value = self.text(program, value);
        self.open(&format!("switch ({value}) {{"));
        for (key, case) in cases {
            self.open(&format!("case {key}: {{"));
            self.visit_expression_list(program, case);
            self.close();
        }
        self.open("default: {");
        self.visit_expression_list(program, default);
        self.close();
        self.close();
    }

    fn visit_put_field(
        &mut self,
        program: &Program,
        field: &FieldReference,
        target: ValueId,
        value: ValueId,
    ) {
        let target = self.text(program, target);
        let value = self.text(program, value);
        self.line(&format!("{target}.{} = {value};", field.name));
    }

    fn visit_put_static(&mut self, program: &Program, field: &FieldReference, value: ValueId) {
        let value = self.text(program, value);
        self.line(&format!("{}.{} = {value};", field.class, field.name));
    }

    fn visit_array_store(
        &mut self,
        program: &Program,
        _kind: ArrayKind,
        array: ValueId,
        index: ValueId,
        value: ValueId,
    ) {
        let array = self.text(program, array);
        let index = self.text(program, index);
        let value = self.text(program, value);
        self.line(&format!("{array}[{index}] = {value};"));
    }

    fn visit_invoke_statement(&mut self, program: &Program, call: ValueId) {
        let call = self.text(program, call);
        self.line(&format!("{call};"));
    }

    fn visit_check_cast(&mut self, program: &Program, value: ValueId, class: &FieldType) {
        let value = self.text(program, value);
        self.line(&format!("checkcast({value}, {class});"));
    }

    fn visit_monitor_enter(&mut self, program: &Program, value: ValueId) {
        let value = self.text(program, value);
        self.line(&format!("monitorenter({value});"));
    }

    fn visit_monitor_exit(&mut self, program: &Program, value: ValueId) {
        let value = self.text(program, value);
        self.line(&format!("monitorexit({value});"));
    }

    fn visit_comment(&mut self, _program: &Program, text: &str) {
        self.line(&format!("// {text}"));
    }

    fn visit_break(
        &mut self,
        _program: &Program,
        label: Label,
        target: Address,
        silent: bool,
        set_label: bool,
    ) {
        if set_label {
            self.line(&format!("label = {target};"));
        }
        if !silent {
            self.line(&format!("break {label};"));
        }
    }

    fn visit_continue(&mut self, _program: &Program, label: Label, target: Address, set_label: bool) {
        if set_label {
            self.line(&format!("label = {target};"));
        }
        self.line(&format!("continue {label};"));
    }

    fn visit_constant(&mut self, _program: &Program, _id: ValueId, constant: &Constant) {
        self.operands.push(constant.to_string());
    }

    fn visit_this(&mut self, _program: &Program, _id: ValueId) {
        self.operands.push("this".to_string());
    }

    fn visit_parameter(&mut self, _program: &Program, _id: ValueId, index: u16) {
        self.operands.push(format!("param{index}"));
    }

    fn visit_current_exception(&mut self, _program: &Program, _id: ValueId) {
        self.operands.push("exception".to_string());
    }

    fn visit_variable(&mut self, _program: &Program, _id: ValueId, variable: &Variable) {
        self.operands.push(variable.name.clone());
    }

    fn visit_binary(
        &mut self,
        program: &Program,
        _id: ValueId,
        op: ArithmeticOp,
        _kind: NumericKind,
        left: ValueId,
        right: ValueId,
    ) {
        walk_pair(self, program, left, right);
        let right = self.operand();
        let left = self.operand();
        self.operands.push(format!("({left} {} {right})", op.symbol()));
    }

    fn visit_negate(&mut self, program: &Program, _id: ValueId, _kind: NumericKind, operand: ValueId) {
        let operand = self.text(program, operand);
        self.operands.push(format!("(-{operand})"));
    }

    fn visit_compare(
        &mut self,
        program: &Program,
        _id: ValueId,
        op: CompareOp,
        left: ValueId,
        right: ValueId,
    ) {
        walk_pair(self, program, left, right);
        let right = self.operand();
        let left = self.operand();
        self.operands.push(format!("{op}({left}, {right})"));
    }

    fn visit_convert(
        &mut self,
        program: &Program,
        _id: ValueId,
        _from: NumericKind,
        to: ConvertTarget,
        operand: ValueId,
    ) {
        let operand = self.text(program, operand);
        self.operands.push(format!("(({to}) {operand})"));
    }

    fn visit_relation(
        &mut self,
        program: &Program,
        _id: ValueId,
        condition: Condition,
        left: ValueId,
        right: ValueId,
    ) {
        walk_pair(self, program, left, right);
        let right = self.operand();
        let left = self.operand();
        self.operands
            .push(format!("({left} {} {right})", condition.symbol()));
    }

    fn visit_null_test(&mut self, program: &Program, _id: ValueId, operand: ValueId, is_null: bool) {
        let operand = self.text(program, operand);
        let relation = if is_null { "==" } else { "!=" };
        self.operands.push(format!("({operand} {relation} null)"));
    }

    fn visit_get_field(
        &mut self,
        program: &Program,
        _id: ValueId,
        field: &FieldReference,
        target: ValueId,
    ) {
        let target = self.text(program, target);
        self.operands.push(format!("{target}.{}", field.name));
    }

    fn visit_get_static(&mut self, _program: &Program, _id: ValueId, field: &FieldReference) {
        self.operands.push(format!("{}.{}", field.class, field.name));
    }

    fn visit_array_load(
        &mut self,
        program: &Program,
        _id: ValueId,
        _kind: ArrayKind,
        array: ValueId,
        index: ValueId,
    ) {
        walk_pair(self, program, array, index);
        let index = self.operand();
        let array = self.operand();
        self.operands.push(format!("{array}[{index}]"));
    }

    fn visit_array_length(&mut self, program: &Program, _id: ValueId, array: ValueId) {
        let array = self.text(program, array);
        self.operands.push(format!("{array}.length"));
    }

    fn visit_new(&mut self, _program: &Program, _id: ValueId, class: &str) {
        self.operands.push(format!("new {class}"));
    }

    fn visit_new_array(
        &mut self,
        program: &Program,
        _id: ValueId,
        element: &FieldType,
        length: ValueId,
    ) {
        let length = self.text(program, length);
        self.operands.push(format!("new {element}[{length}]"));
    }

    fn visit_multi_new_array(
        &mut self,
        program: &Program,
        _id: ValueId,
        array_type: &FieldType,
        dimensions: &[ValueId],
    ) {
        walk_all(self, program, dimensions);
        let mut text = format!("new {array_type}");
        for dimension in self.operand_list(dimensions.len()) {
            let _ = write!(text, "[{dimension}]");
        }
        self.operands.push(text);
    }

    fn visit_instance_of(
        &mut self,
        program: &Program,
        _id: ValueId,
        operand: ValueId,
        class: &FieldType,
    ) {
        let operand = self.text(program, operand);
        self.operands.push(format!("({operand} instanceof {class})"));
    }

    fn visit_invoke(
        &mut self,
        program: &Program,
        _id: ValueId,
        kind: InvocationKind,
        method: &MethodReference,
        target: Option<ValueId>,
        arguments: &[ValueId],
    ) {
        walk_invoke(self, program, target, arguments);
        let arguments = self.operand_list(arguments.len()).join(", ");
        let receiver = match target {
            Some(_) => self.operand(),
            None => method.class.clone(),
        };
        let text = match kind {
            InvocationKind::Direct => format!("{receiver}.<{}>({arguments})", method.name),
            _ => format!("{receiver}.{}({arguments})", method.name),
        };
        self.operands.push(text);
    }

    fn visit_invoke_dynamic(
        &mut self,
        program: &Program,
        _id: ValueId,
        bootstrap: &MethodReference,
        name: &str,
        _signature: &MethodSignature,
        arguments: &[ValueId],
    ) {
        walk_all(self, program, arguments);
        let arguments = self.operand_list(arguments.len()).join(", ");
        self.operands.push(format!(
            "indy[{}.{}] {name}({arguments})",
            bootstrap.class, bootstrap.name
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::{opcodes::*, CodeAssembler},
        classfile::{ClassWriter, CodeAttribute, MethodAccessFlags},
        compiler::{Compiler, CompilerOptions},
        linker::PermissiveLinker,
    };

    fn render(descriptor: &str, asm: CodeAssembler, optimize: bool) -> String {
        let mut writer = ClassWriter::new("demo/Text");
        writer.add_method(
            MethodAccessFlags::STATIC,
            "m",
            descriptor,
            Some(CodeAttribute::new(4, 4, asm.finish().unwrap())),
        );
        let class = writer.build().unwrap();
        let options = CompilerOptions {
            optimize,
            ..CompilerOptions::default()
        };
        let compiled = Compiler::new(&PermissiveLinker, options)
            .compile_method(&class, &class.methods[0])
            .unwrap();
        PseudoCodeWriter::render(&compiled)
    }

    #[test]
    fn test_render_expression() {
        let mut asm = CodeAssembler::new();
        asm.local(ILOAD, 0).local(ILOAD, 1).op(IADD).op(IRETURN);
        let text = render("(II)I", asm, true);
        assert!(text.starts_with("m(II)I {\n"), "{text}");
        assert!(text.contains("return (arg0 + arg1);"), "{text}");
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn test_render_loop() {
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
        let text = render("()V", asm, false);

        assert!(text.contains(": for (;;) {"), "{text}");
        assert!(text.contains("continue L"), "{text}");
        assert!(text.contains("break L"), "{text}");
        assert!(text.contains("return;"), "{text}");
    }

    #[test]
    fn test_unlabeled_simple_has_no_braces() {
        let mut asm = CodeAssembler::new();
        asm.op(RETURN);
        let text = render("()V", asm, false);
        assert_eq!(text, "m()V {\n    return;\n}\n");
    }
}
