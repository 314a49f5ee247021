//! Double dispatch over compiled methods.
//!
//! Every `visit_*` method defaults to the matching `walk_*` function, which visits the
//! children of the node. Overriding a method and calling the walker from it keeps the
//! traversal going; not calling it prunes the subtree.

use crate::{
    bytecode::{Address, ArithmeticOp, ArrayKind, CompareOp, Condition, ConvertTarget, NumericKind},
    classfile::{FieldType, MethodSignature},
    compiler::CompiledMethod,
    relooper::{Block, Label},
    ssa::{
        Constant, Expression, ExpressionList, FieldReference, InvocationKind, MethodReference,
        Program, Value, ValueId, Variable,
    },
};

/// Callbacks for every block kind, statement and value of a [`CompiledMethod`].
///
/// Children are visited left to right: operands in evaluation order, statements in list
/// order and blocks along their `next` chain. Variables are leaves; their incoming flows
/// are not followed.
///
/// # Example
///
/// ```rust,ignore
/// use classscope::{codegen::Visitor, ssa::{Program, ValueId, InvocationKind, MethodReference}};
///
/// #[derive(Default)]
/// struct CallCounter(usize);
///
/// impl Visitor for CallCounter {
///     fn visit_invoke(
///         &mut self,
///         program: &Program,
///         id: ValueId,
///         kind: InvocationKind,
///         method: &MethodReference,
///         target: Option<ValueId>,
///         arguments: &[ValueId],
///     ) {
///         self.0 += 1;
///         classscope::codegen::walk_invoke(self, program, target, arguments);
///     }
/// }
/// ```
pub trait Visitor {
    /// Entry point: the method body followed by its exception handlers.
    fn visit_method(&mut self, method: &CompiledMethod) {
        walk_method(self, method);
    }

    /// Runs an exception handler starting at `address`.
    ///
    /// A handler that leads back into code of the body ends with a `Continue` of the
    /// body's outermost loop, with the label set to where the body resumes. See
    /// [`CompiledMethod::entry_label`].
    fn visit_exception_handler(&mut self, program: &Program, address: Address, handler: &Block) {
        let _ = address;
        self.visit_blocks(program, handler);
    }

    /// A block followed by its `next` chain.
    fn visit_blocks(&mut self, program: &Program, first: &Block) {
        walk_blocks(self, program, first);
    }

    /// One block without its `next`.
    fn visit_block(&mut self, program: &Program, block: &Block) {
        walk_block(self, program, block);
    }

    /// A [`Block::Simple`].
    fn visit_simple(&mut self, program: &Program, block: &Block, body: &ExpressionList) {
        let _ = block;
        self.visit_expression_list(program, body);
    }

    /// A [`Block::Loop`].
    fn visit_loop(&mut self, program: &Program, block: &Block, inner: &Block) {
        let _ = block;
        self.visit_blocks(program, inner);
    }

    /// A [`Block::Multiple`].
    fn visit_multiple(&mut self, program: &Program, block: &Block, handlers: &[(Address, Block)]) {
        let _ = block;
        for (key, handler) in handlers {
            self.visit_handler(program, *key, handler);
        }
    }

    /// One arm of a [`Block::Multiple`], selected when the label variable equals `key`.
    fn visit_handler(&mut self, program: &Program, key: Address, handler: &Block) {
        let _ = key;
        self.visit_blocks(program, handler);
    }

    /// A statement list.
    fn visit_expression_list(&mut self, program: &Program, list: &ExpressionList) {
        for expression in list {
            self.visit_expression(program, expression);
        }
    }

    /// Dispatches one statement to its variant method.
    fn visit_expression(&mut self, program: &Program, expression: &Expression) {
        walk_expression(self, program, expression);
    }

    /// `variable := value`
    fn visit_variable_assignment(&mut self, program: &Program, variable: ValueId, value: ValueId) {
        let _ = variable;
        self.visit_value(program, value);
    }

    /// `return`
    fn visit_return(&mut self, program: &Program) {
        let _ = program;
    }

    /// `return value`
    fn visit_return_value(&mut self, program: &Program, value: ValueId) {
        self.visit_value(program, value);
    }

    /// `throw value`
    fn visit_throw(&mut self, program: &Program, value: ValueId) {
        self.visit_value(program, value);
    }

    /// A jump the relooper did not rewrite.
    fn visit_goto(&mut self, program: &Program, target: Address) {
        let _ = (program, target);
    }

    /// Conditional statement list.
    fn visit_if(&mut self, program: &Program, condition: ValueId, then: &ExpressionList) {
        self.visit_value(program, condition);
        self.visit_expression_list(program, then);
    }

    /// Dense switch.
    fn visit_table_switch(
        &mut self,
        program: &Program,
        value: ValueId,
        low: i32,
        high: i32,
        default: &ExpressionList,
        cases: &[ExpressionList],
    ) {
        let _ = (low, high);
        self.visit_value(program, value);
        for case in cases {
            self.visit_expression_list(program, case);
        }
        self.visit_expression_list(program, default);
    }

    /// Sparse switch.
    fn visit_lookup_switch(
        &mut self,
        program: &Program,
        value: ValueId,
        default: &ExpressionList,
        cases: &[(i32, ExpressionList)],
    ) {
        self.visit_value(program, value);
        for (_, case) in cases {
            self.visit_expression_list(program, case);
        }
        self.visit_expression_list(program, default);
    }

    /// `target.field = value`
    fn visit_put_field(
        &mut self,
        program: &Program,
        field: &FieldReference,
        target: ValueId,
        value: ValueId,
    ) {
        let _ = field;
        self.visit_value(program, target);
        self.visit_value(program, value);
    }

    /// `Class.field = value`
    fn visit_put_static(&mut self, program: &Program, field: &FieldReference, value: ValueId) {
        let _ = field;
        self.visit_value(program, value);
    }

    /// `array[index] = value`
    fn visit_array_store(
        &mut self,
        program: &Program,
        kind: ArrayKind,
        array: ValueId,
        index: ValueId,
        value: ValueId,
    ) {
        let _ = kind;
        self.visit_value(program, array);
        self.visit_value(program, index);
        self.visit_value(program, value);
    }

    /// A call used as a statement.
    fn visit_invoke_statement(&mut self, program: &Program, call: ValueId) {
        self.visit_value(program, call);
    }

    /// Type check that throws on failure.
    fn visit_check_cast(&mut self, program: &Program, value: ValueId, class: &FieldType) {
        let _ = class;
        self.visit_value(program, value);
    }

    /// `monitorenter`
    fn visit_monitor_enter(&mut self, program: &Program, value: ValueId) {
        self.visit_value(program, value);
    }

    /// `monitorexit`
    fn visit_monitor_exit(&mut self, program: &Program, value: ValueId) {
        self.visit_value(program, value);
    }

    /// Free text.
    fn visit_comment(&mut self, program: &Program, text: &str) {
        let _ = (program, text);
    }

    /// Leaves block `label`.
    fn visit_break(
        &mut self,
        program: &Program,
        label: Label,
        target: Address,
        silent: bool,
        set_label: bool,
    ) {
        let _ = (program, label, target, silent, set_label);
    }

    /// Restarts loop `label`.
    fn visit_continue(&mut self, program: &Program, label: Label, target: Address, set_label: bool) {
        let _ = (program, label, target, set_label);
    }

    /// Dispatches one value to its kind method.
    fn visit_value(&mut self, program: &Program, id: ValueId) {
        walk_value(self, program, id);
    }

    /// A literal.
    fn visit_constant(&mut self, program: &Program, id: ValueId, constant: &Constant) {
        let _ = (program, id, constant);
    }

    /// The receiver.
    fn visit_this(&mut self, program: &Program, id: ValueId) {
        let _ = (program, id);
    }

    /// A method parameter, numbered without `this`.
    fn visit_parameter(&mut self, program: &Program, id: ValueId, index: u16) {
        let _ = (program, id, index);
    }

    /// The exception caught by the running handler.
    fn visit_current_exception(&mut self, program: &Program, id: ValueId) {
        let _ = (program, id);
    }

    /// A named variable.
    fn visit_variable(&mut self, program: &Program, id: ValueId, variable: &Variable) {
        let _ = (program, id, variable);
    }

    /// Arithmetic or bitwise operation.
    fn visit_binary(
        &mut self,
        program: &Program,
        id: ValueId,
        op: ArithmeticOp,
        kind: NumericKind,
        left: ValueId,
        right: ValueId,
    ) {
        let _ = (id, op, kind);
        walk_pair(self, program, left, right);
    }

    /// Arithmetic negation.
    fn visit_negate(&mut self, program: &Program, id: ValueId, kind: NumericKind, operand: ValueId) {
        let _ = (id, kind);
        self.visit_value(program, operand);
    }

    /// Three-way comparison.
    fn visit_compare(
        &mut self,
        program: &Program,
        id: ValueId,
        op: CompareOp,
        left: ValueId,
        right: ValueId,
    ) {
        let _ = (id, op);
        walk_pair(self, program, left, right);
    }

    /// Primitive conversion.
    fn visit_convert(
        &mut self,
        program: &Program,
        id: ValueId,
        from: NumericKind,
        to: ConvertTarget,
        operand: ValueId,
    ) {
        let _ = (id, from, to);
        self.visit_value(program, operand);
    }

    /// Boolean comparison of two values.
    fn visit_relation(
        &mut self,
        program: &Program,
        id: ValueId,
        condition: Condition,
        left: ValueId,
        right: ValueId,
    ) {
        let _ = (id, condition);
        walk_pair(self, program, left, right);
    }

    /// Null check.
    fn visit_null_test(&mut self, program: &Program, id: ValueId, operand: ValueId, is_null: bool) {
        let _ = (id, is_null);
        self.visit_value(program, operand);
    }

    /// Instance field read.
    fn visit_get_field(
        &mut self,
        program: &Program,
        id: ValueId,
        field: &FieldReference,
        target: ValueId,
    ) {
        let _ = (id, field);
        self.visit_value(program, target);
    }

    /// Static field read.
    fn visit_get_static(&mut self, program: &Program, id: ValueId, field: &FieldReference) {
        let _ = (program, id, field);
    }

    /// Array element read.
    fn visit_array_load(
        &mut self,
        program: &Program,
        id: ValueId,
        kind: ArrayKind,
        array: ValueId,
        index: ValueId,
    ) {
        let _ = (id, kind);
        walk_pair(self, program, array, index);
    }

    /// `array.length`
    fn visit_array_length(&mut self, program: &Program, id: ValueId, array: ValueId) {
        let _ = id;
        self.visit_value(program, array);
    }

    /// Allocation of an uninitialized instance.
    fn visit_new(&mut self, program: &Program, id: ValueId, class: &str) {
        let _ = (program, id, class);
    }

    /// One-dimensional array allocation.
    fn visit_new_array(
        &mut self,
        program: &Program,
        id: ValueId,
        element: &FieldType,
        length: ValueId,
    ) {
        let _ = (id, element);
        self.visit_value(program, length);
    }

    /// Multi-dimensional array allocation.
    fn visit_multi_new_array(
        &mut self,
        program: &Program,
        id: ValueId,
        array_type: &FieldType,
        dimensions: &[ValueId],
    ) {
        let _ = (id, array_type);
        walk_all(self, program, dimensions);
    }

    /// Type test.
    fn visit_instance_of(
        &mut self,
        program: &Program,
        id: ValueId,
        operand: ValueId,
        class: &FieldType,
    ) {
        let _ = (id, class);
        self.visit_value(program, operand);
    }

    /// Method call.
    fn visit_invoke(
        &mut self,
        program: &Program,
        id: ValueId,
        kind: InvocationKind,
        method: &MethodReference,
        target: Option<ValueId>,
        arguments: &[ValueId],
    ) {
        let _ = (id, kind, method);
        walk_invoke(self, program, target, arguments);
    }

    /// Call site linked by a bootstrap method.
    fn visit_invoke_dynamic(
        &mut self,
        program: &Program,
        id: ValueId,
        bootstrap: &MethodReference,
        name: &str,
        signature: &MethodSignature,
        arguments: &[ValueId],
    ) {
        let _ = (id, bootstrap, name, signature);
        walk_all(self, program, arguments);
    }
}

/// Visits the body chain, then every exception handler in address order.
pub fn walk_method<V: Visitor + ?Sized>(visitor: &mut V, method: &CompiledMethod) {
    if let Some(body) = &method.body {
        visitor.visit_blocks(&method.program, body);
    }
    for (address, handler) in &method.handlers {
        visitor.visit_exception_handler(&method.program, *address, handler);
    }
}

/// Visits `first` and every block on its `next` chain.
pub fn walk_blocks<V: Visitor + ?Sized>(visitor: &mut V, program: &Program, first: &Block) {
    for block in first.chain() {
        visitor.visit_block(program, block);
    }
}

/// Dispatches on the block variant.
pub fn walk_block<V: Visitor + ?Sized>(visitor: &mut V, program: &Program, block: &Block) {
    match block {
        Block::Simple { body, .. } => visitor.visit_simple(program, block, body),
        Block::Loop { inner, .. } => visitor.visit_loop(program, block, inner),
        Block::Multiple { handlers, .. } => visitor.visit_multiple(program, block, handlers),
    }
}

/// Dispatches on the statement variant.
pub fn walk_expression<V: Visitor + ?Sized>(
    visitor: &mut V,
    program: &Program,
    expression: &Expression,
) {
    match expression {
        Expression::VariableAssignment { variable, value } => {
            visitor.visit_variable_assignment(program, *variable, *value);
        }
        Expression::Return => visitor.visit_return(program),
        Expression::ReturnValue(value) => visitor.visit_return_value(program, *value),
        Expression::Throw(value) => visitor.visit_throw(program, *value),
        Expression::Goto(target) => visitor.visit_goto(program, *target),
        Expression::If { condition, then } => visitor.visit_if(program, *condition, then),
        Expression::TableSwitch {
            value,
            low,
            high,
            default,
            cases,
        } => visitor.visit_table_switch(program, *value, *low, *high, default, cases),
        Expression::LookupSwitch {
            value,
            default,
            cases,
        } => visitor.visit_lookup_switch(program, *value, default, cases),
        Expression::PutField {
            field,
            target,
            value,
        } => visitor.visit_put_field(program, field, *target, *value),
        Expression::PutStatic { field, value } => visitor.visit_put_static(program, field, *value),
        Expression::ArrayStore {
            kind,
            array,
            index,
            value,
        } => visitor.visit_array_store(program, *kind, *array, *index, *value),
        Expression::Invoke(call) => visitor.visit_invoke_statement(program, *call),
        Expression::CheckCast { value, class } => visitor.visit_check_cast(program, *value, class),
        Expression::MonitorEnter(value) => visitor.visit_monitor_enter(program, *value),
        Expression::MonitorExit(value) => visitor.visit_monitor_exit(program, *value),
        Expression::Comment(text) => visitor.visit_comment(program, text),
        Expression::Break {
            label,
            target,
            silent,
            set_label,
        } => visitor.visit_break(program, *label, *target, *silent, *set_label),
        Expression::Continue {
            label,
            target,
            set_label,
        } => visitor.visit_continue(program, *label, *target, *set_label),
    }
}

/// Dispatches on the value kind. Identifiers outside the arena are ignored.
pub fn walk_value<V: Visitor + ?Sized>(visitor: &mut V, program: &Program, id: ValueId) {
    let Some(value) = program.values().get(id) else {
        return;
    };
    match value {
        Value::Constant(constant) => visitor.visit_constant(program, id, constant),
        Value::This => visitor.visit_this(program, id),
        Value::Parameter(index) => visitor.visit_parameter(program, id, *index),
        Value::CurrentException => visitor.visit_current_exception(program, id),
        Value::Variable(variable) => visitor.visit_variable(program, id, variable),
        Value::Binary {
            op,
            kind,
            left,
            right,
        } => visitor.visit_binary(program, id, *op, *kind, *left, *right),
        Value::Negate { kind, operand } => visitor.visit_negate(program, id, *kind, *operand),
        Value::Compare { op, left, right } => {
            visitor.visit_compare(program, id, *op, *left, *right);
        }
        Value::Convert { from, to, operand } => {
            visitor.visit_convert(program, id, *from, *to, *operand);
        }
        Value::Relation {
            condition,
            left,
            right,
        } => visitor.visit_relation(program, id, *condition, *left, *right),
        Value::NullTest { operand, is_null } => {
            visitor.visit_null_test(program, id, *operand, *is_null);
        }
        Value::GetField { field, target } => visitor.visit_get_field(program, id, field, *target),
        Value::GetStatic(field) => visitor.visit_get_static(program, id, field),
        Value::ArrayLoad { kind, array, index } => {
            visitor.visit_array_load(program, id, *kind, *array, *index);
        }
        Value::ArrayLength(array) => visitor.visit_array_length(program, id, *array),
        Value::New(class) => visitor.visit_new(program, id, class),
        Value::NewArray { element, length } => {
            visitor.visit_new_array(program, id, element, *length);
        }
        Value::MultiNewArray {
            array_type,
            dimensions,
        } => visitor.visit_multi_new_array(program, id, array_type, dimensions),
        Value::InstanceOf { operand, class } => {
            visitor.visit_instance_of(program, id, *operand, class);
        }
        Value::Invoke {
            kind,
            method,
            target,
            arguments,
        } => visitor.visit_invoke(program, id, *kind, method, *target, arguments),
        Value::InvokeDynamic {
            bootstrap,
            name,
            signature,
            arguments,
        } => visitor.visit_invoke_dynamic(program, id, bootstrap, name, signature, arguments),
    }
}

/// Visits two operands, left first.
pub fn walk_pair<V: Visitor + ?Sized>(
    visitor: &mut V,
    program: &Program,
    left: ValueId,
    right: ValueId,
) {
    visitor.visit_value(program, left);
    visitor.visit_value(program, right);
}

/// Visits operands in order.
pub fn walk_all<V: Visitor + ?Sized>(visitor: &mut V, program: &Program, values: &[ValueId]) {
    for value in values {
        visitor.visit_value(program, *value);
    }
}

/// Visits the receiver, if any, then the arguments.
pub fn walk_invoke<V: Visitor + ?Sized>(
    visitor: &mut V,
    program: &Program,
    target: Option<ValueId>,
    arguments: &[ValueId],
) {
    if let Some(target) = target {
        visitor.visit_value(program, target);
    }
    walk_all(visitor, program, arguments);
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

    /// Records the order in which leaves and operators are seen.
    #[derive(Default)]
    struct Trace(Vec<String>);

    impl Visitor for Trace {
        fn visit_parameter(&mut self, _program: &Program, _id: ValueId, index: u16) {
            self.0.push(format!("p{index}"));
        }

        fn visit_variable(&mut self, _program: &Program, _id: ValueId, variable: &Variable) {
            self.0.push(variable.name.clone());
        }

        fn visit_constant(&mut self, _program: &Program, _id: ValueId, constant: &Constant) {
            self.0.push(constant.to_string());
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
            self.0.push(op.symbol().to_string());
        }

        fn visit_return_value(&mut self, program: &Program, value: ValueId) {
            self.visit_value(program, value);
            self.0.push("return".to_string());
        }
    }

    fn compile(asm: CodeAssembler, descriptor: &str, max_locals: u16) -> CompiledMethod {
        let mut writer = ClassWriter::new("demo/Visit");
        writer.add_method(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            "m",
            descriptor,
            Some(CodeAttribute::new(4, max_locals, asm.finish().unwrap())),
        );
        let class = writer.build().unwrap();
        let method = class.method("m", descriptor).unwrap();
        let options = CompilerOptions {
            optimize: true,
            ..CompilerOptions::default()
        };
        Compiler::new(&PermissiveLinker, options)
            .compile_method(&class, method)
            .unwrap()
    }

    #[test]
    fn test_operands_left_to_right() {
        // return (a - b) * 3
        let mut asm = CodeAssembler::new();
        asm.local(ILOAD, 0)
            .local(ILOAD, 1)
            .op(ISUB)
            .push_int(3)
            .op(IMUL)
            .op(IRETURN);
        let method = compile(asm, "(II)I", 2);

        let mut trace = Trace::default();
        trace.visit_method(&method);
        assert_eq!(trace.0, vec!["arg0", "arg1", "-", "3", "*", "return"]);
    }

    #[test]
    fn test_blocks_visited_along_chain() {
        #[derive(Default)]
        struct Kinds(Vec<&'static str>);

        impl Visitor for Kinds {
            fn visit_block(&mut self, program: &Program, block: &Block) {
                self.0.push(block.kind());
                walk_block(self, program, block);
            }
        }

        // if (a == 0) a = 1; return a;
        let mut asm = CodeAssembler::new();
        asm.local(ILOAD, 0)
            .branch(IFNE, "join")
            .push_int(1)
            .local(ISTORE, 0);
        asm.label("join").unwrap().local(ILOAD, 0).op(IRETURN);
        let method = compile(asm, "(I)I", 1);

        let mut kinds = Kinds::default();
        kinds.visit_method(&method);
        assert_eq!(kinds.0.first(), Some(&"Simple"));
        assert!(kinds.0.len() >= 3);
        assert_eq!(kinds.0.iter().filter(|kind| **kind == "Loop").count(), 0);
    }
}
