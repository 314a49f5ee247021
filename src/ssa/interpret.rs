//! Abstract interpretation of single instructions.
//!
//! Each instruction pops its operands from the abstract stack, creates at most one
//! [`Value`] and binds it to a fresh variable whose assignment is appended to the
//! node. Constants and local loads are pushed without a variable. Instructions without
//! a result append a statement instead.

use crate::{
    bytecode::{
        Address, ArithmeticOp, Condition, Instruction, InstructionKind, InvokeKind, NumericKind,
    },
    classfile::{ConstantPoolEntry, FieldType, MemberKind, MethodSignature, ReferenceKind},
    ssa::{
        builder::SsaBuilder, state::ParsingState, Constant, Expression, ExpressionList,
        FieldReference, InvocationKind, MethodReference, TypeRef, Value, ValueId,
    },
    utils::graph::NodeId,
    Error, Result,
};

impl SsaBuilder<'_> {
    /// Interprets `instruction` in `node`, updating `state`.
    pub(super) fn step(
        &mut self,
        node: NodeId,
        state: &mut ParsingState,
        instruction: &Instruction,
    ) -> Result<()> {
        match &instruction.kind {
            InstructionKind::Nop => {}
            InstructionKind::ConstNull => self.push_constant(state, Constant::Null),
            InstructionKind::ConstInt(value) => self.push_constant(state, Constant::Int(*value)),
            InstructionKind::ConstLong(value) => {
                self.push_constant(state, Constant::Long(*value));
            }
            InstructionKind::ConstFloat(value) => {
                self.push_constant(state, Constant::Float(*value));
            }
            InstructionKind::ConstDouble(value) => {
                self.push_constant(state, Constant::Double(*value));
            }
            InstructionKind::LoadConstant(index) => {
                let constant = self.loadable_constant(*index)?;
                self.push_constant(state, constant);
            }

            InstructionKind::Load { slot, .. } => {
                let value = self.load_local(node, state, *slot)?;
                state.stack.push(value);
            }
            InstructionKind::Store { kind, slot } => {
                let mut value = self.pop(state)?;
                if !self.program.values.is_variable(value) {
                    let ty = self.program.values.type_of(value);
                    value = self.bind(node, ty, value);
                }
                state.locals.insert(*slot, value);
                if kind.slot_size() == 2 {
                    state.locals.remove(&slot.saturating_add(1));
                }
            }
            InstructionKind::Increment { slot, delta } => {
                let local = self.load_local(node, state, *slot)?;
                let delta = self.program.values.constant(Constant::Int(i32::from(*delta)));
                let sum = self.program.values.push(Value::Binary {
                    op: ArithmeticOp::Add,
                    kind: NumericKind::Int,
                    left: local,
                    right: delta,
                });
                let variable = self.bind(node, TypeRef::Int, sum);
                state.locals.insert(*slot, variable);
            }

            InstructionKind::ArrayLoad(kind) => {
                let index = self.pop(state)?;
                let array = self.pop(state)?;
                self.compute(
                    node,
                    state,
                    Value::ArrayLoad {
                        kind: *kind,
                        array,
                        index,
                    },
                );
            }
            InstructionKind::ArrayStore(kind) => {
                let value = self.pop(state)?;
                let index = self.pop(state)?;
                let array = self.pop(state)?;
                self.emit(
                    node,
                    Expression::ArrayStore {
                        kind: *kind,
                        array,
                        index,
                        value,
                    },
                );
            }

            InstructionKind::Pop => {
                self.pop(state)?;
            }
            InstructionKind::Pop2 => {
                let top = self.pop(state)?;
                if !self.is_wide(top) {
                    self.pop(state)?;
                }
            }
            InstructionKind::Dup => {
                let top = self.peek(state)?;
                state.stack.push(top);
            }
            InstructionKind::DupX1 => {
                let v1 = self.pop(state)?;
                let v2 = self.pop(state)?;
                state.stack.extend([v1, v2, v1]);
            }
            InstructionKind::DupX2 => {
                let v1 = self.pop(state)?;
                let v2 = self.pop(state)?;
                if self.is_wide(v2) {
                    state.stack.extend([v1, v2, v1]);
                } else {
                    let v3 = self.pop(state)?;
                    state.stack.extend([v1, v3, v2, v1]);
                }
            }
            InstructionKind::Dup2 => {
                let v1 = self.pop(state)?;
                if self.is_wide(v1) {
                    state.stack.extend([v1, v1]);
                } else {
                    let v2 = self.pop(state)?;
                    state.stack.extend([v2, v1, v2, v1]);
                }
            }
            InstructionKind::Dup2X1 => {
                let v1 = self.pop(state)?;
                if self.is_wide(v1) {
                    let v2 = self.pop(state)?;
                    state.stack.extend([v1, v2, v1]);
                } else {
                    let v2 = self.pop(state)?;
                    let v3 = self.pop(state)?;
                    state.stack.extend([v2, v1, v3, v2, v1]);
                }
            }
            InstructionKind::Dup2X2 => self.dup2_x2(state)?,
            InstructionKind::Swap => {
                let v1 = self.pop(state)?;
                let v2 = self.pop(state)?;
                state.stack.extend([v1, v2]);
            }

            InstructionKind::Arithmetic { op, kind } => {
                let right = self.pop(state)?;
                let left = self.pop(state)?;
                self.compute(
                    node,
                    state,
                    Value::Binary {
                        op: *op,
                        kind: *kind,
                        left,
                        right,
                    },
                );
            }
            InstructionKind::Negate(kind) => {
                let operand = self.pop(state)?;
                self.compute(node, state, Value::Negate { kind: *kind, operand });
            }
            InstructionKind::Convert { from, to } => {
                let operand = self.pop(state)?;
                self.compute(
                    node,
                    state,
                    Value::Convert {
                        from: *from,
                        to: *to,
                        operand,
                    },
                );
            }
            InstructionKind::Compare(op) => {
                let right = self.pop(state)?;
                let left = self.pop(state)?;
                self.compute(node, state, Value::Compare { op: *op, left, right });
            }

            InstructionKind::IfZero { condition, target } => {
                let left = self.pop(state)?;
                let right = self.program.values.constant(Constant::Int(0));
                self.branch(node, *condition, left, right, *target);
            }
            InstructionKind::IfIntCompare { condition, target }
            | InstructionKind::IfRefCompare { condition, target } => {
                let right = self.pop(state)?;
                let left = self.pop(state)?;
                self.branch(node, *condition, left, right, *target);
            }
            InstructionKind::IfNull(target) | InstructionKind::IfNonNull(target) => {
                let operand = self.pop(state)?;
                let is_null = matches!(instruction.kind, InstructionKind::IfNull(_));
                let condition = self
                    .program
                    .values
                    .push(Value::NullTest { operand, is_null });
                self.emit(
                    node,
                    Expression::If {
                        condition,
                        then: ExpressionList::goto(*target),
                    },
                );
            }
            InstructionKind::Goto(target) => self.emit(node, Expression::Goto(*target)),
            InstructionKind::Jsr(_) | InstructionKind::Ret(_) => {
                return Err(unsupported_error!(
                    self.here(),
                    "Subroutine instruction '{}' is not supported",
                    instruction.mnemonic()
                ));
            }
            InstructionKind::TableSwitch {
                default,
                low,
                high,
                targets,
            } => {
                let value = self.pop(state)?;
                self.emit(
                    node,
                    Expression::TableSwitch {
                        value,
                        low: *low,
                        high: *high,
                        default: ExpressionList::goto(*default),
                        cases: targets.iter().copied().map(ExpressionList::goto).collect(),
                    },
                );
            }
            InstructionKind::LookupSwitch { default, pairs } => {
                let value = self.pop(state)?;
                self.emit(
                    node,
                    Expression::LookupSwitch {
                        value,
                        default: ExpressionList::goto(*default),
                        cases: pairs
                            .iter()
                            .map(|&(key, target)| (key, ExpressionList::goto(target)))
                            .collect(),
                    },
                );
            }
            InstructionKind::Return(None) => self.emit(node, Expression::Return),
            InstructionKind::Return(Some(_)) => {
                let value = self.pop(state)?;
                self.emit(node, Expression::ReturnValue(value));
            }
            InstructionKind::Throw => {
                let value = self.pop(state)?;
                self.emit(node, Expression::Throw(value));
            }

            InstructionKind::GetStatic(index) => {
                let field = self.field_reference(*index)?;
                self.compute(node, state, Value::GetStatic(field));
            }
            InstructionKind::PutStatic(index) => {
                let field = self.field_reference(*index)?;
                let value = self.pop(state)?;
                self.emit(node, Expression::PutStatic { field, value });
            }
            InstructionKind::GetField(index) => {
                let field = self.field_reference(*index)?;
                let target = self.pop(state)?;
                self.compute(node, state, Value::GetField { field, target });
            }
            InstructionKind::PutField(index) => {
                let field = self.field_reference(*index)?;
                let value = self.pop(state)?;
                let target = self.pop(state)?;
                self.emit(
                    node,
                    Expression::PutField {
                        field,
                        target,
                        value,
                    },
                );
            }

            InstructionKind::Invoke {
                kind: InvokeKind::Dynamic,
                index,
            } => self.invoke_dynamic(node, state, *index)?,
            InstructionKind::Invoke { kind, index } => self.invoke(node, state, *kind, *index)?,

            InstructionKind::New(index) => {
                let class = self.class.pool.class_name(*index)?.to_string();
                self.require_class(&class)?;
                self.compute(node, state, Value::New(class));
            }
            InstructionKind::NewArray(kind) => {
                let element = kind.element_type().ok_or_else(|| {
                    malformed_error!("newarray with reference element type at {}", self.address)
                })?;
                let length = self.pop(state)?;
                self.compute(node, state, Value::NewArray { element, length });
            }
            InstructionKind::NewObjectArray(index) => {
                let element = self.class_type(*index)?;
                let length = self.pop(state)?;
                self.compute(node, state, Value::NewArray { element, length });
            }
            InstructionKind::MultiNewArray { index, dimensions } => {
                let array_type = self.class_type(*index)?;
                let mut sizes = Vec::with_capacity(usize::from(*dimensions));
                for _ in 0..*dimensions {
                    sizes.push(self.pop(state)?);
                }
                sizes.reverse();
                self.compute(
                    node,
                    state,
                    Value::MultiNewArray {
                        array_type,
                        dimensions: sizes,
                    },
                );
            }
            InstructionKind::ArrayLength => {
                let array = self.pop(state)?;
                self.compute(node, state, Value::ArrayLength(array));
            }
            InstructionKind::CheckCast(index) => {
                let class = self.class_type(*index)?;
                let value = self.peek(state)?;
                self.emit(node, Expression::CheckCast { value, class });
            }
            InstructionKind::InstanceOf(index) => {
                let class = self.class_type(*index)?;
                let operand = self.pop(state)?;
                self.compute(node, state, Value::InstanceOf { operand, class });
            }
            InstructionKind::MonitorEnter => {
                let value = self.pop(state)?;
                self.emit(node, Expression::MonitorEnter(value));
            }
            InstructionKind::MonitorExit => {
                let value = self.pop(state)?;
                self.emit(node, Expression::MonitorExit(value));
            }
        }
        Ok(())
    }

    fn pop(&self, state: &mut ParsingState) -> Result<ValueId> {
        state
            .stack
            .pop()
            .ok_or_else(|| consistency_error!(self.here(), "Operand stack underflow"))
    }

    fn peek(&self, state: &ParsingState) -> Result<ValueId> {
        state
            .stack
            .last()
            .copied()
            .ok_or_else(|| consistency_error!(self.here(), "Operand stack underflow"))
    }

    fn is_wide(&self, value: ValueId) -> bool {
        self.program.values.type_of(value).is_wide()
    }

    fn push_constant(&mut self, state: &mut ParsingState, constant: Constant) {
        let value = self.program.values.constant(constant);
        state.stack.push(value);
    }

    /// Adds `value`, binds it to a variable and pushes the variable.
    fn compute(&mut self, node: NodeId, state: &mut ParsingState, value: Value) {
        let value = self.program.values.push(value);
        let ty = self.program.values.type_of(value);
        let variable = self.bind(node, ty, value);
        state.stack.push(variable);
    }

    fn branch(
        &mut self,
        node: NodeId,
        condition: Condition,
        left: ValueId,
        right: ValueId,
        target: Address,
    ) {
        let condition = self.program.values.push(Value::Relation {
            condition,
            left,
            right,
        });
        self.emit(
            node,
            Expression::If {
                condition,
                then: ExpressionList::goto(target),
            },
        );
    }

    fn dup2_x2(&self, state: &mut ParsingState) -> Result<()> {
        let v1 = self.pop(state)?;
        let v2 = self.pop(state)?;
        match (self.is_wide(v1), self.is_wide(v2)) {
            (true, true) => state.stack.extend([v1, v2, v1]),
            (true, false) => {
                let v3 = self.pop(state)?;
                state.stack.extend([v1, v3, v2, v1]);
            }
            (false, _) => {
                let v3 = self.pop(state)?;
                if self.is_wide(v3) {
                    state.stack.extend([v2, v1, v3, v2, v1]);
                } else {
                    let v4 = self.pop(state)?;
                    state.stack.extend([v2, v1, v4, v3, v2, v1]);
                }
            }
        }
        Ok(())
    }

    fn loadable_constant(&self, index: u16) -> Result<Constant> {
        let pool = &self.class.pool;
        Ok(match pool.get(index)? {
            ConstantPoolEntry::Integer(value) => Constant::Int(*value),
            ConstantPoolEntry::Float(value) => Constant::Float(*value),
            ConstantPoolEntry::Long(value) => Constant::Long(*value),
            ConstantPoolEntry::Double(value) => Constant::Double(*value),
            ConstantPoolEntry::String { .. } => Constant::String(pool.string(index)?.to_string()),
            ConstantPoolEntry::Class { .. } => Constant::Class(self.class_type(index)?),
            ConstantPoolEntry::MethodType { .. } => {
                Constant::MethodType(pool.method_type(index)?.to_string())
            }
            ConstantPoolEntry::MethodHandle { .. } => {
                let (kind, member) = pool.method_handle(index)?;
                Constant::MethodHandle {
                    kind,
                    class: member.class.to_string(),
                    name: member.name.to_string(),
                    descriptor: member.descriptor.to_string(),
                }
            }
            ConstantPoolEntry::Dynamic { .. } => {
                return Err(unsupported_error!(
                    self.here(),
                    "Dynamically computed constant #{} is not supported",
                    index
                ))
            }
            _ => {
                return Err(Error::InvalidConstant {
                    index,
                    expected: "loadable constant",
                })
            }
        })
    }

    /// Type named by a `CONSTANT_Class` entry, checked against the linker.
    fn class_type(&self, index: u16) -> Result<FieldType> {
        let name = self.class.pool.class_name(index)?;
        self.require_class(name)?;
        FieldType::from_class_name(name)
    }

    fn require_class(&self, class: &str) -> Result<()> {
        if self.linker.is_resolvable(class) {
            Ok(())
        } else {
            Err(unsupported_error!(
                self.here(),
                "Class {} cannot be resolved",
                class
            ))
        }
    }

    fn field_reference(&self, index: u16) -> Result<FieldReference> {
        let member = self.class.pool.member_ref(index)?;
        if member.kind != MemberKind::Field {
            return Err(Error::InvalidConstant {
                index,
                expected: "Fieldref",
            });
        }
        self.require_class(member.class)?;
        Ok(FieldReference {
            class: member.class.to_string(),
            name: member.name.to_string(),
            field_type: FieldType::parse(member.descriptor)?,
        })
    }

    fn invoke(
        &mut self,
        node: NodeId,
        state: &mut ParsingState,
        kind: InvokeKind,
        index: u16,
    ) -> Result<()> {
        let member = self.class.pool.member_ref(index)?;
        if member.kind == MemberKind::Field {
            return Err(Error::InvalidConstant {
                index,
                expected: "Methodref or InterfaceMethodref",
            });
        }
        let method = MethodReference {
            class: member.class.to_string(),
            name: member.name.to_string(),
            signature: MethodSignature::parse(member.descriptor)?,
        };
        let invocation = match kind {
            InvokeKind::Static => InvocationKind::Static,
            InvokeKind::Virtual => InvocationKind::Virtual,
            InvokeKind::Interface => InvocationKind::Interface,
            InvokeKind::Special | InvokeKind::Dynamic => InvocationKind::Direct,
        };
        self.link_method(invocation, &method)?;

        let arguments = self.pop_arguments(state, &method.signature)?;
        let target = match invocation {
            InvocationKind::Static => None,
            _ => Some(self.pop(state)?),
        };
        let return_type = method.signature.return_type.clone();
        let value = self.program.values.push(Value::Invoke {
            kind: invocation,
            method,
            target,
            arguments,
        });
        self.finish_call(node, state, value, return_type.as_ref());
        Ok(())
    }

    fn invoke_dynamic(&mut self, node: NodeId, state: &mut ParsingState, index: u16) -> Result<()> {
        let pool = &self.class.pool;
        let call_site = pool.dynamic(index)?;
        let bootstrap = self
            .class
            .bootstrap_method(call_site.bootstrap_method)
            .ok_or_else(|| {
                unsupported_error!(
                    self.here(),
                    "Bootstrap method {} is missing",
                    call_site.bootstrap_method
                )
            })?;
        let (handle_kind, handle) = pool.method_handle(bootstrap.method_ref)?;
        if handle_kind != ReferenceKind::InvokeStatic {
            return Err(unsupported_error!(
                self.here(),
                "Bootstrap handle of kind {} is not supported",
                handle_kind
            ));
        }
        let bootstrap = MethodReference {
            class: handle.class.to_string(),
            name: handle.name.to_string(),
            signature: MethodSignature::parse(handle.descriptor)?,
        };
        self.link_method(InvocationKind::Static, &bootstrap)?;
        let name = call_site.name.to_string();
        let signature = MethodSignature::parse(call_site.descriptor)?;

        let arguments = self.pop_arguments(state, &signature)?;
        let return_type = signature.return_type.clone();
        let value = self.program.values.push(Value::InvokeDynamic {
            bootstrap,
            name,
            signature,
            arguments,
        });
        self.finish_call(node, state, value, return_type.as_ref());
        Ok(())
    }

    fn pop_arguments(
        &self,
        state: &mut ParsingState,
        signature: &MethodSignature,
    ) -> Result<Vec<ValueId>> {
        let mut arguments = Vec::with_capacity(signature.parameters.len());
        for _ in &signature.parameters {
            arguments.push(self.pop(state)?);
        }
        arguments.reverse();
        Ok(arguments)
    }

    /// Void calls become statements; other calls push a variable holding the result.
    fn finish_call(
        &mut self,
        node: NodeId,
        state: &mut ParsingState,
        call: ValueId,
        return_type: Option<&FieldType>,
    ) {
        match return_type {
            None => self.emit(node, Expression::Invoke(call)),
            Some(return_type) => {
                let variable = self.bind(node, TypeRef::from_field_type(return_type), call);
                state.stack.push(variable);
            }
        }
    }

    fn link_method(&self, kind: InvocationKind, method: &MethodReference) -> Result<()> {
        let class = method.class.as_str();
        let name = method.name.as_str();
        let signature = &method.signature;
        let resolved = self.linker.is_resolvable(class)
            && match kind {
                InvocationKind::Static => self.linker.resolve_static_method(class, name, signature),
                InvocationKind::Direct if name == "<init>" => {
                    self.linker.resolve_constructor(class, signature)
                }
                InvocationKind::Direct => {
                    self.linker.resolve_private_method(class, name, signature)
                }
                InvocationKind::Virtual | InvocationKind::Interface => {
                    self.linker.resolve_virtual_method(class, name, signature)
                }
            };
        if resolved {
            Ok(())
        } else {
            Err(unsupported_error!(
                self.here(),
                "Cannot link {} method {}.{}{}",
                kind,
                class,
                name,
                signature
            ))
        }
    }
}
