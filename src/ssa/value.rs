//! SSA values and the per-method value arena.
//!
//! Values form a DAG: every non-leaf [`Value`] names its operands by [`ValueId`]. Most
//! computed values are bound to a [`Variable`] right after creation, so statements and
//! other values normally refer to variables and constants only. Operands are also
//! called the value's *incoming data flows*.

use std::fmt;

use strum::{Display, IntoStaticStr};

use crate::{
    bytecode::{ArithmeticOp, ArrayKind, CompareOp, Condition, ConvertTarget, NumericKind},
    classfile::{FieldType, MethodSignature, ReferenceKind},
    ssa::TypeRef,
};

index_type!(
    /// Identifies a [`Value`] in a [`ValueArena`].
    ValueId,
    "v"
);

/// A literal operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// `null`
    Null,
    /// 32-bit integer, also used for boolean, byte, char and short
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// String literal
    String(String),
    /// Class literal, e.g. `String.class`
    Class(FieldType),
    /// `CONSTANT_MethodType` descriptor
    MethodType(String),
    /// `CONSTANT_MethodHandle`
    MethodHandle {
        /// Handle behavior
        kind: ReferenceKind,
        /// Owner class
        class: String,
        /// Member name
        name: String,
        /// Member descriptor
        descriptor: String,
    },
}

impl Constant {
    /// Static type of the literal.
    #[must_use]
    pub fn type_ref(&self) -> TypeRef {
        match self {
            Constant::Null => TypeRef::Reference(None),
            Constant::Int(_) => TypeRef::Int,
            Constant::Long(_) => TypeRef::Long,
            Constant::Float(_) => TypeRef::Float,
            Constant::Double(_) => TypeRef::Double,
            Constant::String(_) => TypeRef::object("java/lang/String"),
            Constant::Class(_) => TypeRef::object("java/lang/Class"),
            Constant::MethodType(_) => TypeRef::object("java/lang/invoke/MethodType"),
            Constant::MethodHandle { .. } => TypeRef::object("java/lang/invoke/MethodHandle"),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Null => f.write_str("null"),
            Constant::Int(value) => write!(f, "{value}"),
            Constant::Long(value) => write!(f, "{value}L"),
            Constant::Float(value) => write!(f, "{value:?}F"),
            Constant::Double(value) => write!(f, "{value:?}"),
            Constant::String(value) => write!(f, "{value:?}"),
            Constant::Class(class) => write!(f, "{class}.class"),
            Constant::MethodType(descriptor) => write!(f, "methodtype{descriptor}"),
            Constant::MethodHandle {
                kind,
                class,
                name,
                descriptor,
            } => write!(f, "methodhandle({kind} {class}.{name}{descriptor})"),
        }
    }
}

/// A resolved field reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldReference {
    /// Owner class
    pub class: String,
    /// Field name
    pub name: String,
    /// Declared type
    pub field_type: FieldType,
}

/// A resolved method reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodReference {
    /// Owner class
    pub class: String,
    /// Method name
    pub name: String,
    /// Parsed descriptor
    pub signature: MethodSignature,
}

/// Dispatch flavor of an [`Value::Invoke`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum InvocationKind {
    /// `invokestatic`
    Static,
    /// `invokevirtual`
    Virtual,
    /// `invokeinterface`
    Interface,
    /// `invokespecial`: constructors, private and super calls
    Direct,
}

/// Provenance of a [`Variable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum VariableKind {
    /// Holds `this` or a parameter; never assigned
    Argument,
    /// Bound by one `VariableAssignment`
    Assigned,
    /// Merges the values of several predecessors
    Phi,
}

/// A named, typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Display name, unique per method
    pub name: String,
    /// Static type
    pub ty: TypeRef,
    /// How the variable gets its value
    pub kind: VariableKind,
    /// Values flowing into the variable; one for plain variables, several for PHIs
    pub incoming: Vec<ValueId>,
    /// Set when an optimizer pass removed the variable
    pub deleted: bool,
}

impl Variable {
    /// True for PHI variables.
    #[must_use]
    pub fn is_phi(&self) -> bool {
        self.kind == VariableKind::Phi
    }
}

/// One node of the value DAG.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Literal
    Constant(Constant),
    /// Receiver of an instance method
    This,
    /// Method parameter, numbered from 0 without `this`
    Parameter(u16),
    /// The exception caught by a handler
    CurrentException,
    /// Named value; see [`Variable`]
    Variable(Variable),
    Binary {
        op: ArithmeticOp,
        kind: NumericKind,
        left: ValueId,
        right: ValueId,
    },
    Negate {
        kind: NumericKind,
        operand: ValueId,
    },
    /// `lcmp`, `fcmp*`, `dcmp*`: -1, 0 or 1
    Compare {
        op: CompareOp,
        left: ValueId,
        right: ValueId,
    },
    Convert {
        from: NumericKind,
        to: ConvertTarget,
        operand: ValueId,
    },
    /// Boolean branch condition
    Relation {
        condition: Condition,
        left: ValueId,
        right: ValueId,
    },
    /// `operand == null`, or `!= null` when `is_null` is false
    NullTest {
        operand: ValueId,
        is_null: bool,
    },
    GetField {
        field: FieldReference,
        target: ValueId,
    },
    GetStatic(FieldReference),
    ArrayLoad {
        kind: ArrayKind,
        array: ValueId,
        index: ValueId,
    },
    ArrayLength(ValueId),
    /// Uninitialized instance; the constructor runs as a separate invocation
    New(String),
    NewArray {
        element: FieldType,
        length: ValueId,
    },
    MultiNewArray {
        array_type: FieldType,
        dimensions: Vec<ValueId>,
    },
    InstanceOf {
        operand: ValueId,
        class: FieldType,
    },
    Invoke {
        kind: InvocationKind,
        method: MethodReference,
        target: Option<ValueId>,
        arguments: Vec<ValueId>,
    },
    InvokeDynamic {
        bootstrap: MethodReference,
        name: String,
        signature: MethodSignature,
        arguments: Vec<ValueId>,
    },
}

impl Value {
    /// Operands in evaluation order.
    ///
    /// Variables report their incoming flows.
    #[must_use]
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            Value::Constant(_)
            | Value::This
            | Value::Parameter(_)
            | Value::CurrentException
            | Value::GetStatic(_)
            | Value::New(_) => Vec::new(),
            Value::Variable(variable) => variable.incoming.clone(),
            Value::Binary { left, right, .. }
            | Value::Compare { left, right, .. }
            | Value::Relation { left, right, .. } => vec![*left, *right],
            Value::Negate { operand, .. }
            | Value::Convert { operand, .. }
            | Value::NullTest { operand, .. }
            | Value::InstanceOf { operand, .. }
            | Value::ArrayLength(operand) => vec![*operand],
            Value::GetField { target, .. } => vec![*target],
            Value::ArrayLoad { array, index, .. } => vec![*array, *index],
            Value::NewArray { length, .. } => vec![*length],
            Value::MultiNewArray { dimensions, .. } => dimensions.clone(),
            Value::Invoke {
                target, arguments, ..
            } => target.iter().chain(arguments).copied().collect(),
            Value::InvokeDynamic { arguments, .. } => arguments.clone(),
        }
    }

    /// Mutable operands in evaluation order; empty for variables.
    pub fn operands_mut(&mut self) -> Vec<&mut ValueId> {
        match self {
            Value::Constant(_)
            | Value::This
            | Value::Parameter(_)
            | Value::CurrentException
            | Value::Variable(_)
            | Value::GetStatic(_)
            | Value::New(_) => Vec::new(),
            Value::Binary { left, right, .. }
            | Value::Compare { left, right, .. }
            | Value::Relation { left, right, .. } => vec![left, right],
            Value::Negate { operand, .. }
            | Value::Convert { operand, .. }
            | Value::NullTest { operand, .. }
            | Value::InstanceOf { operand, .. }
            | Value::ArrayLength(operand) => vec![operand],
            Value::GetField { target, .. } => vec![target],
            Value::ArrayLoad { array, index, .. } => vec![array, index],
            Value::NewArray { length, .. } => vec![length],
            Value::MultiNewArray { dimensions, .. } => dimensions.iter_mut().collect(),
            Value::Invoke {
                target, arguments, ..
            } => target.iter_mut().chain(arguments.iter_mut()).collect(),
            Value::InvokeDynamic { arguments, .. } => arguments.iter_mut().collect(),
        }
    }

    /// False for values whose evaluation may have side effects or observe mutable
    /// state: calls, field and array reads and allocations.
    #[must_use]
    pub fn is_pure(&self) -> bool {
        !matches!(
            self,
            Value::GetField { .. }
                | Value::GetStatic(_)
                | Value::ArrayLoad { .. }
                | Value::ArrayLength(_)
                | Value::New(_)
                | Value::NewArray { .. }
                | Value::MultiNewArray { .. }
                | Value::Invoke { .. }
                | Value::InvokeDynamic { .. }
                | Value::CurrentException
        )
    }

    /// The variable payload, if this is a variable.
    #[must_use]
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Value::Variable(variable) => Some(variable),
            _ => None,
        }
    }
}

/// Owns every [`Value`] of one method.
#[derive(Debug, Clone, Default)]
pub struct ValueArena {
    values: Vec<Value>,
}

impl ValueArena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        ValueArena::default()
    }

    /// Adds `value` and returns its id.
    pub fn push(&mut self, value: Value) -> ValueId {
        let id = ValueId::new(self.values.len());
        self.values.push(value);
        id
    }

    /// Points every operand and variable flow naming `from` at `to`.
    ///
    /// Flows of a variable stay free of duplicates.
    pub fn substitute(&mut self, from: ValueId, to: ValueId) {
        for value in &mut self.values {
            if let Value::Variable(variable) = value {
                if variable.incoming.contains(&from) {
                    let mut incoming = Vec::with_capacity(variable.incoming.len());
                    for flow in variable.incoming.drain(..) {
                        let flow = if flow == from { to } else { flow };
                        if !incoming.contains(&flow) {
                            incoming.push(flow);
                        }
                    }
                    variable.incoming = incoming;
                }
                continue;
            }
            for operand in value.operands_mut() {
                if *operand == from {
                    *operand = to;
                }
            }
        }
    }

    /// Adds a constant.
    pub fn constant(&mut self, constant: Constant) -> ValueId {
        self.push(Value::Constant(constant))
    }

    /// The value behind `id`.
    #[must_use]
    pub fn get(&self, id: ValueId) -> Option<&Value> {
        self.values.get(id.index())
    }

    /// Mutable access to the value behind `id`.
    pub fn get_mut(&mut self, id: ValueId) -> Option<&mut Value> {
        self.values.get_mut(id.index())
    }

    /// The variable behind `id`, if `id` is a variable.
    #[must_use]
    pub fn variable(&self, id: ValueId) -> Option<&Variable> {
        self.get(id).and_then(Value::as_variable)
    }

    /// Mutable variable access.
    pub fn variable_mut(&mut self, id: ValueId) -> Option<&mut Variable> {
        match self.get_mut(id) {
            Some(Value::Variable(variable)) => Some(variable),
            _ => None,
        }
    }

    /// True if `id` names a variable.
    #[must_use]
    pub fn is_variable(&self, id: ValueId) -> bool {
        self.variable(id).is_some()
    }

    /// True if `id` names a PHI variable.
    #[must_use]
    pub fn is_phi(&self, id: ValueId) -> bool {
        self.variable(id).is_some_and(Variable::is_phi)
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the arena holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All values with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (ValueId, &Value)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(index, value)| (ValueId::new(index), value))
    }

    /// Variables that have not been deleted.
    pub fn live_variables(&self) -> impl Iterator<Item = (ValueId, &Variable)> + '_ {
        self.iter().filter_map(|(id, value)| match value {
            Value::Variable(variable) if !variable.deleted => Some((id, variable)),
            _ => None,
        })
    }

    /// Static type of a value.
    ///
    /// Variables report their declared type; other values derive it from their
    /// operator. Unknown ids and untyped references yield `Reference(None)`.
    #[must_use]
    pub fn type_of(&self, id: ValueId) -> TypeRef {
        let Some(value) = self.get(id) else {
            return TypeRef::Reference(None);
        };
        match value {
            Value::Constant(constant) => constant.type_ref(),
            Value::Variable(variable) => variable.ty.clone(),
            Value::Binary { kind, .. } | Value::Negate { kind, .. } => TypeRef::from(*kind),
            Value::Compare { .. } | Value::ArrayLength(_) => TypeRef::Int,
            Value::Relation { .. } | Value::NullTest { .. } | Value::InstanceOf { .. } => {
                TypeRef::Boolean
            }
            Value::Convert { to, .. } => TypeRef::from(*to),
            Value::GetField { field, .. } | Value::GetStatic(field) => {
                TypeRef::from_field_type(&field.field_type)
            }
            Value::ArrayLoad { kind, array, .. } => match kind.element_type() {
                Some(element) => TypeRef::from_field_type(&element),
                None => self
                    .type_of(*array)
                    .component()
                    .unwrap_or(TypeRef::Reference(None)),
            },
            Value::New(class) => TypeRef::object(class),
            Value::NewArray { element, .. } => {
                TypeRef::Reference(Some(FieldType::Array(Box::new(element.clone()))))
            }
            Value::MultiNewArray { array_type, .. } => {
                TypeRef::Reference(Some(array_type.clone()))
            }
            Value::Invoke { method, .. } => method
                .signature
                .return_type
                .as_ref()
                .map_or(TypeRef::Reference(None), TypeRef::from_field_type),
            Value::InvokeDynamic { signature, .. } => signature
                .return_type
                .as_ref()
                .map_or(TypeRef::Reference(None), TypeRef::from_field_type),
            Value::This | Value::Parameter(_) | Value::CurrentException => {
                TypeRef::Reference(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operands_follow_evaluation_order() {
        let mut arena = ValueArena::new();
        let target = arena.push(Value::This);
        let a = arena.constant(Constant::Int(1));
        let b = arena.constant(Constant::Int(2));
        let call = arena.push(Value::Invoke {
            kind: InvocationKind::Virtual,
            method: MethodReference {
                class: "demo/A".into(),
                name: "f".into(),
                signature: MethodSignature::parse("(II)I").unwrap(),
            },
            target: Some(target),
            arguments: vec![a, b],
        });
        assert_eq!(arena.get(call).unwrap().operands(), vec![target, a, b]);
        assert!(!arena.get(call).unwrap().is_pure());
        assert_eq!(arena.type_of(call), TypeRef::Int);
    }

    #[test]
    fn test_array_load_type_uses_component() {
        let mut arena = ValueArena::new();
        let length = arena.constant(Constant::Int(4));
        let array = arena.push(Value::NewArray {
            element: FieldType::Object("java/lang/String".into()),
            length,
        });
        let load = arena.push(Value::ArrayLoad {
            kind: ArrayKind::Reference,
            array,
            index: length,
        });
        assert_eq!(arena.type_of(load), TypeRef::object("java/lang/String"));
    }

    #[test]
    fn test_substitute_merges_duplicate_flows() {
        let mut arena = ValueArena::new();
        let a = arena.constant(Constant::Int(1));
        let b = arena.constant(Constant::Int(2));
        let phi = arena.push(Value::Variable(Variable {
            name: "phi2".into(),
            ty: TypeRef::Int,
            kind: VariableKind::Phi,
            incoming: vec![a, b],
            deleted: false,
        }));
        let sum = arena.push(Value::Binary {
            op: ArithmeticOp::Add,
            kind: NumericKind::Int,
            left: b,
            right: a,
        });

        arena.substitute(b, a);
        assert_eq!(arena.variable(phi).unwrap().incoming, vec![a]);
        assert_eq!(arena.get(sum).unwrap().operands(), vec![a, a]);
    }
}
