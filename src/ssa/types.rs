//! Static types of SSA values.
//!
//! Bytecode only distinguishes five computational kinds, but PHI merging and code
//! generation want a little more: the narrow integer types of fields and parameters,
//! and the class of a reference when it is known. [`TypeRef`] carries exactly that.

use std::fmt;

use crate::{
    bytecode::{ArrayKind, ConvertTarget, NumericKind, ValueKind},
    classfile::FieldType,
};

/// The static type of an SSA value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// `boolean`
    Boolean,
    /// `byte`
    Byte,
    /// `char`
    Char,
    /// `short`
    Short,
    /// `int`
    Int,
    /// `long`
    Long,
    /// `float`
    Float,
    /// `double`
    Double,
    /// Object or array reference; `None` when the class is unknown, e.g. for `null`
    Reference(Option<FieldType>),
}

impl TypeRef {
    /// A reference to an instance of `class`.
    #[must_use]
    pub fn object(class: &str) -> TypeRef {
        TypeRef::Reference(Some(FieldType::Object(class.to_string())))
    }

    /// `java/lang/Object`.
    #[must_use]
    pub fn java_object() -> TypeRef {
        TypeRef::Reference(Some(FieldType::object()))
    }

    /// The type of values declared with `field_type`.
    #[must_use]
    pub fn from_field_type(field_type: &FieldType) -> TypeRef {
        match field_type {
            FieldType::Boolean => TypeRef::Boolean,
            FieldType::Byte => TypeRef::Byte,
            FieldType::Char => TypeRef::Char,
            FieldType::Short => TypeRef::Short,
            FieldType::Int => TypeRef::Int,
            FieldType::Long => TypeRef::Long,
            FieldType::Float => TypeRef::Float,
            FieldType::Double => TypeRef::Double,
            FieldType::Object(_) | FieldType::Array(_) => {
                TypeRef::Reference(Some(field_type.clone()))
            }
        }
    }

    /// The computational kind the JVM uses for this type.
    #[must_use]
    pub fn value_kind(&self) -> ValueKind {
        match self {
            TypeRef::Boolean | TypeRef::Byte | TypeRef::Char | TypeRef::Short | TypeRef::Int => {
                ValueKind::Int
            }
            TypeRef::Long => ValueKind::Long,
            TypeRef::Float => ValueKind::Float,
            TypeRef::Double => ValueKind::Double,
            TypeRef::Reference(_) => ValueKind::Reference,
        }
    }

    /// True for long and double, which take two stack or local slots.
    #[must_use]
    pub fn is_wide(&self) -> bool {
        self.value_kind().slot_size() == 2
    }

    /// True for every non-reference type.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        !matches!(self, TypeRef::Reference(_))
    }

    /// Element type of an array of this type, if known.
    #[must_use]
    pub fn component(&self) -> Option<TypeRef> {
        match self {
            TypeRef::Reference(Some(FieldType::Array(component))) => {
                Some(TypeRef::from_field_type(component))
            }
            _ => None,
        }
    }

    fn numeric_rank(&self) -> u8 {
        match self {
            TypeRef::Boolean => 0,
            TypeRef::Byte => 1,
            TypeRef::Char => 2,
            TypeRef::Short => 3,
            TypeRef::Int => 4,
            TypeRef::Long => 5,
            TypeRef::Float => 6,
            TypeRef::Double => 7,
            TypeRef::Reference(_) => u8::MAX,
        }
    }

    /// Numeric promotion: identical types stay, differing numeric types widen.
    ///
    /// Returns `None` when either side is a reference; merging references needs the
    /// class hierarchy and is done by [`crate::linker::LinkerContext::widest_common_type`].
    #[must_use]
    pub fn promote(a: &TypeRef, b: &TypeRef) -> Option<TypeRef> {
        if a == b {
            return Some(a.clone());
        }
        if !a.is_numeric() || !b.is_numeric() {
            return None;
        }
        if a.numeric_rank() >= b.numeric_rank() {
            Some(a.clone())
        } else {
            Some(b.clone())
        }
    }
}

impl From<NumericKind> for TypeRef {
    fn from(kind: NumericKind) -> Self {
        match kind {
            NumericKind::Int => TypeRef::Int,
            NumericKind::Long => TypeRef::Long,
            NumericKind::Float => TypeRef::Float,
            NumericKind::Double => TypeRef::Double,
        }
    }
}

impl From<ConvertTarget> for TypeRef {
    fn from(target: ConvertTarget) -> Self {
        match target {
            ConvertTarget::Int => TypeRef::Int,
            ConvertTarget::Long => TypeRef::Long,
            ConvertTarget::Float => TypeRef::Float,
            ConvertTarget::Double => TypeRef::Double,
            ConvertTarget::Byte => TypeRef::Byte,
            ConvertTarget::Char => TypeRef::Char,
            ConvertTarget::Short => TypeRef::Short,
        }
    }
}

impl ArrayKind {
    /// Primitive element type; `None` for reference arrays.
    #[must_use]
    pub fn element_type(self) -> Option<FieldType> {
        match self {
            ArrayKind::Int => Some(FieldType::Int),
            ArrayKind::Long => Some(FieldType::Long),
            ArrayKind::Float => Some(FieldType::Float),
            ArrayKind::Double => Some(FieldType::Double),
            ArrayKind::Byte => Some(FieldType::Byte),
            ArrayKind::Boolean => Some(FieldType::Boolean),
            ArrayKind::Char => Some(FieldType::Char),
            ArrayKind::Short => Some(FieldType::Short),
            ArrayKind::Reference => None,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Boolean => f.write_str("boolean"),
            TypeRef::Byte => f.write_str("byte"),
            TypeRef::Char => f.write_str("char"),
            TypeRef::Short => f.write_str("short"),
            TypeRef::Int => f.write_str("int"),
            TypeRef::Long => f.write_str("long"),
            TypeRef::Float => f.write_str("float"),
            TypeRef::Double => f.write_str("double"),
            TypeRef::Reference(None) => f.write_str("ref"),
            TypeRef::Reference(Some(FieldType::Object(name))) => {
                f.write_str(name.rsplit('/').next().unwrap_or(name))
            }
            TypeRef::Reference(Some(field_type)) => write!(f, "{field_type}"),
        }
    }
}
