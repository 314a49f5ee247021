//! Field and method descriptors.
//!
//! Descriptors are the compact type strings of the class-file format, e.g. `I`,
//! `[Ljava/lang/String;` or `(IJ)V`. Generic signatures are not parsed; they are only
//! present in the optional `Signature` attribute, which is kept as an opaque attribute.

use std::{fmt, str::FromStr};

use crate::{bytecode::ValueKind, Error, Result};

/// The type of a field, parameter, return value or array element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `D`
    Double,
    /// `F`
    Float,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `S`
    Short,
    /// `Z`
    Boolean,
    /// `L<internal name>;`
    Object(String),
    /// `[<component>`
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parses a complete field descriptor.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if `descriptor` is not exactly one field type.
    pub fn parse(descriptor: &str) -> Result<FieldType> {
        let mut reader = DescriptorReader::new(descriptor);
        let field_type = reader.field_type()?;
        reader.expect_end()?;
        Ok(field_type)
    }

    /// Type named by a `CONSTANT_Class` entry, which holds either an internal class name
    /// or, for arrays, a descriptor.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for an invalid array descriptor.
    pub fn from_class_name(name: &str) -> Result<FieldType> {
        if name.starts_with('[') {
            FieldType::parse(name)
        } else {
            Ok(FieldType::Object(name.to_string()))
        }
    }

    /// `java/lang/Object` as a type.
    #[must_use]
    pub fn object() -> FieldType {
        FieldType::Object("java/lang/Object".to_string())
    }

    /// Number of local variable slots a value of this type occupies.
    #[must_use]
    pub fn slot_size(&self) -> u16 {
        self.value_kind().slot_size()
    }

    /// The computational type the JVM uses for values of this type.
    #[must_use]
    pub fn value_kind(&self) -> ValueKind {
        match self {
            FieldType::Byte
            | FieldType::Char
            | FieldType::Int
            | FieldType::Short
            | FieldType::Boolean => ValueKind::Int,
            FieldType::Long => ValueKind::Long,
            FieldType::Float => ValueKind::Float,
            FieldType::Double => ValueKind::Double,
            FieldType::Object(_) | FieldType::Array(_) => ValueKind::Reference,
        }
    }

    /// True for primitive types.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        !matches!(self, FieldType::Object(_) | FieldType::Array(_))
    }

    /// Name of the class that must be loadable for this type to be usable: the class
    /// itself, or the innermost element class of an array. `None` for primitives and
    /// primitive arrays.
    #[must_use]
    pub fn referenced_class(&self) -> Option<&str> {
        match self {
            FieldType::Object(name) => Some(name),
            FieldType::Array(component) => component.referenced_class(),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Byte => f.write_str("B"),
            FieldType::Char => f.write_str("C"),
            FieldType::Double => f.write_str("D"),
            FieldType::Float => f.write_str("F"),
            FieldType::Int => f.write_str("I"),
            FieldType::Long => f.write_str("J"),
            FieldType::Short => f.write_str("S"),
            FieldType::Boolean => f.write_str("Z"),
            FieldType::Object(name) => write!(f, "L{name};"),
            FieldType::Array(component) => write!(f, "[{component}"),
        }
    }
}

impl FromStr for FieldType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FieldType::parse(s)
    }
}

/// Parameter and return types of a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    /// Parameters in declaration order, without the implicit `this`
    pub parameters: Vec<FieldType>,
    /// Return type, `None` for `void`
    pub return_type: Option<FieldType>,
}

impl MethodSignature {
    /// Parses a method descriptor such as `(ILjava/lang/String;)V`.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if `descriptor` is not a valid method descriptor.
    pub fn parse(descriptor: &str) -> Result<MethodSignature> {
        let mut reader = DescriptorReader::new(descriptor);
        reader.expect('(')?;

        let mut parameters = Vec::new();
        while reader.peek() != Some(')') {
            parameters.push(reader.field_type()?);
        }
        reader.expect(')')?;

        let return_type = if reader.peek() == Some('V') {
            reader.bump();
            None
        } else {
            Some(reader.field_type()?)
        };
        reader.expect_end()?;

        Ok(MethodSignature {
            parameters,
            return_type,
        })
    }

    /// Number of local slots taken by the parameters, excluding `this`.
    #[must_use]
    pub fn parameter_slots(&self) -> u16 {
        self.parameters.iter().map(FieldType::slot_size).sum()
    }

    /// True if the method returns `void`.
    #[must_use]
    pub fn is_void(&self) -> bool {
        self.return_type.is_none()
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for parameter in &self.parameters {
            write!(f, "{parameter}")?;
        }
        f.write_str(")")?;
        match &self.return_type {
            Some(return_type) => write!(f, "{return_type}"),
            None => f.write_str("V"),
        }
    }
}

impl FromStr for MethodSignature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MethodSignature::parse(s)
    }
}

struct DescriptorReader<'a> {
    descriptor: &'a str,
    position: usize,
}

impl<'a> DescriptorReader<'a> {
    fn new(descriptor: &'a str) -> Self {
        DescriptorReader {
            descriptor,
            position: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.descriptor[self.position..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position += c.len_utf8();
        Some(c)
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            _ => Err(self.error(&format!("expected '{expected}'"))),
        }
    }

    fn expect_end(&self) -> Result<()> {
        if self.position == self.descriptor.len() {
            Ok(())
        } else {
            Err(self.error("trailing characters"))
        }
    }

    fn error(&self, what: &str) -> Error {
        malformed_error!(
            "Invalid descriptor '{}' at {}: {}",
            self.descriptor,
            self.position,
            what
        )
    }

    fn field_type(&mut self) -> Result<FieldType> {
        let mut dimensions = 0_usize;
        while self.peek() == Some('[') {
            self.bump();
            dimensions += 1;
            if dimensions > 255 {
                return Err(self.error("more than 255 array dimensions"));
            }
        }

        let mut field_type = match self.bump() {
            Some('B') => FieldType::Byte,
            Some('C') => FieldType::Char,
            Some('D') => FieldType::Double,
            Some('F') => FieldType::Float,
            Some('I') => FieldType::Int,
            Some('J') => FieldType::Long,
            Some('S') => FieldType::Short,
            Some('Z') => FieldType::Boolean,
            Some('L') => {
                let rest = &self.descriptor[self.position..];
                let end = rest
                    .find(';')
                    .ok_or_else(|| self.error("unterminated class name"))?;
                if end == 0 {
                    return Err(self.error("empty class name"));
                }
                self.position += end + 1;
                FieldType::Object(rest[..end].to_string())
            }
            _ => return Err(self.error("expected a field type")),
        };

        for _ in 0..dimensions {
            field_type = FieldType::Array(Box::new(field_type));
        }
        Ok(field_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field_types() {
        assert_eq!(FieldType::parse("I").unwrap(), FieldType::Int);
        assert_eq!(
            FieldType::parse("[[Ljava/lang/String;").unwrap(),
            FieldType::Array(Box::new(FieldType::Array(Box::new(FieldType::Object(
                "java/lang/String".into()
            )))))
        );
        assert!(FieldType::parse("V").is_err());
        assert!(FieldType::parse("II").is_err());
        assert!(FieldType::parse("Ljava/lang/String").is_err());
        assert!(FieldType::parse("L;").is_err());
    }

    #[test]
    fn test_parse_method_signature() {
        let signature: MethodSignature = "(IJ[DLjava/lang/Object;)V".parse().unwrap();
        assert_eq!(signature.parameters.len(), 4);
        assert_eq!(signature.parameter_slots(), 5);
        assert!(signature.is_void());
        assert_eq!(signature.to_string(), "(IJ[DLjava/lang/Object;)V");

        let getter = MethodSignature::parse("()Ljava/lang/String;").unwrap();
        assert_eq!(getter.return_type, Some(FieldType::Object("java/lang/String".into())));
        assert!(MethodSignature::parse("(I").is_err());
        assert!(MethodSignature::parse("()").is_err());
        assert!(MethodSignature::parse("(V)V").is_err());
    }

    #[test]
    fn test_kinds_and_classes() {
        assert_eq!(FieldType::Boolean.value_kind(), ValueKind::Int);
        assert_eq!(FieldType::Double.slot_size(), 2);
        let array = FieldType::from_class_name("[Ljava/util/List;").unwrap();
        assert_eq!(array.referenced_class(), Some("java/util/List"));
        assert_eq!(
            FieldType::from_class_name("demo/Main").unwrap(),
            FieldType::Object("demo/Main".into())
        );
        assert_eq!(FieldType::parse("[I").unwrap().referenced_class(), None);
    }
}
