//! The parsed, immutable representation of a class file.

use std::path::Path;

use crate::{
    classfile::{
        attributes::{Annotation, Attribute, BootstrapMethod, CodeAttribute},
        flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags},
        signature::{FieldType, MethodSignature},
        ClassFileParser, ConstantPool,
    },
    File, Result,
};

/// A field declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldModel {
    /// Access and property flags
    pub access_flags: FieldAccessFlags,
    /// Field name
    pub name: String,
    /// Raw descriptor
    pub descriptor: String,
    /// Parsed descriptor
    pub field_type: FieldType,
    /// Field attributes
    pub attributes: Vec<Attribute>,
}

impl FieldModel {
    /// True for static fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::STATIC)
    }

    /// Pool index of the `ConstantValue` initializer, if any.
    #[must_use]
    pub fn constant_value(&self) -> Option<u16> {
        self.attributes.iter().find_map(|attribute| match attribute {
            Attribute::ConstantValue(index) => Some(*index),
            _ => None,
        })
    }
}

/// A method declaration and its body.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodModel {
    /// Access and property flags
    pub access_flags: MethodAccessFlags,
    /// Method name; `<init>` for constructors, `<clinit>` for class initializers
    pub name: String,
    /// Raw descriptor
    pub descriptor: String,
    /// Parsed descriptor
    pub signature: MethodSignature,
    /// Method attributes, including `Code`
    pub attributes: Vec<Attribute>,
}

impl MethodModel {
    /// The method body, absent for abstract and native methods.
    #[must_use]
    pub fn code(&self) -> Option<&CodeAttribute> {
        self.attributes.iter().find_map(|attribute| match attribute {
            Attribute::Code(code) => Some(code),
            _ => None,
        })
    }

    /// True for static methods, which have no `this` in slot 0.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// True for instance initializers.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    /// Name followed by descriptor, e.g. `add(II)I`. Unique within a class.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}{}", self.name, self.descriptor)
    }

    /// Runtime-visible annotations of the method.
    pub fn annotations(&self) -> impl Iterator<Item = &Annotation> + '_ {
        self.attributes.iter().flat_map(|attribute| match attribute {
            Attribute::RuntimeVisibleAnnotations(annotations) => annotations.as_slice(),
            _ => &[],
        })
    }
}

/// A parsed class file.
///
/// All constant pool references in the structure have been resolved to strings; the
/// pool is kept for instruction operands, which are resolved on demand during
/// compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassModel {
    /// Minor version of the class-file format
    pub minor_version: u16,
    /// Major version of the class-file format (52 = Java 8)
    pub major_version: u16,
    /// The class's constant pool
    pub pool: ConstantPool,
    /// Access and property flags
    pub access_flags: ClassAccessFlags,
    /// Internal name of this class, e.g. `java/lang/String`
    pub this_class: String,
    /// Internal name of the superclass; `None` only for `java/lang/Object`
    pub super_class: Option<String>,
    /// Internal names of directly implemented interfaces
    pub interfaces: Vec<String>,
    /// Declared fields
    pub fields: Vec<FieldModel>,
    /// Declared methods
    pub methods: Vec<MethodModel>,
    /// Class attributes
    pub attributes: Vec<Attribute>,
}

impl ClassModel {
    /// Parses a class from memory.
    ///
    /// # Errors
    /// Returns a parse error if `data` is not a valid class file.
    pub fn from_bytes(data: &[u8]) -> Result<ClassModel> {
        ClassFileParser::parse(data)
    }

    /// Memory-maps and parses a `.class` file.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened and a parse
    /// error if its contents are invalid.
    pub fn from_file(path: &Path) -> Result<ClassModel> {
        let file = File::from_file(path)?;
        ClassFileParser::parse(file.data())
    }

    /// Finds a method by name and descriptor.
    #[must_use]
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodModel> {
        self.methods
            .iter()
            .find(|method| method.name == name && method.descriptor == descriptor)
    }

    /// Finds a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldModel> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Value of the `SourceFile` attribute.
    #[must_use]
    pub fn source_file(&self) -> Option<&str> {
        self.attributes.iter().find_map(|attribute| match attribute {
            Attribute::SourceFile(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Entry `index` of the `BootstrapMethods` attribute.
    #[must_use]
    pub fn bootstrap_method(&self, index: u16) -> Option<&BootstrapMethod> {
        self.attributes.iter().find_map(|attribute| match attribute {
            Attribute::BootstrapMethods(methods) => methods.get(usize::from(index)),
            _ => None,
        })
    }

    /// True for interfaces and annotation interfaces.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }
}
