//! Constant pool entries.

use strum::{Display, FromRepr, IntoStaticStr};

/// Raw constant pool tag bytes.
#[allow(missing_docs)]
pub mod tags {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELDREF: u8 = 9;
    pub const METHODREF: u8 = 10;
    pub const INTERFACE_METHODREF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;
}

/// Behaviour of a `CONSTANT_MethodHandle`, as defined by its `reference_kind` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr, IntoStaticStr)]
#[repr(u8)]
pub enum ReferenceKind {
    /// `REF_getField`
    GetField = 1,
    /// `REF_getStatic`
    GetStatic = 2,
    /// `REF_putField`
    PutField = 3,
    /// `REF_putStatic`
    PutStatic = 4,
    /// `REF_invokeVirtual`
    InvokeVirtual = 5,
    /// `REF_invokeStatic`
    InvokeStatic = 6,
    /// `REF_invokeSpecial`
    InvokeSpecial = 7,
    /// `REF_newInvokeSpecial`
    NewInvokeSpecial = 8,
    /// `REF_invokeInterface`
    InvokeInterface = 9,
}

impl ReferenceKind {
    /// True if the handle refers to a field rather than a method.
    #[must_use]
    pub fn is_field_access(self) -> bool {
        matches!(
            self,
            ReferenceKind::GetField
                | ReferenceKind::GetStatic
                | ReferenceKind::PutField
                | ReferenceKind::PutStatic
        )
    }
}

/// One slot of the constant pool.
///
/// Cross-references are raw 1-based indices into the same pool. They are resolved on
/// demand through the typed accessors of [`crate::classfile::ConstantPool`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantPoolEntry {
    /// Modified UTF-8 text, already decoded
    Utf8(String),
    /// `int` constant
    Integer(i32),
    /// `float` constant
    Float(f32),
    /// `long` constant; the following slot is [`ConstantPoolEntry::Unused`]
    Long(i64),
    /// `double` constant; the following slot is [`ConstantPoolEntry::Unused`]
    Double(f64),
    /// Class or interface reference
    Class {
        /// Utf8 entry with the internal class name or array descriptor
        name_index: u16,
    },
    /// `java.lang.String` literal
    String {
        /// Utf8 entry with the string's contents
        string_index: u16,
    },
    /// Field reference
    FieldRef {
        /// Owning class
        class_index: u16,
        /// Field name and descriptor
        name_and_type_index: u16,
    },
    /// Class method reference
    MethodRef {
        /// Owning class
        class_index: u16,
        /// Method name and descriptor
        name_and_type_index: u16,
    },
    /// Interface method reference
    InterfaceMethodRef {
        /// Owning interface
        class_index: u16,
        /// Method name and descriptor
        name_and_type_index: u16,
    },
    /// Member name and descriptor pair
    NameAndType {
        /// Utf8 entry with the member name
        name_index: u16,
        /// Utf8 entry with the member descriptor
        descriptor_index: u16,
    },
    /// Method handle
    MethodHandle {
        /// Kind of access the handle performs
        kind: ReferenceKind,
        /// Field or method reference the handle targets
        reference_index: u16,
    },
    /// Method type
    MethodType {
        /// Utf8 entry with the method descriptor
        descriptor_index: u16,
    },
    /// Dynamically computed constant
    Dynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method_attr_index: u16,
        /// Name and field descriptor
        name_and_type_index: u16,
    },
    /// Call site specifier for `invokedynamic`
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method_attr_index: u16,
        /// Name and method descriptor
        name_and_type_index: u16,
    },
    /// Module name
    Module {
        /// Utf8 entry with the module name
        name_index: u16,
    },
    /// Package name
    Package {
        /// Utf8 entry with the package name
        name_index: u16,
    },
    /// Slot 0 and the second slot of `Long`/`Double` entries
    Unused,
}

impl ConstantPoolEntry {
    /// The tag byte this entry is encoded with, `None` for [`ConstantPoolEntry::Unused`].
    #[must_use]
    pub fn tag(&self) -> Option<u8> {
        let tag = match self {
            ConstantPoolEntry::Utf8(_) => tags::UTF8,
            ConstantPoolEntry::Integer(_) => tags::INTEGER,
            ConstantPoolEntry::Float(_) => tags::FLOAT,
            ConstantPoolEntry::Long(_) => tags::LONG,
            ConstantPoolEntry::Double(_) => tags::DOUBLE,
            ConstantPoolEntry::Class { .. } => tags::CLASS,
            ConstantPoolEntry::String { .. } => tags::STRING,
            ConstantPoolEntry::FieldRef { .. } => tags::FIELDREF,
            ConstantPoolEntry::MethodRef { .. } => tags::METHODREF,
            ConstantPoolEntry::InterfaceMethodRef { .. } => tags::INTERFACE_METHODREF,
            ConstantPoolEntry::NameAndType { .. } => tags::NAME_AND_TYPE,
            ConstantPoolEntry::MethodHandle { .. } => tags::METHOD_HANDLE,
            ConstantPoolEntry::MethodType { .. } => tags::METHOD_TYPE,
            ConstantPoolEntry::Dynamic { .. } => tags::DYNAMIC,
            ConstantPoolEntry::InvokeDynamic { .. } => tags::INVOKE_DYNAMIC,
            ConstantPoolEntry::Module { .. } => tags::MODULE,
            ConstantPoolEntry::Package { .. } => tags::PACKAGE,
            ConstantPoolEntry::Unused => return None,
        };
        Some(tag)
    }

    /// True for entries that occupy two pool slots.
    #[must_use]
    pub fn is_wide(&self) -> bool {
        matches!(self, ConstantPoolEntry::Long(_) | ConstantPoolEntry::Double(_))
    }

    /// Short human-readable name of the entry kind, used in error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            ConstantPoolEntry::Utf8(_) => "Utf8",
            ConstantPoolEntry::Integer(_) => "Integer",
            ConstantPoolEntry::Float(_) => "Float",
            ConstantPoolEntry::Long(_) => "Long",
            ConstantPoolEntry::Double(_) => "Double",
            ConstantPoolEntry::Class { .. } => "Class",
            ConstantPoolEntry::String { .. } => "String",
            ConstantPoolEntry::FieldRef { .. } => "Fieldref",
            ConstantPoolEntry::MethodRef { .. } => "Methodref",
            ConstantPoolEntry::InterfaceMethodRef { .. } => "InterfaceMethodref",
            ConstantPoolEntry::NameAndType { .. } => "NameAndType",
            ConstantPoolEntry::MethodHandle { .. } => "MethodHandle",
            ConstantPoolEntry::MethodType { .. } => "MethodType",
            ConstantPoolEntry::Dynamic { .. } => "Dynamic",
            ConstantPoolEntry::InvokeDynamic { .. } => "InvokeDynamic",
            ConstantPoolEntry::Module { .. } => "Module",
            ConstantPoolEntry::Package { .. } => "Package",
            ConstantPoolEntry::Unused => "Unused",
        }
    }
}
