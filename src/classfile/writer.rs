//! Minimal class-file encoder.
//!
//! [`ClassWriter`] produces valid class files from a handful of builder calls. It is
//! the counterpart of [`crate::ClassFileParser`] and is used to build inputs for tests
//! and benchmarks without a Java toolchain. Constants are interned, so requesting the
//! same method reference twice yields the same pool index.
//!
//! # Example
//!
//! ```rust,ignore
//! use classscope::prelude::*;
//!
//! let mut writer = ClassWriter::new("demo/Adder");
//! let mut code = CodeAssembler::new();
//! code.op(opcodes::ILOAD_0).op(opcodes::ILOAD_1).op(opcodes::IADD).op(opcodes::IRETURN);
//! writer.add_method(
//!     MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
//!     "add",
//!     "(II)I",
//!     Some(CodeAttribute::new(2, 2, code.finish()?)),
//! );
//! let class = ClassModel::from_bytes(&writer.to_bytes()?)?;
//! ```

use crate::{
    classfile::{
        attributes::{encode_all, intern_class, intern_utf8, length_u16, Attribute, CodeAttribute},
        constant::{ConstantPoolEntry, ReferenceKind},
        flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags},
        ClassModel, ConstantPool,
    },
    file::{io::write_be, CLASS_MAGIC},
    Result,
};

struct MemberDefinition {
    access_flags: u16,
    name: String,
    descriptor: String,
    attributes: Vec<Attribute>,
}

/// Builder for a single class file.
pub struct ClassWriter {
    pool: ConstantPool,
    minor_version: u16,
    major_version: u16,
    access_flags: ClassAccessFlags,
    this_class: String,
    super_class: Option<String>,
    interfaces: Vec<String>,
    fields: Vec<MemberDefinition>,
    methods: Vec<MemberDefinition>,
    attributes: Vec<Attribute>,
}

impl ClassWriter {
    /// Starts a public Java 8 class extending `java/lang/Object`.
    #[must_use]
    pub fn new(this_class: &str) -> Self {
        ClassWriter {
            pool: ConstantPool::new(),
            minor_version: 0,
            major_version: 52,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class: this_class.to_string(),
            super_class: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Replaces the superclass; `None` is only valid for `java/lang/Object`.
    #[must_use]
    pub fn with_super(mut self, super_class: Option<&str>) -> Self {
        self.super_class = super_class.map(str::to_string);
        self
    }

    /// Replaces the class access flags.
    #[must_use]
    pub fn with_access_flags(mut self, access_flags: ClassAccessFlags) -> Self {
        self.access_flags = access_flags;
        self
    }

    /// Replaces the class-file version.
    #[must_use]
    pub fn with_version(mut self, major_version: u16, minor_version: u16) -> Self {
        self.major_version = major_version;
        self.minor_version = minor_version;
        self
    }

    /// Adds a directly implemented interface.
    pub fn add_interface(&mut self, name: &str) -> &mut Self {
        self.interfaces.push(name.to_string());
        self
    }

    /// Declares a field.
    pub fn add_field(
        &mut self,
        access_flags: FieldAccessFlags,
        name: &str,
        descriptor: &str,
    ) -> &mut Self {
        self.fields.push(MemberDefinition {
            access_flags: access_flags.bits(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            attributes: Vec::new(),
        });
        self
    }

    /// Declares a method; `code` is `None` for abstract and native methods.
    pub fn add_method(
        &mut self,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        code: Option<CodeAttribute>,
    ) -> &mut Self {
        self.methods.push(MemberDefinition {
            access_flags: access_flags.bits(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            attributes: code.map(Attribute::Code).into_iter().collect(),
        });
        self
    }

    /// Adds a class-level attribute.
    pub fn add_attribute(&mut self, attribute: Attribute) -> &mut Self {
        self.attributes.push(attribute);
        self
    }

    /// Direct access to the pool for entries without a dedicated helper.
    pub fn pool_mut(&mut self) -> &mut ConstantPool {
        &mut self.pool
    }

    /// Interns a `CONSTANT_Class`.
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn class_ref(&mut self, name: &str) -> Result<u16> {
        intern_class(&mut self.pool, name)
    }

    /// Interns a `CONSTANT_String`.
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn string(&mut self, value: &str) -> Result<u16> {
        let string_index = intern_utf8(&mut self.pool, value)?;
        self.pool.intern(ConstantPoolEntry::String { string_index })
    }

    /// Interns a `CONSTANT_Integer`.
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn integer(&mut self, value: i32) -> Result<u16> {
        self.pool.intern(ConstantPoolEntry::Integer(value))
    }

    /// Interns a `CONSTANT_Float`.
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn float(&mut self, value: f32) -> Result<u16> {
        self.pool.intern(ConstantPoolEntry::Float(value))
    }

    /// Interns a `CONSTANT_Long`, which occupies two slots.
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn long(&mut self, value: i64) -> Result<u16> {
        self.pool.intern(ConstantPoolEntry::Long(value))
    }

    /// Interns a `CONSTANT_Double`, which occupies two slots.
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn double(&mut self, value: f64) -> Result<u16> {
        self.pool.intern(ConstantPoolEntry::Double(value))
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name_index = intern_utf8(&mut self.pool, name)?;
        let descriptor_index = intern_utf8(&mut self.pool, descriptor)?;
        self.pool.intern(ConstantPoolEntry::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    /// Interns a `CONSTANT_Fieldref`.
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.class_ref(class)?;
        let name_and_type_index = self.name_and_type(name, descriptor)?;
        self.pool.intern(ConstantPoolEntry::FieldRef {
            class_index,
            name_and_type_index,
        })
    }

    /// Interns a `CONSTANT_Methodref`.
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.class_ref(class)?;
        let name_and_type_index = self.name_and_type(name, descriptor)?;
        self.pool.intern(ConstantPoolEntry::MethodRef {
            class_index,
            name_and_type_index,
        })
    }

    /// Interns a `CONSTANT_InterfaceMethodref`.
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn interface_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let class_index = self.class_ref(class)?;
        let name_and_type_index = self.name_and_type(name, descriptor)?;
        self.pool.intern(ConstantPoolEntry::InterfaceMethodRef {
            class_index,
            name_and_type_index,
        })
    }

    /// Interns a `CONSTANT_MethodHandle` for a method reference.
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn method_handle(
        &mut self,
        kind: ReferenceKind,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let reference_index = if kind.is_field_access() {
            self.field_ref(class, name, descriptor)?
        } else {
            self.method_ref(class, name, descriptor)?
        };
        self.pool.intern(ConstantPoolEntry::MethodHandle {
            kind,
            reference_index,
        })
    }

    /// Interns a `CONSTANT_MethodType`.
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn method_type(&mut self, descriptor: &str) -> Result<u16> {
        let descriptor_index = intern_utf8(&mut self.pool, descriptor)?;
        self.pool.intern(ConstantPoolEntry::MethodType { descriptor_index })
    }

    /// Interns a `CONSTANT_InvokeDynamic` call site.
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn invoke_dynamic(&mut self, bootstrap: u16, name: &str, descriptor: &str) -> Result<u16> {
        let name_and_type_index = self.name_and_type(name, descriptor)?;
        self.pool.intern(ConstantPoolEntry::InvokeDynamic {
            bootstrap_method_attr_index: bootstrap,
            name_and_type_index,
        })
    }

    /// Encodes the class.
    ///
    /// The pool is copied first, so the writer can keep being used afterwards.
    ///
    /// # Errors
    /// Returns an error if the pool overflows or a table exceeds the format's limits.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut pool = self.pool.clone();
        let mut body = Vec::new();

        write_be(&mut body, self.access_flags.bits());
        write_be(&mut body, intern_class(&mut pool, &self.this_class)?);
        let super_index = match &self.super_class {
            Some(name) => intern_class(&mut pool, name)?,
            None => 0,
        };
        write_be(&mut body, super_index);

        write_be(&mut body, length_u16(self.interfaces.len())?);
        for interface in &self.interfaces {
            write_be(&mut body, intern_class(&mut pool, interface)?);
        }

        for members in [&self.fields, &self.methods] {
            write_be(&mut body, length_u16(members.len())?);
            for member in members {
                write_be(&mut body, member.access_flags);
                write_be(&mut body, intern_utf8(&mut pool, &member.name)?);
                write_be(&mut body, intern_utf8(&mut pool, &member.descriptor)?);
                encode_all(&member.attributes, &mut pool, &mut body)?;
            }
        }

        encode_all(&self.attributes, &mut pool, &mut body)?;

        let mut out = Vec::with_capacity(body.len() + 256);
        write_be(&mut out, CLASS_MAGIC);
        write_be(&mut out, self.minor_version);
        write_be(&mut out, self.major_version);
        pool.encode(&mut out);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Encodes the class and parses it back.
    ///
    /// # Errors
    /// Returns an error if encoding fails or the result does not parse.
    pub fn build(&self) -> Result<ClassModel> {
        ClassModel::from_bytes(&self.to_bytes()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::opcodes;

    #[test]
    fn test_writes_parseable_class() {
        let mut writer = ClassWriter::new("demo/Point");
        writer.add_interface("java/io/Serializable");
        writer.add_field(FieldAccessFlags::PRIVATE, "x", "I");
        writer.add_method(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            "zero",
            "()I",
            Some(CodeAttribute::new(1, 0, vec![opcodes::ICONST_0, opcodes::IRETURN])),
        );
        writer.add_method(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
            "area",
            "()D",
            None,
        );
        writer.add_attribute(Attribute::SourceFile("Point.java".to_string()));

        let class = writer.build().unwrap();
        assert_eq!(class.this_class, "demo/Point");
        assert_eq!(class.super_class.as_deref(), Some("java/lang/Object"));
        assert_eq!(class.interfaces, vec!["java/io/Serializable".to_string()]);
        assert_eq!(class.field("x").unwrap().descriptor, "I");
        assert_eq!(class.source_file(), Some("Point.java"));

        let zero = class.method("zero", "()I").unwrap();
        assert!(zero.is_static());
        assert_eq!(zero.code().unwrap().code, vec![opcodes::ICONST_0, opcodes::IRETURN]);
        assert!(class.method("area", "()D").unwrap().code().is_none());
    }

    #[test]
    fn test_references_are_interned() {
        let mut writer = ClassWriter::new("demo/Main");
        let first = writer.method_ref("java/io/PrintStream", "println", "(I)V").unwrap();
        let second = writer.method_ref("java/io/PrintStream", "println", "(I)V").unwrap();
        assert_eq!(first, second);

        let long = writer.long(1 << 40).unwrap();
        let next = writer.integer(7).unwrap();
        assert_eq!(next, long + 2);
    }

    #[test]
    fn test_missing_super_is_rejected() {
        let writer = ClassWriter::new("demo/Orphan").with_super(None);
        assert!(writer.build().is_err());
        let object = ClassWriter::new("java/lang/Object").with_super(None);
        assert!(object.build().unwrap().super_class.is_none());
    }
}
