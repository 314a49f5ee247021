//! Sequential reader for the class-file format.

use crate::{
    classfile::{
        attributes::Attribute,
        flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags},
        model::{ClassModel, FieldModel, MethodModel},
        signature::{FieldType, MethodSignature},
        ConstantPool,
    },
    file::{parser::Parser, CLASS_MAGIC},
    Error, Result,
};

/// Reads a class file front to back into a [`ClassModel`].
///
/// The layout is fixed: magic, version, constant pool, class header, interfaces,
/// fields, methods and class attributes. Everything after the constant pool refers into
/// it, so the pool is read first and then used to resolve names and descriptors.
///
/// # Examples
///
/// ```rust,ignore
/// use classscope::ClassFileParser;
///
/// let class = ClassFileParser::parse(&std::fs::read("Main.class")?)?;
/// println!("{} has {} methods", class.this_class, class.methods.len());
/// ```
pub struct ClassFileParser<'a> {
    parser: Parser<'a>,
    pool: ConstantPool,
}

impl<'a> ClassFileParser<'a> {
    /// Parses a complete class file.
    ///
    /// # Errors
    /// - [`Error::Empty`] for empty input
    /// - [`Error::Malformed`] for a bad magic number, invalid descriptors or attributes
    /// - [`Error::UnknownConstantTag`] for unknown constant pool tags
    /// - [`Error::InvalidConstant`] for dangling or mistyped pool references
    /// - [`Error::OutOfBounds`] for truncated input
    pub fn parse(data: &'a [u8]) -> Result<ClassModel> {
        if data.is_empty() {
            return Err(Error::Empty);
        }

        let mut parser = Parser::new(data);
        let magic = parser.read_be::<u32>()?;
        if magic != CLASS_MAGIC {
            return Err(malformed_error!("Invalid class magic {:#010x}", magic));
        }
        let minor_version = parser.read_be::<u16>()?;
        let major_version = parser.read_be::<u16>()?;
        let pool = ConstantPool::read(&mut parser)?;

        let mut reader = ClassFileParser { parser, pool };
        reader.read_class(minor_version, major_version)
    }

    fn read_class(&mut self, minor_version: u16, major_version: u16) -> Result<ClassModel> {
        let access_flags = ClassAccessFlags::from_bits_retain(self.parser.read_be::<u16>()?);
        let this_class = self.pool.class_name(self.parser.read_be::<u16>()?)?.to_string();
        let super_class = match self.parser.read_be::<u16>()? {
            0 if this_class == "java/lang/Object" || access_flags.contains(ClassAccessFlags::MODULE) => None,
            0 => {
                return Err(malformed_error!(
                    "Class {} has no superclass",
                    this_class
                ))
            }
            index => Some(self.pool.class_name(index)?.to_string()),
        };

        let interface_count = self.parser.read_be::<u16>()?;
        let mut interfaces = Vec::with_capacity(usize::from(interface_count));
        for _ in 0..interface_count {
            interfaces.push(self.pool.class_name(self.parser.read_be::<u16>()?)?.to_string());
        }

        let field_count = self.parser.read_be::<u16>()?;
        let mut fields = Vec::with_capacity(usize::from(field_count));
        for _ in 0..field_count {
            fields.push(self.read_field()?);
        }

        let method_count = self.parser.read_be::<u16>()?;
        let mut methods = Vec::with_capacity(usize::from(method_count));
        for _ in 0..method_count {
            methods.push(self.read_method()?);
        }

        let attributes = Attribute::read_all(&mut self.parser, &self.pool)?;
        if self.parser.has_more_data() {
            return Err(malformed_error!(
                "{} trailing bytes after class {}",
                self.parser.remaining(),
                this_class
            ));
        }

        Ok(ClassModel {
            minor_version,
            major_version,
            pool: std::mem::take(&mut self.pool),
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    fn read_field(&mut self) -> Result<FieldModel> {
        let access_flags = FieldAccessFlags::from_bits_retain(self.parser.read_be::<u16>()?);
        let name = self.pool.utf8(self.parser.read_be::<u16>()?)?.to_string();
        let descriptor = self.pool.utf8(self.parser.read_be::<u16>()?)?.to_string();
        let field_type = FieldType::parse(&descriptor)?;
        let attributes = Attribute::read_all(&mut self.parser, &self.pool)?;

        Ok(FieldModel {
            access_flags,
            name,
            descriptor,
            field_type,
            attributes,
        })
    }

    fn read_method(&mut self) -> Result<MethodModel> {
        let access_flags = MethodAccessFlags::from_bits_retain(self.parser.read_be::<u16>()?);
        let name = self.pool.utf8(self.parser.read_be::<u16>()?)?.to_string();
        let descriptor = self.pool.utf8(self.parser.read_be::<u16>()?)?.to_string();
        let signature = MethodSignature::parse(&descriptor)?;
        let attributes = Attribute::read_all(&mut self.parser, &self.pool)?;

        Ok(MethodModel {
            access_flags,
            name,
            descriptor,
            signature,
            attributes,
        })
    }
}
