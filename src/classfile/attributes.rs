//! Class, field, method and code attributes.
//!
//! Attributes are dispatched by name. The ones the compiler needs are decoded into
//! typed values with their constant pool references resolved; every other attribute is
//! kept as [`Attribute::Unknown`] with its raw bytes, so newer class files never fail to
//! parse because of an attribute this crate does not know.

use crate::{
    bytecode::Address,
    classfile::{constant::ConstantPoolEntry, ConstantPool},
    file::{io::write_be, parser::Parser},
    Result,
};

/// Attribute names with a typed representation.
#[allow(missing_docs)]
pub mod names {
    pub const CODE: &str = "Code";
    pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
    pub const BOOTSTRAP_METHODS: &str = "BootstrapMethods";
    pub const CONSTANT_VALUE: &str = "ConstantValue";
    pub const SOURCE_FILE: &str = "SourceFile";
    pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
}

/// One entry of a `Code` attribute's exception table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    /// First guarded instruction (inclusive)
    pub start_pc: Address,
    /// End of the guarded range (exclusive)
    pub end_pc: Address,
    /// First instruction of the handler
    pub handler_pc: Address,
    /// Caught class, `None` for handlers that catch everything (`finally`)
    pub catch_type: Option<String>,
}

impl ExceptionTableEntry {
    /// True for catch-all handlers, which compilers emit for `finally` blocks.
    #[must_use]
    pub fn is_finally(&self) -> bool {
        self.catch_type.is_none()
    }

    /// True if `address` lies inside the guarded range.
    #[must_use]
    pub fn covers(&self, address: Address) -> bool {
        self.start_pc <= address && address < self.end_pc
    }
}

/// The `Code` attribute of a method.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeAttribute {
    /// Maximum operand stack depth
    pub max_stack: u16,
    /// Number of local variable slots, including parameters
    pub max_locals: u16,
    /// Raw instruction bytes
    pub code: Vec<u8>,
    /// Exception handlers in priority order
    pub exception_table: Vec<ExceptionTableEntry>,
    /// Nested attributes such as `LocalVariableTable`
    pub attributes: Vec<Attribute>,
}

impl CodeAttribute {
    /// A body without handlers or nested attributes.
    #[must_use]
    pub fn new(max_stack: u16, max_locals: u16, code: Vec<u8>) -> Self {
        CodeAttribute {
            max_stack,
            max_locals,
            code,
            exception_table: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Appends an exception handler guarding `start..end`.
    #[must_use]
    pub fn with_handler(
        mut self,
        start: u32,
        end: u32,
        handler: u32,
        catch_type: Option<&str>,
    ) -> Self {
        self.exception_table.push(ExceptionTableEntry {
            start_pc: Address::new(start),
            end_pc: Address::new(end),
            handler_pc: Address::new(handler),
            catch_type: catch_type.map(str::to_string),
        });
        self
    }

    /// All `LocalVariableTable` entries of this method.
    pub fn local_variables(&self) -> impl Iterator<Item = &LocalVariable> + '_ {
        self.attributes.iter().flat_map(|attribute| match attribute {
            Attribute::LocalVariableTable(entries) => entries.as_slice(),
            _ => &[],
        })
    }

    /// Name of the local variable in `slot` that is live at `address`.
    #[must_use]
    pub fn local_variable_name(&self, slot: u16, address: Address) -> Option<&str> {
        self.local_variables()
            .find(|variable| {
                let start = u32::from(variable.start_pc);
                variable.index == slot
                    && start <= address.value()
                    && address.value() <= start + u32::from(variable.length)
            })
            .map(|variable| variable.name.as_str())
    }
}

/// One `LocalVariableTable` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    /// First address where the variable has a value
    pub start_pc: u16,
    /// Length of the live range in bytes
    pub length: u16,
    /// Source-level name
    pub name: String,
    /// Field descriptor of the variable's type
    pub descriptor: String,
    /// Local slot
    pub index: u16,
}

/// One entry of the `BootstrapMethods` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapMethod {
    /// `CONSTANT_MethodHandle` of the bootstrap method
    pub method_ref: u16,
    /// Loadable constants passed as static arguments
    pub arguments: Vec<u16>,
}

/// A runtime-visible annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Field descriptor of the annotation interface, e.g. `Ljava/lang/Deprecated;`
    pub type_descriptor: String,
    /// Element name and value pairs
    pub elements: Vec<(String, ElementValue)>,
}

/// Value of an annotation element.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    /// Primitive or string constant; `tag` is one of `BCDFIJSZs`
    Const {
        /// Descriptor character of the constant's type
        tag: u8,
        /// The constant, resolved from the owning class's pool
        value: ConstantPoolEntry,
    },
    /// Enum constant
    Enum {
        /// Field descriptor of the enum class
        type_descriptor: String,
        /// Simple name of the constant
        const_name: String,
    },
    /// Class literal, as a return descriptor (`V` for `void.class`)
    Class(String),
    /// Nested annotation
    Annotation(Annotation),
    /// Array of values
    Array(Vec<ElementValue>),
}

/// A parsed attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    /// Method body
    Code(CodeAttribute),
    /// Debug names of local variables
    LocalVariableTable(Vec<LocalVariable>),
    /// Bootstrap methods of `invokedynamic` call sites
    BootstrapMethods(Vec<BootstrapMethod>),
    /// Constant initializer of a static field, as a pool index
    ConstantValue(u16),
    /// Name of the source file
    SourceFile(String),
    /// Annotations visible through reflection
    RuntimeVisibleAnnotations(Vec<Annotation>),
    /// Any other attribute, kept verbatim
    Unknown {
        /// Attribute name
        name: String,
        /// Raw attribute contents
        data: Vec<u8>,
    },
}

impl Attribute {
    /// Reads an `attributes_count` followed by that many attributes.
    ///
    /// # Errors
    /// Returns an error if an attribute is truncated or a known attribute is malformed.
    pub fn read_all(parser: &mut Parser, pool: &ConstantPool) -> Result<Vec<Attribute>> {
        let count = parser.read_be::<u16>()?;
        let mut attributes = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            attributes.push(Attribute::read(parser, pool)?);
        }
        Ok(attributes)
    }

    /// Reads one attribute.
    ///
    /// # Errors
    /// Returns an error if the attribute is truncated, its name is not a Utf8 constant,
    /// or a known attribute's contents are malformed.
    pub fn read(parser: &mut Parser, pool: &ConstantPool) -> Result<Attribute> {
        let name = pool.utf8(parser.read_be::<u16>()?)?;
        let data = parser.read_u32_prefixed()?;
        let mut body = Parser::new(data);

        let attribute = match name {
            names::CODE => Attribute::Code(read_code(&mut body, pool)?),
            names::LOCAL_VARIABLE_TABLE => {
                let count = body.read_be::<u16>()?;
                let mut entries = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    entries.push(LocalVariable {
                        start_pc: body.read_be::<u16>()?,
                        length: body.read_be::<u16>()?,
                        name: pool.utf8(body.read_be::<u16>()?)?.to_string(),
                        descriptor: pool.utf8(body.read_be::<u16>()?)?.to_string(),
                        index: body.read_be::<u16>()?,
                    });
                }
                Attribute::LocalVariableTable(entries)
            }
            names::BOOTSTRAP_METHODS => {
                let count = body.read_be::<u16>()?;
                let mut methods = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    let method_ref = body.read_be::<u16>()?;
                    let argument_count = body.read_be::<u16>()?;
                    let mut arguments = Vec::with_capacity(usize::from(argument_count));
                    for _ in 0..argument_count {
                        arguments.push(body.read_be::<u16>()?);
                    }
                    methods.push(BootstrapMethod {
                        method_ref,
                        arguments,
                    });
                }
                Attribute::BootstrapMethods(methods)
            }
            names::CONSTANT_VALUE => Attribute::ConstantValue(body.read_be::<u16>()?),
            names::SOURCE_FILE => {
                Attribute::SourceFile(pool.utf8(body.read_be::<u16>()?)?.to_string())
            }
            names::RUNTIME_VISIBLE_ANNOTATIONS => {
                let count = body.read_be::<u16>()?;
                let mut annotations = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    annotations.push(read_annotation(&mut body, pool)?);
                }
                Attribute::RuntimeVisibleAnnotations(annotations)
            }
            _ => {
                return Ok(Attribute::Unknown {
                    name: name.to_string(),
                    data: data.to_vec(),
                })
            }
        };

        if body.has_more_data() {
            return Err(malformed_error!(
                "{} attribute has {} trailing bytes",
                name,
                body.remaining()
            ));
        }
        Ok(attribute)
    }

    /// The attribute's name as stored in the class file.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Attribute::Code(_) => names::CODE,
            Attribute::LocalVariableTable(_) => names::LOCAL_VARIABLE_TABLE,
            Attribute::BootstrapMethods(_) => names::BOOTSTRAP_METHODS,
            Attribute::ConstantValue(_) => names::CONSTANT_VALUE,
            Attribute::SourceFile(_) => names::SOURCE_FILE,
            Attribute::RuntimeVisibleAnnotations(_) => names::RUNTIME_VISIBLE_ANNOTATIONS,
            Attribute::Unknown { name, .. } => name,
        }
    }

    /// Encodes the attribute, interning every string it references into `pool`.
    ///
    /// # Errors
    /// Returns an error if the pool overflows or the contents exceed the format's size
    /// limits.
    pub fn encode(&self, pool: &mut ConstantPool, out: &mut Vec<u8>) -> Result<()> {
        write_be(out, intern_utf8(pool, self.name())?);

        let mut body = Vec::new();
        match self {
            Attribute::Code(code) => {
                write_be(&mut body, code.max_stack);
                write_be(&mut body, code.max_locals);
                write_be(&mut body, length_u32(code.code.len())?);
                body.extend_from_slice(&code.code);
                write_be(&mut body, length_u16(code.exception_table.len())?);
                for entry in &code.exception_table {
                    write_be(&mut body, address_u16(entry.start_pc)?);
                    write_be(&mut body, address_u16(entry.end_pc)?);
                    write_be(&mut body, address_u16(entry.handler_pc)?);
                    let catch_type = match &entry.catch_type {
                        Some(class) => intern_class(pool, class)?,
                        None => 0,
                    };
                    write_be(&mut body, catch_type);
                }
                encode_all(&code.attributes, pool, &mut body)?;
            }
            Attribute::LocalVariableTable(entries) => {
                write_be(&mut body, length_u16(entries.len())?);
                for entry in entries {
                    write_be(&mut body, entry.start_pc);
                    write_be(&mut body, entry.length);
                    write_be(&mut body, intern_utf8(pool, &entry.name)?);
                    write_be(&mut body, intern_utf8(pool, &entry.descriptor)?);
                    write_be(&mut body, entry.index);
                }
            }
            Attribute::BootstrapMethods(methods) => {
                write_be(&mut body, length_u16(methods.len())?);
                for method in methods {
                    write_be(&mut body, method.method_ref);
                    write_be(&mut body, length_u16(method.arguments.len())?);
                    for argument in &method.arguments {
                        write_be(&mut body, *argument);
                    }
                }
            }
            Attribute::ConstantValue(index) => write_be(&mut body, *index),
            Attribute::SourceFile(name) => write_be(&mut body, intern_utf8(pool, name)?),
            Attribute::RuntimeVisibleAnnotations(annotations) => {
                write_be(&mut body, length_u16(annotations.len())?);
                for annotation in annotations {
                    encode_annotation(annotation, pool, &mut body)?;
                }
            }
            Attribute::Unknown { data, .. } => body.extend_from_slice(data),
        }

        write_be(out, length_u32(body.len())?);
        out.extend_from_slice(&body);
        Ok(())
    }
}

/// Encodes `attributes_count` and every attribute.
///
/// # Errors
/// Returns an error if any attribute fails to encode.
pub fn encode_all(attributes: &[Attribute], pool: &mut ConstantPool, out: &mut Vec<u8>) -> Result<()> {
    write_be(out, length_u16(attributes.len())?);
    for attribute in attributes {
        attribute.encode(pool, out)?;
    }
    Ok(())
}

fn read_code(body: &mut Parser, pool: &ConstantPool) -> Result<CodeAttribute> {
    let max_stack = body.read_be::<u16>()?;
    let max_locals = body.read_be::<u16>()?;
    let code = body.read_u32_prefixed()?.to_vec();

    let handler_count = body.read_be::<u16>()?;
    let mut exception_table = Vec::with_capacity(usize::from(handler_count));
    for _ in 0..handler_count {
        let start_pc = Address::new(u32::from(body.read_be::<u16>()?));
        let end_pc = Address::new(u32::from(body.read_be::<u16>()?));
        let handler_pc = Address::new(u32::from(body.read_be::<u16>()?));
        let catch_type = match body.read_be::<u16>()? {
            0 => None,
            index => Some(pool.class_name(index)?.to_string()),
        };
        if start_pc >= end_pc {
            return Err(malformed_error!(
                "Exception range {}..{} is empty",
                start_pc,
                end_pc
            ));
        }
        exception_table.push(ExceptionTableEntry {
            start_pc,
            end_pc,
            handler_pc,
            catch_type,
        });
    }

    Ok(CodeAttribute {
        max_stack,
        max_locals,
        code,
        exception_table,
        attributes: Attribute::read_all(body, pool)?,
    })
}

fn read_annotation(body: &mut Parser, pool: &ConstantPool) -> Result<Annotation> {
    let type_descriptor = pool.utf8(body.read_be::<u16>()?)?.to_string();
    let count = body.read_be::<u16>()?;
    let mut elements = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let name = pool.utf8(body.read_be::<u16>()?)?.to_string();
        elements.push((name, read_element_value(body, pool)?));
    }
    Ok(Annotation {
        type_descriptor,
        elements,
    })
}

fn read_element_value(body: &mut Parser, pool: &ConstantPool) -> Result<ElementValue> {
    let tag = body.read_be::<u8>()?;
    let value = match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => ElementValue::Const {
            tag,
            value: pool.get(body.read_be::<u16>()?)?.clone(),
        },
        b'e' => ElementValue::Enum {
            type_descriptor: pool.utf8(body.read_be::<u16>()?)?.to_string(),
            const_name: pool.utf8(body.read_be::<u16>()?)?.to_string(),
        },
        b'c' => ElementValue::Class(pool.utf8(body.read_be::<u16>()?)?.to_string()),
        b'@' => ElementValue::Annotation(read_annotation(body, pool)?),
        b'[' => {
            let count = body.read_be::<u16>()?;
            let mut values = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                values.push(read_element_value(body, pool)?);
            }
            ElementValue::Array(values)
        }
        _ => {
            return Err(malformed_error!(
                "Invalid annotation element tag {:#04x}",
                tag
            ))
        }
    };
    Ok(value)
}

fn encode_annotation(annotation: &Annotation, pool: &mut ConstantPool, out: &mut Vec<u8>) -> Result<()> {
    write_be(out, intern_utf8(pool, &annotation.type_descriptor)?);
    write_be(out, length_u16(annotation.elements.len())?);
    for (name, value) in &annotation.elements {
        write_be(out, intern_utf8(pool, name)?);
        encode_element_value(value, pool, out)?;
    }
    Ok(())
}

fn encode_element_value(value: &ElementValue, pool: &mut ConstantPool, out: &mut Vec<u8>) -> Result<()> {
    match value {
        ElementValue::Const { tag, value } => {
            out.push(*tag);
            write_be(out, pool.intern(value.clone())?);
        }
        ElementValue::Enum {
            type_descriptor,
            const_name,
        } => {
            out.push(b'e');
            write_be(out, intern_utf8(pool, type_descriptor)?);
            write_be(out, intern_utf8(pool, const_name)?);
        }
        ElementValue::Class(descriptor) => {
            out.push(b'c');
            write_be(out, intern_utf8(pool, descriptor)?);
        }
        ElementValue::Annotation(annotation) => {
            out.push(b'@');
            encode_annotation(annotation, pool, out)?;
        }
        ElementValue::Array(values) => {
            out.push(b'[');
            write_be(out, length_u16(values.len())?);
            for value in values {
                encode_element_value(value, pool, out)?;
            }
        }
    }
    Ok(())
}

pub(crate) fn intern_utf8(pool: &mut ConstantPool, text: &str) -> Result<u16> {
    pool.intern(ConstantPoolEntry::Utf8(text.to_string()))
}

pub(crate) fn intern_class(pool: &mut ConstantPool, name: &str) -> Result<u16> {
    let name_index = intern_utf8(pool, name)?;
    pool.intern(ConstantPoolEntry::Class { name_index })
}

pub(crate) fn length_u16(length: usize) -> Result<u16> {
    u16::try_from(length).map_err(|_| malformed_error!("Table with {} entries exceeds u16", length))
}

fn length_u32(length: usize) -> Result<u32> {
    u32::try_from(length).map_err(|_| malformed_error!("Attribute of {} bytes exceeds u32", length))
}

fn address_u16(address: Address) -> Result<u16> {
    u16::try_from(address.value())
        .map_err(|_| malformed_error!("Address {} exceeds the 64KiB code limit", address))
}
