//! The constant pool: a 1-indexed table of typed constants.
//!
//! Slot 0 is never valid, and `Long`/`Double` entries consume two slots with the second
//! one holding [`ConstantPoolEntry::Unused`]. Getting this wrong shifts every later
//! index, so [`ConstantPool::read`] is the only place that lays out slots for parsed
//! input and [`ConstantPool::push`] the only one for built pools.
//!
//! Cross-references are resolved lazily by the typed accessors, which return
//! [`Error::InvalidConstant`] for index 0, out-of-range indices and entries of the wrong
//! kind.

use crate::{
    classfile::{
        constant::{tags, ConstantPoolEntry, ReferenceKind},
        mutf8,
    },
    file::{io::write_be, parser::Parser},
    Error, Result,
};

/// Which kind of member a reference entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// `CONSTANT_Fieldref`
    Field,
    /// `CONSTANT_Methodref`
    Method,
    /// `CONSTANT_InterfaceMethodref`
    InterfaceMethod,
}

/// A resolved field or method reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    /// Internal name of the owning class
    pub class: &'a str,
    /// Member name
    pub name: &'a str,
    /// Field or method descriptor
    pub descriptor: &'a str,
    /// Kind of the referencing entry
    pub kind: MemberKind,
}

/// A resolved `CONSTANT_InvokeDynamic` or `CONSTANT_Dynamic` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicRef<'a> {
    /// Index into the class's `BootstrapMethods` attribute
    pub bootstrap_method: u16,
    /// Name of the call site or constant
    pub name: &'a str,
    /// Method descriptor (call sites) or field descriptor (constants)
    pub descriptor: &'a str,
}

/// The constant pool of one class file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPool {
    /// Entry 0 is always [`ConstantPoolEntry::Unused`]
    entries: Vec<ConstantPoolEntry>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    /// Creates an empty pool, holding only the invalid slot 0.
    #[must_use]
    pub fn new() -> Self {
        ConstantPool {
            entries: vec![ConstantPoolEntry::Unused],
        }
    }

    /// Reads the `constant_pool_count` and all entries.
    ///
    /// # Errors
    /// Returns [`Error::UnknownConstantTag`] with the offending index and the pool size,
    /// [`Error::Malformed`] for invalid method handle kinds or text, and
    /// [`Error::OutOfBounds`] on truncated input.
    pub fn read(parser: &mut Parser) -> Result<ConstantPool> {
        let count = parser.read_be::<u16>()?;
        if count == 0 {
            return Err(malformed_error!("Constant pool count must be at least 1"));
        }

        let mut entries = Vec::with_capacity(usize::from(count));
        entries.push(ConstantPoolEntry::Unused);

        let mut index = 1_u16;
        while index < count {
            let tag = parser.read_be::<u8>()?;
            let entry = match tag {
                tags::UTF8 => ConstantPoolEntry::Utf8(mutf8::decode(parser.read_u16_prefixed()?)?),
                tags::INTEGER => ConstantPoolEntry::Integer(parser.read_be::<i32>()?),
                tags::FLOAT => ConstantPoolEntry::Float(parser.read_be::<f32>()?),
                tags::LONG => ConstantPoolEntry::Long(parser.read_be::<i64>()?),
                tags::DOUBLE => ConstantPoolEntry::Double(parser.read_be::<f64>()?),
                tags::CLASS => ConstantPoolEntry::Class {
                    name_index: parser.read_be::<u16>()?,
                },
                tags::STRING => ConstantPoolEntry::String {
                    string_index: parser.read_be::<u16>()?,
                },
                tags::FIELDREF => ConstantPoolEntry::FieldRef {
                    class_index: parser.read_be::<u16>()?,
                    name_and_type_index: parser.read_be::<u16>()?,
                },
                tags::METHODREF => ConstantPoolEntry::MethodRef {
                    class_index: parser.read_be::<u16>()?,
                    name_and_type_index: parser.read_be::<u16>()?,
                },
                tags::INTERFACE_METHODREF => ConstantPoolEntry::InterfaceMethodRef {
                    class_index: parser.read_be::<u16>()?,
                    name_and_type_index: parser.read_be::<u16>()?,
                },
                tags::NAME_AND_TYPE => ConstantPoolEntry::NameAndType {
                    name_index: parser.read_be::<u16>()?,
                    descriptor_index: parser.read_be::<u16>()?,
                },
                tags::METHOD_HANDLE => {
                    let raw_kind = parser.read_be::<u8>()?;
                    let kind = ReferenceKind::from_repr(raw_kind).ok_or_else(|| {
                        malformed_error!(
                            "Invalid method handle kind {} at constant #{}",
                            raw_kind,
                            index
                        )
                    })?;
                    ConstantPoolEntry::MethodHandle {
                        kind,
                        reference_index: parser.read_be::<u16>()?,
                    }
                }
                tags::METHOD_TYPE => ConstantPoolEntry::MethodType {
                    descriptor_index: parser.read_be::<u16>()?,
                },
                tags::DYNAMIC => ConstantPoolEntry::Dynamic {
                    bootstrap_method_attr_index: parser.read_be::<u16>()?,
                    name_and_type_index: parser.read_be::<u16>()?,
                },
                tags::INVOKE_DYNAMIC => ConstantPoolEntry::InvokeDynamic {
                    bootstrap_method_attr_index: parser.read_be::<u16>()?,
                    name_and_type_index: parser.read_be::<u16>()?,
                },
                tags::MODULE => ConstantPoolEntry::Module {
                    name_index: parser.read_be::<u16>()?,
                },
                tags::PACKAGE => ConstantPoolEntry::Package {
                    name_index: parser.read_be::<u16>()?,
                },
                _ => return Err(Error::UnknownConstantTag { tag, index, count }),
            };

            let wide = entry.is_wide();
            entries.push(entry);
            index += 1;
            if wide {
                if index >= count {
                    return Err(malformed_error!(
                        "Eight-byte constant #{} overflows the pool",
                        index - 1
                    ));
                }
                entries.push(ConstantPoolEntry::Unused);
                index += 1;
            }
        }

        Ok(ConstantPool { entries })
    }

    /// Appends an entry and returns its index. Eight-byte entries reserve their second
    /// slot.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the pool would exceed 65535 slots.
    pub fn push(&mut self, entry: ConstantPoolEntry) -> Result<u16> {
        let index = u16::try_from(self.entries.len())
            .map_err(|_| malformed_error!("Constant pool is full"))?;
        let slots = if entry.is_wide() { 2 } else { 1 };
        if usize::from(index) + slots > usize::from(u16::MAX) {
            return Err(malformed_error!("Constant pool is full"));
        }

        let wide = entry.is_wide();
        self.entries.push(entry);
        if wide {
            self.entries.push(ConstantPoolEntry::Unused);
        }
        Ok(index)
    }

    /// Returns the index of an existing identical entry, or appends it.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the pool is full.
    pub fn intern(&mut self, entry: ConstantPoolEntry) -> Result<u16> {
        if entry != ConstantPoolEntry::Unused {
            if let Some(position) = self.entries.iter().skip(1).position(|e| *e == entry) {
                return u16::try_from(position + 1).map_err(|_| out_of_bounds_error!());
            }
        }
        self.push(entry)
    }

    /// Writes `constant_pool_count` and all entries in class-file format.
    pub fn encode(&self, out: &mut Vec<u8>) {
        write_be(out, u16::try_from(self.entries.len()).unwrap_or(u16::MAX));
        for entry in self.entries.iter().skip(1) {
            let Some(tag) = entry.tag() else {
                continue;
            };
            out.push(tag);
            match entry {
                ConstantPoolEntry::Utf8(text) => {
                    let bytes = mutf8::encode(text);
                    write_be(out, u16::try_from(bytes.len()).unwrap_or(u16::MAX));
                    out.extend_from_slice(&bytes);
                }
                ConstantPoolEntry::Integer(value) => write_be(out, *value),
                ConstantPoolEntry::Float(value) => write_be(out, *value),
                ConstantPoolEntry::Long(value) => write_be(out, *value),
                ConstantPoolEntry::Double(value) => write_be(out, *value),
                ConstantPoolEntry::Class { name_index: index }
                | ConstantPoolEntry::String {
                    string_index: index,
                }
                | ConstantPoolEntry::MethodType {
                    descriptor_index: index,
                }
                | ConstantPoolEntry::Module { name_index: index }
                | ConstantPoolEntry::Package { name_index: index } => write_be(out, *index),
                ConstantPoolEntry::FieldRef {
                    class_index: first,
                    name_and_type_index: second,
                }
                | ConstantPoolEntry::MethodRef {
                    class_index: first,
                    name_and_type_index: second,
                }
                | ConstantPoolEntry::InterfaceMethodRef {
                    class_index: first,
                    name_and_type_index: second,
                }
                | ConstantPoolEntry::NameAndType {
                    name_index: first,
                    descriptor_index: second,
                }
                | ConstantPoolEntry::Dynamic {
                    bootstrap_method_attr_index: first,
                    name_and_type_index: second,
                }
                | ConstantPoolEntry::InvokeDynamic {
                    bootstrap_method_attr_index: first,
                    name_and_type_index: second,
                } => {
                    write_be(out, *first);
                    write_be(out, *second);
                }
                ConstantPoolEntry::MethodHandle {
                    kind,
                    reference_index,
                } => {
                    out.push(*kind as u8);
                    write_be(out, *reference_index);
                }
                ConstantPoolEntry::Unused => {}
            }
        }
    }

    /// Number of slots including slot 0, i.e. the class file's `constant_pool_count`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the pool holds no entries besides slot 0.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Iterates `(index, entry)` for every slot from 1, including `Unused` slots.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &ConstantPoolEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(i, entry)| u16::try_from(i).ok().map(|i| (i, entry)))
    }

    /// Returns the entry at `index`.
    ///
    /// The second slot of an eight-byte constant is returned as
    /// [`ConstantPoolEntry::Unused`].
    ///
    /// # Errors
    /// Returns [`Error::InvalidConstant`] for index 0 and indices past the end.
    pub fn get(&self, index: u16) -> Result<&ConstantPoolEntry> {
        if index == 0 {
            return Err(Error::InvalidConstant {
                index,
                expected: "entry",
            });
        }
        self.entries
            .get(usize::from(index))
            .ok_or(Error::InvalidConstant {
                index,
                expected: "entry",
            })
    }

    /// Resolves a `CONSTANT_Utf8` entry.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConstant`] if the entry is missing or not Utf8.
    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index) {
            Ok(ConstantPoolEntry::Utf8(text)) => Ok(text),
            _ => Err(Error::InvalidConstant {
                index,
                expected: "Utf8",
            }),
        }
    }

    /// Resolves the internal name of a `CONSTANT_Class` entry.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConstant`] if the entry is missing or not a class.
    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index) {
            Ok(ConstantPoolEntry::Class { name_index }) => self.utf8(*name_index),
            _ => Err(Error::InvalidConstant {
                index,
                expected: "Class",
            }),
        }
    }

    /// Resolves the contents of a `CONSTANT_String` entry.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConstant`] if the entry is missing or not a string.
    pub fn string(&self, index: u16) -> Result<&str> {
        match self.get(index) {
            Ok(ConstantPoolEntry::String { string_index }) => self.utf8(*string_index),
            _ => Err(Error::InvalidConstant {
                index,
                expected: "String",
            }),
        }
    }

    /// Resolves a `CONSTANT_NameAndType` entry into `(name, descriptor)`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConstant`] if the entry is missing or of another kind.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index) {
            Ok(ConstantPoolEntry::NameAndType {
                name_index,
                descriptor_index,
            }) => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            _ => Err(Error::InvalidConstant {
                index,
                expected: "NameAndType",
            }),
        }
    }

    /// Resolves a field, method or interface method reference.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConstant`] if the entry or any entry it refers to is
    /// missing or of the wrong kind.
    pub fn member_ref(&self, index: u16) -> Result<MemberRef<'_>> {
        let (kind, class_index, name_and_type_index) = match self.get(index) {
            Ok(ConstantPoolEntry::FieldRef {
                class_index,
                name_and_type_index,
            }) => (MemberKind::Field, class_index, name_and_type_index),
            Ok(ConstantPoolEntry::MethodRef {
                class_index,
                name_and_type_index,
            }) => (MemberKind::Method, class_index, name_and_type_index),
            Ok(ConstantPoolEntry::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            }) => (MemberKind::InterfaceMethod, class_index, name_and_type_index),
            _ => {
                return Err(Error::InvalidConstant {
                    index,
                    expected: "Fieldref or Methodref",
                })
            }
        };

        let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
        Ok(MemberRef {
            class: self.class_name(*class_index)?,
            name,
            descriptor,
            kind,
        })
    }

    /// Resolves a `CONSTANT_MethodHandle` into its kind and target member.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConstant`] if the entry or its target is invalid.
    pub fn method_handle(&self, index: u16) -> Result<(ReferenceKind, MemberRef<'_>)> {
        match self.get(index) {
            Ok(ConstantPoolEntry::MethodHandle {
                kind,
                reference_index,
            }) => Ok((*kind, self.member_ref(*reference_index)?)),
            _ => Err(Error::InvalidConstant {
                index,
                expected: "MethodHandle",
            }),
        }
    }

    /// Resolves the descriptor of a `CONSTANT_MethodType`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConstant`] if the entry is invalid.
    pub fn method_type(&self, index: u16) -> Result<&str> {
        match self.get(index) {
            Ok(ConstantPoolEntry::MethodType { descriptor_index }) => self.utf8(*descriptor_index),
            _ => Err(Error::InvalidConstant {
                index,
                expected: "MethodType",
            }),
        }
    }

    /// Resolves a `CONSTANT_InvokeDynamic` or `CONSTANT_Dynamic` entry.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConstant`] if the entry is invalid.
    pub fn dynamic(&self, index: u16) -> Result<DynamicRef<'_>> {
        match self.get(index) {
            Ok(
                ConstantPoolEntry::InvokeDynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                }
                | ConstantPoolEntry::Dynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                },
            ) => {
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                Ok(DynamicRef {
                    bootstrap_method: *bootstrap_method_attr_index,
                    name,
                    descriptor,
                })
            }
            _ => Err(Error::InvalidConstant {
                index,
                expected: "InvokeDynamic",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pool() -> ConstantPool {
        let mut pool = ConstantPool::new();
        let owner_name = pool.push(ConstantPoolEntry::Utf8("demo/Owner".into())).unwrap();
        let owner = pool
            .push(ConstantPoolEntry::Class {
                name_index: owner_name,
            })
            .unwrap();
        let name = pool.push(ConstantPoolEntry::Utf8("count".into())).unwrap();
        let descriptor = pool.push(ConstantPoolEntry::Utf8("J".into())).unwrap();
        let nat = pool
            .push(ConstantPoolEntry::NameAndType {
                name_index: name,
                descriptor_index: descriptor,
            })
            .unwrap();
        pool.push(ConstantPoolEntry::Long(1 << 40)).unwrap();
        pool.push(ConstantPoolEntry::FieldRef {
            class_index: owner,
            name_and_type_index: nat,
        })
        .unwrap();
        pool
    }

    #[test]
    fn test_wide_entries_take_two_slots() {
        let pool = sample_pool();
        assert_eq!(pool.get(6).unwrap(), &ConstantPoolEntry::Long(1 << 40));
        assert_eq!(pool.get(7).unwrap(), &ConstantPoolEntry::Unused);
        assert!(matches!(pool.get(8).unwrap(), ConstantPoolEntry::FieldRef { .. }));
        assert_eq!(pool.len(), 9);
    }

    #[test]
    fn test_member_ref() {
        let pool = sample_pool();
        let field = pool.member_ref(8).unwrap();
        assert_eq!(field.class, "demo/Owner");
        assert_eq!(field.name, "count");
        assert_eq!(field.descriptor, "J");
        assert_eq!(field.kind, MemberKind::Field);
    }

    #[test]
    fn test_invalid_references() {
        let pool = sample_pool();
        assert!(matches!(pool.get(0), Err(Error::InvalidConstant { index: 0, .. })));
        assert!(matches!(pool.get(99), Err(Error::InvalidConstant { index: 99, .. })));
        assert!(matches!(
            pool.utf8(2),
            Err(Error::InvalidConstant {
                expected: "Utf8",
                ..
            })
        ));
        assert!(pool.class_name(7).is_err());
    }

    #[test]
    fn test_encode_then_read() {
        let pool = sample_pool();
        let mut bytes = Vec::new();
        pool.encode(&mut bytes);

        let mut parser = Parser::new(&bytes);
        let parsed = ConstantPool::read(&mut parser).unwrap();
        assert_eq!(parsed, pool);
        assert!(!parser.has_more_data());
    }

    #[test]
    fn test_unknown_tag() {
        // count 3, Utf8 "a", then tag 2 (unassigned)
        let bytes = [0x00, 0x03, 0x01, 0x00, 0x01, b'a', 0x02, 0x00];
        let result = ConstantPool::read(&mut Parser::new(&bytes));
        assert!(matches!(
            result,
            Err(Error::UnknownConstantTag {
                tag: 2,
                index: 2,
                count: 3
            })
        ));
    }

    #[test]
    fn test_intern_reuses_entries() {
        let mut pool = ConstantPool::new();
        let first = pool.intern(ConstantPoolEntry::Utf8("x".into())).unwrap();
        let second = pool.intern(ConstantPoolEntry::Utf8("x".into())).unwrap();
        assert_eq!(first, second);
        assert_eq!(pool.len(), 2);
    }
}
