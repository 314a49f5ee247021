//! Class-file container integration tests.
//!
//! Classes are produced with `ClassWriter`, serialized, and parsed back through the
//! public entry points (`ClassModel::from_bytes`, `ClassModel::from_file`).

use classscope::{
    bytecode::{decode, opcodes::*, CodeAssembler, InstructionKind},
    classfile::{
        Attribute, ClassWriter, CodeAttribute, ConstantPoolEntry, FieldAccessFlags, FieldType,
        MethodAccessFlags,
    },
    ClassModel, Error, Result,
};

/// Offset of the first constant pool entry: magic, minor, major, count.
const FIRST_ENTRY: usize = 10;

#[test]
fn test_two_slot_constants_survive_serialization() -> Result<()> {
    let mut writer = ClassWriter::new("demo/Constants");
    let long = writer.long(-5_000_000_000)?;
    let double = writer.double(2.5)?;
    let after = writer.integer(11)?;
    writer.add_field(
        FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
        "LIMIT",
        "J",
    );

    let bytes = writer.to_bytes()?;
    let class = ClassModel::from_bytes(&bytes)?;

    assert_eq!(class.pool.get(long)?, &ConstantPoolEntry::Long(-5_000_000_000));
    assert_eq!(class.pool.get(long + 1)?, &ConstantPoolEntry::Unused);
    assert_eq!(double, long + 2);
    assert_eq!(class.pool.get(double)?, &ConstantPoolEntry::Double(2.5));
    assert_eq!(class.pool.get(double + 1)?, &ConstantPoolEntry::Unused);
    assert_eq!(after, double + 2);
    assert_eq!(class.pool.get(after)?, &ConstantPoolEntry::Integer(11));
    assert!(class.pool.utf8(long + 1).is_err());

    // A second pass over the parsed bytes yields the same model.
    let again = ClassModel::from_bytes(&bytes)?;
    assert_eq!(again, class);
    Ok(())
}

#[test]
fn test_unknown_constant_tag() -> Result<()> {
    let mut bytes = ClassWriter::new("demo/Broken").to_bytes()?;
    bytes[FIRST_ENTRY] = 2;

    match ClassModel::from_bytes(&bytes) {
        Err(Error::UnknownConstantTag { tag: 2, index: 1, .. }) => Ok(()),
        other => panic!("expected unknown tag error, got {other:?}"),
    }
}

#[test]
fn test_truncated_class_is_rejected() -> Result<()> {
    let bytes = ClassWriter::new("demo/Short").to_bytes()?;
    for length in [0, 4, FIRST_ENTRY, bytes.len() - 1] {
        let error = ClassModel::from_bytes(&bytes[..length]).unwrap_err();
        assert!(error.is_parse_error(), "{length}: {error}");
    }
    Ok(())
}

#[test]
fn test_unknown_attributes_are_opaque() -> Result<()> {
    let mut writer = ClassWriter::new("demo/Annotated");
    writer.add_attribute(Attribute::Unknown {
        name: "org.example.Marker".to_string(),
        data: vec![0xCA, 0xFE, 0x00],
    });
    let class = ClassModel::from_bytes(&writer.to_bytes()?)?;

    assert!(class.attributes.iter().any(|attribute| matches!(
        attribute,
        Attribute::Unknown { name, data } if name == "org.example.Marker" && data == &[0xCA, 0xFE, 0x00]
    )));
    Ok(())
}

#[test]
fn test_methods_and_descriptors() -> Result<()> {
    let mut writer = ClassWriter::new("demo/Shapes");
    let mut asm = CodeAssembler::new();
    asm.local(DLOAD, 1).local(DLOAD, 1).op(DMUL).op(DRETURN);
    writer.add_method(
        MethodAccessFlags::PUBLIC,
        "square",
        "(D)D",
        Some(CodeAttribute::new(4, 3, asm.finish()?)),
    );
    writer.add_method(
        MethodAccessFlags::PUBLIC | MethodAccessFlags::NATIVE,
        "describe",
        "([Ljava/lang/String;J)Ljava/lang/Object;",
        None,
    );
    let class = writer.build()?;

    let square = class.method("square", "(D)D").expect("square");
    assert!(!square.is_static());
    assert_eq!(square.signature.parameter_slots(), 2);
    assert_eq!(square.signature.return_type, Some(FieldType::Double));

    let describe = class
        .method("describe", "([Ljava/lang/String;J)Ljava/lang/Object;")
        .expect("describe");
    assert!(describe.code().is_none());
    assert_eq!(
        describe.signature.parameters,
        vec![
            FieldType::Array(Box::new(FieldType::Object("java/lang/String".into()))),
            FieldType::Long
        ]
    );
    assert_eq!(describe.signature.parameter_slots(), 3);

    let instructions = decode(&square.code().expect("code").code)?;
    let kinds: Vec<&InstructionKind> = instructions.iter().map(|i| &i.kind).collect();
    assert_eq!(kinds.len(), 4);
    assert!(matches!(kinds[3], InstructionKind::Return(Some(_))));
    Ok(())
}

#[test]
fn test_from_file_maps_the_class() -> Result<()> {
    let bytes = ClassWriter::new("demo/OnDisk").to_bytes()?;
    let path = std::env::temp_dir().join(format!("classscope-{}.class", std::process::id()));
    std::fs::write(&path, &bytes)?;

    let class = ClassModel::from_file(&path);
    std::fs::remove_file(&path)?;
    assert_eq!(class?.this_class, "demo/OnDisk");

    let missing = ClassModel::from_file(&path);
    assert!(matches!(missing, Err(Error::FileError(_))));
    Ok(())
}
