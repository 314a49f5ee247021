//! Decoding of raw `Code` attribute bytes into [`Instruction`]s.
//!
//! [`decode`] walks the whole code array; [`decode_instruction`] decodes exactly one
//! instruction at the parser's position. Addresses are byte offsets from the start of the
//! code array, which is also the base for `tableswitch`/`lookupswitch` padding.

use crate::{
    bytecode::{
        opcodes::*, Address, ArithmeticOp, ArrayKind, CompareOp, Condition, ConvertTarget,
        Instruction, InstructionKind, InvokeKind, NumericKind, ValueKind,
    },
    file::parser::Parser,
    Result,
};

/// Decodes every instruction of a method's code array.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for unknown opcodes or invalid operands and
/// [`crate::Error::OutOfBounds`] if the last instruction is truncated.
///
/// # Examples
///
/// ```rust,ignore
/// use classscope::bytecode::decode;
///
/// // iload_0, iload_1, iadd, ireturn
/// let instructions = decode(&[0x1a, 0x1b, 0x60, 0xac])?;
/// assert_eq!(instructions.len(), 4);
/// ```
pub fn decode(code: &[u8]) -> Result<Vec<Instruction>> {
    if code.is_empty() {
        return Err(malformed_error!("Code attribute without instructions"));
    }

    let mut parser = Parser::new(code);
    // Most instructions are one to three bytes long
    let mut instructions = Vec::with_capacity(code.len() / 2);
    while parser.has_more_data() {
        instructions.push(decode_instruction(&mut parser)?);
    }

    Ok(instructions)
}

/// Decodes the instruction at the parser's current position.
///
/// The parser must be positioned on the code array itself (position 0 is address 0), as
/// switch padding is computed from it.
///
/// # Errors
/// Returns an error for unknown opcodes, invalid `wide` targets, inverted `tableswitch`
/// ranges, negative `lookupswitch` sizes and truncated operands.
pub fn decode_instruction(parser: &mut Parser) -> Result<Instruction> {
    let start = parser.pos();
    let address = Address::new(u32::try_from(start).map_err(|_| out_of_bounds_error!())?);
    let mut opcode = parser.read_be::<u8>()?;

    let kind = match opcode {
        NOP => InstructionKind::Nop,
        ACONST_NULL => InstructionKind::ConstNull,
        ICONST_M1..=ICONST_5 => InstructionKind::ConstInt(i32::from(opcode) - i32::from(ICONST_0)),
        LCONST_0 | LCONST_1 => InstructionKind::ConstLong(i64::from(opcode - LCONST_0)),
        FCONST_0..=FCONST_2 => InstructionKind::ConstFloat(f32::from(opcode - FCONST_0)),
        DCONST_0 | DCONST_1 => InstructionKind::ConstDouble(f64::from(opcode - DCONST_0)),
        BIPUSH => InstructionKind::ConstInt(i32::from(parser.read_be::<i8>()?)),
        SIPUSH => InstructionKind::ConstInt(i32::from(parser.read_be::<i16>()?)),
        LDC => InstructionKind::LoadConstant(u16::from(parser.read_be::<u8>()?)),
        LDC_W | LDC2_W => InstructionKind::LoadConstant(parser.read_be::<u16>()?),

        ILOAD..=ALOAD => InstructionKind::Load {
            kind: slot_kind(opcode - ILOAD),
            slot: u16::from(parser.read_be::<u8>()?),
        },
        ILOAD_0..=ALOAD_3 => {
            let relative = opcode - ILOAD_0;
            InstructionKind::Load {
                kind: slot_kind(relative / 4),
                slot: u16::from(relative % 4),
            }
        }
        IALOAD..=SALOAD => InstructionKind::ArrayLoad(array_kind(opcode - IALOAD)),

        ISTORE..=ASTORE => InstructionKind::Store {
            kind: slot_kind(opcode - ISTORE),
            slot: u16::from(parser.read_be::<u8>()?),
        },
        ISTORE_0..=ASTORE_3 => {
            let relative = opcode - ISTORE_0;
            InstructionKind::Store {
                kind: slot_kind(relative / 4),
                slot: u16::from(relative % 4),
            }
        }
        IASTORE..=SASTORE => InstructionKind::ArrayStore(array_kind(opcode - IASTORE)),

        POP => InstructionKind::Pop,
        POP2 => InstructionKind::Pop2,
        DUP => InstructionKind::Dup,
        DUP_X1 => InstructionKind::DupX1,
        DUP_X2 => InstructionKind::DupX2,
        DUP2 => InstructionKind::Dup2,
        DUP2_X1 => InstructionKind::Dup2X1,
        DUP2_X2 => InstructionKind::Dup2X2,
        SWAP => InstructionKind::Swap,

        IADD..=DREM => {
            let relative = opcode - IADD;
            let op = match relative / 4 {
                0 => ArithmeticOp::Add,
                1 => ArithmeticOp::Sub,
                2 => ArithmeticOp::Mul,
                3 => ArithmeticOp::Div,
                _ => ArithmeticOp::Rem,
            };
            InstructionKind::Arithmetic {
                op,
                kind: numeric_kind(relative % 4),
            }
        }
        INEG..=DNEG => InstructionKind::Negate(numeric_kind(opcode - INEG)),
        ISHL..=LUSHR => {
            let relative = opcode - ISHL;
            let op = match relative / 2 {
                0 => ArithmeticOp::Shl,
                1 => ArithmeticOp::Shr,
                _ => ArithmeticOp::Ushr,
            };
            InstructionKind::Arithmetic {
                op,
                kind: numeric_kind(relative % 2),
            }
        }
        IAND..=LXOR => {
            let relative = opcode - IAND;
            let op = match relative / 2 {
                0 => ArithmeticOp::And,
                1 => ArithmeticOp::Or,
                _ => ArithmeticOp::Xor,
            };
            InstructionKind::Arithmetic {
                op,
                kind: numeric_kind(relative % 2),
            }
        }
        IINC => InstructionKind::Increment {
            slot: u16::from(parser.read_be::<u8>()?),
            delta: i16::from(parser.read_be::<i8>()?),
        },

        I2L..=D2F => {
            let relative = opcode - I2L;
            let from = numeric_kind(relative / 3);
            // Each source kind converts to the three other kinds in int, long, float,
            // double order, skipping itself
            let mut index = relative % 3;
            if index >= relative / 3 {
                index += 1;
            }
            let to = match index {
                0 => ConvertTarget::Int,
                1 => ConvertTarget::Long,
                2 => ConvertTarget::Float,
                _ => ConvertTarget::Double,
            };
            InstructionKind::Convert { from, to }
        }
        I2B => InstructionKind::Convert {
            from: NumericKind::Int,
            to: ConvertTarget::Byte,
        },
        I2C => InstructionKind::Convert {
            from: NumericKind::Int,
            to: ConvertTarget::Char,
        },
        I2S => InstructionKind::Convert {
            from: NumericKind::Int,
            to: ConvertTarget::Short,
        },

        LCMP => InstructionKind::Compare(CompareOp::LCmp),
        FCMPL => InstructionKind::Compare(CompareOp::FCmpL),
        FCMPG => InstructionKind::Compare(CompareOp::FCmpG),
        DCMPL => InstructionKind::Compare(CompareOp::DCmpL),
        DCMPG => InstructionKind::Compare(CompareOp::DCmpG),

        IFEQ..=IFLE => InstructionKind::IfZero {
            condition: Condition::of(opcode, IFEQ),
            target: branch16(parser, address)?,
        },
        IF_ICMPEQ..=IF_ICMPLE => InstructionKind::IfIntCompare {
            condition: Condition::of(opcode, IF_ICMPEQ),
            target: branch16(parser, address)?,
        },
        IF_ACMPEQ | IF_ACMPNE => InstructionKind::IfRefCompare {
            condition: Condition::of(opcode, IF_ACMPEQ),
            target: branch16(parser, address)?,
        },
        IFNULL => InstructionKind::IfNull(branch16(parser, address)?),
        IFNONNULL => InstructionKind::IfNonNull(branch16(parser, address)?),

        GOTO => InstructionKind::Goto(branch16(parser, address)?),
        GOTO_W => InstructionKind::Goto(address.offset(parser.read_be::<i32>()?)?),
        JSR => InstructionKind::Jsr(branch16(parser, address)?),
        JSR_W => InstructionKind::Jsr(address.offset(parser.read_be::<i32>()?)?),
        RET => InstructionKind::Ret(u16::from(parser.read_be::<u8>()?)),

        TABLESWITCH => {
            parser.align_from(0, 4)?;
            let default = address.offset(parser.read_be::<i32>()?)?;
            let low = parser.read_be::<i32>()?;
            let high = parser.read_be::<i32>()?;
            if high < low {
                return Err(malformed_error!(
                    "tableswitch at {} has inverted range {}..{}",
                    address,
                    low,
                    high
                ));
            }

            let count = usize::try_from(i64::from(high) - i64::from(low) + 1)
                .map_err(|_| out_of_bounds_error!())?;
            if count > parser.remaining() / 4 {
                return Err(out_of_bounds_error!());
            }

            let mut targets = Vec::with_capacity(count);
            for _ in 0..count {
                targets.push(address.offset(parser.read_be::<i32>()?)?);
            }
            InstructionKind::TableSwitch {
                default,
                low,
                high,
                targets,
            }
        }
        LOOKUPSWITCH => {
            parser.align_from(0, 4)?;
            let default = address.offset(parser.read_be::<i32>()?)?;
            let npairs = parser.read_be::<i32>()?;
            let count = usize::try_from(npairs).map_err(|_| {
                malformed_error!("lookupswitch at {} has negative size {}", address, npairs)
            })?;
            if count > parser.remaining() / 8 {
                return Err(out_of_bounds_error!());
            }

            let mut pairs = Vec::with_capacity(count);
            for _ in 0..count {
                let key = parser.read_be::<i32>()?;
                pairs.push((key, address.offset(parser.read_be::<i32>()?)?));
            }
            InstructionKind::LookupSwitch { default, pairs }
        }

        IRETURN..=ARETURN => InstructionKind::Return(Some(slot_kind(opcode - IRETURN))),
        RETURN => InstructionKind::Return(None),

        GETSTATIC => InstructionKind::GetStatic(parser.read_be::<u16>()?),
        PUTSTATIC => InstructionKind::PutStatic(parser.read_be::<u16>()?),
        GETFIELD => InstructionKind::GetField(parser.read_be::<u16>()?),
        PUTFIELD => InstructionKind::PutField(parser.read_be::<u16>()?),
        INVOKEVIRTUAL => invoke(InvokeKind::Virtual, parser.read_be::<u16>()?),
        INVOKESPECIAL => invoke(InvokeKind::Special, parser.read_be::<u16>()?),
        INVOKESTATIC => invoke(InvokeKind::Static, parser.read_be::<u16>()?),
        INVOKEINTERFACE => {
            let index = parser.read_be::<u16>()?;
            // argument count and a reserved zero byte
            parser.advance_by(2)?;
            invoke(InvokeKind::Interface, index)
        }
        INVOKEDYNAMIC => {
            let index = parser.read_be::<u16>()?;
            parser.advance_by(2)?;
            invoke(InvokeKind::Dynamic, index)
        }

        NEW => InstructionKind::New(parser.read_be::<u16>()?),
        NEWARRAY => {
            let atype = parser.read_be::<u8>()?;
            let kind = match atype {
                T_BOOLEAN => ArrayKind::Boolean,
                T_CHAR => ArrayKind::Char,
                T_FLOAT => ArrayKind::Float,
                T_DOUBLE => ArrayKind::Double,
                T_BYTE => ArrayKind::Byte,
                T_SHORT => ArrayKind::Short,
                T_INT => ArrayKind::Int,
                T_LONG => ArrayKind::Long,
                _ => {
                    return Err(malformed_error!(
                        "newarray at {} with invalid element type {}",
                        address,
                        atype
                    ))
                }
            };
            InstructionKind::NewArray(kind)
        }
        ANEWARRAY => InstructionKind::NewObjectArray(parser.read_be::<u16>()?),
        ARRAYLENGTH => InstructionKind::ArrayLength,
        ATHROW => InstructionKind::Throw,
        CHECKCAST => InstructionKind::CheckCast(parser.read_be::<u16>()?),
        INSTANCEOF => InstructionKind::InstanceOf(parser.read_be::<u16>()?),
        MONITORENTER => InstructionKind::MonitorEnter,
        MONITOREXIT => InstructionKind::MonitorExit,
        MULTIANEWARRAY => {
            let index = parser.read_be::<u16>()?;
            let dimensions = parser.read_be::<u8>()?;
            if dimensions == 0 {
                return Err(malformed_error!(
                    "multianewarray at {} with zero dimensions",
                    address
                ));
            }
            InstructionKind::MultiNewArray { index, dimensions }
        }

        WIDE => {
            opcode = parser.read_be::<u8>()?;
            let slot = parser.read_be::<u16>()?;
            match opcode {
                ILOAD..=ALOAD => InstructionKind::Load {
                    kind: slot_kind(opcode - ILOAD),
                    slot,
                },
                ISTORE..=ASTORE => InstructionKind::Store {
                    kind: slot_kind(opcode - ISTORE),
                    slot,
                },
                RET => InstructionKind::Ret(slot),
                IINC => InstructionKind::Increment {
                    slot,
                    delta: parser.read_be::<i16>()?,
                },
                _ => {
                    return Err(malformed_error!(
                        "wide at {} modifies invalid opcode {:#04x}",
                        address,
                        opcode
                    ))
                }
            }
        }

        _ => {
            return Err(malformed_error!(
                "Invalid opcode {:#04x} at {}",
                opcode,
                address
            ))
        }
    };

    let size = u32::try_from(parser.pos() - start).map_err(|_| out_of_bounds_error!())?;
    Ok(Instruction {
        address,
        opcode,
        size,
        kind,
    })
}

fn branch16(parser: &mut Parser, address: Address) -> Result<Address> {
    address.offset(i32::from(parser.read_be::<i16>()?))
}

fn invoke(kind: InvokeKind, index: u16) -> InstructionKind {
    InstructionKind::Invoke { kind, index }
}

/// Kind for the int, long, float, double, reference ordering shared by loads, stores and
/// returns.
fn slot_kind(relative: u8) -> ValueKind {
    match relative {
        0 => ValueKind::Int,
        1 => ValueKind::Long,
        2 => ValueKind::Float,
        3 => ValueKind::Double,
        _ => ValueKind::Reference,
    }
}

fn numeric_kind(relative: u8) -> NumericKind {
    match relative {
        0 => NumericKind::Int,
        1 => NumericKind::Long,
        2 => NumericKind::Float,
        _ => NumericKind::Double,
    }
}

fn array_kind(relative: u8) -> ArrayKind {
    match relative {
        0 => ArrayKind::Int,
        1 => ArrayKind::Long,
        2 => ArrayKind::Float,
        3 => ArrayKind::Double,
        4 => ArrayKind::Reference,
        5 => ArrayKind::Byte,
        6 => ArrayKind::Char,
        _ => ArrayKind::Short,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_decode_simple_method() {
        // iload_0, iload_1, iadd, ireturn
        let instructions = decode(&[0x1a, 0x1b, 0x60, 0xac]).unwrap();

        assert_eq!(instructions.len(), 4);
        assert_eq!(
            instructions[1].kind,
            InstructionKind::Load {
                kind: ValueKind::Int,
                slot: 1
            }
        );
        assert_eq!(
            instructions[2].kind,
            InstructionKind::Arithmetic {
                op: ArithmeticOp::Add,
                kind: NumericKind::Int
            }
        );
        assert_eq!(instructions[3].kind, InstructionKind::Return(Some(ValueKind::Int)));
        assert_eq!(instructions[3].address, Address::new(3));
    }

    #[test]
    fn test_decode_constants() {
        // iconst_m1, bipush -5, sipush 300, dconst_1
        let code = [0x02, 0x10, 0xfb, 0x11, 0x01, 0x2c, 0x0f];
        let kinds: Vec<_> = decode(&code).unwrap().into_iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![
                InstructionKind::ConstInt(-1),
                InstructionKind::ConstInt(-5),
                InstructionKind::ConstInt(300),
                InstructionKind::ConstDouble(1.0),
            ]
        );
    }

    #[test]
    fn test_decode_conversions() {
        let code = [I2L, L2I, F2D, D2F, I2C];
        let kinds: Vec<_> = decode(&code).unwrap().into_iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds[0],
            InstructionKind::Convert {
                from: NumericKind::Int,
                to: ConvertTarget::Long
            }
        );
        assert_eq!(
            kinds[1],
            InstructionKind::Convert {
                from: NumericKind::Long,
                to: ConvertTarget::Int
            }
        );
        assert_eq!(
            kinds[2],
            InstructionKind::Convert {
                from: NumericKind::Float,
                to: ConvertTarget::Double
            }
        );
        assert_eq!(
            kinds[3],
            InstructionKind::Convert {
                from: NumericKind::Double,
                to: ConvertTarget::Float
            }
        );
        assert_eq!(
            kinds[4],
            InstructionKind::Convert {
                from: NumericKind::Int,
                to: ConvertTarget::Char
            }
        );
    }

    #[test]
    fn test_decode_branches() {
        // 0: iload_0, 1: ifeq +6 (-> 7), 4: goto -4 (-> 0), 7: return
        let code = [0x1a, 0x99, 0x00, 0x06, 0xa7, 0xff, 0xfc, 0xb1];
        let instructions = decode(&code).unwrap();

        assert_eq!(
            instructions[1].kind,
            InstructionKind::IfZero {
                condition: Condition::Eq,
                target: Address::new(7)
            }
        );
        assert_eq!(instructions[2].kind, InstructionKind::Goto(Address::ZERO));
        assert_eq!(instructions[2].size, 3);
    }

    #[test]
    fn test_decode_tableswitch_padding() {
        // 0: iload_0, 1: tableswitch, padded to 4
        let mut code = vec![0x1a, TABLESWITCH, 0x00, 0x00];
        for value in [23_i32, 0, 1, 23, 24] {
            code.extend_from_slice(&value.to_be_bytes());
        }
        code.extend_from_slice(&[0xb1, 0xb1, 0xb1]);

        let instructions = decode(&code).unwrap();
        assert_eq!(instructions.len(), 5);
        match &instructions[1].kind {
            InstructionKind::TableSwitch {
                default,
                low,
                high,
                targets,
            } => {
                assert_eq!(*default, Address::new(24));
                assert_eq!((*low, *high), (0, 1));
                assert_eq!(targets, &vec![Address::new(24), Address::new(25)]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(instructions[1].size, 23);
        assert_eq!(instructions[2].address, Address::new(24));
    }

    #[test]
    fn test_decode_lookupswitch() {
        // 0: lookupswitch, padded to 4, default -> 20, one pair 7 -> 21
        let mut code = vec![LOOKUPSWITCH, 0x00, 0x00, 0x00];
        for value in [20_i32, 1, 7, 21] {
            code.extend_from_slice(&value.to_be_bytes());
        }
        code.extend_from_slice(&[0xb1, 0xb1]);

        let instructions = decode(&code).unwrap();
        assert_eq!(
            instructions[0].kind,
            InstructionKind::LookupSwitch {
                default: Address::new(20),
                pairs: vec![(7, Address::new(21))],
            }
        );
        assert_eq!(instructions[0].jump_targets().len(), 2);
    }

    #[test]
    fn test_decode_wide() {
        // wide iload 300, wide iinc 300 -1000
        let code = [WIDE, ILOAD, 0x01, 0x2c, WIDE, IINC, 0x01, 0x2c, 0xfc, 0x18];
        let instructions = decode(&code).unwrap();

        assert_eq!(
            instructions[0].kind,
            InstructionKind::Load {
                kind: ValueKind::Int,
                slot: 300
            }
        );
        assert_eq!(instructions[0].opcode, ILOAD);
        assert_eq!(instructions[0].size, 4);
        assert_eq!(
            instructions[1].kind,
            InstructionKind::Increment {
                slot: 300,
                delta: -1000
            }
        );
        assert_eq!(instructions[1].size, 6);
    }

    #[test]
    fn test_decode_invokeinterface_skips_count() {
        let code = [INVOKEINTERFACE, 0x00, 0x05, 0x02, 0x00, RETURN];
        let instructions = decode(&code).unwrap();
        assert_eq!(
            instructions[0].kind,
            InstructionKind::Invoke {
                kind: InvokeKind::Interface,
                index: 5
            }
        );
        assert_eq!(instructions[1].address, Address::new(5));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode(&[0xcb]), Err(Error::Malformed { .. })));
        assert!(matches!(decode(&[WIDE, NOP, 0, 0]), Err(Error::Malformed { .. })));
        assert!(matches!(decode(&[SIPUSH, 0x01]), Err(Error::OutOfBounds)));
        assert!(matches!(decode(&[]), Err(Error::Malformed { .. })));
        // goto -1 from address 0
        assert!(matches!(decode(&[GOTO, 0xff, 0xff]), Err(Error::Malformed { .. })));
    }
}
