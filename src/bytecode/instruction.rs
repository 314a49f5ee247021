//! Decoded instructions.
//!
//! The decoder folds the JVM's many opcode variants (`iload_0`, `iload`, `wide iload`, ...)
//! into one [`InstructionKind`] per operation, so later passes match on semantics rather
//! than on encodings. The raw opcode byte is kept for diagnostics and printing.

use std::fmt;

use strum::{Display, EnumIter, IntoStaticStr};

use crate::bytecode::{opcodes, Address};

/// Computational type of a local slot, a stack operand or a return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum ValueKind {
    /// 32-bit integer (also boolean, byte, char and short)
    Int,
    /// 64-bit integer
    Long,
    /// 32-bit IEEE float
    Float,
    /// 64-bit IEEE float
    Double,
    /// Object or array reference
    Reference,
}

impl ValueKind {
    /// Number of local slots a value of this kind occupies.
    #[must_use]
    pub fn slot_size(self) -> u16 {
        match self {
            ValueKind::Long | ValueKind::Double => 2,
            _ => 1,
        }
    }
}

/// Operand type of an arithmetic instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum NumericKind {
    /// `i*` instructions
    Int,
    /// `l*` instructions
    Long,
    /// `f*` instructions
    Float,
    /// `d*` instructions
    Double,
}

impl From<NumericKind> for ValueKind {
    fn from(kind: NumericKind) -> Self {
        match kind {
            NumericKind::Int => ValueKind::Int,
            NumericKind::Long => ValueKind::Long,
            NumericKind::Float => ValueKind::Float,
            NumericKind::Double => ValueKind::Double,
        }
    }
}

/// Element type of an array access or a primitive array allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum ArrayKind {
    /// `int[]`
    Int,
    /// `long[]`
    Long,
    /// `float[]`
    Float,
    /// `double[]`
    Double,
    /// Arrays of references
    Reference,
    /// `byte[]`; `baload`/`bastore` also access `boolean[]`
    Byte,
    /// `boolean[]`, only produced by `newarray`
    Boolean,
    /// `char[]`
    Char,
    /// `short[]`
    Short,
}

/// Result type of a conversion instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum ConvertTarget {
    /// `l2i`, `f2i`, `d2i`
    Int,
    /// `i2l`, `f2l`, `d2l`
    Long,
    /// `i2f`, `l2f`, `d2f`
    Float,
    /// `i2d`, `l2d`, `f2d`
    Double,
    /// `i2b`
    Byte,
    /// `i2c`
    Char,
    /// `i2s`
    Short,
}

/// Binary arithmetic, bitwise and shift operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum ArithmeticOp {
    /// Addition
    Add,
    /// Subtraction
    Sub,
    /// Multiplication
    Mul,
    /// Division
    Div,
    /// Remainder
    Rem,
    /// Shift left
    Shl,
    /// Arithmetic shift right
    Shr,
    /// Logical shift right
    Ushr,
    /// Bitwise and
    And,
    /// Bitwise or
    Or,
    /// Bitwise exclusive or
    Xor,
}

impl ArithmeticOp {
    /// Operator symbol as used by C-like languages.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Mul => "*",
            ArithmeticOp::Div => "/",
            ArithmeticOp::Rem => "%",
            ArithmeticOp::Shl => "<<",
            ArithmeticOp::Shr => ">>",
            ArithmeticOp::Ushr => ">>>",
            ArithmeticOp::And => "&",
            ArithmeticOp::Or => "|",
            ArithmeticOp::Xor => "^",
        }
    }
}

/// Three-way comparisons producing -1, 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum CompareOp {
    /// `lcmp`
    LCmp,
    /// `fcmpl`: NaN compares as -1
    FCmpL,
    /// `fcmpg`: NaN compares as 1
    FCmpG,
    /// `dcmpl`: NaN compares as -1
    DCmpL,
    /// `dcmpg`: NaN compares as 1
    DCmpG,
}

/// Branch condition of the `if*` family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Condition {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Less than
    Lt,
    /// Greater or equal
    Ge,
    /// Greater than
    Gt,
    /// Less or equal
    Le,
}

impl Condition {
    /// Operator symbol as used by C-like languages.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Condition::Eq => "==",
            Condition::Ne => "!=",
            Condition::Lt => "<",
            Condition::Ge => ">=",
            Condition::Gt => ">",
            Condition::Le => "<=",
        }
    }

    fn from_offset(offset: u8) -> Condition {
        match offset {
            0 => Condition::Eq,
            1 => Condition::Ne,
            2 => Condition::Lt,
            3 => Condition::Ge,
            4 => Condition::Gt,
            _ => Condition::Le,
        }
    }

    /// Condition for `opcode` relative to the first opcode of its family (`ifeq` or
    /// `if_icmpeq`).
    #[must_use]
    pub(crate) fn of(opcode: u8, family_base: u8) -> Condition {
        Condition::from_offset(opcode.saturating_sub(family_base))
    }
}

/// Dispatch kind of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum InvokeKind {
    /// `invokevirtual`
    Virtual,
    /// `invokespecial`: constructors, private methods and super calls
    Special,
    /// `invokestatic`
    Static,
    /// `invokeinterface`
    Interface,
    /// `invokedynamic`
    Dynamic,
}

/// The operation performed by one instruction, with its operands decoded.
///
/// Pool indices are kept raw; resolving them is the job of the SSA builder, which has
/// the class context for diagnostics.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum InstructionKind {
    /// `nop`
    Nop,
    /// `aconst_null`
    ConstNull,
    /// `iconst_*`, `bipush`, `sipush`
    ConstInt(i32),
    /// `lconst_*`
    ConstLong(i64),
    /// `fconst_*`
    ConstFloat(f32),
    /// `dconst_*`
    ConstDouble(f64),
    /// `ldc`, `ldc_w`, `ldc2_w`
    LoadConstant(u16),
    /// `*load`, `*load_n`
    Load {
        kind: ValueKind,
        slot: u16,
    },
    /// `*store`, `*store_n`
    Store {
        kind: ValueKind,
        slot: u16,
    },
    /// `iinc`
    Increment {
        slot: u16,
        delta: i16,
    },
    /// `*aload`
    ArrayLoad(ArrayKind),
    /// `*astore`
    ArrayStore(ArrayKind),
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    /// Binary arithmetic
    Arithmetic {
        op: ArithmeticOp,
        kind: NumericKind,
    },
    /// `*neg`
    Negate(NumericKind),
    /// `x2y`
    Convert {
        from: NumericKind,
        to: ConvertTarget,
    },
    /// `lcmp`, `fcmp*`, `dcmp*`
    Compare(CompareOp),
    /// `if<cond>`: compares an int against zero
    IfZero {
        condition: Condition,
        target: Address,
    },
    /// `if_icmp<cond>`
    IfIntCompare {
        condition: Condition,
        target: Address,
    },
    /// `if_acmpeq`, `if_acmpne`
    IfRefCompare {
        condition: Condition,
        target: Address,
    },
    /// `ifnull`
    IfNull(Address),
    /// `ifnonnull`
    IfNonNull(Address),
    /// `goto`, `goto_w`
    Goto(Address),
    /// `jsr`, `jsr_w`
    Jsr(Address),
    /// `ret`
    Ret(u16),
    /// `tableswitch`
    TableSwitch {
        default: Address,
        low: i32,
        high: i32,
        targets: Vec<Address>,
    },
    /// `lookupswitch`
    LookupSwitch {
        default: Address,
        pairs: Vec<(i32, Address)>,
    },
    /// `*return`; `None` for `return`
    Return(Option<ValueKind>),
    GetStatic(u16),
    PutStatic(u16),
    GetField(u16),
    PutField(u16),
    /// All five invocation instructions
    Invoke {
        kind: InvokeKind,
        index: u16,
    },
    New(u16),
    /// `newarray` with a primitive element type
    NewArray(ArrayKind),
    /// `anewarray`
    NewObjectArray(u16),
    MultiNewArray {
        index: u16,
        dimensions: u8,
    },
    ArrayLength,
    Throw,
    CheckCast(u16),
    InstanceOf(u16),
    MonitorEnter,
    MonitorExit,
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Offset of the opcode byte in the code array
    pub address: Address,
    /// The raw opcode (the modified opcode for `wide` forms)
    pub opcode: u8,
    /// Encoded size in bytes, including operands and padding
    pub size: u32,
    /// Decoded operation
    pub kind: InstructionKind,
}

impl Instruction {
    /// Returns the instruction's mnemonic.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        opcodes::mnemonic(self.opcode).unwrap_or("???")
    }

    /// Address of the instruction that follows in the code array.
    #[must_use]
    pub fn next_address(&self) -> Address {
        Address::new(self.address.value() + self.size)
    }

    /// True if this instruction ends a basic block.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        matches!(
            self.kind,
            InstructionKind::Goto(_)
                | InstructionKind::Jsr(_)
                | InstructionKind::Ret(_)
                | InstructionKind::TableSwitch { .. }
                | InstructionKind::LookupSwitch { .. }
                | InstructionKind::Return(_)
                | InstructionKind::Throw
        ) || self.is_conditional_jump()
    }

    /// True for the `if*` family.
    #[must_use]
    pub fn is_conditional_jump(&self) -> bool {
        matches!(
            self.kind,
            InstructionKind::IfZero { .. }
                | InstructionKind::IfIntCompare { .. }
                | InstructionKind::IfRefCompare { .. }
                | InstructionKind::IfNull(_)
                | InstructionKind::IfNonNull(_)
        )
    }

    /// True if control may continue with the next instruction in the code array.
    #[must_use]
    pub fn falls_through(&self) -> bool {
        !self.is_terminator() || self.is_conditional_jump()
    }

    /// Explicit jump targets, in operand order, with duplicates removed.
    ///
    /// Switches list the case targets first and the default last.
    #[must_use]
    pub fn jump_targets(&self) -> Vec<Address> {
        let mut targets = match &self.kind {
            InstructionKind::IfZero { target, .. }
            | InstructionKind::IfIntCompare { target, .. }
            | InstructionKind::IfRefCompare { target, .. } => vec![*target],
            InstructionKind::IfNull(target)
            | InstructionKind::IfNonNull(target)
            | InstructionKind::Goto(target)
            | InstructionKind::Jsr(target) => vec![*target],
            InstructionKind::TableSwitch {
                default, targets, ..
            } => targets.iter().copied().chain([*default]).collect(),
            InstructionKind::LookupSwitch { default, pairs } => pairs
                .iter()
                .map(|(_, target)| *target)
                .chain([*default])
                .collect(),
            _ => Vec::new(),
        };

        let mut seen = Vec::with_capacity(targets.len());
        targets.retain(|target| {
            if seen.contains(target) {
                false
            } else {
                seen.push(*target);
                true
            }
        });
        targets
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>5}: {}", self.address, self.mnemonic())?;
        match &self.kind {
            InstructionKind::ConstInt(value)
                if matches!(self.opcode, opcodes::BIPUSH | opcodes::SIPUSH) =>
            {
                write!(f, " {value}")
            }
            InstructionKind::LoadConstant(index)
            | InstructionKind::GetStatic(index)
            | InstructionKind::PutStatic(index)
            | InstructionKind::GetField(index)
            | InstructionKind::PutField(index)
            | InstructionKind::Invoke { index, .. }
            | InstructionKind::New(index)
            | InstructionKind::NewObjectArray(index)
            | InstructionKind::CheckCast(index)
            | InstructionKind::InstanceOf(index) => write!(f, " #{index}"),
            InstructionKind::MultiNewArray { index, dimensions } => {
                write!(f, " #{index} {dimensions}")
            }
            InstructionKind::NewArray(kind) => write!(f, " {kind}"),
            InstructionKind::Load { slot, .. } | InstructionKind::Store { slot, .. }
                if !(opcodes::ILOAD_0..=opcodes::ALOAD_3).contains(&self.opcode)
                    && !(opcodes::ISTORE_0..=opcodes::ASTORE_3).contains(&self.opcode) =>
            {
                write!(f, " {slot}")
            }
            InstructionKind::Increment { slot, delta } => write!(f, " {slot} {delta}"),
            InstructionKind::Ret(slot) => write!(f, " {slot}"),
            InstructionKind::TableSwitch { low, high, .. } => write!(f, " {low}..={high}"),
            InstructionKind::LookupSwitch { pairs, .. } => write!(f, " ({} cases)", pairs.len()),
            _ => {
                let targets = self.jump_targets();
                if let Some(target) = targets.first() {
                    write!(f, " {target}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(address: u32, opcode: u8, size: u32, kind: InstructionKind) -> Instruction {
        Instruction {
            address: Address::new(address),
            opcode,
            size,
            kind,
        }
    }

    #[test]
    fn test_flow_classification() {
        let add = at(0, opcodes::IADD, 1, InstructionKind::Arithmetic {
            op: ArithmeticOp::Add,
            kind: NumericKind::Int,
        });
        assert!(!add.is_terminator());
        assert!(add.falls_through());
        assert_eq!(add.next_address(), Address::new(1));

        let branch = at(4, opcodes::IFEQ, 3, InstructionKind::IfZero {
            condition: Condition::Eq,
            target: Address::new(20),
        });
        assert!(branch.is_terminator());
        assert!(branch.is_conditional_jump());
        assert!(branch.falls_through());
        assert_eq!(branch.jump_targets(), vec![Address::new(20)]);

        let ret = at(9, opcodes::RETURN, 1, InstructionKind::Return(None));
        assert!(ret.is_terminator());
        assert!(!ret.falls_through());
        assert!(ret.jump_targets().is_empty());
    }

    #[test]
    fn test_switch_targets_are_deduplicated() {
        let switch = at(0, opcodes::TABLESWITCH, 24, InstructionKind::TableSwitch {
            default: Address::new(30),
            low: 0,
            high: 2,
            targets: vec![Address::new(24), Address::new(30), Address::new(24)],
        });
        assert_eq!(switch.jump_targets(), vec![Address::new(24), Address::new(30)]);
        assert!(!switch.falls_through());
    }

    #[test]
    fn test_condition_family_offsets() {
        assert_eq!(Condition::of(opcodes::IFGE, opcodes::IFEQ), Condition::Ge);
        assert_eq!(Condition::of(opcodes::IF_ICMPLE, opcodes::IF_ICMPEQ), Condition::Le);
        assert_eq!(Condition::Ne.symbol(), "!=");
        assert_eq!(ArithmeticOp::Ushr.to_string(), "ushr");
    }

    #[test]
    fn test_display() {
        let load = at(3, opcodes::ILOAD, 2, InstructionKind::Load {
            kind: ValueKind::Int,
            slot: 5,
        });
        assert_eq!(load.to_string(), "    3: iload 5");
        let short = at(3, opcodes::ILOAD_1, 1, InstructionKind::Load {
            kind: ValueKind::Int,
            slot: 1,
        });
        assert_eq!(short.to_string(), "    3: iload_1");
    }
}
