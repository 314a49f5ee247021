//! Label-aware bytecode emitter.
//!
//! [`CodeAssembler`] produces raw `Code` bytes from opcodes and symbolic labels. Branch
//! offsets are written as placeholders and patched once every label is known, so jumps
//! may refer to labels defined later. It is used to build test inputs and benchmark
//! fixtures together with [`crate::classfile::ClassWriter`].
//!
//! # Examples
//!
//! ```rust,ignore
//! use classscope::bytecode::{opcodes::*, CodeAssembler};
//!
//! let mut asm = CodeAssembler::new();
//! asm.op(ILOAD_0).branch(IFEQ, "zero");
//! asm.push_int(1).op(IRETURN);
//! asm.label("zero")?.push_int(0).op(IRETURN);
//! let code = asm.finish()?;
//! ```

use std::collections::HashMap;

use crate::{
    bytecode::opcodes::*,
    file::io::{patch_be_at, write_be},
    Error, Result,
};

/// A pending branch offset to patch once its label is defined.
#[derive(Debug, Clone)]
struct LabelFixup {
    label: String,
    /// Where the offset bytes start
    fixup_position: usize,
    /// 2 for regular branches, 4 for `goto_w` and switch entries
    offset_size: u8,
    /// Address of the branching instruction, the base of the relative offset
    instruction_position: usize,
}

/// Emits JVM bytecode with symbolic jump labels.
#[derive(Debug, Default)]
pub struct CodeAssembler {
    bytecode: Vec<u8>,
    labels: HashMap<String, u32>,
    fixups: Vec<LabelFixup>,
}

impl CodeAssembler {
    /// Creates an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current write position, which is the address of the next instruction.
    #[must_use]
    pub fn position(&self) -> u32 {
        u32::try_from(self.bytecode.len()).unwrap_or(u32::MAX)
    }

    /// Address of a defined label.
    #[must_use]
    pub fn label_address(&self, name: &str) -> Option<u32> {
        self.labels.get(name).copied()
    }

    /// Defines `name` at the current position.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the label is already defined.
    pub fn label(&mut self, name: &str) -> Result<&mut Self> {
        if self.labels.contains_key(name) {
            return Err(malformed_error!("Duplicate label '{}'", name));
        }
        let position = self.position();
        self.labels.insert(name.to_string(), position);
        Ok(self)
    }

    /// Emits an instruction without operands.
    pub fn op(&mut self, opcode: u8) -> &mut Self {
        self.bytecode.push(opcode);
        self
    }

    /// Emits an instruction with a one-byte operand.
    pub fn op_u8(&mut self, opcode: u8, operand: u8) -> &mut Self {
        self.bytecode.push(opcode);
        self.bytecode.push(operand);
        self
    }

    /// Emits an instruction with a two-byte operand, such as a constant pool index.
    pub fn op_u16(&mut self, opcode: u8, operand: u16) -> &mut Self {
        self.bytecode.push(opcode);
        write_be(&mut self.bytecode, operand);
        self
    }

    /// Pushes an int constant using the shortest encoding. Larger constants go through
    /// `ldc`.
    pub fn push_int(&mut self, value: i16) -> &mut Self {
        if let Ok(small @ -1..=5) = i8::try_from(value) {
            // iconst_m1 .. iconst_5 are consecutive
            return self.op(ICONST_0.wrapping_add_signed(small));
        }

        match i8::try_from(value) {
            Ok(byte) => {
                self.bytecode.push(BIPUSH);
                write_be(&mut self.bytecode, byte);
            }
            Err(_) => {
                self.bytecode.push(SIPUSH);
                write_be(&mut self.bytecode, value);
            }
        }
        self
    }

    /// Emits a load or store with a local slot operand, using `wide` when the slot does
    /// not fit into one byte.
    ///
    /// `opcode` is the generic form (`iload`, `astore`, ...).
    pub fn local(&mut self, opcode: u8, slot: u16) -> &mut Self {
        match u8::try_from(slot) {
            Ok(short) => self.op_u8(opcode, short),
            Err(_) => {
                self.bytecode.push(WIDE);
                self.op_u16(opcode, slot)
            }
        }
    }

    /// Emits `iinc`, using `wide` when needed.
    pub fn iinc(&mut self, slot: u16, delta: i16) -> &mut Self {
        match (u8::try_from(slot), i8::try_from(delta)) {
            (Ok(short_slot), Ok(short_delta)) => {
                self.bytecode.push(IINC);
                self.bytecode.push(short_slot);
                write_be(&mut self.bytecode, short_delta);
            }
            _ => {
                self.bytecode.push(WIDE);
                self.bytecode.push(IINC);
                write_be(&mut self.bytecode, slot);
                write_be(&mut self.bytecode, delta);
            }
        }
        self
    }

    /// Emits a branch to `label`. `goto_w` and `jsr_w` get a four-byte offset, every
    /// other branch a two-byte one.
    pub fn branch(&mut self, opcode: u8, label: &str) -> &mut Self {
        let instruction_position = self.bytecode.len();
        self.bytecode.push(opcode);
        let offset_size = if matches!(opcode, GOTO_W | JSR_W) { 4 } else { 2 };
        self.push_fixup(label, offset_size, instruction_position);
        self
    }

    /// Emits `tableswitch` for the keys `low..low + labels.len()`.
    pub fn tableswitch(&mut self, low: i32, labels: &[&str], default: &str) -> &mut Self {
        let instruction_position = self.bytecode.len();
        self.bytecode.push(TABLESWITCH);
        self.pad_switch();
        self.push_fixup(default, 4, instruction_position);

        let count = i32::try_from(labels.len()).unwrap_or(i32::MAX);
        write_be(&mut self.bytecode, low);
        write_be(&mut self.bytecode, low.saturating_add(count - 1));
        for label in labels {
            self.push_fixup(label, 4, instruction_position);
        }
        self
    }

    /// Emits `lookupswitch`. Keys must be sorted ascending.
    pub fn lookupswitch(&mut self, cases: &[(i32, &str)], default: &str) -> &mut Self {
        let instruction_position = self.bytecode.len();
        self.bytecode.push(LOOKUPSWITCH);
        self.pad_switch();
        self.push_fixup(default, 4, instruction_position);

        write_be(
            &mut self.bytecode,
            i32::try_from(cases.len()).unwrap_or(i32::MAX),
        );
        for (key, label) in cases {
            write_be(&mut self.bytecode, *key);
            self.push_fixup(label, 4, instruction_position);
        }
        self
    }

    /// Emits `invokeinterface` with its argument slot count.
    pub fn invokeinterface(&mut self, index: u16, count: u8) -> &mut Self {
        self.op_u16(INVOKEINTERFACE, index);
        self.bytecode.push(count);
        self.bytecode.push(0);
        self
    }

    /// Emits `invokedynamic`.
    pub fn invokedynamic(&mut self, index: u16) -> &mut Self {
        self.op_u16(INVOKEDYNAMIC, index);
        self.bytecode.extend_from_slice(&[0, 0]);
        self
    }

    /// Emits `multianewarray`.
    pub fn multianewarray(&mut self, index: u16, dimensions: u8) -> &mut Self {
        self.op_u16(MULTIANEWARRAY, index);
        self.bytecode.push(dimensions);
        self
    }

    /// Resolves all label references and returns the code bytes.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for undefined labels and for offsets that do not fit
    /// their encoding.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        for fixup in std::mem::take(&mut self.fixups) {
            let target = self
                .labels
                .get(&fixup.label)
                .ok_or_else(|| malformed_error!("Undefined label '{}'", fixup.label))?;

            let target = i64::from(*target);
            let base = i64::try_from(fixup.instruction_position).map_err(|_| out_of_bounds_error!())?;
            let offset = target - base;

            if fixup.offset_size == 2 {
                let offset = i16::try_from(offset).map_err(|_| {
                    malformed_error!("Branch to '{}' exceeds 16-bit range", fixup.label)
                })?;
                patch_be_at(&mut self.bytecode, fixup.fixup_position, offset)?;
            } else {
                let offset = i32::try_from(offset).map_err(|_| Error::OutOfBounds)?;
                patch_be_at(&mut self.bytecode, fixup.fixup_position, offset)?;
            }
        }

        Ok(self.bytecode)
    }

    fn push_fixup(&mut self, label: &str, offset_size: u8, instruction_position: usize) {
        self.fixups.push(LabelFixup {
            label: label.to_string(),
            fixup_position: self.bytecode.len(),
            offset_size,
            instruction_position,
        });
        self.bytecode
            .resize(self.bytecode.len() + usize::from(offset_size), 0);
    }

    fn pad_switch(&mut self) {
        while self.bytecode.len() % 4 != 0 {
            self.bytecode.push(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{decode, Address, InstructionKind};

    #[test]
    fn test_forward_and_backward_branches() {
        let mut asm = CodeAssembler::new();
        asm.label("top").unwrap();
        asm.op(ILOAD_0).branch(IFEQ, "end");
        asm.iinc(0, -1).branch(GOTO, "top");
        asm.label("end").unwrap().op(RETURN);
        let code = asm.finish().unwrap();

        let instructions = decode(&code).unwrap();
        assert_eq!(instructions[1].jump_targets(), vec![Address::new(10)]);
        assert_eq!(instructions[3].kind, InstructionKind::Goto(Address::ZERO));
    }

    #[test]
    fn test_push_int_encodings() {
        let mut asm = CodeAssembler::new();
        asm.push_int(-1).push_int(5).push_int(100).push_int(-200);
        let code = asm.finish().unwrap();
        assert_eq!(code, vec![ICONST_M1, ICONST_5, BIPUSH, 100, SIPUSH, 0xff, 0x38]);
    }

    #[test]
    fn test_switch_layout() {
        let mut asm = CodeAssembler::new();
        asm.op(ILOAD_0).tableswitch(1, &["a", "b"], "b");
        asm.label("a").unwrap().op(RETURN);
        asm.label("b").unwrap().op(RETURN);
        let code = asm.finish().unwrap();

        let instructions = decode(&code).unwrap();
        assert_eq!(instructions[1].jump_targets(), vec![Address::new(24), Address::new(25)]);
    }

    #[test]
    fn test_wide_locals() {
        let mut asm = CodeAssembler::new();
        asm.local(ILOAD, 3).local(ISTORE, 400);
        assert_eq!(asm.finish().unwrap(), vec![ILOAD, 3, WIDE, ISTORE, 0x01, 0x90]);
    }

    #[test]
    fn test_label_errors() {
        let mut asm = CodeAssembler::new();
        asm.label("x").unwrap();
        assert!(asm.label("x").is_err());

        let mut asm = CodeAssembler::new();
        asm.branch(GOTO, "missing");
        assert!(matches!(asm.finish(), Err(Error::Malformed { .. })));
    }
}
