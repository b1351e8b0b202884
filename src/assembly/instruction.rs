//! CIL instruction representation as produced by devirtualization.
//!
//! Unlike a disassembler, the devirtualizer never sees raw metadata tokens for most
//! operands: reference operands are reconstructed from operand records, so
//! [`Operand`] carries resolved [`TypeSig`], [`FieldRef`] and [`MethodRef`] values.
//! Branch targets are [`Label`]s, indices into the final instruction list of the
//! same method. The same types describe the (unvirtualized) handler and helper
//! bodies the host module hands to the pattern matcher.

use std::fmt;

use crate::{
    assembly::opcodes::OpCode,
    metadata::{FieldRef, MethodRef, Resolved, TypeSig},
};

/// Index of an instruction inside one method body.
///
/// A label equal to the body length denotes the end of the body, which is only
/// valid as the exclusive end of an exception handler range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub usize);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04}", self.0)
    }
}

/// Immediate values encoded directly in the instruction stream.
///
/// # Thread Safety
///
/// [`Immediate`] is [`std::marker::Send`] and [`std::marker::Sync`] as it only contains primitive data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit immediate value
    Int8(i8),
    /// Unsigned 8-bit immediate value
    UInt8(u8),
    /// Signed 32-bit immediate value
    Int32(i32),
    /// Signed 64-bit immediate value
    Int64(i64),
    /// 32-bit floating point immediate value
    Float32(f32),
    /// 64-bit floating point immediate value
    Float64(f64),
}

impl From<Immediate> for u64 {
    fn from(val: Immediate) -> Self {
        match val {
            // For signed integers, we preserve the bit pattern
            #[allow(clippy::cast_sign_loss)]
            Immediate::Int8(value) => value as u64,
            Immediate::UInt8(value) => u64::from(value),
            #[allow(clippy::cast_sign_loss)]
            Immediate::Int32(value) => value as u64,
            #[allow(clippy::cast_sign_loss)]
            Immediate::Int64(value) => value as u64,
            Immediate::Float32(value) => u64::from(value.to_bits()),
            Immediate::Float64(value) => value.to_bits(),
        }
    }
}

/// Operand of a reconstructed instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand present
    None,
    /// Immediate value
    Immediate(Immediate),
    /// Local variable index
    Local(u16),
    /// Method argument index
    Argument(u16),
    /// Branch target
    Target(Label),
    /// Switch jump table
    Switch(Vec<Label>),
    /// Type operand
    Type(TypeSig),
    /// Field operand
    Field(FieldRef),
    /// Method operand
    Method(MethodRef),
    /// String literal (`ldstr`)
    String(String),
    /// `ldtoken` operand
    Token(Resolved),
    /// Stand-in for an unrecovered virtual instruction, carrying its virtual code
    Placeholder(u32),
}

/// A CIL instruction.
///
/// # Examples
///
/// ```rust
/// use eazdevirt::assembly::{Instruction, Immediate, OpCode, Operand};
///
/// let instr = Instruction::with_operand(OpCode::LdcI4S, Operand::Immediate(Immediate::Int8(-3)));
/// assert_eq!(instr.i4_constant(), Some(-3));
/// assert_eq!(Instruction::new(OpCode::LdcI45).i4_constant(), Some(5));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The opcode
    pub opcode: OpCode,
    /// The operand
    pub operand: Operand,
    /// Offset of the originating virtual instruction, relative to the start of
    /// the method's virtual instruction bytes
    pub virtual_offset: Option<u32>,
}

impl Instruction {
    /// Creates an instruction without operand.
    #[must_use]
    pub fn new(opcode: OpCode) -> Self {
        Instruction {
            opcode,
            operand: Operand::None,
            virtual_offset: None,
        }
    }

    /// Creates an instruction with an operand.
    #[must_use]
    pub fn with_operand(opcode: OpCode, operand: Operand) -> Self {
        Instruction {
            opcode,
            operand,
            virtual_offset: None,
        }
    }

    /// Creates the placeholder emitted for an unrecovered virtual opcode.
    #[must_use]
    pub fn placeholder(virtual_code: u32, virtual_offset: u32) -> Self {
        Instruction {
            opcode: OpCode::Nop,
            operand: Operand::Placeholder(virtual_code),
            virtual_offset: Some(virtual_offset),
        }
    }

    /// Returns `true` for placeholders.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        matches!(self.operand, Operand::Placeholder(_))
    }

    /// Returns the value pushed by any `ldc.i4` encoding.
    #[must_use]
    pub fn i4_constant(&self) -> Option<i32> {
        if let Some(value) = self.opcode.implicit_i4() {
            return Some(value);
        }
        match (self.opcode, &self.operand) {
            (OpCode::LdcI4S, Operand::Immediate(Immediate::Int8(value))) => Some(i32::from(*value)),
            (OpCode::LdcI4, Operand::Immediate(Immediate::Int32(value))) => Some(*value),
            _ => None,
        }
    }

    /// Returns the method operand, if any.
    #[must_use]
    pub fn method(&self) -> Option<&MethodRef> {
        match &self.operand {
            Operand::Method(method) => Some(method),
            _ => None,
        }
    }

    /// Returns the field operand, if any.
    #[must_use]
    pub fn field(&self) -> Option<&FieldRef> {
        match &self.operand {
            Operand::Field(field) => Some(field),
            _ => None,
        }
    }

    /// Returns the type operand, if any.
    #[must_use]
    pub fn type_sig(&self) -> Option<&TypeSig> {
        match &self.operand {
            Operand::Type(sig) => Some(sig),
            _ => None,
        }
    }

    /// Returns the branch targets of this instruction.
    #[must_use]
    pub fn targets(&self) -> Vec<Label> {
        match &self.operand {
            Operand::Target(label) => vec![*label],
            Operand::Switch(labels) => labels.clone(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Immediate(imm) => write!(f, " {imm:?}"),
            Operand::Local(index) => write!(f, " V_{index}"),
            Operand::Argument(index) => write!(f, " A_{index}"),
            Operand::Target(label) => write!(f, " {label}"),
            Operand::Switch(labels) => {
                let labels: Vec<String> = labels.iter().map(ToString::to_string).collect();
                write!(f, " ({})", labels.join(", "))
            }
            Operand::Type(sig) => write!(f, " {sig}"),
            Operand::Field(field) => write!(f, " {field}"),
            Operand::Method(method) => write!(f, " {method}"),
            Operand::String(value) => write!(f, " {value:?}"),
            Operand::Token(resolved) => write!(f, " {resolved}"),
            Operand::Placeholder(code) => write!(f, " // unrecovered virtual opcode 0x{code:04x}"),
        }
    }
}
