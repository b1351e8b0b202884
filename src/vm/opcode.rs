//! Virtual opcodes and their operand types.

use std::fmt;

use crate::{
    assembly::{OpCode, OperandType},
    metadata::Token,
    Result,
};

/// Operand type of a virtual opcode, as declared by the interpreter's handler table.
///
/// The declared type alone fixes the operand width in the instruction stream, which
/// keeps decoding synchronized even for opcodes that could not be identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum VirtualOperandType {
    /// Absolute virtual branch target
    InlineBrTarget,
    /// Resolver position of a field record
    InlineField,
    /// 32-bit integer
    InlineI,
    /// 64-bit integer
    InlineI8,
    /// Resolver position of a method record
    InlineMethod,
    /// No operand
    InlineNone,
    /// 64-bit float
    InlineR,
    /// Resolver position of a signature (unsupported)
    InlineSig,
    /// Resolver position of a string record
    InlineString,
    /// Target table
    InlineSwitch,
    /// Resolver position of a type, field or method record
    InlineTok,
    /// Resolver position of a type record
    InlineType,
    /// 16-bit local or argument index
    InlineVar,
    /// Absolute virtual branch target (stored in 4 bytes like the long form)
    ShortInlineBrTarget,
    /// 8-bit integer
    ShortInlineI,
    /// 32-bit float
    ShortInlineR,
    /// 8-bit local or argument index
    ShortInlineVar,
}

impl VirtualOperandType {
    /// Decodes the handler table code.
    ///
    /// # Errors
    /// Returns [`crate::Error::Bootstrap`] for codes outside `0..=16`.
    pub fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            0 => VirtualOperandType::InlineBrTarget,
            1 => VirtualOperandType::InlineField,
            2 => VirtualOperandType::InlineI,
            3 => VirtualOperandType::InlineI8,
            4 => VirtualOperandType::InlineMethod,
            5 => VirtualOperandType::InlineNone,
            6 => VirtualOperandType::InlineR,
            7 => VirtualOperandType::InlineSig,
            8 => VirtualOperandType::InlineString,
            9 => VirtualOperandType::InlineSwitch,
            10 => VirtualOperandType::InlineTok,
            11 => VirtualOperandType::InlineType,
            12 => VirtualOperandType::InlineVar,
            13 => VirtualOperandType::ShortInlineBrTarget,
            14 => VirtualOperandType::ShortInlineI,
            15 => VirtualOperandType::ShortInlineR,
            16 => VirtualOperandType::ShortInlineVar,
            other => return Err(bootstrap_error!("Unknown virtual operand type {}", other)),
        })
    }

    /// Returns the handler table code.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Returns the operand width in the instruction stream, or `None` for
    /// [`VirtualOperandType::InlineSwitch`] (`u32` count plus 4 bytes per target).
    #[must_use]
    pub fn width(self) -> Option<usize> {
        match self {
            VirtualOperandType::InlineNone => Some(0),
            VirtualOperandType::ShortInlineI | VirtualOperandType::ShortInlineVar => Some(1),
            VirtualOperandType::InlineVar => Some(2),
            VirtualOperandType::InlineBrTarget
            | VirtualOperandType::ShortInlineBrTarget
            | VirtualOperandType::InlineField
            | VirtualOperandType::InlineI
            | VirtualOperandType::InlineMethod
            | VirtualOperandType::InlineSig
            | VirtualOperandType::InlineString
            | VirtualOperandType::InlineTok
            | VirtualOperandType::InlineType
            | VirtualOperandType::ShortInlineR => Some(4),
            VirtualOperandType::InlineI8 | VirtualOperandType::InlineR => Some(8),
            VirtualOperandType::InlineSwitch => None,
        }
    }

    /// Returns `true` if the operand is a resolver stream position.
    #[must_use]
    pub fn is_reference(self) -> bool {
        matches!(
            self,
            VirtualOperandType::InlineField
                | VirtualOperandType::InlineMethod
                | VirtualOperandType::InlineSig
                | VirtualOperandType::InlineString
                | VirtualOperandType::InlineTok
                | VirtualOperandType::InlineType
        )
    }

    /// Returns the CIL operand type of the same name.
    #[must_use]
    pub fn cil(self) -> OperandType {
        match self {
            VirtualOperandType::InlineBrTarget => OperandType::InlineBrTarget,
            VirtualOperandType::InlineField => OperandType::InlineField,
            VirtualOperandType::InlineI => OperandType::InlineI,
            VirtualOperandType::InlineI8 => OperandType::InlineI8,
            VirtualOperandType::InlineMethod => OperandType::InlineMethod,
            VirtualOperandType::InlineNone => OperandType::InlineNone,
            VirtualOperandType::InlineR => OperandType::InlineR,
            VirtualOperandType::InlineSig => OperandType::InlineSig,
            VirtualOperandType::InlineString => OperandType::InlineString,
            VirtualOperandType::InlineSwitch => OperandType::InlineSwitch,
            VirtualOperandType::InlineTok => OperandType::InlineTok,
            VirtualOperandType::InlineType => OperandType::InlineType,
            VirtualOperandType::InlineVar => OperandType::InlineVar,
            VirtualOperandType::ShortInlineBrTarget => OperandType::ShortInlineBrTarget,
            VirtualOperandType::ShortInlineI => OperandType::ShortInlineI,
            VirtualOperandType::ShortInlineR => OperandType::ShortInlineR,
            VirtualOperandType::ShortInlineVar => OperandType::ShortInlineVar,
        }
    }
}

/// Virtual opcodes without a single CIL counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Special {
    /// Compact call: the operand points at a method or packed call record and is
    /// emitted as `call` or `callvirt`
    EazCall,
    /// Start of a chain-cipher guarded range; the operand is its encrypted length
    ChainBoundary,
    /// Interpreter bookkeeping; consumes its operand and emits nothing
    NoEffect,
}

/// What a virtual opcode was identified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpcodeKind {
    /// A plain CIL opcode
    Cil(OpCode),
    /// A special marker
    Special(Special),
    /// Present in the handler table but not identified
    Unidentified,
}

impl fmt::Display for OpcodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpcodeKind::Cil(opcode) => write!(f, "{opcode}"),
            OpcodeKind::Special(special) => write!(f, "<{special}>"),
            OpcodeKind::Unidentified => f.write_str("<unidentified>"),
        }
    }
}

/// One entry of the opcode catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtualOpcode {
    /// Numeric code in the instruction stream
    pub code: u32,
    /// Declared operand type
    pub operand_type: VirtualOperandType,
    /// Identification result
    pub kind: OpcodeKind,
    /// Handler method implementing the opcode
    pub handler: Token,
}

impl VirtualOpcode {
    /// Returns `true` unless the opcode is [`OpcodeKind::Unidentified`].
    #[must_use]
    pub fn is_identified(&self) -> bool {
        !matches!(self.kind, OpcodeKind::Unidentified)
    }

    /// Returns the CIL opcode, if identified as one.
    #[must_use]
    pub fn opcode(&self) -> Option<OpCode> {
        match self.kind {
            OpcodeKind::Cil(opcode) => Some(opcode),
            _ => None,
        }
    }

    /// Returns the special marker, if identified as one.
    #[must_use]
    pub fn special(&self) -> Option<Special> {
        match self.kind {
            OpcodeKind::Special(special) => Some(special),
            _ => None,
        }
    }
}

/// Chooses the encoding of `opcode` that fits a declared operand type.
///
/// Signatures identify the operation (`br`, `ldloc`, `ldc.i4`); the declared
/// operand type decides between long and short forms.
#[must_use]
pub fn operand_form(opcode: OpCode, operand_type: VirtualOperandType) -> OpCode {
    let short = matches!(
        operand_type,
        VirtualOperandType::ShortInlineBrTarget
            | VirtualOperandType::ShortInlineVar
            | VirtualOperandType::ShortInlineI
    );
    const PAIRS: &[(OpCode, OpCode)] = &[
        (OpCode::Br, OpCode::BrS),
        (OpCode::Brfalse, OpCode::BrfalseS),
        (OpCode::Brtrue, OpCode::BrtrueS),
        (OpCode::Beq, OpCode::BeqS),
        (OpCode::Bge, OpCode::BgeS),
        (OpCode::Bgt, OpCode::BgtS),
        (OpCode::Ble, OpCode::BleS),
        (OpCode::Blt, OpCode::BltS),
        (OpCode::BneUn, OpCode::BneUnS),
        (OpCode::BgeUn, OpCode::BgeUnS),
        (OpCode::BgtUn, OpCode::BgtUnS),
        (OpCode::BleUn, OpCode::BleUnS),
        (OpCode::BltUn, OpCode::BltUnS),
        (OpCode::Leave, OpCode::LeaveS),
        (OpCode::Ldloc, OpCode::LdlocS),
        (OpCode::Stloc, OpCode::StlocS),
        (OpCode::Ldloca, OpCode::LdlocaS),
        (OpCode::Ldarg, OpCode::LdargS),
        (OpCode::Starg, OpCode::StargS),
        (OpCode::Ldarga, OpCode::LdargaS),
        (OpCode::LdcI4, OpCode::LdcI4S),
    ];

    PAIRS
        .iter()
        .find(|(long, short_form)| *long == opcode || *short_form == opcode)
        .map_or(opcode, |&(long, short_form)| if short { short_form } else { long })
}
