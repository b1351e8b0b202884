//! CIL opcode table (ECMA-335 Partition III).
//!
//! [`OpCode`] is the recovery target of the devirtualizer: every identified virtual
//! opcode maps to exactly one variant. Each variant knows its encoding, mnemonic,
//! inline operand type and control flow behaviour. Two-byte opcodes are encoded as
//! `0xFExx`.
//!
//! The predicate helpers (`is_load_local`, `is_store_arg`, ...) back the interchange
//! classes of [`crate::pattern::OpClass`], where several encodings of the same
//! operation (e.g. `ldloc.0`, `ldloc.s`, `ldloc`) are treated as one shape.

use strum::{EnumCount, EnumIter, IntoEnumIterator};

/// Inline operand type of a CIL opcode, as named by ECMA-335.
///
/// # Thread Safety
///
/// [`OperandType`] is [`std::marker::Send`] and [`std::marker::Sync`] as it only contains unit variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum OperandType {
    /// 32-bit branch target
    InlineBrTarget,
    /// Field token
    InlineField,
    /// 32-bit integer
    InlineI,
    /// 64-bit integer
    InlineI8,
    /// Method token
    InlineMethod,
    /// No operand
    InlineNone,
    /// 64-bit float
    InlineR,
    /// Standalone signature token
    InlineSig,
    /// User string token
    InlineString,
    /// Switch jump table
    InlineSwitch,
    /// Type, field or method token (`ldtoken`)
    InlineTok,
    /// Type token
    InlineType,
    /// 16-bit local or argument index
    InlineVar,
    /// 8-bit branch target
    ShortInlineBrTarget,
    /// 8-bit integer
    ShortInlineI,
    /// 32-bit float
    ShortInlineR,
    /// 8-bit local or argument index
    ShortInlineVar,
}

impl OperandType {
    /// Returns the size in bytes of this operand in a regular CIL body.
    ///
    /// Returns `None` for [`OperandType::InlineSwitch`], whose size depends on its
    /// target count.
    #[must_use]
    pub fn size(&self) -> Option<usize> {
        match self {
            OperandType::InlineNone => Some(0),
            OperandType::ShortInlineBrTarget
            | OperandType::ShortInlineI
            | OperandType::ShortInlineVar => Some(1),
            OperandType::InlineVar => Some(2),
            OperandType::InlineBrTarget
            | OperandType::InlineField
            | OperandType::InlineI
            | OperandType::InlineMethod
            | OperandType::InlineSig
            | OperandType::InlineString
            | OperandType::InlineTok
            | OperandType::InlineType
            | OperandType::ShortInlineR => Some(4),
            OperandType::InlineI8 | OperandType::InlineR => Some(8),
            OperandType::InlineSwitch => None,
        }
    }

    /// Returns `true` for operands that are metadata references.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            OperandType::InlineField
                | OperandType::InlineMethod
                | OperandType::InlineSig
                | OperandType::InlineString
                | OperandType::InlineTok
                | OperandType::InlineType
        )
    }
}

/// How an instruction affects control flow.
///
/// # Thread Safety
///
/// [`FlowType`] is [`std::marker::Send`] and [`std::marker::Sync`] as it only contains unit variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location (unconditional jump)
    UnconditionalBranch,
    /// Call to another method
    Call,
    /// Returns from current method
    Return,
    /// Multi-way branch (switch statement)
    Switch,
    /// Exception throwing
    Throw,
    /// End of finally or filter block
    EndFinally,
    /// Leave protected region (try/catch/finally)
    Leave,
}

macro_rules! define_opcodes {
    ($(
        $variant:ident => ($code:literal, $mnemonic:literal, $operand:ident, $flow:ident)
    ),* $(,)?) => {

        /// A CIL opcode.
        ///
        /// # Examples
        ///
        /// ```rust
        /// use eazdevirt::assembly::{OpCode, OperandType, FlowType};
        ///
        /// let op = OpCode::from_code(0xFE01).unwrap();
        /// assert_eq!(op, OpCode::Ceq);
        /// assert_eq!(op.mnemonic(), "ceq");
        /// assert_eq!(OpCode::BrS.operand_type(), OperandType::ShortInlineBrTarget);
        /// assert_eq!(OpCode::Ret.flow(), FlowType::Return);
        /// ```
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumCount)]
        pub enum OpCode {
            $(
                #[doc = concat!("`", $mnemonic, "`")]
                $variant,
            )*
        }

        impl OpCode {
            /// Returns the encoded value (`0xFExx` for two-byte opcodes).
            #[must_use]
            pub fn code(self) -> u16 {
                match self {
                    $( OpCode::$variant => $code, )*
                }
            }

            /// Returns the ECMA-335 mnemonic.
            #[must_use]
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $( OpCode::$variant => $mnemonic, )*
                }
            }

            /// Returns the inline operand type.
            #[must_use]
            pub fn operand_type(self) -> OperandType {
                match self {
                    $( OpCode::$variant => OperandType::$operand, )*
                }
            }

            /// Returns the control flow behaviour.
            #[must_use]
            pub fn flow(self) -> FlowType {
                match self {
                    $( OpCode::$variant => FlowType::$flow, )*
                }
            }

            /// Looks an opcode up by its encoded value.
            #[must_use]
            pub fn from_code(code: u16) -> Option<OpCode> {
                match code {
                    $( $code => Some(OpCode::$variant), )*
                    _ => None,
                }
            }
        }
    };
}

define_opcodes! {
    Nop => (0x00, "nop", InlineNone, Sequential),
    Break => (0x01, "break", InlineNone, Sequential),
    Ldarg0 => (0x02, "ldarg.0", InlineNone, Sequential),
    Ldarg1 => (0x03, "ldarg.1", InlineNone, Sequential),
    Ldarg2 => (0x04, "ldarg.2", InlineNone, Sequential),
    Ldarg3 => (0x05, "ldarg.3", InlineNone, Sequential),
    Ldloc0 => (0x06, "ldloc.0", InlineNone, Sequential),
    Ldloc1 => (0x07, "ldloc.1", InlineNone, Sequential),
    Ldloc2 => (0x08, "ldloc.2", InlineNone, Sequential),
    Ldloc3 => (0x09, "ldloc.3", InlineNone, Sequential),
    Stloc0 => (0x0A, "stloc.0", InlineNone, Sequential),
    Stloc1 => (0x0B, "stloc.1", InlineNone, Sequential),
    Stloc2 => (0x0C, "stloc.2", InlineNone, Sequential),
    Stloc3 => (0x0D, "stloc.3", InlineNone, Sequential),
    LdargS => (0x0E, "ldarg.s", ShortInlineVar, Sequential),
    LdargaS => (0x0F, "ldarga.s", ShortInlineVar, Sequential),
    StargS => (0x10, "starg.s", ShortInlineVar, Sequential),
    LdlocS => (0x11, "ldloc.s", ShortInlineVar, Sequential),
    LdlocaS => (0x12, "ldloca.s", ShortInlineVar, Sequential),
    StlocS => (0x13, "stloc.s", ShortInlineVar, Sequential),
    Ldnull => (0x14, "ldnull", InlineNone, Sequential),
    LdcI4M1 => (0x15, "ldc.i4.m1", InlineNone, Sequential),
    LdcI40 => (0x16, "ldc.i4.0", InlineNone, Sequential),
    LdcI41 => (0x17, "ldc.i4.1", InlineNone, Sequential),
    LdcI42 => (0x18, "ldc.i4.2", InlineNone, Sequential),
    LdcI43 => (0x19, "ldc.i4.3", InlineNone, Sequential),
    LdcI44 => (0x1A, "ldc.i4.4", InlineNone, Sequential),
    LdcI45 => (0x1B, "ldc.i4.5", InlineNone, Sequential),
    LdcI46 => (0x1C, "ldc.i4.6", InlineNone, Sequential),
    LdcI47 => (0x1D, "ldc.i4.7", InlineNone, Sequential),
    LdcI48 => (0x1E, "ldc.i4.8", InlineNone, Sequential),
    LdcI4S => (0x1F, "ldc.i4.s", ShortInlineI, Sequential),
    LdcI4 => (0x20, "ldc.i4", InlineI, Sequential),
    LdcI8 => (0x21, "ldc.i8", InlineI8, Sequential),
    LdcR4 => (0x22, "ldc.r4", ShortInlineR, Sequential),
    LdcR8 => (0x23, "ldc.r8", InlineR, Sequential),
    Dup => (0x25, "dup", InlineNone, Sequential),
    Pop => (0x26, "pop", InlineNone, Sequential),
    Jmp => (0x27, "jmp", InlineMethod, Call),
    Call => (0x28, "call", InlineMethod, Call),
    Calli => (0x29, "calli", InlineSig, Call),
    Ret => (0x2A, "ret", InlineNone, Return),
    BrS => (0x2B, "br.s", ShortInlineBrTarget, UnconditionalBranch),
    BrfalseS => (0x2C, "brfalse.s", ShortInlineBrTarget, ConditionalBranch),
    BrtrueS => (0x2D, "brtrue.s", ShortInlineBrTarget, ConditionalBranch),
    BeqS => (0x2E, "beq.s", ShortInlineBrTarget, ConditionalBranch),
    BgeS => (0x2F, "bge.s", ShortInlineBrTarget, ConditionalBranch),
    BgtS => (0x30, "bgt.s", ShortInlineBrTarget, ConditionalBranch),
    BleS => (0x31, "ble.s", ShortInlineBrTarget, ConditionalBranch),
    BltS => (0x32, "blt.s", ShortInlineBrTarget, ConditionalBranch),
    BneUnS => (0x33, "bne.un.s", ShortInlineBrTarget, ConditionalBranch),
    BgeUnS => (0x34, "bge.un.s", ShortInlineBrTarget, ConditionalBranch),
    BgtUnS => (0x35, "bgt.un.s", ShortInlineBrTarget, ConditionalBranch),
    BleUnS => (0x36, "ble.un.s", ShortInlineBrTarget, ConditionalBranch),
    BltUnS => (0x37, "blt.un.s", ShortInlineBrTarget, ConditionalBranch),
    Br => (0x38, "br", InlineBrTarget, UnconditionalBranch),
    Brfalse => (0x39, "brfalse", InlineBrTarget, ConditionalBranch),
    Brtrue => (0x3A, "brtrue", InlineBrTarget, ConditionalBranch),
    Beq => (0x3B, "beq", InlineBrTarget, ConditionalBranch),
    Bge => (0x3C, "bge", InlineBrTarget, ConditionalBranch),
    Bgt => (0x3D, "bgt", InlineBrTarget, ConditionalBranch),
    Ble => (0x3E, "ble", InlineBrTarget, ConditionalBranch),
    Blt => (0x3F, "blt", InlineBrTarget, ConditionalBranch),
    BneUn => (0x40, "bne.un", InlineBrTarget, ConditionalBranch),
    BgeUn => (0x41, "bge.un", InlineBrTarget, ConditionalBranch),
    BgtUn => (0x42, "bgt.un", InlineBrTarget, ConditionalBranch),
    BleUn => (0x43, "ble.un", InlineBrTarget, ConditionalBranch),
    BltUn => (0x44, "blt.un", InlineBrTarget, ConditionalBranch),
    Switch => (0x45, "switch", InlineSwitch, Switch),
    LdindI1 => (0x46, "ldind.i1", InlineNone, Sequential),
    LdindU1 => (0x47, "ldind.u1", InlineNone, Sequential),
    LdindI2 => (0x48, "ldind.i2", InlineNone, Sequential),
    LdindU2 => (0x49, "ldind.u2", InlineNone, Sequential),
    LdindI4 => (0x4A, "ldind.i4", InlineNone, Sequential),
    LdindU4 => (0x4B, "ldind.u4", InlineNone, Sequential),
    LdindI8 => (0x4C, "ldind.i8", InlineNone, Sequential),
    LdindI => (0x4D, "ldind.i", InlineNone, Sequential),
    LdindR4 => (0x4E, "ldind.r4", InlineNone, Sequential),
    LdindR8 => (0x4F, "ldind.r8", InlineNone, Sequential),
    LdindRef => (0x50, "ldind.ref", InlineNone, Sequential),
    StindRef => (0x51, "stind.ref", InlineNone, Sequential),
    StindI1 => (0x52, "stind.i1", InlineNone, Sequential),
    StindI2 => (0x53, "stind.i2", InlineNone, Sequential),
    StindI4 => (0x54, "stind.i4", InlineNone, Sequential),
    StindI8 => (0x55, "stind.i8", InlineNone, Sequential),
    StindR4 => (0x56, "stind.r4", InlineNone, Sequential),
    StindR8 => (0x57, "stind.r8", InlineNone, Sequential),
    Add => (0x58, "add", InlineNone, Sequential),
    Sub => (0x59, "sub", InlineNone, Sequential),
    Mul => (0x5A, "mul", InlineNone, Sequential),
    Div => (0x5B, "div", InlineNone, Sequential),
    DivUn => (0x5C, "div.un", InlineNone, Sequential),
    Rem => (0x5D, "rem", InlineNone, Sequential),
    RemUn => (0x5E, "rem.un", InlineNone, Sequential),
    And => (0x5F, "and", InlineNone, Sequential),
    Or => (0x60, "or", InlineNone, Sequential),
    Xor => (0x61, "xor", InlineNone, Sequential),
    Shl => (0x62, "shl", InlineNone, Sequential),
    Shr => (0x63, "shr", InlineNone, Sequential),
    ShrUn => (0x64, "shr.un", InlineNone, Sequential),
    Neg => (0x65, "neg", InlineNone, Sequential),
    Not => (0x66, "not", InlineNone, Sequential),
    ConvI1 => (0x67, "conv.i1", InlineNone, Sequential),
    ConvI2 => (0x68, "conv.i2", InlineNone, Sequential),
    ConvI4 => (0x69, "conv.i4", InlineNone, Sequential),
    ConvI8 => (0x6A, "conv.i8", InlineNone, Sequential),
    ConvR4 => (0x6B, "conv.r4", InlineNone, Sequential),
    ConvR8 => (0x6C, "conv.r8", InlineNone, Sequential),
    ConvU4 => (0x6D, "conv.u4", InlineNone, Sequential),
    ConvU8 => (0x6E, "conv.u8", InlineNone, Sequential),
    Callvirt => (0x6F, "callvirt", InlineMethod, Call),
    Cpobj => (0x70, "cpobj", InlineType, Sequential),
    Ldobj => (0x71, "ldobj", InlineType, Sequential),
    Ldstr => (0x72, "ldstr", InlineString, Sequential),
    Newobj => (0x73, "newobj", InlineMethod, Call),
    Castclass => (0x74, "castclass", InlineType, Sequential),
    Isinst => (0x75, "isinst", InlineType, Sequential),
    ConvRUn => (0x76, "conv.r.un", InlineNone, Sequential),
    Unbox => (0x79, "unbox", InlineType, Sequential),
    Throw => (0x7A, "throw", InlineNone, Throw),
    Ldfld => (0x7B, "ldfld", InlineField, Sequential),
    Ldflda => (0x7C, "ldflda", InlineField, Sequential),
    Stfld => (0x7D, "stfld", InlineField, Sequential),
    Ldsfld => (0x7E, "ldsfld", InlineField, Sequential),
    Ldsflda => (0x7F, "ldsflda", InlineField, Sequential),
    Stsfld => (0x80, "stsfld", InlineField, Sequential),
    Stobj => (0x81, "stobj", InlineType, Sequential),
    ConvOvfI1Un => (0x82, "conv.ovf.i1.un", InlineNone, Sequential),
    ConvOvfI2Un => (0x83, "conv.ovf.i2.un", InlineNone, Sequential),
    ConvOvfI4Un => (0x84, "conv.ovf.i4.un", InlineNone, Sequential),
    ConvOvfI8Un => (0x85, "conv.ovf.i8.un", InlineNone, Sequential),
    ConvOvfU1Un => (0x86, "conv.ovf.u1.un", InlineNone, Sequential),
    ConvOvfU2Un => (0x87, "conv.ovf.u2.un", InlineNone, Sequential),
    ConvOvfU4Un => (0x88, "conv.ovf.u4.un", InlineNone, Sequential),
    ConvOvfU8Un => (0x89, "conv.ovf.u8.un", InlineNone, Sequential),
    ConvOvfIUn => (0x8A, "conv.ovf.i.un", InlineNone, Sequential),
    ConvOvfUUn => (0x8B, "conv.ovf.u.un", InlineNone, Sequential),
    Box => (0x8C, "box", InlineType, Sequential),
    Newarr => (0x8D, "newarr", InlineType, Sequential),
    Ldlen => (0x8E, "ldlen", InlineNone, Sequential),
    Ldelema => (0x8F, "ldelema", InlineType, Sequential),
    LdelemI1 => (0x90, "ldelem.i1", InlineNone, Sequential),
    LdelemU1 => (0x91, "ldelem.u1", InlineNone, Sequential),
    LdelemI2 => (0x92, "ldelem.i2", InlineNone, Sequential),
    LdelemU2 => (0x93, "ldelem.u2", InlineNone, Sequential),
    LdelemI4 => (0x94, "ldelem.i4", InlineNone, Sequential),
    LdelemU4 => (0x95, "ldelem.u4", InlineNone, Sequential),
    LdelemI8 => (0x96, "ldelem.i8", InlineNone, Sequential),
    LdelemI => (0x97, "ldelem.i", InlineNone, Sequential),
    LdelemR4 => (0x98, "ldelem.r4", InlineNone, Sequential),
    LdelemR8 => (0x99, "ldelem.r8", InlineNone, Sequential),
    LdelemRef => (0x9A, "ldelem.ref", InlineNone, Sequential),
    StelemI => (0x9B, "stelem.i", InlineNone, Sequential),
    StelemI1 => (0x9C, "stelem.i1", InlineNone, Sequential),
    StelemI2 => (0x9D, "stelem.i2", InlineNone, Sequential),
    StelemI4 => (0x9E, "stelem.i4", InlineNone, Sequential),
    StelemI8 => (0x9F, "stelem.i8", InlineNone, Sequential),
    StelemR4 => (0xA0, "stelem.r4", InlineNone, Sequential),
    StelemR8 => (0xA1, "stelem.r8", InlineNone, Sequential),
    StelemRef => (0xA2, "stelem.ref", InlineNone, Sequential),
    Ldelem => (0xA3, "ldelem", InlineType, Sequential),
    Stelem => (0xA4, "stelem", InlineType, Sequential),
    UnboxAny => (0xA5, "unbox.any", InlineType, Sequential),
    ConvOvfI1 => (0xB3, "conv.ovf.i1", InlineNone, Sequential),
    ConvOvfU1 => (0xB4, "conv.ovf.u1", InlineNone, Sequential),
    ConvOvfI2 => (0xB5, "conv.ovf.i2", InlineNone, Sequential),
    ConvOvfU2 => (0xB6, "conv.ovf.u2", InlineNone, Sequential),
    ConvOvfI4 => (0xB7, "conv.ovf.i4", InlineNone, Sequential),
    ConvOvfU4 => (0xB8, "conv.ovf.u4", InlineNone, Sequential),
    ConvOvfI8 => (0xB9, "conv.ovf.i8", InlineNone, Sequential),
    ConvOvfU8 => (0xBA, "conv.ovf.u8", InlineNone, Sequential),
    Refanyval => (0xC2, "refanyval", InlineType, Sequential),
    Ckfinite => (0xC3, "ckfinite", InlineNone, Sequential),
    Mkrefany => (0xC6, "mkrefany", InlineType, Sequential),
    Ldtoken => (0xD0, "ldtoken", InlineTok, Sequential),
    ConvU2 => (0xD1, "conv.u2", InlineNone, Sequential),
    ConvU1 => (0xD2, "conv.u1", InlineNone, Sequential),
    ConvI => (0xD3, "conv.i", InlineNone, Sequential),
    ConvOvfI => (0xD4, "conv.ovf.i", InlineNone, Sequential),
    ConvOvfU => (0xD5, "conv.ovf.u", InlineNone, Sequential),
    AddOvf => (0xD6, "add.ovf", InlineNone, Sequential),
    AddOvfUn => (0xD7, "add.ovf.un", InlineNone, Sequential),
    MulOvf => (0xD8, "mul.ovf", InlineNone, Sequential),
    MulOvfUn => (0xD9, "mul.ovf.un", InlineNone, Sequential),
    SubOvf => (0xDA, "sub.ovf", InlineNone, Sequential),
    SubOvfUn => (0xDB, "sub.ovf.un", InlineNone, Sequential),
    Endfinally => (0xDC, "endfinally", InlineNone, EndFinally),
    Leave => (0xDD, "leave", InlineBrTarget, Leave),
    LeaveS => (0xDE, "leave.s", ShortInlineBrTarget, Leave),
    StindI => (0xDF, "stind.i", InlineNone, Sequential),
    ConvU => (0xE0, "conv.u", InlineNone, Sequential),
    Arglist => (0xFE00, "arglist", InlineNone, Sequential),
    Ceq => (0xFE01, "ceq", InlineNone, Sequential),
    Cgt => (0xFE02, "cgt", InlineNone, Sequential),
    CgtUn => (0xFE03, "cgt.un", InlineNone, Sequential),
    Clt => (0xFE04, "clt", InlineNone, Sequential),
    CltUn => (0xFE05, "clt.un", InlineNone, Sequential),
    Ldftn => (0xFE06, "ldftn", InlineMethod, Sequential),
    Ldvirtftn => (0xFE07, "ldvirtftn", InlineMethod, Sequential),
    Ldarg => (0xFE09, "ldarg", InlineVar, Sequential),
    Ldarga => (0xFE0A, "ldarga", InlineVar, Sequential),
    Starg => (0xFE0B, "starg", InlineVar, Sequential),
    Ldloc => (0xFE0C, "ldloc", InlineVar, Sequential),
    Ldloca => (0xFE0D, "ldloca", InlineVar, Sequential),
    Stloc => (0xFE0E, "stloc", InlineVar, Sequential),
    Localloc => (0xFE0F, "localloc", InlineNone, Sequential),
    Endfilter => (0xFE11, "endfilter", InlineNone, EndFinally),
    Unaligned => (0xFE12, "unaligned.", ShortInlineI, Sequential),
    Volatile => (0xFE13, "volatile.", InlineNone, Sequential),
    Tail => (0xFE14, "tail.", InlineNone, Sequential),
    Initobj => (0xFE15, "initobj", InlineType, Sequential),
    Constrained => (0xFE16, "constrained.", InlineType, Sequential),
    Cpblk => (0xFE17, "cpblk", InlineNone, Sequential),
    Initblk => (0xFE18, "initblk", InlineNone, Sequential),
    No => (0xFE19, "no.", ShortInlineI, Sequential),
    Rethrow => (0xFE1A, "rethrow", InlineNone, Throw),
    Sizeof => (0xFE1C, "sizeof", InlineType, Sequential),
    Refanytype => (0xFE1D, "refanytype", InlineNone, Sequential),
    Readonly => (0xFE1E, "readonly.", InlineNone, Sequential),
}

impl OpCode {
    /// Iterates over every opcode in encoding order.
    pub fn all() -> impl Iterator<Item = OpCode> {
        OpCode::iter()
    }

    /// Returns `true` for `ldloc.0`-`ldloc.3`, `ldloc.s` and `ldloc`.
    #[must_use]
    pub fn is_load_local(self) -> bool {
        matches!(
            self,
            OpCode::Ldloc0
                | OpCode::Ldloc1
                | OpCode::Ldloc2
                | OpCode::Ldloc3
                | OpCode::LdlocS
                | OpCode::Ldloc
        )
    }

    /// Returns `true` for `stloc.0`-`stloc.3`, `stloc.s` and `stloc`.
    #[must_use]
    pub fn is_store_local(self) -> bool {
        matches!(
            self,
            OpCode::Stloc0
                | OpCode::Stloc1
                | OpCode::Stloc2
                | OpCode::Stloc3
                | OpCode::StlocS
                | OpCode::Stloc
        )
    }

    /// Returns `true` for `ldarg.0`-`ldarg.3`, `ldarg.s` and `ldarg`.
    #[must_use]
    pub fn is_load_arg(self) -> bool {
        matches!(
            self,
            OpCode::Ldarg0
                | OpCode::Ldarg1
                | OpCode::Ldarg2
                | OpCode::Ldarg3
                | OpCode::LdargS
                | OpCode::Ldarg
        )
    }

    /// Returns `true` for `starg.s` and `starg`.
    #[must_use]
    pub fn is_store_arg(self) -> bool {
        matches!(self, OpCode::StargS | OpCode::Starg)
    }

    /// Returns `true` for every `ldc.i4` encoding.
    #[must_use]
    pub fn is_load_const_i4(self) -> bool {
        self.implicit_i4().is_some() || matches!(self, OpCode::LdcI4S | OpCode::LdcI4)
    }

    /// Returns the constant pushed by `ldc.i4.m1`-`ldc.i4.8`.
    #[must_use]
    pub fn implicit_i4(self) -> Option<i32> {
        match self {
            OpCode::LdcI4M1 => Some(-1),
            OpCode::LdcI40 => Some(0),
            OpCode::LdcI41 => Some(1),
            OpCode::LdcI42 => Some(2),
            OpCode::LdcI43 => Some(3),
            OpCode::LdcI44 => Some(4),
            OpCode::LdcI45 => Some(5),
            OpCode::LdcI46 => Some(6),
            OpCode::LdcI47 => Some(7),
            OpCode::LdcI48 => Some(8),
            _ => None,
        }
    }

    /// Returns the slot index of the short local/argument forms (`ldloc.2` is 2).
    #[must_use]
    pub fn implicit_index(self) -> Option<u16> {
        match self {
            OpCode::Ldarg0 | OpCode::Ldloc0 | OpCode::Stloc0 => Some(0),
            OpCode::Ldarg1 | OpCode::Ldloc1 | OpCode::Stloc1 => Some(1),
            OpCode::Ldarg2 | OpCode::Ldloc2 | OpCode::Stloc2 => Some(2),
            OpCode::Ldarg3 | OpCode::Ldloc3 | OpCode::Stloc3 => Some(3),
            _ => None,
        }
    }

    /// Returns `true` for `call` and `callvirt`.
    #[must_use]
    pub fn is_call(self) -> bool {
        matches!(self, OpCode::Call | OpCode::Callvirt)
    }

    /// Returns `true` for `brtrue` and `brtrue.s`.
    #[must_use]
    pub fn is_branch_true(self) -> bool {
        matches!(self, OpCode::Brtrue | OpCode::BrtrueS)
    }

    /// Returns `true` for `brfalse` and `brfalse.s`.
    #[must_use]
    pub fn is_branch_false(self) -> bool {
        matches!(self, OpCode::Brfalse | OpCode::BrfalseS)
    }

    /// Returns `true` for `br` and `br.s`.
    #[must_use]
    pub fn is_unconditional_branch(self) -> bool {
        matches!(self, OpCode::Br | OpCode::BrS)
    }

    /// Returns `true` for every integer/float conversion opcode.
    #[must_use]
    pub fn is_conversion(self) -> bool {
        self.mnemonic().starts_with("conv.")
    }

    /// Returns `true` if an `InlineVar`/`ShortInlineVar` operand indexes arguments
    /// rather than locals.
    #[must_use]
    pub fn indexes_arguments(self) -> bool {
        matches!(
            self,
            OpCode::Ldarg
                | OpCode::LdargS
                | OpCode::Ldarga
                | OpCode::LdargaS
                | OpCode::Starg
                | OpCode::StargS
        )
    }

    /// Returns `true` if the opcode takes a branch target or jump table.
    #[must_use]
    pub fn is_branch(self) -> bool {
        matches!(
            self.operand_type(),
            OperandType::InlineBrTarget
                | OperandType::ShortInlineBrTarget
                | OperandType::InlineSwitch
        )
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
