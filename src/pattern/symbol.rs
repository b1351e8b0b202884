//! Instruction-shape symbols.

use std::fmt;

use crate::assembly::{Instruction, OpCode};

/// Interchange classes: several encodings of one operation treated as one shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum OpClass {
    /// `ldarg.0`-`ldarg.3`, `ldarg.s`, `ldarg`
    LoadArg,
    /// `ldloc.0`-`ldloc.3`, `ldloc.s`, `ldloc`
    LoadLocal,
    /// `stloc.0`-`stloc.3`, `stloc.s`, `stloc`
    StoreLocal,
    /// `starg.s`, `starg`
    StoreArg,
    /// Every `ldc.i4` encoding
    LoadConstI4,
    /// `call`, `callvirt`
    Call,
    /// `brtrue`, `brtrue.s`
    BranchTrue,
    /// `brfalse`, `brfalse.s`
    BranchFalse,
    /// `br`, `br.s`
    Branch,
    /// Every `conv.*` opcode
    Conv,
}

impl OpClass {
    /// Returns `true` if `opcode` belongs to this class.
    #[must_use]
    pub fn contains(self, opcode: OpCode) -> bool {
        match self {
            OpClass::LoadArg => opcode.is_load_arg(),
            OpClass::LoadLocal => opcode.is_load_local(),
            OpClass::StoreLocal => opcode.is_store_local(),
            OpClass::StoreArg => opcode.is_store_arg(),
            OpClass::LoadConstI4 => opcode.is_load_const_i4(),
            OpClass::Call => opcode.is_call(),
            OpClass::BranchTrue => opcode.is_branch_true(),
            OpClass::BranchFalse => opcode.is_branch_false(),
            OpClass::Branch => opcode.is_unconditional_branch(),
            OpClass::Conv => opcode.is_conversion(),
        }
    }
}

/// One position of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// Exactly this opcode
    Op(OpCode),
    /// Any opcode of the class
    Class(OpClass),
    /// Any single instruction
    Any,
}

impl Symbol {
    /// Returns `true` if `instruction` has the shape of this symbol.
    #[must_use]
    pub fn matches(&self, instruction: &Instruction) -> bool {
        match self {
            Symbol::Op(opcode) => instruction.opcode == *opcode,
            Symbol::Class(class) => class.contains(instruction.opcode),
            Symbol::Any => true,
        }
    }
}

impl From<OpCode> for Symbol {
    fn from(opcode: OpCode) -> Self {
        Symbol::Op(opcode)
    }
}

impl From<OpClass> for Symbol {
    fn from(class: OpClass) -> Self {
        Symbol::Class(class)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Op(opcode) => write!(f, "{opcode}"),
            Symbol::Class(class) => write!(f, "<{class}>"),
            Symbol::Any => f.write_str("*"),
        }
    }
}
