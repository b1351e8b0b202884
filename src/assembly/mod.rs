//! CIL instruction model.
//!
//! This module holds the recovery target of devirtualization: the ECMA-335
//! [`OpCode`] table, [`Instruction`]s with resolved operands, and
//! [`MethodBody`]s with [`ExceptionHandler`]s expressed as instruction labels.
//!
//! # Key Components
//!
//! - [`OpCode`] - Every CIL opcode with encoding, mnemonic, operand type and flow
//! - [`Instruction`] / [`Operand`] - A reconstructed instruction
//! - [`MethodBody`] - The body that replaces a virtualized stub

mod body;
mod instruction;
mod opcodes;

pub use body::{ExceptionHandler, ExceptionHandlerFlags, MethodBody};
pub use instruction::{Immediate, Instruction, Label, Operand};
pub use opcodes::{FlowType, OpCode, OperandType};
