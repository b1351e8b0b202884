//! Method bodies and exception handlers in instruction-index space.

use bitflags::bitflags;

use crate::{
    assembly::instruction::{Instruction, Label},
    metadata::TypeSig,
};

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    ///
    /// The same values are used by the virtual exception handler records, so the
    /// raw `kind` byte converts directly.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause; `catch_type` names the caught type.
        const EXCEPTION = 0x0000;
        /// An exception filter and handler clause.
        const FILTER = 0x0001;
        /// A finally clause.
        const FINALLY = 0x0002;
        /// A fault clause (finally that executes only on exception).
        const FAULT = 0x0004;
    }
}

impl ExceptionHandlerFlags {
    /// Converts a raw handler kind, rejecting combinations and unknown bits.
    #[must_use]
    pub fn from_kind(kind: u8) -> Option<Self> {
        match kind {
            0 => Some(ExceptionHandlerFlags::EXCEPTION),
            1 => Some(ExceptionHandlerFlags::FILTER),
            2 => Some(ExceptionHandlerFlags::FINALLY),
            4 => Some(ExceptionHandlerFlags::FAULT),
            _ => None,
        }
    }
}

/// An exception handler whose ranges are expressed as instruction labels.
///
/// Ranges are half-open: `try_start..try_end`, `handler_start..handler_end`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionHandler {
    /// Clause kind
    pub flags: ExceptionHandlerFlags,
    /// First protected instruction
    pub try_start: Label,
    /// First instruction after the protected range
    pub try_end: Label,
    /// First handler instruction
    pub handler_start: Label,
    /// First instruction after the handler
    pub handler_end: Label,
    /// First filter instruction, for filter clauses
    pub filter_start: Option<Label>,
    /// Caught type, for typed clauses
    pub catch_type: Option<TypeSig>,
}

/// A complete method body that replaces a virtualized stub.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MethodBody {
    /// Instructions
    pub instructions: Vec<Instruction>,
    /// Exception handlers
    pub exception_handlers: Vec<ExceptionHandler>,
    /// Local variable types
    pub locals: Vec<TypeSig>,
    /// Zero-initialize locals
    pub init_locals: bool,
    /// Label and stack-depth verification must be skipped when writing this body
    pub skip_verification: bool,
}

impl MethodBody {
    /// Returns the number of placeholder instructions.
    #[must_use]
    pub fn placeholder_count(&self) -> usize {
        self.instructions.iter().filter(|i| i.is_placeholder()).count()
    }

    /// Returns `true` if every branch target and handler boundary lies inside
    /// this body. Handler ends may equal the instruction count.
    #[must_use]
    pub fn labels_in_range(&self) -> bool {
        let len = self.instructions.len();
        let targets_ok = self
            .instructions
            .iter()
            .flat_map(Instruction::targets)
            .all(|label| label.0 < len);

        let handlers_ok = self.exception_handlers.iter().all(|eh| {
            eh.try_start.0 < len
                && eh.handler_start.0 < len
                && eh.try_end.0 <= len
                && eh.handler_end.0 <= len
                && eh.try_start <= eh.try_end
                && eh.handler_start <= eh.handler_end
                && eh.filter_start.map_or(true, |f| f.0 < len)
        });

        targets_ok && handlers_ok
    }
}
