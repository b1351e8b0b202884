//! The embedded interpreter: virtual opcodes, their identification and the
//! per-build record layouts.
//!
//! # Key Components
//!
//! - [`VirtualOpcode`] / [`OpcodeKind`] - One handler table row and what it was identified as
//! - [`OpcodeCatalog`] - Code to opcode mapping, built once from the handler table
//! - [`CatalogEntry`] / [`Template`] - The declarative handler signature table
//! - [`RecordLayout`] - Header field order and operand token placement of a build
//!
//! # Examples
//!
//! ```rust
//! use eazdevirt::assembly::OpCode;
//! use eazdevirt::vm::{operand_form, VirtualOperandType};
//!
//! let operand_type = VirtualOperandType::from_code(13)?;
//! assert_eq!(operand_type, VirtualOperandType::ShortInlineBrTarget);
//! assert_eq!(operand_type.width(), Some(4));
//! assert_eq!(operand_form(OpCode::Br, operand_type), OpCode::BrS);
//! # Ok::<(), eazdevirt::Error>(())
//! ```

mod catalog;
mod layout;
mod opcode;
mod signatures;

pub use catalog::{classify, HandlerEntry, OpcodeCatalog};
pub use layout::{
    discover_header_layout, discover_operand_layout, HeaderField, HeaderLayout, LayoutSource,
    OperandLayout, RecordLayout,
};
pub use opcode::{operand_form, OpcodeKind, Special, VirtualOpcode, VirtualOperandType};
pub use signatures::{
    calls_jump, catalog_entries, compare_branch, helper_containing, invoke, load_slot,
    masks_call_position, push_constant, slot_address, stack_helper, store_slot, truth_branch,
    Callee, CatalogEntry, FieldCheck, Template, TypeCheck, COMPARE_BRANCHES, CONSTANTS,
};
