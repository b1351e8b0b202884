//! Metadata operand resolution.
//!
//! Reference operands of virtual instructions (types, fields, methods, strings
//! and inlined calls) are positions into the resolver stream. The records found
//! there describe the operand by name and by the positions of other records, and
//! the [`Resolver`] turns them into references valid in the destination module:
//!
//! - token records are looked up directly
//! - type records are rebuilt from their reflection name ([`TypeName`]), with
//!   generic arguments resolved recursively
//! - field records are looked up by name on their declaring type
//! - method records are matched against imported references (external types) or
//!   declared methods (internal types), and synthesized for external types when
//!   nothing matches
//!
//! # Examples
//!
//! ```rust
//! use eazdevirt::resolver::{TypeModifier, TypeName};
//!
//! let name: TypeName = "Foo.Bar[], MyAsm, Version=1.0.0.0".parse()?;
//! assert_eq!(name.full_name(), "Foo.Bar");
//! assert_eq!(name.modifiers, vec![TypeModifier::SzArray]);
//! assert_eq!(name.assembly.unwrap().name, "MyAsm");
//! # Ok::<(), eazdevirt::Error>(())
//! ```

mod operand;
mod resolve;
mod typename;

pub use operand::{
    EazCallRecord, FieldRecord, GenericParamRef, MethodRecord, MethodRecordFlags, OperandRecord,
    RecordKind, TypeRecord,
};
pub use resolve::{Resolver, DEFAULT_MAX_DEPTH};
pub use typename::{TypeModifier, TypeName};
