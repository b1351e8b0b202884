//! Structural pattern matching over CIL bodies.
//!
//! A [`Signature`] is an ordered list of [`Symbol`]s, matched either against a
//! whole body ([`MatchMode::Contiguous`]) or as the first window anywhere in it
//! ([`MatchMode::Window`]). Symbols are exact opcodes, interchange classes
//! ([`OpClass`], e.g. any `ldloc` encoding) or wildcards.
//!
//! Shapes alone cannot tell apart handlers that differ only by an embedded token,
//! so a signature can carry a [`Verifier`]: a plain function over the matched
//! window that inspects operands and may match other signatures against bodies
//! reachable through those operands ([`MatchContext::callee_matches`]). Signatures
//! therefore form a small verification call graph, bounded by
//! [`MAX_MATCH_DEPTH`].
//!
//! # Examples
//!
//! ```rust
//! use eazdevirt::assembly::{Instruction, OpCode};
//! use eazdevirt::pattern::{OpClass, Signature, Symbol};
//!
//! let signature = Signature::window("add-two-locals", [
//!     Symbol::Class(OpClass::LoadLocal),
//!     Symbol::Class(OpClass::LoadLocal),
//!     Symbol::Op(OpCode::Add),
//! ]);
//! assert_eq!(signature.symbols().len(), 3);
//! assert_eq!(signature.to_string(), "add-two-locals: [<LoadLocal>, <LoadLocal>, add]");
//! ```

mod matcher;
mod signature;
mod symbol;

pub use matcher::{contains_sequence, InterpreterAnchors, Match, MatchContext, MAX_MATCH_DEPTH};
pub use signature::{MatchMode, Signature, Verifier};
pub use symbol::{OpClass, Symbol};
