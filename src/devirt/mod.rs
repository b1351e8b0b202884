//! Devirtualization of protected methods.
//!
//! This module drives recovery of CIL bodies from the interpreter's encrypted
//! method stream. Given a [`Bootstrap`] description of the interpreter (handler
//! table, stream resources, byte order and record layout sources) and the stubs
//! of virtualized methods, a [`Devirtualizer`] decodes every method and writes
//! the recovered bodies back into the [`crate::metadata::MetadataHost`].
//!
//! # Per-method pipeline
//!
//! Every method moves through the states of [`DevirtState`]:
//!
//! 1. the stub's [`PositionKey`] locates the method record; its
//!    [`MethodHeader`] and raw exception table are read and header types resolved
//! 2. the [`InstructionDecoder`] turns virtual instructions into CIL, decrypting
//!    guarded ranges with the configured [`PasswordStore`]
//! 3. [`fix_branches`] rewrites virtual branch offsets into instruction labels
//! 4. [`fix_exception_handlers`] does the same for handler boundaries
//! 5. the body is spliced into the host
//!
//! Decoding that stops at an unidentified or unknown opcode produces a degraded
//! body ending in a placeholder. Degraded bodies skip handler fixup and are
//! spliced unless [`OutputOptions::only_recovered`] is set. Any error ends the
//! method as [`RecoveryStatus::Unrecoverable`] without affecting the others.
//!
//! # Examples
//!
//! ```rust,ignore
//! use eazdevirt::devirt::{DevirtConfig, Devirtualizer};
//!
//! let report = Devirtualizer::new(&module, DevirtConfig::strict()).run(&bootstrap)?;
//! for method in &report.methods {
//!     println!("{method}");
//! }
//! if report.should_save(&DevirtConfig::strict().output) {
//!     // write the module
//! }
//! ```

mod config;
mod decode;
mod engine;
mod fixup;
mod method;
mod password;
mod state;

pub use config::{CounterMode, CounterPolicy, DevirtConfig, OutputOptions};
pub use decode::{DecodeStop, DecodedBody, InstructionDecoder, RawBranch, StopReason};
pub use engine::{Bootstrap, DevirtReport, Devirtualizer, MethodReport, VirtualizedStub};
pub use fixup::{fix_branches, fix_exception_handlers};
pub use method::{
    HeaderParameter, MethodHeader, PositionKey, RawExceptionHandler, RecoveryStatus, VirtualMethod,
};
pub use password::{PasswordEntry, PasswordStore};
pub use state::{DevirtState, StateTracker};
