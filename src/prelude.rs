//! # eazdevirt Prelude
//!
//! The types needed to describe a protected module and run devirtualization
//! against it, for glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all eazdevirt operations
pub use crate::Error;

/// Failure classification of per-method errors
pub use crate::FailureKind;

/// The result type used throughout eazdevirt
pub use crate::Result;

// ================================================================================================
// Devirtualization
// ================================================================================================

/// Pipeline entry point, its input and its report
pub use crate::devirt::{
    Bootstrap, DevirtReport, DevirtState, Devirtualizer, MethodReport, RecoveryStatus,
    VirtualizedStub,
};

/// Run configuration
pub use crate::devirt::{
    CounterMode, CounterPolicy, DevirtConfig, OutputOptions, PasswordEntry, PasswordStore,
};

// ================================================================================================
// Interpreter Description
// ================================================================================================

/// Handler table rows and layout sources
pub use crate::vm::{
    HandlerEntry, HeaderField, HeaderLayout, LayoutSource, OperandLayout, RecordLayout,
};


/// Byte order sources
pub use crate::decoder::{PermutationProfile, ProfileSource};

/// Stream resources and their layers
pub use crate::crypto::{CryptoContext, RsaKey, StreamSpec};

/// Interpreter members handler bodies refer to
pub use crate::pattern::InterpreterAnchors;

// ================================================================================================
// Metadata
// ================================================================================================

/// Host abstraction and the in-memory module
pub use crate::metadata::{MetadataHost, ModuleModel, Token};

/// References and signatures
pub use crate::metadata::{FieldRef, MethodRef, MethodSig, TypeRef, TypeSig};

/// Recovered bodies
pub use crate::assembly::{ExceptionHandler, Instruction, MethodBody, OpCode, Operand};
