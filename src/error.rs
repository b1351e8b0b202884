use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! bootstrap_error {
    ($msg:expr) => {
        crate::Error::Bootstrap($msg.to_string())
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Bootstrap(format!($fmt, $($arg)*))
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants follow the failure taxonomy of a devirtualization run. Only
/// [`Error::Bootstrap`] is fatal for a whole run; every other variant is caught per
/// method by the [`crate::devirt::Devirtualizer`] and turned into a recovery status.
///
/// # Error Categories
///
/// ## Run-level Errors
/// - [`Error::Bootstrap`] - Crypto keys, permutations or interpreter structure missing
///
/// ## Method-level Errors
/// - [`Error::StreamDesync`] - Unknown virtual opcode code, stream position lost
/// - [`Error::Crypto`] - Missing RSA parameters or chain-cipher password, bad padding
/// - [`Error::Resolution`] - Type, field or method lookup failed
///
/// ## Format Errors
/// - [`Error::Malformed`] - Corrupted record or stream structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond a buffer
/// - [`Error::Io`] - I/O failure of an underlying reader
/// - [`Error::RecursionLimit`] - Operand records nested too deeply
///
/// # Examples
///
/// ```rust
/// use eazdevirt::{Error, FailureKind};
///
/// let err = Error::Resolution("System.Foo::Bar not found".to_string());
/// assert_eq!(err.kind(), FailureKind::Resolution);
/// assert!(!err.is_fatal());
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Bootstrap discovery did not produce usable inputs.
    ///
    /// Raised when a byte permutation cannot be derived, the handler table is
    /// inconsistent, or the record read order cannot be rediscovered. Decoding with
    /// a wrong guess would silently corrupt every following read, so the run aborts.
    #[error("Bootstrap failure - {0}")]
    Bootstrap(String),

    /// An unknown virtual opcode code was read from the instruction stream.
    ///
    /// The operand width of an unknown code cannot be known, so decoding of the
    /// owning method stops at `offset`.
    #[error("Stream desynchronized at virtual offset 0x{offset:x} - unknown opcode code 0x{code:04x}")]
    StreamDesync {
        /// Virtual offset of the unknown opcode
        offset: u32,
        /// The unknown virtual code
        code: u32,
    },

    /// A decryption layer could not be applied.
    #[error("Crypto failure - {0}")]
    Crypto(String),

    /// An operand record could not be turned into a metadata reference.
    #[error("Resolution failure - {0}")]
    Resolution(String),

    /// The data is damaged and could not be parsed.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted.
    #[error("Out of Bound read would have occurred! - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// This feature or encoding is not supported.
    #[error("Not supported - {0}")]
    NotSupported(String),

    /// I/O error of an underlying reader.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// Method token has no body in the host module.
    #[error("No method body for {0}")]
    MissingBody(Token),

    /// Recursion limit reached while following operand records.
    ///
    /// The associated value is the limit that was hit.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// Failed to lock target.
    #[error("Failed to lock target")]
    LockError,
}

/// Coarse classification of an [`Error`], used in per-method reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum FailureKind {
    /// Fatal bootstrap problem.
    Bootstrap,
    /// Unknown opcode code, decoding stopped.
    StreamDesync,
    /// Decryption could not be applied.
    Crypto,
    /// A metadata reference could not be resolved.
    Resolution,
    /// Truncated or corrupted data, or an unsupported encoding.
    Format,
}

impl Error {
    /// Returns the failure classification of this error.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::Bootstrap(_) => FailureKind::Bootstrap,
            Error::StreamDesync { .. } => FailureKind::StreamDesync,
            Error::Crypto(_) => FailureKind::Crypto,
            Error::Resolution(_) | Error::MissingBody(_) | Error::RecursionLimit(_) => {
                FailureKind::Resolution
            }
            Error::Malformed { .. }
            | Error::OutOfBounds { .. }
            | Error::NotSupported(_)
            | Error::Io(_)
            | Error::LockError => FailureKind::Format,
        }
    }

    /// Returns `true` if the error must abort the whole run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Bootstrap(_))
    }
}
