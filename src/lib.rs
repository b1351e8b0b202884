// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![warn(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # eazdevirt
//!
//! Recovers CIL method bodies from .NET assemblies protected by Eazfuscator-style
//! bytecode virtualization. Protected methods are replaced by stubs that pass an
//! encrypted position key to an embedded interpreter; the original instructions
//! live in an encrypted resource, encoded in the interpreter's private
//! instruction set. `eazdevirt` identifies that instruction set from the
//! interpreter's own handler methods, decrypts the resources and translates every
//! virtual method back to CIL.
//!
//! ## Architecture
//!
//! - [`metadata`] - the host abstraction over the destination module, and an
//!   in-memory [`metadata::ModuleModel`] implementing it
//! - [`assembly`] - CIL opcodes, instructions and method bodies
//! - [`pattern`] - instruction signature matching used to recognize handlers
//! - [`vm`] - handler classification into an opcode catalog and discovery of the
//!   record layouts
//! - [`crypto`] - the XOR, block and chain cipher layers protecting resources
//! - [`decoder`] - scrambled primitive reading and byte order inference
//! - [`resolver`] - resolution of operand records into metadata references
//! - [`devirt`] - the per-method devirtualization pipeline
//!
//! ## Usage
//!
//! ```rust,ignore
//! use eazdevirt::prelude::*;
//!
//! let config = DevirtConfig::new().with_password("0x06000012:hunter2".parse()?);
//! let report = Devirtualizer::new(&module, config).run(&bootstrap)?;
//! println!("{}", report.summary());
//! # Ok::<(), eazdevirt::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). Errors raised while a single
//! method is decoded end that method only and are recorded in its
//! [`devirt::MethodReport`], classified by [`FailureKind`]. Errors while the
//! interpreter is analyzed abort the run as [`Error::Bootstrap`]:
//!
//! ```rust,ignore
//! match Devirtualizer::new(&module, DevirtConfig::new()).run(&bootstrap) {
//!     Ok(report) => println!("{}", report.summary()),
//!     Err(Error::Bootstrap(message)) => eprintln!("Unsupported interpreter: {message}"),
//!     Err(e) => eprintln!("Error: {e}"),
//! }
//! ```
//!
//! ## Logging
//!
//! Progress is reported through the [`log`](https://docs.rs/log) facade: run
//! summaries at `info`, degraded and failed methods at `warn`, and per-record and
//! per-instruction detail at `debug` and `trace`.
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust
/// use eazdevirt::prelude::*;
///
/// let config = DevirtConfig::strict();
/// assert!(config.output.only_recovered);
/// ```
pub mod prelude;

pub mod assembly;
pub mod crypto;
pub mod decoder;
pub mod devirt;
pub mod metadata;
pub mod pattern;
pub mod resolver;
pub mod utils;
pub mod vm;

/// `eazdevirt` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `eazdevirt` Error type
///
/// # Examples
///
/// ```rust
/// use eazdevirt::{Error, FailureKind};
///
/// let error = Error::Crypto("no password".to_string());
/// assert_eq!(error.kind(), FailureKind::Crypto);
/// ```
pub use error::{Error, FailureKind};
