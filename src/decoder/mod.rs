//! Scrambled primitive decoding.
//!
//! The protector stores every multi-byte primitive of its program streams with the
//! bytes permuted. The permutation differs between protector builds, and the
//! instruction stream uses a second permutation distinct from the one used for
//! headers and operand records. Neither can be hardcoded: both are discovered per
//! target, preferably from the unvirtualized reader helpers
//! ([`ProfileSource::Helpers`]), or from known test vectors.
//!
//! A wrong permutation silently corrupts every subsequent read, because the
//! streams are not self-synchronizing, so discovery fails with
//! [`crate::Error::Bootstrap`] instead of falling back to a guess.
//!
//! # Key Components
//!
//! - [`Permutation`] / [`PermutationProfile`] / [`ScrambledProfiles`] - Byte orders
//! - [`ProfileSource`] / [`infer_permutation`] / [`infer_from_vectors`] - Discovery
//! - [`PrimitiveReader`] - Reads primitives, strings and counts through a profile

mod inference;
mod permutation;
mod reader;

pub use inference::{infer_from_vectors, infer_permutation, ProfileSource, TestVector};
pub use permutation::{Permutation, PermutationProfile, ProfileKind, ScrambledProfiles, WIDTHS};
pub use reader::{Decimal, PrimitiveReader, MAX_STRING_LEN};
