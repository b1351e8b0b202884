//! Small shared helpers.

mod base64;

pub use base64::{base64_decode, base64_encode};
