//! Shared fixtures for unit tests.
//!
//! - [`cil`] - shorthands for building CIL bodies
//! - [`crypto`] - RSA test keys and stream encryption
//! - [`streams`] - writer producing scrambled primitive streams
//! - [`interpreter`] - a synthetic interpreter with handlers and reader methods
//! - [`protected`] - complete protected modules for end-to-end devirtualization

pub mod interpreter;
pub mod streams;
