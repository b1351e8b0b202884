//! Metadata model of the destination module.
//!
//! Reconstructed operands are expressed in the types of this module: [`TypeSig`]
//! and [`TypeRef`] for types, [`FieldRef`] and [`MethodRef`] for members and
//! [`Resolved`] for a resolved operand of any kind. The destination module itself
//! is reached through the [`MetadataHost`] trait.
//!
//! # Key Components
//!
//! - [`token::Token`] - Metadata token
//! - [`TypeSig`] / [`TypeRef`] / [`AssemblyIdentity`] - Types and their scopes
//! - [`FieldRef`] / [`MethodRef`] / [`MethodSig`] - Member references
//! - [`MetadataHost`] - Access to the destination module
//! - [`ModuleModel`] - In-memory [`MetadataHost`]

mod host;
mod members;
mod module;
pub mod token;
pub mod typesig;

pub use host::{FieldDefInfo, MetadataHost, MethodDefInfo, TypeDefInfo};
pub use members::{FieldRef, MethodRef, MethodSig, Resolved};
pub use module::ModuleModel;
pub use token::{Token, TokenKind};
pub use typesig::{AssemblyIdentity, ResolutionScope, TypeRef, TypeSig, Version};
