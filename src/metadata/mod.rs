//! Metadata seen by the decoder and the hook compiler.
//!
//! This module holds the vocabulary shared by every stage of the pipeline: tokens, method
//! bodies, type shapes, resolved members, and the [`routine::Routine`] description of a
//! hookable method. Token resolution is delegated to a [`SymbolResolver`] provided by the host.
//!
//! # Key Components
//!
//! - [`token::Token`] - table + row reference
//! - [`method`] - method body headers and exception clauses
//! - [`typesystem`] - [`typesystem::TypeShape`], [`typesystem::TypeRef`], generic contexts
//! - [`members`] - resolved field, method and type operands
//! - [`signatures::SignatureMethod`] - call-site signatures
//! - [`SymbolResolver`], [`SymbolTable`] - token resolution
//! - [`DynamicScope`] - the token space of generated code
//! - [`routine`] - hookable routines and their bodies

/// Resolved operands
pub mod members;
/// Implementation of the MethodHeader of CIL
pub mod method;
/// Token resolution
pub mod resolver;
/// Hookable routines
pub mod routine;
/// Token tables of generated code
pub mod scope;
/// Call-site signatures
pub mod signatures;
/// Commonly used metadata token type
pub mod token;
/// Type shapes
pub mod typesystem;

pub use resolver::{SymbolResolver, SymbolTable};
pub use scope::DynamicScope;
