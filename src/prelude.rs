//! # dothook Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the dothook library.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dothook operations
pub use crate::Error;

/// The result type used throughout dothook
pub use crate::Result;

/// Low-level parsing cursor
pub use crate::Parser;

// ================================================================================================
// Decoding and Encoding
// ================================================================================================

/// Decoding of bodies and single instructions
pub use crate::assembly::{decode_body, decode_instruction};

/// Decoded instructions
pub use crate::assembly::{ExceptionMarker, Instruction, InstructionList, Operand};

/// Label-based CIL emission
pub use crate::assembly::InstructionEncoder;

// ================================================================================================
// Metadata
// ================================================================================================

/// Tokens and type shapes
pub use crate::metadata::{
    token::Token,
    typesystem::{GenericContext, TypeRef, TypeShape},
};

/// Resolved members and signatures
pub use crate::metadata::{
    members::{FieldRef, MemberRef, MethodRef},
    signatures::SignatureMethod,
};

/// Method bodies and exception clauses
pub use crate::metadata::method::{ExceptionHandler, ExceptionHandlerFlags};

/// Hookable routines
pub use crate::metadata::routine::{Parameter, Routine, RoutineBody, RoutineId};

/// Token resolution
pub use crate::metadata::{DynamicScope, SymbolResolver, SymbolTable};

// ================================================================================================
// Hooks
// ================================================================================================

/// Hooks and their compilation
pub use crate::hook::{
    compile_delegate_wrapper, CompiledRoutine, Hook, HookCompiler, HookKind, HookRc,
    NamingOptions,
};

// ================================================================================================
// Patching and Lifecycle
// ================================================================================================

/// Entry point redirection
pub use crate::patch::{
    ExecutableMemory, NativeMemory, PatchApplier, PatchConfig, PatchRecord, PatchRegistry,
    PointerWidth, SandboxMemory,
};

/// The engine and its runtime seam
pub use crate::engine::{Engine, RuntimeHost};
