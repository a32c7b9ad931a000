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
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
// unsafe code is limited to 'patch/native.rs', which writes code of the running process

//! # dothook
//!
//! [![Crates.io](https://img.shields.io/crates/v/dothook.svg)](https://crates.io/crates/dothook)
//! [![Documentation](https://docs.rs/dothook/badge.svg)](https://docs.rs/dothook)
//! [![License](https://img.shields.io/badge/license-Apache--2.0-blue.svg)](https://github.com/BinFlip/dothook/blob/main/LICENSE-APACHE)
//!
//! Live hooking of .NET methods. `dothook` decodes a method's CIL body, synthesizes a
//! replacement that calls prefix and postfix hooks around the original code, and redirects
//! the original's native entry point to the replacement, with an exact undo.
//!
//! ## Pipeline
//!
//! 1. [`assembly::decode_body`] - bytes and exception clauses to an [`assembly::InstructionList`]
//! 2. [`hook::HookCompiler`] - instructions plus hooks to a [`hook::CompiledRoutine`]
//! 3. [`engine::RuntimeHost::load`] - the host turns the compiled routine into native code
//! 4. [`patch::PatchApplier`] - the original entry jumps to the replacement
//!
//! Detaching reverses only the last step.
//!
//! ## Quick Start
//!
//! ```rust
//! use dothook::prelude::*;
//!
//! let calc = TypeRef::class(Token(0x0200_0002), "Demo", "Calc");
//! let add = Routine::new(RoutineId(1), "Add", calc)
//!     .returning(TypeShape::I4)
//!     .with_params(vec![Parameter::new("a", TypeShape::I4), Parameter::new("b", TypeShape::I4)])
//!     .with_body(RoutineBody::new(vec![0x02, 0x03, 0x58, 0x2A]));
//!
//! let code = &add.body.as_ref().unwrap().code;
//! let instructions = decode_body(code, &[], &SymbolTable::new(), &add.generic_context)?;
//! assert_eq!(instructions.len(), 4);
//!
//! let options = NamingOptions::default();
//! let copy = HookCompiler::new(&add, &instructions, &options).copy()?;
//! assert_eq!(copy.code, *code);
//! # Ok::<(), dothook::Error>(())
//! ```
//!
//! ## Modules
//!
//! - [`file`] - bounds-checked little-endian reading and writing
//! - [`assembly`] - opcode tables, decoder, [`assembly::InstructionEncoder`]
//! - [`metadata`] - tokens, method bodies, type shapes, routines, token resolution
//! - [`hook`] - hooks, argument binding, the hook compiler
//! - [`patch`] - jump stubs and executable memory
//! - [`engine`] - hook registration and the attach/detach lifecycle

#[macro_use]
pub(crate) mod error;

/// Raw byte access.
///
/// [`Parser`] is the cursor the decoder reads with, [`file::io`] offers the same little-endian
/// reads and writes over plain slices.
pub mod file;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use dothook::prelude::*;
///
/// let options = NamingOptions::default().with_result("__ret");
/// assert_eq!(options.result, "__ret");
/// ```
pub mod prelude;

/// CIL instructions based on ECMA-335.
///
/// Decoding of method bodies into instruction lists with resolved operands and exception
/// markers, and the label-based encoder the hook compiler emits with.
pub mod assembly;

/// Metadata vocabulary shared by every stage: tokens, method bodies, type shapes, resolved
/// members, routines and token resolution.
pub mod metadata;

/// Prefix and postfix hooks and the compiler that weaves them into a routine.
pub mod hook;

/// Entry point redirection with exact undo.
pub mod patch;

/// Hook registration and the attach/detach lifecycle.
pub mod engine;

/// `dothook` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dothook` Error type
///
/// The main error type for all operations in this crate, covering decoding, hook compilation
/// and patching.
///
/// # Examples
///
/// ```rust
/// use dothook::{metadata::routine::RoutineId, patch::{PatchApplier, PatchConfig, SandboxMemory}, Error};
///
/// let mut applier = PatchApplier::new(SandboxMemory::new(0x1000), PatchConfig::x64());
/// match applier.detach(RoutineId(1)) {
///     Err(Error::NotPatched(id)) => println!("{id} was never patched"),
///     other => panic!("unexpected: {other:?}"),
/// }
/// ```
pub use error::Error;

/// Provides access to the bounds-checked cursor used for decoding CIL bytecode.
///
/// # Example
///
/// ```rust
/// use dothook::{Parser, assembly::decode_instruction};
/// let code = [0x2A]; // ret
/// let mut parser = Parser::new(&code);
/// let instr = decode_instruction(&mut parser)?;
/// assert_eq!(instr.mnemonic, "ret");
/// # Ok::<(), dothook::Error>(())
/// ```
pub use file::Parser;
