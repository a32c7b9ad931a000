//! CIL instruction decoding and encoding.
//!
//! This module turns raw method bodies into [`InstructionList`]s and back. Decoding resolves
//! token operands, turns branch offsets into instruction indices and overlays the exception
//! clauses as [`ExceptionMarker`]s. Encoding goes through the label-based
//! [`InstructionEncoder`].
//!
//! # Key Types
//! - [`Instruction`] - A decoded CIL instruction with its markers
//! - [`InstructionList`] - All instructions of one body, in offset order
//! - [`Operand`] - Instruction operands (immediates, branch targets, resolved members)
//! - [`ExceptionMarker`] - Region boundaries attached to instructions
//! - [`InstructionEncoder`] - Emits CIL with labels, stack tracking and exception regions
//!
//! # Main Functions
//! - [`decode_instruction`] - Decode a single instruction, leaving tokens unresolved
//! - [`decode_body`] - Decode a whole body into an [`InstructionList`]
//!
//! # Example
//! ```rust
//! use dothook::assembly::decode_instruction;
//! use dothook::Parser;
//!
//! let bytecode = &[0x00, 0x2A]; // nop, ret
//! let mut parser = Parser::new(bytecode);
//! let instruction = decode_instruction(&mut parser)?;
//! assert_eq!(instruction.mnemonic, "nop");
//! # Ok::<(), dothook::Error>(())
//! ```

mod decoder;
mod encoder;
mod instruction;
mod instructions;
mod list;
pub mod opcodes;

pub use decoder::{decode_body, decode_instruction};
pub use encoder::{EncodedBody, InstructionEncoder, LabelFixup, SwitchFixup};
pub use instruction::{
    ExceptionMarker, FlowType, Immediate, Instruction, InstructionCategory, Operand, OperandType,
    StackBehavior,
};
pub use instructions::*;
pub use list::InstructionList;
