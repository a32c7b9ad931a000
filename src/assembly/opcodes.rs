//! Raw opcode bytes the encoder and decoder refer to directly.
//!
//! Everything else goes through the mnemonic tables in [`crate::assembly::INSTRUCTIONS`] and
//! [`crate::assembly::INSTRUCTIONS_FE`]. Two-byte opcodes keep only their second byte here,
//! with an `FE_` prefix (e.g. [`FE_RETHROW`] is `0xFE 0x1A`).
#![allow(missing_docs)]

/// First byte of every two-byte opcode
pub const FE_PREFIX: u8 = 0xFE;

pub const NOP: u8 = 0x00;
pub const JMP: u8 = 0x27;
pub const RET: u8 = 0x2A;
pub const BR_S: u8 = 0x2B;
pub const BR: u8 = 0x38;
pub const SWITCH: u8 = 0x45;
pub const THROW: u8 = 0x7A;
pub const ENDFINALLY: u8 = 0xDC;
pub const LEAVE: u8 = 0xDD;
pub const LEAVE_S: u8 = 0xDE;

/// Last valid single-byte opcode (`conv.u`)
pub const MAX_SINGLE_BYTE: u8 = 0xE0;

pub const FE_RETHROW: u8 = 0x1A;

/// Last valid two-byte opcode (`readonly.`)
pub const FE_MAX: u8 = 0x1E;
