//! Byte-level reading for CIL bodies.
//!
//! # Key Components
//!
//! - [`crate::file::io`] - little-endian primitive conversion over raw slices
//! - [`crate::file::parser::Parser`] - a bounds-checked cursor used by the instruction decoder
//!   and the method body parser

pub mod io;
pub mod parser;

pub use parser::Parser;
