//! Cursor over a CIL byte stream.
//!
//! [`Parser`] walks a method body one operand at a time. Every read is bounds checked and a
//! failed read leaves the cursor where it was, so the decoder can report the offset of the
//! instruction that ran out of bytes.
//!
//! # Examples
//!
//! ```rust
//! use dothook::file::parser::Parser;
//!
//! // ldc.i4.s -3; ret
//! let code = [0x1F, 0xFD, 0x2A];
//! let mut parser = Parser::new(&code);
//!
//! assert_eq!(parser.read_le::<u8>()?, 0x1F);
//! assert_eq!(parser.read_le::<i8>()?, -3);
//! assert_eq!(parser.peek_byte()?, 0x2A);
//! assert_eq!(parser.remaining(), 1);
//! # Ok::<(), dothook::Error>(())
//! ```

use crate::{
    file::io::{read_le_at, CilIO},
    Error::OutOfRange,
    Result,
};

/// A bounds-checked reader over an immutable byte slice.
///
/// The parser keeps an internal position and never reads outside of `data`. It is cheap to
/// create and borrows the slice for its lifetime.
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`Parser`] from a byte slice.
    ///
    /// # Arguments
    /// * `data` - The byte slice to read from
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying data buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the parser has no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if there is more data available to parse.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Move the current position to the specified index.
    ///
    /// Seeking to `len()` is allowed and leaves the parser exhausted.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfRange`] if `pos` is beyond the data length.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(OutOfRange);
        }

        self.position = pos;
        Ok(())
    }

    /// Move the position forward by the specified number of bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfRange`] if advancing by `step` would exceed the data length.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        let end = self.calc_end_position(step)?;
        self.position = end;
        Ok(())
    }

    /// Get the current position of the parser within the data buffer.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Get access to the underlying data buffer.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Peek at the next byte without advancing the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfRange`] if the parser is exhausted.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data.get(self.position).copied().ok_or(OutOfRange)
    }

    /// Peek at a value of type `T` without advancing the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfRange`] if reading `T` would exceed the data length.
    pub fn peek_le<T: CilIO>(&self) -> Result<T> {
        let mut temp_position = self.position;
        read_le_at::<T>(self.data, &mut temp_position)
    }

    /// Read a type `T` from the current position in little-endian format and advance the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfRange`] if reading would exceed the data length.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Number of unread bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Calculates an end position with overflow checking.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfRange`] if the result would overflow or exceed the data.
    pub fn calc_end_position(&self, length: usize) -> Result<usize> {
        let end = self.position.checked_add(length).ok_or(OutOfRange)?;
        if end > self.data.len() {
            return Err(OutOfRange);
        }

        Ok(end)
    }

    /// Reads `length` raw bytes and advances past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfRange`] if fewer than `length` bytes remain.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let end = self.calc_end_position(length)?;
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }
}
