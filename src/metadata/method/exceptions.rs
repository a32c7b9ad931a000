//! Exception handling clauses of a method body.
//!
//! A clause describes one protected range (`try`) and one handler. Several clauses may share
//! the same protected range; the instruction decoder groups those into a single region.

use bitflags::bitflags;

use crate::metadata::token::Token;

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause.
        ///
        /// The `filter_offset` slot carries the metadata token of the caught type.
        const EXCEPTION = 0x0000;

        /// An exception filter and handler clause.
        const FILTER = 0x0001;

        /// A finally clause.
        const FINALLY = 0x0002;

        /// A fault clause (finally that executes only on exception).
        const FAULT = 0x0004;
    }
}

/// Exception handler defining try/catch/finally blocks within a method.
///
/// # Layout in IL
///
/// ```text
/// try {
///     // try_offset -> try_offset + try_length
/// }
/// catch (ExceptionType) {
///     // handler_offset -> handler_offset + handler_length
/// }
/// ```
///
/// # References
/// - ECMA-335 6th Edition, Partition II, Section 25.4.6 - Exception Handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Flags describing the type of exception handler (catch, filter, finally, fault).
    pub flags: ExceptionHandlerFlags,
    /// Offset in bytes of try block from start of method body.
    pub try_offset: u32,
    /// Length in bytes of the try block.
    pub try_length: u32,
    /// Location of the handler for this try block.
    pub handler_offset: u32,
    /// Size of the handler code in bytes.
    pub handler_length: u32,
    /// Filter start for `FILTER` clauses, class token for `EXCEPTION` clauses.
    pub filter_offset: u32,
}

impl ExceptionHandler {
    /// A typed `catch` clause
    #[must_use]
    pub fn catch(try_offset: u32, try_length: u32, handler_offset: u32, handler_length: u32, class: Token) -> Self {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_offset,
            try_length,
            handler_offset,
            handler_length,
            filter_offset: class.value(),
        }
    }

    /// A `finally` clause
    #[must_use]
    pub fn finally(try_offset: u32, try_length: u32, handler_offset: u32, handler_length: u32) -> Self {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_offset,
            try_length,
            handler_offset,
            handler_length,
            filter_offset: 0,
        }
    }

    /// A `fault` clause
    #[must_use]
    pub fn fault(try_offset: u32, try_length: u32, handler_offset: u32, handler_length: u32) -> Self {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::FAULT,
            try_offset,
            try_length,
            handler_offset,
            handler_length,
            filter_offset: 0,
        }
    }

    /// A `filter` clause, the filter block starts at `filter_offset`
    #[must_use]
    pub fn filter(try_offset: u32, try_length: u32, filter_offset: u32, handler_offset: u32, handler_length: u32) -> Self {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::FILTER,
            try_offset,
            try_length,
            handler_offset,
            handler_length,
            filter_offset,
        }
    }

    /// Returns true for typed catch clauses
    #[must_use]
    pub fn is_catch(&self) -> bool {
        self.flags == ExceptionHandlerFlags::EXCEPTION
    }

    /// Returns true for filter clauses
    #[must_use]
    pub fn is_filter(&self) -> bool {
        self.flags.contains(ExceptionHandlerFlags::FILTER)
    }

    /// Returns true for finally clauses
    #[must_use]
    pub fn is_finally(&self) -> bool {
        self.flags.contains(ExceptionHandlerFlags::FINALLY)
    }

    /// Returns true for fault clauses
    #[must_use]
    pub fn is_fault(&self) -> bool {
        self.flags.contains(ExceptionHandlerFlags::FAULT)
    }

    /// The caught type of a typed catch clause
    #[must_use]
    pub fn class_token(&self) -> Option<Token> {
        if self.is_catch() {
            Some(Token(self.filter_offset))
        } else {
            None
        }
    }

    /// First offset past the protected range
    #[must_use]
    pub fn try_end(&self) -> u32 {
        self.try_offset.saturating_add(self.try_length)
    }

    /// First offset past the handler
    #[must_use]
    pub fn handler_end(&self) -> u32 {
        self.handler_offset.saturating_add(self.handler_length)
    }

    /// Returns true if the clause fits the 12 byte small layout
    #[must_use]
    pub fn fits_small(&self) -> bool {
        self.try_offset <= 0xFFFF
            && self.try_length <= 0xFF
            && self.handler_offset <= 0xFFFF
            && self.handler_length <= 0xFF
    }
}
