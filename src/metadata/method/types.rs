//! Method body and implementation flags.
//!
//! # Key Types
//! - [`MethodBodyFlags`], [`SectionFlags`]: method header and extra data section flags
//! - [`MethodImplOptions`]: the implementation flags the engine consults before patching

use bitflags::bitflags;

bitflags! {
    /// Flags stored in the low 12 bits of a method header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodBodyFlags: u16 {
        /// Tiny method header (1 byte, code size in the upper 6 bits)
        const TINY_FORMAT = 0x2;
        /// Fat method header (12 bytes)
        const FAT_FORMAT = 0x3;
        /// Extra data sections follow the code
        const MORE_SECTS = 0x8;
        /// Zero-initialize all locals
        const INIT_LOCALS = 0x10;
    }
}

bitflags! {
    /// Flags of an extra data section following the method code.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u8 {
        /// Exception handling table
        const EHTABLE = 0x1;
        /// Optimized IL table (unused)
        const OPT_ILTABLE = 0x2;
        /// Section uses the fat (24 byte clause) layout
        const FAT_FORMAT = 0x40;
        /// Another section follows this one
        const MORE_SECTS = 0x80;
    }
}

bitflags! {
    /// Method implementation flags (`MethodImplAttributes`) relevant to patching.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MethodImplOptions: u32 {
        /// The routine must not be inlined into its callers
        const NO_INLINING = 0x0008;
        /// Declared but implemented elsewhere
        const FORWARD_REF = 0x0010;
        /// Single-threaded through the body
        const SYNCHRONIZED = 0x0020;
        /// Implemented inside the runtime
        const INTERNAL_CALL = 0x1000;
        /// Request aggressive inlining
        const AGGRESSIVE_INLINING = 0x0100;
    }
}

impl MethodImplOptions {
    /// Returns true if callers may carry a private copy of the routine's code.
    #[must_use]
    pub fn may_be_inlined(&self) -> bool {
        !self.contains(MethodImplOptions::NO_INLINING)
    }
}
