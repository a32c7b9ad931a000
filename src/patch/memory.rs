//! Access to executable memory.

use crate::Result;

/// The narrow interface the patch applier writes code through.
///
/// [`crate::patch::NativeMemory`] works on the current process, [`crate::patch::SandboxMemory`]
/// on a simulated address space.
pub trait ExecutableMemory {
    /// Copy `len` bytes starting at `address`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfRange`] if the span is not readable.
    fn read_bytes(&self, address: usize, len: usize) -> Result<Vec<u8>>;

    /// Make the pages covering `address..address + len` writable and executable.
    ///
    /// # Errors
    /// Returns [`crate::Error::AddressProtectionDenied`] if the protection cannot be changed.
    fn flip_protection(&mut self, address: usize, len: usize) -> Result<()>;

    /// Write `bytes` at `address` in one copy.
    ///
    /// # Errors
    /// Returns [`crate::Error::AddressProtectionDenied`] if the span is not writable, or
    /// [`crate::Error::OutOfRange`] if it is not mapped.
    fn write_executable_bytes(&mut self, address: usize, bytes: &[u8]) -> Result<()>;
}
