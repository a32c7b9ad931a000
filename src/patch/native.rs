//! Executable memory of the current process.

use crate::{patch::memory::ExecutableMemory, Error, Result};

/// Reads and writes code of the running process through raw pointers.
///
/// Protection changes go through `mprotect` on unix and `VirtualProtect` on windows. The
/// previous protection is not restored, patched pages stay writable and executable.
#[derive(Debug)]
pub struct NativeMemory {
    page_size: usize,
}

impl NativeMemory {
    /// Create an accessor for the current process.
    ///
    /// # Safety
    /// Every address later handed to this accessor must point into mapped memory of the
    /// current process, and no other thread may execute the bytes while they are written.
    #[must_use]
    pub unsafe fn new() -> Self {
        NativeMemory {
            page_size: page_size(),
        }
    }

    /// The system page size
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Page-aligned span covering `address..address + len`
    fn page_span(&self, address: usize, len: usize) -> (usize, usize) {
        let start = address & !(self.page_size - 1);
        let end = (address + len.max(1) + self.page_size - 1) & !(self.page_size - 1);
        (start, end - start)
    }
}

#[cfg(unix)]
fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size)
        .ok()
        .filter(|size| size.is_power_of_two())
        .unwrap_or(0x1000)
}

#[cfg(not(unix))]
fn page_size() -> usize {
    0x1000
}

impl ExecutableMemory for NativeMemory {
    fn read_bytes(&self, address: usize, len: usize) -> Result<Vec<u8>> {
        if address == 0 || address.checked_add(len).is_none() {
            return Err(Error::OutOfRange);
        }

        // SAFETY: the caller of `NativeMemory::new` vouched for the address
        let bytes = unsafe { std::slice::from_raw_parts(address as *const u8, len) };
        Ok(bytes.to_vec())
    }

    #[cfg(unix)]
    fn flip_protection(&mut self, address: usize, len: usize) -> Result<()> {
        let (start, span) = self.page_span(address, len);
        // SAFETY: only the protection of already mapped pages changes
        let rc = unsafe {
            libc::mprotect(
                start as *mut libc::c_void,
                span,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
            )
        };
        if rc != 0 {
            log::debug!(
                "mprotect(0x{start:X}, {span}) failed: {}",
                std::io::Error::last_os_error()
            );
            return Err(Error::AddressProtectionDenied { address, len });
        }

        Ok(())
    }

    #[cfg(windows)]
    fn flip_protection(&mut self, address: usize, len: usize) -> Result<()> {
        use windows_sys::Win32::System::Memory::{VirtualProtect, PAGE_EXECUTE_READWRITE};

        let (start, span) = self.page_span(address, len);
        let mut old_protection = 0;
        // SAFETY: only the protection of already mapped pages changes
        let ok = unsafe {
            VirtualProtect(
                start as *const core::ffi::c_void,
                span,
                PAGE_EXECUTE_READWRITE,
                &mut old_protection,
            )
        };
        if ok == 0 {
            log::debug!(
                "VirtualProtect(0x{start:X}, {span}) failed: {}",
                std::io::Error::last_os_error()
            );
            return Err(Error::AddressProtectionDenied { address, len });
        }

        Ok(())
    }

    #[cfg(not(any(unix, windows)))]
    fn flip_protection(&mut self, address: usize, len: usize) -> Result<()> {
        Err(Error::AddressProtectionDenied { address, len })
    }

    fn write_executable_bytes(&mut self, address: usize, bytes: &[u8]) -> Result<()> {
        if address == 0 || address.checked_add(bytes.len()).is_none() {
            return Err(Error::OutOfRange);
        }

        // SAFETY: the caller of `NativeMemory::new` vouched for the address, the protection
        // was flipped before
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), address as *mut u8, bytes.len());
        }
        Ok(())
    }
}
