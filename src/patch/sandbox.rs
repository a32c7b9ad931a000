//! A simulated address space for exercising patches without touching live code.

use std::collections::{BTreeMap, HashSet};

use crate::{patch::memory::ExecutableMemory, Error, Result};

/// One write performed through [`SandboxMemory`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxWrite {
    /// Where the bytes went
    pub address: usize,
    /// What was written
    pub bytes: Vec<u8>,
}

/// Executable memory backed by plain buffers.
///
/// Mapped pages start out read-only. Writes fail with
/// [`Error::AddressProtectionDenied`] until [`ExecutableMemory::flip_protection`] covered
/// them, and [`SandboxMemory::deny_protection`] makes a page refuse the flip.
///
/// # Examples
///
/// ```rust
/// use dothook::patch::{ExecutableMemory, SandboxMemory};
///
/// let mut memory = SandboxMemory::new(0x1000);
/// memory.map(0x4000, &[0x90; 16]);
///
/// assert!(memory.write_executable_bytes(0x4000, &[0xC3]).is_err());
/// memory.flip_protection(0x4000, 1)?;
/// memory.write_executable_bytes(0x4000, &[0xC3])?;
/// assert_eq!(memory.read_bytes(0x4000, 2)?, [0xC3, 0x90]);
/// # Ok::<(), dothook::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct SandboxMemory {
    page_size: usize,
    regions: BTreeMap<usize, Vec<u8>>,
    writable: HashSet<usize>,
    denied: HashSet<usize>,
    writes: Vec<SandboxWrite>,
    flips: usize,
}

impl SandboxMemory {
    /// Create an empty address space with `page_size` byte pages.
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        SandboxMemory {
            page_size: page_size.max(1),
            ..SandboxMemory::default()
        }
    }

    /// Map `bytes` at `address`. Overlapping an existing region replaces it.
    pub fn map(&mut self, address: usize, bytes: &[u8]) {
        let end = address + bytes.len();
        self.regions
            .retain(|&base, region| base + region.len() <= address || base >= end);
        self.regions.insert(address, bytes.to_vec());
    }

    /// Make the page containing `address` refuse protection changes.
    pub fn deny_protection(&mut self, address: usize) {
        self.denied.insert(address / self.page_size);
    }

    /// Returns true if every page of the span is writable
    #[must_use]
    pub fn is_writable(&self, address: usize, len: usize) -> bool {
        self.pages(address, len)
            .all(|page| self.writable.contains(&page))
    }

    /// All writes in order
    #[must_use]
    pub fn writes(&self) -> &[SandboxWrite] {
        &self.writes
    }

    /// Number of successful protection flips
    #[must_use]
    pub fn protection_flips(&self) -> usize {
        self.flips
    }

    /// Page size of this address space
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn pages(&self, address: usize, len: usize) -> impl Iterator<Item = usize> {
        let first = address / self.page_size;
        let last = (address + len.max(1) - 1) / self.page_size;
        first..=last
    }

    fn region(&self, address: usize, len: usize) -> Result<(usize, &Vec<u8>)> {
        let (&base, region) = self
            .regions
            .range(..=address)
            .next_back()
            .ok_or(Error::OutOfRange)?;
        if address + len > base + region.len() {
            return Err(Error::OutOfRange);
        }

        Ok((address - base, region))
    }
}

impl ExecutableMemory for SandboxMemory {
    fn read_bytes(&self, address: usize, len: usize) -> Result<Vec<u8>> {
        let (offset, region) = self.region(address, len)?;
        Ok(region[offset..offset + len].to_vec())
    }

    fn flip_protection(&mut self, address: usize, len: usize) -> Result<()> {
        self.region(address, len)?;
        let pages: Vec<usize> = self.pages(address, len).collect();
        if pages.iter().any(|page| self.denied.contains(page)) {
            return Err(Error::AddressProtectionDenied { address, len });
        }

        self.writable.extend(pages);
        self.flips += 1;
        Ok(())
    }

    fn write_executable_bytes(&mut self, address: usize, bytes: &[u8]) -> Result<()> {
        let (offset, _) = self.region(address, bytes.len())?;
        if !self.is_writable(address, bytes.len()) {
            return Err(Error::AddressProtectionDenied {
                address,
                len: bytes.len(),
            });
        }

        let (&base, _) = self
            .regions
            .range(..=address)
            .next_back()
            .ok_or(Error::OutOfRange)?;
        if let Some(region) = self.regions.get_mut(&base) {
            region[offset..offset + bytes.len()].copy_from_slice(bytes);
        }

        self.writes.push(SandboxWrite {
            address,
            bytes: bytes.to_vec(),
        });
        Ok(())
    }
}
