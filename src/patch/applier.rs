//! Writing and undoing jump stubs.

use log::debug;

use crate::{
    metadata::routine::RoutineId,
    patch::{
        follow_jump, jump_stub, ExecutableMemory, PatchConfig, PatchRecord, PatchRegistry,
    },
    Error, Result,
};

/// Redirects native entry points and restores them exactly.
///
/// Attaching snapshots the bytes the stub is about to cover and writes the stub with a single
/// copy. Detaching writes the snapshot back.
///
/// # Examples
///
/// ```rust
/// use dothook::{
///     metadata::routine::RoutineId,
///     patch::{ExecutableMemory, PatchApplier, PatchConfig, SandboxMemory},
/// };
///
/// let mut memory = SandboxMemory::new(0x1000);
/// memory.map(0x10_0000, &[0x55, 0x48, 0x89, 0xE5, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90]);
///
/// let mut applier = PatchApplier::new(memory, PatchConfig::x64());
/// applier.attach(RoutineId(1), 0x10_0000, 0x20_0000)?;
/// assert_eq!(applier.memory().read_bytes(0x10_0000, 2)?, [0x48, 0xB8]);
///
/// applier.detach(RoutineId(1))?;
/// assert_eq!(applier.memory().read_bytes(0x10_0000, 4)?, [0x55, 0x48, 0x89, 0xE5]);
/// # Ok::<(), dothook::Error>(())
/// ```
#[derive(Debug)]
pub struct PatchApplier<M: ExecutableMemory> {
    memory: M,
    config: PatchConfig,
    registry: PatchRegistry,
}

impl<M: ExecutableMemory> PatchApplier<M> {
    /// Create an applier writing through `memory`
    pub fn new(memory: M, config: PatchConfig) -> Self {
        PatchApplier {
            memory,
            config,
            registry: PatchRegistry::new(),
        }
    }

    /// Overwrite the entry of `routine` with a jump to `target`.
    ///
    /// # Errors
    /// - [`Error::AlreadyPatched`] if a stub is already in place
    /// - [`Error::AddressProtectionDenied`] if the entry page cannot be made writable
    /// - [`Error::OutOfRange`] if the entry bytes cannot be read
    pub fn attach(&mut self, routine: RoutineId, entry: usize, target: usize) -> Result<()> {
        if self.registry.is_active(routine) {
            return Err(Error::AlreadyPatched(routine));
        }

        let address = if self.config.follow_jumps {
            follow_jump(&self.memory, entry)?
        } else {
            entry
        };

        let stub = jump_stub(self.config.pointer_width, target)?;
        let original = self.memory.read_bytes(address, stub.len())?;
        self.memory.flip_protection(address, stub.len())?;
        self.memory.write_executable_bytes(address, &stub)?;

        debug!(
            "patched {routine} at 0x{address:X} -> 0x{target:X} ({} stub)",
            self.config.pointer_width
        );
        self.registry.insert(PatchRecord {
            routine,
            address,
            original,
            target,
            active: true,
        });
        Ok(())
    }

    /// Point the entry of `routine` at `target`, replacing a stub that is already in place.
    ///
    /// # Errors
    /// See [`PatchApplier::attach`] and [`PatchApplier::detach`].
    pub fn redirect(&mut self, routine: RoutineId, entry: usize, target: usize) -> Result<()> {
        if self.registry.is_active(routine) {
            self.detach(routine)?;
        }
        self.attach(routine, entry, target)
    }

    /// Restore the bytes the stub of `routine` replaced.
    ///
    /// # Errors
    /// - [`Error::NotPatched`] if no stub is in place
    /// - [`Error::AddressProtectionDenied`] if the entry page cannot be made writable
    pub fn detach(&mut self, routine: RoutineId) -> Result<()> {
        let Some(record) = self.registry.get(routine).filter(|record| record.active) else {
            return Err(Error::NotPatched(routine));
        };

        let address = record.address;
        let original = record.original.clone();
        self.memory.flip_protection(address, original.len())?;
        self.memory.write_executable_bytes(address, &original)?;
        self.registry.deactivate(routine);

        debug!("restored {} bytes of {routine} at 0x{address:X}", original.len());
        Ok(())
    }

    /// Returns true if `routine` currently carries a stub
    #[must_use]
    pub fn is_patched(&self, routine: RoutineId) -> bool {
        self.registry.is_active(routine)
    }

    /// All patch records
    #[must_use]
    pub fn registry(&self) -> &PatchRegistry {
        &self.registry
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &PatchConfig {
        &self.config
    }

    /// The memory patches are written through
    #[must_use]
    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Mutable access to the memory, for mapping code in tests and hosts
    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }
}
