//! Bookkeeping of applied patches.

use std::collections::HashMap;

use crate::metadata::routine::RoutineId;

/// The state of one patched entry point.
///
/// Records survive a detach with `active` cleared, so repeated attach/detach cycles reuse
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRecord {
    /// The patched routine
    pub routine: RoutineId,
    /// Address the stub was written to, after jump following
    pub address: usize,
    /// Bytes the stub replaced
    pub original: Vec<u8>,
    /// Where the stub jumps
    pub target: usize,
    /// Whether the stub is currently in place
    pub active: bool,
}

/// All patch records, keyed by routine.
#[derive(Debug, Default)]
pub struct PatchRegistry {
    records: HashMap<RoutineId, PatchRecord>,
}

impl PatchRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        PatchRegistry::default()
    }

    /// The record of `routine`, active or not
    #[must_use]
    pub fn get(&self, routine: RoutineId) -> Option<&PatchRecord> {
        self.records.get(&routine)
    }

    /// Returns true if `routine` currently carries a stub
    #[must_use]
    pub fn is_active(&self, routine: RoutineId) -> bool {
        self.records.get(&routine).is_some_and(|record| record.active)
    }

    /// Store a record, replacing an earlier one for the same routine
    pub fn insert(&mut self, record: PatchRecord) {
        self.records.insert(record.routine, record);
    }

    /// Mark the record of `routine` inactive, returns the record if there was one
    pub fn deactivate(&mut self, routine: RoutineId) -> Option<&PatchRecord> {
        let record = self.records.get_mut(&routine)?;
        record.active = false;
        Some(record)
    }

    /// Iterate over all records
    pub fn iter(&self) -> impl Iterator<Item = &PatchRecord> {
        self.records.values()
    }

    /// Number of currently active patches
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.records.values().filter(|record| record.active).count()
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing was ever patched
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
