//! Registered routines and their hook chains.

use std::collections::HashMap;

use crate::{
    assembly::InstructionList,
    hook::HookRc,
    metadata::routine::{Routine, RoutineId},
    Error, Result,
};

/// A routine together with everything the engine derived from it
#[derive(Debug)]
pub struct RoutineEntry {
    /// The routine as registered
    pub routine: Routine,
    /// Decoded body, filled on first use
    pub instructions: Option<InstructionList>,
    /// Prefix hooks in call order
    pub prefixes: Vec<HookRc>,
    /// Postfix hooks in call order
    pub postfixes: Vec<HookRc>,
    /// Hooks changed since the last attach
    pub dirty: bool,
}

impl RoutineEntry {
    fn new(routine: Routine) -> Self {
        RoutineEntry {
            routine,
            instructions: None,
            prefixes: Vec::new(),
            postfixes: Vec::new(),
            dirty: false,
        }
    }
}

/// Routines known to an engine, keyed by [`RoutineId`].
#[derive(Debug, Default)]
pub struct RoutineRegistry {
    entries: HashMap<RoutineId, RoutineEntry>,
}

impl RoutineRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        RoutineRegistry::default()
    }

    /// Add `routine`. Registering an id again replaces the routine and drops its decoded
    /// body, the hook chains are kept.
    pub fn register(&mut self, routine: Routine) -> RoutineId {
        let id = routine.id;
        match self.entries.get_mut(&id) {
            Some(entry) => {
                entry.routine = routine;
                entry.instructions = None;
                entry.dirty = true;
            }
            None => {
                self.entries.insert(id, RoutineEntry::new(routine));
            }
        }
        id
    }

    /// The entry of `id`
    ///
    /// # Errors
    /// Returns [`Error::UnknownRoutine`] if `id` was never registered.
    pub fn get(&self, id: RoutineId) -> Result<&RoutineEntry> {
        self.entries.get(&id).ok_or(Error::UnknownRoutine(id))
    }

    /// The mutable entry of `id`
    ///
    /// # Errors
    /// Returns [`Error::UnknownRoutine`] if `id` was never registered.
    pub fn get_mut(&mut self, id: RoutineId) -> Result<&mut RoutineEntry> {
        self.entries.get_mut(&id).ok_or(Error::UnknownRoutine(id))
    }

    /// Returns true if `id` is registered
    #[must_use]
    pub fn contains(&self, id: RoutineId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Registered ids, in no particular order
    pub fn ids(&self) -> impl Iterator<Item = RoutineId> + '_ {
        self.entries.keys().copied()
    }

    /// Number of registered routines
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
