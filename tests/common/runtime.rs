//! A fake runtime host: routines live at fixed native addresses in a sandbox address space,
//! hooks are Rust closures.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use dothook::{
    engine::RuntimeHost,
    hook::CompiledRoutine,
    metadata::{
        members::{FieldRef, MethodRef},
        routine::{Routine, RoutineId},
        token::Token,
        SymbolResolver, SymbolTable,
    },
    patch::SandboxMemory,
    Error, Result,
};

use super::interpreter::{cell, default_for, Cell, Value};

pub type NativeFn = Rc<dyn Fn(&mut [Value]) -> Value>;

/// Bytes every fake entry point starts with
pub const PROLOGUE: [u8; 16] = [
    0x55, 0x48, 0x89, 0xE5, 0x48, 0x83, 0xEC, 0x30, 0x89, 0x4D, 0x10, 0x89, 0x55, 0x18, 0x90,
    0xC3,
];

const ENTRY_BASE: usize = 0x0040_0000;
const PRECODE_BASE: usize = 0x0050_0000;
const LOAD_BASE: usize = 0x7000_0000;

pub struct FakeRuntime {
    pub symbols: SymbolTable,
    routines: HashMap<RoutineId, Routine>,
    by_token: HashMap<Token, RoutineId>,
    entries: HashMap<RoutineId, usize>,
    natives: HashMap<Token, NativeFn>,
    loaded: HashMap<usize, CompiledRoutine>,
    statics: RefCell<HashMap<Token, Cell>>,
    pub inlining_disabled: Vec<RoutineId>,
    pub refuse_inlining: bool,
}

impl FakeRuntime {
    pub fn new() -> Self {
        FakeRuntime {
            symbols: SymbolTable::new(),
            routines: HashMap::new(),
            by_token: HashMap::new(),
            entries: HashMap::new(),
            natives: HashMap::new(),
            loaded: HashMap::new(),
            statics: RefCell::new(HashMap::new()),
            inlining_disabled: Vec::new(),
            refuse_inlining: false,
        }
    }

    /// Place `routine` at its own entry point and make calls to it resolvable
    pub fn add_routine(&mut self, routine: &Routine, memory: &mut SandboxMemory) -> usize {
        let entry = ENTRY_BASE + 0x100 * self.routines.len();
        memory.map(entry, &PROLOGUE);
        self.install(routine, entry);
        entry
    }

    /// Like [`FakeRuntime::add_routine`], but the entry point is a `jmp rel32` to the code
    pub fn add_routine_behind_jump(
        &mut self,
        routine: &Routine,
        memory: &mut SandboxMemory,
    ) -> (usize, usize) {
        let code = ENTRY_BASE + 0x100 * self.routines.len();
        let precode = PRECODE_BASE + 0x100 * self.routines.len();
        let rel = (code as i64 - (precode as i64 + 5)) as i32;

        let mut jump = vec![0xE9];
        jump.extend_from_slice(&rel.to_le_bytes());
        memory.map(precode, &jump);
        memory.map(code, &PROLOGUE);
        self.install(routine, precode);
        (precode, code)
    }

    fn install(&mut self, routine: &Routine, entry: usize) {
        self.symbols.insert_method(routine.method_ref());
        for field in &routine.owner.fields {
            self.symbols.insert_field(field.clone());
        }
        self.by_token.insert(routine.token, routine.id);
        self.entries.insert(routine.id, entry);
        self.routines.insert(routine.id, routine.clone());
    }

    /// Implement `method` with a closure
    pub fn add_native(
        &mut self,
        method: &MethodRef,
        native: impl Fn(&mut [Value]) -> Value + 'static,
    ) {
        self.symbols.insert_method(method.clone());
        self.natives.insert(method.token, Rc::new(native));
    }

    pub fn routine(&self, id: RoutineId) -> &Routine {
        &self.routines[&id]
    }

    pub fn routine_by_token(&self, token: Token) -> Option<&Routine> {
        self.by_token.get(&token).map(|id| &self.routines[id])
    }

    pub fn entry(&self, id: RoutineId) -> usize {
        self.entries[&id]
    }

    pub fn native(&self, token: Token) -> Option<&NativeFn> {
        self.natives.get(&token)
    }

    pub fn loaded(&self, address: usize) -> Option<&CompiledRoutine> {
        self.loaded.get(&address)
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    pub fn static_cell(&self, field: &FieldRef) -> Cell {
        self.statics
            .borrow_mut()
            .entry(field.token)
            .or_insert_with(|| cell(default_for(&field.shape)))
            .clone()
    }
}

impl RuntimeHost for FakeRuntime {
    fn resolver(&self) -> &dyn SymbolResolver {
        &self.symbols
    }

    fn entry_point(&mut self, routine: &Routine) -> Result<usize> {
        self.entries
            .get(&routine.id)
            .copied()
            .ok_or(Error::UnknownRoutine(routine.id))
    }

    fn load(&mut self, _routine: &Routine, compiled: &CompiledRoutine) -> Result<usize> {
        let address = LOAD_BASE + 0x1000 * self.loaded.len();
        self.loaded.insert(address, compiled.clone());
        Ok(address)
    }

    fn disable_inlining(&mut self, routine: &Routine) -> bool {
        if self.refuse_inlining {
            return false;
        }
        self.inlining_disabled.push(routine.id);
        true
    }
}
