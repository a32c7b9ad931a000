//! Hook registration and the attach/detach lifecycle.
//!
//! The [`Engine`] ties the pipeline together: it decodes registered routines on first use,
//! validates hooks by compiling them, hands compiled routines to the [`RuntimeHost`] and
//! redirects the original entry points through a [`PatchApplier`].
//!
//! Hook changes are not live. They mark the routine dirty and take effect on the next
//! [`Engine::attach`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use dothook::{
//!     engine::{Engine, RuntimeHost},
//!     hook::HookRc,
//!     metadata::routine::Routine,
//!     patch::{NativeMemory, PatchConfig},
//! };
//!
//! fn hook_once<H: RuntimeHost>(host: H, routine: Routine, prefix: HookRc) -> dothook::Result<()> {
//!     // SAFETY: the host hands out entry points of the current process
//!     let memory = unsafe { NativeMemory::new() };
//!     let mut engine = Engine::new(host, memory, PatchConfig::default());
//!
//!     let id = engine.register(routine);
//!     engine.add_prefix(id, prefix)?;
//!     engine.attach(id)?;
//!     // ...
//!     engine.detach(id)
//! }
//! ```

mod host;
mod registry;

pub use host::RuntimeHost;
pub use registry::{RoutineEntry, RoutineRegistry};

use std::sync::Arc;

use log::debug;

use crate::{
    assembly::{decode_body, InstructionList},
    hook::{CompiledRoutine, HookCompiler, HookKind, HookRc, NamingOptions},
    metadata::routine::{Routine, RoutineId},
    patch::{ExecutableMemory, PatchApplier, PatchConfig},
    Error, Result,
};

/// Owns the registries and drives decode, compile, load and patch.
pub struct Engine<H: RuntimeHost, M: ExecutableMemory> {
    host: H,
    applier: PatchApplier<M>,
    routines: RoutineRegistry,
    options: NamingOptions,
}

impl<H: RuntimeHost, M: ExecutableMemory> Engine<H, M> {
    /// Create an engine with default [`NamingOptions`]
    pub fn new(host: H, memory: M, config: PatchConfig) -> Self {
        Engine {
            host,
            applier: PatchApplier::new(memory, config),
            routines: RoutineRegistry::new(),
            options: NamingOptions::default(),
        }
    }

    /// Use different special parameter names
    #[must_use]
    pub fn with_options(mut self, options: NamingOptions) -> Self {
        self.options = options;
        self
    }

    /// Special parameter names in use
    #[must_use]
    pub fn options(&self) -> &NamingOptions {
        &self.options
    }

    /// The runtime host
    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutable access to the runtime host
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// The patch applier and its records
    #[must_use]
    pub fn applier(&self) -> &PatchApplier<M> {
        &self.applier
    }

    /// Registered routines
    #[must_use]
    pub fn routines(&self) -> &RoutineRegistry {
        &self.routines
    }

    /// Make `routine` known to the engine and return its id
    pub fn register(&mut self, routine: Routine) -> RoutineId {
        self.routines.register(routine)
    }

    /// The decoded body of `id`, decoded on the first request.
    ///
    /// # Errors
    /// - [`Error::UnknownRoutine`] if `id` is not registered
    /// - [`Error::NoBody`] if the routine has no body
    /// - decoding errors of [`decode_body`]
    pub fn instructions(&mut self, id: RoutineId) -> Result<&InstructionList> {
        let entry = self.routines.get_mut(id)?;
        if entry.instructions.is_none() {
            let routine = &entry.routine;
            let body = routine
                .body
                .as_ref()
                .ok_or_else(|| Error::NoBody(routine.full_name()))?;
            let instructions = decode_body(
                &body.code,
                &body.exception_handlers,
                self.host.resolver(),
                &routine.generic_context,
            )?;
            debug!(
                "decoded {}: {} instruction(s) from {} bytes",
                routine.full_name(),
                instructions.len(),
                body.code.len()
            );
            entry.instructions = Some(instructions);
        }

        entry
            .instructions
            .as_ref()
            .ok_or_else(|| malformed_error!("Decoded body of {} missing", id))
    }

    /// Append a prefix to the chain of `id`.
    ///
    /// The routine is compiled with the candidate chain first, a hook that does not bind is
    /// not added. Hooks added before stay in place.
    ///
    /// # Errors
    /// Any error of [`Engine::compile`] for the candidate chain.
    pub fn add_prefix(&mut self, id: RoutineId, hook: HookRc) -> Result<()> {
        self.add_hook(id, hook, HookKind::Prefix)
    }

    /// Append a postfix to the chain of `id`.
    ///
    /// # Errors
    /// - [`Error::InvalidHookReturnShape`] if `hook` returns `bool`
    /// - any error of [`Engine::compile`] for the candidate chain
    pub fn add_postfix(&mut self, id: RoutineId, hook: HookRc) -> Result<()> {
        if hook.returns_bool() {
            return Err(Error::InvalidHookReturnShape(hook.name()));
        }
        self.add_hook(id, hook, HookKind::Postfix)
    }

    /// Remove a prefix by handle identity, returns false if it was not in the chain.
    ///
    /// # Errors
    /// Returns [`Error::UnknownRoutine`] if `id` is not registered.
    pub fn remove_prefix(&mut self, id: RoutineId, hook: &HookRc) -> Result<bool> {
        self.remove_hook(id, hook, HookKind::Prefix)
    }

    /// Remove a postfix by handle identity, returns false if it was not in the chain.
    ///
    /// # Errors
    /// Returns [`Error::UnknownRoutine`] if `id` is not registered.
    pub fn remove_postfix(&mut self, id: RoutineId, hook: &HookRc) -> Result<bool> {
        self.remove_hook(id, hook, HookKind::Postfix)
    }

    /// Prefix chain of `id`
    ///
    /// # Errors
    /// Returns [`Error::UnknownRoutine`] if `id` is not registered.
    pub fn prefixes(&self, id: RoutineId) -> Result<&[HookRc]> {
        Ok(&self.routines.get(id)?.prefixes)
    }

    /// Postfix chain of `id`
    ///
    /// # Errors
    /// Returns [`Error::UnknownRoutine`] if `id` is not registered.
    pub fn postfixes(&self, id: RoutineId) -> Result<&[HookRc]> {
        Ok(&self.routines.get(id)?.postfixes)
    }

    /// Returns true if the hooks of `id` changed since it was last attached
    ///
    /// # Errors
    /// Returns [`Error::UnknownRoutine`] if `id` is not registered.
    pub fn is_dirty(&self, id: RoutineId) -> Result<bool> {
        Ok(self.routines.get(id)?.dirty)
    }

    /// Compile `id` with its current hook chains.
    ///
    /// # Errors
    /// Any error of [`Engine::instructions`] or [`HookCompiler::compile`].
    pub fn compile(&mut self, id: RoutineId) -> Result<CompiledRoutine> {
        let entry = self.routines.get(id)?;
        let prefixes = entry.prefixes.clone();
        let postfixes = entry.postfixes.clone();
        self.compile_with(id, &prefixes, &postfixes)
    }

    /// Re-emit the body of `id` without hooks.
    ///
    /// # Errors
    /// Any error of [`Engine::instructions`] or [`HookCompiler::copy`].
    pub fn copy(&mut self, id: RoutineId) -> Result<CompiledRoutine> {
        self.instructions(id)?;
        let entry = self.routines.get(id)?;
        let instructions = Self::cached(entry)?;
        HookCompiler::new(&entry.routine, instructions, &self.options).copy()
    }

    /// Disassembly of what `id` would be replaced with
    ///
    /// # Errors
    /// Same as [`Engine::compile`].
    pub fn listing(&mut self, id: RoutineId) -> Result<String> {
        self.compile(id)?.listing()
    }

    /// Compile `id`, load the result through the host and redirect the original entry to it.
    ///
    /// An already attached routine is detached first, so this also applies hook changes.
    ///
    /// # Errors
    /// - [`Error::UnknownRoutine`] if `id` is not registered
    /// - [`Error::NoBody`] if the routine has no body
    /// - compile, host and patch errors
    pub fn attach(&mut self, id: RoutineId) -> Result<()> {
        let compiled = self.compile(id)?;
        let entry = self.routines.get(id)?;
        let routine = &entry.routine;

        if self.applier.config().disable_inlining && !self.host.disable_inlining(routine) {
            debug!("could not disable inlining of {}", routine.full_name());
        }

        let target = self.host.load(routine, &compiled)?;
        let entry_point = self.host.entry_point(routine)?;

        if self.applier.is_patched(id) {
            self.applier.detach(id)?;
        }
        self.applier.attach(id, entry_point, target)?;

        debug!(
            "attached {} ({} prefix(es), {} postfix(es))",
            routine.full_name(),
            entry.prefixes.len(),
            entry.postfixes.len()
        );
        self.routines.get_mut(id)?.dirty = false;
        Ok(())
    }

    /// Restore the original entry of `id`.
    ///
    /// # Errors
    /// - [`Error::UnknownRoutine`] if `id` is not registered
    /// - [`Error::NotPatched`] if it is not attached
    pub fn detach(&mut self, id: RoutineId) -> Result<()> {
        self.routines.get(id)?;
        self.applier.detach(id)
    }

    /// Detach every attached routine
    ///
    /// # Errors
    /// Stops at the first routine that cannot be restored.
    pub fn detach_all(&mut self) -> Result<()> {
        let attached: Vec<RoutineId> = self
            .routines
            .ids()
            .filter(|id| self.applier.is_patched(*id))
            .collect();
        for id in attached {
            self.applier.detach(id)?;
        }
        Ok(())
    }

    /// Returns true if the entry of `id` currently jumps to a compiled routine
    #[must_use]
    pub fn is_attached(&self, id: RoutineId) -> bool {
        self.applier.is_patched(id)
    }

    fn add_hook(&mut self, id: RoutineId, hook: HookRc, kind: HookKind) -> Result<()> {
        let entry = self.routines.get(id)?;
        let mut prefixes = entry.prefixes.clone();
        let mut postfixes = entry.postfixes.clone();
        match kind {
            HookKind::Prefix => prefixes.push(hook.clone()),
            HookKind::Postfix => postfixes.push(hook.clone()),
        }

        self.compile_with(id, &prefixes, &postfixes)?;

        let entry = self.routines.get_mut(id)?;
        debug!("added {kind} {} to {}", hook.name(), entry.routine.full_name());
        match kind {
            HookKind::Prefix => entry.prefixes.push(hook),
            HookKind::Postfix => entry.postfixes.push(hook),
        }
        entry.dirty = true;
        Ok(())
    }

    fn remove_hook(&mut self, id: RoutineId, hook: &HookRc, kind: HookKind) -> Result<bool> {
        let entry = self.routines.get_mut(id)?;
        let chain = match kind {
            HookKind::Prefix => &mut entry.prefixes,
            HookKind::Postfix => &mut entry.postfixes,
        };

        let Some(position) = chain.iter().position(|candidate| Arc::ptr_eq(candidate, hook))
        else {
            return Ok(false);
        };
        chain.remove(position);
        entry.dirty = true;
        Ok(true)
    }

    fn compile_with(
        &mut self,
        id: RoutineId,
        prefixes: &[HookRc],
        postfixes: &[HookRc],
    ) -> Result<CompiledRoutine> {
        self.instructions(id)?;
        let entry = self.routines.get(id)?;
        let instructions = Self::cached(entry)?;
        HookCompiler::new(&entry.routine, instructions, &self.options).compile(prefixes, postfixes)
    }

    fn cached(entry: &RoutineEntry) -> Result<&InstructionList> {
        entry
            .instructions
            .as_ref()
            .ok_or_else(|| malformed_error!("Decoded body of {} missing", entry.routine.id))
    }
}
