//! The runtime seam of the engine.

use crate::{
    hook::CompiledRoutine,
    metadata::{routine::Routine, SymbolResolver},
    Result,
};

/// What the engine needs from the runtime that executes the routines.
///
/// The engine never creates modules or loads code on its own. The host resolves tokens of
/// original bodies, turns a [`CompiledRoutine`] into callable native code and tells where a
/// routine's native entry point lives.
pub trait RuntimeHost {
    /// Resolver for tokens in original routine bodies
    fn resolver(&self) -> &dyn SymbolResolver;

    /// Native entry point of `routine`, prepared (jitted) if necessary.
    ///
    /// # Errors
    /// Host specific, the error is handed through to the caller of `attach`.
    fn entry_point(&mut self, routine: &Routine) -> Result<usize>;

    /// Load `compiled` as the replacement of `routine` and return its native entry point.
    ///
    /// # Errors
    /// Host specific, the error is handed through to the caller of `attach`.
    fn load(&mut self, routine: &Routine, compiled: &CompiledRoutine) -> Result<usize>;

    /// Keep the runtime from inlining `routine` into its callers, returns false if that was
    /// not possible
    fn disable_inlining(&mut self, routine: &Routine) -> bool;
}
