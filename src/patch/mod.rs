//! Native entry point redirection.
//!
//! Once a compiled routine has been loaded by the runtime, the entry of the original is
//! overwritten with an absolute jump to it. Every write is undoable: the applier keeps the
//! exact bytes each stub replaced.
//!
//! # Key Types
//! - [`PatchApplier`] - Writes and removes jump stubs
//! - [`ExecutableMemory`] - Where the bytes go, [`NativeMemory`] or [`SandboxMemory`]
//! - [`PatchRegistry`] / [`PatchRecord`] - Snapshots of replaced bytes
//! - [`PatchConfig`] - Stub flavor and jump following
//!
//! # Stubs
//!
//! | Width | Bytes | Length |
//! |-------|-------|--------|
//! | x64 | `48 B8 <imm64> FF E0` | 12 |
//! | x86 | `68 <imm32> C3` | 6 |

mod applier;
mod config;
mod memory;
mod native;
mod registry;
mod sandbox;
mod stub;

pub use applier::PatchApplier;
pub use config::{PatchConfig, PointerWidth};
pub use memory::ExecutableMemory;
pub use native::NativeMemory;
pub use registry::{PatchRecord, PatchRegistry};
pub use sandbox::{SandboxMemory, SandboxWrite};
pub use stub::{follow_jump, jump_stub, JMP_REL32};
