//! Hook compilation.
//!
//! Turns a decoded routine and its registered hooks into a [`CompiledRoutine`]: the original
//! body wrapped by prefix and postfix calls, with a single exit point.
//!
//! # Key Components
//!
//! - [`Hook`] / [`HookRc`] - a static hook method with named parameters
//! - [`NamingOptions`] - the special parameter names (`__instance`, `__result`, ...)
//! - [`HookCompiler`] - builds the replacement body, or an unchanged copy
//! - [`compile_delegate_wrapper`] - static wrapper that lets a delegate act as a hook
//!
//! # Parameter binding
//!
//! | Parameter name       | Bound value                                        |
//! |----------------------|----------------------------------------------------|
//! | original parameter   | the argument, by value or by reference             |
//! | `__instance`         | the receiver, `null` for static routines           |
//! | `__result`           | the return value slot                              |
//! | `__runOriginal`      | whether the original body runs                     |
//! | `__originalMethod`   | the original as `System.Reflection.MethodBase`     |
//! | `__args`             | all arguments as `object[]`                        |
//! | `___name`            | the field `name` of the declaring type             |

mod binding;
mod compiler;
#[allow(clippy::module_inception)]
mod hook;
mod options;
mod wrapper;

pub use compiler::{CompiledRoutine, HookCompiler};
pub use hook::{Hook, HookKind, HookRc};
pub use options::NamingOptions;
pub use wrapper::compile_delegate_wrapper;
