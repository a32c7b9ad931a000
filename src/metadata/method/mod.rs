//! Method body representation.
//!
//! # Key Components
//!
//! - [`MethodBody`] - parsed tiny/fat header with its exception handling clauses
//! - [`encode_method_body`] - the inverse, used to hand compiled routines to a host
//! - [`ExceptionHandler`] - one try/handler clause
//! - [`MethodBodyFlags`], [`SectionFlags`], [`MethodImplOptions`] - flag sets

mod body;
mod exceptions;
mod types;

pub use body::{encode_method_body, MethodBody};
pub use exceptions::{ExceptionHandler, ExceptionHandlerFlags};
pub use types::{MethodBodyFlags, MethodImplOptions, SectionFlags};
