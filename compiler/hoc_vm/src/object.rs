//! Templates, objects and native classes.
//!
//! Templates and objects live in one [`ObjectArena`] addressed by
//! `TemplateId` and `ObjectId`. An object refers to its template by id and
//! never owns it; a template lists its live objects in creation order.
//! Reference counts are only changed through `Interpreter::retain` and
//! `Interpreter::release`.
//!
//! Aliases and observers are weak: an alias names another object by id
//! without counting a reference, and an observer is a callback run once when
//! the object is destroyed.

mod arena;
mod native;

pub use arena::{Alias, Object, ObjectArena, ObjectBody, Template};
pub use native::{NativeClass, NativeClassBuilder, NativeFn, NativeReturn, ReturnKind};

pub(crate) use native::NativeProperty;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]
mod tests;
