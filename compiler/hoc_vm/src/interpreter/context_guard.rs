//! RAII switch of the active object context.
//!
//! Method calls, constructors, `unref` callbacks and iterator statements all
//! run with some object made current and must put the previous context back
//! whether the body returns normally or faults. [`ObjectContextGuard`] holds
//! `&mut Interpreter`, implements `Deref`/`DerefMut` so the body keeps using
//! the interpreter directly, and restores the saved context on drop.
//!
//! ```text
//! self.with_object_context(Some(obj), |scoped| scoped.execute(&body, 0))?;
//! ```

use std::ops::{Deref, DerefMut};

use hoc_ir::ObjectId;

use super::Interpreter;

/// Restores the saved object context when dropped.
pub struct ObjectContextGuard<'guard> {
    interpreter: &'guard mut Interpreter,
    saved: Option<ObjectId>,
}

impl Drop for ObjectContextGuard<'_> {
    fn drop(&mut self) {
        self.interpreter.context = self.saved;
    }
}

impl Deref for ObjectContextGuard<'_> {
    type Target = Interpreter;

    fn deref(&self) -> &Self::Target {
        self.interpreter
    }
}

impl DerefMut for ObjectContextGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.interpreter
    }
}

impl Interpreter {
    /// Make `object` current until the returned guard is dropped.
    pub fn object_context(&mut self, object: Option<ObjectId>) -> ObjectContextGuard<'_> {
        let saved = std::mem::replace(&mut self.context, object);
        ObjectContextGuard {
            interpreter: self,
            saved,
        }
    }

    /// Run `f` with `object` as the current context.
    pub fn with_object_context<T, F>(&mut self, object: Option<ObjectId>, f: F) -> T
    where
        F: FnOnce(&mut ObjectContextGuard<'_>) -> T,
    {
        let mut scoped = self.object_context(object);
        f(&mut scoped)
    }
}
