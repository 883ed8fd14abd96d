//! Reference counting and object destruction.
//!
//! `retain` and `release` are the only code that changes a refcount. When a
//! count reaches zero the template's `unref` procedure (if any) runs first
//! and may take a new reference; only if the count is still zero afterwards,
//! and no `unref` callback for the object is running, is the object
//! destroyed.
//!
//! Destruction order:
//! 1. drop aliases
//! 2. notify observers
//! 3. leave the template's instance list
//! 4. run the native destructor, or release every object reference in the
//!    dataspace except the `this` slot

use std::collections::VecDeque;

use hoc_ir::{ObjectId, SymbolId};

use super::Interpreter;
use crate::dataspace::SlotValue;
use crate::diagnostics::ExecCounters;
use crate::errors::{dead_object, type_mismatch, ExecError, ExecResult};
use crate::object::ObjectBody;
use crate::stack::{OwnedObject, StackEntry};
use crate::stack_guard::ensure_sufficient_stack;

/// Temporaries parked while a pointer into them may still be in use.
///
/// `obj.x` on a temporary object yields a cell inside that object; releasing
/// the temporary right away would free the cell. The pool keeps the last few
/// such owners alive and releases the oldest when full.
#[derive(Debug)]
pub(crate) struct DeferPool {
    slots: VecDeque<OwnedObject>,
    capacity: usize,
}

impl DeferPool {
    pub(crate) fn new(capacity: usize) -> Self {
        DeferPool {
            slots: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Park `owned`, returning the evicted oldest entry when full.
    pub(crate) fn push(&mut self, owned: OwnedObject) -> Option<OwnedObject> {
        let evicted = if self.slots.len() >= self.capacity {
            self.slots.pop_front()
        } else {
            None
        };
        self.slots.push_back(owned);
        evicted
    }

    pub(crate) fn drain(&mut self) -> Vec<OwnedObject> {
        self.slots.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

impl Interpreter {
    /// Count one more reference to `id`.
    pub fn retain(&mut self, id: Option<ObjectId>) -> ExecResult<OwnedObject> {
        let Some(id) = id else {
            return Ok(OwnedObject::null());
        };
        let object = self.objects.get_mut(id).ok_or_else(dead_object)?;
        object.refcount += 1;
        Ok(OwnedObject::adopt(Some(id)))
    }

    /// Give back an owned reference. Called from the host, this is its own
    /// recoverable unit, since the release may run an `unref` callback.
    pub fn release_owned(&mut self, owned: OwnedObject) -> ExecResult<()> {
        let id = owned.into_raw();
        if self.boundary_depth == 0 {
            self.with_boundary("release", |interp| interp.release(id))
        } else {
            self.release(id)
        }
    }

    /// Drop one counted reference to `id`, destroying the object at zero.
    pub(crate) fn release(&mut self, id: Option<ObjectId>) -> ExecResult<()> {
        let Some(id) = id else {
            return Ok(());
        };
        let object = self.objects.get_mut(id).ok_or_else(dead_object)?;
        object.refcount = object.refcount.saturating_sub(1);
        let refcount = object.refcount;
        let recursing = object.unref_recurse > 0;
        let template = object.template;
        let unref = self
            .objects
            .template(template)
            .and_then(|template| template.unref);

        let callback = match (unref, recursing) {
            (Some(unref), false) => self.run_unref_callback(id, unref, refcount),
            _ => Ok(()),
        };

        // A faulting callback still destroys an object left at zero.
        if let Some(object) = self.objects.get(id) {
            if object.refcount == 0 && object.unref_recurse == 0 {
                let destroyed = self.destroy(id);
                callback?;
                return destroyed;
            }
        }
        callback
    }

    /// Call the template's `unref(refcount)` procedure in the object.
    fn run_unref_callback(&mut self, id: ObjectId, unref: SymbolId, refcount: u32) -> ExecResult<()> {
        if let Some(object) = self.objects.get_mut(id) {
            object.unref_recurse += 1;
        }
        let result = self
            .stack
            .push_number(f64::from(refcount))
            .and_then(|()| self.call_in_object(id, unref, 1))
            .and_then(|()| self.stack.pop().map(drop));
        if let Some(object) = self.objects.get_mut(id) {
            object.unref_recurse = object.unref_recurse.saturating_sub(1);
        }
        result
    }

    /// Tear down an object whose count reached zero.
    pub(crate) fn destroy(&mut self, id: ObjectId) -> ExecResult<()> {
        ensure_sufficient_stack(|| self.destroy_now(id))
    }

    fn destroy_now(&mut self, id: ObjectId) -> ExecResult<()> {
        let name = self.objects.object_name(Some(id));
        let (this_slot, class) = match self.objects.template_of(id) {
            Some(template) => (template.this_slot, template.native.clone()),
            None => (None, None),
        };
        let Some(mut object) = self.objects.remove(id) else {
            return Ok(());
        };
        tracing::debug!(object = %name, "destroy object");

        object.aliases.clear();
        for observer in object.observers.drain(..) {
            observer(id);
        }

        let mut first_error: Option<ExecError> = None;
        match object.body {
            // A `None` instance is checked out by a running native method,
            // which runs the destructor itself when it returns.
            ObjectBody::Native(instance) => {
                if let (Some(instance), Some(destructor)) =
                    (instance, class.and_then(|class| class.destructor.clone()))
                {
                    destructor(instance);
                }
            }
            ObjectBody::Data(mut data) => {
                for (oboff, slot) in data.take_slots().into_iter().enumerate() {
                    if Some(oboff) == this_slot {
                        continue;
                    }
                    if let SlotValue::Objects(objects) = slot.value {
                        for held in objects.into_iter().flatten() {
                            if let Err(err) = self.release(Some(held)) {
                                first_error.get_or_insert(err);
                            }
                        }
                    }
                }
            }
        }

        self.count(ExecCounters::count_object_destroyed);
        first_error.map_or(Ok(()), Err)
    }

    /// Release whatever reference a discarded stack entry owns.
    pub(crate) fn release_entry(&mut self, entry: StackEntry) -> ExecResult<()> {
        match entry {
            StackEntry::ObjTemp(owned) => self.release_owned(owned),
            StackEntry::LocalObject(id) => self.release(id),
            _ => Ok(()),
        }
    }

    /// Release every entry, continuing past failures and reporting the
    /// first.
    pub(crate) fn release_entries(&mut self, entries: Vec<StackEntry>) -> ExecResult<()> {
        let mut first_error = None;
        for entry in entries {
            if let Err(err) = self.release_entry(entry) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Pop an object operand: the referenced object and, for a temporary,
    /// the reference it owned.
    ///
    /// A non-object entry is left in place.
    pub(crate) fn pop_object_operand(
        &mut self,
    ) -> ExecResult<(Option<ObjectId>, Option<OwnedObject>)> {
        let entry = self.stack.peek(0)?;
        if !entry.is_object() {
            return Err(type_mismatch("object", entry.tag()));
        }
        match self.stack.pop()? {
            StackEntry::ObjCell(cell) => Ok((self.read_object(&cell)?, None)),
            StackEntry::ObjTemp(owned) => Ok((owned.id(), Some(owned))),
            other => Err(type_mismatch("object", other.tag())),
        }
    }

    /// Pop an object operand, parking a temporary in the defer pool.
    pub(crate) fn pop_object_deferred(&mut self) -> ExecResult<Option<ObjectId>> {
        let (id, owned) = self.pop_object_operand()?;
        if let Some(owned) = owned {
            self.defer_owned(owned)?;
        }
        Ok(id)
    }

    pub(crate) fn defer_owned(&mut self, owned: OwnedObject) -> ExecResult<()> {
        match self.defer.push(owned) {
            Some(evicted) => self.release_owned(evicted),
            None => Ok(()),
        }
    }

    /// Release every parked temporary.
    pub(crate) fn flush_deferred(&mut self) -> ExecResult<()> {
        let parked = self.defer.drain();
        let mut first_error = None;
        for owned in parked {
            if let Err(err) = self.release_owned(owned) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defer_pool_evicts_the_oldest() {
        let mut pool = DeferPool::new(2);
        let a = ObjectId::new(1);
        let b = ObjectId::new(2);
        let c = ObjectId::new(3);
        assert!(pool.push(OwnedObject::adopt(Some(a))).is_none());
        assert!(pool.push(OwnedObject::adopt(Some(b))).is_none());
        let evicted = pool.push(OwnedObject::adopt(Some(c)));
        assert_eq!(evicted.map(OwnedObject::into_raw), Some(Some(a)));
        assert_eq!(pool.len(), 2);
        let rest: Vec<_> = pool.drain().into_iter().map(OwnedObject::into_raw).collect();
        assert_eq!(rest, vec![Some(b), Some(c)]);
    }

    #[test]
    fn retaining_null_owns_nothing() {
        let mut interp = Interpreter::new();
        let owned = interp.retain(None);
        assert!(matches!(owned.map(OwnedObject::into_raw), Ok(None)));
    }

    #[test]
    fn retaining_a_dead_object_faults() {
        let mut interp = Interpreter::new();
        let err = interp.retain(Some(ObjectId::new(99))).map(OwnedObject::into_raw);
        assert!(err.is_err());
    }
}
