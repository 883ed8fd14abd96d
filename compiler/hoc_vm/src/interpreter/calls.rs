//! Calls: user procedures, built-in math functions, native functions and
//! methods, and object construction.
//!
//! # Frame discipline
//!
//! A call pushes a frame whose argument window is the top `narg` stack
//! entries, reserves the callee's autos above them, runs the body and then
//! `finish_call` pops the frame, discards everything from the first argument
//! up (releasing owned entries innermost first) and pushes the result.
//!
//! A faulting body leaves its frame in place: the boundary reads the frames
//! for the backtrace before the recovery sweep unwinds them.

use std::rc::Rc;

use hoc_ir::{ObjectId, SymbolId};

use super::{Interpreter, NativeCtx, Returning};
use crate::dataspace::{DataSlot, Dataspace, SlotValue};
use crate::diagnostics::ExecCounters;
use crate::errors::{
    dead_object, iterator_outside_for, math_domain, math_range, native_fault,
    not_a_template, not_enough_arguments, return_mismatch, stack_underflow, undefined_function,
    ExecResult,
};
use crate::frame::{Frame, IterContext, ReturnValue};
use crate::object::{NativeClass, NativeReturn, ObjectBody};
use crate::stack::{OwnedObject, StackEntry, StrRef};
use crate::symbol::{ProcKind, ScopeId, SymbolKind};

impl Interpreter {
    /// Call `sym` with the top `narg` stack entries as arguments, leaving
    /// its result on the stack.
    pub(crate) fn call_symbol(&mut self, sym: SymbolId, narg: usize) -> ExecResult<()> {
        let sym = self.resolve_external(sym);
        let symbol = self.symbols.symbol(sym)?;
        let name = Rc::clone(&symbol.name);
        match symbol.kind.clone() {
            SymbolKind::Proc(def) if def.kind == ProcKind::Iterator => {
                Err(iterator_outside_for(&name))
            }
            SymbolKind::Proc(_) => self.call_procedure(sym, narg, None),
            SymbolKind::Builtin(f) => {
                if narg != 1 {
                    return Err(not_enough_arguments(&name));
                }
                self.apply_builtin(f, &name)
            }
            SymbolKind::NativeFunction(f) => {
                let frame = Frame::new(sym, narg, self.stack.len(), self.context);
                let index = self.frames.push(frame, &name)?;
                self.count(ExecCounters::count_native_call);
                let this = self.context;
                let value = f(&mut NativeCtx::new(self, index, this))?;
                self.pop_native_frame()?;
                self.stack.push_number(value)
            }
            _ => Err(undefined_function(&name)),
        }
    }

    /// Replace the number on top with `f(x)`, faulting on domain and range
    /// errors.
    pub(crate) fn apply_builtin(&mut self, f: fn(f64) -> f64, name: &str) -> ExecResult<()> {
        let x = self.stack.pop_number()?;
        let y = f(x);
        if y.is_nan() && !x.is_nan() {
            return Err(math_domain(name));
        }
        if y.is_infinite() && x.is_finite() {
            return Err(math_range(name));
        }
        self.stack.push_number(y)
    }

    /// Run a user-defined procedure, function, obfunc or iterator.
    ///
    /// Procedures declared at top level run with no object context; members
    /// run in the current one. `iter` carries the statement an iterator body
    /// runs through `iterator_statement`.
    pub(crate) fn call_procedure(
        &mut self,
        sym: SymbolId,
        narg: usize,
        iter: Option<IterContext>,
    ) -> ExecResult<()> {
        let symbol = self.symbols.symbol(sym)?;
        let name = Rc::clone(&symbol.name);
        let object = if symbol.scope.is_global() {
            None
        } else {
            self.context
        };
        let SymbolKind::Proc(def) = &symbol.kind else {
            return Err(undefined_function(&name));
        };
        let (kind, nauto, nobjauto) = (def.kind, def.nauto, def.nobjauto);
        let Some(body) = def.body.clone() else {
            return Err(undefined_function(&name));
        };
        if self.stack.len() < narg {
            return Err(stack_underflow());
        }

        let mut frame = Frame::new(sym, narg, self.stack.len(), object);
        frame.nauto = nauto;
        frame.nobjauto = nobjauto;
        frame.iter = iter;
        self.frames.push(frame, &name)?;
        self.count(ExecCounters::count_call);
        for slot in 0..nauto {
            let entry = if slot + nobjauto >= nauto {
                StackEntry::LocalObject(None)
            } else {
                StackEntry::Number(0.0)
            };
            self.stack.push(entry)?;
        }

        self.with_object_context(object, |scoped| scoped.execute(&body, 0))?;
        self.finish_call(kind, &name)
    }

    /// Pop the finished frame, discard its window and push its result.
    fn finish_call(&mut self, kind: ProcKind, name: &str) -> ExecResult<()> {
        let frame = self.frames.pop().ok_or_else(stack_underflow)?;
        let window = self.stack.drain_above(frame.args_base);
        let released = self.release_entries(window);
        let stopping = self.returning == Returning::Stop;
        if !stopping {
            self.returning = Returning::Running;
        }

        let result = match (kind, frame.result) {
            (ProcKind::Function, Some(ReturnValue::Number(value))) => StackEntry::Number(value),
            (ProcKind::ObjFunction, Some(ReturnValue::Object(owned))) => StackEntry::ObjTemp(owned),
            (ProcKind::Procedure, _) => StackEntry::Number(0.0),
            (ProcKind::Iterator, _) => return released,
            (ProcKind::Function, None) if stopping => StackEntry::Number(0.0),
            (ProcKind::ObjFunction, None) if stopping => StackEntry::ObjTemp(OwnedObject::null()),
            (ProcKind::Function, other) => {
                self.release_return(other)?;
                return Err(return_mismatch(name, "(func) returns no value"));
            }
            (ProcKind::ObjFunction, other) => {
                self.release_return(other)?;
                return Err(return_mismatch(name, "(obfunc) returns no value"));
            }
        };
        match result {
            StackEntry::ObjTemp(owned) => self.push_temp(owned)?,
            other => self.stack.push(other)?,
        }
        released
    }

    pub(crate) fn release_return(&mut self, value: Option<ReturnValue>) -> ExecResult<()> {
        match value {
            Some(ReturnValue::Object(owned)) => self.release_owned(owned),
            _ => Ok(()),
        }
    }

    /// Pop a native call's frame and its arguments.
    fn pop_native_frame(&mut self) -> ExecResult<()> {
        let frame = self.frames.pop().ok_or_else(stack_underflow)?;
        let window = self.stack.drain_above(frame.args_base);
        self.release_entries(window)
    }

    /// Call member `sym` of `obj` with `narg` arguments on the stack.
    pub(crate) fn call_in_object(&mut self, obj: ObjectId, sym: SymbolId, narg: usize) -> ExecResult<()> {
        if !self.objects.is_live(obj) {
            return Err(dead_object());
        }
        let native = match self.symbols.symbol(sym)?.kind {
            SymbolKind::NativeMethod { index } => Some(index),
            _ => None,
        };
        match native {
            Some(index) => self.call_native_method(obj, sym, index, narg),
            None => self.with_object_context(Some(obj), |scoped| scoped.call_symbol(sym, narg)),
        }
    }

    fn call_native_method(
        &mut self,
        obj: ObjectId,
        sym: SymbolId,
        index: usize,
        narg: usize,
    ) -> ExecResult<()> {
        let name = self.symbols.name(sym);
        let class = self
            .objects
            .template_of(obj)
            .and_then(|template| template.native.clone())
            .ok_or_else(|| native_fault(name.as_ref(), "not a native object"))?;
        let method = class
            .methods
            .get(index)
            .cloned()
            .ok_or_else(|| native_fault(name.as_ref(), "no such method"))?;

        let frame = Frame::new(sym, narg, self.stack.len(), Some(obj));
        let frame_index = self.frames.push(frame, &name)?;
        self.count(ExecCounters::count_native_call);

        let instance = match self.objects.get_mut(obj).map(|object| &mut object.body) {
            Some(ObjectBody::Native(slot)) => slot.take(),
            _ => None,
        };
        let Some(mut instance) = instance else {
            return Err(native_fault(name.as_ref(), "object is busy"));
        };
        let result = (method.call)(&mut *instance, &mut NativeCtx::new(self, frame_index, Some(obj)));

        match self.objects.get_mut(obj).map(|object| &mut object.body) {
            Some(ObjectBody::Native(slot)) => *slot = Some(instance),
            // Destroyed while the method ran.
            _ => {
                if let Some(destructor) = &class.destructor {
                    destructor(instance);
                }
            }
        }

        let value = result?;
        self.pop_native_frame()?;
        match value {
            NativeReturn::Number(value) => self.stack.push_number(value),
            NativeReturn::Str(text) => self.stack.push(StackEntry::Str(StrRef::Value(Rc::from(text)))),
            NativeReturn::Object(owned) => self.push_temp(owned),
        }
    }

    /// Create an instance of the template named by `template_sym`, consuming
    /// `narg` constructor arguments.
    ///
    /// The new object is returned with the single reference the caller now
    /// owns. If construction faults the partial object is released before
    /// the fault is returned.
    pub(crate) fn construct(&mut self, template_sym: SymbolId, narg: usize) -> ExecResult<OwnedObject> {
        let symbol = self.symbols.symbol(template_sym)?;
        let name = Rc::clone(&symbol.name);
        let SymbolKind::Template(tid) = symbol.kind else {
            return Err(not_a_template(&name));
        };
        let template = self.objects.template(tid).ok_or_else(|| not_a_template(&name))?;
        let (scope, size, init, this_slot) = (
            template.scope,
            template.dataspace_size,
            template.init,
            template.this_slot,
        );
        let native = template.native.clone();

        let body = match native {
            Some(_) => ObjectBody::Native(None),
            None => ObjectBody::Data(self.allocate_dataspace(scope, size)),
        };
        let id = self
            .objects
            .insert(tid, body)
            .ok_or_else(|| native_fault(name.as_ref(), "object arena exhausted"))?;
        if let (Some(slot), Some(data)) = (
            this_slot,
            self.objects.get_mut(id).and_then(|object| object.dataspace_mut()),
        ) {
            if let Some(this) = data.slot_mut(slot) {
                this.value = SlotValue::Objects(vec![Some(id)]);
            }
        }
        self.count(ExecCounters::count_object_created);
        tracing::debug!(object = %self.objects.object_name(Some(id)), narg, "new object");
        let owned = OwnedObject::adopt(Some(id));

        let result = match (native, init) {
            (Some(class), _) => self.run_native_constructor(id, &class, template_sym, narg),
            (None, Some(init)) => self
                .call_in_object(id, init, narg)
                .and_then(|()| self.stack.pop().map(drop)),
            (None, None) => {
                let args = self.stack.len().saturating_sub(narg);
                let window = self.stack.drain_above(args);
                self.release_entries(window)
            }
        };

        match result {
            Ok(()) => Ok(owned),
            Err(err) => {
                if let Err(secondary) = self.release_owned(owned) {
                    tracing::warn!(error = %secondary, "fault while releasing a partial object");
                }
                Err(err)
            }
        }
    }

    fn run_native_constructor(
        &mut self,
        id: ObjectId,
        class: &NativeClass,
        template_sym: SymbolId,
        narg: usize,
    ) -> ExecResult<()> {
        let frame = Frame::new(template_sym, narg, self.stack.len(), Some(id));
        let frame_index = self.frames.push(frame, &class.name)?;
        self.count(ExecCounters::count_native_call);
        let instance = (class.constructor)(&mut NativeCtx::new(self, frame_index, Some(id)))?;
        match self.objects.get_mut(id) {
            Some(object) => object.body = ObjectBody::Native(Some(instance)),
            None => {
                if let Some(destructor) = &class.destructor {
                    destructor(instance);
                }
                return Err(dead_object());
            }
        }
        self.pop_native_frame()
    }

    /// A fresh dataspace for the members of `scope`: numbers zeroed, strings
    /// empty, object references null.
    fn allocate_dataspace(&self, scope: ScopeId, size: usize) -> Dataspace {
        let mut data = Dataspace::with_size(size);
        for &member in self.symbols.scope_symbols(scope) {
            let Some(symbol) = self.symbols.get(member) else {
                continue;
            };
            let Some(oboff) = symbol.kind.oboff() else {
                continue;
            };
            let shape = symbol.shape.clone();
            let total = shape.as_ref().map_or(1, |shape| shape.total());
            let value = match symbol.kind {
                SymbolKind::Str { .. } => SlotValue::Str(String::new()),
                SymbolKind::ObjectVar { .. } => SlotValue::Objects(vec![None; total]),
                _ => SlotValue::Numbers(vec![0.0; total]),
            };
            data.ensure(oboff);
            if let Some(slot) = data.slot_mut(oboff) {
                *slot = DataSlot { value, shape };
            }
        }
        data
    }
}
