//! The view a native callback gets of its call.

use hoc_ir::{ObjectId, SymbolId};

use super::Interpreter;
use crate::errors::{
    expecting_string_arg, native_fault, not_enough_arguments, outside_procedure, type_mismatch,
    ExecError, ExecResult,
};
use crate::stack::{OwnedObject, StackEntry};

/// Argument kinds reported by `argtype`.
const ARG_MISSING: i32 = -1;
const ARG_NUMBER: i32 = 0;
const ARG_OBJECT: i32 = 1;
const ARG_STRING: i32 = 2;
const ARG_POINTER: i32 = 3;

/// A native function, method or constructor call in progress.
///
/// Arguments are read in place from the call's stack window; they are
/// discarded by the engine after the callback returns.
pub struct NativeCtx<'a> {
    interp: &'a mut Interpreter,
    frame: usize,
    this: Option<ObjectId>,
}

impl<'a> NativeCtx<'a> {
    pub(crate) fn new(interp: &'a mut Interpreter, frame: usize, this: Option<ObjectId>) -> Self {
        NativeCtx {
            interp,
            frame,
            this,
        }
    }

    /// Name of the function or method being called.
    pub fn name(&self) -> String {
        self.interp
            .frames
            .get(self.frame)
            .map_or_else(String::new, |frame| self.interp.symbols.name(frame.symbol).to_string())
    }

    /// Number of arguments passed.
    pub fn nargs(&self) -> usize {
        self.interp.frames.get(self.frame).map_or(0, |frame| frame.nargs)
    }

    /// The object a method or constructor runs on.
    pub fn this_object(&self) -> Option<ObjectId> {
        self.this
    }

    fn arg(&self, i: usize) -> ExecResult<&StackEntry> {
        self.interp
            .frames
            .get(self.frame)
            .and_then(|frame| frame.arg_index(i))
            .and_then(|index| self.interp.stack.get(index))
            .ok_or_else(|| not_enough_arguments(&self.name()))
    }

    /// Numeric argument `i` (1-based).
    pub fn number(&self, i: usize) -> ExecResult<f64> {
        match self.arg(i)? {
            StackEntry::Number(value) => Ok(*value),
            other => Err(type_mismatch("number", other.tag())),
        }
    }

    /// String argument `i`.
    pub fn string(&self, i: usize) -> ExecResult<String> {
        match self.arg(i)? {
            StackEntry::Str(text) => Ok(self.interp.read_str(text)?.to_string()),
            _ => Err(expecting_string_arg()),
        }
    }

    /// Object argument `i`; `None` for a null reference.
    pub fn object(&self, i: usize) -> ExecResult<Option<ObjectId>> {
        match self.arg(i)? {
            StackEntry::ObjCell(cell) => self.interp.read_object(cell),
            StackEntry::ObjTemp(owned) => Ok(owned.id()),
            other => Err(type_mismatch("object", other.tag())),
        }
    }

    /// Read through a `&x` pointer argument.
    pub fn pointer_value(&self, i: usize) -> ExecResult<f64> {
        match self.arg(i)? {
            StackEntry::Var(cell) => self.interp.read_number(cell),
            other => Err(type_mismatch("pointer", other.tag())),
        }
    }

    /// Assign through a `&x` pointer argument.
    pub fn set_pointer(&mut self, i: usize, value: f64) -> ExecResult<()> {
        let cell = match self.arg(i)? {
            StackEntry::Var(cell) => cell.clone(),
            other => return Err(type_mismatch("pointer", other.tag())),
        };
        self.interp.write_number(&cell, value)
    }

    /// Kind of argument `i`: -1 missing, 0 number, 1 object, 2 string,
    /// 3 pointer.
    pub fn arg_type(&self, i: usize) -> i32 {
        let frame = self.interp.frames.get(self.frame);
        frame.map_or(ARG_MISSING, |frame| self.interp.arg_type_in(frame.arg_index(i)))
    }

    /// Number of arguments of the hoc procedure that called this function.
    pub fn caller_nargs(&self) -> ExecResult<usize> {
        self.caller_frame()
            .map(|index| self.interp.frames.get(index).map_or(0, |frame| frame.nargs))
    }

    /// `arg_type` for the hoc procedure that called this function.
    pub fn caller_arg_type(&self, i: usize) -> ExecResult<i32> {
        let index = self.caller_frame()?;
        let slot = self
            .interp
            .frames
            .get(index)
            .and_then(|frame| frame.arg_index(i));
        Ok(self.interp.arg_type_in(slot))
    }

    fn caller_frame(&self) -> ExecResult<usize> {
        self.frame
            .checked_sub(1)
            .ok_or_else(|| outside_procedure(&self.name()))
    }

    /// Take a new reference to `id` for the callback to keep or return.
    pub fn retain(&mut self, id: Option<ObjectId>) -> ExecResult<OwnedObject> {
        self.interp.retain(id)
    }

    pub fn release(&mut self, owned: OwnedObject) -> ExecResult<()> {
        self.interp.release_owned(owned)
    }

    /// Call a hoc function with numeric arguments under a nested boundary.
    pub fn call_function(&mut self, sym: SymbolId, args: &[f64]) -> ExecResult<f64> {
        self.interp.call_function(sym, args)
    }

    /// Look up a top-level or builtin symbol.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.interp.lookup(name)
    }

    pub fn print(&self, text: &str) {
        self.interp.print.write(text);
    }

    pub fn object_name(&self, id: Option<ObjectId>) -> String {
        self.interp.object_name(id)
    }

    /// A fault attributed to this call.
    pub fn fault(&self, message: impl Into<String>) -> ExecError {
        native_fault(self.name(), message)
    }

    /// Full access for hosts that need more than the helpers above.
    pub fn interpreter(&mut self) -> &mut Interpreter {
        &mut *self.interp
    }
}

impl Interpreter {
    /// `argtype` code for the entry at a stack index.
    fn arg_type_in(&self, index: Option<usize>) -> i32 {
        match index.and_then(|index| self.stack.get(index)) {
            None => ARG_MISSING,
            Some(StackEntry::Number(_)) => ARG_NUMBER,
            Some(StackEntry::ObjCell(_) | StackEntry::ObjTemp(_) | StackEntry::LocalObject(_)) => {
                ARG_OBJECT
            }
            Some(StackEntry::Str(_)) => ARG_STRING,
            Some(StackEntry::Var(_)) => ARG_POINTER,
            Some(_) => ARG_MISSING,
        }
    }
}
