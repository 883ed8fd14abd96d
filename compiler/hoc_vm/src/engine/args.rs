//! Argument access (`$i`, `$si`, `$oi`, `$&i`) and the return opcodes.
//!
//! Arguments are read in place from the current frame's window. An index
//! operand of zero means the index was computed at run time and sits on top
//! of the stack.

use std::rc::Rc;

use crate::errors::{
    arg_index_below_one, expecting_string_arg, not_enough_arguments, outside_procedure,
    return_mismatch, return_outside_procedure, stack_underflow, subscript_out_of_range,
    type_mismatch, ExecResult,
};
use crate::frame::ReturnValue;
use crate::interpreter::{Interpreter, Returning};
use crate::stack::{CellRef, StackEntry};
use crate::symbol::{ProcKind, SymbolKind};

use super::arith::op_assign;

impl Interpreter {
    /// Stack index of argument `operand` of the current frame.
    fn arg_slot(&mut self, operand: usize) -> ExecResult<usize> {
        let i = if operand == 0 {
            self.pop_arg_index()?
        } else {
            operand
        };
        let frame = self
            .frames
            .top()
            .ok_or_else(|| outside_procedure(&format!("${i}")))?;
        frame
            .arg_index(i)
            .ok_or_else(|| not_enough_arguments(&self.symbols.name(frame.symbol)))
    }

    fn pop_arg_index(&mut self) -> ExecResult<usize> {
        let x = self.stack.pop_number()?.trunc();
        if x < 1.0 {
            return Err(arg_index_below_one());
        }
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "checked to be at least 1"
        )]
        let i = x as usize;
        Ok(i)
    }

    fn arg_number_at(&self, index: usize) -> ExecResult<f64> {
        match self.stack.get(index) {
            Some(StackEntry::Number(value)) => Ok(*value),
            Some(other) => Err(type_mismatch("number", other.tag())),
            None => Err(stack_underflow()),
        }
    }

    fn arg_pointer_at(&self, index: usize) -> ExecResult<CellRef> {
        match self.stack.get(index) {
            Some(StackEntry::Var(cell)) => Ok(cell.clone()),
            Some(other) => Err(type_mismatch("pointer", other.tag())),
            None => Err(stack_underflow()),
        }
    }

    /// Element offset of a subscripted `$&i[j]`, popped from the stack.
    fn pop_pointer_offset(&mut self) -> ExecResult<usize> {
        let j = self.stack.pop_number()? + self.config.epsilon;
        if j < 0.0 {
            return Err(subscript_out_of_range("$&"));
        }
        let j = j.trunc();
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "checked to be non-negative"
        )]
        let j = j as usize;
        Ok(j)
    }

    fn pointer_target(&mut self, slot: usize, subscripted: bool) -> ExecResult<CellRef> {
        let cell = self.arg_pointer_at(slot)?;
        if !subscripted {
            return Ok(cell);
        }
        let j = self.pop_pointer_offset()?;
        cell.offset(j).ok_or_else(|| subscript_out_of_range("$&"))
    }

    pub(super) fn arg(&mut self, operand: usize) -> ExecResult<()> {
        let slot = self.arg_slot(operand)?;
        let value = self.arg_number_at(slot)?;
        self.stack.push_number(value)
    }

    /// `$i op= value`; the value is left on the stack.
    pub(super) fn arg_assign(&mut self, operand: usize, op: i32) -> ExecResult<()> {
        let slot = self.arg_slot(operand)?;
        let mut value = self.stack.pop_number()?;
        let current = self.arg_number_at(slot)?;
        if op != 0 {
            value = op_assign(op, current, value)?;
        }
        self.stack.replace(slot, StackEntry::Number(value));
        self.stack.push_number(value)
    }

    pub(super) fn string_arg(&mut self, operand: usize) -> ExecResult<()> {
        let slot = self.arg_slot(operand)?;
        let text = match self.stack.get(slot) {
            Some(StackEntry::Str(text)) => text.clone(),
            _ => return Err(expecting_string_arg()),
        };
        self.stack.push(StackEntry::Str(text))
    }

    /// `$oi`: a cell for the argument slot, so assigning to it writes
    /// through to the caller's objref.
    pub(super) fn object_arg(&mut self, operand: usize) -> ExecResult<()> {
        let slot = self.arg_slot(operand)?;
        match self.stack.get(slot) {
            Some(entry) if entry.is_object() => {}
            Some(other) => return Err(type_mismatch("object", other.tag())),
            None => return Err(stack_underflow()),
        }
        self.stack.push(StackEntry::ObjCell(CellRef::Stack(slot)))
    }

    /// `$&i` or `$&i[j]` read through the pointer.
    pub(super) fn arg_ref(&mut self, operand: usize, subscripted: bool) -> ExecResult<()> {
        let slot = self.arg_slot(operand)?;
        let cell = self.pointer_target(slot, subscripted)?;
        let value = self.read_number(&cell)?;
        self.stack.push_number(value)
    }

    /// `$&i[j] op= value`, stack `[j, value, index]`.
    pub(super) fn arg_ref_assign(
        &mut self,
        operand: usize,
        subscripted: bool,
        op: i32,
    ) -> ExecResult<()> {
        let slot = self.arg_slot(operand)?;
        let mut value = self.stack.pop_number()?;
        let cell = self.pointer_target(slot, subscripted)?;
        if op != 0 {
            value = op_assign(op, self.read_number(&cell)?, value)?;
        }
        self.write_number(&cell, value)?;
        self.stack.push_number(value)
    }

    pub(super) fn arg_ref_arg(&mut self, operand: usize) -> ExecResult<()> {
        let slot = self.arg_slot(operand)?;
        let cell = self.arg_pointer_at(slot)?;
        self.stack.push(StackEntry::Var(cell))
    }

    /// Kind and name of the procedure the current frame runs.
    fn returning_from(&self) -> ExecResult<(ProcKind, Rc<str>)> {
        let symbol = self
            .frames
            .top()
            .and_then(|frame| self.symbols.get(frame.symbol))
            .ok_or_else(return_outside_procedure)?;
        match &symbol.kind {
            SymbolKind::Proc(def) => Ok((def.kind, Rc::clone(&symbol.name))),
            _ => Err(return_outside_procedure()),
        }
    }

    fn set_result(&mut self, value: ReturnValue) -> ExecResult<()> {
        let previous = match self.frames.top_mut() {
            Some(frame) => frame.result.replace(value),
            None => Some(value),
        };
        self.returning = Returning::Return;
        self.release_return(previous)
    }

    pub(super) fn func_ret(&mut self) -> ExecResult<()> {
        let (kind, name) = self.returning_from()?;
        if kind != ProcKind::Function {
            return Err(return_mismatch(&name, "(proc or iterator) returns value"));
        }
        let value = self.stack.pop_number()?;
        self.set_result(ReturnValue::Number(value))
    }

    pub(super) fn proc_ret(&mut self) -> ExecResult<()> {
        let (kind, name) = self.returning_from()?;
        match kind {
            ProcKind::Function => Err(return_mismatch(&name, "(func) returns no value")),
            ProcKind::ObjFunction => Err(return_mismatch(&name, "(obfunc) returns no value")),
            ProcKind::Procedure | ProcKind::Iterator => {
                self.returning = Returning::Return;
                Ok(())
            }
        }
    }

    /// Return an object. A cell operand is retained so a returned
    /// `localobj` outlives the frame.
    pub(super) fn obj_ret(&mut self) -> ExecResult<()> {
        let (kind, name) = self.returning_from()?;
        if kind != ProcKind::ObjFunction {
            return Err(return_mismatch(&name, "objfunc returns objref"));
        }
        let (id, owned) = self.pop_object_operand()?;
        let owned = match owned {
            Some(owned) => owned,
            None => self.retain(id)?,
        };
        self.set_result(ReturnValue::Object(owned))
    }
}
