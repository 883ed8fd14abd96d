//! Branches, loops and iterators.
//!
//! Loop bodies run through a nested `execute`. When a body comes back the
//! loop inspects `returning`:
//! - `Continue` is absorbed and the loop goes on
//! - `Break` is absorbed and the loop ends
//! - `Return` and `Stop` end the loop and stay set for the enclosing code
//!
//! # Iterators
//!
//! `for i = 0, n iter(args) stmt` calls the iterator with an [`IterContext`]
//! describing `stmt`. Each `iterator_statement` in the iterator body runs
//! `stmt` in a frame that borrows the caller's argument and auto window and
//! in the caller's object context. A `break` in `stmt` ends the iterator; a
//! `return` in `stmt` is a fault.

use std::rc::Rc;

use hoc_ir::{Code, SymbolId};

use crate::errors::{
    iterator_statement_outside_iterator, iterator_statement_return, not_an_iterator, ExecResult,
};
use crate::frame::{Frame, IterContext};
use crate::interpreter::{CellUse, Interpreter, Returning};
use crate::symbol::{ProcKind, SymbolKind};

use super::Flow;

impl Interpreter {
    /// Absorb a loop-level control transfer; true when the loop must end.
    pub(super) fn loop_should_exit(&mut self) -> bool {
        match self.returning {
            Returning::Running => false,
            Returning::Continue => {
                self.returning = Returning::Running;
                false
            }
            Returning::Break => {
                self.returning = Returning::Running;
                true
            }
            Returning::Return | Returning::Stop => true,
        }
    }

    /// `If [then, else, next]` followed by the inline condition.
    pub(super) fn if_code(&mut self, code: &Rc<Code>, pos: usize) -> ExecResult<Flow> {
        let then = code.target_at(pos + 1)?;
        let otherwise = code.optional_target_at(pos + 2)?;
        let next = code.target_at(pos + 3)?;
        self.execute(code, pos + 4)?;
        if self.returning != Returning::Running {
            return Ok(Flow::Jump(next));
        }
        if self.stack.pop_number()? != 0.0 {
            self.execute(code, then)?;
        } else if let Some(otherwise) = otherwise {
            self.execute(code, otherwise)?;
        }
        Ok(Flow::Jump(next))
    }

    /// `For [body, next, increment]` followed by the inline condition.
    pub(super) fn for_code(&mut self, code: &Rc<Code>, pos: usize) -> ExecResult<Flow> {
        let body = code.target_at(pos + 1)?;
        let next = code.target_at(pos + 2)?;
        let increment = code.optional_target_at(pos + 3)?;
        let condition = pos + 4;
        loop {
            self.execute(code, condition)?;
            if self.returning != Returning::Running || self.stack.pop_number()? == 0.0 {
                break;
            }
            self.execute(code, body)?;
            if self.loop_should_exit() {
                break;
            }
            if let Some(increment) = increment {
                self.execute(code, increment)?;
            }
        }
        Ok(Flow::Jump(next))
    }

    /// `for x = begin, end stmt` with `[subscripts.., x, begin, end]` on
    /// the stack. The variable is read back after each pass, so the body
    /// may change it.
    pub(super) fn short_for(&mut self, code: &Rc<Code>, pos: usize) -> ExecResult<Flow> {
        let body = code.target_at(pos + 1)?;
        let next = code.target_at(pos + 2)?;
        let end = self.stack.pop_number()? + self.config.epsilon;
        let begin = self.stack.pop_number()?;
        let sym = self.stack.pop_symbol()?;
        let cell = self.var_cell(sym, CellUse::Loop)?;

        self.write_number(&cell, begin)?;
        while self.read_number(&cell)? <= end {
            self.execute(code, body)?;
            if self.loop_should_exit() {
                break;
            }
            let value = self.read_number(&cell)?;
            self.write_number(&cell, value + 1.0)?;
        }
        Ok(Flow::Jump(next))
    }

    /// `for (x) stmt`: visit the centers of the host's segments, and with
    /// a nonzero mode the end points 0 and 1 as well.
    pub(super) fn for_segment(&mut self, code: &Rc<Code>, pos: usize) -> ExecResult<Flow> {
        let with_ends = code.int_at(pos + 1)? != 0;
        let body = code.target_at(pos + 2)?;
        let next = code.target_at(pos + 3)?;
        let sym = self.stack.pop_symbol()?;
        let cell = self.var_cell(sym, CellUse::Loop)?;

        let points = segment_points(self.config.segment_count, with_ends);
        for x in points {
            self.write_number(&cell, x)?;
            self.execute(code, body)?;
            if self.loop_should_exit() {
                break;
            }
        }
        Ok(Flow::Jump(next))
    }

    /// `Iterator [sym, narg, stmt_begin, stmt_end]`.
    pub(super) fn iterator_call(&mut self, code: &Rc<Code>, pos: usize) -> ExecResult<Flow> {
        let sym = self.resolve_external(code.symbol_at(pos + 1)?);
        let narg = code.count_at(pos + 2)?;
        let stmt_begin = code.target_at(pos + 3)?;
        let end = code.target_at(pos + 4)?;
        let symbol = self.symbols.symbol(sym)?;
        if !matches!(&symbol.kind, SymbolKind::Proc(def) if def.kind == ProcKind::Iterator) {
            return Err(not_an_iterator(&symbol.name));
        }
        let iter = IterContext {
            code: Rc::clone(code),
            stmt_begin,
            caller: self.frames.len().checked_sub(1),
            object: self.context,
        };
        self.call_procedure(sym, narg, Some(iter))?;
        Ok(Flow::Jump(end))
    }

    /// Run the statement of the enclosing iterator call.
    pub(super) fn iterator_statement(&mut self) -> ExecResult<()> {
        let iter = self
            .frames
            .top()
            .and_then(|frame| frame.iter.clone())
            .ok_or_else(iterator_statement_outside_iterator)?;

        let mut frame = match iter.caller.and_then(|index| self.frames.get(index)) {
            Some(caller) => {
                let mut frame = Frame::new(
                    caller.symbol,
                    caller.nargs,
                    caller.args_base + caller.nargs,
                    iter.object,
                );
                frame.auto_base = caller.auto_base;
                frame.nauto = caller.nauto;
                frame.nobjauto = caller.nobjauto;
                frame
            }
            None => Frame::new(SymbolId::INVALID, 0, self.stack.len(), iter.object),
        };
        frame.borrowed_window = true;
        self.frames.push(frame, "iterator statement")?;

        self.with_object_context(iter.object, |scoped| {
            scoped.execute(&iter.code, iter.stmt_begin)
        })?;

        if let Some(frame) = self.frames.pop() {
            self.release_return(frame.result)?;
        }
        match self.returning {
            Returning::Return => return Err(iterator_statement_return()),
            Returning::Break => self.returning = Returning::Return,
            Returning::Continue => self.returning = Returning::Running,
            Returning::Running | Returning::Stop => {}
        }
        Ok(())
    }
}

/// Loop variable values of a segment loop over `count` segments.
fn segment_points(count: usize, with_ends: bool) -> Vec<f64> {
    let count = count.max(1);
    #[allow(clippy::cast_precision_loss, reason = "segment counts are small")]
    let n = count as f64;
    let mut points = Vec::with_capacity(count + 2);
    if with_ends {
        points.push(0.0);
    }
    for i in 0..count {
        #[allow(clippy::cast_precision_loss, reason = "segment counts are small")]
        let i = i as f64;
        points.push((i + 0.5) / n);
    }
    if with_ends {
        points.push(1.0);
    }
    points
}
