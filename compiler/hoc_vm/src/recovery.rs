//! Boundaries, the recovery sweep and the host entry points.
//!
//! A boundary records the engine state a host call started from: stack and
//! frame depth, object context and the depth of the `object_push` stack.
//! When the call faults, the boundary captures a backtrace and
//! [`Interpreter::recover_to`] puts the engine back in that state:
//!
//! 1. frames above the boundary are popped, releasing any pending object
//!    results
//! 2. stack entries above the watermark are released, innermost first, which
//!    covers temporaries and `localobj` slots alike
//! 3. the object context and context stack are restored
//! 4. `returning` is reset unless a `stop` is pending
//!
//! Only the outermost boundary also empties the defer pool and drops any
//! half-finished template or procedure declaration. Running the sweep a
//! second time changes nothing.

use std::rc::Rc;

use hoc_ir::{validate, Code, ObjectId, SymbolId, TemplateId};

use crate::config::FaultPolicy;
use crate::diagnostics::ExecCounters;
use crate::errors::{not_a_template, BacktraceFrame, ExecBacktrace, ExecError, ExecResult};
use crate::format::format_number;
use crate::interpreter::{DefinitionState, Interpreter, Returning};
use crate::stack::{OwnedObject, StackEntry};

/// Frames shown in a fault's backtrace.
const BACKTRACE_DEPTH: usize = 5;

/// Engine state at the start of a guarded call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Boundary {
    pub(crate) stack_len: usize,
    pub(crate) frame_len: usize,
    pub(crate) context: Option<ObjectId>,
    pub(crate) object_stack_len: usize,
    pub(crate) outermost: bool,
}

impl Interpreter {
    fn boundary(&self) -> Boundary {
        Boundary {
            stack_len: self.stack.len(),
            frame_len: self.frames.len(),
            context: self.context,
            object_stack_len: self.object_stack.len(),
            outermost: self.boundary_depth == 0,
        }
    }

    /// Run `f` as a recoverable unit. A fault leaves the engine as it was
    /// when `f` started and is returned with its backtrace attached.
    pub(crate) fn with_boundary<T>(
        &mut self,
        what: &str,
        f: impl FnOnce(&mut Self) -> ExecResult<T>,
    ) -> ExecResult<T> {
        let boundary = self.boundary();
        tracing::debug!(what, depth = self.boundary_depth, "enter boundary");
        self.boundary_depth += 1;
        let result = f(self);
        self.boundary_depth -= 1;

        match result {
            Ok(value) => {
                if boundary.outermost {
                    self.settle_outermost(&boundary);
                }
                Ok(value)
            }
            Err(err) => {
                let err = match err.backtrace {
                    Some(_) => err,
                    None => {
                        let backtrace = self.backtrace(boundary.frame_len);
                        err.with_backtrace(backtrace)
                    }
                };
                self.count(ExecCounters::count_fault);
                self.recover_to(&boundary);
                if boundary.outermost {
                    self.report_fault(&err);
                    if self.config.fault_policy == FaultPolicy::Abort {
                        tracing::error!(error = %err, "aborting on fault");
                        std::process::abort();
                    }
                }
                Err(err)
            }
        }
    }

    /// After a successful outermost run: drop leftovers and pending `stop`.
    fn settle_outermost(&mut self, boundary: &Boundary) {
        if self.stack.len() > boundary.stack_len {
            tracing::debug!(
                leftover = self.stack.len() - boundary.stack_len,
                "releasing entries left by a statement"
            );
            let leftover = self.stack.drain_above(boundary.stack_len);
            self.release_quietly(leftover);
        }
        // A `stop`, or a `break` with no loop around it, ends here.
        self.returning = Returning::Running;
        if let Err(err) = self.flush_deferred() {
            tracing::warn!(error = %err, "fault while flushing deferred objects");
        }
    }

    /// Restore the state recorded in `boundary`.
    pub(crate) fn recover_to(&mut self, boundary: &Boundary) {
        let mut frames = 0usize;
        let mut released = 0usize;
        // A faulting `unref` callback run by a release can leave frames and
        // entries of its own, so sweep until nothing is above the watermark.
        while self.frames.len() > boundary.frame_len || self.stack.len() > boundary.stack_len {
            while self.frames.len() > boundary.frame_len {
                let Some(frame) = self.frames.pop() else {
                    break;
                };
                frames += 1;
                if let Err(err) = self.release_return(frame.result) {
                    tracing::warn!(error = %err, "fault while releasing a pending result");
                }
            }
            let entries = self.stack.drain_above(boundary.stack_len);
            released += entries.len();
            self.release_quietly(entries);
        }

        self.context = boundary.context;
        self.object_stack.truncate(boundary.object_stack_len);
        if self.returning != Returning::Stop {
            self.returning = Returning::Running;
        }

        let deferred = self.defer.len();
        if boundary.outermost {
            if let Err(err) = self.flush_deferred() {
                tracing::warn!(error = %err, "fault while flushing deferred objects");
            }
            self.definition = DefinitionState::default();
            self.returning = Returning::Running;
        }
        tracing::debug!(
            frames,
            released,
            deferred,
            outermost = boundary.outermost,
            "recovery sweep"
        );
    }

    /// Release drained entries (innermost first), logging failures.
    fn release_quietly(&mut self, entries: Vec<StackEntry>) {
        for entry in entries {
            if let Err(err) = self.release_entry(entry) {
                tracing::warn!(error = %err, "fault while releasing a stack entry");
            }
        }
    }

    /// Innermost frames above `floor`, at most [`BACKTRACE_DEPTH`] of them.
    fn backtrace(&self, floor: usize) -> ExecBacktrace {
        let depth = self.frames.len().saturating_sub(floor);
        let frames = self
            .frames
            .iter_innermost()
            .take(depth.min(BACKTRACE_DEPTH))
            .map(|frame| {
                let mut name = self
                    .symbols
                    .get(frame.symbol)
                    .map_or_else(|| "iterator statement".to_string(), |s| s.name.to_string());
                if let (Some(object), false) = (frame.object, frame.borrowed_window) {
                    name = format!("{}.{name}", self.objects.object_name(Some(object)));
                }
                let args = (1..=frame.nargs)
                    .filter_map(|i| frame.arg_index(i))
                    .filter_map(|index| self.stack.get(index))
                    .map(|entry| self.describe_entry(entry))
                    .collect();
                BacktraceFrame { name, args }
            })
            .collect();
        ExecBacktrace::new(frames, depth.saturating_sub(BACKTRACE_DEPTH))
    }

    fn describe_entry(&self, entry: &StackEntry) -> String {
        match entry {
            StackEntry::Number(value) => format_number(*value),
            StackEntry::Str(text) => self
                .read_str(text)
                .map_or_else(|_| "<string>".to_string(), |text| format!("\"{text}\"")),
            StackEntry::ObjCell(cell) => self.objects.object_name(self.read_object(cell).ok().flatten()),
            StackEntry::ObjTemp(owned) => self.objects.object_name(owned.id()),
            StackEntry::LocalObject(id) => self.objects.object_name(*id),
            StackEntry::Var(_) => "<pointer>".to_string(),
            other => format!("<{}>", other.tag()),
        }
    }

    fn report_fault(&self, err: &ExecError) {
        tracing::warn!(error = %err, "hoc fault");
        if !self.config.mode.shows_messages() {
            return;
        }
        eprintln!("hoc: {err}");
        if let Some(backtrace) = err.backtrace.as_ref().filter(|b| !b.is_empty()) {
            eprint!("{backtrace}");
        }
    }

    /// Run one top-level statement or body. The code is validated first.
    pub fn run(&mut self, code: Code) -> ExecResult<()> {
        validate(&code, self.symbols.len())?;
        let code = Rc::new(code);
        self.with_boundary("run", |interp| interp.execute(&code, 0))
    }

    /// [`run`](Self::run) for hosts that only want a status: 0 on success,
    /// 1 on a fault. The stack depth is unchanged either way.
    pub fn run_status(&mut self, code: Code) -> i32 {
        match self.run(code) {
            Ok(()) => 0,
            Err(_) => 1,
        }
    }

    /// Run `code` with `object` as the current context.
    ///
    /// Inside a running statement this is a nested evaluation: faults go to
    /// the enclosing boundary. Called from the host it is its own boundary.
    pub fn obj_run(&mut self, code: Code, object: Option<ObjectId>) -> ExecResult<()> {
        validate(&code, self.symbols.len())?;
        let code = Rc::new(code);
        let body = |interp: &mut Self| -> ExecResult<()> {
            interp.with_object_context(object, |scoped| scoped.execute(&code, 0))?;
            if interp.returning != Returning::Stop {
                interp.returning = Returning::Running;
            }
            Ok(())
        };
        if self.boundary_depth == 0 {
            self.with_boundary("obj_run", body)
        } else {
            body(self)
        }
    }

    /// Call a hoc function with numeric arguments under a nested boundary.
    pub fn call_function(&mut self, sym: SymbolId, args: &[f64]) -> ExecResult<f64> {
        self.with_boundary("call", |interp| {
            for &arg in args {
                interp.stack.push_number(arg)?;
            }
            interp.call_symbol(sym, args.len())?;
            interp.stack.pop_number()
        })
    }

    /// Call member `sym` of `object` (or a top-level function when `object`
    /// is `None`) with numeric arguments, returning its numeric result.
    pub fn call_objfunc(
        &mut self,
        object: Option<ObjectId>,
        sym: SymbolId,
        args: &[f64],
    ) -> ExecResult<f64> {
        self.with_boundary("call_objfunc", |interp| {
            for &arg in args {
                interp.stack.push_number(arg)?;
            }
            match object {
                Some(object) => interp.call_in_object(object, sym, args.len())?,
                None => interp.call_symbol(sym, args.len())?,
            }
            interp.stack.pop_number()
        })
    }

    /// Create an instance of `template` with numeric constructor arguments.
    ///
    /// The caller owns the returned reference and gives it back with
    /// [`release_owned`](Self::release_owned).
    pub fn new_object(&mut self, template: TemplateId, args: &[f64]) -> ExecResult<OwnedObject> {
        let symbol = self
            .objects
            .template(template)
            .map(|template| template.symbol)
            .ok_or_else(|| not_a_template(&format!("template {}", template.raw())))?;
        self.with_boundary("new", |interp| {
            for &arg in args {
                interp.stack.push_number(arg)?;
            }
            interp.construct(symbol, args.len())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Tests can panic")]
mod tests {
    use super::*;
    use crate::print_handler::silent_handler;
    use hoc_ir::{CodeBuilder, Opcode};
    use pretty_assertions::assert_eq;

    fn quiet() -> Interpreter {
        Interpreter::with_config(crate::config::VmConfig::for_mode(
            crate::config::ExecMode::Embedded,
        ))
        .with_print_handler(silent_handler())
    }

    #[test]
    fn sweep_restores_stack_depth() {
        let mut interp = quiet();
        let mut b = CodeBuilder::new();
        b.op(Opcode::PushZero)
            .op(Opcode::PushZero)
            .op(Opcode::PushZero)
            .op(Opcode::Div)
            .stop();
        let err = interp.run(b.finish().unwrap()).err().map(|e| e.message);
        assert_eq!(err.as_deref(), Some("division by zero"));
        assert_eq!(interp.stack_depth(), 0);
        assert_eq!(interp.frame_depth(), 0);
    }

    #[test]
    fn sweep_is_idempotent() {
        let mut interp = quiet();
        interp.stack.push_number(1.0).unwrap();
        interp.returning = Returning::Break;
        let boundary = Boundary {
            stack_len: 0,
            frame_len: 0,
            context: None,
            object_stack_len: 0,
            outermost: true,
        };
        interp.recover_to(&boundary);
        assert_eq!(interp.stack_depth(), 0);
        assert_eq!(interp.returning(), Returning::Running);
        interp.recover_to(&boundary);
        assert_eq!(interp.stack_depth(), 0);
        assert_eq!(interp.returning(), Returning::Running);
    }

    #[test]
    fn nested_boundary_keeps_a_pending_stop() {
        let mut interp = quiet();
        interp.boundary_depth = 1;
        interp.returning = Returning::Stop;
        let boundary = interp.boundary();
        assert!(!boundary.outermost);
        interp.recover_to(&boundary);
        assert_eq!(interp.returning(), Returning::Stop);
    }

    #[test]
    fn status_reports_faults() {
        let mut interp = quiet();
        let mut ok = CodeBuilder::new();
        ok.op(Opcode::PushZero).op(Opcode::Pop).stop();
        assert_eq!(interp.run_status(ok.finish().unwrap()), 0);

        let mut bad = CodeBuilder::new();
        bad.op(Opcode::Pop).stop();
        assert_eq!(interp.run_status(bad.finish().unwrap()), 1);
        assert_eq!(interp.stack_depth(), 0);
    }
}
