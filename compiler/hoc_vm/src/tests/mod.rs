//! Engine scenario tests.
//!
//! Each file drives the interpreter through bytecode built with
//! `CodeBuilder`, the way a front end would, and checks the observable
//! state afterwards: stack depth, reference counts, variable values.

mod call_tests;
mod object_tests;

use hoc_ir::{Code, CodeBuilder};

use crate::config::{ExecMode, VmConfig};
use crate::interpreter::Interpreter;
use crate::print_handler::silent_handler;

/// An interpreter that reports faults only through return values.
pub(crate) fn quiet() -> Interpreter {
    Interpreter::with_config(VmConfig::for_mode(ExecMode::Embedded)).with_print_handler(silent_handler())
}

/// Finish a body built by `build`.
#[allow(clippy::expect_used, reason = "Tests can panic")]
pub(crate) fn code(build: impl FnOnce(&mut CodeBuilder)) -> Code {
    let mut b = CodeBuilder::new();
    build(&mut b);
    b.finish().expect("test bytecode is well formed")
}
