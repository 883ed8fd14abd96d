//! hoc VM - stack machine and object runtime for the hoc interpreter.
//!
//! This crate executes the bytecode described by `hoc_ir`. A front end (or
//! a host embedding the engine) populates the symbol table through the
//! declaration API on [`Interpreter`], builds procedure bodies with
//! `hoc_ir::CodeBuilder`, and hands top-level code to [`Interpreter::run`].
//!
//! # Architecture
//!
//! - `symbol`: the symbol arena, scopes and array shapes
//! - `dataspace`: per-object and top-level storage
//! - `stack` / `frame`: the tagged evaluation stack and the call frames
//! - `object`: templates, instances, aliases and native classes
//! - `interpreter`: the interpreter context, calls, lifetimes, declarations
//! - `engine`: one handler per opcode and the dispatch loop
//! - `recovery`: execution boundaries and the fault sweep
//! - `traverse`: the read/write surface used by checkpoint writers
//!
//! # Faults
//!
//! Every fault is an [`ExecError`] propagated with `?`. The innermost
//! execution boundary (`run`, `obj_run`, `call_function`, ...) releases the
//! stack entries and frames pushed since it was entered, restores the object
//! context, and returns the error with a short call backtrace attached.

pub mod config;
pub mod dataspace;
pub mod diagnostics;
mod engine;
pub mod errors;
pub mod format;
pub mod frame;
pub mod interpreter;
pub mod object;
mod print_handler;
mod recovery;
pub mod stack;
mod stack_guard;
pub mod symbol;
pub mod traverse;

pub use config::{ExecMode, FaultPolicy, VmConfig};
pub use diagnostics::ExecCounters;
pub use errors::{BacktraceFrame, ExecBacktrace, ExecError, ExecErrorKind, ExecResult};
pub use interpreter::{
    Interpreter, InterruptHandle, LocalLayout, NativeCtx, ObjectContextGuard, Returning,
};
pub use object::{Alias, NativeClass, NativeClassBuilder, NativeReturn, ReturnKind};
pub use print_handler::{
    buffer_handler, silent_handler, stdout_handler, BufferPrintHandler, PrintHandlerImpl,
    SharedPrintHandler, StdoutPrintHandler,
};
pub use stack::OwnedObject;
pub use stack_guard::ensure_sufficient_stack;
pub use symbol::{HostProperty, HostVar, ProcKind, SymbolKind, Visibility};
pub use traverse::{DataValue, ObjectInfo, SymbolInfo, TemplateInfo, Traversal};

// Identifiers and bytecode come from hoc_ir; re-exported so hosts need one
// dependency.
pub use hoc_ir::{Code, CodeBuilder, ObjectId, Opcode, SymbolId, TemplateId};

#[cfg(test)]
mod tests;
