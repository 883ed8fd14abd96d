//! The interpreter context.
//!
//! All engine state lives in one [`Interpreter`] value: the symbol table,
//! the top-level dataspace, the object arena, the evaluation and frame
//! stacks, the active object context and the `returning` signal. Nothing is
//! process-global except the interrupt flag, which hosts may set from
//! another thread through an [`InterruptHandle`].
//!
//! # Module layout
//!
//! - `cells`: resolving symbols to storage cells, reading and writing them
//! - `calls`: procedure, function and native calls, object construction
//! - `lifetime`: `retain`/`release`, destruction, the deferred-unref pool
//! - `define`: the declaration API used by front ends
//! - `context_guard`: RAII switch of the active object
//! - `native_ctx`: the view native callbacks get of their call
//!
//! The opcode handlers live in `crate::engine`; boundaries and the recovery
//! sweep in `crate::recovery`; checkpoint traversal in `crate::traverse`.

mod calls;
mod cells;
mod context_guard;
mod define;
mod lifetime;
mod native_ctx;

pub use context_guard::ObjectContextGuard;
pub use define::LocalLayout;
pub use native_ctx::NativeCtx;

pub(crate) use cells::CellUse;
pub(crate) use lifetime::DeferPool;

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hoc_ir::{ObjectId, SymbolId, TemplateId};

use crate::config::VmConfig;
use crate::dataspace::{Dataspace, SlotValue};
use crate::diagnostics::ExecCounters;
use crate::frame::FrameStack;
use crate::object::ObjectArena;
use crate::print_handler::{stdout_handler, SharedPrintHandler};
use crate::stack::Stack;
use crate::symbol::{ScopeId, SymbolKind, SymbolTable};

/// Pending control transfer, checked after every instruction.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Returning {
    #[default]
    Running,
    Return,
    Break,
    Continue,
    /// Unwind every loop and call up to the outermost boundary.
    Stop,
}

impl Returning {
    /// Legacy numeric code: 0 running, 1 return, 2 break, 3 continue, 4 stop.
    pub fn code(self) -> u8 {
        match self {
            Returning::Running => 0,
            Returning::Return => 1,
            Returning::Break => 2,
            Returning::Continue => 3,
            Returning::Stop => 4,
        }
    }
}

/// Cross-thread handle that asks the engine to stop at the next instruction.
#[derive(Clone, Debug, Default)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Read and clear the flag.
    pub(crate) fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Declaration state of the front end: the template being defined and the
/// locals of the procedure being defined.
#[derive(Debug, Default)]
pub(crate) struct DefinitionState {
    /// Templates between `begin_template` and `end_template`, innermost last.
    pub(crate) templates: Vec<TemplateId>,
    /// Names listed as `public` in each open template.
    pub(crate) public_names: Vec<Vec<Rc<str>>>,
    pub(crate) locals: Option<ScopeId>,
}

/// The hoc virtual machine.
pub struct Interpreter {
    pub(crate) config: VmConfig,
    pub(crate) symbols: SymbolTable,
    pub(crate) top_data: Dataspace,
    pub(crate) objects: ObjectArena,
    pub(crate) stack: Stack,
    pub(crate) frames: FrameStack,
    /// Active object; `None` at top level.
    pub(crate) context: Option<ObjectId>,
    pub(crate) returning: Returning,
    pub(crate) defer: DeferPool,
    pub(crate) print: SharedPrintHandler,
    pub(crate) interrupt: InterruptHandle,
    pub(crate) counters: Option<ExecCounters>,
    /// Number of boundaries currently open.
    pub(crate) boundary_depth: usize,
    /// Contexts saved by `object_push`.
    pub(crate) object_stack: Vec<Option<ObjectId>>,
    pub(crate) definition: DefinitionState,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// An interpreter with the default configuration, printing to stdout.
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        let mut interp = Interpreter {
            stack: Stack::with_capacity(config.stack_capacity),
            frames: FrameStack::with_capacity(config.frame_capacity),
            defer: DeferPool::new(config.defer_slots),
            config,
            symbols: SymbolTable::new(),
            top_data: Dataspace::default(),
            objects: ObjectArena::new(),
            context: None,
            returning: Returning::Running,
            print: stdout_handler(),
            interrupt: InterruptHandle::default(),
            counters: None,
            boundary_depth: 0,
            object_stack: Vec::new(),
            definition: DefinitionState::default(),
        };
        interp.install_standard_builtins();
        interp
    }

    /// Replace the output sink.
    #[must_use]
    pub fn with_print_handler(mut self, handler: SharedPrintHandler) -> Self {
        self.print = handler;
        self
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn print_handler(&self) -> &SharedPrintHandler {
        &self.print
    }

    /// A handle other threads can use to interrupt execution.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    pub fn enable_counters(&mut self) {
        self.counters.get_or_insert_with(ExecCounters::default);
    }

    pub fn counters(&self) -> Option<&ExecCounters> {
        self.counters.as_ref()
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn objects(&self) -> &ObjectArena {
        &self.objects
    }

    /// Current evaluation stack depth.
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Current call-frame depth.
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn returning(&self) -> Returning {
        self.returning
    }

    /// The active object context.
    pub fn this_object(&self) -> Option<ObjectId> {
        self.context
    }

    /// Number of live objects.
    pub fn live_objects(&self) -> usize {
        self.objects.live_count()
    }

    /// Reference count of a live object.
    pub fn refcount(&self, id: ObjectId) -> Option<u32> {
        self.objects.get(id).map(|object| object.refcount)
    }

    pub fn is_live(&self, id: ObjectId) -> bool {
        self.objects.is_live(id)
    }

    /// `T[i]` or `NULLobject`.
    pub fn object_name(&self, id: Option<ObjectId>) -> String {
        self.objects.object_name(id)
    }

    /// Top-level or builtin symbol by name.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.symbols.lookup(name, None, ScopeId::TOP)
    }

    /// Value of a scalar top-level variable.
    pub fn number_value(&self, sym: SymbolId) -> Option<f64> {
        let symbol = self.symbols.get(sym)?;
        match &symbol.kind {
            SymbolKind::Number(value) => Some(*value),
            kind => match &self.top_data.slot(kind.oboff()?)?.value {
                SlotValue::Numbers(values) => values.first().copied(),
                _ => None,
            },
        }
    }

    /// Object held by element `index` of a top-level objref.
    pub fn object_value(&self, sym: SymbolId, index: usize) -> Option<ObjectId> {
        let oboff = self.symbols.get(sym)?.kind.oboff()?;
        match &self.top_data.slot(oboff)?.value {
            SlotValue::Objects(objects) => objects.get(index).copied().flatten(),
            _ => None,
        }
    }

    /// Text of a top-level `strdef`.
    pub fn string_value(&self, sym: SymbolId) -> Option<String> {
        let oboff = self.symbols.get(sym)?.kind.oboff()?;
        match &self.top_data.slot(oboff)?.value {
            SlotValue::Str(text) => Some(text.clone()),
            _ => None,
        }
    }

    /// Template by name.
    pub fn template_named(&self, name: &str) -> Option<TemplateId> {
        let sym = self.symbols.lookup_in(name, ScopeId::TOP)?;
        match self.symbols.get(sym)?.kind {
            SymbolKind::Template(id) => Some(id),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn count(&mut self, f: impl FnOnce(&mut ExecCounters)) {
        if let Some(counters) = self.counters.as_mut() {
            f(counters);
        }
    }

    /// Print a warning the way faults are printed, without faulting.
    pub(crate) fn warning(&self, name: &str, message: &str) {
        tracing::warn!(name, message, "hoc warning");
        if self.config.mode.shows_messages() {
            eprintln!("hoc: {name} {message}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_handle_is_shared() {
        let interp = Interpreter::new();
        let handle = interp.interrupt_handle();
        handle.set();
        assert!(interp.interrupt.take());
        assert!(!handle.is_set());
    }

    #[test]
    fn returning_codes_match_legacy_values() {
        let codes: Vec<u8> = [
            Returning::Running,
            Returning::Return,
            Returning::Break,
            Returning::Continue,
            Returning::Stop,
        ]
        .iter()
        .map(|r| r.code())
        .collect();
        assert_eq!(codes, vec![0, 1, 2, 3, 4]);
    }
}
