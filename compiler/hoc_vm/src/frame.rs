//! The call-frame stack.
//!
//! A frame records where a call's arguments and autos live on the evaluation
//! stack, never copies of them. Arguments sit just below `auto_base`; the
//! frame's own autos follow, with the trailing `nobjauto` slots holding
//! `localobj` references.
//!
//! Iterator frames also carry the statement that `iterator_statement`
//! runs: the caller's body, where the statement starts, and the caller's
//! object context and frame.

use std::rc::Rc;

use hoc_ir::{Code, ObjectId, SymbolId};

use crate::errors::{call_nested_too_deeply, ExecResult};
use crate::stack::OwnedObject;

/// Value stored by `funcret` or `hocobjret`, pushed once the frame is gone.
#[derive(Debug)]
pub enum ReturnValue {
    Number(f64),
    Object(OwnedObject),
}

/// Statement context of an iterator call.
#[derive(Clone, Debug)]
pub struct IterContext {
    /// Body holding the statement.
    pub code: Rc<Code>,
    pub stmt_begin: usize,
    /// Frame of the code that wrote the `for` statement; `None` at top level.
    pub caller: Option<usize>,
    /// Object context the statement runs in.
    pub object: Option<ObjectId>,
}

#[derive(Debug)]
pub struct Frame {
    pub symbol: SymbolId,
    pub nargs: usize,
    /// Stack index of `$1`.
    pub args_base: usize,
    /// Stack index of the first auto.
    pub auto_base: usize,
    pub nauto: usize,
    pub nobjauto: usize,
    /// Object the call runs in.
    pub object: Option<ObjectId>,
    pub iter: Option<IterContext>,
    pub result: Option<ReturnValue>,
    /// Execution frame of an iterator statement: it shares the caller's
    /// arguments and autos and owns none of them.
    pub borrowed_window: bool,
}

impl Frame {
    /// A frame for `narg` arguments ending at `stack_len`, with no autos yet.
    pub fn new(symbol: SymbolId, nargs: usize, stack_len: usize, object: Option<ObjectId>) -> Self {
        Frame {
            symbol,
            nargs,
            args_base: stack_len.saturating_sub(nargs),
            auto_base: stack_len,
            nauto: 0,
            nobjauto: 0,
            object,
            iter: None,
            result: None,
            borrowed_window: false,
        }
    }

    /// Stack index of argument `i` (1-based), if the call has one.
    #[inline]
    pub fn arg_index(&self, i: usize) -> Option<usize> {
        (i >= 1 && i <= self.nargs).then(|| self.args_base + i - 1)
    }

    /// Stack index of auto slot `slot`.
    #[inline]
    pub fn auto_index(&self, slot: usize) -> Option<usize> {
        (slot < self.nauto).then(|| self.auto_base + slot)
    }

    /// Stack indices of the `localobj` slots, outermost first.
    pub fn objauto_range(&self) -> std::ops::Range<usize> {
        let end = self.auto_base + self.nauto;
        end.saturating_sub(self.nobjauto)..end
    }
}

/// Fixed-capacity frame stack.
#[derive(Debug)]
pub struct FrameStack {
    frames: Vec<Frame>,
    capacity: usize,
}

impl FrameStack {
    pub fn with_capacity(capacity: usize) -> Self {
        FrameStack {
            frames: Vec::new(),
            capacity,
        }
    }

    /// Push a frame, failing with "call nested too deeply" at capacity.
    pub fn push(&mut self, frame: Frame, name: &str) -> ExecResult<usize> {
        if self.frames.len() >= self.capacity {
            return Err(call_nested_too_deeply(name));
        }
        tracing::trace!(depth = self.frames.len(), name, "push frame");
        self.frames.push(frame);
        Ok(self.frames.len() - 1)
    }

    pub fn pop(&mut self) -> Option<Frame> {
        let frame = self.frames.pop();
        if frame.is_some() {
            tracing::trace!(depth = self.frames.len(), "pop frame");
        }
        frame
    }

    #[inline]
    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    #[inline]
    pub fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames innermost first.
    pub fn iter_innermost(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter().rev()
    }
}
