//! The evaluation stack.
//!
//! Entries are tagged; every typed pop checks the tag and faults with both
//! the expected and the actual tag on mismatch. A failed typed pop leaves the
//! entry in place, so an owned temporary is never dropped on the floor by a
//! type error: the recovery sweep still finds and releases it.
//!
//! # Object entries
//!
//! - `ObjCell` points at a permanent storage cell and owns nothing
//! - `ObjTemp` owns exactly one reference, released once when the entry is
//!   consumed or swept
//! - `LocalObject` is a frame's `localobj` slot and owns its reference until
//!   the frame returns
//! - `Released` replaces an owned entry whose reference was moved out

use std::rc::Rc;

use hoc_ir::{ObjectId, SymbolId};
use smallvec::SmallVec;

use crate::errors::{stack_overflow, stack_underflow, type_mismatch, ExecResult};

/// Which dataspace a cell lives in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Space {
    Top,
    Object(ObjectId),
}

/// Address of one numeric or object storage cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CellRef {
    /// Element `index` of dataspace slot `slot`.
    Data {
        space: Space,
        slot: usize,
        index: usize,
    },
    /// An absolute stack position (autos, arguments, `localobj` slots).
    Stack(usize),
    /// Element `index` of a host-owned variable.
    Host { symbol: SymbolId, index: usize },
    /// A property of a native object, read and written through the class.
    Native { object: ObjectId, member: SymbolId },
}

impl CellRef {
    /// The cell `delta` elements further on, for `$&1[i]` style access.
    ///
    /// Bounds are checked when the cell is read or written.
    pub fn offset(&self, delta: usize) -> Option<CellRef> {
        if delta == 0 {
            return Some(self.clone());
        }
        match self {
            CellRef::Data { space, slot, index } => Some(CellRef::Data {
                space: *space,
                slot: *slot,
                index: index.checked_add(delta)?,
            }),
            CellRef::Host { symbol, index } => Some(CellRef::Host {
                symbol: *symbol,
                index: index.checked_add(delta)?,
            }),
            CellRef::Stack(_) | CellRef::Native { .. } => None,
        }
    }
}

/// A string operand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StrRef {
    /// An assignable `strdef` slot.
    Slot { space: Space, slot: usize },
    /// A constant or computed string.
    Value(Rc<str>),
}

/// One counted object reference, moved rather than copied.
///
/// Dropping an `OwnedObject` without handing it to
/// `Interpreter::release_owned` leaks the reference, so every construction
/// site moves it into a stack entry, a storage cell, or a release. Debug
/// builds assert on such a drop; `into_raw` is the explicit way out.
#[must_use = "an owned reference must be stored or released"]
#[derive(Debug, PartialEq, Eq)]
pub struct OwnedObject(Option<ObjectId>);

impl OwnedObject {
    /// Take ownership of one reference the caller already counted.
    #[inline]
    pub(crate) fn adopt(id: Option<ObjectId>) -> Self {
        OwnedObject(id)
    }

    /// The null reference, which owns nothing.
    #[inline]
    pub fn null() -> Self {
        OwnedObject(None)
    }

    #[inline]
    pub fn id(&self) -> Option<ObjectId> {
        self.0
    }

    /// Give up the handle, leaving the counted reference with the caller.
    #[inline]
    pub fn into_raw(mut self) -> Option<ObjectId> {
        self.0.take()
    }
}

impl Drop for OwnedObject {
    fn drop(&mut self) {
        debug_assert!(
            self.0.is_none() || std::thread::panicking(),
            "owned reference to {:?} dropped without a release",
            self.0
        );
    }
}

/// A tagged stack entry.
#[derive(Debug, PartialEq)]
pub enum StackEntry {
    Number(f64),
    Symbol(SymbolId),
    /// Number of subscripts pushed before it.
    Ndim(usize),
    /// Pointer to a numeric cell.
    Var(CellRef),
    Str(StrRef),
    ObjCell(CellRef),
    ObjTemp(OwnedObject),
    LocalObject(Option<ObjectId>),
    Released,
}

impl StackEntry {
    /// Tag name used in type-mismatch messages.
    pub fn tag(&self) -> &'static str {
        match self {
            StackEntry::Number(_) => "number",
            StackEntry::Symbol(_) => "symbol",
            StackEntry::Ndim(_) => "dimension count",
            StackEntry::Var(_) => "pointer",
            StackEntry::Str(_) => "string",
            StackEntry::ObjCell(_) => "object reference",
            StackEntry::ObjTemp(_) => "temporary object",
            StackEntry::LocalObject(_) => "local object",
            StackEntry::Released => "released object",
        }
    }

    /// Whether the entry is an object operand (cell or temporary).
    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, StackEntry::ObjCell(_) | StackEntry::ObjTemp(_))
    }
}

/// Fixed-capacity evaluation stack.
#[derive(Debug)]
pub struct Stack {
    entries: Vec<StackEntry>,
    capacity: usize,
}

impl Stack {
    pub fn with_capacity(capacity: usize) -> Self {
        Stack {
            entries: Vec::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn entries(&self) -> &[StackEntry] {
        &self.entries
    }

    #[inline]
    pub fn push(&mut self, entry: StackEntry) -> ExecResult<()> {
        if self.entries.len() >= self.capacity {
            return Err(stack_overflow(self.capacity));
        }
        self.entries.push(entry);
        Ok(())
    }

    #[inline]
    pub fn push_number(&mut self, value: f64) -> ExecResult<()> {
        self.push(StackEntry::Number(value))
    }

    /// Pop whatever is on top.
    #[inline]
    pub fn pop(&mut self) -> ExecResult<StackEntry> {
        self.entries.pop().ok_or_else(stack_underflow)
    }

    pub fn pop_number(&mut self) -> ExecResult<f64> {
        match self.entries.last() {
            Some(StackEntry::Number(value)) => {
                let value = *value;
                self.entries.pop();
                Ok(value)
            }
            Some(other) => Err(type_mismatch("number", other.tag())),
            None => Err(stack_underflow()),
        }
    }

    pub fn pop_symbol(&mut self) -> ExecResult<SymbolId> {
        match self.entries.last() {
            Some(StackEntry::Symbol(symbol)) => {
                let symbol = *symbol;
                self.entries.pop();
                Ok(symbol)
            }
            Some(other) => Err(type_mismatch("symbol", other.tag())),
            None => Err(stack_underflow()),
        }
    }

    pub fn pop_var(&mut self) -> ExecResult<CellRef> {
        match self.entries.last() {
            Some(StackEntry::Var(_)) => match self.entries.pop() {
                Some(StackEntry::Var(cell)) => Ok(cell),
                _ => Err(stack_underflow()),
            },
            Some(other) => Err(type_mismatch("pointer", other.tag())),
            None => Err(stack_underflow()),
        }
    }

    pub fn pop_str(&mut self) -> ExecResult<StrRef> {
        match self.entries.last() {
            Some(StackEntry::Str(_)) => match self.entries.pop() {
                Some(StackEntry::Str(text)) => Ok(text),
                _ => Err(stack_underflow()),
            },
            Some(other) => Err(type_mismatch("string", other.tag())),
            None => Err(stack_underflow()),
        }
    }

    /// Pop a dimension marker if one is on top.
    pub fn pop_ndim(&mut self) -> Option<usize> {
        match self.entries.last() {
            Some(StackEntry::Ndim(n)) => {
                let n = *n;
                self.entries.pop();
                Some(n)
            }
            _ => None,
        }
    }

    /// Pop `count` numbers, returned in push order (deepest first).
    pub fn pop_numbers(&mut self, count: usize) -> ExecResult<SmallVec<[f64; 4]>> {
        let mut values: SmallVec<[f64; 4]> = SmallVec::with_capacity(count);
        for _ in 0..count {
            values.push(self.pop_number()?);
        }
        values.reverse();
        Ok(values)
    }

    /// Entry `depth` below the top; depth 0 is the top.
    pub fn peek(&self, depth: usize) -> ExecResult<&StackEntry> {
        self.entries
            .len()
            .checked_sub(depth + 1)
            .and_then(|index| self.entries.get(index))
            .ok_or_else(stack_underflow)
    }

    /// Absolute index of the entry `depth` below the top.
    pub fn index_of_depth(&self, depth: usize) -> ExecResult<usize> {
        self.entries
            .len()
            .checked_sub(depth + 1)
            .ok_or_else(stack_underflow)
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&StackEntry> {
        self.entries.get(index)
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut StackEntry> {
        self.entries.get_mut(index)
    }

    /// Replace the entry at `index`, returning the old one.
    pub fn replace(&mut self, index: usize, entry: StackEntry) -> Option<StackEntry> {
        self.entries
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, entry))
    }

    /// Remove every entry above `len`, innermost first.
    pub fn drain_above(&mut self, len: usize) -> Vec<StackEntry> {
        if len >= self.entries.len() {
            return Vec::new();
        }
        let mut drained: Vec<StackEntry> = self.entries.drain(len..).collect();
        drained.reverse();
        drained
    }
}
