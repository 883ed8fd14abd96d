//! Symbols and scopes.
//!
//! Every name the engine knows about is a [`Symbol`] in one arena owned by
//! the [`SymbolTable`]. Bytecode refers to symbols by [`SymbolId`]; ids stay
//! valid for the life of the interpreter, even after a symbol is deleted.
//!
//! # Scopes
//!
//! - Builtin: math functions, constants and host functions
//! - Top: names declared at the prompt or in loaded files
//! - Template: members of one template, one scope per template
//! - Local: arguments and autos of a procedure being defined
//!
//! Lookup order is locals, then the active scope, then builtins.
//!
//! # Storage
//!
//! Data-bearing symbols (`Var` with data storage, `Str`, `ObjectVar`) hold an
//! `oboff` into a dataspace. Top-level and builtin symbols index the top-level
//! dataspace; template members index the dataspace of the object whose
//! context is active.

mod arrayinfo;
mod table;

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use hoc_ir::{Code, SymbolId, TemplateId};

use crate::object::NativeFn;

pub use arrayinfo::Arrayinfo;
pub use table::{Scope, ScopeId, ScopeKind, SymbolTable};

/// Flavour of a user-defined procedure.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ProcKind {
    Procedure,
    Function,
    /// `obfunc`: returns an object reference.
    ObjFunction,
    Iterator,
}

impl ProcKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcKind::Procedure => "proc",
            ProcKind::Function => "func",
            ProcKind::ObjFunction => "obfunc",
            ProcKind::Iterator => "iterator",
        }
    }
}

/// A procedure, function, obfunc or iterator.
#[derive(Clone, Debug)]
pub struct ProcDef {
    pub kind: ProcKind,
    /// `None` until the body is defined; calling it then is an error.
    pub body: Option<Rc<Code>>,
    /// Local slots, including the trailing `nobjauto` object slots.
    pub nauto: usize,
    pub nobjauto: usize,
}

/// A host-computed scalar.
pub struct HostProperty {
    pub get: Box<dyn Fn() -> f64>,
    pub set: Box<dyn Fn(f64)>,
}

/// Storage owned by the host rather than a dataspace.
///
/// Cells are shared with the host, which reads and writes them between
/// statements.
#[derive(Clone)]
pub enum HostVar {
    Double(Rc<[Cell<f64>]>),
    /// Assignments store `trunc(x + epsilon)`.
    Int(Rc<[Cell<i32>]>),
    Float(Rc<[Cell<f32>]>),
    Property(Rc<HostProperty>),
}

impl HostVar {
    /// Number of addressable elements.
    pub fn len(&self) -> usize {
        match self {
            HostVar::Double(cells) => cells.len(),
            HostVar::Int(cells) => cells.len(),
            HostVar::Float(cells) => cells.len(),
            HostVar::Property(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where a numeric variable lives.
#[derive(Clone)]
pub enum VarStorage {
    Data { oboff: usize },
    Host(HostVar),
}

/// Discriminated symbol kind.
#[derive(Clone)]
pub enum SymbolKind {
    /// Declared by use but never given a value.
    Undef,
    /// Numeric constant.
    Number(f64),
    /// String constant.
    ConstString(Rc<str>),
    Var(VarStorage),
    /// `strdef`.
    Str { oboff: usize },
    /// `objref`.
    ObjectVar { oboff: usize },
    /// Procedure-local number, slot relative to the frame's autos.
    Auto { slot: usize },
    /// `localobj`, slot relative to the frame's autos.
    AutoObject { slot: usize },
    Proc(ProcDef),
    /// One-argument math function.
    Builtin(fn(f64) -> f64),
    /// Host function with access to the call frame.
    NativeFunction(NativeFn),
    /// Method of a native class; index into the class's method table.
    NativeMethod { index: usize },
    /// Property of a native class; index into the class's property table.
    NativeProperty { index: usize },
    Template(TemplateId),
}

impl SymbolKind {
    /// Human readable kind, used in messages and traversal output.
    pub fn kind_name(&self) -> &'static str {
        match self {
            SymbolKind::Undef => "undefined",
            SymbolKind::Number(_) => "number",
            SymbolKind::ConstString(_) => "string constant",
            SymbolKind::Var(VarStorage::Data { .. }) => "variable",
            SymbolKind::Var(VarStorage::Host(HostVar::Double(_))) => "host double",
            SymbolKind::Var(VarStorage::Host(HostVar::Int(_))) => "host int",
            SymbolKind::Var(VarStorage::Host(HostVar::Float(_))) => "host float",
            SymbolKind::Var(VarStorage::Host(HostVar::Property(_))) => "host property",
            SymbolKind::Str { .. } => "strdef",
            SymbolKind::ObjectVar { .. } => "objref",
            SymbolKind::Auto { .. } => "local",
            SymbolKind::AutoObject { .. } => "localobj",
            SymbolKind::Proc(def) => def.kind.as_str(),
            SymbolKind::Builtin(_) => "built-in function",
            SymbolKind::NativeFunction(_) => "native function",
            SymbolKind::NativeMethod { .. } => "native method",
            SymbolKind::NativeProperty { .. } => "native property",
            SymbolKind::Template(_) => "template",
        }
    }

    /// Dataspace slot of a data-bearing symbol.
    pub fn oboff(&self) -> Option<usize> {
        match self {
            SymbolKind::Var(VarStorage::Data { oboff })
            | SymbolKind::Str { oboff }
            | SymbolKind::ObjectVar { oboff } => Some(*oboff),
            _ => None,
        }
    }
}

impl fmt::Debug for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolKind::Number(value) => write!(f, "Number({value})"),
            SymbolKind::ConstString(text) => write!(f, "ConstString({text:?})"),
            SymbolKind::Proc(def) => write!(f, "Proc({})", def.kind.as_str()),
            SymbolKind::Template(id) => write!(f, "Template({id:?})"),
            other => f.write_str(other.kind_name()),
        }
    }
}

/// Visibility of a template member.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    Private,
    /// Listed in the template's `public` statement.
    Public,
    /// Declared `external`: stands for the top-level symbol `target` and runs
    /// in the top-level context.
    External { target: SymbolId },
}

/// A named entry in some scope.
#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: Rc<str>,
    pub kind: SymbolKind,
    pub visibility: Visibility,
    /// Declared shape. For dataspace members this is the shape new objects
    /// start with; live shapes are kept per data slot.
    pub shape: Option<Rc<Arrayinfo>>,
    /// Created implicitly by first use; only such symbols may be deleted.
    pub on_the_fly: bool,
    pub scope: ScopeId,
}

impl Symbol {
    pub fn is_public(&self) -> bool {
        matches!(self.visibility, Visibility::Public)
    }

    /// Top-level symbol this one stands for, if declared `external`.
    pub fn external_target(&self) -> Option<SymbolId> {
        match self.visibility {
            Visibility::External { target } => Some(target),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]
mod tests;
