//! The symbol arena and its scopes.

use std::rc::Rc;

use hoc_ir::{SymbolId, TemplateId};
use rustc_hash::FxHashMap;

use super::{Symbol, SymbolKind, Visibility};
use crate::errors::{definition_error, ExecError, ExecResult};

/// Index of a scope in the table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u32);

impl ScopeId {
    pub const BUILTIN: ScopeId = ScopeId(0);
    pub const TOP: ScopeId = ScopeId(1);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Whether symbols of this scope store data in the top-level dataspace.
    #[inline]
    pub fn is_global(self) -> bool {
        self == Self::BUILTIN || self == Self::TOP
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScopeKind {
    Builtin,
    Top,
    Template(TemplateId),
    Local,
}

/// An ordered, append-only list of names.
#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    by_name: FxHashMap<Rc<str>, SymbolId>,
    order: Vec<SymbolId>,
}

impl Scope {
    fn new(kind: ScopeKind) -> Self {
        Scope {
            kind,
            by_name: FxHashMap::default(),
            order: Vec::new(),
        }
    }

    /// Symbols in declaration order.
    pub fn symbols(&self) -> &[SymbolId] {
        &self.order
    }
}

/// Owns every symbol and scope.
#[derive(Debug)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    scopes: Vec<Scope>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// A table holding the empty builtin and top-level scopes.
    pub fn new() -> Self {
        SymbolTable {
            symbols: Vec::new(),
            scopes: vec![Scope::new(ScopeKind::Builtin), Scope::new(ScopeKind::Top)],
        }
    }

    pub fn new_scope(&mut self, kind: ScopeKind) -> ScopeId {
        let id = ScopeId(u32::try_from(self.scopes.len()).unwrap_or(u32::MAX));
        self.scopes.push(Scope::new(kind));
        id
    }

    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id.index())
    }

    /// Symbols of a scope in declaration order; empty for unknown scopes.
    pub fn scope_symbols(&self, id: ScopeId) -> &[SymbolId] {
        self.scope(id).map_or(&[][..], Scope::symbols)
    }

    /// Append a new symbol to `scope`.
    ///
    /// Names are unique within a scope, and a top-level declaration may not
    /// shadow a builtin.
    pub fn install(&mut self, name: &str, kind: SymbolKind, scope: ScopeId) -> ExecResult<SymbolId> {
        if scope == ScopeId::TOP && self.lookup_in(name, ScopeId::BUILTIN).is_some() {
            return Err(definition_error(name, "cannot redeclare a built-in name"));
        }
        if self.lookup_in(name, scope).is_some() {
            return Err(definition_error(name, "already declared in this scope"));
        }
        let Some(list) = self.scopes.get_mut(scope.index()) else {
            return Err(ExecError::new(format!("{name}: no such scope")));
        };
        let id = SymbolId::new(u32::try_from(self.symbols.len()).unwrap_or(u32::MAX));
        let name: Rc<str> = Rc::from(name);
        list.by_name.insert(Rc::clone(&name), id);
        list.order.push(id);
        self.symbols.push(Symbol {
            name,
            kind,
            visibility: Visibility::Private,
            shape: None,
            on_the_fly: false,
            scope,
        });
        Ok(id)
    }

    /// Find `name` in exactly one scope.
    pub fn lookup_in(&self, name: &str, scope: ScopeId) -> Option<SymbolId> {
        self.scope(scope)?.by_name.get(name).copied()
    }

    /// Full lookup: locals, then the active scope, then builtins.
    pub fn lookup(&self, name: &str, locals: Option<ScopeId>, active: ScopeId) -> Option<SymbolId> {
        locals
            .and_then(|scope| self.lookup_in(name, scope))
            .or_else(|| self.lookup_in(name, active))
            .or_else(|| self.lookup_in(name, ScopeId::BUILTIN))
    }

    #[inline]
    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(id.index())
    }

    #[inline]
    pub fn get_mut(&mut self, id: SymbolId) -> Option<&mut Symbol> {
        self.symbols.get_mut(id.index())
    }

    /// Like [`SymbolTable::get`], failing with a fault for stale ids.
    pub fn symbol(&self, id: SymbolId) -> ExecResult<&Symbol> {
        self.get(id)
            .ok_or_else(|| ExecError::new(format!("no symbol with id {}", id.raw())))
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> ExecResult<&mut Symbol> {
        self.symbols
            .get_mut(id.index())
            .ok_or_else(|| ExecError::new(format!("no symbol with id {}", id.raw())))
    }

    /// Name of a symbol, or `?` for stale ids.
    pub fn name(&self, id: SymbolId) -> Rc<str> {
        self.get(id)
            .map_or_else(|| Rc::from("?"), |symbol| Rc::clone(&symbol.name))
    }

    /// Size of the arena, the bound for symbol operands in bytecode.
    #[inline]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Unlink a symbol from its scope and reset it to `Undef`.
    ///
    /// The id stays allocated so bytecode still holding it sees an undefined
    /// symbol rather than a different one.
    pub fn remove(&mut self, id: SymbolId) -> bool {
        let Some(symbol) = self.symbols.get_mut(id.index()) else {
            return false;
        };
        let scope = symbol.scope;
        let name = Rc::clone(&symbol.name);
        symbol.kind = SymbolKind::Undef;
        symbol.shape = None;
        symbol.visibility = Visibility::Private;
        if let Some(list) = self.scopes.get_mut(scope.index()) {
            if list.by_name.get(&name) == Some(&id) {
                list.by_name.remove(&name);
            }
            list.order.retain(|s| *s != id);
            true
        } else {
            false
        }
    }

    /// Unlink every symbol of a scope, as when a procedure's local scope ends.
    pub fn clear_scope(&mut self, scope: ScopeId) {
        let ids: Vec<SymbolId> = self.scope_symbols(scope).to_vec();
        for id in ids {
            self.remove(id);
        }
    }
}
