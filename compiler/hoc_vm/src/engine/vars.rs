//! Variables, strings and declarations executed at run time.

use std::rc::Rc;

use hoc_ir::SymbolId;

use crate::dataspace::{DataSlot, SlotValue};
use crate::errors::{
    assign_non_variable, evaluate_non_variable, not_an_objref, undefined_function, ExecError,
    ExecResult,
};
use crate::interpreter::{CellUse, Interpreter};
use crate::stack::StackEntry;
use crate::symbol::{Arrayinfo, SymbolKind, VarStorage};

use super::arith::op_assign;

/// What a reallocated data slot holds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Storage {
    Numbers,
    Objects,
}

impl Interpreter {
    pub(super) fn const_push(&mut self, sym: SymbolId) -> ExecResult<()> {
        let symbol = self.symbols.symbol(sym)?;
        match symbol.kind {
            SymbolKind::Number(value) => self.stack.push_number(value),
            _ => Err(evaluate_non_variable(&symbol.name)),
        }
    }

    pub(super) fn push_string(&mut self, sym: SymbolId) -> ExecResult<()> {
        let text = self.str_ref(sym)?;
        self.stack.push(StackEntry::Str(text))
    }

    /// Replace the symbol on top with its value, popping any subscripts.
    pub(super) fn eval(&mut self) -> ExecResult<()> {
        let sym = self.stack.pop_symbol()?;
        let sym = self.resolve_external(sym);
        if let SymbolKind::Number(value) = self.symbols.symbol(sym)?.kind {
            return self.stack.push_number(value);
        }
        let cell = self.var_cell(sym, CellUse::Read)?;
        let value = self.read_number(&cell)?;
        self.stack.push_number(value)
    }

    /// `&x`: replace the symbol on top with a pointer to its cell.
    pub(super) fn eval_pointer(&mut self) -> ExecResult<()> {
        let sym = self.stack.pop_symbol()?;
        let cell = self.var_cell(sym, CellUse::Pointer)?;
        self.stack.push(StackEntry::Var(cell))
    }

    /// `x op= value` with the stack holding `[subscripts.., value, x]`.
    /// The assigned value is left on the stack.
    pub(super) fn assign(&mut self, op: i32) -> ExecResult<()> {
        let sym = self.stack.pop_symbol()?;
        let mut value = self.stack.pop_number()?;
        let cell = self.var_cell(sym, CellUse::Write)?;
        if op != 0 {
            value = op_assign(op, self.read_number(&cell)?, value)?;
        }
        self.write_number(&cell, value)?;
        self.stack.push_number(value)
    }

    /// Copy the string on top into the string cell below it.
    pub(super) fn assign_str(&mut self) -> ExecResult<()> {
        let source = self.stack.pop_str()?;
        let target = self.stack.pop_str()?;
        let text = self.read_str(&source)?;
        self.write_str(&target, &text)
    }

    pub(super) fn builtin(&mut self, sym: SymbolId) -> ExecResult<()> {
        let symbol = self.symbols.symbol(sym)?;
        let name = Rc::clone(&symbol.name);
        let SymbolKind::Builtin(f) = symbol.kind else {
            return Err(undefined_function(&name));
        };
        self.apply_builtin(f, &name)
    }

    /// Remove a symbol created on the fly. Anything else only warns.
    pub(super) fn delete_symbol(&mut self, sym: SymbolId) -> ExecResult<()> {
        let symbol = self.symbols.symbol(sym)?;
        let name = Rc::clone(&symbol.name);
        if matches!(symbol.kind, SymbolKind::Undef) {
            self.warning(&name, "no such variable");
            return Ok(());
        }
        if !symbol.on_the_fly {
            self.warning(&name, "can't be deleted");
            return Ok(());
        }
        if let (Some(oboff), true) = (symbol.kind.oboff(), symbol.scope.is_global()) {
            if let Some(slot) = self.top_data.slot_mut(oboff) {
                *slot = DataSlot::default();
            }
        }
        self.symbols.remove(sym);
        tracing::debug!(name = %name, "deleted symbol");
        Ok(())
    }

    /// `double x[n]...` executed at run time: the symbol is on top with
    /// the `nsub` sizes below it.
    pub(super) fn array_install(&mut self, nsub: usize) -> ExecResult<()> {
        let sym = self.stack.pop_symbol()?;
        let name = self.symbols.name(sym);
        let sizes = self.stack.pop_numbers(nsub)?;
        let shape = Arrayinfo::from_sizes(&name, &sizes, self.config.epsilon)?;
        self.reallocate(sym, Some(Rc::new(shape)), Storage::Numbers)
    }

    /// `objref x[n]...` executed at run time, sizes on the stack. Every
    /// element the old declaration held is released.
    pub(super) fn objvar_decl(&mut self, sym: SymbolId, nsub: usize) -> ExecResult<()> {
        let name = self.symbols.name(sym);
        let shape = if nsub == 0 {
            None
        } else {
            let sizes = self.stack.pop_numbers(nsub)?;
            Some(Rc::new(Arrayinfo::from_sizes(&name, &sizes, self.config.epsilon)?))
        };
        self.reallocate(sym, shape, Storage::Objects)
    }

    /// Give `sym` fresh zeroed storage of `shape` in the current context,
    /// converting an undefined top-level symbol to the requested kind.
    fn reallocate(
        &mut self,
        sym: SymbolId,
        shape: Option<Rc<Arrayinfo>>,
        storage: Storage,
    ) -> ExecResult<()> {
        let symbol = self.symbols.symbol(sym)?;
        let name = Rc::clone(&symbol.name);
        let scope = symbol.scope;
        let existing = match (&symbol.kind, storage) {
            (SymbolKind::Var(VarStorage::Data { oboff }), Storage::Numbers)
            | (SymbolKind::ObjectVar { oboff }, Storage::Objects) => Some(*oboff),
            (SymbolKind::Var(VarStorage::Data { oboff }), Storage::Objects)
                if scope.is_global() =>
            {
                Some(*oboff)
            }
            (SymbolKind::Undef, _) if scope.is_global() => None,
            (_, Storage::Numbers) => return Err(assign_non_variable(&name)),
            (_, Storage::Objects) => return Err(not_an_objref(&name)),
        };
        let oboff = existing.unwrap_or_else(|| self.top_data.grow());
        let symbol = self.symbols.symbol_mut(sym)?;
        symbol.kind = match storage {
            Storage::Numbers => SymbolKind::Var(VarStorage::Data { oboff }),
            Storage::Objects => SymbolKind::ObjectVar { oboff },
        };
        symbol.shape.clone_from(&shape);

        let total = shape.as_ref().map_or(1, |shape| shape.total());
        let value = match storage {
            Storage::Numbers => SlotValue::Numbers(vec![0.0; total]),
            Storage::Objects => SlotValue::Objects(vec![None; total]),
        };
        let space = self.space_for(scope, &name)?;
        let data = self.dataspace_mut(space)?;
        data.ensure(oboff);
        let previous = data
            .slot_mut(oboff)
            .map(|slot| std::mem::replace(slot, DataSlot { value, shape }));

        let mut first_error: Option<ExecError> = None;
        if let Some(SlotValue::Objects(objects)) = previous.map(|slot| slot.value) {
            for held in objects.into_iter().flatten() {
                if let Err(err) = self.release(Some(held)) {
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
