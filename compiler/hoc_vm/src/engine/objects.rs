//! Object references, `new`, `T[i]` and member dispatch.
//!
//! `obj.member` is compiled to `ObjectComponent` with the object operand
//! below the member's subscripts or call arguments. Dispatch consults the
//! object's aliases first, then the public members of its template through
//! the per-site [`MemberCache`].
//!
//! A data member yields a cell inside the object. When the object operand is
//! a temporary its reference is parked in the defer pool rather than
//! released, so the cell stays valid for the rest of the statement.

use std::rc::Rc;

use hoc_ir::{Code, ComponentFlags, MemberCache, ObjectId, SymbolId};

use crate::errors::{
    alias_subscripted, cannot_assign_lhs, cannot_push_member, dead_object, function_not_array,
    indexed_call, invalid_assign_operator, iterator_outside_for, not_a_template, not_an_iterator,
    not_double_pointer, not_public_member, null_object, object_id_missing, objref_arg_required,
    stack_overflow, string_member_indexed, type_mismatch, undefined_function,
    wrong_subscript_count, ExecResult,
};
use crate::frame::IterContext;
use crate::interpreter::Interpreter;
use crate::object::Alias;
use crate::stack::{CellRef, OwnedObject, Space, StackEntry, StrRef};
use crate::symbol::{ProcKind, SymbolKind, VarStorage};

use super::arith::op_assign;
use super::{Flow, Operand};

impl Interpreter {
    /// Push an owned temporary, releasing it if the stack is full.
    pub(crate) fn push_temp(&mut self, owned: OwnedObject) -> ExecResult<()> {
        if self.stack.len() >= self.stack.capacity() {
            self.release_owned(owned)?;
            return Err(stack_overflow(self.stack.capacity()));
        }
        self.stack.push(StackEntry::ObjTemp(owned))
    }

    /// `T[i]`: the live instance of template `sym` with index `i`.
    pub(super) fn const_object(&mut self, sym: SymbolId) -> ExecResult<()> {
        let symbol = self.symbols.symbol(sym)?;
        let name = Rc::clone(&symbol.name);
        let SymbolKind::Template(tid) = symbol.kind else {
            return Err(not_a_template(&name));
        };
        let value = self.stack.pop_number()? + self.config.epsilon;
        #[allow(
            clippy::cast_possible_truncation,
            reason = "object indices are small integers"
        )]
        let index = value.floor() as i64;
        let id = usize::try_from(index)
            .ok()
            .and_then(|index| self.objects.find_by_index(tid, index))
            .ok_or_else(|| object_id_missing(&name, index))?;
        let owned = self.retain(Some(id))?;
        self.push_temp(owned)
    }

    /// `x = new T(args)`: construct and store into the object cell below
    /// the arguments, which stays on the stack as the expression's value.
    pub(super) fn new_object_assign(&mut self, sym: SymbolId, narg: usize) -> ExecResult<()> {
        let owned = self.construct(sym, narg)?;
        let target = match self.stack.peek(0) {
            Ok(StackEntry::ObjCell(cell)) => Ok(cell.clone()),
            Ok(StackEntry::ObjTemp(_)) => Err(objref_arg_required()),
            Ok(other) => Err(type_mismatch("object", other.tag())),
            Err(err) => Err(err),
        };
        match target {
            Ok(cell) => self.store_object(&cell, owned),
            Err(err) => {
                self.release_owned(owned)?;
                Err(err)
            }
        }
    }

    /// Object `depth` entries below the top; null is a fault naming `name`.
    fn object_operand_at(&self, depth: usize, name: &str) -> ExecResult<ObjectId> {
        let id = match self.stack.peek(depth)? {
            StackEntry::ObjCell(cell) => self.read_object(cell)?,
            StackEntry::ObjTemp(owned) => owned.id(),
            other => return Err(type_mismatch("object", other.tag())),
        };
        id.ok_or_else(|| null_object(name))
    }

    /// Public member `name` of the template of `obj`.
    fn resolve_member(&self, obj: ObjectId, name: &str, cache: &MemberCache) -> ExecResult<SymbolId> {
        let tid = self.objects.get(obj).ok_or_else(dead_object)?.template;
        if let Some(member) = cache.lookup(tid) {
            return Ok(member);
        }
        let template = self.objects.template(tid).ok_or_else(dead_object)?;
        let member = self
            .symbols
            .lookup_in(name, template.scope)
            .filter(|sym| self.symbols.get(*sym).is_some_and(|s| s.is_public()))
            .ok_or_else(|| not_public_member(name, &template.name))?;
        cache.store(tid, member);
        Ok(member)
    }

    /// Pop an object operand and release it if it was a temporary.
    fn drop_object_operand(&mut self) -> ExecResult<()> {
        let (_, owned) = self.pop_object_operand()?;
        match owned {
            Some(owned) => self.release_owned(owned),
            None => Ok(()),
        }
    }

    /// `ObjectComponent [member, nindex, narg, cache, flags]`.
    pub(super) fn object_component(&mut self, code: &Rc<Code>, pos: usize) -> ExecResult<()> {
        let name = self.symbols.name(code.symbol_at(pos + 1)?);
        let nindex = code.count_at(pos + 2)?;
        let narg = code.count_at(pos + 3)?;
        let cache = code.cache_at(pos + 4)?;
        let flags = ComponentFlags::from_bits_truncate(
            u32::try_from(code.int_at(pos + 5)?).unwrap_or_default(),
        );
        let call = narg > 0 || flags.contains(ComponentFlags::CALL);

        if nindex > 0 && narg > 0 {
            return Err(indexed_call(&name));
        }
        let depth = if nindex > 0 {
            if !matches!(self.stack.peek(0)?, StackEntry::Ndim(_)) {
                self.stack.push(StackEntry::Ndim(nindex))?;
            }
            nindex + 1
        } else {
            narg
        };
        let obj = self.object_operand_at(depth, &name)?;

        let alias = self
            .objects
            .get(obj)
            .and_then(|object| object.aliases.get(&*name).cloned());
        if let Some(alias) = alias {
            return self.push_alias(alias, &name, nindex, call);
        }

        let member = self.resolve_member(obj, &name, cache)?;
        let kind = self.symbols.symbol(member)?.kind.clone();
        match kind {
            SymbolKind::ObjectVar { oboff } | SymbolKind::Var(VarStorage::Data { oboff }) => {
                if call {
                    return Err(undefined_function(&name));
                }
                let space = Space::Object(obj);
                let shape = self
                    .dataspace(space)?
                    .slot(oboff)
                    .and_then(|slot| slot.shape.clone());
                if shape.as_ref().map_or(0, |shape| shape.nsub()) != nindex {
                    return Err(wrong_subscript_count(&name));
                }
                let index = self.pop_subscripts(shape.as_deref(), &name)?;
                self.pop_object_deferred()?;
                let cell = CellRef::Data {
                    space,
                    slot: oboff,
                    index,
                };
                let entry = if matches!(kind, SymbolKind::ObjectVar { .. }) {
                    StackEntry::ObjCell(cell)
                } else {
                    StackEntry::Var(cell)
                };
                self.stack.push(entry)
            }
            SymbolKind::Str { oboff } => {
                if nindex > 0 || call {
                    return Err(string_member_indexed(&name));
                }
                self.pop_object_deferred()?;
                self.stack.push(StackEntry::Str(StrRef::Slot {
                    space: Space::Object(obj),
                    slot: oboff,
                }))
            }
            SymbolKind::NativeProperty { .. } => {
                if nindex > 0 {
                    return Err(wrong_subscript_count(&name));
                }
                if call {
                    return Err(undefined_function(&name));
                }
                self.pop_object_deferred()?;
                self.stack.push(StackEntry::Var(CellRef::Native {
                    object: obj,
                    member,
                }))
            }
            SymbolKind::Proc(def) if def.kind == ProcKind::Iterator => {
                Err(iterator_outside_for(&name))
            }
            SymbolKind::Proc(_) | SymbolKind::NativeMethod { .. } => {
                if nindex > 0 {
                    return Err(function_not_array(&name, nindex));
                }
                self.call_in_object(obj, member, narg)?;
                let result = self.stack.pop()?;
                if let Err(err) = self.drop_object_operand() {
                    self.release_entry(result)?;
                    return Err(err);
                }
                self.stack.push(result)
            }
            _ => Err(cannot_push_member(&name)),
        }
    }

    /// Replace the object operand with what alias `name` stands for.
    fn push_alias(&mut self, alias: Alias, name: &str, nindex: usize, call: bool) -> ExecResult<()> {
        if nindex > 0 {
            return Err(alias_subscripted(name));
        }
        if call {
            return Err(undefined_function(name));
        }
        match alias {
            Alias::Object(target) => {
                let owned = self.retain(Some(target))?;
                if let Err(err) = self.pop_object_deferred() {
                    self.release_owned(owned)?;
                    return Err(err);
                }
                self.push_temp(owned)
            }
            Alias::Number(cell) => {
                self.pop_object_deferred()?;
                self.stack.push(StackEntry::Var(cell))
            }
        }
    }

    /// `for obj.iter(args) stmt`:
    /// `ObjectIter [member, narg, cache, stmt_begin, stmt_end]`.
    pub(super) fn object_iterator(&mut self, code: &Rc<Code>, pos: usize) -> ExecResult<Flow> {
        let name = self.symbols.name(code.symbol_at(pos + 1)?);
        let narg = code.count_at(pos + 2)?;
        let cache = code.cache_at(pos + 3)?;
        let stmt_begin = code.target_at(pos + 4)?;
        let end = code.target_at(pos + 5)?;

        let obj = self.object_operand_at(narg, &name)?;
        let member = self.resolve_member(obj, &name, cache)?;
        if !matches!(&self.symbols.symbol(member)?.kind, SymbolKind::Proc(def) if def.kind == ProcKind::Iterator)
        {
            return Err(not_an_iterator(&name));
        }
        let iter = IterContext {
            code: Rc::clone(code),
            stmt_begin,
            caller: self.frames.len().checked_sub(1),
            object: self.context,
        };
        self.with_object_context(Some(obj), |scoped| {
            scoped.call_procedure(member, narg, Some(iter))
        })?;
        self.drop_object_operand()?;
        Ok(Flow::Jump(end))
    }

    /// Dereference a member pointer into its value.
    pub(super) fn object_eval(&mut self) -> ExecResult<()> {
        match self.operand_at(0)? {
            Operand::Number => Ok(()),
            Operand::Pointer => {
                let cell = self.stack.pop_var()?;
                let value = self.read_number(&cell)?;
                self.stack.push_number(value)
            }
            _ => Err(type_mismatch("number", self.stack.peek(0)?.tag())),
        }
    }

    /// `&obj.x`: the member access must have produced a numeric cell.
    pub(super) fn object_pointer(&mut self) -> ExecResult<()> {
        if self.operand_at(0)? == Operand::Pointer {
            Ok(())
        } else {
            Err(not_double_pointer())
        }
    }

    /// Assignment through a member access, dispatched on the target left
    /// below the value.
    pub(super) fn object_assign(&mut self, op: i32) -> ExecResult<()> {
        match self.operand_at(1)? {
            Operand::Pointer => {
                let mut value = self.stack.pop_number()?;
                let cell = self.stack.pop_var()?;
                if op != 0 {
                    value = op_assign(op, self.read_number(&cell)?, value)?;
                }
                self.write_number(&cell, value)?;
                self.stack.push_number(value)
            }
            Operand::Object => {
                if op != 0 {
                    return Err(invalid_assign_operator("object"));
                }
                let (id, owned) = self.pop_object_operand()?;
                let owned = match owned {
                    Some(owned) => owned,
                    None => self.retain(id)?,
                };
                self.new_reference_into_target(owned)
            }
            Operand::Str => {
                if op != 0 {
                    return Err(invalid_assign_operator("string"));
                }
                let source = self.stack.pop_str()?;
                let text = self.read_str(&source)?;
                let target = self.stack.pop_str()?;
                self.write_str(&target, &text)?;
                self.stack.push(StackEntry::Str(target))
            }
            Operand::Number | Operand::Other => Err(cannot_assign_lhs()),
        }
    }

    /// Store `owned` in the object cell on top, which stays on the stack.
    fn new_reference_into_target(&mut self, owned: OwnedObject) -> ExecResult<()> {
        let target = match self.stack.peek(0) {
            Ok(StackEntry::ObjCell(cell)) => Ok(cell.clone()),
            Ok(_) => Err(objref_arg_required()),
            Err(err) => Err(err),
        };
        match target {
            Ok(cell) => self.store_object(&cell, owned),
            Err(err) => {
                self.release_owned(owned)?;
                Err(err)
            }
        }
    }
}
