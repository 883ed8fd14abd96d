//! Resolving symbols to storage cells, and reading and writing cells.
//!
//! A symbol names storage relative to the active context: top-level data
//! lives in the top-level dataspace, template members in the dataspace of the
//! current object, autos in the current frame's stack window and host
//! variables in cells shared with the host. Array subscripts are popped from
//! the evaluation stack when the cell is resolved.

use std::rc::Rc;

use hoc_ir::SymbolId;

use super::Interpreter;
use crate::dataspace::{Dataspace, SlotValue};
use crate::errors::{
    assign_non_variable, dead_object, evaluate_non_variable, integer_iteration_variable,
    loop_non_variable, native_fault, no_object_context, not_a_string, not_an_objref,
    objref_arg_required, pointer_to_non_double, pointer_to_non_variable, read_only_property,
    string_constant_assign, subscript_out_of_range, type_mismatch, undefined_variable,
    wrong_subscript_count, ExecResult,
};
use crate::object::ObjectBody;
use crate::stack::{CellRef, OwnedObject, Space, StackEntry, StrRef};
use crate::symbol::{Arrayinfo, HostVar, ScopeId, SymbolKind, VarStorage};

/// What a resolved numeric cell is going to be used for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum CellUse {
    Read,
    Write,
    /// Iteration variable of a `for` statement.
    Loop,
    /// Target of `&x`.
    Pointer,
}

/// Storage class of a resolved variable, copied out of the symbol so the
/// stack can be popped while resolving.
enum VarTarget {
    Data { scope: ScopeId, oboff: usize },
    Host { shape: Option<Rc<Arrayinfo>>, int: bool, scalar_only: bool },
    Auto { slot: usize },
}

impl Interpreter {
    /// Follow an `external` member to the top-level symbol it stands for.
    pub(crate) fn resolve_external(&self, sym: SymbolId) -> SymbolId {
        self.symbols
            .get(sym)
            .and_then(|symbol| symbol.external_target())
            .unwrap_or(sym)
    }

    pub(crate) fn dataspace(&self, space: Space) -> ExecResult<&Dataspace> {
        match space {
            Space::Top => Ok(&self.top_data),
            Space::Object(id) => self
                .objects
                .get(id)
                .and_then(|object| object.dataspace())
                .ok_or_else(dead_object),
        }
    }

    pub(crate) fn dataspace_mut(&mut self, space: Space) -> ExecResult<&mut Dataspace> {
        match space {
            Space::Top => Ok(&mut self.top_data),
            Space::Object(id) => self
                .objects
                .get_mut(id)
                .and_then(|object| object.dataspace_mut())
                .ok_or_else(dead_object),
        }
    }

    /// Dataspace that symbols of `scope` index in the current context.
    pub(crate) fn space_for(&self, scope: ScopeId, name: &str) -> ExecResult<Space> {
        if scope.is_global() {
            return Ok(Space::Top);
        }
        match self.context {
            Some(id) if self.objects.template_of(id).map(|t| t.scope) == Some(scope) => {
                Ok(Space::Object(id))
            }
            _ => Err(no_object_context(name)),
        }
    }

    /// Pop the subscripts of an access to `shape`, returning the flat index.
    ///
    /// An optional dimension marker on top must match the shape's rank.
    pub(crate) fn pop_subscripts(&mut self, shape: Option<&Arrayinfo>, name: &str) -> ExecResult<usize> {
        let Some(shape) = shape else {
            return Ok(0);
        };
        if let Some(StackEntry::Ndim(n)) = self.stack.entries().last() {
            if *n != shape.nsub() {
                return Err(wrong_subscript_count(name));
            }
            self.stack.pop_ndim();
        }
        let subs = self.stack.pop_numbers(shape.nsub())?;
        shape.flat_index(name, &subs, self.config.epsilon)
    }

    /// Resolve a numeric variable to its cell, popping any subscripts.
    pub(crate) fn var_cell(&mut self, sym: SymbolId, usage: CellUse) -> ExecResult<CellRef> {
        let sym = self.resolve_external(sym);
        let symbol = self.symbols.symbol(sym)?;
        let name = Rc::clone(&symbol.name);
        let target = match &symbol.kind {
            SymbolKind::Undef => return Err(undefined_variable(&name)),
            SymbolKind::Var(VarStorage::Data { oboff }) => VarTarget::Data {
                scope: symbol.scope,
                oboff: *oboff,
            },
            SymbolKind::Var(VarStorage::Host(host)) => VarTarget::Host {
                shape: symbol.shape.clone(),
                int: matches!(host, HostVar::Int(_)),
                scalar_only: !matches!(host, HostVar::Double(_)),
            },
            SymbolKind::Auto { slot } => VarTarget::Auto { slot: *slot },
            _ => {
                return Err(match usage {
                    CellUse::Read => evaluate_non_variable(&name),
                    CellUse::Write => assign_non_variable(&name),
                    CellUse::Loop => loop_non_variable(&name),
                    CellUse::Pointer => pointer_to_non_variable(&name),
                })
            }
        };

        match target {
            VarTarget::Data { scope, oboff } => {
                let space = self.space_for(scope, &name)?;
                let shape = self
                    .dataspace(space)?
                    .slot(oboff)
                    .and_then(|slot| slot.shape.clone());
                let index = self.pop_subscripts(shape.as_deref(), &name)?;
                Ok(CellRef::Data {
                    space,
                    slot: oboff,
                    index,
                })
            }
            VarTarget::Host {
                shape,
                int,
                scalar_only,
            } => {
                if int && usage == CellUse::Loop {
                    return Err(integer_iteration_variable(&name));
                }
                if scalar_only && usage == CellUse::Pointer {
                    return Err(pointer_to_non_double(&name));
                }
                let index = self.pop_subscripts(shape.as_deref(), &name)?;
                Ok(CellRef::Host { symbol: sym, index })
            }
            VarTarget::Auto { slot } => self
                .frames
                .top()
                .and_then(|frame| frame.auto_index(slot))
                .map(CellRef::Stack)
                .ok_or_else(|| undefined_variable(&name)),
        }
    }

    pub(crate) fn read_number(&self, cell: &CellRef) -> ExecResult<f64> {
        match cell {
            CellRef::Data { space, slot, index } => {
                match self.dataspace(*space)?.slot(*slot).map(|s| &s.value) {
                    Some(SlotValue::Numbers(values)) => values
                        .get(*index)
                        .copied()
                        .ok_or_else(|| subscript_out_of_range("pointer")),
                    Some(other) => Err(type_mismatch("number", other.kind_name())),
                    None => Err(subscript_out_of_range("pointer")),
                }
            }
            CellRef::Stack(index) => match self.stack.get(*index) {
                Some(StackEntry::Number(value)) => Ok(*value),
                Some(other) => Err(type_mismatch("number", other.tag())),
                None => Err(subscript_out_of_range("pointer")),
            },
            CellRef::Host { symbol, index } => {
                let symbol = self.symbols.symbol(*symbol)?;
                let out_of_range = || subscript_out_of_range(&symbol.name);
                match &symbol.kind {
                    SymbolKind::Var(VarStorage::Host(host)) => match host {
                        HostVar::Double(cells) => {
                            cells.get(*index).map(std::cell::Cell::get).ok_or_else(out_of_range)
                        }
                        HostVar::Int(cells) => cells
                            .get(*index)
                            .map(|c| f64::from(c.get()))
                            .ok_or_else(out_of_range),
                        HostVar::Float(cells) => cells
                            .get(*index)
                            .map(|c| f64::from(c.get()))
                            .ok_or_else(out_of_range),
                        HostVar::Property(property) => Ok((property.get)()),
                    },
                    _ => Err(undefined_variable(&symbol.name)),
                }
            }
            CellRef::Native { object, member } => {
                let (property, name) = self.native_property(*object, *member)?;
                match self.objects.get(*object).map(|o| &o.body) {
                    Some(ObjectBody::Native(Some(instance))) => (property.get)(&**instance)
                        .ok_or_else(|| native_fault(name.as_ref(), "instance has the wrong type")),
                    Some(_) => Err(native_fault(name.as_ref(), "object is busy")),
                    None => Err(dead_object()),
                }
            }
        }
    }

    pub(crate) fn write_number(&mut self, cell: &CellRef, value: f64) -> ExecResult<()> {
        match cell {
            CellRef::Data { space, slot, index } => {
                match self.dataspace_mut(*space)?.slot_mut(*slot).map(|s| &mut s.value) {
                    Some(SlotValue::Numbers(values)) => {
                        let target = values
                            .get_mut(*index)
                            .ok_or_else(|| subscript_out_of_range("pointer"))?;
                        *target = value;
                        Ok(())
                    }
                    Some(other) => Err(type_mismatch("number", other.kind_name())),
                    None => Err(subscript_out_of_range("pointer")),
                }
            }
            CellRef::Stack(index) => match self.stack.get_mut(*index) {
                Some(entry) if matches!(entry, StackEntry::Number(_)) => {
                    *entry = StackEntry::Number(value);
                    Ok(())
                }
                Some(other) => Err(type_mismatch("number", other.tag())),
                None => Err(subscript_out_of_range("pointer")),
            },
            CellRef::Host { symbol, index } => {
                let epsilon = self.config.epsilon;
                let symbol = self.symbols.symbol(*symbol)?;
                let out_of_range = || subscript_out_of_range(&symbol.name);
                match &symbol.kind {
                    SymbolKind::Var(VarStorage::Host(host)) => match host {
                        HostVar::Double(cells) => {
                            cells.get(*index).ok_or_else(out_of_range)?.set(value);
                        }
                        HostVar::Int(cells) => {
                            #[allow(
                                clippy::cast_possible_truncation,
                                reason = "host ints take the truncated value"
                            )]
                            let stored = (value + epsilon).trunc() as i32;
                            cells.get(*index).ok_or_else(out_of_range)?.set(stored);
                        }
                        HostVar::Float(cells) => {
                            #[allow(
                                clippy::cast_possible_truncation,
                                reason = "host floats are single precision"
                            )]
                            let stored = value as f32;
                            cells.get(*index).ok_or_else(out_of_range)?.set(stored);
                        }
                        HostVar::Property(property) => (property.set)(value),
                    },
                    _ => return Err(undefined_variable(&symbol.name)),
                }
                Ok(())
            }
            CellRef::Native { object, member } => {
                let (property, name) = self.native_property(*object, *member)?;
                let Some(set) = property.set.clone() else {
                    return Err(read_only_property(&name));
                };
                match self.objects.get_mut(*object).map(|o| &mut o.body) {
                    Some(ObjectBody::Native(Some(instance))) => {
                        if set(&mut **instance, value) {
                            Ok(())
                        } else {
                            Err(native_fault(name.as_ref(), "instance has the wrong type"))
                        }
                    }
                    Some(_) => Err(native_fault(name.as_ref(), "object is busy")),
                    None => Err(dead_object()),
                }
            }
        }
    }

    fn native_property(
        &self,
        object: hoc_ir::ObjectId,
        member: SymbolId,
    ) -> ExecResult<(crate::object::NativeProperty, Rc<str>)> {
        let symbol = self.symbols.symbol(member)?;
        let SymbolKind::NativeProperty { index } = symbol.kind else {
            return Err(evaluate_non_variable(&symbol.name));
        };
        self.objects
            .template_of(object)
            .and_then(|template| template.native.as_ref())
            .and_then(|class| class.properties.get(index).cloned())
            .map(|property| (property, Rc::clone(&symbol.name)))
            .ok_or_else(dead_object)
    }

    /// Resolve an `objref` or `localobj` to its cell, popping any subscripts.
    pub(crate) fn object_cell(&mut self, sym: SymbolId) -> ExecResult<CellRef> {
        let sym = self.resolve_external(sym);
        let symbol = self.symbols.symbol(sym)?;
        let name = Rc::clone(&symbol.name);
        match symbol.kind {
            SymbolKind::ObjectVar { oboff } => {
                let space = self.space_for(symbol.scope, &name)?;
                let shape = self
                    .dataspace(space)?
                    .slot(oboff)
                    .and_then(|slot| slot.shape.clone());
                let index = self.pop_subscripts(shape.as_deref(), &name)?;
                Ok(CellRef::Data {
                    space,
                    slot: oboff,
                    index,
                })
            }
            SymbolKind::AutoObject { slot } => self
                .frames
                .top()
                .and_then(|frame| frame.auto_index(slot))
                .map(CellRef::Stack)
                .ok_or_else(|| undefined_variable(&name)),
            _ => Err(not_an_objref(&name)),
        }
    }

    pub(crate) fn read_object(&self, cell: &CellRef) -> ExecResult<Option<hoc_ir::ObjectId>> {
        match cell {
            CellRef::Data { space, slot, index } => {
                match self.dataspace(*space)?.slot(*slot).map(|s| &s.value) {
                    Some(SlotValue::Objects(objects)) => objects
                        .get(*index)
                        .copied()
                        .ok_or_else(|| subscript_out_of_range("objref")),
                    Some(other) => Err(type_mismatch("object", other.kind_name())),
                    None => Err(subscript_out_of_range("objref")),
                }
            }
            CellRef::Stack(index) => match self.stack.get(*index) {
                Some(StackEntry::LocalObject(id)) => Ok(*id),
                Some(StackEntry::ObjTemp(owned)) => Ok(owned.id()),
                Some(StackEntry::ObjCell(inner)) => self.read_object(&inner.clone()),
                Some(other) => Err(type_mismatch("object", other.tag())),
                None => Err(subscript_out_of_range("objref")),
            },
            CellRef::Host { .. } | CellRef::Native { .. } => Err(type_mismatch("object", "pointer")),
        }
    }

    /// Store `owned` in `cell`, releasing the reference it replaces.
    ///
    /// On failure `owned` is released too, so the reference never leaks.
    pub(crate) fn store_object(&mut self, cell: &CellRef, owned: OwnedObject) -> ExecResult<()> {
        let previous = match self.swap_object(cell, owned.id()) {
            Ok(previous) => previous,
            Err(err) => {
                self.release_owned(owned)?;
                return Err(err);
            }
        };
        // The cell now holds the reference.
        let _stored = owned.into_raw();
        self.release(previous)
    }

    fn swap_object(
        &mut self,
        cell: &CellRef,
        id: Option<hoc_ir::ObjectId>,
    ) -> ExecResult<Option<hoc_ir::ObjectId>> {
        match cell {
            CellRef::Data { space, slot, index } => {
                match self.dataspace_mut(*space)?.slot_mut(*slot).map(|s| &mut s.value) {
                    Some(SlotValue::Objects(objects)) => {
                        let target = objects
                            .get_mut(*index)
                            .ok_or_else(|| subscript_out_of_range("objref"))?;
                        Ok(std::mem::replace(target, id))
                    }
                    Some(other) => Err(type_mismatch("object", other.kind_name())),
                    None => Err(subscript_out_of_range("objref")),
                }
            }
            CellRef::Stack(index) => {
                let index = *index;
                match self.stack.get_mut(index) {
                    Some(StackEntry::LocalObject(slot)) => Ok(std::mem::replace(slot, id)),
                    Some(StackEntry::ObjCell(inner)) => {
                        let inner = inner.clone();
                        self.swap_object(&inner, id)
                    }
                    Some(StackEntry::ObjTemp(_)) => Err(objref_arg_required()),
                    Some(other) => Err(type_mismatch("object", other.tag())),
                    None => Err(subscript_out_of_range("objref")),
                }
            }
            CellRef::Host { .. } | CellRef::Native { .. } => Err(type_mismatch("object", "pointer")),
        }
    }

    /// Resolve a `strdef` or string constant.
    pub(crate) fn str_ref(&self, sym: SymbolId) -> ExecResult<StrRef> {
        let sym = self.resolve_external(sym);
        let symbol = self.symbols.symbol(sym)?;
        match &symbol.kind {
            SymbolKind::Str { oboff } => Ok(StrRef::Slot {
                space: self.space_for(symbol.scope, &symbol.name)?,
                slot: *oboff,
            }),
            SymbolKind::ConstString(text) => Ok(StrRef::Value(Rc::clone(text))),
            SymbolKind::Undef => Err(undefined_variable(&symbol.name)),
            _ => Err(not_a_string(&symbol.name)),
        }
    }

    pub(crate) fn read_str(&self, text: &StrRef) -> ExecResult<Rc<str>> {
        match text {
            StrRef::Value(value) => Ok(Rc::clone(value)),
            StrRef::Slot { space, slot } => {
                match self.dataspace(*space)?.slot(*slot).map(|s| &s.value) {
                    Some(SlotValue::Str(value)) => Ok(Rc::from(value.as_str())),
                    Some(other) => Err(type_mismatch("string", other.kind_name())),
                    None => Err(type_mismatch("string", "empty")),
                }
            }
        }
    }

    pub(crate) fn write_str(&mut self, text: &StrRef, value: &str) -> ExecResult<()> {
        match text {
            StrRef::Value(_) => Err(string_constant_assign()),
            StrRef::Slot { space, slot } => {
                match self.dataspace_mut(*space)?.slot_mut(*slot).map(|s| &mut s.value) {
                    Some(SlotValue::Str(target)) => {
                        value.clone_into(target);
                        Ok(())
                    }
                    Some(other) => Err(type_mismatch("string", other.kind_name())),
                    None => Err(type_mismatch("string", "empty")),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_access_pops_no_subscripts() {
        let mut interp = Interpreter::new();
        interp.stack.push_number(7.0).ok();
        assert_eq!(interp.pop_subscripts(None, "x").ok(), Some(0));
        assert_eq!(interp.stack.len(), 1);
    }

    #[test]
    fn dimension_marker_must_match_rank() {
        let mut interp = Interpreter::new();
        let shape = Arrayinfo::from_dims("a", &[2, 3]).ok();
        interp.stack.push_number(1.0).ok();
        interp.stack.push(StackEntry::Ndim(1)).ok();
        let err = interp.pop_subscripts(shape.as_ref(), "a").err().map(|e| e.message);
        assert_eq!(err.as_deref(), Some("a: not right number of subscripts"));
    }

    #[test]
    fn subscripts_select_row_major_element() {
        let mut interp = Interpreter::new();
        let shape = Arrayinfo::from_dims("a", &[2, 3]).ok();
        interp.stack.push_number(1.0).ok();
        interp.stack.push_number(2.0).ok();
        interp.stack.push(StackEntry::Ndim(2)).ok();
        assert_eq!(interp.pop_subscripts(shape.as_ref(), "a").ok(), Some(5));
        assert!(interp.stack.is_empty());
    }

    #[test]
    fn string_constants_are_read_only() {
        let mut interp = Interpreter::new();
        let text = StrRef::Value(Rc::from("abc"));
        assert_eq!(interp.read_str(&text).ok().as_deref(), Some("abc"));
        assert!(interp.write_str(&text, "x").is_err());
    }
}
