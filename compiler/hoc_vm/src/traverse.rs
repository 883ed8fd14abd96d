//! What a checkpoint writer sees of the interpreter.
//!
//! [`Interpreter::traverse`] walks the builtin scope, the top-level scope and
//! every template (members, then live instances) in a fixed order and hands
//! out dense ids in that order. Two traversals of the same state produce the
//! same ids, so a checkpoint can refer to symbols and objects by number.
//!
//! Procedure bodies travel as [`EncodedBody`] values whose symbol operands
//! are scope-qualified names:
//!
//! | Scope        | Name                          |
//! |--------------|-------------------------------|
//! | builtin, top | `name`                        |
//! | template     | `Template.name`               |
//! | local        | `%a<slot>.name` / `%o<slot>.name` |
//!
//! Decoding installs fresh local symbols, so a decoded body never shares
//! locals with another procedure.

use std::rc::Rc;

use hoc_ir::{
    opcode_table_digest, Code, CodeError, EncodedBody, ObjectId, SymbolId, TableDigest, TemplateId,
};
use rustc_hash::FxHashMap;

use crate::dataspace::{DataSlot, SlotValue};
use crate::errors::{definition_error, undefined_function, ExecError, ExecResult};
use crate::interpreter::{Interpreter, LocalLayout};
use crate::stack::{OwnedObject, Space};
use crate::symbol::{Arrayinfo, ScopeId, ScopeKind, SymbolKind, VarStorage};

/// One symbol as seen by a traversal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolInfo {
    /// Traversal id.
    pub id: u32,
    pub symbol: SymbolId,
    pub name: Rc<str>,
    pub kind: &'static str,
    /// Declared dimensions; empty for scalars.
    pub dims: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Traversal id.
    pub id: u32,
    pub object: ObjectId,
    pub index: usize,
    pub refcount: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateInfo {
    pub template: TemplateId,
    pub name: Rc<str>,
    pub members: Vec<SymbolInfo>,
    /// Live instances in creation order.
    pub instances: Vec<ObjectInfo>,
}

/// A deterministic walk of the interpreter's names and objects.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Traversal {
    pub builtins: Vec<SymbolInfo>,
    pub top: Vec<SymbolInfo>,
    pub templates: Vec<TemplateInfo>,
    symbol_ids: FxHashMap<SymbolId, u32>,
    object_ids: FxHashMap<ObjectId, u32>,
}

impl Traversal {
    pub fn symbol_id(&self, sym: SymbolId) -> Option<u32> {
        self.symbol_ids.get(&sym).copied()
    }

    pub fn object_id(&self, object: ObjectId) -> Option<u32> {
        self.object_ids.get(&object).copied()
    }

    /// Number of objects visited.
    pub fn object_count(&self) -> usize {
        self.object_ids.len()
    }
}

/// Contents of one data slot.
#[derive(Clone, Debug, PartialEq)]
pub enum DataValue {
    Numbers { dims: Vec<usize>, values: Vec<f64> },
    Str(String),
    Objects {
        dims: Vec<usize>,
        objects: Vec<Option<ObjectId>>,
    },
}

/// Storage of a data symbol; `data_location` has already rejected the rest.
#[derive(Copy, Clone)]
enum Stored {
    Numbers,
    Str,
    Objects,
}

fn dims_of(shape: Option<&Arrayinfo>) -> Vec<usize> {
    shape.map(|shape| shape.dims().to_vec()).unwrap_or_default()
}

fn image_error(message: String) -> CodeError {
    CodeError::Image(message)
}

impl Interpreter {
    /// Walk builtins, top-level symbols and templates in declaration order.
    pub fn traverse(&self) -> Traversal {
        let mut traversal = Traversal::default();
        traversal.builtins = self.visit_scope(ScopeId::BUILTIN, &mut traversal.symbol_ids);
        traversal.top = self.visit_scope(ScopeId::TOP, &mut traversal.symbol_ids);

        for template in self.objects.templates() {
            let members = self.visit_scope(template.scope, &mut traversal.symbol_ids);
            let mut instances = Vec::with_capacity(template.objects.len());
            for &object in &template.objects {
                let Some(live) = self.objects.get(object) else {
                    continue;
                };
                let id = u32::try_from(traversal.object_ids.len()).unwrap_or(u32::MAX);
                traversal.object_ids.insert(object, id);
                instances.push(ObjectInfo {
                    id,
                    object,
                    index: live.index,
                    refcount: live.refcount,
                });
            }
            traversal.templates.push(TemplateInfo {
                template: template.id,
                name: Rc::clone(&template.name),
                members,
                instances,
            });
        }
        tracing::debug!(
            symbols = traversal.symbol_ids.len(),
            objects = traversal.object_ids.len(),
            "traverse"
        );
        traversal
    }

    fn visit_scope(&self, scope: ScopeId, ids: &mut FxHashMap<SymbolId, u32>) -> Vec<SymbolInfo> {
        self.symbols
            .scope_symbols(scope)
            .iter()
            .filter_map(|&sym| {
                let symbol = self.symbols.get(sym)?;
                let id = u32::try_from(ids.len()).unwrap_or(u32::MAX);
                ids.insert(sym, id);
                Some(SymbolInfo {
                    id,
                    symbol: sym,
                    name: Rc::clone(&symbol.name),
                    kind: symbol.kind.kind_name(),
                    dims: dims_of(symbol.shape.as_deref()),
                })
            })
            .collect()
    }

    /// Digest of the opcode table and the builtin names and kinds. Images
    /// and checkpoints are only exchanged between engines with equal digests.
    pub fn builtin_digest(&self) -> TableDigest {
        let mut builder = TableDigest::builder();
        builder.text(&opcode_table_digest().to_string());
        for &sym in self.symbols.scope_symbols(ScopeId::BUILTIN) {
            if let Some(symbol) = self.symbols.get(sym) {
                builder.text(&symbol.name).text(symbol.kind.kind_name());
            }
        }
        builder.finish()
    }

    /// Dataspace and slot of data symbol `sym` in `owner` (top level when
    /// `None`).
    fn data_location(&self, owner: Option<ObjectId>, sym: SymbolId) -> ExecResult<(Space, usize)> {
        let symbol = self.symbols.symbol(sym)?;
        let oboff = symbol
            .kind
            .oboff()
            .ok_or_else(|| definition_error(&symbol.name, "has no data"))?;
        let space = match owner {
            None if symbol.scope.is_global() => Space::Top,
            Some(object)
                if self.objects.template_of(object).map(|t| t.scope) == Some(symbol.scope) =>
            {
                Space::Object(object)
            }
            _ => {
                return Err(definition_error(
                    &symbol.name,
                    "is not a member of that dataspace",
                ))
            }
        };
        Ok((space, oboff))
    }

    /// Read the whole slot of `sym` with its live shape.
    pub fn read_data(&self, owner: Option<ObjectId>, sym: SymbolId) -> ExecResult<DataValue> {
        let (space, oboff) = self.data_location(owner, sym)?;
        let slot = self
            .dataspace(space)?
            .slot(oboff)
            .ok_or_else(|| definition_error(&self.symbols.name(sym), "has no storage"))?;
        let dims = dims_of(slot.shape.as_deref());
        match &slot.value {
            SlotValue::Numbers(values) => Ok(DataValue::Numbers {
                dims,
                values: values.clone(),
            }),
            SlotValue::Str(text) => Ok(DataValue::Str(text.clone())),
            SlotValue::Objects(objects) => Ok(DataValue::Objects {
                dims,
                objects: objects.clone(),
            }),
            SlotValue::Empty => Err(definition_error(&self.symbols.name(sym), "has no storage")),
        }
    }

    /// Replace the slot of `sym`. The value must match the symbol's kind and
    /// its element count must match `dims`; the slot takes the new shape.
    /// Object references are counted: new ones retained, old ones released.
    pub fn write_data(&mut self, owner: Option<ObjectId>, sym: SymbolId, value: DataValue) -> ExecResult<()> {
        let (space, oboff) = self.data_location(owner, sym)?;
        let symbol = self.symbols.symbol(sym)?;
        let name = Rc::clone(&symbol.name);
        let kind_name = symbol.kind.kind_name();
        let stored = match symbol.kind {
            SymbolKind::Var(VarStorage::Data { .. }) => Stored::Numbers,
            SymbolKind::Str { .. } => Stored::Str,
            _ => Stored::Objects,
        };
        let shape_of = |dims: &[usize], len: usize| -> ExecResult<Option<Rc<Arrayinfo>>> {
            let shape = if dims.is_empty() {
                None
            } else {
                Some(Rc::new(Arrayinfo::from_dims(&name, dims)?))
            };
            if shape.as_ref().map_or(1, |shape| shape.total()) != len {
                return Err(definition_error(&name, "value does not match its shape"));
            }
            Ok(shape)
        };
        let slot = match (stored, value) {
            (Stored::Numbers, DataValue::Numbers { dims, values }) => DataSlot {
                shape: shape_of(&dims, values.len())?,
                value: SlotValue::Numbers(values),
            },
            (Stored::Str, DataValue::Str(text)) => DataSlot {
                shape: None,
                value: SlotValue::Str(text),
            },
            (Stored::Objects, DataValue::Objects { dims, objects }) => {
                let shape = shape_of(&dims, objects.len())?;
                for (n, &object) in objects.iter().enumerate() {
                    if let Err(err) = self.retain(object).map(OwnedObject::into_raw) {
                        for &done in &objects[..n] {
                            self.release(done)?;
                        }
                        return Err(err);
                    }
                }
                DataSlot {
                    shape,
                    value: SlotValue::Objects(objects),
                }
            }
            _ => {
                return Err(definition_error(
                    &name,
                    format!("value does not fit a {kind_name}"),
                ))
            }
        };

        let data = self.dataspace_mut(space)?;
        data.ensure(oboff);
        let previous = data
            .slot_mut(oboff)
            .map(|target| std::mem::replace(target, slot));
        if let Some(SlotValue::Objects(objects)) = previous.map(|slot| slot.value) {
            let mut first_error: Option<ExecError> = None;
            for held in objects.into_iter().flatten() {
                if let Err(err) = self.release(Some(held)) {
                    first_error.get_or_insert(err);
                }
            }
            if let Some(err) = first_error {
                return Err(err);
            }
        }
        Ok(())
    }

    /// Body of a defined procedure.
    pub fn procedure_body(&self, sym: SymbolId) -> Option<Rc<Code>> {
        match &self.symbols.get(sym)?.kind {
            SymbolKind::Proc(def) => def.body.clone(),
            _ => None,
        }
    }

    /// Scope-qualified name of a symbol operand.
    fn qualified_name(&self, sym: SymbolId) -> Option<String> {
        let symbol = self.symbols.get(sym)?;
        let scope = self.symbols.scope(symbol.scope)?;
        let name = match (scope.kind, &symbol.kind) {
            (ScopeKind::Builtin | ScopeKind::Top, _) => symbol.name.to_string(),
            (ScopeKind::Template(tid), _) => {
                format!("{}.{}", self.objects.template(tid)?.name, symbol.name)
            }
            (ScopeKind::Local, SymbolKind::Auto { slot }) => format!("%a{slot}.{}", symbol.name),
            (ScopeKind::Local, SymbolKind::AutoObject { slot }) => {
                format!("%o{slot}.{}", symbol.name)
            }
            (ScopeKind::Local, _) => return None,
        };
        Some(name)
    }

    /// Encode the body of procedure `sym`.
    pub fn encode_procedure(&self, sym: SymbolId) -> ExecResult<EncodedBody> {
        let body = self
            .procedure_body(sym)
            .ok_or_else(|| undefined_function(&self.symbols.name(sym)))?;
        Ok(EncodedBody::from_code(&body, |operand| self.qualified_name(operand))?)
    }

    /// Give procedure `sym` the body decoded from `image`, keeping its local
    /// layout. Names resolve against the current symbol table.
    pub fn decode_procedure(&mut self, sym: SymbolId, image: &EncodedBody) -> ExecResult<()> {
        let layout = match &self.symbols.symbol(sym)?.kind {
            SymbolKind::Proc(def) => LocalLayout {
                nauto: def.nauto,
                nobjauto: def.nobjauto,
            },
            _ => return Err(definition_error(&self.symbols.name(sym), "not a procedure")),
        };
        let mut locals: Option<ScopeId> = None;
        let code = image.to_code(|qualified| self.resolve_qualified(qualified, &mut locals))?;
        self.define_procedure(sym, code, layout)
    }

    fn resolve_qualified(
        &mut self,
        qualified: &str,
        locals: &mut Option<ScopeId>,
    ) -> Result<SymbolId, CodeError> {
        let unknown = || image_error(format!("unknown symbol {qualified}"));
        if let Some(local) = qualified.strip_prefix('%') {
            let (head, name) = local.split_once('.').ok_or_else(unknown)?;
            let (object, slot) = match head.split_at_checked(1) {
                Some(("a", slot)) => (false, slot),
                Some(("o", slot)) => (true, slot),
                _ => return Err(unknown()),
            };
            let slot: usize = slot.parse().map_err(|_| unknown())?;
            let scope = *locals.get_or_insert_with(|| self.symbols.new_scope(ScopeKind::Local));
            if let Some(existing) = self.symbols.lookup_in(name, scope) {
                return Ok(existing);
            }
            let kind = if object {
                SymbolKind::AutoObject { slot }
            } else {
                SymbolKind::Auto { slot }
            };
            return self
                .symbols
                .install(name, kind, scope)
                .map_err(|err| image_error(err.message));
        }
        if let Some((template, member)) = qualified.split_once('.') {
            let scope = self
                .symbols
                .lookup_in(template, ScopeId::TOP)
                .and_then(|sym| match self.symbols.get(sym)?.kind {
                    SymbolKind::Template(tid) => self.objects.template(tid).map(|t| t.scope),
                    _ => None,
                })
                .ok_or_else(unknown)?;
            return self.symbols.lookup_in(member, scope).ok_or_else(unknown);
        }
        self.symbols
            .lookup_in(qualified, ScopeId::TOP)
            .or_else(|| self.symbols.lookup_in(qualified, ScopeId::BUILTIN))
            .ok_or_else(unknown)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]
mod tests {
    use super::*;
    use hoc_ir::{CodeBuilder, Opcode};
    use pretty_assertions::assert_eq;

    use crate::symbol::ProcKind;

    #[test]
    fn traversal_ids_are_stable() {
        let mut interp = Interpreter::new();
        interp.declare_var("x", &[]).unwrap();
        interp.declare_var("v", &[3]).unwrap();
        let first = interp.traverse();
        let second = interp.traverse();
        assert_eq!(first, second);
        let v = interp.lookup("v").unwrap();
        let entry = first.top.iter().find(|s| s.symbol == v).unwrap();
        assert_eq!(entry.dims, vec![3]);
        assert_eq!(first.symbol_id(v), Some(entry.id));
    }

    #[test]
    fn builtin_digest_ignores_user_symbols() {
        let mut interp = Interpreter::new();
        let before = interp.builtin_digest();
        interp.declare_var("y", &[]).unwrap();
        assert_eq!(interp.builtin_digest(), before);
        interp.install_constant("TAU", std::f64::consts::TAU).unwrap();
        assert_ne!(interp.builtin_digest(), before);
    }

    #[test]
    fn write_data_takes_the_new_shape() {
        let mut interp = Interpreter::new();
        let v = interp.declare_var("v", &[2]).unwrap();
        interp
            .write_data(
                None,
                v,
                DataValue::Numbers {
                    dims: vec![2, 2],
                    values: vec![1.0, 2.0, 3.0, 4.0],
                },
            )
            .unwrap();
        assert_eq!(
            interp.read_data(None, v).unwrap(),
            DataValue::Numbers {
                dims: vec![2, 2],
                values: vec![1.0, 2.0, 3.0, 4.0],
            }
        );

        let err = interp
            .write_data(
                None,
                v,
                DataValue::Numbers {
                    dims: vec![3],
                    values: vec![1.0],
                },
            )
            .err()
            .map(|e| e.message);
        assert_eq!(err.as_deref(), Some("v: value does not match its shape"));
    }

    #[test]
    fn procedure_survives_encode_and_decode() {
        let mut interp = Interpreter::new();
        let x = interp.declare_var("x", &[]).unwrap();
        let f = interp.declare_proc("setx", ProcKind::Procedure).unwrap();
        interp.begin_locals();
        let a = interp.declare_auto("a").unwrap();
        let layout = interp.end_locals().unwrap();

        let mut b = CodeBuilder::new();
        b.op(Opcode::PushZero)
            .op(Opcode::VarPush)
            .sym(a)
            .op(Opcode::Assign)
            .int(0)
            .op(Opcode::Pop)
            .op(Opcode::ConstPush)
            .sym(interp.lookup("PI").unwrap())
            .op(Opcode::VarPush)
            .sym(x)
            .op(Opcode::Assign)
            .int(0)
            .op(Opcode::Pop)
            .op(Opcode::ProcRet)
            .stop();
        interp.define_procedure(f, b.finish().unwrap(), layout).unwrap();

        let image = interp.encode_procedure(f).unwrap();
        assert!(image.symbols.contains(&"%a0.a".to_string()));
        let bytes = image.to_bytes().unwrap();
        let decoded = EncodedBody::from_bytes(&bytes).unwrap();
        interp.decode_procedure(f, &decoded).unwrap();

        let mut call = CodeBuilder::new();
        call.op(Opcode::Call).sym(f).int(0).op(Opcode::Pop).stop();
        interp.run(call.finish().unwrap()).unwrap();
        assert_eq!(interp.number_value(x), Some(std::f64::consts::PI));
    }
}
