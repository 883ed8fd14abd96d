//! Declarations: the API front ends and hosts use to populate the symbol
//! table, define procedures and templates, and register native classes.
//!
//! Declarations go to the innermost open template, or to the top level when
//! no template is open. Top-level data is allocated in the top-level
//! dataspace as soon as it is declared; template members only reserve a slot
//! number, and each object allocates its own storage when constructed.

use std::rc::Rc;

use hoc_ir::{validate, Code, ObjectId, SymbolId, TemplateId};

use super::{Interpreter, NativeCtx};
use crate::dataspace::{DataSlot, SlotValue};
use crate::errors::{
    dead_object, definition_error, native_fault, object_context_overflow,
    object_context_underflow, ExecResult,
};
use crate::object::{Alias, NativeClass};
use crate::stack::{CellRef, Space};
use crate::symbol::{
    Arrayinfo, HostVar, ProcDef, ProcKind, ScopeId, ScopeKind, SymbolKind, VarStorage, Visibility,
};

/// Auto layout of a procedure, returned by [`Interpreter::end_locals`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalLayout {
    pub nauto: usize,
    /// Trailing `localobj` slots, included in `nauto`.
    pub nobjauto: usize,
}

const MATH_BUILTINS: &[(&str, fn(f64) -> f64)] = &[
    ("sin", f64::sin),
    ("cos", f64::cos),
    ("atan", f64::atan),
    ("exp", f64::exp),
    ("log", f64::ln),
    ("log10", f64::log10),
    ("sqrt", f64::sqrt),
    ("abs", f64::abs),
    ("int", f64::trunc),
];

const CONSTANTS: &[(&str, f64)] = &[
    ("PI", std::f64::consts::PI),
    ("E", std::f64::consts::E),
    ("DEG", 57.295_779_513_082_32),
    ("GAMMA", 0.577_215_664_901_532_9),
    ("PHI", 1.618_033_988_749_895),
];

impl Interpreter {
    pub(crate) fn install_standard_builtins(&mut self) {
        let mut installed = Vec::new();
        for &(name, f) in MATH_BUILTINS {
            installed.push(self.install_builtin(name, f));
        }
        for &(name, value) in CONSTANTS {
            installed.push(self.install_constant(name, value));
        }
        installed.push(self.install_native_function("numarg", |ctx: &mut NativeCtx<'_>| {
            #[allow(clippy::cast_precision_loss, reason = "argument counts are small")]
            let count = ctx.caller_nargs()? as f64;
            Ok(count)
        }));
        installed.push(self.install_native_function("argtype", |ctx: &mut NativeCtx<'_>| {
            let index = ctx.number(1)?;
            if index < 1.0 {
                return Ok(-1.0);
            }
            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                reason = "index is at least 1"
            )]
            let index = index as usize;
            ctx.caller_arg_type(index).map(f64::from)
        }));
        for result in installed {
            if let Err(err) = result {
                tracing::error!(error = %err, "built-in installation failed");
            }
        }
    }

    /// A numeric constant in the builtin scope.
    pub fn install_constant(&mut self, name: &str, value: f64) -> ExecResult<SymbolId> {
        self.symbols
            .install(name, SymbolKind::Number(value), ScopeId::BUILTIN)
    }

    /// A string constant in the builtin scope.
    pub fn install_string_constant(&mut self, name: &str, text: &str) -> ExecResult<SymbolId> {
        self.symbols.install(
            name,
            SymbolKind::ConstString(Rc::from(text)),
            ScopeId::BUILTIN,
        )
    }

    /// A one-argument math function.
    pub fn install_builtin(&mut self, name: &str, f: fn(f64) -> f64) -> ExecResult<SymbolId> {
        self.symbols
            .install(name, SymbolKind::Builtin(f), ScopeId::BUILTIN)
    }

    /// A host function with access to its call.
    pub fn install_native_function(
        &mut self,
        name: &str,
        f: impl Fn(&mut NativeCtx<'_>) -> ExecResult<f64> + 'static,
    ) -> ExecResult<SymbolId> {
        self.symbols.install(
            name,
            SymbolKind::NativeFunction(Rc::new(f)),
            ScopeId::BUILTIN,
        )
    }

    /// A variable whose storage the host owns. `dims` is empty for scalars.
    pub fn install_host_var(&mut self, name: &str, var: HostVar, dims: &[usize]) -> ExecResult<SymbolId> {
        let shape = if dims.is_empty() {
            None
        } else {
            Some(Rc::new(Arrayinfo::from_dims(name, dims)?))
        };
        let total = shape.as_ref().map_or(1, |shape| shape.total());
        if var.len() < total {
            return Err(definition_error(name, "host storage is smaller than its shape"));
        }
        let sym = self
            .symbols
            .install(name, SymbolKind::Var(VarStorage::Host(var)), ScopeId::BUILTIN)?;
        self.symbols.symbol_mut(sym)?.shape = shape;
        Ok(sym)
    }

    /// Scope new declarations go to.
    fn declaration_scope(&self) -> ScopeId {
        self.definition
            .templates
            .last()
            .and_then(|id| self.objects.template(*id))
            .map_or(ScopeId::TOP, |template| template.scope)
    }

    /// Reserve a dataspace slot in `scope`.
    fn reserve_slot(&mut self, scope: ScopeId) -> usize {
        if scope.is_global() {
            return self.top_data.grow();
        }
        let template = self
            .definition
            .templates
            .last()
            .and_then(|id| self.objects.template_mut(*id));
        match template {
            Some(template) => {
                template.dataspace_size += 1;
                template.dataspace_size - 1
            }
            None => self.top_data.grow(),
        }
    }

    /// Install a data-bearing symbol, or redeclare an existing one of the
    /// same kind in place.
    fn declare_data(
        &mut self,
        name: &str,
        make: fn(usize) -> SymbolKind,
        shape: Option<Rc<Arrayinfo>>,
    ) -> ExecResult<SymbolId> {
        let scope = self.declaration_scope();
        let existing = self.symbols.lookup_in(name, scope);
        let sym = match existing {
            Some(sym) => {
                let symbol = self.symbols.symbol(sym)?;
                let same_kind = std::mem::discriminant(&symbol.kind)
                    == std::mem::discriminant(&make(0))
                    && symbol.kind.oboff().is_some();
                let undefined = matches!(symbol.kind, SymbolKind::Undef);
                if !same_kind && !undefined {
                    return Err(definition_error(
                        name,
                        format!("already declared as a {}", symbol.kind.kind_name()),
                    ));
                }
                if undefined {
                    let oboff = self.reserve_slot(scope);
                    self.symbols.symbol_mut(sym)?.kind = make(oboff);
                }
                sym
            }
            None => {
                let oboff = self.reserve_slot(scope);
                self.symbols.install(name, make(oboff), scope)?
            }
        };
        self.symbols.symbol_mut(sym)?.shape = shape;
        Ok(sym)
    }

    fn shape_for(name: &str, dims: &[usize]) -> ExecResult<Option<Rc<Arrayinfo>>> {
        if dims.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Rc::new(Arrayinfo::from_dims(name, dims)?)))
        }
    }

    /// Replace the storage of a top-level data symbol with fresh storage for
    /// its declared shape, releasing any object references it held.
    pub(crate) fn reset_top_slot(&mut self, sym: SymbolId) -> ExecResult<()> {
        let symbol = self.symbols.symbol(sym)?;
        if !symbol.scope.is_global() {
            return Ok(());
        }
        let Some(oboff) = symbol.kind.oboff() else {
            return Ok(());
        };
        let shape = symbol.shape.clone();
        let total = shape.as_ref().map_or(1, |shape| shape.total());
        let value = match symbol.kind {
            SymbolKind::Str { .. } => SlotValue::Str(String::new()),
            SymbolKind::ObjectVar { .. } => SlotValue::Objects(vec![None; total]),
            _ => SlotValue::Numbers(vec![0.0; total]),
        };
        self.top_data.ensure(oboff);
        let previous = match self.top_data.slot_mut(oboff) {
            Some(slot) => std::mem::replace(slot, DataSlot { value, shape }),
            None => DataSlot::default(),
        };
        if let SlotValue::Objects(objects) = previous.value {
            let mut first_error = None;
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

    /// `double name[dims...]`; a scalar when `dims` is empty.
    pub fn declare_var(&mut self, name: &str, dims: &[usize]) -> ExecResult<SymbolId> {
        let shape = Self::shape_for(name, dims)?;
        let sym = self.declare_data(
            name,
            |oboff| SymbolKind::Var(VarStorage::Data { oboff }),
            shape,
        )?;
        self.reset_top_slot(sym)?;
        Ok(sym)
    }

    /// `strdef name`.
    pub fn declare_str(&mut self, name: &str) -> ExecResult<SymbolId> {
        let sym = self.declare_data(name, |oboff| SymbolKind::Str { oboff }, None)?;
        self.reset_top_slot(sym)?;
        Ok(sym)
    }

    /// `objref name[dims...]`. Redeclaring releases every element first.
    pub fn declare_objref(&mut self, name: &str, dims: &[usize]) -> ExecResult<SymbolId> {
        let shape = Self::shape_for(name, dims)?;
        let sym = self.declare_data(name, |oboff| SymbolKind::ObjectVar { oboff }, shape)?;
        self.reset_top_slot(sym)?;
        Ok(sym)
    }

    /// A scalar created by first assignment; the only kind of symbol
    /// `DeleteSymbol` removes.
    pub fn declare_on_the_fly(&mut self, name: &str) -> ExecResult<SymbolId> {
        let sym = self.declare_var(name, &[])?;
        self.symbols.symbol_mut(sym)?.on_the_fly = true;
        Ok(sym)
    }

    /// Declare a procedure, function, obfunc or iterator whose body is
    /// supplied later by [`Interpreter::define_procedure`].
    ///
    /// Redeclaring a procedure of the same kind keeps the symbol, so
    /// bytecode already referring to it calls the new body.
    pub fn declare_proc(&mut self, name: &str, kind: ProcKind) -> ExecResult<SymbolId> {
        let scope = self.declaration_scope();
        let fresh = SymbolKind::Proc(ProcDef {
            kind,
            body: None,
            nauto: 0,
            nobjauto: 0,
        });
        let Some(sym) = self.symbols.lookup_in(name, scope) else {
            return self.symbols.install(name, fresh, scope);
        };
        let symbol = self.symbols.symbol_mut(sym)?;
        if matches!(symbol.kind, SymbolKind::Undef) {
            symbol.kind = fresh;
        } else if !matches!(&symbol.kind, SymbolKind::Proc(def) if def.kind == kind) {
            return Err(definition_error(
                name,
                format!("already declared as a {}", symbol.kind.kind_name()),
            ));
        }
        Ok(sym)
    }

    /// Open a scope for the arguments and autos of a procedure being
    /// compiled.
    pub fn begin_locals(&mut self) -> ScopeId {
        let scope = self.symbols.new_scope(ScopeKind::Local);
        self.definition.locals = Some(scope);
        scope
    }

    fn locals_scope(&self, name: &str) -> ExecResult<ScopeId> {
        self.definition
            .locals
            .ok_or_else(|| definition_error(name, "local declared outside a procedure"))
    }

    /// A numeric auto.
    pub fn declare_auto(&mut self, name: &str) -> ExecResult<SymbolId> {
        let scope = self.locals_scope(name)?;
        let slot = self.symbols.scope_symbols(scope).len();
        self.symbols.install(name, SymbolKind::Auto { slot }, scope)
    }

    /// A `localobj`.
    pub fn declare_auto_object(&mut self, name: &str) -> ExecResult<SymbolId> {
        let scope = self.locals_scope(name)?;
        let slot = self.symbols.scope_symbols(scope).len();
        self.symbols.install(name, SymbolKind::AutoObject { slot }, scope)
    }

    /// Close the local scope, placing numeric autos first and `localobj`
    /// slots after them.
    pub fn end_locals(&mut self) -> ExecResult<LocalLayout> {
        let Some(scope) = self.definition.locals.take() else {
            return Err(definition_error("end_locals", "no local scope is open"));
        };
        let ids = self.symbols.scope_symbols(scope).to_vec();
        let mut numbers = Vec::new();
        let mut objects = Vec::new();
        for id in ids {
            match self.symbols.symbol(id)?.kind {
                SymbolKind::Auto { .. } => numbers.push(id),
                SymbolKind::AutoObject { .. } => objects.push(id),
                _ => {}
            }
        }
        let layout = LocalLayout {
            nauto: numbers.len() + objects.len(),
            nobjauto: objects.len(),
        };
        for (slot, id) in numbers.iter().enumerate() {
            self.symbols.symbol_mut(*id)?.kind = SymbolKind::Auto { slot };
        }
        for (k, id) in objects.iter().enumerate() {
            self.symbols.symbol_mut(*id)?.kind = SymbolKind::AutoObject {
                slot: numbers.len() + k,
            };
        }
        Ok(layout)
    }

    /// Give a declared procedure its body. The body is validated first.
    pub fn define_procedure(&mut self, sym: SymbolId, body: Code, layout: LocalLayout) -> ExecResult<()> {
        validate(&body, self.symbols.len())?;
        let symbol = self.symbols.symbol_mut(sym)?;
        let SymbolKind::Proc(def) = &mut symbol.kind else {
            return Err(definition_error(&symbol.name, "not a procedure"));
        };
        def.body = Some(Rc::new(body));
        def.nauto = layout.nauto;
        def.nobjauto = layout.nobjauto.min(layout.nauto);
        tracing::debug!(name = %symbol.name, kind = def.kind.as_str(), "define procedure");
        Ok(())
    }

    /// `begintemplate name`.
    pub fn begin_template(&mut self, name: &str) -> ExecResult<TemplateId> {
        if self.definition.templates.len() >= self.config.template_nesting {
            return Err(definition_error(name, "templates nested too deeply"));
        }
        if let Some(existing) = self.symbols.lookup_in(name, ScopeId::TOP) {
            let message = match self.symbols.symbol(existing)?.kind {
                SymbolKind::Template(_) => "a template cannot be redefined",
                _ => "already being used as a name",
            };
            return Err(definition_error(name, message));
        }
        let sym = self.symbols.install(name, SymbolKind::Undef, ScopeId::TOP)?;
        let tid = self.objects.add_template(Rc::from(name), sym, ScopeId::TOP, None);
        let scope = self.symbols.new_scope(ScopeKind::Template(tid));
        if let Some(template) = self.objects.template_mut(tid) {
            template.scope = scope;
        }
        self.symbols.symbol_mut(sym)?.kind = SymbolKind::Template(tid);
        self.definition.templates.push(tid);
        self.definition.public_names.push(Vec::new());
        tracing::debug!(template = name, depth = self.definition.templates.len(), "begin template");
        Ok(tid)
    }

    /// `public a, b, ...` inside the open template.
    pub fn declare_public(&mut self, names: &[&str]) -> ExecResult<()> {
        let Some(pending) = self.definition.public_names.last_mut() else {
            return Err(definition_error("public", "not inside a template"));
        };
        pending.extend(names.iter().map(|name| Rc::from(*name)));
        Ok(())
    }

    /// `external name`: the member stands for the top-level symbol `name`.
    pub fn declare_external(&mut self, name: &str) -> ExecResult<SymbolId> {
        let Some(pending) = self.definition.public_names.last() else {
            return Err(definition_error(name, "external declared outside a template"));
        };
        if pending.iter().any(|public| &**public == name) {
            return Err(definition_error(name, "can't be public and external"));
        }
        let target = self
            .symbols
            .lookup_in(name, ScopeId::TOP)
            .ok_or_else(|| definition_error(name, "external must be declared at the top level"))?;
        let scope = self.declaration_scope();
        let sym = self.symbols.install(name, SymbolKind::Undef, scope)?;
        self.symbols.symbol_mut(sym)?.visibility = Visibility::External { target };
        Ok(sym)
    }

    /// `endtemplate name`: apply `public`, find `init`, `unref` and `this`.
    pub fn end_template(&mut self, name: &str) -> ExecResult<TemplateId> {
        let Some(&tid) = self.definition.templates.last() else {
            return Err(definition_error(name, "endtemplate without begintemplate"));
        };
        let (open_name, scope) = match self.objects.template(tid) {
            Some(template) => (Rc::clone(&template.name), template.scope),
            None => return Err(definition_error(name, "no such template")),
        };
        if &*open_name != name {
            return Err(definition_error(
                name,
                format!("endtemplate does not match begintemplate {open_name}"),
            ));
        }
        self.definition.templates.pop();
        let public = self.definition.public_names.pop().unwrap_or_default();

        for member in &public {
            let sym = self
                .symbols
                .lookup_in(member, scope)
                .ok_or_else(|| definition_error(member, format!("not declared in template {name}")))?;
            let symbol = self.symbols.symbol_mut(sym)?;
            if symbol.external_target().is_some() {
                return Err(definition_error(member, "can't be public and external"));
            }
            symbol.visibility = Visibility::Public;
        }

        let init = self.special_procedure(scope, "init")?;
        let unref = self.special_procedure(scope, "unref")?;
        let this_slot = self
            .symbols
            .lookup_in("this", scope)
            .and_then(|sym| self.symbols.get(sym))
            .and_then(|symbol| match symbol.kind {
                SymbolKind::ObjectVar { oboff } => Some(oboff),
                _ => None,
            });
        if let Some(template) = self.objects.template_mut(tid) {
            template.init = init;
            template.unref = unref;
            template.this_slot = this_slot;
            tracing::debug!(
                template = name,
                members = self.symbols.scope_symbols(scope).len(),
                dataspace = template.dataspace_size,
                "end template"
            );
        }
        Ok(tid)
    }

    /// `init` or `unref`, which must be a procedure if present.
    fn special_procedure(&self, scope: ScopeId, name: &str) -> ExecResult<Option<SymbolId>> {
        let Some(sym) = self.symbols.lookup_in(name, scope) else {
            return Ok(None);
        };
        match &self.symbols.symbol(sym)?.kind {
            SymbolKind::Proc(def) if def.kind == ProcKind::Procedure => Ok(Some(sym)),
            _ => Err(definition_error(name, "must be a procedure")),
        }
    }

    /// Register a native class as a template. Methods and properties become
    /// public members.
    pub fn register_native_class(&mut self, class: NativeClass) -> ExecResult<TemplateId> {
        let name = Rc::clone(&class.name);
        if self.symbols.lookup(&name, None, ScopeId::TOP).is_some() {
            return Err(definition_error(&name, "already being used as a name"));
        }
        let sym = self.symbols.install(&name, SymbolKind::Undef, ScopeId::TOP)?;
        let method_names: Vec<Rc<str>> = class.methods.iter().map(|m| Rc::clone(&m.name)).collect();
        let property_names: Vec<Rc<str>> =
            class.properties.iter().map(|p| Rc::clone(&p.name)).collect();
        let tid = self
            .objects
            .add_template(Rc::clone(&name), sym, ScopeId::TOP, Some(Rc::new(class)));
        let scope = self.symbols.new_scope(ScopeKind::Template(tid));
        if let Some(template) = self.objects.template_mut(tid) {
            template.scope = scope;
        }
        self.symbols.symbol_mut(sym)?.kind = SymbolKind::Template(tid);

        for (index, member) in method_names.iter().enumerate() {
            let id = self
                .symbols
                .install(member, SymbolKind::NativeMethod { index }, scope)?;
            self.symbols.symbol_mut(id)?.visibility = Visibility::Public;
        }
        for (index, member) in property_names.iter().enumerate() {
            let id = self
                .symbols
                .install(member, SymbolKind::NativeProperty { index }, scope)?;
            self.symbols.symbol_mut(id)?.visibility = Visibility::Public;
        }
        tracing::debug!(class = %name, methods = method_names.len(), "register native class");
        Ok(tid)
    }

    /// Name `alias` on `object`, consulted by member access before the
    /// template's members. Aliases hold no reference.
    pub fn set_alias(&mut self, object: ObjectId, alias: &str, target: Alias) -> ExecResult<()> {
        let object = self.objects.get_mut(object).ok_or_else(dead_object)?;
        object.aliases.insert(Rc::from(alias), target);
        Ok(())
    }

    pub fn remove_alias(&mut self, object: ObjectId, alias: &str) -> bool {
        self.objects
            .get_mut(object)
            .is_some_and(|object| object.aliases.remove(alias).is_some())
    }

    /// Run `f` once when `object` is destroyed.
    pub fn add_observer(&mut self, object: ObjectId, f: impl FnOnce(ObjectId) + 'static) -> ExecResult<()> {
        let object = self.objects.get_mut(object).ok_or_else(dead_object)?;
        object.observers.push(Box::new(f));
        Ok(())
    }

    /// Make `object` the current context, saving the previous one.
    pub fn object_push(&mut self, object: Option<ObjectId>) -> ExecResult<()> {
        if self.object_stack.len() >= self.config.object_context_depth {
            return Err(object_context_overflow());
        }
        if let Some(id) = object {
            let live = self.objects.get(id).ok_or_else(dead_object)?;
            if live.is_native() {
                return Err(native_fault("object_push", "cannot push a native object"));
            }
        }
        self.object_stack.push(self.context);
        self.context = object;
        Ok(())
    }

    /// Restore the context saved by the matching `object_push`.
    pub fn object_pop(&mut self) -> ExecResult<()> {
        let saved = self.object_stack.pop().ok_or_else(object_context_underflow)?;
        self.context = saved;
        Ok(())
    }

    /// Assign a top-level scalar or array element.
    pub fn set_number(&mut self, sym: SymbolId, index: usize, value: f64) -> ExecResult<()> {
        let symbol = self.symbols.symbol(sym)?;
        let Some(SymbolKind::Var(VarStorage::Data { oboff })) =
            symbol.scope.is_global().then_some(&symbol.kind)
        else {
            return Err(definition_error(&symbol.name, "not a top-level variable"));
        };
        let cell = CellRef::Data {
            space: Space::Top,
            slot: *oboff,
            index,
        };
        self.write_number(&cell, value)
    }

    /// Store a new reference to `object` in element `index` of a top-level
    /// `objref`.
    pub fn set_object(&mut self, sym: SymbolId, index: usize, object: Option<ObjectId>) -> ExecResult<()> {
        let symbol = self.symbols.symbol(sym)?;
        let Some(SymbolKind::ObjectVar { oboff }) = symbol.scope.is_global().then_some(&symbol.kind)
        else {
            return Err(definition_error(&symbol.name, "not a top-level objref"));
        };
        let cell = CellRef::Data {
            space: Space::Top,
            slot: *oboff,
            index,
        };
        let owned = self.retain(object)?;
        self.store_object(&cell, owned)
    }

    /// Assign a top-level `strdef`.
    pub fn set_string(&mut self, sym: SymbolId, text: &str) -> ExecResult<()> {
        let target = self.str_ref(sym)?;
        self.write_str(&target, text)
    }
}
