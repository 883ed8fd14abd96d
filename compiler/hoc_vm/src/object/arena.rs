//! Template and object storage.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use hoc_ir::{ObjectId, SymbolId, TemplateId};
use rustc_hash::FxHashMap;

use super::NativeClass;
use crate::dataspace::Dataspace;
use crate::stack::CellRef;
use crate::symbol::ScopeId;

/// A class: member scope, dataspace layout and live instance list.
pub struct Template {
    pub name: Rc<str>,
    /// The top-level symbol naming the template.
    pub symbol: SymbolId,
    pub id: TemplateId,
    pub scope: ScopeId,
    /// Slots in each instance's dataspace.
    pub dataspace_size: usize,
    /// Live instances in creation order.
    pub objects: Vec<ObjectId>,
    /// Live instance count.
    pub count: usize,
    /// Index given to the next instance; reset when `count` drops to zero.
    pub next_index: usize,
    pub init: Option<SymbolId>,
    pub unref: Option<SymbolId>,
    /// Slot of the member named `this`, which holds an uncounted self
    /// reference.
    pub this_slot: Option<usize>,
    pub native: Option<Rc<NativeClass>>,
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("count", &self.count)
            .field("native", &self.native.is_some())
            .finish_non_exhaustive()
    }
}

/// Storage behind an object.
pub enum ObjectBody {
    Data(Dataspace),
    /// Opaque native instance. `None` while a native call has it checked out
    /// or before the constructor has run.
    Native(Option<Box<dyn Any>>),
}

/// Target of a named alias.
#[derive(Clone, Debug, PartialEq)]
pub enum Alias {
    Object(ObjectId),
    Number(CellRef),
}

pub struct Object {
    pub template: TemplateId,
    pub refcount: u32,
    /// Index within the template, shown as `T[index]`.
    pub index: usize,
    pub body: ObjectBody,
    pub aliases: FxHashMap<Rc<str>, Alias>,
    pub observers: Vec<Box<dyn FnOnce(ObjectId)>>,
    /// Depth of `unref` callbacks currently running for this object.
    pub unref_recurse: u32,
}

impl Object {
    pub fn dataspace(&self) -> Option<&Dataspace> {
        match &self.body {
            ObjectBody::Data(data) => Some(data),
            ObjectBody::Native(_) => None,
        }
    }

    pub fn dataspace_mut(&mut self) -> Option<&mut Dataspace> {
        match &mut self.body {
            ObjectBody::Data(data) => Some(data),
            ObjectBody::Native(_) => None,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self.body, ObjectBody::Native(_))
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("template", &self.template)
            .field("refcount", &self.refcount)
            .field("index", &self.index)
            .field("native", &self.is_native())
            .field("aliases", &self.aliases.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Owns every template and live object.
#[derive(Default)]
pub struct ObjectArena {
    templates: Vec<Template>,
    objects: FxHashMap<ObjectId, Object>,
    next_object: u32,
}

impl ObjectArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template; ids start at 1.
    pub fn add_template(
        &mut self,
        name: Rc<str>,
        symbol: SymbolId,
        scope: ScopeId,
        native: Option<Rc<NativeClass>>,
    ) -> TemplateId {
        let id = TemplateId::new(u32::try_from(self.templates.len() + 1).unwrap_or(u32::MAX));
        self.templates.push(Template {
            name,
            symbol,
            id,
            scope,
            dataspace_size: 0,
            objects: Vec::new(),
            count: 0,
            next_index: 0,
            init: None,
            unref: None,
            this_slot: None,
            native,
        });
        id
    }

    #[inline]
    pub fn template(&self, id: TemplateId) -> Option<&Template> {
        id.index()
            .checked_sub(1)
            .and_then(|index| self.templates.get(index))
    }

    #[inline]
    pub fn template_mut(&mut self, id: TemplateId) -> Option<&mut Template> {
        id.index()
            .checked_sub(1)
            .and_then(|index| self.templates.get_mut(index))
    }

    /// Templates in definition order.
    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    /// Allocate a new object with refcount 1 and register it with its
    /// template.
    pub fn insert(&mut self, template: TemplateId, body: ObjectBody) -> Option<ObjectId> {
        let id = ObjectId::new(self.next_object);
        let next = self.next_object.checked_add(1)?;
        let tpl = self.template_mut(template)?;
        let index = tpl.next_index;
        tpl.next_index += 1;
        tpl.count += 1;
        tpl.objects.push(id);
        self.next_object = next;
        self.objects.insert(
            id,
            Object {
                template,
                refcount: 1,
                index,
                body,
                aliases: FxHashMap::default(),
                observers: Vec::new(),
                unref_recurse: 0,
            },
        );
        Some(id)
    }

    /// Unregister an object from its template and take it out of the arena.
    pub fn remove(&mut self, id: ObjectId) -> Option<Object> {
        let object = self.objects.remove(&id)?;
        if let Some(tpl) = self.template_mut(object.template) {
            tpl.objects.retain(|o| *o != id);
            tpl.count = tpl.count.saturating_sub(1);
            if tpl.count == 0 {
                tpl.next_index = 0;
            }
        }
        Some(object)
    }

    #[inline]
    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.objects.get_mut(&id)
    }

    #[inline]
    pub fn is_live(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Number of live objects across all templates.
    pub fn live_count(&self) -> usize {
        self.objects.len()
    }

    /// Template of a live object.
    pub fn template_of(&self, id: ObjectId) -> Option<&Template> {
        self.get(id).and_then(|object| self.template(object.template))
    }

    /// Live object of `template` with the given index.
    pub fn find_by_index(&self, template: TemplateId, index: usize) -> Option<ObjectId> {
        self.template(template)?
            .objects
            .iter()
            .copied()
            .find(|id| self.get(*id).is_some_and(|o| o.index == index))
    }

    /// `T[i]` for a live object, `NULLobject` for null.
    pub fn object_name(&self, id: Option<ObjectId>) -> String {
        let Some(id) = id else {
            return "NULLobject".to_string();
        };
        match (self.get(id), self.template_of(id)) {
            (Some(object), Some(tpl)) => format!("{}[{}]", tpl.name, object.index),
            _ => format!("<destroyed object {}>", id.raw()),
        }
    }
}

impl fmt::Debug for ObjectArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectArena")
            .field("templates", &self.templates.len())
            .field("objects", &self.objects.len())
            .finish()
    }
}
