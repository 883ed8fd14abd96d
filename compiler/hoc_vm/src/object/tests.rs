use super::*;
use pretty_assertions::assert_eq;

use std::any::Any;
use std::rc::Rc;

use hoc_ir::SymbolId;

use crate::dataspace::Dataspace;
use crate::symbol::ScopeId;

fn arena_with_template(name: &str) -> (ObjectArena, hoc_ir::TemplateId) {
    let mut arena = ObjectArena::new();
    let id = arena.add_template(Rc::from(name), SymbolId::new(0), ScopeId::TOP, None);
    (arena, id)
}

fn data() -> ObjectBody {
    ObjectBody::Data(Dataspace::default())
}

#[test]
fn template_ids_start_at_one() {
    let (arena, id) = arena_with_template("Cell");
    assert_eq!(id.raw(), 1);
    assert_eq!(arena.template(id).map(|t| &*t.name), Some("Cell"));
    assert!(arena.template(hoc_ir::TemplateId::new(0)).is_none());
}

#[test]
fn instances_are_indexed_in_creation_order() {
    let (mut arena, tid) = arena_with_template("Cell");
    let a = arena.insert(tid, data()).unwrap();
    let b = arena.insert(tid, data()).unwrap();
    assert_eq!(arena.object_name(Some(a)), "Cell[0]");
    assert_eq!(arena.object_name(Some(b)), "Cell[1]");
    assert_eq!(arena.find_by_index(tid, 1), Some(b));
    assert_eq!(arena.template(tid).unwrap().objects, vec![a, b]);
    assert_eq!(arena.get(a).unwrap().refcount, 1);
}

#[test]
fn inserting_into_an_unknown_template_allocates_nothing() {
    let (mut arena, tid) = arena_with_template("Cell");
    assert!(arena.insert(hoc_ir::TemplateId::new(9), data()).is_none());
    let a = arena.insert(tid, data()).unwrap();
    let b = arena.insert(tid, data()).unwrap();
    assert_eq!((a.raw(), b.raw()), (0, 1));
    assert_eq!(arena.template(tid).unwrap().count, 2);
}

#[test]
fn indices_restart_once_every_instance_is_gone() {
    let (mut arena, tid) = arena_with_template("Cell");
    let a = arena.insert(tid, data()).unwrap();
    let b = arena.insert(tid, data()).unwrap();

    arena.remove(a);
    let c = arena.insert(tid, data()).unwrap();
    assert_eq!(arena.get(c).unwrap().index, 2);

    arena.remove(b);
    arena.remove(c);
    assert_eq!(arena.template(tid).unwrap().count, 0);
    let d = arena.insert(tid, data()).unwrap();
    assert_eq!(arena.object_name(Some(d)), "Cell[0]");
}

#[test]
fn names_of_null_and_destroyed_objects() {
    let (mut arena, tid) = arena_with_template("Cell");
    let a = arena.insert(tid, data()).unwrap();
    arena.remove(a);
    assert_eq!(arena.object_name(None), "NULLobject");
    assert!(arena.object_name(Some(a)).starts_with("<destroyed object"));
    assert!(!arena.is_live(a));
    assert_eq!(arena.live_count(), 0);
}

#[test]
fn native_objects_have_no_dataspace() {
    let (mut arena, tid) = arena_with_template("Counter");
    let id = arena.insert(tid, ObjectBody::Native(None)).unwrap();
    let object = arena.get(id).unwrap();
    assert!(object.is_native());
    assert!(object.dataspace().is_none());
}

#[derive(Default)]
struct Counter {
    n: f64,
}

#[test]
fn builder_lists_members_in_order() {
    let class = NativeClass::builder("Counter", |_ctx| Ok(Counter::default()))
        .method("bump", |c: &mut Counter, _ctx| {
            c.n += 1.0;
            Ok(c.n)
        })
        .method_str("label", |_c: &mut Counter, _ctx| Ok("counter".to_string()))
        .property("n", |c: &Counter| c.n, |c: &mut Counter, v| c.n = v)
        .read_only_property("twice", |c: &Counter| c.n * 2.0)
        .build();

    assert_eq!(class.name(), "Counter");
    assert_eq!(
        class.methods().collect::<Vec<_>>(),
        vec![("bump", ReturnKind::Number), ("label", ReturnKind::Str)]
    );
    assert_eq!(class.property_names().collect::<Vec<_>>(), vec!["n", "twice"]);
}

#[test]
fn property_accessors_reject_foreign_instances() {
    let class = NativeClass::builder("Counter", |_ctx| Ok(Counter::default()))
        .property("n", |c: &Counter| c.n, |c: &mut Counter, v| c.n = v)
        .build();
    let property = &class.properties[0];

    let set = property.set.as_ref().unwrap();

    let mut counter = Counter { n: 4.0 };
    assert_eq!((property.get)(&counter as &dyn Any), Some(4.0));
    assert!(set(&mut counter as &mut dyn Any, 7.0));
    assert_eq!(counter.n, 7.0);

    let mut other = 1_u8;
    assert_eq!((property.get)(&other as &dyn Any), None);
    assert!(!set(&mut other as &mut dyn Any, 2.0));
}
