//! Templates, member access, aliases, observers and native classes.

#![allow(clippy::unwrap_used, reason = "Tests can panic")]

use std::cell::Cell;
use std::rc::Rc;

use pretty_assertions::assert_eq;

use hoc_ir::{ComponentFlags, CodeBuilder, ObjectId, Opcode, SymbolId, TemplateId};

use super::{code, quiet};
use crate::errors::{native_fault, ExecErrorKind};
use crate::interpreter::{Interpreter, LocalLayout};
use crate::object::{Alias, NativeClass};
use crate::symbol::{ProcKind, ScopeId};
use crate::traverse::DataValue;

/// `begintemplate Box`: `public x, twice`, a private `hidden`, and
/// `init()` storing `$1` into `x`.
struct BoxTemplate {
    tid: TemplateId,
    sym: SymbolId,
    x: SymbolId,
    hidden: SymbolId,
    twice: SymbolId,
}

fn box_template(interp: &mut Interpreter) -> BoxTemplate {
    let two = interp.install_constant("TWO", 2.0).unwrap();
    let tid = interp.begin_template("Box").unwrap();
    let x = interp.declare_var("x", &[]).unwrap();
    let hidden = interp.declare_var("hidden", &[]).unwrap();
    let twice = interp.declare_proc("twice", ProcKind::Function).unwrap();
    let init = interp.declare_proc("init", ProcKind::Procedure).unwrap();
    interp.declare_public(&["x", "twice"]).unwrap();
    interp.end_template("Box").unwrap();

    // func twice() { return $1 * 2 }
    interp
        .define_procedure(
            twice,
            code(|b| {
                b.op(Opcode::Arg)
                    .int(1)
                    .op(Opcode::ConstPush)
                    .sym(two)
                    .op(Opcode::Mul)
                    .op(Opcode::FuncRet)
                    .stop();
            }),
            LocalLayout::default(),
        )
        .unwrap();
    // proc init() { x = $1 }
    interp
        .define_procedure(
            init,
            code(|b| {
                b.op(Opcode::Arg)
                    .int(1)
                    .op(Opcode::VarPush)
                    .sym(x)
                    .op(Opcode::Assign)
                    .int(0)
                    .op(Opcode::Pop)
                    .op(Opcode::ProcRet)
                    .stop();
            }),
            LocalLayout::default(),
        )
        .unwrap();
    BoxTemplate {
        tid,
        sym: interp.lookup("Box").unwrap(),
        x,
        hidden,
        twice,
    }
}

/// `obj.member` with the given argument count and flags.
fn component(b: &mut CodeBuilder, member: SymbolId, narg: i32, flags: ComponentFlags) {
    let bits = i32::try_from(flags.bits()).unwrap();
    b.op(Opcode::ObjectComponent)
        .sym(member)
        .int(0)
        .int(narg)
        .cache()
        .int(bits);
}

fn new_box(interp: &mut Interpreter, tid: TemplateId, x: f64) -> ObjectId {
    let owned = interp.new_object(tid, &[x]).unwrap();
    owned.into_raw().unwrap()
}

#[test]
fn init_receives_constructor_arguments() {
    let mut interp = quiet();
    let boxes = box_template(&mut interp);
    let obj = new_box(&mut interp, boxes.tid, 7.0);
    assert_eq!(
        interp.read_data(Some(obj), boxes.x).unwrap(),
        DataValue::Numbers {
            dims: vec![],
            values: vec![7.0],
        }
    );
    assert_eq!(interp.refcount(obj), Some(1));
}

#[test]
fn public_members_are_read_written_and_called() {
    let mut interp = quiet();
    let boxes = box_template(&mut interp);
    let five = interp.install_constant("FIVE", 5.0).unwrap();
    let b_ref = interp.declare_objref("b", &[]).unwrap();
    let y = interp.declare_var("y", &[]).unwrap();

    // b = new Box(5)
    interp
        .run(code(|b| {
            b.op(Opcode::ObjectVar)
                .sym(b_ref)
                .op(Opcode::ConstPush)
                .sym(five)
                .op(Opcode::NewObj)
                .sym(boxes.sym)
                .int(1)
                .op(Opcode::Pop)
                .stop();
        }))
        .unwrap();

    // y = b.twice(b.x)
    interp
        .run(code(|b| {
            b.op(Opcode::ObjectVar).sym(b_ref);
            b.op(Opcode::ObjectVar).sym(b_ref);
            component(b, boxes.x, 0, ComponentFlags::empty());
            b.op(Opcode::ObjectEval);
            component(b, boxes.twice, 1, ComponentFlags::CALL);
            b.op(Opcode::VarPush)
                .sym(y)
                .op(Opcode::Assign)
                .int(0)
                .op(Opcode::Pop)
                .stop();
        }))
        .unwrap();
    assert_eq!(interp.number_value(y), Some(10.0));

    // b.x += 5
    interp
        .run(code(|b| {
            b.op(Opcode::ObjectVar).sym(b_ref);
            component(b, boxes.x, 0, ComponentFlags::LVALUE);
            b.op(Opcode::ConstPush)
                .sym(five)
                .op(Opcode::ObjectAsgn)
                .int(i32::from(b'+'))
                .op(Opcode::Pop)
                .stop();
        }))
        .unwrap();
    let obj = interp.object_value(b_ref, 0).unwrap();
    assert_eq!(
        interp.read_data(Some(obj), boxes.x).unwrap(),
        DataValue::Numbers {
            dims: vec![],
            values: vec![10.0],
        }
    );
    assert_eq!(interp.stack_depth(), 0);
}

#[test]
fn private_members_are_not_visible() {
    let mut interp = quiet();
    let boxes = box_template(&mut interp);
    let b_ref = interp.declare_objref("b", &[]).unwrap();
    let owned = interp.new_object(boxes.tid, &[1.0]).unwrap();
    interp.set_object(b_ref, 0, owned.id()).unwrap();
    interp.release_owned(owned).unwrap();

    let err = interp
        .run(code(|b| {
            b.op(Opcode::ObjectVar).sym(b_ref);
            component(b, boxes.hidden, 0, ComponentFlags::empty());
            b.op(Opcode::ObjectEval).op(Opcode::Pop).stop();
        }))
        .unwrap_err();
    assert_eq!(
        err.kind,
        ExecErrorKind::NotPublicMember {
            member: "hidden".to_string(),
            template: "Box".to_string(),
        }
    );
    assert_eq!(interp.stack_depth(), 0);
}

#[test]
fn constant_object_reference_finds_live_instances() {
    let mut interp = quiet();
    let boxes = box_template(&mut interp);
    let y = interp.declare_var("y", &[]).unwrap();
    let obj = new_box(&mut interp, boxes.tid, 3.0);

    // y = Box[0].x
    interp
        .run(code(|b| {
            b.op(Opcode::PushZero).op(Opcode::ConstObject).sym(boxes.sym);
            component(b, boxes.x, 0, ComponentFlags::empty());
            b.op(Opcode::ObjectEval)
                .op(Opcode::VarPush)
                .sym(y)
                .op(Opcode::Assign)
                .int(0)
                .op(Opcode::Pop)
                .stop();
        }))
        .unwrap();
    assert_eq!(interp.number_value(y), Some(3.0));
    // The temporary taken by Box[0] has been given back.
    assert_eq!(interp.refcount(obj), Some(1));

    // Box[1] does not exist.
    let one = interp.install_constant("ONE", 1.0).unwrap();
    let err = interp
        .run(code(|b| {
            b.op(Opcode::ConstPush)
                .sym(one)
                .op(Opcode::ConstObject)
                .sym(boxes.sym)
                .op(Opcode::Pop)
                .stop();
        }))
        .unwrap_err();
    assert!(err.message.contains("Box[1]"), "{}", err.message);

    // Box[-1] is not Box[0].
    let err = interp
        .run(code(|b| {
            b.op(Opcode::ConstPush)
                .sym(one)
                .op(Opcode::Negate)
                .op(Opcode::ConstObject)
                .sym(boxes.sym)
                .op(Opcode::Pop)
                .stop();
        }))
        .unwrap_err();
    assert!(err.message.contains("Box[-1]"), "{}", err.message);
    assert_eq!(interp.refcount(obj), Some(1));
}

#[test]
fn aliases_resolve_before_members() {
    let mut interp = quiet();
    let boxes = box_template(&mut interp);
    let p = interp.declare_objref("p", &[]).unwrap();
    let r = interp.declare_objref("r", &[]).unwrap();
    let friend = interp.declare_var("friend", &[]).unwrap();
    let owner = new_box(&mut interp, boxes.tid, 1.0);
    let target = new_box(&mut interp, boxes.tid, 2.0);
    interp.set_object(p, 0, Some(owner)).unwrap();
    interp.set_alias(owner, "friend", Alias::Object(target)).unwrap();

    // r = p.friend
    interp
        .run(code(|b| {
            b.op(Opcode::ObjectVar).sym(r);
            b.op(Opcode::ObjectVar).sym(p);
            component(b, friend, 0, ComponentFlags::empty());
            b.op(Opcode::ObjectAsgn).int(0).op(Opcode::Pop).stop();
        }))
        .unwrap();
    assert_eq!(interp.object_value(r, 0), Some(target));
    // Our handle plus r; the alias itself holds nothing.
    assert_eq!(interp.refcount(target), Some(2));

    assert!(interp.remove_alias(owner, "friend"));
    assert!(!interp.remove_alias(owner, "friend"));
}

#[test]
fn observers_fire_once_on_destruction() {
    let mut interp = quiet();
    let boxes = box_template(&mut interp);
    let obj = new_box(&mut interp, boxes.tid, 1.0);
    let fired = Rc::new(Cell::new(0));
    let seen = Rc::clone(&fired);
    interp
        .add_observer(obj, move |id| {
            assert_eq!(id, obj);
            seen.set(seen.get() + 1);
        })
        .unwrap();

    let b_ref = interp.declare_objref("b", &[]).unwrap();
    interp.set_object(b_ref, 0, Some(obj)).unwrap();
    interp.declare_objref("b", &[]).unwrap();
    assert_eq!(fired.get(), 0);
    assert_eq!(interp.refcount(obj), Some(1));

    let owned = interp.retain(Some(obj)).unwrap();
    interp.release_owned(owned).unwrap();
    assert_eq!(fired.get(), 0);

    // Give back the reference `new_box` handed us.
    interp.release(Some(obj)).unwrap();
    assert_eq!(fired.get(), 1);
    assert!(!interp.is_live(obj));
}

#[test]
fn host_calls_run_in_the_object_context() {
    let mut interp = quiet();
    let boxes = box_template(&mut interp);
    let obj = new_box(&mut interp, boxes.tid, 4.0);

    assert_eq!(
        interp.call_objfunc(Some(obj), boxes.twice, &[4.0]).unwrap(),
        8.0
    );

    // x = 0, run inside the object
    interp
        .obj_run(
            code(|b| {
                b.op(Opcode::PushZero)
                    .op(Opcode::VarPush)
                    .sym(boxes.x)
                    .op(Opcode::Assign)
                    .int(0)
                    .op(Opcode::Pop)
                    .stop();
            }),
            Some(obj),
        )
        .unwrap();
    assert_eq!(
        interp.read_data(Some(obj), boxes.x).unwrap(),
        DataValue::Numbers {
            dims: vec![],
            values: vec![0.0],
        }
    );
    assert_eq!(interp.this_object(), None);
}

#[test]
fn object_context_stack_is_bounded() {
    let mut interp = quiet();
    let boxes = box_template(&mut interp);
    let obj = new_box(&mut interp, boxes.tid, 1.0);

    interp.object_push(Some(obj)).unwrap();
    assert_eq!(interp.this_object(), Some(obj));
    interp.object_pop().unwrap();
    assert_eq!(interp.this_object(), None);
    assert!(interp.object_pop().is_err());

    let depth = interp.config().object_context_depth;
    for _ in 0..depth {
        interp.object_push(Some(obj)).unwrap();
    }
    assert!(interp.object_push(Some(obj)).is_err());
}

#[derive(Default)]
struct Counter {
    n: f64,
}

#[test]
fn native_classes_dispatch_methods_and_properties() {
    let mut interp = quiet();
    let dropped = Rc::new(Cell::new(false));
    let flag = Rc::clone(&dropped);
    let class = NativeClass::builder("Counter", |_ctx| Ok(Counter::default()))
        .destructor(move |_counter: Counter| flag.set(true))
        .method("bump", |c: &mut Counter, ctx| {
            c.n += ctx.number(1)?;
            Ok(c.n)
        })
        .property("n", |c: &Counter| c.n, |c: &mut Counter, v| c.n = v)
        .build();
    let tid = interp.register_native_class(class).unwrap();
    let scope = interp.objects().template(tid).unwrap().scope;
    let member = |interp: &Interpreter, name: &str| interp.symbols().lookup_in(name, scope).unwrap();
    let bump = member(&interp, "bump");
    let n = member(&interp, "n");
    assert_ne!(scope, ScopeId::TOP);

    let three = interp.install_constant("THREE", 3.0).unwrap();
    let c = interp.declare_objref("c", &[]).unwrap();
    let y = interp.declare_var("y", &[]).unwrap();
    let counter = interp.lookup("Counter").unwrap();

    // c = new Counter()  c.bump(3)  y = c.n
    interp
        .run(code(|b| {
            b.op(Opcode::ObjectVar)
                .sym(c)
                .op(Opcode::NewObj)
                .sym(counter)
                .int(0)
                .op(Opcode::Pop);
            b.op(Opcode::ObjectVar).sym(c).op(Opcode::ConstPush).sym(three);
            component(b, bump, 1, ComponentFlags::CALL);
            b.op(Opcode::Pop);
            b.op(Opcode::ObjectVar).sym(c);
            component(b, n, 0, ComponentFlags::empty());
            b.op(Opcode::ObjectEval)
                .op(Opcode::VarPush)
                .sym(y)
                .op(Opcode::Assign)
                .int(0)
                .op(Opcode::Pop)
                .stop();
        }))
        .unwrap();
    assert_eq!(interp.number_value(y), Some(3.0));
    assert!(!dropped.get());

    interp.declare_objref("c", &[]).unwrap();
    assert!(dropped.get());
    assert_eq!(interp.live_objects(), 0);
}

#[test]
fn faulting_init_destroys_the_partial_object() {
    let mut interp = quiet();
    let tid = interp.begin_template("Faulty").unwrap();
    interp.declare_var("x", &[]).unwrap();
    let init = interp.declare_proc("init", ProcKind::Procedure).unwrap();
    interp.end_template("Faulty").unwrap();
    let faulty = interp.lookup("Faulty").unwrap();
    // proc init() { 0/0 }
    interp
        .define_procedure(
            init,
            code(|b| {
                b.op(Opcode::PushZero)
                    .op(Opcode::PushZero)
                    .op(Opcode::Div)
                    .op(Opcode::Pop)
                    .op(Opcode::ProcRet)
                    .stop();
            }),
            LocalLayout::default(),
        )
        .unwrap();

    let err = interp.new_object(tid, &[]).unwrap_err();
    assert_eq!(err.message, "division by zero");
    assert_eq!(interp.live_objects(), 0);
    assert_eq!(interp.stack_depth(), 0);
    assert_eq!(interp.frame_depth(), 0);

    // f = new Faulty()
    let f = interp.declare_objref("f", &[]).unwrap();
    let err = interp
        .run(code(|b| {
            b.op(Opcode::ObjectVar)
                .sym(f)
                .op(Opcode::NewObj)
                .sym(faulty)
                .int(0)
                .op(Opcode::Pop)
                .stop();
        }))
        .unwrap_err();
    assert_eq!(err.message, "division by zero");
    assert_eq!(interp.object_value(f, 0), None);
    assert_eq!(interp.live_objects(), 0);
    assert_eq!(interp.stack_depth(), 0);
    assert_eq!(interp.frame_depth(), 0);
}

#[test]
fn failing_native_constructor_leaves_no_object() {
    let mut interp = quiet();
    let class = NativeClass::builder("Broken", |_ctx| {
        Err::<Counter, _>(native_fault("Broken", "no device"))
    })
    .build();
    let tid = interp.register_native_class(class).unwrap();

    let err = interp.new_object(tid, &[]).unwrap_err();
    assert!(err.message.contains("no device"), "{}", err.message);
    assert_eq!(interp.live_objects(), 0);
    assert_eq!(interp.stack_depth(), 0);
    assert_eq!(interp.frame_depth(), 0);
}
