//! Procedure calls, arguments and returns.

#![allow(clippy::unwrap_used, reason = "Tests can panic")]

use pretty_assertions::assert_eq;

use hoc_ir::{Code, Opcode, SymbolId};

use super::{code, quiet};
use crate::config::{ExecMode, VmConfig};
use crate::errors::ExecErrorKind;
use crate::interpreter::{Interpreter, LocalLayout};
use crate::print_handler::silent_handler;
use crate::symbol::ProcKind;

fn define(interp: &mut Interpreter, name: &str, kind: ProcKind, body: Code) -> SymbolId {
    let sym = interp.declare_proc(name, kind).unwrap();
    interp
        .define_procedure(sym, body, LocalLayout::default())
        .unwrap();
    sym
}

#[test]
fn numarg_counts_the_callers_arguments() {
    let mut interp = quiet();
    let numarg = interp.lookup("numarg").unwrap();
    // func count() { return numarg() }
    let count = define(
        &mut interp,
        "count",
        ProcKind::Function,
        code(|b| {
            b.op(Opcode::Call)
                .sym(numarg)
                .int(0)
                .op(Opcode::FuncRet)
                .stop();
        }),
    );
    assert_eq!(interp.call_function(count, &[1.0, 2.0, 3.0]).unwrap(), 3.0);
    assert_eq!(interp.call_function(count, &[]).unwrap(), 0.0);
    assert_eq!(interp.frame_depth(), 0);
}

#[test]
fn argtype_reports_each_kind() {
    let mut interp = quiet();
    let argtype = interp.lookup("argtype").unwrap();
    let one = interp.install_constant("ONE", 1.0).unwrap();
    let two = interp.install_constant("TWO", 2.0).unwrap();
    let greeting = interp.install_string_constant("greeting", "hi").unwrap();
    let y = interp.declare_var("y", &[]).unwrap();

    // func kind_of(index) { return argtype(index) }, with the index baked in
    let kind_of = |interp: &mut Interpreter, name: &str, index: SymbolId| {
        define(
            interp,
            name,
            ProcKind::Function,
            code(|b| {
                b.op(Opcode::ConstPush)
                    .sym(index)
                    .op(Opcode::Call)
                    .sym(argtype)
                    .int(1)
                    .op(Opcode::FuncRet)
                    .stop();
            }),
        )
    };
    let first = kind_of(&mut interp, "first", one);
    let second = kind_of(&mut interp, "second", two);

    assert_eq!(interp.call_function(first, &[5.0]).unwrap(), 0.0);
    assert_eq!(interp.call_function(second, &[5.0]).unwrap(), -1.0);

    // y = first("hi")
    interp
        .run(code(|b| {
            b.op(Opcode::PushString)
                .sym(greeting)
                .op(Opcode::Call)
                .sym(first)
                .int(1)
                .op(Opcode::VarPush)
                .sym(y)
                .op(Opcode::Assign)
                .int(0)
                .op(Opcode::Pop)
                .stop();
        }))
        .unwrap();
    assert_eq!(interp.number_value(y), Some(2.0));
    assert_eq!(interp.stack_depth(), 0);
}

#[test]
fn argument_assignment_writes_the_frame_slot() {
    let mut interp = quiet();
    let one = interp.install_constant("ONE", 1.0).unwrap();
    // func bump() { $1 += 1  return $1 }
    let bump = define(
        &mut interp,
        "bump",
        ProcKind::Function,
        code(|b| {
            b.op(Opcode::ConstPush)
                .sym(one)
                .op(Opcode::ArgAssign)
                .int(1)
                .int(i32::from(b'+'))
                .op(Opcode::Pop)
                .op(Opcode::Arg)
                .int(1)
                .op(Opcode::FuncRet)
                .stop();
        }),
    );
    assert_eq!(interp.call_function(bump, &[4.0]).unwrap(), 5.0);
}

#[test]
fn missing_argument_faults() {
    let mut interp = quiet();
    let second = define(
        &mut interp,
        "second",
        ProcKind::Function,
        code(|b| {
            b.op(Opcode::Arg).int(2).op(Opcode::FuncRet).stop();
        }),
    );
    let err = interp.call_function(second, &[1.0]).unwrap_err();
    assert_eq!(
        err.kind,
        ExecErrorKind::NotEnoughArguments {
            name: "second".to_string(),
        }
    );
    assert_eq!(interp.stack_depth(), 0);
    assert_eq!(interp.frame_depth(), 0);
}

#[test]
fn return_kind_must_match_the_procedure() {
    let mut interp = quiet();
    let silent = define(
        &mut interp,
        "silent",
        ProcKind::Function,
        code(|b| {
            b.op(Opcode::ProcRet).stop();
        }),
    );
    let err = interp.call_function(silent, &[]).unwrap_err();
    assert_eq!(err.message, "silent: (func) returns no value");

    let chatty = define(
        &mut interp,
        "chatty",
        ProcKind::Procedure,
        code(|b| {
            b.op(Opcode::PushZero).op(Opcode::FuncRet).stop();
        }),
    );
    let err = interp.call_function(chatty, &[]).unwrap_err();
    assert_eq!(
        err.kind,
        ExecErrorKind::ReturnMismatch {
            name: "chatty".to_string(),
            what: "(proc or iterator) returns value",
        }
    );
}

#[test]
fn runaway_recursion_is_caught_with_a_short_backtrace() {
    let mut interp = Interpreter::with_config(
        VmConfig::for_mode(ExecMode::Embedded).with_frame_capacity(8),
    )
    .with_print_handler(silent_handler());
    let dive = interp.declare_proc("dive", ProcKind::Procedure).unwrap();
    // proc dive() { dive() }
    interp
        .define_procedure(
            dive,
            code(|b| {
                b.op(Opcode::Call)
                    .sym(dive)
                    .int(0)
                    .op(Opcode::Pop)
                    .op(Opcode::ProcRet)
                    .stop();
            }),
            LocalLayout::default(),
        )
        .unwrap();

    let err = interp
        .run(code(|b| {
            b.op(Opcode::Call).sym(dive).int(0).op(Opcode::Pop).stop();
        }))
        .unwrap_err();
    assert_eq!(
        err.kind,
        ExecErrorKind::CallNestedTooDeeply {
            name: "dive".to_string(),
        }
    );
    let trace = err.backtrace.unwrap();
    assert_eq!(trace.len(), 5);
    assert!(trace.frames().iter().all(|frame| frame.name == "dive"));
    assert!(trace.to_string().contains("and 3 others"), "{trace}");
    assert_eq!(interp.frame_depth(), 0);
    assert_eq!(interp.stack_depth(), 0);
}

#[test]
fn negative_pointer_subscript_faults() {
    let mut interp = quiet();
    let one = interp.install_constant("ONE", 1.0).unwrap();
    let four = interp.install_constant("FOUR", 4.0).unwrap();
    let x = interp.declare_var("x", &[]).unwrap();
    let y = interp.declare_var("y", &[]).unwrap();
    let peek = |interp: &mut Interpreter, name: &str, negative: bool| {
        // func peek() { return $&1[0] } or $&1[-1]
        define(
            interp,
            name,
            ProcKind::Function,
            code(|b| {
                if negative {
                    b.op(Opcode::ConstPush).sym(one).op(Opcode::Negate);
                } else {
                    b.op(Opcode::PushZero);
                }
                b.op(Opcode::ArgRef)
                    .int(1)
                    .int(1)
                    .op(Opcode::FuncRet)
                    .stop();
            }),
        )
    };
    let at_zero = peek(&mut interp, "at_zero", false);
    let before = peek(&mut interp, "before", true);
    // x = 4
    interp
        .run(code(|b| {
            b.op(Opcode::ConstPush)
                .sym(four)
                .op(Opcode::VarPush)
                .sym(x)
                .op(Opcode::Assign)
                .int(0)
                .op(Opcode::Pop)
                .stop();
        }))
        .unwrap();

    // y = f(&x)
    let call_with_pointer = |f: SymbolId| {
        code(|b| {
            b.op(Opcode::VarPush)
                .sym(x)
                .op(Opcode::EvalPointer)
                .op(Opcode::Call)
                .sym(f)
                .int(1)
                .op(Opcode::VarPush)
                .sym(y)
                .op(Opcode::Assign)
                .int(0)
                .op(Opcode::Pop)
                .stop();
        })
    };
    interp.run(call_with_pointer(at_zero)).unwrap();
    assert_eq!(interp.number_value(y), Some(4.0));

    let err = interp.run(call_with_pointer(before)).unwrap_err();
    assert_eq!(
        err.kind,
        ExecErrorKind::SubscriptOutOfRange {
            name: "$&".to_string(),
        }
    );
    assert_eq!(interp.stack_depth(), 0);
    assert_eq!(interp.frame_depth(), 0);
}

/// `begintemplate T endtemplate T`
fn empty_template(interp: &mut Interpreter) -> SymbolId {
    interp.begin_template("T").unwrap();
    interp.end_template("T").unwrap();
    interp.lookup("T").unwrap()
}

#[test]
fn localobj_is_released_when_the_procedure_returns() {
    let mut interp = quiet();
    let t = empty_template(&mut interp);
    let one = interp.install_constant("ONE", 1.0).unwrap();

    // proc p() { localobj o, q  local n  n = 1  o = new T()  q = new T() }
    let p = interp.declare_proc("p", ProcKind::Procedure).unwrap();
    interp.begin_locals();
    let o = interp.declare_auto_object("o").unwrap();
    let q = interp.declare_auto_object("q").unwrap();
    let n = interp.declare_auto("n").unwrap();
    let layout = interp.end_locals().unwrap();
    assert_eq!(
        layout,
        LocalLayout {
            nauto: 3,
            nobjauto: 2,
        }
    );
    interp
        .define_procedure(
            p,
            code(|b| {
                b.op(Opcode::ConstPush)
                    .sym(one)
                    .op(Opcode::VarPush)
                    .sym(n)
                    .op(Opcode::Assign)
                    .int(0)
                    .op(Opcode::Pop);
                for local in [o, q] {
                    b.op(Opcode::AutoObject)
                        .sym(local)
                        .op(Opcode::NewObj)
                        .sym(t)
                        .int(0)
                        .op(Opcode::Pop);
                }
                b.op(Opcode::ProcRet).stop();
            }),
            layout,
        )
        .unwrap();

    interp
        .run(code(|b| {
            b.op(Opcode::Call).sym(p).int(0).op(Opcode::Pop).stop();
        }))
        .unwrap();
    assert_eq!(interp.live_objects(), 0);
    assert_eq!(interp.stack_depth(), 0);
    assert_eq!(interp.frame_depth(), 0);
}

#[test]
fn returned_localobj_outlives_its_frame() {
    let mut interp = quiet();
    let t = empty_template(&mut interp);
    let r = interp.declare_objref("r", &[]).unwrap();

    // obfunc make() { localobj o  o = new T()  return o }
    let make = interp.declare_proc("make", ProcKind::ObjFunction).unwrap();
    interp.begin_locals();
    let o = interp.declare_auto_object("o").unwrap();
    let layout = interp.end_locals().unwrap();
    interp
        .define_procedure(
            make,
            code(|b| {
                b.op(Opcode::AutoObject)
                    .sym(o)
                    .op(Opcode::NewObj)
                    .sym(t)
                    .int(0)
                    .op(Opcode::Pop)
                    .op(Opcode::AutoObject)
                    .sym(o)
                    .op(Opcode::ObjRet)
                    .stop();
            }),
            layout,
        )
        .unwrap();

    // r = make()
    interp
        .run(code(|b| {
            b.op(Opcode::ObjectVar)
                .sym(r)
                .op(Opcode::Call)
                .sym(make)
                .int(0)
                .op(Opcode::ObjectAsgn)
                .int(0)
                .op(Opcode::Pop)
                .stop();
        }))
        .unwrap();
    let obj = interp.object_value(r, 0).unwrap();
    assert_eq!(interp.refcount(obj), Some(1));
    assert_eq!(interp.live_objects(), 1);
    assert_eq!(interp.stack_depth(), 0);
    assert_eq!(interp.frame_depth(), 0);

    interp.declare_objref("r", &[]).unwrap();
    assert!(!interp.is_live(obj));
}
