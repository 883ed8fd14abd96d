//! Property-based tests for the interpreter's bookkeeping.
//!
//! Each property drives the public host API with generated input and checks
//! an invariant the engine must keep after every statement:
//! 1. Stack balance: a statement leaves the evaluation stack empty
//! 2. Reference counts equal the number of cells holding each object
//! 3. Declared arrays expose exactly the elements their shape describes

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]
#![allow(
    clippy::cast_precision_loss,
    clippy::redundant_closure_for_method_calls,
    reason = "Proptest macros generate code with these patterns"
)]

use hoc_vm::{
    silent_handler, CodeBuilder, DataValue, ExecMode, Interpreter, ObjectId, Opcode, SymbolId,
    VmConfig,
};
use proptest::prelude::*;

fn interpreter() -> Interpreter {
    Interpreter::with_config(VmConfig::for_mode(ExecMode::Embedded))
        .with_print_handler(silent_handler())
}

// -- Stack balance --

#[derive(Clone, Debug)]
enum Expr {
    Leaf(u8),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
}

impl Expr {
    fn value(&self) -> f64 {
        match self {
            Expr::Leaf(k) => f64::from(*k),
            Expr::Add(a, b) => a.value() + b.value(),
            Expr::Sub(a, b) => a.value() - b.value(),
            Expr::Mul(a, b) => a.value() * b.value(),
            Expr::Neg(a) => -a.value(),
        }
    }

    fn emit(&self, b: &mut CodeBuilder, leaves: &[SymbolId]) {
        let binary = |b: &mut CodeBuilder, x: &Expr, y: &Expr, op: Opcode| {
            x.emit(b, leaves);
            y.emit(b, leaves);
            b.op(op);
        };
        match self {
            Expr::Leaf(k) => {
                b.op(Opcode::ConstPush).sym(leaves[usize::from(*k)]);
            }
            Expr::Add(x, y) => binary(b, x, y, Opcode::Add),
            Expr::Sub(x, y) => binary(b, x, y, Opcode::Sub),
            Expr::Mul(x, y) => binary(b, x, y, Opcode::Mul),
            Expr::Neg(x) => {
                x.emit(b, leaves);
                b.op(Opcode::Negate);
            }
        }
    }
}

fn expr_strategy() -> impl Strategy<Value = Expr> {
    let leaf = (0u8..10).prop_map(Expr::Leaf);
    leaf.prop_recursive(4, 32, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Expr::Add(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Expr::Sub(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Expr::Mul(Box::new(a), Box::new(b))),
            inner.prop_map(|a| Expr::Neg(Box::new(a))),
        ]
    })
}

// -- Reference counts --

#[derive(Clone, Debug)]
enum RefOp {
    /// `a[slot] = new T()`
    Create(usize),
    /// `a[to] = a[from]`
    Copy { from: usize, to: usize },
    /// `a[slot] = nil`
    Clear(usize),
}

const SLOTS: usize = 6;

fn ref_op_strategy() -> impl Strategy<Value = RefOp> {
    prop_oneof![
        (0..SLOTS).prop_map(RefOp::Create),
        (0..SLOTS, 0..SLOTS).prop_map(|(from, to)| RefOp::Copy { from, to }),
        (0..SLOTS).prop_map(RefOp::Clear),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn statements_leave_the_stack_empty(expr in expr_strategy()) {
        let mut interp = interpreter();
        let leaves: Vec<SymbolId> = (0u8..10)
            .map(|k| interp.install_constant(&format!("K{k}"), f64::from(k)).unwrap())
            .collect();
        let x = interp.declare_var("x", &[]).unwrap();

        let mut b = CodeBuilder::new();
        expr.emit(&mut b, &leaves);
        b.op(Opcode::VarPush).sym(x).op(Opcode::Assign).int(0).op(Opcode::Pop).stop();
        interp.run(b.finish().unwrap()).unwrap();

        prop_assert_eq!(interp.stack_depth(), 0);
        prop_assert_eq!(interp.frame_depth(), 0);
        prop_assert_eq!(interp.number_value(x), Some(expr.value()));
    }

    #[test]
    fn refcounts_track_holding_cells(ops in prop::collection::vec(ref_op_strategy(), 1..40)) {
        let mut interp = interpreter();
        let tid = interp.begin_template("T").unwrap();
        interp.end_template("T").unwrap();
        let a = interp.declare_objref("a", &[SLOTS]).unwrap();

        let mut model: [Option<ObjectId>; SLOTS] = [None; SLOTS];
        let mut created = Vec::new();
        for op in ops {
            match op {
                RefOp::Create(slot) => {
                    let owned = interp.new_object(tid, &[]).unwrap();
                    let id = owned.id().unwrap();
                    interp.set_object(a, slot, Some(id)).unwrap();
                    interp.release_owned(owned).unwrap();
                    model[slot] = Some(id);
                    created.push(id);
                }
                RefOp::Copy { from, to } => {
                    interp.set_object(a, to, model[from]).unwrap();
                    model[to] = model[from];
                }
                RefOp::Clear(slot) => {
                    interp.set_object(a, slot, None).unwrap();
                    model[slot] = None;
                }
            }

            for &id in &created {
                let holders = model.iter().filter(|held| **held == Some(id)).count();
                if holders == 0 {
                    prop_assert!(!interp.is_live(id));
                } else {
                    prop_assert_eq!(interp.refcount(id), Some(u32::try_from(holders).unwrap()));
                }
            }
            let mut live: Vec<ObjectId> = model.iter().flatten().copied().collect();
            live.sort_by_key(|id| id.raw());
            live.dedup();
            prop_assert_eq!(interp.live_objects(), live.len());
        }

        interp.declare_objref("a", &[]).unwrap();
        prop_assert_eq!(interp.live_objects(), 0);
    }

    #[test]
    fn arrays_hold_the_product_of_their_dimensions(
        dims in prop::collection::vec(1usize..5, 0..4),
    ) {
        let mut interp = interpreter();
        let v = interp.declare_var("v", &dims).unwrap();
        let total: usize = dims.iter().product();

        let DataValue::Numbers { dims: seen, values } = interp.read_data(None, v).unwrap() else {
            panic!("v is numeric");
        };
        prop_assert_eq!(&seen, &dims);
        prop_assert_eq!(values.len(), total);
        prop_assert!(values.iter().all(|value| *value == 0.0));

        let filled: Vec<f64> = (0..total).map(|i| i as f64).collect();
        interp
            .write_data(None, v, DataValue::Numbers { dims: dims.clone(), values: filled.clone() })
            .unwrap();
        let DataValue::Numbers { values, .. } = interp.read_data(None, v).unwrap() else {
            panic!("v is numeric");
        };
        prop_assert_eq!(values, filled);
    }
}
