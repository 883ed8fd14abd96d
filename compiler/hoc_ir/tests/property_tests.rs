//! Property-based tests for the body encoding.
//!
//! Random straight-line bodies are built with `CodeBuilder`, written as an
//! image through `EncodedBody`, and read back.

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]
#![allow(
    clippy::cast_possible_truncation,
    clippy::redundant_closure_for_method_calls,
    reason = "Proptest macros generate code with these patterns"
)]

use hoc_ir::{validate, CodeBuilder, EncodedBody, Opcode, SymbolId};
use proptest::prelude::*;

const SYMBOLS: u32 = 16;

/// Opcodes without jump operands, so any sequence of them is well formed.
fn straight_line_opcodes() -> Vec<Opcode> {
    Opcode::ALL
        .iter()
        .copied()
        .filter(|op| !op.signature().contains('r'))
        .collect()
}

#[derive(Clone, Debug)]
struct Step {
    op: Opcode,
    syms: Vec<u32>,
    ints: Vec<i32>,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    let ops = straight_line_opcodes();
    (
        prop::sample::select(ops),
        prop::collection::vec(0..SYMBOLS, 5),
        prop::collection::vec(any::<i32>(), 5),
    )
        .prop_map(|(op, syms, ints)| Step { op, syms, ints })
}

fn build(steps: &[Step]) -> hoc_ir::Code {
    let mut b = CodeBuilder::new();
    for step in steps {
        b.op(step.op);
        let (mut s, mut i) = (0, 0);
        for kind in step.op.signature().chars() {
            match kind {
                's' => {
                    b.sym(SymbolId::new(step.syms[s]));
                    s += 1;
                }
                'i' => {
                    b.int(step.ints[i]);
                    i += 1;
                }
                'c' => {
                    b.cache();
                }
                other => panic!("unexpected operand kind {other}"),
            }
        }
    }
    b.stop();
    b.finish().expect("straight-line body")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn generated_bodies_validate(steps in prop::collection::vec(step_strategy(), 0..40)) {
        let code = build(&steps);
        prop_assert!(validate(&code, SYMBOLS as usize).is_ok());
    }

    #[test]
    fn image_round_trip_preserves_bodies(steps in prop::collection::vec(step_strategy(), 0..40)) {
        let code = build(&steps);
        let image = EncodedBody::from_code(&code, |sym| Some(format!("s{}", sym.raw()))).unwrap();
        let bytes = image.to_bytes().unwrap();
        let read = EncodedBody::from_bytes(&bytes).unwrap();
        prop_assert_eq!(&read, &image);

        let decoded = read
            .to_code(|name| {
                let raw = name.trim_start_matches('s').parse::<u32>().unwrap();
                Ok(SymbolId::new(raw))
            })
            .unwrap();
        prop_assert_eq!(decoded, code);
    }

    #[test]
    fn each_symbol_is_named_once(steps in prop::collection::vec(step_strategy(), 1..40)) {
        let code = build(&steps);
        let image = EncodedBody::from_code(&code, |sym| Some(format!("s{}", sym.raw()))).unwrap();
        let mut names = image.symbols.clone();
        names.sort();
        names.dedup();
        prop_assert_eq!(names.len(), image.symbols.len());
    }
}
