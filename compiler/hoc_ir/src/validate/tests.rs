use super::*;
use crate::{CodeBuilder, SymbolId};

fn if_else_body() -> Code {
    let mut b = CodeBuilder::new();
    let (then, next) = (b.label(), b.label());
    b.op(Opcode::If).rel(then).no_target().rel(next);
    b.op(Opcode::PushZero).stop();
    b.bind(then);
    b.op(Opcode::PushZero).op(Opcode::Pop).stop();
    b.bind(next);
    b.stop();
    b.finish().unwrap()
}

#[test]
fn accepts_well_formed_body() {
    assert_eq!(validate(&if_else_body(), 0), Ok(()));
}

#[test]
fn rejects_empty_body() {
    assert_eq!(validate(&Code::from_words(vec![]), 0), Err(CodeError::Empty));
}

#[test]
fn rejects_missing_stop() {
    let code = Code::from_words(vec![Inst::Op(Opcode::PushZero)]);
    assert_eq!(validate(&code, 0), Err(CodeError::MissingStop));
}

#[test]
fn rejects_truncated_instruction() {
    let code = Code::from_words(vec![Inst::Op(Opcode::Call), Inst::Sym(SymbolId::new(0))]);
    assert_eq!(
        validate(&code, 1),
        Err(CodeError::Truncated {
            pos: 0,
            opcode: "call"
        })
    );
}

#[test]
fn rejects_wrong_operand_kind() {
    let code = Code::from_words(vec![Inst::Op(Opcode::VarPush), Inst::Int(3), Inst::Stop]);
    assert_eq!(
        validate(&code, 4),
        Err(CodeError::OperandKind {
            pos: 1,
            opcode: "varpush",
            expected: 's'
        })
    );
}

#[test]
fn rejects_symbol_outside_arena() {
    let code = Code::from_words(vec![
        Inst::Op(Opcode::VarPush),
        Inst::Sym(SymbolId::new(10)),
        Inst::Stop,
    ]);
    assert!(matches!(
        validate(&code, 10),
        Err(CodeError::SymbolOutOfRange { raw: 10, .. })
    ));
}

#[test]
fn rejects_jump_into_operand() {
    let code = Code::from_words(vec![
        Inst::Op(Opcode::ShortFor),
        Inst::Rel(1),
        Inst::Rel(1),
        Inst::Stop,
    ]);
    assert_eq!(
        validate(&code, 0),
        Err(CodeError::JumpIntoOperand { pos: 1, target: 2 })
    );
}

#[test]
fn zero_offset_only_allowed_where_optional() {
    let code = Code::from_words(vec![
        Inst::Op(Opcode::ShortFor),
        Inst::Rel(0),
        Inst::Rel(2),
        Inst::Stop,
    ]);
    assert!(matches!(
        validate(&code, 0),
        Err(CodeError::JumpIntoOperand { pos: 1, .. })
    ));
}

#[test]
fn rejects_stray_operand_word() {
    let code = Code::from_words(vec![Inst::Int(1), Inst::Stop]);
    assert_eq!(validate(&code, 0), Err(CodeError::ExpectedOpcode { pos: 0 }));
}
