use super::*;
use pretty_assertions::assert_eq;

#[test]
fn builder_patches_forward_and_backward_labels() {
    let mut b = CodeBuilder::new();
    let top = b.label();
    let end = b.label();
    b.bind(top);
    b.op(Opcode::ShortFor).rel(end).rel(top);
    b.bind(end);
    b.stop();
    let code = b.finish().expect("labels bound");

    assert_eq!(
        code.words(),
        &[
            Inst::Op(Opcode::ShortFor),
            Inst::Rel(2),
            Inst::Rel(-2),
            Inst::Stop
        ]
    );
    assert_eq!(code.target_at(1), Ok(3));
    assert_eq!(code.target_at(2), Ok(0));
}

#[test]
fn unbound_label_is_an_error() {
    let mut b = CodeBuilder::new();
    let dangling = b.label();
    b.op(Opcode::ShortFor).rel(dangling).rel(dangling).stop();
    assert_eq!(b.finish(), Err(CodeError::UnboundLabel));
}

#[test]
fn zero_offset_is_no_target() {
    let code = Code::from_words(vec![Inst::Op(Opcode::If), Inst::Rel(0), Inst::Stop]);
    assert_eq!(code.optional_target_at(1), Ok(None));
}

#[test]
fn target_outside_body_is_rejected() {
    let code = Code::from_words(vec![Inst::Rel(5), Inst::Stop]);
    assert!(matches!(
        code.target_at(0),
        Err(CodeError::JumpOutOfRange { pos: 0, target: 5, .. })
    ));
}

#[test]
fn typed_accessors_reject_other_words() {
    let code = Code::from_words(vec![Inst::Int(-1), Inst::Stop]);
    assert_eq!(
        code.symbol_at(0),
        Err(CodeError::BadOperand {
            pos: 0,
            expected: 's'
        })
    );
    assert!(code.count_at(0).is_err());
    assert_eq!(code.opcode_at(1), Err(CodeError::ExpectedOpcode { pos: 1 }));
}

#[test]
fn member_cache_only_hits_for_same_template() {
    let cache = MemberCache::new();
    let t1 = TemplateId::new(1);
    let t2 = TemplateId::new(2);
    cache.store(t1, SymbolId::new(9));

    assert_eq!(cache.lookup(t1), Some(SymbolId::new(9)));
    assert_eq!(cache.lookup(t2), None);

    cache.clear();
    assert_eq!(cache.lookup(t1), None);
}

#[test]
fn clear_caches_resets_every_slot() {
    let mut b = CodeBuilder::new();
    b.cache().cache().stop();
    let code = b.finish().unwrap();
    for pos in 0..2 {
        code.cache_at(pos)
            .unwrap()
            .store(TemplateId::new(1), SymbolId::new(0));
    }
    code.clear_caches();
    for pos in 0..2 {
        assert_eq!(code.cache_at(pos).unwrap().get(), None);
    }
}
