use super::*;
use crate::errors::ExecErrorKind;
use pretty_assertions::assert_eq;

fn number(table: &mut SymbolTable, name: &str, scope: ScopeId) -> SymbolId {
    table.install(name, SymbolKind::Number(1.0), scope).unwrap()
}

#[test]
fn lookup_prefers_locals_then_active_then_builtin() {
    let mut table = SymbolTable::new();
    let builtin = number(&mut table, "x", ScopeId::BUILTIN);
    let template = table.new_scope(ScopeKind::Template(TemplateId::new(1)));
    let member = number(&mut table, "x", template);
    let locals = table.new_scope(ScopeKind::Local);
    let local = number(&mut table, "x", locals);

    assert_eq!(table.lookup("x", Some(locals), template), Some(local));
    assert_eq!(table.lookup("x", None, template), Some(member));
    assert_eq!(table.lookup("x", None, ScopeId::TOP), Some(builtin));
    assert_eq!(table.lookup("y", None, ScopeId::TOP), None);
}

#[test]
fn top_level_cannot_shadow_builtin() {
    let mut table = SymbolTable::new();
    number(&mut table, "PI", ScopeId::BUILTIN);
    let err = table
        .install("PI", SymbolKind::Number(3.0), ScopeId::TOP)
        .unwrap_err();
    assert!(matches!(err.kind, ExecErrorKind::Definition { .. }));
}

#[test]
fn duplicate_in_same_scope_is_rejected() {
    let mut table = SymbolTable::new();
    number(&mut table, "a", ScopeId::TOP);
    assert!(table
        .install("a", SymbolKind::Undef, ScopeId::TOP)
        .is_err());
}

#[test]
fn removed_symbol_keeps_its_id_but_leaves_scope() {
    let mut table = SymbolTable::new();
    let a = number(&mut table, "a", ScopeId::TOP);
    let b = number(&mut table, "b", ScopeId::TOP);
    assert!(table.remove(a));
    assert_eq!(table.lookup_in("a", ScopeId::TOP), None);
    assert_eq!(table.scope_symbols(ScopeId::TOP), &[b]);
    assert!(matches!(table.get(a).unwrap().kind, SymbolKind::Undef));
    assert_eq!(table.len(), 2);
}

#[test]
fn clear_scope_unlinks_locals() {
    let mut table = SymbolTable::new();
    let locals = table.new_scope(ScopeKind::Local);
    number(&mut table, "i", locals);
    number(&mut table, "j", locals);
    table.clear_scope(locals);
    assert!(table.scope_symbols(locals).is_empty());
}

#[test]
fn shape_from_sizes_floors_with_epsilon() {
    let shape = Arrayinfo::from_sizes("a", &[2.9999999999999, 3.0], 1e-11).unwrap();
    assert_eq!(shape.dims(), &[3, 3]);
    assert_eq!(shape.total(), 9);
}

#[test]
fn shape_rejects_small_and_huge_sizes() {
    let err = Arrayinfo::from_sizes("a", &[0.0], 1e-11).unwrap_err();
    assert_eq!(err.message, "a: subscript < 1");
    let err = Arrayinfo::from_sizes("a", &[100_000.0, 100_000.0], 1e-11).unwrap_err();
    assert_eq!(err.message, "a: total subscript too large");
}

#[test]
fn flat_index_is_row_major_and_bounds_checked() {
    let shape = Arrayinfo::from_dims("m", &[2, 3]).unwrap();
    assert_eq!(shape.flat_index("m", &[1.0, 2.0], 1e-11).unwrap(), 5);
    assert_eq!(shape.flat_index("m", &[0.0, 1.9999999999999], 1e-11).unwrap(), 2);
    let err = shape.flat_index("m", &[2.0, 0.0], 1e-11).unwrap_err();
    assert_eq!(err.message, "m: subscript out of range");
    assert!(shape.flat_index("m", &[-1.0, 0.0], 1e-11).is_err());
    assert!(shape.flat_index("m", &[0.0, -0.5], 1e-11).is_err());
}

#[test]
fn element_names_invert_flat_index() {
    let shape = Arrayinfo::from_dims("m", &[2, 3]).unwrap();
    assert_eq!(shape.element_name("m", 5), "m[1][2]");
    assert_eq!(shape.subscripts(4).as_slice(), &[1, 1]);
}
