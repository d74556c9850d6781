use blossom_ast::builder::*;
use blossom_ast::{Decl, FunctionDecl, RegionParam, Unit, span};
use blossom_core::{CheckReport, Checker, DiagnosticKind};

fn check(functions: Vec<FunctionDecl>) -> CheckReport {
    let mut decls = vec![
        record("Pair", vec![("a", str_ty()), ("b", str_ty())]),
        Decl::Function(function("consume", vec![("v", str_ty())], vec![])),
        Decl::Function(function("show", vec![("v", str_ty())], vec![])),
    ];
    decls.extend(functions.into_iter().map(Decl::Function));
    let u: Unit = unit("owners", decls);
    Checker::new().check_unit(&u)
}

fn kinds(report: &CheckReport) -> Vec<DiagnosticKind> {
    report.diagnostics.iter().map(|d| d.kind).collect()
}

#[test]
fn use_after_move_points_at_the_move() {
    let report = check(vec![function(
        "f",
        vec![("s", str_ty())],
        vec![
            eval(call("consume", vec![use_(place("s"))])).at(3),
            eval(call("show", vec![use_(place("s"))])).at(8),
        ],
    )]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::UseAfterMove]);
    let d = &report.diagnostics[0];
    assert_eq!(d.span, span(8, 1));
    assert_eq!(d.related[0].span, span(3, 1));
    assert_eq!(d.place.as_deref(), Some("s"));
    assert_eq!(d.function.as_deref(), Some("f"));
}

#[test]
fn copy_values_are_never_moved() {
    let report = check(vec![function(
        "f",
        vec![("n", int())],
        vec![
            let_("a", int(), use_(place("n"))),
            let_("b", int(), use_(place("n"))),
        ],
    )]);
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
}

#[test]
fn two_shared_borrows_coexist() {
    let report = check(vec![function(
        "f",
        vec![],
        vec![
            let_("x", str_ty(), lit_str("a")),
            let_("r1", ref_ty(str_ty()), borrow(place("x"))),
            let_("r2", ref_ty(str_ty()), borrow(place("x"))),
        ],
    )]);
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
}

#[test]
fn unique_borrow_while_shared_conflicts() {
    let report = check(vec![function(
        "f",
        vec![],
        vec![
            let_("x", str_ty(), lit_str("a")),
            let_("r1", ref_ty(str_ty()), borrow(place("x"))).at(4),
            let_("r2", ref_mut_ty(str_ty()), borrow_mut(place("x"))).at(9),
        ],
    )]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::ConflictingBorrow]);
    let d = &report.diagnostics[0];
    assert_eq!(d.span, span(9, 1));
    assert_eq!(d.related[0].span, span(4, 1));
}

#[test]
fn moving_a_borrowed_value_is_rejected() {
    let report = check(vec![function(
        "f",
        vec![("s", str_ty())],
        vec![
            let_("r", ref_ty(str_ty()), borrow(place("s"))).at(2),
            eval(call("consume", vec![use_(place("s"))])).at(6),
        ],
    )]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::MoveOfBorrowed]);
    assert_eq!(report.diagnostics[0].span, span(6, 1));
}

#[test]
fn disjoint_fields_move_independently() {
    let report = check(vec![function(
        "f",
        vec![("p", named("Pair"))],
        vec![
            eval(call("consume", vec![use_(place("p").field("a"))])),
            eval(call("consume", vec![use_(place("p").field("b"))])),
        ],
    )]);
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
}

#[test]
fn reading_the_whole_after_a_field_moved_names_the_field() {
    let report = check(vec![function(
        "f",
        vec![("p", named("Pair"))],
        vec![
            eval(call("consume", vec![use_(place("p").field("a"))])).at(1),
            let_("q", named("Pair"), use_(place("p"))).at(5),
        ],
    )]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::UseAfterMove]);
    assert!(report.diagnostics[0].message.contains("`p.0` was moved"));
}

#[test]
fn reassignment_restores_a_moved_local() {
    let report = check(vec![function(
        "f",
        vec![("s", str_ty())],
        vec![
            eval(call("consume", vec![use_(place("s"))])),
            assign(place("s"), lit_str("again")),
            eval(call("show", vec![use_(place("s"))])),
        ],
    )]);
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
}

#[test]
fn borrow_escaping_its_scope_outlives_the_owner() {
    let report = check(vec![function(
        "f",
        vec![],
        vec![
            declare("r", ref_ty(str_ty())),
            scope(vec![
                let_("y", str_ty(), lit_str("short")),
                assign(place("r"), borrow(place("y"))).at(7),
            ]),
        ],
    )]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::BorrowOutlivesOwner]);
    let d = &report.diagnostics[0];
    assert_eq!(d.span, span(7, 1));
    assert_eq!(d.place.as_deref(), Some("y"));
}

#[test]
fn cyclic_region_declarations_are_reported() {
    let mut f = function("f", vec![], vec![]);
    f.regions = vec![
        RegionParam {
            name: ident("a"),
            outlives: vec![ident("b")],
        },
        RegionParam {
            name: ident("b"),
            outlives: vec![ident("a")],
        },
    ];
    let report = check(vec![f]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::RegionCycle]);
}
