use blossom_ast::builder::*;
use blossom_ast::{BinOp, Decl, Literal, Unit};
use blossom_core::{Checker, DiagnosticKind};

fn shapes(functions: Vec<blossom_ast::FunctionDecl>) -> Unit {
    let mut decls = vec![variant(
        "Shape",
        vec![
            ("Circle", vec![real()]),
            ("Square", vec![real()]),
            ("Triangle", vec![real(), real(), real()]),
        ],
    )];
    decls.extend(functions.into_iter().map(Decl::Function));
    unit("shapes", decls)
}

#[test]
fn missing_variant_is_reported_with_its_witness() {
    let f = function(
        "area",
        vec![("s", named("Shape"))],
        vec![match_(
            place("s"),
            named("Shape"),
            vec![
                arm(ctor("Circle", vec![wild()]), vec![]),
                arm(ctor("Square", vec![wild()]), vec![]),
            ],
        )],
    );
    let report = Checker::new().check_unit(&shapes(vec![f]));
    assert_eq!(report.diagnostics.len(), 1, "{:?}", report.diagnostics);
    let d = &report.diagnostics[0];
    assert_eq!(d.kind, DiagnosticKind::NonExhaustiveMatch);
    assert_eq!(d.witnesses, vec!["Triangle(_, _, _)".to_string()]);
    assert_eq!(d.function.as_deref(), Some("area"));
    assert!(report.decision_tables.is_empty());
}

#[test]
fn tuple_of_bools_reports_the_uncovered_half() {
    let f = function(
        "pick",
        vec![("t", tuple_ty(vec![bool_ty(), bool_ty()]))],
        vec![match_(
            place("t"),
            tuple_ty(vec![bool_ty(), bool_ty()]),
            vec![
                arm(tuple_pat(vec![lit_pat(Literal::Bool(false)), wild()]), vec![]),
                arm(
                    tuple_pat(vec![
                        lit_pat(Literal::Bool(true)),
                        lit_pat(Literal::Bool(true)),
                    ]),
                    vec![],
                ),
            ],
        )],
    );
    let report = Checker::new().check_unit(&shapes(vec![f]));
    let missing: Vec<_> = report
        .of_kind(DiagnosticKind::NonExhaustiveMatch)
        .collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].witnesses, vec!["(true, false)".to_string()]);
}

#[test]
fn arm_after_a_catch_all_is_unreachable() {
    let f = function(
        "area",
        vec![("s", named("Shape"))],
        vec![match_(
            place("s"),
            named("Shape"),
            vec![
                arm(ctor("Circle", vec![wild()]), vec![]),
                arm(wild(), vec![]),
                arm(ctor("Square", vec![wild()]).at(30), vec![]),
            ],
        )],
    );
    let report = Checker::new().check_unit(&shapes(vec![f]));
    assert_eq!(report.diagnostics.len(), 1, "{:?}", report.diagnostics);
    let d = &report.diagnostics[0];
    assert_eq!(d.kind, DiagnosticKind::UnreachablePattern);
    assert_eq!(d.span, blossom_ast::span(30, 1));
    assert!(d.message.contains("arm 3"));
    assert_eq!(report.decision_tables["area"].len(), 1);
}

#[test]
fn guarded_arm_does_not_make_a_match_exhaustive() {
    let f = function(
        "sign",
        vec![("x", int())],
        vec![match_(
            place("x"),
            int(),
            vec![guarded(
                bind("n"),
                binary(BinOp::Gt, use_(place("n")), lit_int(0)),
                vec![],
            )],
        )],
    );
    let report = Checker::new().check_unit(&shapes(vec![f]));
    let missing: Vec<_> = report
        .of_kind(DiagnosticKind::NonExhaustiveMatch)
        .collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].witnesses, vec!["_".to_string()]);
}

#[test]
fn unknown_constructor_is_malformed_and_skips_the_rest() {
    let f = function(
        "area",
        vec![("s", named("Shape"))],
        vec![match_(
            place("s"),
            named("Shape"),
            vec![arm(ctor("Hexagon", vec![]).at(12), vec![]), arm(wild(), vec![])],
        )],
    );
    let report = Checker::new().check_unit(&shapes(vec![f]));
    assert_eq!(report.diagnostics.len(), 1, "{:?}", report.diagnostics);
    assert_eq!(report.diagnostics[0].kind, DiagnosticKind::MalformedPattern);
    assert_eq!(report.diagnostics[0].span, blossom_ast::span(12, 1));
}

#[test]
fn exhaustive_match_compiles_to_a_switch() {
    let f = function(
        "area",
        vec![("s", named("Shape"))],
        vec![match_(
            place("s"),
            named("Shape"),
            vec![
                arm(ctor("Circle", vec![bind("r")]), vec![]),
                arm(or(vec![ctor("Square", vec![wild()]), ctor("Triangle", vec![wild(), wild(), wild()])]), vec![]),
            ],
        )],
    );
    let report = Checker::new().check_unit(&shapes(vec![f]));
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
    let table = &report.decision_tables["area"][0];
    let text = table.render();
    assert!(text.contains("switch s"), "{text}");
    assert!(text.contains("case Circle:"), "{text}");
    assert!(text.contains("r = (s as Circle).0"), "{text}");
    assert!(!text.contains("default:"), "{text}");
}
