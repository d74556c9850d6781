use std::collections::BTreeSet;

use blossom_ast::builder::*;
use blossom_ast::{Decl, Pattern};
use blossom_core::{CheckReport, Checker, DiagnosticKind};
use proptest::{
    prelude::prop,
    test_runner::{Config, TestCaseError, TestRunner},
};

const CTORS: [(&str, usize); 3] = [("Circle", 1), ("Square", 1), ("Triangle", 3)];
const WILD: u8 = 3;

fn pattern(choice: u8, offset: usize) -> Pattern {
    match CTORS.get(choice as usize) {
        Some((name, arity)) => ctor(name, (0..*arity).map(|_| wild()).collect()).at(offset),
        None => wild().at(offset),
    }
}

fn check_arms(choices: &[u8]) -> CheckReport {
    let arms = choices
        .iter()
        .enumerate()
        .map(|(i, c)| arm(pattern(*c, 10 * (i + 1)), vec![]))
        .collect();
    let u = unit(
        "props",
        vec![
            variant(
                "Shape",
                vec![
                    ("Circle", vec![real()]),
                    ("Square", vec![real()]),
                    ("Triangle", vec![real(), real(), real()]),
                ],
            ),
            Decl::Function(function(
                "f",
                vec![("s", named("Shape"))],
                vec![match_(place("s"), named("Shape"), arms)],
            )),
        ],
    );
    Checker::new().check_unit(&u)
}

/// Arms a first-match reading of `choices` can never select.
fn expected_unreachable(choices: &[u8]) -> Vec<usize> {
    let mut seen = BTreeSet::new();
    let mut wild_seen = false;
    let mut dead = Vec::new();
    for (i, c) in choices.iter().enumerate() {
        if wild_seen || seen.contains(c) {
            dead.push(i);
        }
        if *c == WILD {
            wild_seen = true;
        }
        seen.insert(*c);
    }
    dead
}

fn witnesses(report: &CheckReport) -> Vec<String> {
    report
        .of_kind(DiagnosticKind::NonExhaustiveMatch)
        .flat_map(|d| d.witnesses.clone())
        .collect()
}

fn runner() -> TestRunner {
    TestRunner::new(Config {
        cases: 64,
        failure_persistence: None,
        ..Config::default()
    })
}

#[test]
fn verdicts_follow_first_match_semantics() {
    runner()
        .run(&prop::collection::vec(0u8..4, 1..7), |choices| {
            let report = check_arms(&choices);

            let covers_all = choices.contains(&WILD) || (0u8..3).all(|c| choices.contains(&c));
            let missing = witnesses(&report);
            if covers_all != missing.is_empty() {
                return Err(TestCaseError::fail(format!(
                    "{choices:?}: expected exhaustive={covers_all}, witnesses {missing:?}"
                )));
            }

            let unreachable: Vec<usize> = report
                .of_kind(DiagnosticKind::UnreachablePattern)
                .map(|d| d.span.offset / 10 - 1)
                .collect();
            let expected = expected_unreachable(&choices);
            if unreachable != expected {
                return Err(TestCaseError::fail(format!(
                    "{choices:?}: unreachable {unreachable:?}, expected {expected:?}"
                )));
            }
            Ok(())
        })
        .expect("property holds");
}

#[test]
fn checking_is_deterministic() {
    runner()
        .run(&prop::collection::vec(0u8..4, 1..7), |choices| {
            let first = check_arms(&choices);
            let second = check_arms(&choices);
            if first.diagnostics != second.diagnostics {
                return Err(TestCaseError::fail(format!("{choices:?}: reports differ")));
            }
            Ok(())
        })
        .expect("property holds");
}

#[test]
fn dropping_unreachable_arms_keeps_the_verdict() {
    runner()
        .run(&prop::collection::vec(0u8..4, 1..7), |choices| {
            let before = check_arms(&choices);
            let dead = expected_unreachable(&choices);
            let live: Vec<u8> = choices
                .iter()
                .enumerate()
                .filter(|(i, _)| !dead.contains(i))
                .map(|(_, c)| *c)
                .collect();
            let after = check_arms(&live);
            if witnesses(&before) != witnesses(&after) {
                return Err(TestCaseError::fail(format!(
                    "{choices:?} -> {live:?}: witnesses changed"
                )));
            }
            if after.of_kind(DiagnosticKind::UnreachablePattern).count() != 0 {
                return Err(TestCaseError::fail(format!("{live:?}: still has dead arms")));
            }
            Ok(())
        })
        .expect("property holds");
}
