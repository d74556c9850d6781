#![forbid(unsafe_code)]

//! Decision trees for well-formed, exhaustive matches.
//!
//! The tree tests one occurrence (a path into the scrutinee) per switch and
//! ends in the arm to run along with where each of its bindings lives.
//! Guarded arms become a guard node whose failure edge continues with the
//! arms below. Alongside the tree, every row gets its own dispatch summary:
//! the constructor tests that select it and its binding occurrences.

use std::fmt;

use blossom_ast::{BindingMode, Span};
use serde::{Deserialize, Serialize};

use super::usefulness::{Budget, Exhausted};
use super::{Ctor, Pat, PatKind, PatternMatrix, ctor_fields, ctor_label, signature};
use crate::catalog::TypeCatalog;
use crate::types::{TyKind, TypeId};

/// One step from a value into one of its fields.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OccStep {
    /// Variant constructor the step goes through, if any.
    pub via: Option<String>,
    pub field: u32,
}

/// A path into the scrutinee, rooted at one of its columns.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Occurrence {
    pub column: u32,
    pub path: Vec<OccStep>,
}

impl Occurrence {
    pub fn root(column: usize) -> Self {
        Occurrence {
            column: column as u32,
            path: Vec::new(),
        }
    }

    fn child(&self, via: Option<String>, field: usize) -> Self {
        let mut path = self.path.clone();
        path.push(OccStep {
            via,
            field: field as u32,
        });
        Occurrence {
            column: self.column,
            path,
        }
    }

    /// Render against the scrutinee names, e.g. `(s as Triangle).2`.
    pub fn display(&self, roots: &[String]) -> String {
        let mut out = roots
            .get(self.column as usize)
            .cloned()
            .unwrap_or_else(|| format!("${}", self.column));
        for step in &self.path {
            out = match &step.via {
                Some(ctor) => format!("({out} as {ctor}).{}", step.field),
                None => format!("{out}.{}", step.field),
            };
        }
        out
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingSite {
    pub name: String,
    pub mode: BindingMode,
    pub occurrence: Occurrence,
}

/// A constructor test on one occurrence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Test {
    pub occurrence: Occurrence,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionTree {
    Leaf {
        arm: usize,
        bindings: Vec<BindingSite>,
    },
    Guard {
        arm: usize,
        bindings: Vec<BindingSite>,
        otherwise: Box<DecisionTree>,
    },
    Switch {
        occurrence: Occurrence,
        cases: Vec<(String, DecisionTree)>,
        default: Option<Box<DecisionTree>>,
    },
    /// No arm applies; unreachable in an exhaustive match except below a guard.
    Fail,
}

/// Per-row dispatch summary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RowDispatch {
    pub arm: usize,
    pub guarded: bool,
    /// Tests selecting the row; one list per or-alternative.
    pub alternatives: Vec<Vec<Test>>,
    /// Bindings of the first alternative.
    pub bindings: Vec<BindingSite>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionTable {
    pub span: Span,
    pub scrutinees: Vec<String>,
    pub tree: DecisionTree,
    pub rows: Vec<RowDispatch>,
}

impl DecisionTable {
    /// Compile `matrix`; the caller has already established it is exhaustive.
    pub fn build(
        catalog: &TypeCatalog,
        matrix: &PatternMatrix,
        scrutinees: Vec<String>,
        span: Span,
        budget: &mut Budget,
    ) -> Result<DecisionTable, Exhausted> {
        let occs: Vec<Occurrence> = (0..matrix.tys.len()).map(Occurrence::root).collect();
        let clauses = matrix
            .rows
            .iter()
            .enumerate()
            .map(|(arm, row)| Clause {
                cols: row.pats.clone(),
                arm,
                guarded: row.guarded,
                bindings: Vec::new(),
            })
            .collect();
        let mut compiler = Compiler { catalog, budget };
        let tree = compiler.compile(clauses, occs.clone(), matrix.tys.clone())?;

        let rows = matrix
            .rows
            .iter()
            .enumerate()
            .map(|(arm, row)| {
                let mut alternatives = vec![Vec::new()];
                let mut bindings = Vec::new();
                for (pat, occ) in row.pats.iter().zip(&occs) {
                    let col = tests(catalog, pat, occ);
                    alternatives = alternatives
                        .iter()
                        .flat_map(|prefix| {
                            col.iter().map(move |t| {
                                let mut v = prefix.clone();
                                v.extend(t.iter().cloned());
                                v
                            })
                        })
                        .collect();
                    first_bindings(catalog, pat, occ, &mut bindings);
                }
                RowDispatch {
                    arm,
                    guarded: row.guarded,
                    alternatives,
                    bindings,
                }
            })
            .collect();

        Ok(DecisionTable {
            span,
            scrutinees,
            tree,
            rows,
        })
    }

    /// Indented text form for `blossom decisions`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        render_tree(&self.tree, &self.scrutinees, 0, &mut out);
        out
    }
}

impl fmt::Display for DecisionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn render_tree(tree: &DecisionTree, roots: &[String], depth: usize, out: &mut String) {
    let pad = "  ".repeat(depth);
    let bindings = |bs: &[BindingSite]| {
        bs.iter()
            .map(|b| format!("{} = {}", b.name, b.occurrence.display(roots)))
            .collect::<Vec<_>>()
            .join(", ")
    };
    match tree {
        DecisionTree::Leaf { arm, bindings: bs } => {
            out.push_str(&format!("{pad}arm {arm} [{}]\n", bindings(bs)));
        }
        DecisionTree::Guard {
            arm,
            bindings: bs,
            otherwise,
        } => {
            out.push_str(&format!("{pad}if guard of arm {arm} [{}]\n", bindings(bs)));
            out.push_str(&format!("{pad}else\n"));
            render_tree(otherwise, roots, depth + 1, out);
        }
        DecisionTree::Switch {
            occurrence,
            cases,
            default,
        } => {
            out.push_str(&format!("{pad}switch {}\n", occurrence.display(roots)));
            for (label, sub) in cases {
                out.push_str(&format!("{pad}case {label}:\n"));
                render_tree(sub, roots, depth + 1, out);
            }
            if let Some(d) = default {
                out.push_str(&format!("{pad}default:\n"));
                render_tree(d, roots, depth + 1, out);
            }
        }
        DecisionTree::Fail => out.push_str(&format!("{pad}fail\n")),
    }
}

fn variant_name(catalog: &TypeCatalog, ty: TypeId, ctor: &Ctor) -> Option<String> {
    match (ctor, catalog.kind(ty)) {
        (Ctor::Variant(id), TyKind::Variant { .. }) => Some(catalog.ctor(*id).name.clone()),
        _ => None,
    }
}

fn tests(catalog: &TypeCatalog, pat: &Pat, occ: &Occurrence) -> Vec<Vec<Test>> {
    match &pat.kind {
        PatKind::Wild | PatKind::Bind { .. } => vec![Vec::new()],
        PatKind::Or(alts) => alts
            .iter()
            .flat_map(|a| tests(catalog, a, occ))
            .collect(),
        PatKind::Ctor { ctor, fields } => {
            let here = Test {
                occurrence: occ.clone(),
                label: ctor_label(catalog, pat.ty, ctor),
            };
            let via = variant_name(catalog, pat.ty, ctor);
            let mut acc = vec![vec![here]];
            for (i, f) in fields.iter().enumerate() {
                let sub = tests(catalog, f, &occ.child(via.clone(), i));
                acc = acc
                    .iter()
                    .flat_map(|prefix| {
                        sub.iter().map(move |t| {
                            let mut v = prefix.clone();
                            v.extend(t.iter().cloned());
                            v
                        })
                    })
                    .collect();
            }
            acc
        }
    }
}

fn first_bindings(catalog: &TypeCatalog, pat: &Pat, occ: &Occurrence, out: &mut Vec<BindingSite>) {
    match &pat.kind {
        PatKind::Wild => {}
        PatKind::Bind { name, mode } => out.push(BindingSite {
            name: name.clone(),
            mode: *mode,
            occurrence: occ.clone(),
        }),
        PatKind::Or(alts) => {
            if let Some(first) = alts.first() {
                first_bindings(catalog, first, occ, out);
            }
        }
        PatKind::Ctor { ctor, fields } => {
            let via = variant_name(catalog, pat.ty, ctor);
            for (i, f) in fields.iter().enumerate() {
                first_bindings(catalog, f, &occ.child(via.clone(), i), out);
            }
        }
    }
}

#[derive(Clone)]
struct Clause {
    cols: Vec<Pat>,
    arm: usize,
    guarded: bool,
    bindings: Vec<BindingSite>,
}

struct Compiler<'a> {
    catalog: &'a TypeCatalog,
    budget: &'a mut Budget,
}

impl Compiler<'_> {
    /// Split or-patterns into separate clauses and move bindings out of the columns.
    fn normalize(&self, clauses: Vec<Clause>, occs: &[Occurrence]) -> Vec<Clause> {
        let mut out = Vec::with_capacity(clauses.len());
        let mut stack: Vec<Clause> = clauses.into_iter().rev().collect();
        while let Some(mut clause) = stack.pop() {
            let or_col = clause
                .cols
                .iter()
                .position(|p| matches!(p.kind, PatKind::Or(_)));
            if let Some(j) = or_col {
                let PatKind::Or(alts) = clause.cols[j].kind.clone() else {
                    continue;
                };
                for alt in alts.into_iter().rev() {
                    let mut c = clause.clone();
                    c.cols[j] = alt;
                    stack.push(c);
                }
                continue;
            }
            for (j, col) in clause.cols.iter_mut().enumerate() {
                if let PatKind::Bind { name, mode } = &col.kind {
                    clause.bindings.push(BindingSite {
                        name: name.clone(),
                        mode: *mode,
                        occurrence: occs[j].clone(),
                    });
                    col.kind = PatKind::Wild;
                }
            }
            out.push(clause);
        }
        out
    }

    fn compile(
        &mut self,
        clauses: Vec<Clause>,
        occs: Vec<Occurrence>,
        tys: Vec<TypeId>,
    ) -> Result<DecisionTree, Exhausted> {
        self.budget.tick()?;
        let clauses = self.normalize(clauses, &occs);
        let Some(first) = clauses.first() else {
            return Ok(DecisionTree::Fail);
        };

        let Some(j) = first.cols.iter().position(|p| !p.is_irrefutable_leaf()) else {
            let arm = first.arm;
            let bindings = first.bindings.clone();
            if first.guarded {
                let rest = clauses[1..].to_vec();
                let otherwise = self.compile(rest, occs, tys)?;
                return Ok(DecisionTree::Guard {
                    arm,
                    bindings,
                    otherwise: Box::new(otherwise),
                });
            }
            return Ok(DecisionTree::Leaf { arm, bindings });
        };

        let ty = tys[j];
        let mut heads: Vec<Ctor> = Vec::new();
        for c in &clauses {
            if let PatKind::Ctor { ctor, .. } = &c.cols[j].kind {
                if !heads.contains(ctor) {
                    heads.push(ctor.clone());
                }
            }
        }

        let mut cases = Vec::with_capacity(heads.len());
        for ctor in &heads {
            let field_tys = ctor_fields(self.catalog, ty, ctor);
            let via = variant_name(self.catalog, ty, ctor);
            let mut sub_occs: Vec<Occurrence> = (0..field_tys.len())
                .map(|i| occs[j].child(via.clone(), i))
                .collect();
            sub_occs.extend(remove_at(&occs, j));
            let mut sub_tys = field_tys.clone();
            sub_tys.extend(remove_at(&tys, j));

            let sub: Vec<Clause> = clauses
                .iter()
                .filter_map(|c| {
                    let mut cols = match &c.cols[j].kind {
                        PatKind::Ctor { ctor: other, fields } if other == ctor => fields.clone(),
                        PatKind::Ctor { .. } => return None,
                        _ => field_tys
                            .iter()
                            .map(|t| Pat::wild(*t, c.cols[j].span))
                            .collect(),
                    };
                    cols.extend(remove_at(&c.cols, j));
                    Some(Clause {
                        cols,
                        arm: c.arm,
                        guarded: c.guarded,
                        bindings: c.bindings.clone(),
                    })
                })
                .collect();
            let label = ctor_label(self.catalog, ty, ctor);
            cases.push((label, self.compile(sub, sub_occs, sub_tys)?));
        }

        let complete = signature(self.catalog, ty)
            .is_some_and(|all| all.iter().all(|c| heads.contains(c)));
        let default = if complete {
            None
        } else {
            let rest: Vec<Clause> = clauses
                .iter()
                .filter(|c| c.cols[j].is_irrefutable_leaf())
                .map(|c| Clause {
                    cols: remove_at(&c.cols, j),
                    arm: c.arm,
                    guarded: c.guarded,
                    bindings: c.bindings.clone(),
                })
                .collect();
            Some(Box::new(self.compile(
                rest,
                remove_at(&occs, j),
                remove_at(&tys, j),
            )?))
        };

        Ok(DecisionTree::Switch {
            occurrence: occs[j].clone(),
            cases,
            default,
        })
    }
}

fn remove_at<T: Clone>(items: &[T], j: usize) -> Vec<T> {
    items
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != j)
        .map(|(_, x)| x.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::build;
    use crate::config::CheckConfig;
    use crate::pattern::{MatrixRow, PatternLowerer};
    use blossom_ast::builder::*;

    fn option_catalog() -> TypeCatalog {
        let u = unit(
            "opt",
            vec![variant(
                "Opt",
                vec![("None", vec![]), ("Some", vec![int()])],
            )],
        );
        build(&u, &CheckConfig::default()).0
    }

    #[test]
    fn switch_on_constructor_with_binding_occurrences() {
        let cat = option_catalog();
        let ty = cat.lookup("Opt").expect("Opt");
        let mut lowerer = PatternLowerer::new(&cat);
        let rows = vec![
            MatrixRow {
                pats: vec![lowerer.lower_arm(&ctor("Some", vec![bind("n")]), ty)],
                guarded: true,
                span: blossom_ast::Span::default(),
            },
            MatrixRow {
                pats: vec![lowerer.lower_arm(&bind("other"), ty)],
                guarded: false,
                span: blossom_ast::Span::default(),
            },
        ];
        let matrix = PatternMatrix {
            rows,
            tys: vec![ty],
        };
        let table = DecisionTable::build(
            &cat,
            &matrix,
            vec!["o".to_string()],
            blossom_ast::Span::default(),
            &mut Budget::new(1000),
        )
        .expect("compiles");

        let DecisionTree::Switch { cases, default, .. } = &table.tree else {
            panic!("expected a switch: {:?}", table.tree);
        };
        assert_eq!(cases[0].0, "Some");
        assert!(default.is_some());
        let DecisionTree::Guard {
            arm,
            bindings,
            otherwise,
        } = &cases[0].1
        else {
            panic!("expected a guard: {:?}", cases[0].1);
        };
        assert_eq!(*arm, 0);
        assert_eq!(bindings[0].occurrence.display(&table.scrutinees), "(o as Some).0");
        assert!(matches!(**otherwise, DecisionTree::Leaf { arm: 1, .. }));

        assert_eq!(table.rows[0].alternatives.len(), 1);
        assert_eq!(table.rows[0].alternatives[0][0].label, "Some");
        assert_eq!(table.rows[1].bindings[0].name, "other");
        assert!(table.render().contains("switch o"));
    }

    #[test]
    fn or_patterns_give_one_test_list_per_alternative() {
        let cat = option_catalog();
        let ty = cat.lookup("Opt").expect("Opt");
        let mut lowerer = PatternLowerer::new(&cat);
        let pat = lowerer.lower_arm(
            &or(vec![ctor("None", vec![]), ctor("Some", vec![wild()])]),
            ty,
        );
        let matrix = PatternMatrix {
            rows: vec![MatrixRow {
                pats: vec![pat],
                guarded: false,
                span: blossom_ast::Span::default(),
            }],
            tys: vec![ty],
        };
        let table = DecisionTable::build(
            &cat,
            &matrix,
            vec!["o".to_string()],
            blossom_ast::Span::default(),
            &mut Budget::new(1000),
        )
        .expect("compiles");
        assert_eq!(table.rows[0].alternatives.len(), 2);
        let DecisionTree::Switch { cases, default, .. } = &table.tree else {
            panic!("expected a switch");
        };
        assert_eq!(cases.len(), 2);
        assert!(default.is_none());
    }
}
