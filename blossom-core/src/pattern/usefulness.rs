#![forbid(unsafe_code)]

//! Usefulness over hash-consed pattern rows.
//!
//! Sub-patterns are interned so equal sub-matrices share keys; both the
//! witness search and the usefulness query memoize on (rows, column types).
//! Or-patterns in the head column are expanded into one row per alternative
//! before specializing. Every recursive step is charged against a
//! [`Budget`]; running out aborts the whole query.

use std::collections::HashMap;

use blossom_ast::Span;
use thiserror::Error;

use super::witness::Witness;
use super::{Ctor, Pat, PatKind, PatternMatrix, ctor_fields, signature};
use crate::catalog::TypeCatalog;
use crate::types::TypeId;

/// Upper bound on witnesses kept per sub-problem.
const MAX_WITNESSES: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("pattern analysis exceeded {limit} specialization steps")]
pub struct Exhausted {
    pub limit: usize,
}

#[derive(Clone, Debug)]
pub struct Budget {
    limit: usize,
    used: usize,
}

impl Budget {
    pub fn new(limit: usize) -> Self {
        Budget { limit, used: 0 }
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn tick(&mut self) -> Result<(), Exhausted> {
        self.used += 1;
        if self.used > self.limit {
            return Err(Exhausted { limit: self.limit });
        }
        Ok(())
    }
}

/// An or-alternative that can never be the one that matches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedundantAlternative {
    pub row: usize,
    pub alternative: usize,
    pub span: Span,
}

/// Result of checking a pattern matrix.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatchCheck {
    /// Value vectors matched by no unguarded row; empty iff exhaustive.
    pub witnesses: Vec<Vec<Witness>>,
    /// Rows that are not useful with respect to the unguarded rows above them.
    pub unreachable: Vec<usize>,
    pub redundant_alternatives: Vec<RedundantAlternative>,
}

impl MatchCheck {
    pub fn is_exhaustive(&self) -> bool {
        self.witnesses.is_empty()
    }
}

/// Check exhaustiveness and per-row reachability of `matrix`.
pub fn check(
    catalog: &TypeCatalog,
    matrix: &PatternMatrix,
    budget: &mut Budget,
) -> Result<MatchCheck, Exhausted> {
    let mut engine = Engine::new(catalog, budget);
    let tys = matrix.tys.clone();
    let mut result = MatchCheck::default();
    let mut seen: Vec<Vec<PatId>> = Vec::new();

    for (i, row) in matrix.rows.iter().enumerate() {
        let ids: Vec<PatId> = row.pats.iter().map(|p| engine.intern(p)).collect();
        if !engine.useful(&seen, &ids, &tys)? {
            result.unreachable.push(i);
        } else {
            // Each alternative of every or-pattern, wherever it is nested, must
            // add something over the rows above and its earlier siblings.
            for (col, pat) in row.pats.iter().enumerate() {
                for site in or_sites(pat) {
                    let mut prefix = seen.clone();
                    for (j, (span, variant)) in site.into_iter().enumerate() {
                        let mut q = ids.clone();
                        q[col] = engine.intern(&variant);
                        if !engine.useful(&prefix, &q, &tys)? {
                            result.redundant_alternatives.push(RedundantAlternative {
                                row: i,
                                alternative: j,
                                span,
                            });
                        }
                        prefix.push(q);
                    }
                }
            }
        }
        if !row.guarded {
            seen.push(ids);
        }
    }

    result.witnesses = engine.missing(&seen, &tys)?;
    tracing::trace!(
        rows = matrix.rows.len(),
        steps = engine.budget.used(),
        "pattern matrix checked"
    );
    Ok(result)
}

/// One entry per or-pattern inside `pat`: for each of its alternatives, the
/// alternative's span and `pat` with the or-pattern narrowed to it.
fn or_sites(pat: &Pat) -> Vec<Vec<(Span, Pat)>> {
    let rebuild = |kind: PatKind| Pat {
        kind,
        ty: pat.ty,
        span: pat.span,
    };
    match &pat.kind {
        PatKind::Wild | PatKind::Bind { .. } => Vec::new(),
        PatKind::Ctor { ctor, fields } => {
            let mut sites = Vec::new();
            for (i, field) in fields.iter().enumerate() {
                for site in or_sites(field) {
                    sites.push(
                        site.into_iter()
                            .map(|(span, narrowed)| {
                                let mut fields = fields.clone();
                                fields[i] = narrowed;
                                let kind = PatKind::Ctor {
                                    ctor: ctor.clone(),
                                    fields,
                                };
                                (span, rebuild(kind))
                            })
                            .collect(),
                    );
                }
            }
            sites
        }
        PatKind::Or(alts) => {
            let mut sites = vec![alts.iter().map(|a| (a.span, a.clone())).collect()];
            for (k, alt) in alts.iter().enumerate() {
                for site in or_sites(alt) {
                    sites.push(
                        site.into_iter()
                            .map(|(span, narrowed)| {
                                let mut alts = alts.clone();
                                alts[k] = narrowed;
                                (span, rebuild(PatKind::Or(alts)))
                            })
                            .collect(),
                    );
                }
            }
            sites
        }
    }
}

type PatId = u32;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Node {
    Wild,
    Ctor(Ctor, Vec<PatId>),
    Or(Vec<PatId>),
}

type Rows = Vec<Vec<PatId>>;

struct Engine<'a> {
    catalog: &'a TypeCatalog,
    budget: &'a mut Budget,
    nodes: Vec<Node>,
    ids: HashMap<Node, PatId>,
    wild: PatId,
    missing_memo: HashMap<(Rows, Vec<TypeId>), Vec<Vec<Witness>>>,
    useful_memo: HashMap<(Rows, Vec<PatId>, Vec<TypeId>), bool>,
}

impl<'a> Engine<'a> {
    fn new(catalog: &'a TypeCatalog, budget: &'a mut Budget) -> Self {
        let mut engine = Engine {
            catalog,
            budget,
            nodes: Vec::new(),
            ids: HashMap::new(),
            wild: 0,
            missing_memo: HashMap::new(),
            useful_memo: HashMap::new(),
        };
        engine.wild = engine.node(Node::Wild);
        engine
    }

    fn node(&mut self, node: Node) -> PatId {
        if let Some(id) = self.ids.get(&node) {
            return *id;
        }
        let id = self.nodes.len() as PatId;
        self.nodes.push(node.clone());
        self.ids.insert(node, id);
        id
    }

    fn intern(&mut self, pat: &Pat) -> PatId {
        let node = match &pat.kind {
            PatKind::Wild | PatKind::Bind { .. } => Node::Wild,
            PatKind::Ctor { ctor, fields } => {
                let fields = fields.iter().map(|f| self.intern(f)).collect();
                Node::Ctor(ctor.clone(), fields)
            }
            PatKind::Or(alts) => Node::Or(alts.iter().map(|a| self.intern(a)).collect()),
        };
        self.node(node)
    }

    fn wilds(&self, n: usize) -> Vec<PatId> {
        vec![self.wild; n]
    }

    /// Replace rows whose head is an or-pattern by one row per alternative.
    fn expand(&self, rows: &[Vec<PatId>]) -> Rows {
        let mut out = Vec::with_capacity(rows.len());
        let mut stack: Vec<Vec<PatId>> = Vec::new();
        for row in rows {
            stack.push(row.clone());
            while let Some(r) = stack.pop() {
                match r.first().map(|h| &self.nodes[*h as usize]) {
                    Some(Node::Or(alts)) => {
                        // Reverse so alternatives keep their order.
                        for alt in alts.iter().rev() {
                            let mut nr = Vec::with_capacity(r.len());
                            nr.push(*alt);
                            nr.extend_from_slice(&r[1..]);
                            stack.push(nr);
                        }
                    }
                    _ => out.push(r),
                }
            }
        }
        out
    }

    fn head_ctors(&self, rows: &[Vec<PatId>]) -> Vec<Ctor> {
        let mut heads: Vec<Ctor> = Vec::new();
        for row in rows {
            if let Some(Node::Ctor(c, _)) = row.first().map(|h| &self.nodes[*h as usize]) {
                if !heads.contains(c) {
                    heads.push(c.clone());
                }
            }
        }
        heads
    }

    fn specialize(&self, rows: &[Vec<PatId>], ctor: &Ctor, arity: usize) -> Rows {
        let mut out = Vec::new();
        for row in rows {
            let Some(head) = row.first() else { continue };
            match &self.nodes[*head as usize] {
                Node::Wild => {
                    let mut nr = self.wilds(arity);
                    nr.extend_from_slice(&row[1..]);
                    out.push(nr);
                }
                Node::Ctor(c, fields) if c == ctor => {
                    let mut nr = fields.clone();
                    nr.extend_from_slice(&row[1..]);
                    out.push(nr);
                }
                // Rows are expanded before specializing.
                Node::Ctor(..) | Node::Or(_) => {}
            }
        }
        out
    }

    fn default_rows(&self, rows: &[Vec<PatId>]) -> Rows {
        rows.iter()
            .filter(|row| {
                row.first()
                    .is_some_and(|h| matches!(self.nodes[*h as usize], Node::Wild))
            })
            .map(|row| row[1..].to_vec())
            .collect()
    }

    /// True when the signature of the head column is covered by `heads`.
    fn complete(&self, ty: TypeId, heads: &[Ctor]) -> Option<Vec<Ctor>> {
        let all = signature(self.catalog, ty)?;
        if all.iter().all(|c| heads.contains(c)) {
            Some(all)
        } else {
            None
        }
    }

    fn useful(
        &mut self,
        rows: &[Vec<PatId>],
        query: &[PatId],
        tys: &[TypeId],
    ) -> Result<bool, Exhausted> {
        self.budget.tick()?;
        let Some((&head_ty, rest_tys)) = tys.split_first() else {
            return Ok(rows.is_empty());
        };
        let key = (rows.to_vec(), query.to_vec(), tys.to_vec());
        if let Some(hit) = self.useful_memo.get(&key) {
            return Ok(*hit);
        }

        let rows = self.expand(rows);
        let q_head = query[0];
        let result = match self.nodes[q_head as usize].clone() {
            Node::Or(alts) => {
                let mut any = false;
                for alt in alts {
                    let mut q = vec![alt];
                    q.extend_from_slice(&query[1..]);
                    if self.useful(&rows, &q, tys)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            Node::Ctor(ctor, fields) => {
                let field_tys = ctor_fields(self.catalog, head_ty, &ctor);
                let spec = self.specialize(&rows, &ctor, fields.len());
                let mut q = fields;
                q.extend_from_slice(&query[1..]);
                let mut sub_tys = field_tys;
                sub_tys.extend_from_slice(rest_tys);
                self.useful(&spec, &q, &sub_tys)?
            }
            Node::Wild => {
                let heads = self.head_ctors(&rows);
                match self.complete(head_ty, &heads) {
                    Some(all) => {
                        let mut any = false;
                        for ctor in all {
                            let field_tys = ctor_fields(self.catalog, head_ty, &ctor);
                            let spec = self.specialize(&rows, &ctor, field_tys.len());
                            let mut q = self.wilds(field_tys.len());
                            q.extend_from_slice(&query[1..]);
                            let mut sub_tys = field_tys;
                            sub_tys.extend_from_slice(rest_tys);
                            if self.useful(&spec, &q, &sub_tys)? {
                                any = true;
                                break;
                            }
                        }
                        any
                    }
                    None => {
                        let d = self.default_rows(&rows);
                        self.useful(&d, &query[1..], rest_tys)?
                    }
                }
            }
        };
        self.useful_memo.insert(key, result);
        Ok(result)
    }

    /// Value vectors (one witness per column) matched by no row.
    fn missing(&mut self, rows: &[Vec<PatId>], tys: &[TypeId]) -> Result<Vec<Vec<Witness>>, Exhausted> {
        self.budget.tick()?;
        let Some((&head_ty, rest_tys)) = tys.split_first() else {
            return Ok(if rows.is_empty() { vec![Vec::new()] } else { Vec::new() });
        };
        let key = (rows.to_vec(), tys.to_vec());
        if let Some(hit) = self.missing_memo.get(&key) {
            return Ok(hit.clone());
        }

        let rows = self.expand(rows);
        let heads = self.head_ctors(&rows);
        let mut out: Vec<Vec<Witness>> = Vec::new();

        if let Some(all) = self.complete(head_ty, &heads) {
            'ctors: for ctor in all {
                let field_tys = ctor_fields(self.catalog, head_ty, &ctor);
                let arity = field_tys.len();
                let spec = self.specialize(&rows, &ctor, arity);
                let mut sub_tys = field_tys;
                sub_tys.extend_from_slice(rest_tys);
                for w in self.missing(&spec, &sub_tys)? {
                    let (fields, tail) = w.split_at(arity);
                    let mut v = Vec::with_capacity(tail.len() + 1);
                    v.push(Witness::Ctor(ctor.clone(), fields.to_vec()));
                    v.extend_from_slice(tail);
                    out.push(v);
                    if out.len() >= MAX_WITNESSES {
                        break 'ctors;
                    }
                }
            }
        } else {
            let d = self.default_rows(&rows);
            let tails = self.missing(&d, rest_tys)?;
            if !tails.is_empty() {
                let heads_missing: Vec<Witness> = match signature(self.catalog, head_ty) {
                    Some(all) if !heads.is_empty() => all
                        .into_iter()
                        .filter(|c| !heads.contains(c))
                        .map(|c| {
                            let arity = ctor_fields(self.catalog, head_ty, &c).len();
                            Witness::Ctor(c, vec![Witness::Wild; arity])
                        })
                        .collect(),
                    _ => vec![Witness::Wild],
                };
                'outer: for h in &heads_missing {
                    for tail in &tails {
                        let mut v = Vec::with_capacity(tail.len() + 1);
                        v.push(h.clone());
                        v.extend_from_slice(tail);
                        out.push(v);
                        if out.len() >= MAX_WITNESSES {
                            break 'outer;
                        }
                    }
                }
            }
        }

        self.missing_memo.insert(key, out.clone());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::build;
    use crate::config::CheckConfig;
    use crate::pattern::{MatrixRow, PatternLowerer};
    use blossom_ast::builder::*;
    use blossom_ast::{Decl, Literal, Pattern};

    fn shapes() -> TypeCatalog {
        let u = unit(
            "shapes",
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
                    "pairs",
                    vec![("p", tuple_ty(vec![bool_ty(), int()]))],
                    vec![],
                )),
            ],
        );
        build(&u, &CheckConfig::default()).0
    }

    fn matrix(cat: &TypeCatalog, ty: TypeId, pats: Vec<Pattern>) -> PatternMatrix {
        let mut lowerer = PatternLowerer::new(cat);
        let rows = pats
            .iter()
            .map(|p| MatrixRow {
                pats: vec![lowerer.lower_arm(p, ty)],
                guarded: false,
                span: p.span,
            })
            .collect();
        assert!(lowerer.errors().is_empty(), "{:?}", lowerer.errors());
        PatternMatrix {
            rows,
            tys: vec![ty],
        }
    }

    #[test]
    fn missing_constructor_is_the_witness() {
        let cat = shapes();
        let shape = cat.lookup("Shape").expect("Shape");
        let m = matrix(
            &cat,
            shape,
            vec![ctor("Circle", vec![wild()]), ctor("Square", vec![wild()])],
        );
        let res = check(&cat, &m, &mut Budget::new(1000)).expect("within budget");
        assert_eq!(res.witnesses.len(), 1);
        let Witness::Ctor(Ctor::Variant(id), fields) = &res.witnesses[0][0] else {
            panic!("unexpected {:?}", res.witnesses);
        };
        assert_eq!(cat.ctor(*id).name, "Triangle");
        assert_eq!(fields.len(), 3);
        assert!(res.unreachable.is_empty());
    }

    #[test]
    fn row_after_wildcard_is_unreachable() {
        let cat = shapes();
        let shape = cat.lookup("Shape").expect("Shape");
        let m = matrix(
            &cat,
            shape,
            vec![ctor("Circle", vec![wild()]), wild(), ctor("Square", vec![wild()])],
        );
        let res = check(&cat, &m, &mut Budget::new(1000)).expect("within budget");
        assert!(res.is_exhaustive());
        assert_eq!(res.unreachable, vec![2]);
    }

    #[test]
    fn tuple_of_bool_and_int_needs_a_catch_all() {
        let cat = shapes();
        let ty = cat.function("pairs").expect("pairs").params[0].1;
        let m = matrix(
            &cat,
            ty,
            vec![
                tuple_pat(vec![lit_pat(Literal::Bool(false)), wild()]),
                tuple_pat(vec![lit_pat(Literal::Bool(true)), lit_pat(Literal::Int(0))]),
            ],
        );
        let res = check(&cat, &m, &mut Budget::new(1000)).expect("within budget");
        assert_eq!(
            res.witnesses,
            vec![vec![Witness::Ctor(
                Ctor::Tuple(2),
                vec![Witness::Ctor(Ctor::Bool(true), vec![]), Witness::Wild]
            )]]
        );
    }

    #[test]
    fn redundant_or_alternative_is_reported() {
        let cat = shapes();
        let shape = cat.lookup("Shape").expect("Shape");
        let m = matrix(
            &cat,
            shape,
            vec![
                ctor("Circle", vec![wild()]),
                or(vec![ctor("Square", vec![wild()]), ctor("Circle", vec![wild()]).at(7)]),
                wild(),
            ],
        );
        let res = check(&cat, &m, &mut Budget::new(1000)).expect("within budget");
        assert!(res.unreachable.is_empty());
        assert_eq!(
            res.redundant_alternatives,
            vec![RedundantAlternative {
                row: 1,
                alternative: 1,
                span: blossom_ast::span(7, 1),
            }]
        );
    }

    #[test]
    fn nested_or_alternative_is_reported() {
        let cat = shapes();
        let ty = cat.function("pairs").expect("pairs").params[0].1;
        let m = matrix(
            &cat,
            ty,
            vec![
                tuple_pat(vec![lit_pat(Literal::Bool(false)), wild()]),
                tuple_pat(vec![
                    or(vec![
                        lit_pat(Literal::Bool(true)),
                        lit_pat(Literal::Bool(false)).at(42),
                    ]),
                    wild(),
                ]),
            ],
        );
        let res = check(&cat, &m, &mut Budget::new(1000)).expect("within budget");
        assert!(res.unreachable.is_empty());
        assert!(res.is_exhaustive());
        assert_eq!(
            res.redundant_alternatives,
            vec![RedundantAlternative {
                row: 1,
                alternative: 1,
                span: blossom_ast::span(42, 1),
            }]
        );
    }

    #[test]
    fn witnesses_stop_at_the_cap_across_constructors() {
        let names: Vec<String> = (0..70).map(|i| format!("C{i}")).collect();
        let u = unit(
            "many",
            vec![variant(
                "Many",
                names.iter().map(|n| (n.as_str(), vec![])).collect(),
            )],
        );
        let cat = build(&u, &CheckConfig::default()).0;
        let many = cat.lookup("Many").expect("Many");
        let mut lowerer = PatternLowerer::new(&cat);
        let rows = [true, false]
            .into_iter()
            .map(|b| MatrixRow {
                pats: vec![
                    lowerer.lower_arm(&lit_pat(Literal::Bool(b)), TypeId::BOOL),
                    lowerer.lower_arm(&ctor("C0", vec![]), many),
                ],
                guarded: false,
                span: Span::default(),
            })
            .collect();
        assert!(lowerer.errors().is_empty(), "{:?}", lowerer.errors());
        let m = PatternMatrix {
            rows,
            tys: vec![TypeId::BOOL, many],
        };
        let res = check(&cat, &m, &mut Budget::new(100_000)).expect("within budget");
        assert_eq!(res.witnesses.len(), MAX_WITNESSES);
    }

    #[test]
    fn guarded_rows_do_not_cover() {
        let cat = shapes();
        let shape = cat.lookup("Shape").expect("Shape");
        let mut m = matrix(&cat, shape, vec![wild()]);
        m.rows[0].guarded = true;
        let res = check(&cat, &m, &mut Budget::new(1000)).expect("within budget");
        assert_eq!(res.witnesses, vec![vec![Witness::Wild]]);
    }

    #[test]
    fn tiny_budget_is_exhausted() {
        let cat = shapes();
        let shape = cat.lookup("Shape").expect("Shape");
        let m = matrix(&cat, shape, vec![ctor("Circle", vec![wild()])]);
        let err = check(&cat, &m, &mut Budget::new(1)).unwrap_err();
        assert_eq!(err.limit, 1);
    }
}
