#![forbid(unsafe_code)]

//! Whole-unit checking: catalog, then every function body in parallel.

use std::collections::BTreeMap;

use blossom_ast::{Block, FunctionDecl, MatchExpr, PlaceExpr, ProjectionExpr, StmtKind, Unit};
use blossom_ir::{Body, validate_body};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, debug_span, info, warn};

use crate::borrowck::check_body;
use crate::cache::{DiagnosticCache, FunctionResult};
use crate::catalog::{self, TypeCatalog, TypeScope};
use crate::config::CheckConfig;
use crate::diagnostics::{Diagnostic, DiagnosticKind, sort_diagnostics};
use crate::lower::lower_function;
use crate::pattern::witness::render_row;
use crate::pattern::{
    Budget, DecisionTable, MatrixRow, PatternLowerer, PatternMatrix, check,
};
use crate::types::TypeId;

/// Everything one run found, in a deterministic order.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CheckReport {
    pub unit: String,
    pub diagnostics: Vec<Diagnostic>,
    /// Decision tables of every exhaustive match, by function.
    pub decision_tables: BTreeMap<String, Vec<DecisionTable>>,
    pub functions_checked: usize,
    pub cache_hits: usize,
    /// Functions whose signatures failed to resolve.
    pub skipped: usize,
}

impl CheckReport {
    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn count_by_kind(&self) -> BTreeMap<DiagnosticKind, usize> {
        let mut counts = BTreeMap::new();
        for d in &self.diagnostics {
            *counts.entry(d.kind).or_insert(0) += 1;
        }
        counts
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Checker {
    config: CheckConfig,
}

impl Checker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CheckConfig) -> Self {
        Checker { config }
    }

    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    pub fn check_unit(&self, unit: &Unit) -> CheckReport {
        let mut scratch = DiagnosticCache::new();
        let mut report = self.check_unit_cached(unit, &mut scratch);
        report.cache_hits = 0;
        report
    }

    /// Check `unit`, reusing results for bodies whose cache key is already known.
    ///
    /// Bodies without a cache key are always checked and never recorded.
    pub fn check_unit_cached(&self, unit: &Unit, cache: &mut DiagnosticCache) -> CheckReport {
        let _span = debug_span!("check_unit", unit = %unit.name).entered();
        let (catalog, catalog_errors) = catalog::build(unit, &self.config);
        let mut report = CheckReport {
            unit: unit.name.clone(),
            diagnostics: catalog_errors.iter().map(|e| e.to_diagnostic()).collect(),
            ..CheckReport::default()
        };

        let mut work = Vec::new();
        for (index, decl) in unit.functions().enumerate() {
            if catalog.is_poisoned(index) {
                debug!(function = %decl.name.node, "skipping function with unresolved signature");
                report.skipped += 1;
                continue;
            }
            work.push(decl);
        }

        let cached: &DiagnosticCache = cache;
        let run = || {
            work.par_iter()
                .map(|decl| {
                    let key = decl.cache_key.as_deref();
                    if let Some(hit) = key.and_then(|k| cached.get(k)) {
                        return (*decl, true, hit.clone());
                    }
                    (*decl, false, self.check_function(&catalog, decl))
                })
                .collect::<Vec<_>>()
        };
        let results = if self.config.jobs == 0 {
            run()
        } else {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.jobs)
                .build()
            {
                Ok(pool) => pool.install(run),
                Err(err) => {
                    warn!(jobs = self.config.jobs, %err, "falling back to the global thread pool");
                    run()
                }
            }
        };

        for (decl, hit, result) in results {
            report.functions_checked += 1;
            if hit {
                report.cache_hits += 1;
            } else if let Some(key) = &decl.cache_key {
                cache.insert(key.clone(), result.clone());
            }
            report.diagnostics.extend(result.diagnostics);
            if !result.decision_tables.is_empty() {
                report
                    .decision_tables
                    .entry(decl.name.node.clone())
                    .or_default()
                    .extend(result.decision_tables);
            }
        }

        sort_diagnostics(&mut report.diagnostics);
        info!(
            unit = %report.unit,
            functions = report.functions_checked,
            cache_hits = report.cache_hits,
            diagnostics = report.diagnostics.len(),
            "check finished"
        );
        report
    }

    /// Lower every resolvable function to IR without checking it.
    pub fn lower_unit(&self, unit: &Unit) -> (Vec<Body>, Vec<Diagnostic>) {
        let (catalog, catalog_errors) = catalog::build(unit, &self.config);
        let mut diags: Vec<Diagnostic> = catalog_errors.iter().map(|e| e.to_diagnostic()).collect();
        let mut bodies = Vec::new();
        for (index, decl) in unit.functions().enumerate() {
            if catalog.is_poisoned(index) {
                continue;
            }
            let (body, errors) = lower_function(&catalog, decl);
            diags.extend(
                errors
                    .iter()
                    .map(|e| e.to_diagnostic().in_function(decl.name.node.clone())),
            );
            bodies.push(body);
        }
        sort_diagnostics(&mut diags);
        (bodies, diags)
    }

    fn check_function(&self, catalog: &TypeCatalog, decl: &FunctionDecl) -> FunctionResult {
        let name = decl.name.node.as_str();
        let _span = debug_span!("check_function", function = name).entered();
        let scope = catalog
            .function(name)
            .map(TypeScope::of_function)
            .unwrap_or_default();

        let mut matches = Vec::new();
        collect_matches(&decl.body, &mut matches);

        let mut result = FunctionResult::default();
        let mut malformed = false;
        for m in matches {
            malformed |= self.check_match(catalog, &scope, m, &mut result);
        }

        // Borrow checking needs well-formed patterns to place bindings.
        if !malformed {
            let (body, errors) = lower_function(catalog, decl);
            result
                .diagnostics
                .extend(errors.iter().map(|e| e.to_diagnostic()));
            match validate_body(&body) {
                Ok(()) => result.diagnostics.extend(check_body(&body)),
                Err(err) => warn!(%err, "lowered body is malformed; skipping borrow check"),
            }
        }

        for d in &mut result.diagnostics {
            if d.function.is_none() {
                d.function = Some(name.to_string());
            }
        }
        sort_diagnostics(&mut result.diagnostics);
        debug!(
            diagnostics = result.diagnostics.len(),
            tables = result.decision_tables.len(),
            "function checked"
        );
        result
    }

    /// Returns true if any arm pattern was malformed.
    fn check_match(
        &self,
        catalog: &TypeCatalog,
        scope: &TypeScope,
        m: &MatchExpr,
        result: &mut FunctionResult,
    ) -> bool {
        let ty = catalog.resolve(&m.ty, scope);
        if ty == TypeId::ERROR {
            return false;
        }

        let mut lowerer = PatternLowerer::new(catalog);
        let rows: Vec<MatrixRow> = m
            .arms
            .iter()
            .map(|arm| MatrixRow {
                pats: vec![lowerer.lower_arm(&arm.pattern, ty)],
                guarded: arm.guard.is_some(),
                span: arm.pattern.span,
            })
            .collect();
        let errors = lowerer.into_errors();
        if !errors.is_empty() {
            result.diagnostics.extend(errors);
            return true;
        }

        let matrix = PatternMatrix {
            rows,
            tys: vec![ty],
        };
        let mut budget = Budget::new(self.config.max_specializations);
        let verdict = match check(catalog, &matrix, &mut budget) {
            Ok(verdict) => verdict,
            Err(exhausted) => {
                warn!(span = %m.span, steps = exhausted.limit, "match analysis gave up");
                result.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::ResourceExhausted,
                    m.span,
                    exhausted.to_string(),
                ));
                return false;
            }
        };
        debug!(span = %m.span, steps = budget.used(), "match analysed");

        for row in &verdict.unreachable {
            let arm = &matrix.rows[*row];
            result.diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::UnreachablePattern,
                    arm.span,
                    format!("arm {} can never match", row + 1),
                )
                .with_related(m.span, "in this match"),
            );
        }
        for alt in &verdict.redundant_alternatives {
            result.diagnostics.push(Diagnostic::new(
                DiagnosticKind::UnreachablePattern,
                alt.span,
                format!(
                    "alternative {} of arm {} is covered by earlier patterns",
                    alt.alternative + 1,
                    alt.row + 1
                ),
            ));
        }

        if !verdict.is_exhaustive() {
            let witnesses: Vec<String> = verdict
                .witnesses
                .iter()
                .map(|w| render_row(catalog, w, &matrix.tys))
                .collect();
            result.diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::NonExhaustiveMatch,
                    m.span,
                    format!(
                        "match on `{}` is not exhaustive: {} not covered",
                        catalog.display(ty),
                        witnesses.join(", ")
                    ),
                )
                .with_witnesses(witnesses),
            );
            return false;
        }

        let mut budget = Budget::new(self.config.max_specializations);
        match DecisionTable::build(
            catalog,
            &matrix,
            vec![place_text(&m.scrutinee)],
            m.span,
            &mut budget,
        ) {
            Ok(table) => result.decision_tables.push(table),
            Err(exhausted) => {
                warn!(span = %m.span, steps = exhausted.limit, "decision table compilation gave up");
                result.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::ResourceExhausted,
                    m.span,
                    exhausted.to_string(),
                ));
            }
        }
        false
    }
}

fn collect_matches<'a>(block: &'a Block, out: &mut Vec<&'a MatchExpr>) {
    for stmt in &block.stmts {
        match &stmt.kind {
            StmtKind::Match(m) => {
                out.push(m);
                for arm in &m.arms {
                    collect_matches(&arm.body, out);
                }
            }
            StmtKind::If {
                then_block,
                else_block,
                ..
            } => {
                collect_matches(then_block, out);
                if let Some(b) = else_block {
                    collect_matches(b, out);
                }
            }
            StmtKind::While { body, .. } | StmtKind::Block(body) => collect_matches(body, out),
            StmtKind::Let { .. }
            | StmtKind::Assign { .. }
            | StmtKind::Expr(_)
            | StmtKind::Return(_) => {}
        }
    }
}

/// Source-like text of a place, used to label decision-table scrutinees.
fn place_text(place: &PlaceExpr) -> String {
    let mut text = place.root.node.clone();
    for proj in &place.projections {
        match proj {
            ProjectionExpr::Field(name) => {
                text.push('.');
                text.push_str(&name.node);
            }
            ProjectionExpr::Index(i) => text.push_str(&format!(".{i}")),
            ProjectionExpr::Deref => text = format!("(*{text})"),
            ProjectionExpr::Element(_) => text.push_str("[_]"),
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use blossom_ast::builder::*;

    use super::*;

    fn opt_unit(functions: Vec<FunctionDecl>) -> Unit {
        let mut decls = vec![variant(
            "Opt",
            vec![("None", vec![]), ("Some", vec![int()])],
        )];
        decls.extend(functions.into_iter().map(blossom_ast::Decl::Function));
        unit("t", decls)
    }

    #[test]
    fn place_text_renders_projections() {
        let p = place("o").field("inner").index(1).deref();
        assert_eq!(place_text(&p), "(*o.inner.1)");
    }

    #[test]
    fn exhaustive_match_yields_a_table_and_no_diagnostics() {
        let f = function(
            "f",
            vec![("o", named("Opt"))],
            vec![match_(
                place("o"),
                named("Opt"),
                vec![
                    arm(ctor("None", vec![]), vec![]),
                    arm(ctor("Some", vec![bind("n")]), vec![]),
                ],
            )],
        );
        let report = Checker::new().check_unit(&opt_unit(vec![f]));
        assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
        assert_eq!(report.decision_tables["f"].len(), 1);
        assert_eq!(report.functions_checked, 1);
    }

    #[test]
    fn cached_bodies_are_not_rechecked() {
        let mut f = function(
            "f",
            vec![("o", named("Opt"))],
            vec![match_(
                place("o"),
                named("Opt"),
                vec![arm(ctor("None", vec![]), vec![])],
            )],
        );
        f.cache_key = Some("k1".into());
        let unit = opt_unit(vec![f]);
        let mut cache = DiagnosticCache::new();
        let checker = Checker::with_config(CheckConfig {
            jobs: 1,
            ..CheckConfig::default()
        });

        let first = checker.check_unit_cached(&unit, &mut cache);
        assert_eq!(first.cache_hits, 0);
        assert_eq!(cache.len(), 1);
        let second = checker.check_unit_cached(&unit, &mut cache);
        assert_eq!(second.cache_hits, 1);
        assert_eq!(first.diagnostics, second.diagnostics);
        assert_eq!(
            second.count_by_kind().get(&DiagnosticKind::NonExhaustiveMatch),
            Some(&1)
        );
        assert_eq!(second.diagnostics[0].witnesses, vec!["Some(_)".to_string()]);
    }
}
