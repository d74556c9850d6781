#![forbid(unsafe_code)]

//! Forward ownership dataflow over a lowered body.
//!
//! The analysis first iterates to a fixed point in reverse postorder without
//! reporting anything, then makes one reporting pass over every reachable
//! block starting from its settled entry state. Each statement is a list of
//! events (reads, moves, borrows, writes, storage and region ends). Reads,
//! moves and borrows are judged by the [`OwnershipState`] the incoming facts
//! give the place; writes and storage ends inspect the facts directly.

use std::collections::{BTreeMap, HashSet};

use blossom_ast::Span;
use blossom_ir::{
    BlockId, Body, BorrowKind, LocalId, Operand, Place, Projection, RegionId, Rvalue, Statement,
    StatementKind, TerminatorKind, predecessors, reverse_postorder,
};

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::ownership::{FlowState, Loan, MoveSite, OwnershipState};
use crate::region::RegionGraph;

/// Check one body; diagnostics come back deduplicated by (kind, span).
pub fn check_body(body: &Body) -> Vec<Diagnostic> {
    let _span = tracing::debug_span!("borrowck", function = %body.name).entered();
    let (graph, mut diagnostics) = RegionGraph::build(body);
    let order = reverse_postorder(body);
    let preds = predecessors(body);

    let mut analysis = Analysis {
        body,
        graph: &graph,
        diagnostics: Vec::new(),
        reporting: false,
    };

    let mut exits: BTreeMap<BlockId, FlowState> = BTreeMap::new();
    let mut iteration = 0usize;
    loop {
        iteration += 1;
        let mut changed = false;
        for &bb in &order {
            let mut state = entry_state(bb, body, &preds, &exits);
            analysis.block(bb, &mut state);
            if exits.get(&bb) != Some(&state) {
                exits.insert(bb, state);
                changed = true;
            }
        }
        tracing::trace!(iteration, blocks = order.len(), changed, "dataflow pass");
        if !changed {
            break;
        }
    }

    analysis.reporting = true;
    for &bb in &order {
        let mut state = entry_state(bb, body, &preds, &exits);
        analysis.block(bb, &mut state);
    }
    diagnostics.append(&mut analysis.diagnostics);

    let mut seen = HashSet::new();
    diagnostics.retain(|d| seen.insert((d.kind, d.span)));
    tracing::debug!(
        function = %body.name,
        iterations = iteration,
        diagnostics = diagnostics.len(),
        "ownership checked"
    );
    diagnostics
        .into_iter()
        .map(|d| d.in_function(body.name.clone()))
        .collect()
}

fn entry_state(
    bb: BlockId,
    body: &Body,
    preds: &BTreeMap<BlockId, Vec<BlockId>>,
    exits: &BTreeMap<BlockId, FlowState>,
) -> FlowState {
    let mut state = FlowState::default();
    if bb == body.entry {
        return state;
    }
    for pred in preds.get(&bb).into_iter().flatten() {
        if let Some(exit) = exits.get(pred) {
            state.join(exit);
        }
    }
    state
}

struct Analysis<'a> {
    body: &'a Body,
    graph: &'a RegionGraph,
    diagnostics: Vec<Diagnostic>,
    reporting: bool,
}

impl Analysis<'_> {
    fn report(&mut self, diagnostic: Diagnostic) {
        if self.reporting {
            self.diagnostics.push(diagnostic);
        }
    }

    fn name(&self, place: &Place) -> String {
        place.display(self.body)
    }

    fn block(&mut self, bb: BlockId, state: &mut FlowState) {
        let body = self.body;
        let block = body.block(bb);
        for stmt in &block.statements {
            self.statement(stmt, state);
        }
        let span = block.terminator.span;
        match &block.terminator.kind {
            TerminatorKind::Branch { cond, .. } => self.operand(cond, span, state),
            TerminatorKind::Match { scrutinee, .. } => self.read(scrutinee, span, state),
            TerminatorKind::Goto(_) | TerminatorKind::Return | TerminatorKind::Unreachable => {}
        }
    }

    fn statement(&mut self, stmt: &Statement, state: &mut FlowState) {
        let span = stmt.span;
        match &stmt.kind {
            StatementKind::StorageLive(local) => {
                state.kill(*local);
                let decl = self.body.local(*local);
                state.record_move(
                    Place::local(*local),
                    MoveSite {
                        span: decl.span,
                        uninit: true,
                    },
                );
            }
            StatementKind::StorageDead(local) => self.storage_dead(*local, span, state),
            StatementKind::Assign { place, value } => {
                self.rvalue(value, span, state);
                self.check_reference_flow(place, value, span);
                self.write(place, span, state);
            }
            StatementKind::Eval(value) => self.rvalue(value, span, state),
            StatementKind::Inspect(place) => self.read(place, span, state),
            StatementKind::EndRegion(region) => state.end_region(*region),
        }
    }

    fn rvalue(&mut self, value: &Rvalue, span: Span, state: &mut FlowState) {
        match value {
            Rvalue::Use(op) => self.operand(op, span, state),
            Rvalue::Ref {
                place,
                kind,
                region,
            } => self.borrow(place, *kind, *region, span, state),
            Rvalue::Aggregate { operands, .. } => {
                for op in operands {
                    self.operand(op, span, state);
                }
            }
            Rvalue::Call { args, .. } => {
                for op in args {
                    self.operand(op, span, state);
                }
            }
            Rvalue::Unary { operand, .. } => self.operand(operand, span, state),
            Rvalue::Binary { lhs, rhs, .. } => {
                self.operand(lhs, span, state);
                self.operand(rhs, span, state);
            }
        }
    }

    fn operand(&mut self, op: &Operand, span: Span, state: &mut FlowState) {
        match op {
            Operand::Copy(place) => self.read(place, span, state),
            Operand::Move(place) => self.move_out(place, span, state),
            Operand::Constant(_) => {}
        }
    }

    /// Report a use of `place` while some overlapping place is moved out.
    fn report_moved(&mut self, place: &Place, span: Span, state: &FlowState, action: &str) {
        let Some((moved, site)) = state.moved_overlapping(place) else {
            return;
        };
        let name = self.name(place);
        let diag = if site.uninit {
            Diagnostic::new(
                DiagnosticKind::UseAfterMove,
                span,
                format!("`{name}` is {action} before being initialized"),
            )
            .with_related(site.span, "declared here without a value")
        } else {
            let what = if moved == place {
                format!("`{name}` is {action} after being moved")
            } else {
                format!(
                    "`{name}` is {action} after `{}` was moved",
                    self.name(moved)
                )
            };
            Diagnostic::new(DiagnosticKind::UseAfterMove, span, what)
                .with_related(site.span, "value moved here")
        };
        self.report(diag.with_place(name));
    }

    fn read(&mut self, place: &Place, span: Span, state: &mut FlowState) {
        let current = state.state_of(place);
        if current.allows_read() {
            return;
        }
        if current == OwnershipState::Moved {
            self.report_moved(place, span, state, "used");
            return;
        }
        let unique = state
            .loans_overlapping(place)
            .find(|l| l.kind == BorrowKind::Unique)
            .cloned();
        if let Some(loan) = unique {
            let name = self.name(place);
            self.report(
                Diagnostic::new(
                    DiagnosticKind::ConflictingBorrow,
                    span,
                    format!("cannot use `{name}` while it is uniquely borrowed"),
                )
                .with_related(loan.span, "unique borrow here")
                .with_place(name),
            );
        }
    }

    fn move_out(&mut self, place: &Place, span: Span, state: &mut FlowState) {
        let current = state.state_of(place);
        if current == OwnershipState::Moved {
            self.report_moved(place, span, state, "moved");
        } else if !current.allows_move() {
            let loan = state.loans_overlapping(place).next().cloned();
            if let Some(loan) = loan {
                let name = self.name(place);
                self.report(
                    Diagnostic::new(
                        DiagnosticKind::MoveOfBorrowed,
                        span,
                        format!(
                            "cannot move out of `{name}` while it is {}",
                            current.display()
                        ),
                    )
                    .with_related(loan.span, format!("{} borrow here", loan.kind.display()))
                    .with_place(name),
                );
            }
        }
        state.record_move(
            place.clone(),
            MoveSite {
                span,
                uninit: false,
            },
        );
    }

    fn borrow(
        &mut self,
        place: &Place,
        kind: BorrowKind,
        region: RegionId,
        span: Span,
        state: &mut FlowState,
    ) {
        let current = state.state_of(place);
        let mut ok = current.allows_borrow(kind);
        if current == OwnershipState::Moved {
            self.report_moved(place, span, state, "borrowed");
        } else if !ok {
            let conflict = state
                .loans_overlapping(place)
                .find(|l| kind == BorrowKind::Unique || l.kind == BorrowKind::Unique)
                .cloned();
            if let Some(loan) = conflict {
                let name = self.name(place);
                self.report(
                    Diagnostic::new(
                        DiagnosticKind::ConflictingBorrow,
                        span,
                        format!(
                            "cannot borrow `{name}` as {} because it is already borrowed as {}",
                            kind.display(),
                            loan.kind.display()
                        ),
                    )
                    .with_related(loan.span, format!("{} borrow here", loan.kind.display()))
                    .with_place(name),
                );
            }
        }

        let owner = self.owner_region(place);
        if !self.graph.outlives(owner, region) {
            ok = false;
            let body = self.body;
            let name = self.name(place);
            let decl = body.local(place.local);
            self.report(
                Diagnostic::new(
                    DiagnosticKind::BorrowOutlivesOwner,
                    span,
                    format!(
                        "`{name}` is borrowed for {} but only lives for {}",
                        body.region_name(region),
                        body.region_name(owner)
                    ),
                )
                .with_related(decl.span, format!("`{}` declared here", decl.name))
                .with_place(name),
            );
        }

        if ok {
            state.loans.insert(Loan {
                place: place.clone(),
                kind,
                region,
                span,
            });
        }
    }

    /// The region the borrowed value lives in: the referent's for places
    /// reached through a reference local, else the root local's scope.
    fn owner_region(&self, place: &Place) -> RegionId {
        let decl = self.body.local(place.local);
        match (place.projection.first(), &decl.reference) {
            (Some(Projection::Deref), Some(info)) => info.region,
            _ => decl.scope,
        }
    }

    /// Copying or moving a reference into another reference local must not
    /// extend what it borrows.
    fn check_reference_flow(&mut self, target: &Place, value: &Rvalue, span: Span) {
        let Rvalue::Use(Operand::Copy(source) | Operand::Move(source)) = value else {
            return;
        };
        if !target.is_root() || !source.is_root() {
            return;
        }
        let body = self.body;
        let src = body.local(source.local);
        let dst = body.local(target.local);
        let (Some(from), Some(to)) = (src.reference.as_ref(), dst.reference.as_ref()) else {
            return;
        };
        if self.graph.outlives(from.region, to.region) {
            return;
        }
        self.report(
            Diagnostic::new(
                DiagnosticKind::BorrowOutlivesOwner,
                span,
                format!(
                    "`{}` is only valid for {} but is stored in `{}`, which needs {}",
                    src.name,
                    body.region_name(from.region),
                    dst.name,
                    body.region_name(to.region)
                ),
            )
            .with_related(src.span, format!("`{}` declared here", src.name))
            .with_place(src.name.clone()),
        );
    }

    fn write(&mut self, place: &Place, span: Span, state: &mut FlowState) {
        let name = self.name(place);
        if let Some((moved, site)) = state.moved_parent(place) {
            let parent = self.name(moved);
            let site = *site;
            self.report(
                Diagnostic::new(
                    DiagnosticKind::UseAfterMove,
                    span,
                    format!("cannot assign to `{name}` because `{parent}` was moved"),
                )
                .with_related(site.span, "value moved here")
                .with_place(name),
            );
            return;
        }
        let loan = state.loans_overlapping(place).next().cloned();
        if let Some(loan) = loan {
            self.report(
                Diagnostic::new(
                    DiagnosticKind::ConflictingBorrow,
                    span,
                    format!("cannot assign to `{name}` while it is borrowed"),
                )
                .with_related(loan.span, format!("{} borrow here", loan.kind.display()))
                .with_place(name),
            );
        }
        state.reinit(place);
    }

    fn storage_dead(&mut self, local: LocalId, span: Span, state: &mut FlowState) {
        let live: Vec<Loan> = state.loans_on_storage(local).cloned().collect();
        for loan in live {
            let name = self.name(&loan.place);
            self.report(
                Diagnostic::new(
                    DiagnosticKind::BorrowOutlivesOwner,
                    span,
                    format!(
                        "`{name}` goes out of scope while still borrowed for {}",
                        self.body.region_name(loan.region)
                    ),
                )
                .with_related(loan.span, "borrow here")
                .with_place(name),
            );
        }
        state.kill(local);
    }
}

#[cfg(test)]
mod tests {
    use blossom_ast::builder::*;
    use blossom_ast::{Decl, FunctionDecl, Unit};

    use super::*;
    use crate::catalog::build;
    use crate::config::CheckConfig;
    use crate::lower::lower_function;

    fn check(unit: &Unit) -> Vec<Diagnostic> {
        let (catalog, errors) = build(unit, &CheckConfig::default());
        assert!(errors.is_empty(), "{errors:?}");
        unit.functions()
            .flat_map(|f| {
                let (body, lower_errors) = lower_function(&catalog, f);
                assert!(lower_errors.is_empty(), "{lower_errors:?}");
                check_body(&body)
            })
            .collect()
    }

    /// `f` alongside the `consume` and `show` functions it calls.
    fn with_sinks(f: FunctionDecl) -> Unit {
        unit(
            "t",
            vec![
                Decl::Function(function("consume", vec![("v", str_ty())], vec![])),
                Decl::Function(function("show", vec![("v", str_ty())], vec![])),
                Decl::Function(f),
            ],
        )
    }

    fn kinds(diags: &[Diagnostic]) -> Vec<DiagnosticKind> {
        diags.iter().map(|d| d.kind).collect()
    }

    #[test]
    fn moved_in_one_branch_is_moved_after_the_join() {
        let u = with_sinks(function(
            "f",
            vec![("s", str_ty()), ("c", bool_ty())],
            vec![
                if_(
                    use_(place("c")),
                    vec![eval(call("consume", vec![use_(place("s"))])).at(10)],
                    None,
                )
                .at(5),
                eval(call("show", vec![use_(place("s"))])).at(20),
            ],
        ));
        let diags = check(&u);
        assert_eq!(kinds(&diags), vec![DiagnosticKind::UseAfterMove]);
        assert_eq!(diags[0].span, blossom_ast::span(20, 1));
        assert_eq!(diags[0].related[0].span, blossom_ast::span(10, 1));
    }

    #[test]
    fn moving_inside_a_loop_is_caught_on_the_next_iteration() {
        let u = with_sinks(function(
            "f",
            vec![("s", str_ty()), ("c", bool_ty())],
            vec![while_(
                use_(place("c")),
                vec![eval(call("consume", vec![use_(place("s"))])).at(7)],
            )],
        ));
        let diags = check(&u);
        assert_eq!(kinds(&diags), vec![DiagnosticKind::UseAfterMove]);
    }

    #[test]
    fn declared_but_unassigned_locals_are_uninitialized() {
        let u = with_sinks(function(
            "f",
            vec![],
            vec![
                declare("s", str_ty()),
                eval(call("show", vec![use_(place("s"))])).at(3),
                assign(place("s"), lit_str("x")),
                eval(call("show", vec![use_(place("s"))])).at(9),
            ],
        ));
        let diags = check(&u);
        assert_eq!(kinds(&diags), vec![DiagnosticKind::UseAfterMove]);
        assert!(diags[0].message.contains("before being initialized"));
    }

    #[test]
    fn assigning_while_borrowed_conflicts() {
        let u = unit(
            "t",
            vec![Decl::Function(function(
                "f",
                vec![],
                vec![
                    let_("x", int(), lit_int(1)),
                    let_("r", ref_ty(int()), borrow(place("x"))).at(2),
                    assign(place("x"), lit_int(2)).at(4),
                ],
            ))],
        );
        let diags = check(&u);
        assert_eq!(kinds(&diags), vec![DiagnosticKind::ConflictingBorrow]);
        assert_eq!(diags[0].related[0].span, blossom_ast::span(2, 1));
    }

    #[test]
    fn moving_out_names_the_state_of_the_place() {
        let u = with_sinks(function(
            "f",
            vec![("s", str_ty())],
            vec![
                let_("r", ref_mut_ty(str_ty()), borrow_mut(place("s"))).at(2),
                eval(call("consume", vec![use_(place("s"))])).at(6),
                eval(call("show", vec![use_(place("s"))])).at(9),
            ],
        ));
        let diags = check(&u);
        assert_eq!(
            kinds(&diags),
            vec![DiagnosticKind::MoveOfBorrowed, DiagnosticKind::UseAfterMove]
        );
        assert!(
            diags[0].message.contains("while it is borrowed (unique)"),
            "{}",
            diags[0].message
        );
        assert_eq!(diags[1].related[0].span, blossom_ast::span(6, 1));
    }

    #[test]
    fn returning_a_borrow_of_a_local_outlives_it() {
        let mut f = function(
            "leak",
            vec![],
            vec![
                let_("x", str_ty(), lit_str("a")),
                ret(Some(borrow(place("x")))).at(6),
            ],
        );
        f.ret = ref_ty(str_ty());
        let u = unit("t", vec![Decl::Function(f)]);
        let diags = check(&u);
        assert_eq!(kinds(&diags), vec![DiagnosticKind::BorrowOutlivesOwner]);
        assert_eq!(diags[0].place.as_deref(), Some("x"));
    }
}
