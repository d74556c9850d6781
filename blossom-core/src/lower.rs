#![forbid(unsafe_code)]

//! Lowering of a function body from the typed AST to a CFG.
//!
//! Every lexical block opens a scope region; locals are `StorageLive` where
//! they are declared and die (`EndRegion` then `StorageDead`, innermost
//! first) where their block ends or a `return` leaves it. Borrows stored by
//! a `let` or an assignment live in the region of the local that holds them;
//! any other borrow lives in a temporary region that ends with its statement.
//!
//! Match arms lower to one block each. An arm's bindings are bound
//! field by field: by-value bindings move (or copy) the bound sub-place and
//! `ref` bindings borrow it for the arm's scope. A guard runs before the
//! bindings with the scrutinee and every bound sub-place under a shared borrow.

use std::collections::HashMap;

use blossom_ast::{
    BindingMode, Block, Expr, ExprKind, FunctionDecl, MatchExpr, PlaceExpr, ProjectionExpr, Span,
    Stmt, StmtKind, TypeExpr,
};
use blossom_ir::{
    BasicBlock, BlockId, Body, BorrowKind, IdGen, LocalDecl, LocalId, Operand, OutlivesDecl,
    Place, Projection, RefInfo, RegionData, RegionId, RegionKind, Rvalue, Statement,
    StatementKind, Terminator, TerminatorKind,
};
use thiserror::Error;

use crate::catalog::{TypeCatalog, TypeScope};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::pattern::{Ctor, Pat, PatKind, PatternLowerer};
use crate::types::{TyKind, TypeId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LowerError {
    #[error("`{name}` is not a local in scope")]
    UnknownLocal { name: String, span: Span },
    #[error("cannot {what} `{place}` of type `{ty}`")]
    BadProjection {
        what: String,
        place: String,
        ty: String,
        span: Span,
    },
}

impl LowerError {
    pub fn span(&self) -> Span {
        match self {
            LowerError::UnknownLocal { span, .. } | LowerError::BadProjection { span, .. } => *span,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::UnresolvedName, self.span(), self.to_string())
    }
}

/// Type of a local as far as lowering needs it. Reference bindings introduced
/// by patterns have no interned type, so they carry their pointee instead.
#[derive(Clone, Copy, Debug)]
enum LocalTy {
    Plain(TypeId),
    Ref { inner: TypeId },
}

struct PlaceInfo {
    place: Place,
    ty: TypeId,
    copy: bool,
}

struct ScopeFrame {
    region: RegionId,
    locals: Vec<LocalId>,
    names: Vec<(String, LocalId)>,
}

#[derive(Default)]
struct Temps {
    region: Option<RegionId>,
    locals: Vec<LocalId>,
}

/// One binding an arm's pattern introduces.
struct BindingSite {
    name: String,
    mode: BindingMode,
    place: Place,
    ty: TypeId,
    span: Span,
}

/// Lower `decl` to a CFG body.
///
/// Names that do not resolve are reported and lowered as constants so the
/// rest of the body is still checked.
pub fn lower_function(catalog: &TypeCatalog, decl: &FunctionDecl) -> (Body, Vec<LowerError>) {
    let _span = tracing::trace_span!("lower", function = %decl.name.node).entered();
    let scope = catalog
        .function(&decl.name.node)
        .map(TypeScope::of_function)
        .unwrap_or_else(|| TypeScope {
            owner: decl.name.node.clone(),
            ..TypeScope::default()
        });
    let mut lowerer = Lowerer::new(catalog, scope, decl);
    lowerer.lower_signature(decl);
    let root = lowerer.push_scope(decl.body.span);
    lowerer.lower_stmts(&decl.body.stmts);
    lowerer.pop_scope(root, decl.body.span);
    lowerer.terminate(decl.body.span, TerminatorKind::Return);
    let body = lowerer.finish(decl);
    tracing::trace!(
        function = %body.name,
        blocks = body.blocks.len(),
        locals = body.locals.len(),
        "lowered"
    );
    (body, lowerer.errors)
}

struct Lowerer<'c> {
    catalog: &'c TypeCatalog,
    scope: TypeScope,
    id: IdGen,
    locals: Vec<LocalDecl>,
    local_tys: Vec<LocalTy>,
    regions: Vec<RegionData>,
    outlives: Vec<OutlivesDecl>,
    named: HashMap<String, RegionId>,
    blocks: Vec<BasicBlock>,
    current: BlockId,
    frames: Vec<ScopeFrame>,
    temps: Temps,
    static_region: RegionId,
    body_region: RegionId,
    return_region: RegionId,
    return_ty: TypeId,
    return_slot: Option<LocalId>,
    errors: Vec<LowerError>,
}

impl<'c> Lowerer<'c> {
    fn new(catalog: &'c TypeCatalog, scope: TypeScope, decl: &FunctionDecl) -> Self {
        let mut lowerer = Lowerer {
            catalog,
            scope,
            id: IdGen::default(),
            locals: Vec::new(),
            local_tys: Vec::new(),
            regions: Vec::new(),
            outlives: Vec::new(),
            named: HashMap::new(),
            blocks: Vec::new(),
            current: BlockId(0),
            frames: Vec::new(),
            temps: Temps::default(),
            static_region: RegionId(0),
            body_region: RegionId(0),
            return_region: RegionId(0),
            return_ty: TypeId::UNIT,
            return_slot: None,
            errors: Vec::new(),
        };
        lowerer.static_region = lowerer.region(RegionKind::Static, decl.span);
        lowerer.body_region = lowerer.region(RegionKind::Body, decl.body.span);
        // Parameters live in the body region and are never killed.
        lowerer.frames.push(ScopeFrame {
            region: lowerer.body_region,
            locals: Vec::new(),
            names: Vec::new(),
        });
        lowerer.current = lowerer.new_block(decl.span);
        lowerer
    }

    fn finish(&mut self, decl: &FunctionDecl) -> Body {
        Body {
            name: decl.name.node.clone(),
            span: decl.span,
            locals: std::mem::take(&mut self.locals),
            regions: std::mem::take(&mut self.regions),
            outlives: std::mem::take(&mut self.outlives),
            blocks: std::mem::take(&mut self.blocks),
            entry: BlockId(0),
            body_region: self.body_region,
            return_region: self.return_region,
            static_region: self.static_region,
        }
    }

    // ---- signature ----

    fn lower_signature(&mut self, decl: &FunctionDecl) {
        for rp in &decl.regions {
            let id = self.region(RegionKind::Named(rp.name.node.clone()), rp.name.span);
            self.named.entry(rp.name.node.clone()).or_insert(id);
        }
        for rp in &decl.regions {
            let Some(&longer) = self.named.get(&rp.name.node) else {
                continue;
            };
            for target in &rp.outlives {
                // Unknown names were reported with the signature.
                if let Some(&shorter) = self.named.get(&target.node) {
                    self.outlives.push(OutlivesDecl {
                        longer,
                        shorter,
                        span: target.span,
                    });
                }
            }
        }

        let catalog = self.catalog;
        let mut ref_params = Vec::new();
        for p in &decl.params {
            let ty = self.resolve(&p.ty);
            let reference = match catalog.kind(ty) {
                TyKind::Ref { region, mutable, .. } => {
                    let region = match region {
                        Some(name) => self.named_region(name, p.span),
                        None => self.region(RegionKind::Named(format!("_{}", p.name.node)), p.span),
                    };
                    ref_params.push(region);
                    Some(RefInfo {
                        region,
                        mutable: *mutable,
                    })
                }
                _ => None,
            };
            self.push_local(&p.name.node, LocalTy::Plain(ty), p.span, reference, true);
        }

        self.return_ty = self.resolve(&decl.ret);
        self.return_region = match catalog.kind(self.return_ty) {
            TyKind::Ref {
                region: Some(name), ..
            } => self.named_region(name, decl.ret.span),
            TyKind::Ref { region: None, .. } if ref_params.len() == 1 => ref_params[0],
            _ => self.region(RegionKind::Return, decl.ret.span),
        };
    }

    fn named_region(&mut self, name: &str, span: Span) -> RegionId {
        if name == "static" {
            return self.static_region;
        }
        match self.named.get(name) {
            Some(&id) => id,
            None => {
                let id = self.region(RegionKind::Named(name.to_string()), span);
                self.named.insert(name.to_string(), id);
                id
            }
        }
    }

    fn resolve(&self, ty: &TypeExpr) -> TypeId {
        self.catalog.resolve(ty, &self.scope)
    }

    // ---- arenas ----

    fn region(&mut self, kind: RegionKind, span: Span) -> RegionId {
        let id = self.id.fresh_region();
        self.regions.push(RegionData { id, kind, span });
        id
    }

    fn new_block(&mut self, span: Span) -> BlockId {
        let id = self.id.fresh_block();
        self.blocks.push(BasicBlock {
            id,
            statements: Vec::new(),
            terminator: Terminator {
                span,
                kind: TerminatorKind::Unreachable,
            },
        });
        id
    }

    fn push_local(
        &mut self,
        name: &str,
        ty: LocalTy,
        span: Span,
        reference: Option<RefInfo>,
        is_param: bool,
    ) -> LocalId {
        let id = self.id.fresh_local();
        let (display, copy) = match ty {
            LocalTy::Plain(t) => (self.catalog.display(t), self.catalog.is_copy(t)),
            LocalTy::Ref { inner } => {
                let mutable = reference.as_ref().is_some_and(|r| r.mutable);
                let prefix = if mutable { "&mut " } else { "&" };
                (format!("{prefix}{}", self.catalog.display(inner)), !mutable)
            }
        };
        let scope = self.current_region();
        self.locals.push(LocalDecl {
            id,
            name: name.to_string(),
            ty: display,
            span,
            scope,
            copy,
            reference,
            is_param,
            is_temp: false,
        });
        self.local_tys.push(ty);
        if let Some(frame) = self.frames.last_mut() {
            frame.names.push((name.to_string(), id));
            if !is_param {
                frame.locals.push(id);
            }
        }
        id
    }

    fn push_temp(&mut self, span: Span, reference: Option<RefInfo>) -> LocalId {
        let id = self.id.fresh_local();
        let scope = self.current_region();
        self.locals.push(LocalDecl {
            id,
            name: format!("tmp{}", id.0),
            ty: "_".to_string(),
            span,
            scope,
            copy: false,
            reference,
            is_param: false,
            is_temp: true,
        });
        self.local_tys.push(LocalTy::Plain(TypeId::ERROR));
        self.temps.locals.push(id);
        self.emit(span, StatementKind::StorageLive(id));
        id
    }

    fn lookup(&self, name: &str) -> Option<LocalId> {
        self.frames
            .iter()
            .rev()
            .flat_map(|f| f.names.iter().rev())
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
    }

    // ---- blocks and scopes ----

    fn emit(&mut self, span: Span, kind: StatementKind) {
        self.blocks[self.current.index()]
            .statements
            .push(Statement { span, kind });
    }

    /// End the current block with `kind` and continue in a fresh block.
    ///
    /// Statements after a `return` land in a block nothing jumps to.
    fn terminate(&mut self, span: Span, kind: TerminatorKind) {
        self.blocks[self.current.index()].terminator = Terminator { span, kind };
        self.current = self.new_block(span);
    }

    fn switch_to(&mut self, bb: BlockId) {
        self.current = bb;
    }

    fn goto(&mut self, span: Span, target: BlockId) {
        self.blocks[self.current.index()].terminator = Terminator {
            span,
            kind: TerminatorKind::Goto(target),
        };
    }

    fn current_region(&self) -> RegionId {
        self.frames
            .last()
            .map(|f| f.region)
            .unwrap_or(self.body_region)
    }

    fn push_scope(&mut self, span: Span) -> RegionId {
        let parent = self.current_region();
        let region = self.region(RegionKind::Scope { parent }, span);
        self.frames.push(ScopeFrame {
            region,
            locals: Vec::new(),
            names: Vec::new(),
        });
        region
    }

    fn pop_scope(&mut self, region: RegionId, span: Span) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        debug_assert_eq!(frame.region, region);
        self.close_frame(&frame, span);
    }

    fn close_frame(&mut self, frame: &ScopeFrame, span: Span) {
        self.emit(span, StatementKind::EndRegion(frame.region));
        for local in frame.locals.iter().rev() {
            self.emit(span, StatementKind::StorageDead(*local));
        }
    }

    fn temp_region(&mut self, span: Span) -> RegionId {
        if let Some(r) = self.temps.region {
            return r;
        }
        let parent = self.current_region();
        let r = self.region(RegionKind::Temporary { parent }, span);
        self.temps.region = Some(r);
        r
    }

    /// Close the current statement's temporaries.
    fn end_statement(&mut self, span: Span) {
        let temps = std::mem::take(&mut self.temps);
        if let Some(r) = temps.region {
            self.emit(span, StatementKind::EndRegion(r));
        }
        for local in temps.locals.iter().rev() {
            self.emit(span, StatementKind::StorageDead(*local));
        }
    }

    // ---- statements ----

    fn lower_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.lower_stmt(stmt);
        }
    }

    fn lower_scoped(&mut self, block: &Block) {
        let region = self.push_scope(block.span);
        self.lower_stmts(&block.stmts);
        self.pop_scope(region, block.span);
    }

    fn lower_stmt(&mut self, stmt: &Stmt) {
        let span = stmt.span;
        match &stmt.kind {
            StmtKind::Let { name, ty, init } => {
                let ty = self.resolve(ty);
                let reference = self.ref_info(ty, span);
                let target = reference
                    .as_ref()
                    .map(|r| r.region)
                    .unwrap_or_else(|| self.current_region());
                // The initialiser is evaluated before the new name is in scope.
                let value = init.as_ref().map(|e| self.lower_rvalue(e, Some(target)));
                let local = self.push_local(&name.node, LocalTy::Plain(ty), name.span, reference, false);
                self.emit(span, StatementKind::StorageLive(local));
                if let Some(value) = value {
                    self.emit(
                        span,
                        StatementKind::Assign {
                            place: Place::local(local),
                            value,
                        },
                    );
                }
                self.end_statement(span);
            }
            StmtKind::Assign { place, value } => {
                let Some(info) = self.lower_place(place) else {
                    self.lower_rvalue(value, None);
                    self.end_statement(span);
                    return;
                };
                let decl = &self.locals[info.place.local.index()];
                let target = match (&decl.reference, info.place.is_root()) {
                    (Some(r), true) => r.region,
                    _ => decl.scope,
                };
                let value = self.lower_rvalue(value, Some(target));
                self.emit(
                    span,
                    StatementKind::Assign {
                        place: info.place,
                        value,
                    },
                );
                self.end_statement(span);
            }
            StmtKind::Expr(expr) => {
                let value = self.lower_rvalue(expr, None);
                self.emit(span, StatementKind::Eval(value));
                self.end_statement(span);
            }
            StmtKind::Match(m) => self.lower_match(m),
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                let cond = self.lower_operand(cond, None);
                self.end_statement(span);
                let then_bb = self.new_block(then_block.span);
                let else_bb = self.new_block(span);
                let join_bb = self.new_block(span);
                self.blocks[self.current.index()].terminator = Terminator {
                    span,
                    kind: TerminatorKind::Branch {
                        cond,
                        then_bb,
                        else_bb,
                    },
                };
                self.switch_to(then_bb);
                self.lower_scoped(then_block);
                self.goto(span, join_bb);
                self.switch_to(else_bb);
                if let Some(else_block) = else_block {
                    self.lower_scoped(else_block);
                }
                self.goto(span, join_bb);
                self.switch_to(join_bb);
            }
            StmtKind::While { cond, body } => {
                let header = self.new_block(cond.span);
                self.goto(span, header);
                self.switch_to(header);
                let cond = self.lower_operand(cond, None);
                self.end_statement(span);
                let body_bb = self.new_block(body.span);
                let exit_bb = self.new_block(span);
                self.blocks[self.current.index()].terminator = Terminator {
                    span,
                    kind: TerminatorKind::Branch {
                        cond,
                        then_bb: body_bb,
                        else_bb: exit_bb,
                    },
                };
                self.switch_to(body_bb);
                self.lower_scoped(body);
                self.goto(span, header);
                self.switch_to(exit_bb);
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    let slot = self.return_slot(span);
                    let value = self.lower_rvalue(value, Some(self.return_region));
                    self.emit(
                        span,
                        StatementKind::Assign {
                            place: Place::local(slot),
                            value,
                        },
                    );
                }
                self.end_statement(span);
                // Leave every open scope, innermost first, without popping them.
                let frames = std::mem::take(&mut self.frames);
                for frame in frames.iter().skip(1).rev() {
                    self.close_frame(frame, span);
                }
                self.frames = frames;
                self.terminate(span, TerminatorKind::Return);
            }
            StmtKind::Block(block) => self.lower_scoped(block),
        }
    }

    fn return_slot(&mut self, span: Span) -> LocalId {
        if let Some(slot) = self.return_slot {
            return slot;
        }
        let reference = match self.catalog.kind(self.return_ty) {
            TyKind::Ref { mutable, .. } => Some(RefInfo {
                region: self.return_region,
                mutable: *mutable,
            }),
            _ => None,
        };
        let id = self.id.fresh_local();
        self.locals.push(LocalDecl {
            id,
            name: "return".to_string(),
            ty: self.catalog.display(self.return_ty),
            span,
            scope: self.body_region,
            copy: self.catalog.is_copy(self.return_ty),
            reference,
            is_param: false,
            is_temp: true,
        });
        self.local_tys.push(LocalTy::Plain(self.return_ty));
        self.return_slot = Some(id);
        id
    }

    /// Region of a reference-typed local declared here: its annotation, else the current scope.
    fn ref_info(&mut self, ty: TypeId, span: Span) -> Option<RefInfo> {
        let TyKind::Ref {
            region, mutable, ..
        } = self.catalog.kind(ty).clone()
        else {
            return None;
        };
        let region = match region {
            Some(name) => self.named_region(&name, span),
            None => self.current_region(),
        };
        Some(RefInfo { region, mutable })
    }

    // ---- expressions ----

    /// `target` is the region borrows are stored in; `None` means the statement's temporaries.
    fn lower_rvalue(&mut self, expr: &Expr, target: Option<RegionId>) -> Rvalue {
        match &expr.kind {
            ExprKind::Lit(lit) => Rvalue::Use(Operand::Constant(lit.to_string())),
            ExprKind::Use(place) => Rvalue::Use(self.use_place(place)),
            ExprKind::Borrow { place, mutable } => {
                let region = match target {
                    Some(r) => r,
                    None => self.temp_region(expr.span),
                };
                match self.lower_place(place) {
                    Some(info) => Rvalue::Ref {
                        place: info.place,
                        kind: if *mutable {
                            BorrowKind::Unique
                        } else {
                            BorrowKind::Shared
                        },
                        region,
                    },
                    None => Rvalue::Use(Operand::Constant("{error}".to_string())),
                }
            }
            ExprKind::Call { callee, args, .. } => {
                let args = args.iter().map(|a| self.lower_operand(a, None)).collect();
                Rvalue::Call {
                    callee: callee.node.clone(),
                    args,
                }
            }
            ExprKind::Construct { ty, ctor, args } => {
                let name = match ctor {
                    Some(c) => c.node.clone(),
                    None => self.catalog.display(self.resolve(ty)),
                };
                let operands = args.iter().map(|a| self.lower_operand(a, target)).collect();
                Rvalue::Aggregate { name, operands }
            }
            ExprKind::Tuple(elems) => {
                let operands = elems
                    .iter()
                    .map(|a| self.lower_operand(a, target))
                    .collect();
                Rvalue::Aggregate {
                    name: "tuple".to_string(),
                    operands,
                }
            }
            ExprKind::Unary { op, operand } => Rvalue::Unary {
                op: *op,
                operand: self.lower_operand(operand, None),
            },
            ExprKind::Binary { op, lhs, rhs } => Rvalue::Binary {
                op: *op,
                lhs: self.lower_operand(lhs, None),
                rhs: self.lower_operand(rhs, None),
            },
        }
    }

    fn lower_operand(&mut self, expr: &Expr, target: Option<RegionId>) -> Operand {
        match &expr.kind {
            ExprKind::Lit(lit) => Operand::Constant(lit.to_string()),
            ExprKind::Use(place) => self.use_place(place),
            _ => {
                let value = self.lower_rvalue(expr, target);
                let reference = match &value {
                    Rvalue::Ref { kind, region, .. } => Some(RefInfo {
                        region: *region,
                        mutable: *kind == BorrowKind::Unique,
                    }),
                    _ => None,
                };
                let tmp = self.push_temp(expr.span, reference);
                self.emit(
                    expr.span,
                    StatementKind::Assign {
                        place: Place::local(tmp),
                        value,
                    },
                );
                Operand::Move(Place::local(tmp))
            }
        }
    }

    fn use_place(&mut self, place: &PlaceExpr) -> Operand {
        match self.lower_place(place) {
            Some(info) if info.copy => Operand::Copy(info.place),
            Some(info) => Operand::Move(info.place),
            None => Operand::Constant("{error}".to_string()),
        }
    }

    fn lower_place(&mut self, expr: &PlaceExpr) -> Option<PlaceInfo> {
        let Some(local) = self.lookup(&expr.root.node) else {
            self.errors.push(LowerError::UnknownLocal {
                name: expr.root.node.clone(),
                span: expr.root.span.to(expr.span),
            });
            return None;
        };
        let mut place = Place::local(local);
        let copy = self.locals[local.index()].copy;
        let ty = match self.local_tys[local.index()] {
            LocalTy::Plain(t) => t,
            LocalTy::Ref { inner } => {
                if !matches!(expr.projections.first(), Some(ProjectionExpr::Deref)) {
                    return Some(PlaceInfo {
                        place,
                        ty: TypeId::ERROR,
                        copy,
                    });
                }
                place = place.project(Projection::Deref);
                return self.project_rest(expr, place, inner, 1);
            }
        };
        if expr.projections.is_empty() {
            return Some(PlaceInfo { place, ty, copy });
        }
        self.project_rest(expr, place, ty, 0)
    }

    fn project_rest(
        &mut self,
        expr: &PlaceExpr,
        mut place: Place,
        mut ty: TypeId,
        skip: usize,
    ) -> Option<PlaceInfo> {
        let catalog = self.catalog;
        for proj in &expr.projections[skip..] {
            if ty == TypeId::ERROR {
                break;
            }
            let (elem, next) = match (proj, catalog.kind(ty)) {
                (ProjectionExpr::Field(name), TyKind::Record { .. }) => {
                    match catalog.field_index(ty, &name.node) {
                        Some((idx, fty)) => (Projection::Field(idx), fty),
                        None => {
                            return self.bad_projection(
                                expr,
                                &place,
                                ty,
                                format!("access field `{}` of", name.node),
                            );
                        }
                    }
                }
                (ProjectionExpr::Index(i), TyKind::Tuple(elems)) if (*i as usize) < elems.len() => {
                    (Projection::Field(*i), elems[*i as usize])
                }
                (ProjectionExpr::Deref, TyKind::Ref { inner, .. }) => (Projection::Deref, *inner),
                (ProjectionExpr::Element(index), TyKind::Array(elem)) => {
                    let elem = *elem;
                    let op = self.lower_operand(index, None);
                    if !matches!(op, Operand::Constant(_)) {
                        self.emit(index.span, StatementKind::Eval(Rvalue::Use(op)));
                    }
                    (Projection::Index, elem)
                }
                (proj, _) => {
                    let what = match proj {
                        ProjectionExpr::Field(name) => format!("access field `{}` of", name.node),
                        ProjectionExpr::Index(i) => format!("take element {i} of"),
                        ProjectionExpr::Deref => "dereference".to_string(),
                        ProjectionExpr::Element(_) => "index into".to_string(),
                    };
                    return self.bad_projection(expr, &place, ty, what);
                }
            };
            place = place.project(elem);
            ty = next;
        }
        Some(PlaceInfo {
            copy: catalog.is_copy(ty),
            place,
            ty,
        })
    }

    fn bad_projection(
        &mut self,
        expr: &PlaceExpr,
        place: &Place,
        ty: TypeId,
        what: String,
    ) -> Option<PlaceInfo> {
        let root = &self.locals[place.local.index()].name;
        self.errors.push(LowerError::BadProjection {
            what,
            place: place.display_with_root(root),
            ty: self.catalog.display(ty),
            span: expr.span,
        });
        None
    }

    // ---- match ----

    fn lower_match(&mut self, m: &MatchExpr) {
        let Some(scrutinee) = self.lower_place(&m.scrutinee) else {
            self.end_statement(m.span);
            return;
        };
        let mut ty = self.resolve(&m.ty);
        if ty == TypeId::ERROR {
            ty = scrutinee.ty;
        }
        self.emit(m.span, StatementKind::Inspect(scrutinee.place.clone()));
        self.end_statement(m.span);

        let arm_bbs: Vec<BlockId> = m.arms.iter().map(|a| self.new_block(a.span)).collect();
        let join_bb = self.new_block(m.span);
        self.blocks[self.current.index()].terminator = Terminator {
            span: m.span,
            kind: TerminatorKind::Match {
                scrutinee: scrutinee.place.clone(),
                arms: arm_bbs.clone(),
                otherwise: None,
            },
        };

        let catalog = self.catalog;
        let mut patterns = PatternLowerer::new(catalog);
        for (i, arm) in m.arms.iter().enumerate() {
            self.switch_to(arm_bbs[i]);
            let pat = patterns.lower_arm(&arm.pattern, ty);
            let mut sites = Vec::new();
            self.binding_sites(&pat, scrutinee.place.clone(), &mut sites);

            if let Some(guard) = &arm.guard {
                let region = self.push_scope(guard.span);
                self.emit(
                    guard.span,
                    StatementKind::Eval(Rvalue::Ref {
                        place: scrutinee.place.clone(),
                        kind: BorrowKind::Shared,
                        region,
                    }),
                );
                for site in &sites {
                    if self.lookup_in_frame(&site.name).is_some() {
                        continue;
                    }
                    let reference = Some(RefInfo {
                        region,
                        mutable: false,
                    });
                    let local = self.push_local(
                        &site.name,
                        LocalTy::Ref { inner: site.ty },
                        site.span,
                        reference,
                        false,
                    );
                    self.emit(site.span, StatementKind::StorageLive(local));
                    self.emit(
                        site.span,
                        StatementKind::Assign {
                            place: Place::local(local),
                            value: Rvalue::Ref {
                                place: site.place.clone(),
                                kind: BorrowKind::Shared,
                                region,
                            },
                        },
                    );
                }
                let cond = self.lower_operand(guard, None);
                self.end_statement(guard.span);
                self.pop_scope(region, guard.span);
                let next = match arm_bbs.get(i + 1) {
                    Some(&bb) => bb,
                    None => self.new_block(guard.span),
                };
                let bind_bb = self.new_block(arm.span);
                self.blocks[self.current.index()].terminator = Terminator {
                    span: guard.span,
                    kind: TerminatorKind::Branch {
                        cond,
                        then_bb: bind_bb,
                        else_bb: next,
                    },
                };
                self.switch_to(bind_bb);
            }

            let region = self.push_scope(arm.span);
            self.bind(&sites, region);
            self.lower_stmts(&arm.body.stmts);
            self.pop_scope(region, arm.body.span);
            self.goto(arm.span, join_bb);
        }
        self.switch_to(join_bb);
    }

    fn lookup_in_frame(&self, name: &str) -> Option<LocalId> {
        self.frames
            .last()?
            .names
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
    }

    fn bind(&mut self, sites: &[BindingSite], region: RegionId) {
        for site in sites {
            // Or-pattern alternatives bind the same name; one local serves them all.
            let local = match self.lookup_in_frame(&site.name) {
                Some(local) => local,
                None => {
                    let (ty, reference) = match site.mode {
                        BindingMode::Move => (LocalTy::Plain(site.ty), None),
                        BindingMode::Ref | BindingMode::RefMut => (
                            LocalTy::Ref { inner: site.ty },
                            Some(RefInfo {
                                region,
                                mutable: site.mode == BindingMode::RefMut,
                            }),
                        ),
                    };
                    let local = self.push_local(&site.name, ty, site.span, reference, false);
                    self.emit(site.span, StatementKind::StorageLive(local));
                    local
                }
            };
            let value = match site.mode {
                BindingMode::Move if self.catalog.is_copy(site.ty) => {
                    Rvalue::Use(Operand::Copy(site.place.clone()))
                }
                BindingMode::Move => Rvalue::Use(Operand::Move(site.place.clone())),
                BindingMode::Ref => Rvalue::Ref {
                    place: site.place.clone(),
                    kind: BorrowKind::Shared,
                    region,
                },
                BindingMode::RefMut => Rvalue::Ref {
                    place: site.place.clone(),
                    kind: BorrowKind::Unique,
                    region,
                },
            };
            self.emit(
                site.span,
                StatementKind::Assign {
                    place: Place::local(local),
                    value,
                },
            );
        }
    }

    fn binding_sites(&self, pat: &Pat, place: Place, out: &mut Vec<BindingSite>) {
        match &pat.kind {
            PatKind::Wild => {}
            PatKind::Bind { name, mode } => out.push(BindingSite {
                name: name.clone(),
                mode: *mode,
                place,
                ty: pat.ty,
                span: pat.span,
            }),
            PatKind::Or(alts) => {
                for alt in alts {
                    self.binding_sites(alt, place.clone(), out);
                }
            }
            PatKind::Ctor { ctor, fields } => {
                let base = match ctor {
                    Ctor::Variant(id) => {
                        place.project(Projection::Downcast(self.catalog.ctor(*id).name.clone()))
                    }
                    _ => place,
                };
                for (i, field) in fields.iter().enumerate() {
                    self.binding_sites(field, base.field(i as u32), out);
                }
            }
        }
    }
}
