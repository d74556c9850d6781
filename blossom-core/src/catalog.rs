#![forbid(unsafe_code)]

//! The type and constructor catalog.
//!
//! Built once per unit from its declarations, then frozen: after [`build`]
//! returns, the catalog is only read (from many worker threads at once).
//!
//! Building happens in two phases. First every name is registered
//! tentatively (types, contracts, impls, functions) so declarations may refer
//! to each other in any order. Then every type expression in the unit is
//! resolved; applying a generic type checks the arguments against the
//! parameter's contracts and queues the new instantiation on a worklist that
//! computes its fields and constructors, which may queue further
//! instantiations. The worklist is bounded by the instantiation depth limit so
//! polymorphic recursion cannot run away.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use blossom_ast::{
    Block, CtorDecl, Decl, Expr, ExprKind, FieldDecl, FunctionDecl, GenericParam, ImplDecl,
    ProjectionExpr, Span, Stmt, StmtKind, TypeExpr, TypeExprKind, Unit,
};
use serde::Serialize;

use crate::config::CheckConfig;
use crate::error::CatalogError;
use crate::solver::{ConstraintBinding, ConstraintSolver, GenericSig, ImplEntry, ImplId};
use crate::types::{CtorId, DeclId, TyKind, TypeId, TypeTable};

#[derive(Clone, Debug)]
pub enum DeclShape {
    Record(Vec<FieldDecl>),
    Variant(Vec<CtorDecl>),
}

/// A declared record or variant, before instantiation.
#[derive(Clone, Debug)]
pub struct TypeDecl {
    pub id: DeclId,
    pub name: String,
    pub span: Span,
    pub generics: Vec<GenericSig>,
    pub shape: DeclShape,
}

impl TypeDecl {
    pub fn is_record(&self) -> bool {
        matches!(self.shape, DeclShape::Record(_))
    }

    fn kind_with(&self, args: Vec<TypeId>) -> TyKind {
        match self.shape {
            DeclShape::Record(_) => TyKind::Record {
                decl: self.id,
                name: self.name.clone(),
                args,
            },
            DeclShape::Variant(_) => TyKind::Variant {
                decl: self.id,
                name: self.name.clone(),
                args,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: String,
    pub ty: TypeId,
}

/// One constructor of one instantiated variant type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Constructor {
    pub id: CtorId,
    pub owner: TypeId,
    pub name: String,
    /// Position within the variant's declaration.
    pub index: u32,
    pub fields: Vec<TypeId>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct FunctionSig {
    pub name: String,
    pub span: Span,
    /// Position of the declaration among the unit's functions.
    pub index: usize,
    pub generics: Vec<GenericSig>,
    pub regions: Vec<String>,
    pub params: Vec<(String, TypeId)>,
    pub ret: TypeId,
}

/// Everything a type expression may refer to besides declared types.
#[derive(Clone, Debug, Default)]
pub struct TypeScope {
    /// Declaration that binds the generic parameters in scope.
    pub owner: String,
    pub params: Vec<GenericSig>,
    /// Declared region names; `None` accepts any.
    pub regions: Option<Vec<String>>,
}

impl TypeScope {
    pub fn of_function(sig: &FunctionSig) -> Self {
        TypeScope {
            owner: sig.name.clone(),
            params: sig.generics.clone(),
            regions: Some(sig.regions.clone()),
        }
    }

    fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
    }
}

/// Frozen catalog of a unit's types, constructors, contracts and functions.
#[derive(Debug, Default)]
pub struct TypeCatalog {
    types: TypeTable,
    decls: Vec<TypeDecl>,
    decl_names: HashMap<String, DeclId>,
    contracts: BTreeMap<String, Span>,
    impls: Vec<ImplEntry>,
    ctors: Vec<Constructor>,
    ctors_of: HashMap<TypeId, Vec<CtorId>>,
    fields_of: HashMap<TypeId, Vec<Field>>,
    functions: HashMap<String, FunctionSig>,
    poisoned: HashSet<usize>,
    bindings: Vec<ConstraintBinding>,
}

impl TypeCatalog {
    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    pub fn kind(&self, ty: TypeId) -> &TyKind {
        self.types.kind(ty)
    }

    pub fn display(&self, ty: TypeId) -> String {
        self.types.display(ty)
    }

    pub fn is_copy(&self, ty: TypeId) -> bool {
        self.types.is_copy(ty)
    }

    /// The canonical type of a non-generic declared name.
    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        let decl = self.decl_by_name(name)?;
        if !decl.generics.is_empty() {
            return None;
        }
        self.types.lookup(&decl.kind_with(Vec::new()))
    }

    pub fn decl(&self, id: DeclId) -> &TypeDecl {
        &self.decls[id.0 as usize]
    }

    pub fn decl_by_name(&self, name: &str) -> Option<&TypeDecl> {
        self.decl_names.get(name).map(|id| self.decl(*id))
    }

    pub fn contracts(&self) -> impl Iterator<Item = &str> {
        self.contracts.keys().map(String::as_str)
    }

    pub fn impls(&self) -> &[ImplEntry] {
        &self.impls
    }

    pub fn impl_entry(&self, id: ImplId) -> &ImplEntry {
        &self.impls[id.0 as usize]
    }

    /// Resolved generic arguments, with the impls that justified them.
    pub fn bindings(&self) -> &[ConstraintBinding] {
        &self.bindings
    }

    /// Constructors of a variant type, in declaration order.
    pub fn constructors(&self, ty: TypeId) -> Option<&[CtorId]> {
        self.ctors_of.get(&ty).map(Vec::as_slice)
    }

    pub fn ctor(&self, id: CtorId) -> &Constructor {
        &self.ctors[id.index()]
    }

    pub fn ctor_named(&self, ty: TypeId, name: &str) -> Option<&Constructor> {
        self.constructors(ty)?
            .iter()
            .map(|id| self.ctor(*id))
            .find(|c| c.name == name)
    }

    /// Fields of a record type, in declaration order.
    pub fn fields(&self, ty: TypeId) -> Option<&[Field]> {
        self.fields_of.get(&ty).map(Vec::as_slice)
    }

    pub fn field_index(&self, ty: TypeId, name: &str) -> Option<(u32, TypeId)> {
        self.fields(ty)?
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == name)
            .map(|(i, f)| (i as u32, f.ty))
    }

    pub fn function(&self, name: &str) -> Option<&FunctionSig> {
        self.functions.get(name)
    }

    /// Functions whose declarations failed to resolve are not checked further.
    pub fn is_poisoned(&self, index: usize) -> bool {
        self.poisoned.contains(&index)
    }

    /// Resolve a type expression against the frozen catalog.
    ///
    /// Every type expression in the unit was interned while building, so
    /// this is a pure lookup; anything that failed then resolves to the
    /// error type now.
    pub fn resolve(&self, expr: &TypeExpr, scope: &TypeScope) -> TypeId {
        match &expr.kind {
            TypeExprKind::Int => TypeId::INT,
            TypeExprKind::Real => TypeId::REAL,
            TypeExprKind::Bool => TypeId::BOOL,
            TypeExprKind::Str => TypeId::STR,
            TypeExprKind::Unit => TypeId::UNIT,
            TypeExprKind::Named { name, args } => {
                let Some(decl) = self.decl_by_name(&name.node) else {
                    return TypeId::ERROR;
                };
                if decl.generics.len() != args.len() {
                    return TypeId::ERROR;
                }
                let args = args.iter().map(|a| self.resolve(a, scope)).collect();
                self.lookup_kind(decl.kind_with(args))
            }
            TypeExprKind::Generic(name) => {
                if !scope.has_param(&name.node) {
                    return TypeId::ERROR;
                }
                self.lookup_kind(TyKind::Param {
                    owner: scope.owner.clone(),
                    name: name.node.clone(),
                })
            }
            TypeExprKind::Tuple(elems) => {
                let elems = elems.iter().map(|e| self.resolve(e, scope)).collect();
                self.lookup_kind(TyKind::Tuple(elems))
            }
            TypeExprKind::Array(elem) => {
                let elem = self.resolve(elem, scope);
                self.lookup_kind(TyKind::Array(elem))
            }
            TypeExprKind::Ref {
                region,
                mutable,
                inner,
            } => {
                let inner = self.resolve(inner, scope);
                self.lookup_kind(TyKind::Ref {
                    region: region.as_ref().map(|r| r.node.clone()),
                    mutable: *mutable,
                    inner,
                })
            }
        }
    }

    /// Replace `owner`'s generic parameters in `ty` using `subst`.
    pub fn substitute(&self, ty: TypeId, owner: &str, subst: &HashMap<String, TypeId>) -> TypeId {
        let kind = match self.kind(ty) {
            TyKind::Param { owner: o, name } if o == owner => {
                return subst.get(name).copied().unwrap_or(ty);
            }
            TyKind::Record { decl, name, args } => TyKind::Record {
                decl: *decl,
                name: name.clone(),
                args: args.iter().map(|a| self.substitute(*a, owner, subst)).collect(),
            },
            TyKind::Variant { decl, name, args } => TyKind::Variant {
                decl: *decl,
                name: name.clone(),
                args: args.iter().map(|a| self.substitute(*a, owner, subst)).collect(),
            },
            TyKind::Tuple(elems) => TyKind::Tuple(
                elems
                    .iter()
                    .map(|a| self.substitute(*a, owner, subst))
                    .collect(),
            ),
            TyKind::Array(elem) => TyKind::Array(self.substitute(*elem, owner, subst)),
            TyKind::Ref {
                region,
                mutable,
                inner,
            } => TyKind::Ref {
                region: region.clone(),
                mutable: *mutable,
                inner: self.substitute(*inner, owner, subst),
            },
            _ => return ty,
        };
        self.lookup_kind(kind)
    }

    fn lookup_kind(&self, kind: TyKind) -> TypeId {
        self.types.lookup(&kind).unwrap_or(TypeId::ERROR)
    }
}

/// Build and freeze the catalog for `unit`.
///
/// Errors do not stop the build; they are returned alongside a catalog that
/// maps whatever failed to the error type. Functions whose signature or
/// body types failed are marked poisoned.
pub fn build(unit: &Unit, config: &CheckConfig) -> (TypeCatalog, Vec<CatalogError>) {
    let mut builder = Builder::new(config);
    builder.register(unit);
    builder.resolve_impls(unit);
    builder.resolve_decls();
    builder.resolve_functions(unit);
    builder.finish()
}

struct Instantiation {
    ty: TypeId,
    decl: DeclId,
    args: Vec<TypeId>,
    depth: usize,
}

struct Obligation {
    param: GenericSig,
    candidate: TypeId,
    span: Span,
}

struct Builder {
    cat: TypeCatalog,
    solver: ConstraintSolver,
    errors: Vec<CatalogError>,
    worklist: VecDeque<Instantiation>,
    /// While impl targets are resolved, obligations wait until every impl is known.
    deferred: Option<Vec<Obligation>>,
    seen_bindings: HashSet<(String, TypeId)>,
    function_indices: HashMap<String, usize>,
    max_depth: usize,
}

impl Builder {
    fn new(config: &CheckConfig) -> Self {
        Builder {
            cat: TypeCatalog::default(),
            solver: ConstraintSolver::new(config.max_instantiation_depth),
            errors: Vec::new(),
            worklist: VecDeque::new(),
            deferred: None,
            seen_bindings: HashSet::new(),
            function_indices: HashMap::new(),
            max_depth: config.max_instantiation_depth,
        }
    }

    fn error(&mut self, err: CatalogError) {
        self.errors.push(err);
    }

    fn generics(&mut self, owner: &str, params: &[GenericParam]) -> Vec<GenericSig> {
        let mut out: Vec<GenericSig> = Vec::with_capacity(params.len());
        for p in params {
            if let Some(prev) = out.iter().find(|g| g.name == p.name.node) {
                let previous = prev.span;
                self.error(CatalogError::Duplicate {
                    what: "generic parameter",
                    name: p.name.node.clone(),
                    span: p.name.span,
                    previous,
                });
                continue;
            }
            let sig = GenericSig {
                name: p.name.node.clone(),
                constraints: p.constraints.iter().map(|c| c.node.clone()).collect(),
                span: p.name.span,
            };
            self.solver.assume(owner, &sig.name, sig.constraints.clone());
            out.push(sig);
        }
        out
    }

    fn check_contracts(&mut self, params: &[GenericParam]) {
        for p in params {
            for c in &p.constraints {
                if !self.cat.contracts.contains_key(&c.node) {
                    self.error(CatalogError::Unknown {
                        what: "contract",
                        name: c.node.clone(),
                        span: c.span,
                    });
                }
            }
        }
    }

    /// Phase one: tentative registration of every declared name.
    fn register(&mut self, unit: &Unit) {
        for decl in &unit.decls {
            if let Decl::Contract(c) = decl {
                if let Some(prev) = self.cat.contracts.get(&c.name.node) {
                    let previous = *prev;
                    self.error(CatalogError::Duplicate {
                        what: "contract",
                        name: c.name.node.clone(),
                        span: c.name.span,
                        previous,
                    });
                } else {
                    self.cat.contracts.insert(c.name.node.clone(), c.name.span);
                }
            }
        }

        let mut function_index = 0;
        for decl in &unit.decls {
            match decl {
                Decl::Record(r) => {
                    let generics = self.generics(&r.name.node, &r.generics);
                    self.check_contracts(&r.generics);
                    let mut seen: HashMap<&str, Span> = HashMap::new();
                    for f in &r.fields {
                        if let Some(prev) = seen.insert(&f.name.node, f.name.span) {
                            self.error(CatalogError::Duplicate {
                                what: "field",
                                name: f.name.node.clone(),
                                span: f.name.span,
                                previous: prev,
                            });
                        }
                    }
                    self.register_type(&r.name, r.span, generics, DeclShape::Record(r.fields.clone()));
                }
                Decl::Variant(v) => {
                    let generics = self.generics(&v.name.node, &v.generics);
                    self.check_contracts(&v.generics);
                    let mut seen: HashMap<&str, Span> = HashMap::new();
                    for c in &v.ctors {
                        if let Some(prev) = seen.insert(&c.name.node, c.name.span) {
                            self.error(CatalogError::Duplicate {
                                what: "constructor",
                                name: c.name.node.clone(),
                                span: c.name.span,
                                previous: prev,
                            });
                        }
                    }
                    self.register_type(&v.name, v.span, generics, DeclShape::Variant(v.ctors.clone()));
                }
                Decl::Function(f) => {
                    let index = function_index;
                    function_index += 1;
                    if let Some(prev) = self.cat.functions.get(&f.name.node) {
                        let previous = prev.span;
                        self.error(CatalogError::Duplicate {
                            what: "function",
                            name: f.name.node.clone(),
                            span: f.name.span,
                            previous,
                        });
                        self.cat.poisoned.insert(index);
                        continue;
                    }
                    let generics = self.generics(&f.name.node, &f.generics);
                    self.function_indices.insert(f.name.node.clone(), index);
                    self.cat.functions.insert(
                        f.name.node.clone(),
                        FunctionSig {
                            name: f.name.node.clone(),
                            span: f.name.span,
                            index,
                            generics,
                            regions: f.regions.iter().map(|r| r.name.node.clone()).collect(),
                            params: Vec::new(),
                            ret: TypeId::ERROR,
                        },
                    );
                }
                Decl::Contract(_) | Decl::Impl(_) => {}
            }
        }
    }

    fn register_type(
        &mut self,
        name: &blossom_ast::Ident,
        span: Span,
        generics: Vec<GenericSig>,
        shape: DeclShape,
    ) {
        if let Some(prev) = self.cat.decl_names.get(&name.node) {
            let previous = self.cat.decl(*prev).span;
            self.error(CatalogError::Duplicate {
                what: "type",
                name: name.node.clone(),
                span,
                previous,
            });
            return;
        }
        let id = DeclId(self.cat.decls.len() as u32);
        self.cat.decl_names.insert(name.node.clone(), id);
        self.cat.decls.push(TypeDecl {
            id,
            name: name.node.clone(),
            span,
            generics,
            shape,
        });
    }

    /// Impl targets are resolved with obligations deferred, so that an impl
    /// may rely on impls declared after it.
    fn resolve_impls(&mut self, unit: &Unit) {
        self.deferred = Some(Vec::new());
        let impls: Vec<&ImplDecl> = unit
            .decls
            .iter()
            .filter_map(|d| match d {
                Decl::Impl(i) => Some(i),
                _ => None,
            })
            .collect();
        for (idx, decl) in impls.into_iter().enumerate() {
            let owner = format!("impl#{idx}");
            if !self.cat.contracts.contains_key(&decl.contract.node) {
                self.error(CatalogError::Unknown {
                    what: "contract",
                    name: decl.contract.node.clone(),
                    span: decl.contract.span,
                });
                continue;
            }
            self.check_contracts(&decl.generics);
            let generics = self.generics(&owner, &decl.generics);
            let scope = TypeScope {
                owner: owner.clone(),
                params: generics.clone(),
                regions: None,
            };
            let target = self.resolve(&decl.target, &scope, None, 0);
            if target == TypeId::ERROR {
                continue;
            }
            let entry = ImplEntry {
                contract: decl.contract.node.clone(),
                target,
                owner,
                generics,
                priority: decl.priority,
                span: decl.span,
            };
            self.cat.impls.push(entry.clone());
            self.solver.add_impl(entry);
        }
        let deferred = self.deferred.take().unwrap_or_default();
        for ob in deferred {
            self.discharge(ob);
        }
        self.drain();
    }

    /// Every declaration is instantiated at its own parameters so field
    /// types are checked even when the type is never used.
    fn resolve_decls(&mut self) {
        for idx in 0..self.cat.decls.len() {
            let decl = &self.cat.decls[idx];
            let owner = decl.name.clone();
            let id = decl.id;
            let span = decl.span;
            let names: Vec<String> = decl.generics.iter().map(|g| g.name.clone()).collect();
            let args: Vec<TypeId> = names
                .into_iter()
                .map(|name| {
                    self.cat
                        .types
                        .intern(TyKind::Param {
                            owner: owner.clone(),
                            name,
                        })
                        .0
                })
                .collect();
            self.instantiate(id, args, span, 0);
            self.drain();
        }
    }

    fn resolve_functions(&mut self, unit: &Unit) {
        for (index, f) in unit.functions().enumerate() {
            // A later duplicate never got a signature of its own.
            if self.function_indices.get(&f.name.node) != Some(&index) {
                continue;
            }
            let Some(sig) = self.cat.functions.get(&f.name.node) else {
                continue;
            };
            let before = self.errors.len();
            let scope = TypeScope::of_function(sig);
            self.check_contracts(&f.generics);
            self.check_regions(f);

            let params: Vec<(String, TypeId)> = f
                .params
                .iter()
                .map(|p| (p.name.node.clone(), self.resolve(&p.ty, &scope, None, 0)))
                .collect();
            let ret = self.resolve(&f.ret, &scope, None, 0);
            if let Some(sig) = self.cat.functions.get_mut(&f.name.node) {
                sig.params = params;
                sig.ret = ret;
            }
            self.drain();
            self.walk_block(&f.body, &scope);
            self.drain();

            if self.errors.len() > before {
                tracing::debug!(function = %f.name.node, "function poisoned by catalog errors");
                self.cat.poisoned.insert(index);
            }
        }
    }

    fn check_regions(&mut self, f: &FunctionDecl) {
        let mut seen: HashMap<&str, Span> = HashMap::new();
        for r in &f.regions {
            if let Some(prev) = seen.insert(&r.name.node, r.name.span) {
                self.error(CatalogError::Duplicate {
                    what: "region",
                    name: r.name.node.clone(),
                    span: r.name.span,
                    previous: prev,
                });
            }
        }
        for r in &f.regions {
            for o in &r.outlives {
                if !seen.contains_key(o.node.as_str()) && o.node != "static" {
                    self.error(CatalogError::Unknown {
                        what: "region",
                        name: o.node.clone(),
                        span: o.span,
                    });
                }
            }
        }
    }

    fn walk_block(&mut self, block: &Block, scope: &TypeScope) {
        for stmt in &block.stmts {
            self.walk_stmt(stmt, scope);
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt, scope: &TypeScope) {
        match &stmt.kind {
            StmtKind::Let { ty, init, .. } => {
                self.resolve(ty, scope, None, 0);
                if let Some(init) = init {
                    self.walk_expr(init, scope);
                }
            }
            StmtKind::Assign { place, value } => {
                self.walk_projections(&place.projections, scope);
                self.walk_expr(value, scope);
            }
            StmtKind::Expr(e) => self.walk_expr(e, scope),
            StmtKind::Match(m) => {
                self.walk_projections(&m.scrutinee.projections, scope);
                self.resolve(&m.ty, scope, None, 0);
                for arm in &m.arms {
                    if let Some(g) = &arm.guard {
                        self.walk_expr(g, scope);
                    }
                    self.walk_block(&arm.body, scope);
                }
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                self.walk_expr(cond, scope);
                self.walk_block(then_block, scope);
                if let Some(b) = else_block {
                    self.walk_block(b, scope);
                }
            }
            StmtKind::While { cond, body } => {
                self.walk_expr(cond, scope);
                self.walk_block(body, scope);
            }
            StmtKind::Return(e) => {
                if let Some(e) = e {
                    self.walk_expr(e, scope);
                }
            }
            StmtKind::Block(b) => self.walk_block(b, scope),
        }
    }

    fn walk_projections(&mut self, projections: &[ProjectionExpr], scope: &TypeScope) {
        for p in projections {
            if let ProjectionExpr::Element(e) = p {
                self.walk_expr(e, scope);
            }
        }
    }

    fn walk_expr(&mut self, expr: &Expr, scope: &TypeScope) {
        match &expr.kind {
            ExprKind::Lit(_) => {}
            ExprKind::Use(place) | ExprKind::Borrow { place, .. } => {
                self.walk_projections(&place.projections, scope);
            }
            ExprKind::Call {
                callee,
                type_args,
                args,
            } => {
                for a in args {
                    self.walk_expr(a, scope);
                }
                let resolved: Vec<TypeId> = type_args
                    .iter()
                    .map(|t| self.resolve(t, scope, None, 0))
                    .collect();
                let Some(sig) = self.cat.functions.get(&callee.node) else {
                    self.error(CatalogError::Unknown {
                        what: "function",
                        name: callee.node.clone(),
                        span: callee.span,
                    });
                    return;
                };
                if type_args.is_empty() {
                    return;
                }
                if sig.generics.len() != type_args.len() {
                    let err = CatalogError::WrongArity {
                        name: sig.name.clone(),
                        expected: sig.generics.len(),
                        found: type_args.len(),
                        span: callee.span,
                    };
                    self.error(err);
                    return;
                }
                let generics = sig.generics.clone();
                let owner = sig.name.clone();
                let ret = sig.ret;
                let mut subst = HashMap::new();
                for (g, ty) in generics.into_iter().zip(resolved) {
                    subst.insert(g.name.clone(), ty);
                    self.obligation(Obligation {
                        param: g,
                        candidate: ty,
                        span: expr.span,
                    });
                }
                // Intern the instantiated return type for the lowering pass.
                self.substitute(ret, &owner, &subst, expr.span);
            }
            ExprKind::Construct { ty, ctor, args } => {
                for a in args {
                    self.walk_expr(a, scope);
                }
                let resolved = self.resolve(ty, scope, None, 0);
                self.drain();
                match (self.cat.kind(resolved).clone(), ctor) {
                    (TyKind::Variant { .. }, Some(name)) => {
                        if self.cat.ctor_named(resolved, &name.node).is_none() {
                            self.error(CatalogError::Unknown {
                                what: "constructor",
                                name: name.node.clone(),
                                span: name.span,
                            });
                        }
                    }
                    (TyKind::Variant { name, .. }, None) => {
                        self.error(CatalogError::Unknown {
                            what: "constructor for variant",
                            name,
                            span: ty.span,
                        });
                    }
                    (TyKind::Record { .. }, Some(name)) => {
                        self.error(CatalogError::Unknown {
                            what: "constructor",
                            name: name.node.clone(),
                            span: name.span,
                        });
                    }
                    _ => {}
                }
            }
            ExprKind::Tuple(elems) => {
                for e in elems {
                    self.walk_expr(e, scope);
                }
            }
            ExprKind::Unary { operand, .. } => self.walk_expr(operand, scope),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.walk_expr(lhs, scope);
                self.walk_expr(rhs, scope);
            }
        }
    }

    /// Resolve a type expression, interning everything it mentions.
    fn resolve(
        &mut self,
        expr: &TypeExpr,
        scope: &TypeScope,
        subst: Option<&HashMap<String, TypeId>>,
        depth: usize,
    ) -> TypeId {
        match &expr.kind {
            TypeExprKind::Int => TypeId::INT,
            TypeExprKind::Real => TypeId::REAL,
            TypeExprKind::Bool => TypeId::BOOL,
            TypeExprKind::Str => TypeId::STR,
            TypeExprKind::Unit => TypeId::UNIT,
            TypeExprKind::Named { name, args } => {
                let Some(decl) = self.cat.decl_by_name(&name.node) else {
                    self.error(CatalogError::Unknown {
                        what: "type",
                        name: name.node.clone(),
                        span: name.span,
                    });
                    return TypeId::ERROR;
                };
                let expected = decl.generics.len();
                let id = decl.id;
                if expected != args.len() {
                    self.error(CatalogError::WrongArity {
                        name: name.node.clone(),
                        expected,
                        found: args.len(),
                        span: expr.span,
                    });
                    return TypeId::ERROR;
                }
                let args: Vec<TypeId> = args
                    .iter()
                    .map(|a| self.resolve(a, scope, subst, depth))
                    .collect();
                if args.contains(&TypeId::ERROR) {
                    return TypeId::ERROR;
                }
                self.instantiate(id, args, expr.span, depth)
            }
            TypeExprKind::Generic(name) => {
                if let Some(bound) = subst.and_then(|s| s.get(&name.node)) {
                    return *bound;
                }
                if !scope.has_param(&name.node) {
                    self.error(CatalogError::Unknown {
                        what: "generic parameter",
                        name: name.node.clone(),
                        span: name.span,
                    });
                    return TypeId::ERROR;
                }
                self.cat
                    .types
                    .intern(TyKind::Param {
                        owner: scope.owner.clone(),
                        name: name.node.clone(),
                    })
                    .0
            }
            TypeExprKind::Tuple(elems) => {
                let elems = elems
                    .iter()
                    .map(|e| self.resolve(e, scope, subst, depth))
                    .collect();
                self.cat.types.intern(TyKind::Tuple(elems)).0
            }
            TypeExprKind::Array(elem) => {
                let elem = self.resolve(elem, scope, subst, depth);
                self.cat.types.intern(TyKind::Array(elem)).0
            }
            TypeExprKind::Ref {
                region,
                mutable,
                inner,
            } => {
                if let (Some(r), Some(declared)) = (region, &scope.regions) {
                    if r.node != "static" && !declared.contains(&r.node) {
                        self.error(CatalogError::Unknown {
                            what: "region",
                            name: r.node.clone(),
                            span: r.span,
                        });
                    }
                }
                let inner = self.resolve(inner, scope, subst, depth);
                self.cat
                    .types
                    .intern(TyKind::Ref {
                        region: region.as_ref().map(|r| r.node.clone()),
                        mutable: *mutable,
                        inner,
                    })
                    .0
            }
        }
    }

    fn substitute(
        &mut self,
        ty: TypeId,
        owner: &str,
        subst: &HashMap<String, TypeId>,
        span: Span,
    ) -> TypeId {
        let kind = self.cat.kind(ty).clone();
        match kind {
            TyKind::Param { owner: o, name } if o == owner => {
                subst.get(&name).copied().unwrap_or(ty)
            }
            TyKind::Record { decl, args, .. } | TyKind::Variant { decl, args, .. } => {
                let args = args
                    .iter()
                    .map(|a| self.substitute(*a, owner, subst, span))
                    .collect();
                let id = self.instantiate(decl, args, span, 0);
                self.drain();
                id
            }
            TyKind::Tuple(elems) => {
                let elems = elems
                    .iter()
                    .map(|a| self.substitute(*a, owner, subst, span))
                    .collect();
                self.cat.types.intern(TyKind::Tuple(elems)).0
            }
            TyKind::Array(elem) => {
                let elem = self.substitute(elem, owner, subst, span);
                self.cat.types.intern(TyKind::Array(elem)).0
            }
            TyKind::Ref {
                region,
                mutable,
                inner,
            } => {
                let inner = self.substitute(inner, owner, subst, span);
                self.cat
                    .types
                    .intern(TyKind::Ref {
                        region,
                        mutable,
                        inner,
                    })
                    .0
            }
            _ => ty,
        }
    }

    /// Apply a declaration to arguments: check contracts, intern, queue if new.
    fn instantiate(&mut self, decl: DeclId, args: Vec<TypeId>, span: Span, depth: usize) -> TypeId {
        let d = self.cat.decl(decl);
        let generics = d.generics.clone();
        let kind = d.kind_with(args.clone());
        for (g, arg) in generics.into_iter().zip(args.iter().copied()) {
            if g.constraints.is_empty() {
                continue;
            }
            self.obligation(Obligation {
                param: g,
                candidate: arg,
                span,
            });
        }
        let (id, new) = self.cat.types.intern(kind);
        if new {
            if depth >= self.max_depth {
                self.error(CatalogError::TooDeep {
                    ty: self.cat.display(id),
                    limit: self.max_depth,
                    span,
                });
                // Leave the type without members; matches on it see an empty signature.
                return id;
            }
            self.worklist.push_back(Instantiation {
                ty: id,
                decl,
                args,
                depth: depth + 1,
            });
        }
        id
    }

    fn obligation(&mut self, ob: Obligation) {
        match &mut self.deferred {
            Some(list) => list.push(ob),
            None => self.discharge(ob),
        }
    }

    fn discharge(&mut self, ob: Obligation) {
        match self.solver.solve(&self.cat.types, &ob.param, ob.candidate) {
            Ok(binding) => {
                if self.seen_bindings.insert((ob.param.name.clone(), ob.candidate)) {
                    self.cat.bindings.push(binding);
                }
            }
            Err(source) => self.error(CatalogError::Constraint {
                param: ob.param.name.clone(),
                source,
                span: ob.span,
            }),
        }
    }

    /// Compute members of queued instantiations until none are left.
    fn drain(&mut self) {
        while let Some(inst) = self.worklist.pop_front() {
            let decl = self.cat.decl(inst.decl).clone();
            let subst: HashMap<String, TypeId> = decl
                .generics
                .iter()
                .map(|g| g.name.clone())
                .zip(inst.args.iter().copied())
                .collect();
            let scope = TypeScope {
                owner: decl.name.clone(),
                params: decl.generics.clone(),
                regions: None,
            };
            match &decl.shape {
                DeclShape::Record(fields) => {
                    let fields = fields
                        .iter()
                        .map(|f| Field {
                            name: f.name.node.clone(),
                            ty: self.resolve(&f.ty, &scope, Some(&subst), inst.depth),
                        })
                        .collect();
                    self.cat.fields_of.insert(inst.ty, fields);
                }
                DeclShape::Variant(ctors) => {
                    let mut ids = Vec::with_capacity(ctors.len());
                    for (index, c) in ctors.iter().enumerate() {
                        let fields = c
                            .fields
                            .iter()
                            .map(|t| self.resolve(t, &scope, Some(&subst), inst.depth))
                            .collect();
                        let id = CtorId(self.cat.ctors.len() as u32);
                        self.cat.ctors.push(Constructor {
                            id,
                            owner: inst.ty,
                            name: c.name.node.clone(),
                            index: index as u32,
                            fields,
                            span: c.name.span,
                        });
                        ids.push(id);
                    }
                    self.cat.ctors_of.insert(inst.ty, ids);
                }
            }
        }
    }

    fn finish(mut self) -> (TypeCatalog, Vec<CatalogError>) {
        self.drain();
        // A generic declaration reports the same field error once per instantiation.
        let mut seen = HashSet::new();
        self.errors
            .retain(|e| seen.insert((e.span(), e.to_string())));
        tracing::debug!(
            types = self.cat.types.len(),
            ctors = self.cat.ctors.len(),
            impls = self.cat.impls.len(),
            errors = self.errors.len(),
            "catalog frozen"
        );
        (self.cat, self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blossom_ast::builder::*;

    fn shapes() -> Unit {
        unit(
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
                record("Point", vec![("x", int()), ("y", int())]),
            ],
        )
    }

    #[test]
    fn variant_constructors_keep_declaration_order() {
        let (cat, errors) = build(&shapes(), &CheckConfig::default());
        assert!(errors.is_empty(), "{errors:?}");
        let shape = cat.lookup("Shape").expect("Shape");
        let names: Vec<_> = cat
            .constructors(shape)
            .expect("ctors")
            .iter()
            .map(|c| cat.ctor(*c).name.clone())
            .collect();
        assert_eq!(names, ["Circle", "Square", "Triangle"]);
        let tri = cat.ctor_named(shape, "Triangle").expect("Triangle");
        assert_eq!(tri.fields, vec![TypeId::REAL; 3]);
        assert_eq!(tri.index, 2);
    }

    #[test]
    fn record_fields_resolve_by_name() {
        let (cat, _) = build(&shapes(), &CheckConfig::default());
        let point = cat.lookup("Point").expect("Point");
        assert_eq!(cat.field_index(point, "y"), Some((1, TypeId::INT)));
        assert_eq!(cat.field_index(point, "z"), None);
    }

    #[test]
    fn duplicates_are_reported_in_each_namespace() {
        let u = unit(
            "dups",
            vec![
                record("A", vec![]),
                variant("A", vec![("X", vec![]), ("X", vec![])]),
                contract("Show"),
                contract("Show"),
            ],
        );
        let (_, errors) = build(&u, &CheckConfig::default());
        let whats: Vec<_> = errors
            .iter()
            .filter_map(|e| match e {
                CatalogError::Duplicate { what, .. } => Some(*what),
                _ => None,
            })
            .collect();
        assert!(whats.contains(&"type"));
        assert!(whats.contains(&"constructor"));
        assert!(whats.contains(&"contract"));
    }

    #[test]
    fn generic_instantiation_checks_contracts() {
        let u = unit(
            "boxes",
            vec![
                contract("Show"),
                impl_for("Show", int()),
                record_generic("Boxed", vec![param("T", &["Show"])], vec![("v", generic("T"))]),
                Decl::Function(function("ok", vec![("b", applied("Boxed", vec![int()]))], vec![])),
                Decl::Function(function(
                    "bad",
                    vec![("b", applied("Boxed", vec![str_ty()]))],
                    vec![],
                )),
            ],
        );
        let (cat, errors) = build(&u, &CheckConfig::default());
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert!(matches!(errors[0], CatalogError::Constraint { .. }));
        let ok = cat.function("ok").expect("ok");
        let bad = cat.function("bad").expect("bad");
        assert!(!cat.is_poisoned(ok.index));
        assert!(cat.is_poisoned(bad.index));
        assert_eq!(cat.display(ok.params[0].1), "Boxed<Int>");
        assert_eq!(cat.fields(ok.params[0].1).expect("fields")[0].ty, TypeId::INT);
    }

    #[test]
    fn impls_may_depend_on_later_impls() {
        let u = unit(
            "order",
            vec![
                contract("Show"),
                record_generic("Boxed", vec![param("T", &["Show"])], vec![("v", generic("T"))]),
                impl_for("Show", applied("Boxed", vec![int()])),
                impl_for("Show", int()),
            ],
        );
        let (_, errors) = build(&u, &CheckConfig::default());
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn recursive_variants_terminate() {
        let u = unit(
            "lists",
            vec![
                variant_generic(
                    "List",
                    vec![param("T", &[])],
                    vec![
                        ("Nil", vec![]),
                        ("Cons", vec![generic("T"), applied("List", vec![generic("T")])]),
                    ],
                ),
                Decl::Function(function("f", vec![("l", applied("List", vec![int()]))], vec![])),
            ],
        );
        let (cat, errors) = build(&u, &CheckConfig::default());
        assert!(errors.is_empty(), "{errors:?}");
        let l = cat.function("f").expect("f").params[0].1;
        let cons = cat.ctor_named(l, "Cons").expect("Cons");
        assert_eq!(cons.fields, vec![TypeId::INT, l]);
    }

    #[test]
    fn polymorphic_recursion_hits_the_depth_limit() {
        let u = unit(
            "nest",
            vec![variant_generic(
                "Nest",
                vec![param("T", &[])],
                vec![
                    ("Leaf", vec![generic("T")]),
                    (
                        "Deeper",
                        vec![applied("Nest", vec![tuple_ty(vec![generic("T"), generic("T")])])],
                    ),
                ],
            )],
        );
        let config = CheckConfig {
            max_instantiation_depth: 4,
            ..CheckConfig::default()
        };
        let (_, errors) = build(&u, &config);
        assert!(
            errors.iter().any(|e| matches!(e, CatalogError::TooDeep { .. })),
            "{errors:?}"
        );
    }

    #[test]
    fn unknown_names_are_unresolved() {
        let u = unit(
            "unknown",
            vec![Decl::Function(function(
                "f",
                vec![("x", named("Missing"))],
                vec![eval(call("nowhere", vec![]))],
            ))],
        );
        let (cat, errors) = build(&u, &CheckConfig::default());
        assert_eq!(errors.len(), 2, "{errors:?}");
        assert!(cat.is_poisoned(0));
    }
}
