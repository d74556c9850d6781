//! Terse constructors for hand-built units.
//!
//! Tests and fixtures use these instead of spelling out every struct. Nodes
//! get an empty span; chain [`At::at`] where a test cares about locations.

use crate::*;

pub trait At: Sized {
    fn span_mut(&mut self) -> &mut Span;

    /// Place the node at `offset` (length 1).
    fn at(mut self, offset: usize) -> Self {
        *self.span_mut() = span(offset, 1);
        self
    }
}

macro_rules! impl_at {
    ($($ty:ty),* $(,)?) => {
        $(impl At for $ty {
            fn span_mut(&mut self) -> &mut Span {
                &mut self.span
            }
        })*
    };
}

impl_at!(
    Stmt, Expr, Pattern, PlaceExpr, TypeExpr, MatchArm, MatchExpr, Block, Param, FunctionDecl,
    RecordDecl, VariantDecl, ContractDecl, ImplDecl,
);

pub fn ident(name: &str) -> Ident {
    Spanned::new(Span::default(), name.to_string())
}

fn ty(kind: TypeExprKind) -> TypeExpr {
    TypeExpr {
        span: Span::default(),
        kind,
    }
}

pub fn int() -> TypeExpr {
    ty(TypeExprKind::Int)
}

pub fn real() -> TypeExpr {
    ty(TypeExprKind::Real)
}

pub fn bool_ty() -> TypeExpr {
    ty(TypeExprKind::Bool)
}

pub fn str_ty() -> TypeExpr {
    ty(TypeExprKind::Str)
}

pub fn unit_ty() -> TypeExpr {
    ty(TypeExprKind::Unit)
}

pub fn named(name: &str) -> TypeExpr {
    applied(name, Vec::new())
}

pub fn applied(name: &str, args: Vec<TypeExpr>) -> TypeExpr {
    ty(TypeExprKind::Named {
        name: ident(name),
        args,
    })
}

pub fn generic(name: &str) -> TypeExpr {
    ty(TypeExprKind::Generic(ident(name)))
}

pub fn tuple_ty(elems: Vec<TypeExpr>) -> TypeExpr {
    ty(TypeExprKind::Tuple(elems))
}

pub fn array_ty(elem: TypeExpr) -> TypeExpr {
    ty(TypeExprKind::Array(Box::new(elem)))
}

pub fn ref_ty(inner: TypeExpr) -> TypeExpr {
    ty(TypeExprKind::Ref {
        region: None,
        mutable: false,
        inner: Box::new(inner),
    })
}

pub fn ref_mut_ty(inner: TypeExpr) -> TypeExpr {
    ty(TypeExprKind::Ref {
        region: None,
        mutable: true,
        inner: Box::new(inner),
    })
}

pub fn ref_in(region: &str, inner: TypeExpr) -> TypeExpr {
    ty(TypeExprKind::Ref {
        region: Some(ident(region)),
        mutable: false,
        inner: Box::new(inner),
    })
}

pub fn param(name: &str, constraints: &[&str]) -> GenericParam {
    GenericParam {
        name: ident(name),
        constraints: constraints.iter().map(|c| ident(c)).collect(),
    }
}

pub fn record(name: &str, fields: Vec<(&str, TypeExpr)>) -> Decl {
    record_generic(name, Vec::new(), fields)
}

pub fn record_generic(name: &str, generics: Vec<GenericParam>, fields: Vec<(&str, TypeExpr)>) -> Decl {
    Decl::Record(RecordDecl {
        span: Span::default(),
        name: ident(name),
        generics,
        fields: fields
            .into_iter()
            .map(|(n, ty)| FieldDecl { name: ident(n), ty })
            .collect(),
    })
}

pub fn variant(name: &str, ctors: Vec<(&str, Vec<TypeExpr>)>) -> Decl {
    variant_generic(name, Vec::new(), ctors)
}

pub fn variant_generic(
    name: &str,
    generics: Vec<GenericParam>,
    ctors: Vec<(&str, Vec<TypeExpr>)>,
) -> Decl {
    Decl::Variant(VariantDecl {
        span: Span::default(),
        name: ident(name),
        generics,
        ctors: ctors
            .into_iter()
            .map(|(n, fields)| CtorDecl {
                name: ident(n),
                fields,
            })
            .collect(),
    })
}

pub fn contract(name: &str) -> Decl {
    Decl::Contract(ContractDecl {
        span: Span::default(),
        name: ident(name),
    })
}

pub fn impl_for(contract: &str, target: TypeExpr) -> Decl {
    Decl::Impl(ImplDecl {
        span: Span::default(),
        contract: ident(contract),
        generics: Vec::new(),
        target,
        priority: None,
    })
}

pub fn impl_generic(contract: &str, generics: Vec<GenericParam>, target: TypeExpr) -> Decl {
    Decl::Impl(ImplDecl {
        span: Span::default(),
        contract: ident(contract),
        generics,
        target,
        priority: None,
    })
}

pub fn impl_ranked(contract: &str, target: TypeExpr, priority: u32) -> Decl {
    Decl::Impl(ImplDecl {
        span: Span::default(),
        contract: ident(contract),
        generics: Vec::new(),
        target,
        priority: Some(priority),
    })
}

pub fn function(name: &str, params: Vec<(&str, TypeExpr)>, stmts: Vec<Stmt>) -> FunctionDecl {
    FunctionDecl {
        span: Span::default(),
        name: ident(name),
        generics: Vec::new(),
        regions: Vec::new(),
        params: params
            .into_iter()
            .map(|(n, ty)| Param {
                span: Span::default(),
                name: ident(n),
                ty,
            })
            .collect(),
        ret: unit_ty(),
        body: block(stmts),
        cache_key: None,
    }
}

pub fn unit(name: &str, decls: Vec<Decl>) -> Unit {
    Unit {
        name: name.to_string(),
        decls,
    }
}

pub fn block(stmts: Vec<Stmt>) -> Block {
    Block {
        span: Span::default(),
        stmts,
    }
}

fn stmt(kind: StmtKind) -> Stmt {
    Stmt {
        span: Span::default(),
        kind,
    }
}

pub fn let_(name: &str, ty: TypeExpr, init: Expr) -> Stmt {
    stmt(StmtKind::Let {
        name: ident(name),
        ty,
        init: Some(init),
    })
}

pub fn declare(name: &str, ty: TypeExpr) -> Stmt {
    stmt(StmtKind::Let {
        name: ident(name),
        ty,
        init: None,
    })
}

pub fn assign(place: PlaceExpr, value: Expr) -> Stmt {
    stmt(StmtKind::Assign { place, value })
}

pub fn eval(expr: Expr) -> Stmt {
    stmt(StmtKind::Expr(expr))
}

pub fn ret(expr: Option<Expr>) -> Stmt {
    stmt(StmtKind::Return(expr))
}

pub fn scope(stmts: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::Block(block(stmts)))
}

pub fn if_(cond: Expr, then_stmts: Vec<Stmt>, else_stmts: Option<Vec<Stmt>>) -> Stmt {
    stmt(StmtKind::If {
        cond,
        then_block: block(then_stmts),
        else_block: else_stmts.map(block),
    })
}

pub fn while_(cond: Expr, body: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::While {
        cond,
        body: block(body),
    })
}

pub fn match_(scrutinee: PlaceExpr, ty: TypeExpr, arms: Vec<MatchArm>) -> Stmt {
    stmt(StmtKind::Match(MatchExpr {
        span: Span::default(),
        scrutinee,
        ty,
        arms,
    }))
}

pub fn arm(pattern: Pattern, body: Vec<Stmt>) -> MatchArm {
    MatchArm {
        span: Span::default(),
        pattern,
        guard: None,
        body: block(body),
    }
}

pub fn guarded(pattern: Pattern, guard: Expr, body: Vec<Stmt>) -> MatchArm {
    MatchArm {
        span: Span::default(),
        pattern,
        guard: Some(guard),
        body: block(body),
    }
}

pub fn place(root: &str) -> PlaceExpr {
    PlaceExpr {
        span: Span::default(),
        root: ident(root),
        projections: Vec::new(),
    }
}

impl PlaceExpr {
    pub fn field(mut self, name: &str) -> Self {
        self.projections.push(ProjectionExpr::Field(ident(name)));
        self
    }

    pub fn index(mut self, idx: u32) -> Self {
        self.projections.push(ProjectionExpr::Index(idx));
        self
    }

    pub fn deref(mut self) -> Self {
        self.projections.push(ProjectionExpr::Deref);
        self
    }

    pub fn element(mut self, idx: Expr) -> Self {
        self.projections.push(ProjectionExpr::Element(Box::new(idx)));
        self
    }
}

fn expr(kind: ExprKind) -> Expr {
    Expr {
        span: Span::default(),
        kind,
    }
}

pub fn lit_int(n: i64) -> Expr {
    expr(ExprKind::Lit(Literal::Int(n)))
}

pub fn lit_bool(b: bool) -> Expr {
    expr(ExprKind::Lit(Literal::Bool(b)))
}

pub fn lit_str(s: &str) -> Expr {
    expr(ExprKind::Lit(Literal::Str(s.to_string())))
}

pub fn use_(place: PlaceExpr) -> Expr {
    expr(ExprKind::Use(place))
}

pub fn borrow(place: PlaceExpr) -> Expr {
    expr(ExprKind::Borrow {
        place,
        mutable: false,
    })
}

pub fn borrow_mut(place: PlaceExpr) -> Expr {
    expr(ExprKind::Borrow {
        place,
        mutable: true,
    })
}

pub fn call(callee: &str, args: Vec<Expr>) -> Expr {
    expr(ExprKind::Call {
        callee: ident(callee),
        type_args: Vec::new(),
        args,
    })
}

pub fn call_generic(callee: &str, type_args: Vec<TypeExpr>, args: Vec<Expr>) -> Expr {
    expr(ExprKind::Call {
        callee: ident(callee),
        type_args,
        args,
    })
}

pub fn construct(ty: TypeExpr, ctor: Option<&str>, args: Vec<Expr>) -> Expr {
    expr(ExprKind::Construct {
        ty,
        ctor: ctor.map(ident),
        args,
    })
}

pub fn tuple(elems: Vec<Expr>) -> Expr {
    expr(ExprKind::Tuple(elems))
}

pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    expr(ExprKind::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

fn pat(kind: PatternKind) -> Pattern {
    Pattern {
        span: Span::default(),
        kind,
    }
}

pub fn wild() -> Pattern {
    pat(PatternKind::Wildcard)
}

pub fn bind(name: &str) -> Pattern {
    pat(PatternKind::Binding {
        name: ident(name),
        mode: BindingMode::Move,
    })
}

pub fn bind_ref(name: &str) -> Pattern {
    pat(PatternKind::Binding {
        name: ident(name),
        mode: BindingMode::Ref,
    })
}

pub fn bind_ref_mut(name: &str) -> Pattern {
    pat(PatternKind::Binding {
        name: ident(name),
        mode: BindingMode::RefMut,
    })
}

pub fn ctor(name: &str, fields: Vec<Pattern>) -> Pattern {
    pat(PatternKind::Ctor {
        name: ident(name),
        fields,
    })
}

pub fn tuple_pat(elems: Vec<Pattern>) -> Pattern {
    pat(PatternKind::Tuple(elems))
}

pub fn lit_pat(lit: Literal) -> Pattern {
    pat(PatternKind::Literal(lit))
}

pub fn or(alts: Vec<Pattern>) -> Pattern {
    pat(PatternKind::Or(alts))
}
