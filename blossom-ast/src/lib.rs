#![forbid(unsafe_code)]

//! Typed, name-resolved syntax tree consumed by the Blossom checker.
//!
//! The parser and name resolver live outside this workspace; they hand the
//! checker a [`Unit`] (usually as JSON). Every name in here is already
//! resolved: `TypeExprKind::Named` refers to a declared record or variant,
//! `TypeExprKind::Generic` to a generic parameter in scope.

pub mod builder;

use std::fmt;

use miette::SourceSpan;
use serde::{Deserialize, Serialize};

/// Byte range into the source file the unit was parsed from.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
}

impl Span {
    pub const fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        let start = self.offset.min(other.offset);
        let end = self.end().max(other.end());
        span_between(start, end)
    }
}

impl From<Span> for SourceSpan {
    fn from(s: Span) -> Self {
        SourceSpan::new(s.offset.into(), s.len)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.offset, self.end())
    }
}

pub fn span(start: usize, len: usize) -> Span {
    Span::new(start, len)
}

pub fn span_between(start: usize, end: usize) -> Span {
    debug_assert!(end >= start);
    span(start, end - start)
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

impl<T> Spanned<T> {
    pub fn new(span: Span, node: T) -> Self {
        Self { span, node }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
        Spanned {
            span: self.span,
            node: f(self.node),
        }
    }
}

pub type Ident = Spanned<String>;

/// One compilation unit: everything the checker sees at once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub name: String,
    pub decls: Vec<Decl>,
}

impl Unit {
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Function(f) => Some(f),
            _ => None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decl", rename_all = "snake_case")]
pub enum Decl {
    Record(RecordDecl),
    Variant(VariantDecl),
    Contract(ContractDecl),
    Impl(ImplDecl),
    Function(FunctionDecl),
}

impl Decl {
    pub fn span(&self) -> Span {
        match self {
            Decl::Record(d) => d.span,
            Decl::Variant(d) => d.span,
            Decl::Contract(d) => d.span,
            Decl::Impl(d) => d.span,
            Decl::Function(d) => d.span,
        }
    }
}

/// `T: Show + Eq`
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenericParam {
    pub name: Ident,
    #[serde(default)]
    pub constraints: Vec<Ident>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordDecl {
    pub span: Span,
    pub name: Ident,
    #[serde(default)]
    pub generics: Vec<GenericParam>,
    pub fields: Vec<FieldDecl>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: Ident,
    pub ty: TypeExpr,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariantDecl {
    pub span: Span,
    pub name: Ident,
    #[serde(default)]
    pub generics: Vec<GenericParam>,
    pub ctors: Vec<CtorDecl>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CtorDecl {
    pub name: Ident,
    #[serde(default)]
    pub fields: Vec<TypeExpr>,
}

/// A capability a generic parameter may be required to provide.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractDecl {
    pub span: Span,
    pub name: Ident,
}

/// `impl<U: Show> Show for List<U>`, optionally ranked by `priority`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImplDecl {
    pub span: Span,
    pub contract: Ident,
    #[serde(default)]
    pub generics: Vec<GenericParam>,
    pub target: TypeExpr,
    #[serde(default)]
    pub priority: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub span: Span,
    pub name: Ident,
    #[serde(default)]
    pub generics: Vec<GenericParam>,
    #[serde(default)]
    pub regions: Vec<RegionParam>,
    pub params: Vec<Param>,
    pub ret: TypeExpr,
    pub body: Block,
    /// Content hash supplied by the incremental scheduler.
    #[serde(default)]
    pub cache_key: Option<String>,
}

/// `'a: 'b + 'c`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionParam {
    pub name: Ident,
    #[serde(default)]
    pub outlives: Vec<Ident>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub span: Span,
    pub name: Ident,
    pub ty: TypeExpr,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeExpr {
    pub span: Span,
    pub kind: TypeExprKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeExprKind {
    Int,
    Real,
    Bool,
    Str,
    Unit,
    /// A declared record or variant, possibly applied to type arguments.
    Named {
        name: Ident,
        #[serde(default)]
        args: Vec<TypeExpr>,
    },
    /// A generic parameter of the enclosing declaration.
    Generic(Ident),
    Tuple(Vec<TypeExpr>),
    /// Growable sequence; elements are reached through `place[expr]`.
    Array(Box<TypeExpr>),
    Ref {
        #[serde(default)]
        region: Option<Ident>,
        #[serde(default)]
        mutable: bool,
        inner: Box<TypeExpr>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub span: Span,
    pub stmts: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub span: Span,
    pub kind: StmtKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StmtKind {
    Let {
        name: Ident,
        ty: TypeExpr,
        #[serde(default)]
        init: Option<Expr>,
    },
    Assign {
        place: PlaceExpr,
        value: Expr,
    },
    Expr(Expr),
    Match(MatchExpr),
    If {
        cond: Expr,
        then_block: Block,
        #[serde(default)]
        else_block: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    Return(Option<Expr>),
    Block(Block),
}

/// `match <scrutinee>: <ty> { arms }`; the type is filled in by the type checker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchExpr {
    pub span: Span,
    pub scrutinee: PlaceExpr,
    pub ty: TypeExpr,
    pub arms: Vec<MatchArm>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchArm {
    pub span: Span,
    pub pattern: Pattern,
    #[serde(default)]
    pub guard: Option<Expr>,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub span: Span,
    pub kind: PatternKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Wildcard,
    Binding {
        name: Ident,
        #[serde(default)]
        mode: BindingMode,
    },
    /// A variant constructor or a record, with positional sub-patterns.
    Ctor {
        name: Ident,
        #[serde(default)]
        fields: Vec<Pattern>,
    },
    Tuple(Vec<Pattern>),
    Literal(Literal),
    Or(Vec<Pattern>),
}

/// How a binding takes hold of the matched value. Unannotated bindings move.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingMode {
    #[default]
    Move,
    Ref,
    RefMut,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Int(i64),
    /// Kept as source text so literals stay `Eq + Hash`.
    Real(String),
    Bool(bool),
    Str(String),
    Unit,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(n) => write!(f, "{n}"),
            Literal::Real(r) => f.write_str(r),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Str(s) => write!(f, "{s:?}"),
            Literal::Unit => f.write_str("()"),
        }
    }
}

/// A root variable followed by field / deref / index projections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaceExpr {
    pub span: Span,
    pub root: Ident,
    #[serde(default)]
    pub projections: Vec<ProjectionExpr>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionExpr {
    /// Named record field.
    Field(Ident),
    /// Positional tuple element.
    Index(u32),
    Deref,
    /// `place[expr]`
    Element(Box<Expr>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprKind {
    Lit(Literal),
    /// Copies for copy types, moves otherwise.
    Use(PlaceExpr),
    Borrow {
        place: PlaceExpr,
        #[serde(default)]
        mutable: bool,
    },
    Call {
        callee: Ident,
        #[serde(default)]
        type_args: Vec<TypeExpr>,
        #[serde(default)]
        args: Vec<Expr>,
    },
    /// Build a record (`ctor == None`) or a variant value.
    Construct {
        ty: TypeExpr,
        #[serde(default)]
        ctor: Option<Ident>,
        #[serde(default)]
        args: Vec<Expr>,
    },
    Tuple(Vec<Expr>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}
