#![forbid(unsafe_code)]

//! Pattern matrices: exhaustiveness, reachability and decision tables.
//!
//! Patterns are first lowered against the scrutinee's type ([`lower`]), then
//! checked with the usefulness algorithm ([`usefulness`]): a pattern vector
//! is useful with respect to a matrix when some value matches it and no row
//! of the matrix. An arm is unreachable when it is not useful with respect to
//! the arms above it; a match is exhaustive when a wildcard row is not useful
//! with respect to all arms. Well-formed exhaustive matches are compiled into
//! a decision tree for code generation ([`decision`]).

pub mod decision;
pub mod lower;
pub mod usefulness;
pub mod witness;

use blossom_ast::{BindingMode, Literal, Span};

use crate::catalog::TypeCatalog;
use crate::types::{CtorId, TyKind, TypeId};

pub use decision::{DecisionTable, DecisionTree, Occurrence, RowDispatch};
pub use lower::PatternLowerer;
pub use usefulness::{Budget, Exhausted, MatchCheck, RedundantAlternative, check};
pub use witness::Witness;

/// A constructor: one way of building a value of a type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Ctor {
    Variant(CtorId),
    /// The only constructor of a record type.
    Record,
    Tuple(usize),
    Bool(bool),
    Unit,
    /// Int, Real and Str literals; their types have no finite signature.
    Lit(Literal),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pat {
    pub kind: PatKind,
    pub ty: TypeId,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PatKind {
    Wild,
    Bind { name: String, mode: BindingMode },
    Ctor { ctor: Ctor, fields: Vec<Pat> },
    Or(Vec<Pat>),
}

impl Pat {
    pub fn wild(ty: TypeId, span: Span) -> Self {
        Pat {
            kind: PatKind::Wild,
            ty,
            span,
        }
    }

    /// True for wildcards and bindings, which match everything.
    pub fn is_irrefutable_leaf(&self) -> bool {
        matches!(self.kind, PatKind::Wild | PatKind::Bind { .. })
    }
}

/// One row of a pattern matrix: an arm's patterns, one per scrutinee column.
#[derive(Clone, Debug)]
pub struct MatrixRow {
    pub pats: Vec<Pat>,
    /// Guarded rows never count towards covering values.
    pub guarded: bool,
    pub span: Span,
}

#[derive(Clone, Debug, Default)]
pub struct PatternMatrix {
    pub rows: Vec<MatrixRow>,
    /// Types of the scrutinee columns.
    pub tys: Vec<TypeId>,
}

/// All constructors of `ty`, or `None` when its values cannot be enumerated.
pub fn signature(catalog: &TypeCatalog, ty: TypeId) -> Option<Vec<Ctor>> {
    match catalog.kind(ty) {
        TyKind::Bool => Some(vec![Ctor::Bool(true), Ctor::Bool(false)]),
        TyKind::Unit => Some(vec![Ctor::Unit]),
        TyKind::Tuple(elems) => Some(vec![Ctor::Tuple(elems.len())]),
        TyKind::Record { .. } => Some(vec![Ctor::Record]),
        TyKind::Variant { .. } => Some(
            catalog
                .constructors(ty)
                .map(|ids| ids.iter().map(|id| Ctor::Variant(*id)).collect())
                .unwrap_or_default(),
        ),
        TyKind::Int
        | TyKind::Real
        | TyKind::Str
        | TyKind::Error
        | TyKind::Array(_)
        | TyKind::Param { .. }
        | TyKind::Ref { .. } => None,
    }
}

/// Field types of `ctor` when it builds a value of `ty`.
pub fn ctor_fields(catalog: &TypeCatalog, ty: TypeId, ctor: &Ctor) -> Vec<TypeId> {
    match ctor {
        Ctor::Variant(id) => catalog.ctor(*id).fields.clone(),
        Ctor::Record => catalog
            .fields(ty)
            .map(|fs| fs.iter().map(|f| f.ty).collect())
            .unwrap_or_default(),
        Ctor::Tuple(_) => match catalog.kind(ty) {
            TyKind::Tuple(elems) => elems.clone(),
            _ => Vec::new(),
        },
        Ctor::Bool(_) | Ctor::Unit | Ctor::Lit(_) => Vec::new(),
    }
}

/// Short label used in decision tables (`Circle`, `true`, `3`).
pub fn ctor_label(catalog: &TypeCatalog, ty: TypeId, ctor: &Ctor) -> String {
    match ctor {
        Ctor::Variant(id) => catalog.ctor(*id).name.clone(),
        Ctor::Record => catalog.display(ty),
        Ctor::Tuple(n) => format!("tuple/{n}"),
        Ctor::Bool(b) => b.to_string(),
        Ctor::Unit => "()".to_string(),
        Ctor::Lit(lit) => lit.to_string(),
    }
}
