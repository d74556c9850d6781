#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use blossom_ast::Span;
use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::diagnostics::{Diagnostic, DiagnosticKind};

/// Failure to discharge one contract obligation.
#[derive(Clone, Debug, PartialEq, Eq, Error, MietteDiagnostic)]
pub enum SolveError {
    #[error("no impl of `{contract}` applies to `{candidate}`")]
    #[diagnostic(code(blossom::solver::unsatisfied))]
    Unsatisfied { contract: String, candidate: String },

    #[error("{} impls of `{contract}` apply to `{candidate}` and none has the highest priority", .impls.len())]
    #[diagnostic(code(blossom::solver::ambiguous))]
    Ambiguous {
        contract: String,
        candidate: String,
        impls: Vec<Span>,
    },

    #[error("resolving `{contract}` for `{candidate}` nests deeper than {limit} impls")]
    #[diagnostic(code(blossom::solver::too_deep))]
    TooDeep {
        contract: String,
        candidate: String,
        limit: usize,
    },
}

/// Problems found while building the type catalog.
#[derive(Clone, Debug, PartialEq, Eq, Error, MietteDiagnostic)]
pub enum CatalogError {
    #[error("{what} `{name}` is declared more than once")]
    #[diagnostic(code(blossom::catalog::duplicate))]
    Duplicate {
        what: &'static str,
        name: String,
        #[label("redeclared here")]
        span: Span,
        #[label("first declared here")]
        previous: Span,
    },

    #[error("unknown {what} `{name}`")]
    #[diagnostic(code(blossom::catalog::unknown))]
    Unknown {
        what: &'static str,
        name: String,
        #[label]
        span: Span,
    },

    #[error("`{name}` takes {expected} type argument(s) but {found} were supplied")]
    #[diagnostic(code(blossom::catalog::arity))]
    WrongArity {
        name: String,
        expected: usize,
        found: usize,
        #[label]
        span: Span,
    },

    #[error("type argument for `{param}` is not accepted: {source}")]
    #[diagnostic(code(blossom::catalog::constraint))]
    Constraint {
        param: String,
        #[source]
        source: SolveError,
        #[label]
        span: Span,
    },

    #[error("instantiating `{ty}` exceeds the depth limit of {limit}")]
    #[diagnostic(code(blossom::catalog::depth))]
    TooDeep {
        ty: String,
        limit: usize,
        #[label]
        span: Span,
    },
}

impl CatalogError {
    pub fn span(&self) -> Span {
        match self {
            CatalogError::Duplicate { span, .. }
            | CatalogError::Unknown { span, .. }
            | CatalogError::WrongArity { span, .. }
            | CatalogError::Constraint { span, .. }
            | CatalogError::TooDeep { span, .. } => *span,
        }
    }

    pub fn kind(&self) -> DiagnosticKind {
        match self {
            CatalogError::Duplicate { .. } => DiagnosticKind::DuplicateDeclaration,
            CatalogError::Unknown { .. } | CatalogError::WrongArity { .. } => {
                DiagnosticKind::UnresolvedName
            }
            CatalogError::Constraint { source, .. } => match source {
                SolveError::Unsatisfied { .. } => DiagnosticKind::UnresolvedConstraint,
                SolveError::Ambiguous { .. } => DiagnosticKind::AmbiguousConstraint,
                SolveError::TooDeep { .. } => DiagnosticKind::ResourceExhausted,
            },
            CatalogError::TooDeep { .. } => DiagnosticKind::ResourceExhausted,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::new(self.kind(), self.span(), self.to_string());
        match self {
            CatalogError::Duplicate { previous, .. } => {
                diag.with_related(*previous, "first declared here")
            }
            CatalogError::Constraint {
                source: SolveError::Ambiguous { impls, .. },
                ..
            } => impls
                .iter()
                .fold(diag, |d, s| d.with_related(*s, "candidate impl")),
            _ => diag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blossom_ast::span;

    #[test]
    fn ambiguity_maps_to_its_own_kind_with_candidates() {
        let err = CatalogError::Constraint {
            param: "T".into(),
            source: SolveError::Ambiguous {
                contract: "Show".into(),
                candidate: "Int".into(),
                impls: vec![span(1, 1), span(5, 1)],
            },
            span: span(20, 3),
        };
        let diag = err.to_diagnostic();
        assert_eq!(diag.kind, DiagnosticKind::AmbiguousConstraint);
        assert_eq!(diag.related.len(), 2);
        assert!(diag.message.contains("2 impls of `Show`"));
    }
}
