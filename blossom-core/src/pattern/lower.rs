#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use blossom_ast::{Literal, Pattern, PatternKind};

use super::{Ctor, Pat, PatKind};
use crate::catalog::TypeCatalog;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::types::{TyKind, TypeId};

/// Lowers surface patterns against a scrutinee type, collecting shape errors.
///
/// A malformed sub-pattern lowers to a wildcard so the caller still gets a
/// complete tree; callers skip analysis when [`PatternLowerer::errors`] is
/// non-empty.
pub struct PatternLowerer<'c> {
    catalog: &'c TypeCatalog,
    errors: Vec<Diagnostic>,
}

impl<'c> PatternLowerer<'c> {
    pub fn new(catalog: &'c TypeCatalog) -> Self {
        PatternLowerer {
            catalog,
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<Diagnostic> {
        self.errors
    }

    /// Lower one arm's pattern, including the same-name binding checks.
    pub fn lower_arm(&mut self, pattern: &Pattern, ty: TypeId) -> Pat {
        let pat = self.lower(pattern, ty);
        let mut names = Vec::new();
        self.check_bindings(&pat, &mut names);
        pat
    }

    fn malformed(&mut self, pattern: &Pattern, message: String) -> Pat {
        self.errors.push(Diagnostic::new(
            DiagnosticKind::MalformedPattern,
            pattern.span,
            message,
        ));
        Pat::wild(TypeId::ERROR, pattern.span)
    }

    pub fn lower(&mut self, pattern: &Pattern, ty: TypeId) -> Pat {
        let kind = match &pattern.kind {
            PatternKind::Wildcard => PatKind::Wild,
            PatternKind::Binding { name, mode } => PatKind::Bind {
                name: name.node.clone(),
                mode: *mode,
            },
            // Anything goes against a type that already failed to resolve.
            _ if ty == TypeId::ERROR => PatKind::Wild,
            PatternKind::Ctor { name, fields } => {
                return self.lower_ctor(pattern, &name.node, fields, ty);
            }
            PatternKind::Tuple(elems) => {
                let TyKind::Tuple(tys) = self.catalog.kind(ty).clone() else {
                    let msg = format!(
                        "tuple pattern cannot match a value of type `{}`",
                        self.catalog.display(ty)
                    );
                    return self.malformed(pattern, msg);
                };
                if tys.len() != elems.len() {
                    let msg = format!(
                        "tuple pattern has {} element(s) but `{}` has {}",
                        elems.len(),
                        self.catalog.display(ty),
                        tys.len()
                    );
                    return self.malformed(pattern, msg);
                }
                let fields = elems
                    .iter()
                    .zip(tys)
                    .map(|(p, t)| self.lower(p, t))
                    .collect();
                PatKind::Ctor {
                    ctor: Ctor::Tuple(elems.len()),
                    fields,
                }
            }
            PatternKind::Literal(lit) => {
                let ctor = match (lit, self.catalog.kind(ty)) {
                    (Literal::Bool(b), TyKind::Bool) => Ctor::Bool(*b),
                    (Literal::Unit, TyKind::Unit) => Ctor::Unit,
                    (Literal::Real(text), TyKind::Real) => match text.trim().parse::<f64>() {
                        // Spellings of one value (`1.0`, `1.00`, `-0.0`) are one constructor.
                        Ok(v) if v == 0.0 => Ctor::Lit(Literal::Real(format!("{:?}", 0.0f64))),
                        Ok(v) => Ctor::Lit(Literal::Real(format!("{v:?}"))),
                        Err(_) => {
                            let msg = format!("`{text}` is not a real number");
                            return self.malformed(pattern, msg);
                        }
                    },
                    (Literal::Int(_), TyKind::Int) | (Literal::Str(_), TyKind::Str) => {
                        Ctor::Lit(lit.clone())
                    }
                    _ => {
                        let msg = format!(
                            "literal `{lit}` cannot match a value of type `{}`",
                            self.catalog.display(ty)
                        );
                        return self.malformed(pattern, msg);
                    }
                };
                PatKind::Ctor {
                    ctor,
                    fields: Vec::new(),
                }
            }
            PatternKind::Or(alts) => {
                if alts.is_empty() {
                    return self.malformed(pattern, "empty or-pattern".to_string());
                }
                let alts: Vec<Pat> = alts.iter().map(|a| self.lower(a, ty)).collect();
                PatKind::Or(alts)
            }
        };
        Pat {
            kind,
            ty,
            span: pattern.span,
        }
    }

    fn lower_ctor(
        &mut self,
        pattern: &Pattern,
        name: &str,
        fields: &[Pattern],
        ty: TypeId,
    ) -> Pat {
        let (ctor, field_tys) = match self.catalog.kind(ty) {
            TyKind::Variant { .. } => match self.catalog.ctor_named(ty, name) {
                Some(c) => (Ctor::Variant(c.id), c.fields.clone()),
                None => {
                    let msg = format!(
                        "`{name}` is not a constructor of `{}`",
                        self.catalog.display(ty)
                    );
                    return self.malformed(pattern, msg);
                }
            },
            TyKind::Record { name: record, .. } if record == name => {
                let tys = self
                    .catalog
                    .fields(ty)
                    .map(|fs| fs.iter().map(|f| f.ty).collect())
                    .unwrap_or_default();
                (Ctor::Record, tys)
            }
            _ => {
                let msg = format!(
                    "constructor pattern `{name}` cannot match a value of type `{}`",
                    self.catalog.display(ty)
                );
                return self.malformed(pattern, msg);
            }
        };
        if field_tys.len() != fields.len() {
            let msg = format!(
                "`{name}` has {} field(s) but the pattern has {}",
                field_tys.len(),
                fields.len()
            );
            return self.malformed(pattern, msg);
        }
        let fields = fields
            .iter()
            .zip(field_tys)
            .map(|(p, t)| self.lower(p, t))
            .collect();
        Pat {
            kind: PatKind::Ctor { ctor, fields },
            ty,
            span: pattern.span,
        }
    }

    /// Names must be bound at most once, and by every alternative of an or-pattern.
    fn check_bindings(&mut self, pat: &Pat, names: &mut Vec<String>) {
        match &pat.kind {
            PatKind::Wild => {}
            PatKind::Bind { name, .. } => {
                if names.contains(name) {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::MalformedPattern,
                        pat.span,
                        format!("`{name}` is bound more than once in the same pattern"),
                    ));
                } else {
                    names.push(name.clone());
                }
            }
            PatKind::Ctor { fields, .. } => {
                for f in fields {
                    self.check_bindings(f, names);
                }
            }
            PatKind::Or(alts) => {
                let mut first: Option<BTreeSet<String>> = None;
                for alt in alts {
                    let mut alt_names = names.clone();
                    self.check_bindings(alt, &mut alt_names);
                    let set: BTreeSet<String> = alt_names[names.len()..].iter().cloned().collect();
                    match &first {
                        None => first = Some(set),
                        Some(expected) => {
                            if let Some(missing) = expected.symmetric_difference(&set).next() {
                                self.errors.push(Diagnostic::new(
                                    DiagnosticKind::MalformedPattern,
                                    alt.span,
                                    format!("`{missing}` is not bound in every alternative"),
                                ));
                            }
                        }
                    }
                }
                if let Some(set) = first {
                    names.extend(set);
                }
            }
        }
    }
}
