#![forbid(unsafe_code)]

use super::{Ctor, ctor_fields};
use crate::catalog::TypeCatalog;
use crate::types::{TyKind, TypeId};

/// A value shape that no row of a matrix matches.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Witness {
    Wild,
    Ctor(Ctor, Vec<Witness>),
}

impl Witness {
    /// Render in pattern syntax, e.g. `Triangle(_, _, _)` or `(true, _)`.
    pub fn render(&self, catalog: &TypeCatalog, ty: TypeId) -> String {
        let Witness::Ctor(ctor, fields) = self else {
            return "_".to_string();
        };
        let field_tys = ctor_fields(catalog, ty, ctor);
        let rendered: Vec<String> = fields
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let fty = field_tys.get(i).copied().unwrap_or(TypeId::ERROR);
                w.render(catalog, fty)
            })
            .collect();
        match ctor {
            Ctor::Variant(id) => {
                let name = &catalog.ctor(*id).name;
                if rendered.is_empty() {
                    name.clone()
                } else {
                    format!("{name}({})", rendered.join(", "))
                }
            }
            Ctor::Record => {
                let name = match catalog.kind(ty) {
                    TyKind::Record { name, .. } => name.clone(),
                    _ => catalog.display(ty),
                };
                let names = catalog.fields(ty).unwrap_or_default();
                let parts: Vec<String> = rendered
                    .iter()
                    .zip(names)
                    .map(|(r, f)| format!("{}: {r}", f.name))
                    .collect();
                if parts.is_empty() {
                    format!("{name} {{}}")
                } else {
                    format!("{name} {{ {} }}", parts.join(", "))
                }
            }
            Ctor::Tuple(_) => {
                if rendered.len() == 1 {
                    format!("({},)", rendered[0])
                } else {
                    format!("({})", rendered.join(", "))
                }
            }
            Ctor::Bool(b) => b.to_string(),
            Ctor::Unit => "()".to_string(),
            Ctor::Lit(lit) => lit.to_string(),
        }
    }
}

/// Render one witness row; a single column renders without brackets.
pub fn render_row(catalog: &TypeCatalog, row: &[Witness], tys: &[TypeId]) -> String {
    let parts: Vec<String> = row
        .iter()
        .zip(tys)
        .map(|(w, t)| w.render(catalog, *t))
        .collect();
    if parts.len() == 1 {
        parts.into_iter().next().unwrap_or_default()
    } else {
        format!("[{}]", parts.join(", "))
    }
}
