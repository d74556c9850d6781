#![forbid(unsafe_code)]

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Index into a [`TypeTable`]. Two ids are equal iff their canonical forms are.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TypeId(pub u32);

impl TypeId {
    pub const INT: TypeId = TypeId(0);
    pub const REAL: TypeId = TypeId(1);
    pub const BOOL: TypeId = TypeId(2);
    pub const STR: TypeId = TypeId(3);
    pub const UNIT: TypeId = TypeId(4);
    /// Stand-in for anything that failed to resolve; absorbs further checks.
    pub const ERROR: TypeId = TypeId(5);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A record or variant declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeclId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CtorId(pub u32);

impl CtorId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Canonical type forms.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TyKind {
    Int,
    Real,
    Bool,
    Str,
    Unit,
    Error,
    Record {
        decl: DeclId,
        name: String,
        args: Vec<TypeId>,
    },
    Variant {
        decl: DeclId,
        name: String,
        args: Vec<TypeId>,
    },
    Tuple(Vec<TypeId>),
    Array(TypeId),
    /// A generic parameter, opaque inside the declaration `owner` that binds it.
    Param {
        owner: String,
        name: String,
    },
    Ref {
        region: Option<String>,
        mutable: bool,
        inner: TypeId,
    },
}

/// Hash-consed type storage.
#[derive(Clone, Debug)]
pub struct TypeTable {
    kinds: Vec<TyKind>,
    ids: HashMap<TyKind, TypeId>,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    pub fn new() -> Self {
        let mut table = TypeTable {
            kinds: Vec::new(),
            ids: HashMap::new(),
        };
        // Order matches the `TypeId` constants.
        for kind in [
            TyKind::Int,
            TyKind::Real,
            TyKind::Bool,
            TyKind::Str,
            TyKind::Unit,
            TyKind::Error,
        ] {
            table.intern(kind);
        }
        table
    }

    /// Returns the id and whether the form was new.
    pub fn intern(&mut self, kind: TyKind) -> (TypeId, bool) {
        if let Some(id) = self.ids.get(&kind) {
            return (*id, false);
        }
        let id = TypeId(self.kinds.len() as u32);
        self.kinds.push(kind.clone());
        self.ids.insert(kind, id);
        (id, true)
    }

    pub fn lookup(&self, kind: &TyKind) -> Option<TypeId> {
        self.ids.get(kind).copied()
    }

    pub fn kind(&self, id: TypeId) -> &TyKind {
        &self.kinds[id.index()]
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Copy types are read rather than moved: primitives, shared references and
    /// tuples of copy types.
    pub fn is_copy(&self, id: TypeId) -> bool {
        match self.kind(id) {
            TyKind::Int | TyKind::Real | TyKind::Bool | TyKind::Unit | TyKind::Error => true,
            TyKind::Ref { mutable, .. } => !mutable,
            TyKind::Tuple(elems) => elems.iter().all(|e| self.is_copy(*e)),
            TyKind::Str
            | TyKind::Record { .. }
            | TyKind::Variant { .. }
            | TyKind::Array(_)
            | TyKind::Param { .. } => false,
        }
    }

    /// True if the type mentions a generic parameter anywhere.
    pub fn has_params(&self, id: TypeId) -> bool {
        match self.kind(id) {
            TyKind::Param { .. } => true,
            TyKind::Record { args, .. } | TyKind::Variant { args, .. } | TyKind::Tuple(args) => {
                args.iter().any(|a| self.has_params(*a))
            }
            TyKind::Array(inner) | TyKind::Ref { inner, .. } => self.has_params(*inner),
            _ => false,
        }
    }

    pub fn display(&self, id: TypeId) -> String {
        match self.kind(id) {
            TyKind::Int => "Int".to_string(),
            TyKind::Real => "Real".to_string(),
            TyKind::Bool => "Bool".to_string(),
            TyKind::Str => "Str".to_string(),
            TyKind::Unit => "()".to_string(),
            TyKind::Error => "{error}".to_string(),
            TyKind::Record { name, args, .. } | TyKind::Variant { name, args, .. } => {
                if args.is_empty() {
                    name.clone()
                } else {
                    format!("{name}<{}>", self.display_list(args))
                }
            }
            TyKind::Tuple(elems) => {
                if elems.len() == 1 {
                    format!("({},)", self.display(elems[0]))
                } else {
                    format!("({})", self.display_list(elems))
                }
            }
            TyKind::Array(elem) => format!("[{}]", self.display(*elem)),
            TyKind::Param { name, .. } => name.clone(),
            TyKind::Ref {
                region,
                mutable,
                inner,
            } => {
                let mut out = "&".to_string();
                if let Some(r) = region {
                    out.push('\'');
                    out.push_str(r);
                    out.push(' ');
                }
                if *mutable {
                    out.push_str("mut ");
                }
                out.push_str(&self.display(*inner));
                out
            }
        }
    }

    fn display_list(&self, ids: &[TypeId]) -> String {
        ids.iter()
            .map(|t| self.display(*t))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_structural() {
        let mut table = TypeTable::new();
        let (a, new_a) = table.intern(TyKind::Tuple(vec![TypeId::INT, TypeId::BOOL]));
        let (b, new_b) = table.intern(TyKind::Tuple(vec![TypeId::INT, TypeId::BOOL]));
        assert!(new_a);
        assert!(!new_b);
        assert_eq!(a, b);
        assert_eq!(table.kind(TypeId::STR), &TyKind::Str);
    }

    #[test]
    fn copy_classification() {
        let mut table = TypeTable::new();
        let (shared, _) = table.intern(TyKind::Ref {
            region: None,
            mutable: false,
            inner: TypeId::STR,
        });
        let (unique, _) = table.intern(TyKind::Ref {
            region: None,
            mutable: true,
            inner: TypeId::INT,
        });
        let (pair, _) = table.intern(TyKind::Tuple(vec![TypeId::INT, TypeId::STR]));
        assert!(table.is_copy(TypeId::INT));
        assert!(table.is_copy(shared));
        assert!(!table.is_copy(unique));
        assert!(!table.is_copy(pair));
        assert!(!table.is_copy(TypeId::STR));
    }

    #[test]
    fn display_applied_and_references() {
        let mut table = TypeTable::new();
        let (list, _) = table.intern(TyKind::Variant {
            decl: DeclId(0),
            name: "List".into(),
            args: vec![TypeId::INT],
        });
        let (r, _) = table.intern(TyKind::Ref {
            region: Some("a".into()),
            mutable: true,
            inner: list,
        });
        assert_eq!(table.display(r), "&'a mut List<Int>");
    }
}
