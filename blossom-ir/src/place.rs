#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

use crate::ir::{Body, LocalId};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Projection {
    /// Positional field of a record, tuple or constructor payload.
    Field(u32),
    Deref,
    /// Element of an indexable value; the index itself is not tracked.
    Index,
    /// Payload of one variant constructor.
    Downcast(String),
}

/// A storage location: a local plus a projection path.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Place {
    pub local: LocalId,
    pub projection: Vec<Projection>,
}

/// How two places relate for aliasing purposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Overlap {
    /// Different roots, or the paths diverge at distinct fields / variants.
    Disjoint,
    Equal,
    /// The first place is a strict prefix of the second.
    Contains,
    /// The first place is a strict extension of the second.
    ContainedBy,
    /// Paths diverge at an index projection; may or may not alias.
    MayAlias,
}

impl Overlap {
    pub fn conflicts(self) -> bool {
        !matches!(self, Overlap::Disjoint)
    }
}

impl Place {
    pub fn local(local: LocalId) -> Self {
        Self {
            local,
            projection: Vec::new(),
        }
    }

    pub fn project(&self, elem: Projection) -> Self {
        let mut projection = self.projection.clone();
        projection.push(elem);
        Self {
            local: self.local,
            projection,
        }
    }

    pub fn field(&self, idx: u32) -> Self {
        self.project(Projection::Field(idx))
    }

    pub fn is_root(&self) -> bool {
        self.projection.is_empty()
    }

    pub fn parent(&self) -> Option<Place> {
        if self.projection.is_empty() {
            return None;
        }
        let mut projection = self.projection.clone();
        projection.pop();
        Some(Place {
            local: self.local,
            projection,
        })
    }

    /// True if `self` is `other` or one of its prefixes.
    pub fn is_prefix_of(&self, other: &Place) -> bool {
        self.local == other.local
            && self.projection.len() <= other.projection.len()
            && other.projection.starts_with(&self.projection)
    }

    /// True if the path goes through a dereference.
    pub fn through_deref(&self) -> bool {
        self.projection.iter().any(|p| *p == Projection::Deref)
    }

    pub fn overlap(&self, other: &Place) -> Overlap {
        if self.local != other.local {
            return Overlap::Disjoint;
        }
        let mut may_alias = false;
        for (a, b) in self.projection.iter().zip(other.projection.iter()) {
            match (a, b) {
                (Projection::Field(x), Projection::Field(y)) if x != y => return Overlap::Disjoint,
                (Projection::Downcast(x), Projection::Downcast(y)) if x != y => {
                    return Overlap::Disjoint;
                }
                (Projection::Index, Projection::Index) => may_alias = true,
                _ if a == b => {}
                // Mismatched projection kinds only arise from ill-typed paths.
                _ => may_alias = true,
            }
        }
        if may_alias {
            return Overlap::MayAlias;
        }
        match self.projection.len().cmp(&other.projection.len()) {
            Ordering::Equal => Overlap::Equal,
            Ordering::Less => Overlap::Contains,
            Ordering::Greater => Overlap::ContainedBy,
        }
    }

    pub fn display(&self, body: &Body) -> String {
        PlaceDisplay {
            place: self,
            root: &body.local(self.local).name,
        }
        .to_string()
    }

    pub fn display_with_root(&self, root: &str) -> String {
        PlaceDisplay { place: self, root }.to_string()
    }
}

struct PlaceDisplay<'a> {
    place: &'a Place,
    root: &'a str,
}

impl fmt::Display for PlaceDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = self.root.to_string();
        for elem in &self.place.projection {
            out = match elem {
                Projection::Field(i) => format!("{out}.{i}"),
                Projection::Deref => format!("*{out}"),
                Projection::Index => format!("{out}[_]"),
                Projection::Downcast(ctor) => format!("({out} as {ctor})"),
            };
        }
        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Place {
        Place::local(LocalId(0))
    }

    #[test]
    fn distinct_roots_never_alias() {
        let a = Place::local(LocalId(0)).field(1);
        let b = Place::local(LocalId(1)).field(1);
        assert_eq!(a.overlap(&b), Overlap::Disjoint);
    }

    #[test]
    fn sibling_fields_are_disjoint() {
        assert_eq!(x().field(0).overlap(&x().field(1)), Overlap::Disjoint);
        assert_eq!(x().field(0).overlap(&x().field(0)), Overlap::Equal);
    }

    #[test]
    fn prefixes_contain_their_extensions() {
        let whole = x();
        let part = x().field(2).project(Projection::Deref);
        assert_eq!(whole.overlap(&part), Overlap::Contains);
        assert_eq!(part.overlap(&whole), Overlap::ContainedBy);
        assert!(whole.is_prefix_of(&part));
        assert!(!part.is_prefix_of(&whole));
    }

    #[test]
    fn different_variants_are_disjoint_but_indices_may_alias() {
        let circle = x().project(Projection::Downcast("Circle".into())).field(0);
        let square = x().project(Projection::Downcast("Square".into())).field(0);
        assert_eq!(circle.overlap(&square), Overlap::Disjoint);

        let e1 = x().project(Projection::Index).field(0);
        let e2 = x().project(Projection::Index).field(0);
        assert_eq!(e1.overlap(&e2), Overlap::MayAlias);
    }

    #[test]
    fn display_nests_projections() {
        let p = x()
            .project(Projection::Downcast("Some".into()))
            .field(0)
            .project(Projection::Deref);
        assert_eq!(p.display_with_root("opt"), "*(opt as Some).0");
    }
}
