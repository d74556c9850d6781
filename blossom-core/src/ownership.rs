#![forbid(unsafe_code)]

//! Per-place ownership state and the dataflow facts the borrow checker carries.

use std::collections::{BTreeMap, BTreeSet};

use blossom_ast::Span;
use blossom_ir::{BorrowKind, LocalId, Place, RegionId};

/// Ownership state of one place at one program point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OwnershipState {
    /// Initialised and not borrowed.
    Owned,
    /// Moved out (or never initialised); reads are errors until it is assigned.
    Moved,
    /// Read-only loans in the listed regions.
    BorrowedShared(Vec<RegionId>),
    /// One exclusive loan.
    BorrowedUnique(RegionId),
}

impl OwnershipState {
    pub fn allows_read(&self) -> bool {
        matches!(
            self,
            OwnershipState::Owned | OwnershipState::BorrowedShared(_)
        )
    }

    pub fn allows_move(&self) -> bool {
        matches!(self, OwnershipState::Owned)
    }

    pub fn allows_borrow(&self, kind: BorrowKind) -> bool {
        match self {
            OwnershipState::Owned => true,
            OwnershipState::BorrowedShared(_) => kind == BorrowKind::Shared,
            OwnershipState::Moved | OwnershipState::BorrowedUnique(_) => false,
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            OwnershipState::Owned => "owned",
            OwnershipState::Moved => "moved",
            OwnershipState::BorrowedShared(_) => "borrowed (shared)",
            OwnershipState::BorrowedUnique(_) => "borrowed (unique)",
        }
    }
}

/// An active borrow.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Loan {
    pub place: Place,
    pub kind: BorrowKind,
    pub region: RegionId,
    pub span: Span,
}

/// Where a place lost its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoveSite {
    pub span: Span,
    /// Declared without an initialiser rather than moved out.
    pub uninit: bool,
}

/// Dataflow fact at one program point: moved-out places and active loans.
///
/// The join keeps a place moved if it is moved along any incoming edge and
/// keeps every loan active on any incoming edge.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlowState {
    pub moved: BTreeMap<Place, MoveSite>,
    pub loans: BTreeSet<Loan>,
}

impl FlowState {
    /// Merge `other` into `self`; returns true if `self` changed.
    pub fn join(&mut self, other: &FlowState) -> bool {
        let mut changed = false;
        for (place, site) in &other.moved {
            if !self.moved.contains_key(place) {
                self.moved.insert(place.clone(), *site);
                changed = true;
            }
        }
        for loan in &other.loans {
            changed |= self.loans.insert(loan.clone());
        }
        changed
    }

    pub fn state_of(&self, place: &Place) -> OwnershipState {
        if self.moved_overlapping(place).is_some() {
            return OwnershipState::Moved;
        }
        let loans: Vec<&Loan> = self.loans_overlapping(place).collect();
        if let Some(unique) = loans.iter().find(|l| l.kind == BorrowKind::Unique) {
            return OwnershipState::BorrowedUnique(unique.region);
        }
        if loans.is_empty() {
            OwnershipState::Owned
        } else {
            let mut regions: Vec<RegionId> = loans.iter().map(|l| l.region).collect();
            regions.sort();
            regions.dedup();
            OwnershipState::BorrowedShared(regions)
        }
    }

    /// A moved place that `place` overlaps, if any.
    pub fn moved_overlapping(&self, place: &Place) -> Option<(&Place, &MoveSite)> {
        self.moved
            .iter()
            .find(|(moved, _)| moved.overlap(place).conflicts())
    }

    pub fn loans_overlapping<'a>(&'a self, place: &'a Place) -> impl Iterator<Item = &'a Loan> {
        self.loans
            .iter()
            .filter(move |l| l.place.overlap(place).conflicts())
    }

    pub fn record_move(&mut self, place: Place, site: MoveSite) {
        self.moved.insert(place, site);
    }

    /// Assigning `place` gives back every moved place inside it.
    pub fn reinit(&mut self, place: &Place) {
        self.moved.retain(|moved, _| !place.is_prefix_of(moved));
    }

    /// A strict prefix of `place` that is moved: assigning into it would be a partial reinit.
    pub fn moved_parent(&self, place: &Place) -> Option<(&Place, &MoveSite)> {
        self.moved
            .iter()
            .find(|(moved, _)| *moved != place && moved.is_prefix_of(place))
    }

    pub fn end_region(&mut self, region: RegionId) {
        self.loans.retain(|l| l.region != region);
    }

    /// Loans on the storage of `local` itself (not on what it points to).
    pub fn loans_on_storage(&self, local: LocalId) -> impl Iterator<Item = &Loan> {
        self.loans
            .iter()
            .filter(move |l| l.place.local == local && !l.place.through_deref())
    }

    /// Forget everything about `local` once its storage is gone.
    pub fn kill(&mut self, local: LocalId) {
        self.moved.retain(|p, _| p.local != local);
        self.loans
            .retain(|l| !(l.place.local == local && !l.place.through_deref()));
    }
}

#[cfg(test)]
mod tests {
    use blossom_ir::Projection;

    use super::*;

    fn x() -> Place {
        Place::local(LocalId(0))
    }

    fn loan(place: Place, kind: BorrowKind, region: u32) -> Loan {
        Loan {
            place,
            kind,
            region: RegionId(region),
            span: Span::default(),
        }
    }

    #[test]
    fn moved_dominates_at_joins() {
        let mut a = FlowState::default();
        let mut b = FlowState::default();
        b.record_move(
            x(),
            MoveSite {
                span: Span::new(4, 1),
                uninit: false,
            },
        );
        assert!(a.join(&b));
        assert_eq!(a.state_of(&x()), OwnershipState::Moved);
        assert!(!a.join(&b));
    }

    #[test]
    fn moving_one_field_leaves_its_sibling_owned() {
        let mut s = FlowState::default();
        s.record_move(
            x().field(0),
            MoveSite {
                span: Span::default(),
                uninit: false,
            },
        );
        assert_eq!(s.state_of(&x().field(1)), OwnershipState::Owned);
        assert_eq!(s.state_of(&x()), OwnershipState::Moved);
        s.reinit(&x());
        assert_eq!(s.state_of(&x().field(0)), OwnershipState::Owned);
    }

    #[test]
    fn loan_states_and_region_end() {
        let mut s = FlowState::default();
        s.loans.insert(loan(x(), BorrowKind::Shared, 2));
        s.loans.insert(loan(x().field(0), BorrowKind::Shared, 3));
        assert_eq!(
            s.state_of(&x().field(0)),
            OwnershipState::BorrowedShared(vec![RegionId(2), RegionId(3)])
        );
        assert!(s.state_of(&x()).allows_borrow(BorrowKind::Shared));
        assert!(!s.state_of(&x()).allows_borrow(BorrowKind::Unique));
        s.end_region(RegionId(2));
        s.end_region(RegionId(3));
        assert_eq!(s.state_of(&x()), OwnershipState::Owned);

        s.loans.insert(loan(
            x().project(Projection::Deref),
            BorrowKind::Unique,
            1,
        ));
        assert_eq!(s.loans_on_storage(LocalId(0)).count(), 0);
        s.kill(LocalId(0));
        assert_eq!(s.loans.len(), 1);
    }
}
