#![forbid(unsafe_code)]

//! Contract resolution.
//!
//! A generic parameter carries a set of contracts; supplying a type for it
//! creates one obligation per contract. An obligation holds when the type is
//! a parameter that assumes the contract, or when exactly one impl applies:
//! its target unifies with the type and its own generics' contracts hold
//! for what they bound to. Overlapping impls are disambiguated by priority: the
//! match whose priority is strictly greater than every other match wins, and
//! anything else is ambiguous. Unprioritized impls rank below every
//! prioritized one.

use std::collections::HashMap;

use blossom_ast::Span;
use serde::Serialize;

use crate::error::SolveError;
use crate::types::{TyKind, TypeId, TypeTable};

/// A generic parameter together with the contracts it requires.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenericSig {
    pub name: String,
    pub constraints: Vec<String>,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ImplId(pub u32);

#[derive(Clone, Debug)]
pub struct ImplEntry {
    pub contract: String,
    /// Target type; may mention the impl's own generics as `Param { owner, .. }`.
    pub target: TypeId,
    /// Owner tag of the impl's generic parameters.
    pub owner: String,
    pub generics: Vec<GenericSig>,
    pub priority: Option<u32>,
    pub span: Span,
}

impl ImplEntry {
    fn rank(&self) -> i64 {
        self.priority.map(i64::from).unwrap_or(-1)
    }
}

/// How one contract obligation was discharged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Evidence {
    Impl(ImplId),
    /// The candidate is a generic parameter whose own constraints include the contract.
    Assumed,
}

/// A solved generic parameter: the type bound to it and the evidence for each contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConstraintBinding {
    pub param: String,
    pub ty: TypeId,
    pub evidence: Vec<(String, Evidence)>,
}

#[derive(Clone, Debug)]
enum Memo {
    InProgress,
    Done(Result<Evidence, SolveError>),
}

#[derive(Debug)]
pub struct ConstraintSolver {
    impls: Vec<ImplEntry>,
    assumptions: HashMap<(String, String), Vec<String>>,
    memo: HashMap<(String, TypeId), Memo>,
    max_depth: usize,
}

impl ConstraintSolver {
    pub fn new(max_depth: usize) -> Self {
        ConstraintSolver {
            impls: Vec::new(),
            assumptions: HashMap::new(),
            memo: HashMap::new(),
            max_depth,
        }
    }

    /// Impls are tried in the order they are added.
    pub fn add_impl(&mut self, entry: ImplEntry) -> ImplId {
        let id = ImplId(self.impls.len() as u32);
        self.impls.push(entry);
        self.memo.clear();
        id
    }

    pub fn impls(&self) -> &[ImplEntry] {
        &self.impls
    }

    pub fn impl_entry(&self, id: ImplId) -> &ImplEntry {
        &self.impls[id.0 as usize]
    }

    /// Inside `owner`, parameter `name` may be assumed to satisfy `constraints`.
    pub fn assume(&mut self, owner: &str, name: &str, constraints: Vec<String>) {
        self.assumptions
            .insert((owner.to_string(), name.to_string()), constraints);
    }

    /// Check every contract of `param` against `candidate`.
    pub fn solve(
        &mut self,
        types: &TypeTable,
        param: &GenericSig,
        candidate: TypeId,
    ) -> Result<ConstraintBinding, SolveError> {
        let mut evidence = Vec::with_capacity(param.constraints.len());
        for contract in &param.constraints {
            let ev = self.satisfies(types, contract, candidate, 0)?;
            evidence.push((contract.clone(), ev));
        }
        Ok(ConstraintBinding {
            param: param.name.clone(),
            ty: candidate,
            evidence,
        })
    }

    pub fn satisfies(
        &mut self,
        types: &TypeTable,
        contract: &str,
        candidate: TypeId,
        depth: usize,
    ) -> Result<Evidence, SolveError> {
        if depth > self.max_depth {
            return Err(SolveError::TooDeep {
                contract: contract.to_string(),
                candidate: types.display(candidate),
                limit: self.max_depth,
            });
        }

        let key = (contract.to_string(), candidate);
        match self.memo.get(&key) {
            Some(Memo::Done(result)) => return result.clone(),
            // Recursive obligations on the same pair hold coinductively.
            Some(Memo::InProgress) => return Ok(Evidence::Assumed),
            None => {}
        }
        self.memo.insert(key.clone(), Memo::InProgress);
        let result = self.resolve(types, contract, candidate, depth);
        self.memo.insert(key, Memo::Done(result.clone()));
        result
    }

    fn resolve(
        &mut self,
        types: &TypeTable,
        contract: &str,
        candidate: TypeId,
        depth: usize,
    ) -> Result<Evidence, SolveError> {
        match types.kind(candidate) {
            TyKind::Error => return Ok(Evidence::Assumed),
            TyKind::Param { owner, name } => {
                let assumed = self
                    .assumptions
                    .get(&(owner.clone(), name.clone()))
                    .is_some_and(|cs| cs.iter().any(|c| c == contract));
                if assumed {
                    return Ok(Evidence::Assumed);
                }
            }
            _ => {}
        }

        // An impl applies only if its target unifies and its own generics hold.
        let mut matches: Vec<ImplId> = Vec::new();
        let mut rejected: Option<SolveError> = None;
        for idx in 0..self.impls.len() {
            let entry = &self.impls[idx];
            if entry.contract != contract {
                continue;
            }
            let mut subst = HashMap::new();
            if !unify(types, &entry.owner, entry.target, candidate, &mut subst) {
                continue;
            }
            let id = ImplId(idx as u32);
            match self.nested_hold(types, id, &subst, depth) {
                Ok(()) => matches.push(id),
                Err(err @ SolveError::TooDeep { .. }) => return Err(err),
                Err(err) => {
                    rejected.get_or_insert(err);
                }
            }
        }

        match matches.len() {
            0 => Err(rejected.unwrap_or_else(|| SolveError::Unsatisfied {
                contract: contract.to_string(),
                candidate: types.display(candidate),
            })),
            1 => Ok(Evidence::Impl(matches[0])),
            _ => {
                let ranks: Vec<i64> = matches
                    .iter()
                    .map(|id| self.impl_entry(*id).rank())
                    .collect();
                let winner = (0..ranks.len())
                    .find(|&i| (0..ranks.len()).all(|j| j == i || ranks[i] > ranks[j]));
                match winner {
                    Some(i) => Ok(Evidence::Impl(matches[i])),
                    None => Err(SolveError::Ambiguous {
                        contract: contract.to_string(),
                        candidate: types.display(candidate),
                        impls: matches.iter().map(|id| self.impl_entry(*id).span).collect(),
                    }),
                }
            }
        }
    }

    /// The constraints of `impl_id`'s own generics under `subst`.
    fn nested_hold(
        &mut self,
        types: &TypeTable,
        impl_id: ImplId,
        subst: &HashMap<String, TypeId>,
        depth: usize,
    ) -> Result<(), SolveError> {
        let generics = self.impl_entry(impl_id).generics.clone();
        for generic in &generics {
            let Some(bound) = subst.get(&generic.name).copied() else {
                continue;
            };
            for nested in &generic.constraints {
                self.satisfies(types, nested, bound, depth + 1)?;
            }
        }
        Ok(())
    }
}

/// Match an impl target against a candidate, binding the impl's own parameters.
fn unify(
    types: &TypeTable,
    owner: &str,
    pattern: TypeId,
    candidate: TypeId,
    subst: &mut HashMap<String, TypeId>,
) -> bool {
    if let TyKind::Param { owner: o, name } = types.kind(pattern) {
        if o == owner {
            return match subst.get(name) {
                Some(bound) => *bound == candidate,
                None => {
                    subst.insert(name.clone(), candidate);
                    true
                }
            };
        }
    }
    if pattern == candidate {
        return true;
    }
    match (types.kind(pattern), types.kind(candidate)) {
        (
            TyKind::Record {
                decl: d1, args: a1, ..
            },
            TyKind::Record {
                decl: d2, args: a2, ..
            },
        )
        | (
            TyKind::Variant {
                decl: d1, args: a1, ..
            },
            TyKind::Variant {
                decl: d2, args: a2, ..
            },
        ) => d1 == d2 && unify_all(types, owner, a1, a2, subst),
        (TyKind::Tuple(a1), TyKind::Tuple(a2)) => unify_all(types, owner, a1, a2, subst),
        (TyKind::Array(e1), TyKind::Array(e2)) => unify(types, owner, *e1, *e2, subst),
        (
            TyKind::Ref {
                mutable: m1,
                inner: i1,
                ..
            },
            TyKind::Ref {
                mutable: m2,
                inner: i2,
                ..
            },
        ) => m1 == m2 && unify(types, owner, *i1, *i2, subst),
        _ => false,
    }
}

fn unify_all(
    types: &TypeTable,
    owner: &str,
    patterns: &[TypeId],
    candidates: &[TypeId],
    subst: &mut HashMap<String, TypeId>,
) -> bool {
    patterns.len() == candidates.len()
        && patterns
            .iter()
            .zip(candidates)
            .all(|(p, c)| unify(types, owner, *p, *c, subst))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeclId;
    use blossom_ast::span;

    fn show(name: &str) -> GenericSig {
        GenericSig {
            name: name.to_string(),
            constraints: vec!["Show".to_string()],
            span: Span::default(),
        }
    }

    fn concrete(contract: &str, target: TypeId, priority: Option<u32>, at: usize) -> ImplEntry {
        ImplEntry {
            contract: contract.to_string(),
            target,
            owner: format!("impl@{at}"),
            generics: Vec::new(),
            priority,
            span: span(at, 1),
        }
    }

    #[test]
    fn single_impl_binds() {
        let types = TypeTable::new();
        let mut solver = ConstraintSolver::new(8);
        let id = solver.add_impl(concrete("Show", TypeId::INT, None, 0));
        let binding = solver.solve(&types, &show("T"), TypeId::INT).expect("solves");
        assert_eq!(binding.ty, TypeId::INT);
        assert_eq!(binding.evidence, vec![("Show".to_string(), Evidence::Impl(id))]);
    }

    #[test]
    fn missing_impl_is_unsatisfied() {
        let types = TypeTable::new();
        let mut solver = ConstraintSolver::new(8);
        solver.add_impl(concrete("Show", TypeId::INT, None, 0));
        let err = solver.solve(&types, &show("T"), TypeId::STR).unwrap_err();
        assert!(matches!(err, SolveError::Unsatisfied { .. }));
    }

    #[test]
    fn two_unranked_impls_are_ambiguous() {
        let types = TypeTable::new();
        let mut solver = ConstraintSolver::new(8);
        solver.add_impl(concrete("Show", TypeId::INT, None, 0));
        solver.add_impl(concrete("Show", TypeId::INT, None, 10));
        let err = solver.solve(&types, &show("T"), TypeId::INT).unwrap_err();
        match err {
            SolveError::Ambiguous { impls, .. } => assert_eq!(impls.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn strictly_higher_priority_wins_and_ties_do_not() {
        let types = TypeTable::new();
        let mut solver = ConstraintSolver::new(8);
        solver.add_impl(concrete("Show", TypeId::INT, Some(1), 0));
        let high = solver.add_impl(concrete("Show", TypeId::INT, Some(5), 10));
        let binding = solver.solve(&types, &show("T"), TypeId::INT).expect("solves");
        assert_eq!(binding.evidence[0].1, Evidence::Impl(high));

        solver.add_impl(concrete("Show", TypeId::INT, Some(5), 20));
        assert!(matches!(
            solver.solve(&types, &show("T"), TypeId::INT),
            Err(SolveError::Ambiguous { .. })
        ));
    }

    #[test]
    fn generic_impl_requires_nested_constraints() {
        let mut types = TypeTable::new();
        let (u, _) = types.intern(TyKind::Param {
            owner: "impl@0".into(),
            name: "U".into(),
        });
        let list = |types: &mut TypeTable, arg| {
            types
                .intern(TyKind::Variant {
                    decl: DeclId(0),
                    name: "List".into(),
                    args: vec![arg],
                })
                .0
        };
        let list_u = list(&mut types, u);
        let list_int = list(&mut types, TypeId::INT);
        let list_str = list(&mut types, TypeId::STR);

        let mut solver = ConstraintSolver::new(8);
        solver.add_impl(ImplEntry {
            contract: "Show".into(),
            target: list_u,
            owner: "impl@0".into(),
            generics: vec![show("U")],
            priority: None,
            span: span(0, 1),
        });
        solver.add_impl(concrete("Show", TypeId::INT, None, 5));

        assert!(solver.solve(&types, &show("T"), list_int).is_ok());
        assert!(matches!(
            solver.solve(&types, &show("T"), list_str),
            Err(SolveError::Unsatisfied { .. })
        ));
    }

    #[test]
    fn impls_whose_own_constraints_fail_do_not_compete() {
        let mut types = TypeTable::new();
        let (u, _) = types.intern(TyKind::Param {
            owner: "impl@0".into(),
            name: "U".into(),
        });
        let wrap = |types: &mut TypeTable, arg| {
            types
                .intern(TyKind::Record {
                    decl: DeclId(1),
                    name: "Wrap".into(),
                    args: vec![arg],
                })
                .0
        };
        let wrap_u = wrap(&mut types, u);
        let wrap_str = wrap(&mut types, TypeId::STR);

        let mut solver = ConstraintSolver::new(8);
        solver.add_impl(ImplEntry {
            contract: "Show".into(),
            target: wrap_u,
            owner: "impl@0".into(),
            generics: vec![show("U")],
            priority: Some(9),
            span: span(0, 1),
        });
        let exact = solver.add_impl(concrete("Show", wrap_str, None, 5));

        let binding = solver.solve(&types, &show("T"), wrap_str).expect("solves");
        assert_eq!(binding.evidence[0].1, Evidence::Impl(exact));
    }

    #[test]
    fn parameters_use_their_assumptions() {
        let mut types = TypeTable::new();
        let (t, _) = types.intern(TyKind::Param {
            owner: "render".into(),
            name: "T".into(),
        });
        let mut solver = ConstraintSolver::new(8);
        assert!(solver.solve(&types, &show("X"), t).is_err());

        let mut solver = ConstraintSolver::new(8);
        solver.assume("render", "T", vec!["Show".into()]);
        let binding = solver.solve(&types, &show("X"), t).expect("assumed");
        assert_eq!(binding.evidence[0].1, Evidence::Assumed);
    }

    #[test]
    fn depth_limit_is_reported() {
        let types = TypeTable::new();
        let mut solver = ConstraintSolver::new(0);
        solver.add_impl(concrete("Show", TypeId::INT, None, 0));
        assert!(
            solver
                .satisfies(&types, "Show", TypeId::INT, 1)
                .is_err_and(|e| matches!(e, SolveError::TooDeep { .. }))
        );
    }
}
