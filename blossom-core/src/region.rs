#![forbid(unsafe_code)]

//! The outlives order over a body's regions.
//!
//! Edges run from the longer-lived region to the shorter-lived one:
//! `'static` outlives everything, signature regions and the return region
//! outlive the body, and every lexical scope outlives the scopes and
//! temporaries nested in it. Declared `'a: 'b` relations add edges between
//! signature regions; one that would make two distinct regions outlive each
//! other is rejected and reported instead, except `'a: 'static`, which makes
//! `'a` as long-lived as `'static`.

use std::collections::BTreeSet;

use blossom_ir::{Body, RegionId, RegionKind};

use crate::diagnostics::{Diagnostic, DiagnosticKind};

#[derive(Debug, Clone)]
pub struct RegionGraph {
    /// `edges[a]` holds the regions `a` directly outlives.
    edges: Vec<BTreeSet<RegionId>>,
}

impl RegionGraph {
    /// Build the graph for `body`, reporting declared relations that form cycles.
    pub fn build(body: &Body) -> (RegionGraph, Vec<Diagnostic>) {
        let mut graph = RegionGraph {
            edges: vec![BTreeSet::new(); body.regions.len()],
        };
        for region in &body.regions {
            match &region.kind {
                RegionKind::Static => {
                    for other in &body.regions {
                        if other.id != region.id {
                            graph.edges[region.id.index()].insert(other.id);
                        }
                    }
                }
                RegionKind::Named(_) | RegionKind::Return => {
                    graph.edges[region.id.index()].insert(body.body_region);
                }
                RegionKind::Scope { parent } | RegionKind::Temporary { parent } => {
                    graph.edges[parent.index()].insert(region.id);
                }
                RegionKind::Body => {}
            }
        }

        let mut errors = Vec::new();
        for decl in &body.outlives {
            if decl.longer == decl.shorter {
                continue;
            }
            // `'a: 'static` only pins `'a` to `'static`.
            if decl.shorter == body.static_region {
                graph.edges[decl.longer.index()].insert(decl.shorter);
                continue;
            }
            if graph.outlives(decl.shorter, decl.longer) {
                errors.push(
                    Diagnostic::new(
                        DiagnosticKind::RegionCycle,
                        decl.span,
                        format!(
                            "{} cannot outlive {}: {} already outlives {}",
                            body.region_name(decl.longer),
                            body.region_name(decl.shorter),
                            body.region_name(decl.shorter),
                            body.region_name(decl.longer),
                        ),
                    )
                    .in_function(body.name.clone()),
                );
                continue;
            }
            graph.edges[decl.longer.index()].insert(decl.shorter);
        }
        tracing::trace!(
            body = %body.name,
            regions = body.regions.len(),
            cycles = errors.len(),
            "region graph built"
        );
        (graph, errors)
    }

    /// True if `longer` lives at least as long as `shorter` (reflexive).
    pub fn outlives(&self, longer: RegionId, shorter: RegionId) -> bool {
        if longer == shorter {
            return true;
        }
        let mut seen = BTreeSet::new();
        let mut stack = vec![longer];
        while let Some(r) = stack.pop() {
            if !seen.insert(r) {
                continue;
            }
            let Some(next) = self.edges.get(r.index()) else {
                continue;
            };
            if next.contains(&shorter) {
                return true;
            }
            stack.extend(next.iter().copied());
        }
        false
    }
}
