#![forbid(unsafe_code)]

use thiserror::Error;

use crate::ir::{Body, StatementKind};
use crate::place::Place;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("body '{0}' has no blocks")]
    Empty(String),
    #[error("body '{body}' block #{index} carries id {id}")]
    MisnumberedBlock { body: String, index: usize, id: u32 },
    #[error("body '{body}' branches from block {from} to missing block {to}")]
    DanglingEdge { body: String, from: u32, to: u32 },
    #[error("body '{body}' refers to missing local {local}")]
    UnknownLocal { body: String, local: u32 },
    #[error("body '{body}' refers to missing region {region}")]
    UnknownRegion { body: String, region: u32 },
}

/// Structural sanity checks on a lowered body.
///
/// Blocks, locals and regions are dense arenas indexed by their ids; this
/// confirms every id in the body is in range so the analyses can index freely.
pub fn validate_body(body: &Body) -> Result<(), ValidationError> {
    if body.blocks.is_empty() {
        return Err(ValidationError::Empty(body.name.clone()));
    }

    for (index, bb) in body.blocks.iter().enumerate() {
        if bb.id.index() != index {
            return Err(ValidationError::MisnumberedBlock {
                body: body.name.clone(),
                index,
                id: bb.id.0,
            });
        }
    }

    for bb in &body.blocks {
        for succ in bb.terminator.successors() {
            if succ.index() >= body.blocks.len() {
                return Err(ValidationError::DanglingEdge {
                    body: body.name.clone(),
                    from: bb.id.0,
                    to: succ.0,
                });
            }
        }
        for stmt in &bb.statements {
            match &stmt.kind {
                StatementKind::StorageLive(l) | StatementKind::StorageDead(l) => {
                    check_local(body, l.0)?
                }
                StatementKind::Assign { place, .. } | StatementKind::Inspect(place) => {
                    check_place(body, place)?
                }
                StatementKind::EndRegion(r) => check_region(body, r.0)?,
                StatementKind::Eval(_) => {}
            }
        }
    }

    for local in &body.locals {
        check_region(body, local.scope.0)?;
    }

    Ok(())
}

fn check_place(body: &Body, place: &Place) -> Result<(), ValidationError> {
    check_local(body, place.local.0)
}

fn check_local(body: &Body, local: u32) -> Result<(), ValidationError> {
    if local as usize >= body.locals.len() {
        return Err(ValidationError::UnknownLocal {
            body: body.name.clone(),
            local,
        });
    }
    Ok(())
}

fn check_region(body: &Body, region: u32) -> Result<(), ValidationError> {
    if region as usize >= body.regions.len() {
        return Err(ValidationError::UnknownRegion {
            body: body.name.clone(),
            region,
        });
    }
    Ok(())
}
