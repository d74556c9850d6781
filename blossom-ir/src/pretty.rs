#![forbid(unsafe_code)]

//! Textual dump of a lowered body, used by `blossom cfg` and in tests.

use std::fmt::Write;

use crate::ir::{Body, Operand, Rvalue, StatementKind, TerminatorKind};
use crate::traversal::reachable_blocks;

pub fn body_to_string(body: &Body) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "fn {} {{", body.name);
    for local in &body.locals {
        let mut flags = Vec::new();
        if local.is_param {
            flags.push("param");
        }
        if local.is_temp {
            flags.push("temp");
        }
        if local.copy {
            flags.push("copy");
        }
        let _ = writeln!(
            out,
            "    let _{}: {} // {} in {}{}",
            local.id.0,
            local.ty,
            local.name,
            body.region_name(local.scope),
            if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            }
        );
    }
    for decl in &body.outlives {
        let _ = writeln!(
            out,
            "    where {}: {}",
            body.region_name(decl.longer),
            body.region_name(decl.shorter)
        );
    }
    let live = reachable_blocks(body);
    for bb in &body.blocks {
        if live.contains(&bb.id) {
            let _ = writeln!(out, "  bb{}:", bb.id.0);
        } else {
            let _ = writeln!(out, "  bb{}: // dead", bb.id.0);
        }
        for stmt in &bb.statements {
            let _ = writeln!(out, "    {};", statement(body, &stmt.kind));
        }
        let _ = writeln!(out, "    {};", terminator(body, &bb.terminator.kind));
    }
    out.push_str("}\n");
    out
}

fn statement(body: &Body, kind: &StatementKind) -> String {
    match kind {
        StatementKind::StorageLive(l) => format!("StorageLive(_{})", l.0),
        StatementKind::StorageDead(l) => format!("StorageDead(_{})", l.0),
        StatementKind::Assign { place, value } => {
            format!("{} = {}", place.display(body), rvalue(body, value))
        }
        StatementKind::Eval(value) => rvalue(body, value),
        StatementKind::Inspect(place) => format!("inspect {}", place.display(body)),
        StatementKind::EndRegion(r) => format!("EndRegion({})", body.region_name(*r)),
    }
}

fn operand(body: &Body, op: &Operand) -> String {
    match op {
        Operand::Copy(p) => format!("copy {}", p.display(body)),
        Operand::Move(p) => format!("move {}", p.display(body)),
        Operand::Constant(c) => format!("const {c}"),
    }
}

fn operands(body: &Body, ops: &[Operand]) -> String {
    ops.iter()
        .map(|o| operand(body, o))
        .collect::<Vec<_>>()
        .join(", ")
}

fn rvalue(body: &Body, rv: &Rvalue) -> String {
    match rv {
        Rvalue::Use(op) => operand(body, op),
        Rvalue::Ref {
            place,
            kind,
            region,
        } => format!(
            "&{} {}{}",
            body.region_name(*region),
            match kind {
                crate::BorrowKind::Shared => "",
                crate::BorrowKind::Unique => "mut ",
            },
            place.display(body)
        ),
        Rvalue::Aggregate { name, operands: ops } => {
            format!("{name}({})", operands(body, ops))
        }
        Rvalue::Call { callee, args } => format!("call {callee}({})", operands(body, args)),
        Rvalue::Unary { op, operand: o } => format!("{op:?}({})", operand(body, o)),
        Rvalue::Binary { op, lhs, rhs } => format!(
            "{} {} {}",
            operand(body, lhs),
            op.symbol(),
            operand(body, rhs)
        ),
    }
}

fn terminator(body: &Body, kind: &TerminatorKind) -> String {
    match kind {
        TerminatorKind::Goto(b) => format!("goto bb{}", b.0),
        TerminatorKind::Branch {
            cond,
            then_bb,
            else_bb,
        } => format!(
            "branch {} -> [bb{}, bb{}]",
            operand(body, cond),
            then_bb.0,
            else_bb.0
        ),
        TerminatorKind::Match {
            scrutinee,
            arms,
            otherwise,
        } => {
            let arms = arms
                .iter()
                .map(|b| format!("bb{}", b.0))
                .collect::<Vec<_>>()
                .join(", ");
            match otherwise {
                Some(o) => format!(
                    "match {} -> [{arms}] otherwise bb{}",
                    scrutinee.display(body),
                    o.0
                ),
                None => format!("match {} -> [{arms}]", scrutinee.display(body)),
            }
        }
        TerminatorKind::Return => "return".to_string(),
        TerminatorKind::Unreachable => "unreachable".to_string(),
    }
}
