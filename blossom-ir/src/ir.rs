#![forbid(unsafe_code)]

use blossom_ast::{BinOp, Span, UnaryOp};
use serde::Serialize;

use crate::place::Place;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BlockId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LocalId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RegionId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl LocalId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl RegionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum BorrowKind {
    Shared,
    Unique,
}

impl BorrowKind {
    pub fn display(&self) -> &'static str {
        match self {
            BorrowKind::Shared => "shared",
            BorrowKind::Unique => "unique",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum RegionKind {
    /// Outlives every other region.
    Static,
    /// A region parameter declared on the function signature.
    Named(String),
    /// The caller's side of a returned reference.
    Return,
    /// The whole function body.
    Body,
    /// A lexical block nested in `parent`.
    Scope { parent: RegionId },
    /// A single statement's temporaries, nested in `parent`.
    Temporary { parent: RegionId },
}

#[derive(Clone, Debug, Serialize)]
pub struct RegionData {
    pub id: RegionId,
    pub kind: RegionKind,
    pub span: Span,
}

impl RegionData {
    pub fn parent(&self) -> Option<RegionId> {
        match self.kind {
            RegionKind::Scope { parent } | RegionKind::Temporary { parent } => Some(parent),
            _ => None,
        }
    }
}

/// A declared `'a: 'b` relation.
#[derive(Clone, Debug, Serialize)]
pub struct OutlivesDecl {
    pub longer: RegionId,
    pub shorter: RegionId,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize)]
pub struct RefInfo {
    pub region: RegionId,
    pub mutable: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct LocalDecl {
    pub id: LocalId,
    pub name: String,
    /// Display form of the local's type.
    pub ty: String,
    pub span: Span,
    /// Lexical region the local lives in; its storage dies when that region ends.
    pub scope: RegionId,
    /// Values of copy types are read rather than moved.
    pub copy: bool,
    /// Set when the local holds a reference.
    pub reference: Option<RefInfo>,
    pub is_param: bool,
    pub is_temp: bool,
}

#[derive(Clone, Debug, Serialize)]
pub enum Operand {
    Copy(Place),
    Move(Place),
    Constant(String),
}

#[derive(Clone, Debug, Serialize)]
pub enum Rvalue {
    Use(Operand),
    Ref {
        place: Place,
        kind: BorrowKind,
        region: RegionId,
    },
    Aggregate {
        name: String,
        operands: Vec<Operand>,
    },
    Call {
        callee: String,
        args: Vec<Operand>,
    },
    Unary {
        op: UnaryOp,
        operand: Operand,
    },
    Binary {
        op: BinOp,
        lhs: Operand,
        rhs: Operand,
    },
}

#[derive(Clone, Debug, Serialize)]
pub enum StatementKind {
    StorageLive(LocalId),
    StorageDead(LocalId),
    /// Evaluate `value`, then write it to `place` (re-initialising it).
    Assign { place: Place, value: Rvalue },
    /// Evaluate `value` for its effects only.
    Eval(Rvalue),
    /// Inspect a place without moving it (scrutinee reads, guard tests).
    Inspect(Place),
    /// All loans in `region` end here.
    EndRegion(RegionId),
}

#[derive(Clone, Debug, Serialize)]
pub struct Statement {
    pub span: Span,
    pub kind: StatementKind,
}

#[derive(Clone, Debug, Serialize)]
pub enum TerminatorKind {
    Goto(BlockId),
    Branch {
        cond: Operand,
        then_bb: BlockId,
        else_bb: BlockId,
    },
    /// Dispatch on `scrutinee`; control reaches one of `arms` (or `otherwise`).
    Match {
        scrutinee: Place,
        arms: Vec<BlockId>,
        otherwise: Option<BlockId>,
    },
    Return,
    Unreachable,
}

#[derive(Clone, Debug, Serialize)]
pub struct Terminator {
    pub span: Span,
    pub kind: TerminatorKind,
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match &self.kind {
            TerminatorKind::Goto(b) => vec![*b],
            TerminatorKind::Branch {
                then_bb, else_bb, ..
            } => vec![*then_bb, *else_bb],
            TerminatorKind::Match {
                arms, otherwise, ..
            } => arms.iter().copied().chain(otherwise.iter().copied()).collect(),
            TerminatorKind::Return | TerminatorKind::Unreachable => Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BasicBlock {
    pub id: BlockId,
    pub statements: Vec<Statement>,
    pub terminator: Terminator,
}

/// A lowered function body.
#[derive(Clone, Debug, Serialize)]
pub struct Body {
    pub name: String,
    pub span: Span,
    pub locals: Vec<LocalDecl>,
    pub regions: Vec<RegionData>,
    pub outlives: Vec<OutlivesDecl>,
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
    pub body_region: RegionId,
    pub return_region: RegionId,
    pub static_region: RegionId,
}

impl Body {
    pub fn local(&self, id: LocalId) -> &LocalDecl {
        &self.locals[id.index()]
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub fn region(&self, id: RegionId) -> &RegionData {
        &self.regions[id.index()]
    }

    pub fn region_name(&self, id: RegionId) -> String {
        match &self.region(id).kind {
            RegionKind::Static => "'static".to_string(),
            RegionKind::Named(n) => format!("'{n}"),
            RegionKind::Return => "'return".to_string(),
            RegionKind::Body => "'body".to_string(),
            RegionKind::Scope { .. } => format!("'s{}", id.0),
            RegionKind::Temporary { .. } => format!("'t{}", id.0),
        }
    }

    pub fn local_by_name(&self, name: &str) -> Option<&LocalDecl> {
        self.locals.iter().rev().find(|l| l.name == name)
    }
}

/// Sequential id allocation for a body under construction.
#[derive(Default, Debug)]
pub struct IdGen {
    next_block: u32,
    next_local: u32,
    next_region: u32,
}

impl IdGen {
    pub fn fresh_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        id
    }

    pub fn fresh_local(&mut self) -> LocalId {
        let id = LocalId(self.next_local);
        self.next_local += 1;
        id
    }

    pub fn fresh_region(&mut self) -> RegionId {
        let id = RegionId(self.next_region);
        self.next_region += 1;
        id
    }
}
