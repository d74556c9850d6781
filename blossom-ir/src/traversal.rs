#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::ir::{BlockId, Body};

/// Blocks reachable from the entry block.
pub fn reachable_blocks(body: &Body) -> BTreeSet<BlockId> {
    let mut reachable: BTreeSet<BlockId> = BTreeSet::new();
    let mut work: VecDeque<BlockId> = VecDeque::new();
    reachable.insert(body.entry);
    work.push_back(body.entry);

    while let Some(bb) = work.pop_front() {
        for succ in body.block(bb).terminator.successors() {
            if reachable.insert(succ) {
                work.push_back(succ);
            }
        }
    }
    reachable
}

/// Predecessor lists for every block (unreachable predecessors included).
pub fn predecessors(body: &Body) -> BTreeMap<BlockId, Vec<BlockId>> {
    let mut preds: BTreeMap<BlockId, Vec<BlockId>> =
        body.blocks.iter().map(|b| (b.id, Vec::new())).collect();
    for bb in &body.blocks {
        for succ in bb.terminator.successors() {
            let entry = preds.entry(succ).or_default();
            if !entry.contains(&bb.id) {
                entry.push(bb.id);
            }
        }
    }
    preds
}

/// Reachable blocks in reverse postorder of a depth-first walk from the entry.
///
/// In an RPO every block comes before its successors, except along back edges.
pub fn reverse_postorder(body: &Body) -> Vec<BlockId> {
    let mut visited: BTreeSet<BlockId> = BTreeSet::new();
    let mut postorder: Vec<BlockId> = Vec::with_capacity(body.blocks.len());
    // Explicit stack of (block, next successor index) to avoid recursion on long bodies.
    let mut stack: Vec<(BlockId, usize)> = vec![(body.entry, 0)];
    visited.insert(body.entry);

    while let Some((bb, next)) = stack.pop() {
        let succs = body.block(bb).terminator.successors();
        if let Some(&succ) = succs.get(next) {
            stack.push((bb, next + 1));
            if visited.insert(succ) {
                stack.push((succ, 0));
            }
        } else {
            postorder.push(bb);
        }
    }

    postorder.reverse();
    postorder
}

#[cfg(test)]
mod tests {
    use blossom_ast::Span;

    use super::*;
    use crate::ir::{BasicBlock, RegionData, RegionKind, RegionId, Terminator, TerminatorKind};
    use crate::Operand;

    fn bb(id: u32, kind: TerminatorKind) -> BasicBlock {
        BasicBlock {
            id: BlockId(id),
            statements: Vec::new(),
            terminator: Terminator {
                span: Span::default(),
                kind,
            },
        }
    }

    fn body(blocks: Vec<BasicBlock>) -> Body {
        Body {
            name: "f".to_string(),
            span: Span::default(),
            locals: Vec::new(),
            regions: vec![RegionData {
                id: RegionId(0),
                kind: RegionKind::Body,
                span: Span::default(),
            }],
            outlives: Vec::new(),
            blocks,
            entry: BlockId(0),
            body_region: RegionId(0),
            return_region: RegionId(0),
            static_region: RegionId(0),
        }
    }

    fn diamond_with_loop() -> Body {
        // 0 -> {1, 2}; 1 -> 3; 2 -> 3; 3 -> {0 (back edge), 4}; 5 unreachable
        let cond = || Operand::Constant("true".to_string());
        body(vec![
            bb(0, TerminatorKind::Branch { cond: cond(), then_bb: BlockId(1), else_bb: BlockId(2) }),
            bb(1, TerminatorKind::Goto(BlockId(3))),
            bb(2, TerminatorKind::Goto(BlockId(3))),
            bb(3, TerminatorKind::Branch { cond: cond(), then_bb: BlockId(0), else_bb: BlockId(4) }),
            bb(4, TerminatorKind::Return),
            bb(5, TerminatorKind::Goto(BlockId(4))),
        ])
    }

    #[test]
    fn rpo_orders_forward_edges() {
        let body = diamond_with_loop();
        let rpo = reverse_postorder(&body);
        let pos = |b: u32| rpo.iter().position(|x| *x == BlockId(b)).unwrap();
        assert_eq!(rpo.len(), 5);
        assert_eq!(pos(0), 0);
        assert!(pos(1) < pos(3));
        assert!(pos(2) < pos(3));
        assert!(pos(3) < pos(4));
    }

    #[test]
    fn unreachable_blocks_are_excluded() {
        let body = diamond_with_loop();
        let reachable = reachable_blocks(&body);
        assert!(!reachable.contains(&BlockId(5)));
        assert_eq!(predecessors(&body)[&BlockId(4)], vec![BlockId(3), BlockId(5)]);
        assert_eq!(predecessors(&body)[&BlockId(0)], vec![BlockId(3)]);
    }
}
