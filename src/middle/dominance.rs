//! Dominator tree over a function's CFG
//!
//! Computed with the iterative Cooper-Harvey-Kennedy algorithm on reverse
//! post-order. Only blocks reachable from the entry are part of the tree;
//! an unreachable block is treated as dominated by every block, so rewrites
//! that consult the tree never have to special-case dead code.
//!
//! The tree is a snapshot. Any rewrite that changes edges makes it stale, and
//! the owner is expected to recompute it before querying again.

use std::collections::HashMap;

use crate::middle::ir::{BlockId, Function, InstId, ValueDef, ValueId};

/// Immediate dominators for the reachable part of a function.
#[derive(Debug, Clone)]
pub struct DominanceInfo {
    entry: BlockId,
    /// Immediate dominator of every reachable block; the entry maps to itself
    idom: HashMap<BlockId, BlockId>,
    /// Reachable blocks in reverse post-order
    rpo: Vec<BlockId>,
    rpo_index: HashMap<BlockId, usize>,
}

impl DominanceInfo {
    pub fn compute(func: &Function) -> Self {
        let entry = func.entry();
        let rpo = reverse_post_order(func);
        let rpo_index: HashMap<BlockId, usize> =
            rpo.iter().enumerate().map(|(i, b)| (*b, i)).collect();

        let mut idom: HashMap<BlockId, BlockId> = HashMap::new();
        idom.insert(entry, entry);
        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for pred in func.unique_preds(block) {
                    if !idom.contains_key(&pred) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => intersect(&idom, &rpo_index, pred, current),
                    });
                }
                if let Some(new_idom) = new_idom {
                    if idom.get(&block) != Some(&new_idom) {
                        idom.insert(block, new_idom);
                        changed = true;
                    }
                }
            }
        }

        Self {
            entry,
            idom,
            rpo,
            rpo_index,
        }
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.rpo_index.contains_key(&block)
    }

    /// Reachable blocks in reverse post-order
    pub fn reverse_post_order(&self) -> &[BlockId] {
        &self.rpo
    }

    /// The immediate dominator, or `None` for the entry and unreachable blocks
    pub fn immediate_dominator(&self, block: BlockId) -> Option<BlockId> {
        if block == self.entry {
            return None;
        }
        self.idom.get(&block).copied()
    }

    /// Whether `a` dominates `b`. A block dominates itself.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b || !self.is_reachable(b) {
            return true;
        }
        if !self.is_reachable(a) {
            return false;
        }
        let mut current = b;
        while current != self.entry {
            current = self.idom[&current];
            if current == a {
                return true;
            }
        }
        false
    }

    pub fn strictly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Blocks whose immediate dominator is `block`, in reverse post-order
    pub fn children(&self, block: BlockId) -> Vec<BlockId> {
        self.rpo
            .iter()
            .copied()
            .filter(|b| *b != self.entry && self.idom.get(b) == Some(&block))
            .collect()
    }

    /// Whether the definition of `value` is available at `user`
    pub fn value_dominates_inst(&self, func: &Function, value: ValueId, user: InstId) -> bool {
        let Some(use_block) = func.block_of(user) else {
            return false;
        };
        match func.value_def(value) {
            ValueDef::Arg { block, .. } => self.dominates(block, use_block),
            ValueDef::Inst { inst, .. } => match func.block_of(inst) {
                Some(def_block) if def_block == use_block => {
                    func.inst_position(inst) < func.inst_position(user)
                }
                Some(def_block) => self.dominates(def_block, use_block),
                None => false,
            },
            ValueDef::Undef => true,
            ValueDef::Placeholder | ValueDef::Patched | ValueDef::Erased => false,
        }
    }
}

fn intersect(
    idom: &HashMap<BlockId, BlockId>,
    rpo_index: &HashMap<BlockId, usize>,
    mut a: BlockId,
    mut b: BlockId,
) -> BlockId {
    while a != b {
        while rpo_index[&a] > rpo_index[&b] {
            a = idom[&a];
        }
        while rpo_index[&b] > rpo_index[&a] {
            b = idom[&b];
        }
    }
    a
}

/// Reachable blocks in reverse post-order of a depth-first walk that visits
/// successors in edge order
pub fn reverse_post_order(func: &Function) -> Vec<BlockId> {
    let entry = func.entry();
    let mut visited = std::collections::HashSet::new();
    let mut post_order = Vec::new();
    let mut stack: Vec<(BlockId, usize)> = vec![(entry, 0)];
    visited.insert(entry);

    while let Some((block, next)) = stack.pop() {
        let succs = func.successors(block);
        if next < succs.len() {
            stack.push((block, next + 1));
            let succ = succs[next];
            if visited.insert(succ) {
                stack.push((succ, 0));
            }
        } else {
            post_order.push(block);
        }
    }
    post_order.reverse();
    post_order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse_sil;

    const DIAMOND: &str = "sil @f : $@convention(thin) (Builtin.Int1) -> () {
bb0(%0 : $Builtin.Int1):
  cond_br %0, bb1, bb2

bb1:
  br bb3

bb2:
  br bb3

bb3:
  %1 = tuple ()
  return %1 : $()

bb4:
  br bb3
}
";

    #[test]
    fn test_diamond() {
        let module = parse_sil(DIAMOND).unwrap();
        let f = module.function(module.find_function("f").unwrap());
        let blocks = f.layout().to_vec();
        let dom = DominanceInfo::compute(f);

        assert_eq!(dom.immediate_dominator(blocks[3]), Some(blocks[0]));
        assert_eq!(dom.immediate_dominator(blocks[1]), Some(blocks[0]));
        assert!(dom.dominates(blocks[0], blocks[3]));
        assert!(!dom.dominates(blocks[1], blocks[3]));
        assert!(dom.strictly_dominates(blocks[0], blocks[1]));
        assert!(!dom.strictly_dominates(blocks[1], blocks[1]));
        assert_eq!(dom.children(blocks[0]).len(), 3);
    }

    #[test]
    fn test_unreachable_block() {
        let module = parse_sil(DIAMOND).unwrap();
        let f = module.function(module.find_function("f").unwrap());
        let blocks = f.layout().to_vec();
        let dom = DominanceInfo::compute(f);

        assert!(!dom.is_reachable(blocks[4]));
        assert!(dom.dominates(blocks[1], blocks[4]));
        assert!(!dom.dominates(blocks[4], blocks[3]));
        assert_eq!(dom.reverse_post_order().len(), 4);
        assert_eq!(dom.reverse_post_order()[0], blocks[0]);
    }
}
