//! CFG utilities shared by the SSA updater and the simplifier

use std::collections::HashSet;

use log::trace;

use crate::middle::ir::{BlockId, Function, InstId, InstKind, ValueId};

/// Blocks reachable from the entry
pub fn reachable_blocks(func: &Function) -> HashSet<BlockId> {
    let mut seen = HashSet::new();
    if !func.is_definition() {
        return seen;
    }
    let mut stack = vec![func.entry()];
    while let Some(block) = stack.pop() {
        if seen.insert(block) {
            stack.extend(func.successors(block));
        }
    }
    seen
}

/// An edge from a multi-successor terminator into a multi-predecessor block
pub fn is_critical_edge(func: &Function, block: BlockId, edge: usize) -> bool {
    let term = func.expect_terminator(block);
    let edges = func.successor_edges(term);
    edges.len() > 1 && func.preds(edges[edge].dest).len() > 1
}

/// Put a new block on edge `edge` of `block`'s terminator. The new block
/// takes arguments shaped like the destination's and forwards them, so the
/// original terminator keeps its operands. Returns the new block.
pub fn split_edge(func: &mut Function, block: BlockId, edge: usize) -> BlockId {
    let term = func.expect_terminator(block);
    let dest = func.successor_edges(term)[edge].dest;
    let carries_args = match func.kind(term) {
        InstKind::Br { .. } | InstKind::CondBr { .. } | InstKind::SwitchEnum { .. } => true,
        _ => false,
    };

    let middle = func.insert_block_after(block);
    let mut forwarded = Vec::new();
    if carries_args {
        for arg in func.block_args(dest).to_vec() {
            let ty = func.value_type(arg).clone();
            let ownership = func.ownership(arg);
            forwarded.push(func.add_block_arg(middle, ty, ownership));
        }
    }
    func.set_successor(term, edge, middle);
    let br = func.create_inst_with_ownership(InstKind::Br { dest }, forwarded, Vec::new());
    let (loc, scope) = {
        let data = func.inst(term);
        (data.loc.clone(), data.scope)
    };
    func.set_debug_location(br, loc, scope);
    func.append_inst(middle, br);
    trace!("split edge {} -> {} with {}", block, dest, middle);
    middle
}

/// Split every critical edge. With `only_non_cond_br`, edges leaving a
/// `cond_br` are left alone.
pub fn split_critical_edges(func: &mut Function, only_non_cond_br: bool) -> bool {
    let mut changed = false;
    for block in func.layout().to_vec() {
        let Some(term) = func.terminator(block) else {
            continue;
        };
        if only_non_cond_br && matches!(func.kind(term), InstKind::CondBr { .. }) {
            continue;
        }
        let edge_count = func.successor_edges(term).len();
        for edge in 0..edge_count {
            if is_critical_edge(func, block, edge) {
                split_edge(func, block, edge);
                changed = true;
            }
        }
    }
    changed
}

/// Whether an instruction can be deleted once its results are unused
pub fn is_trivially_dead(func: &Function, inst: InstId) -> bool {
    let kind = func.kind(inst);
    !kind.is_terminator()
        && !kind.has_side_effects()
        && func.results(inst).iter().all(|r| !func.has_uses(*r))
}

/// Delete the definitions of `values` if they became dead, following their
/// operands transitively
pub fn delete_dead_values(func: &mut Function, values: impl IntoIterator<Item = ValueId>) -> usize {
    let mut worklist: Vec<ValueId> = values.into_iter().collect();
    let mut deleted = 0;
    while let Some(value) = worklist.pop() {
        let Some(inst) = func.defining_inst(value) else {
            continue;
        };
        if !func.is_inst_live(inst) || func.block_of(inst).is_none() || !is_trivially_dead(func, inst) {
            continue;
        }
        worklist.extend(func.operands(inst).iter().copied());
        func.erase_inst(inst);
        deleted += 1;
    }
    deleted
}

/// Erase every block that cannot be reached from the entry. Terminators go
/// first so unreachable cycles do not keep each other alive.
pub fn remove_unreachable_blocks(func: &mut Function) -> Vec<BlockId> {
    let reachable = reachable_blocks(func);
    let dead: Vec<BlockId> = func
        .layout()
        .iter()
        .copied()
        .filter(|b| !reachable.contains(b))
        .collect();
    for &block in &dead {
        if let Some(term) = func.terminator(block) {
            func.detach_inst(term);
            func.erase_inst(term);
        }
    }
    for &block in &dead {
        trace!("removing unreachable {}", block);
        func.erase_block(block);
    }
    dead
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse_sil;

    const SWITCH: &str = "sil @f : $@convention(thin) (Builtin.Int64, Builtin.Int1) -> () {
bb0(%0 : $Builtin.Int64, %1 : $Builtin.Int1):
  cond_br %1, bb1, bb2

bb1:
  switch_value %0 : $Builtin.Int64, case 1: bb2, default bb3

bb2:
  br bb3

bb3:
  %2 = tuple ()
  return %2 : $()

bb4:
  br bb5

bb5:
  br bb4
}
";

    #[test]
    fn test_split_critical_edges() {
        let mut module = parse_sil(SWITCH).unwrap();
        let id = module.find_function("f").unwrap();
        let (f, ast) = module.function_and_ast_mut(id);
        let bb1 = f.layout()[1];
        assert!(is_critical_edge(f, bb1, 0));

        assert!(split_critical_edges(f, true));
        assert!(!is_critical_edge(f, bb1, 0));
        assert!(!is_critical_edge(f, bb1, 1));
        // the cond_br edge into bb2 is critical too but kept
        assert!(is_critical_edge(f, f.layout()[0], 1));
        assert!(f.verify(ast).is_empty());
    }

    #[test]
    fn test_remove_unreachable_cycle() {
        let mut module = parse_sil(SWITCH).unwrap();
        let id = module.find_function("f").unwrap();
        let (f, ast) = module.function_and_ast_mut(id);
        assert_eq!(reachable_blocks(f).len(), 4);
        assert_eq!(remove_unreachable_blocks(f).len(), 2);
        assert_eq!(f.block_count(), 4);
        assert!(f.verify(ast).is_empty());
    }
}
