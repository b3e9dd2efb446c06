//! Jump threading and tail duplication
//!
//! Both copy a block onto one incoming edge. The copy gets fresh arguments
//! shaped like the original's, so the predecessor's terminator keeps its
//! operands; definitions of the original that are used elsewhere are then
//! reconciled with their copies by the SSA updater.

use std::collections::HashMap;

use log::trace;

use crate::middle::ir::{BlockId, InstKind, Use, ValueDef, ValueId};
use crate::middle::ssa_updater::SsaUpdater;

use super::{duplication_cost, Simplifier};

impl Simplifier<'_> {
    /// Clone the destination of edge `edge` of `src`'s terminator onto that
    /// edge. Returns the copy.
    pub(super) fn thread_edge(&mut self, src: BlockId, edge: usize) -> BlockId {
        let term = self.func.expect_terminator(src);
        let dest = self.func.successor_edges(term)[edge].dest;
        let copy = self.func.insert_block_after(src);

        let mut value_map: HashMap<ValueId, ValueId> = HashMap::new();
        for arg in self.func.block_args(dest).to_vec() {
            let ty = self.func.value_type(arg).clone();
            let ownership = self.func.ownership(arg);
            value_map.insert(arg, self.func.add_block_arg(copy, ty, ownership));
        }
        let no_block_remapping = HashMap::new();
        for inst in self.func.block_insts(dest).to_vec() {
            let cloned = self.func.clone_inst(inst, &mut value_map, &no_block_remapping);
            self.func.append_inst(copy, cloned);
        }
        self.func.set_successor(term, edge, copy);
        trace!("threaded {} into {} as {}", dest, src, copy);

        self.update_ssa_after_cloning(dest, copy, &value_map);
        self.worklist.add(copy);
        self.worklist.add(dest);
        self.add_successors(copy);
        copy
    }

    /// Uses outside `orig` of values it defines may now be reached from
    /// either `orig` or `copy`
    fn update_ssa_after_cloning(&mut self, orig: BlockId, copy: BlockId, value_map: &HashMap<ValueId, ValueId>) {
        let mut defined: Vec<ValueId> = self.func.block_args(orig).to_vec();
        for &inst in self.func.block_insts(orig) {
            defined.extend_from_slice(self.func.results(inst));
        }
        for value in defined {
            let outside: Vec<Use> = self
                .func
                .uses(value)
                .iter()
                .filter(|u| self.func.block_of(u.user) != Some(orig))
                .copied()
                .collect();
            if outside.is_empty() {
                continue;
            }
            let Some(&cloned) = value_map.get(&value) else {
                continue;
            };
            let mut updater = SsaUpdater::new(self.func.value_type(value).clone(), self.func.ownership(value));
            updater.add_available_value(orig, value);
            updater.add_available_value(copy, cloned);
            for u in outside {
                updater.rewrite_use(self.func, u);
            }
        }
    }

    /// Small blocks without calls or side effects
    pub(super) fn is_threadable_block(&self, block: BlockId, cost_limit: usize) -> bool {
        self.func.block_insts(block).iter().all(|i| {
            let kind = self.func.kind(*i);
            !kind.is_call() && !kind.has_side_effects()
        }) && duplication_cost(self.func, block) <= cost_limit
    }

    /// Thread the destination of `block`'s `br` into it when `block` passes
    /// the destination's branch condition as a literal
    pub(super) fn try_jump_thread(&mut self, block: BlockId) -> bool {
        let term = self.func.expect_terminator(block);
        let InstKind::Br { dest } = *self.func.kind(term) else {
            return false;
        };
        if dest == block || self.func.preds(dest).len() < 2 {
            return false;
        }
        let dest_term = self.func.expect_terminator(dest);
        let is_switch_enum = matches!(self.func.kind(dest_term), InstKind::SwitchEnum { .. });
        if !matches!(
            self.func.kind(dest_term),
            InstKind::CondBr { .. } | InstKind::SwitchValue { .. } | InstKind::SwitchEnum { .. }
        ) {
            return false;
        }
        // threading into a loop header can make the loop irreducible;
        // switch_enum dispatch is threaded anyway
        if self.loop_headers.contains(&dest) && !is_switch_enum {
            return false;
        }
        if !self.is_threadable_block(dest, self.options.jump_threading_cost_limit) {
            return false;
        }

        let cond = self.func.operand(dest_term, 0);
        let ValueDef::Arg { block: arg_block, index } = self.func.value_def(cond) else {
            return false;
        };
        if arg_block != dest {
            return false;
        }
        let incoming = self.func.operand(term, index);
        let known = if is_switch_enum {
            self.func.enum_case(incoming).is_some()
        } else {
            self.func.integer_literal(incoming).is_some()
        };
        if !known {
            return false;
        }

        trace!("{}: threading {} to fold its terminator", block, dest);
        self.thread_edge(block, 0);
        self.worklist.add(block);
        self.stats.jumps_threaded += 1;
        true
    }

    /// Duplicate release-carrying successors of blocks that call an
    /// Objective-C method into them, so the releases can later be sunk onto
    /// the call's fast path. Repeats until no candidate is left.
    pub(super) fn tail_duplicate_objc_method_successors(&mut self) -> bool {
        let mut changed = false;
        loop {
            let candidates: Vec<BlockId> = self
                .func
                .layout()
                .iter()
                .copied()
                .filter(|b| self.is_tail_duplication_candidate(*b))
                .collect();
            if candidates.is_empty() {
                return changed;
            }
            for block in candidates {
                if !self.func.is_block_live(block) || !self.is_tail_duplication_candidate(block) {
                    continue;
                }
                trace!("{}: tail-duplicating its successor after an objc_method call", block);
                self.thread_edge(block, 0);
                self.stats.blocks_tail_duplicated += 1;
                changed = true;
            }
            if self.simplify_blocks() {
                self.remove_unreachable_blocks();
            }
        }
    }

    fn is_tail_duplication_candidate(&self, block: BlockId) -> bool {
        let Some(term) = self.func.terminator(block) else {
            return false;
        };
        let InstKind::Br { dest } = *self.func.kind(term) else {
            return false;
        };
        dest != block
            && self.func.preds(dest).len() > 1
            && !self.loop_headers.contains(&dest)
            && self.calls_objc_method(block)
            && self.should_tail_duplicate(dest)
    }

    fn calls_objc_method(&self, block: BlockId) -> bool {
        self.func.block_insts(block).iter().any(|&inst| {
            if !self.func.kind(inst).is_call() {
                return false;
            }
            let callee = self.func.operand(inst, 0);
            self.func
                .defining_inst(callee)
                .is_some_and(|def| matches!(self.func.kind(def), InstKind::ObjcMethod { .. }))
        })
    }

    fn should_tail_duplicate(&self, block: BlockId) -> bool {
        let insts = self.func.block_insts(block);
        let releases = insts
            .iter()
            .any(|i| matches!(self.func.kind(*i), InstKind::StrongRelease | InstKind::DestroyValue));
        releases
            && !insts.iter().any(|i| self.func.kind(*i).is_call())
            && duplication_cost(self.func, block) <= self.options.tail_duplication_cost_limit
    }
}
