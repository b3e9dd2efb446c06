//! Local rewrite rules: everything decided by looking at one block, its
//! terminator and its immediate neighbours

use log::trace;

use crate::middle::cfg::{delete_dead_values, is_trivially_dead};
use crate::middle::ir::{ArgumentKind, BlockId, InstId, InstKind, ValueDef, ValueId};
use crate::types::SilType;

use super::{inverted_condition, Simplifier};

impl Simplifier<'_> {
    /// Apply every local rule to `block`. Returns whether anything changed.
    pub(super) fn simplify_block(&mut self, block: BlockId) -> bool {
        if !self.func.is_entry(block) && self.func.preds(block).is_empty() {
            self.remove_dead_block(block);
            return true;
        }

        let mut changed = self.remove_passing_cond_fails(block);
        changed |= self.simplify_args(block);
        changed |= self.try_move_cond_fail_to_preds(block);

        let Some(term) = self.func.terminator(block) else {
            return changed;
        };
        let rewritten = match self.func.kind(term) {
            InstKind::Br { .. } => self.simplify_branch_block(block),
            InstKind::CondBr { .. } => self.simplify_cond_br_block(block),
            InstKind::SwitchValue { .. } => self.simplify_switch_value_block(block),
            InstKind::SwitchEnum { .. } => self.simplify_switch_enum_block(block),
            InstKind::Unreachable => self.simplify_unreachable_block(block),
            _ => false,
        };
        if rewritten {
            if self.func.is_block_live(block) {
                self.worklist.add(block);
            }
            changed = true;
        }
        changed
    }

    /// `cond_fail` on a literal zero never fires
    fn remove_passing_cond_fails(&mut self, block: BlockId) -> bool {
        let passing: Vec<InstId> = self
            .func
            .block_insts(block)
            .iter()
            .copied()
            .filter(|i| {
                matches!(self.func.kind(*i), InstKind::CondFail { .. })
                    && self.func.integer_literal(self.func.operand(*i, 0)) == Some(0)
            })
            .collect();
        for inst in &passing {
            let cond = self.func.operand(*inst, 0);
            trace!("removing cond_fail on literal 0 in {}", block);
            self.func.erase_inst(*inst);
            self.stats.dead_instructions_removed += delete_dead_values(self.func, [cond]);
            self.stats.cond_fails_removed += 1;
        }
        !passing.is_empty()
    }

    fn simplify_branch_block(&mut self, block: BlockId) -> bool {
        let term = self.func.expect_terminator(block);
        let InstKind::Br { dest } = *self.func.kind(term) else {
            return false;
        };
        if dest == block {
            return false;
        }
        let args = self.func.operands(term).to_vec();

        if self.func.single_pred(dest) == Some(block) && !self.func.is_entry(dest) {
            self.merge_blocks(block, dest);
            return true;
        }

        if let Some((target, forwarded)) = self.trampoline_target(dest, &args) {
            if !self.is_edge_splitting_block(block) {
                trace!("{}: skipping trampoline {} to reach {}", block, dest, target);
                self.func.replace_terminator(block, InstKind::Br { dest: target }, forwarded);
                self.stats.dead_instructions_removed += delete_dead_values(self.func, args);
                self.simplify_after_dropping_predecessor(dest);
                self.worklist.add(target);
                self.stats.trampolines_collapsed += 1;
                return true;
            }
        }

        self.options.enable_jump_threading && self.try_jump_thread(block)
    }

    /// A block whose only job is to break a critical edge out of a switch.
    /// Collapsing a trampoline behind it would bring the critical edge back.
    fn is_edge_splitting_block(&self, block: BlockId) -> bool {
        let Some(pred) = self.func.single_pred(block) else {
            return false;
        };
        let term = self.func.expect_terminator(pred);
        matches!(
            self.func.kind(term),
            InstKind::SwitchValue { .. } | InstKind::SwitchEnum { .. }
        )
    }

    /// Splice `dest` into `block`, which is its only predecessor
    fn merge_blocks(&mut self, block: BlockId, dest: BlockId) {
        trace!("merging {} into {}", dest, block);
        let term = self.func.expect_terminator(block);
        let args = self.func.operands(term).to_vec();
        let dest_args = self.func.block_args(dest).to_vec();
        self.func.erase_inst(term);

        for (arg, value) in dest_args.iter().zip(&args) {
            if !self.func.has_uses(*arg) {
                continue;
            }
            if arg == value {
                // a block passing its own argument back to itself through
                // its only predecessor is an unreachable cycle
                let undef = self.func.undef(self.func.value_type(*arg).clone());
                self.func.replace_all_uses_with(*arg, undef);
            } else {
                self.func.replace_all_uses_with(*arg, *value);
            }
        }
        for inst in self.func.block_insts(dest).to_vec() {
            self.func.move_inst_to_end(inst, block);
        }
        for index in (0..dest_args.len()).rev() {
            self.func.erase_block_arg(dest, index);
        }
        if self.loop_headers.remove(&dest) {
            self.loop_headers.insert(block);
        }
        self.worklist.remove(dest);
        self.func.erase_block(dest);
        self.stats.dead_instructions_removed += delete_dead_values(self.func, args);
        self.stats.blocks_merged += 1;
        self.add_successors(block);
    }

    /// If `dest` does nothing but branch on, the block it forwards to and the
    /// operands a predecessor passing `incoming` would send there directly
    pub(super) fn trampoline_target(
        &self,
        dest: BlockId,
        incoming: &[ValueId],
    ) -> Option<(BlockId, Vec<ValueId>)> {
        let [term] = self.func.block_insts(dest) else {
            return None;
        };
        let InstKind::Br { dest: target } = *self.func.kind(*term) else {
            return None;
        };
        if target == dest || self.loop_headers.contains(&target) {
            return None;
        }
        let dest_args = self.func.block_args(dest);
        let forwarded = self
            .func
            .operands(*term)
            .iter()
            .map(|op| match dest_args.iter().position(|a| a == op) {
                Some(pos) => incoming[pos],
                None => *op,
            })
            .collect();
        Some((target, forwarded))
    }

    fn simplify_cond_br_block(&mut self, block: BlockId) -> bool {
        let term = self.func.expect_terminator(block);
        let InstKind::CondBr {
            true_dest,
            false_dest,
            ..
        } = *self.func.kind(term)
        else {
            return false;
        };
        let cond = self.func.operand(term, 0);
        let true_args = self.func.edge_args(term, 0);
        let false_args = self.func.edge_args(term, 1);

        if let Some(value) = self.func.integer_literal(cond) {
            let (live, live_args, dead) = if value & 1 == 1 {
                (true_dest, true_args, false_dest)
            } else {
                (false_dest, false_args, true_dest)
            };
            trace!("{}: cond_br on a literal always goes to {}", block, live);
            let operands = self.func.operands(term).to_vec();
            self.func.replace_terminator(block, InstKind::Br { dest: live }, live_args);
            self.stats.dead_instructions_removed += delete_dead_values(self.func, operands);
            if dead != live {
                self.simplify_after_dropping_predecessor(dead);
            }
            self.worklist.add(live);
            self.stats.terminators_folded += 1;
            return true;
        }

        if true_dest == false_dest && true_args == false_args {
            trace!("{}: both arms of cond_br reach {}", block, true_dest);
            self.func.replace_terminator(block, InstKind::Br { dest: true_dest }, true_args);
            self.stats.dead_instructions_removed += delete_dead_values(self.func, [cond]);
            self.stats.terminators_folded += 1;
            return true;
        }

        if let Some(inner) = inverted_condition(self.func, cond) {
            trace!("{}: dropping an inverted cond_br condition", block);
            let mut operands = vec![inner];
            operands.extend_from_slice(&false_args);
            operands.extend_from_slice(&true_args);
            self.func.replace_terminator(
                block,
                InstKind::CondBr {
                    true_dest: false_dest,
                    false_dest: true_dest,
                    true_arg_count: false_args.len(),
                },
                operands,
            );
            self.stats.dead_instructions_removed += delete_dead_values(self.func, [cond]);
            self.stats.conditions_inverted += 1;
            return true;
        }

        (0..2).any(|edge| self.retarget_cond_br_edge(block, edge))
    }

    /// Point one arm of a `cond_br` past a trampoline
    fn retarget_cond_br_edge(&mut self, block: BlockId, edge: usize) -> bool {
        let term = self.func.expect_terminator(block);
        let InstKind::CondBr {
            true_dest,
            false_dest,
            ..
        } = *self.func.kind(term)
        else {
            return false;
        };
        let dest = if edge == 0 { true_dest } else { false_dest };
        if dest == block {
            return false;
        }
        let incoming = self.func.edge_args(term, edge);
        let Some((target, forwarded)) = self.trampoline_target(dest, &incoming) else {
            return false;
        };
        if !self.func.block_args(dest).is_empty() {
            let dest_dies = self.func.preds(dest).len() == 1;
            let target_preds = self.func.preds(target).len() + 1 - usize::from(dest_dies);
            if target_preds > 1 {
                return false;
            }
        }

        trace!("{}: cond_br arm skips trampoline {} to reach {}", block, dest, target);
        let cond = self.func.operand(term, 0);
        let (mut true_args, mut false_args) = (self.func.edge_args(term, 0), self.func.edge_args(term, 1));
        let (mut new_true, mut new_false) = (true_dest, false_dest);
        if edge == 0 {
            true_args = forwarded;
            new_true = target;
        } else {
            false_args = forwarded;
            new_false = target;
        }
        let mut operands = vec![cond];
        operands.extend_from_slice(&true_args);
        operands.extend_from_slice(&false_args);
        self.func.replace_terminator(
            block,
            InstKind::CondBr {
                true_dest: new_true,
                false_dest: new_false,
                true_arg_count: true_args.len(),
            },
            operands,
        );
        self.stats.dead_instructions_removed += delete_dead_values(self.func, incoming);
        self.simplify_after_dropping_predecessor(dest);
        self.worklist.add(target);
        self.stats.trampolines_collapsed += 1;
        true
    }

    fn simplify_switch_value_block(&mut self, block: BlockId) -> bool {
        let term = self.func.expect_terminator(block);
        let InstKind::SwitchValue { cases, default } = self.func.kind(term).clone() else {
            return false;
        };
        let scrutinee = self.func.operand(term, 0);
        let successors = self.func.kind(term).successors();

        let live = match self.func.integer_literal(scrutinee) {
            Some(value) => Some(
                cases
                    .iter()
                    .find(|(case, _)| *case == value)
                    .map(|(_, dest)| *dest)
                    .or(default),
            ),
            None => match successors.split_first() {
                Some((first, rest)) if rest.iter().all(|s| s == first) => Some(Some(*first)),
                _ => None,
            },
        };
        let Some(live) = live else {
            return false;
        };
        self.fold_switch(block, successors, live, Vec::new());
        self.stats.dead_instructions_removed += delete_dead_values(self.func, [scrutinee]);
        true
    }

    fn simplify_switch_enum_block(&mut self, block: BlockId) -> bool {
        let term = self.func.expect_terminator(block);
        let InstKind::SwitchEnum { cases, default } = self.func.kind(term).clone() else {
            return false;
        };
        let scrutinee = self.func.operand(term, 0);
        let successors = self.func.kind(term).successors();

        if let Some(case) = self.func.enum_case(scrutinee) {
            let live = cases
                .iter()
                .find(|(c, _)| *c == case)
                .map(|(_, dest)| *dest)
                .or(default);
            let mut args = Vec::new();
            if let Some(dest) = live {
                if let [arg] = self.func.block_args(dest) {
                    let arg_ty = self.func.value_type(*arg).clone();
                    let payload = self
                        .func
                        .defining_inst(scrutinee)
                        .and_then(|inst| self.func.operands(inst).first().copied());
                    args.push(match payload {
                        Some(p) => p,
                        None => self.func.undef(arg_ty),
                    });
                }
            }
            trace!("{}: switch_enum on a constructed case", block);
            self.fold_switch(block, successors, live, args);
            self.stats.dead_instructions_removed += delete_dead_values(self.func, [scrutinee]);
            return true;
        }

        if let Some((first, rest)) = successors.split_first() {
            if rest.iter().all(|s| s == first) && self.func.block_args(*first).is_empty() {
                trace!("{}: every switch_enum arm reaches {}", block, first);
                let first = *first;
                self.fold_switch(block, successors, Some(first), Vec::new());
                return true;
            }
        }

        self.try_switch_to_select(block)
    }

    /// Replace a switch with a branch to `live`, or with `unreachable` when
    /// no arm can be taken
    fn fold_switch(&mut self, block: BlockId, successors: Vec<BlockId>, live: Option<BlockId>, args: Vec<ValueId>) {
        match live {
            Some(dest) => {
                self.func.replace_terminator(block, InstKind::Br { dest }, args);
                self.worklist.add(dest);
            }
            None => {
                self.func.replace_terminator(block, InstKind::Unreachable, Vec::new());
            }
        }
        for succ in successors {
            if Some(succ) != live {
                self.simplify_after_dropping_predecessor(succ);
            }
        }
        self.stats.terminators_folded += 1;
    }

    /// Nothing without side effects matters before `unreachable`
    fn simplify_unreachable_block(&mut self, block: BlockId) -> bool {
        let mut removed = 0;
        let insts = self.func.block_insts(block).to_vec();
        for inst in insts.into_iter().rev() {
            if !self.func.is_inst_live(inst) || self.func.block_of(inst) != Some(block) {
                continue;
            }
            if is_trivially_dead(self.func, inst) {
                let operands = self.func.operands(inst).to_vec();
                self.func.erase_inst(inst);
                removed += 1 + delete_dead_values(self.func, operands);
            }
        }
        if removed > 0 {
            trace!("{}: removed {} dead instructions before unreachable", block, removed);
        }
        self.stats.dead_instructions_removed += removed;
        removed > 0
    }

    /// Move a `cond_fail` on a phi into the predecessors, where at least one
    /// of them passes a literal and the check folds away. Every predecessor
    /// must branch only here so the check never runs on a path that would
    /// not have reached it.
    fn try_move_cond_fail_to_preds(&mut self, block: BlockId) -> bool {
        if self.func.is_entry(block) {
            return false;
        }
        let mut cond_fail = None;
        for &inst in self.func.block_insts(block) {
            let kind = self.func.kind(inst);
            if matches!(kind, InstKind::CondFail { .. }) {
                cond_fail = Some(inst);
                break;
            }
            if kind.has_side_effects() || kind.is_terminator() {
                return false;
            }
        }
        let Some(cond_fail) = cond_fail else {
            return false;
        };
        let InstKind::CondFail { message } = self.func.kind(cond_fail).clone() else {
            return false;
        };

        let operand = self.func.operand(cond_fail, 0);
        let (cond, inverted) = match inverted_condition(self.func, operand) {
            Some(inner) if self.func.single_use(operand).is_some() => (inner, true),
            _ => (operand, false),
        };
        if !matches!(self.func.value_def(cond), ValueDef::Arg { block: b, .. } if b == block)
            || self.func.arg_kind(cond) != Some(ArgumentKind::Phi)
            || self.func.single_use(cond).is_none()
        {
            return false;
        }
        let preds = self.func.unique_preds(block);
        if preds.is_empty() || preds.iter().any(|p| self.func.single_successor(*p) != Some(block)) {
            return false;
        }
        let Some(incoming) = self.func.incoming_values(cond) else {
            return false;
        };
        if !incoming.iter().any(|(_, v)| self.func.integer_literal(*v).is_some()) {
            return false;
        }

        trace!("{}: hoisting cond_fail into {} predecessors", block, preds.len());
        let (loc, scope) = {
            let data = self.func.inst(cond_fail);
            (data.loc.clone(), data.scope)
        };
        for (pred, value) in incoming {
            let term = self.func.expect_terminator(pred);
            let mut check = value;
            if inverted {
                let all_ones = self.func.create_inst(
                    InstKind::IntegerLiteral { value: -1 },
                    Vec::new(),
                    vec![SilType::int(1)],
                    self.ast,
                );
                self.func.insert_inst_before(term, all_ones);
                let xor = self.func.create_inst(
                    InstKind::Builtin {
                        name: "xor_Int1".to_string(),
                    },
                    vec![value, self.func.result(all_ones)],
                    vec![SilType::int(1)],
                    self.ast,
                );
                self.func.insert_inst_before(term, xor);
                check = self.func.result(xor);
            }
            let hoisted = self.func.create_inst(
                InstKind::CondFail {
                    message: message.clone(),
                },
                vec![check],
                Vec::new(),
                self.ast,
            );
            self.func.set_debug_location(hoisted, loc.clone(), scope);
            self.func.insert_inst_before(term, hoisted);
            self.worklist.add(pred);
        }
        self.func.erase_inst(cond_fail);
        self.stats.dead_instructions_removed += delete_dead_values(self.func, [operand]);
        self.stats.cond_fails_hoisted += 1;
        true
    }
}
