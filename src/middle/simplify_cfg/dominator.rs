//! Dominator-based simplification
//!
//! Along an edge out of a `cond_br` or `switch_enum`, the branch condition
//! has a known value. Uses dominated by the destination of such an edge are
//! rewritten to that value. Uses that are not dominated, but sit in a
//! terminator reached from the dominated region, are reached by threading
//! the edge into a copy of their block whose terminator is then folded.

use std::collections::HashSet;

use log::{debug, trace};

use crate::middle::dominance::DominanceInfo;
use crate::middle::ir::{BlockId, InstId, InstKind, Use, ValueId};
use crate::types::SilType;

use super::switches::uncovered_enum_case;
use super::{inverted_condition, Simplifier};

/// The value of a branch condition along one edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KnownValue {
    Bool(bool),
    Case(usize),
}

#[derive(Debug, Clone, Copy)]
struct KnownEdge {
    dest: BlockId,
    known: KnownValue,
}

/// An edge `pred -> user_block` on which `cond` is known
#[derive(Debug, Clone, Copy)]
struct ThreadCandidate {
    pred: BlockId,
    edge: usize,
    user_block: BlockId,
    cond: ValueId,
    known: KnownValue,
}

/// One round of the phase. Dominance is computed once on creation, so the
/// CFG must not change until `thread` consumes the round.
struct DominatorRound<'p, 'a> {
    simplifier: &'p mut Simplifier<'a>,
    dom: DominanceInfo,
}

impl<'p, 'a> DominatorRound<'p, 'a> {
    fn new(simplifier: &'p mut Simplifier<'a>) -> Self {
        let dom = DominanceInfo::compute(simplifier.func);
        Self { simplifier, dom }
    }

    /// The branch condition of `block` and its value along each edge whose
    /// value is known. Edges sharing a destination are left out.
    fn known_edges(&self, block: BlockId) -> Option<(ValueId, Vec<KnownEdge>)> {
        let func = &*self.simplifier.func;
        let term = func.terminator(block)?;
        if !matches!(func.kind(term), InstKind::CondBr { .. } | InstKind::SwitchEnum { .. }) {
            return None;
        }
        let cond = func.operand(term, 0);
        if func.is_undef(cond) {
            return None;
        }
        let mut edges = match func.kind(term) {
            InstKind::CondBr {
                true_dest,
                false_dest,
                ..
            } => {
                if func.integer_literal(cond).is_some() {
                    return None;
                }
                vec![
                    KnownEdge {
                        dest: *true_dest,
                        known: KnownValue::Bool(true),
                    },
                    KnownEdge {
                        dest: *false_dest,
                        known: KnownValue::Bool(false),
                    },
                ]
            }
            InstKind::SwitchEnum { cases, default } => {
                if func.enum_case(cond).is_some() {
                    return None;
                }
                let mut edges: Vec<KnownEdge> = cases
                    .iter()
                    .map(|(case, dest)| KnownEdge {
                        dest: *dest,
                        known: KnownValue::Case(*case),
                    })
                    .collect();
                if let Some(default) = default {
                    if let Some(case) = uncovered_enum_case(func, self.simplifier.ast, cond, cases) {
                        edges.push(KnownEdge {
                            dest: *default,
                            known: KnownValue::Case(case),
                        });
                    }
                }
                edges
            }
            _ => return None,
        };
        let successors = func.kind(term).successors();
        edges.retain(|e| successors.iter().filter(|s| **s == e.dest).count() == 1);
        Some((cond, edges))
    }

    /// Rewrite uses of branch conditions in the regions where their value is
    /// known
    fn propagate_conditions(&mut self) -> bool {
        let mut changed = false;
        for block in self.dom.reverse_post_order().to_vec() {
            if !self.simplifier.func.is_block_live(block) {
                continue;
            }
            let Some((cond, edges)) = self.known_edges(block) else {
                continue;
            };
            for edge in edges {
                if edge.dest == block || self.simplifier.func.single_pred(edge.dest) != Some(block) {
                    continue;
                }
                changed |= match edge.known {
                    KnownValue::Bool(value) => self.propagate_bool(cond, edge.dest, value),
                    KnownValue::Case(case) => self.propagate_case(cond, edge.dest, case),
                };
            }
        }
        changed
    }

    /// Uses of `value` in blocks dominated by `region`
    fn dominated_uses(&self, value: ValueId, region: BlockId) -> Vec<Use> {
        let func = &*self.simplifier.func;
        func.uses(value)
            .iter()
            .filter(|u| {
                func.block_of(u.user)
                    .is_some_and(|b| self.dom.is_reachable(b) && self.dom.dominates(region, b))
            })
            .copied()
            .collect()
    }

    fn propagate_bool(&mut self, cond: ValueId, region: BlockId, value: bool) -> bool {
        // derived `xor_Int1(cond, true)` values are known too; rewrite them
        // first since the xor itself may sit in the region
        let inverted: Vec<ValueId> = self
            .simplifier
            .func
            .uses(cond)
            .iter()
            .filter_map(|u| {
                let func = &*self.simplifier.func;
                let result = *func.results(u.user).first()?;
                (inverted_condition(func, result) == Some(cond)).then_some(result)
            })
            .collect();
        let mut changed = false;
        for derived in inverted {
            changed |= self.replace_with_literal(derived, region, !value);
        }
        changed | self.replace_with_literal(cond, region, value)
    }

    fn replace_with_literal(&mut self, value: ValueId, region: BlockId, literal: bool) -> bool {
        let uses = self.dominated_uses(value, region);
        if uses.is_empty() {
            return false;
        }
        trace!("{}: {} is {} here, {} uses", region, value, literal, uses.len());
        let lit = self.simplifier.int1_literal_at_start(region, literal);
        for u in &uses {
            self.simplifier.func.set_operand(u.user, u.index, lit);
            self.simplifier.worklist.add(self.simplifier.func.expect_block_of(u.user));
        }
        self.simplifier.stats.values_propagated += uses.len();
        true
    }

    /// Fold `select_enum` on the known case and give dominated
    /// `switch_enum`s a freshly built scrutinee, which they fold on
    fn propagate_case(&mut self, cond: ValueId, region: BlockId, case: usize) -> bool {
        let func = &*self.simplifier.func;
        if func.is_ossa() && !func.value_type(cond).is_trivial(self.simplifier.ast) {
            return false;
        }
        let mut changed = false;
        for u in self.dominated_uses(cond, region) {
            if u.index != 0 || !self.simplifier.func.is_inst_live(u.user) {
                continue;
            }
            match self.simplifier.func.kind(u.user).clone() {
                InstKind::SelectEnum { cases, has_default } => {
                    let operands = self.simplifier.func.operands(u.user).to_vec();
                    let chosen = match cases.iter().position(|c| *c == case) {
                        Some(i) => operands[1 + i],
                        None if has_default => operands[operands.len() - 1],
                        None => continue,
                    };
                    trace!("{}: select_enum picks case {}", region, case);
                    let result = self.simplifier.func.result(u.user);
                    self.simplifier.func.replace_all_uses_with(result, chosen);
                    self.simplifier.func.erase_inst(u.user);
                }
                InstKind::SwitchEnum { .. } => {
                    trace!("{}: switch_enum on {} only sees case {}", region, cond, case);
                    let Some(rebuilt) = self.simplifier.build_enum_before(u.user, cond, case) else {
                        continue;
                    };
                    self.simplifier.func.set_operand(u.user, 0, rebuilt);
                    self.simplifier.worklist.add(self.simplifier.func.expect_block_of(u.user));
                }
                _ => continue,
            }
            self.simplifier.stats.values_propagated += 1;
            changed = true;
        }
        changed
    }

    /// Terminators that branch on a known condition from outside its known
    /// region, together with the incoming edges that come from inside it
    fn find_thread_candidates(&self) -> Vec<ThreadCandidate> {
        let func = &*self.simplifier.func;
        let mut candidates = Vec::new();
        for &block in self.dom.reverse_post_order() {
            if !func.is_block_live(block) {
                continue;
            }
            let Some((cond, edges)) = self.known_edges(block) else {
                continue;
            };
            let is_switch = matches!(func.kind(func.expect_terminator(block)), InstKind::SwitchEnum { .. });
            for edge in edges {
                let dominated_region = func.single_pred(edge.dest) == Some(block);
                for u in func.uses(cond) {
                    if u.index != 0 {
                        continue;
                    }
                    let same_shape = match func.kind(u.user) {
                        InstKind::CondBr { .. } => !is_switch,
                        InstKind::SwitchEnum { .. } => is_switch,
                        _ => false,
                    };
                    let Some(user_block) = func.block_of(u.user) else {
                        continue;
                    };
                    if !same_shape || !self.can_thread_into(block, cond, user_block, is_switch) {
                        continue;
                    }
                    if dominated_region && self.dom.dominates(edge.dest, user_block) {
                        continue;
                    }
                    for pred in func.unique_preds(user_block) {
                        let from_known_region = (pred == block && edge.dest == user_block)
                            || (dominated_region
                                && self.dom.is_reachable(pred)
                                && self.dom.dominates(edge.dest, pred));
                        if !from_known_region {
                            continue;
                        }
                        let term = func.expect_terminator(pred);
                        for (index, e) in func.successor_edges(term).iter().enumerate() {
                            if e.dest == user_block {
                                candidates.push(ThreadCandidate {
                                    pred,
                                    edge: index,
                                    user_block,
                                    cond,
                                    known: edge.known,
                                });
                            }
                        }
                    }
                }
            }
        }
        candidates
    }

    fn can_thread_into(&self, block: BlockId, cond: ValueId, user_block: BlockId, is_switch: bool) -> bool {
        let s = &*self.simplifier;
        user_block != block
            && !s.func.is_entry(user_block)
            && self.dom.is_reachable(user_block)
            && s.func.value_block(cond) != Some(user_block)
            && s.func.preds(user_block).len() > 1
            && (is_switch || !s.loop_headers.contains(&user_block))
            && s.is_threadable_block(user_block, s.options.jump_threading_cost_limit)
    }

    /// Thread every candidate edge that is still valid. Consumes the round
    /// because threading invalidates dominance.
    fn thread(self, candidates: Vec<ThreadCandidate>) -> bool {
        let s = self.simplifier;
        let mut done: HashSet<(BlockId, BlockId)> = HashSet::new();
        let mut changed = false;
        for c in candidates {
            if !done.insert((c.pred, c.user_block)) || !still_threadable(s, &c) {
                continue;
            }
            if let KnownValue::Case(_) = c.known {
                if s.func.is_ossa() && !s.func.value_type(c.cond).is_trivial(s.ast) {
                    continue;
                }
            }
            trace!("threading {} -> {} where {} is known", c.pred, c.user_block, c.cond);
            let copy = s.thread_edge(c.pred, c.edge);
            let term = s.func.expect_terminator(copy);
            let folded = match c.known {
                KnownValue::Bool(value) => {
                    let lit = s.func.create_inst(
                        InstKind::IntegerLiteral {
                            value: i128::from(value),
                        },
                        Vec::new(),
                        vec![SilType::int(1)],
                        s.ast,
                    );
                    s.func.insert_inst_before(term, lit);
                    Some(s.func.result(lit))
                }
                KnownValue::Case(case) => s.build_enum_before(term, c.cond, case),
            };
            if let Some(value) = folded {
                s.func.set_operand(term, 0, value);
            }
            s.worklist.add(copy);
            s.stats.jumps_threaded += 1;
            changed = true;
        }
        changed
    }
}

fn still_threadable(s: &Simplifier<'_>, c: &ThreadCandidate) -> bool {
    if !s.func.is_block_live(c.pred) || !s.func.is_block_live(c.user_block) {
        return false;
    }
    let Some(term) = s.func.terminator(c.pred) else {
        return false;
    };
    let reaches = s
        .func
        .successor_edges(term)
        .get(c.edge)
        .is_some_and(|e| e.dest == c.user_block);
    let Some(user_term) = s.func.terminator(c.user_block) else {
        return false;
    };
    reaches
        && s.func.preds(c.user_block).len() > 1
        && s.func.operands(user_term).first() == Some(&c.cond)
}

impl Simplifier<'_> {
    /// Run dominator rounds until one changes nothing or the iteration cap
    /// is reached
    pub(super) fn dominator_based_simplify(&mut self) -> bool {
        let mut changed = false;
        for iteration in 0..self.options.max_dominator_iterations {
            self.stats.dominator_iterations += 1;
            let mut round = DominatorRound::new(self);
            let mut round_changed = round.propagate_conditions();
            let candidates = round.find_thread_candidates();
            round_changed |= round.thread(candidates);
            if !round_changed {
                break;
            }
            debug!("dominator round {} changed @{}", iteration, self.func.name);
            changed = true;
            if self.simplify_blocks() {
                self.remove_unreachable_blocks();
            }
        }
        changed
    }

    /// Build `enum #case` right before `anchor`, carrying the payload that
    /// `value` holds when it is that case
    fn build_enum_before(&mut self, anchor: InstId, value: ValueId, case: usize) -> Option<ValueId> {
        let ty = self.func.value_type(value).clone();
        let decl = ty.ty.nominal_decl()?;
        let payload_ty = self.ast.decl(decl).cases().get(case)?.payload.clone();
        let mut operands = Vec::new();
        if let Some(payload_ty) = payload_ty {
            let data = self.func.create_inst(
                InstKind::UncheckedEnumData { case },
                vec![value],
                vec![SilType::object(payload_ty)],
                self.ast,
            );
            self.func.insert_inst_before(anchor, data);
            operands.push(self.func.result(data));
        }
        let rebuilt = self.func.create_inst(InstKind::Enum { case }, operands, vec![ty], self.ast);
        self.func.insert_inst_before(anchor, rebuilt);
        Some(self.func.result(rebuilt))
    }
}
