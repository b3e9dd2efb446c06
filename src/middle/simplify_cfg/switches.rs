//! `switch_enum` rewrites: lowering to `select_enum` and making a default
//! that covers a single case explicit

use log::trace;

use crate::ast::AstContext;
use crate::middle::ir::{BlockId, Function, InstKind, ValueId};

use super::Simplifier;

/// The one case of the scrutinee's enum that `cases` does not mention, if
/// exactly one is left over
pub(super) fn uncovered_enum_case(
    func: &Function,
    ast: &AstContext,
    scrutinee: ValueId,
    cases: &[(usize, BlockId)],
) -> Option<usize> {
    let decl = func.value_type(scrutinee).ty.nominal_decl()?;
    let all = ast.decl(decl).cases().len();
    let mut uncovered = (0..all).filter(|c| !cases.iter().any(|(case, _)| case == c));
    let case = uncovered.next()?;
    uncovered.next().is_none().then_some(case)
}

impl Simplifier<'_> {
    /// A `switch_enum` whose arms only pick an integer for a common merge
    /// block becomes a `select_enum` feeding that block
    pub(super) fn try_switch_to_select(&mut self, block: BlockId) -> bool {
        let term = self.func.expect_terminator(block);
        let InstKind::SwitchEnum { cases, default } = self.func.kind(term).clone() else {
            return false;
        };
        let scrutinee = self.func.operand(term, 0);
        if self.func.is_ossa() && !self.func.value_type(scrutinee).is_trivial(self.ast) {
            return false;
        }
        let successors = self.func.kind(term).successors();
        let mut merge = None;
        let mut picks = Vec::with_capacity(successors.len());
        for &succ in &successors {
            let Some((target, value)) = self.selected_literal(block, succ) else {
                return false;
            };
            if *merge.get_or_insert(target) != target {
                return false;
            }
            picks.push(value);
        }
        let Some(merge) = merge else {
            return false;
        };
        if merge == block || successors.contains(&merge) || self.func.preds(merge).len() != successors.len() {
            return false;
        }
        let [merge_arg] = self.func.block_args(merge) else {
            return false;
        };
        let result_ty = self.func.value_type(*merge_arg).clone();
        if result_ty.is_address || result_ty.ty.builtin_integer_width().is_none() {
            return false;
        }

        trace!("{}: switch_enum only selects a value for {}", block, merge);
        let mut operands = vec![scrutinee];
        for value in picks {
            let lit = self.func.create_inst(
                InstKind::IntegerLiteral { value },
                Vec::new(),
                vec![result_ty.clone()],
                self.ast,
            );
            self.func.insert_inst_before(term, lit);
            operands.push(self.func.result(lit));
        }
        let select = self.func.create_inst(
            InstKind::SelectEnum {
                cases: cases.iter().map(|(case, _)| *case).collect(),
                has_default: default.is_some(),
            },
            operands,
            vec![result_ty],
            self.ast,
        );
        self.func.insert_inst_before(term, select);
        let selected = self.func.result(select);
        self.func.replace_terminator(block, InstKind::Br { dest: merge }, vec![selected]);
        for succ in successors {
            self.simplify_after_dropping_predecessor(succ);
        }
        self.worklist.add(merge);
        self.stats.switches_to_select += 1;
        true
    }

    /// `succ` does nothing but pass an integer literal to its successor.
    /// It must be reached only from `block`.
    fn selected_literal(&self, block: BlockId, succ: BlockId) -> Option<(BlockId, i128)> {
        if self.func.single_pred(succ) != Some(block) || !self.func.block_args(succ).is_empty() {
            return None;
        }
        let insts = self.func.block_insts(succ);
        let (&term, rest) = insts.split_last()?;
        let InstKind::Br { dest } = *self.func.kind(term) else {
            return None;
        };
        let [value] = self.func.operands(term) else {
            return None;
        };
        let literal = self.func.integer_literal(*value)?;
        match rest {
            [] => {}
            [only] if self.func.defining_inst(*value) == Some(*only) => {}
            _ => return None,
        }
        Some((dest, literal))
    }

    /// Replace a `switch_enum` default that can only be taken by one case
    /// with that case
    pub(super) fn canonicalize_switch_enums(&mut self) -> bool {
        let mut changed = false;
        for block in self.func.layout().to_vec() {
            let Some(term) = self.func.terminator(block) else {
                continue;
            };
            let InstKind::SwitchEnum {
                mut cases,
                default: Some(default),
            } = self.func.kind(term).clone()
            else {
                continue;
            };
            if !self.func.block_args(default).is_empty() {
                continue;
            }
            let scrutinee = self.func.operand(term, 0);
            let Some(case) = uncovered_enum_case(self.func, self.ast, scrutinee, &cases) else {
                continue;
            };
            trace!("{}: switch_enum default only covers case {}", block, case);
            cases.push((case, default));
            self.func
                .replace_terminator(block, InstKind::SwitchEnum { cases, default: None }, vec![scrutinee]);
            self.stats.switches_canonicalized += 1;
            changed = true;
        }
        changed
    }
}
