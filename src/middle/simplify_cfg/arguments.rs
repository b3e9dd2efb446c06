//! Block argument rewrites: dead and trivial phis, and splitting aggregate
//! phis into one argument per field

use log::trace;

use crate::middle::cfg::delete_dead_values;
use crate::middle::ir::{ArgumentKind, BlockId, InstId, InstKind, ValueId};
use crate::types::{OwnershipKind, SilType, Type};

use super::Simplifier;

impl Simplifier<'_> {
    /// Drop unused arguments and arguments that receive the same value on
    /// every edge
    pub(super) fn simplify_args(&mut self, block: BlockId) -> bool {
        if self.func.is_entry(block) || self.func.block_args(block).is_empty() {
            return false;
        }
        let first = self.func.block_args(block)[0];
        if self.func.arg_kind(first) == Some(ArgumentKind::TerminatorResult) {
            if self.func.has_uses(first) {
                return false;
            }
            trace!("{}: dropping unused switch_enum payload", block);
            self.func.erase_block_arg(block, 0);
            self.stats.dead_arguments_removed += 1;
            return true;
        }

        let mut changed = false;
        let mut index = self.func.block_args(block).len();
        while index > 0 {
            index -= 1;
            let arg = self.func.block_args(block)[index];
            if !self.func.has_uses(arg) {
                trace!("{}: dropping dead argument {}", block, index);
                self.erase_phi_arg(block, index);
                self.stats.dead_arguments_removed += 1;
                changed = true;
                continue;
            }
            if let Some(value) = self.trivial_phi_value(block, arg) {
                trace!("{}: argument {} always receives {}", block, index, value);
                self.func.replace_all_uses_with(arg, value);
                self.erase_phi_arg(block, index);
                self.stats.trivial_phis_removed += 1;
                changed = true;
            }
        }
        if changed {
            for pred in self.func.unique_preds(block) {
                self.worklist.add(pred);
            }
        }
        changed
    }

    /// The one value a phi receives from every predecessor, ignoring edges
    /// that pass the phi back to itself
    fn trivial_phi_value(&self, block: BlockId, arg: ValueId) -> Option<ValueId> {
        let incoming = self.func.incoming_values(arg)?;
        let mut value = None;
        for (_, v) in incoming {
            if v == arg {
                continue;
            }
            match value {
                None => value = Some(v),
                Some(seen) if seen == v => {}
                Some(_) => return None,
            }
        }
        let value = value?;
        if self.func.value_block(value) == Some(block) {
            return None;
        }
        if self.func.is_ossa() && self.func.ownership(value) != self.func.ownership(arg) {
            return None;
        }
        Some(value)
    }

    /// Remove argument `index` of `block` together with the operand every
    /// incoming edge passes for it. Both edges of a `cond_br` that targets
    /// the block twice lose their operand.
    pub(super) fn erase_phi_arg(&mut self, block: BlockId, index: usize) {
        let mut incoming = Vec::new();
        for pred in self.func.unique_preds(block) {
            let term = self.func.expect_terminator(pred);
            let edges: Vec<usize> = self
                .func
                .successor_edges(term)
                .iter()
                .enumerate()
                .filter(|(_, e)| e.dest == block)
                .map(|(i, _)| i)
                .collect();
            for &edge in edges.iter().rev() {
                incoming.push(self.func.edge_args(term, edge)[index]);
                self.func.remove_edge_arg(term, edge, index);
            }
        }
        self.func.erase_block_arg(block, index);
        self.stats.dead_instructions_removed += delete_dead_values(self.func, incoming);
    }

    /// Split tuple and struct phis whose fields are worth tracking
    /// separately. New arguments are examined as well, so nested aggregates
    /// are split in the same call.
    pub(super) fn split_aggregate_args(&mut self) -> bool {
        if self.func.is_ossa() {
            return false;
        }
        let mut changed = false;
        let blocks: Vec<BlockId> = self.func.layout().iter().skip(1).copied().collect();
        for block in blocks {
            let mut index = 0;
            while index < self.func.block_args(block).len() {
                if self.split_arg(block, index) {
                    changed = true;
                } else {
                    index += 1;
                }
            }
        }
        changed
    }

    fn split_arg(&mut self, block: BlockId, index: usize) -> bool {
        let arg = self.func.block_args(block)[index];
        if self.func.arg_kind(arg) != Some(ArgumentKind::Phi) {
            return false;
        }
        let ty = self.func.value_type(arg).clone();
        if ty.is_address {
            return false;
        }
        let is_tuple = matches!(ty.ty, Type::Tuple(_));
        let Some(fields) = ty.ty.field_types(self.ast) else {
            return false;
        };
        if fields.len() < 2 || fields.iter().filter(|f| !f.is_trivial(self.ast)).count() < 2 {
            return false;
        }
        let preds = self.func.unique_preds(block);
        if preds.is_empty()
            || preds.iter().any(|p| {
                let term = self.func.expect_terminator(*p);
                !matches!(self.func.kind(term), InstKind::Br { .. } | InstKind::CondBr { .. })
            })
        {
            return false;
        }

        trace!("{}: splitting argument {} into {} fields", block, index, fields.len());
        let new_args: Vec<ValueId> = fields
            .iter()
            .map(|f| self.func.add_block_arg(block, SilType::object(f.clone()), OwnershipKind::None))
            .collect();

        let mut old_incoming = Vec::new();
        for pred in preds {
            let term = self.func.expect_terminator(pred);
            let edges: Vec<usize> = self
                .func
                .successor_edges(term)
                .iter()
                .enumerate()
                .filter(|(_, e)| e.dest == block)
                .map(|(i, _)| i)
                .collect();
            for edge in edges {
                let value = self.func.edge_args(term, edge)[index];
                for part in self.project_fields(term, value, &fields, is_tuple) {
                    self.func.push_edge_arg(term, edge, part);
                }
                self.func.remove_edge_arg(term, edge, index);
                old_incoming.push(value);
            }
        }

        let mut needs_aggregate = false;
        for u in self.func.uses(arg).to_vec() {
            let field = match self.func.kind(u.user) {
                InstKind::TupleExtract { index } if is_tuple => Some(*index),
                InstKind::StructExtract { field } if !is_tuple => Some(*field),
                _ => None,
            };
            match field {
                Some(field) => {
                    let result = self.func.result(u.user);
                    self.func.replace_all_uses_with(result, new_args[field]);
                    self.func.erase_inst(u.user);
                }
                None => needs_aggregate = true,
            }
        }
        if needs_aggregate {
            let kind = if is_tuple { InstKind::Tuple } else { InstKind::Struct };
            let aggregate = self.func.create_inst(kind, new_args, vec![ty], self.ast);
            self.func.insert_inst_at(block, 0, aggregate);
            let value = self.func.result(aggregate);
            self.func.replace_all_uses_with(arg, value);
        }
        self.func.erase_block_arg(block, index);
        self.stats.dead_instructions_removed += delete_dead_values(self.func, old_incoming);
        self.stats.arguments_split += 1;
        true
    }

    /// The fields of `value`, read right before `anchor`. Aggregates built
    /// in place are looked through.
    fn project_fields(&mut self, anchor: InstId, value: ValueId, fields: &[Type], is_tuple: bool) -> Vec<ValueId> {
        if let Some(inst) = self.func.defining_inst(value) {
            let builds = match self.func.kind(inst) {
                InstKind::Tuple => is_tuple,
                InstKind::Struct => !is_tuple,
                _ => false,
            };
            if builds && self.func.operands(inst).len() == fields.len() {
                return self.func.operands(inst).to_vec();
            }
        }
        if self.func.is_undef(value) {
            return fields
                .iter()
                .map(|f| self.func.undef(SilType::object(f.clone())))
                .collect();
        }
        fields
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let kind = if is_tuple {
                    InstKind::TupleExtract { index: i }
                } else {
                    InstKind::StructExtract { field: i }
                };
                let extract = self.func.create_inst(kind, vec![value], vec![SilType::object(f.clone())], self.ast);
                self.func.insert_inst_before(anchor, extract);
                self.func.result(extract)
            })
            .collect()
    }
}
