//! Incremental SSA repair
//!
//! After a definition is duplicated, uses outside the copies may see either
//! version depending on the path taken. The updater is told which value is
//! live at the end of which block and then rewrites uses, inserting block
//! arguments at merge points. Edges out of terminators that cannot carry
//! arguments are split first.

use std::collections::{HashMap, HashSet};

use log::trace;

use crate::middle::cfg::split_edge;
use crate::middle::ir::{BlockId, Function, InstKind, Use, ValueId};
use crate::types::{OwnershipKind, SilType};

pub struct SsaUpdater {
    ty: SilType,
    ownership: OwnershipKind,
    /// Value live at the end of a block
    available: HashMap<BlockId, ValueId>,
    /// Value live at the start of a block, once computed
    at_entry: HashMap<BlockId, ValueId>,
    visiting: HashSet<BlockId>,
    inserted_args: Vec<ValueId>,
}

impl SsaUpdater {
    pub fn new(ty: SilType, ownership: OwnershipKind) -> Self {
        Self {
            ty,
            ownership,
            available: HashMap::new(),
            at_entry: HashMap::new(),
            visiting: HashSet::new(),
            inserted_args: Vec::new(),
        }
    }

    pub fn add_available_value(&mut self, block: BlockId, value: ValueId) {
        self.available.insert(block, value);
    }

    /// Block arguments created so far
    pub fn inserted_args(&self) -> &[ValueId] {
        &self.inserted_args
    }

    pub fn value_at_end_of_block(&mut self, func: &mut Function, block: BlockId) -> ValueId {
        match self.available.get(&block) {
            Some(v) => *v,
            None => self.value_at_entry(func, block),
        }
    }

    /// Value for a use in the middle of `block`, before any definition the
    /// block itself makes available
    pub fn value_in_middle_of_block(&mut self, func: &mut Function, block: BlockId) -> ValueId {
        self.value_at_entry(func, block)
    }

    /// Rewrite one use. A use in a block that makes a value available is
    /// assumed to come after that definition.
    pub fn rewrite_use(&mut self, func: &mut Function, u: Use) {
        let block = func.expect_block_of(u.user);
        let value = match self.available.get(&block) {
            Some(v) if func.value_block(*v) == Some(block) => *v,
            _ => self.value_in_middle_of_block(func, block),
        };
        if func.operand(u.user, u.index) != value {
            func.set_operand(u.user, u.index, value);
        }
    }

    fn value_at_entry(&mut self, func: &mut Function, block: BlockId) -> ValueId {
        if let Some(v) = self.at_entry.get(&block) {
            return *v;
        }
        let preds = func.unique_preds(block);
        if preds.is_empty() || func.is_entry(block) {
            return func.undef(self.ty.clone());
        }
        if let Some(pred) = func.single_pred(block) {
            if !self.visiting.insert(block) {
                // single-predecessor cycle, only possible in unreachable code
                return func.undef(self.ty.clone());
            }
            let value = self.value_at_end_of_block(func, pred);
            self.visiting.remove(&block);
            self.at_entry.insert(block, value);
            return value;
        }

        for pred in &preds {
            let term = func.expect_terminator(*pred);
            if !matches!(func.kind(term), InstKind::Br { .. } | InstKind::CondBr { .. }) {
                let edges: Vec<usize> = func
                    .successor_edges(term)
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.dest == block)
                    .map(|(i, _)| i)
                    .collect();
                for edge in edges {
                    split_edge(func, *pred, edge);
                }
            }
        }

        let arg = func.add_block_arg(block, self.ty.clone(), self.ownership);
        let arg_index = func.block_args(block).len() - 1;
        trace!("ssa updater: new argument {} in {}", arg, block);
        self.at_entry.insert(block, arg);

        let mut incoming = Vec::new();
        for pred in func.unique_preds(block) {
            let value = self.value_at_end_of_block(func, pred);
            let term = func.expect_terminator(pred);
            let edges: Vec<usize> = func
                .successor_edges(term)
                .iter()
                .enumerate()
                .filter(|(_, e)| e.dest == block)
                .map(|(i, _)| i)
                .collect();
            for edge in edges {
                func.push_edge_arg(term, edge, value);
                incoming.push(value);
            }
        }

        let distinct: HashSet<ValueId> = incoming.iter().copied().filter(|v| *v != arg).collect();
        if distinct.len() == 1 {
            let Some(&only) = distinct.iter().next() else {
                return arg;
            };
            self.remove_trivial_arg(func, block, arg_index, arg, only);
            for cached in self.at_entry.values_mut() {
                if *cached == arg {
                    *cached = only;
                }
            }
            self.inserted_args.retain(|v| *v != arg);
            return only;
        }
        self.inserted_args.push(arg);
        arg
    }

    /// All incoming values are the same: drop the argument again
    fn remove_trivial_arg(&mut self, func: &mut Function, block: BlockId, index: usize, arg: ValueId, value: ValueId) {
        for pred in func.unique_preds(block) {
            let term = func.expect_terminator(pred);
            let edges: Vec<usize> = func
                .successor_edges(term)
                .iter()
                .enumerate()
                .filter(|(_, e)| e.dest == block)
                .map(|(i, _)| i)
                .collect();
            for edge in edges {
                func.remove_edge_arg(term, edge, index);
            }
        }
        if func.has_uses(arg) {
            func.replace_all_uses_with(arg, value);
        }
        func.erase_block_arg(block, index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse_sil;
    use crate::middle::ir_printer::print_function;

    #[test]
    fn test_merge_point_gets_argument() {
        let mut module = parse_sil(
            "sil @f : $@convention(thin) (Builtin.Int1) -> Builtin.Int64 {
bb0(%0 : $Builtin.Int1):
  cond_br %0, bb1, bb2

bb1:
  %1 = integer_literal $Builtin.Int64, 1
  br bb3

bb2:
  %2 = integer_literal $Builtin.Int64, 2
  br bb3

bb3:
  %3 = integer_literal $Builtin.Int64, 3
  return %3 : $Builtin.Int64
}
",
        )
        .unwrap();
        let id = module.find_function("f").unwrap();
        let (f, ast) = module.function_and_ast_mut(id);
        let blocks = f.layout().to_vec();
        let one = f.result(f.block_insts(blocks[1])[0]);
        let two = f.result(f.block_insts(blocks[2])[0]);
        let ret = f.expect_terminator(blocks[3]);

        let mut updater = SsaUpdater::new(SilType::int(64), OwnershipKind::None);
        updater.add_available_value(blocks[1], one);
        updater.add_available_value(blocks[2], two);
        updater.rewrite_use(f, Use { user: ret, index: 0 });

        assert_eq!(f.block_args(blocks[3]).len(), 1);
        assert_eq!(updater.inserted_args().len(), 1);
        assert!(f.verify(ast).is_empty());
        let text = print_function(&module, module.function(id));
        assert!(text.contains("br bb3(%1 : $Builtin.Int64)"));
        assert!(text.contains("return %3 : $Builtin.Int64"));
    }

    #[test]
    fn test_same_value_on_all_paths_needs_no_argument() {
        let mut module = parse_sil(
            "sil @f : $@convention(thin) (Builtin.Int1) -> Builtin.Int64 {
bb0(%0 : $Builtin.Int1):
  %1 = integer_literal $Builtin.Int64, 1
  cond_br %0, bb1, bb2

bb1:
  br bb3

bb2:
  br bb3

bb3:
  %2 = integer_literal $Builtin.Int64, 3
  return %2 : $Builtin.Int64
}
",
        )
        .unwrap();
        let id = module.find_function("f").unwrap();
        let (f, ast) = module.function_and_ast_mut(id);
        let blocks = f.layout().to_vec();
        let one = f.result(f.block_insts(blocks[0])[0]);
        let ret = f.expect_terminator(blocks[3]);

        let mut updater = SsaUpdater::new(SilType::int(64), OwnershipKind::None);
        updater.add_available_value(blocks[0], one);
        updater.rewrite_use(f, Use { user: ret, index: 0 });

        assert!(f.block_args(blocks[3]).is_empty());
        assert_eq!(f.operand(ret, 0), one);
        assert!(f.verify(ast).is_empty());
    }
}
