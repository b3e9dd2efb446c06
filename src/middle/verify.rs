//! Structural checks on SIL functions
//!
//! [`Function::verify`] collects every broken structural rule as a message.
//! The parser reports them as diagnostics; the optimizer treats any of them
//! as an invariant violation.

use std::collections::HashMap;

use crate::ast::AstContext;
use crate::middle::dominance::DominanceInfo;
use crate::middle::ir::*;

impl Function {
    /// Check the CFG and SSA rules. Returns one message per violation.
    pub fn verify(&self, ast: &AstContext) -> Vec<String> {
        let mut errors = Vec::new();
        if !self.is_definition() {
            return errors;
        }

        self.verify_entry(ast, &mut errors);
        let mut expected_preds: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for &block in self.layout() {
            self.verify_block(block, ast, &mut expected_preds, &mut errors);
        }

        for &block in self.layout() {
            let mut actual = self.preds(block).to_vec();
            let mut expected = expected_preds.remove(&block).unwrap_or_default();
            actual.sort();
            expected.sort();
            if actual != expected {
                errors.push(format!("predecessor list of {} does not match the terminators", block));
            }
        }

        if errors.is_empty() {
            self.verify_dominance(&mut errors);
        }
        errors
    }

    fn verify_entry(&self, ast: &AstContext, errors: &mut Vec<String>) {
        let entry = self.entry();
        if !self.preds(entry).is_empty() {
            errors.push("the entry block has predecessors".to_string());
        }
        let args = self.block_args(entry);
        if args.len() != self.ty.params.len() {
            errors.push(format!(
                "entry block has {} arguments but the function takes {}",
                args.len(),
                self.ty.params.len()
            ));
            return;
        }
        for (i, arg) in args.iter().enumerate() {
            if self.value_type(*arg) != &self.ty.argument_type(i) {
                errors.push(format!("entry argument {} does not match its parameter type", i));
            }
            if self.is_ossa() && self.ownership(*arg) != self.ty.argument_ownership(i, ast) {
                errors.push(format!(
                    "entry argument {} has ownership {} but its convention implies {}",
                    i,
                    self.ownership(*arg),
                    self.ty.argument_ownership(i, ast)
                ));
            }
        }
    }

    fn verify_block(
        &self,
        block: BlockId,
        ast: &AstContext,
        expected_preds: &mut HashMap<BlockId, Vec<BlockId>>,
        errors: &mut Vec<String>,
    ) {
        let insts = self.block_insts(block);
        let Some((&last, body)) = insts.split_last() else {
            errors.push(format!("{} is empty", block));
            return;
        };
        if !self.kind(last).is_terminator() {
            errors.push(format!("{} does not end in a terminator", block));
        }
        if body.iter().any(|i| self.kind(*i).is_terminator()) {
            errors.push(format!("{} has a terminator before its end", block));
        }

        for (index, arg) in self.block_args(block).iter().enumerate() {
            if self.value_def(*arg) != (ValueDef::Arg { block, index }) {
                errors.push(format!("argument {} of {} is out of sync", index, block));
            }
        }

        for &inst in insts {
            if self.block_of(inst) != Some(block) {
                errors.push(format!("{} does not record {} as its block", inst, block));
            }
            for (index, op) in self.operands(inst).iter().enumerate() {
                match self.value_def(*op) {
                    ValueDef::Placeholder | ValueDef::Patched => {
                        errors.push(format!("{} uses the unresolved value {}", inst, op))
                    }
                    ValueDef::Erased => errors.push(format!("{} uses the erased value {}", inst, op)),
                    _ => {}
                }
                if !self.uses(*op).contains(&Use { user: inst, index }) {
                    errors.push(format!("use-list of {} is missing operand {} of {}", op, index, inst));
                }
            }
            self.verify_inst_types(inst, errors);
        }

        if self.kind(last).is_terminator() {
            self.verify_terminator(block, last, ast, expected_preds, errors);
        }
    }

    fn verify_inst_types(&self, inst: InstId, errors: &mut Vec<String>) {
        let ops = self.operands(inst);
        match self.kind(inst) {
            InstKind::CondBr { .. } | InstKind::CondFail { .. } => {
                if !self.value_type(ops[0]).is_int1() {
                    errors.push(format!("condition of {} is not Builtin.Int1", inst));
                }
            }
            InstKind::Return => {
                if self.value_type(ops[0]) != &self.ty.result_type() {
                    errors.push(format!("{} returns a value of the wrong type", inst));
                }
            }
            _ => {}
        }
    }

    fn verify_terminator(
        &self,
        block: BlockId,
        term: InstId,
        ast: &AstContext,
        expected_preds: &mut HashMap<BlockId, Vec<BlockId>>,
        errors: &mut Vec<String>,
    ) {
        let is_switch_enum = matches!(self.kind(term), InstKind::SwitchEnum { .. });
        for edge in self.successor_edges(term) {
            let dest = edge.dest;
            if !self.is_block_live(dest) || !self.is_laid_out(dest) {
                errors.push(format!("{} branches to {} which is not in the function", block, dest));
                continue;
            }
            expected_preds.entry(dest).or_default().push(block);

            let dest_args = self.block_args(dest);
            if is_switch_enum {
                // A payload argument is produced by the switch itself
                if dest_args.len() > 1 {
                    errors.push(format!("switch_enum destination {} takes more than one argument", dest));
                }
                if !dest_args.is_empty() && self.preds(dest).len() != 1 {
                    errors.push(format!(
                        "{} receives a switch_enum payload but has several predecessors",
                        dest
                    ));
                }
                continue;
            }
            let passed = &self.operands(term)[edge.args.clone()];
            if passed.len() != dest_args.len() {
                errors.push(format!(
                    "{} passes {} arguments to {} which takes {}",
                    block,
                    passed.len(),
                    dest,
                    dest_args.len()
                ));
                continue;
            }
            for (i, (value, arg)) in passed.iter().zip(dest_args).enumerate() {
                if self.value_type(*value) != self.value_type(*arg) {
                    errors.push(format!(
                        "argument {} passed from {} to {} has type {}, expected {}",
                        i,
                        block,
                        dest,
                        self.value_type(*value).display(ast),
                        self.value_type(*arg).display(ast)
                    ));
                }
            }
        }
    }

    fn verify_dominance(&self, errors: &mut Vec<String>) {
        let dom = DominanceInfo::compute(self);
        for &block in dom.reverse_post_order() {
            for &inst in self.block_insts(block) {
                for op in self.operands(inst) {
                    if !dom.value_dominates_inst(self, *op, inst) {
                        errors.push(format!("{} in {} is used before it is defined", op, block));
                    }
                }
            }
        }
    }

    /// Deep comparison of two function bodies: block order, arguments with
    /// their ownership, and instructions with operands mapped by position.
    /// Function, global and declaration handles are compared as they are, so
    /// both functions must come from modules numbered the same way.
    pub fn structurally_equal(&self, other: &Function) -> bool {
        if self.name != other.name
            || self.ty != other.ty
            || self.linkage != other.linkage
            || self.attrs != other.attrs
            || self.block_count() != other.block_count()
        {
            return false;
        }

        let mut blocks = HashMap::new();
        let mut values = HashMap::new();
        for (a, b) in self.layout().iter().zip(other.layout()) {
            blocks.insert(*a, *b);
            let (args_a, args_b) = (self.block_args(*a), other.block_args(*b));
            let (insts_a, insts_b) = (self.block_insts(*a), other.block_insts(*b));
            if args_a.len() != args_b.len() || insts_a.len() != insts_b.len() {
                return false;
            }
            for (x, y) in args_a.iter().zip(args_b) {
                if self.value_type(*x) != other.value_type(*y) || self.ownership(*x) != other.ownership(*y) {
                    return false;
                }
                values.insert(*x, *y);
            }
            for (i, j) in insts_a.iter().zip(insts_b) {
                let (results_a, results_b) = (self.results(*i), other.results(*j));
                if results_a.len() != results_b.len() {
                    return false;
                }
                for (x, y) in results_a.iter().zip(results_b) {
                    if self.value_type(*x) != other.value_type(*y) || self.ownership(*x) != other.ownership(*y) {
                        return false;
                    }
                    values.insert(*x, *y);
                }
            }
        }

        for (a, b) in self.layout().iter().zip(other.layout()) {
            for (i, j) in self.block_insts(*a).iter().zip(other.block_insts(*b)) {
                let (da, db) = (self.inst(*i), other.inst(*j));
                let mut kind = da.kind.clone();
                kind.map_successors(|s| blocks.get(&s).copied().unwrap_or(s));
                if kind != db.kind || da.loc != db.loc || da.scope != db.scope {
                    return false;
                }
                if da.operands().len() != db.operands().len() {
                    return false;
                }
                for (x, y) in da.operands().iter().zip(db.operands()) {
                    let same = match values.get(x) {
                        Some(mapped) => mapped == y,
                        None => {
                            self.is_undef(*x) && other.is_undef(*y) && self.value_type(*x) == other.value_type(*y)
                        }
                    };
                    if !same {
                        return false;
                    }
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::frontend::parse_sil;
    use crate::types::{OwnershipKind, SilType};

    const SOURCE: &str = "sil @f : $@convention(thin) (Builtin.Int1) -> Builtin.Int64 {
bb0(%0 : $Builtin.Int1):
  %1 = integer_literal $Builtin.Int64, 7
  cond_br %0, bb1(%1 : $Builtin.Int64), bb2

bb1(%2 : $Builtin.Int64):
  return %2 : $Builtin.Int64

bb2:
  return %1 : $Builtin.Int64
}
";

    #[test]
    fn test_parsed_function_verifies() {
        let module = parse_sil(SOURCE).unwrap();
        let f = module.function(module.find_function("f").unwrap());
        assert!(f.verify(&module.ast).is_empty());
    }

    #[test]
    fn test_detects_argument_count_mismatch() {
        let mut module = parse_sil(SOURCE).unwrap();
        let id = module.find_function("f").unwrap();
        let (f, ast) = module.function_and_ast_mut(id);
        let bb2 = f.layout()[2];
        f.add_block_arg(bb2, SilType::int(64), OwnershipKind::None);
        let errors = f.verify(ast);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("passes 0 arguments"));
    }

    #[test]
    fn test_use_before_definition() {
        let errors = match parse_sil(
            "sil @f : $@convention(thin) () -> (()) {
bb0:
  br bb1

bb1:
  %0 = tuple (%1 : $())
  %1 = tuple ()
  return %0 : $(())
}
",
        ) {
            Ok(_) => panic!("expected a verifier failure"),
            Err(diags) => diags,
        };
        assert!(errors[0].to_string().contains("used before it is defined"));
    }

    #[test]
    fn test_structural_equality() {
        let a = parse_sil(SOURCE).unwrap();
        let b = parse_sil(SOURCE).unwrap();
        let fa = a.function(a.find_function("f").unwrap());
        let fb = b.function(b.find_function("f").unwrap());
        assert!(fa.structurally_equal(fb));

        let c = parse_sil(&SOURCE.replace("7", "8")).unwrap();
        let fc = c.function(c.find_function("f").unwrap());
        assert!(!fa.structurally_equal(fc));
    }
}
