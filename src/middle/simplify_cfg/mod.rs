//! CFG simplification
//!
//! A worklist-driven rewrite system over one function at a time. Local rules
//! (dead blocks, block merging, trampolines, constant terminators, dead and
//! trivial arguments, jump threading) run to a fixed point; a bounded
//! dominator-based phase then propagates branch conditions into the regions
//! they control and threads edges whose outcome is known. The pass finishes
//! by splitting the critical edges of switch-like terminators and by turning
//! a `switch_enum` default that can only mean one case into that case.
//!
//! Running the pass on its own output changes nothing.

mod arguments;
mod dominator;
mod local;
mod options;
mod switches;
mod threading;
mod worklist;

use std::collections::HashSet;

use log::{debug, trace};

use crate::ast::AstContext;
use crate::middle::cfg;
use crate::middle::ir::{BlockId, Function, InstKind, ValueId};
use crate::middle::loops::find_loop_headers;
use crate::sil_invariant;
use crate::types::SilType;

pub use options::{SimplifyCfgOptions, SimplifyCfgStats};
pub use worklist::BlockWorklist;

/// The simplify-cfg pass. Statistics accumulate over every function it
/// runs on.
#[derive(Debug, Default)]
pub struct SimplifyCfg {
    options: SimplifyCfgOptions,
    stats: SimplifyCfgStats,
}

impl SimplifyCfg {
    pub fn new(options: SimplifyCfgOptions) -> Self {
        Self {
            options,
            stats: SimplifyCfgStats::default(),
        }
    }

    pub fn options(&self) -> &SimplifyCfgOptions {
        &self.options
    }

    pub fn stats(&self) -> &SimplifyCfgStats {
        &self.stats
    }

    pub fn take_stats(&mut self) -> SimplifyCfgStats {
        std::mem::take(&mut self.stats)
    }

    /// Simplify one function in place. Returns whether anything changed.
    pub fn run(&mut self, func: &mut Function, ast: &AstContext) -> bool {
        if !func.is_definition() {
            return false;
        }
        debug!("simplify-cfg: @{} ({} blocks)", func.name, func.block_count());
        let changed = Simplifier::new(func, ast, &self.options, &mut self.stats).run();
        if changed {
            self.stats.functions_changed += 1;
        }
        changed
    }
}

/// Per-invocation state shared by all rewrite rules
struct Simplifier<'a> {
    func: &'a mut Function,
    ast: &'a AstContext,
    options: &'a SimplifyCfgOptions,
    stats: &'a mut SimplifyCfgStats,
    worklist: BlockWorklist,
    loop_headers: HashSet<BlockId>,
}

impl<'a> Simplifier<'a> {
    fn new(
        func: &'a mut Function,
        ast: &'a AstContext,
        options: &'a SimplifyCfgOptions,
        stats: &'a mut SimplifyCfgStats,
    ) -> Self {
        Self {
            func,
            ast,
            options,
            stats,
            worklist: BlockWorklist::new(),
            loop_headers: HashSet::new(),
        }
    }

    fn run(&mut self) -> bool {
        let mut changed = self.remove_unreachable_blocks();
        self.loop_headers = find_loop_headers(self.func);

        changed |= self.split_aggregate_args();
        self.verify_phase("argument splitting");

        if self.simplify_blocks() {
            self.remove_unreachable_blocks();
            changed = true;
        }
        self.verify_phase("local simplification");

        if self.options.enable_dominator_simplify && self.dominator_based_simplify() {
            changed = true;
        }
        self.verify_phase("dominator-based simplification");

        if self.simplify_blocks() {
            self.remove_unreachable_blocks();
            changed = true;
        }

        if self.tail_duplicate_objc_method_successors() {
            changed = true;
            if self.simplify_blocks() {
                self.remove_unreachable_blocks();
            }
        }
        self.verify_phase("tail duplication");

        let before = self.func.block_count();
        if cfg::split_critical_edges(self.func, true) {
            self.stats.critical_edges_split += self.func.block_count() - before;
            changed = true;
        }

        changed |= self.canonicalize_switch_enums();
        self.verify_phase("switch canonicalization");
        changed
    }

    /// Drive the local rules until the worklist drains
    fn simplify_blocks(&mut self) -> bool {
        for &block in self.func.layout().iter().rev() {
            self.worklist.add(block);
        }
        let mut changed = false;
        while let Some(block) = self.worklist.pop() {
            if !self.func.is_block_live(block) || !self.func.is_laid_out(block) {
                continue;
            }
            if self.simplify_block(block) {
                changed = true;
            }
        }
        changed
    }

    fn remove_unreachable_blocks(&mut self) -> bool {
        let removed = cfg::remove_unreachable_blocks(self.func);
        for block in &removed {
            self.worklist.remove(*block);
            self.loop_headers.remove(block);
        }
        self.stats.unreachable_blocks_removed += removed.len();
        !removed.is_empty()
    }

    /// Delete a block that lost its last predecessor
    fn remove_dead_block(&mut self, block: BlockId) {
        trace!("dead block {}", block);
        for succ in self.func.successors(block) {
            if succ != block {
                self.worklist.add(succ);
            }
        }
        if let Some(term) = self.func.terminator(block) {
            self.func.erase_inst(term);
        }
        self.func.erase_block(block);
        self.worklist.remove(block);
        self.loop_headers.remove(&block);
        self.stats.dead_blocks_removed += 1;
    }

    /// Queue a block whose predecessor set shrank
    fn simplify_after_dropping_predecessor(&mut self, block: BlockId) {
        self.worklist.add(block);
        for succ in self.func.successors(block) {
            self.worklist.add(succ);
        }
    }

    fn add_successors(&mut self, block: BlockId) {
        for succ in self.func.successors(block) {
            self.worklist.add(succ);
        }
    }

    /// Create an `integer_literal` of type `Builtin.Int1` at the start of
    /// `block`
    fn int1_literal_at_start(&mut self, block: BlockId, value: bool) -> ValueId {
        let lit = self.func.create_inst(
            InstKind::IntegerLiteral {
                value: if value { 1 } else { 0 },
            },
            Vec::new(),
            vec![SilType::int(1)],
            self.ast,
        );
        self.func.insert_inst_at(block, 0, lit);
        self.func.result(lit)
    }

    fn verify_phase(&self, phase: &str) {
        if !self.options.verify_after_each_phase {
            return;
        }
        let errors = self.func.verify(self.ast);
        sil_invariant!(
            errors.is_empty(),
            "simplify-cfg left @{} malformed after {}: {}",
            self.func.name,
            phase,
            errors.join("; ")
        );
    }
}

/// `x` when `value` is `builtin "xor_Int1"(x, true)` in either operand order
fn inverted_condition(func: &Function, value: ValueId) -> Option<ValueId> {
    let inst = func.defining_inst(value)?;
    let InstKind::Builtin { name } = func.kind(inst) else {
        return None;
    };
    if name != "xor_Int1" {
        return None;
    }
    match func.operands(inst) {
        [x, y] if is_true_literal(func, *y) => Some(*x),
        [x, y] if is_true_literal(func, *x) => Some(*y),
        _ => None,
    }
}

/// An `Int1` literal with its bit set (`1` or `-1`)
fn is_true_literal(func: &Function, value: ValueId) -> bool {
    func.value_type(value).is_int1() && func.integer_literal(value).is_some_and(|v| v & 1 == 1)
}

/// Number of instructions that are not free to duplicate
fn duplication_cost(func: &Function, block: BlockId) -> usize {
    func.block_insts(block)
        .iter()
        .filter(|i| !func.kind(**i).is_free())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse_sil;
    use crate::middle::ir::SilModule;

    /// Run the pass on `@f`, check the result verifies and that a second
    /// run leaves it alone
    fn simplify(source: &str) -> (SilModule, SimplifyCfgStats) {
        let mut module = parse_sil(source).unwrap();
        let id = module.find_function("f").unwrap();
        let (f, ast) = module.function_and_ast_mut(id);
        let mut pass = SimplifyCfg::new(SimplifyCfgOptions {
            verify_after_each_phase: true,
            ..Default::default()
        });
        assert!(pass.run(f, ast));
        let errors = f.verify(ast);
        assert!(errors.is_empty(), "{:?}", errors);

        let snapshot = f.clone();
        assert!(!pass.run(f, ast), "second run changed @f");
        assert!(f.structurally_equal(&snapshot));
        (module, pass.take_stats())
    }

    fn function(module: &SilModule) -> &Function {
        module.function(module.find_function("f").unwrap())
    }

    fn count(f: &Function, pred: impl Fn(&InstKind) -> bool) -> usize {
        f.all_insts().iter().filter(|i| pred(f.kind(**i))).count()
    }

    #[test]
    fn test_constant_branch_folds_to_one_block() {
        let (module, stats) = simplify(
            "sil @f : $@convention(thin) () -> Builtin.Int64 {
bb0:
  %0 = integer_literal $Builtin.Int1, 1
  cond_br %0, bb1, bb2

bb1:
  %1 = integer_literal $Builtin.Int64, 1
  return %1 : $Builtin.Int64

bb2:
  %2 = integer_literal $Builtin.Int64, 2
  return %2 : $Builtin.Int64
}
",
        );
        let f = function(&module);
        assert_eq!(f.block_count(), 1);
        let ret = f.expect_terminator(f.entry());
        assert_eq!(f.integer_literal(f.operand(ret, 0)), Some(1));
        assert_eq!(count(f, |k| matches!(k, InstKind::IntegerLiteral { .. })), 1);
        assert_eq!(stats.terminators_folded, 1);
        assert_eq!(stats.blocks_merged, 1);
    }

    #[test]
    fn test_dead_argument_on_double_edge() {
        let (module, stats) = simplify(
            "sil @f : $@convention(thin) (Builtin.Int1, Builtin.Int64) -> () {
bb0(%0 : $Builtin.Int1, %1 : $Builtin.Int64):
  %2 = integer_literal $Builtin.Int64, 7
  cond_br %0, bb1(%1 : $Builtin.Int64), bb1(%2 : $Builtin.Int64)

bb1(%3 : $Builtin.Int64):
  %4 = tuple ()
  return %4 : $()
}
",
        );
        let f = function(&module);
        assert_eq!(f.block_count(), 1);
        assert_eq!(stats.dead_arguments_removed, 1);
        assert_eq!(count(f, |k| matches!(k, InstKind::IntegerLiteral { .. })), 0);
    }

    #[test]
    fn test_cond_br_skips_trampoline() {
        let (module, stats) = simplify(
            "sil @f : $@convention(thin) (Builtin.Int1, Builtin.NativeObject) -> () {
bb0(%0 : $Builtin.Int1, %1 : $Builtin.NativeObject):
  cond_br %0, bb1, bb2

bb1:
  br bb3

bb2:
  strong_retain %1 : $Builtin.NativeObject
  br bb3

bb3:
  %2 = tuple ()
  return %2 : $()
}
",
        );
        let f = function(&module);
        assert_eq!(f.block_count(), 3);
        assert_eq!(stats.trampolines_collapsed, 1);
        let term = f.expect_terminator(f.entry());
        let InstKind::CondBr { true_dest, .. } = *f.kind(term) else {
            panic!("entry should still end in cond_br");
        };
        assert!(matches!(f.kind(f.expect_terminator(true_dest)), InstKind::Return));
    }

    #[test]
    fn test_jump_threading_folds_known_conditions() {
        let (module, stats) = simplify(
            "sil @f : $@convention(thin) (Builtin.Int1, Builtin.Int64, Builtin.Int64) -> Builtin.Int64 {
bb0(%0 : $Builtin.Int1, %1 : $Builtin.Int64, %2 : $Builtin.Int64):
  cond_br %0, bb1, bb2

bb1:
  %3 = integer_literal $Builtin.Int1, 1
  br bb3(%3 : $Builtin.Int1)

bb2:
  %4 = integer_literal $Builtin.Int1, 0
  br bb3(%4 : $Builtin.Int1)

bb3(%5 : $Builtin.Int1):
  cond_br %5, bb4, bb5

bb4:
  return %1 : $Builtin.Int64

bb5:
  return %2 : $Builtin.Int64
}
",
        );
        let f = function(&module);
        assert!(stats.jumps_threaded >= 1);
        assert_eq!(f.block_count(), 3);
        assert_eq!(count(f, |k| matches!(k, InstKind::CondBr { .. })), 1);
        assert_eq!(count(f, |k| matches!(k, InstKind::Return)), 2);
    }

    #[test]
    fn test_condition_known_in_dominated_block() {
        let (module, stats) = simplify(
            "sil @f : $@convention(thin) (Builtin.Int1, Builtin.NativeObject) -> () {
bb0(%0 : $Builtin.Int1, %1 : $Builtin.NativeObject):
  cond_br %0, bb1, bb2

bb1:
  strong_retain %1 : $Builtin.NativeObject
  cond_br %0, bb3, bb2

bb2:
  strong_release %1 : $Builtin.NativeObject
  br bb3

bb3:
  %2 = tuple ()
  return %2 : $()
}
",
        );
        let f = function(&module);
        assert!(stats.values_propagated >= 1);
        assert_eq!(count(f, |k| matches!(k, InstKind::CondBr { .. })), 1);
        assert_eq!(f.block_count(), 4);
    }

    #[test]
    fn test_dominator_threading_reaches_merge_terminator() {
        let (module, stats) = simplify(
            "sil @f : $@convention(thin) (Builtin.Int1, Builtin.NativeObject) -> Builtin.Int64 {
bb0(%0 : $Builtin.Int1, %1 : $Builtin.NativeObject):
  cond_br %0, bb1, bb2

bb1:
  strong_retain %1 : $Builtin.NativeObject
  br bb2

bb2:
  cond_br %0, bb3, bb4

bb3:
  %2 = integer_literal $Builtin.Int64, 1
  return %2 : $Builtin.Int64

bb4:
  %3 = integer_literal $Builtin.Int64, 2
  return %3 : $Builtin.Int64
}
",
        );
        let f = function(&module);
        assert!(stats.jumps_threaded >= 1);
        assert_eq!(count(f, |k| matches!(k, InstKind::CondBr { .. })), 1);
        assert_eq!(f.block_count(), 3);
    }

    #[test]
    fn test_switch_enum_becomes_select() {
        let (module, stats) = simplify(
            "enum E {
  case a
  case b
  case c
}

sil @f : $@convention(thin) (E) -> Builtin.Int64 {
bb0(%0 : $E):
  switch_enum %0 : $E, case #E.a!enumelt: bb1, case #E.b!enumelt: bb2, default bb3

bb1:
  %1 = integer_literal $Builtin.Int64, 10
  br bb4(%1 : $Builtin.Int64)

bb2:
  %2 = integer_literal $Builtin.Int64, 20
  br bb4(%2 : $Builtin.Int64)

bb3:
  %3 = integer_literal $Builtin.Int64, 30
  br bb4(%3 : $Builtin.Int64)

bb4(%4 : $Builtin.Int64):
  return %4 : $Builtin.Int64
}
",
        );
        let f = function(&module);
        assert_eq!(stats.switches_to_select, 1);
        assert_eq!(f.block_count(), 1);
        assert_eq!(
            count(f, |k| matches!(k, InstKind::SelectEnum { has_default: true, .. })),
            1
        );
        assert_eq!(count(f, |k| matches!(k, InstKind::SwitchEnum { .. })), 0);
    }

    #[test]
    fn test_default_covering_one_case_is_named() {
        let (module, stats) = simplify(
            "enum E {
  case a
  case b(Builtin.Int64)
}

sil @f : $@convention(thin) (E, Builtin.NativeObject) -> () {
bb0(%0 : $E, %1 : $Builtin.NativeObject):
  switch_enum %0 : $E, case #E.a!enumelt: bb1, default bb2

bb1:
  strong_retain %1 : $Builtin.NativeObject
  br bb3

bb2:
  strong_release %1 : $Builtin.NativeObject
  br bb3

bb3:
  %2 = tuple ()
  return %2 : $()
}
",
        );
        let f = function(&module);
        assert_eq!(stats.switches_canonicalized, 1);
        let term = f.expect_terminator(f.entry());
        let InstKind::SwitchEnum { cases, default } = f.kind(term) else {
            panic!("entry should still end in switch_enum");
        };
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[1].0, 1);
        assert_eq!(*default, None);
    }

    #[test]
    fn test_tuple_argument_is_split() {
        let (module, stats) = simplify(
            "sil @f : $@convention(thin) (Builtin.Int1, Builtin.NativeObject, Builtin.NativeObject) -> Builtin.NativeObject {
bb0(%0 : $Builtin.Int1, %1 : $Builtin.NativeObject, %2 : $Builtin.NativeObject):
  cond_br %0, bb1, bb2

bb1:
  %3 = tuple (%1 : $Builtin.NativeObject, %2 : $Builtin.NativeObject)
  strong_retain %1 : $Builtin.NativeObject
  br bb3(%3 : $(Builtin.NativeObject, Builtin.NativeObject))

bb2:
  %4 = tuple (%2 : $Builtin.NativeObject, %1 : $Builtin.NativeObject)
  strong_retain %2 : $Builtin.NativeObject
  br bb3(%4 : $(Builtin.NativeObject, Builtin.NativeObject))

bb3(%5 : $(Builtin.NativeObject, Builtin.NativeObject)):
  %6 = tuple_extract %5 : $(Builtin.NativeObject, Builtin.NativeObject), 0
  return %6 : $Builtin.NativeObject
}
",
        );
        let f = function(&module);
        assert_eq!(stats.arguments_split, 1);
        assert_eq!(stats.dead_arguments_removed, 1);
        assert_eq!(count(f, |k| matches!(k, InstKind::Tuple | InstKind::TupleExtract { .. })), 0);
        let merge = f.layout()[3];
        assert_eq!(f.block_args(merge).len(), 1);
        assert!(!matches!(f.value_type(f.block_args(merge)[0]).ty, crate::types::Type::Tuple(_)));
    }

    #[test]
    fn test_cond_fail_moves_into_predecessors() {
        let (module, stats) = simplify(
            "sil @f : $@convention(thin) (Builtin.Int1, Builtin.Int1, Builtin.NativeObject) -> () {
bb0(%0 : $Builtin.Int1, %1 : $Builtin.Int1, %2 : $Builtin.NativeObject):
  cond_br %0, bb1, bb2

bb1:
  strong_retain %2 : $Builtin.NativeObject
  %3 = integer_literal $Builtin.Int1, 0
  br bb3(%3 : $Builtin.Int1)

bb2:
  strong_release %2 : $Builtin.NativeObject
  br bb3(%1 : $Builtin.Int1)

bb3(%4 : $Builtin.Int1):
  cond_fail %4 : $Builtin.Int1
  %5 = tuple ()
  return %5 : $()
}
",
        );
        let f = function(&module);
        assert_eq!(stats.cond_fails_hoisted, 1);
        assert_eq!(stats.cond_fails_removed, 1);
        assert_eq!(count(f, |k| matches!(k, InstKind::CondFail { .. })), 1);
        let merge = f.layout()[3];
        assert!(f.block_args(merge).is_empty());
    }

    #[test]
    fn test_release_after_objc_call_is_duplicated() {
        let (module, stats) = simplify(
            "class K {
  func m
}

sil @f : $@convention(thin) (Builtin.Int1, K, Builtin.NativeObject) -> () {
bb0(%0 : $Builtin.Int1, %1 : $K, %2 : $Builtin.NativeObject):
  cond_br %0, bb1, bb2

bb1:
  %3 = objc_method %1 : $K, #K.m!foreign : $@convention(objc_method) (K) -> ()
  %4 = apply %3(%1) : $@convention(objc_method) (K) -> ()
  br bb3

bb2:
  strong_retain %2 : $Builtin.NativeObject
  br bb3

bb3:
  strong_release %2 : $Builtin.NativeObject
  %5 = tuple ()
  return %5 : $()
}
",
        );
        let f = function(&module);
        assert_eq!(stats.blocks_tail_duplicated, 1);
        assert_eq!(f.block_count(), 3);
        assert_eq!(count(f, |k| matches!(k, InstKind::StrongRelease)), 2);
    }

    /// Run the pass to a fixed point on `@f` and check it stays verified
    fn assert_stable(source: &str) {
        let mut module = parse_sil(source).unwrap();
        let id = module.find_function("f").unwrap();
        let (f, ast) = module.function_and_ast_mut(id);
        let mut pass = SimplifyCfg::new(SimplifyCfgOptions {
            verify_after_each_phase: true,
            ..Default::default()
        });
        pass.run(f, ast);
        let errors = f.verify(ast);
        assert!(errors.is_empty(), "{:?}", errors);

        let snapshot = f.clone();
        assert!(!pass.run(f, ast), "second run changed @f");
        assert!(f.structurally_equal(&snapshot));
    }

    #[test]
    fn test_unreachable_and_loop_functions_are_stable() {
        assert_stable(
            "sil @f : $@convention(thin) () -> () {
bb0:
  unreachable
}
",
        );
        assert_stable(
            "sil @f : $@convention(thin) (Builtin.Int1) -> () {
bb0(%0 : $Builtin.Int1):
  br bb1

bb1:
  cond_br %0, bb1, bb2

bb2:
  %1 = tuple ()
  return %1 : $()
}
",
        );
        assert_stable(
            "sil @f : $@convention(thin) (Builtin.Int1) -> () {
bb0(%0 : $Builtin.Int1):
  cond_br %0, bb1, bb2

bb1:
  br bb3

bb2:
  unreachable

bb3:
  %1 = tuple ()
  return %1 : $()
}
",
        );
    }

    #[test]
    fn test_declarations_are_left_alone() {
        let mut module = parse_sil("sil @f : $@convention(thin) () -> ()\n").unwrap();
        let id = module.find_function("f").unwrap();
        let (f, ast) = module.function_and_ast_mut(id);
        let mut pass = SimplifyCfg::default();
        assert!(!pass.run(f, ast));
        assert_eq!(pass.stats().functions_changed, 0);
    }
}
