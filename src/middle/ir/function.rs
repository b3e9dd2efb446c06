//! SIL functions: block, instruction and value arenas

use std::collections::HashMap;

use crate::ast::{AstContext, DeclId};
use crate::middle::ir::{
    BlockId, FunctionAttributes, InstId, InstKind, ScopeId, SilLinkage, SourceLoc, SuccessorEdge,
    Use, ValueDef, ValueId,
};
use crate::types::{FunctionType, OwnershipKind, SilType};
use crate::{invariant_violation, sil_invariant};

/// Role of a block argument, derived from the block's position in the CFG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    /// Entry block argument bound by the caller
    FunctionArgument,
    /// Produced by the single predecessor's terminator (a `switch_enum`
    /// payload)
    TerminatorResult,
    /// Receives one value per incoming edge
    Phi,
}

#[derive(Debug, Clone, Default)]
struct BlockData {
    args: Vec<ValueId>,
    insts: Vec<InstId>,
    /// One entry per incoming edge
    preds: Vec<BlockId>,
    in_layout: bool,
}

#[derive(Debug, Clone)]
pub struct InstData {
    pub kind: InstKind,
    operands: Vec<ValueId>,
    results: Vec<ValueId>,
    block: Option<BlockId>,
    pub loc: Option<SourceLoc>,
    pub scope: Option<ScopeId>,
}

impl InstData {
    pub fn operands(&self) -> &[ValueId] {
        &self.operands
    }

    pub fn results(&self) -> &[ValueId] {
        &self.results
    }

    pub fn block(&self) -> Option<BlockId> {
        self.block
    }
}

#[derive(Debug, Clone)]
struct ValueData {
    ty: SilType,
    def: ValueDef,
    ownership: OwnershipKind,
    uses: Vec<Use>,
}

/// A SIL function. A function without blocks is a declaration.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub ty: FunctionType,
    pub linkage: SilLinkage,
    pub attrs: FunctionAttributes,
    /// Front-end declaration this function implements, if any
    pub decl: Option<DeclId>,
    blocks: Vec<Option<BlockData>>,
    layout: Vec<BlockId>,
    insts: Vec<Option<InstData>>,
    values: Vec<ValueData>,
    undefs: HashMap<SilType, ValueId>,
}

impl Function {
    pub fn new(name: impl Into<String>, ty: FunctionType) -> Self {
        Self {
            name: name.into(),
            ty,
            linkage: SilLinkage::Public,
            attrs: FunctionAttributes::empty(),
            decl: None,
            blocks: Vec::new(),
            layout: Vec::new(),
            insts: Vec::new(),
            values: Vec::new(),
            undefs: HashMap::new(),
        }
    }

    pub fn is_definition(&self) -> bool {
        !self.layout.is_empty()
    }

    pub fn is_ossa(&self) -> bool {
        self.attrs.contains(FunctionAttributes::OSSA)
    }

    // ==================== Blocks ====================

    /// Create a block that is not yet part of the layout
    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Some(BlockData::default()));
        id
    }

    /// Create a block at the end of the layout
    pub fn append_block(&mut self) -> BlockId {
        let id = self.new_block();
        self.layout_block(id);
        id
    }

    /// Create a block placed right after `after` in the layout
    pub fn insert_block_after(&mut self, after: BlockId) -> BlockId {
        let id = self.new_block();
        let pos = self.layout_position(after) + 1;
        self.layout.insert(pos, id);
        self.block_data_mut(id).in_layout = true;
        id
    }

    pub fn layout_block(&mut self, block: BlockId) {
        let data = self.block_data_mut(block);
        sil_invariant!(!data.in_layout, "{} is already laid out", block);
        data.in_layout = true;
        self.layout.push(block);
    }

    pub fn is_laid_out(&self, block: BlockId) -> bool {
        self.blocks
            .get(block.index())
            .and_then(|b| b.as_ref())
            .is_some_and(|b| b.in_layout)
    }

    /// Blocks in layout order. The first one is the entry block.
    pub fn layout(&self) -> &[BlockId] {
        &self.layout
    }

    pub fn block_count(&self) -> usize {
        self.layout.len()
    }

    pub fn layout_position(&self, block: BlockId) -> usize {
        match self.layout.iter().position(|b| *b == block) {
            Some(pos) => pos,
            None => invariant_violation!("{} is not in the layout", block),
        }
    }

    pub fn entry(&self) -> BlockId {
        match self.layout.first() {
            Some(b) => *b,
            None => invariant_violation!("function '{}' has no body", self.name),
        }
    }

    pub fn is_entry(&self, block: BlockId) -> bool {
        self.layout.first() == Some(&block)
    }

    pub fn is_block_live(&self, block: BlockId) -> bool {
        matches!(self.blocks.get(block.index()), Some(Some(_)))
    }

    fn block_data(&self, block: BlockId) -> &BlockData {
        match self.blocks.get(block.index()) {
            Some(Some(data)) => data,
            _ => invariant_violation!("{} does not exist in '{}'", block, self.name),
        }
    }

    fn block_data_mut(&mut self, block: BlockId) -> &mut BlockData {
        match self.blocks.get_mut(block.index()) {
            Some(Some(data)) => data,
            _ => invariant_violation!("{} does not exist", block),
        }
    }

    pub fn block_args(&self, block: BlockId) -> &[ValueId] {
        &self.block_data(block).args
    }

    pub fn block_insts(&self, block: BlockId) -> &[InstId] {
        &self.block_data(block).insts
    }

    /// Predecessors, one entry per incoming edge
    pub fn preds(&self, block: BlockId) -> &[BlockId] {
        &self.block_data(block).preds
    }

    /// Distinct predecessor blocks in first-edge order
    pub fn unique_preds(&self, block: BlockId) -> Vec<BlockId> {
        let mut out = Vec::new();
        for p in self.preds(block) {
            if !out.contains(p) {
                out.push(*p);
            }
        }
        out
    }

    /// The predecessor when the block has exactly one incoming edge
    pub fn single_pred(&self, block: BlockId) -> Option<BlockId> {
        match self.preds(block) {
            [p] => Some(*p),
            _ => None,
        }
    }

    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        let last = *self.block_insts(block).last()?;
        self.inst(last).kind.is_terminator().then_some(last)
    }

    /// The terminator of a block known to be complete
    pub fn expect_terminator(&self, block: BlockId) -> InstId {
        match self.terminator(block) {
            Some(t) => t,
            None => invariant_violation!("{} in '{}' is missing its terminator", block, self.name),
        }
    }

    /// Successors in edge order
    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.terminator(block)
            .map(|t| self.inst(t).kind.successors())
            .unwrap_or_default()
    }

    pub fn single_successor(&self, block: BlockId) -> Option<BlockId> {
        match self.successors(block).as_slice() {
            [s] => Some(*s),
            _ => None,
        }
    }

    pub fn add_block_arg(&mut self, block: BlockId, ty: SilType, ownership: OwnershipKind) -> ValueId {
        let index = self.block_args(block).len();
        self.insert_block_arg(block, index, ty, ownership)
    }

    pub fn insert_block_arg(
        &mut self,
        block: BlockId,
        index: usize,
        ty: SilType,
        ownership: OwnershipKind,
    ) -> ValueId {
        let value = self.new_value(ty, ValueDef::Arg { block, index }, ownership);
        self.block_data_mut(block).args.insert(index, value);
        self.renumber_args(block, index + 1);
        value
    }

    /// Remove an argument that has no remaining uses. Incoming branch
    /// operands are not touched.
    pub fn erase_block_arg(&mut self, block: BlockId, index: usize) {
        let value = self.block_args(block)[index];
        sil_invariant!(
            !self.has_uses(value),
            "erasing argument {} of {} which still has uses",
            index,
            block
        );
        self.block_data_mut(block).args.remove(index);
        self.values[value.index()].def = ValueDef::Erased;
        self.renumber_args(block, index);
    }

    fn renumber_args(&mut self, block: BlockId, from: usize) {
        let args = self.block_args(block).to_vec();
        for (i, arg) in args.iter().enumerate().skip(from) {
            self.values[arg.index()].def = ValueDef::Arg { block, index: i };
        }
    }

    /// Delete a block and everything in it. Values still used elsewhere
    /// (only possible from unreachable code) are replaced with `undef`.
    pub fn erase_block(&mut self, block: BlockId) {
        let insts = self.block_insts(block).to_vec();
        for inst in &insts {
            self.drop_operands(*inst);
        }
        let mut defined: Vec<ValueId> = self.block_args(block).to_vec();
        for inst in &insts {
            defined.extend_from_slice(self.inst(*inst).results());
        }
        for value in defined {
            if self.has_uses(value) {
                let undef = self.undef(self.value_type(value).clone());
                self.replace_all_uses_with(value, undef);
            }
            self.values[value.index()].def = ValueDef::Erased;
        }
        for inst in insts.into_iter().rev() {
            self.detach_inst(inst);
            self.insts[inst.index()] = None;
        }
        let data = self.block_data(block);
        sil_invariant!(
            data.preds.is_empty() || data.preds.iter().all(|p| *p == block),
            "erasing {} which still has predecessors",
            block
        );
        if data.in_layout {
            self.layout.retain(|b| *b != block);
        }
        self.blocks[block.index()] = None;
    }

    /// Move a block to sit right after `after`
    pub fn move_block_after(&mut self, block: BlockId, after: BlockId) {
        self.layout.retain(|b| *b != block);
        let pos = self.layout_position(after) + 1;
        self.layout.insert(pos, block);
    }

    // ==================== Instructions ====================

    /// Create a detached instruction. Result ownership follows the operand
    /// and opcode rules of ownership SSA.
    pub fn create_inst(
        &mut self,
        kind: InstKind,
        operands: Vec<ValueId>,
        result_types: Vec<SilType>,
        ast: &AstContext,
    ) -> InstId {
        let results = result_types
            .into_iter()
            .map(|ty| {
                let ownership = self.result_ownership(&kind, &operands, &ty, ast);
                (ty, ownership)
            })
            .collect();
        self.create_inst_with_ownership(kind, operands, results)
    }

    pub fn create_inst_with_ownership(
        &mut self,
        kind: InstKind,
        operands: Vec<ValueId>,
        results: Vec<(SilType, OwnershipKind)>,
    ) -> InstId {
        let id = InstId(self.insts.len() as u32);
        for (index, op) in operands.iter().enumerate() {
            self.values[op.index()].uses.push(Use { user: id, index });
        }
        let results = results
            .into_iter()
            .enumerate()
            .map(|(result, (ty, ownership))| {
                self.new_value(ty, ValueDef::Inst { inst: id, result }, ownership)
            })
            .collect();
        self.insts.push(Some(InstData {
            kind,
            operands,
            results,
            block: None,
            loc: None,
            scope: None,
        }));
        id
    }

    fn result_ownership(
        &self,
        kind: &InstKind,
        operands: &[ValueId],
        ty: &SilType,
        ast: &AstContext,
    ) -> OwnershipKind {
        if !self.is_ossa() || ty.is_trivial(ast) {
            return OwnershipKind::None;
        }
        match kind {
            InstKind::Tuple | InstKind::Struct | InstKind::Enum { .. } => {
                OwnershipKind::merge_all(operands.iter().map(|v| self.ownership(*v)))
            }
            InstKind::TupleExtract { .. }
            | InstKind::StructExtract { .. }
            | InstKind::UncheckedEnumData { .. } => self.ownership(operands[0]),
            InstKind::SelectEnum { .. } => {
                OwnershipKind::merge_all(operands[1..].iter().map(|v| self.ownership(*v)))
            }
            InstKind::Apply | InstKind::Load { .. } | InstKind::CopyValue | InstKind::Builtin { .. } => {
                OwnershipKind::Owned
            }
            _ => OwnershipKind::None,
        }
    }

    pub fn append_inst(&mut self, block: BlockId, inst: InstId) {
        let pos = self.block_insts(block).len();
        self.insert_inst_at(block, pos, inst);
    }

    pub fn insert_inst_before(&mut self, anchor: InstId, inst: InstId) {
        let block = self.expect_block_of(anchor);
        let pos = self.inst_position(anchor);
        self.insert_inst_at(block, pos, inst);
    }

    pub fn insert_inst_at(&mut self, block: BlockId, pos: usize, inst: InstId) {
        sil_invariant!(self.inst(inst).block.is_none(), "{} is already placed", inst);
        self.block_data_mut(block).insts.insert(pos, inst);
        self.inst_data_mut(inst).block = Some(block);
        if self.inst(inst).kind.is_terminator() {
            for succ in self.inst(inst).kind.successors() {
                self.block_data_mut(succ).preds.push(block);
            }
        }
    }

    /// Take an instruction out of its block, keeping its operands and uses
    pub fn detach_inst(&mut self, inst: InstId) {
        let Some(block) = self.inst(inst).block else {
            return;
        };
        if self.inst(inst).kind.is_terminator() {
            for succ in self.inst(inst).kind.successors() {
                self.remove_pred_edge(succ, block);
            }
        }
        self.block_data_mut(block).insts.retain(|i| *i != inst);
        self.inst_data_mut(inst).block = None;
    }

    /// Move an instruction to the end of `block`
    pub fn move_inst_to_end(&mut self, inst: InstId, block: BlockId) {
        self.detach_inst(inst);
        self.append_inst(block, inst);
    }

    /// Delete an instruction whose results are unused
    pub fn erase_inst(&mut self, inst: InstId) {
        for r in self.inst(inst).results().to_vec() {
            sil_invariant!(
                !self.has_uses(r),
                "erasing {} ({}) whose result is still used",
                inst,
                self.inst(inst).kind.opcode()
            );
            self.values[r.index()].def = ValueDef::Erased;
        }
        self.drop_operands(inst);
        self.detach_inst(inst);
        self.insts[inst.index()] = None;
    }

    fn drop_operands(&mut self, inst: InstId) {
        let operands = self.inst(inst).operands.clone();
        for (index, op) in operands.iter().enumerate() {
            self.remove_use(*op, Use { user: inst, index });
        }
        self.inst_data_mut(inst).operands.clear();
    }

    pub fn is_inst_live(&self, inst: InstId) -> bool {
        matches!(self.insts.get(inst.index()), Some(Some(_)))
    }

    pub fn inst(&self, inst: InstId) -> &InstData {
        match self.insts.get(inst.index()) {
            Some(Some(data)) => data,
            _ => invariant_violation!("{} does not exist in '{}'", inst, self.name),
        }
    }

    fn inst_data_mut(&mut self, inst: InstId) -> &mut InstData {
        match self.insts.get_mut(inst.index()) {
            Some(Some(data)) => data,
            _ => invariant_violation!("{} does not exist", inst),
        }
    }

    pub fn kind(&self, inst: InstId) -> &InstKind {
        &self.inst(inst).kind
    }

    /// Replace the payload of a non-terminator
    pub fn set_kind(&mut self, inst: InstId, kind: InstKind) {
        sil_invariant!(
            !kind.is_terminator() && !self.kind(inst).is_terminator(),
            "terminators are rewritten with replace_terminator"
        );
        self.inst_data_mut(inst).kind = kind;
    }

    pub fn set_debug_location(&mut self, inst: InstId, loc: Option<SourceLoc>, scope: Option<ScopeId>) {
        let data = self.inst_data_mut(inst);
        data.loc = loc;
        data.scope = scope;
    }

    pub fn operands(&self, inst: InstId) -> &[ValueId] {
        &self.inst(inst).operands
    }

    pub fn operand(&self, inst: InstId, index: usize) -> ValueId {
        self.inst(inst).operands[index]
    }

    pub fn results(&self, inst: InstId) -> &[ValueId] {
        &self.inst(inst).results
    }

    /// The single result of an instruction
    pub fn result(&self, inst: InstId) -> ValueId {
        match self.results(inst) {
            [r] => *r,
            _ => invariant_violation!("{} does not have exactly one result", inst),
        }
    }

    pub fn block_of(&self, inst: InstId) -> Option<BlockId> {
        self.inst(inst).block
    }

    pub fn expect_block_of(&self, inst: InstId) -> BlockId {
        match self.block_of(inst) {
            Some(b) => b,
            None => invariant_violation!("{} is not in a block", inst),
        }
    }

    pub fn inst_position(&self, inst: InstId) -> usize {
        let block = self.expect_block_of(inst);
        match self.block_insts(block).iter().position(|i| *i == inst) {
            Some(pos) => pos,
            None => invariant_violation!("{} missing from its block", inst),
        }
    }

    pub fn set_operand(&mut self, inst: InstId, index: usize, value: ValueId) {
        let old = self.inst(inst).operands[index];
        self.remove_use(old, Use { user: inst, index });
        self.inst_data_mut(inst).operands[index] = value;
        self.values[value.index()].uses.push(Use { user: inst, index });
    }

    /// Insert an operand, shifting later operands
    pub fn insert_operand(&mut self, inst: InstId, index: usize, value: ValueId) {
        let len = self.operands(inst).len();
        for i in (index..len).rev() {
            let op = self.operand(inst, i);
            self.retarget_use(op, Use { user: inst, index: i }, i + 1);
        }
        self.inst_data_mut(inst).operands.insert(index, value);
        self.values[value.index()].uses.push(Use { user: inst, index });
    }

    /// Remove an operand, shifting later operands
    pub fn remove_operand(&mut self, inst: InstId, index: usize) {
        let old = self.operand(inst, index);
        self.remove_use(old, Use { user: inst, index });
        self.inst_data_mut(inst).operands.remove(index);
        let len = self.operands(inst).len();
        for i in index..len {
            let op = self.operand(inst, i);
            self.retarget_use(op, Use { user: inst, index: i + 1 }, i);
        }
    }

    /// Copy an instruction into a detached one, mapping its operands and
    /// successors. Results are recorded in `value_map`.
    pub fn clone_inst(
        &mut self,
        inst: InstId,
        value_map: &mut HashMap<ValueId, ValueId>,
        block_map: &HashMap<BlockId, BlockId>,
    ) -> InstId {
        let data = self.inst(inst).clone();
        let mut kind = data.kind.clone();
        kind.map_successors(|b| block_map.get(&b).copied().unwrap_or(b));
        let operands = data
            .operands
            .iter()
            .map(|v| value_map.get(v).copied().unwrap_or(*v))
            .collect();
        let results = data
            .results
            .iter()
            .map(|r| (self.value_type(*r).clone(), self.ownership(*r)))
            .collect();
        let new = self.create_inst_with_ownership(kind, operands, results);
        for (old_result, new_result) in data.results.iter().zip(self.results(new).to_vec()) {
            value_map.insert(*old_result, new_result);
        }
        self.set_debug_location(new, data.loc, data.scope);
        new
    }

    /// Build a terminator at the end of `block`, erasing the current one
    /// and carrying over its debug location.
    pub fn replace_terminator(&mut self, block: BlockId, kind: InstKind, operands: Vec<ValueId>) -> InstId {
        sil_invariant!(kind.is_terminator(), "{} is not a terminator", kind.opcode());
        let (loc, scope) = match self.terminator(block) {
            Some(old) => {
                let data = self.inst(old);
                let saved = (data.loc.clone(), data.scope);
                self.erase_inst(old);
                saved
            }
            None => (None, None),
        };
        let new = self.create_inst_with_ownership(kind, operands, Vec::new());
        self.set_debug_location(new, loc, scope);
        self.append_inst(block, new);
        new
    }

    /// Instructions of every laid-out block, in layout order
    pub fn all_insts(&self) -> Vec<InstId> {
        self.layout
            .iter()
            .flat_map(|b| self.block_insts(*b).iter().copied())
            .collect()
    }

    // ==================== Edges ====================

    pub fn successor_edges(&self, term: InstId) -> Vec<SuccessorEdge> {
        let data = self.inst(term);
        data.kind.successor_edges(data.operands.len())
    }

    pub fn edge_args(&self, term: InstId, edge: usize) -> Vec<ValueId> {
        let edges = self.successor_edges(term);
        self.operands(term)[edges[edge].args.clone()].to_vec()
    }

    /// Point one edge of a terminator at a new destination. Branch
    /// arguments are left as they are.
    pub fn set_successor(&mut self, term: InstId, edge: usize, dest: BlockId) {
        let block = self.expect_block_of(term);
        let old = self.inst(term).kind.successors()[edge];
        self.remove_pred_edge(old, block);
        self.inst_data_mut(term).kind.set_successor(edge, dest);
        self.block_data_mut(dest).preds.push(block);
    }

    /// Drop argument `arg` from the operands passed along `edge`
    pub fn remove_edge_arg(&mut self, term: InstId, edge: usize, arg: usize) {
        let edges = self.successor_edges(term);
        let range = edges[edge].args.clone();
        sil_invariant!(arg < range.len(), "edge {} of {} has no argument {}", edge, term, arg);
        self.remove_operand(term, range.start + arg);
        if let InstKind::CondBr { true_arg_count, .. } = &mut self.inst_data_mut(term).kind {
            if edge == 0 {
                *true_arg_count -= 1;
            }
        }
    }

    /// Append an operand to the arguments passed along `edge`
    pub fn push_edge_arg(&mut self, term: InstId, edge: usize, value: ValueId) {
        let edges = self.successor_edges(term);
        sil_invariant!(
            matches!(self.kind(term), InstKind::Br { .. } | InstKind::CondBr { .. }),
            "{} cannot carry branch arguments",
            self.kind(term).opcode()
        );
        self.insert_operand(term, edges[edge].args.end, value);
        if let InstKind::CondBr { true_arg_count, .. } = &mut self.inst_data_mut(term).kind {
            if edge == 0 {
                *true_arg_count += 1;
            }
        }
    }

    fn remove_pred_edge(&mut self, block: BlockId, pred: BlockId) {
        if !self.is_block_live(block) {
            return;
        }
        let preds = &mut self.block_data_mut(block).preds;
        match preds.iter().position(|p| *p == pred) {
            Some(pos) => {
                preds.remove(pos);
            }
            None => invariant_violation!("{} is not a predecessor of {}", pred, block),
        }
    }

    // ==================== Values ====================

    fn new_value(&mut self, ty: SilType, def: ValueDef, ownership: OwnershipKind) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueData {
            ty,
            def,
            ownership,
            uses: Vec::new(),
        });
        id
    }

    pub fn value_type(&self, value: ValueId) -> &SilType {
        &self.values[value.index()].ty
    }

    pub fn value_def(&self, value: ValueId) -> ValueDef {
        self.values[value.index()].def
    }

    pub fn ownership(&self, value: ValueId) -> OwnershipKind {
        self.values[value.index()].ownership
    }

    pub fn set_ownership(&mut self, value: ValueId, ownership: OwnershipKind) {
        self.values[value.index()].ownership = ownership;
    }

    pub fn uses(&self, value: ValueId) -> &[Use] {
        &self.values[value.index()].uses
    }

    pub fn has_uses(&self, value: ValueId) -> bool {
        !self.uses(value).is_empty()
    }

    pub fn single_use(&self, value: ValueId) -> Option<Use> {
        match self.uses(value) {
            [u] => Some(*u),
            _ => None,
        }
    }

    pub fn is_undef(&self, value: ValueId) -> bool {
        self.value_def(value) == ValueDef::Undef
    }

    /// The instruction defining `value`, if it is an instruction result
    pub fn defining_inst(&self, value: ValueId) -> Option<InstId> {
        match self.value_def(value) {
            ValueDef::Inst { inst, .. } => Some(inst),
            _ => None,
        }
    }

    /// The block in which `value` is defined
    pub fn value_block(&self, value: ValueId) -> Option<BlockId> {
        match self.value_def(value) {
            ValueDef::Arg { block, .. } => Some(block),
            ValueDef::Inst { inst, .. } => self.block_of(inst),
            _ => None,
        }
    }

    /// The shared `undef` value of type `ty`
    pub fn undef(&mut self, ty: SilType) -> ValueId {
        if let Some(v) = self.undefs.get(&ty) {
            return *v;
        }
        let v = self.new_value(ty.clone(), ValueDef::Undef, OwnershipKind::None);
        self.undefs.insert(ty, v);
        v
    }

    pub fn replace_all_uses_with(&mut self, old: ValueId, new: ValueId) {
        sil_invariant!(old != new, "replacing {} with itself", old);
        let uses = std::mem::take(&mut self.values[old.index()].uses);
        for u in &uses {
            self.inst_data_mut(u.user).operands[u.index] = new;
        }
        self.values[new.index()].uses.extend(uses);
    }

    fn remove_use(&mut self, value: ValueId, u: Use) {
        let uses = &mut self.values[value.index()].uses;
        match uses.iter().position(|x| *x == u) {
            Some(pos) => {
                uses.swap_remove(pos);
            }
            None => invariant_violation!("{} is not a use of {}", u.user, value),
        }
    }

    fn retarget_use(&mut self, value: ValueId, u: Use, new_index: usize) {
        let uses = &mut self.values[value.index()].uses;
        if let Some(slot) = uses.iter_mut().find(|x| **x == u) {
            slot.index = new_index;
        }
    }

    // ==================== Forward References ====================

    /// Stand-in for a value used before its definition
    pub fn create_placeholder(&mut self, ty: SilType) -> ValueId {
        self.new_value(ty, ValueDef::Placeholder, OwnershipKind::None)
    }

    pub fn is_placeholder(&self, value: ValueId) -> bool {
        self.value_def(value) == ValueDef::Placeholder
    }

    /// Move every use of a placeholder to its real definition. A placeholder
    /// can be patched once.
    pub fn resolve_placeholder(&mut self, placeholder: ValueId, real: ValueId) {
        match self.value_def(placeholder) {
            ValueDef::Placeholder => {}
            ValueDef::Patched => invariant_violation!("placeholder {} patched twice", placeholder),
            _ => invariant_violation!("{} is not a placeholder", placeholder),
        }
        if self.has_uses(placeholder) {
            self.replace_all_uses_with(placeholder, real);
        }
        self.values[placeholder.index()].def = ValueDef::Patched;
    }

    // ==================== Arguments ====================

    pub fn arg_kind(&self, value: ValueId) -> Option<ArgumentKind> {
        let ValueDef::Arg { block, .. } = self.value_def(value) else {
            return None;
        };
        if self.is_entry(block) {
            return Some(ArgumentKind::FunctionArgument);
        }
        if let Some(pred) = self.single_pred(block) {
            if let Some(term) = self.terminator(pred) {
                if matches!(self.kind(term), InstKind::SwitchEnum { .. }) {
                    return Some(ArgumentKind::TerminatorResult);
                }
            }
        }
        Some(ArgumentKind::Phi)
    }

    /// Incoming value per edge for a phi argument; `None` for other
    /// argument kinds
    pub fn incoming_values(&self, arg: ValueId) -> Option<Vec<(BlockId, ValueId)>> {
        if self.arg_kind(arg) != Some(ArgumentKind::Phi) {
            return None;
        }
        let ValueDef::Arg { block, index } = self.value_def(arg) else {
            return None;
        };
        let mut out = Vec::new();
        for pred in self.unique_preds(block) {
            let term = self.expect_terminator(pred);
            for edge in self.successor_edges(term) {
                if edge.dest == block {
                    sil_invariant!(
                        index < edge.args.len(),
                        "edge {} -> {} is missing argument {}",
                        pred,
                        block,
                        index
                    );
                    out.push((pred, self.operand(term, edge.args.start + index)));
                }
            }
        }
        Some(out)
    }

    /// The value a phi receives from `pred` (first edge if there are two)
    pub fn incoming_value(&self, arg: ValueId, pred: BlockId) -> Option<ValueId> {
        self.incoming_values(arg)?
            .into_iter()
            .find(|(p, _)| *p == pred)
            .map(|(_, v)| v)
    }

    // ==================== Literal Queries ====================

    pub fn integer_literal(&self, value: ValueId) -> Option<i128> {
        let inst = self.defining_inst(value)?;
        match self.kind(inst) {
            InstKind::IntegerLiteral { value } => Some(*value),
            _ => None,
        }
    }

    /// The enum case a value was constructed with by an `enum` instruction
    pub fn enum_case(&self, value: ValueId) -> Option<usize> {
        let inst = self.defining_inst(value)?;
        match self.kind(inst) {
            InstKind::Enum { case } => Some(*case),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    fn empty_function() -> (Function, AstContext) {
        let ty = FunctionType::thin(vec![Type::int(1)], Type::empty_tuple());
        (Function::new("f", ty), AstContext::new())
    }

    #[test]
    fn test_preds_follow_terminators() {
        let (mut f, ast) = empty_function();
        let bb0 = f.append_block();
        let bb1 = f.append_block();
        let cond = f.add_block_arg(bb0, SilType::int(1), OwnershipKind::None);
        let br = f.create_inst(
            InstKind::CondBr {
                true_dest: bb1,
                false_dest: bb1,
                true_arg_count: 0,
            },
            vec![cond],
            vec![],
            &ast,
        );
        f.append_inst(bb0, br);
        assert_eq!(f.preds(bb1), &[bb0, bb0]);
        assert_eq!(f.single_pred(bb1), None);
        assert_eq!(f.unique_preds(bb1), vec![bb0]);

        let bb2 = f.append_block();
        f.set_successor(br, 1, bb2);
        assert_eq!(f.preds(bb1), &[bb0]);
        assert_eq!(f.preds(bb2), &[bb0]);
    }

    #[test]
    fn test_edge_args_shift_uses() {
        let (mut f, ast) = empty_function();
        let bb0 = f.append_block();
        let bb1 = f.append_block();
        let bb2 = f.append_block();
        let c = f.add_block_arg(bb0, SilType::int(1), OwnershipKind::None);
        let a = f.add_block_arg(bb1, SilType::int(1), OwnershipKind::None);
        let b = f.add_block_arg(bb2, SilType::int(1), OwnershipKind::None);
        let br = f.create_inst(
            InstKind::CondBr {
                true_dest: bb1,
                false_dest: bb2,
                true_arg_count: 1,
            },
            vec![c, c, c],
            vec![],
            &ast,
        );
        f.append_inst(bb0, br);
        assert_eq!(f.incoming_value(a, bb0), Some(c));
        assert_eq!(f.incoming_value(b, bb0), Some(c));

        f.remove_edge_arg(br, 0, 0);
        assert_eq!(f.operands(br).len(), 2);
        assert_eq!(f.uses(c).len(), 2);
        assert!(f.uses(c).iter().all(|u| u.index < 2));
        assert_eq!(f.successor_edges(br)[0].args, 1..1);
        assert_eq!(f.successor_edges(br)[1].args, 1..2);
    }

    #[test]
    fn test_placeholder_patch_once() {
        let (mut f, ast) = empty_function();
        let bb0 = f.append_block();
        let ph = f.create_placeholder(SilType::int(1));
        let fail = f.create_inst(
            InstKind::CondFail { message: String::new() },
            vec![ph],
            vec![],
            &ast,
        );
        f.append_inst(bb0, fail);
        let real = f.add_block_arg(bb0, SilType::int(1), OwnershipKind::None);
        f.resolve_placeholder(ph, real);
        assert_eq!(f.operand(fail, 0), real);
        assert_eq!(f.value_def(ph), ValueDef::Patched);

        let again = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            f.resolve_placeholder(ph, real)
        }));
        assert!(again.is_err());
    }

    #[test]
    fn test_erase_block_replaces_escaping_values_with_undef() {
        let (mut f, ast) = empty_function();
        let _bb0 = f.append_block();
        let bb1 = f.append_block();
        let bb2 = f.append_block();
        let lit = f.create_inst(InstKind::IntegerLiteral { value: 1 }, vec![], vec![SilType::int(1)], &ast);
        f.append_inst(bb1, lit);
        let v = f.result(lit);
        let fail = f.create_inst(InstKind::CondFail { message: String::new() }, vec![v], vec![], &ast);
        f.append_inst(bb2, fail);

        f.erase_block(bb1);
        assert!(f.is_undef(f.operand(fail, 0)));
        assert_eq!(f.layout().len(), 2);
        assert!(!f.is_block_live(bb1));
    }
}
