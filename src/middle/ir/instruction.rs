//! Instruction kinds and the opcode name table

use std::ops::Range;

use strum::{Display, EnumString, IntoStaticStr};

use crate::ast::DeclId;
use crate::middle::ir::{BlockId, FunctionId, GlobalId};

/// Opcode keywords, as written in SIL text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Opcode {
    IntegerLiteral,
    FloatLiteral,
    StringLiteral,
    FunctionRef,
    GlobalAddr,
    Tuple,
    TupleExtract,
    Struct,
    StructExtract,
    Enum,
    UncheckedEnumData,
    SelectEnum,
    Builtin,
    Apply,
    StrongRetain,
    StrongRelease,
    CopyValue,
    DestroyValue,
    AllocStack,
    DeallocStack,
    Load,
    Store,
    ClassMethod,
    ObjcMethod,
    CondFail,
    Br,
    CondBr,
    SwitchValue,
    SwitchEnum,
    Return,
    Throw,
    Unreachable,
}

impl Opcode {
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Opcode::Br
                | Opcode::CondBr
                | Opcode::SwitchValue
                | Opcode::SwitchEnum
                | Opcode::Return
                | Opcode::Throw
                | Opcode::Unreachable
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum StringEncoding {
    Utf8,
    Utf16,
    ObjcSelector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadQualifier {
    #[default]
    Unqualified,
    Take,
    Copy,
    Trivial,
}

impl LoadQualifier {
    pub fn keyword(self) -> Option<&'static str> {
        match self {
            LoadQualifier::Unqualified => None,
            LoadQualifier::Take => Some("take"),
            LoadQualifier::Copy => Some("copy"),
            LoadQualifier::Trivial => Some("trivial"),
        }
    }

    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "take" => Some(LoadQualifier::Take),
            "copy" => Some(LoadQualifier::Copy),
            "trivial" => Some(LoadQualifier::Trivial),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreQualifier {
    #[default]
    Unqualified,
    Init,
    Assign,
    Trivial,
}

impl StoreQualifier {
    pub fn keyword(self) -> Option<&'static str> {
        match self {
            StoreQualifier::Unqualified => None,
            StoreQualifier::Init => Some("init"),
            StoreQualifier::Assign => Some("assign"),
            StoreQualifier::Trivial => Some("trivial"),
        }
    }

    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "init" => Some(StoreQualifier::Init),
            "assign" => Some(StoreQualifier::Assign),
            "trivial" => Some(StoreQualifier::Trivial),
            _ => None,
        }
    }
}

/// Instruction payload. Operands live in the instruction's operand list;
/// the comments give their layout.
#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    /// Result type is the literal's builtin integer type
    IntegerLiteral { value: i128 },
    /// IEEE bit pattern
    FloatLiteral { bits: u64 },
    StringLiteral { encoding: StringEncoding, value: String },
    FunctionRef { function: FunctionId },
    GlobalAddr { global: GlobalId },
    /// `[elements...]`
    Tuple,
    /// `[tuple]`
    TupleExtract { index: usize },
    /// `[fields...]`
    Struct,
    /// `[struct]`; `field` indexes the struct declaration's fields
    StructExtract { field: usize },
    /// `[payload?]`; `case` indexes the result enum's cases
    Enum { case: usize },
    /// `[enum]`
    UncheckedEnumData { case: usize },
    /// `[enum, case values..., default?]`
    SelectEnum { cases: Vec<usize>, has_default: bool },
    /// `[args...]`
    Builtin { name: String },
    /// `[callee, args...]`
    Apply,
    StrongRetain,
    StrongRelease,
    CopyValue,
    DestroyValue,
    AllocStack { dynamic_lifetime: bool },
    DeallocStack,
    /// `[address]`
    Load { qualifier: LoadQualifier },
    /// `[value, address]`
    Store { qualifier: StoreQualifier },
    /// `[self]`
    ClassMethod { member: DeclId },
    ObjcMethod { member: DeclId },
    /// `[condition]`; traps when the condition is true
    CondFail { message: String },

    // ==================== Terminators ====================

    /// `[args...]`
    Br { dest: BlockId },
    /// `[condition, true args..., false args...]`
    CondBr {
        true_dest: BlockId,
        false_dest: BlockId,
        true_arg_count: usize,
    },
    /// `[scrutinee]`
    SwitchValue {
        cases: Vec<(i128, BlockId)>,
        default: Option<BlockId>,
    },
    /// `[scrutinee]`; case destinations receive the payload as their
    /// argument
    SwitchEnum {
        cases: Vec<(usize, BlockId)>,
        default: Option<BlockId>,
    },
    /// `[value]`
    Return,
    /// `[error]`
    Throw,
    Unreachable,
}

/// One outgoing CFG edge of a terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessorEdge {
    pub dest: BlockId,
    /// Operand positions passed as the destination's arguments
    pub args: Range<usize>,
}

impl InstKind {
    pub fn opcode(&self) -> Opcode {
        match self {
            InstKind::IntegerLiteral { .. } => Opcode::IntegerLiteral,
            InstKind::FloatLiteral { .. } => Opcode::FloatLiteral,
            InstKind::StringLiteral { .. } => Opcode::StringLiteral,
            InstKind::FunctionRef { .. } => Opcode::FunctionRef,
            InstKind::GlobalAddr { .. } => Opcode::GlobalAddr,
            InstKind::Tuple => Opcode::Tuple,
            InstKind::TupleExtract { .. } => Opcode::TupleExtract,
            InstKind::Struct => Opcode::Struct,
            InstKind::StructExtract { .. } => Opcode::StructExtract,
            InstKind::Enum { .. } => Opcode::Enum,
            InstKind::UncheckedEnumData { .. } => Opcode::UncheckedEnumData,
            InstKind::SelectEnum { .. } => Opcode::SelectEnum,
            InstKind::Builtin { .. } => Opcode::Builtin,
            InstKind::Apply => Opcode::Apply,
            InstKind::StrongRetain => Opcode::StrongRetain,
            InstKind::StrongRelease => Opcode::StrongRelease,
            InstKind::CopyValue => Opcode::CopyValue,
            InstKind::DestroyValue => Opcode::DestroyValue,
            InstKind::AllocStack { .. } => Opcode::AllocStack,
            InstKind::DeallocStack => Opcode::DeallocStack,
            InstKind::Load { .. } => Opcode::Load,
            InstKind::Store { .. } => Opcode::Store,
            InstKind::ClassMethod { .. } => Opcode::ClassMethod,
            InstKind::ObjcMethod { .. } => Opcode::ObjcMethod,
            InstKind::CondFail { .. } => Opcode::CondFail,
            InstKind::Br { .. } => Opcode::Br,
            InstKind::CondBr { .. } => Opcode::CondBr,
            InstKind::SwitchValue { .. } => Opcode::SwitchValue,
            InstKind::SwitchEnum { .. } => Opcode::SwitchEnum,
            InstKind::Return => Opcode::Return,
            InstKind::Throw => Opcode::Throw,
            InstKind::Unreachable => Opcode::Unreachable,
        }
    }

    pub fn is_terminator(&self) -> bool {
        self.opcode().is_terminator()
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            InstKind::IntegerLiteral { .. }
                | InstKind::FloatLiteral { .. }
                | InstKind::StringLiteral { .. }
        )
    }

    /// Calls and instructions that may observe or change memory, reference
    /// counts or control flow.
    pub fn has_side_effects(&self) -> bool {
        match self {
            InstKind::Apply
            | InstKind::StrongRetain
            | InstKind::StrongRelease
            | InstKind::CopyValue
            | InstKind::DestroyValue
            | InstKind::AllocStack { .. }
            | InstKind::DeallocStack
            | InstKind::Store { .. }
            | InstKind::CondFail { .. } => true,
            InstKind::Load { qualifier } => *qualifier == LoadQualifier::Take,
            InstKind::Builtin { name } => !is_pure_builtin(name),
            _ => false,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, InstKind::Apply)
    }

    /// Instructions that may decrement a reference count
    pub fn may_release(&self) -> bool {
        matches!(
            self,
            InstKind::StrongRelease | InstKind::DestroyValue | InstKind::Apply
        )
    }

    /// Instructions that cost nothing when duplicated
    pub fn is_free(&self) -> bool {
        matches!(
            self,
            InstKind::IntegerLiteral { .. }
                | InstKind::FloatLiteral { .. }
                | InstKind::StringLiteral { .. }
                | InstKind::FunctionRef { .. }
                | InstKind::GlobalAddr { .. }
                | InstKind::Tuple
                | InstKind::TupleExtract { .. }
                | InstKind::Struct
                | InstKind::StructExtract { .. }
                | InstKind::Enum { .. }
                | InstKind::UncheckedEnumData { .. }
        ) || self.is_terminator()
    }

    /// Destinations in edge order. A block reached along two edges appears
    /// twice.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            InstKind::Br { dest } => vec![*dest],
            InstKind::CondBr {
                true_dest,
                false_dest,
                ..
            } => vec![*true_dest, *false_dest],
            InstKind::SwitchValue { cases, default } => cases
                .iter()
                .map(|(_, b)| *b)
                .chain(default.iter().copied())
                .collect(),
            InstKind::SwitchEnum { cases, default } => cases
                .iter()
                .map(|(_, b)| *b)
                .chain(default.iter().copied())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Outgoing edges, given the terminator's operand count
    pub fn successor_edges(&self, operand_count: usize) -> Vec<SuccessorEdge> {
        match self {
            InstKind::Br { dest } => vec![SuccessorEdge {
                dest: *dest,
                args: 0..operand_count,
            }],
            InstKind::CondBr {
                true_dest,
                false_dest,
                true_arg_count,
            } => {
                let split = 1 + true_arg_count;
                vec![
                    SuccessorEdge {
                        dest: *true_dest,
                        args: 1..split,
                    },
                    SuccessorEdge {
                        dest: *false_dest,
                        args: split..operand_count,
                    },
                ]
            }
            _ => self
                .successors()
                .into_iter()
                .map(|dest| SuccessorEdge {
                    dest,
                    args: operand_count..operand_count,
                })
                .collect(),
        }
    }

    /// Rewrite every destination block through `f`
    pub fn map_successors(&mut self, mut f: impl FnMut(BlockId) -> BlockId) {
        match self {
            InstKind::Br { dest } => *dest = f(*dest),
            InstKind::CondBr {
                true_dest,
                false_dest,
                ..
            } => {
                *true_dest = f(*true_dest);
                *false_dest = f(*false_dest);
            }
            InstKind::SwitchValue { cases, default } => {
                for (_, b) in cases.iter_mut() {
                    *b = f(*b);
                }
                if let Some(b) = default {
                    *b = f(*b);
                }
            }
            InstKind::SwitchEnum { cases, default } => {
                for (_, b) in cases.iter_mut() {
                    *b = f(*b);
                }
                if let Some(b) = default {
                    *b = f(*b);
                }
            }
            _ => {}
        }
    }

    /// Rewrite the destination of one edge only
    pub fn set_successor(&mut self, edge: usize, new_dest: BlockId) {
        let mut index = 0;
        self.map_successors(|b| {
            let out = if index == edge { new_dest } else { b };
            index += 1;
            out
        });
    }
}

/// Builtins without memory or control effects
pub fn is_pure_builtin(name: &str) -> bool {
    const PURE_PREFIXES: &[&str] = &[
        "xor_", "and_", "or_", "add_", "sub_", "mul_", "cmp_", "trunc_", "zext_", "sext_", "shl_",
        "lshr_", "ashr_",
    ];
    PURE_PREFIXES.iter().any(|p| name.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_names() {
        assert_eq!("cond_br".parse::<Opcode>(), Ok(Opcode::CondBr));
        assert_eq!("objc_method".parse::<Opcode>(), Ok(Opcode::ObjcMethod));
        assert_eq!(Opcode::UncheckedEnumData.to_string(), "unchecked_enum_data");
        assert!("bogus".parse::<Opcode>().is_err());
        assert!(Opcode::Unreachable.is_terminator());
        assert!(!Opcode::Apply.is_terminator());
    }

    #[test]
    fn test_cond_br_edges() {
        let kind = InstKind::CondBr {
            true_dest: BlockId(1),
            false_dest: BlockId(1),
            true_arg_count: 2,
        };
        let edges = kind.successor_edges(4);
        assert_eq!(edges[0].args, 1..3);
        assert_eq!(edges[1].args, 3..4);
        assert_eq!(kind.successors(), vec![BlockId(1), BlockId(1)]);
    }

    #[test]
    fn test_set_successor() {
        let mut kind = InstKind::SwitchValue {
            cases: vec![(0, BlockId(1)), (1, BlockId(2))],
            default: Some(BlockId(1)),
        };
        kind.set_successor(2, BlockId(5));
        assert_eq!(kind.successors(), vec![BlockId(1), BlockId(2), BlockId(5)]);
    }
}
