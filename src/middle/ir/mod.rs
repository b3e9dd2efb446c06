//! SIL intermediate representation
//!
//! SSA control-flow graphs stored in per-function arenas. Blocks,
//! instructions and values are addressed by copyable ids; the function keeps
//! use-lists and predecessor lists up to date on every mutation, so clients
//! never patch them by hand.

mod function;
mod instruction;
mod module;

use std::fmt;

pub use function::{ArgumentKind, Function, InstData};
pub use instruction::{
    is_pure_builtin, InstKind, LoadQualifier, Opcode, StoreQualifier, StringEncoding,
    SuccessorEdge,
};
pub use module::{
    DebugScope, FunctionAttributes, GlobalAttributes, ScopeParent, SilGlobal, SilLinkage,
    SilModule, SilStage, WitnessEntry, WitnessTable,
};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

entity_id!(
    /// Basic block handle, local to one function
    BlockId,
    "bb"
);
entity_id!(
    /// Instruction handle, local to one function
    InstId,
    "inst"
);
entity_id!(
    /// SSA value handle, local to one function
    ValueId,
    "%"
);
entity_id!(
    /// Function handle in a [`SilModule`]
    FunctionId,
    "fn"
);
entity_id!(
    /// Global variable handle in a [`SilModule`]
    GlobalId,
    "global"
);
entity_id!(
    /// Debug scope handle in a [`SilModule`]
    ScopeId,
    "scope"
);

/// Where an SSA value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDef {
    /// Block argument
    Arg { block: BlockId, index: usize },
    /// Result of an instruction
    Inst { inst: InstId, result: usize },
    /// Forward reference awaiting its definition
    Placeholder,
    /// Placeholder whose uses were moved to the real definition
    Patched,
    /// `undef : $T`
    Undef,
    /// Result or argument of an erased instruction or block
    Erased,
}

/// One operand slot referring to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Use {
    pub user: InstId,
    pub index: usize,
}

/// `loc "file":line:column`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLoc {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}:{}", self.file, self.line, self.column)
    }
}
