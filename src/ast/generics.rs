//! Generic signatures, substitutions and protocol conformances.

use crate::ast::{DeclId, ModuleId};
use crate::types::CanType;

/// Handle of a conformance in an [`AstContext`](crate::ast::AstContext).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConformanceId(pub(crate) u32);

impl ConformanceId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// `Type: Protocol`, declared in `module`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Conformance {
    pub ty: CanType,
    pub protocol: DeclId,
    pub module: ModuleId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GenericParamKind {
    /// `T`, a parameter the caller chooses
    Primary,
    /// `T.Element`, fixed once `generic_params[base]` is substituted
    Dependent {
        base: usize,
        associated_type: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenericParam {
    pub name: String,
    pub kind: GenericParamKind,
    /// Protocols the parameter must conform to, in requirement order
    pub requirements: Vec<DeclId>,
}

impl GenericParam {
    pub fn primary(name: impl Into<String>, requirements: Vec<DeclId>) -> Self {
        Self {
            name: name.into(),
            kind: GenericParamKind::Primary,
            requirements,
        }
    }

    pub fn dependent(
        name: impl Into<String>,
        base: usize,
        associated_type: impl Into<String>,
        requirements: Vec<DeclId>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: GenericParamKind::Dependent {
                base,
                associated_type: associated_type.into(),
            },
            requirements,
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self.kind, GenericParamKind::Primary)
    }
}

/// Witness for one conformance requirement of a substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConformanceRef {
    Concrete(ConformanceId),
    /// The replacement is itself an archetype; only the protocol is known
    Abstract(DeclId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Substitution {
    pub replacement: CanType,
    pub conformances: Vec<ConformanceRef>,
}

/// Replacement types for a generic signature, one entry per generic
/// parameter in declaration order (dependent parameters included).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SubstitutionMap {
    pub substitutions: Vec<Substitution>,
}

impl SubstitutionMap {
    pub fn new(substitutions: Vec<Substitution>) -> Self {
        Self { substitutions }
    }

    pub fn len(&self) -> usize {
        self.substitutions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.substitutions.is_empty()
    }
}
