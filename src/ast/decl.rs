//! Declarations handed to SIL by the type checker.

use bitflags::bitflags;
use strum::{Display, EnumString};

use crate::ast::{GenericParam, ModuleId};
use crate::types::{FunctionType, Type};

/// Handle of a declaration in an [`AstContext`](crate::ast::AstContext).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclId(pub(crate) u32);

impl DeclId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Formal access level of a declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum AccessLevel {
    Private,
    FilePrivate,
    Internal,
    Public,
    Open,
}

bitflags! {
    /// Declaration attributes relevant to linkage
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeclAttributes: u32 {
        /// `@_weakLinked`: the symbol may be absent at load time
        const WEAK_IMPORTED = 0x0001;
        /// Body is serialized into the module interface (`@inlinable`)
        const FRAGILE = 0x0002;
        /// Exposed to the Objective-C runtime
        const OBJC = 0x0004;
        /// Cannot be overridden
        const FINAL = 0x0008;
    }
}

/// The imported Objective-C declaration backing a Swift declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClangNode {
    pub weak_imported: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumCaseDecl {
    pub name: String,
    pub payload: Option<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclKind {
    Struct { fields: Vec<FieldDecl> },
    Enum { cases: Vec<EnumCaseDecl> },
    Class { fields: Vec<FieldDecl> },
    Protocol {
        requirements: Vec<String>,
        associated_types: Vec<String>,
    },
    Func { signature: Option<FunctionType> },
    Constructor { signature: Option<FunctionType> },
    Var { ty: Type },
}

impl DeclKind {
    /// Functions and constructors; everything that has an uncurry level
    pub fn is_function_like(&self) -> bool {
        matches!(self, DeclKind::Func { .. } | DeclKind::Constructor { .. })
    }

    pub fn is_nominal_type(&self) -> bool {
        matches!(
            self,
            DeclKind::Struct { .. } | DeclKind::Enum { .. } | DeclKind::Class { .. } | DeclKind::Protocol { .. }
        )
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            DeclKind::Struct { .. } => "struct",
            DeclKind::Enum { .. } => "enum",
            DeclKind::Class { .. } => "class",
            DeclKind::Protocol { .. } => "protocol",
            DeclKind::Func { .. } => "func",
            DeclKind::Constructor { .. } => "init",
            DeclKind::Var { .. } => "var",
        }
    }
}

/// A declaration. Owned by the [`AstContext`](crate::ast::AstContext) and
/// referenced everywhere else through a [`DeclId`].
#[derive(Debug, Clone, PartialEq)]
pub struct Decl {
    pub name: String,
    pub module: ModuleId,
    pub parent: Option<DeclId>,
    pub kind: DeclKind,
    pub access: AccessLevel,
    pub attrs: DeclAttributes,
    pub clang_node: Option<ClangNode>,
    pub generic_params: Vec<GenericParam>,
}

impl Decl {
    pub fn new(name: impl Into<String>, module: ModuleId, kind: DeclKind) -> Self {
        Self {
            name: name.into(),
            module,
            parent: None,
            kind,
            access: AccessLevel::Internal,
            attrs: DeclAttributes::empty(),
            clang_node: None,
            generic_params: Vec::new(),
        }
    }

    pub fn with_access(mut self, access: AccessLevel) -> Self {
        self.access = access;
        self
    }

    pub fn with_attrs(mut self, attrs: DeclAttributes) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn with_parent(mut self, parent: DeclId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_clang_node(mut self, node: ClangNode) -> Self {
        self.clang_node = Some(node);
        self
    }

    pub fn with_generic_params(mut self, params: Vec<GenericParam>) -> Self {
        self.generic_params = params;
        self
    }

    pub fn is_weak_imported(&self) -> bool {
        self.attrs.contains(DeclAttributes::WEAK_IMPORTED)
    }

    pub fn is_fragile(&self) -> bool {
        self.attrs.contains(DeclAttributes::FRAGILE)
    }

    pub fn fields(&self) -> &[FieldDecl] {
        match &self.kind {
            DeclKind::Struct { fields } | DeclKind::Class { fields } => fields,
            _ => &[],
        }
    }

    pub fn cases(&self) -> &[EnumCaseDecl] {
        match &self.kind {
            DeclKind::Enum { cases } => cases,
            _ => &[],
        }
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields().iter().position(|f| f.name == name)
    }

    pub fn case_index(&self, name: &str) -> Option<usize> {
        self.cases().iter().position(|c| c.name == name)
    }
}
