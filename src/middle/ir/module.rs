//! SIL modules: functions, globals, witness tables and debug scopes

use std::collections::HashMap;

use bitflags::bitflags;
use strum::{Display, EnumString};

use crate::ast::{AstContext, ConformanceId, DeclId, ModuleId};
use crate::middle::ir::{Function, FunctionId, GlobalId, ScopeId, SourceLoc};
use crate::types::SilType;
use crate::{invariant_violation, sil_invariant};

/// SIL-level linkage of a function or global
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum SilLinkage {
    Public,
    Hidden,
    Shared,
    Private,
    PublicExternal,
    HiddenExternal,
    SharedExternal,
}

impl SilLinkage {
    /// Linkage assumed when none is written: public for definitions,
    /// public_external for declarations
    pub fn default_for(is_definition: bool) -> Self {
        if is_definition {
            SilLinkage::Public
        } else {
            SilLinkage::PublicExternal
        }
    }

    pub fn is_external(self) -> bool {
        matches!(
            self,
            SilLinkage::PublicExternal | SilLinkage::HiddenExternal | SilLinkage::SharedExternal
        )
    }

    /// The linkage the same symbol has when seen from another module
    pub fn as_external(self) -> Self {
        match self {
            SilLinkage::Public => SilLinkage::PublicExternal,
            SilLinkage::Hidden => SilLinkage::HiddenExternal,
            SilLinkage::Shared => SilLinkage::SharedExternal,
            other => other,
        }
    }
}

bitflags! {
    /// `sil [attr]...` flags, in canonical print order
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FunctionAttributes: u32 {
        const TRANSPARENT = 0x01;
        const SERIALIZED = 0x02;
        const NOINLINE = 0x04;
        /// Values carry ownership kinds
        const OSSA = 0x08;
    }
}

impl FunctionAttributes {
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "transparent" => Some(Self::TRANSPARENT),
            "serialized" => Some(Self::SERIALIZED),
            "noinline" => Some(Self::NOINLINE),
            "ossa" => Some(Self::OSSA),
            _ => None,
        }
    }

    pub fn keywords(self) -> Vec<&'static str> {
        let mut out = Vec::new();
        for (flag, name) in [
            (Self::TRANSPARENT, "transparent"),
            (Self::SERIALIZED, "serialized"),
            (Self::NOINLINE, "noinline"),
            (Self::OSSA, "ossa"),
        ] {
            if self.contains(flag) {
                out.push(name);
            }
        }
        out
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GlobalAttributes: u32 {
        const LET = 0x01;
        const SERIALIZED = 0x02;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SilStage {
    #[default]
    Raw,
    Canonical,
    Lowered,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SilGlobal {
    pub name: String,
    /// Object type of the stored value
    pub ty: SilType,
    pub linkage: SilLinkage,
    pub attrs: GlobalAttributes,
    pub decl: Option<DeclId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WitnessEntry {
    /// Requirement name within the protocol
    pub requirement: String,
    /// `nil` when the requirement has no witness yet
    pub function: Option<FunctionId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WitnessTable {
    pub linkage: SilLinkage,
    pub conformance: ConformanceId,
    pub entries: Vec<WitnessEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeParent {
    Function(FunctionId),
    Scope(ScopeId),
}

/// A lexical scope for debug info. Scopes form a tree; inlined scopes also
/// point at the call site scope they were inlined into.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugScope {
    pub loc: Option<SourceLoc>,
    pub parent: ScopeParent,
    pub inlined_at: Option<ScopeId>,
}

/// A SIL module together with the declarations it refers to.
#[derive(Debug, Clone)]
pub struct SilModule {
    pub name: String,
    pub stage: SilStage,
    pub ast: AstContext,
    /// The AST module being compiled
    pub module_id: ModuleId,
    pub imports: Vec<String>,
    functions: Vec<Function>,
    /// Print order; forward-referenced functions join it once declared
    function_order: Vec<FunctionId>,
    function_lookup: HashMap<String, FunctionId>,
    globals: Vec<SilGlobal>,
    global_lookup: HashMap<String, GlobalId>,
    witness_tables: Vec<WitnessTable>,
    scopes: Vec<DebugScope>,
}

impl SilModule {
    pub fn new(name: &str) -> Self {
        let mut ast = AstContext::new();
        let module_id = ast.add_module(name);
        Self {
            name: name.to_string(),
            stage: SilStage::Raw,
            ast,
            module_id,
            imports: Vec::new(),
            functions: Vec::new(),
            function_order: Vec::new(),
            function_lookup: HashMap::new(),
            globals: Vec::new(),
            global_lookup: HashMap::new(),
            witness_tables: Vec::new(),
            scopes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.globals.is_empty() && self.witness_tables.is_empty()
    }

    // ==================== Functions ====================

    pub fn add_function(&mut self, function: Function) -> FunctionId {
        let id = self.add_unplaced_function(function);
        self.function_order.push(id);
        id
    }

    /// Register a function that is referenced before its declaration. It is
    /// not printed until [`place_function`](Self::place_function) is called.
    pub fn add_unplaced_function(&mut self, function: Function) -> FunctionId {
        sil_invariant!(
            !self.function_lookup.contains_key(&function.name),
            "function '{}' already exists",
            function.name
        );
        let id = FunctionId(self.functions.len() as u32);
        self.function_lookup.insert(function.name.clone(), id);
        self.functions.push(function);
        id
    }

    pub fn place_function(&mut self, id: FunctionId) {
        sil_invariant!(!self.is_placed(id), "{} is already placed", id);
        self.function_order.push(id);
    }

    pub fn is_placed(&self, id: FunctionId) -> bool {
        self.function_order.contains(&id)
    }

    pub fn find_function(&self, name: &str) -> Option<FunctionId> {
        self.function_lookup.get(name).copied()
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        match self.functions.get(id.index()) {
            Some(f) => f,
            None => invariant_violation!("{} does not exist", id),
        }
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut Function {
        match self.functions.get_mut(id.index()) {
            Some(f) => f,
            None => invariant_violation!("{} does not exist", id),
        }
    }

    /// One body to mutate together with the declarations it refers to
    pub fn function_and_ast_mut(&mut self, id: FunctionId) -> (&mut Function, &AstContext) {
        match self.functions.get_mut(id.index()) {
            Some(f) => (f, &self.ast),
            None => invariant_violation!("{} does not exist", id),
        }
    }

    /// Swap in a new body for an existing function slot
    pub fn replace_function(&mut self, id: FunctionId, function: Function) {
        sil_invariant!(
            self.function(id).name == function.name,
            "replacing '{}' with '{}'",
            self.function(id).name,
            function.name
        );
        self.functions[id.index()] = function;
    }

    /// Functions in declaration order
    pub fn functions(&self) -> impl Iterator<Item = (FunctionId, &Function)> {
        self.function_order
            .iter()
            .map(|id| (*id, &self.functions[id.index()]))
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// The declaration context and the function bodies, borrowed apart so a
    /// pass can mutate bodies while reading declarations
    pub fn split_mut(&mut self) -> (&AstContext, &mut [Function]) {
        (&self.ast, &mut self.functions)
    }

    // ==================== Globals ====================

    pub fn add_global(&mut self, global: SilGlobal) -> GlobalId {
        sil_invariant!(
            !self.global_lookup.contains_key(&global.name),
            "global '{}' already exists",
            global.name
        );
        let id = GlobalId(self.globals.len() as u32);
        self.global_lookup.insert(global.name.clone(), id);
        self.globals.push(global);
        id
    }

    pub fn find_global(&self, name: &str) -> Option<GlobalId> {
        self.global_lookup.get(name).copied()
    }

    pub fn global(&self, id: GlobalId) -> &SilGlobal {
        &self.globals[id.index()]
    }

    pub fn globals(&self) -> impl Iterator<Item = (GlobalId, &SilGlobal)> {
        self.globals
            .iter()
            .enumerate()
            .map(|(i, g)| (GlobalId(i as u32), g))
    }

    // ==================== Witness Tables ====================

    pub fn add_witness_table(&mut self, table: WitnessTable) {
        self.witness_tables.push(table);
    }

    pub fn witness_tables(&self) -> &[WitnessTable] {
        &self.witness_tables
    }

    pub fn find_witness_table(&self, conformance: ConformanceId) -> Option<&WitnessTable> {
        self.witness_tables.iter().find(|t| t.conformance == conformance)
    }

    // ==================== Debug Scopes ====================

    pub fn add_scope(&mut self, scope: DebugScope) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(scope);
        id
    }

    pub fn scope(&self, id: ScopeId) -> &DebugScope {
        &self.scopes[id.index()]
    }

    pub fn scopes(&self) -> impl Iterator<Item = (ScopeId, &DebugScope)> {
        self.scopes
            .iter()
            .enumerate()
            .map(|(i, s)| (ScopeId(i as u32), s))
    }

    /// The function a scope ultimately belongs to
    pub fn scope_function(&self, id: ScopeId) -> FunctionId {
        let mut current = id;
        loop {
            match self.scope(current).parent {
                ScopeParent::Function(f) => return f,
                ScopeParent::Scope(s) => current = s,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FunctionType, Type};

    #[test]
    fn test_linkage_names() {
        assert_eq!(SilLinkage::PublicExternal.to_string(), "public_external");
        assert_eq!("hidden".parse::<SilLinkage>(), Ok(SilLinkage::Hidden));
        assert_eq!(SilLinkage::Shared.as_external(), SilLinkage::SharedExternal);
        assert!(SilLinkage::default_for(false).is_external());
    }

    #[test]
    fn test_attribute_keywords_are_canonical() {
        let attrs = FunctionAttributes::OSSA | FunctionAttributes::TRANSPARENT;
        assert_eq!(attrs.keywords(), vec!["transparent", "ossa"]);
    }

    #[test]
    fn test_scope_function() {
        let mut module = SilModule::new("main");
        let f = module.add_function(Function::new(
            "f",
            FunctionType::thin(vec![], Type::empty_tuple()),
        ));
        let outer = module.add_scope(DebugScope {
            loc: None,
            parent: ScopeParent::Function(f),
            inlined_at: None,
        });
        let inner = module.add_scope(DebugScope {
            loc: None,
            parent: ScopeParent::Scope(outer),
            inlined_at: Some(outer),
        });
        assert_eq!(module.scope_function(inner), f);
        assert_eq!(module.find_function("f"), Some(f));
    }
}
