//! Front-end declarations as seen by SIL
//!
//! The type checker is an external collaborator; this module only models the
//! surface SIL needs from it: modules, nominal and value declarations, generic
//! signatures and protocol conformances. Everything is stored in one arena
//! ([`AstContext`]) and referenced through copyable handles, so SIL entities
//! can point at declarations without owning them.

mod decl;
mod generics;

use std::collections::HashMap;

pub use decl::{
    AccessLevel, ClangNode, Decl, DeclAttributes, DeclId, DeclKind, EnumCaseDecl, FieldDecl,
};
pub use generics::{
    Conformance, ConformanceId, ConformanceRef, GenericParam, GenericParamKind, Substitution,
    SubstitutionMap,
};

use crate::types::CanType;

/// Handle of a module in an [`AstContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub(crate) u32);

#[derive(Debug, Clone, PartialEq)]
pub struct AstModule {
    pub name: String,
}

/// Arena of declarations. Append-only: handles stay valid for the lifetime
/// of the context.
#[derive(Debug, Clone, Default)]
pub struct AstContext {
    modules: Vec<AstModule>,
    decls: Vec<Decl>,
    conformances: Vec<Conformance>,
    top_level: HashMap<(ModuleId, String), DeclId>,
    conformance_lookup: HashMap<Conformance, ConformanceId>,
}

impl AstContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the module called `name`
    pub fn add_module(&mut self, name: &str) -> ModuleId {
        if let Some(id) = self.find_module(name) {
            return id;
        }
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(AstModule {
            name: name.to_string(),
        });
        id
    }

    pub fn find_module(&self, name: &str) -> Option<ModuleId> {
        self.modules
            .iter()
            .position(|m| m.name == name)
            .map(|i| ModuleId(i as u32))
    }

    pub fn module_name(&self, id: ModuleId) -> &str {
        &self.modules[id.0 as usize].name
    }

    /// Add a declaration. Top-level declarations become visible to
    /// [`lookup`](Self::lookup).
    pub fn add_decl(&mut self, decl: Decl) -> DeclId {
        let id = DeclId(self.decls.len() as u32);
        if decl.parent.is_none() {
            self.top_level.insert((decl.module, decl.name.clone()), id);
        }
        self.decls.push(decl);
        id
    }

    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id.index()]
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut Decl {
        &mut self.decls[id.index()]
    }

    pub fn decls(&self) -> impl Iterator<Item = (DeclId, &Decl)> {
        self.decls
            .iter()
            .enumerate()
            .map(|(i, d)| (DeclId(i as u32), d))
    }

    pub fn lookup(&self, module: ModuleId, name: &str) -> Option<DeclId> {
        self.top_level.get(&(module, name.to_string())).copied()
    }

    /// Declarations nested directly in `parent`, in declaration order
    pub fn members(&self, parent: DeclId) -> Vec<DeclId> {
        self.decls()
            .filter(|(_, d)| d.parent == Some(parent))
            .map(|(id, _)| id)
            .collect()
    }

    pub fn lookup_member(&self, parent: DeclId, name: &str) -> Option<DeclId> {
        self.members(parent)
            .into_iter()
            .find(|id| self.decl(*id).name == name)
    }

    /// Find a top-level declaration by name in any module, preferring the
    /// earliest module registered
    pub fn lookup_any(&self, name: &str) -> Option<DeclId> {
        (0..self.modules.len())
            .filter_map(|m| self.lookup(ModuleId(m as u32), name))
            .next()
    }

    /// Get or create the conformance `ty: protocol` declared in `module`
    pub fn add_conformance(&mut self, ty: CanType, protocol: DeclId, module: ModuleId) -> ConformanceId {
        let conformance = Conformance {
            ty,
            protocol,
            module,
        };
        if let Some(id) = self.conformance_lookup.get(&conformance) {
            return *id;
        }
        let id = ConformanceId(self.conformances.len() as u32);
        self.conformances.push(conformance.clone());
        self.conformance_lookup.insert(conformance, id);
        id
    }

    pub fn conformance(&self, id: ConformanceId) -> &Conformance {
        &self.conformances[id.index()]
    }

    pub fn conformances(&self) -> impl Iterator<Item = (ConformanceId, &Conformance)> {
        self.conformances
            .iter()
            .enumerate()
            .map(|(i, c)| (ConformanceId(i as u32), c))
    }

    /// Chain of parent declarations from the outermost down to `id` itself
    pub fn decl_path(&self, id: DeclId) -> Vec<DeclId> {
        let mut path = vec![id];
        let mut current = self.decl(id).parent;
        while let Some(parent) = current {
            path.push(parent);
            current = self.decl(parent).parent;
        }
        path.reverse();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BuiltinType, Type};

    #[test]
    fn test_lookup_and_paths() {
        let mut ast = AstContext::new();
        let main = ast.add_module("main");
        assert_eq!(ast.add_module("main"), main);

        let outer = ast.add_decl(Decl::new("Outer", main, DeclKind::Struct { fields: vec![] }));
        let inner = ast.add_decl(
            Decl::new("method", main, DeclKind::Func { signature: None }).with_parent(outer),
        );

        assert_eq!(ast.lookup(main, "Outer"), Some(outer));
        assert_eq!(ast.lookup(main, "method"), None);
        assert_eq!(ast.decl_path(inner), vec![outer, inner]);
    }

    #[test]
    fn test_conformances_are_uniqued() {
        let mut ast = AstContext::new();
        let main = ast.add_module("main");
        let proto = ast.add_decl(Decl::new(
            "P",
            main,
            DeclKind::Protocol {
                requirements: vec![],
                associated_types: vec![],
            },
        ));
        let ty = CanType::new(Type::Builtin(BuiltinType::Int(64)));
        let a = ast.add_conformance(ty.clone(), proto, main);
        let b = ast.add_conformance(ty, proto, main);
        assert_eq!(a, b);
        assert_eq!(ast.conformances().count(), 1);
    }
}
