//! Identities of things that need an external symbol
//!
//! A [`LinkEntity`] only refers to declarations, conformances and SIL
//! functions through their handles; it never owns them. Entities are built
//! through the `for_*` factories, which check that the referenced thing is
//! legal for the kind, and compare structurally so they can key symbol maps.

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::ast::{AccessLevel, AstContext, ConformanceId, DeclId, DeclKind, ModuleId};
use crate::backend::link_info::LinkPolicy;
use crate::backend::mangle::Mangler;
use crate::backend::object::SymbolKind;
use crate::middle::ir::{FunctionAttributes, FunctionId, GlobalAttributes, GlobalId, SilLinkage, SilModule};
use crate::types::{CanType, Type};
use crate::{invariant_violation, sil_invariant};

/// Entries of a value witness table that are emitted as functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
pub enum ValueWitness {
    #[strum(serialize = "CP")]
    InitializeBufferWithCopyOfBuffer,
    #[strum(serialize = "xx")]
    Destroy,
    #[strum(serialize = "cp")]
    InitializeWithCopy,
    #[strum(serialize = "ca")]
    AssignWithCopy,
    #[strum(serialize = "tk")]
    InitializeWithTake,
    #[strum(serialize = "ta")]
    AssignWithTake,
}

/// Discriminant of a [`LinkEntity`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum LinkEntityKind {
    Function,
    Other,
    FieldOffset,
    NominalTypeDescriptor,
    ProtocolDescriptor,
    TypeMetadata,
    TypeMetadataAccessFunction,
    ValueWitness,
    ValueWitnessTable,
    DirectProtocolWitnessTable,
    ProtocolWitnessTableAccessFunction,
    AssociatedTypeMetadataAccessFunction,
    SilFunction,
    SilGlobal,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Entity {
    Function { decl: DeclId, uncurry_level: u32 },
    Other { decl: DeclId },
    FieldOffset { decl: DeclId, is_indirect: bool },
    NominalTypeDescriptor { decl: DeclId },
    ProtocolDescriptor { decl: DeclId },
    TypeMetadata { ty: CanType, is_address_point: bool },
    TypeMetadataAccessFunction { ty: CanType },
    ValueWitness { ty: CanType, witness: ValueWitness },
    ValueWitnessTable { ty: CanType },
    DirectProtocolWitnessTable { conformance: ConformanceId },
    ProtocolWitnessTableAccessFunction { conformance: ConformanceId },
    AssociatedTypeMetadataAccessFunction { conformance: ConformanceId, index: u32 },
    SilFunction { function: FunctionId },
    SilGlobal { global: GlobalId },
}

/// Something that needs a stable symbol name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkEntity(Entity);

impl LinkEntity {
    // ==================== Factories ====================

    /// A function or constructor declaration at the given uncurry level
    pub fn for_function(ast: &AstContext, decl: DeclId, uncurry_level: u32) -> Self {
        let kind = &ast.decl(decl).kind;
        sil_invariant!(
            kind.is_function_like(),
            "'{}' declaration used as a function entity",
            kind.keyword()
        );
        LinkEntity(Entity::Function {
            decl,
            uncurry_level,
        })
    }

    /// Any declaration that is not function-like, such as a global variable
    pub fn for_non_function(ast: &AstContext, decl: DeclId) -> Self {
        let d = ast.decl(decl);
        sil_invariant!(
            !d.kind.is_function_like(),
            "function '{}' used as a non-function entity",
            d.name
        );
        LinkEntity(Entity::Other { decl })
    }

    /// Offset of a stored property within its struct or class
    pub fn for_field_offset(ast: &AstContext, decl: DeclId, is_indirect: bool) -> Self {
        let d = ast.decl(decl);
        let in_aggregate = d.parent.is_some_and(|p| {
            matches!(ast.decl(p).kind, DeclKind::Struct { .. } | DeclKind::Class { .. })
        });
        sil_invariant!(
            matches!(d.kind, DeclKind::Var { .. }) && in_aggregate,
            "'{}' is not a stored property",
            d.name
        );
        LinkEntity(Entity::FieldOffset { decl, is_indirect })
    }

    pub fn for_nominal_type_descriptor(ast: &AstContext, decl: DeclId) -> Self {
        let kind = &ast.decl(decl).kind;
        sil_invariant!(
            kind.is_nominal_type() && !matches!(kind, DeclKind::Protocol { .. }),
            "'{}' declaration has no nominal type descriptor",
            kind.keyword()
        );
        LinkEntity(Entity::NominalTypeDescriptor { decl })
    }

    pub fn for_protocol_descriptor(ast: &AstContext, decl: DeclId) -> Self {
        let kind = &ast.decl(decl).kind;
        sil_invariant!(
            matches!(kind, DeclKind::Protocol { .. }),
            "'{}' declaration is not a protocol",
            kind.keyword()
        );
        LinkEntity(Entity::ProtocolDescriptor { decl })
    }

    /// Type metadata; `is_address_point` selects the symbol clients point
    /// at rather than the start of the full record
    pub fn for_type_metadata(ty: CanType, is_address_point: bool) -> Self {
        LinkEntity(Entity::TypeMetadata {
            ty,
            is_address_point,
        })
    }

    pub fn for_type_metadata_access_function(ty: CanType) -> Self {
        LinkEntity(Entity::TypeMetadataAccessFunction { ty })
    }

    pub fn for_value_witness(ty: CanType, witness: ValueWitness) -> Self {
        LinkEntity(Entity::ValueWitness { ty, witness })
    }

    pub fn for_value_witness_table(ty: CanType) -> Self {
        LinkEntity(Entity::ValueWitnessTable { ty })
    }

    pub fn for_direct_protocol_witness_table(conformance: ConformanceId) -> Self {
        LinkEntity(Entity::DirectProtocolWitnessTable { conformance })
    }

    pub fn for_protocol_witness_table_access_function(conformance: ConformanceId) -> Self {
        LinkEntity(Entity::ProtocolWitnessTableAccessFunction { conformance })
    }

    /// Accessor for associated type `index` of the conformance's protocol
    pub fn for_associated_type_metadata_access_function(
        ast: &AstContext,
        conformance: ConformanceId,
        index: u32,
    ) -> Self {
        let count = associated_types(ast, conformance).len();
        sil_invariant!(
            (index as usize) < count,
            "associated type {} of a protocol with {}",
            index,
            count
        );
        LinkEntity(Entity::AssociatedTypeMetadataAccessFunction { conformance, index })
    }

    pub fn for_sil_function(function: FunctionId) -> Self {
        LinkEntity(Entity::SilFunction { function })
    }

    pub fn for_sil_global(global: GlobalId) -> Self {
        LinkEntity(Entity::SilGlobal { global })
    }

    // ==================== Accessors ====================

    pub fn kind(&self) -> LinkEntityKind {
        match &self.0 {
            Entity::Function { .. } => LinkEntityKind::Function,
            Entity::Other { .. } => LinkEntityKind::Other,
            Entity::FieldOffset { .. } => LinkEntityKind::FieldOffset,
            Entity::NominalTypeDescriptor { .. } => LinkEntityKind::NominalTypeDescriptor,
            Entity::ProtocolDescriptor { .. } => LinkEntityKind::ProtocolDescriptor,
            Entity::TypeMetadata { .. } => LinkEntityKind::TypeMetadata,
            Entity::TypeMetadataAccessFunction { .. } => LinkEntityKind::TypeMetadataAccessFunction,
            Entity::ValueWitness { .. } => LinkEntityKind::ValueWitness,
            Entity::ValueWitnessTable { .. } => LinkEntityKind::ValueWitnessTable,
            Entity::DirectProtocolWitnessTable { .. } => LinkEntityKind::DirectProtocolWitnessTable,
            Entity::ProtocolWitnessTableAccessFunction { .. } => {
                LinkEntityKind::ProtocolWitnessTableAccessFunction
            }
            Entity::AssociatedTypeMetadataAccessFunction { .. } => {
                LinkEntityKind::AssociatedTypeMetadataAccessFunction
            }
            Entity::SilFunction { .. } => LinkEntityKind::SilFunction,
            Entity::SilGlobal { .. } => LinkEntityKind::SilGlobal,
        }
    }

    /// The declaration of a declaration-based entity
    pub fn decl(&self) -> DeclId {
        match &self.0 {
            Entity::Function { decl, .. }
            | Entity::Other { decl }
            | Entity::FieldOffset { decl, .. }
            | Entity::NominalTypeDescriptor { decl }
            | Entity::ProtocolDescriptor { decl } => *decl,
            _ => invariant_violation!("{} entity has no declaration", self.kind()),
        }
    }

    pub fn uncurry_level(&self) -> u32 {
        match &self.0 {
            Entity::Function { uncurry_level, .. } => *uncurry_level,
            _ => invariant_violation!("{} entity has no uncurry level", self.kind()),
        }
    }

    pub fn is_indirect_field_offset(&self) -> bool {
        match &self.0 {
            Entity::FieldOffset { is_indirect, .. } => *is_indirect,
            _ => invariant_violation!("{} entity is not a field offset", self.kind()),
        }
    }

    /// The type of a type-based entity
    pub fn ty(&self) -> &CanType {
        match &self.0 {
            Entity::TypeMetadata { ty, .. }
            | Entity::TypeMetadataAccessFunction { ty }
            | Entity::ValueWitness { ty, .. }
            | Entity::ValueWitnessTable { ty } => ty,
            _ => invariant_violation!("{} entity has no type", self.kind()),
        }
    }

    pub fn is_metadata_address_point(&self) -> bool {
        match &self.0 {
            Entity::TypeMetadata {
                is_address_point, ..
            } => *is_address_point,
            _ => invariant_violation!("{} entity is not type metadata", self.kind()),
        }
    }

    pub fn value_witness(&self) -> ValueWitness {
        match &self.0 {
            Entity::ValueWitness { witness, .. } => *witness,
            _ => invariant_violation!("{} entity is not a value witness", self.kind()),
        }
    }

    /// The conformance of a conformance-based entity
    pub fn conformance(&self) -> ConformanceId {
        match &self.0 {
            Entity::DirectProtocolWitnessTable { conformance }
            | Entity::ProtocolWitnessTableAccessFunction { conformance }
            | Entity::AssociatedTypeMetadataAccessFunction { conformance, .. } => *conformance,
            _ => invariant_violation!("{} entity has no conformance", self.kind()),
        }
    }

    pub fn associated_type_index(&self) -> u32 {
        match &self.0 {
            Entity::AssociatedTypeMetadataAccessFunction { index, .. } => *index,
            _ => invariant_violation!("{} entity has no associated type", self.kind()),
        }
    }

    pub fn sil_function(&self) -> FunctionId {
        match &self.0 {
            Entity::SilFunction { function } => *function,
            _ => invariant_violation!("{} entity is not a SIL function", self.kind()),
        }
    }

    pub fn sil_global(&self) -> GlobalId {
        match &self.0 {
            Entity::SilGlobal { global } => *global,
            _ => invariant_violation!("{} entity is not a SIL global", self.kind()),
        }
    }

    /// Whether the symbol names code rather than data
    pub fn symbol_kind(&self) -> SymbolKind {
        match &self.0 {
            Entity::Function { .. }
            | Entity::TypeMetadataAccessFunction { .. }
            | Entity::ValueWitness { .. }
            | Entity::ProtocolWitnessTableAccessFunction { .. }
            | Entity::AssociatedTypeMetadataAccessFunction { .. }
            | Entity::SilFunction { .. } => SymbolKind::Function,
            _ => SymbolKind::Variable,
        }
    }

    // ==================== Naming ====================

    /// The symbol name of the entity
    pub fn mangle(&self, module: &SilModule) -> String {
        let ast = &module.ast;
        match &self.0 {
            Entity::SilFunction { function } => return module.function(*function).name.clone(),
            Entity::SilGlobal { global } => return module.global(*global).name.clone(),
            _ => {}
        }

        let mut m = Mangler::new(ast);
        match &self.0 {
            Entity::Function {
                decl,
                uncurry_level,
            } => {
                m.append("_TF");
                m.mangle_decl_context(*decl);
                if let DeclKind::Func {
                    signature: Some(sig),
                }
                | DeclKind::Constructor {
                    signature: Some(sig),
                } = &ast.decl(*decl).kind
                {
                    m.mangle_type(&Type::Function(Box::new(sig.clone())));
                }
                m.append("_");
                m.mangle_natural(u128::from(*uncurry_level));
            }
            Entity::Other { decl } => {
                m.append("_Tv");
                m.mangle_decl_context(*decl);
            }
            Entity::FieldOffset { decl, is_indirect } => {
                m.append(if *is_indirect { "_TWvi" } else { "_TWvd" });
                m.mangle_decl_context(*decl);
            }
            Entity::NominalTypeDescriptor { decl } => {
                m.append("_TMn");
                m.mangle_nominal(*decl);
            }
            Entity::ProtocolDescriptor { decl } => {
                m.append("_TMp");
                m.mangle_nominal(*decl);
            }
            Entity::TypeMetadata {
                ty,
                is_address_point,
            } => {
                m.append(if *is_address_point { "_TM" } else { "_TMf" });
                m.mangle_type(ty.get());
            }
            Entity::TypeMetadataAccessFunction { ty } => {
                m.append("_TMa");
                m.mangle_type(ty.get());
            }
            Entity::ValueWitness { ty, witness } => {
                let code: &'static str = (*witness).into();
                m.append("_Tw");
                m.append(code);
                m.mangle_type(ty.get());
            }
            Entity::ValueWitnessTable { ty } => {
                m.append("_TWV");
                m.mangle_type(ty.get());
            }
            Entity::DirectProtocolWitnessTable { conformance } => {
                m.append("_TWP");
                m.mangle_protocol_conformance(*conformance);
            }
            Entity::ProtocolWitnessTableAccessFunction { conformance } => {
                m.append("_TWa");
                m.mangle_protocol_conformance(*conformance);
            }
            Entity::AssociatedTypeMetadataAccessFunction { conformance, index } => {
                m.append("_TWt");
                m.mangle_protocol_conformance(*conformance);
                m.mangle_identifier(&associated_types(ast, *conformance)[*index as usize]);
            }
            Entity::SilFunction { .. } | Entity::SilGlobal { .. } => {}
        }
        m.finalize()
    }

    // ==================== Linkage ====================

    /// SIL linkage of the entity as seen from the module being compiled
    pub fn sil_linkage(&self, module: &SilModule, policy: &LinkPolicy) -> SilLinkage {
        let ast = &module.ast;
        let linkage = match &self.0 {
            Entity::SilFunction { function } => return module.function(*function).linkage,
            Entity::SilGlobal { global } => return module.global(*global).linkage,
            Entity::Function { decl, .. }
            | Entity::Other { decl }
            | Entity::FieldOffset { decl, .. }
            | Entity::NominalTypeDescriptor { decl }
            | Entity::ProtocolDescriptor { decl } => linkage_for_access(effective_access(ast, *decl)),
            Entity::TypeMetadata { ty, .. }
            | Entity::TypeMetadataAccessFunction { ty }
            | Entity::ValueWitness { ty, .. }
            | Entity::ValueWitnessTable { ty } => match ty.get().nominal_decl() {
                Some(decl) => linkage_for_access(effective_access(ast, decl)),
                // Structural types are uniqued in every module that uses them
                None => SilLinkage::Shared,
            },
            Entity::DirectProtocolWitnessTable { conformance }
            | Entity::ProtocolWitnessTableAccessFunction { conformance }
            | Entity::AssociatedTypeMetadataAccessFunction { conformance, .. } => {
                let c = ast.conformance(*conformance);
                let mut access = effective_access(ast, c.protocol);
                if let Some(decl) = c.ty.get().nominal_decl() {
                    access = access.min(effective_access(ast, decl));
                }
                linkage_for_access(access)
            }
        };
        if self.is_available_externally(module, policy) {
            linkage.as_external()
        } else {
            linkage
        }
    }

    /// Whether the entity is defined by a module other than the current one
    pub fn is_available_externally(&self, module: &SilModule, policy: &LinkPolicy) -> bool {
        match self.defining_module(module) {
            Some(defining) => defining != policy.current_module,
            None => match &self.0 {
                Entity::SilFunction { function } => module.function(*function).linkage.is_external(),
                Entity::SilGlobal { global } => module.global(*global).linkage.is_external(),
                _ => false,
            },
        }
    }

    /// Whether the entity's body is visible to other modules
    pub fn is_fragile(&self, module: &SilModule) -> bool {
        let ast = &module.ast;
        match &self.0 {
            Entity::SilFunction { function } => {
                let f = module.function(*function);
                f.attrs.contains(FunctionAttributes::SERIALIZED)
                    || f.decl.is_some_and(|d| ast.decl(d).is_fragile())
            }
            Entity::SilGlobal { global } => module
                .global(*global)
                .attrs
                .contains(GlobalAttributes::SERIALIZED),
            Entity::Function { decl, .. } | Entity::Other { decl } => ast.decl(*decl).is_fragile(),
            _ => false,
        }
    }

    /// Whether the symbol may be missing at load time
    pub fn is_weak_imported(&self, module: &SilModule) -> bool {
        let ast = &module.ast;
        match &self.0 {
            Entity::SilFunction { function } => module
                .function(*function)
                .decl
                .is_some_and(|d| decl_is_weak_imported(ast, d)),
            Entity::SilGlobal { global } => module
                .global(*global)
                .decl
                .is_some_and(|d| decl_is_weak_imported(ast, d)),
            Entity::Function { decl, .. }
            | Entity::Other { decl }
            | Entity::FieldOffset { decl, .. }
            | Entity::NominalTypeDescriptor { decl }
            | Entity::ProtocolDescriptor { decl } => decl_is_weak_imported(ast, *decl),
            Entity::TypeMetadata { ty, .. }
            | Entity::TypeMetadataAccessFunction { ty }
            | Entity::ValueWitness { ty, .. }
            | Entity::ValueWitnessTable { ty } => ty
                .get()
                .nominal_decl()
                .is_some_and(|d| decl_is_weak_imported(ast, d)),
            Entity::DirectProtocolWitnessTable { conformance }
            | Entity::ProtocolWitnessTableAccessFunction { conformance }
            | Entity::AssociatedTypeMetadataAccessFunction { conformance, .. } => {
                decl_is_weak_imported(ast, ast.conformance(*conformance).protocol)
            }
        }
    }

    fn defining_module(&self, module: &SilModule) -> Option<ModuleId> {
        let ast = &module.ast;
        match &self.0 {
            Entity::Function { decl, .. }
            | Entity::Other { decl }
            | Entity::FieldOffset { decl, .. }
            | Entity::NominalTypeDescriptor { decl }
            | Entity::ProtocolDescriptor { decl } => Some(ast.decl(*decl).module),
            Entity::TypeMetadata { ty, .. }
            | Entity::TypeMetadataAccessFunction { ty }
            | Entity::ValueWitness { ty, .. }
            | Entity::ValueWitnessTable { ty } => ty.get().nominal_decl().map(|d| ast.decl(d).module),
            Entity::DirectProtocolWitnessTable { conformance }
            | Entity::ProtocolWitnessTableAccessFunction { conformance }
            | Entity::AssociatedTypeMetadataAccessFunction { conformance, .. } => {
                Some(ast.conformance(*conformance).module)
            }
            Entity::SilFunction { .. } | Entity::SilGlobal { .. } => None,
        }
    }
}

fn associated_types(ast: &AstContext, conformance: ConformanceId) -> &[String] {
    match &ast.decl(ast.conformance(conformance).protocol).kind {
        DeclKind::Protocol {
            associated_types, ..
        } => associated_types,
        _ => &[],
    }
}

/// Access of a declaration, narrowed by every enclosing declaration
fn effective_access(ast: &AstContext, decl: DeclId) -> AccessLevel {
    ast.decl_path(decl)
        .into_iter()
        .map(|d| ast.decl(d).access)
        .min()
        .unwrap_or(AccessLevel::Internal)
}

fn linkage_for_access(access: AccessLevel) -> SilLinkage {
    match access {
        AccessLevel::Public | AccessLevel::Open => SilLinkage::Public,
        AccessLevel::Internal => SilLinkage::Hidden,
        AccessLevel::Private | AccessLevel::FilePrivate => SilLinkage::Private,
    }
}

/// The declaration is weak-linked, or it is a function whose imported
/// Objective-C node is
fn decl_is_weak_imported(ast: &AstContext, decl: DeclId) -> bool {
    let d = ast.decl(decl);
    d.is_weak_imported()
        || (d.kind.is_function_like() && d.clang_node.is_some_and(|node| node.weak_imported))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ClangNode, Decl, DeclAttributes};
    use crate::backend::object::ObjectFormat;
    use crate::frontend::parse_sil;
    use crate::types::Type;
    use std::collections::HashSet;
    use strum::IntoEnumIterator;

    const FUNCTIONS: &str = "sil @f : $@convention(thin) () -> ()
sil @g : $@convention(thin) () -> ()
sil_global hidden @counter : $Builtin.Int64
struct Point {
  var x: Builtin.Int64
}
";

    fn module() -> SilModule {
        parse_sil(FUNCTIONS).unwrap()
    }

    fn policy(module: &SilModule) -> LinkPolicy {
        LinkPolicy::new(module.module_id, ObjectFormat::Elf)
    }

    fn is_invariant_violation<R>(f: impl FnOnce() -> R + std::panic::UnwindSafe) -> bool {
        std::panic::catch_unwind(f)
            .err()
            .is_some_and(|payload| payload.downcast_ref::<crate::utils::InvariantViolation>().is_some())
    }

    #[test]
    fn test_entities_compare_structurally() {
        let module = module();
        let f = module.find_function("f").unwrap();
        let g = module.find_function("g").unwrap();
        let counter = module.find_global("counter").unwrap();

        assert_eq!(LinkEntity::for_sil_function(f), LinkEntity::for_sil_function(f));
        assert_ne!(LinkEntity::for_sil_function(f), LinkEntity::for_sil_function(g));
        // Same raw index, different kind
        assert_eq!(f.index(), counter.index());
        assert_ne!(LinkEntity::for_sil_function(f), LinkEntity::for_sil_global(counter));

        let set: HashSet<_> = [
            LinkEntity::for_sil_function(f),
            LinkEntity::for_sil_function(f),
            LinkEntity::for_sil_function(g),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_factories_check_their_declaration() {
        let mut module = module();
        let main = module.module_id;
        let point = module.ast.lookup(main, "Point").unwrap();
        let method = module
            .ast
            .add_decl(Decl::new("norm", main, DeclKind::Func { signature: None }).with_parent(point));
        let ast = &module.ast;

        assert_eq!(LinkEntity::for_function(ast, method, 1).uncurry_level(), 1);
        assert_eq!(LinkEntity::for_non_function(ast, point).decl(), point);
        assert!(is_invariant_violation(|| LinkEntity::for_non_function(ast, method)));
        assert!(is_invariant_violation(|| LinkEntity::for_function(ast, point, 0)));
        assert!(is_invariant_violation(|| LinkEntity::for_protocol_descriptor(ast, point)));

        let entity = LinkEntity::for_sil_function(module.find_function("f").unwrap());
        assert!(is_invariant_violation(|| entity.decl()));
    }

    #[test]
    fn test_entity_names() {
        let mut module = module();
        let main = module.module_id;
        let point = module.ast.lookup(main, "Point").unwrap();
        let x = module.ast.add_decl(
            Decl::new("x", main, DeclKind::Var { ty: Type::int(64) }).with_parent(point),
        );
        let ty = CanType::new(Type::Nominal(point));
        let ast = &module.ast;

        let names = [
            (LinkEntity::for_field_offset(ast, x, false), "_TWvd4main5Point1x"),
            (LinkEntity::for_nominal_type_descriptor(ast, point), "_TMnV4main5Point"),
            (LinkEntity::for_type_metadata(ty.clone(), true), "_TMV4main5Point"),
            (LinkEntity::for_type_metadata(ty.clone(), false), "_TMfV4main5Point"),
            (LinkEntity::for_type_metadata_access_function(ty.clone()), "_TMaV4main5Point"),
            (LinkEntity::for_value_witness(ty.clone(), ValueWitness::Destroy), "_TwxxV4main5Point"),
            (LinkEntity::for_value_witness_table(ty), "_TWVV4main5Point"),
            (LinkEntity::for_sil_global(module.find_global("counter").unwrap()), "counter"),
        ];
        for (entity, name) in names {
            assert_eq!(entity.mangle(&module), name);
        }
    }

    #[test]
    fn test_value_witness_names_are_distinct() {
        let module = module();
        let ty = CanType::new(Type::int(8));
        let names: HashSet<String> = ValueWitness::iter()
            .map(|w| LinkEntity::for_value_witness(ty.clone(), w).mangle(&module))
            .collect();
        assert_eq!(names.len(), ValueWitness::iter().count());
    }

    #[test]
    fn test_linkage_follows_access_and_module() {
        let mut module = module();
        let main = module.module_id;
        let other = module.ast.add_module("Other");
        let public = module.ast.add_decl(
            Decl::new("api", main, DeclKind::Func { signature: None }).with_access(AccessLevel::Public),
        );
        let imported = module.ast.add_decl(
            Decl::new("lib", other, DeclKind::Func { signature: None })
                .with_access(AccessLevel::Public)
                .with_clang_node(ClangNode { weak_imported: true }),
        );
        let internal_var = module
            .ast
            .add_decl(Decl::new("state", main, DeclKind::Var { ty: Type::int(1) }));
        let policy = policy(&module);
        let ast = &module.ast;

        let api = LinkEntity::for_function(ast, public, 0);
        assert_eq!(api.sil_linkage(&module, &policy), SilLinkage::Public);
        assert!(!api.is_available_externally(&module, &policy));

        let lib = LinkEntity::for_function(ast, imported, 0);
        assert_eq!(lib.sil_linkage(&module, &policy), SilLinkage::PublicExternal);
        assert!(lib.is_available_externally(&module, &policy));
        assert!(lib.is_weak_imported(&module));

        let state = LinkEntity::for_non_function(ast, internal_var);
        assert_eq!(state.sil_linkage(&module, &policy), SilLinkage::Hidden);
        assert!(!state.is_weak_imported(&module));

        let tuple = LinkEntity::for_type_metadata(CanType::new(Type::Tuple(vec![])), true);
        assert_eq!(tuple.sil_linkage(&module, &policy), SilLinkage::Shared);
    }

    #[test]
    fn test_weak_import_of_non_function_ignores_clang_node() {
        let mut module = module();
        let other = module.ast.add_module("Other");
        let var = module.ast.add_decl(
            Decl::new("v", other, DeclKind::Var { ty: Type::int(1) })
                .with_clang_node(ClangNode { weak_imported: true }),
        );
        let weak = module.ast.add_decl(
            Decl::new("w", other, DeclKind::Var { ty: Type::int(1) })
                .with_attrs(DeclAttributes::WEAK_IMPORTED),
        );
        assert!(!LinkEntity::for_non_function(&module.ast, var).is_weak_imported(&module));
        assert!(LinkEntity::for_non_function(&module.ast, weak).is_weak_imported(&module));
    }
}
