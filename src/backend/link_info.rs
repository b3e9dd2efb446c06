//! Object-file linkage of link entities

use log::debug;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::ast::ModuleId;
use crate::backend::link_entity::LinkEntity;
use crate::backend::object::{ObjectFormat, ObjectModule, Symbol, SymbolId};
use crate::middle::ir::{SilLinkage, SilModule};

/// Object-file linkage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
pub enum Linkage {
    External,
    /// A copy of a definition owned by another module; may be discarded
    AvailableExternally,
    /// Identical definitions in several objects are merged
    LinkOnceOdr,
    Internal,
    ExternalWeak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
pub enum Visibility {
    Default,
    Hidden,
}

/// COFF import/export marking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
pub enum DllStorage {
    Default,
    Import,
    Export,
}

/// Whether a query is for emitting the entity or only referring to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForDefinition {
    Definition,
    Declaration,
}

/// What the current object emits for entities owned by other modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionPolicy {
    /// Only declare them
    #[default]
    DeclareExternals,
    /// Emit serialized bodies as discardable copies
    EmitFragileExternals,
}

/// Module-wide settings for linkage decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkPolicy {
    pub current_module: ModuleId,
    pub object_format: ObjectFormat,
    pub definitions: DefinitionPolicy,
}

impl LinkPolicy {
    pub fn new(current_module: ModuleId, object_format: ObjectFormat) -> Self {
        Self {
            current_module,
            object_format,
            definitions: DefinitionPolicy::default(),
        }
    }

    pub fn with_definitions(mut self, definitions: DefinitionPolicy) -> Self {
        self.definitions = definitions;
        self
    }
}

/// Symbol name and linkage attributes of one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkInfo {
    pub name: String,
    pub linkage: Linkage,
    pub visibility: Visibility,
    pub dll_storage: DllStorage,
}

impl LinkInfo {
    /// Compute the link info of `entity` without touching any symbol table
    pub fn compute(
        entity: &LinkEntity,
        module: &SilModule,
        policy: &LinkPolicy,
        for_definition: ForDefinition,
    ) -> LinkInfo {
        let sil_linkage = entity.sil_linkage(module, policy);
        let is_definition = for_definition == ForDefinition::Definition;

        let visibility = match sil_linkage {
            SilLinkage::Public | SilLinkage::PublicExternal | SilLinkage::Private => Visibility::Default,
            SilLinkage::Hidden
            | SilLinkage::HiddenExternal
            | SilLinkage::Shared
            | SilLinkage::SharedExternal => Visibility::Hidden,
        };

        let linkage = match sil_linkage {
            SilLinkage::Public | SilLinkage::Hidden => Linkage::External,
            SilLinkage::Private => Linkage::Internal,
            SilLinkage::Shared | SilLinkage::SharedExternal if is_definition => Linkage::LinkOnceOdr,
            _ if is_definition
                && policy.definitions == DefinitionPolicy::EmitFragileExternals
                && entity.is_fragile(module) =>
            {
                Linkage::AvailableExternally
            }
            _ if entity.is_weak_imported(module) => Linkage::ExternalWeak,
            _ => Linkage::External,
        };

        let dll_storage = match (policy.object_format, visibility, linkage) {
            (ObjectFormat::Coff, Visibility::Default, Linkage::Internal) => DllStorage::Default,
            (ObjectFormat::Coff, Visibility::Default, _) => {
                if is_definition && !entity.is_available_externally(module, policy) {
                    DllStorage::Export
                } else {
                    DllStorage::Import
                }
            }
            _ => DllStorage::Default,
        };

        LinkInfo {
            name: entity.mangle(module),
            linkage,
            visibility,
            dll_storage,
        }
    }

    /// Compute the link info of `entity` and create or look up its symbol
    /// in `object`. A definition marks the symbol defined.
    pub fn get(
        entity: &LinkEntity,
        module: &SilModule,
        policy: &LinkPolicy,
        for_definition: ForDefinition,
        object: &mut ObjectModule,
    ) -> (LinkInfo, SymbolId) {
        let info = Self::compute(entity, module, policy, for_definition);
        // Owned elsewhere and only declared here
        let declared_only = entity.is_available_externally(module, policy)
            && matches!(info.linkage, Linkage::External | Linkage::ExternalWeak);
        let defined = for_definition == ForDefinition::Definition && !declared_only;
        let symbol = object.get_or_insert(Symbol {
            name: info.name.clone(),
            kind: entity.symbol_kind(),
            linkage: info.linkage,
            visibility: info.visibility,
            dll_storage: info.dll_storage,
            defined,
        });
        debug!(
            "{} '{}': {} {} ({})",
            entity.kind(),
            info.name,
            info.linkage,
            info.visibility,
            if defined { "defined" } else { "declared" }
        );
        (info, symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AccessLevel, Decl, DeclAttributes, DeclKind};
    use crate::frontend::parse_sil;

    const MODULE: &str = "sil public_external [serialized] @inlinable : $@convention(thin) () -> () {
bb0:
  %0 = tuple ()
  return %0 : $()
}

sil shared @helper : $@convention(thin) () -> () {
bb0:
  %0 = tuple ()
  return %0 : $()
}

sil private @local : $@convention(thin) () -> () {
bb0:
  %0 = tuple ()
  return %0 : $()
}

sil @entry : $@convention(thin) () -> () {
bb0:
  %0 = tuple ()
  return %0 : $()
}

sil_global hidden @counter : $Builtin.Int64
";

    fn module() -> SilModule {
        parse_sil(MODULE).unwrap()
    }

    fn info(module: &SilModule, policy: &LinkPolicy, name: &str, for_definition: ForDefinition) -> LinkInfo {
        let entity = LinkEntity::for_sil_function(module.find_function(name).unwrap());
        LinkInfo::compute(&entity, module, policy, for_definition)
    }

    #[test]
    fn test_sil_linkage_mapping() {
        let module = module();
        let policy = LinkPolicy::new(module.module_id, ObjectFormat::Elf);

        let entry = info(&module, &policy, "entry", ForDefinition::Definition);
        assert_eq!((entry.linkage, entry.visibility), (Linkage::External, Visibility::Default));

        let helper = info(&module, &policy, "helper", ForDefinition::Definition);
        assert_eq!((helper.linkage, helper.visibility), (Linkage::LinkOnceOdr, Visibility::Hidden));
        let helper = info(&module, &policy, "helper", ForDefinition::Declaration);
        assert_eq!(helper.linkage, Linkage::External);

        let local = info(&module, &policy, "local", ForDefinition::Definition);
        assert_eq!(local.linkage, Linkage::Internal);
        assert_eq!(local.visibility, Visibility::Default);

        let global = LinkEntity::for_sil_global(module.find_global("counter").unwrap());
        let counter = LinkInfo::compute(&global, &module, &policy, ForDefinition::Definition);
        assert_eq!(counter.name, "counter");
        assert_eq!(counter.visibility, Visibility::Hidden);
    }

    #[test]
    fn test_fragile_externals_follow_the_definition_policy() {
        let module = module();
        let declare = LinkPolicy::new(module.module_id, ObjectFormat::Elf);
        let emit = declare.with_definitions(DefinitionPolicy::EmitFragileExternals);

        let declared = info(&module, &declare, "inlinable", ForDefinition::Definition);
        assert_eq!(declared.linkage, Linkage::External);
        let emitted = info(&module, &emit, "inlinable", ForDefinition::Definition);
        assert_eq!(emitted.linkage, Linkage::AvailableExternally);
    }

    #[test]
    fn test_coff_import_and_export() {
        let mut module = module();
        let other = module.ast.add_module("Other");
        let imported = module.ast.add_decl(
            Decl::new("shared_state", other, DeclKind::Var { ty: crate::types::Type::int(64) })
                .with_access(AccessLevel::Public),
        );
        let policy = LinkPolicy::new(module.module_id, ObjectFormat::Coff);

        let entry = info(&module, &policy, "entry", ForDefinition::Definition);
        assert_eq!(entry.dll_storage, DllStorage::Export);

        let entity = LinkEntity::for_non_function(&module.ast, imported);
        let state = LinkInfo::compute(&entity, &module, &policy, ForDefinition::Declaration);
        assert_eq!(state.dll_storage, DllStorage::Import);
        assert_eq!(state.name, "_Tv5Other12shared_state");

        let elf = LinkPolicy::new(module.module_id, ObjectFormat::Elf);
        let state = LinkInfo::compute(&entity, &module, &elf, ForDefinition::Declaration);
        assert_eq!(state.dll_storage, DllStorage::Default);
    }

    #[test]
    fn test_weak_imports_are_external_weak() {
        let mut module = module();
        let other = module.ast.add_module("Other");
        let weak = module.ast.add_decl(
            Decl::new("maybe", other, DeclKind::Func { signature: None })
                .with_access(AccessLevel::Public)
                .with_attrs(DeclAttributes::WEAK_IMPORTED),
        );
        let policy = LinkPolicy::new(module.module_id, ObjectFormat::MachO);
        let entity = LinkEntity::for_function(&module.ast, weak, 0);
        let info = LinkInfo::compute(&entity, &module, &policy, ForDefinition::Declaration);
        assert_eq!(info.linkage, Linkage::ExternalWeak);
        assert_eq!(info.name, "_TF5Other5maybe_0");
    }

    #[test]
    fn test_get_creates_the_symbol_once() {
        let module = module();
        let policy = LinkPolicy::new(module.module_id, ObjectFormat::Elf);
        let mut object = ObjectModule::new(policy.object_format);
        let entity = LinkEntity::for_sil_function(module.find_function("entry").unwrap());

        let (_, declared) = LinkInfo::get(&entity, &module, &policy, ForDefinition::Declaration, &mut object);
        assert!(!object.symbol(declared).defined);
        let (info, defined) = LinkInfo::get(&entity, &module, &policy, ForDefinition::Definition, &mut object);
        assert_eq!(declared, defined);
        assert_eq!(object.len(), 1);
        assert!(object.symbol(defined).defined);
        assert_eq!(object.find(&info.name), Some(defined));
    }
}
