//! Symbol table of the object being emitted
//!
//! Code generation itself is out of scope; this is the part of the output
//! object the link-naming subsystem talks to. Symbols are created on first
//! lookup and never removed.

use std::collections::HashMap;

use serde::Serialize;
use strum::{Display, EnumString};

use crate::backend::link_info::{DllStorage, Linkage, Visibility};

// ==================== ELF Symbol Constants ====================

// Symbol Binding
pub const STB_LOCAL: u8 = 0;
pub const STB_GLOBAL: u8 = 1;
pub const STB_WEAK: u8 = 2;

// Symbol Visibility
pub const STV_DEFAULT: u8 = 0;
pub const STV_HIDDEN: u8 = 2;

/// Container format of the output object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase")]
pub enum ObjectFormat {
    #[default]
    Elf,
    MachO,
    Coff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Variable,
}

/// Handle of a symbol in an [`ObjectModule`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SymbolId(u32);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub linkage: Linkage,
    pub visibility: Visibility,
    pub dll_storage: DllStorage,
    /// Whether this object provides the definition
    pub defined: bool,
}

impl Symbol {
    /// ELF `st_info` binding for the symbol
    pub fn elf_binding(&self) -> u8 {
        match self.linkage {
            Linkage::Internal => STB_LOCAL,
            Linkage::LinkOnceOdr | Linkage::ExternalWeak => STB_WEAK,
            Linkage::External | Linkage::AvailableExternally => STB_GLOBAL,
        }
    }

    /// ELF `st_other` visibility for the symbol
    pub fn elf_visibility(&self) -> u8 {
        match self.visibility {
            Visibility::Default => STV_DEFAULT,
            Visibility::Hidden => STV_HIDDEN,
        }
    }
}

/// The symbols of one output object
#[derive(Debug, Clone, Default, Serialize)]
pub struct ObjectModule {
    pub format: ObjectFormat,
    symbols: Vec<Symbol>,
    #[serde(skip)]
    lookup: HashMap<String, SymbolId>,
}

impl ObjectModule {
    pub fn new(format: ObjectFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    /// Look up `symbol.name`, creating it from `symbol` when missing. A
    /// definition upgrades an existing declaration.
    pub fn get_or_insert(&mut self, symbol: Symbol) -> SymbolId {
        if let Some(id) = self.lookup.get(&symbol.name).copied() {
            let existing = &mut self.symbols[id.0 as usize];
            if symbol.defined && !existing.defined {
                *existing = symbol;
            }
            return id;
        }
        let id = SymbolId(self.symbols.len() as u32);
        self.lookup.insert(symbol.name.clone(), id);
        self.symbols.push(symbol);
        id
    }

    pub fn find(&self, name: &str) -> Option<SymbolId> {
        self.lookup.get(name).copied()
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn symbols(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (SymbolId(i as u32), s))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(name: &str, linkage: Linkage, defined: bool) -> Symbol {
        Symbol {
            name: name.into(),
            kind: SymbolKind::Function,
            linkage,
            visibility: Visibility::Hidden,
            dll_storage: DllStorage::Default,
            defined,
        }
    }

    #[test]
    fn test_symbols_are_created_once() {
        let mut object = ObjectModule::new(ObjectFormat::Elf);
        let a = object.get_or_insert(symbol("f", Linkage::External, false));
        let b = object.get_or_insert(symbol("f", Linkage::External, false));
        assert_eq!(a, b);
        assert_eq!(object.len(), 1);
        assert!(!object.symbol(a).defined);

        object.get_or_insert(symbol("f", Linkage::LinkOnceOdr, true));
        assert!(object.symbol(a).defined);
        assert_eq!(object.symbol(a).linkage, Linkage::LinkOnceOdr);
    }

    #[test]
    fn test_elf_attributes() {
        let shared = symbol("s", Linkage::LinkOnceOdr, true);
        assert_eq!(shared.elf_binding(), STB_WEAK);
        assert_eq!(shared.elf_visibility(), STV_HIDDEN);
        assert_eq!(symbol("p", Linkage::Internal, true).elf_binding(), STB_LOCAL);
        assert_eq!("macho".parse::<ObjectFormat>(), Ok(ObjectFormat::MachO));
    }
}
