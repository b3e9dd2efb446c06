//! Backend module - symbol naming and linkage
//!
//! Machine code emission is done elsewhere; this module decides what every
//! emitted entity is called and how it links.

pub mod address;
pub mod link_entity;
pub mod link_info;
pub mod mangle;
pub mod object;

pub use address::{Address, ContainedAddress, OwnedAddress};
pub use link_entity::{LinkEntity, LinkEntityKind, ValueWitness};
pub use link_info::{DefinitionPolicy, DllStorage, ForDefinition, LinkInfo, LinkPolicy, Linkage, Visibility};
pub use mangle::{FunctionSignatureMangler, GenericSpecializationMangler, MangleError, Mangler};
pub use object::{ObjectFormat, ObjectModule, Symbol, SymbolId, SymbolKind};
