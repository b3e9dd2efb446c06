//! Typed storage addresses used while lowering aggregates

use crate::ast::AstContext;
use crate::middle::ir::ValueId;
use crate::sil_invariant;
use crate::types::{Alignment, Size, Type, TypeLayout};

/// The location of some storage together with its known alignment.
///
/// An address does not own the storage. The default value is the invalid
/// address; every other address has a storage value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address {
    storage: Option<ValueId>,
    alignment: Alignment,
}

impl Address {
    pub fn new(storage: ValueId, alignment: Alignment) -> Self {
        sil_invariant!(!alignment.is_zero(), "address of {} has no alignment", storage);
        Self {
            storage: Some(storage),
            alignment,
        }
    }

    pub fn invalid() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.storage.is_some()
    }

    pub fn storage(&self) -> ValueId {
        match self.storage {
            Some(storage) => storage,
            None => crate::invariant_violation!("storage of an invalid address"),
        }
    }

    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    /// An address `offset` bytes into this one, held in `projected`
    pub fn project(&self, projected: ValueId, offset: Size) -> Address {
        sil_invariant!(self.is_valid(), "projecting from an invalid address");
        Address::new(projected, self.alignment.alignment_at_offset(offset))
    }

    /// The address of field `index` of the tuple or struct stored here
    pub fn project_field(
        &self,
        projected: ValueId,
        ty: &Type,
        index: usize,
        ast: &AstContext,
    ) -> Address {
        let offsets = TypeLayout::field_offsets(ty, ast);
        match offsets.get(index) {
            Some(offset) => self.project(projected, *offset),
            None => crate::invariant_violation!("field {} of a type with {} fields", index, offsets.len()),
        }
    }
}

/// An address whose storage belongs to a heap object that must be released
/// when the address is no longer needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnedAddress {
    address: Address,
    owner: Option<ValueId>,
}

impl OwnedAddress {
    pub fn new(address: Address, owner: Option<ValueId>) -> Self {
        sil_invariant!(address.is_valid(), "owned address without storage");
        Self { address, owner }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// The allocation to release, if the storage is heap allocated
    pub fn owner(&self) -> Option<ValueId> {
        self.owner
    }
}

/// The address of a value stored inside a container, such as the payload
/// buffer of an existential, together with the container's own address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainedAddress {
    container: Address,
    address: Address,
}

impl ContainedAddress {
    pub fn new(container: Address, address: Address) -> Self {
        sil_invariant!(
            container.is_valid() && address.is_valid(),
            "contained address without storage"
        );
        Self { container, address }
    }

    pub fn container(&self) -> Address {
        self.container
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(n: u32) -> ValueId {
        ValueId(n)
    }

    #[test]
    fn test_projection_keeps_alignment_in_bounds() {
        let ast = AstContext::new();
        let base = Address::new(value(0), Alignment::new(16));
        let ty = Type::Tuple(vec![Type::int(8), Type::int(32), Type::int(64)]);
        assert_eq!(base.project_field(value(1), &ty, 0, &ast).alignment(), Alignment::new(16));
        assert_eq!(base.project_field(value(2), &ty, 1, &ast).alignment(), Alignment::new(4));
        assert_eq!(base.project_field(value(3), &ty, 2, &ast).alignment(), Alignment::new(8));
        assert_eq!(base.project_field(value(3), &ty, 2, &ast).storage(), value(3));
    }

    #[test]
    fn test_invalid_address_has_no_storage() {
        let address = Address::invalid();
        assert!(!address.is_valid());
        let result = std::panic::catch_unwind(|| address.storage());
        assert!(result
            .unwrap_err()
            .downcast_ref::<crate::utils::InvariantViolation>()
            .is_some());
    }

    #[test]
    fn test_owned_and_contained_addresses() {
        let buffer = Address::new(value(4), Alignment::new(8));
        let owned = OwnedAddress::new(buffer, Some(value(5)));
        assert_eq!(owned.owner(), Some(value(5)));
        assert_eq!(owned.address().storage(), value(4));

        let payload = buffer.project(value(6), Size::new(8));
        let contained = ContainedAddress::new(buffer, payload);
        assert_eq!(contained.container(), buffer);
        assert_eq!(contained.address().storage(), value(6));
    }
}
