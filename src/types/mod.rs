//! Type system

mod layout;
mod ownership;
mod sil_type;

pub use layout::{Alignment, Size, TypeLayout};
pub use ownership::OwnershipKind;
pub use sil_type::{
    BuiltinType, CanType, FunctionRepresentation, FunctionType, ParameterConvention,
    ResultConvention, SilParameter, SilType, SilTypeDisplay, Type, TypeDisplay,
};
