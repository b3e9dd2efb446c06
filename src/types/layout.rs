//! Storage sizes, alignments and type layouts

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub};

use crate::ast::{AstContext, DeclKind};
use crate::sil_invariant;
use crate::types::{BuiltinType, FunctionRepresentation, Type};

const POINTER_SIZE: u64 = 8;
/// Inline buffer plus metadata and witness table pointers
const EXISTENTIAL_SIZE: u64 = 5 * POINTER_SIZE;

/// A size in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Size(u64);

impl Size {
    pub const fn new(bytes: u64) -> Self {
        Size(bytes)
    }

    pub const fn zero() -> Self {
        Size(0)
    }

    /// Sentinel for "not computed"
    pub const fn invalid() -> Self {
        Size(u64::MAX)
    }

    pub fn is_invalid(self) -> bool {
        self.0 == u64::MAX
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn round_up_to_alignment(self, align: Alignment) -> Size {
        sil_invariant!(!self.is_invalid(), "rounding an invalid size");
        let mask = align.value().saturating_sub(1);
        Size((self.0 + mask) & !mask)
    }

    pub fn is_multiple_of(self, align: Alignment) -> bool {
        align.value() == 0 || self.0 % align.value() == 0
    }
}

impl Add for Size {
    type Output = Size;
    fn add(self, rhs: Size) -> Size {
        Size(self.0 + rhs.0)
    }
}

impl AddAssign for Size {
    fn add_assign(&mut self, rhs: Size) {
        self.0 += rhs.0;
    }
}

impl Sub for Size {
    type Output = Size;
    fn sub(self, rhs: Size) -> Size {
        sil_invariant!(self.0 >= rhs.0, "size underflow: {} - {}", self.0, rhs.0);
        Size(self.0 - rhs.0)
    }
}

impl Mul<u64> for Size {
    type Output = Size;
    fn mul(self, rhs: u64) -> Size {
        Size(self.0 * rhs)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An alignment in bytes: a power of two, or zero when not yet known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Alignment(u64);

impl Alignment {
    pub fn new(bytes: u64) -> Self {
        sil_invariant!(
            bytes == 0 || bytes.is_power_of_two(),
            "alignment {} is not a power of two",
            bytes
        );
        Alignment(bytes)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn as_size(self) -> Size {
        Size(self.0)
    }

    /// Alignment guaranteed at `offset` bytes past an address with this
    /// alignment
    pub fn alignment_at_offset(self, offset: Size) -> Alignment {
        if offset.is_zero() || self.is_zero() {
            return self;
        }
        let offset_align = 1u64 << offset.value().trailing_zeros();
        Alignment(self.0.min(offset_align))
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed layout of a loadable type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeLayout {
    pub size: Size,
    pub alignment: Alignment,
    /// Distance between consecutive array elements; never zero
    pub stride: Size,
}

impl TypeLayout {
    fn scalar(bytes: u64) -> Self {
        Self::new(Size(bytes), Alignment::new(bytes.max(1)))
    }

    fn new(size: Size, alignment: Alignment) -> Self {
        let stride = size.round_up_to_alignment(alignment).max(Size(1));
        Self {
            size,
            alignment,
            stride,
        }
    }

    pub fn of(ty: &Type, ast: &AstContext) -> TypeLayout {
        match ty {
            Type::Builtin(BuiltinType::Int(bits)) => {
                let bytes = u64::from(bits.div_ceil(8)).next_power_of_two();
                Self::scalar(bytes.min(16))
            }
            Type::Builtin(BuiltinType::Float(bits)) => Self::scalar(u64::from(*bits) / 8),
            Type::Builtin(_) => Self::scalar(POINTER_SIZE),
            Type::Tuple(elements) => Self::aggregate(elements.iter(), ast).0,
            Type::Function(f) if f.representation == FunctionRepresentation::Thick => {
                Self::new(Size(2 * POINTER_SIZE), Alignment::new(POINTER_SIZE))
            }
            Type::Function(_) => Self::scalar(POINTER_SIZE),
            Type::Nominal(decl) => match &ast.decl(*decl).kind {
                DeclKind::Struct { fields } => Self::aggregate(fields.iter().map(|f| &f.ty), ast).0,
                DeclKind::Class { .. } => Self::scalar(POINTER_SIZE),
                DeclKind::Protocol { .. } => {
                    Self::new(Size(EXISTENTIAL_SIZE), Alignment::new(POINTER_SIZE))
                }
                DeclKind::Enum { cases } => {
                    let mut payload = Size::zero();
                    let mut alignment = Alignment::new(1);
                    for case in cases {
                        if let Some(ty) = &case.payload {
                            let layout = TypeLayout::of(ty, ast);
                            payload = payload.max(layout.size);
                            alignment = alignment.max(layout.alignment);
                        }
                    }
                    let tag = match cases.len() {
                        0 | 1 => 0,
                        2..=256 => 1,
                        _ => 2,
                    };
                    Self::new(payload + Size(tag), alignment)
                }
                kind => crate::invariant_violation!("'{}' declaration used as a type", kind.keyword()),
            },
        }
    }

    /// Byte offsets of the first-level fields of a tuple or struct
    pub fn field_offsets(ty: &Type, ast: &AstContext) -> Vec<Size> {
        match ty.field_types(ast) {
            Some(fields) => Self::aggregate(fields.iter(), ast).1,
            None => Vec::new(),
        }
    }

    fn aggregate<'a>(fields: impl Iterator<Item = &'a Type>, ast: &AstContext) -> (TypeLayout, Vec<Size>) {
        let mut offset = Size::zero();
        let mut alignment = Alignment::new(1);
        let mut offsets = Vec::new();
        for ty in fields {
            let layout = TypeLayout::of(ty, ast);
            offset = offset.round_up_to_alignment(layout.alignment);
            offsets.push(offset);
            offset += layout.size;
            alignment = alignment.max(layout.alignment);
        }
        (Self::new(offset, alignment), offsets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Decl, FieldDecl};

    #[test]
    fn test_round_up() {
        assert_eq!(Size::new(13).round_up_to_alignment(Alignment::new(8)), Size::new(16));
        assert_eq!(Size::new(16).round_up_to_alignment(Alignment::new(8)), Size::new(16));
        assert_eq!(Size::new(3).round_up_to_alignment(Alignment::new(0)), Size::new(3));
        assert!(Size::invalid().is_invalid());
    }

    #[test]
    fn test_alignment_at_offset() {
        let a = Alignment::new(16);
        assert_eq!(a.alignment_at_offset(Size::new(0)), a);
        assert_eq!(a.alignment_at_offset(Size::new(4)), Alignment::new(4));
        assert_eq!(a.alignment_at_offset(Size::new(24)), Alignment::new(8));
    }

    #[test]
    fn test_bad_alignment_is_invariant_violation() {
        let result = std::panic::catch_unwind(|| Alignment::new(12));
        let payload = result.unwrap_err();
        assert!(payload.downcast_ref::<crate::utils::InvariantViolation>().is_some());
    }

    #[test]
    fn test_struct_layout() {
        let mut ast = AstContext::new();
        let main = ast.add_module("main");
        let s = ast.add_decl(Decl::new(
            "S",
            main,
            DeclKind::Struct {
                fields: vec![
                    FieldDecl { name: "a".into(), ty: Type::int(8) },
                    FieldDecl { name: "b".into(), ty: Type::int(64) },
                    FieldDecl { name: "c".into(), ty: Type::int(1) },
                ],
            },
        ));
        let layout = TypeLayout::of(&Type::Nominal(s), &ast);
        assert_eq!(layout.size, Size::new(17));
        assert_eq!(layout.alignment, Alignment::new(8));
        assert_eq!(layout.stride, Size::new(24));
        assert_eq!(
            TypeLayout::field_offsets(&Type::Nominal(s), &ast),
            vec![Size::new(0), Size::new(8), Size::new(16)]
        );
    }

    #[test]
    fn test_empty_tuple_has_nonzero_stride() {
        let ast = AstContext::new();
        let layout = TypeLayout::of(&Type::empty_tuple(), &ast);
        assert_eq!(layout.size, Size::zero());
        assert_eq!(layout.stride, Size::new(1));
    }
}
