//! SIL type representation

use std::fmt;

use strum::{Display, EnumString};

use crate::ast::{AstContext, DeclId, DeclKind};
use crate::types::OwnershipKind;

/// Compiler-builtin scalar types (`Builtin.*`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    /// `Builtin.Int<N>`
    Int(u16),
    /// `Builtin.Word`, pointer sized integer
    Word,
    /// `Builtin.FPIEEE32` / `Builtin.FPIEEE64`
    Float(u16),
    RawPointer,
    /// Reference counted opaque object
    NativeObject,
}

impl BuiltinType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Word" => Some(Self::Word),
            "FPIEEE32" => Some(Self::Float(32)),
            "FPIEEE64" => Some(Self::Float(64)),
            "RawPointer" => Some(Self::RawPointer),
            "NativeObject" => Some(Self::NativeObject),
            _ => {
                let bits: u16 = name.strip_prefix("Int")?.parse().ok()?;
                (1..=128).contains(&bits).then_some(Self::Int(bits))
            }
        }
    }
}

impl fmt::Display for BuiltinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuiltinType::Int(bits) => write!(f, "Builtin.Int{}", bits),
            BuiltinType::Word => write!(f, "Builtin.Word"),
            BuiltinType::Float(bits) => write!(f, "Builtin.FPIEEE{}", bits),
            BuiltinType::RawPointer => write!(f, "Builtin.RawPointer"),
            BuiltinType::NativeObject => write!(f, "Builtin.NativeObject"),
        }
    }
}

/// Calling convention of a function value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum FunctionRepresentation {
    Thin,
    Thick,
    Method,
    ObjcMethod,
}

/// How a parameter is passed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterConvention {
    DirectUnowned,
    DirectOwned,
    DirectGuaranteed,
    IndirectInout,
}

impl ParameterConvention {
    pub fn attribute(self) -> Option<&'static str> {
        match self {
            ParameterConvention::DirectUnowned => None,
            ParameterConvention::DirectOwned => Some("@owned"),
            ParameterConvention::DirectGuaranteed => Some("@guaranteed"),
            ParameterConvention::IndirectInout => Some("@inout"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultConvention {
    Unowned,
    Owned,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SilParameter {
    pub ty: Type,
    pub convention: ParameterConvention,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub representation: FunctionRepresentation,
    pub params: Vec<SilParameter>,
    pub result: Type,
    pub result_convention: ResultConvention,
}

impl FunctionType {
    /// `@convention(thin) (params...) -> result` with default conventions
    pub fn thin(params: Vec<Type>, result: Type) -> Self {
        Self {
            representation: FunctionRepresentation::Thin,
            params: params
                .into_iter()
                .map(|ty| SilParameter {
                    ty,
                    convention: ParameterConvention::DirectUnowned,
                })
                .collect(),
            result,
            result_convention: ResultConvention::Unowned,
        }
    }

    /// Type of the entry block argument bound to parameter `index`
    pub fn argument_type(&self, index: usize) -> SilType {
        let param = &self.params[index];
        match param.convention {
            ParameterConvention::IndirectInout => SilType::address(param.ty.clone()),
            _ => SilType::object(param.ty.clone()),
        }
    }

    /// Ownership the entry argument for parameter `index` must carry in a
    /// function with ownership tracking
    pub fn argument_ownership(&self, index: usize, ast: &AstContext) -> OwnershipKind {
        let param = &self.params[index];
        if param.convention == ParameterConvention::IndirectInout || param.ty.is_trivial(ast) {
            return OwnershipKind::None;
        }
        match param.convention {
            ParameterConvention::DirectOwned => OwnershipKind::Owned,
            ParameterConvention::DirectGuaranteed => OwnershipKind::Guaranteed,
            _ => OwnershipKind::Unowned,
        }
    }

    pub fn result_type(&self) -> SilType {
        SilType::object(self.result.clone())
    }
}

/// A formal type. Nominal types refer to their declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Builtin(BuiltinType),
    Tuple(Vec<Type>),
    Nominal(DeclId),
    Function(Box<FunctionType>),
}

const MAX_TRIVIALITY_DEPTH: usize = 32;

impl Type {
    pub fn int(bits: u16) -> Self {
        Type::Builtin(BuiltinType::Int(bits))
    }

    pub fn empty_tuple() -> Self {
        Type::Tuple(Vec::new())
    }

    pub fn builtin_integer_width(&self) -> Option<u16> {
        match self {
            Type::Builtin(BuiltinType::Int(bits)) => Some(*bits),
            Type::Builtin(BuiltinType::Word) => Some(64),
            _ => None,
        }
    }

    pub fn nominal_decl(&self) -> Option<DeclId> {
        match self {
            Type::Nominal(decl) => Some(*decl),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionType> {
        match self {
            Type::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_trivial(&self, ast: &AstContext) -> bool {
        self.is_trivial_at_depth(ast, 0)
    }

    fn is_trivial_at_depth(&self, ast: &AstContext, depth: usize) -> bool {
        if depth > MAX_TRIVIALITY_DEPTH {
            return false;
        }
        match self {
            Type::Builtin(b) => *b != BuiltinType::NativeObject,
            Type::Tuple(elements) => elements.iter().all(|e| e.is_trivial_at_depth(ast, depth + 1)),
            Type::Nominal(decl) => match &ast.decl(*decl).kind {
                DeclKind::Struct { fields } => fields
                    .iter()
                    .all(|f| f.ty.is_trivial_at_depth(ast, depth + 1)),
                DeclKind::Enum { cases } => cases.iter().all(|c| {
                    c.payload
                        .as_ref()
                        .map_or(true, |p| p.is_trivial_at_depth(ast, depth + 1))
                }),
                DeclKind::Class { .. } | DeclKind::Protocol { .. } => false,
                _ => true,
            },
            Type::Function(f) => f.representation != FunctionRepresentation::Thick,
        }
    }

    /// Types of the first-level projections of a tuple or struct
    pub fn field_types(&self, ast: &AstContext) -> Option<Vec<Type>> {
        match self {
            Type::Tuple(elements) => Some(elements.clone()),
            Type::Nominal(decl) => match &ast.decl(*decl).kind {
                DeclKind::Struct { fields } => Some(fields.iter().map(|f| f.ty.clone()).collect()),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn display<'a>(&'a self, ast: &'a AstContext) -> TypeDisplay<'a> {
        TypeDisplay { ty: self, ast }
    }
}

/// A type in canonical form: one-element tuples are collapsed to their
/// element, recursively. Link entities are keyed on canonical types only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanType(Type);

impl CanType {
    pub fn new(ty: Type) -> Self {
        CanType(canonicalize(ty))
    }

    pub fn get(&self) -> &Type {
        &self.0
    }
}

fn canonicalize(ty: Type) -> Type {
    match ty {
        Type::Tuple(elements) => {
            let mut elements: Vec<Type> = elements.into_iter().map(canonicalize).collect();
            if elements.len() == 1 {
                elements.remove(0)
            } else {
                Type::Tuple(elements)
            }
        }
        Type::Function(f) => {
            let FunctionType {
                representation,
                params,
                result,
                result_convention,
            } = *f;
            Type::Function(Box::new(FunctionType {
                representation,
                params: params
                    .into_iter()
                    .map(|p| SilParameter {
                        ty: canonicalize(p.ty),
                        convention: p.convention,
                    })
                    .collect(),
                result: canonicalize(result),
                result_convention,
            }))
        }
        other => other,
    }
}

/// The type of a SIL value: a formal type, either as an object or as the
/// address of storage holding one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SilType {
    pub ty: Type,
    pub is_address: bool,
}

impl SilType {
    pub fn object(ty: Type) -> Self {
        Self {
            ty,
            is_address: false,
        }
    }

    pub fn address(ty: Type) -> Self {
        Self {
            ty,
            is_address: true,
        }
    }

    pub fn int(bits: u16) -> Self {
        Self::object(Type::int(bits))
    }

    pub fn object_type(&self) -> SilType {
        SilType::object(self.ty.clone())
    }

    pub fn address_type(&self) -> SilType {
        SilType::address(self.ty.clone())
    }

    pub fn is_trivial(&self, ast: &AstContext) -> bool {
        self.is_address || self.ty.is_trivial(ast)
    }

    pub fn is_int1(&self) -> bool {
        !self.is_address && self.ty == Type::int(1)
    }

    pub fn display<'a>(&'a self, ast: &'a AstContext) -> SilTypeDisplay<'a> {
        SilTypeDisplay { ty: self, ast }
    }
}

pub struct TypeDisplay<'a> {
    ty: &'a Type,
    ast: &'a AstContext,
}

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ty {
            Type::Builtin(b) => write!(f, "{}", b),
            Type::Tuple(elements) => {
                write!(f, "(")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e.display(self.ast))?;
                }
                write!(f, ")")
            }
            Type::Nominal(decl) => write!(f, "{}", self.ast.decl(*decl).name),
            Type::Function(func) => {
                write!(f, "@convention({}) (", func.representation)?;
                for (i, p) in func.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if let Some(attr) = p.convention.attribute() {
                        write!(f, "{} ", attr)?;
                    }
                    write!(f, "{}", p.ty.display(self.ast))?;
                }
                write!(f, ") -> ")?;
                if func.result_convention == ResultConvention::Owned {
                    write!(f, "@owned ")?;
                }
                write!(f, "{}", func.result.display(self.ast))
            }
        }
    }
}

pub struct SilTypeDisplay<'a> {
    ty: &'a SilType,
    ast: &'a AstContext,
}

impl fmt::Display for SilTypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ty.is_address {
            write!(f, "*")?;
        }
        write!(f, "{}", self.ty.ty.display(self.ast))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Decl, EnumCaseDecl, FieldDecl};

    fn context() -> (AstContext, DeclId, DeclId, DeclId) {
        let mut ast = AstContext::new();
        let main = ast.add_module("main");
        let klass = ast.add_decl(Decl::new("Klass", main, DeclKind::Class { fields: vec![] }));
        let pair = ast.add_decl(Decl::new(
            "Pair",
            main,
            DeclKind::Struct {
                fields: vec![
                    FieldDecl { name: "a".into(), ty: Type::int(64) },
                    FieldDecl { name: "b".into(), ty: Type::Nominal(klass) },
                ],
            },
        ));
        let optional = ast.add_decl(Decl::new(
            "Optional",
            main,
            DeclKind::Enum {
                cases: vec![
                    EnumCaseDecl { name: "none".into(), payload: None },
                    EnumCaseDecl { name: "some".into(), payload: Some(Type::int(64)) },
                ],
            },
        ));
        (ast, klass, pair, optional)
    }

    #[test]
    fn test_triviality() {
        let (ast, klass, pair, optional) = context();
        assert!(Type::int(64).is_trivial(&ast));
        assert!(!Type::Nominal(klass).is_trivial(&ast));
        assert!(!Type::Nominal(pair).is_trivial(&ast));
        assert!(Type::Nominal(optional).is_trivial(&ast));
        assert!(SilType::address(Type::Nominal(klass)).is_trivial(&ast));
    }

    #[test]
    fn test_builtin_names() {
        assert_eq!(BuiltinType::from_name("Int1"), Some(BuiltinType::Int(1)));
        assert_eq!(BuiltinType::from_name("FPIEEE64"), Some(BuiltinType::Float(64)));
        assert_eq!(BuiltinType::from_name("Int0"), None);
        assert_eq!(BuiltinType::from_name("Bogus"), None);
    }

    #[test]
    fn test_canonical_collapses_single_element_tuples() {
        let sugared = Type::Tuple(vec![Type::Tuple(vec![Type::int(8)])]);
        assert_eq!(CanType::new(sugared), CanType::new(Type::int(8)));
        let pair = Type::Tuple(vec![Type::int(8), Type::int(8)]);
        assert_eq!(CanType::new(pair.clone()).get(), &pair);
    }

    #[test]
    fn test_display() {
        let (ast, klass, _, _) = context();
        let mut f = FunctionType::thin(vec![Type::int(64)], Type::Nominal(klass));
        f.params[0].convention = ParameterConvention::DirectGuaranteed;
        f.result_convention = ResultConvention::Owned;
        let ty = SilType::object(Type::Function(Box::new(f)));
        assert_eq!(
            ty.display(&ast).to_string(),
            "@convention(thin) (@guaranteed Builtin.Int64) -> @owned Klass"
        );
        let addr = SilType::address(Type::Tuple(vec![Type::int(1), Type::Nominal(klass)]));
        assert_eq!(addr.display(&ast).to_string(), "*(Builtin.Int1, Klass)");
    }
}
