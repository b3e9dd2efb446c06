//! Symbol mangling
//!
//! [`Mangler`] is a streaming encoder: callers push identifiers, numbers,
//! types and conformances and take the finished string at the end. The
//! specialization manglers in the submodules build on it.
//!
//! Every production is self-delimiting (identifiers are length-prefixed,
//! lists end in `_`), so two different inputs never produce the same text.

mod signature;
mod specialization;

use thiserror::Error;

use crate::ast::{AstContext, ConformanceId, ConformanceRef, DeclId, DeclKind};
use crate::invariant_violation;
use crate::types::{BuiltinType, FunctionRepresentation, ParameterConvention, ResultConvention, Type};

pub use signature::{
    ArgumentModifierFlags, ArgumentTransform, ConstantPropPayload, FunctionSignatureMangler,
    ReturnValueModifierFlags,
};
pub use specialization::GenericSpecializationMangler;

/// Prefix of every mangled symbol
pub const MANGLING_PREFIX: &str = "_T";

/// Longest string literal that can be encoded in a constant-propagation
/// payload
pub const MAX_MANGLED_STRING_LEN: usize = 32;

/// Reasons a specialization cannot be named
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MangleError {
    #[error("string literal of {len} bytes is longer than the {MAX_MANGLED_STRING_LEN} bytes a mangled name can carry")]
    StringTooLong { len: usize },

    #[error("'{opcode}' is not a constant that can be propagated into a specialization")]
    UnsupportedConstant { opcode: String },

    #[error("value is not defined by an instruction")]
    NotAnInstruction,
}

/// Streaming symbol encoder
pub struct Mangler<'a> {
    ast: &'a AstContext,
    buffer: String,
}

impl<'a> Mangler<'a> {
    pub fn new(ast: &'a AstContext) -> Self {
        Self {
            ast,
            buffer: String::new(),
        }
    }

    /// Start a global symbol: the prefix followed by `operator`
    pub fn with_prefix(ast: &'a AstContext, operator: &str) -> Self {
        let mut mangler = Self::new(ast);
        mangler.append(MANGLING_PREFIX);
        mangler.append(operator);
        mangler
    }

    pub fn ast(&self) -> &'a AstContext {
        self.ast
    }

    pub fn append(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    /// `<byte length><name>`
    pub fn mangle_identifier(&mut self, name: &str) {
        self.buffer.push_str(&name.len().to_string());
        self.buffer.push_str(name);
    }

    /// Decimal digits. The caller is responsible for what follows, so the
    /// number cannot run into another digit.
    pub fn mangle_natural(&mut self, n: u128) {
        self.buffer.push_str(&n.to_string());
    }

    /// Module name followed by every enclosing declaration down to `decl`
    pub fn mangle_decl_context(&mut self, decl: DeclId) {
        let ast = self.ast;
        let module = ast.module_name(ast.decl(decl).module);
        self.mangle_identifier(module);
        for id in ast.decl_path(decl) {
            self.mangle_identifier(&ast.decl(id).name);
        }
    }

    /// A nominal type declaration: kind letter and context
    pub fn mangle_nominal(&mut self, decl: DeclId) {
        let letter = match &self.ast.decl(decl).kind {
            DeclKind::Struct { .. } => "V",
            DeclKind::Enum { .. } => "O",
            DeclKind::Class { .. } => "C",
            DeclKind::Protocol { .. } => "P",
            kind => invariant_violation!("cannot mangle '{}' declaration as a type", kind.keyword()),
        };
        self.append(letter);
        self.mangle_decl_context(decl);
    }

    pub fn mangle_type(&mut self, ty: &Type) {
        match ty {
            Type::Builtin(builtin) => self.mangle_builtin(*builtin),
            Type::Tuple(elements) => {
                self.append("T");
                for element in elements {
                    self.mangle_type(element);
                }
                self.append("_");
            }
            Type::Nominal(decl) => self.mangle_nominal(*decl),
            Type::Function(func) => {
                self.append("F");
                self.append(match func.representation {
                    FunctionRepresentation::Thin => "t",
                    FunctionRepresentation::Thick => "k",
                    FunctionRepresentation::Method => "m",
                    FunctionRepresentation::ObjcMethod => "o",
                });
                for param in &func.params {
                    self.append(match param.convention {
                        ParameterConvention::DirectUnowned => "u",
                        ParameterConvention::DirectOwned => "o",
                        ParameterConvention::DirectGuaranteed => "g",
                        ParameterConvention::IndirectInout => "i",
                    });
                    self.mangle_type(&param.ty);
                }
                self.append("_");
                self.append(match func.result_convention {
                    ResultConvention::Unowned => "u",
                    ResultConvention::Owned => "o",
                });
                self.mangle_type(&func.result);
            }
        }
    }

    fn mangle_builtin(&mut self, builtin: BuiltinType) {
        match builtin {
            BuiltinType::Int(bits) => {
                self.append("Bi");
                self.mangle_natural(u128::from(bits));
                self.append("_");
            }
            BuiltinType::Float(bits) => {
                self.append("Bf");
                self.mangle_natural(u128::from(bits));
                self.append("_");
            }
            BuiltinType::Word => self.append("Bw"),
            BuiltinType::RawPointer => self.append("Bp"),
            BuiltinType::NativeObject => self.append("Bo"),
        }
    }

    /// Conforming type, protocol and the module declaring the conformance
    pub fn mangle_protocol_conformance(&mut self, conformance: ConformanceId) {
        let ast = self.ast;
        let conformance = ast.conformance(conformance);
        self.mangle_type(conformance.ty.get());
        self.mangle_nominal(conformance.protocol);
        self.mangle_identifier(ast.module_name(conformance.module));
    }

    /// A conformance witness inside a substitution list
    pub fn mangle_conformance_ref(&mut self, conformance: ConformanceRef) {
        match conformance {
            ConformanceRef::Concrete(id) => {
                self.append("W");
                self.mangle_protocol_conformance(id);
            }
            ConformanceRef::Abstract(protocol) => self.mangle_nominal(protocol),
        }
    }

    pub fn finalize(self) -> String {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Decl, FieldDecl};
    use crate::types::FunctionType;

    fn context() -> (AstContext, DeclId) {
        let mut ast = AstContext::new();
        let main = ast.add_module("main");
        let point = ast.add_decl(Decl::new(
            "Point",
            main,
            DeclKind::Struct {
                fields: vec![FieldDecl {
                    name: "x".into(),
                    ty: Type::int(64),
                }],
            },
        ));
        (ast, point)
    }

    fn mangled(ast: &AstContext, ty: &Type) -> String {
        let mut mangler = Mangler::new(ast);
        mangler.mangle_type(ty);
        mangler.finalize()
    }

    #[test]
    fn test_identifiers_are_length_prefixed() {
        let ast = AstContext::new();
        let mut mangler = Mangler::with_prefix(&ast, "F");
        mangler.mangle_identifier("main");
        mangler.mangle_identifier("foo");
        assert_eq!(mangler.finalize(), "_TF4main3foo");
    }

    #[test]
    fn test_type_encodings() {
        let (ast, point) = context();
        assert_eq!(mangled(&ast, &Type::int(64)), "Bi64_");
        assert_eq!(mangled(&ast, &Type::Nominal(point)), "V4main5Point");
        assert_eq!(
            mangled(&ast, &Type::Tuple(vec![Type::int(1), Type::Nominal(point)])),
            "TBi1_V4main5Point_"
        );
        let f = FunctionType::thin(vec![Type::int(8)], Type::empty_tuple());
        assert_eq!(mangled(&ast, &Type::Function(Box::new(f))), "FtuBi8__uT_");
    }

    #[test]
    fn test_nested_tuples_do_not_collide() {
        let ast = AstContext::new();
        let a = Type::Tuple(vec![Type::Tuple(vec![Type::int(8), Type::int(8)]), Type::int(8)]);
        let b = Type::Tuple(vec![Type::int(8), Type::Tuple(vec![Type::int(8), Type::int(8)])]);
        assert_ne!(mangled(&ast, &a), mangled(&ast, &b));
    }
}
