//! Names of function-signature specializations
//!
//! A signature-optimized function keeps one slot per original argument
//! describing what happened to it, plus one for the return value. The
//! slots are encoded in argument order, each terminated by `_`, followed by
//! the return value code and the original name.

use bitflags::bitflags;
use log::trace;

use crate::ast::AstContext;
use crate::backend::mangle::{MangleError, Mangler, MAX_MANGLED_STRING_LEN};
use crate::middle::ir::{Function, InstKind, SilModule, StringEncoding, ValueId};
use crate::types::CanType;
use crate::{invariant_violation, sil_invariant};

bitflags! {
    /// Independent facts about one argument
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ArgumentModifierFlags: u8 {
        const DEAD = 0x1;
        const OWNED_TO_GUARANTEED = 0x2;
        /// Exploded into its fields
        const SROA = 0x4;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ReturnValueModifierFlags: u8 {
        const DEAD = 0x1;
        const OWNED_TO_UNOWNED = 0x2;
    }
}

/// The literal a constant-propagated argument was replaced with
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstantPropPayload {
    /// Mangled name of the referenced function
    FunctionRef(String),
    GlobalAddr(String),
    /// Bit pattern, truncated to the literal's width
    Integer(u128),
    /// IEEE bit pattern
    Float(u64),
    String {
        encoding: StringEncoding,
        value: String,
    },
}

impl ConstantPropPayload {
    /// Describe the literal instruction defining `value`
    pub fn from_value(module: &SilModule, func: &Function, value: ValueId) -> Result<Self, MangleError> {
        let inst = func.defining_inst(value).ok_or(MangleError::NotAnInstruction)?;
        match func.kind(inst) {
            InstKind::FunctionRef { function } => {
                Ok(Self::FunctionRef(module.function(*function).name.clone()))
            }
            InstKind::GlobalAddr { global } => Ok(Self::GlobalAddr(module.global(*global).name.clone())),
            InstKind::IntegerLiteral { value: literal } => {
                let width = func.value_type(value).ty.builtin_integer_width().unwrap_or(128);
                let mask = if width >= 128 {
                    u128::MAX
                } else {
                    (1u128 << width) - 1
                };
                Ok(Self::Integer((*literal as u128) & mask))
            }
            InstKind::FloatLiteral { bits } => Ok(Self::Float(*bits)),
            InstKind::StringLiteral { encoding, value } => {
                Self::string(*encoding, value.clone())
            }
            other => Err(MangleError::UnsupportedConstant {
                opcode: other.opcode().to_string(),
            }),
        }
    }

    /// A string payload; refuses anything over the length limit
    pub fn string(encoding: StringEncoding, value: String) -> Result<Self, MangleError> {
        if value.len() > MAX_MANGLED_STRING_LEN {
            return Err(MangleError::StringTooLong { len: value.len() });
        }
        Ok(Self::String { encoding, value })
    }
}

/// What happened to one argument
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ArgumentTransform {
    #[default]
    Unmodified,
    Modified(ArgumentModifierFlags),
    ConstantProp(ConstantPropPayload),
    /// A closure argument specialized away: the callee it wrapped and the
    /// types of the values it captured
    ClosureProp {
        callee: String,
        captured: Vec<CanType>,
    },
    BoxToValue,
    BoxToStack,
}

pub struct FunctionSignatureMangler<'a> {
    ast: &'a AstContext,
    original: &'a str,
    arguments: Vec<ArgumentTransform>,
    return_value: ReturnValueModifierFlags,
}

impl<'a> FunctionSignatureMangler<'a> {
    pub fn new(ast: &'a AstContext, original: &'a str, argument_count: usize) -> Self {
        Self {
            ast,
            original,
            arguments: vec![ArgumentTransform::Unmodified; argument_count],
            return_value: ReturnValueModifierFlags::empty(),
        }
    }

    pub fn argument(&self, index: usize) -> &ArgumentTransform {
        &self.arguments[index]
    }

    pub fn set_argument_dead(&mut self, index: usize) {
        self.add_flags(index, ArgumentModifierFlags::DEAD);
    }

    pub fn set_argument_owned_to_guaranteed(&mut self, index: usize) {
        self.add_flags(index, ArgumentModifierFlags::OWNED_TO_GUARANTEED);
    }

    pub fn set_argument_sroa(&mut self, index: usize) {
        self.add_flags(index, ArgumentModifierFlags::SROA);
    }

    pub fn set_argument_constant_prop(&mut self, index: usize, payload: ConstantPropPayload) {
        self.set_exclusive(index, ArgumentTransform::ConstantProp(payload));
    }

    pub fn set_argument_closure_prop(&mut self, index: usize, callee: impl Into<String>, captured: Vec<CanType>) {
        self.set_exclusive(
            index,
            ArgumentTransform::ClosureProp {
                callee: callee.into(),
                captured,
            },
        );
    }

    pub fn set_argument_box_to_value(&mut self, index: usize) {
        self.set_exclusive(index, ArgumentTransform::BoxToValue);
    }

    pub fn set_argument_box_to_stack(&mut self, index: usize) {
        self.set_exclusive(index, ArgumentTransform::BoxToStack);
    }

    pub fn set_return_value_dead(&mut self) {
        self.return_value |= ReturnValueModifierFlags::DEAD;
    }

    pub fn set_return_value_owned_to_unowned(&mut self) {
        self.return_value |= ReturnValueModifierFlags::OWNED_TO_UNOWNED;
    }

    fn slot(&mut self, index: usize) -> &mut ArgumentTransform {
        let count = self.arguments.len();
        match self.arguments.get_mut(index) {
            Some(slot) => slot,
            None => invariant_violation!("argument {} of a function with {} arguments", index, count),
        }
    }

    fn add_flags(&mut self, index: usize, flags: ArgumentModifierFlags) {
        let slot = self.slot(index);
        match slot {
            ArgumentTransform::Unmodified => *slot = ArgumentTransform::Modified(flags),
            ArgumentTransform::Modified(existing) => *existing |= flags,
            other => invariant_violation!("argument {} is already specialized as {:?}", index, other),
        }
    }

    fn set_exclusive(&mut self, index: usize, transform: ArgumentTransform) {
        let slot = self.slot(index);
        sil_invariant!(
            *slot == ArgumentTransform::Unmodified,
            "argument {} is already specialized as {:?}",
            index,
            slot
        );
        *slot = transform;
    }

    pub fn mangle(self) -> String {
        let mut mangler = Mangler::with_prefix(self.ast, "TSf");
        for argument in &self.arguments {
            mangle_argument(&mut mangler, argument);
            mangler.append("_");
        }
        if self.return_value.is_empty() {
            mangler.append("n");
        }
        if self.return_value.contains(ReturnValueModifierFlags::DEAD) {
            mangler.append("d");
        }
        if self.return_value.contains(ReturnValueModifierFlags::OWNED_TO_UNOWNED) {
            mangler.append("o");
        }
        mangler.append("_");
        mangler.append(self.original);
        let name = mangler.finalize();
        trace!("signature specialization of '{}' is '{}'", self.original, name);
        name
    }
}

fn mangle_argument(mangler: &mut Mangler<'_>, argument: &ArgumentTransform) {
    match argument {
        ArgumentTransform::Unmodified => mangler.append("n"),
        ArgumentTransform::Modified(flags) => {
            if flags.is_empty() {
                mangler.append("n");
            }
            if flags.contains(ArgumentModifierFlags::DEAD) {
                mangler.append("d");
            }
            if flags.contains(ArgumentModifierFlags::OWNED_TO_GUARANTEED) {
                mangler.append("g");
            }
            if flags.contains(ArgumentModifierFlags::SROA) {
                mangler.append("s");
            }
        }
        ArgumentTransform::ConstantProp(payload) => {
            mangler.append("cp");
            match payload {
                ConstantPropPayload::FunctionRef(name) => {
                    mangler.append("fr");
                    mangler.mangle_identifier(name);
                }
                ConstantPropPayload::GlobalAddr(name) => {
                    mangler.append("g");
                    mangler.mangle_identifier(name);
                }
                ConstantPropPayload::Integer(bits) => {
                    mangler.append("i");
                    mangler.mangle_natural(*bits);
                }
                ConstantPropPayload::Float(bits) => {
                    mangler.append("fl");
                    mangler.mangle_natural(u128::from(*bits));
                }
                ConstantPropPayload::String { encoding, value } => {
                    mangler.append("se");
                    mangler.append(match encoding {
                        StringEncoding::Utf8 => "0",
                        StringEncoding::Utf16 => "1",
                        StringEncoding::ObjcSelector => "2",
                    });
                    mangler.append("v");
                    mangler.mangle_identifier(value);
                }
            }
        }
        ArgumentTransform::ClosureProp { callee, captured } => {
            mangler.append("cl");
            mangler.mangle_identifier(callee);
            for ty in captured {
                mangler.mangle_type(ty.get());
            }
        }
        ArgumentTransform::BoxToValue => mangler.append("i"),
        ArgumentTransform::BoxToStack => mangler.append("k"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse_sil;
    use crate::types::Type;

    const CONSTANTS: &str = "sil_global hidden @counter : $Builtin.Int64

sil @callee : $@convention(thin) () -> ()

sil @consts : $@convention(thin) () -> () {
bb0:
  %0 = integer_literal $Builtin.Int8, -1
  %1 = function_ref @callee : $@convention(thin) () -> ()
  %2 = global_addr @counter : $*Builtin.Int64
  %3 = string_literal utf8 \"hello\"
  %4 = string_literal utf8 \"a string that is far too long to be part of a symbol\"
  %5 = float_literal $Builtin.FPIEEE64, 0x3FF0000000000000
  %6 = tuple ()
  return %6 : $()
}
";

    /// Payloads for the literals `%0`..`%6` of `@consts`
    fn payloads() -> Vec<Result<ConstantPropPayload, MangleError>> {
        let module = parse_sil(CONSTANTS).unwrap();
        let func = module.function(module.find_function("consts").unwrap());
        let entry = func.entry();
        func.block_insts(entry)
            .iter()
            .filter(|inst| !func.kind(**inst).is_terminator())
            .map(|inst| ConstantPropPayload::from_value(&module, func, func.result(*inst)))
            .collect()
    }

    #[test]
    fn test_literal_payloads() {
        let payloads = payloads();
        assert_eq!(payloads[0], Ok(ConstantPropPayload::Integer(0xFF)));
        assert_eq!(payloads[1], Ok(ConstantPropPayload::FunctionRef("callee".into())));
        assert_eq!(payloads[2], Ok(ConstantPropPayload::GlobalAddr("counter".into())));
        assert_eq!(
            payloads[3],
            Ok(ConstantPropPayload::String {
                encoding: StringEncoding::Utf8,
                value: "hello".into()
            })
        );
        assert!(matches!(payloads[4], Err(MangleError::StringTooLong { len }) if len > 32));
        assert_eq!(payloads[5], Ok(ConstantPropPayload::Float(0x3FF0000000000000)));
        assert_eq!(
            payloads[6],
            Err(MangleError::UnsupportedConstant {
                opcode: "tuple".into()
            })
        );
    }

    #[test]
    fn test_signature_name() {
        let ast = AstContext::new();
        let mut mangler = FunctionSignatureMangler::new(&ast, "_TF4main3fooFT_T_", 4);
        mangler.set_argument_sroa(0);
        mangler.set_argument_dead(0);
        mangler.set_argument_constant_prop(1, ConstantPropPayload::Integer(42));
        mangler.set_argument_closure_prop(2, "closure", vec![CanType::new(Type::int(64))]);
        mangler.set_return_value_owned_to_unowned();
        assert_eq!(
            mangler.mangle(),
            "_TTSfds_cpi42_cl7closureBi64__n_o__TF4main3fooFT_T_"
        );
    }

    #[test]
    fn test_string_payload_at_the_limit() {
        let exact = "x".repeat(MAX_MANGLED_STRING_LEN);
        assert!(ConstantPropPayload::string(StringEncoding::Utf16, exact).is_ok());
        let over = "x".repeat(MAX_MANGLED_STRING_LEN + 1);
        assert_eq!(
            ConstantPropPayload::string(StringEncoding::Utf16, over),
            Err(MangleError::StringTooLong { len: 33 })
        );
    }

    fn build(ast: &AstContext, configure: impl Fn(&mut FunctionSignatureMangler<'_>)) -> String {
        let mut mangler = FunctionSignatureMangler::new(ast, "f", 2);
        configure(&mut mangler);
        mangler.mangle()
    }

    #[test]
    fn test_distinct_modifiers_get_distinct_names() {
        let ast = AstContext::new();
        let names = vec![
            build(&ast, |_| {}),
            build(&ast, |m| m.set_argument_dead(0)),
            build(&ast, |m| m.set_argument_dead(1)),
            build(&ast, |m| m.set_argument_owned_to_guaranteed(0)),
            build(&ast, |m| m.set_argument_box_to_value(0)),
            build(&ast, |m| m.set_argument_box_to_stack(0)),
            build(&ast, |m| m.set_return_value_dead()),
            build(&ast, |m| m.set_argument_constant_prop(0, ConstantPropPayload::Integer(1))),
            build(&ast, |m| m.set_argument_constant_prop(0, ConstantPropPayload::Integer(11))),
            build(&ast, |m| m.set_argument_constant_prop(0, ConstantPropPayload::Float(1))),
            build(&ast, |m| {
                m.set_argument_constant_prop(0, ConstantPropPayload::GlobalAddr("g".into()))
            }),
        ];
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_flag_on_exclusive_argument_is_invariant_violation() {
        let ast = AstContext::new();
        let result = std::panic::catch_unwind(move || {
            let mut mangler = FunctionSignatureMangler::new(&ast, "f", 1);
            mangler.set_argument_box_to_stack(0);
            mangler.set_argument_dead(0);
        });
        assert!(result
            .unwrap_err()
            .downcast_ref::<crate::utils::InvariantViolation>()
            .is_some());
    }
}
