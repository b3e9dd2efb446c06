//! Names of generic specializations

use crate::ast::{AstContext, GenericParam, SubstitutionMap};
use crate::backend::mangle::Mangler;
use crate::sil_invariant;

/// Names the specialization of a generic function for one substitution map.
///
/// Only primary generic parameters are encoded; dependent parameters are
/// fixed once the primary ones are.
pub struct GenericSpecializationMangler<'a> {
    mangler: Mangler<'a>,
    original: &'a str,
    params: &'a [GenericParam],
    substitutions: &'a SubstitutionMap,
}

impl<'a> GenericSpecializationMangler<'a> {
    pub fn new(
        ast: &'a AstContext,
        original: &'a str,
        params: &'a [GenericParam],
        substitutions: &'a SubstitutionMap,
    ) -> Self {
        sil_invariant!(
            params.len() == substitutions.len(),
            "{} generic parameters but {} substitutions",
            params.len(),
            substitutions.len()
        );
        Self {
            mangler: Mangler::with_prefix(ast, "TSg"),
            original,
            params,
            substitutions,
        }
    }

    /// `_TTSg` + (type conformances... `_`)* + `_` + original name
    pub fn mangle(mut self) -> String {
        for (param, substitution) in self.params.iter().zip(&self.substitutions.substitutions) {
            if !param.is_primary() {
                continue;
            }
            self.mangler.mangle_type(substitution.replacement.get());
            for conformance in &substitution.conformances {
                self.mangler.mangle_conformance_ref(*conformance);
            }
            self.mangler.append("_");
        }
        self.mangler.append("_");
        self.mangler.append(self.original);
        self.mangler.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ConformanceRef, Decl, DeclId, DeclKind, Substitution};
    use crate::types::{CanType, Type};

    struct Fixture {
        ast: AstContext,
        proto: DeclId,
        other_proto: DeclId,
        params: Vec<GenericParam>,
    }

    fn fixture() -> Fixture {
        let mut ast = AstContext::new();
        let main = ast.add_module("main");
        let proto = ast.add_decl(Decl::new(
            "Hashable",
            main,
            DeclKind::Protocol {
                requirements: vec![],
                associated_types: vec!["Element".into()],
            },
        ));
        let other_proto = ast.add_decl(Decl::new(
            "Equatable",
            main,
            DeclKind::Protocol {
                requirements: vec![],
                associated_types: vec![],
            },
        ));
        let params = vec![
            GenericParam::primary("T", vec![proto]),
            GenericParam::dependent("T.Element", 0, "Element", vec![]),
            GenericParam::primary("U", vec![]),
        ];
        Fixture {
            ast,
            proto,
            other_proto,
            params,
        }
    }

    fn subs(fx: &mut Fixture, t: Type, proto: DeclId, u: Type) -> SubstitutionMap {
        let main = fx.ast.add_module("main");
        let conformance = fx.ast.add_conformance(CanType::new(t.clone()), proto, main);
        SubstitutionMap::new(vec![
            Substitution {
                replacement: CanType::new(t),
                conformances: vec![ConformanceRef::Concrete(conformance)],
            },
            Substitution {
                replacement: CanType::new(Type::int(8)),
                conformances: vec![],
            },
            Substitution {
                replacement: CanType::new(u),
                conformances: vec![],
            },
        ])
    }

    fn mangle(fx: &Fixture, map: &SubstitutionMap) -> String {
        GenericSpecializationMangler::new(&fx.ast, "_TF4main3mapFT_T_", &fx.params, map).mangle()
    }

    #[test]
    fn test_specialization_name() {
        let mut fx = fixture();
        let proto = fx.proto;
        let map = subs(&mut fx, Type::int(64), proto, Type::empty_tuple());
        assert_eq!(
            mangle(&fx, &map),
            "_TTSgBi64_WBi64_P4main8Hashable4main_T____TF4main3mapFT_T_"
        );
    }

    #[test]
    fn test_dependent_parameters_are_skipped() {
        let mut fx = fixture();
        let proto = fx.proto;
        let a = subs(&mut fx, Type::int(64), proto, Type::int(1));
        let mut b = a.clone();
        b.substitutions[1].replacement = CanType::new(Type::int(32));
        assert_eq!(mangle(&fx, &a), mangle(&fx, &b));
    }

    #[test]
    fn test_distinct_substitutions_get_distinct_names() {
        let mut fx = fixture();
        let (proto, other) = (fx.proto, fx.other_proto);
        let names = [
            subs(&mut fx, Type::int(64), proto, Type::int(1)),
            subs(&mut fx, Type::int(32), proto, Type::int(1)),
            subs(&mut fx, Type::int(64), other, Type::int(1)),
            subs(&mut fx, Type::int(64), proto, Type::int(8)),
            subs(&mut fx, Type::Tuple(vec![Type::int(64), Type::int(1)]), proto, Type::empty_tuple()),
        ]
        .iter()
        .map(|map| mangle(&fx, map))
        .collect::<Vec<_>>();

        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                assert_ne!(a, b);
            }
        }
        let again = subs(&mut fx, Type::int(64), proto, Type::int(1));
        assert_eq!(mangle(&fx, &again), names[0]);
    }

    #[test]
    fn test_mismatched_map_is_invariant_violation() {
        let fx = fixture();
        let map = SubstitutionMap::default();
        let result = std::panic::catch_unwind(|| {
            GenericSpecializationMangler::new(&fx.ast, "f", &fx.params, &map).mangle()
        });
        assert!(result
            .unwrap_err()
            .downcast_ref::<crate::utils::InvariantViolation>()
            .is_some());
    }
}
