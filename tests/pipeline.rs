//! End-to-end checks: parse, simplify, print and link a whole module

use pretty_assertions::assert_eq;

use silc::backend::{
    ForDefinition, LinkEntity, LinkInfo, LinkPolicy, Linkage, ObjectFormat, ObjectModule, Visibility,
};
use silc::middle::ir_printer::print_module;
use silc::middle::optimize::simplify_module;
use silc::middle::simplify_cfg::SimplifyCfgOptions;
use silc::{parse_sil, SilModule};

const PROGRAM: &str = "sil_global hidden @counter : $Builtin.Int64

sil @entry : $@convention(thin) (Builtin.Int1) -> Builtin.Int64 {
bb0(%0 : $Builtin.Int1):
  %1 = function_ref @pick : $@convention(thin) (Builtin.Int1) -> Builtin.Int64
  %2 = apply %1(%0) : $@convention(thin) (Builtin.Int1) -> Builtin.Int64
  return %2 : $Builtin.Int64
}

sil hidden @pick : $@convention(thin) (Builtin.Int1) -> Builtin.Int64 {
bb0(%0 : $Builtin.Int1):
  br bb1

bb1:
  %1 = integer_literal $Builtin.Int1, 1
  cond_br %1, bb2, bb3

bb2:
  %2 = integer_literal $Builtin.Int64, 1
  br bb4(%2 : $Builtin.Int64)

bb3:
  %3 = integer_literal $Builtin.Int64, 2
  br bb4(%3 : $Builtin.Int64)

bb4(%4 : $Builtin.Int64):
  return %4 : $Builtin.Int64
}

sil @imported : $@convention(thin) () -> ()
";

fn parse(source: &str) -> SilModule {
    match parse_sil(source) {
        Ok(module) => module,
        Err(diagnostics) => panic!("unexpected diagnostics: {:?}", diagnostics),
    }
}

fn assert_verifies(module: &SilModule) {
    for (_, func) in module.functions() {
        assert_eq!(func.verify(&module.ast), Vec::<String>::new(), "in @{}", func.name);
    }
}

#[test]
fn printed_module_parses_back_to_the_same_text() {
    let first = print_module(&parse(PROGRAM));
    let second = print_module(&parse(&first));
    assert_eq!(first, second);
}

#[test]
fn simplification_is_idempotent() {
    let mut module = parse(PROGRAM);
    let stats = simplify_module(&mut module, SimplifyCfgOptions::default());
    assert_eq!(stats.functions_changed, 1);
    assert_verifies(&module);

    let pick = module.function(module.find_function("pick").unwrap());
    assert_eq!(pick.block_count(), 1);

    let once = print_module(&module);
    let again = simplify_module(&mut module, SimplifyCfgOptions::default());
    assert_eq!(again.functions_changed, 0);
    assert_eq!(print_module(&module), once);

    // The simplified text is itself valid input
    assert_eq!(print_module(&parse(&once)), once);
}

#[test]
fn options_load_from_partial_json() {
    let options: SimplifyCfgOptions = serde_json::from_str(r#"{"max_dominator_iterations": 2}"#).unwrap();
    assert_eq!(options.max_dominator_iterations, 2);
    assert_eq!(options.jump_threading_cost_limit, SimplifyCfgOptions::default().jump_threading_cost_limit);
}

#[test]
fn symbol_table_of_a_module() {
    let module = parse(PROGRAM);
    let policy = LinkPolicy::new(module.module_id, ObjectFormat::Elf);
    let mut object = ObjectModule::new(ObjectFormat::Elf);

    for (id, func) in module.functions() {
        let for_definition = if func.is_definition() {
            ForDefinition::Definition
        } else {
            ForDefinition::Declaration
        };
        LinkInfo::get(&LinkEntity::for_sil_function(id), &module, &policy, for_definition, &mut object);
    }
    let counter = LinkEntity::for_sil_global(module.find_global("counter").unwrap());
    LinkInfo::get(&counter, &module, &policy, ForDefinition::Definition, &mut object);

    let summary: Vec<_> = object
        .symbols()
        .map(|(_, s)| (s.name.as_str(), s.linkage, s.visibility, s.defined))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("entry", Linkage::External, Visibility::Default, true),
            ("pick", Linkage::External, Visibility::Hidden, true),
            ("imported", Linkage::External, Visibility::Default, false),
            ("counter", Linkage::External, Visibility::Hidden, true),
        ]
    );
}

#[test]
fn equal_entities_share_one_symbol() {
    let module = parse(PROGRAM);
    let policy = LinkPolicy::new(module.module_id, ObjectFormat::Elf);
    let mut object = ObjectModule::new(ObjectFormat::Elf);
    let pick = module.find_function("pick").unwrap();

    let a = LinkEntity::for_sil_function(pick);
    let b = LinkEntity::for_sil_function(pick);
    assert_eq!(a, b);
    let (_, first) = LinkInfo::get(&a, &module, &policy, ForDefinition::Declaration, &mut object);
    let (_, second) = LinkInfo::get(&b, &module, &policy, ForDefinition::Definition, &mut object);
    assert_eq!(first, second);
    assert_eq!(object.len(), 1);
}
