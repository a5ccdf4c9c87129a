//! Properties that must hold for every input, not just the hand-picked scenarios.
//!
//! Randomised cases use a seeded [`StdRng`] so failures are reproducible.

use cilshim::{
    model::window_effect,
    prelude::*,
    report::FindingKind,
    symbols::{RuleKind, Resolution},
};
use rand::{rngs::StdRng, Rng, SeedableRng};

const HOST: &str = "Stardew Valley";

fn host_type(name: &str) -> TypeRef {
    TypeRef::new(HOST, name)
}

fn host_rules() -> RuleSet {
    let mut rules = RuleSet::new("1.6.0");
    rules.catalog.insert(
        CatalogType::new(HOST, "StardewValley.Farmer")
            .field("Name", TypeRef::system("System.String"))
            .property("money", TypeRef::system("System.Int32"))
            .method(
                CatalogMethod::new("addItem", TypeRef::system("System.Boolean"))
                    .param(host_type("StardewValley.Item"))
                    .optional(TypeRef::system("System.Boolean"), Constant::I4(0)),
            ),
    );
    rules
        .symbols
        .register_method("System.Void OldType::Foo()", TypeRef::new("Host", "NewType"), "Bar");
    rules
}

/// One method that exercises every rewriting handler at least once.
fn legacy_module() -> Module {
    let farmer = host_type("StardewValley.Farmer");
    let foo = MethodRef::new_static(TypeRef::new("Host", "OldType"), "Foo", TypeRef::void(), vec![]);
    let money = FieldRef::new(farmer.clone(), "money", TypeRef::system("System.Int32"));
    let add_item = MethodRef::new_instance(
        farmer,
        "addItem",
        TypeRef::system("System.Boolean"),
        vec![host_type("StardewValley.Item")],
    );
    let to_int32 = MethodRef::new_instance(
        TypeRef::system("System.IntPtr"),
        "ToInt32",
        TypeRef::system("System.Int32"),
        vec![],
    );
    let create = MethodRef::new_static(
        TypeRef::new("0Harmony", "Harmony.HarmonyInstance"),
        "Create",
        TypeRef::new("0Harmony", "Harmony.HarmonyInstance"),
        vec![TypeRef::system("System.String")],
    );

    Module::new("LegacyMod", Version::new(3, 2))
        .with_platform(Platform::X86)
        .with_reference(AssemblyReference::new("0Harmony", Version::new(1, 2)))
        .with_method(Method::new(
            "System.Void LegacyMod.ModEntry::Entry(StardewValley.Farmer,StardewValley.Item)",
            vec![
                Instruction::call(0, foo),
                Instruction::other(5, "ldarg.1", 0, 1),
                Instruction::ldfld(6, money),
                Instruction::other(11, "pop", 1, 0),
                Instruction::other(12, "ldarg.1", 0, 1),
                Instruction::other(13, "ldarg.2", 0, 1),
                Instruction::callvirt(14, add_item),
                Instruction::other(19, "pop", 1, 0),
                Instruction::other(20, "ldarga.s", 0, 1),
                Instruction::call(22, to_int32),
                Instruction::other(27, "pop", 1, 0),
                Instruction::ldstr(28, "legacy.mod"),
                Instruction::call(33, create),
                Instruction::other(38, "pop", 1, 0),
                Instruction::ret(39, false),
            ],
        ))
}

#[test]
fn test_second_run_is_a_fixed_point() -> Result<()> {
    let engine = CompatibilityEngine::new(
        host_rules(),
        RewriteOptions::default().with_host_platform(Platform::X64),
    )?;

    let mut module = legacy_module();
    let first = engine.process(&mut module);
    assert_eq!(first.rewritten_count, 5);
    assert_eq!(first.severity(), Severity::Rewritten);

    let rewritten = module.clone();
    let second = engine.process(&mut module);
    assert_eq!(second.rewritten_count, 0);
    assert!(second.rewrites.is_empty());
    assert!(second.is_clean());
    assert_eq!(module, rewritten);
    Ok(())
}

#[test]
fn test_rewrites_preserve_method_stack_effect() -> Result<()> {
    let engine = CompatibilityEngine::new(
        host_rules(),
        RewriteOptions::default().with_host_platform(Platform::X64),
    )?;

    let mut module = legacy_module();
    let before = window_effect(module.methods()[0].instructions());
    engine.process(&mut module);
    assert_eq!(window_effect(module.methods()[0].instructions()), before);
    Ok(())
}

fn facade_rules(method_rule_first: bool) -> RuleSet {
    let mut rules = RuleSet::new("1.6.0");
    rules.catalog.insert(
        CatalogType::new("Shim", "Shim.OldTypeFacade")
            .method(CatalogMethod::new("Foo", TypeRef::void()).static_())
            .method(CatalogMethod::new("Baz", TypeRef::void()).static_()),
    );
    let facade = TypeRef::new("Shim", "Shim.OldTypeFacade");
    let new_type = TypeRef::new("Host", "NewType");
    if method_rule_first {
        rules.symbols.register_method("System.Void OldType::Foo()", new_type, "Bar");
        rules.symbols.register_facade("OldType", facade);
    } else {
        rules.symbols.register_facade("OldType", facade);
        rules.symbols.register_method("System.Void OldType::Foo()", new_type, "Bar");
    }
    rules
}

#[test]
fn test_method_rule_beats_facade_in_any_order() -> Result<()> {
    let foo = MethodRef::new_static(TypeRef::new("Host", "OldType"), "Foo", TypeRef::void(), vec![]);

    for method_rule_first in [true, false] {
        let rules = facade_rules(method_rule_first);
        let table = rules.symbols.build(rules.catalog.clone())?;

        match table.resolve(&Op::Call(foo.clone())) {
            Resolution::Rewrite { op: Op::Call(target), rule, ambiguous } => {
                assert_eq!(rule, RuleKind::Method);
                assert_eq!(ambiguous, None);
                assert_eq!(target.declaring_type.name, "NewType");
                assert_eq!(target.name, "Bar");
            }
            other => panic!("unexpected resolution {other:?}"),
        }
    }

    // members without their own rule still go through the facade
    let rules = facade_rules(true);
    let table = rules.symbols.build(rules.catalog.clone())?;
    let baz = MethodRef::new_static(TypeRef::new("Host", "OldType"), "Baz", TypeRef::void(), vec![]);
    match table.resolve(&Op::Call(baz)) {
        Resolution::Rewrite { op: Op::Call(target), rule, .. } => {
            assert_eq!(rule, RuleKind::Facade);
            assert_eq!(target.declaring_type.name, "Shim.OldTypeFacade");
            assert_eq!(target.declaring_type.scope, "Shim");
        }
        other => panic!("unexpected resolution {other:?}"),
    }
    Ok(())
}

const UNTRUSTED_SCOPES: [&str; 3] = ["SpaceCore", "ContentPatcher", ""];
const MEMBER_NAMES: [&str; 5] = ["Missing", "addItem", "money", "Name", "warpFarmer"];

fn random_type(rng: &mut StdRng, module_name: &str) -> TypeRef {
    let scope = if rng.gen_bool(0.25) {
        module_name
    } else {
        UNTRUSTED_SCOPES[rng.gen_range(0..UNTRUSTED_SCOPES.len())]
    };
    TypeRef::new(scope, "StardewValley.Farmer")
}

fn random_reference(rng: &mut StdRng, module_name: &str, offset: u32) -> Instruction {
    let owner = random_type(rng, module_name);
    let name = MEMBER_NAMES[rng.gen_range(0..MEMBER_NAMES.len())];
    let value_type = if rng.gen_bool(0.5) {
        TypeRef::system("System.Int32")
    } else {
        TypeRef::system("System.Single")
    };

    match rng.gen_range(0..4) {
        0 => Instruction::ldsfld(offset, FieldRef::new(owner, name, value_type)),
        1 => Instruction::call(offset, MethodRef::new_static(owner, name, value_type, vec![])),
        2 => Instruction::newobj(offset, MethodRef::constructor(owner, vec![])),
        _ => Instruction::call(offset, MethodRef::new_static(owner, name, TypeRef::void(), vec![])),
    }
}

#[test]
fn test_detectors_ignore_untrusted_references() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(0x5eed_c11);
    let rules = host_rules();

    for module_name in ["SampleMod", "StardewValley"] {
        let engine = CompatibilityEngine::new(rules.clone(), RewriteOptions::paranoid())?;

        for _ in 0..64 {
            let mut instructions = Vec::new();
            for i in 0..rng.gen_range(1..12u32) {
                let reference = random_reference(&mut rng, module_name, i * 5);
                let balance = reference.stack_behavior().net_effect();
                instructions.push(reference);
                if balance > 0 {
                    instructions.push(Instruction::other(i * 5 + 4, "pop", 1, 0));
                }
            }
            instructions.push(Instruction::ret(1000, false));

            let mut module = Module::new(module_name, Version::new(1, 0))
                .with_method(Method::new("System.Void Mod::Run()", instructions));
            let original = module.clone();
            let report = engine.process(&mut module);

            assert_eq!(module, original);
            assert_eq!(report.diagnostics_of(FindingKind::BrokenReference).count(), 0);
            assert_eq!(report.diagnostics_of(FindingKind::UnexpectedType).count(), 0);
            assert!(report.is_clean(), "{}", report.summary());
        }
    }
    Ok(())
}

fn random_window(rng: &mut StdRng, len: usize) -> Vec<Instruction> {
    (0..len)
        .map(|i| {
            let pops = rng.gen_range(0..3);
            let pushes = rng.gen_range(0..3);
            Instruction::other(i as u32, "op", pops, pushes)
        })
        .collect()
}

#[test]
fn test_replace_rejects_any_unbalanced_window() {
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..512 {
        let len = rng.gen_range(1..10);
        let mut method = Method::new("System.Void Mod::Run()", random_window(&mut rng, len));
        let original = method.clone();
        let total = window_effect(method.instructions());

        let start = rng.gen_range(0..len);
        let end = rng.gen_range(start..=len);
        let replacement_len = rng.gen_range(0..5);
        let replacement = random_window(&mut rng, replacement_len);

        let expected = window_effect(&original.instructions()[start..end]) == window_effect(&replacement);
        match method.replace_range(start..end, replacement) {
            Ok(()) => {
                assert!(expected);
                assert_eq!(window_effect(method.instructions()), total);
            }
            Err(error) => {
                assert!(!expected);
                assert!(matches!(error, Error::StackImbalance { .. }));
                assert_eq!(method, original);
            }
        }
    }
}

#[test]
fn test_replace_rejects_out_of_bounds_window() {
    let mut method = Method::new("System.Void Mod::Run()", vec![Instruction::ret(0, false)]);
    assert!(matches!(
        method.replace_range(1..3, vec![]),
        Err(Error::WindowOutOfBounds { len: 1, .. })
    ));
    assert_eq!(method.len(), 1);
}
