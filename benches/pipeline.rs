//! Benchmarks for the rewriting pipeline.
//!
//! Measures the per-module cost of a full pass for:
//! - Modules that need no changes (the common case at load time)
//! - Modules where most call sites hit a rule
//! - Many modules processed in parallel against one engine

extern crate cilshim;

use cilshim::prelude::*;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use std::hint::black_box;

const METHODS: usize = 64;
const CALLS_PER_METHOD: usize = 32;

fn rules() -> RuleSet {
    let mut rules = RuleSet::new("1.6.0");
    rules.catalog.insert(
        CatalogType::new("Stardew Valley", "StardewValley.Farmer")
            .field("Name", TypeRef::system("System.String"))
            .property("money", TypeRef::system("System.Int32")),
    );
    rules
        .symbols
        .register_method("System.Void OldType::Foo()", TypeRef::new("Host", "NewType"), "Bar");
    rules
}

/// Builds a module where every `hit_every`th call site references `OldType`.
fn module(name: &str, hit_every: Option<usize>) -> Module {
    let foo = MethodRef::new_static(TypeRef::new("Host", "OldType"), "Foo", TypeRef::void(), vec![]);
    let unrelated = MethodRef::new_static(TypeRef::new("SampleMod", "SampleMod.Util"), "Tick", TypeRef::void(), vec![]);
    let name_field = FieldRef::new(
        TypeRef::new("Stardew Valley", "StardewValley.Farmer"),
        "Name",
        TypeRef::system("System.String"),
    );

    let mut module = Module::new(name, Version::new(1, 0));
    for m in 0..METHODS {
        let mut body = Vec::with_capacity(CALLS_PER_METHOD * 3 + 1);
        let mut offset = 0;
        for c in 0..CALLS_PER_METHOD {
            let target = if hit_every.is_some_and(|n| c % n == 0) { foo.clone() } else { unrelated.clone() };
            body.push(Instruction::call(offset, target));
            body.push(Instruction::ldsfld(offset + 5, name_field.clone()));
            body.push(Instruction::other(offset + 10, "pop", 1, 0));
            offset += 11;
        }
        body.push(Instruction::ret(offset, false));
        module = module.with_method(Method::new(format!("System.Void {name}.Type{m}::Run()"), body));
    }
    module
}

/// Benchmark a full pass over a module no rule applies to.
fn bench_clean_module(c: &mut Criterion) {
    let engine = CompatibilityEngine::new(rules(), RewriteOptions::default()).unwrap();
    let template = module("CleanMod", None);

    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Elements(template.instruction_count() as u64));
    group.bench_function("clean_module", |b| {
        b.iter_batched_ref(
            || template.clone(),
            |module| black_box(engine.process(module)),
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

/// Benchmark a full pass where every other call site is rewritten.
fn bench_rewrite_heavy_module(c: &mut Criterion) {
    let engine = CompatibilityEngine::new(rules(), RewriteOptions::default()).unwrap();
    let template = module("LegacyMod", Some(2));

    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Elements(template.instruction_count() as u64));
    group.bench_function("rewrite_heavy_module", |b| {
        b.iter_batched_ref(
            || template.clone(),
            |module| black_box(engine.process(module)),
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

/// Benchmark processing a batch of modules in parallel into one log.
fn bench_parallel_batch(c: &mut Criterion) {
    let engine = CompatibilityEngine::new(rules(), RewriteOptions::default()).unwrap();
    let templates: Vec<Module> = (0..32).map(|i| module(&format!("Mod{i}"), Some(4))).collect();

    c.bench_function("pipeline_parallel_32_modules", |b| {
        b.iter_batched_ref(
            || templates.clone(),
            |modules| {
                let log = CompatibilityLog::new();
                black_box(engine.process_all(modules, &log))
            },
            BatchSize::LargeInput,
        );
    });
}

/// Benchmark building an engine, which parses and validates every rule.
fn bench_engine_construction(c: &mut Criterion) {
    let rules = rules();
    c.bench_function("engine_construction", |b| {
        b.iter(|| {
            let engine = CompatibilityEngine::new(black_box(rules.clone()), RewriteOptions::default()).unwrap();
            black_box(engine)
        });
    });
}

criterion_group!(
    benches,
    bench_clean_module,
    bench_rewrite_heavy_module,
    bench_parallel_batch,
    bench_engine_construction
);
criterion_main!(benches);
