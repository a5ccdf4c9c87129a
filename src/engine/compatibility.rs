//! The compatibility engine: builds the symbol table and handler table once, then
//! processes any number of modules against them.

use std::collections::BTreeSet;

use log::info;
use rayon::prelude::*;

use crate::{
    engine::config::RewriteOptions,
    model::Module,
    report::{CompatibilityLog, ModuleReport},
    rewriter::{Handler, ModuleInfo, PatchLibraryRewrite, Pipeline, PlatformRewrite, RewriteContext},
    symbols::{RuleSet, SymbolTable},
    Result,
};

/// Processes modules against one host release's rules.
///
/// Construction validates everything that can be wrong before a module is seen: the
/// options, the trusted assembly names, every symbol rule, platform rule and the patch
/// library description. After that, processing cannot fail; problems with individual
/// instructions become diagnostics of the module's report.
///
/// The engine is immutable and `Sync`, so one instance can process many modules in
/// parallel.
///
/// # Examples
///
/// ```rust
/// use cilshim::{
///     model::{Instruction, Method, MethodRef, Module, TypeRef, Version},
///     symbols::RuleSet,
///     CompatibilityEngine, RewriteOptions, Severity,
/// };
///
/// let mut rules = RuleSet::new("1.6.0");
/// rules
///     .symbols
///     .register_method("System.Void OldType::Foo()", TypeRef::new("Host", "NewType"), "Bar");
/// let engine = CompatibilityEngine::new(rules, RewriteOptions::default())?;
///
/// let foo = MethodRef::new_static(TypeRef::new("Host", "OldType"), "Foo", TypeRef::void(), vec![]);
/// let mut module = Module::new("SampleMod", Version::new(1, 0)).with_method(Method::new(
///     "System.Void SampleMod.ModEntry::Entry()",
///     vec![Instruction::call(0, foo), Instruction::ret(5, false)],
/// ));
///
/// let report = engine.process(&mut module);
/// assert_eq!(report.rewritten_count, 1);
/// assert_eq!(report.severity(), Severity::Rewritten);
/// # Ok::<(), cilshim::Error>(())
/// ```
#[derive(Debug)]
pub struct CompatibilityEngine {
    rules: RuleSet,
    table: SymbolTable,
    trusted: BTreeSet<String>,
    options: RewriteOptions,
    pipeline: Pipeline,
}

impl CompatibilityEngine {
    /// Builds an engine.
    ///
    /// # Errors
    ///
    /// Returns a configuration error ([`crate::Error::is_configuration`]) for invalid
    /// options, blank trusted assembly names in the rule set, and any symbol, platform
    /// or patch library rule that does not parse or validate.
    pub fn new(rules: RuleSet, options: RewriteOptions) -> Result<Self> {
        options.validate()?;
        if rules.trusted_assemblies.iter().any(|name| name.trim().is_empty()) {
            return Err(config_error!(
                "rule set for host {} lists a blank trusted assembly",
                rules.host_version
            ));
        }

        let table = rules.symbols.build(rules.catalog.clone())?;
        let trusted = options
            .trusted_assemblies
            .union(&rules.trusted_assemblies)
            .cloned()
            .collect();
        let pipeline = Pipeline::new(Self::handlers(&rules, &options)?);

        info!(
            "compatibility engine for host '{}': {} member rules, {} catalogued types, {} handlers",
            rules.host_version,
            table.member_rule_count(),
            table.catalog().len(),
            pipeline.len()
        );

        Ok(CompatibilityEngine {
            rules,
            table,
            trusted,
            options,
            pipeline,
        })
    }

    /// Assembles the handler table in execution order.
    fn handlers(rules: &RuleSet, options: &RewriteOptions) -> Result<Vec<Handler>> {
        let platform = PlatformRewrite::compile_all(&rules.platform)?;
        let patch_library = PatchLibraryRewrite::compile(&rules.patch_library, options.enable_rewrites)?;

        let mut handlers = Vec::new();
        if options.heuristic_rewrites() {
            handlers.push(Handler::HeuristicField);
            handlers.push(Handler::HeuristicMethod);
        }
        if options.enable_rewrites {
            handlers.push(Handler::ReplaceReferences);
            handlers.push(Handler::Platform(platform));
        }
        handlers.push(Handler::PatchLibrary(patch_library));

        if options.enable_heuristics {
            handlers.push(Handler::MissingMember);
            handlers.push(Handler::UnexpectedType);
        }
        handlers.extend(
            rules
                .finders
                .iter()
                .filter(|rule| options.paranoid || !rule.paranoid)
                .cloned()
                .map(Handler::Finder),
        );
        handlers.push(Handler::ContentLoad);
        Ok(handlers)
    }

    /// Returns the options the engine was built with.
    #[must_use]
    pub fn options(&self) -> &RewriteOptions {
        &self.options
    }

    /// Returns the rule set the engine was built from.
    #[must_use]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Returns the resolved symbol table.
    #[must_use]
    pub fn table(&self) -> &SymbolTable {
        &self.table
    }

    /// Returns the handler table.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Returns the effective trusted assembly set (options and rule set combined).
    #[must_use]
    pub fn trusted_assemblies(&self) -> &BTreeSet<String> {
        &self.trusted
    }

    /// Runs the pipeline over one module, rewriting it in place.
    pub fn process(&self, module: &mut Module) -> ModuleReport {
        let ctx = RewriteContext {
            table: &self.table,
            rules: &self.rules,
            trusted: &self.trusted,
            host_platform: self.options.host_platform,
            module: ModuleInfo::of(module),
        };
        self.pipeline.run(&ctx, module)
    }

    /// Like [`CompatibilityEngine::process`], and records the report in `log`.
    pub fn process_logged(&self, module: &mut Module, log: &CompatibilityLog) -> ModuleReport {
        let report = self.process(module);
        log.record(&report);
        report
    }

    /// Processes independent modules in parallel, recording every report in `log`.
    ///
    /// Reports are returned in the order of `modules`.
    pub fn process_all(&self, modules: &mut [Module], log: &CompatibilityLog) -> Vec<ModuleReport> {
        modules
            .par_iter_mut()
            .map(|module| self.process_logged(module, log))
            .collect()
    }
}

/// Processes a single module with a throwaway engine.
///
/// Convenient for one-off checks; build a [`CompatibilityEngine`] to process many
/// modules against the same rules.
///
/// # Errors
///
/// Returns the configuration errors of [`CompatibilityEngine::new`].
pub fn process(module: &mut Module, rules: &RuleSet, options: &RewriteOptions) -> Result<ModuleReport> {
    let engine = CompatibilityEngine::new(rules.clone(), options.clone())?;
    Ok(engine.process(module))
}
