//! The ordered handler table and the single pass that drives it over a module.

use std::collections::HashSet;

use log::{debug, info, warn};

use crate::{
    model::Module,
    report::{Diagnostic, Finding, FindingKind, ModuleReport, Rewrite},
    rewriter::{
        context::{InstructionCursor, RewriteContext},
        handler::{Handler, Outcome},
    },
    Error, Result,
};

/// Where an outcome happened.
struct Site<'a> {
    method_index: usize,
    method: &'a str,
    index: usize,
    offset: u32,
}

/// Collects handler outcomes into a report.
struct Recorder {
    report: ModuleReport,
    rewritten: HashSet<(usize, u32)>,
}

impl Recorder {
    fn diagnose(&mut self, site: &Site<'_>, handler: &Handler, finding: Finding) {
        self.report.diagnostics.push(Diagnostic {
            method: site.method.to_string(),
            index: site.index,
            offset: site.offset,
            severity: finding.severity,
            kind: finding.kind,
            handler: handler.name(),
            message: finding.message,
        });
    }

    fn record(&mut self, site: &Site<'_>, handler: &Handler, outcome: Result<Outcome>) {
        match outcome {
            Ok(Outcome::NoMatch) => {}
            Ok(Outcome::Rewritten { message, finding }) => {
                debug!(
                    "{}: {} at IL_{:04x}: {message}",
                    site.method,
                    handler.name(),
                    site.offset
                );
                self.rewritten.insert((site.method_index, site.offset));
                self.report.rewrites.push(Rewrite {
                    method: site.method.to_string(),
                    offset: site.offset,
                    handler: handler.name(),
                    message,
                });
                if let Some(finding) = finding {
                    self.diagnose(site, handler, finding);
                }
            }
            Ok(Outcome::Detected(finding)) => self.diagnose(site, handler, finding),
            Ok(Outcome::Note(note)) => self.report.notes.push(note),
            Err(error) => {
                warn!(
                    "{}: {} failed at IL_{:04x}: {error}",
                    site.method,
                    handler.name(),
                    site.offset
                );
                let kind = match error {
                    Error::StackImbalance { .. } => FindingKind::StackImbalance,
                    _ => FindingKind::Other,
                };
                self.diagnose(site, handler, Finding::fatal(kind, error.to_string()));
            }
        }
    }
}

/// An ordered list of handlers, run in one pass over every instruction.
///
/// For each instruction, in program order, every active handler whose predicate accepts
/// the instruction is applied in table order. A handler sees the instruction as left by
/// the handlers before it; when a rewrite grows the body, the pass continues after the
/// inserted instructions.
///
/// # Examples
///
/// ```rust
/// use cilshim::rewriter::{Handler, Pipeline};
///
/// let pipeline = Pipeline::new(vec![Handler::ReplaceReferences, Handler::MissingMember]);
/// assert_eq!(pipeline.len(), 2);
/// assert_eq!(pipeline.handlers()[1].name(), "missing-member");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    handlers: Vec<Handler>,
}

impl Pipeline {
    /// Creates a pipeline from an ordered handler list.
    #[must_use]
    pub fn new(handlers: Vec<Handler>) -> Self {
        Pipeline { handlers }
    }

    /// Returns the handlers in execution order.
    #[must_use]
    pub fn handlers(&self) -> &[Handler] {
        &self.handlers
    }

    /// Returns the number of handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if the pipeline has no handlers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs every active handler over every instruction of `module`.
    ///
    /// `ctx.module` must describe `module` as it was before the run. Failures of single
    /// handlers are recorded as `fatal` diagnostics; they never stop the pass.
    pub fn run(&self, ctx: &RewriteContext<'_>, module: &mut Module) -> ModuleReport {
        let mut recorder = Recorder {
            report: ModuleReport::new(module.name(), module.version()),
            rewritten: HashSet::new(),
        };

        let active: Vec<&Handler> = self.handlers.iter().filter(|h| h.is_active(ctx)).collect();
        for (method_index, method) in module.methods_mut().iter_mut().enumerate() {
            let name = method.name().to_string();
            let mut index = 0;
            while index < method.len() {
                let mut position = index;
                let mut next = index + 1;
                for handler in &active {
                    let Some(instruction) = method.get(position) else {
                        break;
                    };
                    if !handler.matches(ctx, instruction) {
                        continue;
                    }

                    let site = Site {
                        method_index,
                        method: &name,
                        index: position,
                        offset: instruction.offset,
                    };
                    let mut cursor = InstructionCursor::resume(method, position, next);
                    let outcome = handler.apply(ctx, &mut cursor);
                    position = cursor.index();
                    next = cursor.next();
                    recorder.record(&site, handler, outcome);
                }
                index = next;
            }
        }

        for handler in &active {
            if let Some(note) = handler.finish(ctx, module) {
                debug!("{}: {}", module.name(), note);
                recorder.report.notes.push(note);
            }
        }

        let mut report = recorder.report;
        report.rewritten_count = recorder.rewritten.len();
        info!("{}", report.summary());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{Instruction, Method, MethodRef, TypeRef, Version},
        report::Severity,
        symbols::{CatalogMethod, CatalogType, MemberCatalog, SymbolTableBuilder},
        test::ContextFixture,
    };

    fn foo() -> MethodRef {
        MethodRef::new_static(TypeRef::new("Host", "OldType"), "Foo", TypeRef::void(), vec![])
    }

    fn module() -> Module {
        Module::new("Mod", Version::new(1, 0)).with_method(Method::new(
            "System.Void Mod.Entry::Run()",
            vec![
                Instruction::call(0, foo()),
                Instruction::call(5, foo()),
                Instruction::ret(10, false),
            ],
        ))
    }

    fn run(builder: &SymbolTableBuilder, module: &mut Module) -> ModuleReport {
        let fixture = ContextFixture::new()
            .with_table(builder.build(MemberCatalog::new()).unwrap())
            .for_module(module);
        Pipeline::new(vec![Handler::ReplaceReferences]).run(&fixture.context(), module)
    }

    #[test]
    fn test_counts_distinct_instructions() {
        let mut builder = SymbolTableBuilder::new();
        builder.register_method("System.Void OldType::Foo()", TypeRef::new("Host", "NewType"), "Bar");

        let mut module = module();
        let report = run(&builder, &mut module);
        assert_eq!(report.rewritten_count, 2);
        assert_eq!(report.rewrites.len(), 2);
        assert!(report.diagnostics.is_empty());
        assert_eq!(report.severity(), Severity::Rewritten);

        let second = run(&builder, &mut module);
        assert_eq!(second.rewritten_count, 0);
        assert!(second.is_clean());
    }

    #[test]
    fn test_imbalance_becomes_fatal_diagnostic() {
        let mut builder = SymbolTableBuilder::new();
        builder.register_method("System.Void OldType::Foo()", TypeRef::new("Host", "NewType"), "Bar");

        let mut module = Module::new("Mod", Version::new(1, 0)).with_method(Method::new(
            "System.Void Mod.Entry::Run()",
            vec![
                Instruction::call(0, foo()),
                Instruction::ret(5, false),
            ],
        ));
        // a target that returns a value cannot replace a void call
        let mut catalog = MemberCatalog::new();
        catalog.insert(
            CatalogType::new("Host", "NewType")
                .method(CatalogMethod::new("Bar", TypeRef::system("System.Int32")).static_()),
        );
        let fixture = ContextFixture::new()
            .with_table(builder.build(catalog).unwrap())
            .for_module(&module);
        let before = module.clone();
        let report = Pipeline::new(vec![Handler::ReplaceReferences]).run(&fixture.context(), &mut module);

        assert_eq!(module, before);
        assert_eq!(report.rewritten_count, 0);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].kind, FindingKind::StackImbalance);
        assert_eq!(report.severity(), Severity::Fatal);
    }
}
