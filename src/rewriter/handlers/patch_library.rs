//! Runtime patching library: migration of the legacy major version, and usage detection.
//!
//! With rewriting enabled and a module referencing the library at its legacy major
//! version, call sites are moved to the current API:
//!
//! - every type of the legacy namespace is renamed into the current namespace
//! - the legacy factory method becomes a constructor call
//! - the legacy `Patch` overload gains the extra trailing argument of the current one,
//!   supplied as `ldnull`
//!
//! and the module's assembly reference is bumped afterwards. In every mode, each `Patch`
//! call site is reported so users can see which modules patch the game.

use crate::{
    model::{Instruction, MethodRef, Module, Op, SymbolRef, TypeRef},
    report::{Finding, FindingKind},
    rewriter::{
        context::{InstructionCursor, RewriteContext},
        handler::{describe, Outcome},
    },
    symbols::{parse_signature, parse_type, PatchLibraryRules},
    Result,
};

/// The compiled patch library handler.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchLibraryRewrite {
    rules: PatchLibraryRules,
    factory: String,
    patch_return: TypeRef,
    should_rewrite: bool,
}

impl PatchLibraryRewrite {
    /// Checks the library description.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Signature`] for an unparsable factory signature or return
    /// type, and [`crate::Error::Configuration`] if the factory is not a method or the
    /// namespaces are blank.
    pub fn compile(rules: &PatchLibraryRules, should_rewrite: bool) -> Result<Self> {
        let SymbolRef::Method(factory) = parse_signature(&rules.factory)? else {
            return Err(config_error!("patch library factory {} is not a method", rules.factory));
        };
        if rules.legacy_namespace.trim().is_empty() || rules.current_namespace.trim().is_empty() {
            return Err(config_error!(
                "patch library {} needs both a legacy and a current namespace",
                rules.assembly
            ));
        }

        let mut patch_return = parse_type(&rules.patch_return)?;
        patch_return.scope = "System.Runtime".to_string();

        Ok(PatchLibraryRewrite {
            rules: rules.clone(),
            factory: factory.full_name(),
            patch_return,
            should_rewrite,
        })
    }

    /// Returns false for the detect-only configuration.
    #[must_use]
    pub fn should_rewrite(&self) -> bool {
        self.should_rewrite
    }

    fn is_library(&self, ty: &TypeRef) -> bool {
        ty.scope == self.rules.assembly
    }

    fn is_legacy(&self, ctx: &RewriteContext<'_>) -> bool {
        self.should_rewrite
            && ctx
                .module
                .reference(&self.rules.assembly)
                .is_some_and(|r| r.version.major == self.rules.legacy_major)
    }

    /// Moves a legacy library type into the current namespace.
    fn map_type(&self, ty: &TypeRef) -> TypeRef {
        let generic_arguments = ty.generic_arguments.iter().map(|a| self.map_type(a)).collect();
        let legacy = &self.rules.legacy_namespace;

        let name = match ty.name.strip_prefix(legacy.as_str()).and_then(|r| r.strip_prefix('.')) {
            Some(rest) if self.is_library(ty) && ty.namespace() == legacy => {
                let (outer, nested) = rest.split_at(rest.find('/').unwrap_or(rest.len()));
                let outer = self
                    .rules
                    .renamed_types
                    .iter()
                    .find(|(old, _)| old == outer)
                    .map_or(outer, |(_, new)| new.as_str());
                format!("{}.{outer}{nested}", self.rules.current_namespace)
            }
            _ => ty.name.clone(),
        };

        TypeRef {
            scope: ty.scope.clone(),
            name,
            generic_arguments,
        }
    }

    pub(crate) fn matches(&self, instruction: &Instruction) -> bool {
        instruction
            .symbol()
            .is_some_and(|s| s.mentions(|t| self.is_library(t)))
    }

    fn migrate(&self, current: &Instruction) -> Option<(Vec<Instruction>, usize)> {
        let mapped = current.op.map_types(&|t| self.map_type(t));

        match (&current.op, mapped) {
            (Op::Call(old), Op::Call(new)) if old.full_name() == self.factory => {
                let ctor = MethodRef::constructor(new.declaring_type, new.parameters);
                Some((vec![current.with_op(Op::Construct(ctor))], 0))
            }
            (Op::Call(old) | Op::CallVirtual(old), Op::Call(mut new) | Op::CallVirtual(mut new))
                if old.name == self.rules.patch_method
                    && self.is_library(&old.declaring_type)
                    && old.parameters.len() == self.rules.legacy_patch_arity =>
            {
                if let Some(last) = new.parameters.last().cloned() {
                    new.parameters.push(last);
                }
                new.return_type = self.patch_return.clone();
                let call = match current.op {
                    Op::CallVirtual(_) => Op::CallVirtual(new),
                    _ => Op::Call(new),
                };
                Some((vec![Instruction::ldnull(current.offset), current.with_op(call)], 1))
            }
            (_, mapped) if mapped != current.op => Some((vec![current.with_op(mapped)], 0)),
            _ => None,
        }
    }

    pub(crate) fn apply(
        &self,
        ctx: &RewriteContext<'_>,
        cursor: &mut InstructionCursor<'_>,
    ) -> Result<Outcome> {
        let current = cursor.current().clone();
        let finding = current
            .method_ref()
            .filter(|m| m.name == self.rules.patch_method && self.is_library(&m.declaring_type))
            .filter(|_| !matches!(current.op, Op::Construct(_)))
            .map(|m| {
                Finding::suspicious(
                    FindingKind::PatchesGame,
                    format!("patches the game through {}", m.display_name()),
                )
            });

        if self.is_legacy(ctx) {
            if let Some((replacement, primary)) = self.migrate(&current) {
                let message = format!(
                    "{} -> {}",
                    describe(&current),
                    replacement
                        .iter()
                        .map(describe)
                        .collect::<Vec<_>>()
                        .join("; ")
                );
                cursor.replace_current(replacement, primary)?;
                return Ok(Outcome::Rewritten { message, finding });
            }
        }

        Ok(finding.map_or(Outcome::NoMatch, Outcome::Detected))
    }

    pub(crate) fn finish(&self, ctx: &RewriteContext<'_>, module: &mut Module) -> Option<String> {
        if !self.is_legacy(ctx) {
            return None;
        }
        let reference = module.reference_mut(&self.rules.assembly)?;
        let from = reference.version;
        reference.version = self.rules.current_version;
        Some(format!(
            "{} reference {from} -> {}",
            self.rules.assembly, self.rules.current_version
        ))
    }
}
