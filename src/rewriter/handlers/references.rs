//! Applies the symbol table to instruction operands.

use crate::{
    model::Instruction,
    report::{Finding, FindingKind},
    rewriter::{
        context::{InstructionCursor, RewriteContext},
        handler::{describe, Outcome},
    },
    symbols::Resolution,
    Error, Result,
};

pub(crate) fn matches(instruction: &Instruction) -> bool {
    instruction.constant_value().is_none() && instruction.symbol().is_some()
}

pub(crate) fn apply(ctx: &RewriteContext<'_>, cursor: &mut InstructionCursor<'_>) -> Result<Outcome> {
    let current = cursor.current().clone();
    match ctx.table.resolve(&current.op) {
        Resolution::Unchanged => Ok(Outcome::NoMatch),
        Resolution::Detect { severity, message } => Ok(Outcome::Detected(Finding::new(
            severity,
            FindingKind::KnownBroken,
            format!("{}: {message}", describe(&current)),
        ))),
        Resolution::Unresolved { message } => Ok(Outcome::Detected(Finding::suspicious(
            FindingKind::BrokenReference,
            Error::UnresolvedSymbol(format!("{}: {message}", describe(&current))).to_string(),
        ))),
        Resolution::Rewrite { op, rule, ambiguous } => {
            let replacement = current.with_op(op);
            let rule: &'static str = rule.into();
            let message = format!(
                "{} -> {} ({rule} rule)",
                describe(&current),
                describe(&replacement)
            );
            cursor.replace(replacement)?;

            let finding = ambiguous.map(|candidates| {
                let signature = current
                    .symbol()
                    .map_or_else(|| describe(&current), |s| s.full_name());
                Finding::suspicious(
                    FindingKind::AmbiguousRule,
                    Error::AmbiguousSignature {
                        signature,
                        candidates,
                    }
                    .to_string(),
                )
            });
            Ok(Outcome::Rewritten { message, finding })
        }
    }
}
