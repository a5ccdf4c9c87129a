//! Checks generic content loads against the asset type map.
//!
//! Only a string literal loaded immediately before the call is recognised as the asset
//! name. Anything computed at runtime is reported as a note and otherwise ignored.

use log::warn;

use crate::{
    model::{Instruction, Op, VOID_TYPE},
    report::{Finding, FindingKind},
    rewriter::{
        context::{InstructionCursor, RewriteContext},
        handler::{describe, Outcome},
    },
};

const STRING_TYPE: &str = "System.String";

pub(crate) fn matches(ctx: &RewriteContext<'_>, instruction: &Instruction) -> bool {
    let assets = &ctx.rules.assets;
    match &instruction.op {
        Op::Call(m) | Op::CallVirtual(m) => {
            m.name == assets.method
                && m.generic_arguments.len() == 1
                && m.return_type.name != VOID_TYPE
                && m.parameters.first().is_some_and(|p| p.name == STRING_TYPE)
                && assets.loaders.iter().any(|l| *l == m.declaring_type.name)
        }
        _ => false,
    }
}

pub(crate) fn apply(ctx: &RewriteContext<'_>, cursor: &InstructionCursor<'_>) -> Outcome {
    let current = cursor.current();
    let Some(method) = current.method_ref() else {
        return Outcome::NoMatch;
    };
    let Some(requested) = method.generic_arguments.first() else {
        return Outcome::NoMatch;
    };

    let asset = cursor
        .previous()
        .and_then(Instruction::constant_value)
        .and_then(|c| c.as_str());
    let Some(asset) = asset else {
        warn!(
            "{}: asset name of {} at IL_{:04x} is not a literal, type not checked",
            cursor.method_name(),
            describe(current),
            current.offset
        );
        return Outcome::Note(format!(
            "{} in {} loads an asset whose name is computed at runtime",
            describe(current),
            cursor.method_name()
        ));
    };

    match ctx.rules.assets.expected_type(asset) {
        Some(expected) if expected != requested.full_name() => {
            Outcome::Detected(Finding::suspicious(
                FindingKind::ContentTypeMismatch,
                format!(
                    "loads '{asset}' as {}, but the host provides it as {expected}",
                    requested.full_name()
                ),
            ))
        }
        _ => Outcome::NoMatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{Method, MethodRef, TypeRef},
        symbols::{parse_type, RuleSet},
        test::ContextFixture,
    };

    fn load(ty: &str) -> Instruction {
        Instruction::callvirt(
            6,
            MethodRef::new_instance(
                TypeRef::new("Stardew Valley", "StardewValley.LocalizedContentManager"),
                "Load",
                TypeRef::generic("", "!!0", vec![]),
                vec![TypeRef::system(STRING_TYPE)],
            )
            .with_generic_arguments(vec![parse_type(ty).unwrap()]),
        )
    }

    fn outcome(previous: Instruction, call: Instruction) -> Outcome {
        let mut rules = RuleSet::default();
        rules
            .assets
            .insert("Data\\ObjectInformation", "System.Collections.Generic.Dictionary`2<System.Int32,System.String>");
        let fixture = ContextFixture::new().with_rules(rules);
        let ctx = fixture.context();

        assert!(matches(&ctx, &call));
        let mut method = Method::new("M", vec![Instruction::other(0, "ldarg.0", 0, 1), previous, call]);
        let cursor = InstructionCursor::new(&mut method, 2);
        apply(&ctx, &cursor)
    }

    #[test]
    fn test_mismatch_is_suspicious() {
        let result = outcome(
            Instruction::ldstr(1, "Data/ObjectInformation"),
            load("System.Collections.Generic.Dictionary`2<System.String,System.String>"),
        );
        assert!(matches!(
            result,
            Outcome::Detected(Finding { kind: FindingKind::ContentTypeMismatch, .. })
        ));
    }

    #[test]
    fn test_unknown_or_matching_asset_is_clean() {
        assert_eq!(
            outcome(Instruction::ldstr(1, "Maps/Farm"), load("xTile.Map")),
            Outcome::NoMatch
        );
    }

    #[test]
    fn test_computed_name_is_noted() {
        let result = outcome(Instruction::other(1, "ldloc.0", 0, 1), load("xTile.Map"));
        assert!(matches!(result, Outcome::Note(_)));
    }
}
