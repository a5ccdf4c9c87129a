//! Detect-only finders driven by [`FinderRule`]s.

use crate::{
    model::{Instruction, Op},
    report::Finding,
    rewriter::handler::{describe, Outcome},
    symbols::{FinderRule, FinderTarget},
};

pub(crate) fn matches(instruction: &Instruction) -> bool {
    instruction.constant_value().is_none() && instruction.symbol().is_some()
}

/// Returns the event name of an `add_X`/`remove_X` call.
fn event_name(name: &str) -> Option<&str> {
    name.strip_prefix("add_").or_else(|| name.strip_prefix("remove_"))
}

pub(crate) fn apply(rule: &FinderRule, instruction: &Instruction) -> Outcome {
    let matched = match &rule.target {
        FinderTarget::Types(types) => instruction.symbol().and_then(|symbol| {
            let mut hit = None;
            let found = symbol.mentions(|ty| {
                if types.contains(&ty.name) {
                    hit = Some(ty.name.clone());
                    return true;
                }
                false
            });
            hit.filter(|_| found)
                .map(|ty| format!("{} uses {ty}", describe(instruction)))
        }),
        FinderTarget::Fields { type_name, fields } => instruction
            .field_ref()
            .filter(|f| f.declaring_type.name == *type_name && fields.contains(&f.name))
            .map(|f| format!("{} accesses {}", instruction.mnemonic(), f.display_name())),
        FinderTarget::Events { type_name, events } => match &instruction.op {
            Op::Call(m) | Op::CallVirtual(m) if m.declaring_type.name == *type_name => {
                event_name(&m.name)
                    .filter(|event| events.iter().any(|e| e == *event))
                    .map(|event| format!("subscribes to {}.{event}", m.declaring_type.name))
            }
            _ => None,
        },
    };

    match matched {
        Some(message) => Outcome::Detected(Finding::new(rule.severity, rule.kind, message)),
        None => Outcome::NoMatch,
    }
}
