//! Pointer-width rewrites for modules compiled for a different platform than the host.

use log::debug;

use crate::{
    model::{Instruction, MethodRef, Module, Op, Platform, SymbolRef},
    rewriter::{
        context::InstructionCursor,
        handler::{describe, Outcome},
    },
    symbols::{parse_signature, PlatformRule},
    Result,
};

/// A [`PlatformRule`] with its signatures parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformRewrite {
    old: String,
    new: MethodRef,
    before: Vec<String>,
    after: Vec<String>,
}

impl PlatformRewrite {
    /// Parses and checks one rule.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Signature`] for unparsable signatures and
    /// [`crate::Error::Configuration`] if either side is not a method or the two sides
    /// have a different stack shape.
    pub fn compile(rule: &PlatformRule) -> Result<Self> {
        let (SymbolRef::Method(old), SymbolRef::Method(new)) =
            (parse_signature(&rule.old)?, parse_signature(&rule.new)?)
        else {
            return Err(config_error!(
                "platform rule {} -> {} must name two methods",
                rule.old,
                rule.new
            ));
        };

        if old.parameters.len() != new.parameters.len()
            || old.return_type.is_void() != new.return_type.is_void()
        {
            return Err(config_error!(
                "platform rule {} -> {} changes the stack shape of the call",
                rule.old,
                rule.new
            ));
        }

        Ok(PlatformRewrite {
            old: old.full_name(),
            new,
            before: rule.before.clone(),
            after: rule.after.clone(),
        })
    }

    /// Compiles a list of rules.
    ///
    /// # Errors
    ///
    /// Fails on the first invalid rule, see [`PlatformRewrite::compile`].
    pub fn compile_all(rules: &[PlatformRule]) -> Result<Vec<Self>> {
        rules.iter().map(PlatformRewrite::compile).collect()
    }

    fn replacement(&self, call: &Instruction, old: &MethodRef) -> (Vec<Instruction>, usize) {
        let offset = call.offset;
        let conversion = |mnemonic: &String| Instruction::other(offset, mnemonic.clone(), 1, 1);

        let mut target = self.new.clone();
        target.declaring_type.scope.clone_from(&old.declaring_type.scope);
        target.has_this = old.has_this;
        let op = match call.op {
            Op::CallVirtual(_) => Op::CallVirtual(target),
            _ => Op::Call(target),
        };

        let mut replacement: Vec<Instruction> = self.before.iter().map(conversion).collect();
        let primary = replacement.len();
        replacement.push(call.with_op(op));
        replacement.extend(self.after.iter().map(conversion));
        (replacement, primary)
    }
}

pub(crate) fn matches(instruction: &Instruction) -> bool {
    matches!(instruction.op, Op::Call(_) | Op::CallVirtual(_))
}

pub(crate) fn apply(rewrites: &[PlatformRewrite], cursor: &mut InstructionCursor<'_>) -> Result<Outcome> {
    let current = cursor.current().clone();
    let Some(method) = current.method_ref() else {
        return Ok(Outcome::NoMatch);
    };

    let key = method.full_name();
    let Some(rewrite) = rewrites.iter().find(|r| r.old == key) else {
        return Ok(Outcome::NoMatch);
    };

    let (replacement, primary) = rewrite.replacement(&current, method);
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
    Ok(Outcome::Rewritten {
        message,
        finding: None,
    })
}

pub(crate) fn finish(module: &mut Module) -> Option<String> {
    let from = module.platform();
    if from == Platform::AnyCpu {
        return None;
    }
    module.set_platform(Platform::AnyCpu);
    debug!("{}: platform {from:?} -> AnyCpu", module.name());
    Some(format!("platform target changed from {from:?} to AnyCpu"))
}
