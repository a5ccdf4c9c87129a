//! The closed set of instruction handlers and their outcome type.
//!
//! A [`Handler`] is one entry of the pipeline table: it carries whatever configuration
//! it needs, a cheap match predicate ([`Handler::matches`]) and the action
//! ([`Handler::apply`]) run on instructions the predicate accepts. Dispatch is a plain
//! `match`, so adding a handler means adding a variant here and a file under
//! `handlers/`.

use crate::{
    model::{Instruction, Module},
    report::Finding,
    rewriter::{
        context::{InstructionCursor, RewriteContext},
        handlers::{
            content, finders, heuristics, platform, references, PatchLibraryRewrite, PlatformRewrite,
        },
    },
    symbols::{FinderRule, FinderTarget},
    Result,
};

/// What a handler did with one instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The instruction is none of this handler's business
    NoMatch,
    /// The instruction was rewritten
    Rewritten {
        /// What was rewritten into what
        message: String,
        /// A finding to report alongside the rewrite
        finding: Option<Finding>,
    },
    /// The instruction was flagged without being changed
    Detected(Finding),
    /// Something worth telling the user that carries no severity
    Note(String),
}

/// Whether a handler may change the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerRole {
    /// Rewrites instructions
    Rewriter,
    /// Only reports
    Detector,
}

/// One entry of the handler pipeline.
#[derive(Debug, Clone)]
pub enum Handler {
    /// Field accesses to removed fields that survive as properties
    HeuristicField,
    /// Calls to removed overloads that survive with extra optional parameters
    HeuristicMethod,
    /// Type, field, method and facade rules of the symbol table
    ReplaceReferences,
    /// Pointer-width dependent calls, when module and host widths differ
    Platform(Vec<PlatformRewrite>),
    /// Migration of the runtime patching library, or detection only
    PatchLibrary(PatchLibraryRewrite),
    /// References to trusted members that do not exist
    MissingMember,
    /// References to trusted members that exist with a different type
    UnexpectedType,
    /// Data-driven type, field and event finders
    Finder(FinderRule),
    /// Content loads whose generic type disagrees with the asset map
    ContentLoad,
}

impl Handler {
    /// Unique name used in diagnostics and logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Handler::HeuristicField => "heuristic-field",
            Handler::HeuristicMethod => "heuristic-method",
            Handler::ReplaceReferences => "replace-references",
            Handler::Platform(_) => "platform",
            Handler::PatchLibrary(rewrite) if rewrite.should_rewrite() => "patch-library",
            Handler::PatchLibrary(_) => "patch-library-finder",
            Handler::MissingMember => "missing-member",
            Handler::UnexpectedType => "unexpected-type",
            Handler::Finder(rule) => match rule.target {
                FinderTarget::Types(_) => "type-finder",
                FinderTarget::Fields { .. } => "field-finder",
                FinderTarget::Events { .. } => "event-finder",
            },
            Handler::ContentLoad => "content-load",
        }
    }

    /// Returns whether this handler may change the instruction stream.
    #[must_use]
    pub fn role(&self) -> HandlerRole {
        match self {
            Handler::HeuristicField
            | Handler::HeuristicMethod
            | Handler::ReplaceReferences
            | Handler::Platform(_) => HandlerRole::Rewriter,
            Handler::PatchLibrary(rewrite) if rewrite.should_rewrite() => HandlerRole::Rewriter,
            Handler::PatchLibrary(_)
            | Handler::MissingMember
            | Handler::UnexpectedType
            | Handler::Finder(_)
            | Handler::ContentLoad => HandlerRole::Detector,
        }
    }

    /// Should this handler run on the module at all?
    #[must_use]
    pub fn is_active(&self, ctx: &RewriteContext<'_>) -> bool {
        match self {
            Handler::Platform(rewrites) => {
                !rewrites.is_empty() && ctx.module.platform.differs_from(ctx.host_platform)
            }
            Handler::ContentLoad => !ctx.rules.assets.is_empty(),
            Handler::HeuristicField
            | Handler::HeuristicMethod
            | Handler::MissingMember
            | Handler::UnexpectedType => !ctx.trusted.is_empty() && !ctx.catalog().is_empty(),
            Handler::ReplaceReferences | Handler::PatchLibrary(_) | Handler::Finder(_) => true,
        }
    }

    /// Cheap pre-check: could [`Handler::apply`] do anything with `instruction`?
    #[must_use]
    pub fn matches(&self, ctx: &RewriteContext<'_>, instruction: &Instruction) -> bool {
        match self {
            Handler::HeuristicField => heuristics::matches_field(ctx, instruction),
            Handler::HeuristicMethod => heuristics::matches_method(ctx, instruction),
            Handler::MissingMember | Handler::UnexpectedType => {
                heuristics::matches_member(ctx, instruction)
            }
            Handler::ReplaceReferences => references::matches(instruction),
            Handler::Platform(_) => platform::matches(instruction),
            Handler::PatchLibrary(rewrite) => rewrite.matches(instruction),
            Handler::Finder(_) => finders::matches(instruction),
            Handler::ContentLoad => content::matches(ctx, instruction),
        }
    }

    /// Inspects, and possibly rewrites, the instruction under `cursor`.
    ///
    /// # Errors
    ///
    /// Returns the error of a refused replacement, typically
    /// [`crate::Error::StackImbalance`]. The pipeline turns it into a diagnostic.
    pub fn apply(
        &self,
        ctx: &RewriteContext<'_>,
        cursor: &mut InstructionCursor<'_>,
    ) -> Result<Outcome> {
        match self {
            Handler::HeuristicField => heuristics::rewrite_field(ctx, cursor),
            Handler::HeuristicMethod => heuristics::rewrite_method(ctx, cursor),
            Handler::ReplaceReferences => references::apply(ctx, cursor),
            Handler::Platform(rewrites) => platform::apply(rewrites, cursor),
            Handler::PatchLibrary(rewrite) => rewrite.apply(ctx, cursor),
            Handler::MissingMember => Ok(heuristics::find_missing(ctx, cursor.current())),
            Handler::UnexpectedType => Ok(heuristics::find_unexpected_type(ctx, cursor.current())),
            Handler::Finder(rule) => Ok(finders::apply(rule, cursor.current())),
            Handler::ContentLoad => Ok(content::apply(ctx, cursor)),
        }
    }

    /// Updates module-level metadata after every method has been processed.
    ///
    /// Returns a note for the report if anything changed.
    pub fn finish(&self, ctx: &RewriteContext<'_>, module: &mut Module) -> Option<String> {
        match self {
            Handler::Platform(_) => platform::finish(module),
            Handler::PatchLibrary(rewrite) => rewrite.finish(ctx, module),
            _ => None,
        }
    }
}

/// Short human-readable form of an instruction for messages.
pub(crate) fn describe(instruction: &Instruction) -> String {
    match instruction.symbol() {
        Some(symbol) => format!("{} {}", instruction.mnemonic(), symbol.display_name()),
        None => instruction.mnemonic().to_string(),
    }
}
