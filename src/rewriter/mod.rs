//! The handler pipeline: inspects every instruction of a module and rewrites or flags it.
//!
//! # Architecture
//!
//! A [`Pipeline`] is an ordered table of [`Handler`]s. The table is assembled once by the
//! engine from the options and the rule set, then run over each module in a single
//! linear pass. For every instruction, every active handler gets to look at it in table
//! order; a rewrite done by one handler is what the next handler sees.
//!
//! Handlers share nothing but the read-only [`RewriteContext`]: the symbol table, the
//! rule set, the trusted assembly set and a snapshot of the module's metadata. They edit
//! the method body only through the [`InstructionCursor`], whose replacement primitives
//! refuse any edit that would change the net stack effect.
//!
//! # Handler Order
//!
//! | Handler | Role | Active when |
//! |---------|------|-------------|
//! | `heuristic-field` | rewriter | rewrites and heuristics enabled |
//! | `heuristic-method` | rewriter | rewrites and heuristics enabled |
//! | `replace-references` | rewriter | rewrites enabled |
//! | `platform` | rewriter | rewrites enabled, module platform differs from host |
//! | `patch-library` | rewriter | rewrites enabled (detection only otherwise) |
//! | `missing-member` | detector | heuristics enabled |
//! | `unexpected-type` | detector | heuristics enabled |
//! | `field-finder`, `event-finder`, `type-finder` | detector | always, or paranoid only |
//! | `content-load` | detector | the rule set declares asset types |

mod context;
mod handler;
pub(crate) mod handlers;
mod pipeline;

pub use context::{InstructionCursor, ModuleInfo, RewriteContext};
pub use handler::{Handler, HandlerRole, Outcome};
pub use handlers::{PatchLibraryRewrite, PlatformRewrite};
pub use pipeline::Pipeline;
