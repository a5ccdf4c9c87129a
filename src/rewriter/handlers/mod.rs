//! Implementations behind the [`crate::rewriter::Handler`] variants.
//!
//! Each file holds the match predicate and action of one handler family:
//!
//! - `references` - symbol table rules
//! - `heuristics` - catalog-driven field/method rewrites and the missing-member and
//!   unexpected-type detectors
//! - `platform` - pointer-width rewrites
//! - `patch_library` - runtime patching library migration and detection
//! - `finders` - type, field and event finders
//! - `content` - content-load type checks

pub(crate) mod content;
pub(crate) mod finders;
pub(crate) mod heuristics;
pub(crate) mod patch_library;
pub(crate) mod platform;
pub(crate) mod references;

pub use patch_library::PatchLibraryRewrite;
pub use platform::PlatformRewrite;
