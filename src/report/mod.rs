//! Result aggregation: what happened to each module, and what the loader should do.
//!
//! Handlers produce [`Finding`]s; the pipeline attaches them to a location as
//! [`Diagnostic`]s in a [`ModuleReport`]. The report's roll-up [`Severity`] decides the
//! [`Admission`] of the module. Reports can additionally be accumulated across modules
//! in a [`CompatibilityLog`].

mod collector;
mod diagnostic;
mod severity;

pub use collector::{CompatibilityLog, LogEntry, ModuleSummary};
pub use diagnostic::{Admission, Diagnostic, ModuleReport, Rewrite};
pub use severity::{Finding, FindingKind, Severity};
