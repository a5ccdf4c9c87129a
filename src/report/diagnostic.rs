//! Per-module results: rewrites, diagnostics and the admission decision.

use std::fmt::{self, Write as _};

use strum::IntoEnumIterator;

use crate::{
    model::Version,
    report::severity::{FindingKind, Severity},
};

/// One instruction rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    /// Full name of the method containing the instruction
    pub method: String,
    /// Original IL offset of the instruction
    pub offset: u32,
    /// Name of the handler that rewrote it
    pub handler: &'static str,
    /// What was rewritten into what
    pub message: String,
}

/// One non-clean outcome, attached to its source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Full name of the method containing the instruction
    pub method: String,
    /// Index of the instruction when the handler saw it
    pub index: usize,
    /// Original IL offset of the instruction
    pub offset: u32,
    /// How serious the outcome is
    pub severity: Severity,
    /// What the outcome is about
    pub kind: FindingKind,
    /// Name of the handler that reported it
    pub handler: &'static str,
    /// Human-readable explanation
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} at IL_{:04x}: {} ({})",
            self.severity, self.method, self.offset, self.message, self.handler
        )
    }
}

/// What the external loader should do with a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Admission {
    /// Load without comment (`clean`, `rewritten`)
    Admit,
    /// Load and surface the diagnostics to the user (`suspicious`, `broken`)
    AdmitWithWarnings,
    /// Do not load (`fatal`)
    Reject,
}

impl From<Severity> for Admission {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Clean | Severity::Rewritten => Admission::Admit,
            Severity::Suspicious | Severity::Broken => Admission::AdmitWithWarnings,
            Severity::Fatal => Admission::Reject,
        }
    }
}

/// The outcome of running the pipeline over one module.
///
/// # Examples
///
/// ```rust
/// use cilshim::{
///     model::Version,
///     report::{Admission, ModuleReport, Severity},
/// };
///
/// let report = ModuleReport::new("SampleMod", Version::new(1, 0));
/// assert_eq!(report.severity(), Severity::Clean);
/// assert_eq!(report.admission(), Admission::Admit);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleReport {
    /// Module name
    pub module: String,
    /// Module version
    pub version: Version,
    /// Number of distinct instructions rewritten
    pub rewritten_count: usize,
    /// Every rewrite, in pipeline order
    pub rewrites: Vec<Rewrite>,
    /// Every non-clean outcome, in pipeline order
    pub diagnostics: Vec<Diagnostic>,
    /// Informational notes that carry no severity
    pub notes: Vec<String>,
}

impl ModuleReport {
    /// Creates an empty report.
    pub fn new(module: impl Into<String>, version: Version) -> Self {
        ModuleReport {
            module: module.into(),
            version,
            rewritten_count: 0,
            rewrites: Vec::new(),
            diagnostics: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// The roll-up severity: the maximum over all outcomes.
    #[must_use]
    pub fn severity(&self) -> Severity {
        let rewritten = if self.rewritten_count > 0 {
            Severity::Rewritten
        } else {
            Severity::Clean
        };
        self.diagnostics
            .iter()
            .map(|d| d.severity)
            .max()
            .map_or(rewritten, |worst| worst.max(rewritten))
    }

    /// The admission decision implied by [`ModuleReport::severity`].
    #[must_use]
    pub fn admission(&self) -> Admission {
        self.severity().into()
    }

    /// Returns true if nothing was rewritten or reported.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.severity() == Severity::Clean
    }

    /// Number of diagnostics with exactly the given severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics.iter().filter(|d| d.severity == severity).count()
    }

    /// Diagnostics of the given kind.
    pub fn diagnostics_of(&self, kind: FindingKind) -> impl Iterator<Item = &Diagnostic> + '_ {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }

    /// A one-paragraph human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} {}: {} ({} rewritten",
            self.module,
            self.version,
            self.severity(),
            self.rewritten_count
        );
        for severity in Severity::iter().filter(|s| s.is_flagged()) {
            let count = self.count(severity);
            if count > 0 {
                let _ = write!(out, ", {count} {severity}");
            }
        }
        out.push(')');
        out
    }
}
