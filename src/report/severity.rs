//! Outcome severities and finding categories.

use std::fmt;

use strum::{EnumCount, EnumIter, IntoStaticStr};

/// The outcome of one handler on one instruction, ordered from harmless to fatal.
///
/// The roll-up severity of a module is the maximum over all of its outcomes, so the
/// ordering of the variants is significant.
///
/// # Examples
///
/// ```rust
/// use cilshim::report::Severity;
/// use strum::IntoEnumIterator;
///
/// assert!(Severity::Fatal > Severity::Broken);
/// assert_eq!(Severity::iter().max(), Some(Severity::Fatal));
/// assert_eq!(Severity::Suspicious.as_str(), "suspicious");
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    EnumIter,
    EnumCount,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    /// Nothing to report
    #[default]
    Clean,
    /// A reference was rewritten to its current equivalent
    Rewritten,
    /// The module may misbehave; admitted with a warning
    Suspicious,
    /// A reference will fail at runtime; admitted with a warning
    Broken,
    /// The module cannot be made consistent and must be rejected
    Fatal,
}

impl Severity {
    /// Returns the lowercase name used in reports and log dumps.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Parses a lowercase severity name.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        use strum::IntoEnumIterator;
        Severity::iter().find(|s| s.as_str().eq_ignore_ascii_case(text.trim()))
    }

    /// Returns true for severities that are reported as diagnostics.
    #[must_use]
    pub fn is_flagged(self) -> bool {
        self >= Severity::Suspicious
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a diagnostic is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum FindingKind {
    /// A reference into a trusted assembly names a member that does not exist
    BrokenReference,
    /// A reference names a member whose declared type changed
    UnexpectedType,
    /// A generic-normalized lookup matched more than one rule
    AmbiguousRule,
    /// A reference matched a detect-only rule
    KnownBroken,
    /// A rewrite would have unbalanced the method
    StackImbalance,
    /// Direct console access, bypassing the host's logging
    ConsoleAccess,
    /// Access to the save serializer
    SaveSerializer,
    /// Subscription to update-tick events that bypass validation
    UnvalidatedUpdateTick,
    /// Direct filesystem access
    FilesystemAccess,
    /// Starting external processes
    ShellAccess,
    /// Runtime patching of host code
    PatchesGame,
    /// An asset is loaded with a different type than the host declares for it
    ContentTypeMismatch,
    /// Anything else
    Other,
}

impl FindingKind {
    /// Returns the kebab-case name used in reports and rule documents.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Parses a kebab-case finding kind.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        use strum::IntoEnumIterator;
        FindingKind::iter().find(|k| k.as_str() == text.trim())
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detection produced by a handler, before it is attached to a location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// How serious the finding is
    pub severity: Severity,
    /// What the finding is about
    pub kind: FindingKind,
    /// Human-readable explanation
    pub message: String,
}

impl Finding {
    /// Creates a finding.
    pub fn new(severity: Severity, kind: FindingKind, message: impl Into<String>) -> Self {
        Finding {
            severity,
            kind,
            message: message.into(),
        }
    }

    /// A `suspicious` finding.
    pub fn suspicious(kind: FindingKind, message: impl Into<String>) -> Self {
        Finding::new(Severity::Suspicious, kind, message)
    }

    /// A `broken` finding.
    pub fn broken(kind: FindingKind, message: impl Into<String>) -> Self {
        Finding::new(Severity::Broken, kind, message)
    }

    /// A `fatal` finding.
    pub fn fatal(kind: FindingKind, message: impl Into<String>) -> Self {
        Finding::new(Severity::Fatal, kind, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_severity_order() {
        let ordered: Vec<Severity> = Severity::iter().collect();
        let mut sorted = ordered.clone();
        sorted.sort();
        assert_eq!(ordered, sorted);
        assert_eq!(Severity::COUNT, 5);
        assert!(!Severity::Rewritten.is_flagged());
        assert!(Severity::Suspicious.is_flagged());
    }

    #[test]
    fn test_names_round_trip() {
        for severity in Severity::iter() {
            assert_eq!(Severity::parse(severity.as_str()), Some(severity));
        }
        for kind in FindingKind::iter() {
            assert_eq!(FindingKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(FindingKind::UnvalidatedUpdateTick.as_str(), "unvalidated-update-tick");
        assert_eq!(Severity::parse("BROKEN"), Some(Severity::Broken));
        assert_eq!(FindingKind::parse("nonsense"), None);
    }
}
