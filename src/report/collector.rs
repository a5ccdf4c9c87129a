//! Cross-module compatibility log.
//!
//! [`CompatibilityLog`] is an explicit accumulator passed into the engine by the caller.
//! It collects the rewrites and diagnostics of every processed module so the host can
//! dump them once after loading, for example to find out which rules are still hit by
//! the installed extensions. Recording takes `&self` and is safe from worker threads.

use std::io::Write;

use dashmap::DashMap;
use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Writer,
};

use crate::{
    model::Version,
    report::{
        diagnostic::ModuleReport,
        severity::{FindingKind, Severity},
    },
    Result,
};

/// One recorded rewrite or diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Module name
    pub module: String,
    /// Full name of the method
    pub method: String,
    /// Original IL offset
    pub offset: u32,
    /// `Rewritten` for rewrites, otherwise the diagnostic severity
    pub severity: Severity,
    /// Diagnostic category, `None` for rewrites
    pub kind: Option<FindingKind>,
    /// Reporting handler
    pub handler: &'static str,
    /// Explanation
    pub message: String,
}

/// The latest roll-up of one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleSummary {
    /// Module version
    pub version: Version,
    /// Roll-up severity
    pub severity: Severity,
    /// Number of rewritten instructions
    pub rewritten: usize,
    /// Number of diagnostics
    pub diagnostics: usize,
}

/// Thread-safe accumulator of per-module results.
///
/// # Examples
///
/// ```rust
/// use cilshim::{model::Version, report::{CompatibilityLog, ModuleReport}};
///
/// let log = CompatibilityLog::new();
/// log.record(&ModuleReport::new("SampleMod", Version::new(1, 0)));
///
/// let mut xml = Vec::new();
/// log.write_xml(&mut xml).unwrap();
/// assert!(String::from_utf8(xml).unwrap().contains("SampleMod"));
/// ```
#[derive(Debug)]
pub struct CompatibilityLog {
    entries: boxcar::Vec<LogEntry>,
    modules: DashMap<String, ModuleSummary>,
}

impl Default for CompatibilityLog {
    fn default() -> Self {
        Self {
            entries: boxcar::Vec::new(),
            modules: DashMap::new(),
        }
    }
}

impl CompatibilityLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every rewrite and diagnostic of a report and updates the module roll-up.
    ///
    /// Entries are append-only: recording the same module twice keeps both runs' entries
    /// while the roll-up reflects the latest run.
    pub fn record(&self, report: &ModuleReport) {
        for rewrite in &report.rewrites {
            self.entries.push(LogEntry {
                module: report.module.clone(),
                method: rewrite.method.clone(),
                offset: rewrite.offset,
                severity: Severity::Rewritten,
                kind: None,
                handler: rewrite.handler,
                message: rewrite.message.clone(),
            });
        }
        for diagnostic in &report.diagnostics {
            self.entries.push(LogEntry {
                module: report.module.clone(),
                method: diagnostic.method.clone(),
                offset: diagnostic.offset,
                severity: diagnostic.severity,
                kind: Some(diagnostic.kind),
                handler: diagnostic.handler,
                message: diagnostic.message.clone(),
            });
        }

        self.modules.insert(
            report.module.clone(),
            ModuleSummary {
                version: report.version,
                severity: report.severity(),
                rewritten: report.rewritten_count,
                diagnostics: report.diagnostics.len(),
            },
        );
    }

    /// Returns the number of recorded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.count()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.count() == 0 && self.modules.is_empty()
    }

    /// Returns the number of distinct modules recorded.
    #[must_use]
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Returns the latest roll-up of a module.
    #[must_use]
    pub fn summary(&self, module: &str) -> Option<ModuleSummary> {
        self.modules.get(module).map(|entry| *entry.value())
    }

    /// Iterates over all entries in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().map(|(_, entry)| entry)
    }

    /// Iterates over the entries of one module.
    pub fn entries_for<'a>(&'a self, module: &'a str) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.iter().filter(move |entry| entry.module == module)
    }

    /// Iterates over entries at or above `severity`.
    pub fn at_least(&self, severity: Severity) -> impl Iterator<Item = &LogEntry> + '_ {
        self.iter().filter(move |entry| entry.severity >= severity)
    }

    /// Writes the log as an XML document, modules sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if the sink fails.
    pub fn write_xml<W: Write>(&self, sink: W) -> Result<()> {
        let mut writer = Writer::new_with_indent(sink, b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new("compatibility")))?;

        let mut modules: Vec<(String, ModuleSummary)> = self
            .modules
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        modules.sort_by(|a, b| a.0.cmp(&b.0));

        for (name, summary) in &modules {
            let version = summary.version.to_string();
            let rewritten = summary.rewritten.to_string();
            writer.write_event(Event::Start(BytesStart::new("module").with_attributes([
                ("name", name.as_str()),
                ("version", version.as_str()),
                ("severity", summary.severity.as_str()),
                ("rewritten", rewritten.as_str()),
            ])))?;

            for entry in self.entries_for(name) {
                let element = if entry.kind.is_some() { "diagnostic" } else { "rewrite" };
                let offset = format!("IL_{:04x}", entry.offset);
                let mut start = BytesStart::new(element).with_attributes([
                    ("method", entry.method.as_str()),
                    ("offset", offset.as_str()),
                    ("severity", entry.severity.as_str()),
                    ("handler", entry.handler),
                ]);
                if let Some(kind) = entry.kind {
                    start.push_attribute(("kind", kind.as_str()));
                }
                writer.write_event(Event::Start(start))?;
                writer.write_event(Event::Text(BytesText::new(&entry.message)))?;
                writer.write_event(Event::End(BytesEnd::new(element)))?;
            }

            writer.write_event(Event::End(BytesEnd::new("module")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("compatibility")))?;
        Ok(())
    }
}
