//! Options controlling which handlers the engine assembles.

use std::collections::BTreeSet;

use crate::{model::Platform, Result};

/// Assemblies the host always ships, and whose members can therefore be checked.
pub const DEFAULT_TRUSTED_ASSEMBLIES: [&str; 4] =
    ["StardewModdingAPI", "Stardew Valley", "StardewValley", "Netcode"];

/// Options for one engine instance.
///
/// The defaults rewrite and run the heuristic detectors, trust the host's own
/// assemblies and take the pointer width of the running process as the host platform.
///
/// # Examples
///
/// ```rust
/// use cilshim::RewriteOptions;
///
/// let options = RewriteOptions::detect_only();
/// assert!(!options.enable_rewrites);
/// assert!(options.enable_heuristics);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOptions {
    /// Run the rewriting handlers (default: true).
    ///
    /// When disabled, the patch library is still reported but no instruction changes.
    pub enable_rewrites: bool,

    /// Run the catalog-driven heuristic rewriters and detectors (default: true).
    pub enable_heuristics: bool,

    /// Add the filesystem and shell finders (default: false).
    pub paranoid: bool,

    /// Assemblies whose references the heuristic detectors may reason about.
    ///
    /// Merged with the trusted set of the rule set.
    pub trusted_assemblies: BTreeSet<String>,

    /// Pointer width of the host process (default: [`Platform::host`]).
    pub host_platform: Platform,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            enable_rewrites: true,
            enable_heuristics: true,
            paranoid: false,
            trusted_assemblies: DEFAULT_TRUSTED_ASSEMBLIES
                .iter()
                .map(ToString::to_string)
                .collect(),
            host_platform: Platform::host(),
        }
    }
}

impl RewriteOptions {
    /// Creates the default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports everything and rewrites nothing.
    #[must_use]
    pub fn detect_only() -> Self {
        Self {
            enable_rewrites: false,
            ..Self::default()
        }
    }

    /// The defaults plus the filesystem and shell finders.
    #[must_use]
    pub fn paranoid() -> Self {
        Self {
            paranoid: true,
            ..Self::default()
        }
    }

    /// Sets the host platform.
    #[must_use]
    pub fn with_host_platform(mut self, platform: Platform) -> Self {
        self.host_platform = platform;
        self
    }

    /// Adds a trusted assembly.
    #[must_use]
    pub fn with_trusted(mut self, assembly: impl Into<String>) -> Self {
        self.trusted_assemblies.insert(assembly.into());
        self
    }

    /// Returns true if the heuristic rewriters run.
    #[must_use]
    pub fn heuristic_rewrites(&self) -> bool {
        self.enable_rewrites && self.enable_heuristics
    }

    /// Checks the options before any module is processed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] if a trusted assembly name is blank or
    /// padded with whitespace.
    pub fn validate(&self) -> Result<()> {
        for name in &self.trusted_assemblies {
            if name.trim().is_empty() {
                return Err(config_error!("trusted assembly names must not be blank"));
            }
            if name.trim() != name {
                return Err(config_error!(
                    "trusted assembly name '{}' has surrounding whitespace",
                    name
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let default = RewriteOptions::default();
        assert!(default.enable_rewrites && default.enable_heuristics && !default.paranoid);
        assert!(default.trusted_assemblies.contains("Stardew Valley"));
        assert!(default.heuristic_rewrites());

        assert!(!RewriteOptions::detect_only().heuristic_rewrites());
        assert!(RewriteOptions::paranoid().paranoid);
    }

    #[test]
    fn test_validate() {
        assert!(RewriteOptions::default().validate().is_ok());
        assert!(RewriteOptions::default()
            .with_trusted("")
            .validate()
            .unwrap_err()
            .is_configuration());
        assert!(RewriteOptions::default().with_trusted(" Netcode").validate().is_err());
    }
}
