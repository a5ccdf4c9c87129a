//! Modules: the binary units that pass through the rewriting pipeline.

use std::fmt;

use crate::model::method::Method;

/// The processor platform a module was compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Platform {
    /// Platform neutral; runs with the host's pointer width
    #[default]
    AnyCpu,
    /// 32-bit pointers
    X86,
    /// 64-bit pointers
    X64,
}

impl Platform {
    /// Returns the platform of the current process.
    #[must_use]
    pub fn host() -> Self {
        if cfg!(target_pointer_width = "64") {
            Platform::X64
        } else {
            Platform::X86
        }
    }

    /// Returns the pointer width in bits, or `None` for platform-neutral modules.
    #[must_use]
    pub fn pointer_width(&self) -> Option<u8> {
        match self {
            Platform::AnyCpu => None,
            Platform::X86 => Some(32),
            Platform::X64 => Some(64),
        }
    }

    /// Returns true if code compiled for `self` assumes a different pointer width than
    /// `host` provides.
    #[must_use]
    pub fn differs_from(&self, host: Platform) -> bool {
        match (self.pointer_width(), host.pointer_width()) {
            (Some(origin), Some(host)) => origin != host,
            _ => false,
        }
    }
}

/// A four-part assembly version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version {
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
    /// Build number
    pub build: u16,
    /// Revision number
    pub revision: u16,
}

impl Version {
    /// Creates a version from major and minor numbers.
    #[must_use]
    pub const fn new(major: u16, minor: u16) -> Self {
        Version {
            major,
            minor,
            build: 0,
            revision: 0,
        }
    }

    /// Parses `major[.minor[.build[.revision]]]`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = [0u16; 4];
        let mut count = 0;
        for (slot, piece) in parts.iter_mut().zip(text.trim().split('.')) {
            *slot = piece.parse().ok()?;
            count += 1;
        }
        if count == 0 || text.trim().split('.').count() > 4 {
            return None;
        }
        Some(Version {
            major: parts[0],
            minor: parts[1],
            build: parts[2],
            revision: parts[3],
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// A reference from a module to another assembly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssemblyReference {
    /// The referenced assembly name
    pub name: String,
    /// The referenced version
    pub version: Version,
}

impl AssemblyReference {
    /// Creates an assembly reference.
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        AssemblyReference {
            name: name.into(),
            version,
        }
    }
}

/// One loaded extension module.
///
/// The identity (name and version) is fixed at construction; the content (methods,
/// recorded platform, assembly references) is mutable so that rewriters can fix it in
/// place before the external loader admits the module.
///
/// # Examples
///
/// ```rust
/// use cilshim::model::{Instruction, Method, Module, Platform, Version};
///
/// let module = Module::new("SampleMod", Version::new(1, 2))
///     .with_platform(Platform::X86)
///     .with_method(Method::new(
///         "System.Void SampleMod.ModEntry::Entry()",
///         vec![Instruction::ret(0, false)],
///     ));
///
/// assert_eq!(module.name(), "SampleMod");
/// assert_eq!(module.methods().len(), 1);
/// assert_eq!(module.instruction_count(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    name: String,
    version: Version,
    platform: Platform,
    references: Vec<AssemblyReference>,
    methods: Vec<Method>,
}

impl Module {
    /// Creates an empty platform-neutral module.
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Module {
            name: name.into(),
            version,
            platform: Platform::AnyCpu,
            references: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Sets the recorded origin platform.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Adds an assembly reference.
    #[must_use]
    pub fn with_reference(mut self, reference: AssemblyReference) -> Self {
        self.references.push(reference);
        self
    }

    /// Adds a method.
    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    /// Returns the module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the module version.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the recorded origin platform.
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Updates the recorded platform.
    pub fn set_platform(&mut self, platform: Platform) {
        self.platform = platform;
    }

    /// Returns the assembly references.
    #[must_use]
    pub fn references(&self) -> &[AssemblyReference] {
        &self.references
    }

    /// Returns the reference to the named assembly.
    #[must_use]
    pub fn reference(&self, name: &str) -> Option<&AssemblyReference> {
        self.references.iter().find(|r| r.name == name)
    }

    /// Returns the reference to the named assembly for editing.
    pub fn reference_mut(&mut self, name: &str) -> Option<&mut AssemblyReference> {
        self.references.iter_mut().find(|r| r.name == name)
    }

    /// Returns the methods.
    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Returns the methods for editing.
    pub fn methods_mut(&mut self) -> &mut [Method] {
        &mut self.methods
    }

    /// Returns the total number of instructions over all methods.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.methods.iter().map(Method::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_differs() {
        assert!(Platform::X86.differs_from(Platform::X64));
        assert!(!Platform::X64.differs_from(Platform::X64));
        assert!(!Platform::AnyCpu.differs_from(Platform::X64));
        assert!(!Platform::X86.differs_from(Platform::AnyCpu));
    }

    #[test]
    fn test_version_parse() {
        assert_eq!(Version::parse("2.0"), Some(Version::new(2, 0)));
        assert_eq!(
            Version::parse("1.2.3.4"),
            Some(Version {
                major: 1,
                minor: 2,
                build: 3,
                revision: 4
            })
        );
        assert_eq!(Version::parse("1.x"), None);
        assert_eq!(Version::parse("1.2.3.4.5"), None);
        assert_eq!(Version::new(1, 6).to_string(), "1.6.0.0");
    }

    #[test]
    fn test_reference_lookup() {
        let mut module = Module::new("Mod", Version::new(1, 0))
            .with_reference(AssemblyReference::new("0Harmony", Version::new(1, 2)));
        assert_eq!(module.reference("0Harmony").map(|r| r.version.major), Some(1));
        if let Some(reference) = module.reference_mut("0Harmony") {
            reference.version = Version::new(2, 0);
        }
        assert_eq!(module.reference("0Harmony").map(|r| r.version.major), Some(2));
        assert!(module.reference("Netcode").is_none());
    }
}
