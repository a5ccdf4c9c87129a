use thiserror::Error;

macro_rules! config_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Configuration {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Configuration {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Only two groups of errors ever leave the library through a `Result`:
///
/// ## Configuration Errors
/// - [`Error::Configuration`] - The rule table, member catalog or options are malformed
/// - [`Error::Signature`] - A declarative signature string could not be parsed
/// - [`Error::Xml`] / [`Error::XmlAttribute`] - A rule document is not well-formed XML
/// - [`Error::Io`] - Writing a log dump to a caller-provided sink failed
///
/// ## Rewrite Errors
/// - [`Error::StackImbalance`] - A replacement would change a method's net stack effect
/// - [`Error::WindowOutOfBounds`] - A replacement addressed instructions that do not exist
/// - [`Error::UnresolvedSymbol`] - A trusted reference could not be resolved
/// - [`Error::AmbiguousSignature`] - More than one rule matched a normalized signature
///
/// Rewrite errors are raised by the instruction model and the symbol table, but the
/// handler pipeline never lets them escape: they are converted into diagnostics of the
/// module being processed, so one bad instruction never aborts the rest of the module.
///
/// # Examples
///
/// ```rust
/// use cilshim::{Error, RewriteOptions};
///
/// let mut options = RewriteOptions::default();
/// options.trusted_assemblies.insert("   ".to_string());
///
/// match options.validate() {
///     Err(Error::Configuration { message, .. }) => println!("bad options: {message}"),
///     Err(e) => println!("other error: {e}"),
///     Ok(()) => unreachable!(),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A rewrite would have changed the net stack effect of the replaced window.
    ///
    /// The replacement is never applied; the method is left exactly as it was.
    ///
    /// # Fields
    ///
    /// * `method` - Full name of the method being rewritten
    /// * `offset` - Offset of the first instruction of the replaced window
    /// * `before` - Net stack effect of the original window
    /// * `after` - Net stack effect of the proposed replacement
    #[error("Stack imbalance in {method} at IL_{offset:04x}: window delta {before:+} would become {after:+}")]
    StackImbalance {
        /// The method whose body would have been unbalanced
        method: String,
        /// The offset of the replaced window
        offset: u32,
        /// Net stack effect before the replacement
        before: i32,
        /// Net stack effect after the replacement
        after: i32,
    },

    /// A replacement window does not lie within the method body.
    #[error("Window {start}..{end} is out of bounds for {method} ({len} instructions)")]
    WindowOutOfBounds {
        /// The method whose body was addressed
        method: String,
        /// Start index of the requested window
        start: usize,
        /// End index (exclusive) of the requested window
        end: usize,
        /// Number of instructions in the method
        len: usize,
    },

    /// A reference into a trusted assembly could not be resolved.
    #[error("Unresolved symbol - {0}")]
    UnresolvedSymbol(String),

    /// More than one rule matched a generic-normalized signature.
    ///
    /// The first registered candidate is used; the ambiguity is reported.
    #[error("Ambiguous signature {signature} - {candidates} candidate rules")]
    AmbiguousSignature {
        /// The normalized signature that was looked up
        signature: String,
        /// Number of candidate rules
        candidates: usize,
    },

    /// The rule table, catalog or options are malformed.
    ///
    /// Raised before any module is processed. The error includes the source location
    /// where the problem was detected.
    #[error("Configuration - {file}:{line}: {message}")]
    Configuration {
        /// The message to be printed for the Configuration error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A signature string in canonical IL form could not be parsed.
    #[error("Invalid signature - {0}")]
    Signature(String),

    /// The XML rule document is not well-formed.
    #[error("{0}")]
    Xml(#[from] quick_xml::Error),

    /// An attribute in the XML rule document is malformed.
    #[error("{0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),

    /// I/O error while writing to a caller-provided sink.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true for errors that abort engine construction.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Configuration { .. }
                | Error::Signature(_)
                | Error::Xml(_)
                | Error::XmlAttribute(_)
        )
    }
}
