//! Symbol rules: what an old reference should become, and what the host still declares.
//!
//! # Architecture
//!
//! The module is split the same way the data flows at startup:
//!
//! - [`signature`] parses canonical IL names used as rule keys
//! - [`catalog`] holds the pre-extracted member tables of the trusted assemblies
//! - [`table`] turns an ordered list of registrations into a validated, read-only
//!   lookup structure
//! - [`rules`] bundles everything for one host release and loads it from XML
//!
//! # Key Components
//!
//! - [`SymbolTableBuilder`] / [`SymbolTable`] - Type, field, method, facade and detection rules
//! - [`MemberCatalog`] - Static replacement for reflecting over live host types
//! - [`RuleSet`] - Versioned declarative input of the engine
//!
//! # Thread Safety
//!
//! [`SymbolTable`] and [`MemberCatalog`] are immutable after construction and are shared
//! by reference between all module pipelines.

pub mod catalog;
pub mod rules;
pub mod signature;
pub mod table;

pub use catalog::{CatalogField, CatalogMethod, CatalogParameter, CatalogType, MemberCatalog, MemberFlags};
pub use rules::{AssetRules, FinderRule, FinderTarget, PatchLibraryRules, PlatformRule, RuleSet};
pub use signature::{canonicalize, parse_signature, parse_type, parse_type_list};
pub use table::{Resolution, RuleKind, SymbolTable, SymbolTableBuilder, FACADE_CONSTRUCTOR};
