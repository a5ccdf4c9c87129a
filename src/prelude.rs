//! # cilshim Prelude
//!
//! The types needed to describe a module, write rules for it and process it.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilshim operations
pub use crate::Error;

/// The result type used throughout cilshim
pub use crate::Result;

// ================================================================================================
// Engine
// ================================================================================================

/// Engine, options and the one-shot entry point
pub use crate::engine::{process, CompatibilityEngine, RewriteOptions};

// ================================================================================================
// Module Model
// ================================================================================================

/// Modules, methods and instructions
pub use crate::model::{
    AssemblyReference, Constant, Instruction, Method, Module, Op, Platform, Version,
};

/// Structural symbol references
pub use crate::model::{FieldRef, MethodRef, SymbolRef, TypeRef};

// ================================================================================================
// Rules
// ================================================================================================

/// Rule sets, the symbol table and the member catalog
pub use crate::symbols::{
    CatalogMethod, CatalogType, MemberCatalog, RuleSet, SymbolTable, SymbolTableBuilder,
};

// ================================================================================================
// Reports
// ================================================================================================

/// Reports and their roll-up
pub use crate::report::{
    Admission, CompatibilityLog, Diagnostic, FindingKind, ModuleReport, Severity,
};
