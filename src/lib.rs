// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # cilshim
//!
//! Instruction-level compatibility rewriting for CIL extension modules that were
//! compiled against an older release of their host's object model.
//!
//! A host application that loads third-party modules cannot keep its public API frozen
//! forever. `cilshim` sits between the module loader and the runtime: it walks every
//! instruction of every method of a loaded module, redirects references to members that
//! moved or were renamed, and reports references it cannot fix, so the loader can decide
//! whether to admit the module.
//!
//! ## Features
//!
//! - **🔁 Declarative symbol rules** - Type, field, method and facade rules, loaded per host
//!   release from data (code or XML), with a fixed precedence
//! - **⚖️ Stack-balanced rewriting** - Every edit keeps the net stack effect of the replaced
//!   window, or is refused atomically
//! - **🔍 Catalog-driven detectors** - Missing members and changed member types in trusted
//!   assemblies are found without a live type system
//! - **🧩 Closed handler table** - Platform, patch library, finder and content-load handlers
//!   run in one ordered linear pass
//! - **⚡ Parallel processing** - Independent modules are processed concurrently against one
//!   immutable engine
//!
//! ## Quick Start
//!
//! ```rust
//! use cilshim::prelude::*;
//!
//! let mut rules = RuleSet::new("1.6.0");
//! rules
//!     .symbols
//!     .register_method("System.Void OldType::Foo()", TypeRef::new("Host", "NewType"), "Bar");
//!
//! let foo = MethodRef::new_static(TypeRef::new("Host", "OldType"), "Foo", TypeRef::void(), vec![]);
//! let mut module = Module::new("SampleMod", Version::new(1, 0)).with_method(Method::new(
//!     "System.Void SampleMod.ModEntry::Entry()",
//!     vec![Instruction::call(0, foo), Instruction::ret(5, false)],
//! ));
//!
//! let report = cilshim::process(&mut module, &rules, &RewriteOptions::default())?;
//! assert_eq!(report.rewritten_count, 1);
//! assert_eq!(report.admission(), Admission::Admit);
//! # Ok::<(), cilshim::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`model`] - Modules, methods, instructions and structural symbol references
//! - [`symbols`] - Signature parsing, the member catalog, the symbol table and rule sets
//! - [`rewriter`] - The handler table and the pass that drives it
//! - [`report`] - Diagnostics, module reports and the cross-module log
//! - [`engine`] - Options and the engine that ties everything together
//! - [`prelude`] - Convenient re-exports of commonly used types
//!
//! ## Error Handling
//!
//! Only configuration can fail: building an engine from malformed rules or options
//! returns an [`Error`]. Processing a module never does; every problem with a single
//! instruction becomes a diagnostic in that module's [`ModuleReport`]:
//!
//! ```rust
//! use cilshim::{symbols::RuleSet, CompatibilityEngine, Error, RewriteOptions};
//!
//! let mut rules = RuleSet::default();
//! rules.symbols.register_method("not a signature", cilshim::model::TypeRef::new("Host", "T"), "M");
//!
//! match CompatibilityEngine::new(rules, RewriteOptions::default()) {
//!     Err(Error::Signature(message)) => println!("bad rule: {message}"),
//!     Err(e) => println!("other configuration error: {e}"),
//!     Ok(_) => unreachable!(),
//! }
//! ```

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust
/// use cilshim::prelude::*;
///
/// let options = RewriteOptions::paranoid();
/// let engine = CompatibilityEngine::new(RuleSet::default(), options)?;
/// assert!(!engine.pipeline().is_empty());
/// # Ok::<(), cilshim::Error>(())
/// ```
pub mod prelude;

/// The binary-module model the engine operates on.
///
/// Modules are supplied by an external loader already decoded into methods and
/// instructions. Each instruction carries its original offset, a tagged operation and,
/// for calls, field accesses and type-operand instructions, a structural reference to
/// the symbol it uses.
pub mod model;

/// Symbol rules, the member catalog of trusted assemblies and declarative rule sets.
pub mod symbols;

/// The handler pipeline that rewrites and inspects instructions.
pub mod rewriter;

/// Diagnostics, per-module reports and the cross-module compatibility log.
pub mod report;

/// Engine construction and module processing.
pub mod engine;

/// `cilshim` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `cilshim` Error type
///
/// See [`error::Error`](crate::Error) for the taxonomy.
pub use error::Error;

/// Engine entry points.
pub use engine::{process, CompatibilityEngine, RewriteOptions};

/// The outcome of processing one module.
pub use report::{Admission, ModuleReport, Severity};

/// The declarative input for one host release.
pub use symbols::RuleSet;
