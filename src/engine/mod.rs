//! Engine entry points: options, handler table assembly and module processing.
//!
//! # Key Components
//!
//! - [`RewriteOptions`] - Which handler families run, and what is trusted
//! - [`CompatibilityEngine`] - Built once per host release, processes any number of modules
//! - [`process`] - One-shot processing of a single module
//!
//! # Concurrency
//!
//! Modules are independent: [`CompatibilityEngine::process_all`] runs them on the rayon
//! thread pool, sharing the read-only engine and recording into one
//! [`crate::report::CompatibilityLog`]. A failure inside one module is part of that
//! module's report and never affects the others.

mod compatibility;
mod config;

pub use compatibility::{process, CompatibilityEngine};
pub use config::{RewriteOptions, DEFAULT_TRUSTED_ASSEMBLIES};
