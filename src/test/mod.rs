//! Shared fixtures for the unit tests.

mod factories;

pub use factories::*;
