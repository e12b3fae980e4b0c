//! Unit tests for the session module.
//!
//! Split by concern: configuration validation, ssh argument construction,
//! and command execution semantics.

mod run;
mod ssh;
