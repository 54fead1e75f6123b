// ABOUTME: Library root for hoist - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod build;
pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
mod local;
pub mod output;
pub mod publish;
pub mod remote;
pub mod ssh;
pub mod startup;
pub mod step;
pub mod types;
