//! auto-iflow - pipeline and session runtime for an autonomous coding agent
//!
//! This crate drives a development task through the full lifecycle: free-text
//! description, structured intake, scoped contract, coded changes, post-code
//! tests, QA gates, and human review. All state persists as JSON under a
//! per-project data directory so any step can be resumed or inspected; the
//! LLM backend, memory store, tracker, and terminal UI stay behind traits.

/// Returns the auto-iflow version.
#[must_use]
pub fn auto_iflow_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

pub mod artifact;
pub mod cli;
pub mod complexity;
pub mod env_check;
pub mod error;
pub mod exit_codes;
pub mod git;
pub mod index;
pub mod intake;
pub mod integrations;
pub mod orchestrator;
pub mod paths;
pub mod plan_import;
pub mod post_code;
pub mod post_session;
pub mod progress;
pub mod proofs;
pub mod qa;
pub mod recovery;
pub mod registry;
pub mod resolver;
pub mod routing;
pub mod scope;
pub mod session;
pub mod telemetry;
pub mod types;
pub mod workspace;

// Core types and errors used by external consumers
pub use error::{IflowError, Result};
pub use types::*;
