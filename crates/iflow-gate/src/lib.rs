//! Security gate for agent-issued shell commands.
//!
//! Every shell tool call the agent makes is validated synchronously before
//! execution: command names are checked against a deny-by-default allowlist,
//! sensitive commands run extra validators, and task-type/flag context can
//! forbid whole command classes (tests during coding, mutations during
//! non-code tasks). The gate itself performs no I/O; callers capture the
//! process context once ([`GateContext::from_env`]) and pass it in.

pub mod aux_server;
pub mod constants;
pub mod gate;
pub mod parser;
pub mod profile;
pub mod validators;

pub use gate::{GateContext, GateDecision, ToolUsePayload, gate_tool_use};
pub use profile::SecurityProfile;
