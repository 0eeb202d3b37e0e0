//! Validation of auxiliary server specs accepted from configuration.
//!
//! Users can register auxiliary tool servers (MCP-style) in project config.
//! Those specs come from untrusted files, so the launch command is held to a
//! much tighter standard than interactive shell commands: a fixed safe
//! command set, no paths, and no interpreter flags that evaluate code.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    AUX_SERVER_DANGEROUS_FLAGS, AUX_SERVER_SAFE_COMMANDS, SHELL_INTERPRETERS,
};

/// Launch spec for an auxiliary server, as found in config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuxServerSpec {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Rejection reasons for auxiliary server specs.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuxServerError {
    #[error("Server '{name}': command contains a path separator: {command}")]
    PathInCommand { name: String, command: String },

    #[error("Server '{name}': command '{command}' is not in the safe set")]
    UnsafeCommand { name: String, command: String },

    #[error("Server '{name}': shell interpreters are not allowed: {command}")]
    ShellInterpreter { name: String, command: String },

    #[error("Server '{name}': dangerous argument '{flag}'")]
    DangerousFlag { name: String, flag: String },
}

/// Validate a single auxiliary server spec.
pub fn validate_aux_server(spec: &AuxServerSpec) -> Result<(), AuxServerError> {
    let command = spec.command.trim();

    if command.contains('/') || command.contains('\\') {
        return Err(AuxServerError::PathInCommand {
            name: spec.name.clone(),
            command: command.to_string(),
        });
    }

    if SHELL_INTERPRETERS.contains(&command) {
        return Err(AuxServerError::ShellInterpreter {
            name: spec.name.clone(),
            command: command.to_string(),
        });
    }

    if !AUX_SERVER_SAFE_COMMANDS.contains(&command) {
        return Err(AuxServerError::UnsafeCommand {
            name: spec.name.clone(),
            command: command.to_string(),
        });
    }

    for arg in &spec.args {
        let arg = arg.trim();
        if AUX_SERVER_DANGEROUS_FLAGS.contains(&arg) {
            return Err(AuxServerError::DangerousFlag {
                name: spec.name.clone(),
                flag: arg.to_string(),
            });
        }
    }

    Ok(())
}

/// Validate a collection of specs, returning every rejection.
#[must_use]
pub fn validate_aux_servers(specs: &[AuxServerSpec]) -> Vec<AuxServerError> {
    specs
        .iter()
        .filter_map(|spec| validate_aux_server(spec).err())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(command: &str, args: &[&str]) -> AuxServerSpec {
        AuxServerSpec {
            name: "test-server".to_string(),
            command: command.to_string(),
            args: args.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[test]
    fn test_safe_spec_passes() {
        assert!(validate_aux_server(&spec("npx", &["@scope/server", "--stdio"])).is_ok());
        assert!(validate_aux_server(&spec("uvx", &["some-tool"])).is_ok());
    }

    #[test]
    fn test_path_in_command_rejected() {
        let err = validate_aux_server(&spec("/usr/bin/node", &[])).unwrap_err();
        assert!(matches!(err, AuxServerError::PathInCommand { .. }));
        assert!(matches!(
            validate_aux_server(&spec("..\\node", &[])).unwrap_err(),
            AuxServerError::PathInCommand { .. }
        ));
    }

    #[test]
    fn test_unsafe_command_rejected() {
        let err = validate_aux_server(&spec("ruby", &[])).unwrap_err();
        assert!(matches!(err, AuxServerError::UnsafeCommand { .. }));
    }

    #[test]
    fn test_shell_interpreter_rejected() {
        let err = validate_aux_server(&spec("bash", &[])).unwrap_err();
        assert!(matches!(err, AuxServerError::ShellInterpreter { .. }));
    }

    #[test]
    fn test_dangerous_flags_rejected() {
        for flag in ["-e", "-c", "--eval", "--require", "-r", "--experimental-loader"] {
            let err = validate_aux_server(&spec("node", &["server.js", flag])).unwrap_err();
            assert!(
                matches!(err, AuxServerError::DangerousFlag { .. }),
                "flag {flag} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_many_collects_errors() {
        let specs = vec![
            spec("npx", &["ok"]),
            spec("bash", &[]),
            spec("node", &["-e", "code"]),
        ];
        let errors = validate_aux_servers(&specs);
        assert_eq!(errors.len(), 2);
    }
}
