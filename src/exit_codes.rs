//! CLI exit code mapping.

use crate::error::IflowError;

/// Numbered exit codes for the auto-iflow CLI.
pub mod codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
    pub const LOCK_HELD: i32 = 9;
    pub const VALIDATION_FAILED: i32 = 20;
    pub const PENDING_REVIEW: i32 = 30;
    pub const CANCELLED: i32 = 75;
}

/// Map a library error to a CLI exit code.
#[must_use]
pub fn exit_code_for(err: &IflowError) -> i32 {
    match err {
        IflowError::Validation { .. } => codes::VALIDATION_FAILED,
        IflowError::Lock(_) => codes::LOCK_HELD,
        IflowError::AuthMissing { .. } => codes::CONFIG_ERROR,
        IflowError::Cancelled { .. } => codes::CANCELLED,
        _ => codes::GENERAL_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_validation_code() {
        let err = IflowError::validation("plan", vec!["bad".into()]);
        assert_eq!(exit_code_for(&err), codes::VALIDATION_FAILED);
    }

    #[test]
    fn test_cancelled_maps_to_cancelled_code() {
        let err = IflowError::Cancelled {
            checkpoint: "review".into(),
        };
        assert_eq!(exit_code_for(&err), codes::CANCELLED);
    }
}
