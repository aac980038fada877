//! Error types for lockwatch.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.
//!
//! Process-level failures (spawn errors, timeouts, stderr output) are normally
//! captured into a [`ProcessResult`](crate::process::ProcessResult) and handled
//! by the scheduler's continuation logic rather than raised through this enum;
//! these variants exist for the places where a failure must reach a caller
//! directly (CLI commands, repository introspection, settings persistence).

use crate::exit_codes;
use thiserror::Error;

/// Main error type for lockwatch operations.
///
/// Each variant maps to a specific exit code for the CLI front end.
#[derive(Error, Debug)]
pub enum LockwatchError {
    /// User provided invalid arguments or the system is in an invalid state.
    #[error("{0}")]
    User(String),

    /// The external LFS executable is missing or could not be started.
    #[error("failed to start LFS process: {0}")]
    Spawn(String),

    /// An external process exceeded its timeout.
    #[error("LFS process timed out: {0}")]
    Timeout(String),

    /// A listing line did not match either accepted shape.
    #[error("unrecognized lock listing line: {0:?}")]
    Parse(String),

    /// The external process reported errors on stderr.
    #[error("LFS command failed: {0}")]
    Protocol(String),

    /// Repository metadata could not be read.
    #[error("repository error: {0}")]
    Repo(String),

    /// Settings could not be loaded or persisted.
    #[error("settings error: {0}")]
    Settings(String),
}

impl LockwatchError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LockwatchError::User(_) => exit_codes::USER_ERROR,
            LockwatchError::Parse(_) => exit_codes::USER_ERROR,
            LockwatchError::Spawn(_)
            | LockwatchError::Timeout(_)
            | LockwatchError::Protocol(_) => exit_codes::LFS_FAILURE,
            LockwatchError::Repo(_) => exit_codes::REPO_FAILURE,
            LockwatchError::Settings(_) => exit_codes::SETTINGS_FAILURE,
        }
    }
}

/// Result type alias for lockwatch operations.
pub type Result<T> = std::result::Result<T, LockwatchError>;
