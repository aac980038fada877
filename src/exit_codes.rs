//! Exit codes for the lockwatch CLI.

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// Invalid arguments or invalid state (including unparseable listing output).
pub const USER_ERROR: i32 = 1;

/// Repository metadata could not be read.
pub const REPO_FAILURE: i32 = 2;

/// The LFS process failed to start, timed out, or reported errors.
pub const LFS_FAILURE: i32 = 3;

/// Settings could not be loaded or persisted.
pub const SETTINGS_FAILURE: i32 = 4;
