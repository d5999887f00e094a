//! Stable exit codes for `lifecycle` commands.

/// Command completed (for `run`: every stage passed).
pub const OK: i32 = 0;
/// A pipeline stage, reset, or cleanup failed.
pub const FAILURE: i32 = 1;
/// Invalid configuration, missing credential, or missing repository URL.
pub const INVALID: i32 = 2;
