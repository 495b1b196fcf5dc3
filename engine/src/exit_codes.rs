//! Stable exit codes for engine subcommands.

/// Command succeeded (including "drain already in flight" and "inbox empty").
pub const OK: i32 = 0;
/// Invalid config, failed setup, or any other unexpected error.
pub const INVALID: i32 = 1;
/// Workspace history diverged from upstream; manual recovery required.
pub const DIVERGED: i32 = 2;
