//! Process exit codes.

/// Run completed (rewards are in the report, not the exit code).
pub const SUCCESS: i32 = 0;
/// Run aborted: unreachable server, broken dataset, or cancelled run.
pub const RUN_ABORTED: i32 = 1;
/// Invalid configuration or arguments.
pub const CONFIG_ERROR: i32 = 2;
