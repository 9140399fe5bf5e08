//! Process exit codes. Part of the CLI contract.

pub const SUCCESS: i32 = 0;
pub const INPUT_ERROR: i32 = 1; // Unreadable or malformed input rows, bad arguments
pub const CONFIG_ERROR: i32 = 2; // Chain config invalid or a link could not be constructed
pub const LINK_FAILED: i32 = 3; // A link failed mid-cascade; batch marked failed
pub const STORE_ERROR: i32 = 4; // Result store unavailable
