//! Configuration and constants shared across the crate.

/// Odd multiplier folded into every parameter value hash
pub const PARAMS_HASH_MULTIPLIER: u64 = 10_009;

/// Mask keeping the low 32 bits of a folded fingerprint
pub const PARAMS_HASH_MASK: u64 = (1 << 32) - 1;

/// Substring identifying frames that belong to the instrumented library
/// rather than application code
pub const DEFAULT_LIBRARY_PATTERN: &str = "querytap";

/// First display id handed out by a fresh registry
pub const FIRST_PARAMS_ID: u64 = 1;

/// Current report summary schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Number of characters of query text shown in record `Display` output
pub const DISPLAY_TEXT_WIDTH: usize = 40;
