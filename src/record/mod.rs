//! Captured query records.
//!
//! This module defines what a single observed execution looks like once it
//! leaves the capture hooks:
//! - `QueryStats`: the immutable record itself
//! - `StackFrame`: one frame of the call stack at the query site
//! - Parameter maps and their order-independent fingerprint

pub mod frame;
pub mod params;
pub mod query_stats;

// Re-export main types and functions
pub use frame::{format_stack, StackFrame};
pub use params::{merge_params, params_hash, Params};
pub use query_stats::QueryStats;
