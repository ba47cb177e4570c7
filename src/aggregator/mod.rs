//! Aggregation of captured queries into statistical groups.
//!
//! This module transforms captured `QueryStats` into:
//! - Per-text groups with running latency statistics and a median
//! - Call-site attribution for every distinct stack
//! - Stable display ids for distinct parameter sets

pub mod format;
pub mod frames;
pub mod params_id;
pub mod query_group;

// Re-export main types and functions
pub use format::{format_sql, ReindentFormatter, SqlFormatter};
pub use frames::FrameFilter;
pub use params_id::ParamsIdRegistry;
pub use query_group::{AggregationContext, GroupHeader, ParamsBucket, QueryGroup};
