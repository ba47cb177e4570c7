//! Processing of a captured session into grouped statistics.
//!
//! `StatsProcessor` groups queries by text, feeds the all-inclusive group,
//! sorts and finalizes; `ReportSummary` is the serializable view of the
//! result for external reporters.

pub mod report;
pub mod summary;

pub use report::{Report, StatsProcessor};
pub use summary::{GroupSummary, ReportSummary};
