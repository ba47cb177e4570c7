//! querytap
//!
//! Query profiling for database execution paths. A profiling session hooks
//! an engine's execution boundary and records every statement it runs: text,
//! timing, bound parameters, call stack and caller-supplied context. The
//! stats processor then groups those records by statement text into latency
//! and volume statistics.
//!
//! ## Getting Started
//!
//! ```ignore
//! use querytap::{ProfilingSession, StatsProcessor};
//!
//! let session = ProfilingSession::new();
//! session.profile(|| run_workload(&conn))?;
//!
//! let report = StatsProcessor::new().process(session.collect()?);
//! for group in report.query_groups() {
//!     println!("{:?}: {:.3}s over {} queries", group.text(), group.sum(), group.len());
//! }
//! ```
//!
//! Rendering the report (HTML, text, files) is left to the caller; see
//! `ReportSummary` for a serializable view.

pub mod aggregator;
pub mod capture;
pub mod processor;
pub mod record;
pub mod utils;

pub use aggregator::{FrameFilter, ParamsIdRegistry, QueryGroup, ReindentFormatter, SqlFormatter};
pub use capture::{
    start, AfterExecute, BeforeExecute, Connection, Engine, ExecutionResult, ProfilingSession,
    ResultSummary, SessionOptions,
};
pub use processor::{Report, ReportSummary, StatsProcessor};
pub use record::{params_hash, Params, QueryStats, StackFrame};
pub use utils::{ConfigurationError, FormatError, StateError, TapError};
