//! Statistics about a single executed query.
//!
//! Applications normally don't build these by hand: they come out of
//! `ProfilingSession::collect` (or a collect callback) and are then handed to
//! `StatsProcessor::process`, possibly after filtering.

use super::frame::{format_stack, StackFrame};
use super::params::{params_hash, Params};
use crate::utils::config::DISPLAY_TEXT_WIDTH;
use chrono::{DateTime, Utc};
use log::warn;
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;

/// Immutable record of one observed execution
///
/// Fields are read-only so `duration` and `params_hash` always agree with
/// the values they were derived from.
///
/// ```compile_fail
/// fn refingerprint(stats: &mut querytap::QueryStats) {
///     stats.params_hash = 0;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct QueryStats {
    /// Normalized statement text
    text: String,

    /// Call stack when the query was issued, outermost frame first
    stack: Vec<StackFrame>,

    /// Wall-clock time when execution started
    start_time: DateTime<Utc>,

    /// Wall-clock time when execution finished
    end_time: DateTime<Utc>,

    /// `end_time - start_time` in seconds, never negative
    duration: f64,

    /// Value returned by the session's user-context function
    user_context: Value,

    /// Merged bound parameters
    params: Params,

    /// Fingerprint of `params`
    params_hash: u32,

    /// Rows reported by the execution result
    rowcount: i64,

    params_id: OnceLock<u64>,
    stack_text: OnceLock<String>,
}

impl QueryStats {
    /// Build a record, deriving `duration` and `params_hash`
    ///
    /// **Public** - constructor used by the capture hook
    ///
    /// A clock that went backwards yields a zero duration rather than a
    /// negative one.
    pub fn new(
        text: impl Into<String>,
        stack: Vec<StackFrame>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        user_context: Value,
        params: Params,
        rowcount: i64,
    ) -> Self {
        let duration = match (end_time - start_time).to_std() {
            Ok(elapsed) => elapsed.as_secs_f64(),
            Err(_) => {
                warn!(
                    "Query ended before it started ({} < {}), using zero duration",
                    end_time, start_time
                );
                0.0
            }
        };
        let params_hash = params_hash(&params);

        Self {
            text: text.into(),
            stack,
            start_time,
            end_time,
            duration,
            user_context,
            params,
            params_hash,
            rowcount,
            params_id: OnceLock::new(),
            stack_text: OnceLock::new(),
        }
    }

    /// Normalized statement text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Call stack when the query was issued, outermost frame first
    pub fn stack(&self) -> &[StackFrame] {
        &self.stack
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    /// `end_time - start_time` in seconds, never negative
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn user_context(&self) -> &Value {
        &self.user_context
    }

    /// Merged bound parameters
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Fingerprint of `params`
    pub fn params_hash(&self) -> u32 {
        self.params_hash
    }

    pub fn rowcount(&self) -> i64 {
        self.rowcount
    }

    /// Display id of this record's parameter set, once a group assigned one
    pub fn params_id(&self) -> Option<u64> {
        self.params_id.get().copied()
    }

    /// Set the display id unless one is already set; returns the id in effect
    pub(crate) fn assign_params_id(&self, id: u64) -> u64 {
        *self.params_id.get_or_init(|| id)
    }

    /// Formatted stack text, computed on first use and cached
    pub fn stack_text(&self) -> &str {
        self.stack_text.get_or_init(|| format_stack(&self.stack))
    }
}

impl fmt::Display for QueryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text: String = self.text.chars().take(DISPLAY_TEXT_WIDTH).collect();
        write!(
            f,
            "QueryStats(text='{}...' params={} duration={:.3} rowcount={} params_hash={:08x})",
            text,
            serde_json::to_string(&self.params).unwrap_or_default(),
            self.duration,
            self.rowcount,
            self.params_hash
        )
    }
}
