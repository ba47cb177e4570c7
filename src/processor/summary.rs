//! Serializable summary schema for report data.
//!
//! Reporters that render or persist results consume this instead of the
//! live groups. Schema is versioned to allow future evolution.

use super::report::Report;
use crate::aggregator::QueryGroup;
use crate::utils::config::SCHEMA_VERSION;
use crate::utils::error::TapError;
use serde::{Deserialize, Serialize};

/// Top-level summary of one processed session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Schema version for compatibility checking
    pub version: String,

    /// RFC 3339 timestamp of report generation
    pub generated_at: String,

    /// Seconds from the first query's start to the last query's end
    pub elapsed_secs: f64,

    pub total_queries: usize,

    /// Statistics over every query
    pub all: GroupSummary,

    /// Per-text groups, largest total time first
    pub groups: Vec<GroupSummary>,
}

/// Statistics of one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_word: Option<String>,

    pub count: usize,
    pub total_secs: f64,
    pub mean_secs: f64,
    pub median_secs: f64,

    /// 0 for an empty group
    pub min_secs: f64,
    pub max_secs: f64,
    pub rowcount: i64,
    pub unique_params: usize,
    pub unique_stacks: usize,

    /// `symbol (file:line)` of the most frequent caller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_caller: Option<String>,
}

impl GroupSummary {
    pub fn from_group(group: &QueryGroup) -> Self {
        Self {
            text: group.text().map(str::to_string),
            first_word: group.first_word().map(str::to_string),
            count: group.len(),
            total_secs: group.sum(),
            mean_secs: group.mean(),
            median_secs: group.median(),
            min_secs: if group.is_empty() { 0.0 } else { group.min() },
            max_secs: group.max(),
            rowcount: group.rowcounts(),
            unique_params: group.unique_params(),
            unique_stacks: group.unique_stacks(),
            top_caller: group
                .top_caller()
                .map(|frame| format!("{} ({})", frame.name, frame.location())),
        }
    }
}

impl ReportSummary {
    pub fn from_report(report: &Report) -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            generated_at: report.generated_at().to_rfc3339(),
            elapsed_secs: report.elapsed(),
            total_queries: report.stats().len(),
            all: GroupSummary::from_group(report.all_group()),
            groups: report.query_groups().iter().map(GroupSummary::from_group).collect(),
        }
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String, TapError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, TapError> {
        Ok(serde_json::from_str(json)?)
    }

    /// One-line overview for logging
    pub fn headline(&self) -> String {
        format!(
            "{} queries | {} groups | {:.3}s total | {:.3}s elapsed",
            self.total_queries,
            self.groups.len(),
            self.all.total_secs,
            self.elapsed_secs
        )
    }
}
