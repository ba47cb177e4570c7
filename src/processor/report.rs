//! Build the grouped-statistics view over a captured session.

use super::summary::ReportSummary;
use crate::aggregator::{
    AggregationContext, FrameFilter, ParamsIdRegistry, QueryGroup, SqlFormatter,
};
use crate::record::QueryStats;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Groups a captured query sequence into per-text statistics
///
/// The processor owns the display-id registry used by every group it
/// creates, across all of its `process` calls. Two processors only share ids
/// when built with the same registry via `with_params_ids`.
#[derive(Debug, Clone, Default)]
pub struct StatsProcessor {
    context: AggregationContext,
}

impl StatsProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an existing display-id registry
    pub fn with_params_ids(mut self, registry: Arc<ParamsIdRegistry>) -> Self {
        self.context.params_ids = registry;
        self
    }

    /// Replace the library-frame predicate used for call-site attribution
    pub fn with_frame_filter(mut self, filter: FrameFilter) -> Self {
        self.context.frame_filter = filter;
        self
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn SqlFormatter>) -> Self {
        self.context.formatter = formatter;
        self
    }

    pub fn params_ids(&self) -> &Arc<ParamsIdRegistry> {
        &self.context.params_ids
    }

    /// Process a full captured sequence
    ///
    /// **Public** - main entry point for statistics
    ///
    /// # Arguments
    /// * `stats` - Captured queries ordered by start time
    ///
    /// # Returns
    /// Report with per-text groups sorted by total time (descending), the
    /// all-inclusive group and the elapsed session time. Every group is
    /// finalized.
    ///
    /// Out-of-order input still produces groups, only the elapsed figure
    /// becomes meaningless.
    pub fn process(&self, stats: impl IntoIterator<Item = QueryStats>) -> Report {
        let started = Instant::now();
        let stats: Vec<Arc<QueryStats>> = stats.into_iter().map(Arc::new).collect();

        let elapsed = match (stats.first(), stats.last()) {
            (Some(first), Some(last)) => seconds_between(first.start_time(), last.end_time()),
            _ => 0.0,
        };

        debug!("Processing {} queries spanning {:.3}s", stats.len(), elapsed);

        // Group in order of first appearance
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut query_groups: Vec<QueryGroup> = Vec::new();
        let mut all_group = QueryGroup::new(self.context.clone());

        for query in &stats {
            query.stack_text();

            let slot = *index.entry(query.text()).or_insert_with(|| {
                query_groups.push(QueryGroup::new(self.context.clone()));
                query_groups.len() - 1
            });
            query_groups[slot].add(Arc::clone(query));
            all_group.add(Arc::clone(query));
        }

        query_groups.sort_by(|a, b| b.sum().total_cmp(&a.sum()));

        for group in &mut query_groups {
            group.calc_median();
        }
        all_group.calc_median();

        info!(
            "Grouped {} queries into {} groups in {:.2}ms",
            stats.len(),
            query_groups.len(),
            started.elapsed().as_secs_f64() * 1000.0
        );

        Report {
            stats,
            query_groups,
            all_group,
            elapsed,
            generated_at: Utc::now(),
        }
    }
}

/// Signed seconds from `start` to `end`
fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let delta = end - start;
    match delta.num_nanoseconds() {
        Some(nanos) => nanos as f64 / 1e9,
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}

/// Finalized statistics handed to a reporter, read-only
#[derive(Debug)]
pub struct Report {
    stats: Vec<Arc<QueryStats>>,
    query_groups: Vec<QueryGroup>,
    all_group: QueryGroup,
    elapsed: f64,
    generated_at: DateTime<Utc>,
}

impl Report {
    /// Every processed query, in input order
    pub fn stats(&self) -> &[Arc<QueryStats>] {
        &self.stats
    }

    /// Per-text groups, largest total time first
    pub fn query_groups(&self) -> &[QueryGroup] {
        &self.query_groups
    }

    /// Group containing every query
    pub fn all_group(&self) -> &QueryGroup {
        &self.all_group
    }

    /// Seconds from the first query's start to the last query's end
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// Serializable snapshot for external reporters
    pub fn summary(&self) -> ReportSummary {
        ReportSummary::from_report(self)
    }
}
