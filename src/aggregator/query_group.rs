//! Running statistics over queries sharing one normalized text.
//!
//! A `QueryGroup` starts empty and freezes its display header from the first
//! query added. Every `add` updates the running max/min/sum/mean and the
//! per-stack, per-caller and per-parameter-set breakdowns. The median is
//! only computed by the explicit `calc_median` finalization step.

use super::format::{format_sql, ReindentFormatter, SqlFormatter};
use super::frames::FrameFilter;
use super::params_id::ParamsIdRegistry;
use crate::record::{Params, QueryStats, StackFrame};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Collaborators shared by every group of one processing run
#[derive(Clone)]
pub struct AggregationContext {
    pub params_ids: Arc<ParamsIdRegistry>,
    pub frame_filter: FrameFilter,
    pub formatter: Arc<dyn SqlFormatter>,
}

impl Default for AggregationContext {
    fn default() -> Self {
        Self {
            params_ids: Arc::new(ParamsIdRegistry::new()),
            frame_filter: FrameFilter::default(),
            formatter: Arc::new(ReindentFormatter),
        }
    }
}

impl fmt::Debug for AggregationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregationContext")
            .field("params_ids", &self.params_ids)
            .field("frame_filter", &self.frame_filter)
            .finish_non_exhaustive()
    }
}

/// Display fields frozen from a group's first query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupHeader {
    pub text: String,

    /// Pretty-printed text, or `text` verbatim if formatting failed
    pub formatted_text: String,

    /// First whitespace-delimited token, e.g. the statement verb
    pub first_word: String,
}

impl GroupHeader {
    fn from_text(text: &str, formatter: &dyn SqlFormatter) -> Self {
        Self {
            text: text.to_string(),
            formatted_text: format_sql(formatter, text),
            first_word: text.split_whitespace().next().unwrap_or_default().to_string(),
        }
    }
}

/// Occurrences of one distinct parameter set within a group
#[derive(Debug, Clone, PartialEq)]
pub struct ParamsBucket {
    pub count: usize,

    /// Display id shared with every other group of the run
    pub params_id: u64,

    /// Parameters of the first query seen with this fingerprint
    pub params: Params,
}

/// Profiling statistics over a set of similar queries
pub struct QueryGroup {
    context: AggregationContext,
    header: Option<GroupHeader>,
    queries: Vec<Arc<QueryStats>>,
    stacks: HashMap<String, usize>,
    callers: HashMap<String, Option<StackFrame>>,
    params_hashes: HashMap<u32, ParamsBucket>,
    max: f64,
    min: f64,
    sum: f64,
    mean: f64,
    rowcounts: i64,
    median: f64,
}

impl QueryGroup {
    pub fn new(context: AggregationContext) -> Self {
        Self {
            context,
            header: None,
            queries: Vec::new(),
            stacks: HashMap::new(),
            callers: HashMap::new(),
            params_hashes: HashMap::new(),
            max: 0.0,
            min: f64::INFINITY,
            sum: 0.0,
            mean: 0.0,
            rowcounts: 0,
            median: 0.0,
        }
    }

    /// Add one query to the group
    ///
    /// **Public** - main entry point for aggregation
    ///
    /// The query's `params_id` is set to this group's bucket id unless an
    /// earlier group already set it.
    pub fn add(&mut self, query: Arc<QueryStats>) {
        if self.header.is_none() {
            let formatter = self.context.formatter.as_ref();
            self.header = Some(GroupHeader::from_text(query.text(), formatter));
        }
        self.queries.push(Arc::clone(&query));

        let stack_text = query.stack_text();
        *self.stacks.entry(stack_text.to_string()).or_insert(0) += 1;
        self.callers.insert(
            stack_text.to_string(),
            self.context.frame_filter.find_user_frame(query.stack()).cloned(),
        );

        let registry = &self.context.params_ids;
        let bucket = self
            .params_hashes
            .entry(query.params_hash())
            .or_insert_with(|| ParamsBucket {
                count: 0,
                params_id: registry.id_for(query.params_hash()),
                params: query.params().clone(),
            });
        bucket.count += 1;
        query.assign_params_id(bucket.params_id);

        self.max = self.max.max(query.duration());
        self.min = self.min.min(query.duration());
        self.sum += query.duration();
        self.mean = self.sum / self.queries.len() as f64;
        self.rowcounts += query.rowcount();
    }

    /// Compute the median duration
    ///
    /// **Public** - finalization step, call once after all queries are added
    ///
    /// Durations are sorted in descending order. For an even count the
    /// median averages positions `n / 2` and `n / 2 - 1` of that ordering.
    /// An empty group keeps a median of 0.
    pub fn calc_median(&mut self) {
        let mut durations: Vec<f64> = self.queries.iter().map(|q| q.duration()).collect();
        durations.sort_by(|a, b| b.total_cmp(a));

        let length = durations.len();
        if length == 0 {
            return;
        }

        self.median = if length % 2 == 0 {
            let x1 = durations[length / 2];
            let x2 = durations[length / 2 - 1];
            (x1 + x2) / 2.0
        } else {
            durations[length / 2]
        };
    }

    pub fn header(&self) -> Option<&GroupHeader> {
        self.header.as_ref()
    }

    pub fn text(&self) -> Option<&str> {
        self.header.as_ref().map(|h| h.text.as_str())
    }

    pub fn formatted_text(&self) -> Option<&str> {
        self.header.as_ref().map(|h| h.formatted_text.as_str())
    }

    pub fn first_word(&self) -> Option<&str> {
        self.header.as_ref().map(|h| h.first_word.as_str())
    }

    /// Member queries in insertion order
    pub fn queries(&self) -> &[Arc<QueryStats>] {
        &self.queries
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Formatted stack text -> number of queries issued from it
    pub fn stacks(&self) -> &HashMap<String, usize> {
        &self.stacks
    }

    /// Formatted stack text -> attributed application frame
    pub fn callers(&self) -> &HashMap<String, Option<StackFrame>> {
        &self.callers
    }

    /// Parameter fingerprint -> bucket
    pub fn params_hashes(&self) -> &HashMap<u32, ParamsBucket> {
        &self.params_hashes
    }

    pub fn unique_params(&self) -> usize {
        self.params_hashes.len()
    }

    pub fn unique_stacks(&self) -> usize {
        self.stacks.len()
    }

    /// Caller of the most frequent stack (ties go to the smallest stack text)
    pub fn top_caller(&self) -> Option<&StackFrame> {
        let (stack_text, _) = self
            .stacks
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))?;
        self.callers.get(stack_text)?.as_ref()
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Smallest duration; `f64::INFINITY` while the group is empty
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Total time spent in the group's queries
    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// 0 until `calc_median` runs
    pub fn median(&self) -> f64 {
        self.median
    }

    /// Total rows reported by the group's queries
    pub fn rowcounts(&self) -> i64 {
        self.rowcounts
    }
}

impl Default for QueryGroup {
    fn default() -> Self {
        Self::new(AggregationContext::default())
    }
}

impl fmt::Debug for QueryGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryGroup")
            .field("text", &self.text())
            .field("count", &self.len())
            .field("sum", &self.sum)
            .field("mean", &self.mean)
            .field("median", &self.median)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("rowcounts", &self.rowcounts)
            .finish()
    }
}
