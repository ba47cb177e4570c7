//! Profiling sessions: capture of query executions into `QueryStats`.
//!
//! A session hooks the execution boundary of one engine, or of every engine
//! in the process, and turns each observed execution into a record. Records
//! go either to an internal unbounded queue drained with
//! `ProfilingSession::collect`, or straight to a caller-supplied callback.
//!
//! Several sessions may be active at once on the same or different engines;
//! queries on an engine are then recorded by every session listening to it.
//! A session can be started, stopped and restarted as often as needed.
//!
//! Example usage:
//!
//! ```ignore
//! let session = ProfilingSession::new();
//! let rows = session.profile(|| load_orders(&conn))?;
//! let stats = session.collect()?;
//! ```

use super::events::{
    global_listeners, AfterExecute, BeforeExecute, Connection, ConnectionId, Engine,
    ExecutionListener, ListenerId, ListenerRegistry,
};
use super::stack::capture_stack;
use crate::record::{merge_params, QueryStats, StackFrame};
use crate::utils::error::{ConfigurationError, StateError};
use chrono::{DateTime, Utc};
use crossbeam::queue::SegQueue;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Computes the value stored as `QueryStats::user_context`
///
/// Receives the full post-execution event: connection, statement,
/// multiparams, params and results.
pub type UserContextFn = Arc<dyn Fn(&AfterExecute<'_>) -> Value + Send + Sync>;

/// Receives each record as soon as it is captured
pub type CollectFn = Arc<dyn Fn(QueryStats) + Send + Sync>;

/// Session configuration
#[derive(Clone, Default)]
pub struct SessionOptions {
    /// Engine to profile; `None` profiles every engine in the process
    pub engine: Option<Arc<Engine>>,

    pub user_context_fn: Option<UserContextFn>,

    /// Replaces the internal queue when set
    pub collect_fn: Option<CollectFn>,
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(mut self, engine: Arc<Engine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_user_context_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&AfterExecute<'_>) -> Value + Send + Sync + 'static,
    {
        self.user_context_fn = Some(Arc::new(f));
        self
    }

    pub fn with_collect_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(QueryStats) + Send + Sync + 'static,
    {
        self.collect_fn = Some(Arc::new(f));
        self
    }
}

/// Where captured records go
enum Sink {
    Queue(Arc<SegQueue<QueryStats>>),
    Callback(CollectFn),
}

/// The hook pair registered on the execution boundary
struct SessionListener {
    user_context_fn: Option<UserContextFn>,
    sink: Sink,
    start_times: Mutex<HashMap<ConnectionId, DateTime<Utc>>>,
}

impl SessionListener {
    /// Build and deliver the record for one finished execution
    fn record(&self, event: &AfterExecute<'_>, end_time: DateTime<Utc>, stack: Vec<StackFrame>) {
        // No recorded start (session started mid-query) collapses to zero duration
        let start_time = self
            .start_times
            .lock()
            .remove(&event.connection.id())
            .unwrap_or(end_time);

        let user_context = self.user_context(event);
        let params = merge_params(event.results.compiled_parameters());

        let stats = QueryStats::new(
            event.statement,
            stack,
            start_time,
            end_time,
            user_context,
            params,
            event.results.rowcount(),
        );

        match &self.sink {
            Sink::Queue(queue) => queue.push(stats),
            Sink::Callback(collect_fn) => collect_fn(stats),
        }
    }

    fn user_context(&self, event: &AfterExecute<'_>) -> Value {
        let Some(context_fn) = &self.user_context_fn else {
            return Value::Null;
        };

        panic::catch_unwind(AssertUnwindSafe(|| context_fn(event))).unwrap_or_else(|_| {
            warn!("User context function panicked on {}, storing null", event.connection.id());
            Value::Null
        })
    }
}

impl ExecutionListener for SessionListener {
    fn before_execute(&self, event: &BeforeExecute<'_>) {
        self.start_times.lock().insert(event.connection.id(), Utc::now());
    }

    fn after_execute(&self, event: &AfterExecute<'_>) {
        let end_time = Utc::now();
        let stack = panic::catch_unwind(capture_stack).unwrap_or_else(|_| {
            warn!("Stack capture failed on {}, recording an empty stack", event.connection.id());
            Vec::new()
        });

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.record(event, end_time, stack)));
        if outcome.is_err() {
            warn!("Capture hook failed on {}, query record dropped", event.connection.id());
        }
    }

    fn execute_failed(&self, connection: &Connection) {
        self.start_times.lock().remove(&connection.id());
    }
}

/// Captures queries run on an engine and metadata about them
pub struct ProfilingSession {
    engine: Option<Arc<Engine>>,
    listener: Arc<SessionListener>,
    collector: Option<Arc<SegQueue<QueryStats>>>,
    registration: Mutex<Option<ListenerId>>,
}

impl ProfilingSession {
    /// Session over every engine, collecting into the internal queue
    pub fn new() -> Self {
        Self::with_options(SessionOptions::default())
    }

    pub fn with_options(options: SessionOptions) -> Self {
        let (sink, collector) = match options.collect_fn {
            // the caller does their own collecting
            Some(collect_fn) => (Sink::Callback(collect_fn), None),
            None => {
                let queue = Arc::new(SegQueue::new());
                (Sink::Queue(Arc::clone(&queue)), Some(queue))
            }
        };

        Self {
            engine: options.engine,
            listener: Arc::new(SessionListener {
                user_context_fn: options.user_context_fn,
                sink,
                start_times: Mutex::new(HashMap::new()),
            }),
            collector,
            registration: Mutex::new(None),
        }
    }

    /// Start profiling
    ///
    /// # Errors
    /// * `StateError::AlreadyStarted` - the session is already running
    pub fn start(&self) -> Result<(), StateError> {
        let mut registration = self.registration.lock();
        if registration.is_some() {
            return Err(StateError::AlreadyStarted);
        }

        let listener: Arc<dyn ExecutionListener> = self.listener.clone();
        *registration = Some(self.registry().register(listener));

        info!("Profiling session started on {}", self.target_name());
        Ok(())
    }

    /// Stop profiling
    ///
    /// # Errors
    /// * `StateError::AlreadyStopped` - the session is not running
    pub fn stop(&self) -> Result<(), StateError> {
        let id = self.registration.lock().take().ok_or(StateError::AlreadyStopped)?;
        self.registry().remove(id);
        // Executions still in flight will not report back to this session
        self.listener.start_times.lock().clear();

        info!("Profiling session stopped on {}", self.target_name());
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.registration.lock().is_some()
    }

    /// Drain every record captured since the previous call
    ///
    /// Never blocks: returns whatever is queued right now, possibly nothing.
    ///
    /// # Errors
    /// * `ConfigurationError::CollectorDisabled` - a collect callback was configured
    pub fn collect(&self) -> Result<Vec<QueryStats>, ConfigurationError> {
        let queue = self.collector.as_ref().ok_or(ConfigurationError::CollectorDisabled)?;

        let mut queries = Vec::with_capacity(queue.len());
        while let Some(stats) = queue.pop() {
            queries.push(stats);
        }

        debug!("Collected {} queries", queries.len());
        Ok(queries)
    }

    /// Records waiting in the internal queue (0 with a collect callback)
    pub fn pending(&self) -> usize {
        self.collector.as_ref().map_or(0, |queue| queue.len())
    }

    /// Start now and stop when the returned guard is dropped
    ///
    /// The guard also stops the session while unwinding from a panic.
    pub fn scoped(&self) -> Result<SessionGuard<'_>, StateError> {
        self.start()?;
        Ok(SessionGuard { session: self })
    }

    /// Profile exactly the queries issued while `f` runs
    pub fn profile<R>(&self, f: impl FnOnce() -> R) -> Result<R, StateError> {
        let _guard = self.scoped()?;
        Ok(f())
    }

    fn registry(&self) -> &ListenerRegistry {
        match &self.engine {
            Some(engine) => engine.listeners(),
            None => global_listeners(),
        }
    }

    fn target_name(&self) -> &str {
        self.engine.as_deref().map_or("all engines", Engine::name)
    }
}

impl Default for ProfilingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProfilingSession {
    fn drop(&mut self) {
        if let Some(id) = self.registration.get_mut().take() {
            self.registry().remove(id);
            debug!("Profiling session dropped while started, listener removed");
        }
    }
}

impl fmt::Debug for ProfilingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfilingSession")
            .field("target", &self.target_name())
            .field("started", &self.is_started())
            .field("collecting", &self.collector.is_some())
            .finish()
    }
}

/// Keeps a session started for its lifetime
#[must_use = "the session stops as soon as the guard is dropped"]
pub struct SessionGuard<'a> {
    session: &'a ProfilingSession,
}

impl SessionGuard<'_> {
    pub fn session(&self) -> &ProfilingSession {
        self.session
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.session.stop() {
            warn!("Scoped profiling session already stopped: {}", e);
        }
    }
}

/// Create a session and start it
///
/// **Public** - convenience for the common case
pub fn start(options: SessionOptions) -> Result<ProfilingSession, StateError> {
    let session = ProfilingSession::with_options(options);
    session.start()?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::events::ResultSummary;
    use crate::record::Params;
    use serde_json::json;

    #[test]
    fn test_missing_start_time_gives_zero_duration() {
        let engine = Engine::new("session-unit");
        let session =
            ProfilingSession::with_options(SessionOptions::new().with_engine(engine.clone()));
        let conn = engine.connect();
        let results = ResultSummary::new(4);

        // Fire only the post-execution hook
        session.listener.after_execute(&AfterExecute {
            connection: &conn,
            statement: "SELECT 1",
            multiparams: &[],
            params: &Params::new(),
            results: &results,
        });

        let stats = session.collect().unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].duration(), 0.0);
        assert_eq!(stats[0].start_time(), stats[0].end_time());
        assert_eq!(stats[0].rowcount(), 4);
        assert!(stats[0].params().is_empty());
    }

    #[test]
    fn test_panicking_context_fn_stores_null() {
        let engine = Engine::new("session-panic");
        let session = ProfilingSession::with_options(
            SessionOptions::new()
                .with_engine(engine.clone())
                .with_user_context_fn(|_| panic!("context lookup failed")),
        );
        session.start().unwrap();

        let result = engine
            .connect()
            .execute("SELECT 2", &[], &Params::new(), || ResultSummary::new(1));

        assert_eq!(result.rowcount, 1);
        let stats = session.collect().unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(*stats[0].user_context(), Value::Null);
    }

    #[test]
    fn test_panicking_collect_fn_does_not_escape() {
        let engine = Engine::new("session-collect-panic");
        let session = ProfilingSession::with_options(
            SessionOptions::new()
                .with_engine(engine.clone())
                .with_collect_fn(|_| panic!("sink unavailable")),
        );
        session.start().unwrap();

        let result = engine
            .connect()
            .execute("SELECT 3", &[], &Params::new(), || ResultSummary::new(7));
        assert_eq!(result.rowcount, 7);
    }

    #[test]
    fn test_parameters_merged_from_results() {
        let engine = Engine::new("session-params");
        let session = start(SessionOptions::new().with_engine(engine.clone())).unwrap();

        let mut first = Params::new();
        first.insert("a".to_string(), json!(1));
        first.insert("b".to_string(), json!(2));
        let mut second = Params::new();
        second.insert("b".to_string(), json!(20));

        engine.connect().execute("UPDATE t SET a = :a", &[], &Params::new(), || {
            ResultSummary::new(1).with_parameters(first).with_parameters(second)
        });

        let stats = session.collect().unwrap();
        assert_eq!(stats[0].params()["a"], json!(1));
        assert_eq!(stats[0].params()["b"], json!(20));
    }

    #[test]
    fn test_dropping_started_session_deregisters() {
        let engine = Engine::new("session-drop");
        {
            let session =
                ProfilingSession::with_options(SessionOptions::new().with_engine(engine.clone()));
            session.start().unwrap();
            assert_eq!(engine.listeners().len(), 1);
        }
        assert!(engine.listeners().is_empty());
    }

    #[test]
    fn test_failed_executions_leave_no_start_times() {
        let engine = Engine::new("session-failed");
        let session = start(SessionOptions::new().with_engine(engine.clone())).unwrap();

        for _ in 0..5 {
            let conn = engine.connect();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                conn.execute("SELECT 1", &[], &Params::new(), || -> ResultSummary {
                    panic!("connection reset")
                })
            }));
            assert!(outcome.is_err());
        }

        assert!(session.listener.start_times.lock().is_empty());
        assert!(session.collect().unwrap().is_empty());
    }

    #[test]
    fn test_stop_discards_pending_start_times() {
        let engine = Engine::new("session-stop-pending");
        let session = start(SessionOptions::new().with_engine(engine.clone())).unwrap();
        let conn = engine.connect();

        // Execution begins but the session stops before it finishes
        session.listener.before_execute(&BeforeExecute {
            connection: &conn,
            statement: "SELECT 1",
            multiparams: &[],
            params: &Params::new(),
        });
        assert_eq!(session.listener.start_times.lock().len(), 1);

        session.stop().unwrap();
        assert!(session.listener.start_times.lock().is_empty());
    }
}
