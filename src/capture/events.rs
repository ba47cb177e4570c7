//! Execution boundary of the profiled executor.
//!
//! An `Engine` dispatches a `before_execute` and an `after_execute` event
//! around every statement run through one of its `Connection`s. Listeners
//! can be attached to a single engine or to the process-wide registry,
//! which hears every engine.

use crate::record::Params;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Handle returned when registering a listener, used to remove it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Result of one execution as seen by `after_execute`
pub trait ExecutionResult {
    /// Rows produced or affected
    fn rowcount(&self) -> i64;

    /// Compiled parameter maps of the execution context, in order
    fn compiled_parameters(&self) -> &[Params] {
        &[]
    }
}

/// Plain `ExecutionResult` for drivers that report counts and parameters
#[derive(Debug, Clone, Default)]
pub struct ResultSummary {
    pub rowcount: i64,
    pub compiled_parameters: Vec<Params>,
}

impl ResultSummary {
    pub fn new(rowcount: i64) -> Self {
        Self {
            rowcount,
            compiled_parameters: Vec::new(),
        }
    }

    pub fn with_parameters(mut self, params: Params) -> Self {
        self.compiled_parameters.push(params);
        self
    }
}

impl ExecutionResult for ResultSummary {
    fn rowcount(&self) -> i64 {
        self.rowcount
    }

    fn compiled_parameters(&self) -> &[Params] {
        &self.compiled_parameters
    }
}

/// Payload of the pre-execution event
pub struct BeforeExecute<'a> {
    pub connection: &'a Connection,
    pub statement: &'a str,
    pub multiparams: &'a [Params],
    pub params: &'a Params,
}

/// Payload of the post-execution event
pub struct AfterExecute<'a> {
    pub connection: &'a Connection,
    pub statement: &'a str,
    pub multiparams: &'a [Params],
    pub params: &'a Params,
    pub results: &'a dyn ExecutionResult,
}

/// Receiver of execution events
///
/// All methods run inline on the thread issuing the query.
pub trait ExecutionListener: Send + Sync {
    fn before_execute(&self, event: &BeforeExecute<'_>);
    fn after_execute(&self, event: &AfterExecute<'_>);

    /// The database call panicked; no `after_execute` follows
    ///
    /// Runs while unwinding, so implementations must not panic.
    fn execute_failed(&self, _connection: &Connection) {}
}

/// Ordered set of listeners
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ExecutionListener>)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn ExecutionListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    /// Remove a listener; returns false if it was not registered
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Dispatch works on a snapshot so listeners may (de)register concurrently
    fn snapshot(&self) -> Vec<Arc<dyn ExecutionListener>> {
        self.listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

/// Listeners that hear every engine in the process
pub fn global_listeners() -> &'static ListenerRegistry {
    static GLOBAL: OnceLock<ListenerRegistry> = OnceLock::new();
    GLOBAL.get_or_init(ListenerRegistry::new)
}

/// A profiled executor
pub struct Engine {
    id: u64,
    name: String,
    listeners: ListenerRegistry,
}

impl Engine {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            listeners: ListenerRegistry::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Listeners scoped to this engine only
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Open a connection with a fresh identity
    pub fn connect(self: &Arc<Self>) -> Connection {
        Connection {
            id: ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
            engine: Arc::clone(self),
        }
    }

    fn dispatch_before(&self, event: &BeforeExecute<'_>) {
        for listener in global_listeners().snapshot().into_iter().chain(self.listeners.snapshot()) {
            listener.before_execute(event);
        }
    }

    fn dispatch_after(&self, event: &AfterExecute<'_>) {
        for listener in global_listeners().snapshot().into_iter().chain(self.listeners.snapshot()) {
            listener.after_execute(event);
        }
    }

    fn dispatch_failed(&self, connection: &Connection) {
        for listener in global_listeners().snapshot().into_iter().chain(self.listeners.snapshot()) {
            listener.execute_failed(connection);
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// A connection through which statements are executed
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    engine: Arc<Engine>,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Run one statement, firing the execution events around `run`
    ///
    /// **Public** - the integration point for database drivers
    ///
    /// # Arguments
    /// * `statement` - Statement text as sent to the database
    /// * `multiparams` - Positional parameter sets (executemany style)
    /// * `params` - Keyword parameters
    /// * `run` - Performs the actual database call
    ///
    /// # Returns
    /// Whatever `run` returned, untouched. If `run` panics, listeners get
    /// `execute_failed` instead of `after_execute` and the panic resumes.
    pub fn execute<R, F>(
        &self,
        statement: &str,
        multiparams: &[Params],
        params: &Params,
        run: F,
    ) -> R
    where
        R: ExecutionResult,
        F: FnOnce() -> R,
    {
        self.engine.dispatch_before(&BeforeExecute {
            connection: self,
            statement,
            multiparams,
            params,
        });

        let in_flight = InFlight { connection: self };
        let results = run();
        std::mem::forget(in_flight);

        self.engine.dispatch_after(&AfterExecute {
            connection: self,
            statement,
            multiparams,
            params,
            results: &results,
        });

        results
    }
}

/// Reports a failed execution if dropped before `run` returns
struct InFlight<'a> {
    connection: &'a Connection,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.connection.engine.dispatch_failed(self.connection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ExecutionListener for Recorder {
        fn before_execute(&self, event: &BeforeExecute<'_>) {
            self.events.lock().push(format!("before {}", event.statement));
        }

        fn after_execute(&self, event: &AfterExecute<'_>) {
            self.events
                .lock()
                .push(format!("after {} rows={}", event.statement, event.results.rowcount()));
        }

        fn execute_failed(&self, connection: &Connection) {
            self.events.lock().push(format!("failed {}", connection.id()));
        }
    }

    #[test]
    fn test_engine_listener_sees_both_events() {
        let engine = Engine::new("events-test");
        let recorder = Arc::new(Recorder::default());
        engine.listeners().register(recorder.clone());

        let conn = engine.connect();
        let result = conn.execute("SELECT 1", &[], &Params::new(), || ResultSummary::new(1));

        assert_eq!(result.rowcount, 1);
        assert_eq!(
            *recorder.events.lock(),
            vec!["before SELECT 1".to_string(), "after SELECT 1 rows=1".to_string()]
        );
    }

    #[test]
    fn test_panicking_run_reports_failure() {
        let engine = Engine::new("events-failed");
        let recorder = Arc::new(Recorder::default());
        engine.listeners().register(recorder.clone());

        let conn = engine.connect();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            conn.execute("SELECT 1", &[], &Params::new(), || -> ResultSummary {
                panic!("driver error")
            })
        }));

        assert!(outcome.is_err());
        assert_eq!(
            *recorder.events.lock(),
            vec!["before SELECT 1".to_string(), format!("failed {}", conn.id())]
        );
    }

    #[test]
    fn test_removed_listener_is_silent() {
        let engine = Engine::new("events-remove");
        let recorder = Arc::new(Recorder::default());
        let id = engine.listeners().register(recorder.clone());

        assert!(engine.listeners().remove(id));
        assert!(!engine.listeners().remove(id));

        engine.connect().execute("SELECT 1", &[], &Params::new(), || ResultSummary::new(0));
        assert!(recorder.events.lock().is_empty());
    }

    #[test]
    fn test_connections_have_distinct_ids() {
        let engine = Engine::new("events-ids");
        let a = engine.connect();
        let b = engine.connect();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_default_compiled_parameters_empty() {
        struct Bare;
        impl ExecutionResult for Bare {
            fn rowcount(&self) -> i64 {
                -1
            }
        }
        assert!(Bare.compiled_parameters().is_empty());
    }
}
