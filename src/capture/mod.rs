//! Capture of query executions.
//!
//! This module handles:
//! - The execution boundary (engines, connections, listeners)
//! - Call stack capture at the query site
//! - Profiling sessions turning executions into `QueryStats`

pub mod events;
pub mod session;
pub mod stack;

// Re-export main types
pub use events::{
    global_listeners, AfterExecute, BeforeExecute, Connection, ConnectionId, Engine,
    ExecutionListener, ExecutionResult, ListenerId, ListenerRegistry, ResultSummary,
};
pub use session::{start, CollectFn, ProfilingSession, SessionGuard, SessionOptions, UserContextFn};
pub use stack::capture_stack;
