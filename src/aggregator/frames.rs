//! Call-site attribution: which frame of a stack issued the query.
//!
//! Frames are split into "instrumented library" and "caller code" by a
//! predicate. The default predicate is a plain substring check on the frame's
//! file path and symbol path, which is approximate: application code living
//! under a path that mentions the library pattern is treated as library code.

use crate::record::StackFrame;
use crate::utils::config::DEFAULT_LIBRARY_PATTERN;
use std::fmt;
use std::sync::Arc;

/// Classifies stack frames as library code
#[derive(Clone)]
pub struct FrameFilter {
    is_library: Arc<dyn Fn(&StackFrame) -> bool + Send + Sync>,
    description: String,
}

impl FrameFilter {
    /// Use an arbitrary predicate returning true for library frames
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&StackFrame) -> bool + Send + Sync + 'static,
    {
        Self {
            is_library: Arc::new(predicate),
            description: "custom".to_string(),
        }
    }

    /// Library frames are those whose file or symbol path contains `pattern`
    pub fn substring(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let description = format!("substring {:?}", pattern);
        Self {
            is_library: Arc::new(move |frame: &StackFrame| {
                frame.filename.contains(&pattern) || frame.name.contains(&pattern)
            }),
            description,
        }
    }

    pub fn is_library(&self, frame: &StackFrame) -> bool {
        (self.is_library)(frame)
    }

    /// Innermost frame that is not library code
    ///
    /// **Public** - feeds a group's `callers` map
    ///
    /// The stack is stored outermost first, so it is scanned in reverse.
    /// Returns `None` when every frame looks like library code.
    pub fn find_user_frame<'a>(&self, stack: &'a [StackFrame]) -> Option<&'a StackFrame> {
        stack.iter().rev().find(|frame| !self.is_library(frame))
    }
}

impl Default for FrameFilter {
    fn default() -> Self {
        Self::substring(DEFAULT_LIBRARY_PATTERN)
    }
}

impl fmt::Debug for FrameFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameFilter")
            .field("matcher", &self.description)
            .finish()
    }
}
