//! Call-stack frames captured at the query site.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One frame of a captured call stack
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackFrame {
    /// Demangled symbol path (e.g. `app::orders::load`)
    pub name: String,

    /// Source file, empty when debug info is unavailable
    pub filename: String,

    /// Source line, if known
    pub lineno: Option<u32>,
}

impl StackFrame {
    pub fn new(name: impl Into<String>, filename: impl Into<String>, lineno: Option<u32>) -> Self {
        Self {
            name: name.into(),
            filename: filename.into(),
            lineno,
        }
    }

    /// `file:line`, or just the file when the line is unknown
    pub fn location(&self) -> String {
        let file = if self.filename.is_empty() {
            "<unknown>"
        } else {
            self.filename.as_str()
        };
        match self.lineno {
            Some(line) => format!("{}:{}", file, line),
            None => file.to_string(),
        }
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  {}\n    at {}", self.name, self.location())
    }
}

/// Render a stack (outermost first) as text
///
/// **Public** - the result keys a group's `stacks` and `callers` maps, so
/// two records share a key exactly when their frames render identically.
pub fn format_stack(stack: &[StackFrame]) -> String {
    stack
        .iter()
        .map(StackFrame::to_string)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
