//! Cosmetic SQL pretty-printing for report display.
//!
//! The default formatter hands the statement to `sqlformat` once a quick
//! balance check passes. Anything it can't make sense of is reported as an
//! error and the caller falls back to the raw text.

use crate::utils::error::FormatError;
use log::{debug, warn};
use sqlformat::{FormatOptions, QueryParams};
use std::panic::{self, AssertUnwindSafe};

/// Pretty-printer used for a group's `formatted_text`
pub trait SqlFormatter: Send + Sync {
    fn format(&self, sql: &str) -> Result<String, FormatError>;
}

/// Reindents statements with `sqlformat`, one clause per line
#[derive(Debug, Clone, Copy, Default)]
pub struct ReindentFormatter;

impl SqlFormatter for ReindentFormatter {
    fn format(&self, sql: &str) -> Result<String, FormatError> {
        check_balanced(sql)?;
        Ok(sqlformat::format(sql, &QueryParams::None, FormatOptions::default()))
    }
}

/// Reject unterminated string literals and unbalanced parentheses
fn check_balanced(sql: &str) -> Result<(), FormatError> {
    let mut depth: usize = 0;
    let mut in_quote = false;

    for c in sql.chars() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth = depth.checked_sub(1).ok_or(FormatError::UnbalancedParens)?;
            }
            _ => {}
        }
    }

    if in_quote {
        return Err(FormatError::UnbalancedQuotes);
    }
    if depth != 0 {
        return Err(FormatError::UnbalancedParens);
    }
    Ok(())
}

/// Format `sql`, falling back to the raw text on any formatter failure
///
/// **Public** - used when a group freezes its display text
pub fn format_sql(formatter: &dyn SqlFormatter, sql: &str) -> String {
    match panic::catch_unwind(AssertUnwindSafe(|| formatter.format(sql))) {
        Ok(Ok(formatted)) => formatted,
        Ok(Err(e)) => {
            debug!("Leaving statement unformatted: {}", e);
            sql.to_string()
        }
        Err(_) => {
            warn!("SQL formatter panicked, leaving statement unformatted");
            sql.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(sql: &str) -> Vec<&str> {
        sql.split_whitespace().collect()
    }

    #[test]
    fn test_reindent_splits_clauses_onto_lines() {
        let raw = "select a, b from t where x = 1 order by a";
        let formatted = ReindentFormatter.format(raw).unwrap();

        assert!(formatted.lines().count() > 1);
        assert!(formatted.lines().any(|line| line.trim() == "from"));
        assert_eq!(tokens(&formatted), tokens(raw));
    }

    #[test]
    fn test_reindent_keeps_string_literals() {
        let formatted = ReindentFormatter.format("SELECT 'from where' FROM t").unwrap();
        assert!(formatted.contains("'from where'"));
    }

    #[test]
    fn test_unbalanced_input_is_an_error() {
        assert_eq!(
            ReindentFormatter.format("SELECT 'oops FROM t"),
            Err(FormatError::UnbalancedQuotes)
        );
        assert_eq!(
            ReindentFormatter.format("SELECT (1 FROM t"),
            Err(FormatError::UnbalancedParens)
        );
        assert_eq!(
            ReindentFormatter.format("SELECT 1) FROM t"),
            Err(FormatError::UnbalancedParens)
        );
    }

    #[test]
    fn test_parens_inside_strings_are_ignored() {
        assert!(check_balanced("SELECT ')' FROM t WHERE a IN (1, 2)").is_ok());
    }

    #[test]
    fn test_format_sql_falls_back_to_raw_text() {
        let raw = "SELECT 'oops FROM t";
        assert_eq!(format_sql(&ReindentFormatter, raw), raw);
    }

    #[test]
    fn test_format_sql_survives_panicking_formatter() {
        struct Broken;
        impl SqlFormatter for Broken {
            fn format(&self, _sql: &str) -> Result<String, FormatError> {
                panic!("formatter bug")
            }
        }
        assert_eq!(format_sql(&Broken, "SELECT 1"), "SELECT 1");
    }
}
