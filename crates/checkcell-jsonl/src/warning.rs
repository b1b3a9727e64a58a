//! Non-fatal problems found while reading a JSONL file.
//!
//! A resilient read skips a damaged line and records a [`Warning`] for it.
//!
//! ```
//! use checkcell_jsonl::{LineProblem, Warning};
//!
//! let warning = Warning::new(4, LineProblem::Malformed("expected `,`".into()));
//! assert_eq!(warning.to_string(), "line 4: malformed record: expected `,`");
//! ```

use std::fmt;

/// Why a line was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineProblem {
    /// The line is not valid UTF-8.
    InvalidUtf8,
    /// The line is not JSON, or not JSON of the expected record shape.
    Malformed(String),
}

/// A skipped line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// 1-based line number.
    pub line_number: usize,
    /// What was wrong with it.
    pub problem: LineProblem,
}

impl Warning {
    /// Warning for `line_number`.
    #[must_use]
    pub fn new(line_number: usize, problem: LineProblem) -> Self {
        Self {
            line_number,
            problem,
        }
    }

    /// Whether the line decoded as text but not as a record.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self.problem, LineProblem::Malformed(_))
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            LineProblem::InvalidUtf8 => write!(f, "line {}: not valid UTF-8", self.line_number),
            LineProblem::Malformed(error) => {
                write!(f, "line {}: malformed record: {error}", self.line_number)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_line_and_problem() {
        let utf8 = Warning::new(3, LineProblem::InvalidUtf8);
        assert_eq!(utf8.to_string(), "line 3: not valid UTF-8");
        assert!(!utf8.is_malformed());

        let json = Warning::new(5, LineProblem::Malformed("EOF while parsing".into()));
        assert!(json.to_string().starts_with("line 5: malformed record"));
        assert!(json.is_malformed());
    }
}
