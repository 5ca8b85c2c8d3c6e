use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scanner::Violation;
use crate::selector::SelectorError;

/// Bounded step of a check that can exceed its time budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Navigation,
    ElementWait,
    Analysis,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Navigation => "navigation",
            Operation::ElementWait => "element wait",
            Operation::Analysis => "analysis",
        })
    }
}

/// Everything that can terminate a check.
///
/// `Conformance` is the expected failure mode: the engine ran and found
/// problems. Every other variant means the check could not reach a verdict.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("invalid rule selector: {0}")]
    InvalidSelector(#[from] SelectorError),
    #[error("accessibility analysis failed: {0}")]
    Analysis(String),
    #[error("{} accessibility violation(s): {}", .violations.len(), summarize(.violations))]
    Conformance { violations: Vec<Violation> },
    #[error("{operation} timed out after {}", format_budget(.budget))]
    Timeout { operation: Operation, budget: Duration },
    #[error("expectation failed: {0}")]
    Expectation(String),
    #[error("browser session unavailable: {0}")]
    Session(String),
}

/// Serializable discriminant of [`CheckError`] used in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[serde(rename = "navigation_error")]
    Navigation,
    InvalidSelector,
    #[serde(rename = "analysis_error")]
    Analysis,
    ConformanceViolation,
    Timeout,
    ExpectationFailed,
    #[serde(rename = "session_error")]
    Session,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Navigation => "navigation_error",
            ErrorKind::InvalidSelector => "invalid_selector",
            ErrorKind::Analysis => "analysis_error",
            ErrorKind::ConformanceViolation => "conformance_violation",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ExpectationFailed => "expectation_failed",
            ErrorKind::Session => "session_error",
        })
    }
}

impl CheckError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckError::Navigation { .. } => ErrorKind::Navigation,
            CheckError::InvalidSelector(_) => ErrorKind::InvalidSelector,
            CheckError::Analysis(_) => ErrorKind::Analysis,
            CheckError::Conformance { .. } => ErrorKind::ConformanceViolation,
            CheckError::Timeout { .. } => ErrorKind::Timeout,
            CheckError::Expectation(_) => ErrorKind::ExpectationFailed,
            CheckError::Session(_) => ErrorKind::Session,
        }
    }

    /// Violations carried by a conformance failure, empty otherwise.
    pub fn violations(&self) -> &[Violation] {
        match self {
            CheckError::Conformance { violations } => violations,
            _ => &[],
        }
    }

    pub fn into_violations(self) -> Vec<Violation> {
        match self {
            CheckError::Conformance { violations } => violations,
            _ => Vec::new(),
        }
    }
}

fn format_budget(budget: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*budget)
}

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::Impact;

    #[test]
    fn conformance_message_lists_rule_ids() {
        let err = CheckError::Conformance {
            violations: vec![
                Violation::new("html-has-lang", "missing lang", Some(Impact::Serious)),
                Violation::new("document-title", "missing title", Some(Impact::Serious)),
            ],
        };
        assert_eq!(err.kind(), ErrorKind::ConformanceViolation);
        assert_eq!(
            err.to_string(),
            "2 accessibility violation(s): html-has-lang, document-title"
        );
        assert_eq!(err.violations().len(), 2);
    }

    #[test]
    fn timeout_message_is_humanized() {
        let err = CheckError::Timeout {
            operation: Operation::Navigation,
            budget: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "navigation timed out after 30s");
        assert!(err.violations().is_empty());
    }

    #[test]
    fn selector_errors_convert() {
        let err: CheckError = SelectorError::EmptySelection.into();
        assert_eq!(err.kind(), ErrorKind::InvalidSelector);
    }

    #[test]
    fn serialized_kind_matches_display() {
        for kind in [
            ErrorKind::Navigation,
            ErrorKind::InvalidSelector,
            ErrorKind::Analysis,
            ErrorKind::ConformanceViolation,
            ErrorKind::Timeout,
            ErrorKind::ExpectationFailed,
            ErrorKind::Session,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.to_string());
        }
    }
}
