use serde::Serialize;
use thiserror::Error;

/// Errors reported by the training engine and the session around it.
///
/// Every variant leaves the previous valid state in place.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// The operation is not legal in the current state
    #[error("Precondition not met: {0}")]
    PreconditionNotMet(String),
    /// A weight update would have produced NaN or infinity
    #[error("Weight update refused: result is not finite")]
    NumericInstability,
    /// A configuration or weight value was rejected
    #[error("Invalid {name}: {value}")]
    InvalidParameter { name: &'static str, value: String },
}

impl EngineError {
    pub(crate) fn precondition(reason: impl Into<String>) -> EngineError {
        EngineError::PreconditionNotMet(reason.into())
    }

    pub(crate) fn invalid(name: &'static str, value: impl ToString) -> EngineError {
        EngineError::InvalidParameter {
            name,
            value: value.to_string(),
        }
    }
}

/// Why a data row was skipped
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
pub enum ParseIssue {
    #[error("expected at least 4 fields, found {found}")]
    TooFewFields { found: usize },
    #[error("x value {0:?} is not a number")]
    InvalidX(String),
    #[error("y value {0:?} is not a number")]
    InvalidY(String),
    #[error("coordinates must be finite")]
    NonFiniteCoordinate,
    #[error("classification {0:?} is not an integer")]
    InvalidClassification(String),
    #[error("classification {0} is neither -1 nor 1")]
    ClassificationOutOfRange(i64),
    #[error("unreadable record: {0}")]
    Malformed(String),
}

/// A skipped row. Never fatal
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[error("line {line_number}: {issue}")]
pub struct ParseWarning {
    /// 1-based line number in the original text
    pub line_number: usize,
    pub content: String,
    pub issue: ParseIssue,
}
