use thiserror::Error;

/// Error type surfaced by all moraine processing stages.
///
/// `InvalidInput` and `InvalidConfiguration` abort a whole request and name the
/// offending input or parameter. Per-class conditions that merely skip a class
/// (too few points to interpolate, degenerate extents) are not errors and are
/// reported through the request results instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MoraineError {
    /// The point data cannot be processed as a whole, e.g. an empty cloud where
    /// a result is required, or more non-finite coordinates than tolerated
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// A request parameter is outside its valid domain
    #[error("invalid configuration: {parameter} must be {expected} (got {value})")]
    InvalidConfiguration {
        parameter: &'static str,
        expected: &'static str,
        value: f64,
    },

    /// Unexpected arithmetic failure, e.g. a degenerate triangulation
    #[error("internal failure: {0}")]
    Internal(String),
}

impl MoraineError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        MoraineError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        MoraineError::Internal(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, MoraineError>;
