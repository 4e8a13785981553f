// =============================================================================
// Error Types
// =============================================================================
//
// Every fallible operation in the library returns `Result<T>`, which is
// `std::result::Result<T, MetaError>`.
//
// Errors are only raised for invalid INPUT. Numerical situations that the
// estimators handle by convention are not errors:
//   - A negative raw τ² is clipped to zero.
//   - An iterative estimator that runs out of iterations returns its last
//     value with `converged = false`.
//
// =============================================================================

use thiserror::Error;

/// Errors produced by the meta-analysis engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetaError {
    /// Two inputs that must have the same length do not.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// An input array has no elements.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// A value is outside its valid domain (non-positive variance,
    /// negative weight, NaN, confidence level outside (0, 1), ...).
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// The weight vector leaves no degrees of freedom for a moment
    /// estimator (K = 1, or all weight concentrated on a single study).
    #[error("Degenerate weights: {0}")]
    DegenerateWeights(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MetaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = MetaError::DimensionMismatch("effect has 3 elements but variance has 2".into());
        assert_eq!(
            err.to_string(),
            "Dimension mismatch: effect has 3 elements but variance has 2"
        );

        let err = MetaError::DegenerateWeights("K = 1".into());
        assert!(err.to_string().starts_with("Degenerate weights"));
    }
}
