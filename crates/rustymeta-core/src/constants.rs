// =============================================================================
// Numerical Constants
// =============================================================================

/// Relative tolerance below which the moment-equation denominator
/// `c = Σw − Σw²/Σw` is treated as zero (weight concentrated on one study).
pub const DEGENERATE_TOL: f64 = 1e-12;

/// Default absolute tolerance on successive τ² values for iterative estimators.
pub const DEFAULT_ATOL: f64 = 1e-5;

/// Default iteration budget for iterative estimators.
pub const DEFAULT_MAX_ITER: usize = 50;

/// Default confidence level for pooled and per-study intervals.
pub const DEFAULT_CONFIDENCE: f64 = 0.95;
