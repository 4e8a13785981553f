// =============================================================================
// Statistical Inference
// =============================================================================
//
// Critical values, p-values and confidence intervals used when reporting a
// pooled effect:
//   - Normal intervals: the default for fixed- and random-effects pooling
//   - Student-t intervals: small-K alternative, and always for the
//     Hartung–Knapp–Sidik–Jonkman adjustment (df = K − 1)
//   - χ² tail probability: p-value of Cochran's Q test for heterogeneity
//
// A NOTE ON SMALL K:
// ------------------
// Meta-analyses often pool fewer than ten studies. Normal-theory intervals
// for the random-effects mean are then too narrow because τ² itself is
// uncertain. The t-based and HKSJ intervals exist to widen them.
//
// =============================================================================

use statrs::distribution::{ChiSquared, ContinuousCDF, Normal, StudentsT};

use crate::error::{MetaError, Result};

// =============================================================================
// Critical Values
// =============================================================================

pub(crate) fn check_confidence(confidence: f64) -> Result<()> {
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(MetaError::InvalidValue(format!(
            "confidence level must be in (0, 1), got {}",
            confidence
        )));
    }
    Ok(())
}

/// Two-sided standard normal critical value z₍₁₋α/₂₎ for `confidence = 1 − α`.
pub fn z_critical(confidence: f64) -> Result<f64> {
    check_confidence(confidence)?;
    let alpha = 1.0 - confidence;
    Ok(Normal::standard().inverse_cdf(1.0 - alpha / 2.0))
}

/// Two-sided Student-t critical value t₍₁₋α/₂, df₎.
pub fn t_critical(confidence: f64, df: f64) -> Result<f64> {
    check_confidence(confidence)?;

    // For very large df, the normal approximation is exact to display precision
    if df > 1000.0 && df.is_finite() {
        return z_critical(confidence);
    }

    let t_dist = StudentsT::new(0.0, 1.0, df).map_err(|_| {
        MetaError::InvalidValue(format!("degrees of freedom must be positive, got {}", df))
    })?;
    let alpha = 1.0 - confidence;
    Ok(t_dist.inverse_cdf(1.0 - alpha / 2.0))
}

// =============================================================================
// Tail Probabilities
// =============================================================================

/// Upper-tail probability P(χ²_df > x).
///
/// This is the p-value of Cochran's Q test with df = K − 1.
pub fn chi2_sf(x: f64, df: f64) -> f64 {
    if x.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    if x <= 0.0 {
        return 1.0;
    }

    match ChiSquared::new(df) {
        Ok(d) => d.sf(x),
        Err(_) => f64::NAN,
    }
}

// =============================================================================
// Confidence Intervals
// =============================================================================

/// Confidence interval `estimate ± z · std_error`.
///
/// Returns `(NaN, NaN)` for a non-finite estimate, a negative or non-finite
/// standard error, or a confidence level outside (0, 1). A zero standard
/// error gives the degenerate interval `(estimate, estimate)`.
pub fn confidence_interval_z(estimate: f64, std_error: f64, confidence: f64) -> (f64, f64) {
    if !estimate.is_finite() || !std_error.is_finite() || std_error < 0.0 {
        return (f64::NAN, f64::NAN);
    }

    match z_critical(confidence) {
        Ok(z) => {
            let margin = z * std_error;
            (estimate - margin, estimate + margin)
        }
        Err(_) => (f64::NAN, f64::NAN),
    }
}

/// Confidence interval `estimate ± t_df · std_error`.
pub fn confidence_interval_t(
    estimate: f64,
    std_error: f64,
    df: f64,
    confidence: f64,
) -> (f64, f64) {
    if !estimate.is_finite() || !std_error.is_finite() || std_error < 0.0 || df <= 0.0 {
        return (f64::NAN, f64::NAN);
    }

    match t_critical(confidence, df) {
        Ok(t) => {
            let margin = t * std_error;
            (estimate - margin, estimate + margin)
        }
        Err(_) => (f64::NAN, f64::NAN),
    }
}

// =============================================================================
// Tests
// =============================================================================
