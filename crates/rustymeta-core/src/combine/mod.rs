// =============================================================================
// Effect Combination
// =============================================================================
//
// Once τ² is known, pooling is a weighted average:
//
//     wᵢ = 1 / (vᵢ + τ²)
//     μ̂  = Σ wᵢ eᵢ / Σ wᵢ
//     Var(μ̂) = 1 / Σ wᵢ
//
// τ² = 0 gives the fixed-effect (inverse-variance) estimate; any τ² > 0
// flattens the weights toward equality and widens the interval.
//
// `combine` is the minimal operation: one τ², one pooled effect.
// `combine_effects` (in `results`) runs a complete analysis: it estimates
// τ², pools under both models and reports heterogeneity statistics.
//
// =============================================================================

mod results;

pub use results::{combine_effects, CombineConfig, CombineResults, IntervalKind, SummaryRow};

use ndarray::Array1;

use crate::data::StudySet;
use crate::error::{MetaError, Result};
use crate::inference::{check_confidence, confidence_interval_z};
use crate::moments::moments_unchecked;

/// Pooled effect under a given τ².
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombinedEffect {
    /// Weighted mean of the study effects
    pub point: f64,
    /// Standard error of `point`, sqrt(1 / Σw)
    pub se: f64,
    /// Lower confidence bound
    pub ci_low: f64,
    /// Upper confidence bound
    pub ci_high: f64,
    /// τ² used for the weights
    pub tau2: f64,
    /// Confidence level of the interval
    pub confidence_level: f64,
}

/// Pool study effects with random-effects weights `1/(v + tau2)`.
///
/// # Arguments
/// * `effect` - Study effects (K × 1)
/// * `variance` - Within-study sampling variances (K × 1), all positive
/// * `tau2` - Between-study variance, >= 0 (0 gives fixed-effect pooling)
/// * `confidence_level` - e.g. 0.95; the interval uses a normal critical value
///
/// # Errors
/// Input validation errors, a negative or non-finite `tau2`, or a
/// confidence level outside (0, 1).
pub fn combine(
    effect: &Array1<f64>,
    variance: &Array1<f64>,
    tau2: f64,
    confidence_level: f64,
) -> Result<CombinedEffect> {
    let studies = StudySet::new(effect, variance)?;
    check_tau2(tau2)?;
    check_confidence(confidence_level)?;

    let pooled = pool(&studies, tau2);
    let (ci_low, ci_high) = confidence_interval_z(pooled.point, pooled.se, confidence_level);

    Ok(CombinedEffect {
        point: pooled.point,
        se: pooled.se,
        ci_low,
        ci_high,
        tau2,
        confidence_level,
    })
}

/// Fixed-effect (inverse-variance) pooling, i.e. `combine` with τ² = 0.
pub fn combine_fixed(
    effect: &Array1<f64>,
    variance: &Array1<f64>,
    confidence_level: f64,
) -> Result<CombinedEffect> {
    combine(effect, variance, 0.0, confidence_level)
}

fn check_tau2(tau2: f64) -> Result<()> {
    if !(tau2.is_finite() && tau2 >= 0.0) {
        return Err(MetaError::InvalidValue(format!(
            "tau2 must be finite and non-negative, got {}",
            tau2
        )));
    }
    Ok(())
}

/// Pooled point estimate with everything needed for derived statistics.
#[derive(Debug, Clone)]
pub(crate) struct Pooled {
    pub point: f64,
    pub se: f64,
    pub weights: Array1<f64>,
    pub weight_sum: f64,
    /// Σ wᵢ (eᵢ − point)²
    pub ss: f64,
}

pub(crate) fn pool(studies: &StudySet<'_>, tau2: f64) -> Pooled {
    let weights = studies.weights_re(tau2);
    let weight_sum = weights.sum();
    let moments = moments_unchecked(studies.effect(), &weights, weight_sum);

    Pooled {
        point: moments.mean,
        se: (1.0 / weight_sum).sqrt(),
        weights,
        weight_sum,
        ss: moments.ss,
    }
}

// =============================================================================
// Tests
// =============================================================================
