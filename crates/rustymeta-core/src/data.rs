// =============================================================================
// Study Data
// =============================================================================
//
// A meta-analysis starts from K study-level summaries: an effect estimate
// and its sampling variance. Where those numbers came from (mean differences,
// log odds ratios, standardized effects, ...) does not matter here.
//
// `StudySet` is a validated, borrowed view over the two arrays. Every public
// entry point builds one first, so no numeric work happens on bad input.
//
// =============================================================================

use ndarray::Array1;

use crate::error::{MetaError, Result};

/// Validated view over per-study effects and sampling variances.
///
/// Guarantees, once constructed:
/// - `effect.len() == variance.len() >= 1`
/// - every effect is finite
/// - every variance is finite and strictly positive
#[derive(Debug, Clone, Copy)]
pub struct StudySet<'a> {
    effect: &'a Array1<f64>,
    variance: &'a Array1<f64>,
}

impl<'a> StudySet<'a> {
    /// Validate the inputs and wrap them.
    ///
    /// # Errors
    /// * `DimensionMismatch` - arrays differ in length
    /// * `EmptyInput` - no studies
    /// * `InvalidValue` - a non-finite effect, or a variance that is not
    ///   finite and positive
    pub fn new(effect: &'a Array1<f64>, variance: &'a Array1<f64>) -> Result<Self> {
        if effect.len() != variance.len() {
            return Err(MetaError::DimensionMismatch(format!(
                "effect has {} elements but variance has {}",
                effect.len(),
                variance.len()
            )));
        }

        if effect.is_empty() {
            return Err(MetaError::EmptyInput("no studies supplied".to_string()));
        }

        if let Some((i, e)) = effect.iter().enumerate().find(|(_, e)| !e.is_finite()) {
            return Err(MetaError::InvalidValue(format!(
                "effect[{}] = {} is not finite",
                i, e
            )));
        }

        if let Some((i, v)) = variance
            .iter()
            .enumerate()
            .find(|&(_, &v)| !(v.is_finite() && v > 0.0))
        {
            return Err(MetaError::InvalidValue(format!(
                "variance[{}] = {} must be finite and positive",
                i, v
            )));
        }

        Ok(Self { effect, variance })
    }

    /// Number of studies K.
    #[inline]
    pub fn k(&self) -> usize {
        self.effect.len()
    }

    #[inline]
    pub fn effect(&self) -> &'a Array1<f64> {
        self.effect
    }

    #[inline]
    pub fn variance(&self) -> &'a Array1<f64> {
        self.variance
    }

    /// Random-effects weights `w_i = 1 / (v_i + τ²)`.
    ///
    /// With τ² = 0 these are the fixed-effect inverse-variance weights.
    /// Callers guarantee `tau2 >= 0`, so every denominator is positive.
    pub fn weights_re(&self, tau2: f64) -> Array1<f64> {
        self.variance.mapv(|v| 1.0 / (v + tau2))
    }

    /// Fail with `DegenerateWeights` unless there is at least one degree of
    /// freedom (K ≥ 2) for estimating heterogeneity.
    pub(crate) fn require_heterogeneity_df(&self) -> Result<()> {
        if self.k() < 2 {
            return Err(MetaError::DegenerateWeights(format!(
                "estimating tau2 needs at least 2 studies, got {}",
                self.k()
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
