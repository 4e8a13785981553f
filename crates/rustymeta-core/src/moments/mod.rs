// =============================================================================
// Weighted Moments
// =============================================================================
//
// Every estimator in this crate reduces to the same two quantities computed
// under some weight vector w:
//
//     weighted mean:   m  = Σ wᵢ eᵢ / Σ wᵢ
//     weighted SS:     Q  = Σ wᵢ (eᵢ − m)²
//
// With inverse-variance weights Q is Cochran's Q statistic. With random-
// effects weights 1/(vᵢ + τ²) it is the generalized Q used by Paule–Mandel.
//
// =============================================================================

use ndarray::Array1;

use crate::error::{MetaError, Result};

/// Weighted mean and weighted sum of squares of an effect vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedMoments {
    /// Σ wᵢ eᵢ / Σ wᵢ
    pub mean: f64,
    /// Σ wᵢ (eᵢ − mean)²
    pub ss: f64,
    /// Σ wᵢ
    pub weight_sum: f64,
}

/// Compute the weighted mean and weighted sum of squares.
///
/// # Arguments
/// * `effect` - Study effects (K × 1)
/// * `weights` - Non-negative weights (K × 1), at least one positive
///
/// # Errors
/// * `DimensionMismatch` - lengths differ
/// * `EmptyInput` - no elements
/// * `InvalidValue` - a negative or non-finite weight, or all weights zero
pub fn weighted_moments(effect: &Array1<f64>, weights: &Array1<f64>) -> Result<WeightedMoments> {
    if effect.len() != weights.len() {
        return Err(MetaError::DimensionMismatch(format!(
            "effect has {} elements but weights has {}",
            effect.len(),
            weights.len()
        )));
    }

    if effect.is_empty() {
        return Err(MetaError::EmptyInput("effect is empty".to_string()));
    }

    if weights.iter().any(|&w| !w.is_finite() || w < 0.0) {
        return Err(MetaError::InvalidValue(
            "weights must be finite and non-negative".to_string(),
        ));
    }

    let weight_sum = weights.sum();
    if weight_sum <= 0.0 {
        return Err(MetaError::InvalidValue(
            "weights sum to zero; weighted mean is undefined".to_string(),
        ));
    }

    Ok(moments_unchecked(effect, weights, weight_sum))
}

/// Same computation without validation, for callers that built the weights
/// themselves from a validated `StudySet`.
pub(crate) fn moments_unchecked(
    effect: &Array1<f64>,
    weights: &Array1<f64>,
    weight_sum: f64,
) -> WeightedMoments {
    let mean = weights.dot(effect) / weight_sum;
    let ss: f64 = weights
        .iter()
        .zip(effect.iter())
        .map(|(&w, &e)| w * (e - mean) * (e - mean))
        .sum();

    WeightedMoments {
        mean,
        ss,
        weight_sum,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_uniform_weights_match_plain_mean() {
        let eff = array![1.0, 2.0, 3.0, 6.0];
        let w = array![1.0, 1.0, 1.0, 1.0];
        let m = weighted_moments(&eff, &w).unwrap();

        assert_abs_diff_eq!(m.mean, 3.0, epsilon = 1e-12);
        // (−2)² + (−1)² + 0² + 3² = 14
        assert_abs_diff_eq!(m.ss, 14.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.weight_sum, 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_scale_invariance_of_mean() {
        // Rescaling every weight changes SS proportionally but not the mean
        let eff = array![0.5, -0.2, 1.3];
        let w = array![2.0, 5.0, 1.0];
        let w10 = w.mapv(|x| 10.0 * x);

        let a = weighted_moments(&eff, &w).unwrap();
        let b = weighted_moments(&eff, &w10).unwrap();

        assert_abs_diff_eq!(a.mean, b.mean, epsilon = 1e-12);
        assert_abs_diff_eq!(10.0 * a.ss, b.ss, epsilon = 1e-10);
    }

    #[test]
    fn test_zero_weight_study_is_ignored() {
        let eff = array![1.0, 100.0, 3.0];
        let w = array![1.0, 0.0, 1.0];
        let m = weighted_moments(&eff, &w).unwrap();
        assert_abs_diff_eq!(m.mean, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.ss, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_all_zero_weights_error() {
        let eff = array![1.0, 2.0];
        let w = array![0.0, 0.0];
        assert!(matches!(
            weighted_moments(&eff, &w).unwrap_err(),
            MetaError::InvalidValue(_)
        ));
    }

    #[test]
    fn test_negative_weight_error() {
        let eff = array![1.0, 2.0];
        let w = array![1.0, -0.5];
        assert!(weighted_moments(&eff, &w).is_err());
    }

    #[test]
    fn test_length_mismatch_error() {
        let eff = array![1.0, 2.0, 3.0];
        let w = array![1.0, 1.0];
        assert!(matches!(
            weighted_moments(&eff, &w).unwrap_err(),
            MetaError::DimensionMismatch(_)
        ));
    }
}
