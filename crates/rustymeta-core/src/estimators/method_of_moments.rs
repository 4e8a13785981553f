// =============================================================================
// Method-of-Moments τ² Estimators
// =============================================================================
//
// THE MOMENT EQUATION
// -------------------
// For ANY fixed weight vector w, the weighted sum of squares
//
//     Q_w = Σ wᵢ (eᵢ − m_w)²
//
// has expectation under the random-effects model eᵢ ~ N(μ, vᵢ + τ²):
//
//     E[Q_w] = (Σ wᵢvᵢ − Σ wᵢ²vᵢ / Σw)  +  τ² (Σw − Σw² / Σw)
//              \_______ E₀ _________/        \______ c ______/
//
// Setting Q_w equal to its expectation and solving gives
//
//     τ² = (Q_w − E₀) / c
//
// Special cases:
//   - w = 1/v      → E₀ = K − 1           DerSimonian–Laird (DL)
//   - w = 1/K      → uniform weights       Cochran / "CA"
//   - w = 1/(v+τ₀²)→ one refinement step   two-step estimators (C2, DL2)
//
// A negative solution means the observed dispersion is below what sampling
// error alone would produce; the estimate is truncated to zero.
//
// =============================================================================

use ndarray::Array1;

use crate::constants::DEGENERATE_TOL;
use crate::data::StudySet;
use crate::error::{MetaError, Result};
use crate::moments::{moments_unchecked, weighted_moments};

/// Which weight vector to plug into the moment equation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeightScheme {
    /// `w = 1/v` (DerSimonian–Laird)
    InverseVariance,
    /// `w = 1/K` (Cochran / CA)
    Uniform,
    /// `w = 1/(v + tau2)`, a single refinement from a previous estimate
    Reweighted { tau2: f64 },
}

impl WeightScheme {
    /// Build the weight vector for a validated study set.
    pub fn weights(&self, studies: &StudySet<'_>) -> Result<Array1<f64>> {
        match *self {
            WeightScheme::InverseVariance => Ok(studies.weights_re(0.0)),
            WeightScheme::Uniform => {
                let k = studies.k();
                Ok(Array1::from_elem(k, 1.0 / k as f64))
            }
            WeightScheme::Reweighted { tau2 } => {
                if !(tau2.is_finite() && tau2 >= 0.0) {
                    return Err(MetaError::InvalidValue(format!(
                        "reweighting tau2 must be finite and non-negative, got {}",
                        tau2
                    )));
                }
                Ok(studies.weights_re(tau2))
            }
        }
    }
}

/// Estimate τ² from the moment equation with caller-supplied weights.
///
/// # Arguments
/// * `effect` - Study effects (K × 1)
/// * `variance` - Within-study sampling variances (K × 1), all positive
/// * `weights` - Non-negative weights (K × 1)
///
/// # Returns
/// τ² clipped at zero.
///
/// # Errors
/// * Input validation errors from `StudySet::new`
/// * `DimensionMismatch` / `InvalidValue` for a bad weight vector
/// * `DegenerateWeights` when `c = Σw − Σw²/Σw` is not positive (K = 1 or
///   all weight on one study)
/// * `InvalidValue` when the weighted sums overflow
pub fn fit_tau2_mm(
    effect: &Array1<f64>,
    variance: &Array1<f64>,
    weights: &Array1<f64>,
) -> Result<f64> {
    let studies = StudySet::new(effect, variance)?;
    studies.require_heterogeneity_df()?;
    // Validates length, sign and a positive total
    weighted_moments(effect, weights)?;
    tau2_from_weights(&studies, weights)
}

/// Estimate τ² using one of the named weight schemes.
pub fn fit_tau2_mm_scheme(
    effect: &Array1<f64>,
    variance: &Array1<f64>,
    scheme: WeightScheme,
) -> Result<f64> {
    let studies = StudySet::new(effect, variance)?;
    studies.require_heterogeneity_df()?;
    let weights = scheme.weights(&studies)?;
    tau2_from_weights(&studies, &weights)
}

/// DerSimonian–Laird estimator (inverse-variance weights).
pub fn fit_tau2_dl(effect: &Array1<f64>, variance: &Array1<f64>) -> Result<f64> {
    fit_tau2_mm_scheme(effect, variance, WeightScheme::InverseVariance)
}

/// Cochran / CA estimator (uniform weights).
pub fn fit_tau2_ca(effect: &Array1<f64>, variance: &Array1<f64>) -> Result<f64> {
    fit_tau2_mm_scheme(effect, variance, WeightScheme::Uniform)
}

/// Solve the moment equation for already-validated studies and weights.
///
/// This is the one formula behind every estimator in this module and the
/// update step of the iterated method of moments.
pub(crate) fn tau2_from_weights(studies: &StudySet<'_>, weights: &Array1<f64>) -> Result<f64> {
    let variance = studies.variance();
    let weight_sum = weights.sum();
    let moments = moments_unchecked(studies.effect(), weights, weight_sum);

    let weight_sq_sum = weights.dot(weights);
    let c = weight_sum - weight_sq_sum / weight_sum;
    if !(c > DEGENERATE_TOL * weight_sum) {
        return Err(MetaError::DegenerateWeights(format!(
            "moment equation denominator c = {:.3e} is not positive",
            c
        )));
    }

    let weighted_var: f64 = weights.dot(variance);
    let weighted_sq_var: f64 = weights
        .iter()
        .zip(variance.iter())
        .map(|(&w, &v)| w * w * v)
        .sum();
    let expected_q0 = weighted_var - weighted_sq_var / weight_sum;

    let tau2 = (moments.ss - expected_q0) / c;
    if !tau2.is_finite() {
        return Err(MetaError::InvalidValue(format!(
            "numeric overflow in moment equation (tau2 = {})",
            tau2
        )));
    }
    Ok(tau2.max(0.0))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{homogeneous, kacker, TAU_CA, TAU_DL};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_cochran_uniform_weights() {
        let (eff, var) = kacker();
        let k = eff.len();
        let w = Array1::from_elem(k, 1.0 / k as f64);

        let tau2 = fit_tau2_mm(&eff, &var, &w).unwrap();
        assert_abs_diff_eq!(tau2.sqrt(), TAU_CA, epsilon = 6e-5);

        // Named preset must agree with explicit weights
        let tau2_ca = fit_tau2_ca(&eff, &var).unwrap();
        assert_abs_diff_eq!(tau2, tau2_ca, epsilon = 1e-12);
    }

    #[test]
    fn test_dersimonian_laird() {
        let (eff, var) = kacker();
        let w = var.mapv(|v| 1.0 / v);

        let tau2 = fit_tau2_mm(&eff, &var, &w).unwrap();
        // Published DL value is rounded from a slightly different computation
        assert_abs_diff_eq!(tau2.sqrt(), TAU_DL, epsilon = 1e-3);

        let tau2_dl = fit_tau2_dl(&eff, &var).unwrap();
        assert_abs_diff_eq!(tau2, tau2_dl, epsilon = 1e-12);
    }

    #[test]
    fn test_dl_matches_textbook_formula() {
        // (Q − (K−1)) / (Σw − Σw²/Σw) with w = 1/v
        let (eff, var) = kacker();
        let w = var.mapv(|v| 1.0 / v);
        let sw = w.sum();
        let m = w.dot(&eff) / sw;
        let q: f64 = w.iter().zip(eff.iter()).map(|(&wi, &e)| wi * (e - m).powi(2)).sum();
        let c = sw - w.dot(&w) / sw;
        let expected = (q - (eff.len() as f64 - 1.0)) / c;

        let tau2 = fit_tau2_dl(&eff, &var).unwrap();
        assert_abs_diff_eq!(tau2, expected, epsilon = 1e-10);
    }

    #[test]
    fn test_weight_scale_does_not_matter() {
        let (eff, var) = kacker();
        let w = var.mapv(|v| 1.0 / v);
        let w_scaled = w.mapv(|x| 37.0 * x);

        let a = fit_tau2_mm(&eff, &var, &w).unwrap();
        let b = fit_tau2_mm(&eff, &var, &w_scaled).unwrap();
        assert_abs_diff_eq!(a, b, epsilon = 1e-10);
    }

    #[test]
    fn test_negative_estimate_is_clipped() {
        let (eff, var) = homogeneous();
        assert_eq!(fit_tau2_dl(&eff, &var).unwrap(), 0.0);
        assert_eq!(fit_tau2_ca(&eff, &var).unwrap(), 0.0);
    }

    #[test]
    fn test_identical_effects_give_zero() {
        let eff = array![0.3, 0.3, 0.3];
        let var = array![0.1, 0.2, 0.3];
        assert_eq!(fit_tau2_dl(&eff, &var).unwrap(), 0.0);
    }

    #[test]
    fn test_single_study_is_degenerate() {
        let eff = array![0.3];
        let var = array![0.1];
        let w = array![10.0];
        assert!(matches!(
            fit_tau2_mm(&eff, &var, &w).unwrap_err(),
            MetaError::DegenerateWeights(_)
        ));
        assert!(matches!(
            fit_tau2_ca(&eff, &var).unwrap_err(),
            MetaError::DegenerateWeights(_)
        ));
    }

    #[test]
    fn test_all_weight_on_one_study_is_degenerate() {
        let eff = array![0.3, 0.5, 0.9];
        let var = array![0.1, 0.2, 0.3];
        let w = array![0.0, 2.0, 0.0];
        assert!(matches!(
            fit_tau2_mm(&eff, &var, &w).unwrap_err(),
            MetaError::DegenerateWeights(_)
        ));
    }

    #[test]
    fn test_overflow_is_an_error() {
        let eff = array![1e200, -1e200, 0.0];
        let var = array![1.0, 1.0, 1.0];
        assert!(matches!(
            fit_tau2_dl(&eff, &var).unwrap_err(),
            MetaError::InvalidValue(_)
        ));
        assert!(matches!(
            fit_tau2_ca(&eff, &var).unwrap_err(),
            MetaError::InvalidValue(_)
        ));
    }

    #[test]
    fn test_reweighted_scheme_rejects_negative_tau2() {
        let (eff, var) = kacker();
        let result = fit_tau2_mm_scheme(&eff, &var, WeightScheme::Reweighted { tau2: -0.1 });
        assert!(matches!(result.unwrap_err(), MetaError::InvalidValue(_)));
    }

    #[test]
    fn test_reweighted_at_zero_is_dl() {
        let (eff, var) = kacker();
        let a = fit_tau2_mm_scheme(&eff, &var, WeightScheme::Reweighted { tau2: 0.0 }).unwrap();
        let b = fit_tau2_dl(&eff, &var).unwrap();
        assert_abs_diff_eq!(a, b, epsilon = 1e-14);
    }
}
