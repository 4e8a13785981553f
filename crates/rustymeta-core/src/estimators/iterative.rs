// =============================================================================
// Iterative τ² Estimators
// =============================================================================
//
// PAULE–MANDEL
// ------------
// Paule–Mandel picks the τ² at which the generalized Q statistic equals its
// degrees of freedom:
//
//     Q(τ²) = Σ wᵢ(τ²) (eᵢ − m(τ²))²  =  K − 1,     wᵢ(τ²) = 1/(vᵢ + τ²)
//
// Q(τ²) is decreasing and convex in τ², so Newton's method started below the
// root climbs to it monotonically. Holding the weights at the current τ²,
//
//     dQ/dτ² = −Σ wᵢ² (eᵢ − m)²
//
// (the derivative of m drops out because Σ wᵢ(eᵢ − m) = 0), giving the update
//
//     τ²_next = τ² + (Q − (K − 1)) / Σ wᵢ² (eᵢ − m)²
//
// If Q(0) < K − 1 there is no positive root and the estimate is zero.
//
// ITERATED METHOD OF MOMENTS
// --------------------------
// The same loop can instead re-solve the closed-form moment equation with
// weights 1/(v + τ²_current). One pass from τ² = 0 is DerSimonian–Laird;
// one pass from the Cochran estimate is the two-step "C2" estimator.
//
// STATE MACHINE
// -------------
// Both estimators share one loop: a state of (τ², iteration) that is
// advanced by an update rule, clipped at zero, and stopped when successive
// values differ by at most `atol` or the iteration budget runs out. Running
// out is not an error; the estimate is returned with `converged = false`.
//
// =============================================================================

use ndarray::Array1;
use tracing::{debug, warn};

use crate::constants::{DEFAULT_ATOL, DEFAULT_MAX_ITER};
use crate::data::StudySet;
use crate::error::{MetaError, Result};
use crate::moments::moments_unchecked;

use super::method_of_moments::tau2_from_weights;
use super::Tau2Estimate;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the iterative τ² estimators.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationConfig {
    /// Starting value for τ².
    /// Default: 0.0
    pub tau2_start: f64,

    /// Stop when |τ²_next − τ²_current| <= atol.
    /// Default: 1e-5
    pub atol: f64,

    /// Maximum number of updates before returning with `converged = false`.
    /// Default: 50
    pub max_iterations: usize,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            tau2_start: 0.0,
            atol: DEFAULT_ATOL,
            max_iterations: DEFAULT_MAX_ITER,
        }
    }
}

impl IterationConfig {
    /// Builder-style override of the starting value.
    pub fn with_start(mut self, tau2_start: f64) -> Self {
        self.tau2_start = tau2_start;
        self
    }

    /// Builder-style override of the tolerance.
    pub fn with_atol(mut self, atol: f64) -> Self {
        self.atol = atol;
        self
    }

    /// Builder-style override of the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.tau2_start.is_finite() && self.tau2_start >= 0.0) {
            return Err(MetaError::InvalidValue(format!(
                "tau2_start must be finite and non-negative, got {}",
                self.tau2_start
            )));
        }
        if !(self.atol.is_finite() && self.atol >= 0.0) {
            return Err(MetaError::InvalidValue(format!(
                "atol must be finite and non-negative, got {}",
                self.atol
            )));
        }
        if self.max_iterations == 0 {
            return Err(MetaError::InvalidValue(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Public Entry Points
// =============================================================================

/// Paule–Mandel estimate of τ².
///
/// # Arguments
/// * `effect` - Study effects (K × 1)
/// * `variance` - Within-study sampling variances (K × 1), all positive
/// * `config` - Starting value, tolerance and iteration budget
///
/// # Returns
/// The estimate, whether it converged, and how many updates were made.
/// A non-converged estimate is still returned; check `converged`.
///
/// # Errors
/// Input validation errors, invalid config, `DegenerateWeights` for K = 1,
/// or `InvalidValue` when an update overflows.
pub fn fit_tau2_iterative(
    effect: &Array1<f64>,
    variance: &Array1<f64>,
    config: &IterationConfig,
) -> Result<Tau2Estimate> {
    let studies = StudySet::new(effect, variance)?;
    studies.require_heterogeneity_df()?;
    config.validate()?;

    let estimate = run_fixed_point(&studies, config, UpdateRule::PauleMandel)?;
    warn_if_not_converged(UpdateRule::PauleMandel, config, &estimate);
    Ok(estimate)
}

/// Iterated method-of-moments estimate of τ².
///
/// Performs at most `config.max_iterations` moment-equation updates with
/// weights `1/(v + τ²_current)`. With `max_iterations = 1` this is exactly
/// one refinement step: started from 0 it reproduces DerSimonian–Laird,
/// started from the Cochran estimate it gives the two-step C2 estimator.
/// A single step reports `converged = false` unless the start value is
/// already a fixed point within `atol`.
///
/// Running out of budget is routine for the one-step use, so it is logged
/// at `debug` rather than `warn`.
pub fn fit_tau2_iter_mm(
    effect: &Array1<f64>,
    variance: &Array1<f64>,
    config: &IterationConfig,
) -> Result<Tau2Estimate> {
    let studies = StudySet::new(effect, variance)?;
    studies.require_heterogeneity_df()?;
    config.validate()?;

    let estimate = run_fixed_point(&studies, config, UpdateRule::MethodOfMoments)?;
    if !estimate.converged {
        debug!(
            estimator = UpdateRule::MethodOfMoments.name(),
            max_iterations = config.max_iterations,
            tau2 = estimate.tau2,
            "tau2 iteration stopped at the iteration budget"
        );
    }
    Ok(estimate)
}

// =============================================================================
// Fixed-Point Machinery
// =============================================================================

/// How τ²_next is derived from τ²_current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpdateRule {
    /// One Newton step on Q(τ²) − (K − 1)
    PauleMandel,
    /// Re-solve the moment equation with weights 1/(v + τ²)
    MethodOfMoments,
}

impl UpdateRule {
    fn name(&self) -> &'static str {
        match self {
            UpdateRule::PauleMandel => "paule_mandel",
            UpdateRule::MethodOfMoments => "iterated_mm",
        }
    }

    /// Compute the next (unclipped) value of τ².
    fn step(&self, studies: &StudySet<'_>, tau2: f64) -> Result<f64> {
        let weights = studies.weights_re(tau2);
        match self {
            UpdateRule::PauleMandel => Ok(paule_mandel_step(studies, &weights, tau2)),
            UpdateRule::MethodOfMoments => tau2_from_weights(studies, &weights),
        }
    }
}

/// Current position of the fixed-point iteration.
#[derive(Debug, Clone, Copy)]
struct FixedPointState {
    tau2: f64,
    iteration: usize,
}

pub(crate) fn run_fixed_point(
    studies: &StudySet<'_>,
    config: &IterationConfig,
    rule: UpdateRule,
) -> Result<Tau2Estimate> {
    let mut state = FixedPointState {
        tau2: config.tau2_start,
        iteration: 0,
    };
    let mut converged = false;

    while state.iteration < config.max_iterations {
        state.iteration += 1;

        let raw = rule.step(studies, state.tau2)?;
        // NaN.max(0.0) is 0.0, so reject before clipping
        if !raw.is_finite() {
            return Err(MetaError::InvalidValue(format!(
                "numeric overflow in {} update at iteration {} (tau2 = {})",
                rule.name(),
                state.iteration,
                raw
            )));
        }
        // Clip so the next weights 1/(v + τ²) stay defined
        let tau2_next = raw.max(0.0);
        let delta = (tau2_next - state.tau2).abs();

        debug!(
            estimator = rule.name(),
            iteration = state.iteration,
            tau2 = tau2_next,
            delta,
            "tau2 update"
        );

        state.tau2 = tau2_next;

        if delta <= config.atol {
            converged = true;
            break;
        }
    }

    Ok(Tau2Estimate {
        tau2: state.tau2,
        converged,
        iterations: state.iteration,
    })
}

pub(crate) fn warn_if_not_converged(
    rule: UpdateRule,
    config: &IterationConfig,
    estimate: &Tau2Estimate,
) {
    if !estimate.converged {
        warn!(
            estimator = rule.name(),
            max_iterations = config.max_iterations,
            tau2 = estimate.tau2,
            "tau2 iteration did not converge"
        );
    }
}

/// Newton update of the Paule–Mandel estimating equation at the given weights.
fn paule_mandel_step(studies: &StudySet<'_>, weights: &Array1<f64>, tau2: f64) -> f64 {
    let effect = studies.effect();
    let moments = moments_unchecked(effect, weights, weights.sum());
    let df = (studies.k() - 1) as f64;
    let estimating_eq = moments.ss - df;

    // −dQ/dτ² with weights held fixed
    let slope: f64 = weights
        .iter()
        .zip(effect.iter())
        .map(|(&w, &e)| w * w * (e - moments.mean) * (e - moments.mean))
        .sum();

    if slope > 0.0 {
        tau2 + estimating_eq / slope
    } else {
        // All effects equal the weighted mean: Q = 0 < K − 1
        0.0
    }
}

// =============================================================================
// Tests
// =============================================================================
