// =============================================================================
// Heterogeneity Variance (τ²) Estimators
// =============================================================================
//
// The random-effects model says each observed effect is
//
//     eᵢ = μ + uᵢ + εᵢ,     uᵢ ~ N(0, τ²),   εᵢ ~ N(0, vᵢ)
//
// where vᵢ is the (known) within-study variance and τ² is the between-study
// variance we need to estimate before pooling.
//
// Two families live here:
//
//   - method_of_moments: closed-form estimators from a single weighted
//     moment equation (DerSimonian–Laird, Cochran, one-step refinements)
//   - iterative:         fixed-point estimators (Paule–Mandel and the
//     iterated method of moments)
//
// `Tau2Method` names the estimators a user can ask for, and
// `estimate_tau2` is the single place that maps a name to an algorithm.
//
// =============================================================================

mod iterative;
mod method_of_moments;

pub use iterative::{fit_tau2_iter_mm, fit_tau2_iterative, IterationConfig};
pub use method_of_moments::{
    fit_tau2_ca, fit_tau2_dl, fit_tau2_mm, fit_tau2_mm_scheme, WeightScheme,
};

use std::fmt;
use std::str::FromStr;

use ndarray::Array1;

use crate::data::StudySet;
use crate::error::{MetaError, Result};

use iterative::{run_fixed_point, warn_if_not_converged, UpdateRule};
use method_of_moments::tau2_from_weights;

/// A τ² estimate.
///
/// `converged` is only informative for iterative estimators; closed-form
/// estimators always report `true` with `iterations = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tau2Estimate {
    /// Between-study variance, never negative
    pub tau2: f64,
    /// Did the iteration meet its tolerance?
    pub converged: bool,
    /// Number of updates performed
    pub iterations: usize,
}

impl Tau2Estimate {
    fn closed_form(tau2: f64) -> Self {
        Self {
            tau2,
            converged: true,
            iterations: 0,
        }
    }

    /// τ, the between-study standard deviation.
    pub fn tau(&self) -> f64 {
        self.tau2.sqrt()
    }
}

/// Named τ² estimators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Tau2Method {
    /// Paule–Mandel, iterated to convergence ("pm", "iterated")
    #[default]
    PauleMandel,
    /// DerSimonian–Laird ("dl", "chi2")
    DerSimonianLaird,
    /// Cochran, uniform weights ("ca")
    Cochran,
    /// One refinement step starting from the Cochran estimate ("c2").
    /// Reports `converged = false` unless the step moves τ² by at most `atol`.
    TwoStepCochran,
    /// One refinement step starting from DerSimonian–Laird ("dl2")
    TwoStepDerSimonianLaird,
    /// Method-of-moments update iterated to convergence ("mm")
    IteratedMoments,
}

impl Tau2Method {
    pub fn name(&self) -> &'static str {
        match self {
            Tau2Method::PauleMandel => "pm",
            Tau2Method::DerSimonianLaird => "dl",
            Tau2Method::Cochran => "ca",
            Tau2Method::TwoStepCochran => "c2",
            Tau2Method::TwoStepDerSimonianLaird => "dl2",
            Tau2Method::IteratedMoments => "mm",
        }
    }
}

impl fmt::Display for Tau2Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tau2Method {
    type Err = MetaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pm" | "iterated" | "paule-mandel" | "paule_mandel" => Ok(Tau2Method::PauleMandel),
            "dl" | "chi2" | "dersimonian-laird" | "dersimonian_laird" => {
                Ok(Tau2Method::DerSimonianLaird)
            }
            "ca" | "cochran" => Ok(Tau2Method::Cochran),
            "c2" => Ok(Tau2Method::TwoStepCochran),
            "dl2" => Ok(Tau2Method::TwoStepDerSimonianLaird),
            "mm" | "iterated_mm" => Ok(Tau2Method::IteratedMoments),
            other => Err(MetaError::InvalidValue(format!(
                "Unknown tau2 method '{}'. Use 'pm', 'dl', 'ca', 'c2', 'dl2' or 'mm'.",
                other
            ))),
        }
    }
}

/// Estimate τ² with the named method.
///
/// `config` is used as-is by the iterative methods. The two-step methods
/// take only `config.atol` for their `converged` flag, and the closed-form
/// methods ignore it.
pub fn estimate_tau2(
    effect: &Array1<f64>,
    variance: &Array1<f64>,
    method: Tau2Method,
    config: &IterationConfig,
) -> Result<Tau2Estimate> {
    let studies = StudySet::new(effect, variance)?;
    studies.require_heterogeneity_df()?;
    config.validate()?;
    estimate_tau2_validated(&studies, method, config)
}

pub(crate) fn estimate_tau2_validated(
    studies: &StudySet<'_>,
    method: Tau2Method,
    config: &IterationConfig,
) -> Result<Tau2Estimate> {
    match method {
        Tau2Method::PauleMandel | Tau2Method::IteratedMoments => {
            let rule = if method == Tau2Method::PauleMandel {
                UpdateRule::PauleMandel
            } else {
                UpdateRule::MethodOfMoments
            };
            let estimate = run_fixed_point(studies, config, rule)?;
            warn_if_not_converged(rule, config, &estimate);
            Ok(estimate)
        }
        Tau2Method::DerSimonianLaird => {
            let w = WeightScheme::InverseVariance.weights(studies)?;
            tau2_from_weights(studies, &w).map(Tau2Estimate::closed_form)
        }
        Tau2Method::Cochran => {
            let w = WeightScheme::Uniform.weights(studies)?;
            tau2_from_weights(studies, &w).map(Tau2Estimate::closed_form)
        }
        Tau2Method::TwoStepCochran => {
            let w = WeightScheme::Uniform.weights(studies)?;
            let start = tau2_from_weights(studies, &w)?;
            two_step(studies, start, config.atol)
        }
        Tau2Method::TwoStepDerSimonianLaird => {
            let w = WeightScheme::InverseVariance.weights(studies)?;
            let start = tau2_from_weights(studies, &w)?;
            two_step(studies, start, config.atol)
        }
    }
}

/// One method-of-moments refinement from `start`, i.e. `fit_tau2_iter_mm`
/// with `max_iterations = 1`. Like that call it reports `converged = false`
/// unless `start` is already within `atol` of the refined value.
fn two_step(studies: &StudySet<'_>, start: f64, atol: f64) -> Result<Tau2Estimate> {
    let one_step = IterationConfig::default()
        .with_start(start)
        .with_atol(atol)
        .with_max_iterations(1);
    run_fixed_point(studies, &one_step, UpdateRule::MethodOfMoments)
}

// =============================================================================
// Tests
// =============================================================================
