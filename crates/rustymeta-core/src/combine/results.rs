// =============================================================================
// Full Random-Effects Analysis
// =============================================================================
//
// `combine_effects` is the one-call analysis most users want:
//
//   1. Fixed-effect pooling with w = 1/v, and Cochran's Q from it
//   2. Heterogeneity summaries: Q-test p-value, I², H²
//   3. τ² from the configured estimator
//   4. Random-effects pooling with w = 1/(v + τ²)
//   5. Hartung–Knapp–Sidik–Jonkman (HKSJ) scale factors for both models
//
// HKSJ
// ----
// The HKSJ variance rescales the model-based variance 1/Σw by the weighted
// residual mean square
//
//     s² = Σ wᵢ (eᵢ − μ̂)² / (K − 1)
//
// and pairs it with a t distribution on K − 1 df. At the Paule–Mandel τ²
// the random-effects s² is exactly 1 because Q(τ²) = K − 1 there.
//
// =============================================================================

use ndarray::Array1;

use crate::constants::DEFAULT_CONFIDENCE;
use crate::data::StudySet;
use crate::error::{MetaError, Result};
use crate::estimators::{estimate_tau2_validated, IterationConfig, Tau2Method};
use crate::inference::{check_confidence, chi2_sf, confidence_interval_t, confidence_interval_z};

use super::pool;

// =============================================================================
// Configuration
// =============================================================================

/// Options for `combine_effects`.
#[derive(Debug, Clone, PartialEq)]
pub struct CombineConfig {
    /// τ² estimator.
    /// Default: Paule–Mandel
    pub method: Tau2Method,

    /// Settings for iterative τ² estimators.
    pub iteration: IterationConfig,

    /// Use Student-t (df = K − 1) instead of normal critical values for the
    /// plain fixed and random intervals. HKSJ intervals always use t.
    /// Default: false
    pub use_t: bool,

    /// Default: 0.95
    pub confidence_level: f64,
}

impl Default for CombineConfig {
    fn default() -> Self {
        Self {
            method: Tau2Method::default(),
            iteration: IterationConfig::default(),
            use_t: false,
            confidence_level: DEFAULT_CONFIDENCE,
        }
    }
}

/// Which pooled interval to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntervalKind {
    Fixed,
    Random,
    /// Fixed effect with HKSJ-scaled variance
    FixedHksj,
    /// Random effect with HKSJ-scaled variance
    RandomHksj,
}

impl IntervalKind {
    pub const ALL: [IntervalKind; 4] = [
        IntervalKind::Fixed,
        IntervalKind::Random,
        IntervalKind::FixedHksj,
        IntervalKind::RandomHksj,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            IntervalKind::Fixed => "fixed effect",
            IntervalKind::Random => "random effect",
            IntervalKind::FixedHksj => "fixed effect wls",
            IntervalKind::RandomHksj => "random effect wls",
        }
    }
}

// =============================================================================
// Results
// =============================================================================

/// Everything `combine_effects` computes.
#[derive(Debug, Clone)]
pub struct CombineResults {
    /// Number of studies
    pub k: usize,
    /// Copy of the input effects
    pub effect: Array1<f64>,
    /// Copy of the input variances
    pub variance: Array1<f64>,

    pub effect_fe: f64,
    pub se_fe: f64,
    pub effect_re: f64,
    pub se_re: f64,

    /// Between-study variance used for the random-effects weights
    pub tau2: f64,
    pub tau2_converged: bool,
    pub tau2_iterations: usize,

    /// Cochran's Q (fixed-effect weighted sum of squares)
    pub q: f64,
    /// P(χ²_{K−1} > Q)
    pub q_pvalue: f64,
    /// Share of total variability due to heterogeneity, max(0, 1 − (K−1)/Q)
    pub i2: f64,
    /// Q / (K − 1)
    pub h2: f64,

    pub scale_hksj_fe: f64,
    pub scale_hksj_re: f64,

    /// Fixed-effect weights normalized to sum to one
    pub weights_rel_fe: Array1<f64>,
    /// Random-effects weights normalized to sum to one
    pub weights_rel_re: Array1<f64>,

    pub method: Tau2Method,
    pub use_t: bool,
    pub confidence_level: f64,
}

/// One row of a tabular summary: a study or a pooled estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub label: String,
    pub effect: f64,
    pub se: f64,
    pub ci_low: f64,
    pub ci_high: f64,
    /// Relative fixed-effect weight (studies only)
    pub weight_fe: Option<f64>,
    /// Relative random-effects weight (studies only)
    pub weight_re: Option<f64>,
}

impl CombineResults {
    /// Degrees of freedom K − 1.
    pub fn df(&self) -> f64 {
        (self.k - 1) as f64
    }

    /// Point estimate and standard error for an interval kind.
    pub fn estimate(&self, kind: IntervalKind) -> (f64, f64) {
        match kind {
            IntervalKind::Fixed => (self.effect_fe, self.se_fe),
            IntervalKind::Random => (self.effect_re, self.se_re),
            IntervalKind::FixedHksj => (self.effect_fe, self.se_fe * self.scale_hksj_fe.sqrt()),
            IntervalKind::RandomHksj => (self.effect_re, self.se_re * self.scale_hksj_re.sqrt()),
        }
    }

    /// Confidence interval at the configured level.
    pub fn conf_int(&self, kind: IntervalKind) -> Result<(f64, f64)> {
        self.conf_int_at(kind, self.confidence_level)
    }

    /// Confidence interval at an explicit level.
    ///
    /// HKSJ kinds always use Student-t with K − 1 df; the plain kinds use it
    /// only when `use_t` is set.
    pub fn conf_int_at(&self, kind: IntervalKind, confidence: f64) -> Result<(f64, f64)> {
        check_confidence(confidence)?;
        let (point, se) = self.estimate(kind);
        let use_t = self.use_t || matches!(kind, IntervalKind::FixedHksj | IntervalKind::RandomHksj);
        if use_t {
            Ok(confidence_interval_t(point, se, self.df(), confidence))
        } else {
            Ok(confidence_interval_z(point, se, confidence))
        }
    }

    /// Per-study intervals `eᵢ ± z · sqrt(vᵢ)` at the configured level.
    pub fn conf_int_samples(&self) -> Result<Vec<(f64, f64)>> {
        check_confidence(self.confidence_level)?;
        Ok(self
            .effect
            .iter()
            .zip(self.variance.iter())
            .map(|(&e, &v)| confidence_interval_z(e, v.sqrt(), self.confidence_level))
            .collect())
    }

    /// One row per study followed by the four pooled rows.
    ///
    /// `labels` names the studies; defaults to "0", "1", ...
    pub fn summary_rows(&self, labels: Option<&[String]>) -> Result<Vec<SummaryRow>> {
        if let Some(l) = labels {
            if l.len() != self.k {
                return Err(MetaError::DimensionMismatch(format!(
                    "{} labels supplied for {} studies",
                    l.len(),
                    self.k
                )));
            }
        }

        let sample_ci = self.conf_int_samples()?;
        let mut rows = Vec::with_capacity(self.k + IntervalKind::ALL.len());

        for (i, (ci_low, ci_high)) in sample_ci.into_iter().enumerate() {
            let label = labels.map_or_else(|| i.to_string(), |l| l[i].clone());
            rows.push(SummaryRow {
                label,
                effect: self.effect[i],
                se: self.variance[i].sqrt(),
                ci_low,
                ci_high,
                weight_fe: Some(self.weights_rel_fe[i]),
                weight_re: Some(self.weights_rel_re[i]),
            });
        }

        for kind in IntervalKind::ALL {
            let (effect, se) = self.estimate(kind);
            let (ci_low, ci_high) = self.conf_int(kind)?;
            rows.push(SummaryRow {
                label: kind.label().to_string(),
                effect,
                se,
                ci_low,
                ci_high,
                weight_fe: None,
                weight_re: None,
            });
        }

        Ok(rows)
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

/// Run a fixed- and random-effects meta-analysis.
///
/// # Arguments
/// * `effect` - Study effects (K × 1)
/// * `variance` - Within-study sampling variances (K × 1), all positive
/// * `config` - τ² method, iteration settings, interval options
///
/// # Errors
/// Input validation errors, `DegenerateWeights` when K = 1, or an invalid
/// config. A non-converged iterative τ² is not an error; see
/// `CombineResults::tau2_converged`.
pub fn combine_effects(
    effect: &Array1<f64>,
    variance: &Array1<f64>,
    config: &CombineConfig,
) -> Result<CombineResults> {
    let studies = StudySet::new(effect, variance)?;
    studies.require_heterogeneity_df()?;
    config.iteration.validate()?;
    // Fail on a bad level now rather than at the first conf_int call
    check_confidence(config.confidence_level)?;

    let k = studies.k();
    let df = (k - 1) as f64;

    // -------------------------------------------------------------------------
    // Fixed effect and heterogeneity statistics
    // -------------------------------------------------------------------------
    let fixed = pool(&studies, 0.0);
    let q = fixed.ss;
    let q_pvalue = chi2_sf(q, df);
    let h2 = q / df;
    let i2 = if q > 0.0 { (1.0 - df / q).max(0.0) } else { 0.0 };

    // -------------------------------------------------------------------------
    // τ² and random effect
    // -------------------------------------------------------------------------
    let tau2_est = estimate_tau2_validated(&studies, config.method, &config.iteration)?;
    let random = pool(&studies, tau2_est.tau2);

    let weights_rel_fe = &fixed.weights / fixed.weight_sum;
    let weights_rel_re = &random.weights / random.weight_sum;

    Ok(CombineResults {
        k,
        effect: effect.clone(),
        variance: variance.clone(),
        effect_fe: fixed.point,
        se_fe: fixed.se,
        effect_re: random.point,
        se_re: random.se,
        tau2: tau2_est.tau2,
        tau2_converged: tau2_est.converged,
        tau2_iterations: tau2_est.iterations,
        q,
        q_pvalue,
        i2,
        h2,
        scale_hksj_fe: fixed.ss / df,
        scale_hksj_re: random.ss / df,
        weights_rel_fe,
        weights_rel_re,
        method: config.method,
        use_t: config.use_t,
        confidence_level: config.confidence_level,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combine::combine;
    use crate::inference::t_critical;
    use crate::testing::{homogeneous, kacker, TAU_PM};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn pm_config() -> CombineConfig {
        CombineConfig {
            iteration: IterationConfig::default().with_start(0.1).with_atol(1e-8),
            ..CombineConfig::default()
        }
    }

    #[test]
    fn test_kacker_heterogeneity_statistics() {
        let (eff, var) = kacker();
        let res = combine_effects(&eff, &var, &pm_config()).unwrap();

        assert_eq!(res.k, 9);
        assert_abs_diff_eq!(res.q, 24.801898, epsilon = 1e-5);
        assert_abs_diff_eq!(res.i2, 0.677444, epsilon = 1e-5);
        assert_abs_diff_eq!(res.h2, 24.801898 / 8.0, epsilon = 1e-5);
        assert!(res.q_pvalue < 0.01);
    }

    #[test]
    fn test_kacker_pooled_estimates() {
        let (eff, var) = kacker();
        let res = combine_effects(&eff, &var, &pm_config()).unwrap();

        assert!(res.tau2_converged);
        assert_abs_diff_eq!(res.tau2.sqrt(), TAU_PM, epsilon = 6e-5);

        assert_abs_diff_eq!(res.effect_fe, 62.583397, epsilon = 1e-5);
        assert_abs_diff_eq!(res.se_fe, 0.107846, epsilon = 1e-5);
        assert_abs_diff_eq!(res.effect_re, 62.407620, epsilon = 1e-5);
        assert_abs_diff_eq!(res.se_re, 0.338031, epsilon = 1e-5);
    }

    #[test]
    fn test_random_effect_agrees_with_combine() {
        let (eff, var) = kacker();
        let res = combine_effects(&eff, &var, &pm_config()).unwrap();
        let single = combine(&eff, &var, res.tau2, 0.95).unwrap();

        assert_abs_diff_eq!(res.effect_re, single.point, epsilon = 1e-12);
        let (lo, hi) = res.conf_int(IntervalKind::Random).unwrap();
        assert_abs_diff_eq!(lo, single.ci_low, epsilon = 1e-12);
        assert_abs_diff_eq!(hi, single.ci_high, epsilon = 1e-12);
    }

    #[test]
    fn test_hksj_scale_is_one_at_paule_mandel() {
        let (eff, var) = kacker();
        let res = combine_effects(&eff, &var, &pm_config()).unwrap();

        assert_abs_diff_eq!(res.scale_hksj_re, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(res.scale_hksj_fe, 3.100237, epsilon = 1e-5);
    }

    #[test]
    fn test_hksj_interval_uses_t() {
        let (eff, var) = kacker();
        let config = CombineConfig {
            method: Tau2Method::DerSimonianLaird,
            ..CombineConfig::default()
        };
        let res = combine_effects(&eff, &var, &config).unwrap();

        let (point, se) = res.estimate(IntervalKind::RandomHksj);
        assert_abs_diff_eq!(se, 0.294776, epsilon = 1e-5);

        let (lo, hi) = res.conf_int(IntervalKind::RandomHksj).unwrap();
        let t8 = t_critical(0.95, 8.0).unwrap();
        assert_abs_diff_eq!(hi - point, t8 * se, epsilon = 1e-10);
        assert_abs_diff_eq!(point - lo, t8 * se, epsilon = 1e-10);
    }

    #[test]
    fn test_identical_effects_give_point_hksj_interval() {
        // Zero residual dispersion: HKSJ scale 0, interval collapses to the point
        let eff = array![0.7, 0.7, 0.7];
        let var = array![0.1, 0.2, 0.4];
        let res = combine_effects(&eff, &var, &CombineConfig::default()).unwrap();

        assert_abs_diff_eq!(res.scale_hksj_fe, 0.0, epsilon = 1e-20);
        let (lo, hi) = res.conf_int(IntervalKind::FixedHksj).unwrap();
        assert_abs_diff_eq!(lo, res.effect_fe, epsilon = 1e-12);
        assert_abs_diff_eq!(hi, res.effect_fe, epsilon = 1e-12);
    }

    #[test]
    fn test_conf_int_at_rejects_bad_level() {
        let (eff, var) = kacker();
        let res = combine_effects(&eff, &var, &pm_config()).unwrap();

        assert!(matches!(
            res.conf_int_at(IntervalKind::Random, 1.0).unwrap_err(),
            MetaError::InvalidValue(_)
        ));
        let (lo90, hi90) = res.conf_int_at(IntervalKind::Random, 0.90).unwrap();
        let (lo95, hi95) = res.conf_int(IntervalKind::Random).unwrap();
        assert!(lo95 < lo90 && hi90 < hi95);
    }

    #[test]
    fn test_use_t_widens_plain_intervals() {
        let (eff, var) = kacker();
        let z_res = combine_effects(&eff, &var, &pm_config()).unwrap();
        let t_res = combine_effects(
            &eff,
            &var,
            &CombineConfig {
                use_t: true,
                ..pm_config()
            },
        )
        .unwrap();

        let (zl, zh) = z_res.conf_int(IntervalKind::Fixed).unwrap();
        let (tl, th) = t_res.conf_int(IntervalKind::Fixed).unwrap();
        assert!(tl < zl && th > zh);
    }

    #[test]
    fn test_relative_weights_sum_to_one() {
        let (eff, var) = kacker();
        let res = combine_effects(&eff, &var, &pm_config()).unwrap();

        assert_abs_diff_eq!(res.weights_rel_fe.sum(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(res.weights_rel_re.sum(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(res.weights_rel_fe[0], 0.057436, epsilon = 1e-5);
        assert_abs_diff_eq!(res.weights_rel_re[0], 0.125857, epsilon = 1e-5);
    }

    #[test]
    fn test_homogeneous_random_equals_fixed() {
        let (eff, var) = homogeneous();
        let res = combine_effects(&eff, &var, &CombineConfig::default()).unwrap();

        assert_eq!(res.tau2, 0.0);
        assert_eq!(res.i2, 0.0);
        assert_abs_diff_eq!(res.effect_re, res.effect_fe, epsilon = 1e-14);
        assert_abs_diff_eq!(res.se_re, res.se_fe, epsilon = 1e-14);
    }

    #[test]
    fn test_sample_intervals() {
        let (eff, var) = kacker();
        let res = combine_effects(&eff, &var, &pm_config()).unwrap();
        let ci = res.conf_int_samples().unwrap();

        assert_eq!(ci.len(), 9);
        // Study 0: 61.00 ± 1.959964 × 0.45
        assert_abs_diff_eq!(ci[0].0, 61.0 - 1.959964 * 0.45, epsilon = 1e-5);
        assert_abs_diff_eq!(ci[0].1, 61.0 + 1.959964 * 0.45, epsilon = 1e-5);
    }

    #[test]
    fn test_summary_rows() {
        let (eff, var) = kacker();
        let res = combine_effects(&eff, &var, &pm_config()).unwrap();

        let rows = res.summary_rows(None).unwrap();
        assert_eq!(rows.len(), 9 + 4);
        assert_eq!(rows[0].label, "0");
        assert!(rows[0].weight_fe.is_some());
        assert_eq!(rows[9].label, "fixed effect");
        assert_eq!(rows[12].label, "random effect wls");
        assert!(rows[12].weight_re.is_none());

        let labels: Vec<String> = (1..=9).map(|i| format!("lab {}", i)).collect();
        let rows = res.summary_rows(Some(labels.as_slice())).unwrap();
        assert_eq!(rows[8].label, "lab 9");

        let short = vec!["a".to_string()];
        assert!(matches!(
            res.summary_rows(Some(short.as_slice())).unwrap_err(),
            MetaError::DimensionMismatch(_)
        ));
    }

    #[test]
    fn test_non_converged_tau2_is_reported_not_raised() {
        let (eff, var) = kacker();
        let config = CombineConfig {
            iteration: IterationConfig::default().with_max_iterations(1),
            ..CombineConfig::default()
        };
        let res = combine_effects(&eff, &var, &config).unwrap();
        assert!(!res.tau2_converged);
        assert_eq!(res.tau2_iterations, 1);
        assert!(res.tau2 >= 0.0);
    }

    #[test]
    fn test_single_study_fails() {
        let eff = array![1.0];
        let var = array![0.2];
        assert!(matches!(
            combine_effects(&eff, &var, &CombineConfig::default()).unwrap_err(),
            MetaError::DegenerateWeights(_)
        ));
    }

    #[test]
    fn test_invalid_confidence_level() {
        let (eff, var) = kacker();
        let config = CombineConfig {
            confidence_level: 1.5,
            ..CombineConfig::default()
        };
        assert!(combine_effects(&eff, &var, &config).is_err());
    }
}
