// =============================================================================
// Meta-Analysis Results
// =============================================================================
//
// Holds the output of `combine_effects`: both pooled effects, τ², the
// heterogeneity statistics and the per-study weights.
// Intervals are computed on demand so the level can be changed after fitting.
// =============================================================================

use pyo3::prelude::*;
use pyo3::exceptions::PyValueError;
use pyo3::types::PyDict;
use numpy::{IntoPyArray, PyArray1};

use rustymeta_core::{CombineResults, IntervalKind};

use crate::to_py_err;

/// Results from a fixed- and random-effects meta-analysis.
#[pyclass(name = "CombineResults")]
#[derive(Clone)]
pub struct PyCombineResults {
    pub(crate) inner: CombineResults,
}

fn interval_kind_from_name(name: &str) -> PyResult<IntervalKind> {
    match name {
        "fe" | "fixed" => Ok(IntervalKind::Fixed),
        "re" | "random" => Ok(IntervalKind::Random),
        "fe_hksj" | "fixed_wls" => Ok(IntervalKind::FixedHksj),
        "re_hksj" | "random_wls" => Ok(IntervalKind::RandomHksj),
        other => Err(PyValueError::new_err(format!(
            "Unknown interval '{}'. Use 'fe', 're', 'fe_hksj' or 're_hksj'.", other
        ))),
    }
}

#[pymethods]
impl PyCombineResults {
    /// Number of studies.
    #[getter]
    fn k(&self) -> usize {
        self.inner.k
    }

    /// Degrees of freedom of the Q statistic (K - 1).
    #[getter]
    fn df(&self) -> f64 {
        self.inner.df()
    }

    /// Fixed-effect (inverse-variance) pooled estimate.
    #[getter]
    fn effect_fe(&self) -> f64 {
        self.inner.effect_fe
    }

    #[getter]
    fn sd_eff_w_fe(&self) -> f64 {
        self.inner.se_fe
    }

    /// Random-effects pooled estimate.
    #[getter]
    fn effect_re(&self) -> f64 {
        self.inner.effect_re
    }

    #[getter]
    fn sd_eff_w_re(&self) -> f64 {
        self.inner.se_re
    }

    /// Between-study variance used for the random-effects weights.
    #[getter]
    fn tau2(&self) -> f64 {
        self.inner.tau2
    }

    /// Did an iterative τ² estimator meet its tolerance?
    ///
    /// Always True for the closed-form methods.
    #[getter]
    fn tau2_converged(&self) -> bool {
        self.inner.tau2_converged
    }

    #[getter]
    fn tau2_iterations(&self) -> usize {
        self.inner.tau2_iterations
    }

    /// Cochran's Q statistic.
    #[getter]
    fn q(&self) -> f64 {
        self.inner.q
    }

    /// P-value of the Q test against χ²(K - 1).
    #[getter]
    fn q_pvalue(&self) -> f64 {
        self.inner.q_pvalue
    }

    /// Share of total variation due to heterogeneity.
    #[getter]
    fn i2(&self) -> f64 {
        self.inner.i2
    }

    #[getter]
    fn h2(&self) -> f64 {
        self.inner.h2
    }

    /// HKSJ variance scale for the fixed-effect estimate.
    #[getter]
    fn scale_hksj_fe(&self) -> f64 {
        self.inner.scale_hksj_fe
    }

    /// HKSJ variance scale for the random-effects estimate.
    #[getter]
    fn scale_hksj_re(&self) -> f64 {
        self.inner.scale_hksj_re
    }

    /// Relative fixed-effect weights (sum to one).
    #[getter]
    fn weights_rel_fe<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.inner.weights_rel_fe.clone().into_pyarray_bound(py)
    }

    /// Relative random-effects weights (sum to one).
    #[getter]
    fn weights_rel_re<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.inner.weights_rel_re.clone().into_pyarray_bound(py)
    }

    /// Name of the τ² estimator.
    #[getter]
    fn method_re(&self) -> &str {
        self.inner.method.name()
    }

    #[getter]
    fn use_t(&self) -> bool {
        self.inner.use_t
    }

    /// Confidence interval for a pooled estimate.
    ///
    /// # Arguments
    /// * `kind` - 'fe', 're', 'fe_hksj' or 're_hksj'
    /// * `alpha` - Significance level; defaults to 1 - confidence_level
    #[pyo3(signature = (kind="re", alpha=None))]
    fn conf_int(&self, kind: &str, alpha: Option<f64>) -> PyResult<(f64, f64)> {
        let kind = interval_kind_from_name(kind)?;
        let confidence = alpha.map_or(self.inner.confidence_level, |a| 1.0 - a);
        self.inner.conf_int_at(kind, confidence).map_err(to_py_err)
    }

    /// Per-study confidence intervals eᵢ ± z·sqrt(vᵢ).
    fn conf_int_samples(&self) -> PyResult<Vec<(f64, f64)>> {
        self.inner.conf_int_samples().map_err(to_py_err)
    }

    /// Summary table as a dict of columns.
    ///
    /// One row per study followed by the four pooled rows. Pooled rows
    /// carry NaN in the weight columns.
    #[pyo3(signature = (labels=None))]
    fn summary_frame<'py>(
        &self,
        py: Python<'py>,
        labels: Option<Vec<String>>,
    ) -> PyResult<Bound<'py, PyDict>> {
        let rows = self
            .inner
            .summary_rows(labels.as_deref())
            .map_err(to_py_err)?;

        let dict = PyDict::new_bound(py);
        dict.set_item("label", rows.iter().map(|r| r.label.clone()).collect::<Vec<_>>())?;
        dict.set_item("eff", rows.iter().map(|r| r.effect).collect::<Vec<_>>())?;
        dict.set_item("sd_eff", rows.iter().map(|r| r.se).collect::<Vec<_>>())?;
        dict.set_item("ci_low", rows.iter().map(|r| r.ci_low).collect::<Vec<_>>())?;
        dict.set_item("ci_upp", rows.iter().map(|r| r.ci_high).collect::<Vec<_>>())?;
        dict.set_item(
            "w_fe",
            rows.iter().map(|r| r.weight_fe.unwrap_or(f64::NAN)).collect::<Vec<_>>(),
        )?;
        dict.set_item(
            "w_re",
            rows.iter().map(|r| r.weight_re.unwrap_or(f64::NAN)).collect::<Vec<_>>(),
        )?;

        Ok(dict)
    }

    fn __repr__(&self) -> String {
        format!(
            "CombineResults(k={}, effect_re={:.6}, tau2={:.6}, method_re='{}')",
            self.inner.k,
            self.inner.effect_re,
            self.inner.tau2,
            self.inner.method.name()
        )
    }
}
