// =============================================================================
// RustyMeta Python Bindings
// =============================================================================
//
// This module creates the bridge between Rust and Python using PyO3.
// It wraps the pure Rust code from `rustymeta-core` and exposes it as
// a Python module that can be imported with `import rustymeta`.
//
// HOW THIS WORKS:
// ---------------
// 1. NumPy arrays come in as read-only views and are copied into ndarray
// 2. The core library does the work and returns plain Rust values
// 3. Results go back as floats, tuples, dicts or a `CombineResults` class
//
// Errors from the core (`MetaError`) become Python `ValueError`s.
//
// FOR MAINTAINERS:
// ----------------
// When adding new functionality:
// 1. Implement the logic in `rustymeta-core` first
// 2. Create a Python wrapper here that calls the Rust code
// 3. Add it to the module in the `_rustymeta` function at the bottom
//
// =============================================================================

use pyo3::prelude::*;
use pyo3::exceptions::PyValueError;
use pyo3::types::PyDict;
use numpy::PyReadonlyArray1;
use ndarray::Array1;

use rustymeta_core::{
    combine, combine_effects, fit_tau2_iter_mm, fit_tau2_iterative, fit_tau2_mm,
    CombineConfig, IterationConfig, MetaError, Tau2Method,
};

mod results_py;

use results_py::PyCombineResults;

pub(crate) fn to_py_err(e: MetaError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn to_owned_array(a: &PyReadonlyArray1<f64>) -> Array1<f64> {
    a.as_array().to_owned()
}

fn iteration_config(tau2_start: f64, atol: f64, maxiter: usize) -> IterationConfig {
    IterationConfig::default()
        .with_start(tau2_start)
        .with_atol(atol)
        .with_max_iterations(maxiter)
}

// =============================================================================
// τ² Estimators
// =============================================================================

/// Paule–Mandel estimate of τ².
///
/// # Returns
/// (tau2, converged)
#[pyfunction]
#[pyo3(name = "fit_tau2_iterative", signature = (eff, var_eff, tau2_start=0.0, atol=1e-5, maxiter=50))]
fn fit_tau2_iterative_py(
    eff: PyReadonlyArray1<f64>,
    var_eff: PyReadonlyArray1<f64>,
    tau2_start: f64,
    atol: f64,
    maxiter: usize,
) -> PyResult<(f64, bool)> {
    let config = iteration_config(tau2_start, atol, maxiter);
    let est = fit_tau2_iterative(&to_owned_array(&eff), &to_owned_array(&var_eff), &config)
        .map_err(to_py_err)?;
    Ok((est.tau2, est.converged))
}

/// Method-of-moments estimate of τ² with arbitrary weights.
#[pyfunction]
#[pyo3(name = "fit_tau2_mm")]
fn fit_tau2_mm_py(
    eff: PyReadonlyArray1<f64>,
    var_eff: PyReadonlyArray1<f64>,
    weights: PyReadonlyArray1<f64>,
) -> PyResult<f64> {
    fit_tau2_mm(
        &to_owned_array(&eff),
        &to_owned_array(&var_eff),
        &to_owned_array(&weights),
    )
    .map_err(to_py_err)
}

/// Iterated method-of-moments estimate of τ².
///
/// # Returns
/// (tau2, converged)
#[pyfunction]
#[pyo3(name = "fit_tau2_iter_mm", signature = (eff, var_eff, tau2_start=0.0, atol=1e-5, maxiter=50))]
fn fit_tau2_iter_mm_py(
    eff: PyReadonlyArray1<f64>,
    var_eff: PyReadonlyArray1<f64>,
    tau2_start: f64,
    atol: f64,
    maxiter: usize,
) -> PyResult<(f64, bool)> {
    let config = iteration_config(tau2_start, atol, maxiter);
    let est = fit_tau2_iter_mm(&to_owned_array(&eff), &to_owned_array(&var_eff), &config)
        .map_err(to_py_err)?;
    Ok((est.tau2, est.converged))
}

// =============================================================================
// Pooling
// =============================================================================

/// Pool study effects for a given τ².
///
/// # Returns
/// Dict with point, se, ci_low, ci_high, tau2
#[pyfunction]
#[pyo3(name = "combine", signature = (eff, var_eff, tau2, confidence_level=0.95))]
fn combine_py<'py>(
    py: Python<'py>,
    eff: PyReadonlyArray1<'py, f64>,
    var_eff: PyReadonlyArray1<'py, f64>,
    tau2: f64,
    confidence_level: f64,
) -> PyResult<Bound<'py, PyDict>> {
    let res = combine(&to_owned_array(&eff), &to_owned_array(&var_eff), tau2, confidence_level)
        .map_err(to_py_err)?;

    let dict = PyDict::new_bound(py);
    dict.set_item("point", res.point)?;
    dict.set_item("se", res.se)?;
    dict.set_item("ci_low", res.ci_low)?;
    dict.set_item("ci_high", res.ci_high)?;
    dict.set_item("tau2", res.tau2)?;

    Ok(dict)
}

/// Full fixed- and random-effects meta-analysis.
///
/// # Arguments
/// * `method_re` - 'pm' (alias 'iterated'), 'dl' (alias 'chi2'), 'ca', 'c2', 'dl2' or 'mm'
/// * `use_t` - Student-t critical values for the plain intervals
#[pyfunction]
#[pyo3(name = "combine_effects", signature = (eff, var_eff, method_re="pm", use_t=false, alpha=0.05, tau2_start=0.0, atol=1e-5, maxiter=50))]
#[allow(clippy::too_many_arguments)]
fn combine_effects_py(
    eff: PyReadonlyArray1<f64>,
    var_eff: PyReadonlyArray1<f64>,
    method_re: &str,
    use_t: bool,
    alpha: f64,
    tau2_start: f64,
    atol: f64,
    maxiter: usize,
) -> PyResult<PyCombineResults> {
    let method: Tau2Method = method_re.parse().map_err(to_py_err)?;
    let config = CombineConfig {
        method,
        iteration: iteration_config(tau2_start, atol, maxiter),
        use_t,
        confidence_level: 1.0 - alpha,
    };

    let inner = combine_effects(&to_owned_array(&eff), &to_owned_array(&var_eff), &config)
        .map_err(to_py_err)?;

    Ok(PyCombineResults { inner })
}

// =============================================================================
// Module Registration
// =============================================================================

/// RustyMeta: random-effects meta-analysis with a Rust backend
///
/// This is the internal Rust module. Users should import from the
/// Python wrapper: `import rustymeta`
#[pymodule]
fn _rustymeta(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyCombineResults>()?;

    m.add_function(wrap_pyfunction!(fit_tau2_iterative_py, m)?)?;
    m.add_function(wrap_pyfunction!(fit_tau2_mm_py, m)?)?;
    m.add_function(wrap_pyfunction!(fit_tau2_iter_mm_py, m)?)?;
    m.add_function(wrap_pyfunction!(combine_py, m)?)?;
    m.add_function(wrap_pyfunction!(combine_effects_py, m)?)?;

    Ok(())
}
