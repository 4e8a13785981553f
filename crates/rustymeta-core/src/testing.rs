// Shared fixtures for unit tests.

use ndarray::{array, Array1};

/// Nine interlaboratory measurements with their squared standard
/// uncertainties (Kacker 2004, Table 1).
pub(crate) fn kacker() -> (Array1<f64>, Array1<f64>) {
    let eff = array![61.00, 61.40, 62.21, 62.30, 62.34, 62.60, 62.70, 62.84, 65.90];
    let var = array![0.2025, 1.2100, 0.0900, 0.2025, 0.3844, 0.5625, 0.0676, 0.0225, 1.8225];
    (eff, var)
}

/// Published τ (not τ²) values for the Kacker data, Table 1 first row.
pub(crate) const TAU_PM: f64 = 0.8399;
pub(crate) const TAU_CA: f64 = 1.1837;
pub(crate) const TAU_DL: f64 = 0.5359;
pub(crate) const TAU_C2: f64 = 0.9352;

/// Effects with no excess dispersion: Q stays below K − 1 for every τ².
pub(crate) fn homogeneous() -> (Array1<f64>, Array1<f64>) {
    let eff = array![1.00, 1.05, 0.98, 1.02];
    let var = array![0.04, 0.05, 0.03, 0.06];
    (eff, var)
}
