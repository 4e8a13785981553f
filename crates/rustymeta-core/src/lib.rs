// =============================================================================
// RustyMeta Core Library
// =============================================================================
//
// This is the entry point for the pure Rust meta-analysis library.
// All the numerical work happens here - no Python code involved.
//
// STRUCTURE:
// ----------
// The library is organized into modules, each handling a specific concern:
//
//   - data:        Validated view over per-study (effect, variance) pairs
//   - moments:     Weighted mean and weighted sum of squares
//   - estimators:  Between-study variance τ² (DerSimonian–Laird, Cochran,
//                  Paule–Mandel, two-step and iterated variants)
//   - combine:     Pooled effects, intervals and heterogeneity statistics
//   - inference:   Critical values, p-values, confidence intervals
//   - error:       Error types used throughout the library
//
// DATA FLOW:
// ----------
//   (effect, variance) → StudySet → weights → τ² → pooled effect + interval
//
// Every call is a pure function of its inputs. Nothing is cached or shared.
//
// FOR MAINTAINERS:
// ----------------
// When adding new functionality:
//   1. Add it to the appropriate module (or create a new one)
//   2. Write tests in that module (see existing tests for examples)
//   3. Re-export public items here so users can access them easily
//   4. Update the Python bindings in the `rustymeta` crate
//
// =============================================================================

pub mod combine;
pub mod constants;
pub mod data;
pub mod error;
pub mod estimators;
pub mod inference;
pub mod moments;

#[cfg(test)]
mod testing;

// Re-export commonly used items at the top level for convenience
pub use combine::{
    combine, combine_effects, combine_fixed, CombineConfig, CombineResults, CombinedEffect,
    IntervalKind, SummaryRow,
};
pub use data::StudySet;
pub use error::{MetaError, Result};
pub use estimators::{
    estimate_tau2, fit_tau2_ca, fit_tau2_dl, fit_tau2_iter_mm, fit_tau2_iterative, fit_tau2_mm,
    fit_tau2_mm_scheme, IterationConfig, Tau2Estimate, Tau2Method, WeightScheme,
};
pub use moments::{weighted_moments, WeightedMoments};
