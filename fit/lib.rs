/*!
This crate fits processing tree models to observed category frequencies. It evaluates category formulae numerically, computes log-likelihood and goodness-of-fit measures, drives classical multi-start numerical optimization, and implements the expectation maximization algorithm.
*/

#![allow(clippy::tabs_in_doc_comments)]

mod data;
mod em;
mod error;
mod likelihood;
mod optimize;
mod stability;
mod statics;

pub use self::data::Observations;
pub use self::em::{estep, mstep, run_em, EmOptions, EmOutcome};
pub use self::error::FitError;
pub use self::likelihood::{
	adjusted_rmse, category_probabilities, g_squared, log_factorial, log_likelihood,
	predicted_counts, rmse,
};
pub use self::optimize::{fit, fit_formulae, fit_model, FitOptions, FitReport, Objective};
pub use self::statics::{mixture_ratios, static_values, subtree_totals};
