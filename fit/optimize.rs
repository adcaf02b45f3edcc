use crate::data::Observations;
use crate::error::FitError;
use crate::likelihood::{
	adjusted_rmse, category_probabilities, g_squared, log_likelihood, rmse,
};
use crate::stability::{to_bounded, to_unbounded, BOUND_MARGIN};
use crate::statics::static_values;
use argmin::core::{CostFunction, Error as SolverError, Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::neldermead::NelderMead;
use proctree_core::{Assignment, CategoryFormula, Mpt};
use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use serde::Serialize;

/// The objective a fit minimizes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Objective {
	/// The negative log-likelihood with the constant factorial terms dropped; dropping them does not move the optimum.
	LogLikelihood,
	/// The root-mean-squared error between predicted and observed counts.
	Rmse,
}

/// The options controlling the multi-start optimization.
#[derive(Clone, Debug)]
pub struct FitOptions {
	/// The number of independent uniform random initializations.
	pub n_restarts: usize,
	/// The seed deriving each restart's rng.
	pub seed: u64,
	/// The iteration budget of a single restart.
	pub max_iters: u64,
}

impl Default for FitOptions {
	fn default() -> Self {
		Self {
			n_restarts: 10,
			seed: 0,
			max_iters: 2000,
		}
	}
}

/// The evaluation of a fitted model. Serializes with the keys of the result mapping downstream scripts consume.
#[derive(Clone, Debug, Serialize)]
pub struct FitReport {
	pub n_params: usize,
	pub n_datasets: usize,
	#[serde(rename = "func_min")]
	pub objective_min: f64,
	#[serde(rename = "LogLik")]
	pub log_lik: f64,
	#[serde(rename = "LogLik-R")]
	pub log_lik_ignoring_factorials: f64,
	#[serde(rename = "AIC")]
	pub aic: f64,
	#[serde(rename = "BIC")]
	pub bic: f64,
	#[serde(rename = "AIC-R")]
	pub aic_from_g_squared: f64,
	#[serde(rename = "BIC-R")]
	pub bic_from_g_squared: f64,
	#[serde(rename = "RMSE")]
	pub rmse: f64,
	#[serde(rename = "aRMSE")]
	pub adjusted_rmse: f64,
	#[serde(rename = "G2")]
	pub g_squared: f64,
	/// The percentage of restarts that failed or did not converge.
	#[serde(rename = "OptimErrorRatio")]
	pub optim_error_ratio: f64,
	#[serde(rename = "ParamAssignment")]
	pub assignment: Assignment,
}

/// Fits a model: derives its formulae, pins the static mixture parameters to the data, and optimizes the free parameters.
pub fn fit_model(
	mpt: &Mpt,
	observations: &Observations,
	objective: Objective,
	options: &FitOptions,
) -> Result<FitReport, FitError> {
	let formulae = mpt.formulae();
	let free = mpt.free_parameters();
	let statics = static_values(&formulae, &mpt.static_parameters(), &observations.column_sums())?;
	fit(&formulae, &free, &statics, observations, objective, options)
}

/// Fits a bare formula list, treating every parameter as free.
pub fn fit_formulae(
	formulae: &[CategoryFormula],
	observations: &Observations,
	objective: Objective,
	options: &FitOptions,
) -> Result<FitReport, FitError> {
	let mut free: Vec<String> = formulae
		.iter()
		.flat_map(CategoryFormula::parameters)
		.map(str::to_owned)
		.collect();
	free.sort();
	free.dedup();
	fit(formulae, &free, &Assignment::new(), observations, objective, options)
}

/**
The multi-start fit: `n_restarts` independent bounded minimizations from uniform random initializations in `(0.01, 0.99)`, run in parallel, reduced to the best converged objective value.

Failed or non-converged restarts are recorded in the error ratio, never fatal while one restart converges. Zero restarts are rejected up front.
*/
pub fn fit(
	formulae: &[CategoryFormula],
	free: &[String],
	static_params: &Assignment,
	observations: &Observations,
	objective: Objective,
	options: &FitOptions,
) -> Result<FitReport, FitError> {
	if options.n_restarts == 0 {
		return Err(FitError::NoRestarts);
	}
	if formulae.len() != observations.n_categories() {
		return Err(FitError::ShapeMismatch {
			formulae: formulae.len(),
			columns: observations.n_categories(),
		});
	}
	let bounded = BoundedObjective {
		formulae,
		free,
		static_params,
		observations,
		objective,
	};
	if free.is_empty() {
		// nothing to optimize, evaluate the static assignment directly
		let objective_min = bounded.evaluate(&[])?;
		return compute_report(&bounded, objective_min, static_params.clone(), 0, 1);
	}
	let restarts: Vec<Option<(f64, Vec<f64>)>> = (0..options.n_restarts)
		.into_par_iter()
		.map(|restart| {
			let mut rng = Xoshiro256Plus::seed_from_u64(options.seed.wrapping_add(restart as u64));
			let init: Vec<f64> = (0..free.len()).map(|_| rng.gen_range(0.01, 0.99)).collect();
			run_restart(&bounded, &init, options.max_iters)
		})
		.collect();
	let n_failed = restarts.iter().filter(|restart| restart.is_none()).count();
	let best = restarts
		.into_iter()
		.flatten()
		.min_by(|left, right| left.0.partial_cmp(&right.0).unwrap())
		.ok_or(FitError::AllRestartsFailed {
			attempted: options.n_restarts,
		})?;
	let mut assignment = static_params.clone();
	for (name, &theta) in free.iter().zip(best.1.iter()) {
		assignment.insert(
			name.clone(),
			to_bounded(theta, BOUND_MARGIN, 1.0 - BOUND_MARGIN),
		);
	}
	compute_report(&bounded, best.0, assignment, n_failed, options.n_restarts)
}

/// The objective over the unconstrained optimizer space; parameters pass through the bounding transform before every evaluation.
#[derive(Clone)]
struct BoundedObjective<'a> {
	formulae: &'a [CategoryFormula],
	free: &'a [String],
	static_params: &'a Assignment,
	observations: &'a Observations,
	objective: Objective,
}

impl BoundedObjective<'_> {
	fn assignment(&self, theta: &[f64]) -> Assignment {
		let mut assignment = self.static_params.clone();
		for (name, &value) in self.free.iter().zip(theta.iter()) {
			assignment.insert(
				name.clone(),
				to_bounded(value, BOUND_MARGIN, 1.0 - BOUND_MARGIN),
			);
		}
		assignment
	}

	fn evaluate(&self, theta: &[f64]) -> Result<f64, FitError> {
		let assignment = self.assignment(theta);
		match self.objective {
			Objective::LogLikelihood => Ok(-log_likelihood(
				self.formulae,
				&assignment,
				self.observations,
				true,
			)?),
			Objective::Rmse => {
				let probabilities = category_probabilities(self.formulae, &assignment)?;
				Ok(rmse(&probabilities, self.observations))
			}
		}
	}
}

impl CostFunction for BoundedObjective<'_> {
	type Param = Vec<f64>;
	type Output = f64;

	fn cost(&self, param: &Self::Param) -> Result<Self::Output, SolverError> {
		match self.evaluate(param) {
			Ok(value) if value.is_finite() => Ok(value),
			Ok(_) => Ok(f64::INFINITY),
			Err(error) => Err(SolverError::from(error)),
		}
	}
}

/// One bounded minimization. Returns the best cost and parameters, or `None` when the solver errored or stopped without converging.
fn run_restart(
	objective: &BoundedObjective,
	init: &[f64],
	max_iters: u64,
) -> Option<(f64, Vec<f64>)> {
	let theta0: Vec<f64> = init
		.iter()
		.map(|&p| to_unbounded(p, BOUND_MARGIN, 1.0 - BOUND_MARGIN))
		.collect();
	let mut simplex = vec![theta0.clone()];
	for index in 0..theta0.len() {
		let mut vertex = theta0.clone();
		vertex[index] += 0.5;
		simplex.push(vertex);
	}
	let solver: NelderMead<Vec<f64>, f64> = match NelderMead::new(simplex).with_sd_tolerance(1e-10)
	{
		Ok(solver) => solver,
		Err(error) => {
			log::debug!("failed to construct the solver: {}", error);
			return None;
		}
	};
	let result = match Executor::new(objective.clone(), solver)
		.configure(|state| state.max_iters(max_iters))
		.run()
	{
		Ok(result) => result,
		Err(error) => {
			log::debug!("optimization restart failed: {}", error);
			return None;
		}
	};
	let state = result.state();
	let converged = matches!(
		state.get_termination_status(),
		TerminationStatus::Terminated(TerminationReason::SolverConverged)
	);
	if !converged {
		log::debug!("optimization restart did not converge");
		return None;
	}
	let cost = state.get_best_cost();
	if !cost.is_finite() {
		return None;
	}
	let best = state.get_best_param()?.clone();
	Some((cost, best))
}

fn compute_report(
	bounded: &BoundedObjective,
	objective_min: f64,
	assignment: Assignment,
	n_failed: usize,
	n_restarts: usize,
) -> Result<FitReport, FitError> {
	let formulae = bounded.formulae;
	let observations = bounded.observations;
	let probabilities = category_probabilities(formulae, &assignment)?;
	let log_lik = log_likelihood(formulae, &assignment, observations, false)?;
	let log_lik_r = log_likelihood(formulae, &assignment, observations, true)?;
	let k = bounded.free.len() as f64;
	let n = observations.total();
	let g2 = g_squared(&probabilities, observations)?;
	Ok(FitReport {
		n_params: bounded.free.len(),
		n_datasets: observations.n_datasets(),
		objective_min,
		log_lik,
		log_lik_ignoring_factorials: log_lik_r,
		aic: -2.0 * log_lik + 2.0 * k,
		bic: -2.0 * log_lik + k * n.ln(),
		aic_from_g_squared: g2 + 2.0 * k,
		bic_from_g_squared: g2 + k * n.ln(),
		rmse: rmse(&probabilities, observations),
		adjusted_rmse: adjusted_rmse(&probabilities, observations, bounded.free.len()),
		g_squared: g2,
		optim_error_ratio: n_failed as f64 / n_restarts as f64 * 100.0,
		assignment,
	})
}

#[cfg(test)]
fn bernoulli_formulae() -> Vec<CategoryFormula> {
	vec![
		CategoryFormula {
			category: "0".to_owned(),
			branches: proctree_core::parse_branches("a").unwrap(),
		},
		CategoryFormula {
			category: "1".to_owned(),
			branches: proctree_core::parse_branches("(1-a)").unwrap(),
		},
	]
}

#[test]
fn test_fit_converges_to_the_frequency_ratio() {
	let formulae = bernoulli_formulae();
	let observations = Observations::from_counts(&[20.0, 10.0]);
	for &objective in &[Objective::LogLikelihood, Objective::Rmse] {
		let report = fit_formulae(&formulae, &observations, objective, &FitOptions::default())
			.unwrap();
		assert!((report.assignment["a"] - 2.0 / 3.0).abs() < 2e-3);
		assert_eq!(report.n_params, 1);
		assert_eq!(report.n_datasets, 1);
	}
}

#[test]
fn test_fit_report_measures_are_consistent() {
	let formulae = bernoulli_formulae();
	let observations = Observations::from_counts(&[20.0, 10.0]);
	let report = fit_formulae(
		&formulae,
		&observations,
		Objective::LogLikelihood,
		&FitOptions::default(),
	)
	.unwrap();
	assert!((report.aic - (-2.0 * report.log_lik + 2.0)).abs() < 1e-9);
	assert!((report.bic - (-2.0 * report.log_lik + 30f64.ln())).abs() < 1e-9);
	assert!((report.aic_from_g_squared - (report.g_squared + 2.0)).abs() < 1e-9);
	assert!(report.g_squared >= 0.0);
	assert!(report.g_squared < 1e-4);
	assert!(report.optim_error_ratio.abs() < 1e-12);
}

#[test]
fn test_fit_rejects_zero_restarts() {
	let formulae = bernoulli_formulae();
	let observations = Observations::from_counts(&[20.0, 10.0]);
	let options = FitOptions {
		n_restarts: 0,
		..FitOptions::default()
	};
	assert!(matches!(
		fit_formulae(&formulae, &observations, Objective::LogLikelihood, &options),
		Err(FitError::NoRestarts)
	));
}

#[test]
fn test_error_ratio_counts_failed_restarts() {
	let formulae = bernoulli_formulae();
	let observations = Observations::from_counts(&[20.0, 10.0]);
	// a single iteration cannot reach the tolerance, so every restart fails
	let options = FitOptions {
		n_restarts: 4,
		max_iters: 1,
		..FitOptions::default()
	};
	assert!(matches!(
		fit_formulae(&formulae, &observations, Objective::LogLikelihood, &options),
		Err(FitError::AllRestartsFailed { attempted: 4 })
	));
}

#[test]
fn test_fit_model_pins_static_parameters() {
	use proctree_core::parse_easy;
	let content = "\
Do + (1-Do) * G1
(1-Do) * (1-G1)

(1-Dn) * G1
Dn + (1-Dn) * (1-G1)
";
	let mpt = parse_easy(content).unwrap();
	let observations = Observations::from_counts(&[30.0, 10.0, 15.0, 45.0]);
	let report = fit_model(
		&mpt,
		&observations,
		Objective::LogLikelihood,
		&FitOptions::default(),
	)
	.unwrap();
	// 40 of 100 observations fall into the first subtree
	assert!((report.assignment["y0"] - 0.4).abs() < 1e-12);
	assert_eq!(report.n_params, 3);
}
